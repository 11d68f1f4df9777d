//! Containerized Linux build path.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::Config;
use crate::process::{run, RunSpec};
use crate::types::BuildTarget;

pub async fn build(config: &Config, target: &BuildTarget, checkout: &Path) -> Result<PathBuf> {
    let image = target
        .docker_image
        .as_deref()
        .with_context(|| format!("target {} has no docker_image configured", target.name()))?;

    let script = format!(
        "{} && {}",
        shell_join(&config.build.install_cmd),
        shell_join(&config.build.dist_cmd)
    );

    info!(target: "docker", image = %image, "running containerized build");
    run(&RunSpec::new(
        "docker",
        vec![
            "run".to_string(),
            "--rm".to_string(),
            "-v".to_string(),
            format!("{}:/src", checkout.display()),
            "-w".to_string(),
            "/src".to_string(),
            image.to_string(),
            "bash".to_string(),
            "-lc".to_string(),
            script,
        ],
    ))
    .await
    .with_context(|| format!("containerized build for {}", target.name()))?;

    Ok(checkout.join("dist"))
}

fn shell_join(cmd: &[String]) -> String {
    cmd.iter()
        .map(|arg| {
            if arg.contains(char::is_whitespace) {
                format!("'{}'", arg)
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
