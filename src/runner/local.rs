//! Local build path (macOS host).

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::Config;
use crate::process::{run, RunSpec};
use crate::types::BuildTarget;

pub async fn build(config: &Config, target: &BuildTarget, checkout: &Path) -> Result<PathBuf> {
    info!(target: "local", target_name = %target.name(), "running local build");

    run_cmd(&config.build.install_cmd, checkout)
        .await
        .context("installing dependencies")?;
    run_cmd(&config.build.dist_cmd, checkout)
        .await
        .context("building distribution")?;

    Ok(checkout.join("dist"))
}

async fn run_cmd(cmd: &[String], cwd: &Path) -> Result<()> {
    let (program, args) = cmd.split_first().context("empty build command")?;
    run(&RunSpec::new(program.clone(), args.to_vec()).cwd(cwd)).await?;
    Ok(())
}
