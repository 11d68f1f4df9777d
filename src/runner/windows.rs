//! Remote Windows build path: drive a disposable VirtualBox VM through one
//! build session and hand back the dist directory on the shared host dir.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::Config;
use crate::paths;
use crate::types::BuildTarget;
use crate::vbox::{GuestCredentials, VBox};
use crate::windows::{WinBuilder, WinSession};

pub async fn build(config: &Config, target: &BuildTarget, revision: &str) -> Result<PathBuf> {
    let vm = &config.vm;

    let password = std::env::var(&vm.password_env)
        .with_context(|| format!("guest password not set ({})", vm.password_env))?;
    let signing_key = match std::env::var(&vm.signing_key_env) {
        Ok(key) => key,
        Err(_) => {
            warn!(target: "windows", env = %vm.signing_key_env, "signing key not set, building unsigned");
            String::new()
        }
    };

    let vcvars_arch = match &target.vcvars_arch {
        Some(arch) => arch.clone(),
        None => bail!("target {} has no vcvars_arch configured", target.name()),
    };

    let share_dir = paths::win_share_dir(&config.base_dir);
    prepare_share(&share_dir, vm.build_config.as_deref()).await?;

    let mut guest_env: Vec<(String, String)> = vm
        .guest_env
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for name in &vm.passthrough_env {
        match std::env::var(name) {
            Ok(value) => guest_env.push((name.clone(), value)),
            Err(_) => warn!(target: "windows", env = %name, "pass-through variable not set"),
        }
    }

    let session = WinSession {
        vm_name: vm.name.clone(),
        credentials: GuestCredentials {
            username: vm.username.clone(),
            password,
        },
        host_dir: share_dir.clone(),
        share_name: vm.share_name.clone(),
        drive: vm.drive.clone(),
        vcvars_path: vm.vcvars_path.clone(),
        guest_workdir: vm.guest_workdir.clone(),
        signing_key,
        guest_env,
    };

    let mut builder =
        WinBuilder::new(VBox::new(), session).with_timings(vm.timings.to_driver());

    let result = drive_build(&mut builder, config, target, revision, &vcvars_arch).await;

    // Always, even when start or the guest script failed: a VM left running
    // would hold the share and burn host resources until the next cycle.
    builder.stop().await;

    result?;
    Ok(share_dir.join("dist"))
}

async fn drive_build(
    builder: &mut WinBuilder<VBox>,
    config: &Config,
    target: &BuildTarget,
    revision: &str,
    vcvars_arch: &str,
) -> Result<()> {
    builder.start().await?;

    let vm = &config.vm;
    builder.append_script("git", &["clone", &config.repo.url, "build"]);
    builder.append_script("cd", &["build"]);
    builder.append_script("git", &["checkout", revision]);

    if let Some(file) = &vm.build_config {
        if let Some(name) = file.file_name().and_then(|n| n.to_str()) {
            let on_share = format!("{}\\{}", vm.drive, name);
            builder.append_script("copy", &["/y", &on_share, name]);
        }
    }

    append_command(builder, &config.build.install_cmd);
    append_command(builder, &config.build.dist_cmd);

    let dist_on_share = format!("{}\\dist", vm.drive);
    builder.append_script("xcopy", &["/e", "/i", "/y", "dist", &dist_on_share]);

    info!(target: "windows", target_name = %target.name(), revision = %revision, "running guest build");
    builder.run_script(vcvars_arch).await
}

fn append_command(builder: &mut WinBuilder<VBox>, cmd: &[String]) {
    if let Some((head, rest)) = cmd.split_first() {
        let args: Vec<&str> = rest.iter().map(String::as_str).collect();
        builder.append_script(head, &args);
    }
}

/// Fresh share area for this session: empty dist, optional build config file
async fn prepare_share(share_dir: &Path, build_config: Option<&Path>) -> Result<()> {
    tokio::fs::create_dir_all(share_dir)
        .await
        .with_context(|| format!("creating {}", share_dir.display()))?;

    let dist = share_dir.join("dist");
    if dist.exists() {
        tokio::fs::remove_dir_all(&dist)
            .await
            .with_context(|| format!("clearing {}", dist.display()))?;
    }

    if let Some(file) = build_config {
        let name = file
            .file_name()
            .with_context(|| format!("build config has no file name: {}", file.display()))?;
        tokio::fs::copy(file, share_dir.join(name))
            .await
            .with_context(|| format!("copying {} onto the share", file.display()))?;
    }

    Ok(())
}
