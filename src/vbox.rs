//! Management-plane control of the Windows build VM.
//!
//! Every operation wraps one `VBoxManage` invocation; a non-zero exit
//! surfaces as a [`RunError`](crate::process::RunError) carrying the exit
//! code and captured output. The [`ControlChannel`] trait is the seam the
//! Windows build driver is generic over.

use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::path::Path;

use crate::process::{run, RunSpec};

/// Guest login used for in-guest execution
#[derive(Debug, Clone)]
pub struct GuestCredentials {
    pub username: String,
    pub password: String,
}

/// Hypervisor operations the Windows build driver needs
#[allow(async_fn_in_trait)]
pub trait ControlChannel {
    /// Start the named VM headless
    async fn start(&self, name: &str) -> Result<()>;

    /// Revert the named VM to its current (base) snapshot
    async fn snapshot_restore(&self, name: &str) -> Result<()>;

    /// Send the ACPI power signal
    async fn power_button(&self, name: &str) -> Result<()>;

    /// Hard power-off
    async fn force_power_off(&self, name: &str) -> Result<()>;

    /// Names of all currently running VMs
    async fn list_running(&self) -> Result<HashSet<String>>;

    /// Expose a host directory to the guest as a transient shared folder
    async fn map_shared_folder(&self, name: &str, host_path: &Path, share_name: &str)
        -> Result<()>;

    /// Remove a transient shared folder mapping
    async fn unmap_shared_folder(&self, name: &str, share_name: &str) -> Result<()>;

    /// Execute a program inside the guest with the given environment
    /// variables injected, returning its captured output. A non-zero guest
    /// exit status is an error carrying that status.
    async fn run_in_guest(
        &self,
        name: &str,
        credentials: &GuestCredentials,
        exe: &str,
        args: &[String],
        env: &[(String, String)],
    ) -> Result<String>;
}

/// `VBoxManage`-backed control channel
#[derive(Debug, Clone)]
pub struct VBox {
    program: String,
}

impl VBox {
    pub fn new() -> Self {
        Self {
            program: "VBoxManage".to_string(),
        }
    }

    /// Override the management binary (e.g. a full path)
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn manage(&self, args: Vec<String>) -> Result<String> {
        let out = run(&RunSpec::new(&self.program, args)).await?;
        Ok(out.output)
    }
}

impl Default for VBox {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlChannel for VBox {
    async fn start(&self, name: &str) -> Result<()> {
        self.manage(vec![
            "startvm".to_string(),
            name.to_string(),
            "--type".to_string(),
            "headless".to_string(),
        ])
        .await
        .with_context(|| format!("starting VM {}", name))?;
        Ok(())
    }

    async fn snapshot_restore(&self, name: &str) -> Result<()> {
        self.manage(vec![
            "snapshot".to_string(),
            name.to_string(),
            "restorecurrent".to_string(),
        ])
        .await
        .with_context(|| format!("restoring snapshot of {}", name))?;
        Ok(())
    }

    async fn power_button(&self, name: &str) -> Result<()> {
        self.manage(vec![
            "controlvm".to_string(),
            name.to_string(),
            "acpipowerbutton".to_string(),
        ])
        .await
        .with_context(|| format!("sending ACPI power signal to {}", name))?;
        Ok(())
    }

    async fn force_power_off(&self, name: &str) -> Result<()> {
        self.manage(vec![
            "controlvm".to_string(),
            name.to_string(),
            "poweroff".to_string(),
        ])
        .await
        .with_context(|| format!("powering off {}", name))?;
        Ok(())
    }

    async fn list_running(&self) -> Result<HashSet<String>> {
        let output = self
            .manage(vec!["list".to_string(), "runningvms".to_string()])
            .await
            .context("listing running VMs")?;
        Ok(parse_vm_list(&output))
    }

    async fn map_shared_folder(
        &self,
        name: &str,
        host_path: &Path,
        share_name: &str,
    ) -> Result<()> {
        self.manage(vec![
            "sharedfolder".to_string(),
            "add".to_string(),
            name.to_string(),
            "--name".to_string(),
            share_name.to_string(),
            "--hostpath".to_string(),
            host_path.display().to_string(),
            "--transient".to_string(),
        ])
        .await
        .with_context(|| format!("adding shared folder {} to {}", share_name, name))?;
        Ok(())
    }

    async fn unmap_shared_folder(&self, name: &str, share_name: &str) -> Result<()> {
        self.manage(vec![
            "sharedfolder".to_string(),
            "remove".to_string(),
            name.to_string(),
            "--name".to_string(),
            share_name.to_string(),
            "--transient".to_string(),
        ])
        .await
        .with_context(|| format!("removing shared folder {} from {}", share_name, name))?;
        Ok(())
    }

    async fn run_in_guest(
        &self,
        name: &str,
        credentials: &GuestCredentials,
        exe: &str,
        args: &[String],
        env: &[(String, String)],
    ) -> Result<String> {
        if credentials.username.is_empty() {
            bail!("guest username is empty");
        }

        let mut argv = vec![
            "guestcontrol".to_string(),
            name.to_string(),
            "run".to_string(),
            "--username".to_string(),
            credentials.username.clone(),
            "--password".to_string(),
            credentials.password.clone(),
            "--exe".to_string(),
            exe.to_string(),
        ];
        for (key, value) in env {
            argv.push("--putenv".to_string());
            argv.push(format!("{}={}", key, value));
        }
        argv.push("--wait-stdout".to_string());
        argv.push("--wait-stderr".to_string());
        argv.push("--".to_string());
        argv.push(exe.to_string());
        argv.extend(args.iter().cloned());

        self.manage(argv)
            .await
            .with_context(|| format!("running {} in guest {}", exe, name))
    }
}

/// Parse `VBoxManage list runningvms` output: one `"name" {uuid}` per line
fn parse_vm_list(output: &str) -> HashSet<String> {
    output
        .lines()
        .filter_map(|line| line.split('"').nth(1))
        .map(str::to_string)
        .collect()
}
