//! Windows build driver.
//!
//! Owns the lifecycle of one remote build session: reset the VM to its base
//! snapshot so every build starts from an identical OS image, start it and
//! poll for guest responsiveness, map the host build directory as a network
//! drive (the hypervisor's shared-folder plumbing is flaky right after
//! boot, hence the retry loop), run the accumulated guest script with
//! progress heartbeats, and always return the VM to a stopped state.

use anyhow::{bail, Context, Result};
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::process::RunError;
use crate::vbox::{ControlChannel, GuestCredentials};
use crate::windows::script::GuestScript;

/// Name of the temporary script file written to the shared host directory
pub const SCRIPT_FILE: &str = "nightforge-build.cmd";

/// Guest environment variable carrying the signing-key identifier
pub const SIGNING_KEY_VAR: &str = "SIGNING_KEY_ID";

const CMD_EXE: &str = "C:\\Windows\\System32\\cmd.exe";
const PING_EXE: &str = "C:\\Windows\\System32\\ping.exe";

/// Polling intervals, settle delays, and deadlines for one session.
///
/// The defaults are empirical values tuned for VirtualBox; they encode no
/// invariant and can be overridden from configuration.
#[derive(Debug, Clone)]
pub struct DriverTimings {
    /// Wait after stopping a VM before touching it again (session unlock)
    pub settle_delay: Duration,
    /// Delay between guest responsiveness probes
    pub boot_poll_interval: Duration,
    /// Overall deadline for the guest to become responsive
    pub boot_timeout: Duration,
    /// Shared-folder mapping attempts before giving up
    pub map_attempts: u32,
    /// Wait after creating a mapping before verifying it
    pub map_settle: Duration,
    /// Delay between shutdown polls
    pub shutdown_poll_interval: Duration,
    /// How long to wait for a clean shutdown before forcing power-off
    pub shutdown_timeout: Duration,
    /// Interval between still-running log messages during a guest build
    pub heartbeat_interval: Duration,
}

impl Default for DriverTimings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(5),
            boot_poll_interval: Duration::from_secs(3),
            boot_timeout: Duration::from_secs(90),
            map_attempts: 5,
            map_settle: Duration::from_secs(5),
            shutdown_poll_interval: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(20),
            heartbeat_interval: Duration::from_secs(60),
        }
    }
}

/// Startup failure classes the orchestrator tells apart when deciding
/// whether retrying a whole session is worthwhile
#[derive(Debug)]
pub enum StartError {
    VmStart(String),
    DriveMapping(String),
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartError::VmStart(detail) => write!(f, "unable to start VM: {}", detail),
            StartError::DriveMapping(detail) => {
                write!(f, "unable to map network drive: {}", detail)
            }
        }
    }
}

impl std::error::Error for StartError {}

/// Everything a remote build session needs, supplied by the caller
#[derive(Debug, Clone)]
pub struct WinSession {
    pub vm_name: String,
    pub credentials: GuestCredentials,
    /// Host directory exposed to the guest
    pub host_dir: PathBuf,
    pub share_name: String,
    /// Drive letter the guest maps the share to, e.g. "Z:"
    pub drive: String,
    /// Guest path of the vendor toolchain initialization script
    pub vcvars_path: String,
    /// Guest working directory the finalized script changes into
    pub guest_workdir: String,
    /// Signing-key identifier, injected as a guest environment variable
    pub signing_key: String,
    /// Extra guest environment variables
    pub guest_env: Vec<(String, String)>,
}

/// One remote build session against a disposable Windows VM
pub struct WinBuilder<C> {
    channel: C,
    session: WinSession,
    script: GuestScript,
    timings: DriverTimings,
}

impl<C: ControlChannel> WinBuilder<C> {
    pub fn new(channel: C, session: WinSession) -> Self {
        Self {
            channel,
            session,
            script: GuestScript::new(),
            timings: DriverTimings::default(),
        }
    }

    pub fn with_timings(mut self, timings: DriverTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Whether the session's VM is currently in the hypervisor's running set.
    /// A transient query failure propagates; there is no retry here.
    pub async fn is_running(&self) -> Result<bool> {
        let running = self.channel.list_running().await?;
        Ok(running.contains(&self.session.vm_name))
    }

    /// Append one guarded command line to the session's guest script
    pub fn append_script(&mut self, command: &str, args: &[&str]) {
        self.script.append(command, args);
    }

    /// Prepare the VM: stop a leftover instance, restore the base snapshot,
    /// boot, wait for the guest, and map the build share.
    ///
    /// Fails with [`StartError::VmStart`] when the guest never becomes
    /// responsive and [`StartError::DriveMapping`] when all mapping attempts
    /// are exhausted. Neither is retried here.
    pub async fn start(&self) -> Result<()> {
        let s = &self.session;

        // A build must never begin against a VM in unknown state.
        if self.is_running().await.context("checking for a running VM")? {
            info!(target: "windows", vm = %s.vm_name, "VM already running, stopping it first");
            self.stop().await;
            if self.is_running().await.context("checking for a running VM")? {
                bail!(
                    "VM {} still running after stop, refusing to restore its snapshot",
                    s.vm_name
                );
            }
        }

        // The hypervisor holds the session lock briefly after power-off.
        sleep(self.timings.settle_delay).await;

        self.channel
            .snapshot_restore(&s.vm_name)
            .await
            .with_context(|| format!("restoring base snapshot of {}", s.vm_name))?;

        self.channel
            .start(&s.vm_name)
            .await
            .with_context(|| format!("starting VM {}", s.vm_name))?;

        self.wait_for_guest().await?;
        self.map_build_share().await?;

        info!(target: "windows", vm = %s.vm_name, share = %s.share_name, drive = %s.drive, "VM ready, build share mapped");
        Ok(())
    }

    /// Poll the guest with a loopback probe until it responds or the boot
    /// deadline passes
    async fn wait_for_guest(&self) -> Result<()> {
        let s = &self.session;
        let started = Instant::now();
        let deadline = started + self.timings.boot_timeout;
        let args = ["-n".to_string(), "1".to_string(), "127.0.0.1".to_string()];

        loop {
            match self
                .channel
                .run_in_guest(&s.vm_name, &s.credentials, PING_EXE, &args, &[])
                .await
            {
                Ok(_) => {
                    info!(
                        target: "windows",
                        vm = %s.vm_name,
                        elapsed_secs = started.elapsed().as_secs(),
                        "guest responding"
                    );
                    return Ok(());
                }
                Err(e) => {
                    debug!(target: "windows", vm = %s.vm_name, error = %e, "guest not ready yet")
                }
            }

            if Instant::now() >= deadline {
                return Err(StartError::VmStart(format!(
                    "{} did not respond within {:?}",
                    s.vm_name, self.timings.boot_timeout
                ))
                .into());
            }
            sleep(self.timings.boot_poll_interval).await;
        }
    }

    /// Map the host build directory into the guest, retrying because the
    /// shared-folder feature is asynchronous and occasionally fails right
    /// after boot. Each attempt removes any stale mapping, creates a fresh
    /// one, settles, then verifies by addressing the mapped drive.
    async fn map_build_share(&self) -> Result<()> {
        let s = &self.session;
        let verify_args = [
            "/C".to_string(),
            "dir".to_string(),
            format!("{}\\", s.drive),
        ];

        for attempt in 1..=self.timings.map_attempts {
            // Best-effort cleanup of a stale mapping; errors intentionally discarded.
            let _ = self
                .channel
                .unmap_shared_folder(&s.vm_name, &s.share_name)
                .await;

            if let Err(e) = self
                .channel
                .map_shared_folder(&s.vm_name, &s.host_dir, &s.share_name)
                .await
            {
                warn!(target: "windows", vm = %s.vm_name, attempt, error = %e, "shared folder add failed");
                continue;
            }

            sleep(self.timings.map_settle).await;

            match self
                .channel
                .run_in_guest(&s.vm_name, &s.credentials, CMD_EXE, &verify_args, &[])
                .await
            {
                Ok(_) => {
                    info!(target: "windows", vm = %s.vm_name, attempt, drive = %s.drive, "build share mapped");
                    return Ok(());
                }
                Err(e) => {
                    warn!(target: "windows", vm = %s.vm_name, attempt, error = %e, "mapped drive not addressable")
                }
            }
        }

        Err(StartError::DriveMapping(format!(
            "{} not addressable in {} after {} attempts",
            s.drive, s.vm_name, self.timings.map_attempts
        ))
        .into())
    }

    /// Write the finalized script onto the shared directory, execute it in
    /// the guest with the signing key and extra environment injected, and
    /// delete the script file again no matter how execution went.
    ///
    /// Guest script failures are not retried: a flaky build that "succeeds"
    /// on a blind second run is not an artifact anyone should ship.
    pub async fn run_script(&self, vcvars_arch: &str) -> Result<()> {
        let s = &self.session;
        let text = self
            .script
            .finalize(&s.vcvars_path, vcvars_arch, &s.guest_workdir);

        let host_script = s.host_dir.join(SCRIPT_FILE);
        tokio::fs::write(&host_script, text.as_bytes())
            .await
            .with_context(|| format!("writing build script to {}", host_script.display()))?;

        let mut env: Vec<(String, String)> =
            vec![(SIGNING_KEY_VAR.to_string(), s.signing_key.clone())];
        env.extend(s.guest_env.iter().cloned());

        // Remote builds run for tens of minutes to hours; keep proof of life
        // in the log while the guest works.
        let vm = s.vm_name.clone();
        let interval = self.timings.heartbeat_interval;
        let heartbeat = tokio::spawn(async move {
            let started = Instant::now();
            loop {
                sleep(interval).await;
                info!(
                    target: "windows",
                    vm = %vm,
                    elapsed_secs = started.elapsed().as_secs(),
                    "build still running"
                );
            }
        });

        let guest_script = format!("{}\\{}", s.drive, SCRIPT_FILE);
        info!(target: "windows", vm = %s.vm_name, script = %guest_script, "executing build script in guest");

        let result = self
            .channel
            .run_in_guest(
                &s.vm_name,
                &s.credentials,
                CMD_EXE,
                &["/C".to_string(), guest_script],
                &env,
            )
            .await;

        heartbeat.abort();

        // Never leak a stale script into the next session's shared folder.
        if let Err(e) = tokio::fs::remove_file(&host_script).await {
            warn!(target: "windows", script = %host_script.display(), error = %e, "failed to remove build script");
        }

        match result {
            Ok(output) => {
                info!(target: "windows", vm = %s.vm_name, "guest build finished");
                debug!(target: "windows", vm = %s.vm_name, "guest output:\n{}", output.trim_end());
                Ok(())
            }
            Err(e) => {
                if let Some(run_err) = e.downcast_ref::<RunError>() {
                    warn!(target: "windows", vm = %s.vm_name, code = run_err.code, "guest build failed");
                }
                Err(e.context(format!("guest build failed on {}", s.vm_name)))
            }
        }
    }

    /// Shut the VM down. Idempotent and infallible: ACPI power signal, a
    /// bounded wait for the VM to leave the running set, then a best-effort
    /// forced power-off. Callers invoke this on every exit path.
    pub async fn stop(&self) {
        let s = &self.session;

        if let Err(e) = self.channel.power_button(&s.vm_name).await {
            warn!(target: "windows", vm = %s.vm_name, error = %e, "ACPI power signal failed");
        }

        let deadline = Instant::now() + self.timings.shutdown_timeout;
        loop {
            match self.channel.list_running().await {
                Ok(running) if !running.contains(&s.vm_name) => {
                    info!(target: "windows", vm = %s.vm_name, "VM shut down cleanly");
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(target: "windows", vm = %s.vm_name, error = %e, "could not query running VMs")
                }
            }
            if Instant::now() >= deadline {
                break;
            }
            sleep(self.timings.shutdown_poll_interval).await;
        }

        // Best-effort; nothing further to do if this fails as well.
        match self.channel.force_power_off(&s.vm_name).await {
            Ok(()) => {
                info!(target: "windows", vm = %s.vm_name, "VM forced off after shutdown timeout")
            }
            Err(e) => {
                warn!(target: "windows", vm = %s.vm_name, error = %e, "forced power-off failed")
            }
        }
    }
}
