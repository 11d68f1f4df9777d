// Windows build driver lifecycle tests against a scripted control channel.

use anyhow::{anyhow, Result};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

use nightforge::process::RunError;
use nightforge::vbox::{ControlChannel, GuestCredentials};
use nightforge::windows::{DriverTimings, StartError, WinBuilder, WinSession, SCRIPT_FILE};

#[derive(Default)]
struct MockState {
    running: HashSet<String>,
    ops: Vec<String>,
    ping_failures: u32,
    ping_calls: u32,
    map_failures: u32,
    map_calls: u32,
    verify_failures: u32,
    verify_calls: u32,
    acpi_fails: bool,
    acpi_stops_vm: bool,
    force_off_fails: bool,
    // Some((code, output)) makes the guest script execution fail
    script_result: Option<(i32, String)>,
    script_paths: Vec<String>,
    script_env: Vec<Vec<(String, String)>>,
    // when set, the script-run branch snapshots the host-side script file
    share_dir: Option<PathBuf>,
    script_file_seen: Option<String>,
}

#[derive(Clone)]
struct MockChannel {
    state: Arc<Mutex<MockState>>,
}

impl MockChannel {
    fn new(state: MockState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }
}

impl ControlChannel for MockChannel {
    async fn start(&self, name: &str) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        s.ops.push("start".to_string());
        s.running.insert(name.to_string());
        Ok(())
    }

    async fn snapshot_restore(&self, _name: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .ops
            .push("snapshot_restore".to_string());
        Ok(())
    }

    async fn power_button(&self, name: &str) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        s.ops.push("power_button".to_string());
        if s.acpi_fails {
            return Err(anyhow!("acpi signal rejected"));
        }
        if s.acpi_stops_vm {
            s.running.remove(name);
        }
        Ok(())
    }

    async fn force_power_off(&self, name: &str) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        s.ops.push("force_power_off".to_string());
        if s.force_off_fails {
            return Err(anyhow!("poweroff rejected"));
        }
        s.running.remove(name);
        Ok(())
    }

    async fn list_running(&self) -> Result<HashSet<String>> {
        Ok(self.state.lock().unwrap().running.clone())
    }

    async fn map_shared_folder(
        &self,
        _name: &str,
        _host_path: &std::path::Path,
        _share_name: &str,
    ) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        s.ops.push("map".to_string());
        s.map_calls += 1;
        if s.map_failures > 0 {
            s.map_failures -= 1;
            return Err(anyhow!("shared folder busy"));
        }
        Ok(())
    }

    async fn unmap_shared_folder(&self, _name: &str, _share_name: &str) -> Result<()> {
        self.state.lock().unwrap().ops.push("unmap".to_string());
        Ok(())
    }

    async fn run_in_guest(
        &self,
        _name: &str,
        _credentials: &GuestCredentials,
        exe: &str,
        args: &[String],
        env: &[(String, String)],
    ) -> Result<String> {
        let mut s = self.state.lock().unwrap();
        if exe.contains("ping") {
            s.ops.push("ping".to_string());
            s.ping_calls += 1;
            if s.ping_failures > 0 {
                s.ping_failures -= 1;
                return Err(anyhow!("guest unreachable"));
            }
            return Ok(String::new());
        }
        if args.get(1).map(String::as_str) == Some("dir") {
            s.ops.push("verify".to_string());
            s.verify_calls += 1;
            if s.verify_failures > 0 {
                s.verify_failures -= 1;
                return Err(anyhow!("drive not found"));
            }
            return Ok(String::new());
        }

        s.ops.push("script".to_string());
        s.script_paths.push(args.last().cloned().unwrap_or_default());
        s.script_env.push(env.to_vec());
        if let Some(dir) = &s.share_dir {
            s.script_file_seen = std::fs::read_to_string(dir.join(SCRIPT_FILE)).ok();
        }
        match s.script_result.clone() {
            Some((code, output)) => Err(RunError {
                program: "VBoxManage".to_string(),
                code,
                output,
            }
            .into()),
            None => Ok("build ok".to_string()),
        }
    }
}

fn fast_timings() -> DriverTimings {
    DriverTimings {
        settle_delay: Duration::from_millis(1),
        boot_poll_interval: Duration::from_millis(5),
        boot_timeout: Duration::from_millis(150),
        map_attempts: 5,
        map_settle: Duration::from_millis(1),
        shutdown_poll_interval: Duration::from_millis(5),
        shutdown_timeout: Duration::from_millis(50),
        heartbeat_interval: Duration::from_secs(60),
    }
}

fn session(host_dir: PathBuf) -> WinSession {
    WinSession {
        vm_name: "win-build".to_string(),
        credentials: GuestCredentials {
            username: "ci".to_string(),
            password: "secret".to_string(),
        },
        host_dir,
        share_name: "nightforge".to_string(),
        drive: "Z:".to_string(),
        vcvars_path: "C:\\BuildTools\\vcvarsall.bat".to_string(),
        guest_workdir: "%USERPROFILE%".to_string(),
        signing_key: "release-key-7".to_string(),
        guest_env: vec![("API_KEY".to_string(), "k".to_string())],
    }
}

fn make_builder(
    state: MockState,
    host_dir: PathBuf,
) -> (WinBuilder<MockChannel>, Arc<Mutex<MockState>>) {
    let channel = MockChannel::new(state);
    let shared = channel.state.clone();
    let builder = WinBuilder::new(channel, session(host_dir)).with_timings(fast_timings());
    (builder, shared)
}

#[tokio::test]
async fn test_start_stops_running_vm_first() {
    let share = TempDir::new().unwrap();
    let mut state = MockState::default();
    state.running.insert("win-build".to_string());
    state.acpi_stops_vm = true;
    let (builder, shared) = make_builder(state, share.path().to_path_buf());

    builder.start().await.unwrap();

    let s = shared.lock().unwrap();
    let power = s.ops.iter().position(|op| op == "power_button").unwrap();
    let restore = s.ops.iter().position(|op| op == "snapshot_restore").unwrap();
    let start = s.ops.iter().position(|op| op == "start").unwrap();
    assert!(power < restore, "stop must precede snapshot restore");
    assert!(restore < start);
}

#[tokio::test]
async fn test_start_skips_stop_when_not_running() {
    let share = TempDir::new().unwrap();
    let (builder, shared) = make_builder(MockState::default(), share.path().to_path_buf());

    builder.start().await.unwrap();

    let s = shared.lock().unwrap();
    assert!(!s.ops.contains(&"power_button".to_string()));
}

#[tokio::test]
async fn test_start_refuses_snapshot_restore_after_failed_stop() {
    let share = TempDir::new().unwrap();
    let mut state = MockState::default();
    state.running.insert("win-build".to_string());
    state.acpi_stops_vm = false;
    state.force_off_fails = true;
    let (builder, shared) = make_builder(state, share.path().to_path_buf());

    let err = builder.start().await.unwrap_err();
    assert!(err.to_string().contains("still running"));

    let s = shared.lock().unwrap();
    assert!(!s.ops.contains(&"snapshot_restore".to_string()));
}

#[tokio::test]
async fn test_mapping_retries_then_succeeds() {
    let share = TempDir::new().unwrap();
    let mut state = MockState::default();
    state.map_failures = 3;
    let (builder, shared) = make_builder(state, share.path().to_path_buf());

    builder.start().await.unwrap();

    let s = shared.lock().unwrap();
    assert_eq!(s.map_calls, 4, "three failures then one success");
    assert_eq!(s.verify_calls, 1);
}

#[tokio::test]
async fn test_mapping_exhausts_attempts() {
    let share = TempDir::new().unwrap();
    let mut state = MockState::default();
    state.map_failures = u32::MAX;
    let (builder, shared) = make_builder(state, share.path().to_path_buf());

    let err = builder.start().await.unwrap_err();
    match err.downcast_ref::<StartError>() {
        Some(StartError::DriveMapping(_)) => {}
        other => panic!("expected DriveMapping, got {:?}", other),
    }

    let s = shared.lock().unwrap();
    assert_eq!(s.map_calls, 5);
    // each attempt clears any stale mapping first
    assert_eq!(
        s.ops.iter().filter(|op| op.as_str() == "unmap").count(),
        5
    );
}

#[tokio::test]
async fn test_boot_poll_respects_timeout() {
    let share = TempDir::new().unwrap();
    let mut state = MockState::default();
    state.ping_failures = u32::MAX;
    let (builder, shared) = make_builder(state, share.path().to_path_buf());

    let started = Instant::now();
    let err = builder.start().await.unwrap_err();
    let elapsed = started.elapsed();

    match err.downcast_ref::<StartError>() {
        Some(StartError::VmStart(_)) => {}
        other => panic!("expected VmStart, got {:?}", other),
    }
    assert!(elapsed >= Duration::from_millis(150), "gave up too early");
    assert!(elapsed < Duration::from_secs(2), "did not respect deadline");

    let s = shared.lock().unwrap();
    assert_eq!(s.map_calls, 0, "mapping must not be attempted");
}

#[tokio::test]
async fn test_start_end_to_end_with_slow_guest() {
    let share = TempDir::new().unwrap();
    let mut state = MockState::default();
    state.running.insert("win-build".to_string());
    state.acpi_stops_vm = true;
    state.ping_failures = 3;
    let (builder, shared) = make_builder(state, share.path().to_path_buf());

    builder.start().await.unwrap();

    let s = shared.lock().unwrap();
    assert_eq!(s.ping_calls, 4, "three failed pings then one success");
    assert_eq!(s.map_calls, 1);
    assert!(s.ops.contains(&"power_button".to_string()));
    assert!(s.ops.contains(&"snapshot_restore".to_string()));
}

#[tokio::test]
async fn test_run_script_executes_and_cleans_up() {
    let share = TempDir::new().unwrap();
    let mut state = MockState::default();
    state.share_dir = Some(share.path().to_path_buf());
    let (mut builder, shared) = make_builder(state, share.path().to_path_buf());

    builder.append_script("git", &["clone", "https://x/y.git", "builddir"]);
    builder.append_script("cd", &["builddir"]);
    builder.run_script("amd64").await.unwrap();

    let s = shared.lock().unwrap();
    assert_eq!(s.script_paths, vec!["Z:\\nightforge-build.cmd".to_string()]);

    // the script file existed while the guest ran it...
    let seen = s.script_file_seen.as_ref().expect("script file during run");
    assert!(seen.contains("call C:\\BuildTools\\vcvarsall.bat amd64"));
    assert!(seen.contains("git clone https://x/y.git builddir"));
    assert!(seen.contains("if %errorlevel% neq 0 exit /b %errorlevel%"));

    // ...and is gone afterwards
    assert!(!share.path().join(SCRIPT_FILE).exists());

    // signing key and extra env were injected
    let env = &s.script_env[0];
    assert!(env.contains(&("SIGNING_KEY_ID".to_string(), "release-key-7".to_string())));
    assert!(env.contains(&("API_KEY".to_string(), "k".to_string())));
}

#[tokio::test]
async fn test_run_script_failure_carries_output_and_cleans_up() {
    let share = TempDir::new().unwrap();
    let mut state = MockState::default();
    state.script_result = Some((1, "error: nope".to_string()));
    let (mut builder, _shared) = make_builder(state, share.path().to_path_buf());

    builder.append_script("npm", &["run", "dist"]);
    let err = builder.run_script("amd64").await.unwrap_err();

    let run_err = err.downcast_ref::<RunError>().expect("RunError in chain");
    assert_eq!(run_err.code, 1);
    assert!(run_err.output.contains("error: nope"));
    assert!(format!("{:#}", err).contains("error: nope"));

    assert!(!share.path().join(SCRIPT_FILE).exists());
}

#[tokio::test]
async fn test_stop_clean_shutdown() {
    let share = TempDir::new().unwrap();
    let mut state = MockState::default();
    state.running.insert("win-build".to_string());
    state.acpi_stops_vm = true;
    let (builder, shared) = make_builder(state, share.path().to_path_buf());

    builder.stop().await;

    let s = shared.lock().unwrap();
    assert!(!s.running.contains("win-build"));
    assert!(!s.ops.contains(&"force_power_off".to_string()));
}

#[tokio::test]
async fn test_stop_escalates_to_forced_poweroff() {
    let share = TempDir::new().unwrap();
    let mut state = MockState::default();
    state.running.insert("win-build".to_string());
    state.acpi_stops_vm = false;
    let (builder, shared) = make_builder(state, share.path().to_path_buf());

    builder.stop().await;

    let s = shared.lock().unwrap();
    assert!(s.ops.contains(&"force_power_off".to_string()));
    assert!(!s.running.contains("win-build"));
}

#[tokio::test]
async fn test_stop_never_raises() {
    let share = TempDir::new().unwrap();
    let mut state = MockState::default();
    state.running.insert("win-build".to_string());
    state.acpi_fails = true;
    state.force_off_fails = true;
    let (builder, shared) = make_builder(state, share.path().to_path_buf());

    // both the ACPI signal and the forced power-off fail; stop still returns
    builder.stop().await;

    let s = shared.lock().unwrap();
    assert!(s.ops.contains(&"power_button".to_string()));
    assert!(s.ops.contains(&"force_power_off".to_string()));
}
