//! Uniform external-process execution.
//!
//! Every external tool the orchestrator drives (git, VBoxManage, docker,
//! rsync, the local build toolchain) goes through [`run`]: spawn, stream
//! combined output live into tracing, and return a structured error carrying
//! the captured output plus the numeric exit code on non-zero exit.

use anyhow::{Context, Result};
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::info;

/// Description of one external command invocation
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl RunSpec {
    pub fn new(
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            env: Vec::new(),
        }
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Captured output of a successful run
#[derive(Debug)]
pub struct RunOutput {
    pub output: String,
}

/// Non-zero exit, with everything needed for offline diagnosis
#[derive(Debug)]
pub struct RunError {
    pub program: String,
    pub code: i32,
    pub output: String,
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.output.is_empty() {
            write!(f, "{} exited with status {}", self.program, self.code)
        } else {
            write!(
                f,
                "{} exited with status {}:\n{}",
                self.program,
                self.code,
                self.output.trim_end()
            )
        }
    }
}

impl std::error::Error for RunError {}

/// Run an external command to completion.
///
/// stdout and stderr are read concurrently, logged line by line under the
/// `proc` target, and accumulated into one combined buffer (stdout first,
/// stderr appended after).
pub async fn run(spec: &RunSpec) -> Result<RunOutput> {
    info!(target: "proc", program = %spec.program, args = ?spec.args, "running");

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args);
    if let Some(dir) = &spec.cwd {
        cmd.current_dir(dir);
    }
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.stdin(Stdio::null());

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning {}", spec.program))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let program = spec.program.clone();
    let out_fut = async {
        let mut buf = String::new();
        if let Some(stdout) = stdout {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(target: "proc", program = %program, "{}", line);
                buf.push_str(&line);
                buf.push('\n');
            }
        }
        buf
    };

    let program = spec.program.clone();
    let err_fut = async {
        let mut buf = String::new();
        if let Some(stderr) = stderr {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(target: "proc", program = %program, "{}", line);
                buf.push_str(&line);
                buf.push('\n');
            }
        }
        buf
    };

    let (stdout_buf, stderr_buf, status) = tokio::join!(out_fut, err_fut, child.wait());
    let status = status.with_context(|| format!("waiting for {}", spec.program))?;

    let mut output = stdout_buf;
    output.push_str(&stderr_buf);

    if status.success() {
        Ok(RunOutput { output })
    } else {
        Err(RunError {
            program: spec.program.clone(),
            code: status.code().unwrap_or(-1),
            output,
        }
        .into())
    }
}
