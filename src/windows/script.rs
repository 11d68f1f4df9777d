//! Guest batch-script assembly.
//!
//! Batch interpreters keep going after a failed command, so every appended
//! command is followed by its own guard line that aborts the remainder of
//! the script with the failing exit status. One unguarded `git clone` would
//! otherwise be silently followed by a build against an empty checkout.

/// Aborts the rest of the script with the previous command's exit status
pub const GUARD: &str = "if %errorlevel% neq 0 exit /b %errorlevel%";

/// Append-only sequence of guarded guest commands
#[derive(Debug, Clone, Default)]
pub struct GuestScript {
    lines: Vec<String>,
}

impl GuestScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one command line plus its guard line. Arguments containing
    /// whitespace are quoted; others are passed through untouched.
    pub fn append(&mut self, command: &str, args: &[&str]) {
        let mut line = quote(command);
        for arg in args {
            line.push(' ');
            line.push_str(&quote(arg));
        }
        self.lines.push(line);
        self.lines.push(GUARD.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The accumulated command/guard lines, CRLF-joined
    pub fn text(&self) -> String {
        self.lines.join("\r\n")
    }

    /// Finalize into a runnable batch: toolchain environment initialization
    /// for the given architecture, a working-directory change, then the
    /// accumulated commands.
    pub fn finalize(&self, vcvars_path: &str, vcvars_arch: &str, workdir: &str) -> String {
        let mut out = Vec::with_capacity(self.lines.len() + 5);
        out.push("@echo off".to_string());
        out.push(format!("call {} {}", quote(vcvars_path), vcvars_arch));
        out.push(GUARD.to_string());
        out.push(format!("cd /d {}", quote(workdir)));
        out.push(GUARD.to_string());
        out.extend(self.lines.iter().cloned());
        let mut text = out.join("\r\n");
        text.push_str("\r\n");
        text
    }
}

fn quote(arg: &str) -> String {
    if arg.contains(char::is_whitespace) {
        format!("\"{}\"", arg)
    } else {
        arg.to_string()
    }
}
