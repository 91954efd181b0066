//! External command execution.
//!
//! Every shell-out in this crate (pacman, systemctl, the privileged helper)
//! goes through the [`CommandRunner`] trait so callers always observe an exit
//! status and tests can substitute a scripted runner.
//!
//! # Example
//!
//! ```rust,ignore
//! use kernel_manager::process::{CommandRunner, CommandSpec, SystemRunner};
//!
//! let out = SystemRunner.run(&CommandSpec::new("systemctl").args(["is-active", "scx"]))?;
//! if out.success() {
//!     println!("scx is running");
//! }
//! ```

use anyhow::{bail, Context, Result};
use std::fmt;
use std::process::Command;
use tracing::{debug, warn};

/// A program and its arguments, executed without an intermediate shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Split a simple command line on whitespace. No quoting is honoured.
    pub fn from_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program).args(parts))
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(|c: char| c.is_whitespace() || c == '\'' || c == '"') {
                write!(f, " '{}'", arg.replace('\'', r"'\''"))?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turn a non-zero exit into an error mentioning `what`.
    pub fn ensure_success(self, what: &str) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        let code = self
            .code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            bail!("{} failed (exit {})", what, code);
        }
        bail!("{} failed (exit {}): {}", what, code, stderr)
    }
}

/// Executes commands and reports how they finished.
pub trait CommandRunner: Send + Sync {
    fn run(&self, cmd: &CommandSpec) -> Result<CommandOutput>;
}

/// Runs commands on the host via [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &CommandSpec) -> Result<CommandOutput> {
        debug!(command = %cmd, "running");
        let output = Command::new(&cmd.program)
            .args(&cmd.args)
            .output()
            .with_context(|| format!("spawning '{}'", cmd))?;
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Run a whitespace-separated command line and return its stdout without the
/// trailing newline. Any failure reads as an empty string.
///
/// The exit code is ignored on purpose: `systemctl is-enabled` exits non-zero
/// while still printing the state we want.
pub fn exec(runner: &dyn CommandRunner, line: &str) -> String {
    let Some(cmd) = CommandSpec::from_line(line) else {
        return String::new();
    };
    match runner.run(&cmd) {
        Ok(out) => out.stdout.trim_end_matches('\n').to_string(),
        Err(e) => {
            warn!("failed to run '{}': {:#}", line, e);
            String::new()
        }
    }
}

/// Wraps commands in an authentication-gated launcher such as `pkexec`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Privileged {
    helper: Option<String>,
}

impl Privileged {
    /// Always route through `helper`.
    pub fn new(helper: impl Into<String>) -> Self {
        Self {
            helper: Some(helper.into()),
        }
    }

    /// Run commands as-is.
    pub fn direct() -> Self {
        Self { helper: None }
    }

    /// Use `helper` unless this process already has root privileges.
    pub fn detect(helper: impl Into<String>) -> Self {
        if running_as_root() {
            Self::direct()
        } else {
            Self::new(helper)
        }
    }

    pub fn wrap(&self, cmd: CommandSpec) -> CommandSpec {
        match &self.helper {
            Some(helper) => CommandSpec::new(helper.clone())
                .arg(cmd.program)
                .args(cmd.args),
            None => cmd,
        }
    }
}

pub fn running_as_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Answers commands from a script and records everything it was asked to run.
    #[derive(Default)]
    pub(crate) struct ScriptedRunner {
        responses: Mutex<Vec<(String, VecDeque<CommandOutput>)>>,
        pub(crate) calls: Mutex<Vec<CommandSpec>>,
    }

    impl ScriptedRunner {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// Queue `stdout`/`code` for the next command whose rendered line starts with `prefix`.
        pub(crate) fn respond(&self, prefix: &str, code: i32, stdout: &str) -> &Self {
            let output = CommandOutput {
                code: Some(code),
                stdout: stdout.to_string(),
                stderr: String::new(),
            };
            let mut responses = self.responses.lock().unwrap();
            match responses.iter_mut().find(|(p, _)| p == prefix) {
                Some((_, queue)) => queue.push_back(output),
                None => responses.push((prefix.to_string(), VecDeque::from([output]))),
            }
            self
        }

        pub(crate) fn lines(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|c| c.to_string())
                .collect()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, cmd: &CommandSpec) -> Result<CommandOutput> {
            self.calls.lock().unwrap().push(cmd.clone());
            let line = cmd.to_string();
            let mut responses = self.responses.lock().unwrap();
            for (prefix, queue) in responses.iter_mut() {
                if line.starts_with(prefix.as_str()) {
                    if queue.len() > 1 {
                        return Ok(queue.pop_front().unwrap());
                    }
                    return Ok(queue.front().cloned().unwrap());
                }
            }
            Ok(CommandOutput {
                code: Some(0),
                ..Default::default()
            })
        }
    }
}
