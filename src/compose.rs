//! Boundary to the external container-orchestration tool.
//!
//! Only exit status crosses this boundary; tool output is passed through to
//! the terminal and never parsed.
use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

pub const DEFAULT_COMPOSE_COMMAND: &str = "docker compose";

pub const TEARDOWN_ARGS: [&str; 4] = ["down", "-v", "--rmi", "local"];
pub const LAUNCH_ARGS: [&str; 2] = ["up", "-d"];
pub const VERSION_ARGS: [&str; 1] = ["version"];

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How a tool invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    Exited(Option<i32>),
    TimedOut(Duration),
}

impl ToolStatus {
    pub fn success(self) -> bool {
        matches!(self, ToolStatus::Exited(Some(0)))
    }
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolStatus::Exited(Some(code)) => write!(f, "exit code {code}"),
            ToolStatus::Exited(None) => f.write_str("terminated by signal"),
            ToolStatus::TimedOut(limit) => write!(f, "timed out after {}s", limit.as_secs()),
        }
    }
}

/// Something that can run compose subcommands in a workspace.
pub trait ComposeBackend {
    /// Human-readable command line for `args`, used in logs and errors.
    fn describe(&self, args: &[&str]) -> String;

    /// Run `args` with `cwd` as the working directory.
    ///
    /// `Err` means the tool could not be started at all.
    fn run(&self, args: &[&str], cwd: &Path) -> Result<ToolStatus>;
}

/// The real tool, e.g. `docker compose`, invoked as a child process.
#[derive(Debug, Clone)]
pub struct ComposeCommand {
    program: String,
    prefix: Vec<String>,
    timeout: Option<Duration>,
    quiet: bool,
}

impl ComposeCommand {
    /// Parse a shell-words command line such as `docker compose`.
    pub fn parse(command: &str, timeout: Option<Duration>) -> Result<Self> {
        let mut words = shell_words::split(command)
            .with_context(|| format!("parse compose command: {command}"))?;
        if words.is_empty() {
            return Err(anyhow!("compose command must not be empty"));
        }
        let program = words.remove(0);
        Ok(Self {
            program,
            prefix: words,
            timeout,
            quiet: false,
        })
    }

    /// Discard the child's stdout and stderr.
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn prefix(&self) -> &[String] {
        &self.prefix
    }

    fn argv(&self, args: &[&str]) -> Vec<String> {
        let mut argv = Vec::with_capacity(1 + self.prefix.len() + args.len());
        argv.push(self.program.clone());
        argv.extend(self.prefix.iter().cloned());
        argv.extend(args.iter().map(|arg| arg.to_string()));
        argv
    }
}

impl ComposeBackend for ComposeCommand {
    fn describe(&self, args: &[&str]) -> String {
        shell_words::join(self.argv(args))
    }

    fn run(&self, args: &[&str], cwd: &Path) -> Result<ToolStatus> {
        let command_line = self.describe(args);
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.prefix).args(args).current_dir(cwd);
        if self.quiet {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
        tracing::debug!(command = %command_line, cwd = %cwd.display(), "running tool");

        let start = Instant::now();
        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawn {command_line}"))?;
        let Some(timeout) = self.timeout else {
            let status = child
                .wait()
                .with_context(|| format!("wait for {command_line}"))?;
            return Ok(ToolStatus::Exited(status.code()));
        };

        loop {
            if let Some(status) = child
                .try_wait()
                .with_context(|| format!("check {command_line}"))?
            {
                tracing::debug!(
                    command = %command_line,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "tool finished"
                );
                return Ok(ToolStatus::Exited(status.code()));
            }
            if start.elapsed() > timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Ok(ToolStatus::TimedOut(timeout));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;

    /// Records every invocation and answers with a fixed status.
    pub(crate) struct RecordingBackend {
        pub(crate) calls: RefCell<Vec<Vec<String>>>,
        pub(crate) status: ToolStatus,
    }

    impl RecordingBackend {
        pub(crate) fn new(status: ToolStatus) -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                status,
            }
        }

        pub(crate) fn succeeding() -> Self {
            Self::new(ToolStatus::Exited(Some(0)))
        }

        pub(crate) fn count(&self, args: &[&str]) -> usize {
            self.calls
                .borrow()
                .iter()
                .filter(|call| call.iter().map(String::as_str).eq(args.iter().copied()))
                .count()
        }
    }

    impl ComposeBackend for RecordingBackend {
        fn describe(&self, args: &[&str]) -> String {
            format!("fake compose {}", args.join(" "))
        }

        fn run(&self, args: &[&str], _cwd: &Path) -> Result<ToolStatus> {
            self.calls
                .borrow_mut()
                .push(args.iter().map(|arg| arg.to_string()).collect());
            Ok(self.status)
        }
    }
}
