//! Command specification and result types

use std::path::PathBuf;
use std::time::Duration;

/// A single external command invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    /// Path to (or name of) the executable
    pub program: String,

    /// Ordered argument list
    pub args: Vec<String>,

    /// Working directory for the child
    pub working_dir: Option<PathBuf>,

    /// Kill the child if it runs longer than this
    pub deadline: Option<Duration>,

    /// Extra environment for this invocation only
    pub env: Vec<(String, String)>,

    /// Values masked when the command line is logged
    pub redact: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
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

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn redact(mut self, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.redact.push(value);
        }
        self
    }

    /// Whether `flag` appears in the argument list
    pub fn has_arg(&self, flag: &str) -> bool {
        self.args.iter().any(|a| a == flag)
    }

    /// Value following `flag` in the argument list
    pub fn arg_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    /// Render the command line for logs, masking redacted values
    pub fn display(&self) -> String {
        let mut line = std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        for secret in &self.redact {
            line = line.replace(secret.as_str(), "***");
        }
        line
    }
}

/// Outcome of a command that was started
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    /// Exit code; `None` when killed (deadline) or terminated by a signal
    pub exit_code: Option<i32>,

    pub stdout: String,

    pub stderr: String,

    pub elapsed: Duration,

    /// The child was killed because its deadline expired
    pub deadline_exceeded: bool,
}

impl CommandResult {
    /// A finished command with the given exit code
    pub fn exited(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: stdout.into(),
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    /// A command killed at its deadline
    pub fn timed_out(elapsed: Duration) -> Self {
        Self {
            exit_code: None,
            elapsed,
            deadline_exceeded: true,
            ..Default::default()
        }
    }

    /// Exit code zero and not killed
    pub fn success(&self) -> bool {
        !self.deadline_exceeded && self.exit_code == Some(0)
    }

    /// Exit code for error reporting (-1 when not meaningful)
    pub fn code(&self) -> i32 {
        self.exit_code.unwrap_or(-1)
    }

    /// Stdout with surrounding whitespace removed (for `-o tsv` lookups)
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Stderr with surrounding whitespace removed
    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }
}
