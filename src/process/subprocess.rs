//! Subprocess runner built on tokio::process

use crate::process::{CommandResult, CommandRunner, CommandSpec, ExecutionLaunchError};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Runs commands as child processes of this process
#[derive(Debug, Clone, Default)]
pub struct SubprocessRunner;

impl SubprocessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SubprocessRunner {
    /// Spawn the command and wait for it
    ///
    /// With a deadline set, the child is killed once the deadline expires and
    /// the result is flagged `deadline_exceeded` instead of raising.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandResult, ExecutionLaunchError> {
        debug!("Running: {}", spec.display());

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }
        for (key, value) in &spec.env {
            command.env(key, value);
        }

        let started = Instant::now();
        let child = command
            .spawn()
            .map_err(|e| ExecutionLaunchError::from_io(&spec.program, &e))?;

        // Dropping the wait future on expiry drops the child, which kills it
        let output = match spec.deadline {
            Some(deadline) => match timeout(deadline, child.wait_with_output()).await {
                Ok(output) => output,
                Err(_) => {
                    warn!(
                        "{} did not finish within {}s, killed",
                        spec.program,
                        deadline.as_secs()
                    );
                    return Ok(CommandResult::timed_out(started.elapsed()));
                }
            },
            None => child.wait_with_output().await,
        }
        .map_err(|e| ExecutionLaunchError::from_io(&spec.program, &e))?;

        let result = CommandResult {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            elapsed: started.elapsed(),
            deadline_exceeded: false,
        };

        debug!(
            "{} exited with {:?} after {}ms",
            spec.program,
            result.exit_code,
            result.elapsed.as_millis()
        );

        Ok(result)
    }
}
