//! External process invocation

pub mod command;
pub mod subprocess;

use async_trait::async_trait;
pub use command::{CommandResult, CommandSpec};
pub use subprocess::SubprocessRunner;
use thiserror::Error;

/// Why an executable could not be started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchFailure {
    NotFound,
    PermissionDenied,
    Other,
}

/// The executable could not be started at all
///
/// A non-zero exit is not a launch error; it is reported through
/// [`CommandResult`].
#[derive(Debug, Clone, Error)]
#[error("failed to launch '{program}': {message}")]
pub struct ExecutionLaunchError {
    pub program: String,
    pub kind: LaunchFailure,
    pub message: String,
}

impl ExecutionLaunchError {
    pub fn from_io(program: &str, err: &std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => LaunchFailure::NotFound,
            std::io::ErrorKind::PermissionDenied => LaunchFailure::PermissionDenied,
            _ => LaunchFailure::Other,
        };
        Self {
            program: program.to_string(),
            kind,
            message: err.to_string(),
        }
    }
}

/// Trait for running external commands - allows for different implementations
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion (or until its deadline)
    async fn run(&self, spec: &CommandSpec) -> Result<CommandResult, ExecutionLaunchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_error_kind_from_io() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let launch = ExecutionLaunchError::from_io("helm", &err);
        assert_eq!(launch.kind, LaunchFailure::NotFound);
        assert!(launch.to_string().contains("helm"));

        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let launch = ExecutionLaunchError::from_io("az", &err);
        assert_eq!(launch.kind, LaunchFailure::PermissionDenied);
    }
}
