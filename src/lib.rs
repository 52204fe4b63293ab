//! arc-onboard - connects Kubernetes clusters to Azure Arc
//!
//! A fixed sequence of steps drives the package-manager client and the
//! cloud CLI. Steps run one after another; the first fatal failure aborts
//! the run.

pub mod artifact;
pub mod cli;
pub mod core;
pub mod error;
pub mod execution;
pub mod http;
pub mod package;
pub mod process;
pub mod registry;
pub mod retry;

// Re-export commonly used types
pub use crate::core::config::ProvisioningConfig;
pub use crate::core::{FailurePolicy, Pipeline, PipelineContext, PipelineRun, RunOutcome, Step};
pub use error::ProvisionError;
pub use execution::{ExecutionEngine, ExecutionEvent};
pub use process::{CommandResult, CommandRunner, CommandSpec, SubprocessRunner};
pub use retry::RetryPolicy;
