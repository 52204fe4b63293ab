//! Pipeline execution engine

pub mod actions;
pub mod engine;
pub mod executor;
pub mod sequences;

pub use engine::{EventHandler, ExecutionEngine, ExecutionEvent};
pub use executor::{ExecutionResult, StepExecutor};
pub use sequences::{agent_install, onboarding, AgentInstallDeps};
