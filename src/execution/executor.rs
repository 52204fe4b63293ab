//! Step executor - runs a single step under its retry and failure policy

use crate::{
    core::{PipelineContext, Step, StepEnv, StepOutput, StepOutputs},
    error::ProvisionError,
    process::CommandRunner,
};
use tracing::{error, info, warn};

/// Result of executing a step
#[derive(Debug, Clone)]
pub enum ExecutionResult {
    /// Step completed successfully
    Success { output: StepOutput, attempts: u32 },
    /// Step ran past its deadline and its policy tolerates that
    ToleratedTimeout { error: ProvisionError, attempts: u32 },
    /// Step failed fatally
    Failed { error: ProvisionError, attempts: u32 },
}

impl ExecutionResult {
    pub fn attempts(&self) -> u32 {
        match self {
            ExecutionResult::Success { attempts, .. }
            | ExecutionResult::ToleratedTimeout { attempts, .. }
            | ExecutionResult::Failed { attempts, .. } => *attempts,
        }
    }
}

/// Executes a single step
pub struct StepExecutor<R> {
    runner: R,
}

impl<R: CommandRunner> StepExecutor<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Execute a step and classify its outcome
    ///
    /// `on_attempt` is called before every attempt with its 1-based number.
    pub async fn execute(
        &self,
        step: &Step,
        context: &PipelineContext,
        outputs: &StepOutputs,
        on_attempt: &(dyn Fn(u32) + Send + Sync),
    ) -> ExecutionResult {
        info!("Executing step: {}", step.name);

        let env = StepEnv {
            step_name: &step.name,
            context,
            outputs,
            runner: &self.runner,
        };
        let env = &env;

        let mut attempts = 0u32;
        let result = step
            .retry
            .execute(
                &step.name,
                |attempt| {
                    attempts = attempt;
                    on_attempt(attempt);
                    step.action.run(env)
                },
                |e: &ProvisionError| !e.is_deadline_exceeded(),
            )
            .await;

        match result {
            Ok(output) => {
                info!("Step {} completed after {} attempt(s)", step.name, attempts);
                ExecutionResult::Success { output, attempts }
            }
            Err(error) if !step.is_fatal(&error) => {
                warn!(
                    step = %step.name,
                    error = %error,
                    "Step exceeded its deadline; treating as succeeded"
                );
                ExecutionResult::ToleratedTimeout { error, attempts }
            }
            Err(error) => {
                error!(step = %step.name, attempts = attempts, error = %error, "Step failed");
                ExecutionResult::Failed { error, attempts }
            }
        }
    }
}
