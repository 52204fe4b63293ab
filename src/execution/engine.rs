//! Main execution engine - drives a pipeline run from start to outcome

use crate::{
    core::{Pipeline, PipelineContext, PipelineRun, RunOutcome},
    execution::{ExecutionResult, StepExecutor},
    process::CommandRunner,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        run_id: Uuid,
        pipeline_name: String,
        total_steps: usize,
    },
    StepStarted {
        step_name: String,
        description: String,
        index: usize,
    },
    StepRetrying {
        step_name: String,
        attempt: u32,
        max_attempts: u32,
    },
    StepCompleted {
        step_name: String,
        attempts: u32,
    },
    StepDeadlineTolerated {
        step_name: String,
        warning: String,
    },
    StepFailed {
        step_name: String,
        error: String,
    },
    PipelineFinished {
        run_id: Uuid,
        outcome: RunOutcome,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Main pipeline execution engine
///
/// Steps run strictly in order; the first fatal failure aborts the run and
/// nothing after it is attempted.
pub struct ExecutionEngine<R> {
    executor: StepExecutor<R>,
    event_handlers: Vec<EventHandler>,
}

impl<R: CommandRunner> ExecutionEngine<R> {
    pub fn new(runner: R) -> Self {
        Self {
            executor: StepExecutor::new(runner),
            event_handlers: Vec::new(),
        }
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    pub fn runner(&self) -> &R {
        self.executor.runner()
    }

    /// Emit an event to all handlers
    fn emit_event(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Execute the entire pipeline
    pub async fn execute(&self, pipeline: &Pipeline, context: &PipelineContext) -> PipelineRun {
        let mut run = PipelineRun::new(pipeline);

        info!("Starting pipeline execution: {} ({})", pipeline.name, run.run_id);
        self.emit_event(ExecutionEvent::PipelineStarted {
            run_id: run.run_id,
            pipeline_name: pipeline.name.clone(),
            total_steps: pipeline.len(),
        });

        run.start();

        for (index, step) in pipeline.steps.iter().enumerate() {
            run.enter_step(index);
            self.emit_event(ExecutionEvent::StepStarted {
                step_name: step.name.clone(),
                description: step.description.clone(),
                index,
            });

            let max_attempts = step.retry.max_attempts;
            let on_attempt = |attempt: u32| {
                if attempt > 1 {
                    self.emit_event(ExecutionEvent::StepRetrying {
                        step_name: step.name.clone(),
                        attempt,
                        max_attempts,
                    });
                }
            };

            let result = self
                .executor
                .execute(step, context, &run.outputs, &on_attempt)
                .await;

            match result {
                ExecutionResult::Success { output, attempts } => {
                    for (key, value) in output.values {
                        run.outputs.insert(key, value);
                    }
                    run.succeed_step(index, attempts);
                    self.emit_event(ExecutionEvent::StepCompleted {
                        step_name: step.name.clone(),
                        attempts,
                    });
                }
                ExecutionResult::ToleratedTimeout { error, attempts } => {
                    let warning = format!("{}; continuing as if it succeeded", error);
                    warn!("{}", warning);
                    run.tolerate_timeout(index, attempts, warning.clone());
                    self.emit_event(ExecutionEvent::StepDeadlineTolerated {
                        step_name: step.name.clone(),
                        warning,
                    });
                }
                ExecutionResult::Failed { error, attempts } => {
                    self.emit_event(ExecutionEvent::StepFailed {
                        step_name: step.name.clone(),
                        error: error.to_string(),
                    });
                    run.abort(index, attempts, error);
                    break;
                }
            }
        }

        if run.outcome().is_none() {
            run.complete();
        }

        match run.outcome() {
            Some(outcome) => {
                match &outcome {
                    RunOutcome::Completed => {
                        info!("Pipeline execution finished: {} - Completed", pipeline.name)
                    }
                    RunOutcome::AbortedAtStep { step, cause } => error!(
                        "Pipeline execution finished: {} - Aborted at {}: {}",
                        pipeline.name, step, cause
                    ),
                }
                self.emit_event(ExecutionEvent::PipelineFinished {
                    run_id: run.run_id,
                    outcome,
                });
            }
            None => error!("Pipeline {} ended without an outcome", pipeline.name),
        }

        run
    }
}
