//! Execution state models

use crate::core::context::StepOutputs;
use crate::core::pipeline::Pipeline;
use crate::error::ProvisionError;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// State of a single step within a run
#[derive(Debug, Clone)]
pub enum StepStatus {
    /// Not reached yet
    Pending,
    /// Currently executing
    Running {
        started_at: DateTime<Utc>,
        attempt: u32,
    },
    /// Finished cleanly
    Succeeded {
        attempts: u32,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// Ran past its deadline under a timeout-tolerant policy
    ToleratedTimeout {
        attempts: u32,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// Failed fatally
    Failed {
        error: String,
        attempts: u32,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    /// Never attempted because an earlier step aborted the run
    Skipped { reason: String },
}

impl StepStatus {
    /// Success, including success by timeout tolerance
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            StepStatus::Succeeded { .. } | StepStatus::ToleratedTimeout { .. }
        )
    }

    /// Attempts made so far (0 if never run)
    pub fn attempts(&self) -> u32 {
        match self {
            StepStatus::Running { attempt, .. } => *attempt,
            StepStatus::Succeeded { attempts, .. }
            | StepStatus::ToleratedTimeout { attempts, .. }
            | StepStatus::Failed { attempts, .. } => *attempts,
            StepStatus::Pending | StepStatus::Skipped { .. } => 0,
        }
    }
}

/// A step's name together with its status
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub name: String,
    pub status: StepStatus,
}

/// Where a run is in its lifecycle
#[derive(Debug, Clone)]
pub enum RunState {
    Idle,
    Running { step_index: usize },
    Completed,
    Aborted { step: String, error: ProvisionError },
}

/// Terminal outcome of a run
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed,
    AbortedAtStep { step: String, cause: ProvisionError },
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }

    /// Name of the step that aborted the run
    pub fn aborted_step(&self) -> Option<&str> {
        match self {
            RunOutcome::AbortedAtStep { step, .. } => Some(step),
            RunOutcome::Completed => None,
        }
    }

    pub fn cause(&self) -> Option<&ProvisionError> {
        match self {
            RunOutcome::AbortedAtStep { cause, .. } => Some(cause),
            RunOutcome::Completed => None,
        }
    }
}

/// One execution of a pipeline; discarded after its outcome is reported
#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// Unique run ID
    pub run_id: Uuid,

    pub pipeline_name: String,

    pub state: RunState,

    /// One record per step, in pipeline order
    pub records: Vec<StepRecord>,

    /// Values produced so far
    pub outputs: StepOutputs,

    /// Non-fatal problems recorded during the run
    pub warnings: Vec<String>,

    pub started_at: Option<DateTime<Utc>>,

    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// Create an idle run for a pipeline
    pub fn new(pipeline: &Pipeline) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            pipeline_name: pipeline.name.clone(),
            state: RunState::Idle,
            records: pipeline
                .steps
                .iter()
                .map(|s| StepRecord {
                    name: s.name.clone(),
                    status: StepStatus::Pending,
                })
                .collect(),
            outputs: StepOutputs::new(),
            warnings: Vec::new(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Mark the run as started
    pub fn start(&mut self) {
        self.started_at = Some(Utc::now());
    }

    /// Enter step `index`
    pub fn enter_step(&mut self, index: usize) {
        self.state = RunState::Running { step_index: index };
        self.records[index].status = StepStatus::Running {
            started_at: Utc::now(),
            attempt: 1,
        };
    }

    fn started_at(&self, index: usize) -> DateTime<Utc> {
        match &self.records[index].status {
            StepStatus::Running { started_at, .. } => *started_at,
            _ => Utc::now(),
        }
    }

    pub fn succeed_step(&mut self, index: usize, attempts: u32) {
        self.records[index].status = StepStatus::Succeeded {
            attempts,
            started_at: self.started_at(index),
            completed_at: Utc::now(),
        };
    }

    pub fn tolerate_timeout(&mut self, index: usize, attempts: u32, warning: String) {
        self.records[index].status = StepStatus::ToleratedTimeout {
            attempts,
            started_at: self.started_at(index),
            completed_at: Utc::now(),
        };
        self.warnings.push(warning);
    }

    /// Fail step `index` and abort the run; later steps are marked skipped
    pub fn abort(&mut self, index: usize, attempts: u32, error: ProvisionError) {
        let step = self.records[index].name.clone();
        self.records[index].status = StepStatus::Failed {
            error: error.to_string(),
            attempts,
            started_at: self.started_at(index),
            failed_at: Utc::now(),
        };
        for record in self.records.iter_mut().skip(index + 1) {
            record.status = StepStatus::Skipped {
                reason: format!("run aborted at '{}'", step),
            };
        }
        self.state = RunState::Aborted { step, error };
        self.finished_at = Some(Utc::now());
    }

    /// Mark the run as completed
    pub fn complete(&mut self) {
        self.state = RunState::Completed;
        self.finished_at = Some(Utc::now());
    }

    /// Terminal outcome, or `None` while idle or running
    pub fn outcome(&self) -> Option<RunOutcome> {
        match &self.state {
            RunState::Completed => Some(RunOutcome::Completed),
            RunState::Aborted { step, error } => Some(RunOutcome::AbortedAtStep {
                step: step.clone(),
                cause: error.clone(),
            }),
            RunState::Idle | RunState::Running { .. } => None,
        }
    }

    pub fn record(&self, name: &str) -> Option<&StepRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    /// Names of steps that were actually attempted, in order
    pub fn attempted_steps(&self) -> Vec<&str> {
        self.records
            .iter()
            .filter(|r| !matches!(r.status, StepStatus::Pending | StepStatus::Skipped { .. }))
            .map(|r| r.name.as_str())
            .collect()
    }
}
