//! Step domain model

use crate::core::context::{PipelineContext, StepOutputs};
use crate::error::ProvisionError;
use crate::process::{CommandResult, CommandRunner, CommandSpec};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

/// What a step failure means for the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Any failure aborts the run
    Fatal,
    /// Deadline expiry counts as success; any other failure aborts
    TimeoutTolerant,
}

/// Named values a step hands to later steps
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutput {
    pub values: Vec<(String, String)>,
}

impl StepOutput {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.push((key.into(), value.into()));
        self
    }
}

/// What a step action can see while it runs
pub struct StepEnv<'a> {
    pub step_name: &'a str,
    pub context: &'a PipelineContext,
    pub outputs: &'a StepOutputs,
    pub runner: &'a dyn CommandRunner,
}

impl StepEnv<'_> {
    /// Run a command with the context's secrets masked in the log line
    ///
    /// Only a launch failure is an error; the result is returned as-is.
    pub async fn launch(&self, spec: &CommandSpec) -> Result<CommandResult, ProvisionError> {
        let spec = self
            .context
            .secrets()
            .into_iter()
            .fold(spec.clone(), |spec, secret| spec.redact(secret));
        info!("[{}] {}", self.step_name, spec.display());

        Ok(self.runner.run(&spec).await?)
    }

    /// Run a command and turn anything but a clean exit into a step error
    ///
    /// Deadline expiry becomes [`ProvisionError::DeadlineExceeded`]; a
    /// non-zero exit becomes [`ProvisionError::ExternalCommand`] carrying
    /// the tool's stderr.
    pub async fn run_checked(&self, spec: CommandSpec) -> Result<CommandResult, ProvisionError> {
        let result = self.launch(&spec).await?;

        if result.deadline_exceeded {
            return Err(ProvisionError::DeadlineExceeded {
                step: self.step_name.to_string(),
                deadline_secs: spec.deadline.map(|d| d.as_secs()).unwrap_or_default(),
            });
        }
        if !result.success() {
            return Err(ProvisionError::ExternalCommand {
                step: self.step_name.to_string(),
                exit_code: result.code(),
                stderr: result.stderr_trimmed().to_string(),
            });
        }

        debug!("[{}] stdout: {}", self.step_name, result.stdout_trimmed());
        Ok(result)
    }

    /// Run a lookup command and return its trimmed, non-empty stdout
    pub async fn lookup(&self, spec: CommandSpec, what: &str) -> Result<String, ProvisionError> {
        let result = self.run_checked(spec).await?;
        let value = result.stdout_trimmed();
        if value.is_empty() {
            return Err(ProvisionError::ExternalCommand {
                step: self.step_name.to_string(),
                exit_code: result.code(),
                stderr: format!("lookup of {} returned no value", what),
            });
        }
        Ok(value.to_string())
    }
}

/// The work a step performs
#[async_trait]
pub trait StepAction: Send + Sync {
    async fn run(&self, env: &StepEnv<'_>) -> Result<StepOutput, ProvisionError>;
}

/// A single named step in a pipeline
#[derive(Clone)]
pub struct Step {
    /// Unique step name
    pub name: String,

    /// Human-readable description
    pub description: String,

    pub action: Arc<dyn StepAction>,

    pub retry: RetryPolicy,

    pub failure_policy: FailurePolicy,
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("retry", &self.retry)
            .field("failure_policy", &self.failure_policy)
            .finish_non_exhaustive()
    }
}

impl Step {
    /// A fatal, run-once step
    pub fn new(name: impl Into<String>, action: impl StepAction + 'static) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            action: Arc::new(action),
            retry: RetryPolicy::none(),
            failure_policy: FailurePolicy::Fatal,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Whether an error from this step should abort the run
    pub fn is_fatal(&self, error: &ProvisionError) -> bool {
        !(self.failure_policy == FailurePolicy::TimeoutTolerant && error.is_deadline_exceeded())
    }
}

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("placeholder pattern is valid")
    })
}

/// Names referenced by `{{ name }}` placeholders in a template
pub fn template_variables(template: &str) -> Vec<String> {
    placeholder()
        .captures_iter(template)
        .map(|c| c[1].to_string())
        .collect()
}

/// Render `{{ name }}` placeholders; unknown names are an argument error
pub fn render_template(
    template: &str,
    variables: &HashMap<String, String>,
) -> Result<String, ProvisionError> {
    if let Some(unknown) = template_variables(template)
        .into_iter()
        .find(|name| !variables.contains_key(name))
    {
        return Err(ProvisionError::Argument(format!(
            "template '{}' references unknown variable '{}'",
            template, unknown
        )));
    }

    Ok(placeholder()
        .replace_all(template, |c: &regex::Captures<'_>| variables[&c[1]].clone())
        .into_owned())
}
