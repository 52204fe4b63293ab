//! CLI output formatting

use crate::{
    core::{PipelineRun, RunOutcome, StepStatus},
    execution::ExecutionEvent,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a progress bar over the step count
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format a step status for display
pub fn format_step_status(status: &StepStatus) -> String {
    match status {
        StepStatus::Pending => style("PENDING").dim().to_string(),
        StepStatus::Running { attempt, .. } => {
            style(format!("RUNNING (attempt {})", attempt)).yellow().to_string()
        }
        StepStatus::Succeeded { .. } => style("SUCCEEDED").green().to_string(),
        StepStatus::ToleratedTimeout { .. } => style("TIMED OUT (tolerated)").yellow().to_string(),
        StepStatus::Failed { .. } => style("FAILED").red().to_string(),
        StepStatus::Skipped { .. } => style("SKIPPED").dim().to_string(),
    }
}

/// Format a run outcome for display
pub fn format_outcome(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Completed => format!("{} completed", style("successfully").green()),
        RunOutcome::AbortedAtStep { step, .. } => {
            format!("{} at {}", style("aborted").red(), style(step).bold())
        }
    }
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            run_id,
            pipeline_name,
            total_steps,
        } => format!(
            "{} Starting {} ({} steps, run {})",
            ROCKET,
            style(pipeline_name).bold(),
            total_steps,
            style(&run_id.to_string()[..8]).dim()
        ),
        ExecutionEvent::StepStarted {
            step_name,
            description,
            ..
        } => {
            if description.is_empty() {
                format!("{} {}", SPINNER, style(step_name).cyan())
            } else {
                format!(
                    "{} {} {}",
                    SPINNER,
                    style(step_name).cyan(),
                    style(description).dim()
                )
            }
        }
        ExecutionEvent::StepRetrying {
            step_name,
            attempt,
            max_attempts,
        } => format!(
            "{} {} (attempt {}/{})",
            WARN,
            style(step_name).yellow(),
            attempt,
            max_attempts
        ),
        ExecutionEvent::StepCompleted {
            step_name,
            attempts,
        } => {
            if *attempts > 1 {
                format!(
                    "{} {} {}",
                    CHECK,
                    style(step_name).green(),
                    style(format!("after {} attempts", attempts)).dim()
                )
            } else {
                format!("{} {}", CHECK, style(step_name).green())
            }
        }
        ExecutionEvent::StepDeadlineTolerated { step_name, warning } => format!(
            "{} {}: {}",
            WARN,
            style(step_name).yellow(),
            style(warning).dim()
        ),
        ExecutionEvent::StepFailed { step_name, error } => {
            format!("{} {}: {}", CROSS, style(step_name).red(), style(error).dim())
        }
        ExecutionEvent::PipelineFinished { run_id, outcome } => format!(
            "{} Run {} {}",
            INFO,
            style(&run_id.to_string()[..8]).dim(),
            format_outcome(outcome)
        ),
    }
}

/// One line per step with its final status
pub fn format_run_summary(run: &PipelineRun) -> String {
    let mut lines = Vec::with_capacity(run.records.len() + 1);
    if let (Some(started), Some(finished)) = (run.started_at, run.finished_at) {
        if let Ok(elapsed) = finished.signed_duration_since(started).to_std() {
            lines.push(format!(
                "{} {} in {}",
                INFO,
                style(&run.pipeline_name).bold(),
                style(format_duration(elapsed)).dim()
            ));
        }
    }
    for record in &run.records {
        lines.push(format!(
            "  {:<24} {}",
            record.name,
            format_step_status(&record.status)
        ));
    }
    lines.join("\n")
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
