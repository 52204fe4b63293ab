use arc_onboard::artifact::{DefaultExtractor, Platform};
use arc_onboard::cli::commands::{InstallAgentCommand, OnboardCommand, ValidateConfigCommand};
use arc_onboard::cli::output::*;
use arc_onboard::cli::{Cli, Command};
use arc_onboard::execution::{sequences, AgentInstallDeps, ExecutionEvent};
use arc_onboard::http::ReqwestTransport;
use arc_onboard::{
    ExecutionEngine, Pipeline, PipelineContext, ProvisioningConfig, RunOutcome, SubprocessRunner,
};

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Timeout for registry lookups and client downloads
const HTTP_TIMEOUT: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    // Execute command
    match &cli.command {
        Command::InstallAgent(cmd) => install_agent(cmd, &cli).await?,
        Command::Onboard(cmd) => onboard(cmd, &cli).await?,
        Command::ValidateConfig(cmd) => validate_config(cmd)?,
    }

    Ok(())
}

/// Load `--config` (or the defaults) and apply environment overrides
fn load_config(cli: &Cli) -> Result<ProvisioningConfig> {
    let config = match &cli.config {
        Some(path) => ProvisioningConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => ProvisioningConfig::default(),
    };

    Ok(config.with_overrides(
        std::env::var("HELMREGISTRY").ok(),
        std::env::var("HELMCHART").ok(),
    ))
}

async fn install_agent(cmd: &InstallAgentCommand, cli: &Cli) -> Result<()> {
    let mut config = load_config(cli)?;
    cmd.apply(&mut config.install);

    let private_key = cmd.read_private_key()?;
    let context = cmd.context(private_key);
    context.validate()?;

    let platform = Platform::current()?;
    info!("Client platform: {}/{}", platform.os, platform.arch);

    let transport = ReqwestTransport::new(HTTP_TIMEOUT).context("Failed to build HTTP client")?;
    let deps = AgentInstallDeps {
        transport: Arc::new(transport),
        extractor: Arc::new(DefaultExtractor),
        platform,
    };

    let pipeline = sequences::agent_install(&config, deps);
    run_pipeline(&pipeline, &context).await
}

async fn onboard(cmd: &OnboardCommand, cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let context = cmd.context();
    context.validate()?;

    let pipeline = sequences::onboarding(&config);
    run_pipeline(&pipeline, &context).await
}

async fn run_pipeline(pipeline: &Pipeline, context: &PipelineContext) -> Result<()> {
    let progress = create_progress_bar(pipeline.len());

    // Create execution engine
    let mut engine = ExecutionEngine::new(SubprocessRunner::new());

    // Set up event handler for console output
    let bar = progress.clone();
    engine.add_event_handler(move |event| {
        bar.println(format_execution_event(&event));
        match &event {
            ExecutionEvent::StepStarted { step_name, .. } => bar.set_message(step_name.clone()),
            ExecutionEvent::StepCompleted { .. } | ExecutionEvent::StepDeadlineTolerated { .. } => {
                bar.inc(1)
            }
            _ => {}
        }
    });

    let run = engine.execute(pipeline, context).await;
    progress.finish_and_clear();

    println!("\n{}", format_run_summary(&run));
    for warning in &run.warnings {
        println!("{} {}", WARN, style(warning).yellow());
    }

    // Print final status
    match run.outcome() {
        Some(RunOutcome::Completed) => {
            println!(
                "\n{} {} completed {}",
                CHECK,
                style(&pipeline.name).bold(),
                style("successfully").green()
            );
            Ok(())
        }
        Some(RunOutcome::AbortedAtStep { step, cause }) => {
            println!(
                "\n{} {} {} at {}",
                CROSS,
                style(&pipeline.name).bold(),
                style("aborted").red(),
                style(&step).bold()
            );
            error!("{}", cause);
            eprintln!("{}", cause);
            std::process::exit(1);
        }
        None => anyhow::bail!("Pipeline {} finished without an outcome", pipeline.name),
    }
}

fn validate_config(cmd: &ValidateConfigCommand) -> Result<()> {
    println!("{} Validating configuration...", INFO);

    match ProvisioningConfig::from_file(&cmd.file) {
        Ok(config) => {
            println!("{} Configuration is valid!", CHECK);
            println!("  Client: {}", style(&config.client.version).bold());
            println!("  Package: {}", style(&config.registry.package_name).bold());
            println!(
                "  Release: {} in {}",
                style(&config.install.release_name).cyan(),
                style(&config.install.namespace).cyan()
            );
            println!("  Set values: {}", style(config.install.set_values.len()).cyan());
            println!("  Providers: {}", style(config.onboarding.providers.len()).cyan());

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(e).red());
            std::process::exit(1);
        }
    }
}
