//! Test utilities: scripted collaborators and run assertions

use arc_onboard::artifact::{ArchiveExtractor, Platform};
use arc_onboard::core::{ClusterTarget, StepStatus};
use arc_onboard::execution::{AgentInstallDeps, ExecutionEngine, ExecutionEvent};
use arc_onboard::http::{HttpTransport, TransportError};
use arc_onboard::process::ExecutionLaunchError;
use arc_onboard::{
    CommandResult, CommandRunner, CommandSpec, Pipeline, PipelineContext, PipelineRun,
    ProvisioningConfig, RunOutcome,
};

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Result returned for commands no rule matches; lookups read it as an id
pub const DEFAULT_STDOUT: &str = "generated-id\n";

struct Rule {
    pattern: String,
    queued: VecDeque<CommandResult>,
    fallback: Option<CommandResult>,
}

/// Command runner that answers by matching the joined argument list
///
/// Rules are checked in insertion order. A rule answers with its queued
/// results first, then with its fallback; a rule with neither is skipped.
/// A successful `chart export` leaves the chart directory on disk.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    seen: Mutex<Vec<CommandSpec>>,
    skip_exports: bool,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the next matching command with `result`
    pub fn on(self, pattern: &str, result: CommandResult) -> Self {
        {
            let mut rules = self.rules.lock().unwrap();
            match rules.iter_mut().find(|r| r.pattern == pattern) {
                Some(rule) => rule.queued.push_back(result),
                None => rules.push(Rule {
                    pattern: pattern.to_string(),
                    queued: VecDeque::from([result]),
                    fallback: None,
                }),
            }
        }
        self
    }

    /// Answer every matching command with `result` once the queue is empty
    pub fn always(self, pattern: &str, result: CommandResult) -> Self {
        {
            let mut rules = self.rules.lock().unwrap();
            match rules.iter_mut().find(|r| r.pattern == pattern) {
                Some(rule) => rule.fallback = Some(result),
                None => rules.push(Rule {
                    pattern: pattern.to_string(),
                    queued: VecDeque::new(),
                    fallback: Some(result),
                }),
            }
        }
        self
    }

    /// Successful exports leave nothing on disk
    pub fn without_exports(mut self) -> Self {
        self.skip_exports = true;
        self
    }

    /// Every command seen, in order
    pub fn invocations(&self) -> Vec<CommandSpec> {
        self.seen.lock().unwrap().clone()
    }

    /// Argument lists of every command seen, joined with spaces
    pub fn command_lines(&self) -> Vec<String> {
        self.invocations().iter().map(|s| s.args.join(" ")).collect()
    }

    /// Number of commands whose argument list contains `pattern`
    pub fn count(&self, pattern: &str) -> usize {
        self.command_lines()
            .iter()
            .filter(|line| line.contains(pattern))
            .count()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandResult, ExecutionLaunchError> {
        self.seen.lock().unwrap().push(spec.clone());
        let line = spec.args.join(" ");

        let result = self.answer(&line);
        if !self.skip_exports && result.success() && line.starts_with("chart export") {
            write_exported_chart(spec);
        }
        Ok(result)
    }
}

impl ScriptedRunner {
    fn answer(&self, line: &str) -> CommandResult {
        let mut rules = self.rules.lock().unwrap();
        for rule in rules.iter_mut().filter(|r| line.contains(&r.pattern)) {
            if let Some(result) = rule.queued.pop_front() {
                return result;
            }
            if let Some(result) = &rule.fallback {
                return result.clone();
            }
        }
        CommandResult::exited(0, DEFAULT_STDOUT, "")
    }
}

/// Write `<destination>/<chart>/Chart.yaml` the way `chart export` does
fn write_exported_chart(spec: &CommandSpec) {
    let reference = spec.args[2].rsplit('/').next().unwrap();
    let chart = reference.split(':').next().unwrap();
    let dir = Path::new(spec.arg_value("--destination").unwrap()).join(chart);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("Chart.yaml"), format!("name: {}\n", chart)).unwrap();
}

/// Serves a fixed lookup response and a fixed archive, counting requests
pub struct StaticTransport {
    lookup_body: Result<Vec<u8>, TransportError>,
    pub posts: AtomicUsize,
    pub gets: AtomicUsize,
    pub posted_urls: Mutex<Vec<String>>,
}

impl StaticTransport {
    pub fn with_registry_path(path: &str) -> Arc<Self> {
        let body = serde_json::json!({ "repositoryPath": path }).to_string();
        Self::with_lookup(Ok(body.into_bytes()))
    }

    pub fn with_lookup(lookup_body: Result<Vec<u8>, TransportError>) -> Arc<Self> {
        Arc::new(Self {
            lookup_body,
            posts: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            posted_urls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl HttpTransport for StaticTransport {
    async fn get_bytes(&self, _url: &str) -> Result<Vec<u8>, TransportError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        Ok(b"client-archive".to_vec())
    }

    async fn post(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        self.posts.fetch_add(1, Ordering::SeqCst);
        self.posted_urls.lock().unwrap().push(url.to_string());
        self.lookup_body.clone()
    }
}

/// Writes an executable client where a real archive would unpack it
#[derive(Default)]
pub struct FakeExtractor {
    pub calls: AtomicUsize,
}

impl ArchiveExtractor for FakeExtractor {
    fn extract(&self, _archive: &Path, destination: &Path) -> std::io::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let dir = destination.join("linux-amd64");
        std::fs::create_dir_all(&dir)?;
        let binary = dir.join("helm");
        std::fs::write(&binary, "#!/bin/sh\n")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755))?;
        }
        Ok(())
    }
}

pub fn target() -> ClusterTarget {
    ClusterTarget {
        subscription_id: "00000000-0000-0000-0000-000000000001".to_string(),
        resource_group: "edge-rg".to_string(),
        cluster_name: "factory-k3s".to_string(),
        location: "westeurope".to_string(),
        tenant_id: "00000000-0000-0000-0000-0000000000aa".to_string(),
        cloud_environment: "AzureCloud".to_string(),
    }
}

pub fn onboarding_context() -> PipelineContext {
    PipelineContext::onboarding(
        target(),
        "/subscriptions/s/resourceGroups/edge-rg/providers/Microsoft.ExtendedLocation/customLocations/edge-cl",
        "edgesa",
        "edge-sr",
        "edge-ns",
    )
}

pub const PRIVATE_KEY: &str = "MIIEvQIBADANBgkqhkiG9w0BAQEFAASC";

pub fn agent_context() -> PipelineContext {
    PipelineContext::agent_install(target(), PRIVATE_KEY)
}

/// Default configuration with cache and export directories under `root`
pub fn config_in(root: &Path) -> ProvisioningConfig {
    let mut config = ProvisioningConfig::default();
    config.client.cache_dir = Some(root.join("helm"));
    config.package.export_root = Some(root.join("charts"));
    config
}

pub fn agent_deps(transport: Arc<StaticTransport>, extractor: Arc<FakeExtractor>) -> AgentInstallDeps {
    AgentInstallDeps {
        transport,
        extractor,
        platform: Platform::parse("linux", "amd64").unwrap(),
    }
}

/// Test result from running a pipeline
pub struct RunResult {
    pub run: PipelineRun,
    pub events: Vec<ExecutionEvent>,
}

impl RunResult {
    pub fn outcome(&self) -> RunOutcome {
        self.run.outcome().expect("run finished without an outcome")
    }

    pub fn status(&self, step: &str) -> &StepStatus {
        &self
            .run
            .record(step)
            .unwrap_or_else(|| panic!("Step '{}' not found in run", step))
            .status
    }
}

/// Run a pipeline against a scripted runner, recording every event
pub async fn run_pipeline(
    pipeline: &Pipeline,
    context: &PipelineContext,
    runner: ScriptedRunner,
) -> (RunResult, ExecutionEngine<ScriptedRunner>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let mut engine = ExecutionEngine::new(runner);
    engine.add_event_handler(move |event| sink.lock().unwrap().push(event));

    let run = engine.execute(pipeline, context).await;
    let events = events.lock().unwrap().clone();
    (RunResult { run, events }, engine)
}

/// Assert the run completed
pub fn assert_completed(result: &RunResult) {
    assert!(
        result.outcome().is_completed(),
        "Run should be completed, but was: {:?}",
        result.run.state
    );
}

/// Assert the run aborted at `step` with an error containing `expected_error`
pub fn assert_aborted_at(result: &RunResult, step: &str, expected_error: &str) {
    let outcome = result.outcome();
    assert_eq!(
        outcome.aborted_step(),
        Some(step),
        "Run should have aborted at '{}', but was: {:?}",
        step,
        outcome
    );
    let message = outcome.cause().map(|c| c.to_string()).unwrap_or_default();
    assert!(
        message.contains(expected_error),
        "Abort cause:\n{}\n\ndoes not contain:\n{}",
        message,
        expected_error
    );
}
