//! Test: agent install - client cache, registry lookup, pull retry, install

use crate::helpers::*;
use arc_onboard::execution::sequences;
use arc_onboard::http::TransportError;
use arc_onboard::{CommandResult, ProvisionError};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tempfile::TempDir;

const REGISTRY_PATH: &str = "mcr.microsoft.com/azurearck8s/batch1/stable/azure-arc-k8sagents:1.21.10";

fn denied(attempt: u32) -> CommandResult {
    CommandResult::exited(
        1,
        "",
        format!("Error: failed to authorize: 401 Unauthorized (attempt {})", attempt),
    )
}

#[tokio::test]
async fn test_agent_install_happy_path() {
    let dir = TempDir::new().unwrap();
    let transport = StaticTransport::with_registry_path(REGISTRY_PATH);
    let extractor = Arc::new(FakeExtractor::default());
    let config = config_in(dir.path());
    let pipeline = sequences::agent_install(&config, agent_deps(transport.clone(), extractor.clone()));

    let (result, engine) = run_pipeline(&pipeline, &agent_context(), ScriptedRunner::new()).await;

    assert_completed(&result);
    assert_eq!(transport.gets.load(Ordering::SeqCst), 1);
    assert_eq!(transport.posts.load(Ordering::SeqCst), 1);
    assert_eq!(
        transport.posted_urls.lock().unwrap()[0],
        "https://westeurope.dp.kubernetesconfiguration.azure.com/azure-arc-k8sagents/GetLatestHelmPackagePath?api-version=2019-11-01-preview"
    );
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);

    let client = dir.path().join("helm/v3.6.3/linux-amd64/helm");
    let invocations = engine.runner().invocations();
    assert_eq!(invocations.len(), 3);
    assert!(invocations.iter().all(|s| s.program == client.display().to_string()));
    assert!(invocations
        .iter()
        .all(|s| s.env.contains(&("HELM_EXPERIMENTAL_OCI".to_string(), "1".to_string()))));

    assert_eq!(&invocations[0].args[..3], ["chart", "pull", REGISTRY_PATH]);
    assert_eq!(&invocations[1].args[..3], ["chart", "export", REGISTRY_PATH]);
    let charts = dir.path().join("charts");
    assert_eq!(
        invocations[1].arg_value("--destination"),
        Some(charts.display().to_string().as_str())
    );

    let install = &invocations[2];
    let chart = charts.join("azure-arc-k8sagents");
    assert_eq!(
        &install.args[..4],
        ["upgrade", "--install", "azure-arc", chart.display().to_string().as_str()]
    );
    assert!(install
        .args
        .contains(&format!("global.onboardingPrivateKey={}", PRIVATE_KEY)));
    assert!(!install.display().contains(PRIVATE_KEY));
}

#[tokio::test]
async fn test_second_run_reuses_cached_client() {
    let dir = TempDir::new().unwrap();
    let transport = StaticTransport::with_registry_path(REGISTRY_PATH);
    let extractor = Arc::new(FakeExtractor::default());
    let config = config_in(dir.path());

    for _ in 0..2 {
        let pipeline =
            sequences::agent_install(&config, agent_deps(transport.clone(), extractor.clone()));
        let (result, _) = run_pipeline(&pipeline, &agent_context(), ScriptedRunner::new()).await;
        assert_completed(&result);
    }

    assert_eq!(transport.gets.load(Ordering::SeqCst), 1);
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
    assert_eq!(transport.posts.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_pull_succeeds_on_third_attempt() {
    let dir = TempDir::new().unwrap();
    let transport = StaticTransport::with_registry_path(REGISTRY_PATH);
    let config = config_in(dir.path());
    let pipeline = sequences::agent_install(
        &config,
        agent_deps(transport, Arc::new(FakeExtractor::default())),
    );
    let runner = ScriptedRunner::new()
        .on("chart pull", denied(1))
        .on("chart pull", denied(2));

    let (result, engine) = run_pipeline(&pipeline, &agent_context(), runner).await;

    assert_completed(&result);
    assert_eq!(engine.runner().count("chart pull"), 3);
    assert_eq!(engine.runner().count("chart export"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_pull_exhaustion_aborts_with_last_error() {
    let dir = TempDir::new().unwrap();
    let transport = StaticTransport::with_registry_path(REGISTRY_PATH);
    let config = config_in(dir.path());
    let pipeline = sequences::agent_install(
        &config,
        agent_deps(transport, Arc::new(FakeExtractor::default())),
    );
    let mut runner = ScriptedRunner::new();
    for attempt in 1..=5 {
        runner = runner.on("chart pull", denied(attempt));
    }

    let started = tokio::time::Instant::now();
    let (result, engine) = run_pipeline(&pipeline, &agent_context(), runner).await;

    assert_aborted_at(&result, "fetch-package", "(attempt 5)");
    match result.outcome().cause() {
        Some(ProvisionError::PackagePull {
            package_name,
            registry_path,
            ..
        }) => {
            assert_eq!(package_name, "azure-arc-k8sagents");
            assert_eq!(registry_path, REGISTRY_PATH);
        }
        other => panic!("expected PackagePull, got {:?}", other),
    }
    assert_eq!(engine.runner().count("chart pull"), 5);
    assert_eq!(engine.runner().count("chart export"), 0);
    assert_eq!(engine.runner().count("upgrade --install"), 0);
    assert!(started.elapsed() >= std::time::Duration::from_secs(12));
}

#[tokio::test]
async fn test_registry_lookup_failure_aborts_before_pull() {
    let dir = TempDir::new().unwrap();
    let transport = StaticTransport::with_lookup(Ok(br#"{"unexpected": true}"#.to_vec()));
    let config = config_in(dir.path());
    let pipeline = sequences::agent_install(
        &config,
        agent_deps(transport, Arc::new(FakeExtractor::default())),
    );

    let (result, engine) = run_pipeline(&pipeline, &agent_context(), ScriptedRunner::new()).await;

    assert_aborted_at(&result, "resolve-registry", "azure-arc-k8sagents");
    assert!(matches!(
        result.outcome().cause(),
        Some(ProvisionError::RegistryLookup { .. })
    ));
    assert!(engine.runner().invocations().is_empty());
}

#[tokio::test]
async fn test_registry_http_error_is_reported() {
    let dir = TempDir::new().unwrap();
    let transport = StaticTransport::with_lookup(Err(TransportError::Status {
        status: 403,
        body: "forbidden".to_string(),
    }));
    let pipeline = sequences::agent_install(
        &config_in(dir.path()),
        agent_deps(transport, Arc::new(FakeExtractor::default())),
    );

    let (result, _) = run_pipeline(&pipeline, &agent_context(), ScriptedRunner::new()).await;

    assert_aborted_at(&result, "resolve-registry", "403");
}

#[tokio::test]
async fn test_overrides_skip_lookup_and_exported_path() {
    let dir = TempDir::new().unwrap();
    let transport = StaticTransport::with_registry_path("unused");
    let config = config_in(dir.path()).with_overrides(
        Some("localhost:5000/arc/azure-arc-k8sagents:dev".to_string()),
        Some("/opt/arc/chart".to_string()),
    );
    let pipeline = sequences::agent_install(
        &config,
        agent_deps(transport.clone(), Arc::new(FakeExtractor::default())),
    );

    let (result, engine) = run_pipeline(&pipeline, &agent_context(), ScriptedRunner::new()).await;

    assert_completed(&result);
    assert_eq!(transport.posts.load(Ordering::SeqCst), 0);
    let invocations = engine.runner().invocations();
    assert_eq!(invocations[0].args[2], "localhost:5000/arc/azure-arc-k8sagents:dev");
    assert_eq!(invocations[2].args[3], "/opt/arc/chart");
}

#[tokio::test]
async fn test_install_failure_is_fatal() {
    let dir = TempDir::new().unwrap();
    let transport = StaticTransport::with_registry_path(REGISTRY_PATH);
    let pipeline = sequences::agent_install(
        &config_in(dir.path()),
        agent_deps(transport, Arc::new(FakeExtractor::default())),
    );
    let runner = ScriptedRunner::new().on(
        "upgrade --install",
        CommandResult::exited(1, "", "Error: INSTALLATION FAILED: namespace is being terminated"),
    );

    let (result, _) = run_pipeline(&pipeline, &agent_context(), runner).await;

    assert_aborted_at(&result, "install-agent", "namespace is being terminated");
    assert!(matches!(
        result.outcome().cause(),
        Some(ProvisionError::Installation { exit_code: 1, .. })
    ));
}

#[tokio::test]
async fn test_empty_export_aborts_before_install() {
    let dir = TempDir::new().unwrap();
    let transport = StaticTransport::with_registry_path(REGISTRY_PATH);
    let pipeline = sequences::agent_install(
        &config_in(dir.path()),
        agent_deps(transport, Arc::new(FakeExtractor::default())),
    );
    let runner = ScriptedRunner::new().without_exports();

    let (result, engine) = run_pipeline(&pipeline, &agent_context(), runner).await;

    assert_aborted_at(&result, "fetch-package", "export left no files");
    assert!(matches!(
        result.outcome().cause(),
        Some(ProvisionError::PackageExport { exit_code: 0, .. })
    ));
    assert_eq!(engine.runner().count("upgrade --install"), 0);
}
