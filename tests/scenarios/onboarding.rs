//! Test: cluster onboarding - fail-fast and the tolerated extension deadline

use crate::helpers::*;
use arc_onboard::core::StepStatus;
use arc_onboard::execution::{sequences, ExecutionEvent};
use arc_onboard::{CommandResult, ProvisionError, ProvisioningConfig};
use std::time::Duration;

fn failure(stderr: &str) -> CommandResult {
    CommandResult::exited(1, "", stderr)
}

/// Every step succeeds and identifiers flow forward
#[tokio::test]
async fn test_onboarding_happy_path() {
    let runner = ScriptedRunner::new()
        .on("ad sp show", CommandResult::exited(0, "cl-oid-1234\n", ""))
        .on(
            "storage account show",
            CommandResult::exited(0, "/storageAccounts/edgesa\n", ""),
        )
        .on(
            "schema registry show",
            CommandResult::exited(0, "/schemaRegistries/edge-sr\n", ""),
        );
    let pipeline = sequences::onboarding(&ProvisioningConfig::default());

    let (result, engine) = run_pipeline(&pipeline, &onboarding_context(), runner).await;

    assert_completed(&result);
    assert!(result.run.warnings.is_empty());

    let lines = engine.runner().command_lines();
    assert_eq!(engine.runner().count("provider register"), 6);
    let order: Vec<&str> = [
        "connectedk8s connect",
        "ad sp show",
        "connectedk8s enable-features",
        "storage account create",
        "storage account show",
        "schema registry create",
        "iot ops init",
        "schema registry show",
        "iot ops create",
    ]
    .to_vec();
    let positions: Vec<usize> = order
        .iter()
        .map(|p| {
            lines
                .iter()
                .position(|l| l.contains(p))
                .unwrap_or_else(|| panic!("'{}' never invoked", p))
        })
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "order was {:?}", lines);

    let invocations = engine.runner().invocations();
    let enable = invocations
        .iter()
        .find(|s| s.args.join(" ").contains("enable-features"))
        .unwrap();
    assert_eq!(enable.arg_value("--custom-locations-oid"), Some("cl-oid-1234"));

    let create = invocations.last().unwrap();
    assert_eq!(create.arg_value("--sr-resource-id"), Some("/schemaRegistries/edge-sr"));
    assert_eq!(create.arg_value("--name"), Some("factory-k3s-instance"));
    assert_eq!(create.deadline, Some(Duration::from_secs(900)));

    assert_eq!(result.run.outputs.get("storage_account_id"), Some("/storageAccounts/edgesa"));
}

/// A failure on the 3rd provider stops registration and the run
#[tokio::test]
async fn test_third_provider_failure_short_circuits() {
    let config = ProvisioningConfig::default();
    let third = config.onboarding.providers[2].clone();
    let runner = ScriptedRunner::new().on(
        &format!("provider register -n {}", third),
        failure("(AuthorizationFailed) The client does not have authorization"),
    );
    let pipeline = sequences::onboarding(&config);

    let (result, engine) = run_pipeline(&pipeline, &onboarding_context(), runner).await;

    assert_aborted_at(&result, "register-providers", "AuthorizationFailed");
    assert_eq!(engine.runner().count("provider register"), 3);
    for provider in &config.onboarding.providers[3..] {
        assert_eq!(engine.runner().count(provider), 0, "{} was registered", provider);
    }
    assert_eq!(engine.runner().count("connectedk8s"), 0);
    assert_eq!(result.run.attempted_steps(), vec!["register-providers"]);
}

/// Two providers, connect succeeds, enable-features fails
#[tokio::test]
async fn test_enable_features_failure_skips_remaining_steps() {
    let mut config = ProvisioningConfig::default();
    config.onboarding.providers = vec![
        "Microsoft.Kubernetes".to_string(),
        "Microsoft.KubernetesConfiguration".to_string(),
    ];
    let runner = ScriptedRunner::new().on(
        "connectedk8s enable-features",
        failure("ERROR: Custom locations feature is not available in this region\n"),
    );
    let pipeline = sequences::onboarding(&config);

    let (result, engine) = run_pipeline(&pipeline, &onboarding_context(), runner).await;

    assert_aborted_at(
        &result,
        "enable-features",
        "ERROR: Custom locations feature is not available in this region",
    );
    assert!(matches!(
        result.outcome().cause(),
        Some(ProvisionError::ExternalCommand { step, exit_code: 1, .. }) if step == "enable-features"
    ));
    assert_eq!(
        result.run.attempted_steps(),
        vec!["register-providers", "connect-cluster", "enable-features"]
    );
    assert!(matches!(
        result.status("create-schema-registry"),
        StepStatus::Skipped { .. }
    ));
    assert!(matches!(result.status("install-extension"), StepStatus::Skipped { .. }));
    assert_eq!(engine.runner().count("storage account"), 0);
    assert_eq!(engine.runner().count("iot ops"), 0);
}

/// Deadline expiry on the extension create still completes the run
#[tokio::test]
async fn test_extension_deadline_is_tolerated() {
    let runner = ScriptedRunner::new().on(
        "iot ops create",
        CommandResult::timed_out(Duration::from_secs(900)),
    );
    let pipeline = sequences::onboarding(&ProvisioningConfig::default());

    let (result, _) = run_pipeline(&pipeline, &onboarding_context(), runner).await;

    assert_completed(&result);
    assert!(matches!(
        result.status("install-extension"),
        StepStatus::ToleratedTimeout { .. }
    ));
    assert_eq!(result.run.warnings.len(), 1);
    assert!(result.run.warnings[0].contains("install-extension"));
    assert!(result
        .events
        .iter()
        .any(|e| matches!(e, ExecutionEvent::StepDeadlineTolerated { step_name, .. } if step_name == "install-extension")));
}

/// A non-zero exit before the deadline is still fatal
#[tokio::test]
async fn test_extension_failure_before_deadline_aborts() {
    let runner = ScriptedRunner::new().on(
        "iot ops create",
        failure("ERROR: (InvalidTemplateDeployment) The template deployment failed"),
    );
    let pipeline = sequences::onboarding(&ProvisioningConfig::default());

    let (result, _) = run_pipeline(&pipeline, &onboarding_context(), runner).await;

    assert_aborted_at(&result, "install-extension", "InvalidTemplateDeployment");
    assert!(result.run.warnings.is_empty());
}

/// Deadline expiry on a step without timeout tolerance aborts
#[tokio::test]
async fn test_deadline_elsewhere_is_fatal() {
    let runner = ScriptedRunner::new().on(
        "connectedk8s connect",
        CommandResult::timed_out(Duration::from_secs(60)),
    );
    let pipeline = sequences::onboarding(&ProvisioningConfig::default());

    let (result, _) = run_pipeline(&pipeline, &onboarding_context(), runner).await;

    let outcome = result.outcome();
    assert_eq!(outcome.aborted_step(), Some("connect-cluster"));
    assert!(outcome.cause().unwrap().is_deadline_exceeded());
}
