//! Cluster-onboarding actions, each a short series of cloud CLI calls
//!
//! Every call is fatal on a non-zero exit. Later calls inside a step depend
//! on identifiers read back by earlier ones, so nothing runs concurrently.

use super::{CUSTOM_LOCATIONS_OID, SCHEMA_REGISTRY_ID, STORAGE_ACCOUNT_ID};
use crate::core::{render_template, StepAction, StepEnv, StepOutput};
use crate::error::ProvisionError;
use crate::process::CommandSpec;
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

/// Registers resource providers one at a time, stopping at the first failure
pub struct RegisterProviders {
    cli: String,
    providers: Vec<String>,
}

impl RegisterProviders {
    pub fn new(cli: impl Into<String>, providers: Vec<String>) -> Self {
        Self {
            cli: cli.into(),
            providers,
        }
    }
}

#[async_trait]
impl StepAction for RegisterProviders {
    async fn run(&self, env: &StepEnv<'_>) -> Result<StepOutput, ProvisionError> {
        for provider in &self.providers {
            info!("Registering resource provider {}", provider);
            let spec = CommandSpec::new(&self.cli).args(["provider", "register", "-n", provider.as_str()]);
            env.run_checked(spec).await.map_err(|e| match e {
                ProvisionError::ExternalCommand {
                    step,
                    exit_code,
                    stderr,
                } => ProvisionError::ExternalCommand {
                    step,
                    exit_code,
                    stderr: format!("registering {}: {}", provider, stderr),
                },
                other => other,
            })?;
        }
        Ok(StepOutput::none())
    }
}

/// Connects the cluster to the control plane
pub struct ConnectCluster {
    cli: String,
}

impl ConnectCluster {
    pub fn new(cli: impl Into<String>) -> Self {
        Self { cli: cli.into() }
    }
}

#[async_trait]
impl StepAction for ConnectCluster {
    async fn run(&self, env: &StepEnv<'_>) -> Result<StepOutput, ProvisionError> {
        let t = &env.context.target;
        let spec = CommandSpec::new(&self.cli).args([
            "connectedk8s",
            "connect",
            "--name",
            t.cluster_name.as_str(),
            "--location",
            t.location.as_str(),
            "--resource-group",
            t.resource_group.as_str(),
        ]);
        env.run_checked(spec).await?;
        Ok(StepOutput::none())
    }
}

/// Looks up the custom-locations service principal and enables features
pub struct EnableFeatures {
    cli: String,
    app_id: String,
    features: Vec<String>,
}

impl EnableFeatures {
    pub fn new(cli: impl Into<String>, app_id: impl Into<String>, features: Vec<String>) -> Self {
        Self {
            cli: cli.into(),
            app_id: app_id.into(),
            features,
        }
    }
}

#[async_trait]
impl StepAction for EnableFeatures {
    async fn run(&self, env: &StepEnv<'_>) -> Result<StepOutput, ProvisionError> {
        let t = &env.context.target;

        let lookup = CommandSpec::new(&self.cli).args([
            "ad",
            "sp",
            "show",
            "--id",
            self.app_id.as_str(),
            "--query",
            "id",
            "-o",
            "tsv",
        ]);
        let object_id = env.lookup(lookup, "custom locations object id").await?;

        let enable = CommandSpec::new(&self.cli)
            .args([
                "connectedk8s",
                "enable-features",
                "-n",
                t.cluster_name.as_str(),
                "-g",
                t.resource_group.as_str(),
                "--custom-locations-oid",
                object_id.as_str(),
                "--features",
            ])
            .args(self.features.iter());
        env.run_checked(enable).await?;

        Ok(StepOutput::none().with(CUSTOM_LOCATIONS_OID, object_id))
    }
}

/// Creates a storage account and a schema registry backed by it
pub struct CreateSchemaRegistry {
    cli: String,
}

impl CreateSchemaRegistry {
    pub fn new(cli: impl Into<String>) -> Self {
        Self { cli: cli.into() }
    }
}

#[async_trait]
impl StepAction for CreateSchemaRegistry {
    async fn run(&self, env: &StepEnv<'_>) -> Result<StepOutput, ProvisionError> {
        let t = &env.context.target;
        let resources = env.context.onboarding_resources()?;

        let create_account = CommandSpec::new(&self.cli).args([
            "storage",
            "account",
            "create",
            "--name",
            resources.storage_account,
            "--resource-group",
            t.resource_group.as_str(),
            "--location",
            t.location.as_str(),
            "--enable-hierarchical-namespace",
            "true",
        ]);
        env.run_checked(create_account).await?;

        let show_account = CommandSpec::new(&self.cli).args([
            "storage",
            "account",
            "show",
            "--name",
            resources.storage_account,
            "--resource-group",
            t.resource_group.as_str(),
            "--query",
            "id",
            "-o",
            "tsv",
        ]);
        let account_id = env.lookup(show_account, "storage account id").await?;

        let create_registry = CommandSpec::new(&self.cli).args([
            "iot",
            "ops",
            "schema",
            "registry",
            "create",
            "--name",
            resources.schema_registry,
            "--resource-group",
            t.resource_group.as_str(),
            "--registry-namespace",
            resources.schema_registry_namespace,
            "--sa-resource-id",
            account_id.as_str(),
        ]);
        env.run_checked(create_registry).await?;

        Ok(StepOutput::none().with(STORAGE_ACCOUNT_ID, account_id))
    }
}

/// Prepares the cluster and creates the extension instance under a deadline
pub struct InstallExtension {
    cli: String,
    instance_name: String,
    deadline: Duration,
}

impl InstallExtension {
    pub fn new(cli: impl Into<String>, instance_name: impl Into<String>, deadline: Duration) -> Self {
        Self {
            cli: cli.into(),
            instance_name: instance_name.into(),
            deadline,
        }
    }
}

#[async_trait]
impl StepAction for InstallExtension {
    async fn run(&self, env: &StepEnv<'_>) -> Result<StepOutput, ProvisionError> {
        let t = &env.context.target;
        let resources = env.context.onboarding_resources()?;
        let instance = render_template(&self.instance_name, &env.context.rendering_variables())?;

        let init = CommandSpec::new(&self.cli).args([
            "iot",
            "ops",
            "init",
            "--cluster",
            t.cluster_name.as_str(),
            "--resource-group",
            t.resource_group.as_str(),
        ]);
        env.run_checked(init).await?;

        let show_registry = CommandSpec::new(&self.cli).args([
            "iot",
            "ops",
            "schema",
            "registry",
            "show",
            "--name",
            resources.schema_registry,
            "--resource-group",
            t.resource_group.as_str(),
            "--query",
            "id",
            "-o",
            "tsv",
        ]);
        let registry_id = env.lookup(show_registry, "schema registry id").await?;

        let create = CommandSpec::new(&self.cli)
            .args([
                "iot",
                "ops",
                "create",
                "--cluster",
                t.cluster_name.as_str(),
                "--resource-group",
                t.resource_group.as_str(),
                "--name",
                instance.as_str(),
                "--sr-resource-id",
                registry_id.as_str(),
                "--custom-location",
                resources.custom_location_id,
            ])
            .deadline(self.deadline);
        env.run_checked(create).await?;

        Ok(StepOutput::none().with(SCHEMA_REGISTRY_ID, registry_id))
    }
}
