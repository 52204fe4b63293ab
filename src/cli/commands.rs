//! CLI command definitions

use crate::core::config::InstallConfig;
use crate::core::{ClusterTarget, PipelineContext};
use crate::error::ProvisionError;
use clap::Args;
use std::path::PathBuf;

/// Parameters shared by both sequences
#[derive(Debug, Args, Clone)]
pub struct ClusterArgs {
    /// Subscription the cluster resource lives in
    #[arg(long)]
    pub subscription_id: String,

    #[arg(long)]
    pub resource_group: String,

    #[arg(long)]
    pub cluster_name: String,

    /// Azure region, e.g. westeurope
    #[arg(long)]
    pub location: String,

    #[arg(long)]
    pub tenant_id: String,

    /// Cloud environment name
    #[arg(long, default_value = "AzureCloud")]
    pub cloud: String,
}

impl ClusterArgs {
    pub fn target(&self) -> ClusterTarget {
        ClusterTarget {
            subscription_id: self.subscription_id.clone(),
            resource_group: self.resource_group.clone(),
            cluster_name: self.cluster_name.clone(),
            location: self.location.clone(),
            tenant_id: self.tenant_id.clone(),
            cloud_environment: self.cloud.clone(),
        }
    }
}

/// Install the Arc agents with the package-manager client
#[derive(Debug, Args, Clone)]
pub struct InstallAgentCommand {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// File holding the onboarding private key
    #[arg(long)]
    pub private_key_file: PathBuf,

    /// Kubeconfig file to use
    #[arg(long)]
    pub kubeconfig: Option<String>,

    /// Kubeconfig context to use
    #[arg(long)]
    pub kube_context: Option<String>,

    /// Return as soon as the release is submitted
    #[arg(long)]
    pub no_wait: bool,

    /// Seconds to wait for the release to become ready
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,
}

impl InstallAgentCommand {
    /// Read the private key; an unreadable or empty file is an argument error
    pub fn read_private_key(&self) -> Result<String, ProvisionError> {
        let key = std::fs::read_to_string(&self.private_key_file).map_err(|e| {
            ProvisionError::Argument(format!(
                "cannot read private key file {}: {}",
                self.private_key_file.display(),
                e
            ))
        })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(ProvisionError::Argument(format!(
                "private key file {} is empty",
                self.private_key_file.display()
            )));
        }
        Ok(key.to_string())
    }

    pub fn context(&self, private_key: String) -> PipelineContext {
        PipelineContext::agent_install(self.cluster.target(), private_key)
            .with_kube(self.kubeconfig.clone(), self.kube_context.clone())
    }

    /// Apply `--no-wait` / `--timeout` on top of the configured install
    pub fn apply(&self, install: &mut InstallConfig) {
        if self.no_wait {
            install.no_wait = true;
        }
        if let Some(timeout) = self.timeout {
            install.timeout_secs = timeout;
        }
    }
}

/// Onboard the cluster and install the IoT Operations extension
#[derive(Debug, Args, Clone)]
pub struct OnboardCommand {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// Resource id of the custom location to create the instance in
    #[arg(long)]
    pub custom_location_id: String,

    /// Storage account backing the schema registry
    #[arg(long)]
    pub storage_account: String,

    #[arg(long)]
    pub schema_registry: String,

    #[arg(long)]
    pub schema_registry_namespace: String,
}

impl OnboardCommand {
    pub fn context(&self) -> PipelineContext {
        PipelineContext::onboarding(
            self.cluster.target(),
            self.custom_location_id.clone(),
            self.storage_account.clone(),
            self.schema_registry.clone(),
            self.schema_registry_namespace.clone(),
        )
    }
}

/// Validate a provisioning configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateConfigCommand {
    /// Path to configuration YAML file
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
