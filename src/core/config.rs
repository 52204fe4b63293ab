//! Provisioning configuration from YAML
//!
//! Every list and constant the sequences use lives here, with defaults that
//! match the public Azure Arc onboarding flow. A YAML file only needs the
//! keys it wants to change.

use crate::core::context::{AGENT_INSTALL_VARIABLES, ONBOARDING_VARIABLES, TARGET_VARIABLES};
use crate::core::step::template_variables;
use crate::retry::RetryPolicy;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level provisioning configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// Package-manager client bootstrap
    pub client: ClientConfig,

    /// Control-plane registry lookup
    pub registry: RegistryConfig,

    /// Package pull/export
    pub package: PackageConfig,

    /// Agent install command
    pub install: InstallConfig,

    /// Cluster onboarding sequence
    pub onboarding: OnboardingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Pinned client release
    pub version: String,

    /// Base URL the release archives are served from
    pub download_base_url: String,

    /// Cache root; defaults to `~/.azure/helm`
    pub cache_dir: Option<PathBuf>,

    /// Pass `HELM_EXPERIMENTAL_OCI=1` to client invocations
    pub experimental_oci: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            version: "v3.6.3".to_string(),
            download_base_url: "https://k8connecthelm.azureedge.net/helm".to_string(),
            cache_dir: None,
            experimental_oci: true,
        }
    }
}

impl ClientConfig {
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| azure_dir().join("helm"))
    }

    /// Environment for every client invocation
    pub fn env(&self) -> Vec<(String, String)> {
        if self.experimental_oci {
            vec![("HELM_EXPERIMENTAL_OCI".to_string(), "1".to_string())]
        } else {
            Vec::new()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Control-plane endpoint template, rendered with the run's variables
    pub control_plane_endpoint: String,

    /// Logical package to resolve
    pub package_name: String,

    /// Skip the lookup and use this registry path
    pub override_path: Option<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            control_plane_endpoint: "https://{{ location }}.dp.kubernetesconfiguration.azure.com"
                .to_string(),
            package_name: "azure-arc-k8sagents".to_string(),
            override_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageConfig {
    /// Export root; defaults to `~/.azure/AzureArcCharts`
    pub export_root: Option<PathBuf>,

    /// Install from this path instead of the exported package
    pub chart_override: Option<PathBuf>,

    /// Retry policy for `chart pull`
    pub pull_retry: RetryPolicy,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            export_root: None,
            chart_override: None,
            pull_retry: RetryPolicy::fixed(5, Duration::from_secs(3)),
        }
    }
}

impl PackageConfig {
    pub fn export_root(&self) -> PathBuf {
        self.export_root
            .clone()
            .unwrap_or_else(|| azure_dir().join("AzureArcCharts"))
    }
}

/// One `--set key=value` override; the value is a template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetValue {
    pub key: String,
    pub value: String,
}

impl SetValue {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    pub release_name: String,

    pub namespace: String,

    /// Passed as `--timeout {N}s` when waiting
    pub timeout_secs: u64,

    /// Skip `--wait --timeout`
    pub no_wait: bool,

    /// Ordered `--set` overrides
    pub set_values: Vec<SetValue>,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            release_name: "azure-arc".to_string(),
            namespace: "azure-arc-release".to_string(),
            timeout_secs: 600,
            no_wait: false,
            set_values: vec![
                SetValue::new("global.subscriptionId", "{{ subscription_id }}"),
                SetValue::new("global.resourceGroupName", "{{ resource_group }}"),
                SetValue::new("global.resourceName", "{{ cluster_name }}"),
                SetValue::new("global.location", "{{ location }}"),
                SetValue::new("global.tenantId", "{{ tenant_id }}"),
                SetValue::new("global.onboardingPrivateKey", "{{ private_key }}"),
                SetValue::new("global.azureEnvironment", "{{ cloud_environment }}"),
                SetValue::new("systemDefaultValues.spnOnboarding", "false"),
                SetValue::new("systemDefaultValues.clusterconnect-agent.enabled", "true"),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnboardingConfig {
    /// Cloud CLI executable
    pub cloud_cli: String,

    /// Resource providers registered in order
    pub providers: Vec<String>,

    /// Application whose service principal backs custom locations
    pub custom_locations_app_id: String,

    /// Features enabled on the connected cluster
    pub features: Vec<String>,

    /// Deadline for the extension instance creation
    pub extension_deadline_secs: u64,

    /// Extension instance name template
    pub instance_name: String,
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self {
            cloud_cli: "az".to_string(),
            providers: [
                "Microsoft.ExtendedLocation",
                "Microsoft.Kubernetes",
                "Microsoft.KubernetesConfiguration",
                "Microsoft.IoTOperations",
                "Microsoft.DeviceRegistry",
                "Microsoft.SecretSyncController",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
            custom_locations_app_id: "bc313c14-388c-4e7d-a58e-70017303ee3b".to_string(),
            features: vec!["cluster-connect".to_string(), "custom-locations".to_string()],
            extension_deadline_secs: 15 * 60,
            instance_name: "{{ cluster_name }}-instance".to_string(),
        }
    }
}

impl OnboardingConfig {
    pub fn extension_deadline(&self) -> Duration {
        Duration::from_secs(self.extension_deadline_secs)
    }
}

fn azure_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".azure")
}

impl ProvisioningConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ProvisioningConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `HELMREGISTRY` / `HELMCHART` style overrides
    pub fn with_overrides(mut self, registry: Option<String>, chart: Option<String>) -> Self {
        if let Some(registry) = registry.filter(|r| !r.trim().is_empty()) {
            self.registry.override_path = Some(registry);
        }
        if let Some(chart) = chart.filter(|c| !c.trim().is_empty()) {
            self.package.chart_override = Some(PathBuf::from(chart));
        }
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.client.version.trim().is_empty() {
            anyhow::bail!("client.version must not be empty");
        }
        if self.package.pull_retry.max_attempts == 0 {
            anyhow::bail!("package.pull_retry.max_attempts must be at least 1");
        }
        if self.install.release_name.trim().is_empty() {
            anyhow::bail!("install.release_name must not be empty");
        }
        if self.install.namespace.trim().is_empty() {
            anyhow::bail!("install.namespace must not be empty");
        }
        if self.install.timeout_secs == 0 {
            anyhow::bail!("install.timeout_secs must be at least 1");
        }
        if self.onboarding.extension_deadline_secs == 0 {
            anyhow::bail!("onboarding.extension_deadline_secs must be at least 1");
        }
        if self.onboarding.providers.is_empty() {
            anyhow::bail!("onboarding.providers must list at least one provider");
        }
        if self.onboarding.features.is_empty() {
            anyhow::bail!("onboarding.features must list at least one feature");
        }

        // Check that every set key is unique
        let mut seen_keys = std::collections::HashSet::new();
        for set in &self.install.set_values {
            if set.key.trim().is_empty() {
                anyhow::bail!("install.set_values contains an entry with an empty key");
            }
            if !seen_keys.insert(&set.key) {
                anyhow::bail!("Duplicate set key: {}", set.key);
            }
        }

        let agent_vars: Vec<&str> = TARGET_VARIABLES
            .iter()
            .chain(AGENT_INSTALL_VARIABLES.iter())
            .copied()
            .collect();
        check_template(
            "registry.control_plane_endpoint",
            &self.registry.control_plane_endpoint,
            &agent_vars,
        )?;
        for set in &self.install.set_values {
            check_template(&format!("install.set_values[{}]", set.key), &set.value, &agent_vars)?;
        }

        let onboarding_vars: Vec<&str> = TARGET_VARIABLES
            .iter()
            .chain(ONBOARDING_VARIABLES.iter())
            .copied()
            .collect();
        check_template(
            "onboarding.instance_name",
            &self.onboarding.instance_name,
            &onboarding_vars,
        )?;

        Ok(())
    }
}

fn check_template(field: &str, template: &str, known: &[&str]) -> Result<()> {
    for name in template_variables(template) {
        if !known.contains(&name.as_str()) {
            anyhow::bail!("{} references unknown variable '{}'", field, name);
        }
    }
    Ok(())
}
