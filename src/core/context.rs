//! Pipeline context - immutable run parameters and step outputs

use crate::error::ProvisionError;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// The cluster and cloud account a run targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterTarget {
    pub subscription_id: String,
    pub resource_group: String,
    pub cluster_name: String,
    pub location: String,
    pub tenant_id: String,
    pub cloud_environment: String,
}

/// Parameters that only one of the sequences needs
#[derive(Clone, PartialEq, Eq)]
pub enum ContextMode {
    AgentInstall {
        private_key: String,
    },
    Onboarding {
        custom_location_id: String,
        storage_account: String,
        schema_registry: String,
        schema_registry_namespace: String,
    },
}

impl fmt::Debug for ContextMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextMode::AgentInstall { .. } => f
                .debug_struct("AgentInstall")
                .field("private_key", &"***")
                .finish(),
            ContextMode::Onboarding {
                custom_location_id,
                storage_account,
                schema_registry,
                schema_registry_namespace,
            } => f
                .debug_struct("Onboarding")
                .field("custom_location_id", custom_location_id)
                .field("storage_account", storage_account)
                .field("schema_registry", schema_registry)
                .field("schema_registry_namespace", schema_registry_namespace)
                .finish(),
        }
    }
}

/// Variables every context renders
pub const TARGET_VARIABLES: [&str; 6] = [
    "subscription_id",
    "resource_group",
    "cluster_name",
    "location",
    "tenant_id",
    "cloud_environment",
];

/// Variables only the agent-install context renders
pub const AGENT_INSTALL_VARIABLES: [&str; 1] = ["private_key"];

/// Variables only the onboarding context renders
pub const ONBOARDING_VARIABLES: [&str; 4] = [
    "custom_location_id",
    "storage_account",
    "schema_registry",
    "schema_registry_namespace",
];

/// Read-only parameter set for one pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineContext {
    pub target: ClusterTarget,

    /// Kubeconfig file passed to the package-manager client
    pub kube_config: Option<String>,

    /// Kubeconfig context passed to the package-manager client
    pub kube_context: Option<String>,

    pub mode: ContextMode,
}

impl PipelineContext {
    /// Context for the agent-install sequence
    pub fn agent_install(target: ClusterTarget, private_key: impl Into<String>) -> Self {
        Self {
            target,
            kube_config: None,
            kube_context: None,
            mode: ContextMode::AgentInstall {
                private_key: private_key.into(),
            },
        }
    }

    /// Context for the onboarding sequence
    pub fn onboarding(
        target: ClusterTarget,
        custom_location_id: impl Into<String>,
        storage_account: impl Into<String>,
        schema_registry: impl Into<String>,
        schema_registry_namespace: impl Into<String>,
    ) -> Self {
        Self {
            target,
            kube_config: None,
            kube_context: None,
            mode: ContextMode::Onboarding {
                custom_location_id: custom_location_id.into(),
                storage_account: storage_account.into(),
                schema_registry: schema_registry.into(),
                schema_registry_namespace: schema_registry_namespace.into(),
            },
        }
    }

    pub fn with_kube(mut self, kube_config: Option<String>, kube_context: Option<String>) -> Self {
        self.kube_config = kube_config;
        self.kube_context = kube_context;
        self
    }

    /// Reject empty parameters before anything runs
    pub fn validate(&self) -> Result<(), ProvisionError> {
        let mut empty: Vec<String> = self
            .rendering_variables()
            .into_iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(key, _)| key)
            .collect();
        empty.sort();

        if empty.is_empty() {
            Ok(())
        } else {
            Err(ProvisionError::Argument(format!(
                "missing required value(s): {}",
                empty.join(", ")
            )))
        }
    }

    /// Variables available to `{{ name }}` templates
    pub fn rendering_variables(&self) -> HashMap<String, String> {
        let t = &self.target;
        let mut vars: HashMap<String, String> = [
            ("subscription_id", &t.subscription_id),
            ("resource_group", &t.resource_group),
            ("cluster_name", &t.cluster_name),
            ("location", &t.location),
            ("tenant_id", &t.tenant_id),
            ("cloud_environment", &t.cloud_environment),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();

        match &self.mode {
            ContextMode::AgentInstall { private_key } => {
                vars.insert("private_key".to_string(), private_key.clone());
            }
            ContextMode::Onboarding {
                custom_location_id,
                storage_account,
                schema_registry,
                schema_registry_namespace,
            } => {
                vars.insert("custom_location_id".to_string(), custom_location_id.clone());
                vars.insert("storage_account".to_string(), storage_account.clone());
                vars.insert("schema_registry".to_string(), schema_registry.clone());
                vars.insert(
                    "schema_registry_namespace".to_string(),
                    schema_registry_namespace.clone(),
                );
            }
        }

        vars
    }

    /// Values that must never appear in logs
    pub fn secrets(&self) -> Vec<String> {
        match &self.mode {
            ContextMode::AgentInstall { private_key } => vec![private_key.clone()],
            ContextMode::Onboarding { .. } => Vec::new(),
        }
    }

    /// Onboarding resources, or an argument error for other contexts
    pub fn onboarding_resources(&self) -> Result<OnboardingResources<'_>, ProvisionError> {
        match &self.mode {
            ContextMode::Onboarding {
                custom_location_id,
                storage_account,
                schema_registry,
                schema_registry_namespace,
            } => Ok(OnboardingResources {
                custom_location_id,
                storage_account,
                schema_registry,
                schema_registry_namespace,
            }),
            ContextMode::AgentInstall { .. } => Err(ProvisionError::Argument(
                "onboarding step run with an agent-install context".to_string(),
            )),
        }
    }
}

/// Borrowed view of the onboarding-only parameters
#[derive(Debug, Clone, Copy)]
pub struct OnboardingResources<'a> {
    pub custom_location_id: &'a str,
    pub storage_account: &'a str,
    pub schema_registry: &'a str,
    pub schema_registry_namespace: &'a str,
}

/// Values produced by completed steps, keyed by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutputs {
    values: BTreeMap<String, String>,
}

impl StepOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Get an output a step depends on
    pub fn require(&self, step: &str, key: &str) -> Result<&str, ProvisionError> {
        self.get(key).ok_or_else(|| ProvisionError::MissingStepOutput {
            step: step.to_string(),
            key: key.to_string(),
        })
    }
}
