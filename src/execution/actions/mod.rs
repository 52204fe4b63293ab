//! Step actions for the two provisioning sequences
//!
//! Each action is one [`StepAction`](crate::core::StepAction). Values passed
//! between steps travel through [`StepOutputs`](crate::core::StepOutputs)
//! under the keys below.

pub mod agent;
pub mod onboarding;

pub use agent::{FetchPackage, InstallAgent, InstallClient, ResolveRegistry};
pub use onboarding::{
    ConnectCluster, CreateSchemaRegistry, EnableFeatures, InstallExtension, RegisterProviders,
};

/// Path of the installed package-manager client
pub const CLIENT_PATH: &str = "client_path";
/// Registry location of the agent package
pub const REGISTRY_PATH: &str = "registry_path";
/// Local directory the agent package was exported to
pub const CHART_PATH: &str = "chart_path";
/// Object id of the custom-locations service principal
pub const CUSTOM_LOCATIONS_OID: &str = "custom_locations_oid";
pub const STORAGE_ACCOUNT_ID: &str = "storage_account_id";
pub const SCHEMA_REGISTRY_ID: &str = "schema_registry_id";
