//! The two fixed step sequences, built from configuration

use crate::{
    artifact::{ArchiveExtractor, ArtifactCache, Platform},
    core::{config::ProvisioningConfig, FailurePolicy, Pipeline, Step},
    execution::actions::{
        ConnectCluster, CreateSchemaRegistry, EnableFeatures, FetchPackage, InstallAgent,
        InstallClient, InstallExtension, RegisterProviders, ResolveRegistry,
    },
    http::HttpTransport,
    package::PackageFetcher,
    registry::RegistryResolver,
};
use std::sync::Arc;

pub const AGENT_INSTALL_PIPELINE: &str = "agent-install";
pub const ONBOARDING_PIPELINE: &str = "cluster-onboarding";

/// Collaborators the agent-install sequence needs beyond a command runner
#[derive(Clone)]
pub struct AgentInstallDeps {
    pub transport: Arc<dyn HttpTransport>,
    pub extractor: Arc<dyn ArchiveExtractor>,
    pub platform: Platform,
}

/// install-client → resolve-registry → fetch-package → install-agent
pub fn agent_install(config: &ProvisioningConfig, deps: AgentInstallDeps) -> Pipeline {
    let cache = Arc::new(ArtifactCache::new(
        config.client.cache_dir(),
        config.client.download_base_url.clone(),
        deps.transport.clone(),
        deps.extractor,
    ));
    let resolver = RegistryResolver::new(deps.transport)
        .with_override(config.registry.override_path.clone());
    let fetcher = PackageFetcher::new(config.package.pull_retry)
        .with_export_override(config.package.chart_override.clone())
        .with_client_env(config.client.env());

    Pipeline::new(
        AGENT_INSTALL_PIPELINE,
        vec![
            Step::new(
                "install-client",
                InstallClient::new(cache, deps.platform, config.client.version.clone()),
            )
            .with_description("Ensure the package-manager client is cached"),
            Step::new(
                "resolve-registry",
                ResolveRegistry::new(
                    resolver,
                    config.registry.control_plane_endpoint.clone(),
                    config.registry.package_name.clone(),
                ),
            )
            .with_description("Resolve the agent package's registry path"),
            Step::new(
                "fetch-package",
                FetchPackage::new(
                    fetcher,
                    config.registry.package_name.clone(),
                    config.package.export_root(),
                ),
            )
            .with_description("Pull and export the agent package"),
            Step::new(
                "install-agent",
                InstallAgent::new(config.install.clone(), config.client.env()),
            )
            .with_description("Install the agent release on the cluster"),
        ],
    )
}

/// register-providers → connect-cluster → enable-features →
/// create-schema-registry → install-extension
pub fn onboarding(config: &ProvisioningConfig) -> Pipeline {
    let onboarding = &config.onboarding;
    let cli = onboarding.cloud_cli.as_str();

    Pipeline::new(
        ONBOARDING_PIPELINE,
        vec![
            Step::new(
                "register-providers",
                RegisterProviders::new(cli, onboarding.providers.clone()),
            )
            .with_description("Register cloud resource providers"),
            Step::new("connect-cluster", ConnectCluster::new(cli))
                .with_description("Connect the cluster to the control plane"),
            Step::new(
                "enable-features",
                EnableFeatures::new(
                    cli,
                    onboarding.custom_locations_app_id.clone(),
                    onboarding.features.clone(),
                ),
            )
            .with_description("Enable connected-cluster features"),
            Step::new("create-schema-registry", CreateSchemaRegistry::new(cli))
                .with_description("Create the storage account and schema registry"),
            Step::new(
                "install-extension",
                InstallExtension::new(
                    cli,
                    onboarding.instance_name.clone(),
                    onboarding.extension_deadline(),
                ),
            )
            .with_description("Initialize the cluster and create the extension instance")
            .with_failure_policy(FailurePolicy::TimeoutTolerant),
        ],
    )
}
