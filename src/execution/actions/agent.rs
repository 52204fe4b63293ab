//! Agent-install actions: client bootstrap, registry lookup, package fetch
//! and the release install itself

use super::{CHART_PATH, CLIENT_PATH, REGISTRY_PATH};
use crate::artifact::{ArtifactCache, Platform};
use crate::core::config::InstallConfig;
use crate::core::{render_template, PipelineContext, StepAction, StepEnv, StepOutput};
use crate::error::ProvisionError;
use crate::package::{FetchRequest, PackageFetcher};
use crate::process::CommandSpec;
use crate::registry::RegistryResolver;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Makes sure the pinned client binary is in the local cache
pub struct InstallClient {
    cache: Arc<ArtifactCache>,
    platform: Platform,
    version: String,
}

impl InstallClient {
    pub fn new(cache: Arc<ArtifactCache>, platform: Platform, version: impl Into<String>) -> Self {
        Self {
            cache,
            platform,
            version: version.into(),
        }
    }
}

#[async_trait]
impl StepAction for InstallClient {
    async fn run(&self, _env: &StepEnv<'_>) -> Result<StepOutput, ProvisionError> {
        let path = self
            .cache
            .ensure_binary(&self.platform.os, &self.platform.arch, &self.version)
            .await?;
        Ok(StepOutput::none().with(CLIENT_PATH, path.display().to_string()))
    }
}

/// Asks the control plane where the latest agent package lives
pub struct ResolveRegistry {
    resolver: RegistryResolver,
    endpoint_template: String,
    package_name: String,
}

impl ResolveRegistry {
    pub fn new(
        resolver: RegistryResolver,
        endpoint_template: impl Into<String>,
        package_name: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            endpoint_template: endpoint_template.into(),
            package_name: package_name.into(),
        }
    }
}

#[async_trait]
impl StepAction for ResolveRegistry {
    async fn run(&self, env: &StepEnv<'_>) -> Result<StepOutput, ProvisionError> {
        let endpoint = render_template(
            &self.endpoint_template,
            &env.context.rendering_variables(),
        )?;
        let path = self.resolver.resolve(&endpoint, &self.package_name).await?;
        Ok(StepOutput::none().with(REGISTRY_PATH, path))
    }
}

/// Pulls and exports the agent package with the cached client
pub struct FetchPackage {
    fetcher: PackageFetcher,
    package_name: String,
    export_root: PathBuf,
}

impl FetchPackage {
    pub fn new(
        fetcher: PackageFetcher,
        package_name: impl Into<String>,
        export_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fetcher,
            package_name: package_name.into(),
            export_root: export_root.into(),
        }
    }
}

#[async_trait]
impl StepAction for FetchPackage {
    async fn run(&self, env: &StepEnv<'_>) -> Result<StepOutput, ProvisionError> {
        let registry_path = env.outputs.require(env.step_name, REGISTRY_PATH)?;
        let client_path = env.outputs.require(env.step_name, CLIENT_PATH)?;

        let request = FetchRequest {
            registry_path,
            kube_config: env.context.kube_config.as_deref(),
            kube_context: env.context.kube_context.as_deref(),
            client_path: Path::new(client_path),
            package_name: &self.package_name,
            export_root: &self.export_root,
        };
        let chart = self.fetcher.fetch(env.runner, &request).await?;

        Ok(StepOutput::none().with(CHART_PATH, chart.display().to_string()))
    }
}

/// Installs or upgrades the agent release from the exported package
pub struct InstallAgent {
    install: InstallConfig,
    client_env: Vec<(String, String)>,
}

impl InstallAgent {
    pub fn new(install: InstallConfig, client_env: Vec<(String, String)>) -> Self {
        Self {
            install,
            client_env,
        }
    }

    /// Build the `upgrade --install` invocation
    pub fn command(
        &self,
        client_path: &str,
        chart_path: &str,
        context: &PipelineContext,
    ) -> Result<CommandSpec, ProvisionError> {
        let variables = context.rendering_variables();
        let mut spec = self
            .client_env
            .iter()
            .fold(CommandSpec::new(client_path), |spec, (k, v)| {
                spec.env(k.clone(), v.clone())
            })
            .args([
                "upgrade",
                "--install",
                self.install.release_name.as_str(),
                chart_path,
            ]);

        for set in &self.install.set_values {
            let value = render_template(&set.value, &variables)?;
            spec = spec.arg("--set").arg(format!("{}={}", set.key, value));
        }

        spec = spec
            .args(["--namespace", self.install.namespace.as_str(), "--create-namespace"])
            .args(["--output", "json"]);

        if let Some(config) = &context.kube_config {
            spec = spec.args(["--kubeconfig", config.as_str()]);
        }
        if let Some(kube_context) = &context.kube_context {
            spec = spec.args(["--kube-context", kube_context.as_str()]);
        }
        if !self.install.no_wait {
            spec = spec
                .arg("--wait")
                .arg("--timeout")
                .arg(format!("{}s", self.install.timeout_secs));
        }

        Ok(spec)
    }
}

#[async_trait]
impl StepAction for InstallAgent {
    async fn run(&self, env: &StepEnv<'_>) -> Result<StepOutput, ProvisionError> {
        let client_path = env.outputs.require(env.step_name, CLIENT_PATH)?;
        let chart_path = env.outputs.require(env.step_name, CHART_PATH)?;
        let spec = self.command(client_path, chart_path, env.context)?;

        let result = env.launch(&spec).await?;
        if !result.success() {
            return Err(ProvisionError::Installation {
                release: self.install.release_name.clone(),
                exit_code: result.code(),
                stderr: result.stderr_trimmed().to_string(),
            });
        }

        info!(
            "Release {} installed in namespace {}",
            self.install.release_name, self.install.namespace
        );
        Ok(StepOutput::none())
    }
}
