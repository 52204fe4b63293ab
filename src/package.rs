//! Pulls a package from its registry and exports it to a local directory

use crate::artifact::ArtifactRecord;
use crate::error::ProvisionError;
use crate::process::{CommandRunner, CommandSpec};
use crate::retry::RetryPolicy;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Packages with this prefix ignore the exported-path override
pub const OVERRIDE_EXEMPT_PREFIX: &str = "pre-onboarding";

/// Everything needed to fetch one package
#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    pub registry_path: &'a str,
    pub kube_config: Option<&'a str>,
    pub kube_context: Option<&'a str>,
    pub client_path: &'a Path,
    pub package_name: &'a str,
    pub export_root: &'a Path,
}

impl FetchRequest<'_> {
    fn kube_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(config) = self.kube_config {
            args.push("--kubeconfig".to_string());
            args.push(config.to_string());
        }
        if let Some(context) = self.kube_context {
            args.push("--kube-context".to_string());
            args.push(context.to_string());
        }
        args
    }

    fn client(&self) -> String {
        self.client_path.display().to_string()
    }

    /// Tag of the registry reference, `latest` when there is none
    fn tag(&self) -> &str {
        match self.registry_path.rsplit_once(':') {
            Some((_, tag)) if !tag.contains('/') => tag,
            _ => "latest",
        }
    }
}

/// Pulls (with retry) then exports (without retry) a package
#[derive(Debug, Clone)]
pub struct PackageFetcher {
    pull_policy: RetryPolicy,
    export_override: Option<PathBuf>,
    client_env: Vec<(String, String)>,
}

impl Default for PackageFetcher {
    fn default() -> Self {
        Self {
            pull_policy: RetryPolicy::fixed(5, Duration::from_secs(3)),
            export_override: None,
            client_env: Vec::new(),
        }
    }
}

impl PackageFetcher {
    pub fn new(pull_policy: RetryPolicy) -> Self {
        Self {
            pull_policy,
            ..Default::default()
        }
    }

    /// Return this path instead of the exported one (unless exempt)
    pub fn with_export_override(mut self, path: Option<PathBuf>) -> Self {
        self.export_override = path;
        self
    }

    /// Environment added to every client invocation
    pub fn with_client_env(mut self, env: Vec<(String, String)>) -> Self {
        self.client_env = env;
        self
    }

    fn client_command(&self, request: &FetchRequest<'_>) -> CommandSpec {
        self.client_env
            .iter()
            .fold(CommandSpec::new(request.client()), |spec, (k, v)| {
                spec.env(k.clone(), v.clone())
            })
    }

    pub fn pull_command(&self, request: &FetchRequest<'_>) -> CommandSpec {
        self.client_command(request)
            .args(["chart", "pull", request.registry_path])
            .args(request.kube_args())
    }

    pub fn export_command(&self, request: &FetchRequest<'_>) -> CommandSpec {
        self.client_command(request)
            .args(["chart", "export", request.registry_path, "--destination"])
            .arg(request.export_root.display().to_string())
            .args(request.kube_args())
    }

    /// Fetch the package and return the local path to install from
    pub async fn fetch(
        &self,
        runner: &dyn CommandRunner,
        request: &FetchRequest<'_>,
    ) -> Result<PathBuf, ProvisionError> {
        self.fetch_with_cleanup(runner, request, |root| std::fs::remove_dir_all(root))
            .await
    }

    async fn fetch_with_cleanup<F>(
        &self,
        runner: &dyn CommandRunner,
        request: &FetchRequest<'_>,
        remove: F,
    ) -> Result<PathBuf, ProvisionError>
    where
        F: FnOnce(&Path) -> std::io::Result<()>,
    {
        self.pull(runner, request).await?;
        remove_stale_export(request.export_root, remove);
        self.export(runner, request).await?;

        let exported = ArtifactRecord::directory(
            request.package_name,
            request.tag(),
            request.export_root.join(request.package_name),
        );
        if !exported.is_satisfied() {
            return Err(ProvisionError::PackageExport {
                package_name: request.package_name.to_string(),
                exit_code: 0,
                stderr: format!("export left no files in {}", exported.path.display()),
            });
        }

        match &self.export_override {
            Some(path) if !request.package_name.starts_with(OVERRIDE_EXEMPT_PREFIX) => {
                info!("Using package path override: {:?}", path);
                Ok(path.clone())
            }
            _ => Ok(exported.path),
        }
    }

    async fn pull(
        &self,
        runner: &dyn CommandRunner,
        request: &FetchRequest<'_>,
    ) -> Result<(), ProvisionError> {
        let spec = self.pull_command(request);
        info!("Pulling {} from {}", request.package_name, request.registry_path);

        let outcome = self
            .pull_policy
            .run_command(&format!("chart pull {}", request.package_name), || {
                runner.run(&spec)
            })
            .await;

        let last_stderr = match outcome {
            Ok(result) if result.success() => return Ok(()),
            Ok(result) if result.deadline_exceeded => "pull did not finish in time".to_string(),
            Ok(result) => result.stderr_trimmed().to_string(),
            Err(launch) => launch.to_string(),
        };

        Err(ProvisionError::PackagePull {
            package_name: request.package_name.to_string(),
            registry_path: request.registry_path.to_string(),
            last_stderr,
        })
    }

    async fn export(
        &self,
        runner: &dyn CommandRunner,
        request: &FetchRequest<'_>,
    ) -> Result<(), ProvisionError> {
        let spec = self.export_command(request);
        info!("Exporting {} to {:?}", request.package_name, request.export_root);

        let result = runner.run(&spec).await?;
        if !result.success() {
            return Err(ProvisionError::PackageExport {
                package_name: request.package_name.to_string(),
                exit_code: result.code(),
                stderr: result.stderr_trimmed().to_string(),
            });
        }
        Ok(())
    }
}

/// Best-effort removal of a previous export; failure only warns
fn remove_stale_export<F>(export_root: &Path, remove: F)
where
    F: FnOnce(&Path) -> std::io::Result<()>,
{
    if !export_root.is_dir() {
        return;
    }
    if let Err(e) = remove(export_root) {
        warn!(
            "Unable to clean up packages already present in {:?} ({}). If installation fails, remove the directory and try again.",
            export_root, e
        );
    }
}
