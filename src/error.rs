//! Error taxonomy for provisioning runs

use crate::http::TransportError;
use crate::process::ExecutionLaunchError;
use thiserror::Error;

/// Errors raised while provisioning a cluster
///
/// Every variant that wraps an external tool failure keeps the tool's
/// stderr verbatim so the final message is actionable.
#[derive(Debug, Clone, Error)]
pub enum ProvisionError {
    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("unsupported platform '{os}': expected one of windows, linux, darwin")]
    UnsupportedPlatform { os: String },

    #[error("failed to download client binary from {url}: {message}")]
    BinaryDownload { url: String, message: String },

    #[error("failed to extract client binary into {path}: {message}")]
    BinaryExtraction { path: String, message: String },

    #[error("registry lookup for '{package_name}' at {url} failed: {message}")]
    RegistryLookup {
        package_name: String,
        url: String,
        message: String,
    },

    #[error("failed to pull package '{package_name}' from {registry_path}: {last_stderr}")]
    PackagePull {
        package_name: String,
        registry_path: String,
        last_stderr: String,
    },

    #[error("failed to export package '{package_name}' (exit code {exit_code}): {stderr}")]
    PackageExport {
        package_name: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("installation of release '{release}' failed (exit code {exit_code}): {stderr}")]
    Installation {
        release: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("step '{step}' failed (exit code {exit_code}): {stderr}")]
    ExternalCommand {
        step: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("step '{step}' exceeded its deadline of {deadline_secs}s")]
    DeadlineExceeded { step: String, deadline_secs: u64 },

    #[error("step '{step}' requires output '{key}' which no earlier step produced")]
    MissingStepOutput { step: String, key: String },

    #[error(transparent)]
    Launch(#[from] ExecutionLaunchError),
}

impl ProvisionError {
    /// Whether this error is a deadline expiry rather than a hard failure
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, ProvisionError::DeadlineExceeded { .. })
    }

    pub(crate) fn download(url: &str, source: impl std::fmt::Display) -> Self {
        ProvisionError::BinaryDownload {
            url: url.to_string(),
            message: source.to_string(),
        }
    }

    pub(crate) fn extraction(path: &std::path::Path, source: impl std::fmt::Display) -> Self {
        ProvisionError::BinaryExtraction {
            path: path.display().to_string(),
            message: source.to_string(),
        }
    }

    pub(crate) fn lookup(package_name: &str, url: &str, source: &TransportError) -> Self {
        ProvisionError::RegistryLookup {
            package_name: package_name.to_string(),
            url: url.to_string(),
            message: source.to_string(),
        }
    }
}
