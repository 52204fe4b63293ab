//! Package-manager client bootstrap
//!
//! Downloads and unpacks a pinned client release into a versioned cache
//! directory. Work is skipped for every file already on disk, so repeated
//! runs do no network or extraction work.

pub mod extract;
pub mod record;

pub use extract::{ArchiveExtractor, DefaultExtractor};
pub use record::{ArtifactKind, ArtifactRecord};

use crate::error::ProvisionError;
use crate::http::HttpTransport;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Name of the client executable inside its archive
pub const CLIENT_NAME: &str = "helm";

/// A supported operating system / architecture pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub const SUPPORTED_OS: [&'static str; 3] = ["windows", "linux", "darwin"];

    pub fn parse(os: &str, arch: &str) -> Result<Self, ProvisionError> {
        let os = os.to_ascii_lowercase();
        if !Self::SUPPORTED_OS.contains(&os.as_str()) {
            return Err(ProvisionError::UnsupportedPlatform { os });
        }
        Ok(Self {
            os,
            arch: arch.to_ascii_lowercase(),
        })
    }

    /// The platform this process runs on, in the client's naming
    pub fn current() -> Result<Self, ProvisionError> {
        let os = match std::env::consts::OS {
            "macos" => "darwin",
            other => other,
        };
        let arch = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            other => other,
        };
        Self::parse(os, arch)
    }

    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }

    fn archive_extension(&self) -> &'static str {
        if self.is_windows() {
            "zip"
        } else {
            "tar.gz"
        }
    }

    fn binary_name(&self) -> String {
        if self.is_windows() {
            format!("{}.exe", CLIENT_NAME)
        } else {
            CLIENT_NAME.to_string()
        }
    }
}

/// Where a given client release lives, remotely and locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientLayout {
    pub download_url: String,
    pub download_path: PathBuf,
    pub install: ArtifactRecord,
}

impl ClientLayout {
    pub fn download_dir(&self) -> &Path {
        self.download_path.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// Versioned local cache of the package-manager client
pub struct ArtifactCache {
    base_dir: PathBuf,
    download_base_url: String,
    transport: Arc<dyn HttpTransport>,
    extractor: Arc<dyn ArchiveExtractor>,
}

impl ArtifactCache {
    pub fn new(
        base_dir: impl Into<PathBuf>,
        download_base_url: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        extractor: Arc<dyn ArchiveExtractor>,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            download_base_url: download_base_url.into(),
            transport,
            extractor,
        }
    }

    /// Compute download URL and local paths without touching the filesystem
    pub fn layout(&self, os: &str, arch: &str, version: &str) -> Result<ClientLayout, ProvisionError> {
        let platform = Platform::parse(os, arch)?;
        let archive_name = format!(
            "{}-{}-{}-{}.{}",
            CLIENT_NAME,
            version,
            platform.os,
            platform.arch,
            platform.archive_extension()
        );
        let version_dir = self.base_dir.join(version);
        let install_path = version_dir
            .join(format!("{}-{}", platform.os, platform.arch))
            .join(platform.binary_name());

        Ok(ClientLayout {
            download_url: format!(
                "{}/{}",
                self.download_base_url.trim_end_matches('/'),
                archive_name
            ),
            download_path: version_dir.join(archive_name),
            install: ArtifactRecord::binary(CLIENT_NAME, version, install_path),
        })
    }

    /// Make sure the client binary for `os`/`arch`/`version` is installed
    ///
    /// Returns the path of the executable.
    pub async fn ensure_binary(
        &self,
        os: &str,
        arch: &str,
        version: &str,
    ) -> Result<PathBuf, ProvisionError> {
        let layout = self.layout(os, arch, version)?;

        if layout.install.is_satisfied() {
            debug!("Client already installed at {:?}", layout.install.path);
            return Ok(layout.install.path);
        }

        if !layout.install.is_present() {
            if layout.download_path.exists() {
                debug!("Client archive already cached at {:?}", layout.download_path);
            } else {
                self.download(&layout).await?;
            }
            if let Err(e) = self.extract(&layout).await {
                // next run downloads a fresh copy
                let _ = tokio::fs::remove_file(&layout.download_path).await;
                return Err(e);
            }
        }

        if !layout.install.is_satisfied() {
            record::mark_executable(&layout.install.path)
                .map_err(|e| ProvisionError::extraction(&layout.install.path, e))?;
        }

        if !layout.install.is_satisfied() {
            return Err(ProvisionError::extraction(
                &layout.install.path,
                "client binary missing or not executable after extraction",
            ));
        }

        Ok(layout.install.path)
    }

    async fn download(&self, layout: &ClientLayout) -> Result<(), ProvisionError> {
        info!("Downloading {} from {}", CLIENT_NAME, layout.download_url);

        // create_dir_all tolerates an existing directory
        tokio::fs::create_dir_all(layout.download_dir())
            .await
            .map_err(|e| ProvisionError::download(&layout.download_url, e))?;

        let body = self
            .transport
            .get_bytes(&layout.download_url)
            .await
            .map_err(|e| ProvisionError::download(&layout.download_url, e))?;

        let partial = layout.download_path.with_extension("part");
        tokio::fs::write(&partial, &body)
            .await
            .map_err(|e| ProvisionError::download(&layout.download_url, e))?;
        tokio::fs::rename(&partial, &layout.download_path)
            .await
            .map_err(|e| ProvisionError::download(&layout.download_url, e))?;

        debug!("Wrote {} bytes to {:?}", body.len(), layout.download_path);
        Ok(())
    }

    async fn extract(&self, layout: &ClientLayout) -> Result<(), ProvisionError> {
        info!("Extracting {:?}", layout.download_path);

        let extractor = Arc::clone(&self.extractor);
        let archive = layout.download_path.clone();
        let destination = layout.download_dir().to_path_buf();

        tokio::task::spawn_blocking(move || extractor.extract(&archive, &destination))
            .await
            .map_err(|e| ProvisionError::extraction(&layout.download_path, e))?
            .map_err(|e| ProvisionError::extraction(&layout.download_path, e))
    }
}
