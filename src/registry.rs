//! Resolves a package name to its registry location via the control plane

use crate::error::ProvisionError;
use crate::http::HttpTransport;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

pub const LOOKUP_API_VERSION: &str = "2019-11-01-preview";

#[derive(Debug, Deserialize)]
struct PackagePathResponse {
    #[serde(rename = "repositoryPath")]
    repository_path: Option<serde_json::Value>,
}

/// Looks up the latest registry path of a package
///
/// No retry happens here; callers wrap it in a policy when they want one.
pub struct RegistryResolver {
    transport: Arc<dyn HttpTransport>,
    override_path: Option<String>,
}

impl RegistryResolver {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            override_path: None,
        }
    }

    /// Use a fixed registry path instead of asking the control plane
    pub fn with_override(mut self, override_path: Option<String>) -> Self {
        self.override_path = override_path.filter(|p| !p.trim().is_empty());
        self
    }

    pub fn lookup_url(endpoint: &str, package_name: &str) -> String {
        format!(
            "{}/{}/GetLatestHelmPackagePath?api-version={}",
            endpoint.trim_end_matches('/'),
            package_name,
            LOOKUP_API_VERSION
        )
    }

    pub async fn resolve(&self, endpoint: &str, package_name: &str) -> Result<String, ProvisionError> {
        if let Some(path) = &self.override_path {
            info!("Using registry path override for {}: {}", package_name, path);
            return Ok(path.clone());
        }

        let url = Self::lookup_url(endpoint, package_name);
        debug!("Resolving registry path for {} via {}", package_name, url);

        let body = self
            .transport
            .post(&url)
            .await
            .map_err(|e| ProvisionError::lookup(package_name, &url, &e))?;

        let malformed = |message: String| ProvisionError::RegistryLookup {
            package_name: package_name.to_string(),
            url: url.clone(),
            message,
        };

        let response: PackagePathResponse = serde_json::from_slice(&body).map_err(|e| {
            malformed(format!(
                "invalid JSON response ({}): {}",
                e,
                String::from_utf8_lossy(&body)
            ))
        })?;

        match response.repository_path {
            Some(serde_json::Value::String(path)) if !path.trim().is_empty() => {
                info!("Resolved {} to {}", package_name, path);
                Ok(path)
            }
            Some(other) => Err(malformed(format!(
                "field 'repositoryPath' is not a non-empty string: {}",
                other
            ))),
            None => Err(malformed(format!(
                "response has no 'repositoryPath' field: {}",
                String::from_utf8_lossy(&body)
            ))),
        }
    }
}
