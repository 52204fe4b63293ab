//! HTTP transport used for registry lookups and client downloads

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Minimal HTTP surface the pipeline needs
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// GET a URL and return the full response body
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError>;

    /// POST to a URL with an empty body and return the response body
    async fn post(&self, url: &str) -> Result<Vec<u8>, TransportError>;
}

/// `reqwest`-backed transport
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self { client })
    }

    async fn body(response: reqwest::Response) -> Result<Vec<u8>, TransportError> {
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Self::body(response).await
    }

    async fn post(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_LENGTH, 0)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Self::body(response).await
    }
}
