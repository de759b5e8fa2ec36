//! Transport abstraction and the reqwest-backed HTTP transport.

use async_trait::async_trait;
use prism_core::{TransportCachePolicy, TransportError};
use std::time::Duration;

/// Header carrying the request signature.
pub const CACHE_KEY_HEADER: &str = "X-Prism-Cache-Key";

/// Header carrying the transport cache policy.
pub const CACHE_POLICY_HEADER: &str = "X-Prism-Cache-Policy";

/// One request handed to a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    pub server_url: String,
    pub operation_name: String,
    /// Hex SHA-256 of `body`; identical operations share it.
    pub signature: String,
    pub body: Vec<u8>,
    pub cache_policy: TransportCachePolicy,
}

/// Executes requests against the server.
///
/// Implementations return the raw response bytes of a successful exchange
/// and never retry. Dropping the returned future aborts the request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &TransportRequest) -> Result<Vec<u8>, TransportError>;
}

/// HTTP transport over a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport with its own connection pool.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Io {
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }

    /// Wrap an existing client, sharing its connection pool.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: &TransportRequest) -> Result<Vec<u8>, TransportError> {
        let response = self
            .client
            .post(&request.server_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::ACCEPT, "application/json")
            .header(CACHE_KEY_HEADER, &request.signature)
            .header(CACHE_POLICY_HEADER, request.cache_policy.header_value())
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| TransportError::Io {
                reason: e.to_string(),
            })?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| TransportError::Io {
            reason: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        tracing::trace!(
            operation = %request.operation_name,
            status = status.as_u16(),
            bytes = bytes.len(),
            "Transport response received"
        );
        Ok(bytes.to_vec())
    }
}
