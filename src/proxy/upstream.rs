//! Upstream forwarding.
//!
//! [`Upstream`] is the single seam between the handler and the network. The
//! production implementation wraps a shared `reqwest::Client`.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};

use crate::error::ProxyError;

/// Sends a fully buffered request to the backend and buffers the response
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, ProxyError>;
}

/// reqwest-backed upstream
///
/// Redirects are not followed, so the caller sees exactly what the backend
/// returned.
#[derive(Debug, Clone)]
pub struct ReqwestUpstream {
    client: reqwest::Client,
}

impl ReqwestUpstream {
    /// # Errors
    ///
    /// Returns `ProxyError::Config` if the HTTP client cannot be created
    /// (e.g., TLS backend initialization failure).
    pub fn new(timeout: Duration) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ProxyError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Upstream for ReqwestUpstream {
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, ProxyError> {
        let request = reqwest::Request::try_from(request)
            .map_err(|e| ProxyError::Request(e.to_string()))?;

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| ProxyError::Upstream(e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| ProxyError::Upstream(format!("failed to read response body: {}", e)))?;

        let mut relayed = Response::new(body);
        *relayed.status_mut() = status;
        *relayed.headers_mut() = headers;
        Ok(relayed)
    }
}
