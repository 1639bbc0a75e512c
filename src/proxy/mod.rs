// Proxy module - per-request forwarding pipeline
// Rewrites inbound requests for the resolved backend, signs them, forwards
// them and relays the backend response unchanged.

pub mod helpers;
pub mod upstream;

pub use upstream::{ReqwestUpstream, Upstream};

use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use chrono::Utc;
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Body;

use crate::audit::{
    extract_body_excerpt, AuditLogger, ConsoleSink, FileSink, RequestRecord, ResponseRecord,
};
use crate::config::ProxyConfig;
use crate::credentials::{CredentialProvider, CredentialStore};
use crate::endpoint::ResolvedTarget;
use crate::error::ProxyError;
use crate::signing::RequestSigner;

use helpers::{
    build_outbound_request, dump_request, duplicate_request, error_response,
    outbound_request_uri, relay_response,
};

/// Top-level request handler, shared by every connection task
pub struct ProxyHandler {
    target: ResolvedTarget,
    signer: Option<RequestSigner>,
    upstream: Arc<dyn Upstream>,
    /// Present only when verbose logging is enabled
    audit: Option<AuditLogger>,
    retry_on_stale_credentials: bool,
}

impl ProxyHandler {
    /// Unsigned, unlogged handler for `target`
    pub fn new(target: ResolvedTarget, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            target,
            signer: None,
            upstream,
            audit: None,
            retry_on_stale_credentials: true,
        }
    }

    pub fn with_signer(mut self, signer: RequestSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_retry_on_stale_credentials(mut self, retry: bool) -> Self {
        self.retry_on_stale_credentials = retry;
        self
    }

    /// Assemble the handler from startup configuration.
    ///
    /// Resolves the endpoint, wires the credential store when signing is
    /// enabled and opens the log files when requested.
    ///
    /// # Errors
    ///
    /// `ProxyError::Config` for an unusable endpoint, `ProxyError::Io` if the
    /// log files cannot be created.
    pub fn from_config(
        config: &ProxyConfig,
        credentials: Arc<dyn CredentialProvider>,
        upstream: Arc<dyn Upstream>,
    ) -> Result<Self, ProxyError> {
        let target = ResolvedTarget::resolve(&config.endpoint, config.sign_requests())?;

        let mut handler = Self::new(target, upstream)
            .with_retry_on_stale_credentials(config.retry_on_stale_credentials);

        if config.sign_requests() {
            let store = Arc::new(CredentialStore::new(credentials));
            let signer = RequestSigner::new(store, &handler.target);
            handler = handler.with_signer(signer);
        }

        if config.verbose {
            let mut audit = AuditLogger::new().with_sink(ConsoleSink::stdout(config.prettify));
            if config.log_to_file {
                audit = audit.with_sink(FileSink::create(&config.log_dir)?);
            }
            handler = handler.with_audit(audit);
        }

        Ok(handler)
    }

    pub fn target(&self) -> &ResolvedTarget {
        &self.target
    }

    pub fn is_signing(&self) -> bool {
        self.signer.is_some()
    }

    /// Handle one inbound request. Never fails: per-request errors become an
    /// error response for this caller only.
    pub async fn handle<B>(&self, request: Request<B>, remote_addr: SocketAddr) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: Display,
    {
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        match self.proxy(request, remote_addr).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    method = %method,
                    path = %path,
                    remote_addr = %remote_addr,
                    status = e.status_code().as_u16(),
                    error = %e,
                    "Request failed"
                );
                error_response(&e)
            }
        }
    }

    async fn proxy<B>(&self, request: Request<B>, remote_addr: SocketAddr) -> Result<Response<Full<Bytes>>, ProxyError>
    where
        B: Body<Data = Bytes>,
        B::Error: Display,
    {
        let started = Instant::now();

        let (parts, body) = request.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| ProxyError::InboundBody(e.to_string()))?
            .to_bytes();

        // Only needed for the log excerpt
        let dump = self.audit.as_ref().map(|_| dump_request(&parts, &body));

        let outbound = build_outbound_request(&self.target, &parts, body)?;
        let upstream_response = self.forward(outbound).await?;
        let response = relay_response(&upstream_response);

        let elapsed = started.elapsed().as_secs_f64();

        tracing::debug!(
            method = %parts.method,
            path = %parts.uri.path(),
            status = upstream_response.status().as_u16(),
            elapsed_secs = elapsed,
            "Request forwarded"
        );

        if let (Some(audit), Some(dump)) = (self.audit.as_ref(), dump) {
            let request_record = RequestRecord::new(
                remote_addr.to_string(),
                outbound_request_uri(&parts.uri),
                parts.method.to_string(),
                elapsed,
                extract_body_excerpt(&dump),
            );
            let response_record = ResponseRecord::for_request(
                &request_record,
                String::from_utf8_lossy(upstream_response.body()).into_owned(),
                upstream_response.status().as_u16(),
            );
            audit.log(&request_record, &response_record);
        }

        Ok(response)
    }

    /// Send the request, signing it first when signing is enabled.
    ///
    /// A 403 on a signed request invalidates the ticket it was signed with.
    /// With retries enabled the request is re-signed with fresh credentials
    /// and sent once more; the second response is returned whatever its
    /// status.
    async fn forward(&self, outbound: Request<Bytes>) -> Result<Response<Bytes>, ProxyError> {
        let Some(signer) = self.signer.as_ref() else {
            return self.upstream.send(outbound).await;
        };

        let mut attempt = duplicate_request(&outbound);
        let ticket = signer.sign(&mut attempt, Utc::now()).await?;
        let response = self.upstream.send(attempt).await?;

        if response.status() != StatusCode::FORBIDDEN {
            return Ok(response);
        }

        signer.store().invalidate(&ticket).await;
        if !self.retry_on_stale_credentials {
            tracing::warn!("Backend rejected signed request, credentials invalidated");
            return Ok(response);
        }

        tracing::warn!("Backend rejected signed request, retrying with fresh credentials");
        let mut retry = outbound;
        let ticket = signer.sign(&mut retry, Utc::now()).await?;
        let response = self.upstream.send(retry).await?;

        if response.status() == StatusCode::FORBIDDEN {
            signer.store().invalidate(&ticket).await;
            tracing::warn!("Backend rejected request signed with fresh credentials");
        }
        Ok(response)
    }

    /// Flush log sinks. Called once after the server has drained.
    pub fn shutdown(&self) {
        if let Some(audit) = self.audit.as_ref() {
            audit.flush();
        }
    }
}

impl std::fmt::Debug for ProxyHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyHandler")
            .field("target", &self.target)
            .field("signing", &self.signer.is_some())
            .field("audit", &self.audit)
            .field("retry_on_stale_credentials", &self.retry_on_stale_credentials)
            .finish()
    }
}
