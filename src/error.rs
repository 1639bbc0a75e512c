// Error types module

use http::StatusCode;
use thiserror::Error;

/// Centralized error type for the proxy
///
/// Startup failures (`Config`, `Io`) stop the process before it serves.
/// Everything else is scoped to a single request and maps to an HTTP status
/// via [`ProxyError::status_code`].
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Invalid endpoint or server configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The credential provider chain could not supply a ticket
    #[error("Credential error: {0}")]
    Credentials(String),

    /// Reading the inbound request body failed
    #[error("Inbound request error: {0}")]
    InboundBody(String),

    /// The outbound request could not be constructed
    #[error("Request construction error: {0}")]
    Request(String),

    /// The upstream call failed or its body could not be read
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Writing to a log sink failed
    #[error("Log sink error: {0}")]
    Sink(String),

    /// Startup I/O failure (log files, listener)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    /// Maps a per-request error to the status returned to the caller
    ///
    /// Status mapping:
    /// - Credentials → 503 (transient, the next request re-acquires)
    /// - InboundBody → 400
    /// - Upstream → 502
    /// - everything else → 500
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::Credentials(_) => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::InboundBody(_) => StatusCode::BAD_REQUEST,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Config(_)
            | ProxyError::Request(_)
            | ProxyError::Sink(_)
            | ProxyError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
