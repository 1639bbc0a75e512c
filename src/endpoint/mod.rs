//! Backend endpoint resolution.
//!
//! The configured endpoint is resolved exactly once at startup. A malformed
//! endpoint is a [`ProxyError::Config`] and keeps the server from starting.

use std::fmt;

use url::Url;

use crate::constants::SIGNABLE_HOST_LABELS;
use crate::error::ProxyError;

/// Scheme used to reach the backend. Anything other than `http` is upgraded
/// to `https`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheme, host and signing scope derived from the configured endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub scheme: Scheme,
    /// Host name, with `:port` appended when the endpoint named a non-default port
    pub host: String,
    /// Signing region, empty when signing is disabled
    pub region: String,
    /// Signing service name, empty when signing is disabled
    pub service: String,
}

impl ResolvedTarget {
    /// Resolve a raw endpoint string.
    ///
    /// When `sign` is true the host must have exactly five labels; the second
    /// and third are taken as region and service.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Config` if the endpoint does not parse, has no host,
    /// or (with signing) does not decompose into region and service.
    pub fn resolve(raw: &str, sign: bool) -> Result<Self, ProxyError> {
        let link = Url::parse(raw.trim()).map_err(|e| {
            ProxyError::Config(format!("failure while parsing endpoint {}: {}", raw, e))
        })?;

        let scheme = match link.scheme() {
            "http" => Scheme::Http,
            _ => Scheme::Https,
        };

        // Unknown schemes sometimes parse without a host
        let host_name = link.host_str().unwrap_or_default();
        if host_name.is_empty() {
            return Err(ProxyError::Config(format!(
                "empty host or protocol information in submitted endpoint ({})",
                raw
            )));
        }

        let (region, service) = if sign {
            let labels: Vec<&str> = host_name.split('.').collect();
            if labels.len() != SIGNABLE_HOST_LABELS {
                return Err(ProxyError::Config(format!(
                    "submitted endpoint ({}) is not a valid signable endpoint",
                    raw
                )));
            }
            (labels[1].to_string(), labels[2].to_string())
        } else {
            (String::new(), String::new())
        };

        let host = match link.port() {
            Some(port) => format!("{}:{}", host_name, port),
            None => host_name.to_string(),
        };

        Ok(Self {
            scheme,
            host,
            region,
            service,
        })
    }

    /// Whether a signing scope was resolved
    pub fn is_signable(&self) -> bool {
        !self.region.is_empty() && !self.service.is_empty()
    }

    /// `scheme://host` prefix for outbound URLs
    pub fn origin(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }
}
