// Configuration module

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    DEFAULT_LISTEN_HOST, DEFAULT_LOG_DIR, DEFAULT_PORT, DEFAULT_READ_TIMEOUT_SECS,
    DEFAULT_SHUTDOWN_GRACE_SECS, DEFAULT_WRITE_TIMEOUT_SECS,
};
use crate::error::ProxyError;

fn default_listen() -> String {
    format!("{}:{}", DEFAULT_LISTEN_HOST, DEFAULT_PORT)
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_DIR)
}

fn default_true() -> bool {
    true
}

fn default_read_timeout() -> u64 {
    DEFAULT_READ_TIMEOUT_SECS
}

fn default_write_timeout() -> u64 {
    DEFAULT_WRITE_TIMEOUT_SECS
}

fn default_shutdown_grace() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_SECS
}

/// Process-wide proxy configuration, built once at startup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProxyConfig {
    /// Backend endpoint URL
    pub endpoint: String,
    /// Address the proxy listens on
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Print each request/response pair
    #[serde(default)]
    pub verbose: bool,
    /// Pretty console output
    #[serde(default)]
    pub prettify: bool,
    /// Write paired request/response log files
    #[serde(default)]
    pub log_to_file: bool,
    /// Forward requests unsigned
    #[serde(default)]
    pub no_sign: bool,
    /// Directory for the request/response log files
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Retry once with fresh credentials when a signed request gets a 403
    #[serde(default = "default_true")]
    pub retry_on_stale_credentials: bool,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// Also bounds the upstream call
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

impl ProxyConfig {
    /// Configuration with defaults for everything but the endpoint
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            listen: default_listen(),
            verbose: false,
            prettify: false,
            log_to_file: false,
            no_sign: false,
            log_dir: default_log_dir(),
            retry_on_stale_credentials: true,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            write_timeout_secs: DEFAULT_WRITE_TIMEOUT_SECS,
            shutdown_grace_secs: DEFAULT_SHUTDOWN_GRACE_SECS,
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ProxyError> {
        serde_yaml::from_str(yaml).map_err(|e| ProxyError::Config(e.to_string()))
    }

    /// Parse YAML after replacing `${VAR_NAME}` with environment values
    pub fn from_yaml_with_env(yaml: &str) -> Result<Self, ProxyError> {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
            .map_err(|e| ProxyError::Config(e.to_string()))?;

        let mut missing = None;
        let substituted = re.replace_all(yaml, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| {
                missing.get_or_insert_with(|| var_name.to_string());
                String::new()
            })
        });

        if let Some(var_name) = missing {
            return Err(ProxyError::Config(format!(
                "Environment variable '{}' is referenced but not set",
                var_name
            )));
        }

        Self::from_yaml(&substituted)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ProxyError> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| ProxyError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml_with_env(&yaml)
    }

    pub fn validate(&self) -> Result<(), ProxyError> {
        if self.endpoint.trim().is_empty() {
            return Err(ProxyError::Config(
                "You need to specify the search service endpoint".to_string(),
            ));
        }
        self.listen_addr()?;
        if self.read_timeout_secs == 0 || self.write_timeout_secs == 0 {
            return Err(ProxyError::Config(
                "read and write timeouts must be greater than zero".to_string(),
            ));
        }
        if self.prettify && !self.verbose {
            tracing::warn!("pretty output has no effect without verbose logging");
        }
        if self.log_to_file && !self.verbose {
            tracing::warn!("log files are only written when verbose logging is enabled");
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ProxyError> {
        self.listen
            .parse()
            .map_err(|e| ProxyError::Config(format!("invalid listen address {}: {}", self.listen, e)))
    }

    pub fn sign_requests(&self) -> bool {
        !self.no_sign
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
