//! Credential tickets and the shared cache the signer draws them from.
//!
//! The provider chain itself (environment, shared files, instance metadata)
//! lives behind [`CredentialProvider`]. [`CredentialStore`] only caches what the
//! chain returns and drops it when the backend rejects a signed request.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use aws_config::default_provider::credentials::DefaultCredentialsChain;
use aws_credential_types::provider::ProvideCredentials;
use tokio::sync::Mutex;

use crate::error::ProxyError;

/// Temporary access key / secret / session token triple
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialTicket {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub expiry: Option<SystemTime>,
}

impl CredentialTicket {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
            expiry: None,
        }
    }

    pub fn with_expiry(mut self, expiry: SystemTime) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// True once the provider-reported expiry has passed
    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.expiry.is_some_and(|expiry| expiry <= now)
    }
}

impl fmt::Debug for CredentialTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialTicket")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "** redacted **"),
            )
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Source of fresh credential tickets
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn acquire(&self) -> Result<CredentialTicket, ProxyError>;
}

/// Default AWS provider chain: environment variables, shared credential and
/// config files, web identity, then container/instance metadata.
pub struct AwsCredentialChain {
    chain: DefaultCredentialsChain,
}

impl AwsCredentialChain {
    pub async fn from_env() -> Self {
        Self {
            chain: DefaultCredentialsChain::builder().build().await,
        }
    }
}

#[async_trait]
impl CredentialProvider for AwsCredentialChain {
    async fn acquire(&self) -> Result<CredentialTicket, ProxyError> {
        let creds = self
            .chain
            .provide_credentials()
            .await
            .map_err(|e| ProxyError::Credentials(format!("error while getting AWS creds: {}", e)))?;

        let ticket = CredentialTicket::new(
            creds.access_key_id(),
            creds.secret_access_key(),
            creds.session_token().map(str::to_string),
        );
        Ok(match creds.expiry() {
            Some(expiry) => ticket.with_expiry(expiry),
            None => ticket,
        })
    }
}

/// Provider that always hands out the same ticket
#[derive(Debug, Clone)]
pub struct StaticCredentialProvider {
    ticket: CredentialTicket,
}

impl StaticCredentialProvider {
    pub fn new(ticket: CredentialTicket) -> Self {
        Self { ticket }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn acquire(&self) -> Result<CredentialTicket, ProxyError> {
        Ok(self.ticket.clone())
    }
}

/// Lazily populated, shared credential cache
///
/// Concurrent callers that find the cache empty wait on the same lock, so a
/// burst of requests after an invalidation triggers a single acquisition.
pub struct CredentialStore {
    provider: Arc<dyn CredentialProvider>,
    cached: Mutex<Option<Arc<CredentialTicket>>>,
}

impl CredentialStore {
    pub fn new(provider: Arc<dyn CredentialProvider>) -> Self {
        Self {
            provider,
            cached: Mutex::new(None),
        }
    }

    /// Return the cached ticket, acquiring a new one if absent or expired
    pub async fn get_or_acquire(&self) -> Result<Arc<CredentialTicket>, ProxyError> {
        let mut cached = self.cached.lock().await;

        if let Some(ticket) = cached.as_ref() {
            if !ticket.is_expired(SystemTime::now()) {
                return Ok(Arc::clone(ticket));
            }
            tracing::debug!("Cached credentials expired");
        }

        let ticket = Arc::new(self.provider.acquire().await?);
        tracing::info!(
            access_key_id = %ticket.access_key_id,
            "Generated fresh AWS credentials"
        );
        *cached = Some(Arc::clone(&ticket));
        Ok(ticket)
    }

    /// Drop the cached ticket if it is still the one the caller signed with
    ///
    /// A ticket already replaced by a concurrent request is left alone.
    pub async fn invalidate(&self, stale: &Arc<CredentialTicket>) {
        let mut cached = self.cached.lock().await;
        if cached.as_ref().is_some_and(|current| Arc::ptr_eq(current, stale)) {
            *cached = None;
            tracing::info!(
                access_key_id = %stale.access_key_id,
                "Invalidated cached AWS credentials"
            );
        }
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore").finish_non_exhaustive()
    }
}
