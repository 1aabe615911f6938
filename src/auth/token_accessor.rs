//! # Token Accessor
//!
//! The only way the rest of the proxy obtains a bearer token. A request path
//! never fails just because the background refresh loop fell behind: if the
//! stored credential is missing or stale, the accessor acquires one inline.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::credential_store::{Credential, CredentialStore};
use super::token_issuer::TokenIssuer;
use crate::core::error::ProxyResult;
use crate::observability::metrics::record_token_acquisition;

pub struct TokenAccessor {
    store: Arc<CredentialStore>,
    issuer: Arc<dyn TokenIssuer>,
    validity: Duration,
    /// Serializes acquisitions so a burst of callers finding a stale
    /// credential results in a single token request
    acquire_lock: Mutex<()>,
}

impl TokenAccessor {
    pub fn new(store: Arc<CredentialStore>, issuer: Arc<dyn TokenIssuer>, validity: Duration) -> Self {
        Self {
            store,
            issuer,
            validity,
            acquire_lock: Mutex::new(()),
        }
    }

    /// Return a valid token, acquiring a new one if the stored credential is
    /// missing or stale
    pub async fn get_valid(&self) -> ProxyResult<String> {
        if let Some(token) = self.fresh_token() {
            return Ok(token);
        }

        let _guard = self.acquire_lock.lock().await;

        // Another caller may have acquired while we waited
        if let Some(token) = self.fresh_token() {
            return Ok(token);
        }

        debug!("No valid credential in store, acquiring inline");
        self.acquire().await
    }

    /// Acquire a new credential regardless of the current one's age
    pub async fn refresh(&self) -> ProxyResult<String> {
        let _guard = self.acquire_lock.lock().await;
        self.acquire().await
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    fn fresh_token(&self) -> Option<String> {
        self.store
            .current()
            .filter(|credential| !credential.is_stale(Utc::now(), self.validity))
            .map(|credential| credential.token.clone())
    }

    async fn acquire(&self) -> ProxyResult<String> {
        match self.issuer.issue_token().await {
            Ok(token) => {
                self.store.set(Credential::issued_now(token.clone()));
                record_token_acquisition(true);
                info!("🔑 Acquired new access token");
                Ok(token)
            }
            Err(e) => {
                record_token_acquisition(false);
                warn!("Token acquisition failed: {}", e);
                Err(e)
            }
        }
    }
}
