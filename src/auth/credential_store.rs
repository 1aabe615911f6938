//! # Credential Store
//!
//! Holds the single current bearer credential. The credential is replaced
//! wholesale (an `Arc` swap under a short write lock), so a reader always sees
//! either the previous credential or the new one.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A bearer token together with the moment it was issued
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub issued_at: DateTime<Utc>,
}

impl Credential {
    pub fn new<S: Into<String>>(token: S, issued_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            issued_at,
        }
    }

    /// Create a credential issued right now
    pub fn issued_now<S: Into<String>>(token: S) -> Self {
        Self::new(token, Utc::now())
    }

    /// A credential is stale once `validity` has elapsed since issuance
    ///
    /// An `issued_at` in the future (clock adjustment) counts as fresh.
    pub fn is_stale(&self, now: DateTime<Utc>, validity: Duration) -> bool {
        match (now - self.issued_at).to_std() {
            Ok(age) => age >= validity,
            Err(_) => false,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Process-wide holder of the current credential
#[derive(Debug, Default)]
pub struct CredentialStore {
    current: RwLock<Option<Arc<Credential>>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current credential, if one has been issued
    pub fn current(&self) -> Option<Arc<Credential>> {
        self.current.read().clone()
    }

    /// Replace the current credential
    pub fn set(&self, credential: Credential) {
        *self.current.write() = Some(Arc::new(credential));
    }
}
