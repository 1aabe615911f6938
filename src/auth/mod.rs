//! # Credential Lifecycle
//!
//! The taxonomy API only accepts OAuth2 bearer tokens, which expire. This
//! module keeps one current credential, issues new ones through the
//! client-credentials grant, and hands out a valid token on demand.

pub mod credential_store;
pub mod token_accessor;
pub mod token_issuer;

pub use credential_store::{Credential, CredentialStore};
pub use token_accessor::TokenAccessor;
pub use token_issuer::{OAuth2TokenIssuer, TokenIssuer};
