pub mod config;
pub mod error;

pub use config::ProxyConfig;
pub use error::{ProxyError, ProxyResult};
