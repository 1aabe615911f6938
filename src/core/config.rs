//! # Configuration Module
//!
//! Configuration for the proxy is read from a YAML file, then individual
//! settings can be overridden through environment variables, and finally the
//! result is validated as a whole.
//!
//! ## Key Features
//! - YAML configuration parsing with serde (every section has defaults)
//! - Human readable durations (`"15m"`, `"12h"`) through `humantime_serde`
//! - Environment variable override support (`ICD_CLIENT_ID`, `PROXY_*`)
//! - Validation that reports every problem at once
//!
//! The client credentials are normally supplied only through the environment,
//! so a missing configuration file is not an error: defaults plus environment
//! overrides are used instead.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::caching::key_generator::release_endpoint;
use crate::core::error::{ProxyError, ProxyResult};

/// Environment variable holding the configuration file path
pub const CONFIG_PATH_ENV: &str = "PROXY_CONFIG_PATH";

/// Configuration file used when `PROXY_CONFIG_PATH` is not set
pub const DEFAULT_CONFIG_PATH: &str = "config/proxy.yaml";

/// Main proxy configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Inbound HTTP listener
    pub server: ServerConfig,

    /// Taxonomy API location and request conventions
    pub upstream: UpstreamConfig,

    /// OAuth2 client credentials and token lifecycle
    pub credentials: CredentialsConfig,

    /// Cache store backend and TTL policies
    pub cache: CacheConfig,

    /// Pre-fetch walks and the scheduled full-tree refresh
    pub precache: PrecacheConfig,

    pub logging: LoggingConfig,

    pub metrics: MetricsConfig,
}

impl ProxyConfig {
    /// Load configuration from the path named by `PROXY_CONFIG_PATH`, falling
    /// back to `config/proxy.yaml`
    pub async fn load() -> ProxyResult<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_or_default(path).await
    }

    /// Load configuration from a YAML file, or start from defaults when the file
    /// does not exist. Environment overrides and validation apply either way.
    pub async fn load_or_default<P: AsRef<Path>>(path: P) -> ProxyResult<Self> {
        let path = path.as_ref();
        let exists = tokio::fs::try_exists(path).await.unwrap_or(false);

        let mut config = if exists {
            Self::read_file(path).await?
        } else {
            Self::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file that must exist
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> ProxyResult<Self> {
        let mut config = Self::read_file(path.as_ref()).await?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    async fn read_file(path: &Path) -> ProxyResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ProxyError::config(format!("Failed to read config file {}: {}", path.display(), e)))?;

        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML text without applying overrides
    pub fn from_yaml_str(content: &str) -> ProxyResult<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| ProxyError::config(format!("Failed to parse config: {}", e)))
    }

    /// Apply environment variable overrides
    ///
    /// The credential variables keep the names the taxonomy API documentation
    /// uses (`ICD_CLIENT_ID`, `ICD_CLIENT_SECRET`); everything else follows the
    /// pattern `PROXY_<SECTION>_<FIELD>`.
    pub fn apply_env_overrides(&mut self) -> ProxyResult<()> {
        use std::env;

        if let Ok(client_id) = env::var("ICD_CLIENT_ID") {
            self.credentials.client_id = client_id;
        }

        if let Ok(client_secret) = env::var("ICD_CLIENT_SECRET") {
            self.credentials.client_secret = client_secret;
        }

        if let Ok(port) = env::var("PROXY_SERVER_PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| ProxyError::config(format!("Invalid PROXY_SERVER_PORT: {}", e)))?;
        }

        if let Ok(addr) = env::var("PROXY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = addr;
        }

        if let Ok(url) = env::var("PROXY_REDIS_URL") {
            self.cache.redis_url = url;
        }

        if let Ok(backend) = env::var("PROXY_CACHE_BACKEND") {
            self.cache.backend = backend.parse()?;
        }

        if let Ok(level) = env::var("PROXY_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(format) = env::var("PROXY_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate the whole configuration, reporting every problem found
    pub fn validate(&self) -> ProxyResult<()> {
        let mut errors = Vec::new();

        if self.server.bind_address.is_empty() {
            errors.push("server.bind_address cannot be empty".to_string());
        }

        if let Err(e) = Url::parse(&self.upstream.base_url) {
            errors.push(format!("upstream.base_url '{}' is not a valid URL: {}", self.upstream.base_url, e));
        }

        if self.upstream.default_release.is_empty() {
            errors.push("upstream.default_release cannot be empty".to_string());
        }

        if self.upstream.request_timeout.is_zero() {
            errors.push("upstream.request_timeout must be greater than 0".to_string());
        }

        if let Err(e) = Url::parse(&self.credentials.token_url) {
            errors.push(format!("credentials.token_url '{}' is not a valid URL: {}", self.credentials.token_url, e));
        }

        if self.credentials.client_id.is_empty() {
            errors.push("credentials.client_id is required (set ICD_CLIENT_ID)".to_string());
        }

        if self.credentials.client_secret.is_empty() {
            errors.push("credentials.client_secret is required (set ICD_CLIENT_SECRET)".to_string());
        }

        if self.credentials.validity.is_zero() {
            errors.push("credentials.validity must be greater than 0".to_string());
        }

        if self.credentials.refresh_interval.is_zero() {
            errors.push("credentials.refresh_interval must be greater than 0".to_string());
        }

        if self.credentials.retry_backoff.is_zero() {
            errors.push("credentials.retry_backoff must be greater than 0".to_string());
        }

        if self.cache.node_ttl.is_zero() || self.cache.search_ttl.is_zero() {
            errors.push("cache TTLs must be greater than 0".to_string());
        }

        if self.cache.backend == CacheBackend::Redis && self.cache.redis_url.is_empty() {
            errors.push("cache.redis_url is required for the redis backend".to_string());
        }

        if self.cache.backend == CacheBackend::Memory && self.cache.max_entries == 0 {
            errors.push("cache.max_entries must be greater than 0".to_string());
        }

        if self.precache.queue_capacity == 0 {
            errors.push("precache.queue_capacity must be greater than 0".to_string());
        }

        if self.precache.refresh_interval.is_zero() {
            errors.push("precache.refresh_interval must be greater than 0".to_string());
        }

        if self.precache.retry_backoff.is_zero() {
            errors.push("precache.retry_backoff must be greater than 0".to_string());
        }

        match self.logging.format.as_str() {
            "json" | "pretty" => {}
            other => errors.push(format!("logging.format must be 'json' or 'pretty', got '{}'", other)),
        }

        if !errors.is_empty() {
            return Err(ProxyError::config(format!(
                "Configuration validation failed:\n{}",
                errors.join("\n")
            )));
        }

        Ok(())
    }

    /// Host name of the taxonomy API, used to restrict node-by-URL lookups
    pub fn upstream_host(&self) -> Option<String> {
        Url::parse(&self.upstream.base_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
    }

    /// Root of the scheduled full-tree walk: the default release's linearization
    pub fn canonical_root_url(&self) -> String {
        format!(
            "{}/{}",
            self.upstream.base_url.trim_end_matches('/'),
            release_endpoint(&self.upstream.default_release)
        )
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,

    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            bind_address: "0.0.0.0".to_string(),
        }
    }
}

/// Taxonomy API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL every endpoint path is appended to
    pub base_url: String,

    /// Value of the `API-Version` request header
    pub api_version: String,

    /// Value of the `Accept-Language` request header
    pub accept_language: String,

    /// Release used when a caller does not name one, and by the full-tree refresh
    pub default_release: String,

    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://id.who.int/icd".to_string(),
            api_version: "v2".to_string(),
            accept_language: "en".to_string(),
            default_release: "2019-04".to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// OAuth2 client-credentials configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub token_url: String,

    pub client_id: String,

    #[serde(skip_serializing)]
    pub client_secret: String,

    pub scope: String,

    /// How long an acquired token is trusted before it is considered stale
    #[serde(with = "humantime_serde")]
    pub validity: Duration,

    /// Period of the background token refresh loop
    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,

    /// Delay before retrying after a failed background acquisition
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scope", &self.scope)
            .field("validity", &self.validity)
            .field("refresh_interval", &self.refresh_interval)
            .field("retry_backoff", &self.retry_backoff)
            .finish()
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            token_url: "https://icdaccessmanagement.who.int/connect/token".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            scope: "icdapi_access".to_string(),
            validity: Duration::from_secs(15 * 60),
            refresh_interval: Duration::from_secs(15 * 60),
            retry_backoff: Duration::from_secs(60),
        }
    }
}

/// Which cache store implementation to run with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Redis,
}

impl std::str::FromStr for CacheBackend {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => Err(ProxyError::config(format!(
                "Invalid PROXY_CACHE_BACKEND: '{}' (expected 'memory' or 'redis')",
                other
            ))),
        }
    }
}

/// Cache store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,

    pub redis_url: String,

    /// Prefix prepended to every Redis key (empty by default)
    pub key_prefix: String,

    /// TTL for chapter listings and nodes
    #[serde(with = "humantime_serde")]
    pub node_ttl: Duration,

    /// TTL for search results
    #[serde(with = "humantime_serde")]
    pub search_ttl: Duration,

    /// Entry limit of the in-memory backend
    pub max_entries: usize,

    /// How often the in-memory backend sweeps expired entries
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Redis,
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: String::new(),
            node_ttl: Duration::from_secs(12 * 60 * 60),
            search_ttl: Duration::from_secs(60 * 60),
            max_entries: 100_000,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// Pre-fetch and scheduled refresh configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrecacheConfig {
    /// Period of the full-tree refresh
    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,

    /// Delay before retrying a failed full-tree refresh
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,

    /// Delay before the first full-tree refresh after startup
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Depth budget of the full-tree refresh
    pub full_tree_depth: u32,

    /// Depth budget of walks started by a read-through miss
    pub on_miss_depth: u32,

    /// Capacity of the miss-driven walk queue
    pub queue_capacity: usize,
}

impl Default for PrecacheConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(12 * 60 * 60),
            retry_backoff: Duration::from_secs(5 * 60),
            initial_delay: Duration::ZERO,
            full_tree_depth: 2,
            on_miss_depth: 1,
            queue_capacity: 64,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,

    /// `json` or `pretty`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Install the Prometheus recorder and serve `/metrics`
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::TempDir;

    fn valid_config() -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.credentials.client_id = "client".to_string();
        config.credentials.client_secret = "secret".to_string();
        config
    }

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.upstream.base_url, "https://id.who.int/icd");
        assert_eq!(config.upstream.api_version, "v2");
        assert_eq!(config.credentials.scope, "icdapi_access");
        assert_eq!(config.credentials.validity, Duration::from_secs(900));
        assert_eq!(config.cache.node_ttl, Duration::from_secs(43_200));
        assert_eq!(config.cache.search_ttl, Duration::from_secs(3_600));
        assert_eq!(config.precache.full_tree_depth, 2);
    }

    #[test]
    fn test_default_config_requires_credentials() {
        let err = ProxyConfig::default().validate().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("client_id"));
        assert!(message.contains("client_secret"));

        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_config_validation_errors() {
        let mut config = valid_config();
        config.upstream.base_url = "not a url".to_string();
        config.precache.queue_capacity = 0;
        config.logging.format = "xml".to_string();

        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("upstream.base_url"));
        assert!(message.contains("queue_capacity"));
        assert!(message.contains("logging.format"));
    }

    #[test]
    fn test_zero_retry_backoff_is_rejected() {
        let mut config = valid_config();
        config.credentials.retry_backoff = Duration::ZERO;
        config.precache.retry_backoff = Duration::ZERO;

        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("credentials.retry_backoff"));
        assert!(message.contains("precache.retry_backoff"));
    }

    #[test]
    fn test_parse_yaml_with_durations() {
        let yaml = r#"
upstream:
  default_release: "2024-01"
cache:
  backend: memory
  node_ttl: "6h"
  search_ttl: "30m"
precache:
  initial_delay: "10s"
  on_miss_depth: 2
"#;
        let config = ProxyConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.upstream.default_release, "2024-01");
        assert_eq!(config.upstream.base_url, "https://id.who.int/icd");
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.cache.node_ttl, Duration::from_secs(6 * 3600));
        assert_eq!(config.cache.search_ttl, Duration::from_secs(30 * 60));
        assert_eq!(config.precache.initial_delay, Duration::from_secs(10));
        assert_eq!(config.precache.on_miss_depth, 2);
    }

    #[tokio::test]
    async fn test_load_from_yaml_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("proxy.yaml");

        let config_content = r#"
upstream:
  default_release: "2023-01"
credentials:
  client_id: "file-client"
  client_secret: "file-secret"
cache:
  backend: memory
  search_ttl: "2h"
"#;
        tokio::fs::write(&config_path, config_content).await.unwrap();

        let config = ProxyConfig::load_from_file(&config_path).await.unwrap();
        assert_eq!(config.upstream.default_release, "2023-01");
        assert_eq!(config.cache.search_ttl, Duration::from_secs(7200));
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error_for_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = ProxyConfig::load_from_file(temp_dir.path().join("absent.yaml")).await;
        assert!(matches!(result, Err(ProxyError::Configuration { .. })));
    }

    #[test]
    fn test_canonical_root_and_host() {
        let mut config = ProxyConfig::default();
        config.upstream.base_url = "https://id.who.int/icd/".to_string();
        assert_eq!(
            config.canonical_root_url(),
            "https://id.who.int/icd/release/11/2019-04/mms"
        );
        assert_eq!(config.upstream_host().as_deref(), Some("id.who.int"));
    }

    #[test]
    fn test_environment_variable_overrides() {
        env::set_var("PROXY_SERVER_PORT", "9999");
        env::set_var("PROXY_SERVER_BIND_ADDRESS", "127.0.0.1");
        env::set_var("PROXY_CACHE_BACKEND", "Memory");
        env::set_var("PROXY_LOG_FORMAT", "pretty");

        let mut config = ProxyConfig::default();
        config.apply_env_overrides().unwrap();

        assert_eq!(config.server.port, 9999);
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.logging.format, "pretty");

        assert!("disk".parse::<CacheBackend>().is_err());

        env::remove_var("PROXY_SERVER_PORT");
        env::remove_var("PROXY_SERVER_BIND_ADDRESS");
        env::remove_var("PROXY_CACHE_BACKEND");
        env::remove_var("PROXY_LOG_FORMAT");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = valid_config();
        let rendered = format!("{:?}", config.credentials);
        assert!(!rendered.contains("\"secret\""));
        assert!(rendered.contains("<redacted>"));
    }
}
