//! Configuration management for gamegate

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Environment variable holding comma-separated upstream API keys
pub const API_KEYS_ENV: &str = "GAMEGATE_API_KEYS";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Prefix for every cache and ledger key
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub credentials: CredentialsConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub forbidden: ForbiddenConfig,

    #[serde(default)]
    pub dedup: DedupConfig,
}

fn default_namespace() -> String {
    "gamegate".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            api: ApiConfig::default(),
            credentials: CredentialsConfig::default(),
            rate_limit: RateLimitConfig::default(),
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
            forbidden: ForbiddenConfig::default(),
            dedup: DedupConfig::default(),
        }
    }
}

/// Upstream API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL per region, e.g. `euw1: https://euw1.api.example.com`
    #[serde(default)]
    pub regions: BTreeMap<String, String>,

    /// Header carrying the credential secret
    #[serde(default = "default_auth_header")]
    pub auth_header: String,

    /// Per-call timeout applied by the transport
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ApiConfig {
    /// Base URL for a region
    pub fn base_url(&self, region: &str) -> std::result::Result<&str, ConfigError> {
        self.regions
            .get(region)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::UnknownRegion(region.to_string()))
    }
}

fn default_auth_header() -> String {
    "X-Api-Key".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            regions: BTreeMap::new(),
            auth_header: default_auth_header(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Upstream credentials and their suspension policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub keys: Vec<CredentialEntry>,

    /// How long a credential sits out after an authorization failure
    #[serde(default = "default_suspension_secs")]
    pub suspension_secs: u64,
}

fn default_suspension_secs() -> u64 {
    300
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            suspension_secs: default_suspension_secs(),
        }
    }
}

impl CredentialsConfig {
    pub fn suspension(&self) -> Duration {
        Duration::from_secs(self.suspension_secs)
    }
}

/// A configured credential
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialEntry {
    pub id: String,
    pub secret: String,
}

impl std::fmt::Debug for CredentialEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialEntry")
            .field("id", &self.id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// The two nested quotas shared by every caller in the process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_short_bucket")]
    pub short: BucketConfig,

    #[serde(default = "default_long_bucket")]
    pub long: BucketConfig,
}

fn default_short_bucket() -> BucketConfig {
    BucketConfig {
        capacity: 20,
        period_ms: 1_000,
    }
}

fn default_long_bucket() -> BucketConfig {
    BucketConfig {
        capacity: 100,
        period_ms: 120_000,
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            short: default_short_bucket(),
            long: default_long_bucket(),
        }
    }
}

/// `capacity` permits per `period_ms`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketConfig {
    pub capacity: u32,
    pub period_ms: u64,
}

impl BucketConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

/// Response cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding the SQLite store (defaults to the XDG cache dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// TTL per resource type, in seconds
    #[serde(default)]
    pub ttls: BTreeMap<String, u64>,
}

fn default_ttl_secs() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: None,
            default_ttl_secs: default_ttl_secs(),
            ttls: BTreeMap::new(),
        }
    }
}

impl CacheConfig {
    /// TTL for a resource type, falling back to the default
    pub fn ttl_for(&self, resource_type: &str) -> Duration {
        let secs = self
            .ttls
            .get(resource_type)
            .copied()
            .unwrap_or(self.default_ttl_secs);
        Duration::from_secs(secs)
    }
}

/// Bounded retry policy for throttled and faulted calls
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total upstream attempts per retryable failure chain, first call included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_fault_backoff_ms")]
    pub fault_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_fault_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            fault_backoff_ms: default_fault_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryConfig {
    /// Exponential backoff for the `retry`-th retry (0-based), capped.
    pub fn fault_backoff(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry);
        let delay_ms = self.fault_backoff_ms.saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.max_backoff_ms))
    }
}

/// When a 403 is blamed on the credential rather than the resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForbiddenPolicy {
    /// Never suspend on 403
    Passthrough,
    /// Every 403 suspends the credential
    Always,
    /// Suspend only when the message names a key-level restriction
    #[default]
    KeyRestriction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForbiddenConfig {
    #[serde(default)]
    pub policy: ForbiddenPolicy,

    /// Case-insensitive substrings that mark a key-level 403
    #[serde(default = "default_forbidden_markers")]
    pub markers: Vec<String>,
}

fn default_forbidden_markers() -> Vec<String> {
    vec!["api key".to_string(), "apikey".to_string()]
}

impl Default for ForbiddenConfig {
    fn default() -> Self {
        Self {
            policy: ForbiddenPolicy::default(),
            markers: default_forbidden_markers(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Lifetime of the fast-path marker
    #[serde(default = "default_marker_ttl_secs")]
    pub marker_ttl_secs: u64,
}

fn default_marker_ttl_secs() -> u64 {
    24 * 60 * 60
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            marker_ttl_secs: default_marker_ttl_secs(),
        }
    }
}

impl DedupConfig {
    pub fn marker_ttl(&self) -> Duration {
        Duration::from_secs(self.marker_ttl_secs)
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::config_dir().ok_or(ConfigError::Invalid(
            "Could not determine config directory".to_string(),
        ))?;

        Ok(base.join("gamegate").join("config.yaml"))
    }

    /// Load from an explicit path, or the default location when `None`,
    /// then apply environment overrides and validate.
    pub fn load_at(path: Option<&str>) -> Result<Self> {
        let config = Self::read_at(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`load_at`](Self::load_at) without validation, for commands that
    /// never reach the upstream
    pub fn read_at(path: Option<&str>) -> Result<Self> {
        let path = match path {
            Some(p) => PathBuf::from(p),
            None => Self::default_path()?,
        };
        let mut config = Self::load_from(path)?;
        if let Ok(keys) = std::env::var(API_KEYS_ENV) {
            config.apply_api_keys(&keys);
        }
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path).into());
        }

        let contents = std::fs::read_to_string(&path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents).map_err(ConfigError::from)?;
        Ok(config)
    }

    /// Replace configured credentials with comma-separated secrets.
    ///
    /// Blank input leaves the file's credentials untouched.
    pub fn apply_api_keys(&mut self, raw: &str) {
        let keys: Vec<CredentialEntry> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .enumerate()
            .map(|(i, secret)| CredentialEntry {
                id: format!("env-{}", i),
                secret: secret.to_string(),
            })
            .collect();

        if !keys.is_empty() {
            self.credentials.keys = keys;
        }
    }

    /// Check the settings the pipeline cannot run without
    pub fn validate(&self) -> Result<()> {
        if self.credentials.keys.is_empty() {
            return Err(ConfigError::MissingCredentials.into());
        }
        if self.api.regions.is_empty() {
            return Err(ConfigError::Invalid("at least one region is required".to_string()).into());
        }
        for (name, bucket) in [("short", &self.rate_limit.short), ("long", &self.rate_limit.long)] {
            if bucket.capacity == 0 || bucket.period_ms == 0 {
                return Err(ConfigError::Invalid(format!(
                    "rate_limit.{} needs a non-zero capacity and period",
                    name
                ))
                .into());
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".to_string()).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    const SAMPLE: &str = r#"
namespace: lol
api:
  regions:
    euw1: https://euw1.api.example.com
    na1: https://na1.api.example.com
credentials:
  keys:
    - id: primary
      secret: RGAPI-one
    - id: backup
      secret: RGAPI-two
rate_limit:
  short:
    capacity: 20
    period_ms: 1000
  long:
    capacity: 100
    period_ms: 120000
cache:
  default_ttl_secs: 60
  ttls:
    summoner: 3600
forbidden:
  policy: always
"#;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.namespace, "gamegate");
        assert_eq!(config.api.auth_header, "X-Api-Key");
        assert_eq!(config.rate_limit.short.capacity, 20);
        assert_eq!(config.rate_limit.long.period(), Duration::from_secs(120));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.forbidden.policy, ForbiddenPolicy::KeyRestriction);
    }

    #[test]
    fn test_parse_sample() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.namespace, "lol");
        assert_eq!(config.credentials.keys.len(), 2);
        assert_eq!(config.api.base_url("euw1").unwrap(), "https://euw1.api.example.com");
        assert_eq!(config.forbidden.policy, ForbiddenPolicy::Always);
        assert_eq!(config.dedup.marker_ttl(), Duration::from_secs(86_400));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_minimal_yaml_gets_defaults() {
        let config = Config::from_yaml("api:\n  regions:\n    na1: http://localhost\n").unwrap();
        assert_eq!(config.namespace, "gamegate");
        assert_eq!(config.credentials.suspension_secs, 300);
        assert_eq!(config.forbidden.markers, vec!["api key", "apikey"]);
    }

    #[test]
    fn test_ttl_for_resource_type() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.cache.ttl_for("summoner"), Duration::from_secs(3600));
        assert_eq!(config.cache.ttl_for("match"), Duration::from_secs(60));
    }

    #[test]
    fn test_unknown_region() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        match config.api.base_url("kr") {
            Err(ConfigError::UnknownRegion(r)) => assert_eq!(r, "kr"),
            other => panic!("Expected UnknownRegion, got {:?}", other),
        }
    }

    #[test]
    fn test_apply_api_keys() {
        let mut config = Config::from_yaml(SAMPLE).unwrap();
        config.apply_api_keys(" k1 , ,k2");
        let ids: Vec<_> = config.credentials.keys.iter().map(|k| k.id.as_str()).collect();
        assert_eq!(ids, vec!["env-0", "env-1"]);
        assert_eq!(config.credentials.keys[1].secret, "k2");

        config.apply_api_keys("  ");
        assert_eq!(config.credentials.keys.len(), 2);
    }

    #[test]
    fn test_validate_requires_credentials() {
        let config = Config::from_yaml("api:\n  regions:\n    na1: http://localhost\n").unwrap();
        match config.validate() {
            Err(Error::Config(ConfigError::MissingCredentials)) => (),
            other => panic!("Expected MissingCredentials, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = Config::from_yaml(SAMPLE).unwrap();
        config.rate_limit.long.capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fault_backoff_doubles_and_caps() {
        let retry = RetryConfig {
            max_attempts: 5,
            fault_backoff_ms: 500,
            max_backoff_ms: 3_000,
        };
        assert_eq!(retry.fault_backoff(0), Duration::from_millis(500));
        assert_eq!(retry.fault_backoff(1), Duration::from_millis(1_000));
        assert_eq!(retry.fault_backoff(2), Duration::from_millis(2_000));
        assert_eq!(retry.fault_backoff(3), Duration::from_millis(3_000));
        assert_eq!(retry.fault_backoff(40), Duration::from_millis(3_000));
    }

    #[test]
    fn test_secret_not_in_debug() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("RGAPI-one"));
        assert!(debug.contains("primary"));
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load_from(PathBuf::from("/nonexistent/gamegate.yaml"));
        assert!(matches!(result, Err(Error::Config(ConfigError::NotFound(_)))));
    }
}
