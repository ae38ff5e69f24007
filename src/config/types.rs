//! Configuration type definitions.

use serde::Deserialize;

use super::defaults::*;

/// Top-level server configuration, loaded from a TOML file.
///
/// `deny_unknown_fields` is set throughout so a typo'd or stale config key
/// fails startup loudly instead of being silently ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub cache: CacheConfig,
    pub pubsub: PubSubConfig,
    pub tokens: TokenConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Log output format, selected via `[server].log_format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Server identity and listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the combined HTTP/WebSocket listener binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Prometheus metrics port. 0 disables the metrics HTTP server.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    /// Structured log output format.
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

/// Durable store connection configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// SQLite connection string, e.g. `sqlite://relaycore.db` or `:memory:`.
    pub url: String,
}

/// Cache connection configuration (recent-messages set, unread counters,
/// delivery-status maps).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    pub url: String,
}

/// Cross-instance pub/sub fabric connection configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PubSubConfig {
    pub url: String,
}

/// Bearer token signing configuration for the self-contained auth surface.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    #[serde(default = "default_access_token_ttl_secs")]
    pub access_ttl_secs: i64,
    #[serde(default = "default_refresh_token_ttl_secs")]
    pub refresh_ttl_secs: i64,
}

/// Presence heartbeat/TTL tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PresenceConfig {
    #[serde(default = "default_presence_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_presence_ttl_secs(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
        }
    }
}

/// Sliding-window + burst-window rate limit tuning, shared across instances
/// via the cache/pub-sub fabric's backing store.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    #[serde(default = "default_message_window_limit")]
    pub window_limit: u32,
    #[serde(default = "default_message_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_message_burst_limit")]
    pub burst_limit: u32,
    #[serde(default = "default_message_burst_secs")]
    pub burst_secs: u64,
    #[serde(default = "default_penalty_secs")]
    pub penalty_secs: u64,
    /// Minimum gap between accepted `presence:update` calls for a single
    /// user — a plain cooldown, not a window/burst pair, since the
    /// operation has no burst allowance of its own.
    #[serde(default = "default_presence_cooldown_secs")]
    pub presence_cooldown_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_limit: default_message_window_limit(),
            window_secs: default_message_window_secs(),
            burst_limit: default_message_burst_limit(),
            burst_secs: default_message_burst_secs(),
            penalty_secs: default_penalty_secs(),
            presence_cooldown_secs: default_presence_cooldown_secs(),
        }
    }
}

/// Assorted size/time limits enumerated in the external interfaces section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    #[serde(default = "default_message_max_len")]
    pub message_max_len: usize,
    #[serde(default = "default_avatar_max_bytes")]
    pub avatar_max_bytes: usize,
    #[serde(default = "default_recent_messages_limit")]
    pub recent_messages_limit: i64,
    #[serde(default = "default_max_page_limit")]
    pub max_page_limit: i64,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    #[serde(default = "default_recent_cache_ttl_secs")]
    pub recent_cache_ttl_secs: u64,
    #[serde(default = "default_unread_cache_ttl_secs")]
    pub unread_cache_ttl_secs: u64,
    #[serde(default = "default_status_cache_ttl_secs")]
    pub status_cache_ttl_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            message_max_len: default_message_max_len(),
            avatar_max_bytes: default_avatar_max_bytes(),
            recent_messages_limit: default_recent_messages_limit(),
            max_page_limit: default_max_page_limit(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            recent_cache_ttl_secs: default_recent_cache_ttl_secs(),
            unread_cache_ttl_secs: default_unread_cache_ttl_secs(),
            status_cache_ttl_secs: default_status_cache_ttl_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Configuration load errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
