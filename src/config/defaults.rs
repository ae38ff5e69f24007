//! Default value functions for configuration.

pub fn default_true() -> bool {
    true
}

pub fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

pub fn default_metrics_port() -> u16 {
    9090
}

pub fn default_log_format() -> super::types::LogFormat {
    super::types::LogFormat::Pretty
}

pub fn default_access_token_ttl_secs() -> i64 {
    15 * 60
}

pub fn default_refresh_token_ttl_secs() -> i64 {
    7 * 24 * 60 * 60
}

pub fn default_presence_ttl_secs() -> u64 {
    60
}

pub fn default_heartbeat_interval_secs() -> u64 {
    25
}

pub fn default_recent_cache_ttl_secs() -> u64 {
    300
}

pub fn default_unread_cache_ttl_secs() -> u64 {
    3600
}

pub fn default_status_cache_ttl_secs() -> u64 {
    86_400
}

pub fn default_message_max_len() -> usize {
    10_000
}

pub fn default_avatar_max_bytes() -> usize {
    5 * 1024 * 1024
}

pub fn default_message_window_limit() -> u32 {
    30
}

pub fn default_message_window_secs() -> u64 {
    60
}

pub fn default_message_burst_limit() -> u32 {
    5
}

pub fn default_message_burst_secs() -> u64 {
    1
}

pub fn default_penalty_secs() -> u64 {
    30
}

pub fn default_presence_cooldown_secs() -> u64 {
    5
}

pub fn default_shutdown_grace_secs() -> u64 {
    30
}

pub fn default_recent_messages_limit() -> i64 {
    50
}

pub fn default_max_page_limit() -> i64 {
    100
}
