//! Configuration loading and management.
//!
//! Split into:
//! - [`types`]: the `Config` struct and its nested sections
//! - [`defaults`]: default value functions used by `serde(default = ...)`
//! - [`validation`]: startup validation of a loaded config

mod defaults;
mod types;
mod validation;

pub use types::{
    CacheConfig, Config, ConfigError, LimitsConfig, LogFormat, PresenceConfig, PubSubConfig,
    RateLimitConfig, ServerConfig, StoreConfig, TokenConfig,
};
pub use validation::{ValidationError, validate};
