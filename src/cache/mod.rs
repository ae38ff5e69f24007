//! Cache-aside layer over Redis.
//!
//! Three independent derived views live here: the recent-messages sorted
//! set, the unread counters, and the delivery-status maps. None of them is
//! a source of truth — the store (`crate::db`) always is — and every
//! operation degrades gracefully: a Redis failure is logged and treated as
//! a miss, never surfaced to the caller as an error.

mod delivery;
mod recent;
mod unread;

pub use delivery::DeliveryCache;
pub use recent::{CachedMessage, RecentMessagesCache};
pub use unread::UnreadCache;

use redis::aio::ConnectionManager;
use std::time::Duration;

/// Shared Redis handle backing every cache view.
///
/// Wraps `redis::aio::ConnectionManager`, which already reconnects
/// transparently; callers never see a dead connection, only a returned
/// `redis::RedisError` from the call that raced the reconnect.
#[derive(Clone)]
pub struct Cache {
    conn: ConnectionManager,
}

impl Cache {
    const OP_TIMEOUT: Duration = Duration::from_millis(100);

    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        tracing::info!("cache connected");
        Ok(Self { conn })
    }

    pub fn recent_messages(&self) -> RecentMessagesCache {
        RecentMessagesCache::new(self.conn.clone())
    }

    pub fn unread(&self) -> UnreadCache {
        UnreadCache::new(self.conn.clone())
    }

    pub fn delivery(&self) -> DeliveryCache {
        DeliveryCache::new(self.conn.clone())
    }

    /// Run a cache operation with the 100ms budget spec'd for cache ops,
    /// collapsing any error or timeout into `None` — graceful degradation.
    pub(crate) async fn with_budget<F, T>(fut: F) -> Option<T>
    where
        F: std::future::Future<Output = Result<T, redis::RedisError>>,
    {
        match tokio::time::timeout(Self::OP_TIMEOUT, fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "cache operation failed, falling back to store");
                None
            }
            Err(_) => {
                tracing::warn!("cache operation timed out, falling back to store");
                None
            }
        }
    }
}
