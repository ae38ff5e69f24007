//! Shared, Redis-backed rate limiter: a sliding window plus a burst window
//! per (user, operation-class), with a penalty state on either breach.
//!
//! Structured the way the teacher's `RateLimitManager` is structured — one
//! struct, one check method, a periodic `cleanup()` — but counters live in
//! Redis via INCR/PEXPIRE instead of per-instance `governor` state, so the
//! limit holds exactly even when requests for the same user land on
//! different instances.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::config::RateLimitConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationClass {
    Send,
    EditOrDelete,
    PresenceUpdate,
}

impl OperationClass {
    fn tag(self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::EditOrDelete => "edit_delete",
            Self::PresenceUpdate => "presence",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitOutcome {
    Allowed,
    Limited { retry_after_ms: u64 },
}

#[derive(Clone)]
pub struct RateLimiter {
    conn: ConnectionManager,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(conn: ConnectionManager, config: RateLimitConfig) -> Self {
        Self { conn, config }
    }

    fn penalty_key(user_id: &str, class: OperationClass) -> String {
        format!("ratelimit:{}:{}:penalty", class.tag(), user_id)
    }

    fn window_key(user_id: &str, class: OperationClass) -> String {
        format!("ratelimit:{}:{}:window", class.tag(), user_id)
    }

    fn burst_key(user_id: &str, class: OperationClass) -> String {
        format!("ratelimit:{}:{}:burst", class.tag(), user_id)
    }

    /// Check and record one request. `PresenceUpdate` is a plain cooldown
    /// (no burst allowance, no separate penalty state — rejecting with the
    /// cooldown's own remaining TTL is already the correct `retryAfter`);
    /// `Send`/`EditOrDelete` evaluate the burst window first (the tighter
    /// bound), then the sliding window, entering a penalty state on
    /// whichever one breaches first.
    pub async fn check(&self, user_id: &str, class: OperationClass) -> RateLimitOutcome {
        if class == OperationClass::PresenceUpdate {
            return self.check_presence_cooldown(user_id).await;
        }

        let mut conn = self.conn.clone();

        let penalty_key = Self::penalty_key(user_id, class);
        let penalty_ttl: i64 = match conn.ttl(&penalty_key).await {
            Ok(ttl) => ttl,
            Err(err) => {
                tracing::warn!(error = %err, "rate limiter store unavailable, failing open");
                return RateLimitOutcome::Allowed;
            }
        };
        if penalty_ttl > 0 {
            crate::metrics::RATE_LIMITED_TOTAL.inc();
            return RateLimitOutcome::Limited { retry_after_ms: penalty_ttl as u64 * 1000 };
        }

        let burst_key = Self::burst_key(user_id, class);
        let burst_count: i64 = match self.incr_with_ttl(&burst_key, self.config.burst_secs).await {
            Ok(count) => count,
            Err(_) => return RateLimitOutcome::Allowed,
        };
        if burst_count > self.config.burst_limit as i64 {
            return self.enter_penalty(&penalty_key).await;
        }

        let window_key = Self::window_key(user_id, class);
        let window_count: i64 = match self.incr_with_ttl(&window_key, self.config.window_secs).await {
            Ok(count) => count,
            Err(_) => return RateLimitOutcome::Allowed,
        };
        if window_count > self.config.window_limit as i64 {
            return self.enter_penalty(&penalty_key).await;
        }

        RateLimitOutcome::Allowed
    }

    async fn check_presence_cooldown(&self, user_id: &str) -> RateLimitOutcome {
        let mut conn = self.conn.clone();
        let key = Self::window_key(user_id, OperationClass::PresenceUpdate);
        let ttl_secs = self.config.presence_cooldown_secs;

        let remaining: i64 = match conn.ttl(&key).await {
            Ok(ttl) => ttl,
            Err(err) => {
                tracing::warn!(error = %err, "rate limiter store unavailable, failing open");
                return RateLimitOutcome::Allowed;
            }
        };
        if remaining > 0 {
            crate::metrics::RATE_LIMITED_TOTAL.inc();
            return RateLimitOutcome::Limited { retry_after_ms: remaining as u64 * 1000 };
        }

        if let Err(err) = conn.set_ex::<_, _, ()>(&key, 1, ttl_secs).await {
            tracing::warn!(error = %err, "failed to record presence cooldown");
        }
        RateLimitOutcome::Allowed
    }

    async fn incr_with_ttl(&self, key: &str, ttl_secs: u64) -> Result<i64, redis::RedisError> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.incr(key, 1);
        let (count,): (i64,) = pipe.query_async(&mut conn).await?;
        if count == 1 {
            let _: () = conn.expire(key, ttl_secs as i64).await?;
        }
        Ok(count)
    }

    async fn enter_penalty(&self, penalty_key: &str) -> RateLimitOutcome {
        let mut conn = self.conn.clone();
        if let Err(err) = conn.set_ex::<_, _, ()>(penalty_key, 1, self.config.penalty_secs).await {
            tracing::warn!(error = %err, "failed to record rate-limit penalty");
        }
        crate::metrics::RATE_LIMITED_TOTAL.inc();
        RateLimitOutcome::Limited { retry_after_ms: self.config.penalty_secs * 1000 }
    }
}
