//! Presence service: online/away/busy/offline with multi-device reference
//! counting, heartbeat TTL, and contact-scoped broadcast.
//!
//! State is Redis-resident (`PresenceRecord`), never the durable store —
//! `users.status` is an advisory, possibly-lagging mirror written back by
//! the caller, not by this module.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Away,
    Busy,
    Offline,
}

impl std::fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Away => write!(f, "away"),
            Self::Busy => write!(f, "busy"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

impl std::str::FromStr for PresenceStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(Self::Online),
            "away" => Ok(Self::Away),
            "busy" => Ok(Self::Busy),
            "offline" => Ok(Self::Offline),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PresenceRecord {
    pub status: PresenceStatus,
    pub connection_count: u32,
    pub last_heartbeat: i64,
}

pub struct PresenceService {
    conn: ConnectionManager,
    ttl_secs: u64,
}

impl PresenceService {
    pub fn new(conn: ConnectionManager, ttl_secs: u64) -> Self {
        Self { conn, ttl_secs }
    }

    fn key(user_id: &str) -> String {
        format!("presence:{user_id}")
    }

    /// Atomically increment the connection count; if it was 0, the user
    /// transitions to their previously-set custom status (if its TTL
    /// hasn't lapsed) or `online` by default.
    pub async fn connect(&self, user_id: &str) -> Result<PresenceRecord, redis::RedisError> {
        let mut conn = self.conn.clone();
        let key = Self::key(user_id);
        let now = chrono::Utc::now().timestamp();

        let existing: Option<(String, u32)> = {
            let fields: Vec<Option<String>> = conn.hget(&key, &["status", "connection_count"]).await?;
            match (fields.first().cloned().flatten(), fields.get(1).cloned().flatten()) {
                (Some(status), Some(count)) => count.parse().ok().map(|c| (status, c)),
                _ => None,
            }
        };

        let (status, count) = match existing {
            Some((status, count)) => (status, count + 1),
            None => (PresenceStatus::Online.to_string(), 1),
        };

        let mut pipe = redis::pipe();
        pipe.hset(&key, "status", &status);
        pipe.hset(&key, "connection_count", count);
        pipe.hset(&key, "last_heartbeat", now);
        pipe.expire(&key, self.ttl_secs as i64);
        let _: () = pipe.query_async(&mut conn).await?;

        Ok(PresenceRecord {
            status: status.parse().unwrap_or(PresenceStatus::Online),
            connection_count: count,
            last_heartbeat: now,
        })
    }

    /// Decrement the connection count; transitions to `offline` (returning
    /// `None` for status meaning "went offline") once it reaches 0.
    pub async fn disconnect(&self, user_id: &str) -> Result<PresenceRecord, redis::RedisError> {
        let mut conn = self.conn.clone();
        let key = Self::key(user_id);
        let now = chrono::Utc::now().timestamp();

        let current: i64 = conn.hget(&key, "connection_count").await.unwrap_or(Some(1)).unwrap_or(1).parse().unwrap_or(1);
        let count = (current - 1).max(0) as u32;

        if count == 0 {
            let mut pipe = redis::pipe();
            pipe.hset(&key, "status", PresenceStatus::Offline.to_string());
            pipe.hset(&key, "connection_count", 0);
            pipe.hset(&key, "last_heartbeat", now);
            pipe.expire(&key, self.ttl_secs as i64);
            let _: () = pipe.query_async(&mut conn).await?;
            return Ok(PresenceRecord { status: PresenceStatus::Offline, connection_count: 0, last_heartbeat: now });
        }

        let mut pipe = redis::pipe();
        pipe.hset(&key, "connection_count", count);
        pipe.expire(&key, self.ttl_secs as i64);
        let _: () = pipe.query_async(&mut conn).await?;

        let status: String = conn.hget(&key, "status").await.unwrap_or_else(|_| PresenceStatus::Online.to_string());
        Ok(PresenceRecord { status: status.parse().unwrap_or(PresenceStatus::Online), connection_count: count, last_heartbeat: now })
    }

    /// Explicit status change; has no effect on connection count.
    pub async fn set_status(&self, user_id: &str, status: PresenceStatus) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        let key = Self::key(user_id);
        let mut pipe = redis::pipe();
        pipe.hset(&key, "status", status.to_string());
        pipe.expire(&key, self.ttl_secs as i64);
        pipe.query_async(&mut conn).await
    }

    /// Refreshes TTL only; called on every client heartbeat.
    pub async fn heartbeat(&self, user_id: &str) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        let key = Self::key(user_id);
        let now = chrono::Utc::now().timestamp();
        let mut pipe = redis::pipe();
        pipe.hset(&key, "last_heartbeat", now);
        pipe.expire(&key, self.ttl_secs as i64);
        pipe.query_async(&mut conn).await
    }

    pub async fn get(&self, user_id: &str) -> Result<Option<PresenceRecord>, redis::RedisError> {
        let mut conn = self.conn.clone();
        let key = Self::key(user_id);
        let exists: bool = conn.exists(&key).await?;
        if !exists {
            return Ok(None);
        }
        let status: String = conn.hget(&key, "status").await?;
        let connection_count: u32 = conn.hget(&key, "connection_count").await?;
        let last_heartbeat: i64 = conn.hget(&key, "last_heartbeat").await?;
        Ok(Some(PresenceRecord {
            status: status.parse().unwrap_or(PresenceStatus::Offline),
            connection_count,
            last_heartbeat,
        }))
    }
}
