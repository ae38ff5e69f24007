//! Unread counters: `conversation:{id}:unread:{userId}` and
//! `user:{userId}:unread:total`.

use super::Cache;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

const TTL_SECS: i64 = 3600;

pub struct UnreadCache {
    conn: ConnectionManager,
}

impl UnreadCache {
    pub(super) fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn conversation_key(conversation_id: &str, user_id: &str) -> String {
        format!("conversation:{conversation_id}:unread:{user_id}")
    }

    fn total_key(user_id: &str) -> String {
        format!("user:{user_id}:unread:total")
    }

    /// `None` on a cache miss — caller should repair from the store and
    /// call `set` with the authoritative value.
    pub async fn get_conversation(&self, conversation_id: &str, user_id: &str) -> Option<i64> {
        let mut conn = self.conn.clone();
        let key = Self::conversation_key(conversation_id, user_id);
        Cache::with_budget(async move { conn.get::<_, Option<i64>>(&key).await }).await?
    }

    pub async fn get_total(&self, user_id: &str) -> Option<i64> {
        let mut conn = self.conn.clone();
        let key = Self::total_key(user_id);
        Cache::with_budget(async move { conn.get::<_, Option<i64>>(&key).await }).await?
    }

    /// Lazy repair: seed both counters with authoritative values from the
    /// store, refreshing the TTL.
    pub async fn set(&self, conversation_id: &str, user_id: &str, conversation_count: i64, total: i64) {
        let mut conn = self.conn.clone();
        let conv_key = Self::conversation_key(conversation_id, user_id);
        let total_key = Self::total_key(user_id);
        Cache::with_budget(async move {
            let mut pipe = redis::pipe();
            pipe.set_ex(&conv_key, conversation_count, TTL_SECS as u64);
            pipe.set_ex(&total_key, total, TTL_SECS as u64);
            pipe.query_async::<()>(&mut conn).await
        })
        .await;
    }

    /// Increment both scopes by one for a single new message recipient.
    pub async fn increment(&self, conversation_id: &str, user_id: &str) {
        let mut conn = self.conn.clone();
        let conv_key = Self::conversation_key(conversation_id, user_id);
        let total_key = Self::total_key(user_id);
        Cache::with_budget(async move {
            let mut pipe = redis::pipe();
            pipe.incr(&conv_key, 1).expire(&conv_key, TTL_SECS);
            pipe.incr(&total_key, 1).expire(&total_key, TTL_SECS);
            pipe.query_async::<()>(&mut conn).await
        })
        .await;
    }

    /// Reset the per-conversation counter to 0 on "mark as read", clamping
    /// the aggregate down by the same amount (never below 0).
    pub async fn reset_conversation(&self, conversation_id: &str, user_id: &str) {
        let mut conn = self.conn.clone();
        let conv_key = Self::conversation_key(conversation_id, user_id);
        let total_key = Self::total_key(user_id);

        let previous: Option<i64> = Cache::with_budget(async move {
            conn.get::<_, Option<i64>>(&conv_key).await
        })
        .await
        .flatten();
        let Some(previous) = previous else { return };
        if previous <= 0 {
            return;
        }

        let mut conn = self.conn.clone();
        let conv_key = Self::conversation_key(conversation_id, user_id);
        Cache::with_budget(async move {
            let mut pipe = redis::pipe();
            pipe.set_ex(&conv_key, 0, TTL_SECS as u64);
            pipe.decr(&total_key, previous);
            pipe.query_async::<()>(&mut conn).await
        })
        .await;

        let mut conn = self.conn.clone();
        Cache::with_budget(async move {
            let current: i64 = conn.get(&total_key).await.unwrap_or(0);
            if current < 0 {
                conn.set_ex::<_, _, ()>(&total_key, 0, TTL_SECS as u64).await?;
            }
            Ok::<(), redis::RedisError>(())
        })
        .await;
    }
}
