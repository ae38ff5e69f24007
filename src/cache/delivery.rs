//! Delivery-status map: `message:{id}:status`, a per-user hash of delivery
//! state (`sent` | `delivered` | `read`).

use super::Cache;
use crate::db::MessageStatusState;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

const TTL_SECS: i64 = 86_400;

pub struct DeliveryCache {
    conn: ConnectionManager,
}

impl DeliveryCache {
    pub(super) fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn key(message_id: &str) -> String {
        format!("message:{message_id}:status")
    }

    pub async fn get(&self, message_id: &str, user_id: &str) -> Option<MessageStatusState> {
        let mut conn = self.conn.clone();
        let key = Self::key(message_id);
        let user_id = user_id.to_string();
        let raw: Option<String> = Cache::with_budget(async move {
            conn.hget::<_, _, Option<String>>(&key, user_id).await
        })
        .await?;
        match raw.as_deref() {
            Some("sent") => Some(MessageStatusState::Sent),
            Some("delivered") => Some(MessageStatusState::Delivered),
            Some("read") => Some(MessageStatusState::Read),
            _ => None,
        }
    }

    pub async fn set(&self, message_id: &str, user_id: &str, state: MessageStatusState) {
        self.set_batch(&[(message_id.to_string(), user_id.to_string(), state)]).await;
    }

    /// Batch-write several (message, user, state) transitions in one
    /// pipeline, refreshing each touched key's TTL.
    pub async fn set_batch(&self, updates: &[(String, String, MessageStatusState)]) {
        if updates.is_empty() {
            return;
        }
        let mut conn = self.conn.clone();
        let updates = updates.to_vec();
        Cache::with_budget(async move {
            let mut pipe = redis::pipe();
            let mut touched = std::collections::HashSet::new();
            for (message_id, user_id, state) in &updates {
                let key = Self::key(message_id);
                pipe.hset(&key, user_id, state.to_string());
                touched.insert(key);
            }
            for key in touched {
                pipe.expire(&key, TTL_SECS);
            }
            pipe.query_async::<()>(&mut conn).await
        })
        .await;
    }

    pub async fn invalidate(&self, message_id: &str) {
        let mut conn = self.conn.clone();
        let key = Self::key(message_id);
        Cache::with_budget(async move { conn.del::<_, ()>(&key).await }).await;
    }
}
