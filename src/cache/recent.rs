//! Recent-messages sorted set: `conversation:{id}:messages:recent`.

use super::Cache;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};

const CAP: isize = 50;
const TTL_SECS: i64 = 300;

/// JSON-serializable snapshot of a message, cached verbatim so reads never
/// need a store round trip for the first page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedMessage {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub reply_to_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<&crate::db::Message> for CachedMessage {
    fn from(m: &crate::db::Message) -> Self {
        Self {
            id: m.id.clone(),
            conversation_id: m.conversation_id.clone(),
            sender_id: m.sender_id.clone(),
            content: m.content.clone(),
            reply_to_id: m.reply_to_id.clone(),
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

pub struct RecentMessagesCache {
    conn: ConnectionManager,
}

impl RecentMessagesCache {
    pub(super) fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn key(conversation_id: &str) -> String {
        format!("conversation:{conversation_id}:messages:recent")
    }

    /// Newest-first page, or `None` on a cache miss (including errors and
    /// timeouts, which are collapsed into a miss by `Cache::with_budget`).
    pub async fn get(&self, conversation_id: &str) -> Option<Vec<CachedMessage>> {
        let mut conn = self.conn.clone();
        let key = Self::key(conversation_id);
        let raw: Option<Vec<String>> = Cache::with_budget(async move {
            conn.zrevrange::<_, Vec<String>>(&key, 0, -1).await
        })
        .await;

        let raw = raw?;
        if raw.is_empty() {
            return None;
        }
        Some(
            raw.into_iter()
                .filter_map(|s| serde_json::from_str(&s).ok())
                .collect(),
        )
    }

    /// Repopulate the set from a freshly-queried newest-first page.
    pub async fn populate(&self, conversation_id: &str, messages: &[CachedMessage]) {
        if messages.is_empty() {
            return;
        }
        let mut conn = self.conn.clone();
        let key = Self::key(conversation_id);
        let members: Vec<(f64, String)> = messages
            .iter()
            .filter_map(|m| serde_json::to_string(m).ok().map(|s| (m.created_at as f64, s)))
            .collect();

        Cache::with_budget(async move {
            let mut pipe = redis::pipe();
            pipe.del(&key);
            if !members.is_empty() {
                pipe.zadd_multiple(&key, &members);
            }
            pipe.zremrangebyrank(&key, 0, -(CAP + 1));
            pipe.expire(&key, TTL_SECS);
            pipe.query_async::<()>(&mut conn).await
        })
        .await;
    }

    /// Cache-aside invalidation on create/edit/delete — the whole entry is
    /// dropped rather than surgically patched.
    pub async fn invalidate(&self, conversation_id: &str) {
        let mut conn = self.conn.clone();
        let key = Self::key(conversation_id);
        Cache::with_budget(async move { conn.del::<_, ()>(&key).await }).await;
    }
}
