//! Retrieval engine: paginated history, unread aggregation, full-text
//! search — all cache-aside over the durable store.

use crate::cache::{Cache, CachedMessage};
use crate::config::LimitsConfig;
use crate::db::{Database, Message};
use crate::error::{AppError, AppResult};

const MAX_CONVERSATIONS_FOR_UNREAD: i64 = 100;

pub struct RetrievalEngine {
    db: Database,
    cache: Cache,
    limits: LimitsConfig,
}

pub struct MessagePage {
    pub messages: Vec<Message>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
    pub cached: bool,
}

pub struct UnreadSummary {
    pub total_unread: i64,
    pub by_conversation: std::collections::HashMap<String, i64>,
}

fn encode_cursor(created_at: i64, id: &str) -> String {
    format!("{created_at}:{id}")
}

fn decode_cursor(cursor: &str) -> AppResult<(i64, String)> {
    let (created_at, id) = cursor.split_once(':').ok_or(AppError::InvalidInput("malformed cursor".into()))?;
    let created_at: i64 = created_at.parse().map_err(|_| AppError::InvalidInput("malformed cursor".into()))?;
    Ok((created_at, id.to_string()))
}

impl RetrievalEngine {
    pub fn new(db: Database, cache: Cache, limits: LimitsConfig) -> Self {
        Self { db, cache, limits }
    }

    /// Requires the caller to already be a checked participant (404 vs 403
    /// is resolved by the handler before calling in, per the combined
    /// `(exists, isParticipant)` check named in the component design).
    pub async fn list_recent(
        &self,
        conversation_id: &str,
        limit: i64,
        cursor: Option<&str>,
        include_deleted: bool,
    ) -> AppResult<MessagePage> {
        let limit = limit.clamp(1, self.limits.max_page_limit);
        let cursor_pair = cursor.map(decode_cursor).transpose()?;

        let use_cache = cursor_pair.is_none() && !include_deleted && limit <= self.limits.recent_messages_limit;

        if use_cache {
            if let Some(cached) = self.cache.recent_messages().get(conversation_id).await {
                crate::metrics::CACHE_HITS.inc();
                let page: Vec<Message> = cached.into_iter().take(limit as usize).map(cached_to_message).collect();
                let has_more = page.len() as i64 >= limit;
                let next_cursor = page.last().map(|m| encode_cursor(m.created_at, &m.id));
                return Ok(MessagePage { messages: page, next_cursor, has_more, cached: true });
            }
            crate::metrics::CACHE_MISSES.inc();
        }

        let fetch_limit = limit + 1;
        let cursor_ref = cursor_pair.as_ref().map(|(t, id)| (*t, id.as_str()));
        let mut rows = self
            .db
            .messages()
            .list_recent(conversation_id, fetch_limit, cursor_ref, include_deleted)
            .await?;

        let has_more = rows.len() as i64 > limit;
        rows.truncate(limit as usize);
        let next_cursor = if has_more {
            rows.last().map(|m| encode_cursor(m.created_at, &m.id))
        } else {
            None
        };

        if use_cache {
            let cached: Vec<CachedMessage> = rows.iter().map(CachedMessage::from).collect();
            self.cache.recent_messages().populate(conversation_id, &cached).await;
        }

        Ok(MessagePage { messages: rows, next_cursor, has_more, cached: false })
    }

    /// Bounded to the caller's `MAX_CONVERSATIONS_FOR_UNREAD` most recent
    /// conversations — a long-tail-heavy account never pays for an
    /// unbounded scan just to answer this summary.
    pub async fn unread_summary(&self, user_id: &str) -> AppResult<UnreadSummary> {
        let conversations = self
            .db
            .conversations()
            .list_for_user(user_id, None, MAX_CONVERSATIONS_FOR_UNREAD, 0)
            .await?;

        let mut by_conversation = std::collections::HashMap::new();
        let mut repaired = Vec::new();
        let mut total_unread: i64 = 0;

        for conversation in &conversations {
            let count = match self.cache.unread().get_conversation(&conversation.id, user_id).await {
                Some(count) => count,
                None => {
                    let count = self.db.messages().unread_count(&conversation.id, user_id).await?;
                    repaired.push(conversation.id.clone());
                    count
                }
            };
            total_unread += count;
            if count > 0 {
                by_conversation.insert(conversation.id.clone(), count);
            }
        }

        for conversation_id in &repaired {
            let count = by_conversation.get(conversation_id).copied().unwrap_or(0);
            self.cache.unread().set(conversation_id, user_id, count, total_unread).await;
        }

        Ok(UnreadSummary { total_unread, by_conversation })
    }

    pub async fn search(
        &self,
        user_id: &str,
        query: &str,
        conversation_id: Option<&str>,
        limit: i64,
        cursor: Option<&str>,
    ) -> AppResult<MessagePage> {
        let limit = limit.clamp(1, self.limits.max_page_limit);
        let cursor_pair = cursor.map(decode_cursor).transpose()?;
        let cursor_ref = cursor_pair.as_ref().map(|(t, id)| (*t, id.as_str()));

        let conversation_ids = match conversation_id {
            Some(id) => {
                let participant = self.db.conversations().find_participant(id, user_id).await?;
                if participant.filter(|p| p.is_active()).is_none() {
                    return Err(AppError::NotParticipant);
                }
                vec![id.to_string()]
            }
            None => {
                let conversations = self
                    .db
                    .conversations()
                    .list_for_user(user_id, None, MAX_CONVERSATIONS_FOR_UNREAD, 0)
                    .await?;
                conversations.into_iter().map(|c| c.id).collect()
            }
        };

        let fetch_limit = limit + 1;
        let mut rows = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            self.db.messages().search(&conversation_ids, query, fetch_limit, cursor_ref),
        )
        .await
        .map_err(|_| AppError::Timeout)??;

        let has_more = rows.len() as i64 > limit;
        rows.truncate(limit as usize);
        let next_cursor = if has_more {
            rows.last().map(|m| encode_cursor(m.created_at, &m.id))
        } else {
            None
        };

        Ok(MessagePage { messages: rows, next_cursor, has_more, cached: false })
    }
}

fn cached_to_message(cached: CachedMessage) -> Message {
    Message {
        id: cached.id,
        conversation_id: cached.conversation_id,
        sender_id: cached.sender_id,
        content: cached.content,
        reply_to_id: cached.reply_to_id,
        created_at: cached.created_at,
        updated_at: cached.updated_at,
        deleted_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_round_trips() {
        let cursor = encode_cursor(1700000000000, "msg-1");
        let (created_at, id) = decode_cursor(&cursor).unwrap();
        assert_eq!(created_at, 1700000000000);
        assert_eq!(id, "msg-1");
    }

    #[test]
    fn malformed_cursor_is_rejected() {
        assert!(decode_cursor("not-a-cursor").is_err());
    }
}
