//! Message state machine: send, edit, delete, delivery transitions.

use std::sync::Arc;

use crate::cache::Cache;
use crate::config::LimitsConfig;
use crate::db::{ConversationKind, Database, Message, MessageStatusState};
use crate::error::{AppError, AppResult};
use crate::pubsub::PubSub;
use crate::security::{OperationClass, RateLimiter};
use crate::state::{ConnectionManager, ServerEvent};

const EDIT_WINDOW_SECS: i64 = 15 * 60;

pub struct MessageEngine {
    db: Database,
    cache: Cache,
    pubsub: Arc<PubSub>,
    rate_limiter: Arc<RateLimiter>,
    connections: Arc<ConnectionManager>,
    limits: LimitsConfig,
}

fn room_for_conversation(conversation_id: &str) -> String {
    format!("conversation:{conversation_id}")
}

fn personal_room(user_id: &str) -> String {
    format!("user:{user_id}")
}

/// Trim and validate message content against the length bound.
fn validate_content(raw: &str, max_len: usize) -> AppResult<String> {
    let content = raw.trim().to_string();
    if content.is_empty() {
        return Err(AppError::ContentEmpty);
    }
    if content.chars().count() > max_len {
        return Err(AppError::ContentTooLong);
    }
    Ok(content)
}

impl MessageEngine {
    pub fn new(
        db: Database,
        cache: Cache,
        pubsub: Arc<PubSub>,
        rate_limiter: Arc<RateLimiter>,
        connections: Arc<ConnectionManager>,
        limits: LimitsConfig,
    ) -> Self {
        Self { db, cache, pubsub, rate_limiter, connections, limits }
    }

    pub async fn send(
        &self,
        sender_id: &str,
        conversation_id: &str,
        content: &str,
        temp_id: Option<String>,
    ) -> AppResult<Message> {
        if uuid::Uuid::parse_str(conversation_id).is_err() {
            return Err(AppError::InvalidConversation);
        }
        let content = validate_content(content, self.limits.message_max_len)?;

        match self.rate_limiter.check(sender_id, OperationClass::Send).await {
            crate::security::RateLimitOutcome::Limited { retry_after_ms } => {
                return Err(AppError::RateLimited { retry_after_ms });
            }
            crate::security::RateLimitOutcome::Allowed => {}
        }

        let conversations = self.db.conversations();
        let conversation = conversations
            .find_by_id(conversation_id)
            .await?
            .ok_or(AppError::ConversationNotFound)?;

        let sender_participant = conversations
            .find_participant(conversation_id, sender_id)
            .await?
            .filter(|p| p.is_active())
            .ok_or(AppError::NotParticipant)?;
        let _ = sender_participant;

        let active_participants = conversations.active_participants(conversation_id).await?;

        if conversation.kind == ConversationKind::Direct {
            if let Some(other) = active_participants.iter().find(|p| p.user_id != sender_id) {
                let blocked = self
                    .db
                    .contacts()
                    .either_blocks(sender_id, &other.user_id)
                    .await
                    .unwrap_or(false); // fail-open: store unavailability prioritizes delivery
                if blocked {
                    return Err(AppError::Blocked);
                }
            }
        }

        let recipient_ids: Vec<String> = active_participants
            .iter()
            .map(|p| p.user_id.clone())
            .filter(|id| id != sender_id)
            .collect();

        let message = self
            .db
            .messages()
            .send(conversation_id, sender_id, &content, None, &recipient_ids)
            .await?;

        self.cache.recent_messages().invalidate(conversation_id).await;
        for recipient_id in &recipient_ids {
            self.cache.unread().increment(conversation_id, recipient_id).await;
        }

        self.pubsub
            .publish(
                &room_for_conversation(conversation_id),
                &ServerEvent::MessageNew {
                    id: message.id.clone(),
                    conversation_id: message.conversation_id.clone(),
                    sender_id: message.sender_id.clone(),
                    content: message.content.clone(),
                    reply_to_id: message.reply_to_id.clone(),
                    created_at: message.created_at,
                    temp_id: temp_id.clone(),
                },
            )
            .await;

        self.connections.send_to_user(
            sender_id,
            ServerEvent::MessageSent {
                temp_id,
                message_id: message.id.clone(),
                created_at: message.created_at,
            },
        );

        crate::metrics::MESSAGES_SENT.inc();
        Ok(message)
    }

    pub async fn edit(&self, user_id: &str, message_id: &str, content: &str) -> AppResult<Message> {
        let content = validate_content(content, self.limits.message_max_len)?;

        match self.rate_limiter.check(user_id, OperationClass::EditOrDelete).await {
            crate::security::RateLimitOutcome::Limited { retry_after_ms } => {
                return Err(AppError::RateLimited { retry_after_ms });
            }
            crate::security::RateLimitOutcome::Allowed => {}
        }

        let repo = self.db.messages();
        let existing = repo.find_by_id(message_id).await?.ok_or(AppError::MessageNotFound)?;
        if existing.is_deleted() {
            return Err(AppError::MessageNotFound);
        }
        if existing.sender_id != user_id {
            return Err(AppError::NotOwner);
        }
        let now = chrono::Utc::now().timestamp_millis();
        if now - existing.created_at > EDIT_WINDOW_SECS * 1000 {
            return Err(AppError::EditWindowExpired);
        }

        let updated = repo.edit(message_id, &content).await?;
        self.cache.recent_messages().invalidate(&updated.conversation_id).await;

        self.pubsub
            .publish(
                &room_for_conversation(&updated.conversation_id),
                &ServerEvent::MessageEdited {
                    message_id: updated.id.clone(),
                    content: updated.content.clone(),
                    updated_at: updated.updated_at,
                },
            )
            .await;

        crate::metrics::MESSAGES_EDITED.inc();
        Ok(updated)
    }

    pub async fn delete(&self, user_id: &str, message_id: &str) -> AppResult<()> {
        match self.rate_limiter.check(user_id, OperationClass::EditOrDelete).await {
            crate::security::RateLimitOutcome::Limited { retry_after_ms } => {
                return Err(AppError::RateLimited { retry_after_ms });
            }
            crate::security::RateLimitOutcome::Allowed => {}
        }

        let repo = self.db.messages();
        let existing = repo.find_by_id(message_id).await?.ok_or(AppError::MessageNotFound)?;
        // Idempotent: an already-deleted message is indistinguishable from
        // not-found by design, so a second delete reports MESSAGE_NOT_FOUND.
        if existing.is_deleted() {
            return Err(AppError::MessageNotFound);
        }
        if existing.sender_id != user_id {
            return Err(AppError::NotOwner);
        }

        repo.soft_delete(message_id).await?;
        self.cache.recent_messages().invalidate(&existing.conversation_id).await;
        self.cache.delivery().invalidate(message_id).await;

        let deleted_at = chrono::Utc::now().timestamp_millis();
        self.pubsub
            .publish(
                &room_for_conversation(&existing.conversation_id),
                &ServerEvent::MessageDeleted {
                    message_id: message_id.to_string(),
                    conversation_id: existing.conversation_id.clone(),
                    deleted_at,
                },
            )
            .await;

        crate::metrics::MESSAGES_DELETED.inc();
        Ok(())
    }

    /// Recipient's client acknowledges `message:new` events it received.
    pub async fn mark_delivered(&self, user_id: &str, message_ids: &[String]) -> AppResult<()> {
        if message_ids.is_empty() {
            return Ok(());
        }
        let repo = self.db.messages();
        let affected = repo
            .advance_status(message_ids, user_id, MessageStatusState::Delivered)
            .await?;
        if affected == 0 {
            return Ok(());
        }

        let updates: Vec<(String, String, MessageStatusState)> = message_ids
            .iter()
            .map(|id| (id.clone(), user_id.to_string(), MessageStatusState::Delivered))
            .collect();
        self.cache.delivery().set_batch(&updates).await;

        // The recipient acknowledging delivery reports to the sender(s) of
        // those messages, so look up the senders actually affected.
        let mut by_sender: std::collections::HashMap<String, Vec<String>> = std::collections::HashMap::new();
        for id in message_ids {
            if let Ok(Some(message)) = repo.find_by_id(id).await {
                by_sender.entry(message.sender_id).or_default().push(id.clone());
            }
        }
        for (sender_id, ids) in by_sender {
            self.pubsub
                .publish(
                    &personal_room(&sender_id),
                    &ServerEvent::MessageDeliveryStatus {
                        message_ids: ids,
                        user_id: user_id.to_string(),
                        status: MessageStatusState::Delivered,
                    },
                )
                .await;
        }

        Ok(())
    }

    /// Mark read, either a whole conversation up to now or a specific set
    /// of message ids.
    pub async fn mark_read(
        &self,
        user_id: &str,
        hide_read_status: bool,
        conversation_id: Option<&str>,
        message_ids: Option<&[String]>,
    ) -> AppResult<()> {
        let repo = self.db.messages();
        let ids: Vec<String> = match (conversation_id, message_ids) {
            (Some(conversation_id), _) => repo.unread_message_ids(conversation_id, user_id).await?,
            (None, Some(ids)) => ids.to_vec(),
            (None, None) => return Ok(()),
        };
        if ids.is_empty() {
            return Ok(());
        }

        let affected = repo.advance_status(&ids, user_id, MessageStatusState::Read).await?;
        if affected == 0 {
            return Ok(());
        }

        let updates: Vec<(String, String, MessageStatusState)> =
            ids.iter().map(|id| (id.clone(), user_id.to_string(), MessageStatusState::Read)).collect();
        self.cache.delivery().set_batch(&updates).await;

        let mut max_created_at: Option<i64> = None;
        let mut by_sender: std::collections::HashMap<String, Vec<String>> = std::collections::HashMap::new();
        for id in &ids {
            if let Ok(Some(message)) = repo.find_by_id(id).await {
                max_created_at = Some(max_created_at.unwrap_or(message.created_at).max(message.created_at));
                by_sender.entry(message.sender_id).or_default().push(id.clone());
            }
        }

        if let (Some(conversation_id), Some(max_created_at)) = (conversation_id, max_created_at) {
            self.cache.unread().reset_conversation(conversation_id, user_id).await;
            self.db
                .conversations()
                .advance_last_read_at(conversation_id, user_id, max_created_at)
                .await?;
        }

        if hide_read_status {
            return Ok(());
        }

        let timestamp = chrono::Utc::now().timestamp_millis();
        for sender_id in by_sender.into_keys() {
            self.pubsub
                .publish(
                    &personal_room(&sender_id),
                    &ServerEvent::MessageReadStatus {
                        user_id: user_id.to_string(),
                        status: MessageStatusState::Read,
                        timestamp,
                    },
                )
                .await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_content_trims_and_rejects_empty() {
        assert!(validate_content("   ", 10).is_err());
        assert_eq!(validate_content("  hi  ", 10).unwrap(), "hi");
    }

    #[test]
    fn validate_content_enforces_max_length() {
        let long = "a".repeat(11);
        assert!(matches!(validate_content(&long, 10), Err(AppError::ContentTooLong)));
    }
}
