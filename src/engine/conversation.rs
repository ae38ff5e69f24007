//! Conversation lifecycle: direct-conversation idempotency, group creation,
//! participant management, and last-admin protection.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::db::{Conversation, ConversationKind, ConversationRepository, Database, direct_pair_key};
use crate::error::{AppError, AppResult};
use crate::pubsub::PubSub;
use crate::state::ServerEvent;

const MAX_BATCH_ADD: usize = 10;
const NAME_MAX_LEN: usize = 100;

fn room_for_conversation(conversation_id: &str) -> String {
    format!("conversation:{conversation_id}")
}

pub struct CreateDirectResult {
    pub conversation: Conversation,
    pub created: bool,
}

/// Conversation engine. Owns the in-process per-pair lock that makes
/// direct-conversation creation race-free even though SQLite has no
/// `pg_advisory_lock`: the `UNIQUE` constraint on `direct_pair_key` is the
/// last line of defense, but this lock avoids a redundant insert attempt
/// (and its wasted round trip) whenever two requests for the same pair
/// land on this instance at once.
pub struct ConversationEngine {
    db: Database,
    pubsub: Arc<PubSub>,
    pair_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ConversationEngine {
    pub fn new(db: Database, pubsub: Arc<PubSub>) -> Self {
        Self { db, pubsub, pair_locks: DashMap::new() }
    }

    fn pair_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.pair_locks.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    pub async fn create_direct(&self, user_a: &str, user_b: &str) -> AppResult<CreateDirectResult> {
        if user_a == user_b {
            return Err(AppError::SelfConversation);
        }
        let repo = self.db.conversations();
        let key = direct_pair_key(user_a, user_b);
        let lock = self.pair_lock(&key);
        let _guard = lock.lock().await;

        if let Some(conversation) = repo.find_by_direct_pair_key(&key).await? {
            return Ok(CreateDirectResult { conversation, created: false });
        }

        match repo.create_direct(user_a, user_b).await? {
            Some(conversation) => Ok(CreateDirectResult { conversation, created: true }),
            None => {
                // Lost a race with another instance; re-query the row the
                // winner just committed.
                let conversation = repo
                    .find_by_direct_pair_key(&key)
                    .await?
                    .ok_or(AppError::Internal("direct conversation vanished after unique-constraint race".into()))?;
                Ok(CreateDirectResult { conversation, created: false })
            }
        }
    }

    pub async fn create_group(
        &self,
        creator_id: &str,
        participant_ids: &[String],
        name: Option<&str>,
        avatar_ref: Option<&str>,
        usernames_by_id: &std::collections::HashMap<String, String>,
    ) -> AppResult<Conversation> {
        let mut members: Vec<String> = participant_ids.iter().cloned().collect();
        if !members.iter().any(|id| id == creator_id) {
            members.push(creator_id.to_string());
        }
        members.sort();
        members.dedup();
        if members.len() < 3 {
            return Err(AppError::ValidationError("group conversations require at least 3 distinct participants".into()));
        }

        let synthesized_name;
        let resolved_name = match name {
            Some(n) if !n.trim().is_empty() => n.trim(),
            _ => {
                synthesized_name = synthesize_group_name(&members, creator_id, usernames_by_id);
                &synthesized_name
            }
        };

        self.db
            .conversations()
            .create_group(creator_id, &members, Some(resolved_name), avatar_ref)
            .await
            .map_err(AppError::from)
    }

    pub async fn add_participants(
        &self,
        conversation_id: &str,
        actor_id: &str,
        user_ids: &[String],
    ) -> AppResult<()> {
        if user_ids.is_empty() || user_ids.len() > MAX_BATCH_ADD {
            return Err(AppError::ValidationError(format!(
                "must add between 1 and {MAX_BATCH_ADD} participants at a time"
            )));
        }
        let mut deduped = user_ids.to_vec();
        deduped.sort();
        deduped.dedup();
        if deduped.len() != user_ids.len() {
            return Err(AppError::ValidationError("duplicate user ids in batch".into()));
        }

        let repo = self.db.conversations();
        let conversation = repo.find_by_id(conversation_id).await?.ok_or(AppError::ConversationNotFound)?;
        self.require_admin(&repo, &conversation, actor_id).await?;

        for user_id in &deduped {
            if self.db.users().find_by_id(user_id).await?.is_none() {
                return Err(AppError::UserNotFound);
            }
        }

        for user_id in &deduped {
            repo.add_or_reactivate_participant(conversation_id, user_id).await?;
        }

        self.pubsub
            .publish(
                &room_for_conversation(conversation_id),
                &ServerEvent::ConversationParticipantAdded {
                    conversation_id: conversation_id.to_string(),
                    participants: deduped,
                    added_by: actor_id.to_string(),
                },
            )
            .await;
        Ok(())
    }

    /// Remove `target_id` from `conversation_id`. `actor_id == target_id`
    /// is a self-removal (always allowed); otherwise the actor must be an
    /// admin.
    pub async fn remove_participant(
        &self,
        conversation_id: &str,
        actor_id: &str,
        target_id: &str,
    ) -> AppResult<()> {
        let repo = self.db.conversations();
        let conversation = repo.find_by_id(conversation_id).await?.ok_or(AppError::ConversationNotFound)?;
        let is_self_removal = actor_id == target_id;
        if !is_self_removal {
            self.require_admin(&repo, &conversation, actor_id).await?;
        }

        let target = repo
            .find_participant(conversation_id, target_id)
            .await?
            .filter(|p| p.is_active())
            .ok_or(AppError::NotParticipant)?;

        let active = repo.active_participants(conversation_id).await?;
        if active.len() <= 1 {
            return Err(AppError::LastParticipant);
        }

        if target.is_admin {
            let other_admins = active.iter().any(|p| p.is_admin && p.user_id != target_id);
            if !other_admins {
                // sole admin leaving with other members present: promote
                // the earliest-joined remaining member first.
                if let Some(successor) = active.iter().find(|p| p.user_id != target_id) {
                    repo.set_admin(conversation_id, &successor.user_id, true).await?;
                    self.pubsub
                        .publish(
                            &room_for_conversation(conversation_id),
                            &ServerEvent::ConversationAdminPromoted {
                                conversation_id: conversation_id.to_string(),
                                user_id: successor.user_id.clone(),
                                reason: "last_admin_leaving".to_string(),
                            },
                        )
                        .await;
                }
            }
        }

        let now = chrono::Utc::now().timestamp();
        repo.set_left_at(conversation_id, target_id, now).await?;

        self.pubsub
            .publish(
                &room_for_conversation(conversation_id),
                &ServerEvent::ConversationParticipantRemoved {
                    conversation_id: conversation_id.to_string(),
                    user_id: target_id.to_string(),
                    removed_by: actor_id.to_string(),
                    is_self_removal,
                },
            )
            .await;
        Ok(())
    }

    pub async fn update_group_settings(
        &self,
        conversation_id: &str,
        actor_id: &str,
        name: Option<&str>,
        avatar_ref: Option<&str>,
    ) -> AppResult<()> {
        if name.is_none() && avatar_ref.is_none() {
            return Err(AppError::ValidationError("at least one field must be provided".into()));
        }
        let repo = self.db.conversations();
        let conversation = repo.find_by_id(conversation_id).await?.ok_or(AppError::ConversationNotFound)?;
        if conversation.kind != ConversationKind::Group {
            return Err(AppError::ValidationError("settings updates apply only to group conversations".into()));
        }
        self.require_admin(&repo, &conversation, actor_id).await?;

        repo.update_group_settings(conversation_id, name, avatar_ref).await?;

        self.pubsub
            .publish(
                &room_for_conversation(conversation_id),
                &ServerEvent::ConversationUpdated {
                    conversation_id: conversation_id.to_string(),
                    name: name.map(str::to_string),
                    avatar_url: avatar_ref.map(str::to_string),
                },
            )
            .await;
        Ok(())
    }

    /// Promote or demote a member. Demoting the sole admin without a
    /// replacement is rejected.
    pub async fn update_role(
        &self,
        conversation_id: &str,
        actor_id: &str,
        target_id: &str,
        is_admin: bool,
    ) -> AppResult<()> {
        let repo = self.db.conversations();
        let conversation = repo.find_by_id(conversation_id).await?.ok_or(AppError::ConversationNotFound)?;
        self.require_admin(&repo, &conversation, actor_id).await?;

        let target = repo
            .find_participant(conversation_id, target_id)
            .await?
            .filter(|p| p.is_active())
            .ok_or(AppError::NotParticipant)?;

        if target.is_admin && !is_admin {
            let active = repo.active_participants(conversation_id).await?;
            let other_admins = active.iter().any(|p| p.is_admin && p.user_id != target_id);
            if !other_admins {
                return Err(AppError::LastAdmin);
            }
        }

        repo.set_admin(conversation_id, target_id, is_admin).await?;
        Ok(())
    }

    async fn require_admin(
        &self,
        repo: &ConversationRepository<'_>,
        conversation: &Conversation,
        actor_id: &str,
    ) -> AppResult<()> {
        let actor = repo
            .find_participant(&conversation.id, actor_id)
            .await?
            .filter(|p| p.is_active())
            .ok_or(AppError::NotParticipant)?;
        if !actor.is_admin {
            return Err(AppError::NotOwner);
        }
        Ok(())
    }
}

/// Synthesize a group name from member usernames per the ≤3/">3" policy,
/// truncated to 100 chars with an ellipsis.
fn synthesize_group_name(
    members: &[String],
    creator_id: &str,
    usernames_by_id: &std::collections::HashMap<String, String>,
) -> String {
    let fallback = |id: &str| usernames_by_id.get(id).cloned().unwrap_or_else(|| id.to_string());
    let mut others: Vec<String> = members.iter().filter(|id| *id != creator_id).map(|id| fallback(id)).collect();
    others.sort();

    let raw = if others.len() <= 2 {
        let mut all = vec![fallback(creator_id)];
        all.extend(others);
        join_with_and(&all)
    } else {
        let shown: Vec<String> = std::iter::once(fallback(creator_id)).chain(others.iter().take(2).cloned()).collect();
        let remaining = others.len() - 2;
        let suffix = if remaining == 1 { "and 1 other".to_string() } else { format!("and {remaining} others") };
        format!("{}, {suffix}", shown.join(", "))
    };

    if raw.chars().count() > NAME_MAX_LEN {
        let truncated: String = raw.chars().take(NAME_MAX_LEN.saturating_sub(3)).collect();
        format!("{truncated}...")
    } else {
        raw
    }
}

fn join_with_and(names: &[String]) -> String {
    match names.len() {
        0 => String::new(),
        1 => names[0].clone(),
        2 => format!("{} and {}", names[0], names[1]),
        _ => {
            let (last, rest) = names.split_last().unwrap();
            format!("{}, and {}", rest.join(", "), last)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesize_name_for_small_group() {
        let mut names = std::collections::HashMap::new();
        names.insert("1".to_string(), "alice".to_string());
        names.insert("2".to_string(), "bob".to_string());
        names.insert("3".to_string(), "carol".to_string());
        let members = vec!["1".to_string(), "2".to_string(), "3".to_string()];
        let name = synthesize_group_name(&members, "1", &names);
        assert_eq!(name, "alice, bob, and carol");
    }

    #[test]
    fn synthesize_name_for_large_group() {
        let mut names = std::collections::HashMap::new();
        for (i, n) in ["alice", "bob", "carol", "dave", "erin"].iter().enumerate() {
            names.insert((i + 1).to_string(), n.to_string());
        }
        let members: Vec<String> = (1..=5).map(|i| i.to_string()).collect();
        let name = synthesize_group_name(&members, "1", &names);
        assert!(name.starts_with("alice, "));
        assert!(name.ends_with("others") || name.ends_with("other"));
    }
}
