//! Conversation and participant repository.
//!
//! Direct-conversation idempotency and last-admin promotion are orchestrated
//! by `engine::conversation` (which owns locking discipline); this module
//! is the plain CRUD layer underneath it.

use sqlx::SqlitePool;
use sqlx::prelude::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum ConversationKind {
    Direct,
    Group,
}

impl std::fmt::Display for ConversationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Group => write!(f, "group"),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Conversation {
    pub id: String,
    pub kind: ConversationKind,
    pub name: Option<String>,
    pub avatar_ref: Option<String>,
    pub created_by: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub direct_pair_key: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Participant {
    pub conversation_id: String,
    pub user_id: String,
    pub is_admin: bool,
    pub joined_at: i64,
    pub left_at: Option<i64>,
    pub last_read_at: i64,
    pub is_muted: bool,
    pub is_archived: bool,
}

impl Participant {
    pub fn is_active(&self) -> bool {
        self.left_at.is_none()
    }
}

/// Deterministic key for a direct conversation's unordered participant pair.
pub fn direct_pair_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}:{b}")
    } else {
        format!("{b}:{a}")
    }
}

pub struct ConversationRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ConversationRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_by_direct_pair_key(
        &self,
        key: &str,
    ) -> Result<Option<Conversation>, sqlx::Error> {
        sqlx::query_as::<_, Conversation>("SELECT * FROM conversations WHERE direct_pair_key = ?")
            .bind(key)
            .fetch_optional(self.pool)
            .await
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Conversation>, sqlx::Error> {
        sqlx::query_as::<_, Conversation>("SELECT * FROM conversations WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool)
            .await
    }

    /// Create a direct conversation. Returns `Ok(None)` on a unique-constraint
    /// race (another task won the insert for this pair) so the caller can
    /// re-query rather than treat it as a hard failure.
    pub async fn create_direct(
        &self,
        a: &str,
        b: &str,
    ) -> Result<Option<Conversation>, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();
        let key = direct_pair_key(a, b);

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO conversations (id, kind, name, created_by, created_at, updated_at, direct_pair_key)
            VALUES (?, 'direct', NULL, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(a)
        .bind(now)
        .bind(now)
        .bind(&key)
        .execute(&mut *tx)
        .await;

        if let Err(sqlx::Error::Database(ref db_err)) = result
            && db_err.is_unique_violation()
        {
            return Ok(None);
        }
        result?;

        for user_id in [a, b] {
            sqlx::query(
                r#"
                INSERT INTO conversation_participants (conversation_id, user_id, is_admin, joined_at, last_read_at)
                VALUES (?, ?, 0, ?, 0)
                "#,
            )
            .bind(&id)
            .bind(user_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.find_by_id(&id).await
    }

    pub async fn create_group(
        &self,
        creator_id: &str,
        member_ids: &[String],
        name: Option<&str>,
        avatar_ref: Option<&str>,
    ) -> Result<Conversation, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO conversations (id, kind, name, avatar_ref, created_by, created_at, updated_at)
            VALUES (?, 'group', ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(name)
        .bind(avatar_ref)
        .bind(creator_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO conversation_participants (conversation_id, user_id, is_admin, joined_at, last_read_at)
            VALUES (?, ?, 1, ?, 0)
            "#,
        )
        .bind(&id)
        .bind(creator_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for (offset, member_id) in member_ids.iter().enumerate() {
            if member_id == creator_id {
                continue;
            }
            sqlx::query(
                r#"
                INSERT INTO conversation_participants (conversation_id, user_id, is_admin, joined_at, last_read_at)
                VALUES (?, ?, 0, ?, 0)
                "#,
            )
            .bind(&id)
            .bind(member_id)
            // stagger joined_at so ordering among members is deterministic
            .bind(now + offset as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.find_by_id(&id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn update_group_settings(
        &self,
        id: &str,
        name: Option<&str>,
        avatar_ref: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        if let Some(name) = name {
            sqlx::query("UPDATE conversations SET name = ? WHERE id = ?")
                .bind(name)
                .bind(id)
                .execute(self.pool)
                .await?;
        }
        if let Some(avatar_ref) = avatar_ref {
            sqlx::query("UPDATE conversations SET avatar_ref = ? WHERE id = ?")
                .bind(avatar_ref)
                .bind(id)
                .execute(self.pool)
                .await?;
        }
        Ok(())
    }

    pub async fn find_participant(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Option<Participant>, sqlx::Error> {
        sqlx::query_as::<_, Participant>(
            "SELECT * FROM conversation_participants WHERE conversation_id = ? AND user_id = ?",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await
    }

    pub async fn active_participants(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<Participant>, sqlx::Error> {
        sqlx::query_as::<_, Participant>(
            "SELECT * FROM conversation_participants WHERE conversation_id = ? AND left_at IS NULL \
             ORDER BY joined_at ASC",
        )
        .bind(conversation_id)
        .fetch_all(self.pool)
        .await
    }

    pub async fn all_participants(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<Participant>, sqlx::Error> {
        sqlx::query_as::<_, Participant>(
            "SELECT * FROM conversation_participants WHERE conversation_id = ? ORDER BY joined_at ASC",
        )
        .bind(conversation_id)
        .fetch_all(self.pool)
        .await
    }

    pub async fn add_or_reactivate_participant(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<(), sqlx::Error> {
        let now = chrono::Utc::now().timestamp();
        let existing = self.find_participant(conversation_id, user_id).await?;
        match existing {
            Some(_) => {
                sqlx::query(
                    "UPDATE conversation_participants SET left_at = NULL, joined_at = ? \
                     WHERE conversation_id = ? AND user_id = ?",
                )
                .bind(now)
                .bind(conversation_id)
                .bind(user_id)
                .execute(self.pool)
                .await?;
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO conversation_participants (conversation_id, user_id, is_admin, joined_at, last_read_at)
                    VALUES (?, ?, 0, ?, 0)
                    "#,
                )
                .bind(conversation_id)
                .bind(user_id)
                .bind(now)
                .execute(self.pool)
                .await?;
            }
        }
        Ok(())
    }

    pub async fn set_left_at(
        &self,
        conversation_id: &str,
        user_id: &str,
        at: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE conversation_participants SET left_at = ? WHERE conversation_id = ? AND user_id = ?",
        )
        .bind(at)
        .bind(conversation_id)
        .bind(user_id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_admin(
        &self,
        conversation_id: &str,
        user_id: &str,
        is_admin: bool,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE conversation_participants SET is_admin = ? WHERE conversation_id = ? AND user_id = ?",
        )
        .bind(is_admin)
        .bind(conversation_id)
        .bind(user_id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn advance_last_read_at(
        &self,
        conversation_id: &str,
        user_id: &str,
        at: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE conversation_participants SET last_read_at = MAX(last_read_at, ?) \
             WHERE conversation_id = ? AND user_id = ?",
        )
        .bind(at)
        .bind(conversation_id)
        .bind(user_id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_for_user(
        &self,
        user_id: &str,
        kind: Option<ConversationKind>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Conversation>, sqlx::Error> {
        match kind {
            Some(kind) => {
                sqlx::query_as::<_, Conversation>(
                    r#"
                    SELECT c.* FROM conversations c
                    JOIN conversation_participants p ON p.conversation_id = c.id
                    WHERE p.user_id = ? AND p.left_at IS NULL AND c.kind = ?
                    ORDER BY c.updated_at DESC
                    LIMIT ? OFFSET ?
                    "#,
                )
                .bind(user_id)
                .bind(kind)
                .bind(limit)
                .bind(offset)
                .fetch_all(self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, Conversation>(
                    r#"
                    SELECT c.* FROM conversations c
                    JOIN conversation_participants p ON p.conversation_id = c.id
                    WHERE p.user_id = ? AND p.left_at IS NULL
                    ORDER BY c.updated_at DESC
                    LIMIT ? OFFSET ?
                    "#,
                )
                .bind(user_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(self.pool)
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_key_is_order_independent() {
        assert_eq!(direct_pair_key("a", "b"), direct_pair_key("b", "a"));
    }

    #[test]
    fn pair_key_is_stable_for_same_order() {
        assert_eq!(direct_pair_key("a", "b"), "a:b");
    }
}
