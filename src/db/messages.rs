//! Message and message-status repository.

use sqlx::SqlitePool;
use sqlx::prelude::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub reply_to_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

impl Message {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn was_edited(&self) -> bool {
        self.updated_at > self.created_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum MessageStatusState {
    Sent,
    Delivered,
    Read,
}

impl std::fmt::Display for MessageStatusState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sent => write!(f, "sent"),
            Self::Delivered => write!(f, "delivered"),
            Self::Read => write!(f, "read"),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct MessageStatus {
    pub message_id: String,
    pub user_id: String,
    pub state: MessageStatusState,
    pub updated_at: i64,
}

pub struct MessageRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> MessageRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a message and `sent`-state status rows for every recipient, in
    /// one transaction, and bump the conversation's `updated_at`.
    pub async fn send(
        &self,
        conversation_id: &str,
        sender_id: &str,
        content: &str,
        reply_to_id: Option<&str>,
        recipient_ids: &[String],
    ) -> Result<Message, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp_millis();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, content, reply_to_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(conversation_id)
        .bind(sender_id)
        .bind(content)
        .bind(reply_to_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for recipient_id in recipient_ids {
            sqlx::query(
                r#"
                INSERT INTO message_status (message_id, user_id, state, updated_at)
                VALUES (?, ?, 'sent', ?)
                "#,
            )
            .bind(&id)
            .bind(recipient_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.find_by_id(&id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Message>, sqlx::Error> {
        sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool)
            .await
    }

    pub async fn edit(&self, id: &str, content: &str) -> Result<Message, sqlx::Error> {
        let now = chrono::Utc::now().timestamp_millis();
        sqlx::query("UPDATE messages SET content = ?, updated_at = ? WHERE id = ?")
            .bind(content)
            .bind(now)
            .bind(id)
            .execute(self.pool)
            .await?;
        self.find_by_id(id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn soft_delete(&self, id: &str) -> Result<(), sqlx::Error> {
        let now = chrono::Utc::now().timestamp_millis();
        sqlx::query("UPDATE messages SET deleted_at = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Newest-first page of non-deleted messages, optionally before a
    /// `(created_at, id)` cursor boundary.
    pub async fn list_recent(
        &self,
        conversation_id: &str,
        limit: i64,
        cursor: Option<(i64, &str)>,
        include_deleted: bool,
    ) -> Result<Vec<Message>, sqlx::Error> {
        let deleted_clause = if include_deleted { "" } else { "AND deleted_at IS NULL" };
        match cursor {
            Some((created_at, id)) => {
                let sql = format!(
                    "SELECT * FROM messages WHERE conversation_id = ? {deleted_clause} \
                     AND (created_at < ? OR (created_at = ? AND id < ?)) \
                     ORDER BY created_at DESC, id DESC LIMIT ?"
                );
                sqlx::query_as::<_, Message>(&sql)
                    .bind(conversation_id)
                    .bind(created_at)
                    .bind(created_at)
                    .bind(id)
                    .bind(limit)
                    .fetch_all(self.pool)
                    .await
            }
            None => {
                let sql = format!(
                    "SELECT * FROM messages WHERE conversation_id = ? {deleted_clause} \
                     ORDER BY created_at DESC, id DESC LIMIT ?"
                );
                sqlx::query_as::<_, Message>(&sql)
                    .bind(conversation_id)
                    .bind(limit)
                    .fetch_all(self.pool)
                    .await
            }
        }
    }

    pub async fn search(
        &self,
        conversation_ids: &[String],
        query: &str,
        limit: i64,
        cursor: Option<(i64, &str)>,
    ) -> Result<Vec<Message>, sqlx::Error> {
        if conversation_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = conversation_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let cursor_clause = if cursor.is_some() {
            "AND (m.created_at < ? OR (m.created_at = ? AND m.id < ?))"
        } else {
            ""
        };
        let sql = format!(
            r#"
            SELECT m.* FROM messages m
            JOIN messages_fts fts ON fts.rowid = m.rowid
            WHERE m.conversation_id IN ({placeholders})
              AND m.deleted_at IS NULL
              AND messages_fts MATCH ?
              {cursor_clause}
            ORDER BY m.created_at DESC, m.id DESC
            LIMIT ?
            "#
        );

        let mut q = sqlx::query_as::<_, Message>(&sql);
        for id in conversation_ids {
            q = q.bind(id);
        }
        q = q.bind(query);
        if let Some((created_at, id)) = cursor {
            q = q.bind(created_at).bind(created_at).bind(id);
        }
        q = q.bind(limit);
        q.fetch_all(self.pool).await
    }

    pub async fn status_for(
        &self,
        message_id: &str,
        user_id: &str,
    ) -> Result<Option<MessageStatus>, sqlx::Error> {
        sqlx::query_as::<_, MessageStatus>(
            "SELECT * FROM message_status WHERE message_id = ? AND user_id = ?",
        )
        .bind(message_id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await
    }

    /// Transition status rows for `user_id` that are at `from` or earlier in
    /// the state order to `to`. Monotonic: never regresses.
    pub async fn advance_status(
        &self,
        message_ids: &[String],
        user_id: &str,
        to: MessageStatusState,
    ) -> Result<u64, sqlx::Error> {
        if message_ids.is_empty() {
            return Ok(0);
        }
        let now = chrono::Utc::now().timestamp_millis();
        let placeholders = message_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let allowed_from: &[&str] = match to {
            MessageStatusState::Delivered => &["sent"],
            MessageStatusState::Read => &["sent", "delivered"],
            MessageStatusState::Sent => &[],
        };
        if allowed_from.is_empty() {
            return Ok(0);
        }
        let from_placeholders = allowed_from.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "UPDATE message_status SET state = ?, updated_at = ? \
             WHERE user_id = ? AND message_id IN ({placeholders}) AND state IN ({from_placeholders})"
        );
        let mut q = sqlx::query(&sql).bind(to).bind(now).bind(user_id);
        for id in message_ids {
            q = q.bind(id);
        }
        for s in allowed_from {
            q = q.bind(*s);
        }
        let result = q.execute(self.pool).await?;
        Ok(result.rows_affected())
    }

    /// All message ids in a conversation with state < read for `user_id`,
    /// used for "bulk read up to now".
    pub async fn unread_message_ids(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT ms.message_id FROM message_status ms
            JOIN messages m ON m.id = ms.message_id
            WHERE m.conversation_id = ? AND ms.user_id = ? AND ms.state != 'read'
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_all(self.pool)
        .await
    }

    pub async fn unread_count(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM message_status ms
            JOIN messages m ON m.id = ms.message_id
            WHERE m.conversation_id = ? AND ms.user_id = ? AND ms.state != 'read'
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_one(self.pool)
        .await
    }
}
