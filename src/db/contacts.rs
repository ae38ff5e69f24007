//! Contact list and block-list repository.

use sqlx::SqlitePool;
use sqlx::prelude::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct Contact {
    pub owner_user_id: String,
    pub contact_user_id: String,
    pub nickname: Option<String>,
    pub is_blocked: bool,
    pub is_favorite: bool,
    pub added_at: i64,
}

pub struct ContactRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ContactRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Add `contact_user_id` to `owner_user_id`'s contact list. Rejecting
    /// `owner_user_id == contact_user_id` is the caller's job.
    pub async fn add(
        &self,
        owner_user_id: &str,
        contact_user_id: &str,
    ) -> Result<Contact, sqlx::Error> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO contacts (owner_user_id, contact_user_id, is_blocked, is_favorite, added_at)
            VALUES (?, ?, 0, 0, ?)
            ON CONFLICT (owner_user_id, contact_user_id) DO NOTHING
            "#,
        )
        .bind(owner_user_id)
        .bind(contact_user_id)
        .bind(now)
        .execute(self.pool)
        .await?;

        self.find(owner_user_id, contact_user_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn remove(
        &self,
        owner_user_id: &str,
        contact_user_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM contacts WHERE owner_user_id = ? AND contact_user_id = ?")
            .bind(owner_user_id)
            .bind(contact_user_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn find(
        &self,
        owner_user_id: &str,
        contact_user_id: &str,
    ) -> Result<Option<Contact>, sqlx::Error> {
        sqlx::query_as::<_, Contact>(
            "SELECT * FROM contacts WHERE owner_user_id = ? AND contact_user_id = ?",
        )
        .bind(owner_user_id)
        .bind(contact_user_id)
        .fetch_optional(self.pool)
        .await
    }

    pub async fn list(&self, owner_user_id: &str) -> Result<Vec<Contact>, sqlx::Error> {
        sqlx::query_as::<_, Contact>(
            "SELECT * FROM contacts WHERE owner_user_id = ? ORDER BY added_at ASC",
        )
        .bind(owner_user_id)
        .fetch_all(self.pool)
        .await
    }

    pub async fn set_blocked(
        &self,
        owner_user_id: &str,
        contact_user_id: &str,
        is_blocked: bool,
    ) -> Result<Contact, sqlx::Error> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO contacts (owner_user_id, contact_user_id, is_blocked, is_favorite, added_at)
            VALUES (?, ?, ?, 0, ?)
            ON CONFLICT (owner_user_id, contact_user_id) DO UPDATE SET is_blocked = excluded.is_blocked
            "#,
        )
        .bind(owner_user_id)
        .bind(contact_user_id)
        .bind(is_blocked)
        .bind(now)
        .execute(self.pool)
        .await?;

        self.find(owner_user_id, contact_user_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn set_favorite(
        &self,
        owner_user_id: &str,
        contact_user_id: &str,
        is_favorite: bool,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE contacts SET is_favorite = ? WHERE owner_user_id = ? AND contact_user_id = ?",
        )
        .bind(is_favorite)
        .bind(owner_user_id)
        .bind(contact_user_id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_nickname(
        &self,
        owner_user_id: &str,
        contact_user_id: &str,
        nickname: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE contacts SET nickname = ? WHERE owner_user_id = ? AND contact_user_id = ?",
        )
        .bind(nickname)
        .bind(owner_user_id)
        .bind(contact_user_id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// `true` if either party has blocked the other — the send-time gate for
    /// direct conversations.
    pub async fn either_blocks(&self, user_a: &str, user_b: &str) -> Result<bool, sqlx::Error> {
        let blocked: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM contacts
            WHERE is_blocked = 1
              AND ((owner_user_id = ? AND contact_user_id = ?) OR (owner_user_id = ? AND contact_user_id = ?))
            "#,
        )
        .bind(user_a)
        .bind(user_b)
        .bind(user_b)
        .bind(user_a)
        .fetch_one(self.pool)
        .await?;
        Ok(blocked > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn seed_users(db: &Database, ids: &[&str]) {
        for id in ids {
            sqlx::query(
                "INSERT INTO users (id, username, email, password_hash, display_name, bio, status, hide_read_status, is_active, created_at) \
                 VALUES (?, ?, ?, 'x', ?, '', 'offline', 0, 1, 0)",
            )
            .bind(*id)
            .bind(format!("user-{id}"))
            .bind(format!("{id}@example.test"))
            .bind(format!("User {id}"))
            .execute(db.pool())
            .await
            .unwrap();
        }
    }

    #[tokio::test]
    async fn block_is_visible_from_either_direction() {
        let db = Database::connect(":memory:").await.unwrap();
        seed_users(&db, &["a", "b"]).await;
        let repo = db.contacts();

        repo.add("a", "b").await.unwrap();
        repo.set_blocked("a", "b", true).await.unwrap();

        assert!(repo.either_blocks("a", "b").await.unwrap());
        assert!(repo.either_blocks("b", "a").await.unwrap());
    }

    #[tokio::test]
    async fn unblocked_contacts_do_not_block_sends() {
        let db = Database::connect(":memory:").await.unwrap();
        seed_users(&db, &["a", "b"]).await;
        let repo = db.contacts();

        repo.add("a", "b").await.unwrap();

        assert!(!repo.either_blocks("a", "b").await.unwrap());
    }
}
