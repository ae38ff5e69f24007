//! User repository.

use sqlx::SqlitePool;
use sqlx::prelude::FromRow;

/// A registered user.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub display_name: String,
    pub bio: String,
    pub avatar_ref: Option<String>,
    pub status: String,
    pub hide_read_status: bool,
    pub is_active: bool,
    pub last_seen_at: Option<i64>,
    pub created_at: i64,
}

/// Repository for user operations.
pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        display_name: &str,
    ) -> Result<User, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, display_name, bio,
                                status, hide_read_status, is_active, created_at)
            VALUES (?, ?, ?, ?, ?, '', 'offline', 0, 1, ?)
            "#,
        )
        .bind(&id)
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(display_name)
        .bind(now)
        .execute(self.pool)
        .await?;

        self.find_by_id(&id)
            .await?
            .ok_or_else(|| sqlx::Error::RowNotFound)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool)
            .await
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(self.pool)
            .await
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(self.pool)
            .await
    }

    pub async fn search(&self, query: &str, limit: i64) -> Result<Vec<User>, sqlx::Error> {
        let pattern = format!("%{}%", query.replace('%', "").replace('_', ""));
        sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE username LIKE ? AND is_active = 1 ORDER BY username LIMIT ?",
        )
        .bind(pattern)
        .bind(limit)
        .fetch_all(self.pool)
        .await
    }

    pub async fn update_profile(
        &self,
        id: &str,
        display_name: &str,
        bio: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET display_name = ?, bio = ? WHERE id = ?")
            .bind(display_name)
            .bind(bio)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_avatar(&self, id: &str, avatar_ref: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET avatar_ref = ? WHERE id = ?")
            .bind(avatar_ref)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_privacy(&self, id: &str, hide_read_status: bool) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET hide_read_status = ? WHERE id = ?")
            .bind(hide_read_status)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Advisory status + last-seen persistence. Authoritative live status
    /// lives in the presence cache; this field is allowed to lag.
    pub async fn set_advisory_status(
        &self,
        id: &str,
        status: &str,
        last_seen_at: Option<i64>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET status = ?, last_seen_at = COALESCE(?, last_seen_at) WHERE id = ?")
            .bind(status)
            .bind(last_seen_at)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
