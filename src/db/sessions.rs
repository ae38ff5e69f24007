//! Session repository.
//!
//! A `Session` is created on login and deactivated on logout or once its
//! `expires_at` passes; the bearer access token itself is stateless (JWT)
//! and only the refresh token round-trips through this table.

use sqlx::SqlitePool;
use sqlx::prelude::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub refresh_token: String,
    pub expires_at: i64,
    pub last_used_at: i64,
    pub is_active: bool,
}

pub struct SessionRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SessionRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        user_id: &str,
        refresh_token: &str,
        expires_at: i64,
    ) -> Result<Session, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, refresh_token, expires_at, last_used_at, is_active)
            VALUES (?, ?, ?, ?, ?, 1)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(refresh_token)
        .bind(expires_at)
        .bind(now)
        .execute(self.pool)
        .await?;

        Ok(Session {
            id,
            user_id: user_id.to_string(),
            refresh_token: refresh_token.to_string(),
            expires_at,
            last_used_at: now,
            is_active: true,
        })
    }

    pub async fn find_active_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<Session>, sqlx::Error> {
        sqlx::query_as::<_, Session>(
            "SELECT * FROM sessions WHERE refresh_token = ? AND is_active = 1",
        )
        .bind(refresh_token)
        .fetch_optional(self.pool)
        .await
    }

    pub async fn touch(&self, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE sessions SET last_used_at = ? WHERE id = ?")
            .bind(chrono::Utc::now().timestamp())
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn deactivate(&self, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE sessions SET is_active = 0 WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn deactivate_by_refresh_token(&self, refresh_token: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE sessions SET is_active = 0 WHERE refresh_token = ?")
            .bind(refresh_token)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
