use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

use crate::models::session::{SessionData, WebSession, WebSessionRow};

/// Server-side browser sessions keyed by an opaque cookie value.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, ttl: Duration) -> Result<WebSession> {
        let now = Utc::now();
        let session = WebSession {
            id: uuid::Uuid::new_v4().simple().to_string(),
            user_id: None,
            data: SessionData::default(),
            expires_at: now + ttl,
        };
        sqlx::query(
            "INSERT INTO web_sessions (id, user_id, data, expires_at, created_at, updated_at) VALUES (?, NULL, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(serde_json::to_string(&session.data)?)
        .bind(session.expires_at)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create web session")?;
        Ok(session)
    }

    /// Loads a session that has not expired yet.
    pub async fn load(&self, id: &str, now: DateTime<Utc>) -> Result<Option<WebSession>> {
        let row = sqlx::query_as::<_, WebSessionRow>(
            "SELECT id, user_id, data, expires_at FROM web_sessions WHERE id = ? AND expires_at > ?",
        )
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load web session")?;
        Ok(row.map(WebSession::from))
    }

    /// Persists data and login, sliding the expiry forward.
    pub async fn save(&self, session: &WebSession, ttl: Duration) -> Result<()> {
        let now = Utc::now();
        sqlx::query("UPDATE web_sessions SET user_id = ?, data = ?, expires_at = ?, updated_at = ? WHERE id = ?")
            .bind(session.user_id)
            .bind(serde_json::to_string(&session.data)?)
            .bind(now + ttl)
            .bind(now)
            .bind(&session.id)
            .execute(&self.pool)
            .await
            .context("Failed to save web session")?;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM web_sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete web session")?;
        Ok(())
    }

    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM web_sessions WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .context("Failed to purge expired sessions")?;
        Ok(result.rows_affected())
    }
}
