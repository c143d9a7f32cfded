use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::bot::{BotMessage, BotUserSession};

/// Bot reply log and per-user navigation state.
#[derive(Debug, Clone)]
pub struct BotRepository {
    pool: SqlitePool,
}

impl BotRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn log_message(&self, user_id: i64, message_type: &str, text: &str) -> Result<()> {
        sqlx::query("INSERT INTO bot_messages (user_id, message_type, message_text, created_at) VALUES (?, ?, ?, ?)")
            .bind(user_id)
            .bind(message_type)
            .bind(text)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .context("Failed to log bot message")?;
        Ok(())
    }

    pub async fn messages_for_user(&self, user_id: i64) -> Result<Vec<BotMessage>> {
        sqlx::query_as::<_, BotMessage>("SELECT * FROM bot_messages WHERE user_id = ? ORDER BY created_at DESC, id DESC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch bot messages")
    }

    pub async fn set_navigation(&self, user_id: i64, cafe_id: Option<i64>, step: &str) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO bot_user_sessions (user_id, current_cafe_id, current_step, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                current_cafe_id = excluded.current_cafe_id,
                current_step = excluded.current_step,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(cafe_id)
        .bind(step)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to store bot navigation")?;
        Ok(())
    }

    pub async fn get_session(&self, user_id: i64) -> Result<Option<BotUserSession>> {
        sqlx::query_as::<_, BotUserSession>("SELECT * FROM bot_user_sessions WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch bot session")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::TelegramProfile;
    use crate::repositories::UserRepository;

    #[tokio::test]
    async fn navigation_is_upserted() {
        let pool = crate::db::connect_memory().await.unwrap();
        let menu = crate::seed::demo_menu(&pool).await.unwrap();
        let (user, _) = UserRepository::new(pool.clone())
            .upsert_profile(&TelegramProfile { telegram_id: 9, ..Default::default() })
            .await
            .unwrap();
        let repo = BotRepository::new(pool);

        repo.set_navigation(user.id, Some(menu.cafe_id), "cafe_selected").await.unwrap();
        repo.set_navigation(user.id, None, "main_menu").await.unwrap();
        let session = repo.get_session(user.id).await.unwrap().unwrap();
        assert_eq!(session.current_cafe_id, None);
        assert_eq!(session.current_step, "main_menu");

        repo.log_message(user.id, "start", "Добро пожаловать").await.unwrap();
        assert_eq!(repo.messages_for_user(user.id).await.unwrap().len(), 1);
    }
}
