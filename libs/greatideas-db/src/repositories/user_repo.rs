use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::user::{TelegramProfile, TelegramUser};

#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<TelegramUser>> {
        sqlx::query_as::<_, TelegramUser>("SELECT * FROM telegram_users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by ID")
    }

    pub async fn get_by_telegram_id(&self, telegram_id: i64) -> Result<Option<TelegramUser>> {
        sqlx::query_as::<_, TelegramUser>("SELECT * FROM telegram_users WHERE telegram_id = ?")
            .bind(telegram_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by Telegram ID")
    }

    /// Creates the user or refreshes its Telegram profile. Returns `(user, created)`.
    pub async fn upsert_profile(&self, profile: &TelegramProfile) -> Result<(TelegramUser, bool)> {
        let now = Utc::now();

        if let Some(existing) = self.get_by_telegram_id(profile.telegram_id).await? {
            let user = sqlx::query_as::<_, TelegramUser>(
                r#"
                UPDATE telegram_users
                SET username = ?, first_name = ?, last_name = ?,
                    language_code = COALESCE(?, language_code),
                    allows_write_to_pm = COALESCE(?, allows_write_to_pm),
                    updated_at = ?, last_activity = ?
                WHERE id = ?
                RETURNING *
                "#,
            )
            .bind(&profile.username)
            .bind(&profile.first_name)
            .bind(&profile.last_name)
            .bind(&profile.language_code)
            .bind(profile.allows_write_to_pm)
            .bind(now)
            .bind(now)
            .bind(existing.id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to update Telegram user")?;
            return Ok((user, false));
        }

        let user = sqlx::query_as::<_, TelegramUser>(
            r#"
            INSERT INTO telegram_users (telegram_id, username, first_name, last_name, language_code,
                                        allows_write_to_pm, created_at, updated_at, last_activity)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(profile.telegram_id)
        .bind(&profile.username)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(profile.language_code.as_deref().unwrap_or("ru"))
        .bind(profile.allows_write_to_pm.unwrap_or(false))
        .bind(now)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create Telegram user")?;

        tracing::info!("Registered Telegram user {}", profile.telegram_id);
        Ok((user, true))
    }

    pub async fn touch_activity(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE telegram_users SET last_activity = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update last activity")?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM telegram_users")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count users")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(first: &str) -> TelegramProfile {
        TelegramProfile {
            telegram_id: 777,
            username: Some("ivan".into()),
            first_name: first.into(),
            last_name: String::new(),
            language_code: None,
            allows_write_to_pm: Some(true),
        }
    }

    #[tokio::test]
    async fn upsert_creates_then_refreshes() {
        let repo = UserRepository::new(crate::db::connect_memory().await.unwrap());

        let (created, is_new) = repo.upsert_profile(&profile("Иван")).await.unwrap();
        assert!(is_new);
        assert_eq!(created.language_code, "ru");
        assert!(created.allows_write_to_pm);
        assert_eq!(created.full_name(), "Иван");

        let mut changed = profile("Иван");
        changed.last_name = "Петров".into();
        changed.language_code = Some("en".into());
        changed.allows_write_to_pm = None;
        let (updated, is_new) = repo.upsert_profile(&changed).await.unwrap();
        assert!(!is_new);
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.full_name(), "Иван Петров");
        assert_eq!(updated.language_code, "en");
        assert!(updated.allows_write_to_pm);
        assert_eq!(repo.count().await.unwrap(), 1);
    }
}
