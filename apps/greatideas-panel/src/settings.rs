use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use sqlx::SqlitePool;
use anyhow::{Context, Result};
use chrono::Duration;
use greatideas_shared::hours::OrderWindow;
use tracing::info;

pub const ORDERS_OPEN_FROM: &str = "orders_open_from";
pub const ORDERS_OPEN_UNTIL: &str = "orders_open_until";
pub const RECENT_ORDER_WINDOW_MINUTES: &str = "recent_order_window_minutes";
pub const BOT_USERNAME: &str = "bot_username";

/// Runtime-tunable values from the `settings` table, cached in memory.
#[derive(Debug, Clone)]
pub struct SettingsService {
    pool: SqlitePool,
    cache: Arc<RwLock<HashMap<String, String>>>,
}

impl SettingsService {
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        let service = Self {
            pool,
            cache: Arc::new(RwLock::new(HashMap::new())),
        };

        service.reload_cache().await?;
        Ok(service)
    }

    pub async fn reload_cache(&self) -> Result<()> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM settings")
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch settings from DB")?;

        let mut cache = self.cache.write().await;
        cache.clear();
        cache.extend(rows);

        info!("Settings cache loaded with {} items", cache.len());
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.cache.read().await.get(key).cloned()
    }

    pub async fn get_or_default(&self, key: &str, default: &str) -> String {
        self.get(key).await.unwrap_or_else(|| default.to_string())
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .context("Failed to update setting in DB")?;

        self.cache.write().await.insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub async fn set_multiple(&self, settings: HashMap<String, String>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for (key, value) in &settings {
            sqlx::query(
                "INSERT INTO settings (key, value) VALUES (?, ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to update setting {}", key))?;
        }

        tx.commit().await?;
        self.cache.write().await.extend(settings);
        Ok(())
    }

    /// Moscow-time window in which web checkout accepts orders.
    pub async fn order_window(&self) -> OrderWindow {
        let open = self.get_or_default(ORDERS_OPEN_FROM, "10:00").await;
        let close = self.get_or_default(ORDERS_OPEN_UNTIL, "18:45").await;
        OrderWindow::parse(&open, &close)
    }

    pub async fn recent_order_window(&self) -> Duration {
        let minutes = self
            .get(RECENT_ORDER_WINDOW_MINUTES)
            .await
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|m| *m >= 0)
            .unwrap_or(5);
        Duration::minutes(minutes)
    }

    pub async fn bot_username(&self) -> Option<String> {
        self.get(BOT_USERNAME).await.filter(|u| !u.is_empty())
    }
}
