use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::cafe::{Cafe, NewCafe, is_valid_phone};

#[derive(Debug, Clone)]
pub struct CafeRepository {
    pool: SqlitePool,
}

impl CafeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, cafe: &NewCafe) -> Result<Cafe> {
        if !cafe.phone.is_empty() && !is_valid_phone(&cafe.phone) {
            anyhow::bail!("Invalid phone number for cafe {}: {}", cafe.name, cafe.phone);
        }
        let now = Utc::now();
        sqlx::query_as::<_, Cafe>(
            r#"
            INSERT INTO cafes (name, slug, description, address, phone, working_hours, logo, cover_image,
                               min_order_amount, delivery_fee, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&cafe.name)
        .bind(&cafe.slug)
        .bind(&cafe.description)
        .bind(&cafe.address)
        .bind(&cafe.phone)
        .bind(&cafe.working_hours)
        .bind(&cafe.logo)
        .bind(&cafe.cover_image)
        .bind(cafe.min_order_amount)
        .bind(cafe.delivery_fee)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create cafe")
    }

    pub async fn get(&self, id: i64) -> Result<Option<Cafe>> {
        sqlx::query_as::<_, Cafe>("SELECT * FROM cafes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch cafe")
    }

    pub async fn get_active(&self, id: i64) -> Result<Option<Cafe>> {
        sqlx::query_as::<_, Cafe>("SELECT * FROM cafes WHERE id = ? AND is_active = 1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch active cafe")
    }

    pub async fn list_active(&self) -> Result<Vec<Cafe>> {
        sqlx::query_as::<_, Cafe>("SELECT * FROM cafes WHERE is_active = 1 ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list active cafes")
    }

    pub async fn count_active(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM cafes WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count active cafes")
    }

    pub async fn count_all(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM cafes")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count cafes")
    }

    pub async fn set_active(&self, id: i64, active: bool) -> Result<()> {
        sqlx::query("UPDATE cafes SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update cafe status")?;
        Ok(())
    }
}
