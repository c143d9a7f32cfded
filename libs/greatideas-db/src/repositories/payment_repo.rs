use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use greatideas_shared::{OrderStatus, PaymentMethod, PaymentStatus};
use sqlx::SqlitePool;

use crate::models::payment::Payment;

#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        order_id: i64,
        amount: i64,
        method: PaymentMethod,
        invoice_payload: &str,
        description: &str,
    ) -> Result<Payment> {
        let now = Utc::now();
        sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (order_id, amount, method, status, invoice_payload, currency, description,
                                  created_at, updated_at)
            VALUES (?, ?, ?, 'pending', ?, 'RUB', ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(amount)
        .bind(method.as_str())
        .bind(invoice_payload)
        .bind(description)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create payment")
    }

    pub async fn get(&self, id: i64) -> Result<Option<Payment>> {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch payment")
    }

    pub async fn get_by_order(&self, order_id: i64) -> Result<Option<Payment>> {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE order_id = ?")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch payment by order")
    }

    pub async fn get_by_payload(&self, payload: &str) -> Result<Option<Payment>> {
        self.get_by_column("invoice_payload", payload).await
    }

    pub async fn get_by_external_id(&self, external_id: &str) -> Result<Option<Payment>> {
        self.get_by_column("external_payment_id", external_id).await
    }

    pub async fn get_by_provider_charge_id(&self, charge_id: &str) -> Result<Option<Payment>> {
        self.get_by_column("provider_payment_charge_id", charge_id).await
    }

    async fn get_by_column(&self, column: &'static str, value: &str) -> Result<Option<Payment>> {
        if value.is_empty() {
            return Ok(None);
        }
        let sql = format!("SELECT * FROM payments WHERE {} = ? ORDER BY id LIMIT 1", column);
        sqlx::query_as::<_, Payment>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to fetch payment by {}", column))
    }

    pub async fn set_external_id(&self, id: i64, external_id: &str) -> Result<()> {
        sqlx::query("UPDATE payments SET external_payment_id = ?, updated_at = ? WHERE id = ?")
            .bind(external_id)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to store external payment id")?;
        Ok(())
    }

    pub async fn set_status(&self, id: i64, status: PaymentStatus) -> Result<()> {
        sqlx::query("UPDATE payments SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update payment status")?;
        Ok(())
    }

    /// Completes the payment, keeps any given charge ids and confirms the order.
    pub async fn mark_as_paid(
        &self,
        payment: &Payment,
        telegram_charge_id: Option<&str>,
        provider_charge_id: Option<&str>,
        paid_at: DateTime<Utc>,
    ) -> Result<Payment> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let updated = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = 'completed',
                telegram_payment_charge_id = COALESCE(?, telegram_payment_charge_id),
                provider_payment_charge_id = COALESCE(?, provider_payment_charge_id),
                paid_at = ?, updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(telegram_charge_id)
        .bind(provider_charge_id)
        .bind(paid_at)
        .bind(now)
        .bind(payment.id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to mark payment as paid")?;

        sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE id = ?")
            .bind(OrderStatus::Confirmed.as_str())
            .bind(now)
            .bind(payment.order_id)
            .execute(&mut *tx)
            .await
            .context("Failed to confirm order")?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Cancels the payment together with its order.
    pub async fn cancel_with_order(&self, payment: &Payment) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        sqlx::query("UPDATE payments SET status = ?, updated_at = ? WHERE id = ?")
            .bind(PaymentStatus::Cancelled.as_str())
            .bind(now)
            .bind(payment.id)
            .execute(&mut *tx)
            .await
            .context("Failed to cancel payment")?;

        sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE id = ?")
            .bind(OrderStatus::Cancelled.as_str())
            .bind(now)
            .bind(payment.order_id)
            .execute(&mut *tx)
            .await
            .context("Failed to cancel order")?;

        tx.commit().await?;
        Ok(())
    }
}
