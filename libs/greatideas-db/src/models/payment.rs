use chrono::{DateTime, Utc};
use greatideas_shared::PaymentStatus;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: i64,
    pub order_id: i64,
    pub amount: i64,
    pub method: String,
    pub status: String,
    pub external_payment_id: String,
    pub provider_payment_charge_id: String,
    pub telegram_payment_charge_id: String,
    pub invoice_payload: String,
    pub shipping_option_id: String,
    pub currency: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn status(&self) -> PaymentStatus {
        self.status.parse().unwrap_or(PaymentStatus::Pending)
    }

    pub fn is_paid(&self) -> bool {
        self.status() == PaymentStatus::Completed
    }
}
