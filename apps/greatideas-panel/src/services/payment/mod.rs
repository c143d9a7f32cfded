use async_trait::async_trait;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

pub mod yookassa;

/// reqwest is built without a default rustls provider; install ring once per process.
pub fn install_crypto_provider() {
    match rustls::crypto::ring::default_provider().install_default() {
        Ok(()) => debug!("Installed ring crypto provider"),
        Err(_) => debug!("rustls crypto provider already installed"),
    }
}

/// Minimal view of a gateway payment object.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayPayment {
    pub id: String,
    pub status: String,
    pub confirmation_url: Option<String>,
    pub raw: Value,
}

impl GatewayPayment {
    pub fn from_value(raw: Value) -> Result<Self> {
        let id = raw
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("Gateway response has no id: {}", raw))?
            .to_string();
        let status = raw.get("status").and_then(Value::as_str).unwrap_or_default().to_string();
        let confirmation_url = raw
            .pointer("/confirmation/confirmation_url")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Self {
            id,
            status,
            confirmation_url,
            raw,
        })
    }
}

#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    /// Create a payment for `amount` kopecks and return the gateway object.
    async fn create_payment(
        &self,
        amount: i64,
        description: &str,
        return_url: Option<&str>,
        metadata: Map<String, Value>,
    ) -> Result<GatewayPayment>;

    async fn get_payment(&self, payment_id: &str) -> Result<GatewayPayment>;

    /// Capture a two-stage payment, optionally for a smaller amount.
    async fn capture_payment(&self, payment_id: &str, amount: Option<i64>) -> Result<GatewayPayment>;

    async fn cancel_payment(&self, payment_id: &str) -> Result<GatewayPayment>;

    async fn create_refund(&self, payment_id: &str, amount: i64, description: Option<&str>) -> Result<Value>;

    /// Get the adapter name
    fn name(&self) -> &str;
}

/// Notification body reduced to the fields the webhook acts on.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub event_type: String,
    /// Gateway payment id. Refund notifications carry it in `payment_id`.
    pub payment_id: String,
    pub status: String,
    /// Kopecks.
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub description: Option<String>,
    pub metadata: Map<String, Value>,
    pub created_at: Option<String>,
    pub captured_at: Option<DateTime<Utc>>,
}

impl WebhookEvent {
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
    }
}

/// Returns `None` when `event` or `object` is missing or empty.
pub fn process_webhook_data(data: &Value) -> Option<WebhookEvent> {
    let event_type = data.get("event").and_then(Value::as_str).filter(|e| !e.is_empty());
    let object = data.get("object").and_then(Value::as_object).filter(|o| !o.is_empty());
    let (Some(event_type), Some(object)) = (event_type, object) else {
        warn!("Incomplete webhook data: {}", data);
        return None;
    };

    let text = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_string);
    let payment_id = if event_type.starts_with("refund.") {
        text("payment_id").or_else(|| text("id"))
    } else {
        text("id")
    }
    .unwrap_or_default();

    let amount = object.get("amount");
    let event = WebhookEvent {
        event_type: event_type.to_string(),
        payment_id,
        status: text("status").unwrap_or_default(),
        amount: amount
            .and_then(|a| a.get("value"))
            .and_then(|v| match v {
                Value::String(s) => greatideas_shared::money::parse_rub(s),
                Value::Number(n) => n.as_f64().map(greatideas_shared::money::from_rubles),
                _ => None,
            }),
        currency: amount
            .and_then(|a| a.get("currency"))
            .and_then(Value::as_str)
            .map(str::to_string),
        description: text("description"),
        metadata: object
            .get("metadata")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
        created_at: text("created_at"),
        captured_at: text("captured_at")
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|d| d.with_timezone(&Utc)),
    };

    info!("Parsed webhook {} for payment {}", event.event_type, event.payment_id);
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn crypto_provider_installs_idempotently() {
        install_crypto_provider();
        install_crypto_provider();
        assert!(rustls::crypto::CryptoProvider::get_default().is_some());
    }

    #[test]
    fn parses_succeeded_notification() {
        let event = process_webhook_data(&json!({
            "type": "notification",
            "event": "payment.succeeded",
            "object": {
                "id": "2d6b3f8a-000f-5000-9000-1b68e7b15f3f",
                "status": "succeeded",
                "amount": {"value": "660.00", "currency": "RUB"},
                "description": "Заказ #GI1234560A1B",
                "metadata": {"invoice_payload": "order_7_abcdef12"},
                "created_at": "2025-06-02T09:00:00.000Z",
                "captured_at": "2025-06-02T09:01:30.000Z"
            }
        }))
        .unwrap();

        assert_eq!(event.event_type, "payment.succeeded");
        assert_eq!(event.status, "succeeded");
        assert_eq!(event.amount, Some(66000));
        assert_eq!(event.currency.as_deref(), Some("RUB"));
        assert_eq!(event.metadata_str("invoice_payload"), Some("order_7_abcdef12"));
        assert_eq!(event.captured_at.unwrap().to_rfc3339(), "2025-06-02T09:01:30+00:00");
    }

    #[test]
    fn refund_points_at_the_payment() {
        let event = process_webhook_data(&json!({
            "event": "refund.succeeded",
            "object": {"id": "refund-1", "payment_id": "pay-1", "status": "succeeded"}
        }))
        .unwrap();
        assert_eq!(event.payment_id, "pay-1");
    }

    #[test]
    fn rejects_incomplete_payloads() {
        assert!(process_webhook_data(&json!({"object": {"id": "x"}})).is_none());
        assert!(process_webhook_data(&json!({"event": "payment.succeeded"})).is_none());
        assert!(process_webhook_data(&json!({"event": "payment.succeeded", "object": {}})).is_none());
    }

    #[test]
    fn gateway_payment_reads_confirmation_url() {
        let payment = GatewayPayment::from_value(json!({
            "id": "p1",
            "status": "pending",
            "confirmation": {"type": "redirect", "confirmation_url": "https://yoomoney.ru/checkout/p1"}
        }))
        .unwrap();
        assert_eq!(payment.confirmation_url.as_deref(), Some("https://yoomoney.ru/checkout/p1"));
        assert!(GatewayPayment::from_value(json!({"status": "pending"})).is_err());
    }
}
