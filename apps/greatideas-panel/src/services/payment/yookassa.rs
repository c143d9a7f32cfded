use crate::services::payment::{GatewayPayment, PaymentAdapter, install_crypto_provider};
use anyhow::{Context, Result};
use async_trait::async_trait;
use greatideas_shared::money::format_rub;
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::error;

pub const API_BASE: &str = "https://api.yookassa.ru/v3";
pub const DEFAULT_RETURN_URL: &str = "https://coworking.greatideas.ru/";

pub struct YooKassaAdapter {
    shop_id: String,
    secret_key: String,
    base_url: String,
    default_return_url: String,
    client: reqwest::Client,
}

impl YooKassaAdapter {
    pub fn new(shop_id: String, secret_key: String, return_url: Option<String>) -> Result<Self> {
        install_crypto_provider();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            shop_id,
            secret_key,
            base_url: API_BASE.to_string(),
            default_return_url: return_url.unwrap_or_else(|| DEFAULT_RETURN_URL.to_string()),
            client,
        })
    }

    fn amount(kopecks: i64) -> Value {
        json!({ "value": format_rub(kopecks), "currency": "RUB" })
    }

    /// Every call carries Basic auth and a fresh idempotence key.
    async fn send(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .client
            .request(method, &url)
            .basic_auth(&self.shop_id, Some(&self.secret_key))
            .header("Idempotence-Key", uuid::Uuid::new_v4().to_string());
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.with_context(|| format!("YooKassa request to {} failed", path))?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            error!("YooKassa {} returned {}: {}", path, status, body);
            return Err(anyhow::anyhow!("YooKassa Error {}: {}", status, body));
        }
        Ok(body)
    }
}

#[async_trait]
impl PaymentAdapter for YooKassaAdapter {
    async fn create_payment(
        &self,
        amount: i64,
        description: &str,
        return_url: Option<&str>,
        metadata: Map<String, Value>,
    ) -> Result<GatewayPayment> {
        let body = json!({
            "amount": Self::amount(amount),
            "description": description,
            "confirmation": {
                "type": "redirect",
                "return_url": return_url.unwrap_or(&self.default_return_url),
            },
            "capture": true,
            "metadata": metadata,
        });
        let raw = self.send(reqwest::Method::POST, "/payments", Some(body)).await?;
        GatewayPayment::from_value(raw)
    }

    async fn get_payment(&self, payment_id: &str) -> Result<GatewayPayment> {
        let raw = self
            .send(reqwest::Method::GET, &format!("/payments/{}", payment_id), None)
            .await?;
        GatewayPayment::from_value(raw)
    }

    async fn capture_payment(&self, payment_id: &str, amount: Option<i64>) -> Result<GatewayPayment> {
        let body = match amount {
            Some(kopecks) => json!({ "amount": Self::amount(kopecks) }),
            None => json!({}),
        };
        let raw = self
            .send(reqwest::Method::POST, &format!("/payments/{}/capture", payment_id), Some(body))
            .await?;
        GatewayPayment::from_value(raw)
    }

    async fn cancel_payment(&self, payment_id: &str) -> Result<GatewayPayment> {
        let raw = self
            .send(reqwest::Method::POST, &format!("/payments/{}/cancel", payment_id), Some(json!({})))
            .await?;
        GatewayPayment::from_value(raw)
    }

    async fn create_refund(&self, payment_id: &str, amount: i64, description: Option<&str>) -> Result<Value> {
        let mut body = json!({
            "payment_id": payment_id,
            "amount": Self::amount(amount),
        });
        if let Some(description) = description {
            body["description"] = json!(description);
        }
        self.send(reqwest::Method::POST, "/refunds", Some(body)).await
    }

    fn name(&self) -> &str {
        "yookassa"
    }
}
