use anyhow::{Context, Result};
use chrono::Utc;
use greatideas_db::models::payment::Payment;
use greatideas_db::repositories::PaymentRepository;
use greatideas_db::models::order::Order;
use greatideas_shared::PaymentStatus;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::services::notification_service::NotificationService;
use crate::services::order_service::{OrderError, OrderService};
use crate::services::payment::{GatewayPayment, PaymentAdapter, WebhookEvent, process_webhook_data};

/// How a webhook delivery was handled; the HTTP layer maps it to a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Invalid,
    PaymentNotFound,
    Processed,
}

/// Gateway operations available through the internal API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayAction {
    Create,
    Sync,
    Capture,
    Cancel,
    Refund,
}

impl GatewayAction {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "create" => Some(Self::Create),
            "sync" => Some(Self::Sync),
            "capture" => Some(Self::Capture),
            "cancel" => Some(Self::Cancel),
            "refund" => Some(Self::Refund),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct PayService {
    payments: PaymentRepository,
    orders: OrderService,
    notifications: NotificationService,
    gateway: Option<Arc<dyn PaymentAdapter>>,
}

impl PayService {
    pub fn new(
        payments: PaymentRepository,
        orders: OrderService,
        notifications: NotificationService,
        gateway: Option<Arc<dyn PaymentAdapter>>,
    ) -> Self {
        Self {
            payments,
            orders,
            notifications,
            gateway,
        }
    }

    pub fn has_gateway(&self) -> bool {
        self.gateway.is_some()
    }

    pub async fn handle_webhook(&self, data: &Value) -> Result<WebhookOutcome> {
        let Some(event) = process_webhook_data(data) else {
            error!("Webhook data could not be processed");
            return Ok(WebhookOutcome::Invalid);
        };
        info!("Webhook event {} for payment {} ({})", event.event_type, event.payment_id, event.status);

        let Some(payment) = self.find_payment(&event).await? else {
            warn!("Payment {} not found in database", event.payment_id);
            return Ok(WebhookOutcome::PaymentNotFound);
        };

        self.apply_event(payment, &event).await?;
        Ok(WebhookOutcome::Processed)
    }

    /// External id, then provider charge id, then the invoice payload from metadata.
    async fn find_payment(&self, event: &WebhookEvent) -> Result<Option<Payment>> {
        if let Some(p) = self.payments.get_by_external_id(&event.payment_id).await? {
            return Ok(Some(p));
        }
        if let Some(p) = self.payments.get_by_provider_charge_id(&event.payment_id).await? {
            return Ok(Some(p));
        }
        let Some(payload) = event.metadata_str("invoice_payload") else {
            return Ok(None);
        };
        let Some(mut payment) = self.payments.get_by_payload(payload).await? else {
            return Ok(None);
        };
        if !event.payment_id.is_empty() {
            self.payments.set_external_id(payment.id, &event.payment_id).await?;
            payment.external_payment_id = event.payment_id.clone();
        }
        Ok(Some(payment))
    }

    async fn apply_event(&self, mut payment: Payment, event: &WebhookEvent) -> Result<()> {
        if payment.external_payment_id.is_empty() && !event.payment_id.is_empty() {
            self.payments.set_external_id(payment.id, &event.payment_id).await?;
            payment.external_payment_id = event.payment_id.clone();
        }

        match (event.event_type.as_str(), event.status.as_str()) {
            ("payment.succeeded", "succeeded") => {
                let paid_at = event.captured_at.unwrap_or_else(Utc::now);
                self.payments.mark_as_paid(&payment, None, None, paid_at).await?;
                info!("Gateway payment completed for order {}", payment.order_id);
                self.after_gateway_success(payment.order_id).await;
            }
            ("payment.canceled", _) | (_, "canceled") => {
                self.payments.cancel_with_order(&payment).await?;
                info!("Gateway payment cancelled for order {}", payment.order_id);
            }
            ("payment.waiting_for_capture", _) => {
                self.payments.set_status(payment.id, PaymentStatus::Processing).await?;
            }
            ("refund.succeeded", _) => {
                self.payments.set_status(payment.id, PaymentStatus::Refunded).await?;
                info!("Payment #{} refunded", payment.id);
            }
            (other, status) => info!("Webhook event {} ({}) needs no handling", other, status),
        }
        Ok(())
    }

    /// Customer notice and staff message; failures are logged.
    async fn after_gateway_success(&self, order_id: i64) {
        match self.orders.get(order_id).await {
            Ok(Some(order)) => match self.orders.summary(order).await {
                Ok(summary) => {
                    if let Err(e) = self.notifications.send_payment_notice(&summary).await {
                        error!("Failed to send payment notice for order {}: {}", order_id, e);
                    }
                    if let Err(e) = self.notifications.send_new_order_notification(&summary).await {
                        error!("Failed to notify staff about order {}: {}", order_id, e);
                    }
                }
                Err(e) => error!("Failed to load order {} summary: {:#}", order_id, e),
            },
            Ok(None) => warn!("Paid order {} disappeared", order_id),
            Err(e) => error!("Failed to load order {}: {:#}", order_id, e),
        }
    }

    /// Drives the gateway for one order and returns the gateway response.
    pub async fn gateway_action(&self, order_number: &str, action: GatewayAction) -> Result<Value, OrderError> {
        let gateway = self
            .gateway
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("YooKassa gateway is not configured"))?;
        let order = self
            .orders
            .get_by_number(order_number)
            .await?
            .ok_or(OrderError::OrderNotFound)?;

        let payment = match self.payments.get_by_order(order.id).await? {
            Some(p) => p,
            None => self.orders.create_payment(&order).await?,
        };

        let result = match action {
            GatewayAction::Create => return self.create_gateway_payment(gateway.as_ref(), &order, &payment).await,
            GatewayAction::Sync => gateway.get_payment(external_id(&payment)?).await?,
            GatewayAction::Capture => gateway.capture_payment(external_id(&payment)?, None).await?,
            GatewayAction::Cancel => gateway.cancel_payment(external_id(&payment)?).await?,
            GatewayAction::Refund => {
                let refund = gateway
                    .create_refund(
                        external_id(&payment)?,
                        payment.amount,
                        Some(&format!("Возврат заказа #{}", order.order_number)),
                    )
                    .await?;
                if refund.get("status").and_then(Value::as_str) == Some("succeeded") {
                    self.payments.set_status(payment.id, PaymentStatus::Refunded).await?;
                }
                return Ok(refund);
            }
        };

        // The gateway's answer is applied as if it had arrived through the webhook.
        let event = WebhookEvent {
            event_type: format!("payment.{}", result.status),
            payment_id: result.id.clone(),
            status: result.status.clone(),
            amount: None,
            currency: None,
            description: None,
            metadata: Map::new(),
            created_at: None,
            captured_at: result
                .raw
                .get("captured_at")
                .and_then(Value::as_str)
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc)),
        };
        let payment = self
            .payments
            .get(payment.id)
            .await?
            .context("Payment disappeared")?;
        if !payment.is_paid() || event.status != "succeeded" {
            self.apply_event(payment, &event).await?;
        }
        Ok(gateway_json(&result))
    }

    async fn create_gateway_payment(
        &self,
        gateway: &dyn PaymentAdapter,
        order: &Order,
        payment: &Payment,
    ) -> Result<Value, OrderError> {
        let mut metadata = Map::new();
        metadata.insert("invoice_payload".into(), json!(payment.invoice_payload));
        metadata.insert("order_number".into(), json!(order.order_number));
        let created = gateway
            .create_payment(payment.amount, &format!("Заказ #{}", order.order_number), None, metadata)
            .await?;
        self.payments.set_external_id(payment.id, &created.id).await?;
        info!("Gateway payment {} created for order {} via {}", created.id, order.order_number, gateway.name());
        Ok(gateway_json(&created))
    }
}

fn external_id(payment: &Payment) -> Result<&str, OrderError> {
    Some(payment.external_payment_id.as_str())
        .filter(|id| !id.is_empty())
        .ok_or(OrderError::PaymentNotFound)
}

fn gateway_json(payment: &GatewayPayment) -> Value {
    json!({
        "id": payment.id,
        "status": payment.status,
        "confirmation_url": payment.confirmation_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support;
    use async_trait::async_trait;
    use greatideas_db::repositories::OrderRepository;
    use greatideas_shared::OrderStatus;
    use std::sync::Mutex;

    struct Fixture {
        service: PayService,
        payments: PaymentRepository,
        orders: OrderRepository,
        order: Order,
        payment: Payment,
    }

    async fn fixture(gateway: Option<Arc<dyn PaymentAdapter>>) -> Fixture {
        let pool = greatideas_db::connect_memory().await.unwrap();
        let order_service = test_support::order_service(&pool).await;
        let order = test_support::pending_order(&pool).await;
        let payment = order_service.create_payment(&order).await.unwrap();
        let notifications = NotificationService::new(order_service.clone(), None, None, None);
        Fixture {
            service: PayService::new(PaymentRepository::new(pool.clone()), order_service, notifications, gateway),
            payments: PaymentRepository::new(pool.clone()),
            orders: OrderRepository::new(pool),
            order,
            payment,
        }
    }

    fn webhook(event: &str, id: &str, status: &str, payload: Option<&str>) -> Value {
        let mut object = json!({
            "id": id,
            "status": status,
            "amount": {"value": "250.00", "currency": "RUB"},
            "captured_at": "2025-06-02T09:01:30.000Z"
        });
        if let Some(payload) = payload {
            object["metadata"] = json!({"invoice_payload": payload});
        }
        json!({"type": "notification", "event": event, "object": object})
    }

    #[tokio::test]
    async fn success_found_by_payload_confirms_order() {
        let f = fixture(None).await;
        let outcome = f
            .service
            .handle_webhook(&webhook("payment.succeeded", "yk-1", "succeeded", Some(&f.payment.invoice_payload)))
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Processed);

        let payment = f.payments.get(f.payment.id).await.unwrap().unwrap();
        assert_eq!(payment.status(), PaymentStatus::Completed);
        assert_eq!(payment.external_payment_id, "yk-1");
        assert_eq!(payment.paid_at.unwrap().to_rfc3339(), "2025-06-02T09:01:30+00:00");
        let order = f.orders.get(f.order.id).await.unwrap().unwrap();
        assert_eq!(order.status(), OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn cancel_by_external_id_cancels_both() {
        let f = fixture(None).await;
        f.payments.set_external_id(f.payment.id, "yk-2").await.unwrap();
        f.service
            .handle_webhook(&webhook("payment.canceled", "yk-2", "canceled", None))
            .await
            .unwrap();
        let payment = f.payments.get(f.payment.id).await.unwrap().unwrap();
        assert_eq!(payment.status(), PaymentStatus::Cancelled);
        let order = f.orders.get(f.order.id).await.unwrap().unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn waiting_and_refund_update_payment_only() {
        let f = fixture(None).await;
        f.payments.set_external_id(f.payment.id, "yk-3").await.unwrap();
        f.service
            .handle_webhook(&webhook("payment.waiting_for_capture", "yk-3", "waiting_for_capture", None))
            .await
            .unwrap();
        assert_eq!(f.payments.get(f.payment.id).await.unwrap().unwrap().status(), PaymentStatus::Processing);

        let refund = json!({"event": "refund.succeeded", "object": {"id": "rf-1", "payment_id": "yk-3", "status": "succeeded"}});
        f.service.handle_webhook(&refund).await.unwrap();
        assert_eq!(f.payments.get(f.payment.id).await.unwrap().unwrap().status(), PaymentStatus::Refunded);
        assert_eq!(f.orders.get(f.order.id).await.unwrap().unwrap().status(), OrderStatus::Pending);
    }

    #[tokio::test]
    async fn unknown_payment_and_bad_data() {
        let f = fixture(None).await;
        let outcome = f
            .service
            .handle_webhook(&webhook("payment.succeeded", "nobody", "succeeded", Some("order_0_none")))
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::PaymentNotFound);
        assert_eq!(f.service.handle_webhook(&json!({"event": "x"})).await.unwrap(), WebhookOutcome::Invalid);
    }

    struct FakeGateway {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PaymentAdapter for FakeGateway {
        async fn create_payment(&self, amount: i64, _: &str, _: Option<&str>, metadata: Map<String, Value>) -> Result<GatewayPayment> {
            self.calls.lock().unwrap().push(format!("create {} {}", amount, metadata["invoice_payload"]));
            GatewayPayment::from_value(json!({"id": "gw-1", "status": "pending", "confirmation": {"confirmation_url": "https://pay/gw-1"}}))
        }
        async fn get_payment(&self, id: &str) -> Result<GatewayPayment> {
            self.calls.lock().unwrap().push(format!("get {}", id));
            GatewayPayment::from_value(json!({"id": id, "status": "succeeded"}))
        }
        async fn capture_payment(&self, id: &str, _: Option<i64>) -> Result<GatewayPayment> {
            GatewayPayment::from_value(json!({"id": id, "status": "succeeded"}))
        }
        async fn cancel_payment(&self, id: &str) -> Result<GatewayPayment> {
            GatewayPayment::from_value(json!({"id": id, "status": "canceled"}))
        }
        async fn create_refund(&self, id: &str, amount: i64, _: Option<&str>) -> Result<Value> {
            Ok(json!({"id": "rf", "payment_id": id, "status": "succeeded", "amount": amount}))
        }
        fn name(&self) -> &str {
            "fake"
        }
    }

    #[tokio::test]
    async fn gateway_create_then_sync_confirms() {
        let gateway = Arc::new(FakeGateway { calls: Mutex::new(Vec::new()) });
        let f = fixture(Some(gateway.clone())).await;

        let created = f.service.gateway_action(&f.order.order_number, GatewayAction::Create).await.unwrap();
        assert_eq!(created["confirmation_url"], "https://pay/gw-1");
        assert_eq!(f.payments.get(f.payment.id).await.unwrap().unwrap().external_payment_id, "gw-1");

        f.service.gateway_action(&f.order.order_number, GatewayAction::Sync).await.unwrap();
        assert!(f.payments.get(f.payment.id).await.unwrap().unwrap().is_paid());
        assert_eq!(f.orders.get(f.order.id).await.unwrap().unwrap().status(), OrderStatus::Confirmed);

        f.service.gateway_action(&f.order.order_number, GatewayAction::Refund).await.unwrap();
        assert_eq!(f.payments.get(f.payment.id).await.unwrap().unwrap().status(), PaymentStatus::Refunded);

        let calls = gateway.calls.lock().unwrap().clone();
        assert_eq!(calls[0], format!("create {} \"{}\"", f.payment.amount, f.payment.invoice_payload));
        assert_eq!(calls[1], "get gw-1");
    }

    #[tokio::test]
    async fn gateway_actions_need_configuration_and_payment() {
        let f = fixture(None).await;
        assert!(matches!(
            f.service.gateway_action(&f.order.order_number, GatewayAction::Sync).await,
            Err(OrderError::Internal(_))
        ));

        let gateway = Arc::new(FakeGateway { calls: Mutex::new(Vec::new()) });
        let f = fixture(Some(gateway)).await;
        assert!(matches!(
            f.service.gateway_action(&f.order.order_number, GatewayAction::Cancel).await,
            Err(OrderError::PaymentNotFound)
        ));
        assert!(matches!(
            f.service.gateway_action("missing", GatewayAction::Create).await,
            Err(OrderError::OrderNotFound)
        ));
        assert_eq!(GatewayAction::parse("refund"), Some(GatewayAction::Refund));
        assert_eq!(GatewayAction::parse("explode"), None);
    }
}
