use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use tracing::{error, warn};

use crate::services::pay_service::WebhookOutcome;
use crate::AppState;

/// POST /payments/yookassa/webhook/
///
/// Unknown payments still answer 200 so the gateway stops retrying them.
pub async fn yookassa_webhook(State(state): State<AppState>, body: Bytes) -> Response {
    let data: Value = match serde_json::from_slice(&body) {
        Ok(data) => data,
        Err(e) => {
            warn!("Webhook body is not JSON: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match state.pay_service.handle_webhook(&data).await {
        Ok(WebhookOutcome::Processed) => (StatusCode::OK, "OK").into_response(),
        Ok(WebhookOutcome::PaymentNotFound) => (StatusCode::OK, "Payment not found").into_response(),
        Ok(WebhookOutcome::Invalid) => StatusCode::BAD_REQUEST.into_response(),
        Err(e) => {
            error!("Webhook processing error: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support;
    use crate::services::test_support::pending_order;
    use greatideas_db::repositories::{OrderRepository, PaymentRepository};
    use greatideas_shared::PaymentMethod;
    use serde_json::json;

    async fn text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn rejects_garbage_and_acknowledges_unknown_payments() {
        let (state, _pool) = test_support::state().await;

        let garbage = yookassa_webhook(State(state.clone()), Bytes::from("not json")).await;
        assert_eq!(garbage.status(), StatusCode::BAD_REQUEST);

        let no_object = yookassa_webhook(State(state.clone()), Bytes::from(r#"{"event":"payment.succeeded"}"#)).await;
        assert_eq!(no_object.status(), StatusCode::BAD_REQUEST);

        let unknown = json!({
            "event": "payment.succeeded",
            "object": { "id": "2d9f-unknown", "status": "succeeded" }
        });
        let response = yookassa_webhook(State(state), Bytes::from(unknown.to_string())).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(text(response).await, "Payment not found");
    }

    #[tokio::test]
    async fn cancel_event_cancels_payment_and_order() {
        let (state, pool) = test_support::state().await;
        let order = pending_order(&pool).await;
        let payments = PaymentRepository::new(pool.clone());
        let payment = payments
            .create(order.id, order.amount_due(), PaymentMethod::Online, "order_1_cafebabe", "Тест")
            .await
            .unwrap();

        let event = json!({
            "event": "payment.canceled",
            "object": {
                "id": "yk-42",
                "status": "canceled",
                "metadata": { "invoice_payload": "order_1_cafebabe" }
            }
        });
        let response = yookassa_webhook(State(state), Bytes::from(event.to_string())).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(text(response).await, "OK");

        let payment = payments.get(payment.id).await.unwrap().unwrap();
        assert_eq!(payment.status, "cancelled");
        assert_eq!(payment.external_payment_id, "yk-42");
        let order = OrderRepository::new(pool).get(order.id).await.unwrap().unwrap();
        assert_eq!(order.status, "cancelled");
    }
}
