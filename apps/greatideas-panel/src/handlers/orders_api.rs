use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use greatideas_shared::money::to_rubles;
use serde_json::json;
use tracing::{error, info, warn};

use super::json_error;
use crate::bot::invoice::send_order_invoice;
use crate::services::order_service::{CheckoutRequest, OrderError};
use crate::AppState;

const INTERNAL_ERROR: &str = "Внутренняя ошибка сервера";

fn order_error_response(e: OrderError) -> Response {
    match e {
        OrderError::Internal(e) => {
            error!("Checkout failed: {:#}", e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
        e @ (OrderError::UserNotFound | OrderError::OrderNotFound | OrderError::PaymentNotFound) => {
            json_error(StatusCode::NOT_FOUND, e.to_string())
        }
        e => json_error(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

/// POST /api/orders/create-payment/
///
/// Creates the order and its payment from the posted cart, then sends the
/// Telegram invoice to the customer.
pub async fn create_payment(State(state): State<AppState>, body: Bytes) -> Response {
    let req: CheckoutRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            error!("Invalid checkout body: {}", e);
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR);
        }
    };

    let chat_id = req.telegram_id.unwrap_or_default();
    let checkout = match state.order_service.checkout(req, Utc::now()).await {
        Ok(checkout) => checkout,
        Err(e) => return order_error_response(e),
    };

    match (&state.customer_bot, state.config.payment_provider_token.as_deref()) {
        (Some(bot), Some(provider_token)) => {
            if let Err(e) = send_order_invoice(bot, chat_id, provider_token, &checkout).await {
                error!("Failed to send invoice for order {}: {:#}", checkout.order.order_number, e);
                return json_error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR);
            }
        }
        _ => warn!(
            "Invoice for order {} not sent: customer bot or PAYMENT_PROVIDER_TOKEN missing",
            checkout.order.order_number
        ),
    }

    info!(
        "Order {} created, invoice payload {}",
        checkout.order.order_number, checkout.payment.invoice_payload
    );
    Json(json!({
        "success": true,
        "order_id": checkout.order.id,
        "order_number": checkout.order.order_number,
        "total_amount": to_rubles(checkout.order.amount_due()),
        "payment_id": checkout.payment.id,
        "message": "Инвойс отправлен в Telegram",
    }))
    .into_response()
}

/// GET /api/orders/payment-status/{id}/
pub async fn payment_status(State(state): State<AppState>, Path(payment_id): Path<i64>) -> Response {
    match state.order_service.payment_with_order(payment_id).await {
        Ok((payment, order)) => Json(json!({
            "success": true,
            "payment_id": payment.id,
            "status": payment.status,
            "order_number": order.order_number,
            "amount": to_rubles(payment.amount),
            "created_at": payment.created_at.to_rfc3339(),
            "paid_at": payment.paid_at.map(|t| t.to_rfc3339()),
        }))
        .into_response(),
        Err(OrderError::Internal(e)) => {
            error!("Failed to load payment {}: {:#}", payment_id, e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
        Err(_) => json_error(StatusCode::NOT_FOUND, "Платеж не найден"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support;
    use crate::services::test_support::pending_order;
    use crate::settings::{ORDERS_OPEN_FROM, ORDERS_OPEN_UNTIL};
    use greatideas_shared::PaymentMethod;

    #[tokio::test]
    async fn malformed_body_is_internal_error() {
        let (state, _pool) = test_support::state().await;
        let response = create_payment(State(state), Bytes::from("{oops")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(test_support::body_json(response).await["success"], false);
    }

    #[tokio::test]
    async fn missing_telegram_id_is_rejected() {
        let (state, _pool) = test_support::state().await;
        state.settings.set(ORDERS_OPEN_FROM, "00:00").await.unwrap();
        state.settings.set(ORDERS_OPEN_UNTIL, "23:59").await.unwrap();

        let response = create_payment(State(state), Bytes::from(r#"{"cart_data":{}}"#)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = test_support::body_json(response).await;
        assert_eq!(body["error"], "telegram_id обязателен");
    }

    #[tokio::test]
    async fn unknown_user_is_404() {
        let (state, pool) = test_support::state().await;
        let demo = greatideas_db::seed::demo_menu(&pool).await.unwrap();
        state.settings.set(ORDERS_OPEN_FROM, "00:00").await.unwrap();
        state.settings.set(ORDERS_OPEN_UNTIL, "23:59").await.unwrap();

        let body = format!(
            r#"{{"telegram_id":555,"cart_data":{{"{id}":{{"item_id":{id},"quantity":1}}}},"workspace_number":3}}"#,
            id = demo.latte_id
        );
        let response = create_payment(State(state), Bytes::from(body)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn payment_status_reports_order() {
        let (state, pool) = test_support::state().await;
        let order = pending_order(&pool).await;
        let payment = greatideas_db::repositories::PaymentRepository::new(pool.clone())
            .create(
                order.id,
                order.amount_due(),
                PaymentMethod::Telegram,
                &format!("order_{}_test", order.id),
                "Тест",
            )
            .await
            .unwrap();

        let response = payment_status(State(state.clone()), Path(payment.id)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = test_support::body_json(response).await;
        assert_eq!(body["order_number"], order.order_number);
        assert_eq!(body["status"], "pending");
        assert_eq!(body["amount"], 250.0);
        assert!(body["paid_at"].is_null());

        let missing = payment_status(State(state), Path(payment.id + 100)).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
