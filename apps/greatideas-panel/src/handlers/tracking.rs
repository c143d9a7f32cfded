use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use greatideas_db::models::order::Order;
use greatideas_shared::hours::moscow_offset;
use greatideas_shared::money::{format_rub, to_rubles};
use greatideas_shared::tracking::{steps, TrackingStep};
use serde_json::json;
use tracing::error;

use super::cafes::not_found;
use super::{current_user, json_error, PageContext};
use crate::services::session_service::SessionHandle;
use crate::AppState;

/// "19.10.2026 14:05" in Moscow time.
pub fn moscow_datetime(at: DateTime<Utc>) -> String {
    at.with_timezone(&moscow_offset()).format("%d.%m.%Y %H:%M").to_string()
}

/// One order in a listing.
pub struct OrderRow {
    pub order_number: String,
    pub status: String,
    pub status_display: String,
    pub created_at: String,
    pub cafe_name: String,
    pub total: String,
}

impl OrderRow {
    pub async fn load(state: &AppState, order: &Order) -> OrderRow {
        let cafe_name = match state.cafes.get(order.cafe_id).await {
            Ok(Some(cafe)) => cafe.name,
            Ok(None) => String::new(),
            Err(e) => {
                error!("Failed to load cafe {}: {:#}", order.cafe_id, e);
                String::new()
            }
        };
        OrderRow {
            order_number: order.order_number.clone(),
            status: order.status.clone(),
            status_display: order.status().display_name().to_string(),
            created_at: moscow_datetime(order.created_at),
            cafe_name,
            total: format_rub(order.amount_due()),
        }
    }

    pub async fn load_all(state: &AppState, orders: &[Order]) -> Vec<OrderRow> {
        let mut rows = Vec::with_capacity(orders.len());
        for order in orders {
            rows.push(Self::load(state, order).await);
        }
        rows
    }
}

#[derive(Template, WebTemplate)]
#[template(path = "order_status.html")]
pub struct OrderStatusTemplate {
    pub page: PageContext,
    pub order: OrderRow,
    pub delivery_display: String,
    pub steps: Vec<TrackingStep>,
}

#[derive(Template, WebTemplate)]
#[template(path = "access_denied.html")]
pub struct AccessDeniedTemplate {
    pub page: PageContext,
}

#[derive(Template, WebTemplate)]
#[template(path = "user_orders.html")]
pub struct UserOrdersTemplate {
    pub page: PageContext,
    pub orders: Vec<OrderRow>,
}

#[derive(Template, WebTemplate)]
#[template(path = "no_orders.html")]
pub struct NoOrdersTemplate {
    pub page: PageContext,
}

/// GET /orders/status/{order_number}/
pub async fn order_status(
    State(state): State<AppState>,
    session: SessionHandle,
    Path(order_number): Path<String>,
) -> Response {
    let page = PageContext::load(&state, &session).await;
    let order = match state.order_service.get_by_number(&order_number).await {
        Ok(Some(order)) => order,
        Ok(None) => return not_found(page, "Заказ не найден"),
        Err(e) => {
            error!("Failed to load order {}: {:#}", order_number, e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response();
        }
    };

    if let Some(user_id) = session.user_id().await {
        if order.user_id != user_id {
            return (StatusCode::FORBIDDEN, AccessDeniedTemplate { page }).into_response();
        }
    }

    let delivery_display = order.delivery().display_name().to_string();
    let order_steps = steps(order.status(), order.delivery());
    let row = OrderRow::load(&state, &order).await;
    OrderStatusTemplate {
        page,
        order: row,
        delivery_display,
        steps: order_steps,
    }
    .into_response()
}

/// GET /orders/api/status/{order_number}/
pub async fn api_order_status(State(state): State<AppState>, Path(order_number): Path<String>) -> Response {
    let order = match state.order_service.get_by_number(&order_number).await {
        Ok(Some(order)) => order,
        Ok(None) => return json_error(StatusCode::NOT_FOUND, "Заказ не найден"),
        Err(e) => {
            error!("Failed to load order {}: {:#}", order_number, e);
            return json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Произошла ошибка при получении статуса заказа",
            );
        }
    };
    let cafe = state.cafes.get(order.cafe_id).await.ok().flatten();

    let mut info = json!({
        "order_number": order.order_number,
        "status": order.status,
        "status_display": order.status().display_name(),
        "created_at": order.created_at.to_rfc3339(),
        "cafe_name": cafe.as_ref().map(|c| c.name.as_str()).unwrap_or_default(),
        "cafe_address": cafe.as_ref().map(|c| c.address.as_str()).unwrap_or_default(),
        "total_amount": to_rubles(order.total_amount),
        "delivery_type": order.delivery_type,
        "delivery_type_display": order.delivery().display_name(),
        "steps": steps(order.status(), order.delivery()),
    });
    if let Some(delivered_at) = order.delivered_at {
        info["delivered_at"] = json!(delivered_at.to_rfc3339());
    }

    Json(json!({ "success": true, "order": info })).into_response()
}

/// GET /orders/my-orders/
pub async fn user_orders(State(state): State<AppState>, session: SessionHandle) -> Response {
    let page = PageContext::load(&state, &session).await;
    let Some(user) = current_user(&state, &session).await else {
        return NoOrdersTemplate { page }.into_response();
    };
    match state.order_service.for_user(user.id, None).await {
        Ok(orders) => UserOrdersTemplate {
            orders: OrderRow::load_all(&state, &orders).await,
            page,
        }
        .into_response(),
        Err(e) => {
            error!("Failed to list orders for user {}: {:#}", user.id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support;
    use crate::services::test_support::pending_order;
    use greatideas_shared::OrderStatus;

    #[test]
    fn moscow_datetime_shifts_three_hours() {
        let at = DateTime::parse_from_rfc3339("2026-10-19T21:30:00Z").unwrap().with_timezone(&Utc);
        assert_eq!(moscow_datetime(at), "20.10.2026 00:30");
    }

    #[tokio::test]
    async fn api_status_reports_steps() {
        let (state, pool) = test_support::state().await;
        let order = pending_order(&pool).await;
        state
            .order_service
            .set_status(&order.order_number, OrderStatus::Preparing)
            .await
            .unwrap();

        let response = api_order_status(State(state.clone()), Path(order.order_number.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = test_support::body_json(response).await;
        assert_eq!(body["order"]["status"], "preparing");
        let steps = body["order"]["steps"].as_array().unwrap();
        assert_eq!(steps[1]["completed"], true);
        assert_eq!(steps[2]["active"], true);
        assert_eq!(steps[3]["title"], "Готов к выдаче");
        assert!(body["order"].get("delivered_at").is_none());

        let missing = api_order_status(State(state), Path("nope".into())).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn foreign_order_page_is_denied() {
        let (state, pool) = test_support::state().await;
        let order = pending_order(&pool).await;
        let stranger = test_support::customer(&state, 4242).await;

        let denied = order_status(
            State(state.clone()),
            test_support::logged_in(&stranger).await,
            Path(order.order_number.clone()),
        )
        .await;
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);

        let anonymous = order_status(State(state), SessionHandle::default(), Path(order.order_number)).await;
        assert_eq!(anonymous.status(), StatusCode::OK);
    }
}
