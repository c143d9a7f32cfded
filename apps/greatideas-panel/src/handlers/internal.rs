use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use greatideas_shared::OrderStatus;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use super::json_error;
use crate::middleware::extract_bearer_token;
use crate::services::order_service::OrderError;
use crate::services::pay_service::GatewayAction;
use crate::AppState;

/// Checks the bearer token against INTERNAL_API_TOKEN. The API is closed when no token is configured.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = state.config.internal_api_token.as_deref() else {
        warn!("Internal API call rejected: INTERNAL_API_TOKEN is not set");
        return Err(json_error(StatusCode::UNAUTHORIZED, "Internal API is disabled"));
    };
    match extract_bearer_token(headers) {
        Some(token) if token == expected => Ok(()),
        Some(_) => {
            warn!("Internal API call with invalid token");
            Err(json_error(StatusCode::UNAUTHORIZED, "Invalid token"))
        }
        None => Err(json_error(StatusCode::UNAUTHORIZED, "Missing token")),
    }
}

fn order_error(order_number: &str, e: OrderError) -> Response {
    match e {
        OrderError::OrderNotFound => json_error(StatusCode::NOT_FOUND, e.to_string()),
        OrderError::Internal(e) => {
            error!("Internal API failed for order {}: {:#}", order_number, e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        e => json_error(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct StatusRequest {
    status: String,
}

/// POST /api/internal/orders/{order_number}/status with `{status}`.
pub async fn set_order_status(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }
    let Ok(StatusRequest { status }) = serde_json::from_slice(&body) else {
        return json_error(StatusCode::BAD_REQUEST, "Expected JSON body {\"status\": ...}");
    };
    let Ok(status) = status.trim().parse::<OrderStatus>() else {
        return json_error(StatusCode::BAD_REQUEST, format!("Unknown status '{}'", status));
    };

    match state.order_service.set_status(&order_number, status).await {
        Ok(order) => {
            info!("Order {} set to {} through internal API", order.order_number, status);
            Json(json!({
                "success": true,
                "order_number": order.order_number,
                "status": order.status,
                "status_display": order.status().display_name(),
                "delivered_at": order.delivered_at.map(|t| t.to_rfc3339()),
            }))
            .into_response()
        }
        Err(e) => order_error(&order_number, e),
    }
}

/// POST /api/internal/orders/{order_number}/gateway/{action}
pub async fn gateway_action(
    State(state): State<AppState>,
    Path((order_number, action)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }
    if !state.pay_service.has_gateway() {
        return json_error(StatusCode::SERVICE_UNAVAILABLE, "YooKassa credentials are not configured");
    }
    let Some(action) = GatewayAction::parse(&action) else {
        return json_error(StatusCode::BAD_REQUEST, format!("Unknown gateway action '{}'", action));
    };

    match state.pay_service.gateway_action(&order_number, action).await {
        Ok(result) => Json(json!({ "success": true, "result": result })).into_response(),
        Err(e) => order_error(&order_number, e),
    }
}
