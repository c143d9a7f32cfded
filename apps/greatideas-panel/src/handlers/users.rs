use askama::Template;
use askama_web::WebTemplate;
use axum::{
    body::Bytes,
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use super::tracking::{moscow_datetime, OrderRow};
use super::{current_user, PageContext};
use crate::services::auth_service::AuthError;
use crate::services::session_service::SessionHandle;
use crate::settings::BOT_USERNAME;
use crate::AppState;

const PROFILE_ORDER_LIMIT: i64 = 10;

pub struct ProfileInfo {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub telegram_id: i64,
    pub date_joined: String,
}

#[derive(Template, WebTemplate)]
#[template(path = "profile.html")]
pub struct ProfileTemplate {
    pub page: PageContext,
    pub user_info: Option<ProfileInfo>,
    pub orders: Vec<OrderRow>,
}

#[derive(Template, WebTemplate)]
#[template(path = "telegram_login.html")]
pub struct TelegramLoginTemplate {
    pub page: PageContext,
    pub bot_username: String,
    pub webapp_url: String,
}

/// GET /users/profile/
pub async fn profile(State(state): State<AppState>, session: SessionHandle) -> Response {
    let page = PageContext::load(&state, &session).await;
    let Some(user) = current_user(&state, &session).await else {
        return ProfileTemplate {
            page,
            user_info: None,
            orders: Vec::new(),
        }
        .into_response();
    };

    let orders = match state.order_service.for_user(user.id, Some(PROFILE_ORDER_LIMIT)).await {
        Ok(orders) => OrderRow::load_all(&state, &orders).await,
        Err(e) => {
            warn!("Failed to load orders for profile {}: {:#}", user.id, e);
            Vec::new()
        }
    };

    ProfileTemplate {
        page,
        user_info: Some(ProfileInfo {
            username: user.login_name(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            telegram_id: user.telegram_id,
            date_joined: moscow_datetime(user.created_at),
        }),
        orders,
    }
    .into_response()
}

/// GET /users/telegram-login/
pub async fn telegram_login(State(state): State<AppState>, session: SessionHandle) -> Response {
    let bot_username = match state.settings.get(BOT_USERNAME).await {
        Some(name) => name,
        None => state.config.bot_username.clone().unwrap_or_default(),
    };
    TelegramLoginTemplate {
        page: PageContext::load(&state, &session).await,
        bot_username,
        webapp_url: state.config.site_url.clone(),
    }
    .into_response()
}

fn auth_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// POST /users/telegram-auth/ with `{initData}`.
pub async fn telegram_auth(
    State(state): State<AppState>,
    session: SessionHandle,
    method: Method,
    body: Bytes,
) -> Response {
    if method != Method::POST {
        return auth_error(StatusCode::METHOD_NOT_ALLOWED, "Только POST запросы");
    }

    let data: Value = match serde_json::from_slice(&body) {
        Ok(data) => data,
        Err(_) => return auth_error(StatusCode::BAD_REQUEST, "Неверный формат JSON"),
    };
    let Some(init_data) = data.get("initData").and_then(Value::as_str).filter(|s| !s.is_empty()) else {
        return auth_error(StatusCode::BAD_REQUEST, "initData отсутствует");
    };

    let user = match state.auth_service.authenticate(init_data, Utc::now()).await {
        Ok(user) => user,
        Err(AuthError::NoUser) => return auth_error(StatusCode::BAD_REQUEST, "ID пользователя отсутствует"),
        Err(AuthError::InvalidData(e)) => {
            info!("Rejected Telegram auth: {}", e);
            return auth_error(StatusCode::BAD_REQUEST, "Невалидные данные авторизации");
        }
        Err(AuthError::NotConfigured) => {
            error!("Telegram auth attempted without TELEGRAM_BOT_TOKEN");
            return auth_error(StatusCode::BAD_REQUEST, "Невалидные данные авторизации");
        }
        Err(AuthError::Internal(e)) => {
            error!("Telegram auth failed: {:#}", e);
            return auth_error(StatusCode::INTERNAL_SERVER_ERROR, "Внутренняя ошибка сервера");
        }
    };

    session.login(user.id).await;
    Json(json!({
        "success": true,
        "user": {
            "id": user.id,
            "username": user.login_name(),
            "first_name": user.first_name,
            "last_name": user.last_name,
            "telegram_id": user.telegram_id,
        }
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::handlers::test_support::body_json;
    use crate::AppState;
    use greatideas_shared::init_data;

    const TOKEN: &str = "42:TEST";

    async fn state() -> AppState {
        let pool = greatideas_db::connect_memory().await.unwrap();
        let config = AppConfig {
            bot_token: Some(TOKEN.into()),
            ..AppConfig::default()
        };
        AppState::build(pool, config).await.unwrap()
    }

    fn body(init_data: &str) -> Bytes {
        Bytes::from(json!({ "initData": init_data }).to_string())
    }

    #[tokio::test]
    async fn signed_data_logs_in() {
        let state = state().await;
        let session = SessionHandle::default();
        let signed = init_data::sign(
            &[
                ("auth_date", &Utc::now().timestamp().to_string()),
                ("user", r#"{"id":77,"first_name":"Олег"}"#),
            ],
            TOKEN,
        );

        let response = telegram_auth(State(state), session.clone(), Method::POST, body(&signed)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["user"]["username"], "tg_77");
        assert_eq!(json["user"]["telegram_id"], 77);
        assert!(session.is_authenticated().await);
    }

    #[tokio::test]
    async fn error_statuses() {
        let state = state().await;
        let session = SessionHandle::default();

        let get = telegram_auth(State(state.clone()), session.clone(), Method::GET, Bytes::new()).await;
        assert_eq!(get.status(), StatusCode::METHOD_NOT_ALLOWED);

        let bad_json = telegram_auth(State(state.clone()), session.clone(), Method::POST, Bytes::from("{")).await;
        assert_eq!(bad_json.status(), StatusCode::BAD_REQUEST);

        let missing = telegram_auth(State(state.clone()), session.clone(), Method::POST, Bytes::from("{}")).await;
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let forged = telegram_auth(State(state.clone()), session.clone(), Method::POST, body("user=1&hash=00")).await;
        assert_eq!(forged.status(), StatusCode::BAD_REQUEST);

        let userless = init_data::sign(&[("auth_date", &Utc::now().timestamp().to_string())], TOKEN);
        let no_user = telegram_auth(State(state), session.clone(), Method::POST, body(&userless)).await;
        assert_eq!(body_json(no_user).await["error"], "ID пользователя отсутствует");
        assert!(!session.is_authenticated().await);
    }
}
