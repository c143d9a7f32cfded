pub mod cafes;
pub mod cart;
pub mod game;
pub mod health;
pub mod internal;
pub mod orders_api;
pub mod payments;
pub mod tracking;
pub mod users;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use greatideas_db::models::user::TelegramUser;
use serde_json::json;
use tracing::error;

use crate::services::session_service::SessionHandle;
use crate::AppState;

/// `{success:false, error}` with the given status.
pub fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "success": false, "error": message.into() }))).into_response()
}

pub fn internal_error(e: impl std::fmt::Display) -> Response {
    error!("Request failed: {}", e);
    json_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// The logged-in Telegram user, if the session has one that still exists.
pub async fn current_user(state: &AppState, session: &SessionHandle) -> Option<TelegramUser> {
    let user_id = session.user_id().await?;
    match state.users.get_by_id(user_id).await {
        Ok(user) => user,
        Err(e) => {
            error!("Failed to load session user {}: {:#}", user_id, e);
            None
        }
    }
}

/// Values every page layout needs.
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    pub cart_count: i64,
    pub user_name: Option<String>,
}

impl PageContext {
    pub async fn load(state: &AppState, session: &SessionHandle) -> Self {
        Self {
            cart_count: session.cart_count().await,
            user_name: current_user(state, session).await.map(|u| u.full_name()),
        }
    }
}

/// JSON for embedding inside a `<script>` block.
pub fn script_json(value: &serde_json::Value) -> String {
    value.to_string().replace("</", "<\\/")
}

#[cfg(test)]
pub(crate) mod test_support {
    use greatideas_db::models::user::{TelegramProfile, TelegramUser};
    use sqlx::SqlitePool;

    use crate::config::AppConfig;
    use crate::services::session_service::SessionHandle;
    use crate::AppState;

    pub async fn state() -> (AppState, SqlitePool) {
        let pool = greatideas_db::connect_memory().await.unwrap();
        let state = AppState::build(pool.clone(), AppConfig::default()).await.unwrap();
        (state, pool)
    }

    pub async fn customer(state: &AppState, telegram_id: i64) -> TelegramUser {
        state
            .users
            .upsert_profile(&TelegramProfile {
                telegram_id,
                first_name: "Тест".into(),
                ..Default::default()
            })
            .await
            .unwrap()
            .0
    }

    pub async fn logged_in(user: &TelegramUser) -> SessionHandle {
        let session = SessionHandle::default();
        session.login(user.id).await;
        session
    }

    pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
