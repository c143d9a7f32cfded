use chrono::{DateTime, Utc};
use greatideas_shared::cart::Cart;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct WebSessionRow {
    pub id: String,
    pub user_id: Option<i64>,
    pub data: String,
    pub expires_at: DateTime<Utc>,
}

/// Values kept in a browser session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    #[serde(default)]
    pub cart: Cart,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WebSession {
    pub id: String,
    pub user_id: Option<i64>,
    pub data: SessionData,
    pub expires_at: DateTime<Utc>,
}

impl WebSession {
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }
}

impl From<WebSessionRow> for WebSession {
    fn from(row: WebSessionRow) -> Self {
        let data = match serde_json::from_str(&row.data) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!("Discarding unreadable session data for {}: {}", row.id, e);
                SessionData::default()
            }
        };
        Self {
            id: row.id,
            user_id: row.user_id,
            data,
            expires_at: row.expires_at,
        }
    }
}
