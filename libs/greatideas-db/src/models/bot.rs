use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BotMessage {
    pub id: i64,
    pub user_id: i64,
    pub message_type: String,
    pub message_text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BotUserSession {
    pub id: i64,
    pub user_id: i64,
    pub current_cafe_id: Option<i64>,
    pub current_step: String,
    pub session_data: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
