use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TelegramUser {
    pub id: i64,
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub is_active: bool,
    pub language_code: String,
    pub allows_write_to_pm: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl TelegramUser {
    pub fn full_name(&self) -> String {
        if self.last_name.is_empty() {
            self.first_name.clone()
        } else {
            format!("{} {}", self.first_name, self.last_name)
        }
    }

    /// Name used where a login handle is expected (`tg_<telegram_id>`).
    pub fn login_name(&self) -> String {
        format!("tg_{}", self.telegram_id)
    }
}

/// Profile fields pushed by Telegram (bot update or Web App init data).
#[derive(Debug, Clone, Default)]
pub struct TelegramProfile {
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub language_code: Option<String>,
    pub allows_write_to_pm: Option<bool>,
}

impl From<&greatideas_shared::WebAppUser> for TelegramProfile {
    fn from(user: &greatideas_shared::WebAppUser) -> Self {
        Self {
            telegram_id: user.id,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone().unwrap_or_default(),
            language_code: user.language_code.clone(),
            allows_write_to_pm: user.allows_write_to_pm,
        }
    }
}
