use greatideas_db::models::user::TelegramProfile;
use teloxide::types::User;
use tracing::warn;

use crate::AppState;

pub mod callback;
pub mod command;
pub mod payment;

pub fn profile_from(user: &User) -> TelegramProfile {
    TelegramProfile {
        telegram_id: user.id.0 as i64,
        username: user.username.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone().unwrap_or_default(),
        language_code: user.language_code.clone(),
        allows_write_to_pm: None,
    }
}

/// Records an outgoing bot message against the user, if they are known.
pub async fn log_reply(state: &AppState, telegram_id: i64, message_type: &str, text: &str) {
    let user = match state.users.get_by_telegram_id(telegram_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return,
        Err(e) => {
            warn!("Failed to load user {} for message log: {:#}", telegram_id, e);
            return;
        }
    };
    if let Err(e) = state.bot_log.log_message(user.id, message_type, text).await {
        warn!("Failed to log bot message for {}: {:#}", telegram_id, e);
    }
}
