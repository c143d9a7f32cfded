use chrono::{DateTime, Utc};
use greatideas_db::models::user::{TelegramProfile, TelegramUser};
use greatideas_db::repositories::UserRepository;
use greatideas_shared::init_data::{self, InitDataError};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Telegram bot token is not configured")]
    NotConfigured,
    #[error("Invalid Telegram data: {0}")]
    InvalidData(#[from] InitDataError),
    #[error("No user ID in Telegram data")]
    NoUser,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Turns Telegram Web App init data into a stored user.
#[derive(Debug, Clone)]
pub struct AuthService {
    users: UserRepository,
    bot_token: Option<String>,
}

impl AuthService {
    pub fn new(users: UserRepository, bot_token: Option<String>) -> Self {
        Self { users, bot_token }
    }

    /// Validates the signature, then creates the user or refreshes their profile.
    pub async fn authenticate(&self, init_data: &str, now: DateTime<Utc>) -> Result<TelegramUser, AuthError> {
        let token = self.bot_token.as_deref().ok_or(AuthError::NotConfigured)?;
        let data = init_data::validate(init_data, token, now)?;
        let web_user = data.user.ok_or(AuthError::NoUser)?;

        let mut profile = TelegramProfile::from(&web_user);
        profile.allows_write_to_pm = Some(data.allows_write_to_pm);
        let (user, created) = self.users.upsert_profile(&profile).await?;
        if created {
            info!("Registered Telegram user {} from Web App", user.telegram_id);
        } else {
            debug!("Refreshed Telegram user {} from Web App", user.telegram_id);
        }
        Ok(user)
    }
}
