use greatideas_db::db::DEFAULT_DATABASE_URL;
use tracing::warn;

/// Process configuration read once from the environment (after `.env` is loaded).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub site_url: String,
    pub bot_token: Option<String>,
    pub bot_username: Option<String>,
    pub payment_provider_token: Option<String>,
    pub staff_bot_token: Option<String>,
    pub staff_chat_id: Option<i64>,
    pub yookassa_shop_id: Option<String>,
    pub yookassa_secret_key: Option<String>,
    pub yookassa_return_url: Option<String>,
    pub internal_api_token: Option<String>,
    pub session_ttl_hours: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            port: 8000,
            site_url: "http://127.0.0.1:8000/".to_string(),
            bot_token: None,
            bot_username: None,
            payment_provider_token: None,
            staff_bot_token: None,
            staff_chat_id: None,
            yookassa_shop_id: None,
            yookassa_secret_key: None,
            yookassa_return_url: None,
            internal_api_token: None,
            session_ttl_hours: 336,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let opt = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let port = match opt("PANEL_PORT") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!("PANEL_PORT '{}' is not a port number, using {}", raw, defaults.port);
                defaults.port
            }),
            None => defaults.port,
        };

        let staff_chat_id = opt("STAFF_CHAT_ID").and_then(|raw| match raw.parse() {
            Ok(id) => Some(id),
            Err(_) => {
                warn!("STAFF_CHAT_ID '{}' is not a chat id, staff notifications disabled", raw);
                None
            }
        });

        let session_ttl_hours = opt("SESSION_TTL_HOURS")
            .and_then(|raw| raw.parse().ok())
            .filter(|h: &i64| *h > 0)
            .unwrap_or(defaults.session_ttl_hours);

        let mut site_url = opt("SITE_URL").unwrap_or(defaults.site_url);
        if !site_url.ends_with('/') {
            site_url.push('/');
        }

        Self {
            database_url: opt("DATABASE_URL").unwrap_or(defaults.database_url),
            port,
            site_url,
            bot_token: opt("TELEGRAM_BOT_TOKEN"),
            bot_username: opt("TELEGRAM_BOT_USERNAME").map(|u| u.trim_start_matches('@').to_string()),
            payment_provider_token: opt("PAYMENT_PROVIDER_TOKEN"),
            staff_bot_token: opt("STAFF_BOT_TOKEN"),
            staff_chat_id,
            yookassa_shop_id: opt("YOOKASSA_SHOP_ID"),
            yookassa_secret_key: opt("YOOKASSA_SECRET_KEY"),
            yookassa_return_url: opt("YOOKASSA_RETURN_URL"),
            internal_api_token: opt("INTERNAL_API_TOKEN"),
            session_ttl_hours,
        }
    }

    /// Absolute URL for a site path such as `cafe/3/`.
    pub fn site_link(&self, path: &str) -> String {
        format!("{}{}", self.site_url, path.trim_start_matches('/'))
    }

    /// Logs which optional integrations are switched off.
    pub fn warn_missing(&self) {
        if self.bot_token.is_none() {
            warn!("TELEGRAM_BOT_TOKEN is not set: customer bot, invoices and Web App login are disabled");
        }
        if self.payment_provider_token.is_none() {
            warn!("PAYMENT_PROVIDER_TOKEN is not set: Telegram invoices cannot be paid");
        }
        if self.staff_bot_token.is_none() {
            warn!("STAFF_BOT_TOKEN is not set: staff bot is disabled");
        }
        if self.staff_chat_id.is_none() {
            warn!("STAFF_CHAT_ID is not set: staff notifications will not be sent");
        }
        if self.yookassa_shop_id.is_none() || self.yookassa_secret_key.is_none() {
            warn!("YooKassa credentials are not set: gateway client is disabled");
        }
        if self.internal_api_token.is_none() {
            warn!("INTERNAL_API_TOKEN is not set: internal API rejects every request");
        }
    }
}
