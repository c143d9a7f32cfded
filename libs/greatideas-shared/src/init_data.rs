//! Telegram Web App `initData` verification.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

/// Signed data older than this is rejected.
pub const MAX_AGE_SECS: i64 = 3600;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InitDataError {
    #[error("init data is missing the hash field")]
    MissingHash,
    #[error("init data hash is not valid hex")]
    MalformedHash,
    #[error("init data signature mismatch")]
    BadSignature,
    #[error("init data is expired (auth_date {0})")]
    Expired(i64),
    #[error("init data user is not valid JSON: {0}")]
    BadUser(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebAppUser {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub language_code: Option<String>,
    #[serde(default)]
    pub allows_write_to_pm: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WebAppInitData {
    /// `None` for a correctly signed payload that carries no user.
    pub user: Option<WebAppUser>,
    pub auth_date: Option<i64>,
    pub query_id: Option<String>,
    pub allows_write_to_pm: bool,
}

fn secret_key(bot_token: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(b"WebAppData").expect("HMAC accepts keys of any size");
    mac.update(bot_token.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

fn data_check_string(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Verifies `init_data` against `bot_token`. The hash comparison is constant time.
pub fn validate(
    init_data: &str,
    bot_token: &str,
    now: DateTime<Utc>,
) -> Result<WebAppInitData, InitDataError> {
    let mut params: BTreeMap<String, String> = url::form_urlencoded::parse(init_data.as_bytes())
        .into_owned()
        .collect();

    let hash = params.remove("hash").ok_or(InitDataError::MissingHash)?;
    let received = hex::decode(hash.trim()).map_err(|_| InitDataError::MalformedHash)?;

    let mut mac =
        HmacSha256::new_from_slice(&secret_key(bot_token)).expect("HMAC accepts keys of any size");
    mac.update(data_check_string(&params).as_bytes());
    mac.verify_slice(&received)
        .map_err(|_| InitDataError::BadSignature)?;

    let auth_date = params.get("auth_date").and_then(|v| v.parse::<i64>().ok());
    if let Some(ts) = auth_date {
        if now.timestamp() - ts > MAX_AGE_SECS {
            return Err(InitDataError::Expired(ts));
        }
    }

    let user = match params.get("user") {
        Some(raw) => Some(
            serde_json::from_str::<WebAppUser>(raw)
                .map_err(|e| InitDataError::BadUser(e.to_string()))?,
        ),
        None => None,
    };

    Ok(WebAppInitData {
        allows_write_to_pm: params
            .get("allows_write_to_pm")
            .map(|v| v == "true")
            .or_else(|| user.as_ref().and_then(|u| u.allows_write_to_pm))
            .unwrap_or(false),
        user,
        auth_date,
        query_id: params.get("query_id").cloned(),
    })
}

/// Produces a signed `initData` query string. Used by tests and local tooling.
pub fn sign(fields: &[(&str, &str)], bot_token: &str) -> String {
    let params: BTreeMap<String, String> = fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let mut mac =
        HmacSha256::new_from_slice(&secret_key(bot_token)).expect("HMAC accepts keys of any size");
    mac.update(data_check_string(&params).as_bytes());
    let hash = hex::encode(mac.finalize().into_bytes());

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in &params {
        serializer.append_pair(k, v);
    }
    serializer.append_pair("hash", &hash);
    serializer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "123456:TEST-TOKEN";
    const USER: &str = r#"{"id":42,"first_name":"Ivan","last_name":"Petrov","username":"ivan","language_code":"ru","allows_write_to_pm":true}"#;

    #[test]
    fn accepts_correctly_signed_data() {
        let now = Utc::now();
        let auth_date = now.timestamp().to_string();
        let data = sign(&[("auth_date", &auth_date), ("query_id", "AAE"), ("user", USER)], TOKEN);

        let parsed = validate(&data, TOKEN, now).unwrap();
        let user = parsed.user.unwrap();
        assert_eq!(user.id, 42);
        assert_eq!(user.username.as_deref(), Some("ivan"));
        assert!(parsed.allows_write_to_pm);
        assert_eq!(parsed.query_id.as_deref(), Some("AAE"));
    }

    #[test]
    fn rejects_tampered_data() {
        let now = Utc::now();
        let auth_date = now.timestamp().to_string();
        let data = sign(&[("auth_date", &auth_date), ("user", USER)], TOKEN);
        let tampered = data.replace("Ivan", "Oleg");
        assert_eq!(validate(&tampered, TOKEN, now), Err(InitDataError::BadSignature));
        assert_eq!(validate(&data, "other:token", now), Err(InitDataError::BadSignature));
    }

    #[test]
    fn rejects_stale_and_unsigned_data() {
        let now = Utc::now();
        let old = (now.timestamp() - MAX_AGE_SECS - 1).to_string();
        let data = sign(&[("auth_date", &old), ("user", USER)], TOKEN);
        assert!(matches!(validate(&data, TOKEN, now), Err(InitDataError::Expired(_))));
        assert_eq!(validate("user=1", TOKEN, now), Err(InitDataError::MissingHash));
    }

    #[test]
    fn payload_without_user_is_empty() {
        let now = Utc::now();
        let data = sign(&[("query_id", "AAE")], TOKEN);
        let parsed = validate(&data, TOKEN, now).unwrap();
        assert!(parsed.user.is_none());
        assert!(parsed.auth_date.is_none());
    }

    #[test]
    fn top_level_write_permission_wins() {
        let now = Utc::now();
        let plain_user = r#"{"id":7,"first_name":"Anna"}"#;

        let data = sign(&[("allows_write_to_pm", "true"), ("user", plain_user)], TOKEN);
        assert!(validate(&data, TOKEN, now).unwrap().allows_write_to_pm);

        let data = sign(&[("allows_write_to_pm", "false"), ("user", USER)], TOKEN);
        assert!(!validate(&data, TOKEN, now).unwrap().allows_write_to_pm);

        let data = sign(&[("user", plain_user)], TOKEN);
        assert!(!validate(&data, TOKEN, now).unwrap().allows_write_to_pm);
    }
}
