use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Cafe {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub address: String,
    pub phone: String,
    pub working_hours: String,
    pub logo: Option<String>,
    pub cover_image: Option<String>,
    pub is_active: bool,
    pub min_order_amount: i64,
    pub delivery_fee: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewCafe {
    pub name: String,
    pub slug: String,
    pub description: String,
    pub address: String,
    pub phone: String,
    pub working_hours: String,
    pub logo: Option<String>,
    pub cover_image: Option<String>,
    pub min_order_amount: i64,
    pub delivery_fee: i64,
}

/// `^\+?1?\d{9,15}$`
pub fn is_valid_phone(phone: &str) -> bool {
    let rest = phone.strip_prefix('+').unwrap_or(phone);
    let digits_ok = |s: &str| (9..=15).contains(&s.len()) && s.chars().all(|c| c.is_ascii_digit());
    digits_ok(rest) || rest.strip_prefix('1').is_some_and(digits_ok)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_pattern() {
        assert!(is_valid_phone("+79991234567"));
        assert!(is_valid_phone("123456789"));
        assert!(is_valid_phone("+1123456789012345"));
        assert!(!is_valid_phone("12345678"));
        assert!(!is_valid_phone("+7 999 123-45-67"));
        assert!(!is_valid_phone(""));
    }
}
