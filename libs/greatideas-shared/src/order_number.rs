use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;

/// Checkout order number: `GI` + last 6 digits of the unix timestamp + 4 uppercase hex chars.
pub fn checkout_number<R: Rng + ?Sized>(now: DateTime<Utc>, rng: &mut R) -> String {
    let ts = now.timestamp().to_string();
    let tail = &ts[ts.len().saturating_sub(6)..];
    let random: u16 = rng.random();
    format!("GI{}{:04X}", tail, random)
}

/// Fallback numbering: `YYYYMMDD` + a 3-digit sequence that continues from the
/// latest order of the same day.
pub fn daily_number(today: NaiveDate, latest_today: Option<&str>) -> String {
    let prefix = today.format("%Y%m%d").to_string();
    let sequence = latest_today
        .filter(|n| n.starts_with(&prefix) && n.len() >= 3)
        .and_then(|n| n[n.len() - 3..].parse::<u32>().ok())
        .map(|s| s + 1)
        .unwrap_or(1);
    format!("{}{:03}", prefix, sequence)
}

/// `order_{order_id}_{8 hex}`, the Telegram invoice payload of an order payment.
pub fn invoice_payload(order_id: i64, uuid_hex: &str) -> String {
    let short: String = uuid_hex.chars().filter(|c| *c != '-').take(8).collect();
    format!("order_{}_{}", order_id, short)
}

/// Extracts the order id from an `order_{id}_...` payload.
pub fn order_id_from_payload(payload: &str) -> Option<i64> {
    payload.strip_prefix("order_")?.split('_').next()?.parse().ok()
}
