//! All stored amounts are integer kopecks (1 RUB = 100 kopecks).

/// Formats kopecks as rubles with two decimals, e.g. `25050` -> `"250.50"`.
pub fn format_rub(kopecks: i64) -> String {
    let sign = if kopecks < 0 { "-" } else { "" };
    let abs = kopecks.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

pub fn to_rubles(kopecks: i64) -> f64 {
    kopecks as f64 / 100.0
}

pub fn from_rubles(rubles: f64) -> i64 {
    (rubles * 100.0).round() as i64
}

/// Parses a decimal ruble string as sent by payment gateways ("250.00", "99.9", "10").
pub fn parse_rub(value: &str) -> Option<i64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let (whole, frac) = match value.split_once('.') {
        Some((w, f)) => (w, f),
        None => (value, ""),
    };
    if frac.len() > 2 || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let negative = whole.starts_with('-');
    let whole: i64 = whole.trim_start_matches('-').parse().ok()?;
    let frac: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        _ => frac.parse().ok()?,
    };
    let total = whole * 100 + frac;
    Some(if negative { -total } else { total })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_whole_and_fractional_rubles() {
        assert_eq!(format_rub(25000), "250.00");
        assert_eq!(format_rub(5), "0.05");
        assert_eq!(format_rub(-1050), "-10.50");
    }

    #[test]
    fn parses_gateway_amounts() {
        assert_eq!(parse_rub("250.00"), Some(25000));
        assert_eq!(parse_rub("99.9"), Some(9990));
        assert_eq!(parse_rub("10"), Some(1000));
        assert_eq!(parse_rub("1.234"), None);
        assert_eq!(parse_rub(""), None);
    }

    #[test]
    fn rubles_conversion_rounds() {
        assert_eq!(from_rubles(0.1 + 0.2), 30);
        assert_eq!(to_rubles(12345), 123.45);
    }
}
