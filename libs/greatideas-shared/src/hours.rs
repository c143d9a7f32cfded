use chrono::{DateTime, FixedOffset, NaiveTime, Offset, Timelike, Utc};

/// Moscow time is UTC+3 all year round.
pub const MOSCOW_OFFSET_SECS: i32 = 3 * 3600;

pub fn moscow_offset() -> FixedOffset {
    FixedOffset::east_opt(MOSCOW_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Daily window in which checkout accepts new orders, compared at minute precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderWindow {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl Default for OrderWindow {
    fn default() -> Self {
        Self {
            open: NaiveTime::from_hms_opt(10, 0, 0).unwrap_or(NaiveTime::MIN),
            close: NaiveTime::from_hms_opt(18, 45, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl OrderWindow {
    /// Parses `"HH:MM"` pairs; falls back to the default window on bad input.
    pub fn parse(open: &str, close: &str) -> Self {
        let default = Self::default();
        Self {
            open: NaiveTime::parse_from_str(open, "%H:%M").unwrap_or(default.open),
            close: NaiveTime::parse_from_str(close, "%H:%M").unwrap_or(default.close),
        }
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&moscow_offset());
        let minute_of_day = local.hour() * 60 + local.minute();
        let open = self.open.hour() * 60 + self.open.minute();
        let close = self.close.hour() * 60 + self.close.minute();
        minute_of_day >= open && minute_of_day <= close
    }

    pub fn describe(&self) -> String {
        format!("{} до {}", self.open.format("%H:%M"), self.close.format("%H:%M"))
    }
}

/// Current Moscow wall-clock time as `HH:MM`.
pub fn moscow_hhmm(now: DateTime<Utc>) -> String {
    now.with_timezone(&moscow_offset()).format("%H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        // Moscow wall clock h:m is UTC (h-3):m
        Utc.with_ymd_and_hms(2025, 3, 14, (h + 21) % 24, m, 30).unwrap()
    }

    #[test]
    fn window_bounds_are_inclusive_to_the_minute() {
        let window = OrderWindow::default();
        assert!(!window.is_open(at(9, 59)));
        assert!(window.is_open(at(10, 0)));
        assert!(window.is_open(at(18, 45)));
        assert!(!window.is_open(at(18, 46)));
        assert!(!window.is_open(at(23, 0)));
    }

    #[test]
    fn hhmm_uses_moscow_time() {
        assert_eq!(moscow_hhmm(at(12, 5)), "12:05");
    }

    #[test]
    fn parse_falls_back_on_garbage() {
        assert_eq!(OrderWindow::parse("nope", "19:00").open, OrderWindow::default().open);
        assert_eq!(OrderWindow::parse("08:30", "19:00").close.hour(), 19);
    }
}
