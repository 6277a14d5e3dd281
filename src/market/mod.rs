//! Market-hours clock.
//!
//! A simplified US equity session: Monday through Friday, 9:30 to 16:00
//! exchange-local time, derived from UTC with a fixed configured offset.
//! The open/closed state feeds the cache TTL multiplier and the scan logs.
//!
//! TODO: plug in an exchange holiday calendar; half-days and holidays are
//! currently treated as open.

use crate::config::MarketConfig;
use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc, Weekday};

/// Minutes since local midnight when the session opens (9:30).
const SESSION_OPEN_MINUTES: u32 = 9 * 60 + 30;
/// Minutes since local midnight when the session closes (16:00).
const SESSION_CLOSE_MINUTES: u32 = 16 * 60;

/// Determines whether the market is open at a given instant.
#[derive(Debug, Clone, Copy)]
pub struct MarketHours {
    offset: FixedOffset,
}

impl MarketHours {
    pub fn new(config: &MarketConfig) -> Self {
        let offset = FixedOffset::east_opt(config.utc_offset_hours * 3600)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"));
        Self { offset }
    }

    /// Whether the market is open at `now`. Pure function of the instant so
    /// the cache can evaluate the state it captured at write time.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.offset);

        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }

        let minutes = local.hour() * 60 + local.minute();
        (SESSION_OPEN_MINUTES..SESSION_CLOSE_MINUTES).contains(&minutes)
    }

    /// Whether the market is open right now.
    pub fn is_open_now(&self) -> bool {
        self.is_open_at(Utc::now())
    }
}

impl Default for MarketHours {
    fn default() -> Self {
        Self::new(&MarketConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn eastern() -> MarketHours {
        MarketHours::new(&MarketConfig {
            utc_offset_hours: -5,
        })
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_open_midsession_weekday() {
        // Wednesday 2024-01-10 12:00 ET == 17:00 UTC
        assert!(eastern().is_open_at(utc(2024, 1, 10, 17, 0)));
    }

    #[test]
    fn test_closed_on_weekend() {
        // Saturday 2024-01-13 12:00 ET
        assert!(!eastern().is_open_at(utc(2024, 1, 13, 17, 0)));
        // Sunday
        assert!(!eastern().is_open_at(utc(2024, 1, 14, 17, 0)));
    }

    #[test]
    fn test_session_open_boundary() {
        // 9:29 ET closed, 9:30 ET open
        assert!(!eastern().is_open_at(utc(2024, 1, 10, 14, 29)));
        assert!(eastern().is_open_at(utc(2024, 1, 10, 14, 30)));
    }

    #[test]
    fn test_session_close_boundary() {
        // 15:59 ET open, 16:00 ET closed
        assert!(eastern().is_open_at(utc(2024, 1, 10, 20, 59)));
        assert!(!eastern().is_open_at(utc(2024, 1, 10, 21, 0)));
    }

    #[test]
    fn test_weekday_rollover_across_utc_midnight() {
        // Friday 2024-01-12 23:00 UTC is Friday 18:00 ET: closed but a weekday;
        // Saturday 01:00 UTC is still Friday 20:00 ET.
        assert!(!eastern().is_open_at(utc(2024, 1, 12, 23, 0)));
        assert!(!eastern().is_open_at(utc(2024, 1, 13, 1, 0)));
    }
}
