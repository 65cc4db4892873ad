// Competition period clock
// Maps an instant to the competition day it belongs to. Days are anchored to
// a fixed wall-clock reset hour in a named timezone, so the boundary tracks
// local time across DST transitions instead of sitting at a fixed UTC offset.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

/// One competition day as seen from a given instant
#[derive(Clone, Debug, PartialEq)]
pub struct Period {
    /// Zone-local calendar date (YYYY-MM-DD) of the period start
    pub day_key: String,
    /// Day key of the previous period
    pub yesterday_key: String,
    /// Unix ms of the period start (the most recent reset instant)
    pub start_ms: i64,
    /// Unix ms of the period end (start + period length)
    pub end_ms: i64,
    /// Milliseconds until the period ends, clamped to >= 0
    pub ms_remaining: i64,
}

/// Compute the period containing `now_ms`.
///
/// An unknown zone name degrades to UTC rather than failing - the countdown
/// display and rollover keep working, just without the local-time anchor.
pub fn current_period(now_ms: i64, zone: &str, reset_hour: u32, period_ms: i64) -> Period {
    match zone.parse::<Tz>() {
        Ok(tz) => period_in_zone(now_ms, tz, reset_hour, period_ms),
        Err(_) => {
            log::warn!("[PERIOD] unknown timezone {}, falling back to UTC", zone);
            period_in_zone(now_ms, chrono_tz::UTC, reset_hour, period_ms)
        }
    }
}

fn period_in_zone(now_ms: i64, tz: Tz, reset_hour: u32, period_ms: i64) -> Period {
    let period_ms = period_ms.max(1);
    let local_now = utc_of(now_ms).with_timezone(&tz);

    // Most recent reset instant at or before now. If today's reset hasn't
    // happened yet in local time, the running period started yesterday.
    let mut anchor_date = local_now.date_naive();
    let mut start = reset_instant(tz, anchor_date, reset_hour);
    if start.timestamp_millis() > now_ms {
        anchor_date = anchor_date.pred_opt().unwrap_or(anchor_date);
        start = reset_instant(tz, anchor_date, reset_hour);
    }

    let start_ms = start.timestamp_millis();
    let end_ms = start_ms + period_ms;
    Period {
        day_key: day_key_of(start_ms, tz),
        yesterday_key: day_key_of(start_ms - period_ms, tz),
        start_ms,
        end_ms,
        ms_remaining: (end_ms - now_ms).max(0),
    }
}

/// The instant at which `date`'s reset occurs in `tz`.
///
/// DST handling: an ambiguous local time (fall-back hour occurs twice)
/// resolves to the earlier instant; a nonexistent local time (spring-forward
/// gap) resolves to the first valid instant after the gap.
fn reset_instant(tz: Tz, date: NaiveDate, reset_hour: u32) -> DateTime<Tz> {
    let naive = date
        .and_hms_opt(reset_hour.min(23), 0, 0)
        .unwrap_or_else(|| date.and_time(chrono::NaiveTime::MIN));
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earlier, _) => earlier,
        LocalResult::None => {
            // Probe forward in 15-minute steps; DST gaps are at most a few hours
            for minutes in 1..=16 {
                let probe = naive + Duration::minutes(15 * minutes);
                if let Some(dt) = tz.from_local_datetime(&probe).earliest() {
                    return dt;
                }
            }
            log::warn!(
                "[PERIOD] no valid instant near {} in {}, treating as UTC",
                naive, tz
            );
            tz.from_utc_datetime(&naive)
        }
    }
}

/// Zone-local calendar date key (YYYY-MM-DD) for an instant
pub fn day_key_of(ms: i64, tz: Tz) -> String {
    utc_of(ms)
        .with_timezone(&tz)
        .date_naive()
        .format("%Y-%m-%d")
        .to_string()
}

fn utc_of(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;
    const ZONE: &str = "America/Denver";

    fn utc_ms(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> i64 {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0)
            .unwrap()
            .timestamp_millis()
    }

    #[test]
    fn test_day_flips_at_local_reset_hour() {
        // Denver is UTC-7 (MST) in January; 13:00 local = 20:00 UTC
        let before = current_period(utc_ms(2025, 1, 15, 19, 59), ZONE, 13, DAY_MS);
        let after = current_period(utc_ms(2025, 1, 15, 20, 1), ZONE, 13, DAY_MS);
        assert_eq!(before.day_key, "2025-01-14");
        assert_eq!(before.yesterday_key, "2025-01-13");
        assert_eq!(after.day_key, "2025-01-15");
        assert_eq!(after.yesterday_key, "2025-01-14");
    }

    #[test]
    fn test_dst_spring_forward_boundary() {
        // 2025-03-09: Denver springs forward at 02:00 MST -> 03:00 MDT.
        // Before the transition 13:00 local = 20:00 UTC, after it = 19:00 UTC.
        // One minute before 13:00 MDT the day must still be 03-08.
        let before = current_period(utc_ms(2025, 3, 9, 18, 59), ZONE, 13, DAY_MS);
        assert_eq!(before.day_key, "2025-03-08");
        assert_eq!(before.start_ms, utc_ms(2025, 3, 8, 20, 0));

        // One minute after 13:00 MDT the new day starts - at the local
        // wall-clock instant, not 24h after the previous UTC start.
        let after = current_period(utc_ms(2025, 3, 9, 19, 1), ZONE, 13, DAY_MS);
        assert_eq!(after.day_key, "2025-03-09");
        assert_eq!(after.start_ms, utc_ms(2025, 3, 9, 19, 0));
    }

    #[test]
    fn test_dst_fall_back_boundary() {
        // 2025-11-02: Denver falls back at 02:00 MDT -> 01:00 MST.
        // After the transition 13:00 local = 20:00 UTC again.
        let before = current_period(utc_ms(2025, 11, 2, 19, 59), ZONE, 13, DAY_MS);
        assert_eq!(before.day_key, "2025-11-01");

        let after = current_period(utc_ms(2025, 11, 2, 20, 1), ZONE, 13, DAY_MS);
        assert_eq!(after.day_key, "2025-11-02");
        assert_eq!(after.start_ms, utc_ms(2025, 11, 2, 20, 0));
    }

    #[test]
    fn test_reset_in_spring_forward_gap() {
        // 02:00-02:59 local doesn't exist on 2025-03-09; a 2 AM reset must
        // resolve to the first valid instant after the gap (03:00 MDT).
        let p = current_period(utc_ms(2025, 3, 9, 12, 0), ZONE, 2, DAY_MS);
        assert_eq!(p.day_key, "2025-03-09");
        assert_eq!(p.start_ms, utc_ms(2025, 3, 9, 9, 0)); // 03:00 MDT
    }

    #[test]
    fn test_ms_remaining_clamped_and_decreasing() {
        let start = utc_ms(2025, 1, 15, 20, 0);
        let p1 = current_period(start + 1000, ZONE, 13, DAY_MS);
        let p2 = current_period(start + 2000, ZONE, 13, DAY_MS);
        assert_eq!(p1.ms_remaining, DAY_MS - 1000);
        assert_eq!(p2.ms_remaining, p1.ms_remaining - 1000);
        assert!(p1.ms_remaining <= DAY_MS);
    }

    #[test]
    fn test_unknown_zone_falls_back_to_utc() {
        let p = current_period(utc_ms(2025, 1, 15, 12, 59), "Not/AZone", 13, DAY_MS);
        assert_eq!(p.day_key, "2025-01-14");
        let p = current_period(utc_ms(2025, 1, 15, 13, 1), "Not/AZone", 13, DAY_MS);
        assert_eq!(p.day_key, "2025-01-15");
    }
}
