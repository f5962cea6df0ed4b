//! Fixed-precision arithmetic and UTC timestamp helpers shared by every
//! component that touches prices or candle boundaries (C1).
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use rust_decimal::Decimal;

use crate::types::TimeFrame;

/// Floors `ts` to the start of its timeframe's bucket in UTC.
pub fn align_to_boundary(ts: DateTime<Utc>, timeframe: TimeFrame) -> DateTime<Utc> {
    match timeframe {
        TimeFrame::FiveMinute => {
            let minute = (ts.minute() / 5) * 5;
            Utc.with_ymd_and_hms(ts.year(), ts.month(), ts.day(), ts.hour(), minute, 0)
                .single()
                .unwrap_or(ts)
        }
        TimeFrame::FourHour => {
            let hour = (ts.hour() / 4) * 4;
            Utc.with_ymd_and_hms(ts.year(), ts.month(), ts.day(), hour, 0, 0)
                .single()
                .unwrap_or(ts)
        }
    }
}

pub fn is_aligned(ts: DateTime<Utc>, timeframe: TimeFrame) -> bool {
    align_to_boundary(ts, timeframe) == ts
}

/// `ratio_gte(a, b, 1.001)` answers "is a >= b * 1.001", the shape every
/// sweep/CHoCH/FVG/BOS threshold in §4 takes.
pub fn ratio_gte(value: Decimal, base: Decimal, ratio: Decimal) -> bool {
    value >= base * ratio
}

pub fn ratio_lte(value: Decimal, base: Decimal, ratio: Decimal) -> bool {
    value <= base * ratio
}

pub fn pct_distance(a: Decimal, b: Decimal) -> Decimal {
    if a.is_zero() {
        return Decimal::ZERO;
    }
    ((a - b).abs() / a) * Decimal::from(100)
}

pub fn seconds_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> i64 {
    (later - earlier).num_seconds()
}

pub fn hours(n: i64) -> Duration {
    Duration::hours(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn aligns_five_minute_boundary() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 1, 10, 37, 42).unwrap();
        let aligned = align_to_boundary(ts, TimeFrame::FiveMinute);
        assert_eq!(aligned, Utc.with_ymd_and_hms(2026, 1, 1, 10, 35, 0).unwrap());
    }

    #[test]
    fn aligns_four_hour_boundary() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 1, 10, 37, 42).unwrap();
        let aligned = align_to_boundary(ts, TimeFrame::FourHour);
        assert_eq!(aligned, Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap());
    }

    #[test]
    fn ratio_threshold_matches_spec_example() {
        let swing_high = Decimal::new(8900000, 2); // 89000.00
        let price = Decimal::new(8909000, 2); // 89090.00 == 89000*1.001
        assert!(ratio_gte(price, swing_high, Decimal::new(1001, 3)));
    }
}
