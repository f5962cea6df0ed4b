use rust_decimal::Decimal;

use crate::config::runtime::TradingSettings;
use crate::decimal_time::pct_distance;
use crate::types::{Direction, StopSource, Swing, SwingKind};

#[derive(Debug, Clone, Copy)]
pub struct StopLossResult {
    pub stop: Decimal,
    pub source: StopSource,
    pub min_take_profit: Decimal,
}

/// Swing-anchored stop-loss calculator (C8). Tries the 5M swing first, falls
/// back to the 4H swing that was swept; rejects if neither lands inside the
/// configured distance band (§4.6).
pub struct StopLossCalculator<'a> {
    settings: &'a TradingSettings,
}

impl<'a> StopLossCalculator<'a> {
    pub fn new(settings: &'a TradingSettings) -> Self {
        Self { settings }
    }

    /// `direction` must already match the originating sweep's bias; callers
    /// enforce that before reaching this calculator.
    pub fn calculate(
        &self,
        entry: Decimal,
        direction: Direction,
        five_minute_swing: Option<&Swing>,
        four_hour_swept_swing: &Swing,
    ) -> Option<StopLossResult> {
        let wanted_kind = match direction {
            Direction::Long => SwingKind::Low,
            Direction::Short => SwingKind::High,
        };

        let candidate_a = five_minute_swing
            .filter(|s| s.kind == wanted_kind)
            .map(|s| (s.price, StopSource::FiveMinuteSwing));
        let candidate_b = (four_hour_swept_swing.kind == wanted_kind)
            .then_some((four_hour_swept_swing.price, StopSource::FourHourSwing));

        for (swing_price, source) in candidate_a.into_iter().chain(candidate_b) {
            if let Some(result) = self.evaluate(entry, direction, swing_price, source) {
                return Some(result);
            }
        }
        None
    }

    fn evaluate(
        &self,
        entry: Decimal,
        direction: Direction,
        swing_price: Decimal,
        source: StopSource,
    ) -> Option<StopLossResult> {
        let stop = match direction {
            Direction::Long => swing_price * (Decimal::ONE - self.settings.long_sl_buffer),
            Direction::Short => swing_price * (Decimal::ONE + self.settings.short_sl_buffer),
        };

        let side_ok = match direction {
            Direction::Long => stop < entry,
            Direction::Short => stop > entry,
        };
        if !side_ok {
            return None;
        }

        let distance_pct = pct_distance(entry, stop);
        if distance_pct < self.settings.min_stop_distance_pct
            || distance_pct > self.settings.max_stop_distance_pct
        {
            return None;
        }

        let distance = (entry - stop).abs();
        let min_take_profit = match direction {
            Direction::Long => entry + distance * Decimal::TWO,
            Direction::Short => entry - distance * Decimal::TWO,
        };

        Some(StopLossResult { stop, source, min_take_profit })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn swing(kind: SwingKind, price: Decimal) -> Swing {
        Swing { id: 1, timeframe: crate::types::TimeFrame::FiveMinute, ts: Utc::now(), kind, price, active: true }
    }

    #[test]
    fn accepts_five_minute_swing_when_in_band() {
        let settings = TradingSettings::default();
        let calc = StopLossCalculator::new(&settings);
        let five_m = swing(SwingKind::Low, dec!(90300));
        let four_h = swing(SwingKind::Low, dec!(89000));

        let result = calc
            .calculate(dec!(90692), Direction::Long, Some(&five_m), &four_h)
            .expect("S1: 5m swing should be accepted");
        assert_eq!(result.source, StopSource::FiveMinuteSwing);
        assert_eq!(result.stop, dec!(90300) * dec!(0.998));
    }

    #[test]
    fn falls_back_to_four_hour_swing_when_five_minute_too_close() {
        let settings = TradingSettings::default();
        let calc = StopLossCalculator::new(&settings);
        let five_m = swing(SwingKind::Low, dec!(90650)); // S2: too close (0.247%)
        let four_h = swing(SwingKind::Low, dec!(89000)); // S2: accepted (2.063%)

        let result = calc
            .calculate(dec!(90692), Direction::Long, Some(&five_m), &four_h)
            .expect("S2: 4h swing should be accepted as fallback");
        assert_eq!(result.source, StopSource::FourHourSwing);
    }

    #[test]
    fn rejects_when_both_candidates_invalid() {
        let settings = TradingSettings::default();
        let calc = StopLossCalculator::new(&settings);
        let five_m = swing(SwingKind::Low, dec!(90689.9)); // S3: too close
        let four_h = swing(SwingKind::Low, dec!(87800)); // S3: too far

        assert!(calc.calculate(dec!(90692), Direction::Long, Some(&five_m), &four_h).is_none());
    }
}
