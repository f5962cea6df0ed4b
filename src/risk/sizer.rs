use rust_decimal::Decimal;

use crate::config::runtime::TradingSettings;
use crate::decimal_time::pct_distance;
use crate::error::RejectReason;

#[derive(Debug, Clone, Copy)]
pub struct SizingResult {
    pub size_base: Decimal,
    pub size_quote: Decimal,
    pub risk_amount: Decimal,
}

/// 1% fixed-risk position sizer (C9).
pub struct PositionSizer<'a> {
    settings: &'a TradingSettings,
}

impl<'a> PositionSizer<'a> {
    pub fn new(settings: &'a TradingSettings) -> Self {
        Self { settings }
    }

    /// §4.7 precondition validations plus the sizing formula. Returns a
    /// structured reject reason rather than an error: sizing rejection is a
    /// normal decision outcome, not a fault.
    pub fn size(
        &self,
        account_balance: Decimal,
        entry: Decimal,
        stop: Decimal,
    ) -> Result<SizingResult, RejectReason> {
        if account_balance < self.settings.min_balance {
            return Err(RejectReason::MinBalance);
        }
        if entry <= Decimal::ZERO || stop <= Decimal::ZERO || stop == entry {
            return Err(RejectReason::StopWrongSide);
        }

        let stop_distance = (entry - stop).abs();
        let distance_pct = pct_distance(entry, stop);
        if distance_pct < self.settings.min_stop_distance_pct {
            return Err(RejectReason::StopTooClose);
        }
        if distance_pct > self.settings.max_stop_distance_pct {
            return Err(RejectReason::StopTooFar);
        }

        let risk_amount = account_balance * self.settings.risk_per_trade;
        let size_base = risk_amount / stop_distance;
        let size_quote = size_base * entry;

        Ok(SizingResult { size_base, size_quote, risk_amount })
    }

    /// §4.7 R/R validation: `|tp-entry|/|entry-stop| in [min, max]`.
    pub fn validate_risk_reward(
        &self,
        entry: Decimal,
        stop: Decimal,
        take_profit: Decimal,
    ) -> Result<Decimal, RejectReason> {
        let reward = (take_profit - entry).abs();
        let risk = (entry - stop).abs();
        if risk.is_zero() {
            return Err(RejectReason::StopWrongSide);
        }
        let rr = reward / risk;
        if rr < self.settings.min_risk_reward {
            return Err(RejectReason::RrTooLow);
        }
        if rr > self.settings.max_risk_reward {
            return Err(RejectReason::RrTooHigh);
        }
        Ok(rr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn sizes_s1_scenario_correctly() {
        let settings = TradingSettings::default();
        let sizer = PositionSizer::new(&settings);
        let result = sizer.size(dec!(10000), dec!(90692), dec!(90119.40)).unwrap();
        assert_eq!(result.risk_amount, dec!(100));
        // risk_amount / stop_distance: 100 / 572.60
        let expected = dec!(100) / dec!(572.60);
        assert_eq!(result.size_base, expected);
    }

    #[test]
    fn rejects_balance_below_minimum() {
        let settings = TradingSettings::default();
        let sizer = PositionSizer::new(&settings);
        assert_eq!(
            sizer.size(dec!(50), dec!(90692), dec!(90119.40)).unwrap_err(),
            RejectReason::MinBalance
        );
    }

    #[test]
    fn rejects_rr_below_minimum() {
        let settings = TradingSettings::default();
        let sizer = PositionSizer::new(&settings);
        let err = sizer
            .validate_risk_reward(dec!(90692), dec!(90119.40), dec!(90900))
            .unwrap_err();
        assert_eq!(err, RejectReason::RrTooLow);
    }

    #[test]
    fn rejects_rr_above_maximum() {
        let settings = TradingSettings::default();
        let sizer = PositionSizer::new(&settings);
        // risk = 572.60; reward must stay <= 5x that to pass.
        let err = sizer
            .validate_risk_reward(dec!(90692), dec!(90119.40), dec!(93700))
            .unwrap_err();
        assert_eq!(err, RejectReason::RrTooHigh);
    }
}
