use std::sync::Arc;

use tracing::debug;

use crate::database::Database;
use crate::types::{Candle, Swing, SwingKind, TimeFrame};

/// Detects and persists the latest active swing high/low per timeframe (C5).
pub struct SwingTracker {
    db: Arc<Database>,
}

impl SwingTracker {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Scans the given candle window (already time-sorted ascending) and,
    /// for each kind with a freshly detected swing different from the
    /// currently active one, atomically replaces it (§4.3).
    pub async fn scan(&self, timeframe: TimeFrame, candles: &[Candle]) -> anyhow::Result<()> {
        if let Some((ts, price)) = latest_swing(candles, SwingKind::High) {
            self.maybe_replace(timeframe, SwingKind::High, ts, price).await?;
        }
        if let Some((ts, price)) = latest_swing(candles, SwingKind::Low) {
            self.maybe_replace(timeframe, SwingKind::Low, ts, price).await?;
        }
        Ok(())
    }

    async fn maybe_replace(
        &self,
        timeframe: TimeFrame,
        kind: SwingKind,
        ts: chrono::DateTime<chrono::Utc>,
        price: rust_decimal::Decimal,
    ) -> anyhow::Result<Option<Swing>> {
        let current = self.db.active_swing(timeframe, kind).await?;
        if current.as_ref().map(|s| (s.ts, s.price)) == Some((ts, price)) {
            return Ok(current);
        }
        debug!(
            "{} {:?} swing replaced: {:?} -> {}@{}",
            timeframe, kind, current.map(|s| s.price), price, ts
        );
        Ok(Some(self.db.replace_active_swing(timeframe, kind, ts, price).await?))
    }

    pub async fn active(&self, timeframe: TimeFrame, kind: SwingKind) -> anyhow::Result<Option<Swing>> {
        self.db.active_swing(timeframe, kind).await
    }
}

/// §4.3: index `i` is a swing HIGH iff `candle[i].high > candle[i-2].high
/// && candle[i].high > candle[i+2].high`; mirror for LOW. Minimum 5 candles;
/// the first/last two indices are ineligible. Returns the most recent match.
fn latest_swing(
    candles: &[Candle],
    kind: SwingKind,
) -> Option<(chrono::DateTime<chrono::Utc>, rust_decimal::Decimal)> {
    let n = candles.len();
    if n < 5 {
        return None;
    }

    for i in (2..n - 2).rev() {
        let is_match = match kind {
            SwingKind::High => {
                candles[i].high > candles[i - 2].high && candles[i].high > candles[i + 2].high
            }
            SwingKind::Low => {
                candles[i].low < candles[i - 2].low && candles[i].low < candles[i + 2].low
            }
        };
        if is_match {
            let price = match kind {
                SwingKind::High => candles[i].high,
                SwingKind::Low => candles[i].low,
            };
            return Some((candles[i].ts_start, price));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn candle(hour: u32, high: rust_decimal::Decimal, low: rust_decimal::Decimal) -> Candle {
        Candle {
            timeframe: TimeFrame::FourHour,
            ts_start: Utc.with_ymd_and_hms(2026, 1, 1, hour, 0, 0).unwrap(),
            open: (high + low) / dec!(2),
            high,
            low,
            close: (high + low) / dec!(2),
            volume: dec!(100),
        }
    }

    #[test]
    fn detects_symmetric_swing_high() {
        let candles = vec![
            candle(0, dec!(100), dec!(90)),
            candle(4, dec!(101), dec!(91)),
            candle(8, dec!(105), dec!(92)),
            candle(12, dec!(102), dec!(91)),
            candle(16, dec!(100), dec!(90)),
        ];
        let swing = latest_swing(&candles, SwingKind::High);
        assert_eq!(swing.map(|(_, p)| p), Some(dec!(105)));
    }

    #[test]
    fn rejects_window_below_minimum() {
        let candles = vec![candle(0, dec!(100), dec!(90)); 4];
        assert!(latest_swing(&candles, SwingKind::High).is_none());
    }

    #[test]
    fn detects_symmetric_swing_low() {
        let candles = vec![
            candle(0, dec!(100), dec!(90)),
            candle(4, dec!(101), dec!(89)),
            candle(8, dec!(105), dec!(80)),
            candle(12, dec!(102), dec!(88)),
            candle(16, dec!(100), dec!(90)),
        ];
        let swing = latest_swing(&candles, SwingKind::Low);
        assert_eq!(swing.map(|(_, p)| p), Some(dec!(80)));
    }
}
