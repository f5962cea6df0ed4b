use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::database::Database;
use crate::decimal_time::{align_to_boundary, is_aligned};
use crate::error::EngineError;
use crate::types::{Candle, TimeFrame};

/// Persist/query 4H and 5M OHLCV; gap detection; retention (C2).
pub struct CandleStore {
    db: Arc<Database>,
}

impl CandleStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// §4.1 validation: low <= min(open,close) <= max(open,close) <= high,
    /// volume >= 0, timestamp aligned. Invalid candles are skipped, never
    /// fatal (§7 DataIntegrity).
    pub fn validate(&self, candle: &Candle) -> Result<(), EngineError> {
        if !candle.is_valid() {
            return Err(EngineError::DataIntegrity(format!(
                "candle OHLC invariant violated at {}",
                candle.ts_start
            )));
        }
        if !is_aligned(candle.ts_start, candle.timeframe) {
            return Err(EngineError::DataIntegrity(format!(
                "candle ts_start {} not aligned to {} boundary",
                candle.ts_start, candle.timeframe
            )));
        }
        Ok(())
    }

    /// Insert, skip on duplicate key (no-op when re-run over the same
    /// window — the round-trip property of §8).
    pub async fn upsert(&self, candle: &Candle) -> Result<()> {
        self.validate(candle)
            .map_err(|e| anyhow::anyhow!("{}", e))?;
        self.db.upsert_candle(candle).await
    }

    pub async fn latest_ts(&self, timeframe: TimeFrame) -> Result<Option<DateTime<Utc>>> {
        self.db.latest_candle_ts(timeframe).await
    }

    pub async fn recent(&self, timeframe: TimeFrame, limit: i64) -> Result<Vec<Candle>> {
        self.db.recent_candles(timeframe, limit).await
    }

    /// Scans the last N stored timestamps and returns the boundaries that
    /// should exist between them but don't (§4.1 gap-detection).
    pub async fn find_gaps(&self, timeframe: TimeFrame, lookback: i64) -> Result<Vec<DateTime<Utc>>> {
        let candles = self.recent(timeframe, lookback).await?;
        let mut gaps = Vec::new();
        let step = timeframe.duration();

        for window in candles.windows(2) {
            let mut expected = window[0].ts_start + step;
            while expected < window[1].ts_start {
                gaps.push(expected);
                expected = expected + step;
            }
        }
        Ok(gaps)
    }

    /// 5M store prunes candles older than 7 days; runs at most every 6h is
    /// enforced by the collector's scheduling, not here.
    pub async fn prune_five_minute(&self, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = now - chrono::Duration::days(7);
        self.db.prune_old_candles(cutoff).await
    }

    pub fn align(&self, ts: DateTime<Utc>, timeframe: TimeFrame) -> DateTime<Utc> {
        align_to_boundary(ts, timeframe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(ts: DateTime<Utc>) -> Candle {
        Candle {
            timeframe: TimeFrame::FiveMinute,
            ts_start: ts,
            open: dec!(100),
            high: dec!(101),
            low: dec!(99),
            close: dec!(100.5),
            volume: dec!(10),
        }
    }

    #[tokio::test]
    async fn rejects_inverted_ohlc() {
        let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        let store = CandleStore::new(db);
        let mut bad = candle(Utc::now());
        bad.high = dec!(50); // high below open/close/low
        assert!(store.validate(&bad).is_err());
    }
}
