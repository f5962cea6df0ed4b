use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::retry_with_backoff;
use crate::exchange::Brokerage;
use crate::types::{Granularity, TimeFrame};

use super::store::CandleStore;

/// One instance per cadence (4H, 5M); see §4.1 and the concurrency model's
/// "one task per collector, driven by a timer" (§5).
pub struct CandleCollector<B: Brokerage> {
    broker: Arc<B>,
    store: Arc<CandleStore>,
    timeframe: TimeFrame,
    granularity: Granularity,
    poll_interval: StdDuration,
    closed_tx: broadcast::Sender<TimeFrame>,
}

impl<B: Brokerage> CandleCollector<B> {
    pub fn new(
        broker: Arc<B>,
        store: Arc<CandleStore>,
        timeframe: TimeFrame,
        granularity: Granularity,
        poll_interval: StdDuration,
        closed_tx: broadcast::Sender<TimeFrame>,
    ) -> Self {
        Self {
            broker,
            store,
            timeframe,
            granularity,
            poll_interval,
            closed_tx,
        }
    }

    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        let mut last_prune = Utc::now();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        warn!("{} collector poll failed: {}", self.timeframe, e);
                    }
                    if self.timeframe == TimeFrame::FiveMinute
                        && Utc::now() - last_prune >= chrono::Duration::hours(6)
                    {
                        match self.store.prune_five_minute(Utc::now()).await {
                            Ok(n) if n > 0 => info!("pruned {} stale 5m candles", n),
                            Ok(_) => {}
                            Err(e) => warn!("prune failed: {}", e),
                        }
                        last_prune = Utc::now();
                    }
                }
                _ = shutdown.recv() => {
                    info!("{} collector shutting down", self.timeframe);
                    return;
                }
            }
        }
    }

    async fn poll_once(&self) -> anyhow::Result<()> {
        let boundary = self.timeframe.duration();
        let now = Utc::now();
        let start = self
            .store
            .latest_ts(self.timeframe)
            .await?
            .map(|ts| ts + boundary)
            .unwrap_or(now - boundary * 100);
        let end = now - boundary;

        if start >= end {
            return self.gap_fill().await;
        }

        let candles = retry_with_backoff(|| {
            let broker = self.broker.clone();
            let granularity = self.granularity;
            async move { broker.fetch_candles(granularity, start, end).await }
        })
        .await?;

        let mut closed_any = false;
        for candle in candles {
            let store_candle = crate::types::Candle {
                timeframe: self.timeframe,
                ts_start: self.store.align(candle.ts_start, self.timeframe),
                open: candle.open,
                high: candle.high,
                low: candle.low,
                close: candle.close,
                volume: candle.volume,
            };
            match self.store.upsert(&store_candle).await {
                Ok(()) => closed_any = true,
                Err(e) => debug!("skipped invalid candle: {}", e),
            }
        }

        if closed_any {
            let _ = self.closed_tx.send(self.timeframe);
        }

        self.gap_fill().await
    }

    async fn gap_fill(&self) -> anyhow::Result<()> {
        let lookback = match self.timeframe {
            TimeFrame::FourHour => 50,
            TimeFrame::FiveMinute => 100,
        };
        let gaps = self.store.find_gaps(self.timeframe, lookback).await?;
        if gaps.is_empty() {
            return Ok(());
        }

        debug!("{} collector found {} gap(s)", self.timeframe, gaps.len());
        for gap_start in gaps {
            let gap_end = gap_start + self.timeframe.duration();
            match retry_with_backoff(|| {
                let broker = self.broker.clone();
                let granularity = self.granularity;
                async move { broker.fetch_candles(granularity, gap_start, gap_end).await }
            })
            .await
            {
                Ok(candles) => {
                    for candle in candles {
                        let store_candle = crate::types::Candle {
                            timeframe: self.timeframe,
                            ts_start: self.store.align(candle.ts_start, self.timeframe),
                            open: candle.open,
                            high: candle.high,
                            low: candle.low,
                            close: candle.close,
                            volume: candle.volume,
                        };
                        let _ = self.store.upsert(&store_candle).await;
                    }
                }
                Err(e) => warn!("gap refetch failed for {}: {}", gap_start, e),
            }
        }
        Ok(())
    }
}

pub fn default_poll_interval(timeframe: TimeFrame) -> StdDuration {
    match timeframe {
        TimeFrame::FourHour => StdDuration::from_secs(60),
        TimeFrame::FiveMinute => StdDuration::from_secs(15),
    }
}

