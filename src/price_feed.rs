use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::exchange::Brokerage;
use crate::types::PriceTick;

/// Opens the raw Binance.US bookTicker stream and forwards parsed ticks on
/// an mpsc channel. One reconnect attempt per call; the caller (`PriceFeed`)
/// owns the retry loop. Mirrors the teacher's websocket client's
/// connect-parse-forward shape, generalized off the multi-pair stream name.
pub async fn connect_binance_ws(symbol: &str) -> anyhow::Result<mpsc::Receiver<PriceTick>> {
    let stream_name = format!("{}@bookTicker", symbol.to_lowercase());
    let url = format!("wss://stream.binance.us:9443/ws/{}", stream_name);
    let (ws_stream, _) = tokio_tungstenite::connect_async(&url).await?;
    let (mut write, mut read) = ws_stream.split();
    let (tx, rx) = mpsc::channel(256);

    tokio::spawn(async move {
        let mut last_seq: Option<u64> = None;
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<BookTicker>(&text) {
                    Ok(bt) => {
                        if let (Ok(bid), Ok(ask)) =
                            (Decimal::from_str(&bt.best_bid), Decimal::from_str(&bt.best_ask))
                        {
                            if let Some(prev) = last_seq {
                                if bt.update_id > prev + 1 {
                                    warn!(
                                        "price feed sequence gap: {} -> {}",
                                        prev, bt.update_id
                                    );
                                }
                            }
                            last_seq = Some(bt.update_id);
                            let tick = PriceTick {
                                ts: Utc::now(),
                                bid,
                                ask,
                                seq: Some(bt.update_id),
                            };
                            if tx.send(tick).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) => debug!("unparseable bookTicker frame: {}", e),
                },
                Ok(Message::Ping(payload)) => {
                    let _ = write.send(Message::Pong(payload)).await;
                }
                Ok(Message::Close(_)) => {
                    info!("price feed websocket closed by server");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("price feed websocket error: {}", e);
                    break;
                }
            }
        }
    });

    Ok(rx)
}

#[derive(Debug, Deserialize)]
struct BookTicker {
    #[serde(rename = "u")]
    update_id: u64,
    #[serde(rename = "b")]
    best_bid: String,
    #[serde(rename = "a")]
    best_ask: String,
}

/// Reconnecting wrapper (C4): owns the latest tick snapshot and fans it out
/// to every subscriber (confluence engine, position monitor). Reconnects
/// with a fixed backoff on stream termination; never gives up.
pub struct PriceFeed {
    latest: Arc<RwLock<Option<PriceTick>>>,
    tx: broadcast::Sender<PriceTick>,
}

impl PriceFeed {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self {
            latest: Arc::new(RwLock::new(None)),
            tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PriceTick> {
        self.tx.subscribe()
    }

    pub async fn latest(&self) -> Option<PriceTick> {
        *self.latest.read().await
    }

    pub async fn run<B: Brokerage>(&self, broker: Arc<B>, mut shutdown: broadcast::Receiver<()>) {
        let reconnect_delay = StdDuration::from_secs(5);
        loop {
            let mut rx = match broker.subscribe_prices().await {
                Ok(rx) => rx,
                Err(e) => {
                    warn!("price feed connect failed: {}, retrying in {:?}", e, reconnect_delay);
                    tokio::select! {
                        _ = tokio::time::sleep(reconnect_delay) => continue,
                        _ = shutdown.recv() => return,
                    }
                }
            };

            loop {
                tokio::select! {
                    tick = rx.recv() => {
                        match tick {
                            Some(tick) => {
                                *self.latest.write().await = Some(tick);
                                let _ = self.tx.send(tick);
                            }
                            None => {
                                warn!("price feed stream ended, reconnecting in {:?}", reconnect_delay);
                                tokio::time::sleep(reconnect_delay).await;
                                break;
                            }
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("price feed shutting down");
                        return;
                    }
                }
            }
        }
    }
}

impl Default for PriceFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_with_no_snapshot() {
        let feed = PriceFeed::new();
        assert!(feed.latest().await.is_none());
    }
}
