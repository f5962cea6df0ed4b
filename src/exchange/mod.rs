#![allow(dead_code)]
pub mod binance;
pub mod simulated;

pub use binance::BinanceClient;
pub use simulated::SimulatedBrokerage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::types::{Candle, Granularity, Order, OrderRequest, PriceTick};

/// Minimal capability surface the core depends on (§6). Auth is opaque;
/// granularities up to `FourHour`, max 300 candles per call.
#[async_trait]
pub trait Brokerage: Send + Sync {
    async fn fetch_candles(
        &self,
        granularity: Granularity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Candle>>;

    async fn subscribe_prices(&self) -> anyhow::Result<mpsc::Receiver<PriceTick>>;

    async fn place_order(&self, request: OrderRequest) -> anyhow::Result<Order>;

    async fn cancel_order(&self, order_id: &str) -> anyhow::Result<()>;

    async fn get_order(&self, order_id: &str) -> anyhow::Result<Order>;

    async fn is_connected(&self) -> bool;
}
