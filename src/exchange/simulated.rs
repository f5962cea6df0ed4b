use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{mpsc, Mutex};

use crate::types::{Candle, Granularity, Order, OrderRequest, OrderStatus, PriceTick};

use super::Brokerage;

/// In-memory fill-at-requested-price adapter for paper trading, backtests
/// and tests. No slippage modeling (open question, see DESIGN.md): market
/// orders fill at `last_price`, stop/limit orders fill at their own price.
pub struct SimulatedBrokerage {
    next_id: AtomicI64,
    last_price: Mutex<Decimal>,
    candles: Mutex<Vec<Candle>>,
    orders: Mutex<Vec<Order>>,
    tick_tx: Mutex<Option<mpsc::Sender<PriceTick>>>,
}

impl SimulatedBrokerage {
    pub fn new(seed_price: Decimal) -> Self {
        Self {
            next_id: AtomicI64::new(1),
            last_price: Mutex::new(seed_price),
            candles: Mutex::new(Vec::new()),
            orders: Mutex::new(Vec::new()),
            tick_tx: Mutex::new(None),
        }
    }

    pub fn with_candles(seed_price: Decimal, candles: Vec<Candle>) -> Self {
        Self {
            next_id: AtomicI64::new(1),
            last_price: Mutex::new(seed_price),
            candles: Mutex::new(candles),
            orders: Mutex::new(Vec::new()),
            tick_tx: Mutex::new(None),
        }
    }

    /// Feeds a price update into the engine exactly as a websocket tick
    /// would; used by the backtest driver and tests.
    pub async fn push_price(&self, price: Decimal, ts: DateTime<Utc>) {
        *self.last_price.lock().await = price;
        if let Some(tx) = self.tick_tx.lock().await.as_ref() {
            let _ = tx
                .send(PriceTick {
                    ts,
                    bid: price,
                    ask: price,
                    seq: None,
                })
                .await;
        }
    }

    pub async fn push_candle(&self, candle: Candle) {
        self.candles.lock().await.push(candle);
    }

    fn next_order_id(&self) -> String {
        format!("SIM-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl Brokerage for SimulatedBrokerage {
    async fn fetch_candles(
        &self,
        _granularity: Granularity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Candle>> {
        let candles = self.candles.lock().await;
        Ok(candles
            .iter()
            .filter(|c| c.ts_start >= start && c.ts_start < end)
            .cloned()
            .collect())
    }

    async fn subscribe_prices(&self) -> anyhow::Result<mpsc::Receiver<PriceTick>> {
        let (tx, rx) = mpsc::channel(128);
        *self.tick_tx.lock().await = Some(tx);
        Ok(rx)
    }

    async fn place_order(&self, request: OrderRequest) -> anyhow::Result<Order> {
        let fill_price = request
            .limit_price
            .or(request.stop_price)
            .unwrap_or(*self.last_price.lock().await);

        let order = Order {
            id: self.next_order_id(),
            client_order_id: request.client_order_id,
            side: request.side,
            order_type: request.order_type,
            status: OrderStatus::Filled,
            quantity: request.quantity,
            average_fill_price: Some(fill_price),
            created_at: Utc::now(),
        };
        self.orders.lock().await.push(order.clone());
        Ok(order)
    }

    async fn cancel_order(&self, order_id: &str) -> anyhow::Result<()> {
        let mut orders = self.orders.lock().await;
        if let Some(o) = orders.iter_mut().find(|o| o.id == order_id) {
            o.status = OrderStatus::Cancelled;
        }
        Ok(())
    }

    async fn get_order(&self, order_id: &str) -> anyhow::Result<Order> {
        self.orders
            .lock()
            .await
            .iter()
            .find(|o| o.id == order_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown simulated order {}", order_id))
    }

    async fn is_connected(&self) -> bool {
        true
    }
}

pub type SharedSimulatedBrokerage = Arc<SimulatedBrokerage>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn market_order_fills_at_last_price() {
        let broker = SimulatedBrokerage::new(dec!(65000));
        let order = broker
            .place_order(OrderRequest::market(Side::Buy, dec!(0.1)))
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.average_fill_price, Some(dec!(65000)));
    }

    #[tokio::test]
    async fn limit_order_fills_at_its_own_price() {
        let broker = SimulatedBrokerage::new(dec!(65000));
        let order = broker
            .place_order(OrderRequest::take_profit(Side::Sell, dec!(0.1), dec!(67000)))
            .await
            .unwrap();
        assert_eq!(order.average_fill_price, Some(dec!(67000)));
    }
}
