use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::database::Database;
use crate::exchange::Brokerage;
use crate::types::{
    Direction, Order, OrderRequest, OrderStatus, StopSource, Trade, TradeStatus,
};

const FILL_POLL_INTERVAL: Duration = Duration::from_millis(250);
const FILL_POLL_ATTEMPTS: u32 = 20;

/// Everything C8-C10 agreed on before the oracle was consulted; the
/// execution manager turns this into a filled position.
#[derive(Debug, Clone)]
pub struct TradeProposal {
    pub direction: Direction,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub stop_source: StopSource,
    pub take_profit: Decimal,
    pub size_base: Decimal,
    pub size_quote: Decimal,
    pub rr: Decimal,
}

/// Converts an approved proposal into a filled position guarded by a stop
/// and a take-profit order (§4.9). Entry fills first; if either protective
/// order then fails to place, the position is flattened immediately rather
/// than left unprotected.
pub struct ExecutionManager<B: Brokerage> {
    db: Arc<Database>,
    broker: Arc<B>,
    in_flight: Mutex<HashSet<String>>,
}

impl<B: Brokerage> ExecutionManager<B> {
    pub fn new(db: Arc<Database>, broker: Arc<B>) -> Self {
        Self { db, broker, in_flight: Mutex::new(HashSet::new()) }
    }

    /// `idempotency_key` is the originating sweep id: a second call for the
    /// same sweep while the first is still executing is a no-op, not a
    /// second trade.
    pub async fn execute(
        &self,
        proposal: TradeProposal,
        idempotency_key: &str,
    ) -> anyhow::Result<Option<Trade>> {
        {
            let mut in_flight = self.in_flight.lock().await;
            if !in_flight.insert(idempotency_key.to_string()) {
                info!(key = idempotency_key, "execution already in flight, skipping");
                return Ok(None);
            }
        }
        let result = self.execute_inner(proposal).await;
        self.in_flight.lock().await.remove(idempotency_key);
        result
    }

    async fn execute_inner(&self, proposal: TradeProposal) -> anyhow::Result<Option<Trade>> {
        let entry_side = proposal.direction.side_for_entry();
        let entry_request = OrderRequest::market(entry_side, proposal.size_base);

        info!(
            "submitting entry: {} {} @ ~{} (rr={})",
            entry_side, proposal.size_base, proposal.entry_price, proposal.rr
        );
        let placed = self.broker.place_order(entry_request).await?;
        let filled = match self.poll_until_final(&placed).await? {
            Some(order) if order.status == OrderStatus::Filled => order,
            Some(order) => {
                warn!("entry order ended in {:?}, not opening a position", order.status);
                return Ok(None);
            }
            None => {
                warn!("entry order did not reach a final state in time, cancelling");
                let _ = self.broker.cancel_order(&placed.id).await;
                return Ok(None);
            }
        };

        let fill_price = filled.average_fill_price.unwrap_or(proposal.entry_price);
        let trade = Trade {
            id: Uuid::new_v4().to_string(),
            direction: proposal.direction,
            status: TradeStatus::Open,
            entry_price: fill_price,
            entry_ts: Utc::now(),
            size_base: proposal.size_base,
            size_quote: proposal.size_quote,
            stop_loss: proposal.stop_loss,
            stop_source: proposal.stop_source,
            take_profit: proposal.take_profit,
            rr: proposal.rr,
            trailing_active: false,
            exit_price: None,
            exit_ts: None,
            outcome: None,
            pnl: None,
        };
        self.db.insert_trade(&trade).await?;

        let exit_side = proposal.direction.side_for_exit();
        let stop_request =
            OrderRequest::stop_loss(exit_side, proposal.size_base, proposal.stop_loss, proposal.stop_loss);
        let tp_request = OrderRequest::take_profit(exit_side, proposal.size_base, proposal.take_profit);

        let (stop_result, tp_result) =
            tokio::join!(self.broker.place_order(stop_request), self.broker.place_order(tp_request));

        match (stop_result, tp_result) {
            (Ok(stop_order), Ok(tp_order)) => {
                info!("position open: entry={} stop={} tp={}", trade.id, stop_order.id, tp_order.id);
                Ok(Some(trade))
            }
            (stop, tp) => {
                error!("protective order placement failed, flattening: stop={:?} tp={:?}", stop, tp);
                if let Ok(order) = &stop {
                    let _ = self.broker.cancel_order(&order.id).await;
                }
                if let Ok(order) = &tp {
                    let _ = self.broker.cancel_order(&order.id).await;
                }
                self.flatten_unprotected(trade).await.map(Some)
            }
        }
    }

    /// Closes a position that opened without working stop/tp orders and
    /// marks it REJECTED rather than OPEN so the single-trade slot frees up.
    async fn flatten_unprotected(&self, mut trade: Trade) -> anyhow::Result<Trade> {
        let closing_side = trade.direction.side_for_exit();
        let close_request = OrderRequest::market(closing_side, trade.size_base);
        let closed = self.broker.place_order(close_request).await?;
        let exit_price = closed.average_fill_price.unwrap_or(trade.entry_price);

        trade.status = TradeStatus::Rejected;
        trade.exit_price = Some(exit_price);
        trade.exit_ts = Some(Utc::now());
        trade.pnl = Some(trade.pnl_at(exit_price));
        self.db.update_trade(&trade).await?;
        Ok(trade)
    }

    async fn poll_until_final(&self, order: &Order) -> anyhow::Result<Option<Order>> {
        if order.status.is_final() {
            return Ok(Some(order.clone()));
        }
        for _ in 0..FILL_POLL_ATTEMPTS {
            tokio::time::sleep(FILL_POLL_INTERVAL).await;
            let current = self.broker.get_order(&order.id).await?;
            if current.status.is_final() {
                return Ok(Some(current));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::SimulatedBrokerage;
    use rust_decimal_macros::dec;

    fn proposal() -> TradeProposal {
        TradeProposal {
            direction: Direction::Long,
            entry_price: dec!(90692),
            stop_loss: dec!(90119.40),
            stop_source: StopSource::FiveMinuteSwing,
            take_profit: dec!(91837.20),
            size_base: dec!(0.1746),
            size_quote: dec!(15834),
            rr: dec!(2.0),
        }
    }

    #[tokio::test]
    async fn opens_and_protects_a_position() {
        let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        let broker = Arc::new(SimulatedBrokerage::new(dec!(90692)));
        let manager = ExecutionManager::new(db.clone(), broker);

        let trade = manager.execute(proposal(), "sweep-1").await.unwrap().expect("trade opens");
        assert_eq!(trade.status, TradeStatus::Open);

        let stored = db.open_trade().await.unwrap().expect("persisted as the open trade");
        assert_eq!(stored.id, trade.id);
    }

    #[tokio::test]
    async fn key_is_released_after_completion_for_reuse() {
        let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        let broker = Arc::new(SimulatedBrokerage::new(dec!(90692)));
        let manager = Arc::new(ExecutionManager::new(db, broker));

        let first = manager.execute(proposal(), "sweep-1").await.unwrap();
        assert!(first.is_some());
        assert!(manager.in_flight.lock().await.is_empty());
    }
}
