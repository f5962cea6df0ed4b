use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};

use crate::config::runtime::TradingSettings;
use crate::database::Database;
use crate::exchange::Brokerage;
use crate::price_feed::PriceFeed;
use crate::risk::RiskGatekeeper;
use crate::types::{OrderRequest, PriceTick, SystemConfig, Trade, TradeOutcome, TradeStatus};

/// Watches the single open position against live price and the time-based
/// exit (§4.10). Closing a trade is the only place `RiskGatekeeper` learns
/// about outcomes, so it always runs through `close`.
pub struct PositionMonitor<B: Brokerage> {
    db: Arc<Database>,
    broker: Arc<B>,
    gatekeeper: Arc<RiskGatekeeper>,
    settings: TradingSettings,
    system: Arc<RwLock<SystemConfig>>,
}

impl<B: Brokerage> PositionMonitor<B> {
    pub fn new(
        db: Arc<Database>,
        broker: Arc<B>,
        gatekeeper: Arc<RiskGatekeeper>,
        settings: TradingSettings,
        system: Arc<RwLock<SystemConfig>>,
    ) -> Self {
        Self { db, broker, gatekeeper, settings, system }
    }

    /// Reconnecting subscriber loop driven by the shared price feed; stops
    /// cleanly when `shutdown` fires or when a tick reports emergency stop.
    pub async fn run(&self, feed: &PriceFeed, mut shutdown: broadcast::Receiver<()>) {
        let mut prices = feed.subscribe();
        loop {
            tokio::select! {
                tick = prices.recv() => {
                    match tick {
                        Ok(tick) => {
                            match self.on_tick(tick).await {
                                Ok(true) => {
                                    info!("position monitor halted by emergency stop");
                                    break;
                                }
                                Ok(false) => {}
                                Err(e) => warn!("position monitor tick failed: {}", e),
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("position monitor lagged behind price feed by {} ticks", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = shutdown.recv() => {
                    info!("position monitor shutting down");
                    break;
                }
            }
        }
    }

    /// Returns `true` when the monitor should halt (emergency stop fired).
    pub async fn on_tick(&self, tick: PriceTick) -> anyhow::Result<bool> {
        let Some(mut trade) = self.db.open_trade().await? else {
            return Ok(false);
        };
        let mid = tick.mid();

        if let Some(halt) = self.check_emergency_and_duration(&mut trade, mid).await? {
            return Ok(halt);
        }
        if trade.crossed_stop(mid) {
            self.close(trade, mid, "stop loss hit").await?;
            return Ok(false);
        }
        if trade.crossed_take_profit(mid) {
            self.close(trade, mid, "take profit hit").await?;
            return Ok(false);
        }
        self.maybe_trail_to_breakeven(&mut trade, mid).await?;
        Ok(false)
    }

    /// §4.10: emergency stop closes immediately and halts the monitor; the
    /// 72h max hold also force-closes but leaves the monitor running.
    /// `Some(halt)` means the trade was closed; `None` means neither fired.
    async fn check_emergency_and_duration(&self, trade: &mut Trade, price: Decimal) -> anyhow::Result<Option<bool>> {
        if self.system.read().await.emergency_stop {
            info!("emergency stop engaged, closing trade {} and halting monitor", trade.id);
            self.close(trade.clone(), price, "emergency stop").await?;
            return Ok(Some(true));
        }

        let age = Utc::now() - trade.entry_ts;
        if age.num_hours() >= self.settings.max_trade_duration_hours {
            info!("trade {} hit max duration, closing at market", trade.id);
            self.close(trade.clone(), price, "max duration exceeded").await?;
            return Ok(Some(false));
        }
        Ok(None)
    }

    /// Once unrealized progress reaches the trigger, move the stop to
    /// breakeven exactly once (§4.10); never moves it back.
    async fn maybe_trail_to_breakeven(&self, trade: &mut Trade, price: Decimal) -> anyhow::Result<()> {
        if trade.trailing_active {
            return Ok(());
        }
        if trade.progress(price) >= self.settings.trailing_trigger_pct {
            trade.stop_loss = trade.entry_price;
            trade.trailing_active = true;
            self.db.update_trade(trade).await?;
            info!("trade {} trailing stop moved to breakeven at {}", trade.id, trade.entry_price);
        }
        Ok(())
    }

    async fn close(&self, mut trade: Trade, exit_price: Decimal, reason: &str) -> anyhow::Result<()> {
        let closing_side = trade.direction.side_for_exit();
        let order = self
            .broker
            .place_order(OrderRequest::market(closing_side, trade.size_base))
            .await?;
        let fill_price = order.average_fill_price.unwrap_or(exit_price);
        let pnl = trade.pnl_at(fill_price);
        let outcome = if pnl > Decimal::ZERO {
            TradeOutcome::Win
        } else if pnl < Decimal::ZERO {
            TradeOutcome::Loss
        } else {
            TradeOutcome::Breakeven
        };

        trade.status = TradeStatus::Closed;
        trade.exit_price = Some(fill_price);
        trade.exit_ts = Some(Utc::now());
        trade.outcome = Some(outcome);
        trade.pnl = Some(pnl);
        self.db.update_trade(&trade).await?;

        info!("trade {} closed ({}): pnl={}", trade.id, reason, pnl);

        self.gatekeeper
            .record_close(&self.settings, self.settings.account_balance, outcome, pnl)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::SimulatedBrokerage;
    use crate::types::{Direction, StopSource};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    async fn setup() -> (Arc<Database>, Arc<SimulatedBrokerage>, Arc<RiskGatekeeper>, Arc<RwLock<SystemConfig>>) {
        let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        let broker = Arc::new(SimulatedBrokerage::new(dec!(90692)));
        let gatekeeper = Arc::new(RiskGatekeeper::load(db.clone()).await.unwrap());
        let system = Arc::new(RwLock::new(SystemConfig::default()));
        (db, broker, gatekeeper, system)
    }

    fn open_trade(entry: Decimal, stop: Decimal, tp: Decimal) -> Trade {
        Trade {
            id: Uuid::new_v4().to_string(),
            direction: Direction::Long,
            status: TradeStatus::Open,
            entry_price: entry,
            entry_ts: Utc::now(),
            size_base: dec!(1),
            size_quote: entry,
            stop_loss: stop,
            stop_source: StopSource::FiveMinuteSwing,
            take_profit: tp,
            rr: dec!(2.0),
            trailing_active: false,
            exit_price: None,
            exit_ts: None,
            outcome: None,
            pnl: None,
        }
    }

    #[tokio::test]
    async fn trails_to_breakeven_then_stops_out_at_entry() {
        let (db, broker, gatekeeper, system) = setup().await;
        let trade = open_trade(dec!(90692), dec!(90119.40), dec!(91837.20));
        db.insert_trade(&trade).await.unwrap();

        let monitor = PositionMonitor::new(db.clone(), broker, gatekeeper, TradingSettings::default(), system);

        // progress = (price - entry) / (tp - entry); 0.8 trigger needs price
        // at entry + 0.8 * (tp - entry).
        let trigger_price = dec!(90692) + dec!(0.8) * (dec!(91837.20) - dec!(90692));
        monitor
            .on_tick(PriceTick { ts: Utc::now(), bid: trigger_price, ask: trigger_price, seq: None })
            .await
            .unwrap();

        let trailed = db.open_trade().await.unwrap().expect("still open after trailing");
        assert!(trailed.trailing_active);
        assert_eq!(trailed.stop_loss, dec!(90692));

        // price falls back to entry: breakeven stop fires, trade closes flat.
        monitor
            .on_tick(PriceTick { ts: Utc::now(), bid: dec!(90692), ask: dec!(90692), seq: None })
            .await
            .unwrap();
        assert!(db.open_trade().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn closes_on_max_duration_regardless_of_price() {
        let (db, broker, gatekeeper, system) = setup().await;
        let mut trade = open_trade(dec!(90692), dec!(90119.40), dec!(91837.20));
        trade.entry_ts = Utc::now() - chrono::Duration::hours(73);
        db.insert_trade(&trade).await.unwrap();

        let monitor = PositionMonitor::new(db.clone(), broker, gatekeeper, TradingSettings::default(), system);
        monitor
            .on_tick(PriceTick { ts: Utc::now(), bid: dec!(90700), ask: dec!(90700), seq: None })
            .await
            .unwrap();

        assert!(db.open_trade().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn emergency_stop_closes_trade_and_signals_halt() {
        let (db, broker, gatekeeper, system) = setup().await;
        let trade = open_trade(dec!(90692), dec!(90119.40), dec!(91837.20));
        db.insert_trade(&trade).await.unwrap();
        system.write().await.emergency_stop = true;

        let monitor = PositionMonitor::new(db.clone(), broker, gatekeeper, TradingSettings::default(), system);
        let halt = monitor
            .on_tick(PriceTick { ts: Utc::now(), bid: dec!(90700), ask: dec!(90700), seq: None })
            .await
            .unwrap();

        assert!(halt);
        assert!(db.open_trade().await.unwrap().is_none());
    }
}
