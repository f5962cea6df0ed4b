use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};

use crate::candles::{default_poll_interval, CandleCollector, CandleStore};
use crate::config::runtime::{OracleSettings, TradingSettings};
use crate::confluence::ConfluenceEngine;
use crate::database::Database;
use crate::error::RejectReason;
use crate::exchange::Brokerage;
use crate::execution::{ExecutionManager, TradeProposal};
use crate::oracle::{ConfluenceBundle, Oracle};
use crate::position_monitor::PositionMonitor;
use crate::price_feed::PriceFeed;
use crate::risk::{OracleVerdict, PositionSizer, RiskGatekeeper, StopLossCalculator};
use crate::sweep::SweepDetector;
use crate::swings::SwingTracker;
use crate::types::{Granularity, Swing, SwingKind, SystemConfig, TimeFrame};
use crate::web::AppState;

const FOUR_HOUR_LOOKBACK: i64 = 50;
const FIVE_MINUTE_LOOKBACK: i64 = 100;

/// Wires the whole pipeline (§2/§5): one collector task per timeframe, a
/// reconnecting price feed, a position monitor, and the core loop that
/// reacts to candle-close notifications by re-running swing/sweep/confluence
/// detection and, on a completed confluence, driving the trade through
/// sizing, the oracle, the gatekeeper, and execution.
pub struct Orchestrator<B: Brokerage, O: Oracle> {
    db: Arc<Database>,
    broker: Arc<B>,
    oracle: Arc<O>,
    store: Arc<CandleStore>,
    swings: SwingTracker,
    sweeps: SweepDetector,
    confluence: ConfluenceEngine,
    gatekeeper: Arc<RiskGatekeeper>,
    execution: Arc<ExecutionManager<B>>,
    monitor: Arc<PositionMonitor<B>>,
    price_feed: Arc<PriceFeed>,
    settings: TradingSettings,
    oracle_settings: OracleSettings,
    system: Arc<RwLock<SystemConfig>>,
    closed_tx: broadcast::Sender<TimeFrame>,
}

impl<B: Brokerage + 'static, O: Oracle + 'static> Orchestrator<B, O> {
    pub async fn new(
        db: Arc<Database>,
        broker: Arc<B>,
        oracle: Arc<O>,
        settings: TradingSettings,
        oracle_settings: OracleSettings,
    ) -> anyhow::Result<Self> {
        let gatekeeper = Arc::new(RiskGatekeeper::load(db.clone()).await?);
        let store = Arc::new(CandleStore::new(db.clone()));
        let execution = Arc::new(ExecutionManager::new(db.clone(), broker.clone()));
        let system_config = db.load_system_config().await?;
        let system = Arc::new(RwLock::new(system_config));
        let monitor = Arc::new(PositionMonitor::new(
            db.clone(),
            broker.clone(),
            gatekeeper.clone(),
            settings.clone(),
            system.clone(),
        ));
        let (closed_tx, _rx) = broadcast::channel(32);

        Ok(Self {
            swings: SwingTracker::new(db.clone()),
            sweeps: SweepDetector::new(db.clone()),
            confluence: ConfluenceEngine::new(db.clone()),
            db,
            broker,
            oracle,
            store,
            gatekeeper,
            execution,
            monitor,
            price_feed: Arc::new(PriceFeed::new()),
            settings,
            oracle_settings,
            system,
            closed_tx,
        })
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(self.db.clone(), self.gatekeeper.clone(), self.system.clone())
    }

    /// Runs until `shutdown` fires, then waits for every spawned task to
    /// drain. The brokerage client is never dropped mid-flight: collectors
    /// and the monitor hold their own `Arc<B>` and exit on their own signal.
    pub async fn run(&self, shutdown: broadcast::Sender<()>) -> anyhow::Result<()> {
        let four_hour = CandleCollector::new(
            self.broker.clone(),
            self.store.clone(),
            TimeFrame::FourHour,
            Granularity::FourHour,
            default_poll_interval(TimeFrame::FourHour),
            self.closed_tx.clone(),
        );
        let five_minute = CandleCollector::new(
            self.broker.clone(),
            self.store.clone(),
            TimeFrame::FiveMinute,
            Granularity::FiveMinute,
            default_poll_interval(TimeFrame::FiveMinute),
            self.closed_tx.clone(),
        );

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn({
            let shutdown_rx = shutdown.subscribe();
            async move { four_hour.run(shutdown_rx).await }
        }));
        tasks.push(tokio::spawn({
            let shutdown_rx = shutdown.subscribe();
            async move { five_minute.run(shutdown_rx).await }
        }));
        tasks.push(tokio::spawn({
            let feed = self.price_feed.clone();
            let broker = self.broker.clone();
            let shutdown_rx = shutdown.subscribe();
            async move { feed.run(broker, shutdown_rx).await }
        }));
        tasks.push(tokio::spawn({
            let monitor = self.monitor.clone();
            let feed = self.price_feed.clone();
            let shutdown_rx = shutdown.subscribe();
            async move { monitor.run(&feed, shutdown_rx).await }
        }));

        let mut closed_rx = self.closed_tx.subscribe();
        let mut shutdown_rx = shutdown.subscribe();
        loop {
            tokio::select! {
                result = closed_rx.recv() => {
                    match result {
                        Ok(timeframe) => {
                            if let Err(e) = self.on_candles_closed(timeframe).await {
                                warn!("pipeline step failed for {}: {}", timeframe, e);
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("orchestrator lagged behind candle-close notifications by {}", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("orchestrator shutting down");
                    break;
                }
            }
        }

        for task in tasks {
            let _ = task.await;
        }
        Ok(())
    }

    /// Drives one pass of swing/sweep/confluence detection over whatever is
    /// already stored for `timeframe`. Used by the backtest replay driver,
    /// which persists historical candles first and then calls this directly
    /// instead of waiting on a collector's broadcast.
    pub async fn replay(&self, timeframe: TimeFrame) -> anyhow::Result<()> {
        self.on_candles_closed(timeframe).await
    }

    async fn on_candles_closed(&self, timeframe: TimeFrame) -> anyhow::Result<()> {
        let lookback = match timeframe {
            TimeFrame::FourHour => FOUR_HOUR_LOOKBACK,
            TimeFrame::FiveMinute => FIVE_MINUTE_LOOKBACK,
        };
        let candles = self.store.recent(timeframe, lookback).await?;
        self.swings.scan(timeframe, &candles).await?;

        if timeframe == TimeFrame::FiveMinute {
            if let Some(tick) = self.price_feed.latest().await {
                if let Some(sweep) = self.sweeps.on_price(tick.mid()).await? {
                    info!("sweep detected: {:?} at {}", sweep.kind, sweep.price);
                }
            }
            if let Some(signal) = self.confluence.advance(&candles).await? {
                self.handle_confluence_signal(signal.sweep.clone()).await;
            }
        }
        Ok(())
    }

    async fn handle_confluence_signal(&self, sweep: crate::types::Sweep) {
        if let Err(reason) = self.try_open_trade(&sweep).await {
            info!("confluence on sweep {} rejected: {}", sweep.id, reason);
        }
    }

    async fn try_open_trade(&self, sweep: &crate::types::Sweep) -> Result<(), RejectReason> {
        let direction = sweep.bias.direction();
        let entry_price = self
            .price_feed
            .latest()
            .await
            .map(|t| t.mid())
            .ok_or(RejectReason::BrokerDown)?;

        let wanted_kind = match direction {
            crate::types::Direction::Long => SwingKind::Low,
            crate::types::Direction::Short => SwingKind::High,
        };
        let five_minute_swing = self
            .db
            .active_swing(TimeFrame::FiveMinute, wanted_kind)
            .await
            .map_err(|_| RejectReason::NoValidStop)?;
        let four_hour_swept_swing = Swing {
            id: sweep.swing_ref,
            timeframe: TimeFrame::FourHour,
            ts: sweep.ts,
            kind: sweep.kind,
            price: sweep.price,
            active: false,
        };

        let stop_calc = StopLossCalculator::new(&self.settings);
        let stop_result = stop_calc
            .calculate(entry_price, direction, five_minute_swing.as_ref(), &four_hour_swept_swing)
            .ok_or(RejectReason::NoValidStop)?;

        let sizer = PositionSizer::new(&self.settings);
        let sizing = sizer.size(self.settings.account_balance, entry_price, stop_result.stop)?;
        let rr = sizer.validate_risk_reward(entry_price, stop_result.stop, stop_result.min_take_profit)?;

        let bundle = ConfluenceBundle {
            bias: sweep.bias,
            direction,
            entry_price,
            stop_loss: stop_result.stop,
            take_profit: stop_result.min_take_profit,
            account_balance: self.settings.account_balance,
        };
        let decision = self.oracle.consult(bundle).await.map_err(|_| RejectReason::BrokerDown)?;
        let verdict = OracleVerdict { approved: decision.approved(), confidence: decision.confidence };

        let has_open_trade = self.db.open_trade().await.map_err(|_| RejectReason::BrokerDown)?.is_some();
        let broker_connected = self.broker.is_connected().await;
        let system = self.system.read().await.clone();

        self.gatekeeper
            .check(
                &self.settings,
                self.settings.account_balance,
                has_open_trade,
                broker_connected,
                system.emergency_stop,
                system.trading_enabled,
                verdict,
                self.oracle_settings.confidence_threshold,
            )
            .await?;

        let proposal = TradeProposal {
            direction,
            entry_price,
            stop_loss: stop_result.stop,
            stop_source: stop_result.source,
            take_profit: stop_result.min_take_profit,
            size_base: sizing.size_base,
            size_quote: sizing.size_quote,
            rr,
        };

        self.execution
            .execute(proposal, &sweep.id.to_string())
            .await
            .map_err(|_| RejectReason::BrokerDown)?;
        Ok(())
    }
}
