use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::runtime::TradingSettings;
use crate::database::Database;
use crate::error::RejectReason;
use crate::types::{RiskState, TradeOutcome};
use std::sync::Arc;

/// Oracle decision handed in from outside the gatekeeper; the gatekeeper
/// never calls the oracle itself (§4.8 last bullet).
#[derive(Debug, Clone, Copy)]
pub struct OracleVerdict {
    pub approved: bool,
    pub confidence: Decimal,
}

/// Pre-trade checks, circuit breakers, and pause state (C10). Owns the one
/// piece of mutable cross-cutting state the spec calls out by name:
/// `RiskState`, persisted after every update.
pub struct RiskGatekeeper {
    db: Arc<Database>,
    state: RwLock<RiskState>,
}

impl RiskGatekeeper {
    pub async fn load(db: Arc<Database>) -> anyhow::Result<Self> {
        let state = db.load_risk_state().await?;
        Ok(Self { db, state: RwLock::new(state) })
    }

    pub async fn snapshot(&self) -> RiskState {
        self.state.read().await.clone()
    }

    /// §4.8: all checks must pass. `has_open_trade` / `broker_connected` /
    /// `emergency_stop` / `trading_enabled` are polled from the orchestrator's
    /// read-only handles, never owned here.
    #[allow(clippy::too_many_arguments)]
    pub async fn check(
        &self,
        settings: &TradingSettings,
        account_balance: Decimal,
        has_open_trade: bool,
        broker_connected: bool,
        emergency_stop: bool,
        trading_enabled: bool,
        oracle: OracleVerdict,
        confidence_threshold: Decimal,
    ) -> Result<(), RejectReason> {
        if emergency_stop {
            return Err(RejectReason::EmergencyStop);
        }
        if !trading_enabled {
            return Err(RejectReason::TradingDisabled);
        }
        if has_open_trade {
            return Err(RejectReason::PositionLimit);
        }
        if !broker_connected {
            return Err(RejectReason::BrokerDown);
        }

        let mut state = self.state.write().await;
        self.roll_day_if_needed(&mut state, Utc::now());

        if state.day_pl < -(settings.daily_loss_limit * account_balance) {
            return Err(RejectReason::DailyLoss);
        }
        if state.consecutive_losses >= settings.consecutive_loss_limit {
            return Err(RejectReason::ConsecutiveLosses);
        }
        if state.is_paused(Utc::now()) {
            return Err(RejectReason::Paused);
        }
        if account_balance < settings.min_balance {
            return Err(RejectReason::MinBalance);
        }
        if !oracle.approved {
            return Err(RejectReason::OracleNo);
        }
        if oracle.confidence < confidence_threshold {
            return Err(RejectReason::OracleLowConfidence);
        }

        Ok(())
    }

    /// §4.8 state updates on trade close: increment/reset consecutive
    /// losses, accumulate `day_pl`, arm circuit breakers.
    pub async fn record_close(
        &self,
        settings: &TradingSettings,
        account_balance: Decimal,
        outcome: TradeOutcome,
        pnl: Decimal,
    ) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        self.roll_day_if_needed(&mut state, now);

        match outcome {
            TradeOutcome::Loss => state.consecutive_losses += 1,
            TradeOutcome::Win | TradeOutcome::Breakeven => state.consecutive_losses = 0,
        }
        state.day_pl += pnl;

        if state.day_pl < -(settings.daily_loss_limit * account_balance) {
            let next_midnight = (now.date_naive() + Duration::days(1))
                .and_hms_opt(0, 0, 0)
                .unwrap()
                .and_utc();
            state.paused_until = Some(next_midnight);
            state.reason = Some("DAILY_LOSS".to_string());
            warn!("daily loss breaker tripped, paused until {}", next_midnight);
        }

        if state.consecutive_losses >= settings.consecutive_loss_limit {
            state.paused_until = Some(now + Duration::hours(24));
            state.reason = Some("CONSECUTIVE_LOSSES".to_string());
            warn!("consecutive-loss breaker tripped, paused for 24h");
        }

        self.db.save_risk_state(&state).await?;
        Ok(())
    }

    fn roll_day_if_needed(&self, state: &mut RiskState, now: DateTime<Utc>) {
        if now.date_naive() != state.day_start_ts {
            info!("UTC day rolled over, resetting day_pl");
            state.day_pl = Decimal::ZERO;
            state.day_start_ts = now.date_naive();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn approved() -> OracleVerdict {
        OracleVerdict { approved: true, confidence: dec!(85) }
    }

    #[tokio::test]
    async fn breaker_trips_after_daily_loss_limit() {
        let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        let gatekeeper = RiskGatekeeper::load(db).await.unwrap();
        let settings = TradingSettings::default();

        // S6: two losses totaling -3.01% of a 10000 balance.
        gatekeeper
            .record_close(&settings, dec!(10000), TradeOutcome::Loss, dec!(-200))
            .await
            .unwrap();
        gatekeeper
            .record_close(&settings, dec!(10000), TradeOutcome::Loss, dec!(-101))
            .await
            .unwrap();

        let result = gatekeeper
            .check(&settings, dec!(10000), false, true, false, true, approved(), dec!(70))
            .await;
        assert_eq!(result.unwrap_err(), RejectReason::DailyLoss);
    }

    #[tokio::test]
    async fn breaker_trips_after_three_consecutive_losses() {
        let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        let gatekeeper = RiskGatekeeper::load(db).await.unwrap();
        let settings = TradingSettings::default();

        for _ in 0..3 {
            gatekeeper
                .record_close(&settings, dec!(10000), TradeOutcome::Loss, dec!(-10))
                .await
                .unwrap();
        }

        let result = gatekeeper
            .check(&settings, dec!(10000), false, true, false, true, approved(), dec!(70))
            .await;
        assert_eq!(result.unwrap_err(), RejectReason::ConsecutiveLosses);
    }

    #[tokio::test]
    async fn emergency_stop_overrides_everything() {
        let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        let gatekeeper = RiskGatekeeper::load(db).await.unwrap();
        let settings = TradingSettings::default();

        let result = gatekeeper
            .check(&settings, dec!(10000), false, true, true, true, approved(), dec!(70))
            .await;
        assert_eq!(result.unwrap_err(), RejectReason::EmergencyStop);
    }
}
