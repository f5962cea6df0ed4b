use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Read and updated by the risk gatekeeper; day resets at UTC 00:00 (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskState {
    pub consecutive_losses: u32,
    pub day_pl: Decimal,
    pub day_start_ts: NaiveDate,
    pub paused_until: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

impl RiskState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            consecutive_losses: 0,
            day_pl: Decimal::ZERO,
            day_start_ts: now.date_naive(),
            paused_until: None,
            reason: None,
        }
    }

    pub fn is_paused(&self, now: DateTime<Utc>) -> bool {
        self.paused_until.map(|until| now < until).unwrap_or(false)
    }
}

/// Singleton (§3). `emergency_stop`/`trading_enabled` are the operator's
/// writable controls; `account_balance` is the sizing input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    pub emergency_stop: bool,
    pub trading_enabled: bool,
    pub account_balance: Decimal,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            emergency_stop: false,
            trading_enabled: true,
            account_balance: Decimal::ZERO,
        }
    }
}
