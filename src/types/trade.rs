use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Direction, StopSource, TradeOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Pending,
    Open,
    Closed,
    Rejected,
}

/// Invariant (§3/§8): LONG ⇒ stop_loss < entry_price < take_profit, reverse
/// for SHORT; `rr = |tp-entry|/|entry-stop| >= 2`. At most one Trade with no
/// `exit_ts` at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub direction: Direction,
    pub status: TradeStatus,
    pub entry_price: Decimal,
    pub entry_ts: DateTime<Utc>,
    pub size_base: Decimal,
    pub size_quote: Decimal,
    pub stop_loss: Decimal,
    pub stop_source: StopSource,
    pub take_profit: Decimal,
    pub rr: Decimal,
    pub trailing_active: bool,
    pub exit_price: Option<Decimal>,
    pub exit_ts: Option<DateTime<Utc>>,
    pub outcome: Option<TradeOutcome>,
    pub pnl: Option<Decimal>,
}

impl Trade {
    pub fn is_open(&self) -> bool {
        self.exit_ts.is_none() && matches!(self.status, TradeStatus::Open)
    }

    /// `progress = (price - entry) / (tp - entry)` for LONG, mirrored for
    /// SHORT (§4.10 trailing rule).
    pub fn progress(&self, price: Decimal) -> Decimal {
        let target_distance = (self.take_profit - self.entry_price).abs();
        if target_distance.is_zero() {
            return Decimal::ZERO;
        }
        match self.direction {
            Direction::Long => (price - self.entry_price) / target_distance,
            Direction::Short => (self.entry_price - price) / target_distance,
        }
    }

    pub fn crossed_stop(&self, price: Decimal) -> bool {
        match self.direction {
            Direction::Long => price <= self.stop_loss,
            Direction::Short => price >= self.stop_loss,
        }
    }

    pub fn crossed_take_profit(&self, price: Decimal) -> bool {
        match self.direction {
            Direction::Long => price >= self.take_profit,
            Direction::Short => price <= self.take_profit,
        }
    }

    pub fn pnl_at(&self, exit_price: Decimal) -> Decimal {
        let diff = exit_price - self.entry_price;
        match self.direction {
            Direction::Long => diff * self.size_base,
            Direction::Short => -diff * self.size_base,
        }
    }
}
