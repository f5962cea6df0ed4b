use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Bias, SwingKind};

/// At most one active sweep globally (§3). Auto-expires after 24h; owned by
/// the sweep detector, deactivated by a newer sweep or by the confluence
/// state machine on COMPLETE/EXPIRED.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sweep {
    pub id: i64,
    pub ts: DateTime<Utc>,
    pub kind: SwingKind,
    pub swing_ref: i64,
    pub price: Decimal,
    pub bias: Bias,
    pub active: bool,
}

impl Sweep {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.ts > chrono::Duration::hours(24)
    }
}
