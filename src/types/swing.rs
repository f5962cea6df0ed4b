use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{SwingKind, TimeFrame};

/// At most one active swing per (timeframe, kind); see §3. `active` flips
/// false when a newer swing of the same (timeframe, kind) is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Swing {
    pub id: i64,
    pub timeframe: TimeFrame,
    pub ts: DateTime<Utc>,
    pub kind: SwingKind,
    pub price: Decimal,
    pub active: bool,
}
