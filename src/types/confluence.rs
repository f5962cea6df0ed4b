use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfluenceStateTag {
    WaitingChoch,
    WaitingFvg,
    WaitingBos,
    Complete,
    Expired,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChochRecord {
    pub ts: DateTime<Utc>,
    pub price: Decimal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FvgRecord {
    pub ts: DateTime<Utc>,
    pub lo: Decimal,
    pub hi: Decimal,
    pub fill_ts: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BosRecord {
    pub ts: DateTime<Utc>,
    pub price: Decimal,
}

/// One-to-one with a Sweep. Linear state progression only; TTL 12h (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfluenceCtx {
    pub id: i64,
    pub sweep_ref: i64,
    pub state: ConfluenceStateTag,
    pub choch: Option<ChochRecord>,
    pub fvg: Option<FvgRecord>,
    pub bos: Option<BosRecord>,
}

impl ConfluenceCtx {
    pub fn new(sweep_ref: i64) -> Self {
        Self {
            id: 0,
            sweep_ref,
            state: ConfluenceStateTag::WaitingChoch,
            choch: None,
            fvg: None,
            bos: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            ConfluenceStateTag::Complete | ConfluenceStateTag::Expired
        )
    }
}
