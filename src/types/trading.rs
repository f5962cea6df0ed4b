#![allow(dead_code)]
use serde::{Deserialize, Serialize};
use std::fmt;

/// The single instrument this engine trades. Kept as a constant rather than
/// an enum of pairs: portfolio management beyond BTC is out of scope.
pub const SYMBOL: &str = "BTCUSDT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Only the two timeframes the core pipeline consumes are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeFrame {
    FourHour,
    FiveMinute,
}

impl TimeFrame {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFrame::FourHour => "4h",
            TimeFrame::FiveMinute => "5m",
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        match self {
            TimeFrame::FourHour => chrono::Duration::hours(4),
            TimeFrame::FiveMinute => chrono::Duration::minutes(5),
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "4h" => Some(TimeFrame::FourHour),
            "5m" => Some(TimeFrame::FiveMinute),
            _ => None,
        }
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Brokerage-facing candle granularity. Broader than `TimeFrame` because
/// `fetch_candles` must express it; only FourHour/FiveMinute ever reach the
/// candle store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Granularity {
    OneMinute,
    FiveMinute,
    OneHour,
    FourHour,
    OneDay,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::OneMinute => "1m",
            Granularity::FiveMinute => "5m",
            Granularity::OneHour => "1h",
            Granularity::FourHour => "4h",
            Granularity::OneDay => "1d",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn side_for_entry(&self) -> Side {
        match self {
            Direction::Long => Side::Buy,
            Direction::Short => Side::Sell,
        }
    }

    pub fn side_for_exit(&self) -> Side {
        self.side_for_entry().opposite()
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Directional permission produced by the sweep detector: BULLISH ⇒ LONG
/// only, BEARISH ⇒ SHORT only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bias {
    Bullish,
    Bearish,
}

impl Bias {
    pub fn direction(&self) -> Direction {
        match self {
            Bias::Bullish => Direction::Long,
            Bias::Bearish => Direction::Short,
        }
    }

    pub fn from_swing_kind(kind: SwingKind) -> Self {
        match kind {
            SwingKind::Low => Bias::Bullish,
            SwingKind::High => Bias::Bearish,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwingKind {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopSource {
    FiveMinuteSwing,
    FourHourSwing,
}

impl fmt::Display for StopSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopSource::FiveMinuteSwing => write!(f, "5M_SWING"),
            StopSource::FourHourSwing => write!(f, "4H_SWING"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeOutcome {
    Win,
    Loss,
    Breakeven,
}
