pub mod gatekeeper;
pub mod sizer;
pub mod stop_loss;

pub use gatekeeper::{OracleVerdict, RiskGatekeeper};
pub use sizer::PositionSizer;
pub use stop_loss::StopLossCalculator;
