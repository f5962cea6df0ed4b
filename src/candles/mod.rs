pub mod collector;
pub mod store;

pub use collector::{default_poll_interval, CandleCollector};
pub use store::CandleStore;
