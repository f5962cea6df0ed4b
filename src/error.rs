use thiserror::Error;

/// Conceptual error kinds of §7. `RiskViolation` is deliberately absent:
/// the gatekeeper returns `RejectReason` as data, never as an `Err`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("transient I/O: {0}")]
    TransientIo(String),

    #[error("data integrity violation: {0}")]
    DataIntegrity(String),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("order execution failed: {0}")]
    ExecutionFailure(String),

    #[error("emergency stop engaged")]
    EmergencyStop,
}

/// Structured reason codes for a gatekeeper REJECT (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RejectReason {
    PositionLimit,
    DailyLoss,
    ConsecutiveLosses,
    MinBalance,
    StopTooClose,
    StopTooFar,
    StopWrongSide,
    RrTooLow,
    RrTooHigh,
    NoValidStop,
    OracleNo,
    OracleLowConfidence,
    BrokerDown,
    Paused,
    EmergencyStop,
    TradingDisabled,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RejectReason::PositionLimit => "POSITION_LIMIT",
            RejectReason::DailyLoss => "DAILY_LOSS",
            RejectReason::ConsecutiveLosses => "CONSECUTIVE_LOSSES",
            RejectReason::MinBalance => "MIN_BALANCE",
            RejectReason::StopTooClose => "STOP_TOO_CLOSE",
            RejectReason::StopTooFar => "STOP_TOO_FAR",
            RejectReason::StopWrongSide => "STOP_WRONG_SIDE",
            RejectReason::RrTooLow => "RR_TOO_LOW",
            RejectReason::RrTooHigh => "RR_TOO_HIGH",
            RejectReason::NoValidStop => "NO_VALID_STOP",
            RejectReason::OracleNo => "ORACLE_NO",
            RejectReason::OracleLowConfidence => "ORACLE_LOW_CONFIDENCE",
            RejectReason::BrokerDown => "BROKER_DOWN",
            RejectReason::Paused => "PAUSED",
            RejectReason::EmergencyStop => "EMERGENCY_STOP",
            RejectReason::TradingDisabled => "TRADING_DISABLED",
        };
        write!(f, "{}", s)
    }
}

/// Exponential backoff for TransientIo per §4.1 (base 60s, max 2 retries).
pub async fn retry_with_backoff<T, F, Fut>(mut op: F) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<T>>,
{
    const MAX_RETRIES: u32 = 2;
    const BASE_SECS: u64 = 60;

    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < MAX_RETRIES => {
                attempt += 1;
                let backoff = BASE_SECS * 2u64.pow(attempt - 1);
                tracing::warn!(
                    "transient failure (attempt {}/{}), retrying in {}s: {}",
                    attempt,
                    MAX_RETRIES,
                    backoff,
                    e
                );
                tokio::time::sleep(std::time::Duration::from_secs(backoff)).await;
            }
            Err(e) => return Err(e),
        }
    }
}
