use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::config::runtime::OracleSettings;
use crate::types::{Bias, Direction};

/// Request payload carrying the confluence bundle (§6): bias, key prices,
/// proposed stop/tp, and the current account balance.
#[derive(Debug, Clone, Serialize)]
pub struct ConfluenceBundle {
    pub bias: Bias,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub account_balance: Decimal,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct OracleDecision {
    pub decision: OracleVerdictKind,
    pub confidence: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OracleVerdictKind {
    Yes,
    No,
}

impl OracleDecision {
    pub fn approved(&self) -> bool {
        self.decision == OracleVerdictKind::Yes
    }
}

/// Advisory oracle the engine consults before accepting a trade (§6).
/// Treated as an external collaborator: the core never models the oracle's
/// own reasoning, only its contract.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn consult(&self, bundle: ConfluenceBundle) -> anyhow::Result<OracleDecision>;
}

/// HTTP/JSON oracle client. Decisions below the configured confidence
/// threshold are treated as NO at the gatekeeper, not here — the oracle
/// only reports what it decided.
pub struct HttpOracle {
    client: reqwest::Client,
    settings: OracleSettings,
}

impl HttpOracle {
    pub fn new(settings: OracleSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_s))
            .build()
            .expect("reqwest client builds with a fixed timeout");
        Self { client, settings }
    }
}

#[derive(Serialize)]
struct OracleRequest<'a> {
    bias: &'static str,
    direction: &'static str,
    entry_price: Decimal,
    stop_loss: Decimal,
    take_profit: Decimal,
    account_balance: Decimal,
    model: &'a str,
    temperature: Decimal,
}

#[async_trait]
impl Oracle for HttpOracle {
    async fn consult(&self, bundle: ConfluenceBundle) -> anyhow::Result<OracleDecision> {
        let request = OracleRequest {
            bias: match bundle.bias {
                Bias::Bullish => "BULLISH",
                Bias::Bearish => "BEARISH",
            },
            direction: match bundle.direction {
                Direction::Long => "LONG",
                Direction::Short => "SHORT",
            },
            entry_price: bundle.entry_price,
            stop_loss: bundle.stop_loss,
            take_profit: bundle.take_profit,
            account_balance: bundle.account_balance,
            model: &self.settings.model,
            temperature: self.settings.temperature,
        };

        let resp = self
            .client
            .post(&self.settings.endpoint)
            .json(&request)
            .send()
            .await?;

        if !resp.status().is_success() {
            warn!("oracle returned {}", resp.status());
            anyhow::bail!("oracle request failed: {}", resp.status());
        }

        Ok(resp.json::<OracleDecision>().await?)
    }
}

/// Fixed-answer double for tests and the backtest driver.
pub struct FixedOracle {
    pub decision: OracleDecision,
}

impl FixedOracle {
    pub fn approve(confidence: Decimal) -> Self {
        Self { decision: OracleDecision { decision: OracleVerdictKind::Yes, confidence } }
    }

    pub fn reject() -> Self {
        Self {
            decision: OracleDecision { decision: OracleVerdictKind::No, confidence: Decimal::ZERO },
        }
    }
}

#[async_trait]
impl Oracle for FixedOracle {
    async fn consult(&self, _bundle: ConfluenceBundle) -> anyhow::Result<OracleDecision> {
        Ok(self.decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bundle() -> ConfluenceBundle {
        ConfluenceBundle {
            bias: Bias::Bullish,
            direction: Direction::Long,
            entry_price: dec!(90692),
            stop_loss: dec!(90119.40),
            take_profit: dec!(91837.20),
            account_balance: dec!(10000),
        }
    }

    #[tokio::test]
    async fn fixed_oracle_approves() {
        let oracle = FixedOracle::approve(dec!(85));
        let decision = oracle.consult(bundle()).await.unwrap();
        assert!(decision.approved());
        assert_eq!(decision.confidence, dec!(85));
    }

    #[tokio::test]
    async fn fixed_oracle_rejects() {
        let oracle = FixedOracle::reject();
        let decision = oracle.consult(bundle()).await.unwrap();
        assert!(!decision.approved());
    }
}
