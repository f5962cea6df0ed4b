use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Layered configuration surface per §6: `db.*`, `broker.*`, `trading.*`,
/// `oracle.*`, `system.*`. Loaded by `config::Config` (defaults →
/// `config.toml` → `BOT_`-prefixed env) and validated before use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub db: DbSettings,
    pub broker: BrokerSettings,
    pub trading: TradingSettings,
    pub oracle: OracleSettings,
    pub system: SystemSettings,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            db: DbSettings::default(),
            broker: BrokerSettings::default(),
            trading: TradingSettings::default(),
            oracle: OracleSettings::default(),
            system: SystemSettings::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let t = &self.trading;

        if t.account_balance < dec!(100) {
            errors.push("trading.account_balance must be >= 100".to_string());
        }
        if t.risk_per_trade <= Decimal::ZERO || t.risk_per_trade > dec!(0.10) {
            errors.push("trading.risk_per_trade must be between 0 and 0.10".to_string());
        }
        if t.daily_loss_limit <= Decimal::ZERO || t.daily_loss_limit > dec!(1) {
            errors.push("trading.daily_loss_limit must be between 0 and 1".to_string());
        }
        if t.consecutive_loss_limit == 0 {
            errors.push("trading.consecutive_loss_limit must be > 0".to_string());
        }
        if t.min_balance < dec!(100) {
            errors.push("trading.min_balance must be >= 100".to_string());
        }
        if t.max_trade_duration_hours == 0 {
            errors.push("trading.max_trade_duration_hours must be > 0".to_string());
        }
        if t.min_stop_distance_pct <= Decimal::ZERO || t.min_stop_distance_pct >= t.max_stop_distance_pct {
            errors.push("trading.min_stop_distance_pct must be > 0 and < max_stop_distance_pct".to_string());
        }
        if t.min_risk_reward < dec!(1) {
            errors.push("trading.min_risk_reward must be >= 1".to_string());
        }
        if t.trailing_trigger_pct <= Decimal::ZERO || t.trailing_trigger_pct > dec!(1) {
            errors.push("trading.trailing_trigger_pct must be between 0 and 1".to_string());
        }

        let o = &self.oracle;
        if o.endpoint.is_empty() {
            errors.push("oracle.endpoint must not be empty".to_string());
        }
        if o.confidence_threshold > dec!(100) || o.confidence_threshold < Decimal::ZERO {
            errors.push("oracle.confidence_threshold must be between 0 and 100".to_string());
        }
        if o.timeout_s == 0 {
            errors.push("oracle.timeout_s must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbSettings {
    pub path: String,
}

impl Default for DbSettings {
    fn default() -> Self {
        Self {
            path: "sqlite://btc_engine.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerSettings {
    pub api_key: String,
    pub api_secret: String,
    pub paper_mode: bool,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            paper_mode: true,
        }
    }
}

/// Thresholds named in spec.md §4/§8/§9. All are configuration, not
/// hardcoded constants, so the property suite exercises the configured
/// values directly (see DESIGN.md open-question decision).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingSettings {
    pub account_balance: Decimal,
    pub risk_per_trade: Decimal,
    pub daily_loss_limit: Decimal,
    pub consecutive_loss_limit: u32,
    pub min_balance: Decimal,
    pub max_trade_duration_hours: i64,
    pub leverage: Decimal,

    pub sweep_ratio: Decimal,
    pub choch_ratio: Decimal,
    pub fvg_min_gap_pct: Decimal,
    pub bos_ratio: Decimal,
    pub long_sl_buffer: Decimal,
    pub short_sl_buffer: Decimal,
    pub min_stop_distance_pct: Decimal,
    pub max_stop_distance_pct: Decimal,
    pub min_risk_reward: Decimal,
    pub max_risk_reward: Decimal,
    pub trailing_trigger_pct: Decimal,
    pub confluence_ttl_hours: i64,
    pub sweep_ttl_hours: i64,
}

impl Default for TradingSettings {
    fn default() -> Self {
        Self {
            account_balance: dec!(10000),
            risk_per_trade: dec!(0.01),
            daily_loss_limit: dec!(0.03),
            consecutive_loss_limit: 3,
            min_balance: dec!(100),
            max_trade_duration_hours: 72,
            leverage: dec!(1),

            sweep_ratio: dec!(0.001),
            choch_ratio: dec!(0.001),
            fvg_min_gap_pct: dec!(0.001),
            bos_ratio: dec!(0.001),
            long_sl_buffer: dec!(0.002),
            short_sl_buffer: dec!(0.003),
            min_stop_distance_pct: dec!(0.5),
            max_stop_distance_pct: dec!(3.0),
            min_risk_reward: dec!(2.0),
            max_risk_reward: dec!(5.0),
            trailing_trigger_pct: dec!(0.8),
            confluence_ttl_hours: 12,
            sweep_ttl_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleSettings {
    pub endpoint: String,
    pub model: String,
    pub temperature: Decimal,
    pub timeout_s: u64,
    pub confidence_threshold: Decimal,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8088/consult".to_string(),
            model: "default".to_string(),
            temperature: dec!(0.3),
            timeout_s: 30,
            confidence_threshold: dec!(70),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSettings {
    pub log_level: String,
    pub emergency_stop: bool,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            emergency_stop: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(RuntimeConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_balance_below_minimum() {
        let mut cfg = RuntimeConfig::default();
        cfg.trading.account_balance = dec!(50);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_inverted_stop_distance_bounds() {
        let mut cfg = RuntimeConfig::default();
        cfg.trading.min_stop_distance_pct = dec!(5);
        cfg.trading.max_stop_distance_pct = dec!(3);
        assert!(cfg.validate().is_err());
    }
}
