pub mod runtime;

pub use runtime::*;

use anyhow::{Context, Result};

/// Layered load: built-in defaults -> `config.toml` (if present) -> `BOT_`
/// prefixed environment overrides. Mirrors the teacher's `config` crate
/// usage; failing to parse is `ConfigInvalid`, fatal at startup (§6/§7).
pub fn load(config_path: &str) -> Result<RuntimeConfig> {
    let defaults = RuntimeConfig::default();
    let builder = config::Config::builder()
        .add_source(config::Config::try_from(&defaults)?)
        .add_source(config::File::with_name(config_path).required(false))
        .add_source(config::Environment::with_prefix("BOT").separator("__"));

    let cfg: RuntimeConfig = builder
        .build()
        .context("failed to build configuration")?
        .try_deserialize()
        .context("failed to deserialize configuration")?;

    cfg.validate().map_err(|errors| anyhow::anyhow!(errors.join(", ")))?;
    Ok(cfg)
}
