mod candles;
mod confluence;
mod config;
mod database;
mod decimal_time;
mod error;
mod exchange;
mod execution;
mod oracle;
mod orchestrator;
mod position_monitor;
mod price_feed;
mod risk;
mod sweep;
mod swings;
mod types;
mod web;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use config::RuntimeConfig;
use database::Database;
use exchange::{BinanceClient, Brokerage, SimulatedBrokerage};
use oracle::{FixedOracle, HttpOracle};
use orchestrator::Orchestrator;

/// Autonomous BTC/USDT swing-sweep-confluence trading engine.
#[derive(Parser)]
#[command(name = "btc-engine")]
#[command(author, version, about = "Autonomous BTC trading engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine against a live or paper brokerage
    Run {
        /// Port for the read-mostly operator API
        #[arg(short, long, default_value = "8090")]
        port: u16,
    },
    /// Replay historical candles through the same detection pipeline
    Backtest {
        /// Number of synthetic historical candles to seed the run with
        #[arg(short, long, default_value = "500")]
        candles: usize,
    },
    /// Print the current open position and recent performance, then exit
    Status,
    /// Validate the configuration file and exit
    ConfigCheck,
}

const EXIT_OK: i32 = 0;
const EXIT_CONFIG_INVALID: i32 = 1;
const EXIT_STORAGE_UNREACHABLE: i32 = 2;
const EXIT_BROKER_AUTH_FAILED: i32 = 3;
const EXIT_UNHANDLED_FAULT: i32 = 4;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let cfg = match config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            init_logging("info");
            error!("configuration invalid: {}", e);
            std::process::exit(EXIT_CONFIG_INVALID);
        }
    };
    init_logging(&cfg.system.log_level);

    let result = match cli.command {
        Commands::Run { port } => run(cfg, port).await,
        Commands::Backtest { candles } => backtest(cfg, candles).await,
        Commands::Status => status(cfg).await,
        Commands::ConfigCheck => {
            info!("configuration at {} is valid", cli.config);
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("fatal: {:?}", e);
        std::process::exit(EXIT_UNHANDLED_FAULT);
    }
    std::process::exit(EXIT_OK);
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

async fn open_database(cfg: &RuntimeConfig) -> anyhow::Result<Arc<Database>> {
    match Database::new(&cfg.db.path).await {
        Ok(db) => Ok(Arc::new(db)),
        Err(e) => {
            error!("storage unreachable at {}: {}", cfg.db.path, e);
            std::process::exit(EXIT_STORAGE_UNREACHABLE);
        }
    }
}

async fn run(cfg: RuntimeConfig, port: u16) -> anyhow::Result<()> {
    info!("starting engine (paper_mode={})", cfg.broker.paper_mode);
    let db = open_database(&cfg).await?;

    if cfg.broker.paper_mode {
        let broker = Arc::new(SimulatedBrokerage::new(cfg.trading.account_balance));
        let oracle = Arc::new(FixedOracle::approve(dec!(100)));
        run_with(db, broker, oracle, cfg, port).await
    } else {
        if cfg.broker.api_key.is_empty() || cfg.broker.api_secret.is_empty() {
            error!("live mode requires broker.api_key and broker.api_secret");
            std::process::exit(EXIT_BROKER_AUTH_FAILED);
        }
        let broker = Arc::new(BinanceClient::new(cfg.broker.api_key.clone(), cfg.broker.api_secret.clone()));
        if !broker.is_connected().await {
            error!("brokerage authentication failed");
            std::process::exit(EXIT_BROKER_AUTH_FAILED);
        }
        let oracle = Arc::new(HttpOracle::new(cfg.oracle.clone()));
        run_with(db, broker, oracle, cfg, port).await
    }
}

async fn run_with<B, O>(
    db: Arc<Database>,
    broker: Arc<B>,
    oracle: Arc<O>,
    cfg: RuntimeConfig,
    port: u16,
) -> anyhow::Result<()>
where
    B: exchange::Brokerage + 'static,
    O: oracle::Oracle + 'static,
{
    let orchestrator = Orchestrator::new(db, broker, oracle, cfg.trading.clone(), cfg.oracle.clone()).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let api_state = orchestrator.app_state();
    let api_task = tokio::spawn(async move {
        if let Err(e) = web::start_operator_api(api_state, port).await {
            error!("operator API error: {}", e);
        }
    });

    let ctrlc_shutdown = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal");
            let _ = ctrlc_shutdown.send(());
        }
    });

    orchestrator.run(shutdown_tx).await?;
    api_task.abort();
    info!("engine stopped cleanly");
    Ok(())
}

async fn backtest(cfg: RuntimeConfig, candle_count: usize) -> anyhow::Result<()> {
    info!("replaying {} historical candles through the detection pipeline", candle_count);
    let db = open_database(&cfg).await?;
    let broker = Arc::new(SimulatedBrokerage::new(cfg.trading.account_balance));
    let oracle = Arc::new(FixedOracle::approve(dec!(100)));

    let store = candles::CandleStore::new(db.clone());
    for timeframe in [types::TimeFrame::FourHour, types::TimeFrame::FiveMinute] {
        for candle in synthetic_candles(timeframe, cfg.trading.account_balance, candle_count) {
            broker.push_candle(candle.clone()).await;
            if let Err(e) = store.upsert(&candle).await {
                warn!("failed to persist backtest candle: {}", e);
            }
        }
    }

    let orchestrator = Orchestrator::new(db.clone(), broker, oracle, cfg.trading.clone(), cfg.oracle.clone()).await?;
    for timeframe in [types::TimeFrame::FourHour, types::TimeFrame::FiveMinute] {
        orchestrator.replay(timeframe).await?;
    }

    let trades = db.recent_trades(1000).await?;
    info!("backtest complete: {} trades recorded", trades.len());
    Ok(())
}

/// Deterministic sawtooth walk seeded off the configured account balance's
/// order of magnitude; exercises the swing/sweep/confluence pipeline without
/// pulling in a historical-data dependency.
fn synthetic_candles(timeframe: types::TimeFrame, seed: rust_decimal::Decimal, count: usize) -> Vec<types::Candle> {
    let step = timeframe.duration();
    let mut ts = decimal_time::align_to_boundary(chrono::Utc::now(), timeframe);
    for _ in 0..count {
        ts = ts - step;
    }
    let base = dec!(60000) + (seed % dec!(1000));
    let mut candles = Vec::with_capacity(count);
    let mut price = base;

    for i in 0..count {
        let swing = dec!(50) * Decimal::from(((i % 20) as i64) - 10);
        let open = price;
        let close = base + swing;
        let high = open.max(close) + dec!(10);
        let low = open.min(close) - dec!(10);
        candles.push(types::Candle {
            timeframe,
            ts_start: ts,
            open,
            high,
            low,
            close,
            volume: dec!(1),
        });
        price = close;
        ts = ts + step;
    }
    candles
}

async fn status(cfg: RuntimeConfig) -> anyhow::Result<()> {
    let db = open_database(&cfg).await?;
    match db.open_trade().await? {
        Some(trade) => {
            println!("open position: {:?} entered at {} ({})", trade.direction, trade.entry_price, trade.entry_ts);
        }
        None => println!("no open position"),
    }

    let trades = db.recent_trades(20).await?;
    let closed = trades.iter().filter(|t| t.outcome.is_some()).count();
    println!("{} of the last {} trades are closed", closed, trades.len());
    Ok(())
}
