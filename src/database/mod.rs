use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::info;

use crate::types::{
    Bias, ChochRecord, ConfluenceCtx, ConfluenceStateTag, Direction, FvgRecord, BosRecord,
    RiskState, Side, StopSource, Swing, SwingKind, SystemConfig, TimeFrame, Trade, TradeOutcome,
    TradeStatus,
};

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(db_path: &str) -> Result<Self> {
        info!("Initializing SQLite database at: {}", db_path);

        let options = SqliteConnectOptions::from_str(db_path)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.create_schema().await?;

        info!("Database initialized successfully");
        Ok(db)
    }

    async fn create_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS candles (
                timeframe TEXT NOT NULL,
                ts_start TEXT NOT NULL,
                open TEXT NOT NULL,
                high TEXT NOT NULL,
                low TEXT NOT NULL,
                close TEXT NOT NULL,
                volume TEXT NOT NULL,
                PRIMARY KEY (timeframe, ts_start)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_candles_ts ON candles(timeframe, ts_start DESC)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS swings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timeframe TEXT NOT NULL,
                ts TEXT NOT NULL,
                kind TEXT NOT NULL,
                price TEXT NOT NULL,
                active INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_swings_active ON swings(timeframe, kind, active, ts DESC)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sweeps (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts TEXT NOT NULL,
                kind TEXT NOT NULL,
                swing_ref INTEGER NOT NULL,
                price TEXT NOT NULL,
                bias TEXT NOT NULL,
                active INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Partial-unique invariant: at most one active sweep. SQLite supports
        // partial indexes directly.
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_sweeps_one_active ON sweeps(active) WHERE active = 1",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS confluence_ctx (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sweep_ref INTEGER NOT NULL,
                state TEXT NOT NULL,
                choch_ts TEXT,
                choch_price TEXT,
                fvg_ts TEXT,
                fvg_lo TEXT,
                fvg_hi TEXT,
                fvg_fill_ts TEXT,
                bos_ts TEXT,
                bos_price TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_confluence_sweep ON confluence_ctx(sweep_ref)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id TEXT PRIMARY KEY,
                direction TEXT NOT NULL,
                status TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                entry_ts TEXT NOT NULL,
                size_base TEXT NOT NULL,
                size_quote TEXT NOT NULL,
                stop_loss TEXT NOT NULL,
                stop_source TEXT NOT NULL,
                take_profit TEXT NOT NULL,
                rr TEXT NOT NULL,
                trailing_active INTEGER NOT NULL,
                exit_price TEXT,
                exit_ts TEXT,
                outcome TEXT,
                pnl TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Partial-unique invariant: at most one open trade (exit_ts IS NULL).
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_trades_one_open ON trades((exit_ts IS NULL)) WHERE exit_ts IS NULL",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS risk_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                consecutive_losses INTEGER NOT NULL,
                day_pl TEXT NOT NULL,
                day_start_ts TEXT NOT NULL,
                paused_until TEXT,
                reason TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS system_config (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                emergency_stop INTEGER NOT NULL,
                trading_enabled INTEGER NOT NULL,
                account_balance TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // --- candles -----------------------------------------------------

    pub async fn upsert_candle(&self, c: &crate::types::Candle) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO candles (timeframe, ts_start, open, high, low, close, volume)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(timeframe, ts_start) DO NOTHING
            "#,
        )
        .bind(c.timeframe.as_str())
        .bind(c.ts_start.to_rfc3339())
        .bind(c.open.to_string())
        .bind(c.high.to_string())
        .bind(c.low.to_string())
        .bind(c.close.to_string())
        .bind(c.volume.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn latest_candle_ts(&self, timeframe: TimeFrame) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "SELECT ts_start FROM candles WHERE timeframe = ? ORDER BY ts_start DESC LIMIT 1",
        )
        .bind(timeframe.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(r) => Some(DateTime::parse_from_rfc3339(r.get("ts_start"))?.with_timezone(&Utc)),
            None => None,
        })
    }

    pub async fn recent_candles(
        &self,
        timeframe: TimeFrame,
        limit: i64,
    ) -> Result<Vec<crate::types::Candle>> {
        let rows = sqlx::query(
            "SELECT * FROM candles WHERE timeframe = ? ORDER BY ts_start DESC LIMIT ?",
        )
        .bind(timeframe.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut candles: Vec<crate::types::Candle> = rows
            .into_iter()
            .map(|row| -> Result<crate::types::Candle> {
                Ok(crate::types::Candle {
                    timeframe,
                    ts_start: DateTime::parse_from_rfc3339(row.get("ts_start"))?.with_timezone(&Utc),
                    open: Decimal::from_str(row.get("open"))?,
                    high: Decimal::from_str(row.get("high"))?,
                    low: Decimal::from_str(row.get("low"))?,
                    close: Decimal::from_str(row.get("close"))?,
                    volume: Decimal::from_str(row.get("volume"))?,
                })
            })
            .collect::<Result<_>>()?;
        candles.reverse();
        Ok(candles)
    }

    /// 5M store prunes candles older than 7 days (§4.1).
    pub async fn prune_old_candles(&self, before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM candles WHERE timeframe = '5m' AND ts_start < ?")
            .bind(before.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // --- swings --------------------------------------------------------

    pub async fn active_swing(&self, timeframe: TimeFrame, kind: SwingKind) -> Result<Option<Swing>> {
        let row = sqlx::query(
            "SELECT * FROM swings WHERE timeframe = ? AND kind = ? AND active = 1 ORDER BY ts DESC LIMIT 1",
        )
        .bind(timeframe.as_str())
        .bind(kind_str(kind))
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_swing).transpose()
    }

    /// Deactivates the current active swing of (timeframe, kind) and inserts
    /// the new one as active, as a single atomic unit (§4.3).
    pub async fn replace_active_swing(
        &self,
        timeframe: TimeFrame,
        kind: SwingKind,
        ts: DateTime<Utc>,
        price: Decimal,
    ) -> Result<Swing> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE swings SET active = 0 WHERE timeframe = ? AND kind = ? AND active = 1")
            .bind(timeframe.as_str())
            .bind(kind_str(kind))
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            "INSERT INTO swings (timeframe, ts, kind, price, active) VALUES (?, ?, ?, ?, 1)",
        )
        .bind(timeframe.as_str())
        .bind(ts.to_rfc3339())
        .bind(kind_str(kind))
        .bind(price.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Swing {
            id: result.last_insert_rowid(),
            timeframe,
            ts,
            kind,
            price,
            active: true,
        })
    }

    // --- sweeps ----------------------------------------------------------

    pub async fn active_sweep(&self) -> Result<Option<crate::types::Sweep>> {
        let row = sqlx::query("SELECT * FROM sweeps WHERE active = 1 LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_sweep).transpose()
    }

    pub async fn deactivate_sweep(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE sweeps SET active = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_sweep(
        &self,
        ts: DateTime<Utc>,
        kind: SwingKind,
        swing_ref: i64,
        price: Decimal,
        bias: Bias,
    ) -> Result<crate::types::Sweep> {
        let result = sqlx::query(
            "INSERT INTO sweeps (ts, kind, swing_ref, price, bias, active) VALUES (?, ?, ?, ?, ?, 1)",
        )
        .bind(ts.to_rfc3339())
        .bind(kind_str(kind))
        .bind(swing_ref)
        .bind(price.to_string())
        .bind(bias_str(bias))
        .execute(&self.pool)
        .await?;

        Ok(crate::types::Sweep {
            id: result.last_insert_rowid(),
            ts,
            kind,
            swing_ref,
            price,
            bias,
            active: true,
        })
    }

    // --- confluence --------------------------------------------------------

    pub async fn insert_confluence(&self, ctx: &ConfluenceCtx) -> Result<i64> {
        let result = sqlx::query("INSERT INTO confluence_ctx (sweep_ref, state) VALUES (?, ?)")
            .bind(ctx.sweep_ref)
            .bind(state_str(ctx.state))
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn update_confluence(&self, id: i64, ctx: &ConfluenceCtx) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE confluence_ctx SET
                state = ?, choch_ts = ?, choch_price = ?,
                fvg_ts = ?, fvg_lo = ?, fvg_hi = ?, fvg_fill_ts = ?,
                bos_ts = ?, bos_price = ?
            WHERE id = ?
            "#,
        )
        .bind(state_str(ctx.state))
        .bind(ctx.choch.map(|c| c.ts.to_rfc3339()))
        .bind(ctx.choch.map(|c| c.price.to_string()))
        .bind(ctx.fvg.map(|f| f.ts.to_rfc3339()))
        .bind(ctx.fvg.map(|f| f.lo.to_string()))
        .bind(ctx.fvg.map(|f| f.hi.to_string()))
        .bind(ctx.fvg.and_then(|f| f.fill_ts).map(|t| t.to_rfc3339()))
        .bind(ctx.bos.map(|b| b.ts.to_rfc3339()))
        .bind(ctx.bos.map(|b| b.price.to_string()))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn confluence_for_sweep(&self, sweep_ref: i64) -> Result<Option<ConfluenceCtx>> {
        let row = sqlx::query("SELECT * FROM confluence_ctx WHERE sweep_ref = ? ORDER BY id DESC LIMIT 1")
            .bind(sweep_ref)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_confluence).transpose()
    }

    // --- trades --------------------------------------------------------

    pub async fn open_trade(&self) -> Result<Option<Trade>> {
        let row = sqlx::query("SELECT * FROM trades WHERE exit_ts IS NULL LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_trade).transpose()
    }

    pub async fn insert_trade(&self, trade: &Trade) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trades (
                id, direction, status, entry_price, entry_ts, size_base, size_quote,
                stop_loss, stop_source, take_profit, rr, trailing_active,
                exit_price, exit_ts, outcome, pnl
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&trade.id)
        .bind(direction_str(trade.direction))
        .bind(status_str(trade.status))
        .bind(trade.entry_price.to_string())
        .bind(trade.entry_ts.to_rfc3339())
        .bind(trade.size_base.to_string())
        .bind(trade.size_quote.to_string())
        .bind(trade.stop_loss.to_string())
        .bind(stop_source_str(trade.stop_source))
        .bind(trade.take_profit.to_string())
        .bind(trade.rr.to_string())
        .bind(trade.trailing_active as i64)
        .bind(trade.exit_price.map(|p| p.to_string()))
        .bind(trade.exit_ts.map(|t| t.to_rfc3339()))
        .bind(trade.outcome.map(outcome_str))
        .bind(trade.pnl.map(|p| p.to_string()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_trade(&self, trade: &Trade) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE trades SET
                status = ?, stop_loss = ?, trailing_active = ?,
                exit_price = ?, exit_ts = ?, outcome = ?, pnl = ?
            WHERE id = ?
            "#,
        )
        .bind(status_str(trade.status))
        .bind(trade.stop_loss.to_string())
        .bind(trade.trailing_active as i64)
        .bind(trade.exit_price.map(|p| p.to_string()))
        .bind(trade.exit_ts.map(|t| t.to_rfc3339()))
        .bind(trade.outcome.map(outcome_str))
        .bind(trade.pnl.map(|p| p.to_string()))
        .bind(&trade.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn recent_trades(&self, limit: i64) -> Result<Vec<Trade>> {
        let rows = sqlx::query("SELECT * FROM trades ORDER BY entry_ts DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_trade).collect()
    }

    // --- risk state / system config --------------------------------------

    pub async fn load_risk_state(&self) -> Result<RiskState> {
        let row = sqlx::query("SELECT * FROM risk_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(r) => RiskState {
                consecutive_losses: r.get::<i64, _>("consecutive_losses") as u32,
                day_pl: Decimal::from_str(r.get("day_pl"))?,
                day_start_ts: NaiveDate::parse_from_str(r.get("day_start_ts"), "%Y-%m-%d")?,
                paused_until: r
                    .get::<Option<String>, _>("paused_until")
                    .map(|s| DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&Utc)))
                    .transpose()?,
                reason: r.get("reason"),
            },
            None => RiskState::new(Utc::now()),
        })
    }

    pub async fn save_risk_state(&self, state: &RiskState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO risk_state (id, consecutive_losses, day_pl, day_start_ts, paused_until, reason)
            VALUES (1, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                consecutive_losses = excluded.consecutive_losses,
                day_pl = excluded.day_pl,
                day_start_ts = excluded.day_start_ts,
                paused_until = excluded.paused_until,
                reason = excluded.reason
            "#,
        )
        .bind(state.consecutive_losses as i64)
        .bind(state.day_pl.to_string())
        .bind(state.day_start_ts.format("%Y-%m-%d").to_string())
        .bind(state.paused_until.map(|t| t.to_rfc3339()))
        .bind(&state.reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_system_config(&self) -> Result<SystemConfig> {
        let row = sqlx::query("SELECT * FROM system_config WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(r) => SystemConfig {
                emergency_stop: r.get::<i64, _>("emergency_stop") != 0,
                trading_enabled: r.get::<i64, _>("trading_enabled") != 0,
                account_balance: Decimal::from_str(r.get("account_balance"))?,
            },
            None => SystemConfig::default(),
        })
    }

    pub async fn save_system_config(&self, cfg: &SystemConfig) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO system_config (id, emergency_stop, trading_enabled, account_balance)
            VALUES (1, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                emergency_stop = excluded.emergency_stop,
                trading_enabled = excluded.trading_enabled,
                account_balance = excluded.account_balance
            "#,
        )
        .bind(cfg.emergency_stop as i64)
        .bind(cfg.trading_enabled as i64)
        .bind(cfg.account_balance.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn kind_str(kind: SwingKind) -> &'static str {
    match kind {
        SwingKind::High => "HIGH",
        SwingKind::Low => "LOW",
    }
}

fn parse_kind(s: &str) -> Result<SwingKind> {
    match s {
        "HIGH" => Ok(SwingKind::High),
        "LOW" => Ok(SwingKind::Low),
        other => Err(anyhow::anyhow!("invalid swing kind: {}", other)),
    }
}

fn bias_str(bias: Bias) -> &'static str {
    match bias {
        Bias::Bullish => "BULLISH",
        Bias::Bearish => "BEARISH",
    }
}

fn parse_bias(s: &str) -> Result<Bias> {
    match s {
        "BULLISH" => Ok(Bias::Bullish),
        "BEARISH" => Ok(Bias::Bearish),
        other => Err(anyhow::anyhow!("invalid bias: {}", other)),
    }
}

fn state_str(state: ConfluenceStateTag) -> &'static str {
    match state {
        ConfluenceStateTag::WaitingChoch => "WAITING_CHOCH",
        ConfluenceStateTag::WaitingFvg => "WAITING_FVG",
        ConfluenceStateTag::WaitingBos => "WAITING_BOS",
        ConfluenceStateTag::Complete => "COMPLETE",
        ConfluenceStateTag::Expired => "EXPIRED",
    }
}

fn parse_state(s: &str) -> Result<ConfluenceStateTag> {
    Ok(match s {
        "WAITING_CHOCH" => ConfluenceStateTag::WaitingChoch,
        "WAITING_FVG" => ConfluenceStateTag::WaitingFvg,
        "WAITING_BOS" => ConfluenceStateTag::WaitingBos,
        "COMPLETE" => ConfluenceStateTag::Complete,
        "EXPIRED" => ConfluenceStateTag::Expired,
        other => return Err(anyhow::anyhow!("invalid confluence state: {}", other)),
    })
}

fn direction_str(d: Direction) -> &'static str {
    match d {
        Direction::Long => "LONG",
        Direction::Short => "SHORT",
    }
}

fn parse_direction(s: &str) -> Result<Direction> {
    match s {
        "LONG" => Ok(Direction::Long),
        "SHORT" => Ok(Direction::Short),
        other => Err(anyhow::anyhow!("invalid direction: {}", other)),
    }
}

fn status_str(s: TradeStatus) -> &'static str {
    match s {
        TradeStatus::Pending => "PENDING",
        TradeStatus::Open => "OPEN",
        TradeStatus::Closed => "CLOSED",
        TradeStatus::Rejected => "REJECTED",
    }
}

fn parse_status(s: &str) -> Result<TradeStatus> {
    Ok(match s {
        "PENDING" => TradeStatus::Pending,
        "OPEN" => TradeStatus::Open,
        "CLOSED" => TradeStatus::Closed,
        "REJECTED" => TradeStatus::Rejected,
        other => return Err(anyhow::anyhow!("invalid trade status: {}", other)),
    })
}

fn stop_source_str(s: StopSource) -> &'static str {
    match s {
        StopSource::FiveMinuteSwing => "5M_SWING",
        StopSource::FourHourSwing => "4H_SWING",
    }
}

fn parse_stop_source(s: &str) -> Result<StopSource> {
    match s {
        "5M_SWING" => Ok(StopSource::FiveMinuteSwing),
        "4H_SWING" => Ok(StopSource::FourHourSwing),
        other => Err(anyhow::anyhow!("invalid stop source: {}", other)),
    }
}

fn outcome_str(o: TradeOutcome) -> &'static str {
    match o {
        TradeOutcome::Win => "WIN",
        TradeOutcome::Loss => "LOSS",
        TradeOutcome::Breakeven => "BREAKEVEN",
    }
}

fn parse_outcome(s: &str) -> Result<TradeOutcome> {
    match s {
        "WIN" => Ok(TradeOutcome::Win),
        "LOSS" => Ok(TradeOutcome::Loss),
        "BREAKEVEN" => Ok(TradeOutcome::Breakeven),
        other => Err(anyhow::anyhow!("invalid outcome: {}", other)),
    }
}

fn row_to_swing(row: sqlx::sqlite::SqliteRow) -> Result<Swing> {
    Ok(Swing {
        id: row.get("id"),
        timeframe: crate::types::TimeFrame::from_str(row.get("timeframe"))
            .ok_or_else(|| anyhow::anyhow!("invalid timeframe"))?,
        ts: DateTime::parse_from_rfc3339(row.get("ts"))?.with_timezone(&Utc),
        kind: parse_kind(row.get("kind"))?,
        price: Decimal::from_str(row.get("price"))?,
        active: row.get::<i64, _>("active") != 0,
    })
}

fn row_to_sweep(row: sqlx::sqlite::SqliteRow) -> Result<crate::types::Sweep> {
    Ok(crate::types::Sweep {
        id: row.get("id"),
        ts: DateTime::parse_from_rfc3339(row.get("ts"))?.with_timezone(&Utc),
        kind: parse_kind(row.get("kind"))?,
        swing_ref: row.get("swing_ref"),
        price: Decimal::from_str(row.get("price"))?,
        bias: parse_bias(row.get("bias"))?,
        active: row.get::<i64, _>("active") != 0,
    })
}

fn row_to_confluence(row: sqlx::sqlite::SqliteRow) -> Result<ConfluenceCtx> {
    let choch = match (
        row.get::<Option<String>, _>("choch_ts"),
        row.get::<Option<String>, _>("choch_price"),
    ) {
        (Some(ts), Some(price)) => Some(ChochRecord {
            ts: DateTime::parse_from_rfc3339(&ts)?.with_timezone(&Utc),
            price: Decimal::from_str(&price)?,
        }),
        _ => None,
    };

    let fvg = match (
        row.get::<Option<String>, _>("fvg_ts"),
        row.get::<Option<String>, _>("fvg_lo"),
        row.get::<Option<String>, _>("fvg_hi"),
    ) {
        (Some(ts), Some(lo), Some(hi)) => Some(FvgRecord {
            ts: DateTime::parse_from_rfc3339(&ts)?.with_timezone(&Utc),
            lo: Decimal::from_str(&lo)?,
            hi: Decimal::from_str(&hi)?,
            fill_ts: row
                .get::<Option<String>, _>("fvg_fill_ts")
                .map(|s| DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&Utc)))
                .transpose()?,
        }),
        _ => None,
    };

    let bos = match (
        row.get::<Option<String>, _>("bos_ts"),
        row.get::<Option<String>, _>("bos_price"),
    ) {
        (Some(ts), Some(price)) => Some(BosRecord {
            ts: DateTime::parse_from_rfc3339(&ts)?.with_timezone(&Utc),
            price: Decimal::from_str(&price)?,
        }),
        _ => None,
    };

    Ok(ConfluenceCtx {
        id: row.get("id"),
        sweep_ref: row.get("sweep_ref"),
        state: parse_state(row.get("state"))?,
        choch,
        fvg,
        bos,
    })
}

fn row_to_trade(row: sqlx::sqlite::SqliteRow) -> Result<Trade> {
    Ok(Trade {
        id: row.get("id"),
        direction: parse_direction(row.get("direction"))?,
        status: parse_status(row.get("status"))?,
        entry_price: Decimal::from_str(row.get("entry_price"))?,
        entry_ts: DateTime::parse_from_rfc3339(row.get("entry_ts"))?.with_timezone(&Utc),
        size_base: Decimal::from_str(row.get("size_base"))?,
        size_quote: Decimal::from_str(row.get("size_quote"))?,
        stop_loss: Decimal::from_str(row.get("stop_loss"))?,
        stop_source: parse_stop_source(row.get("stop_source"))?,
        take_profit: Decimal::from_str(row.get("take_profit"))?,
        rr: Decimal::from_str(row.get("rr"))?,
        trailing_active: row.get::<i64, _>("trailing_active") != 0,
        exit_price: row
            .get::<Option<String>, _>("exit_price")
            .map(|s| Decimal::from_str(&s))
            .transpose()?,
        exit_ts: row
            .get::<Option<String>, _>("exit_ts")
            .map(|s| DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&Utc)))
            .transpose()?,
        outcome: row
            .get::<Option<String>, _>("outcome")
            .map(|s| parse_outcome(&s))
            .transpose()?,
        pnl: row
            .get::<Option<String>, _>("pnl")
            .map(|s| Decimal::from_str(&s))
            .transpose()?,
    })
}

// Side is re-exported for callers constructing orders from a trade direction.
pub fn side_for(direction: Direction) -> Side {
    direction.side_for_entry()
}
