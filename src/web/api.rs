use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::types::{SwingKind, TimeFrame};

use super::AppState;

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let open = state.db.open_trade().await.ok().flatten();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "has_open_trade": open.is_some(),
    }))
}

pub async fn get_positions(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.open_trade().await {
        Ok(trade) => Json(json!({ "open": trade })).into_response(),
        Err(e) => {
            warn!("failed to load open trade: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

#[derive(Serialize)]
struct SwingsResponse {
    four_hour_high: Option<crate::types::Swing>,
    four_hour_low: Option<crate::types::Swing>,
    five_minute_high: Option<crate::types::Swing>,
    five_minute_low: Option<crate::types::Swing>,
}

pub async fn get_swings(State(state): State<AppState>) -> impl IntoResponse {
    let db = &state.db;
    let result = async {
        Ok::<_, anyhow::Error>(SwingsResponse {
            four_hour_high: db.active_swing(TimeFrame::FourHour, SwingKind::High).await?,
            four_hour_low: db.active_swing(TimeFrame::FourHour, SwingKind::Low).await?,
            five_minute_high: db.active_swing(TimeFrame::FiveMinute, SwingKind::High).await?,
            five_minute_low: db.active_swing(TimeFrame::FiveMinute, SwingKind::Low).await?,
        })
    }
    .await;

    match result {
        Ok(swings) => Json(swings).into_response(),
        Err(e) => {
            warn!("failed to load swings: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

pub async fn get_sweep(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.active_sweep().await {
        Ok(Some(sweep)) => {
            let confluence = state.db.confluence_for_sweep(sweep.id).await.ok().flatten();
            Json(json!({ "sweep": sweep, "confluence": confluence })).into_response()
        }
        Ok(None) => Json(json!({ "sweep": null, "confluence": null })).into_response(),
        Err(e) => {
            warn!("failed to load active sweep: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

#[derive(Serialize, Default)]
struct PerformanceSummary {
    total_trades: usize,
    wins: usize,
    losses: usize,
    breakevens: usize,
    total_pnl: Decimal,
    win_rate_pct: Decimal,
}

pub async fn get_performance(State(state): State<AppState>) -> impl IntoResponse {
    let trades = match state.db.recent_trades(100).await {
        Ok(trades) => trades,
        Err(e) => {
            warn!("failed to load recent trades: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() })))
                .into_response();
        }
    };

    let mut summary = PerformanceSummary::default();
    for trade in &trades {
        match trade.outcome {
            Some(crate::types::TradeOutcome::Win) => summary.wins += 1,
            Some(crate::types::TradeOutcome::Loss) => summary.losses += 1,
            Some(crate::types::TradeOutcome::Breakeven) => summary.breakevens += 1,
            None => continue,
        }
        summary.total_trades += 1;
        summary.total_pnl += trade.pnl.unwrap_or(Decimal::ZERO);
    }
    if summary.total_trades > 0 {
        summary.win_rate_pct = Decimal::from(summary.wins) / Decimal::from(summary.total_trades) * Decimal::from(100);
    }

    Json(summary).into_response()
}

#[derive(Deserialize)]
pub struct EmergencyStopRequest {
    pub engage: bool,
}

pub async fn post_emergency_stop(
    State(state): State<AppState>,
    Json(req): Json<EmergencyStopRequest>,
) -> impl IntoResponse {
    let mut system = state.system.write().await;
    system.emergency_stop = req.engage;
    if let Err(e) = state.db.save_system_config(&system).await {
        warn!("failed to persist emergency_stop: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))).into_response();
    }
    info!("emergency stop set to {} via operator API", req.engage);
    Json(json!({ "emergency_stop": system.emergency_stop })).into_response()
}

#[derive(Deserialize)]
pub struct TradingEnabledRequest {
    pub enabled: bool,
}

pub async fn post_trading_enabled(
    State(state): State<AppState>,
    Json(req): Json<TradingEnabledRequest>,
) -> impl IntoResponse {
    let mut system = state.system.write().await;
    system.trading_enabled = req.enabled;
    if let Err(e) = state.db.save_system_config(&system).await {
        warn!("failed to persist trading_enabled: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))).into_response();
    }
    info!("trading_enabled set to {} via operator API", req.enabled);
    Json(json!({ "trading_enabled": system.trading_enabled })).into_response()
}
