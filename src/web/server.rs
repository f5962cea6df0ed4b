use std::net::SocketAddr;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use super::{api, AppState};

/// Read-mostly operator surface (§6): position/swing/sweep/performance
/// views plus the two manual switches. No dashboard HTML, no websocket
/// fan-out — that stays with the out-of-scope end-user dashboard.
pub async fn start_operator_api(state: AppState, port: u16) -> anyhow::Result<()> {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let app = Router::new()
        .route("/health", get(api::health_check))
        .route("/positions", get(api::get_positions))
        .route("/swings", get(api::get_swings))
        .route("/sweep", get(api::get_sweep))
        .route("/performance", get(api::get_performance))
        .route("/emergency-stop", post(api::post_emergency_stop))
        .route("/trading-enabled", post(api::post_trading_enabled))
        .layer(cors)
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("operator API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
