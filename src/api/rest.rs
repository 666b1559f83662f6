// Minimal read-only status surface: a single JSON snapshot route plus a
// health check, for a single-instrument engine with no plotting UI.

use crate::broker::PaperBroker;
use crate::trader::PositionTracker;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct DashboardState {
    pub broker: Arc<PaperBroker>,
    pub position_tracker: Arc<PositionTracker>,
}

#[derive(Serialize)]
struct StateSnapshot {
    cash_balance: f64,
    position: f64,
    avg_price: f64,
    has_active_order: bool,
}

pub fn build_router(state: DashboardState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/v1/state", get(get_state))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn get_state(
    axum::extract::State(state): axum::extract::State<DashboardState>,
) -> Json<StateSnapshot> {
    Json(StateSnapshot {
        cash_balance: state.broker.cash_balance(),
        position: state.broker.position(),
        avg_price: state.position_tracker.avg_price(),
        has_active_order: state.broker.has_active_order(),
    })
}
