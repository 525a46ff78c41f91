// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Read-only JSON views over the latest published batch.  All endpoints live
// under `/api/v1/`.
//
// CORS is configured permissively so a browser dashboard can poll directly.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::app_state::AppState;
use crate::binance::RateLimitSnapshot;
use crate::engine::{SignalData, SymbolFailure};

// =============================================================================
// Router construction
// =============================================================================

/// Build the REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/signals", get(signals))
        .route("/api/v1/signals/:symbol", get(signal_for_symbol))
        .route("/api/v1/errors", get(errors))
        .route("/api/v1/config", get(config))
        .layer(cors)
        .with_state(state)
}

fn message(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "message": msg.into() }))).into_response()
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    server_time: i64,
    uptime_secs: u64,
    symbols: usize,
    last_batch_at: Option<i64>,
    reversals_cached: usize,
    rate_limit: Option<RateLimitSnapshot>,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let server_time = chrono::Utc::now().timestamp_millis();
    let resp = HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        server_time,
        uptime_secs: state.start_time.elapsed().as_secs(),
        symbols: state.symbols.read().len(),
        last_batch_at: state.latest_batch().map(|b| b.finished_at),
        reversals_cached: state.engine.reversals().len(),
        rate_limit: state.rate_limit.as_ref().map(|t| t.snapshot(server_time)),
    };
    Json(resp)
}

// =============================================================================
// Signals
// =============================================================================

async fn signals(State(state): State<Arc<AppState>>) -> Response {
    match state.latest_batch() {
        Some(batch) => Json(&*batch).into_response(),
        None => message(StatusCode::SERVICE_UNAVAILABLE, "No batch completed yet"),
    }
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum SymbolView<'a> {
    Ok { signal: &'a SignalData },
    Failed { failure: &'a SymbolFailure },
}

async fn signal_for_symbol(State(state): State<Arc<AppState>>, Path(symbol): Path<String>) -> Response {
    let Some(batch) = state.latest_batch() else {
        return message(StatusCode::SERVICE_UNAVAILABLE, "No batch completed yet");
    };

    if let Some(signal) = batch.signal(&symbol) {
        return Json(SymbolView::Ok { signal }).into_response();
    }
    if let Some(failure) = batch.failure(&symbol) {
        return Json(SymbolView::Failed { failure }).into_response();
    }
    message(StatusCode::NOT_FOUND, format!("{symbol} is not part of the latest batch"))
}

// =============================================================================
// Errors & config
// =============================================================================

async fn errors(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let errors = state.recent_errors.read().clone();
    Json(errors)
}

async fn config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.config().clone())
}
