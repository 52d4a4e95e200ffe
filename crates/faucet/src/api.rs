//! HTTP API for the faucet

use crate::config::FaucetConfig;
use crate::error::{FaucetError, FaucetResult};
use crate::gate::{AirdropRequest, AirdropResponse, RequestGate};
use crate::metrics::{self, INVALID_REQUESTS_TOTAL, REQUESTS_TOTAL, TRACKED_WALLETS};
use axum::{
    extract::{rejection::JsonRejection, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Success response
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T> {
    pub data: T,
    pub timestamp: String,
}

/// Quota store snapshot for operators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaucetStatus {
    pub tracked_wallets: usize,
    pub capacity: usize,
    pub limit: u32,
    pub window_secs: u64,
    pub ttl_secs: u64,
}

/// Airdrop handler
pub async fn airdrop_handler(
    State(gate): State<Arc<RequestGate>>,
    payload: Result<Json<AirdropRequest>, JsonRejection>,
) -> FaucetResult<Json<AirdropResponse>> {
    let Json(request) = payload.map_err(|rejection| {
        REQUESTS_TOTAL.inc();
        INVALID_REQUESTS_TOTAL.inc();
        warn!("Malformed airdrop body: {}", rejection.body_text());
        FaucetError::InvalidRequest(rejection.body_text())
    })?;

    gate.handle(&request).await.map(Json)
}

/// Status handler
pub async fn status_handler(
    State(gate): State<Arc<RequestGate>>,
) -> Json<SuccessResponse<FaucetStatus>> {
    let store = gate.store();
    let policy = gate.policy();

    Json(SuccessResponse {
        data: FaucetStatus {
            tracked_wallets: store.len(),
            capacity: store.capacity(),
            limit: policy.limit,
            window_secs: policy.window.as_secs(),
            ttl_secs: store.ttl().as_secs(),
        },
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Prometheus metrics
pub async fn metrics_handler(State(gate): State<Arc<RequestGate>>) -> impl IntoResponse {
    TRACKED_WALLETS.set(gate.store().len() as i64);
    metrics::render()
}

/// Root handler with info
pub async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "Airdrop Faucet",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Devnet airdrop faucet with a per-wallet hourly quota",
        "endpoints": {
            "POST /api/airdrop": "Request an airdrop",
            "GET /api/status": "Get quota status",
            "GET /health": "Health check",
            "GET /metrics": "Prometheus metrics"
        }
    }))
}

/// Build the service router
pub fn router(gate: Arc<RequestGate>, config: &FaucetConfig) -> Router {
    let mut app = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/api/status", get(status_handler))
        .route("/api/airdrop", post(airdrop_handler));

    if config.metrics_enabled {
        app = app.route("/metrics", get(metrics_handler));
    }

    let mut app = app.with_state(gate).layer(TraceLayer::new_for_http());

    if config.cors_enabled {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}
