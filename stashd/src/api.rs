//! HTTP control API for the stash daemon.
//!
//! Provides REST endpoints for:
//! - Health check
//! - Connected bots and their latest status
//! - Withdrawal code redemption

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use stash_connectors::{BotFleet, BotSnapshot};
use stash_domain::WithdrawalCode;
use stash_engine::{EngineError, WithdrawalReceipt};

use crate::reconciler::Reconciler;

// =============================================================================
// API State
// =============================================================================

/// Shared state for API handlers.
pub struct ApiState {
    pub fleet: Arc<BotFleet>,
    pub reconciler: Arc<Reconciler>,
}

// =============================================================================
// Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub connected_bots: usize,
}

/// Bot fleet response.
#[derive(Debug, Serialize)]
pub struct BotsResponse {
    pub count: usize,
    pub bots: Vec<BotSnapshot>,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

// =============================================================================
// Router
// =============================================================================

/// Create the API router.
pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/bots", get(bots_handler))
        .route("/withdrawals/:code/redeem", post(redeem_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        connected_bots: state.fleet.len(),
    })
}

/// Latest status of every bot that has reported.
async fn bots_handler(State(state): State<Arc<ApiState>>) -> Json<BotsResponse> {
    let bots = state.fleet.statuses();
    Json(BotsResponse {
        count: bots.len(),
        bots,
    })
}

/// Redeem a withdrawal code, decimal or `0x` hex.
async fn redeem_handler(
    State(state): State<Arc<ApiState>>,
    Path(code): Path<String>,
) -> Result<Json<WithdrawalReceipt>, ApiError> {
    let code = WithdrawalCode::parse(&code).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("Invalid withdrawal code: {}", code),
            }),
        )
    })?;

    let receipt = state.reconciler.redeem(code).await.map_err(to_error_response)?;
    Ok(Json(receipt))
}

// =============================================================================
// Helpers
// =============================================================================

fn to_error_response(error: EngineError) -> ApiError {
    let status = match &error {
        EngineError::UnknownWithdrawalCode => StatusCode::NOT_FOUND,
        e if e.is_user_facing() => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %error, "Request failed");
        "Internal error".to_string()
    } else {
        error.to_string()
    };
    (status, Json(ErrorResponse { error: message }))
}

// =============================================================================
// Tests
// =============================================================================
