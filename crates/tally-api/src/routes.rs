use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use tally_core::models::{PairRequest, PairResponse, ServerStatus, SyncDataPayload, SyncDataResponse};
use tally_core::sync::SyncEngine;

use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SyncEngine>,
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/pair", post(pair))
        .route("/sync", post(sync))
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

async fn ping() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "tally-sync",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// PIN exchange; auth failures answer 200 with `success: false` so the
/// remote device always gets a terminal, human-readable message
async fn pair(
    State(state): State<AppState>,
    Json(request): Json<PairRequest>,
) -> Json<PairResponse> {
    match state.engine.authenticate(&request.pin, &request.device_name) {
        Ok((token, expires_in)) => {
            tracing::info!(
                endpoint = "pair",
                device = %request.device_name,
                expires_in,
                "Device paired"
            );
            Json(PairResponse {
                success: true,
                token: Some(token),
                expires_in: Some(expires_in),
                message: "Authentication successful".to_string(),
            })
        }
        Err(error) => {
            tracing::warn!(
                endpoint = "pair",
                device = %request.device_name,
                %error,
                "Pairing attempt rejected"
            );
            Json(PairResponse {
                success: false,
                token: None,
                expires_in: None,
                message: error.to_string(),
            })
        }
    }
}

async fn sync(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SyncDataPayload>,
) -> Result<Json<SyncDataResponse>, ApiError> {
    let token = extract_bearer_token(&headers)?;
    let response = state.engine.ingest(token, payload)?;
    tracing::info!(
        endpoint = "sync",
        pending = response.pending_approval,
        conflicts = response.conflicts.len(),
        "Sync payload processed"
    );
    Ok(Json(response))
}

async fn status(State(state): State<AppState>) -> Json<ServerStatus> {
    Json(state.engine.status())
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::MissingToken("missing bearer token".to_string()))
}
