//! HTTP handlers

use super::state::AppState;
use super::wire::{ApiError, ProxyResponse};
use crate::proxy::ProxyRecord;
use crate::relay::{FindRequest, GrabRequest};
use axum::extract::{rejection::JsonRejection, State};
use axum::{http::StatusCode, Json};
use serde_json::{json, Value};

const SERVICE_NAME: &str = "Proxy Broker API";

fn into_responses(records: Vec<ProxyRecord>) -> Json<Vec<ProxyResponse>> {
    Json(records.into_iter().map(ProxyResponse::from).collect())
}

/// Service metadata and route list
pub async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "endpoints": {
            "find": "/api/v1/find",
            "grab": "/api/v1/grab",
            "health": "/health",
        },
        "started_at": state.started_at.to_rfc3339(),
        "active_requests": state.coordinator.session().active_requests(),
    }))
}

/// Liveness probe; healthy once the session is initialized
#[tracing::instrument(skip(state))]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    if state.coordinator.session().is_ready() {
        (
            StatusCode::OK,
            Json(json!({ "status": "healthy", "service": SERVICE_NAME })),
        )
    } else {
        tracing::warn!("Health check while session is not ready");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable", "service": SERVICE_NAME })),
        )
    }
}

/// Find and check proxies matching the request's filters
pub async fn find_proxies(
    State(state): State<AppState>,
    payload: Result<Json<FindRequest>, JsonRejection>,
) -> Result<Json<Vec<ProxyResponse>>, ApiError> {
    let Json(request) = payload?;
    let records = state.coordinator.find(request).await?;
    Ok(into_responses(records))
}

/// Grab proxies from listings without checking them
pub async fn grab_proxies(
    State(state): State<AppState>,
    payload: Result<Json<GrabRequest>, JsonRejection>,
) -> Result<Json<Vec<ProxyResponse>>, ApiError> {
    let Json(request) = payload?;
    let records = state.coordinator.grab(request).await?;
    Ok(into_responses(records))
}
