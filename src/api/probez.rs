//! Kubernetes liveness and readiness probes.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;

use crate::server::AppState;

pub async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    probe(state.health.is_healthy())
}

pub async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    probe(state.health.is_ready())
}

fn probe(ok: bool) -> impl IntoResponse {
    let (status, body) = if ok {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable")
    };
    (status, [(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body)
}
