use std::sync::Arc;

use axum::{
    http::{header, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::middleware::available::{available, Availability};
use crate::middleware::metrics::{encode_metrics, track_requests};
use crate::server::AppState;

pub mod certs;
pub mod probez;
pub mod status;

/// Build the courier router.
///
/// The `/v1` routes and the not-found fallback sit behind the availability gate;
/// probes and `/metrics` are added after the gate so they are always answered.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/v1/status",
            get(status::status).fallback(method_not_allowed),
        )
        .route(
            "/v1/certs/:id",
            post(certs::store_certificate).fallback(method_not_allowed),
        )
        .route(
            "/v1/certs/:id/pkcs12password",
            post(certs::store_certificate_password).fallback(method_not_allowed),
        )
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            Availability::new(state.clone()),
            available,
        ))
        // Kubernetes probes and the prometheus collector bypass the gate.
        .route("/healthz", get(probez::healthz))
        .route("/livez", get(probez::healthz))
        .route("/readyz", get(probez::readyz))
        .route("/metrics", get(metrics_handler))
        .route_layer(middleware::from_fn(track_requests))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(crate::middleware::request_id))
}

async fn not_found() -> AppError {
    AppError::NotFound("resource not found".into())
}

async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed("method not allowed".into())
}

async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}
