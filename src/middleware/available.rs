//! Availability gate: short-circuits requests with a 503 while the server is in
//! maintenance mode or not ready.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;

use crate::errors::json_reply;
use crate::models::api::{StatusReply, STATUS_MAINTENANCE, STATUS_STOPPING};
use crate::server::AppState;
use crate::version::version;

#[derive(Clone)]
pub struct Availability {
    state: Arc<AppState>,
    // Maintenance mode is fixed at startup, so the label is decided once.
    unavailable: &'static str,
}

impl Availability {
    pub fn new(state: Arc<AppState>) -> Self {
        let unavailable = if state.config.maintenance {
            STATUS_MAINTENANCE
        } else {
            STATUS_STOPPING
        };
        Self { state, unavailable }
    }

    pub fn is_available(&self) -> bool {
        !self.state.config.maintenance && self.state.health.is_ready()
    }
}

pub async fn available(State(gate): State<Availability>, req: Request, next: Next) -> Response {
    if !gate.is_available() {
        return json_reply(
            StatusCode::SERVICE_UNAVAILABLE,
            StatusReply {
                status: gate.unavailable.to_string(),
                uptime: gate.state.uptime(),
                version: version(),
            },
        );
    }

    next.run(req).await
}
