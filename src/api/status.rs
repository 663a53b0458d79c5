use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;

use crate::errors::json_reply;
use crate::models::api::{StatusReply, STATUS_OK};
use crate::server::AppState;
use crate::version::version;

/// `GET /v1/status`. Unavailable states are answered by the availability gate, so
/// reaching this handler means the service is ok.
pub async fn status(State(state): State<Arc<AppState>>) -> Response {
    json_reply(
        StatusCode::OK,
        StatusReply {
            status: STATUS_OK.to_string(),
            uptime: state.uptime(),
            version: version(),
        },
    )
}
