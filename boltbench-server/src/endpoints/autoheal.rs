use axum::extract::State;
use axum::response::Response;
use axum::{Router, routing};
use boltbench_service::convergence::poll_until_available;

use crate::endpoints::common::{Payload, parse, pretty_json};
use crate::error::ApiResult;
use crate::state::ServiceState;

pub fn router() -> Router<ServiceState> {
    Router::new().route("/autoheal", routing::post(autoheal))
}

/// Measures how long the accelerator takes to serve an object it is missing.
///
/// Polling stops when the server shuts down.
async fn autoheal(State(state): State<ServiceState>, payload: Payload) -> ApiResult<Response> {
    let request = parse(payload)?;
    let bucket = request.bucket()?;
    let key = request.key()?;

    let result = poll_until_available(
        state.backends.accelerator(),
        bucket,
        key,
        &state.retry_policy,
        Some(&state.shutdown),
    )
    .await?;

    pretty_json(&result)
}
