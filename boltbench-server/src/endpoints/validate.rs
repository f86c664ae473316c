use axum::extract::State;
use axum::response::Response;
use axum::{Router, routing};
use boltbench_service::validation;

use crate::endpoints::common::{Payload, parse, pretty_json};
use crate::error::ApiResult;
use crate::state::ServiceState;

pub fn router() -> Router<ServiceState> {
    Router::new().route("/validate", routing::post(validate))
}

/// Compares the digests of one object on both endpoints.
///
/// Failed reads are part of the result rather than an error, so this responds with `200 OK` unless
/// the request itself is invalid.
async fn validate(State(state): State<ServiceState>, payload: Payload) -> ApiResult<Response> {
    let request = parse(payload)?;
    let bucket = request.bucket()?;
    let key = request.key()?;

    let result = validation::validate(&state.backends, bucket, key, request.skip_primary()).await;
    pretty_json(&result)
}
