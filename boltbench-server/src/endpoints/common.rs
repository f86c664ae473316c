//! Common types and utilities for API endpoints.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::ApiResult;
use crate::request::BenchRequest;

/// The request body as received by handlers.
///
/// Rejections are turned into [`ApiError`](crate::error::ApiError) by [`parse`], so that malformed
/// bodies produce the regular JSON error object.
pub type Payload = Result<Json<BenchRequest>, JsonRejection>;

/// Unwraps the request body of a handler.
pub fn parse(payload: Payload) -> ApiResult<BenchRequest> {
    let Json(request) = payload?;
    Ok(request)
}

/// Renders `value` as JSON with sorted keys and four-space indentation.
pub fn pretty_json<T: Serialize + ?Sized>(value: &T) -> ApiResult<Response> {
    // Round-trip through `Value`, whose maps are ordered by key.
    let value = serde_json::to_value(value)?;
    let body = boltbench_service::report::to_json_pretty(&value)?;
    let content_type = HeaderValue::from_static("application/json");
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}
