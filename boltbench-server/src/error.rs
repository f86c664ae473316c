//! Error types for the boltbench API layer.

use std::error::Error;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use boltbench_service::EngineError;
use boltbench_service::backend::{BackendError, UnknownBackendKind};
use boltbench_service::convergence::ConvergenceError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for API operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A parameter required by the requested operation is absent.
    #[error("missing required parameter `{0}`")]
    MissingParameter(&'static str),

    /// The `requestType` is not supported by the endpoint.
    #[error("unsupported request type `{0}`")]
    UnsupportedRequestType(String),

    /// The `sdkType` does not name a known endpoint.
    #[error(transparent)]
    UnsupportedSdkType(#[from] UnknownBackendKind),

    /// The request body is malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Errors from the benchmark engine and the storage endpoints.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The auto-heal poll stopped before the object became available.
    #[error(transparent)]
    Convergence(#[from] ConvergenceError),

    /// The response could not be rendered.
    #[error("failed to serialize response: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<BackendError> for ApiError {
    fn from(err: BackendError) -> Self {
        ApiError::Engine(EngineError::Backend(err))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// The JSON error object returned for every failed request.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    /// Description of the error.
    pub error_message: String,
    /// Always `"1"`.
    pub error_code: String,
}

impl ApiErrorResponse {
    /// Creates an error response from an error.
    pub fn from_error<E: Error + ?Sized>(error: &E) -> Self {
        Self {
            error_message: error.to_string(),
            error_code: "1".to_owned(),
        }
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingParameter(_)
            | ApiError::UnsupportedRequestType(_)
            | ApiError::UnsupportedSdkType(_)
            | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,

            ApiError::Engine(EngineError::Backend(err)) if err.is_not_found() => {
                StatusCode::NOT_FOUND
            }
            ApiError::Engine(EngineError::EmptySampleSet) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Engine(EngineError::Backend(_) | EngineError::Decode(_)) => {
                StatusCode::BAD_GATEWAY
            }
            ApiError::Engine(EngineError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,

            ApiError::Convergence(ConvergenceError::Exhausted { .. }) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            ApiError::Convergence(ConvergenceError::Cancelled { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            ApiError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = &self as &dyn Error, "error handling request");
        } else {
            tracing::debug!(error = &self as &dyn Error, "rejected request");
        }

        let body = ApiErrorResponse::from_error(&self);
        (status, Json(body)).into_response()
    }
}
