//! API error type with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use orders::OrderFlowError;

/// API-level error that maps to an HTTP response.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client (malformed header, unparseable id).
    BadRequest(String),
    /// Error surfaced by an order workflow.
    Flow(OrderFlowError),
}

impl From<OrderFlowError> for ApiError {
    fn from(err: OrderFlowError) -> Self {
        ApiError::Flow(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Flow(err) => flow_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn flow_error_to_response(err: OrderFlowError) -> (StatusCode, String) {
    let status = match &err {
        OrderFlowError::OrderNotFound(_)
        | OrderFlowError::ItemNotFound(_)
        | OrderFlowError::UserNotFound(_)
        | OrderFlowError::ProductNotFound(_) => StatusCode::NOT_FOUND,
        OrderFlowError::Forbidden { .. } => StatusCode::FORBIDDEN,
        OrderFlowError::InvalidState(_) | OrderFlowError::InsufficientStock(_) => {
            StatusCode::CONFLICT
        }
        OrderFlowError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        OrderFlowError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        OrderFlowError::CreationFailed { source } => creation_failure_status(source),
        OrderFlowError::Store(_) | OrderFlowError::Serialization(_) => {
            tracing::error!(error = %err, "internal server error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

/// A failed creation keeps the status of the step that broke it.
fn creation_failure_status(source: &OrderFlowError) -> StatusCode {
    match source {
        OrderFlowError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
