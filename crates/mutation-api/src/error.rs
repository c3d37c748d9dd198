//! ApiError - maps core failures onto HTTP responses.
//!
//! | failure                   | status | body                                   |
//! |---------------------------|--------|----------------------------------------|
//! | invalid request body      | 400    | `{success: false, error: [..]}`        |
//! | `MutationError::Domain`   | 400    | `{error, message, code}`               |
//! | `MutationError::RateLimit`| 429    | `{error, message, code, retryAfter}`   |
//! | `ServiceUnavailable`      | 503    | `{error, message, code, retryAfter}`   |
//! | `MutationError::System`   | 500    | `{error, message, code}`               |
//! | `DispatchError`           | 500    | `{error, message, code}`               |
//!
//! 429 and 503 always carry `Retry-After`.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header::RETRY_AFTER};
use axum::response::{IntoResponse, Response};
use mutation_core::app::ExecutionService;
use mutation_core::domain::{DispatchError, MutationError};
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    Validation(Vec<String>),
    Mutation {
        error: MutationError,
        retry_after: Option<u64>,
    },
    Dispatch(DispatchError),
}

impl ApiError {
    /// Attach a `Retry-After`, asking the limiter when the error has none.
    pub async fn from_mutation(error: MutationError, executor: &ExecutionService) -> Self {
        let retry_after = match (&error, error.retry_after()) {
            (_, Some(secs)) => Some(secs),
            (MutationError::RateLimit(_) | MutationError::ServiceUnavailable(_), None) => {
                Some(executor.retry_after_seconds().await)
            }
            _ => None,
        };
        Self::Mutation { error, retry_after }
    }
}

impl From<DispatchError> for ApiError {
    fn from(value: DispatchError) -> Self {
        Self::Dispatch(value)
    }
}

fn mutation_status(error: &MutationError) -> StatusCode {
    match error {
        MutationError::Domain(_) => StatusCode::BAD_REQUEST,
        MutationError::RateLimit(_) => StatusCode::TOO_MANY_REQUESTS,
        MutationError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        MutationError::System(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "error": errors })),
            )
                .into_response(),
            ApiError::Mutation { error, retry_after } => {
                let mut body = json!({
                    "error": error.kind(),
                    "message": error.message(),
                    "code": error.code(),
                });
                if let Some(secs) = retry_after {
                    body["retryAfter"] = json!(secs);
                }
                let mut response = (mutation_status(&error), Json(body)).into_response();
                if let Some(secs) = retry_after
                    && matches!(
                        error,
                        MutationError::RateLimit(_) | MutationError::ServiceUnavailable(_)
                    )
                {
                    response
                        .headers_mut()
                        .insert(RETRY_AFTER, HeaderValue::from(secs));
                }
                response
            }
            ApiError::Dispatch(error) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": error.kind(),
                    "message": error.to_string(),
                    "code": error.code(),
                })),
            )
                .into_response(),
        }
    }
}
