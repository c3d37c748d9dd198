//! `ValidatedJson<T>` - JSON body extractor with schema checks.

use axum::Json;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// Checks a decoded body beyond what serde enforces.
pub trait Validate {
    fn validate(&self) -> Result<(), Vec<String>>;
}

/// Collects one message per empty required string field.
pub(crate) fn require_non_empty(errors: &mut Vec<String>, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(format!("{field} must not be empty"));
    }
}

pub(crate) fn require_non_empty_opt(errors: &mut Vec<String>, field: &str, value: Option<&str>) {
    if let Some(value) = value {
        require_non_empty(errors, field, value);
    }
}

pub(crate) fn into_result(errors: Vec<String>) -> Result<(), Vec<String>> {
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Rejects undecodable bodies and failed [`Validate`] checks with 400.
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::Validation(vec![rejection.body_text()]))?;
        value.validate().map_err(ApiError::Validation)?;
        Ok(Self(value))
    }
}
