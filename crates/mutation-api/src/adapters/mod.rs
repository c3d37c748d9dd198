//! Network adapters for the core ports.
//!
//! - **CloudTasksQueue**: `TaskQueue` over the Cloud Tasks REST API
//! - **FirestoreStore**: the shared `DocumentStore` over the Firestore REST API
//! - **HttpScheduleProvider**: game schedules and starters from a sports-data service
//! - **HttpLineupOptimizer**: the remote lineup / transaction backend

pub mod cloud_tasks;
pub mod firestore;
pub mod optimizer;
pub mod sports_data;

pub use self::cloud_tasks::CloudTasksQueue;
pub use self::firestore::FirestoreStore;
pub use self::optimizer::HttpLineupOptimizer;
pub use self::sports_data::HttpScheduleProvider;

use mutation_core::domain::UpstreamError;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Deserialize;

/// Error body shape shared by the upstream services.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// `Retry-After` in delta-seconds; HTTP dates are ignored.
fn retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Turn a non-2xx response into an [`UpstreamError`].
pub(crate) async fn upstream_error(response: reqwest::Response) -> UpstreamError {
    let status = response.status().as_u16();
    let retry = retry_after(response.headers());
    let text = response.text().await.unwrap_or_default();
    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
    let message = body
        .message
        .or(body.error)
        .unwrap_or_else(|| format!("upstream responded with {status}"));
    let error = UpstreamError::new(Some(status), body.code.as_deref(), message);
    match retry {
        Some(secs) => error.with_retry_after(secs),
        None => error,
    }
}

pub(crate) fn transport_error(error: reqwest::Error) -> UpstreamError {
    UpstreamError::transport(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn retry_after_reads_delta_seconds_only() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("120"));
        assert_eq!(retry_after(&headers), Some(120));

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&headers), None);
        assert_eq!(retry_after(&HeaderMap::new()), None);
    }
}
