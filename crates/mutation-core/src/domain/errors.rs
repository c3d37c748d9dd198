//! Errors - closed failure taxonomy.
//!
//! Every failure on the execution path ends up as one variant of
//! [`MutationError`]. Raw upstream failures are captured as
//! [`UpstreamError`] first and classified in one place.

use thiserror::Error;

pub const REVOKED_REFRESH_TOKEN: &str = "REVOKED_REFRESH_TOKEN";
pub const INVALID_PAYLOAD: &str = "INVALID_PAYLOAD";

/// Provider codes that mean "you are being rate limited".
const RATE_LIMIT_CODES: &[&str] = &["RATE_LIMITED", "999"];
const MAINTENANCE_CODES: &[&str] = &["MAINTENANCE", "SERVICE_UNAVAILABLE"];

/// Invalid payload or a known business-rule rejection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DomainError {
    pub message: String,
    pub code: Option<String>,
}

impl DomainError {
    pub fn is_revoked_credential(&self) -> bool {
        self.code.as_deref() == Some(REVOKED_REFRESH_TOKEN)
    }
}

/// Where a rate-limit signal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitSource {
    /// The per-user token bucket.
    Local,
    /// The third-party API.
    Upstream,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RateLimitError {
    pub message: String,
    pub retry_after: Option<u64>,
    pub origin: RateLimitSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ServiceUnavailableError {
    pub message: String,
    pub retry_after: Option<u64>,
    /// Set when the rejection comes from the global pause rather than the breaker or upstream.
    pub is_global_pause: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SystemError {
    pub message: String,
    pub retryable: bool,
    pub status: Option<u16>,
    pub code: Option<String>,
}

/// MutationError is the only error type on the execution path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error("domain error: {0}")]
    Domain(DomainError),

    #[error("rate limited: {0}")]
    RateLimit(RateLimitError),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(ServiceUnavailableError),

    #[error("system error: {0}")]
    System(SystemError),
}

impl MutationError {
    pub fn domain(message: impl Into<String>) -> Self {
        Self::Domain(DomainError {
            message: message.into(),
            code: None,
        })
    }

    pub fn domain_with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Domain(DomainError {
            message: message.into(),
            code: Some(code.into()),
        })
    }

    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::domain_with_code(message, INVALID_PAYLOAD)
    }

    pub fn local_rate_limit(message: impl Into<String>, retry_after: u64) -> Self {
        Self::RateLimit(RateLimitError {
            message: message.into(),
            retry_after: Some(retry_after),
            origin: RateLimitSource::Local,
        })
    }

    pub fn unavailable(
        message: impl Into<String>,
        retry_after: Option<u64>,
        is_global_pause: bool,
    ) -> Self {
        Self::ServiceUnavailable(ServiceUnavailableError {
            message: message.into(),
            retry_after,
            is_global_pause,
        })
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::System(SystemError {
            message: message.into(),
            retryable: true,
            status: None,
            code: None,
        })
    }

    /// Name of the variant as shown in HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            MutationError::Domain(_) => "DomainError",
            MutationError::RateLimit(_) => "RateLimitError",
            MutationError::ServiceUnavailable(_) => "ServiceUnavailableError",
            MutationError::System(_) => "SystemError",
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> String {
        match self {
            MutationError::Domain(e) => e.code.clone().unwrap_or_else(|| "DOMAIN_ERROR".into()),
            MutationError::RateLimit(_) => "RATE_LIMITED".into(),
            MutationError::ServiceUnavailable(e) if e.is_global_pause => "GLOBAL_PAUSE".into(),
            MutationError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE".into(),
            MutationError::System(e) => e.code.clone().unwrap_or_else(|| "SYSTEM_ERROR".into()),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            MutationError::Domain(e) => &e.message,
            MutationError::RateLimit(e) => &e.message,
            MutationError::ServiceUnavailable(e) => &e.message,
            MutationError::System(e) => &e.message,
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            MutationError::RateLimit(e) => e.retry_after,
            MutationError::ServiceUnavailable(e) => e.retry_after,
            _ => None,
        }
    }

    pub fn is_revoked_credential(&self) -> bool {
        matches!(self, MutationError::Domain(e) if e.is_revoked_credential())
    }

    /// Whether this failure is the upstream telling us to slow down.
    ///
    /// Only these count against the circuit breaker; the local token bucket
    /// rejecting a user never does.
    pub fn is_upstream_rate_limit(&self) -> bool {
        match self {
            MutationError::RateLimit(e) => e.origin == RateLimitSource::Upstream,
            MutationError::System(e) => {
                e.status == Some(429)
                    || e.code
                        .as_deref()
                        .is_some_and(|c| RATE_LIMIT_CODES.contains(&c))
            }
            _ => false,
        }
    }
}

/// A failed call to a third-party API, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("upstream error (status={status:?}, code={code:?}): {message}")]
pub struct UpstreamError {
    pub status: Option<u16>,
    pub code: Option<String>,
    pub message: String,
    pub retry_after: Option<u64>,
}

impl UpstreamError {
    pub fn new(status: Option<u16>, code: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.map(str::to_string),
            message: message.into(),
            retry_after: None,
        }
    }

    /// Transport-level failure (no HTTP response).
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(None, None, message)
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after = Some(secs);
        self
    }

    fn has_code(&self, codes: &[&str]) -> bool {
        self.code.as_deref().is_some_and(|c| codes.contains(&c))
    }

    /// Map a raw upstream failure onto the taxonomy.
    pub fn classify(self) -> MutationError {
        let revoked = self.code.as_deref() == Some(REVOKED_REFRESH_TOKEN)
            || (self.status == Some(401) && self.code.as_deref() == Some("invalid_grant"));
        if revoked {
            return MutationError::domain_with_code(self.message, REVOKED_REFRESH_TOKEN);
        }
        if self.status == Some(429) || self.has_code(RATE_LIMIT_CODES) {
            return MutationError::RateLimit(RateLimitError {
                message: self.message,
                retry_after: self.retry_after,
                origin: RateLimitSource::Upstream,
            });
        }
        if self.status == Some(503) || self.has_code(MAINTENANCE_CODES) {
            return MutationError::unavailable(self.message, self.retry_after, false);
        }
        match self.status {
            Some(status) if (400..500).contains(&status) => MutationError::Domain(DomainError {
                message: self.message,
                code: self.code,
            }),
            status => MutationError::System(SystemError {
                message: self.message,
                retryable: true,
                status,
                code: self.code,
            }),
        }
    }
}

impl From<UpstreamError> for MutationError {
    fn from(value: UpstreamError) -> Self {
        value.classify()
    }
}

/// Fatal failure of one dispatch pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("failed to load schedule: {0}")]
    Schedule(String),

    #[error("failed to fetch team snapshot: {0}")]
    TeamSnapshot(String),

    #[error("failed to enqueue task for user {user_id}: {message}")]
    Enqueue { user_id: String, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl DispatchError {
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::Schedule(_) => "SCHEDULE_ERROR",
            DispatchError::TeamSnapshot(_) => "TEAM_SNAPSHOT_ERROR",
            DispatchError::Enqueue { .. } => "ENQUEUE_ERROR",
            DispatchError::Config(_) => "CONFIG_ERROR",
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Config(_) => "ConfigurationError",
            _ => "DispatchError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::http_429(Some(429), None, "RateLimitError")]
    #[case::yahoo_999(Some(403), Some("999"), "RateLimitError")]
    #[case::maintenance(Some(503), None, "ServiceUnavailableError")]
    #[case::maintenance_code(Some(200), Some("MAINTENANCE"), "ServiceUnavailableError")]
    #[case::revoked(Some(400), Some("REVOKED_REFRESH_TOKEN"), "DomainError")]
    #[case::invalid_grant(Some(401), Some("invalid_grant"), "DomainError")]
    #[case::bad_request(Some(400), None, "DomainError")]
    #[case::server_error(Some(500), None, "SystemError")]
    #[case::transport(None, None, "SystemError")]
    fn upstream_errors_classify(
        #[case] status: Option<u16>,
        #[case] code: Option<&str>,
        #[case] kind: &str,
    ) {
        let err = UpstreamError::new(status, code, "boom").classify();
        assert_eq!(err.kind(), kind);
    }

    #[test]
    fn revoked_credentials_are_recognised() {
        let err = UpstreamError::new(Some(401), Some("invalid_grant"), "token revoked").classify();
        assert!(err.is_revoked_credential());
        assert_eq!(err.code(), REVOKED_REFRESH_TOKEN);
    }

    #[test]
    fn classification_keeps_retry_after() {
        let err = UpstreamError::new(Some(429), None, "slow down")
            .with_retry_after(30)
            .classify();
        assert_eq!(err.retry_after(), Some(30));
        assert!(err.is_upstream_rate_limit());
    }

    #[test]
    fn local_rate_limit_is_not_upstream_signal() {
        let err = MutationError::local_rate_limit("budget exhausted", 60);
        assert!(!err.is_upstream_rate_limit());
    }

    #[test]
    fn system_error_with_429_counts_as_rate_limit_signal() {
        let err = MutationError::System(SystemError {
            message: "x".into(),
            retryable: true,
            status: Some(429),
            code: None,
        });
        assert!(err.is_upstream_rate_limit());
        assert!(!MutationError::system("db down").is_upstream_rate_limit());
    }

    #[test]
    fn pause_rejections_have_their_own_code() {
        assert_eq!(
            MutationError::unavailable("paused", Some(10), true).code(),
            "GLOBAL_PAUSE"
        );
        assert_eq!(
            MutationError::unavailable("breaker", Some(10), false).code(),
            "SERVICE_UNAVAILABLE"
        );
    }
}
