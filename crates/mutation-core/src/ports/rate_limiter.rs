//! RateLimiter port - per-user budget plus global breaker and pause.

use async_trait::async_trait;

use crate::domain::MutationError;

/// Gate in front of every upstream mutation.
///
/// Rejections are `MutationError::RateLimit` (per-user budget) or
/// `MutationError::ServiceUnavailable` (breaker or pause). Store failures
/// surface as `MutationError::System`.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Read-only budget check; does not take a token.
    async fn check_rate_limit(&self, user_id: &str) -> Result<(), MutationError>;

    /// Atomically take one token.
    async fn consume_token(&self, user_id: &str) -> Result<(), MutationError>;

    /// Pause first, then breaker. Expired state is cleared on the way.
    async fn check_circuit_breaker(&self) -> Result<(), MutationError>;

    async fn record_success(&self) -> Result<(), MutationError>;

    /// Counts only upstream rate-limit failures; anything else is ignored.
    async fn record_failure(&self, error: &MutationError) -> Result<(), MutationError>;

    async fn trigger_global_pause(&self, reason: &str, duration_ms: i64)
    -> Result<(), MutationError>;

    async fn clear_global_pause(&self) -> Result<(), MutationError>;

    /// Remaining pause, else the window size, in whole seconds.
    async fn get_retry_after_seconds(&self) -> u64;
}
