//! StoreRateLimiter - RateLimiter over the shared DocumentStore.
//!
//! Documents:
//! - `rateLimits/{userId}`: per-user fixed window ([`RateLimitState`])
//! - `rateLimits/circuitBreaker`: global breaker ([`CircuitBreakerState`])
//! - `rateLimits/global`: global pause ([`GlobalPauseState`])
//!
//! All writes go through store transactions. A known active pause is also
//! kept in process memory until its own recorded end, so the hot rejection
//! path does not read the store. Nothing invalidates that copy early.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::config::RateLimitConfig;
use crate::domain::{CircuitBreakerState, GlobalPauseState, MutationError, RateLimitState};
use crate::ports::{Clock, DocPath, DocumentStore, RateLimiter, decode_doc, encode_doc, get_doc};

pub struct StoreRateLimiter {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
    pause_cache: Mutex<Option<GlobalPauseState>>,
}

impl StoreRateLimiter {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        config: RateLimitConfig,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            pause_cache: Mutex::new(None),
        }
    }

    fn cache(&self) -> MutexGuard<'_, Option<GlobalPauseState>> {
        self.pause_cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cached pause still in force at `now_ms`. Drops a lapsed entry.
    fn cached_pause(&self, now_ms: i64) -> Option<GlobalPauseState> {
        let mut cache = self.cache();
        match cache.as_ref() {
            Some(pause) if pause.is_active(now_ms) => Some(pause.clone()),
            Some(_) => {
                *cache = None;
                None
            }
            None => None,
        }
    }

    fn budget_exhausted(&self) -> MutationError {
        MutationError::local_rate_limit("Rate limit exceeded", self.config.window_secs())
    }

    fn paused_error(pause: &GlobalPauseState, now_ms: i64) -> MutationError {
        let reason = pause.pause_reason.as_deref().unwrap_or("unspecified");
        MutationError::unavailable(
            format!("Mutations are globally paused: {reason}"),
            Some(pause.remaining_secs(now_ms)),
            true,
        )
    }

    /// Pause gate. Clears a lapsed pause from the store.
    async fn check_global_pause(&self, now_ms: i64) -> Result<(), MutationError> {
        if let Some(pause) = self.cached_pause(now_ms) {
            return Err(Self::paused_error(&pause, now_ms));
        }

        let path = DocPath::global_pause();
        let pause: GlobalPauseState = get_doc(self.store.as_ref(), &path)
            .await?
            .unwrap_or_default();

        if pause.is_active(now_ms) {
            *self.cache() = Some(pause.clone());
            return Err(Self::paused_error(&pause, now_ms));
        }

        if pause.is_paused {
            // Only clear if nobody re-paused in the meantime.
            self.store
                .transaction(&path, &|current| {
                    let state: GlobalPauseState = match current {
                        Some(value) => decode_doc(&path, value.clone())?,
                        None => return Ok(None),
                    };
                    if state.is_paused && !state.is_active(now_ms) {
                        Ok(Some(encode_doc(&path, &GlobalPauseState::cleared())?))
                    } else {
                        Ok(None)
                    }
                })
                .await?;
            info!("global pause expired and was cleared");
        }
        Ok(())
    }

    /// Breaker gate. The first check after the cooldown closes it.
    async fn check_breaker(&self, now_ms: i64) -> Result<(), MutationError> {
        let path = DocPath::circuit_breaker();
        let breaker: CircuitBreakerState = get_doc(self.store.as_ref(), &path)
            .await?
            .unwrap_or_default();

        if breaker.is_blocking(now_ms) {
            return Err(MutationError::unavailable(
                "Circuit breaker is open",
                Some(breaker.retry_after_secs(now_ms)),
                false,
            ));
        }

        if breaker.is_expired(now_ms) {
            self.store
                .transaction(&path, &|current| {
                    let state: CircuitBreakerState = match current {
                        Some(value) => decode_doc(&path, value.clone())?,
                        None => return Ok(None),
                    };
                    if state.is_expired(now_ms) {
                        Ok(Some(encode_doc(&path, &CircuitBreakerState::closed())?))
                    } else {
                        Ok(None)
                    }
                })
                .await?;
            info!("circuit breaker cooldown elapsed, closing");
        }
        Ok(())
    }
}

#[async_trait]
impl RateLimiter for StoreRateLimiter {
    async fn check_rate_limit(&self, user_id: &str) -> Result<(), MutationError> {
        let now_ms = self.clock.now_ms();
        let state: Option<RateLimitState> =
            get_doc(self.store.as_ref(), &DocPath::rate_limit(user_id)).await?;
        match state {
            Some(state) if !state.has_budget(now_ms, self.config.max_tokens) => {
                debug!(user_id, count = state.count, "rate limit exhausted");
                Err(self.budget_exhausted())
            }
            _ => Ok(()),
        }
    }

    async fn consume_token(&self, user_id: &str) -> Result<(), MutationError> {
        let now_ms = self.clock.now_ms();
        let path = DocPath::rate_limit(user_id);
        let max_tokens = self.config.max_tokens;
        let window_size_ms = self.config.window_size_ms;
        self.store
            .transaction(&path, &|current| {
                let next = match current {
                    None => RateLimitState::fresh(now_ms, window_size_ms),
                    Some(value) => {
                        let state: RateLimitState = decode_doc(&path, value.clone())?;
                        if !state.has_budget(now_ms, max_tokens) {
                            return Err(self.budget_exhausted());
                        }
                        state.consume(now_ms, window_size_ms)
                    }
                };
                Ok(Some(encode_doc(&path, &next)?))
            })
            .await?;
        Ok(())
    }

    async fn check_circuit_breaker(&self) -> Result<(), MutationError> {
        let now_ms = self.clock.now_ms();
        self.check_global_pause(now_ms).await?;
        self.check_breaker(now_ms).await
    }

    async fn record_success(&self) -> Result<(), MutationError> {
        let path = DocPath::circuit_breaker();
        self.store
            .set(&path, encode_doc(&path, &CircuitBreakerState::closed())?)
            .await?;
        Ok(())
    }

    async fn record_failure(&self, error: &MutationError) -> Result<(), MutationError> {
        if !error.is_upstream_rate_limit() {
            return Ok(());
        }
        let now_ms = self.clock.now_ms();
        let path = DocPath::circuit_breaker();
        let threshold = self.config.breaker_threshold;
        let cooldown_ms = self.config.breaker_cooldown_ms;
        let written = self
            .store
            .transaction(&path, &|current| {
                let state: CircuitBreakerState = match current {
                    Some(value) => decode_doc(&path, value.clone())?,
                    None => CircuitBreakerState::closed(),
                };
                let next = state.record_failure(now_ms, threshold, cooldown_ms);
                Ok(Some(encode_doc(&path, &next)?))
            })
            .await?;

        let state: CircuitBreakerState = match written {
            Some(value) => decode_doc(&path, value)?,
            None => return Ok(()),
        };
        warn!(
            failure_count = state.failure_count,
            threshold, "upstream rate limit recorded against circuit breaker"
        );
        if state.failure_count >= threshold {
            warn!("circuit breaker opened");
            self.trigger_global_pause(
                "Circuit breaker opened after repeated upstream rate limits",
                self.config.pause_duration_ms,
            )
            .await?;
        }
        Ok(())
    }

    async fn trigger_global_pause(
        &self,
        reason: &str,
        duration_ms: i64,
    ) -> Result<(), MutationError> {
        let now_ms = self.clock.now_ms();
        let path = DocPath::global_pause();
        let pause = GlobalPauseState::paused(reason, now_ms, duration_ms);
        self.store.set(&path, encode_doc(&path, &pause)?).await?;
        *self.cache() = Some(pause);
        warn!(reason, duration_ms, "global pause triggered");
        Ok(())
    }

    async fn clear_global_pause(&self) -> Result<(), MutationError> {
        let path = DocPath::global_pause();
        self.store
            .set(&path, encode_doc(&path, &GlobalPauseState::cleared())?)
            .await?;
        *self.cache() = None;
        info!("global pause cleared");
        Ok(())
    }

    async fn get_retry_after_seconds(&self) -> u64 {
        let now_ms = self.clock.now_ms();
        if let Some(pause) = self.cached_pause(now_ms) {
            return pause.remaining_secs(now_ms);
        }
        match get_doc::<GlobalPauseState>(self.store.as_ref(), &DocPath::global_pause()).await {
            Ok(Some(pause)) if pause.is_active(now_ms) => pause.remaining_secs(now_ms),
            Ok(_) => self.config.window_secs(),
            Err(error) => {
                warn!(error = %error, "failed to read pause state for retry-after");
                self.config.window_secs()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{UpstreamError, ceil_secs};
    use crate::impls::InMemoryDocumentStore;
    use crate::ports::FixedClock;
    use chrono::{Duration, TimeZone, Utc};
    use rstest::rstest;
    use serde_json::json;

    const RATE_LIMITS: &str = "rateLimits";

    struct Fixture {
        store: Arc<InMemoryDocumentStore>,
        clock: FixedClock,
        limiter: StoreRateLimiter,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryDocumentStore::new());
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 4, 2, 15, 0, 0).unwrap());
        let limiter = StoreRateLimiter::new(
            store.clone(),
            Arc::new(clock.clone()),
            RateLimitConfig::default(),
        );
        Fixture {
            store,
            clock,
            limiter,
        }
    }

    fn upstream_429() -> MutationError {
        UpstreamError::new(Some(429), None, "Too many requests").classify()
    }

    #[rstest]
    #[case::empty_bucket(0, 0, true)]
    #[case::one_left(9, 0, true)]
    #[case::exhausted(10, 0, false)]
    #[case::over(12, 30_000, false)]
    #[case::window_edge_still_counts(10, 60_000, false)]
    #[case::expired_window(10, 60_001, true)]
    #[tokio::test]
    async fn check_rate_limit_follows_window_and_budget(
        #[case] count: u32,
        #[case] elapsed_ms: i64,
        #[case] allowed: bool,
    ) {
        let f = fixture();
        let now_ms = f.clock.now_ms();
        f.store.insert(
            DocPath::rate_limit("u1"),
            json!({"count": count, "windowStart": now_ms - elapsed_ms, "windowSizeMs": 60_000}),
        );
        let result = f.limiter.check_rate_limit("u1").await;
        assert_eq!(result.is_ok(), allowed);
        if let Err(err) = result {
            assert_eq!(err.kind(), "RateLimitError");
            assert_eq!(err.retry_after(), Some(ceil_secs(60_000)));
        }
    }

    #[tokio::test]
    async fn check_rate_limit_does_not_consume() {
        let f = fixture();
        for _ in 0..20 {
            f.limiter.check_rate_limit("u1").await.unwrap();
        }
        assert_eq!(f.store.snapshot(&DocPath::rate_limit("u1")), None);
    }

    #[tokio::test]
    async fn consume_counts_up_to_the_budget() {
        let f = fixture();
        for _ in 0..10 {
            f.limiter.consume_token("u1").await.unwrap();
        }
        let err = f.limiter.consume_token("u1").await.unwrap_err();
        assert_eq!(err.kind(), "RateLimitError");
        assert!(f.limiter.check_rate_limit("u1").await.is_err());
        // Other users have their own bucket.
        f.limiter.consume_token("u2").await.unwrap();
    }

    #[tokio::test]
    async fn expired_window_resets_instead_of_extending() {
        let f = fixture();
        let stale_start = f.clock.now_ms() - 120_000;
        f.store.insert(
            DocPath::rate_limit("u1"),
            json!({"count": 10, "windowStart": stale_start, "windowSizeMs": 60_000}),
        );
        f.limiter.consume_token("u1").await.unwrap();
        let doc = f.store.snapshot(&DocPath::rate_limit("u1")).unwrap();
        assert_eq!(doc["count"], 1);
        assert_eq!(doc["windowStart"], f.clock.now_ms());
    }

    #[tokio::test]
    async fn concurrent_consumes_never_overspend() {
        let f = fixture();
        let limiter = Arc::new(f.limiter);
        let mut handles = Vec::new();
        for _ in 0..25 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(
                async move { limiter.consume_token("u1").await },
            ));
        }
        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                granted += 1;
            }
        }
        assert_eq!(granted, 10);
    }

    #[tokio::test]
    async fn breaker_opens_on_third_upstream_rate_limit() {
        let f = fixture();
        f.limiter.record_failure(&upstream_429()).await.unwrap();
        f.limiter.record_failure(&upstream_429()).await.unwrap();
        f.limiter.check_circuit_breaker().await.unwrap();

        f.limiter.record_failure(&upstream_429()).await.unwrap();
        let breaker = f.store.snapshot(&DocPath::circuit_breaker()).unwrap();
        assert_eq!(breaker["isOpen"], true);
        assert_eq!(breaker["failureCount"], 3);
        assert_eq!(breaker["nextRetryTime"], f.clock.now_ms() + 300_000);

        let err = f.limiter.check_circuit_breaker().await.unwrap_err();
        assert_eq!(err.kind(), "ServiceUnavailableError");
    }

    #[tokio::test]
    async fn opening_the_breaker_also_pauses_globally() {
        let f = fixture();
        for _ in 0..3 {
            f.limiter.record_failure(&upstream_429()).await.unwrap();
        }
        let pause = f.store.snapshot(&DocPath::global_pause()).unwrap();
        assert_eq!(pause["isPaused"], true);
        assert_eq!(pause["pauseDurationMs"], 300_000);
        let err = f.limiter.check_circuit_breaker().await.unwrap_err();
        assert_eq!(err.code(), "GLOBAL_PAUSE");
    }

    #[rstest]
    #[case::domain(MutationError::domain("bad roster"))]
    #[case::system(MutationError::system("db down"))]
    #[case::maintenance(MutationError::unavailable("maintenance", Some(60), false))]
    #[case::local_budget(MutationError::local_rate_limit("slow down", 60))]
    #[tokio::test]
    async fn other_failures_never_open_the_breaker(#[case] error: MutationError) {
        let f = fixture();
        for _ in 0..5 {
            f.limiter.record_failure(&error).await.unwrap();
        }
        assert_eq!(f.store.snapshot(&DocPath::circuit_breaker()), None);
        f.limiter.check_circuit_breaker().await.unwrap();
    }

    #[tokio::test]
    async fn success_resets_the_consecutive_count() {
        let f = fixture();
        f.limiter.record_failure(&upstream_429()).await.unwrap();
        f.limiter.record_failure(&upstream_429()).await.unwrap();
        f.limiter.record_success().await.unwrap();
        f.limiter.record_failure(&upstream_429()).await.unwrap();
        let breaker = f.store.snapshot(&DocPath::circuit_breaker()).unwrap();
        assert_eq!(breaker["failureCount"], 1);
        assert_eq!(breaker["isOpen"], false);
    }

    #[tokio::test]
    async fn expired_breaker_is_closed_by_the_next_check() {
        let f = fixture();
        let now_ms = f.clock.now_ms();
        f.store.insert(
            DocPath::circuit_breaker(),
            json!({"isOpen": true, "failureCount": 3, "lastFailureTime": now_ms - 400_000, "nextRetryTime": now_ms - 1}),
        );
        f.limiter.check_circuit_breaker().await.unwrap();
        let breaker = f.store.snapshot(&DocPath::circuit_breaker()).unwrap();
        assert_eq!(breaker["isOpen"], false);
        assert_eq!(breaker["failureCount"], 0);
    }

    #[tokio::test]
    async fn active_pause_is_served_from_cache() {
        let f = fixture();
        f.limiter
            .trigger_global_pause("maintenance", 120_000)
            .await
            .unwrap();
        let before = f.store.access_count(RATE_LIMITS);

        for _ in 0..5 {
            let err = f.limiter.check_circuit_breaker().await.unwrap_err();
            assert_eq!(err.retry_after(), Some(120));
        }
        assert_eq!(f.store.access_count(RATE_LIMITS), before);
    }

    #[tokio::test]
    async fn pause_found_in_store_is_cached() {
        let f = fixture();
        let now_ms = f.clock.now_ms();
        f.store.insert(
            DocPath::global_pause(),
            json!({"isPaused": true, "pauseReason": "maintenance", "pausedAt": now_ms, "pauseDurationMs": 60_000}),
        );
        assert!(f.limiter.check_circuit_breaker().await.is_err());
        let after_first = f.store.access_count(RATE_LIMITS);
        assert!(f.limiter.check_circuit_breaker().await.is_err());
        assert_eq!(f.store.access_count(RATE_LIMITS), after_first);
    }

    #[tokio::test]
    async fn lapsed_pause_is_cleared_automatically() {
        let f = fixture();
        f.limiter
            .trigger_global_pause("maintenance", 60_000)
            .await
            .unwrap();
        f.clock.advance(Duration::milliseconds(60_001));

        f.limiter.check_circuit_breaker().await.unwrap();
        let pause = f.store.snapshot(&DocPath::global_pause()).unwrap();
        assert_eq!(pause["isPaused"], false);
    }

    #[tokio::test]
    async fn explicit_clear_lifts_the_pause() {
        let f = fixture();
        f.limiter.trigger_global_pause("manual", 600_000).await.unwrap();
        f.limiter.clear_global_pause().await.unwrap();
        f.limiter.check_circuit_breaker().await.unwrap();
    }

    #[tokio::test]
    async fn retry_after_prefers_remaining_pause() {
        let f = fixture();
        assert_eq!(f.limiter.get_retry_after_seconds().await, 60);

        f.limiter
            .trigger_global_pause("maintenance", 90_500)
            .await
            .unwrap();
        assert_eq!(f.limiter.get_retry_after_seconds().await, 91);

        f.clock.advance(Duration::seconds(100));
        assert_eq!(f.limiter.get_retry_after_seconds().await, 60);
    }

    #[tokio::test]
    async fn store_outage_surfaces_as_system_error() {
        let f = fixture();
        f.store.fail_collection(RATE_LIMITS);
        let err = f.limiter.consume_token("u1").await.unwrap_err();
        assert_eq!(err.kind(), "SystemError");
        assert_eq!(f.limiter.get_retry_after_seconds().await, 60);
    }
}
