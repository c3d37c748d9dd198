//! Shared rate-limit documents (`rateLimits/*`).
//!
//! Pure state transitions live here; the store round-trips live in
//! `app::rate_limiter`.

use serde::{Deserialize, Serialize};

/// Per-user fixed window, stored at `rateLimits/{userId}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitState {
    pub count: u32,
    pub window_start: i64,
    pub window_size_ms: i64,
}

impl RateLimitState {
    pub fn fresh(now_ms: i64, window_size_ms: i64) -> Self {
        Self {
            count: 1,
            window_start: now_ms,
            window_size_ms,
        }
    }

    /// A window is expired once strictly more than its size has elapsed.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms.saturating_sub(self.window_start) > self.window_size_ms
    }

    /// Whether one more token may be taken. Expired windows always allow.
    pub fn has_budget(&self, now_ms: i64, max_tokens: u32) -> bool {
        self.is_expired(now_ms) || self.count < max_tokens
    }

    /// Take one token: reset an expired window, otherwise count in place.
    pub fn consume(self, now_ms: i64, window_size_ms: i64) -> Self {
        if self.is_expired(now_ms) {
            Self::fresh(now_ms, window_size_ms)
        } else {
            Self {
                count: self.count.saturating_add(1),
                ..self
            }
        }
    }
}

/// Global breaker, stored at `rateLimits/circuitBreaker`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerState {
    pub is_open: bool,
    pub failure_count: u32,
    #[serde(default)]
    pub last_failure_time: Option<i64>,
    #[serde(default)]
    pub next_retry_time: Option<i64>,
}

impl CircuitBreakerState {
    pub fn closed() -> Self {
        Self::default()
    }

    /// Open and still cooling down at `now_ms`.
    pub fn is_blocking(&self, now_ms: i64) -> bool {
        self.is_open && self.next_retry_time.is_some_and(|t| now_ms < t)
    }

    /// Open but past its retry time.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.is_open && !self.is_blocking(now_ms)
    }

    /// Count one qualifying failure; open once `threshold` is reached.
    pub fn record_failure(self, now_ms: i64, threshold: u32, cooldown_ms: i64) -> Self {
        let failure_count = self.failure_count.saturating_add(1);
        if failure_count >= threshold {
            Self {
                is_open: true,
                failure_count,
                last_failure_time: Some(now_ms),
                next_retry_time: Some(now_ms.saturating_add(cooldown_ms)),
            }
        } else {
            Self {
                is_open: self.is_open,
                failure_count,
                last_failure_time: Some(now_ms),
                next_retry_time: self.next_retry_time,
            }
        }
    }

    pub fn retry_after_secs(&self, now_ms: i64) -> u64 {
        self.next_retry_time
            .map(|t| ceil_secs(t.saturating_sub(now_ms)))
            .unwrap_or(0)
    }
}

/// Global pause, stored at `rateLimits/global`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalPauseState {
    pub is_paused: bool,
    #[serde(default)]
    pub pause_reason: Option<String>,
    #[serde(default)]
    pub paused_at: Option<i64>,
    #[serde(default)]
    pub pause_duration_ms: Option<i64>,
}

impl GlobalPauseState {
    pub fn paused(reason: impl Into<String>, now_ms: i64, duration_ms: i64) -> Self {
        Self {
            is_paused: true,
            pause_reason: Some(reason.into()),
            paused_at: Some(now_ms),
            pause_duration_ms: Some(duration_ms),
        }
    }

    pub fn cleared() -> Self {
        Self::default()
    }

    /// Epoch millis when the pause lapses, if paused.
    pub fn expires_at(&self) -> Option<i64> {
        if !self.is_paused {
            return None;
        }
        Some(
            self.paused_at
                .unwrap_or(0)
                .saturating_add(self.pause_duration_ms.unwrap_or(0)),
        )
    }

    /// Paused and not yet lapsed at `now_ms`.
    pub fn is_active(&self, now_ms: i64) -> bool {
        self.expires_at().is_some_and(|end| now_ms < end)
    }

    pub fn remaining_secs(&self, now_ms: i64) -> u64 {
        self.expires_at()
            .map(|end| ceil_secs(end.saturating_sub(now_ms)))
            .unwrap_or(0)
    }
}

/// Millis to whole seconds, rounding up; never negative.
pub fn ceil_secs(ms: i64) -> u64 {
    if ms <= 0 {
        0
    } else {
        (ms as u64).div_ceil(1000)
    }
}
