//! Typed configuration for the core services.
//!
//! Loading (files, env, flags) happens in the binary; these structs only
//! carry values and their defaults.

use chrono_tz::Tz;
use serde::Deserialize;

use crate::domain::{DispatchError, EXECUTE_PATH, QueueTarget};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Tokens per user per window.
    pub max_tokens: u32,
    pub window_size_ms: i64,
    /// Consecutive upstream rate-limit failures that open the breaker.
    pub breaker_threshold: u32,
    pub breaker_cooldown_ms: i64,
    /// Global pause applied when the breaker opens.
    pub pause_duration_ms: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_tokens: 10,
            window_size_ms: 60_000,
            breaker_threshold: 3,
            breaker_cooldown_ms: 5 * 60 * 1000,
            pause_duration_ms: 5 * 60 * 1000,
        }
    }
}

impl RateLimitConfig {
    pub fn window_secs(&self) -> u64 {
        crate::domain::ceil_secs(self.window_size_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub reference_tz: Tz,
    /// Hour (reference zone) at which schedule passes are skipped because
    /// the upstream schedule has not rolled over yet. `None` disables the guard.
    pub midnight_skip_hour: Option<u32>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            reference_tz: chrono_tz::America::New_York,
            midnight_skip_hour: Some(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub project_id: Option<String>,
    pub location: Option<String>,
    pub queue_name: Option<String>,
    /// Base URL of this service as reachable by the queue.
    pub execution_base_url: Option<String>,
    pub dispatch_deadline_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            location: None,
            queue_name: None,
            execution_base_url: None,
            dispatch_deadline_secs: 300,
        }
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, DispatchError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(DispatchError::Config(format!("{name} is not configured"))),
    }
}

impl QueueConfig {
    /// Resolve the queue target; any missing identifier is fatal.
    pub fn target(&self) -> Result<QueueTarget, DispatchError> {
        let project = required(&self.project_id, "queue project id")?;
        let location = required(&self.location, "queue location")?;
        let queue = required(&self.queue_name, "queue name")?;
        let base_url = required(&self.execution_base_url, "execution base url")?;
        Ok(QueueTarget {
            queue_path: format!("projects/{project}/locations/{location}/queues/{queue}"),
            execute_url: format!("{}{}", base_url.trim_end_matches('/'), EXECUTE_PATH),
            dispatch_deadline_secs: self.dispatch_deadline_secs,
        })
    }
}
