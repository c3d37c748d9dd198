//! Decision model: what to do with a task after its handler failed.
//!
//! The execution service classifies a failure into a [`MutationError`]; the
//! [`FailurePolicy`] turns that into a [`Decision`]. The policy is a pure
//! function; carrying out the decision (status writes, breaker updates,
//! pauses) is the execution service's job.

use super::{MutationError, TaskStatus};

/// Default pause applied when upstream maintenance gives no retry window.
pub const DEFAULT_MAINTENANCE_PAUSE_MS: i64 = 5 * 60 * 1000;

/// The next action for a failed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Record FAILED but answer the queue with success: retrying cannot help
    /// until the user re-authenticates.
    AckAsFailed,

    /// Record FAILED and surface a client-class error.
    FailTerminal,

    /// Count the failure against the breaker, record FAILED, surface with retry-after.
    FailAndRecordBreaker,

    /// Pause all mutation traffic and leave the task retryable.
    PauseAndRetry { pause_ms: i64 },

    /// Record FAILED and surface as retryable.
    FailRetryable,
}

impl Decision {
    /// Status to record for the task, if any.
    pub fn status(&self) -> TaskStatus {
        match self {
            Decision::PauseAndRetry { .. } => TaskStatus::Pending,
            _ => TaskStatus::Failed,
        }
    }

    /// Whether a redelivery of the task should run it again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Decision::FailAndRecordBreaker
                | Decision::PauseAndRetry { .. }
                | Decision::FailRetryable
        )
    }

    /// Whether the queue should see the original error.
    pub fn propagates(&self) -> bool {
        !matches!(self, Decision::AckAsFailed)
    }
}

/// Trait for deciding the next action based on a classified failure.
pub trait Decider: Send + Sync {
    fn decide(&self, error: &MutationError) -> Decision;
}

/// Failure policy used by the execution service.
#[derive(Debug, Clone, Default)]
pub struct FailurePolicy;

impl Decider for FailurePolicy {
    fn decide(&self, error: &MutationError) -> Decision {
        match error {
            MutationError::Domain(e) if e.is_revoked_credential() => Decision::AckAsFailed,
            MutationError::Domain(_) => Decision::FailTerminal,
            MutationError::RateLimit(_) => Decision::FailAndRecordBreaker,
            MutationError::ServiceUnavailable(e) => Decision::PauseAndRetry {
                pause_ms: e
                    .retry_after
                    .map(|secs| (secs as i64).saturating_mul(1000))
                    .unwrap_or(DEFAULT_MAINTENANCE_PAUSE_MS),
            },
            MutationError::System(_) => Decision::FailRetryable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{REVOKED_REFRESH_TOKEN, UpstreamError};
    use rstest::rstest;

    #[rstest]
    #[case::revoked(
        MutationError::domain_with_code("revoked", REVOKED_REFRESH_TOKEN),
        Decision::AckAsFailed
    )]
    #[case::bad_payload(MutationError::invalid_payload("missing teams"), Decision::FailTerminal)]
    #[case::upstream_429(
        UpstreamError::new(Some(429), None, "slow").classify(),
        Decision::FailAndRecordBreaker
    )]
    #[case::maintenance(
        MutationError::unavailable("maintenance", Some(120), false),
        Decision::PauseAndRetry { pause_ms: 120_000 }
    )]
    #[case::maintenance_without_window(
        MutationError::unavailable("maintenance", None, false),
        Decision::PauseAndRetry { pause_ms: DEFAULT_MAINTENANCE_PAUSE_MS }
    )]
    #[case::system(MutationError::system("boom"), Decision::FailRetryable)]
    fn policy_decides(#[case] error: MutationError, #[case] expected: Decision) {
        assert_eq!(FailurePolicy.decide(&error), expected);
    }

    #[test]
    fn only_revoked_credentials_stop_propagation() {
        assert!(!Decision::AckAsFailed.propagates());
        assert!(Decision::FailTerminal.propagates());
        assert!(Decision::FailRetryable.propagates());
    }

    #[rstest]
    #[case::revoked(Decision::AckAsFailed, false)]
    #[case::terminal(Decision::FailTerminal, false)]
    #[case::breaker(Decision::FailAndRecordBreaker, true)]
    #[case::pause(Decision::PauseAndRetry { pause_ms: 1 }, true)]
    #[case::system(Decision::FailRetryable, true)]
    fn only_transient_failures_run_again(#[case] decision: Decision, #[case] expected: bool) {
        assert_eq!(decision.is_retryable(), expected);
    }

    #[test]
    fn maintenance_leaves_task_retryable() {
        assert_eq!(
            Decision::PauseAndRetry { pause_ms: 1 }.status(),
            TaskStatus::Pending
        );
        assert_eq!(Decision::AckAsFailed.status(), TaskStatus::Failed);
    }
}
