//! ExecutionService - runs one queued [`MutationTask`].
//!
//! # Flow
//! 0. A redelivered task that already finished is answered from its record
//! 1. Record `PROCESSING`
//! 2. Gates: per-user budget, breaker and pause, then take a token
//! 3. Hand the task to the registered handler
//! 4. Success: `COMPLETED`, reset the breaker
//! 5. Failure: ask the [`Decider`] and carry out its [`Decision`]
//!
//! Status writes never change the outcome; a failed write is logged and
//! dropped.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::domain::{
    Decider, Decision, ExecuteMutationRequest, ExecuteMutationResponse, MutationError,
    MutationTask, TaskStatus,
};
use crate::ports::{Clock, DocPath, DocumentStore, RateLimiter, encode_doc, get_doc};
use crate::typed::TypedRegistry;

/// Stored form of a task under `mutationTasks/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TaskRecord {
    #[serde(flatten)]
    task: MutationTask,
    /// Set when a redelivery should run the task again despite its status.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    retryable: bool,
}

impl TaskRecord {
    fn is_finished(&self) -> bool {
        self.task.status.is_terminal() && !self.retryable
    }
}

pub struct ExecutionService {
    registry: TypedRegistry,
    limiter: Arc<dyn RateLimiter>,
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    decider: Arc<dyn Decider>,
}

impl ExecutionService {
    pub fn new(
        registry: TypedRegistry,
        limiter: Arc<dyn RateLimiter>,
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        decider: Arc<dyn Decider>,
    ) -> Self {
        Self {
            registry,
            limiter,
            store,
            clock,
            decider,
        }
    }

    pub fn registry(&self) -> &TypedRegistry {
        &self.registry
    }

    /// Fallback for a `Retry-After` header when the error carries none.
    pub async fn retry_after_seconds(&self) -> u64 {
        self.limiter.get_retry_after_seconds().await
    }

    pub async fn execute_mutation(
        &self,
        request: ExecuteMutationRequest,
    ) -> Result<ExecuteMutationResponse, MutationError> {
        let task = request.task;
        debug!(task_id = %task.id, user_id = %task.user_id, mutation_type = %task.mutation_type, "executing task");
        if let Some(status) = self.finished_status(&task).await {
            info!(task_id = %task.id, status = %status, "task already finished, skipping redelivery");
            let now = self.clock.now();
            return Ok(match status {
                TaskStatus::Completed => ExecuteMutationResponse::completed(task.id, now),
                _ => ExecuteMutationResponse::failed_terminal(task.id, "Task already failed", now),
            });
        }
        self.write_status(&task, TaskStatus::Processing).await;

        if let Err(error) = self.pass_gates(&task.user_id).await {
            info!(
                task_id = %task.id,
                user_id = %task.user_id,
                code = %error.code(),
                "task held back by rate limiter"
            );
            self.write_status(&task, TaskStatus::Pending).await;
            return Err(error);
        }

        let outcome = match self.registry.get(task.mutation_type) {
            Some(handler) => handler.handle_dyn(&task).await,
            None => Err(MutationError::system(format!(
                "no handler registered for {}",
                task.mutation_type
            ))),
        };

        match outcome {
            Ok(()) => {
                self.write_status(&task, TaskStatus::Completed).await;
                if let Err(error) = self.limiter.record_success().await {
                    warn!(task_id = %task.id, error = %error, "failed to record success");
                }
                info!(task_id = %task.id, user_id = %task.user_id, "task completed");
                Ok(ExecuteMutationResponse::completed(task.id, self.clock.now()))
            }
            Err(failure) => self.handle_failure(task, failure).await,
        }
    }

    async fn pass_gates(&self, user_id: &str) -> Result<(), MutationError> {
        self.limiter.check_rate_limit(user_id).await?;
        self.limiter.check_circuit_breaker().await?;
        self.limiter.consume_token(user_id).await
    }

    async fn handle_failure(
        &self,
        task: MutationTask,
        failure: MutationError,
    ) -> Result<ExecuteMutationResponse, MutationError> {
        let decision = self.decider.decide(&failure);
        match &decision {
            Decision::FailAndRecordBreaker => {
                if let Err(error) = self.limiter.record_failure(&failure).await {
                    warn!(task_id = %task.id, error = %error, "failed to record breaker failure");
                }
            }
            Decision::PauseAndRetry { pause_ms } => {
                if let Err(error) = self
                    .limiter
                    .trigger_global_pause(failure.message(), *pause_ms)
                    .await
                {
                    warn!(task_id = %task.id, error = %error, "failed to trigger global pause");
                }
            }
            Decision::AckAsFailed | Decision::FailTerminal | Decision::FailRetryable => {}
        }
        self.write_record(&task, decision.status(), decision.is_retryable())
            .await;

        if decision.propagates() {
            error!(
                task_id = %task.id,
                user_id = %task.user_id,
                kind = failure.kind(),
                code = %failure.code(),
                error = %failure.message(),
                "task failed"
            );
            Err(failure)
        } else {
            warn!(
                task_id = %task.id,
                user_id = %task.user_id,
                code = %failure.code(),
                "task failed terminally, acknowledging"
            );
            Ok(ExecuteMutationResponse::failed_terminal(
                task.id,
                failure.message().to_string(),
                self.clock.now(),
            ))
        }
    }

    /// Status of a previous run that must not be repeated. Best-effort.
    async fn finished_status(&self, task: &MutationTask) -> Option<TaskStatus> {
        let path = DocPath::mutation_task(task.id.as_str());
        match get_doc::<TaskRecord>(self.store.as_ref(), &path).await {
            Ok(Some(record)) if record.is_finished() => Some(record.task.status),
            Ok(_) => None,
            Err(error) => {
                warn!(task_id = %task.id, error = %error, "failed to read task record, executing");
                None
            }
        }
    }

    async fn write_status(&self, task: &MutationTask, status: TaskStatus) {
        self.write_record(task, status, false).await;
    }

    async fn write_record(&self, task: &MutationTask, status: TaskStatus, retryable: bool) {
        let path = DocPath::mutation_task(task.id.as_str());
        let record = TaskRecord {
            task: task.clone().with_status(status),
            retryable,
        };
        let written = match encode_doc(&path, &record) {
            Ok(value) => self.store.set(&path, value).await,
            Err(e) => Err(e),
        };
        if let Err(error) = written {
            warn!(task_id = %task.id, status = %status, error = %error, "failed to write task status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::handlers::PositionalScarcityHandler;
    use crate::app::rate_limiter::StoreRateLimiter;
    use crate::config::RateLimitConfig;
    use crate::domain::{
        FailurePolicy, MutationType, PositionalScarcityPayload, REVOKED_REFRESH_TOKEN, TaskId,
        UpstreamError,
    };
    use crate::impls::{InMemoryDocumentStore, ScriptedOptimizer};
    use crate::ports::FixedClock;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    struct Fixture {
        store: Arc<InMemoryDocumentStore>,
        optimizer: Arc<ScriptedOptimizer>,
        service: ExecutionService,
    }

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 2, 15, 0, 0).unwrap()
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryDocumentStore::new());
        let optimizer = Arc::new(ScriptedOptimizer::new());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(now()));
        let mut registry = TypedRegistry::new();
        registry
            .register::<PositionalScarcityPayload, _>(PositionalScarcityHandler::new(
                optimizer.clone(),
            ))
            .unwrap();
        let limiter = Arc::new(StoreRateLimiter::new(
            store.clone(),
            clock.clone(),
            RateLimitConfig::default(),
        ));
        let service = ExecutionService::new(
            registry,
            limiter,
            store.clone(),
            clock,
            Arc::new(FailurePolicy),
        );
        Fixture {
            store,
            optimizer,
            service,
        }
    }

    fn request(mutation_type: MutationType) -> ExecuteMutationRequest {
        ExecuteMutationRequest {
            task: MutationTask::new(
                TaskId::new("task-1"),
                mutation_type,
                "u1",
                json!({"uid": "u1", "league_key": "423.l.9"}),
                now(),
            ),
        }
    }

    fn status(f: &Fixture) -> String {
        let doc = f.store.snapshot(&DocPath::mutation_task("task-1")).unwrap();
        doc["status"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn success_completes_and_consumes_a_token() {
        let f = fixture();
        let response = f
            .service
            .execute_mutation(request(MutationType::CalcPositionalScarcity))
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.status, TaskStatus::Completed);
        assert_eq!(status(&f), "COMPLETED");
        let bucket = f.store.snapshot(&DocPath::rate_limit("u1")).unwrap();
        assert_eq!(bucket["count"], 1);
    }

    #[tokio::test]
    async fn revoked_credential_is_acknowledged_as_failed() {
        let f = fixture();
        f.optimizer.fail_next(UpstreamError::new(
            Some(400),
            Some(REVOKED_REFRESH_TOKEN),
            "refresh token revoked",
        ));
        let response = f
            .service
            .execute_mutation(request(MutationType::CalcPositionalScarcity))
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.status, TaskStatus::Failed);
        assert_eq!(status(&f), "FAILED");
    }

    #[tokio::test]
    async fn bad_payload_fails_terminally() {
        let f = fixture();
        let mut req = request(MutationType::CalcPositionalScarcity);
        req.task.payload = json!({"uid": "u1"});
        let err = f.service.execute_mutation(req).await.unwrap_err();
        assert_eq!(err.kind(), "DomainError");
        assert_eq!(status(&f), "FAILED");
        assert_eq!(f.optimizer.total_calls(), 0);
    }

    #[tokio::test]
    async fn upstream_rate_limit_counts_against_the_breaker() {
        let f = fixture();
        f.optimizer
            .fail_next(UpstreamError::new(Some(429), None, "slow down").with_retry_after(30));
        let err = f
            .service
            .execute_mutation(request(MutationType::CalcPositionalScarcity))
            .await
            .unwrap_err();
        assert_eq!(err.retry_after(), Some(30));
        assert_eq!(status(&f), "FAILED");
        let breaker = f.store.snapshot(&DocPath::circuit_breaker()).unwrap();
        assert_eq!(breaker["failureCount"], 1);
    }

    #[tokio::test]
    async fn maintenance_pauses_and_leaves_task_pending() {
        let f = fixture();
        f.optimizer
            .fail_next(UpstreamError::new(Some(503), None, "maintenance").with_retry_after(120));
        let err = f
            .service
            .execute_mutation(request(MutationType::CalcPositionalScarcity))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ServiceUnavailableError");
        assert_eq!(status(&f), "PENDING");
        let pause = f.store.snapshot(&DocPath::global_pause()).unwrap();
        assert_eq!(pause["isPaused"], true);
        assert_eq!(pause["pauseDurationMs"], 120_000);

        // Every later task is held back by the pause.
        let err = f
            .service
            .execute_mutation(request(MutationType::CalcPositionalScarcity))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "GLOBAL_PAUSE");
        assert_eq!(f.optimizer.total_calls(), 1);
    }

    #[tokio::test]
    async fn exhausted_budget_is_rejected_before_the_handler() {
        let f = fixture();
        f.store.insert(
            DocPath::rate_limit("u1"),
            json!({"count": 10, "windowStart": now().timestamp_millis(), "windowSizeMs": 60_000}),
        );
        let err = f
            .service
            .execute_mutation(request(MutationType::CalcPositionalScarcity))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "RateLimitError");
        assert_eq!(err.retry_after(), Some(60));
        assert_eq!(status(&f), "PENDING");
        assert_eq!(f.optimizer.total_calls(), 0);
    }

    #[tokio::test]
    async fn unregistered_type_is_a_system_error() {
        let f = fixture();
        let err = f
            .service
            .execute_mutation(request(MutationType::SetLineup))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "SystemError");
        assert_eq!(status(&f), "FAILED");
    }

    #[tokio::test]
    async fn completed_task_is_not_run_again() {
        let f = fixture();
        let first = f
            .service
            .execute_mutation(request(MutationType::CalcPositionalScarcity))
            .await
            .unwrap();
        let second = f
            .service
            .execute_mutation(request(MutationType::CalcPositionalScarcity))
            .await
            .unwrap();
        assert_eq!(first.status, TaskStatus::Completed);
        assert_eq!(second.status, TaskStatus::Completed);
        assert_eq!(f.optimizer.total_calls(), 1);
        let bucket = f.store.snapshot(&DocPath::rate_limit("u1")).unwrap();
        assert_eq!(bucket["count"], 1);
    }

    #[tokio::test]
    async fn terminal_failure_is_acknowledged_on_redelivery() {
        let f = fixture();
        let mut req = request(MutationType::CalcPositionalScarcity);
        req.task.payload = json!({"uid": "u1"});
        f.service.execute_mutation(req.clone()).await.unwrap_err();

        let response = f.service.execute_mutation(req).await.unwrap();
        assert!(response.success);
        assert_eq!(response.status, TaskStatus::Failed);
        assert_eq!(status(&f), "FAILED");
    }

    #[tokio::test]
    async fn retryable_failure_runs_again_on_redelivery() {
        let f = fixture();
        f.optimizer
            .fail_next(UpstreamError::new(Some(500), None, "boom"));
        f.service
            .execute_mutation(request(MutationType::CalcPositionalScarcity))
            .await
            .unwrap_err();
        let record = f.store.snapshot(&DocPath::mutation_task("task-1")).unwrap();
        assert_eq!(record["retryable"], true);

        let response = f
            .service
            .execute_mutation(request(MutationType::CalcPositionalScarcity))
            .await
            .unwrap();
        assert_eq!(response.status, TaskStatus::Completed);
        assert_eq!(f.optimizer.total_calls(), 2);
        let record = f.store.snapshot(&DocPath::mutation_task("task-1")).unwrap();
        assert!(record.get("retryable").is_none());
    }

    #[tokio::test]
    async fn status_write_failures_do_not_mask_the_outcome() {
        let f = fixture();
        f.store.fail_collection("mutationTasks");
        let response = f
            .service
            .execute_mutation(request(MutationType::CalcPositionalScarcity))
            .await
            .unwrap();
        assert_eq!(response.status, TaskStatus::Completed);
    }
}
