//! Result shapes returned to the queue and to manual callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{League, TaskId, TaskStatus};

/// Result of `executeMutation` when the queue should stop retrying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteMutationResponse {
    pub success: bool,
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub message: String,
    pub processed_at: DateTime<Utc>,
}

impl ExecuteMutationResponse {
    pub fn completed(task_id: TaskId, processed_at: DateTime<Utc>) -> Self {
        Self {
            success: true,
            task_id,
            status: TaskStatus::Completed,
            message: "Mutation executed successfully".to_string(),
            processed_at,
        }
    }

    /// Terminal failure reported as handled, so the queue drops the task.
    pub fn failed_terminal(
        task_id: TaskId,
        message: impl Into<String>,
        processed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            success: true,
            task_id,
            status: TaskStatus::Failed,
            message: message.into(),
            processed_at,
        }
    }
}

/// Result of one dispatch pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResponse {
    pub success: bool,
    pub task_count: usize,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub leagues: Vec<League>,
}

impl DispatchResponse {
    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            success: true,
            task_count: 0,
            message: message.into(),
            leagues: Vec::new(),
        }
    }

    pub fn enqueued(task_count: usize, message: impl Into<String>, leagues: Vec<League>) -> Self {
        Self {
            success: true,
            task_count,
            message: message.into(),
            leagues,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn execute_response_wire_shape() {
        let at = Utc.with_ymd_and_hms(2024, 4, 2, 15, 0, 0).unwrap();
        let r = ExecuteMutationResponse::failed_terminal(TaskId::new("t1"), "revoked", at);
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["success"], true);
        assert_eq!(v["taskId"], "t1");
        assert_eq!(v["status"], "FAILED");
        assert!(v["processedAt"].is_string());
    }

    #[test]
    fn skipped_dispatch_has_no_tasks() {
        let r = DispatchResponse::skipped("nothing to do");
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["taskCount"], 0);
        assert!(v.get("leagues").is_none());
    }
}
