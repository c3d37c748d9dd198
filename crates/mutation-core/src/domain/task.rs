use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{TaskId, TaskStatus};

/// Kind of deferred work carried by a [`MutationTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationType {
    SetLineup,
    WeeklyTransactions,
    CalcPositionalScarcity,
}

impl MutationType {
    pub const ALL: [MutationType; 3] = [
        MutationType::SetLineup,
        MutationType::WeeklyTransactions,
        MutationType::CalcPositionalScarcity,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MutationType::SetLineup => "SET_LINEUP",
            MutationType::WeeklyTransactions => "WEEKLY_TRANSACTIONS",
            MutationType::CalcPositionalScarcity => "CALC_POSITIONAL_SCARCITY",
        }
    }

    /// Short label for log lines and response messages.
    pub fn label(self) -> &'static str {
        match self {
            MutationType::SetLineup => "set-lineup",
            MutationType::WeeklyTransactions => "weekly-transactions",
            MutationType::CalcPositionalScarcity => "calc-positional-scarcity",
        }
    }
}

impl fmt::Display for MutationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit of deferred work.
///
/// Created by the dispatcher, mutated only by the execution service. The
/// payload stays raw JSON here; it is decoded into the type-specific struct
/// only when the task executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationTask {
    pub id: TaskId,
    #[serde(rename = "type")]
    pub mutation_type: MutationType,
    pub payload: serde_json::Value,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub status: TaskStatus,
}

impl MutationTask {
    pub fn new(
        id: TaskId,
        mutation_type: MutationType,
        user_id: impl Into<String>,
        payload: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            mutation_type,
            payload,
            user_id: user_id.into(),
            created_at,
            status: TaskStatus::Pending,
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn task_uses_camel_case_wire_format() {
        let created = Utc.with_ymd_and_hms(2024, 4, 2, 15, 0, 0).unwrap();
        let task = MutationTask::new(
            TaskId::new("task-1"),
            MutationType::SetLineup,
            "user-1",
            serde_json::json!({"uid": "user-1", "teams": []}),
            created,
        );

        let v = serde_json::to_value(&task).unwrap();
        assert_eq!(v["id"], "task-1");
        assert_eq!(v["type"], "SET_LINEUP");
        assert_eq!(v["userId"], "user-1");
        assert_eq!(v["status"], "PENDING");
        assert!(v["createdAt"].is_string());
    }

    #[test]
    fn unknown_type_is_rejected() {
        let raw = serde_json::json!({
            "id": "t",
            "type": "DROP_EVERYONE",
            "payload": {},
            "userId": "u",
            "createdAt": "2024-04-02T15:00:00Z",
            "status": "PENDING",
        });
        assert!(serde_json::from_value::<MutationTask>(raw).is_err());
    }
}
