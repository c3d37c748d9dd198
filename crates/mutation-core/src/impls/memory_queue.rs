//! InMemoryTaskQueue - records enqueued tasks instead of pushing them.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use crate::domain::QueueTask;
use crate::ports::{QueueError, TaskQueue};

#[derive(Default)]
struct Inner {
    tasks: Vec<QueueTask>,
    /// Users whose task should be rejected, matched against the decoded body.
    rejected_users: HashSet<String>,
}

#[derive(Default)]
pub struct InMemoryTaskQueue {
    inner: Mutex<Inner>,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn reject_user(&self, user_id: &str) {
        self.lock().rejected_users.insert(user_id.to_string());
    }

    pub fn tasks(&self) -> Vec<QueueTask> {
        self.lock().tasks.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, task: &QueueTask) -> Result<(), QueueError> {
        let mut inner = self.lock();
        if !inner.rejected_users.is_empty() {
            let request = task
                .decode_request()
                .map_err(|e| QueueError::Rejected(e.to_string()))?;
            if inner.rejected_users.contains(&request.task.user_id) {
                return Err(QueueError::Rejected(format!(
                    "task for user {} rejected",
                    request.task.user_id
                )));
            }
        }
        // Same name means the queue already holds it.
        if inner.tasks.iter().any(|t| t.name == task.name) {
            return Err(QueueError::Rejected(format!(
                "task {} already exists",
                task.name
            )));
        }
        inner.tasks.push(task.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MutationTask, MutationType, QueueTarget, TaskId};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn queue_task(id: &str, user: &str) -> QueueTask {
        let task = MutationTask::new(
            TaskId::new(id),
            MutationType::SetLineup,
            user,
            json!({"uid": user, "teams": []}),
            Utc.with_ymd_and_hms(2024, 4, 2, 15, 0, 0).unwrap(),
        );
        let target = QueueTarget {
            queue_path: "projects/p/locations/l/queues/q".into(),
            execute_url: "http://localhost/mutations/execute/mutation".into(),
            dispatch_deadline_secs: 300,
        };
        QueueTask::for_mutation(&task, &target).unwrap()
    }

    #[tokio::test]
    async fn records_tasks_in_order() {
        let queue = InMemoryTaskQueue::new();
        queue.enqueue(&queue_task("a", "u1")).await.unwrap();
        queue.enqueue(&queue_task("b", "u2")).await.unwrap();
        let names: Vec<String> = queue.tasks().into_iter().map(|t| t.name).collect();
        assert!(names[0].ends_with("/tasks/a"));
        assert!(names[1].ends_with("/tasks/b"));
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() {
        let queue = InMemoryTaskQueue::new();
        queue.enqueue(&queue_task("a", "u1")).await.unwrap();
        assert!(queue.enqueue(&queue_task("a", "u1")).await.is_err());
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn rejected_user_fails_enqueue() {
        let queue = InMemoryTaskQueue::new();
        queue.reject_user("u2");
        queue.enqueue(&queue_task("a", "u1")).await.unwrap();
        assert!(matches!(
            queue.enqueue(&queue_task("b", "u2")).await,
            Err(QueueError::Rejected(_))
        ));
    }
}
