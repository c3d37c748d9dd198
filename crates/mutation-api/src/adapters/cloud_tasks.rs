//! CloudTasksQueue - creates HTTP push tasks through the Cloud Tasks REST API.

use async_trait::async_trait;
use mutation_core::domain::QueueTask;
use mutation_core::ports::{QueueError, TaskQueue};
use reqwest::StatusCode;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

pub const DEFAULT_ENDPOINT: &str = "https://cloudtasks.googleapis.com/v2";

pub struct CloudTasksQueue {
    client: reqwest::Client,
    endpoint: String,
    access_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateTaskRequest<'a> {
    task: TaskResource<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskResource<'a> {
    name: &'a str,
    dispatch_deadline: &'a str,
    http_request: HttpRequest<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HttpRequest<'a> {
    url: &'a str,
    http_method: &'a str,
    headers: BTreeMap<&'static str, &'a str>,
    body: &'a str,
}

impl CloudTasksQueue {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        access_token: Option<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            access_token,
        }
    }

    /// `projects/p/locations/l/queues/q` from a fully qualified task name.
    fn parent(name: &str) -> Result<&str, QueueError> {
        name.rsplit_once("/tasks/")
            .map(|(parent, _)| parent)
            .ok_or_else(|| QueueError::Rejected(format!("malformed task name {name}")))
    }

    fn create_request(task: &QueueTask) -> CreateTaskRequest<'_> {
        CreateTaskRequest {
            task: TaskResource {
                name: &task.name,
                dispatch_deadline: &task.dispatch_deadline,
                http_request: HttpRequest {
                    url: &task.url,
                    http_method: &task.http_method,
                    headers: BTreeMap::from([("Content-Type", task.content_type.as_str())]),
                    body: &task.body,
                },
            },
        }
    }
}

#[async_trait]
impl TaskQueue for CloudTasksQueue {
    async fn enqueue(&self, task: &QueueTask) -> Result<(), QueueError> {
        let url = format!("{}/{}/tasks", self.endpoint, Self::parent(&task.name)?);
        let mut request = self.client.post(&url).json(&Self::create_request(task));
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(task = %task.name, "task created");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::CONFLICT => Err(QueueError::Rejected(format!(
                "task {} already exists",
                task.name
            ))),
            s if s.is_server_error() => Err(QueueError::Transport(format!("{s}: {body}"))),
            s => Err(QueueError::Rejected(format!("{s}: {body}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> QueueTask {
        QueueTask {
            name: "projects/p/locations/us-central1/queues/mutations/tasks/task-1".into(),
            url: "https://api.example.com/mutations/execute/mutation".into(),
            http_method: "POST".into(),
            content_type: "application/json".into(),
            body: "e30=".into(),
            dispatch_deadline: "300s".into(),
        }
    }

    #[test]
    fn parent_is_the_queue_path() {
        let task = task();
        assert_eq!(
            CloudTasksQueue::parent(&task.name).unwrap(),
            "projects/p/locations/us-central1/queues/mutations"
        );
        assert!(CloudTasksQueue::parent("no-tasks-segment").is_err());
    }

    #[test]
    fn create_request_wire_shape() {
        let task = task();
        let v = serde_json::to_value(CloudTasksQueue::create_request(&task)).unwrap();
        assert_eq!(v["task"]["dispatchDeadline"], "300s");
        assert_eq!(v["task"]["httpRequest"]["httpMethod"], "POST");
        assert_eq!(
            v["task"]["httpRequest"]["headers"]["Content-Type"],
            "application/json"
        );
        assert_eq!(v["task"]["httpRequest"]["body"], "e30=");
    }
}
