//! QueueTask - what actually goes onto the durable push queue.
//!
//! One task per eligible user, addressed to the execution endpoint, with a
//! base64-encoded JSON body `{"task": MutationTask}` and a dispatch deadline.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use super::MutationTask;

/// Path of the execution endpoint, relative to the service base URL.
pub const EXECUTE_PATH: &str = "/mutations/execute/mutation";

/// Body of `POST /mutations/execute/mutation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteMutationRequest {
    pub task: MutationTask,
}

/// Validated addressing for queue entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTarget {
    /// Fully qualified queue name: `projects/{p}/locations/{l}/queues/{q}`.
    pub queue_path: String,
    pub execute_url: String,
    pub dispatch_deadline_secs: u64,
}

/// An HTTP push entry ready for the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueTask {
    /// `{queue_path}/tasks/{task_id}`; also gives the queue a dedupe key.
    pub name: String,
    pub url: String,
    pub http_method: String,
    pub content_type: String,
    /// Base64 of the JSON request body.
    pub body: String,
    /// Protobuf duration string, e.g. `"300s"`.
    pub dispatch_deadline: String,
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("json encode/decode: {0}")]
    Json(#[from] serde_json::Error),
    #[error("base64 decode: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl QueueTask {
    pub fn for_mutation(task: &MutationTask, target: &QueueTarget) -> Result<Self, EnvelopeError> {
        let body = serde_json::to_vec(&ExecuteMutationRequest { task: task.clone() })?;
        Ok(Self {
            name: format!("{}/tasks/{}", target.queue_path, task.id),
            url: target.execute_url.clone(),
            http_method: "POST".to_string(),
            content_type: "application/json".to_string(),
            body: BASE64.encode(body),
            dispatch_deadline: format!("{}s", target.dispatch_deadline_secs),
        })
    }

    /// Decode the body the way the execution endpoint will see it.
    pub fn decode_request(&self) -> Result<ExecuteMutationRequest, EnvelopeError> {
        let bytes = BASE64.decode(&self.body)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
