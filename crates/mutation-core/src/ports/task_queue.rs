//! TaskQueue port - the durable HTTP-push work queue.
//!
//! At-least-once delivery: the queue may hand the same task to the execution
//! endpoint more than once and retries on any non-2xx answer.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::QueueTask;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue rejected task: {0}")]
    Rejected(String),

    #[error("queue unreachable: {0}")]
    Transport(String),
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task: &QueueTask) -> Result<(), QueueError>;
}
