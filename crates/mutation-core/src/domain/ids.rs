//! Domain identifiers.
//!
//! Task ids travel through the external queue and come back inside an HTTP
//! body, so on the wire they are opaque strings. Ids minted here are
//! ULID-based (`task-<ulid>`), which keeps them time-sortable in the store.

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

const TASK_PREFIX: &str = "task-";

/// Identifier of a [`MutationTask`](super::MutationTask).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Build a prefixed id from a ULID.
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(format!("{TASK_PREFIX}{ulid}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Ulid> for TaskId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
