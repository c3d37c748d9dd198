//! DocumentStore port - the shared transactional store.
//!
//! All cross-instance state (rate limits, breaker, pause, task status,
//! schedule caches, team documents) lives here. Documents are JSON values
//! addressed by `collection/id`.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::domain::{MutationError, SystemError};

pub const RATE_LIMITS: &str = "rateLimits";
pub const CIRCUIT_BREAKER_DOC: &str = "circuitBreaker";
pub const GLOBAL_PAUSE_DOC: &str = "global";
pub const MUTATION_TASKS: &str = "mutationTasks";
pub const SCHEDULE: &str = "schedule";
pub const SCHEDULE_TODAY_DOC: &str = "today";
pub const POSTPONED_TEAMS_DOC: &str = "postponedTeams";
pub const STARTING_PLAYERS: &str = "startingPlayers";
pub const TEAMS: &str = "teams";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath {
    pub collection: String,
    pub id: String,
}

impl DocPath {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn rate_limit(user_id: &str) -> Self {
        Self::new(RATE_LIMITS, user_id)
    }

    pub fn circuit_breaker() -> Self {
        Self::new(RATE_LIMITS, CIRCUIT_BREAKER_DOC)
    }

    pub fn global_pause() -> Self {
        Self::new(RATE_LIMITS, GLOBAL_PAUSE_DOC)
    }

    pub fn mutation_task(task_id: &str) -> Self {
        Self::new(MUTATION_TASKS, task_id)
    }

    pub fn schedule_today() -> Self {
        Self::new(SCHEDULE, SCHEDULE_TODAY_DOC)
    }

    pub fn postponed_teams() -> Self {
        Self::new(SCHEDULE, POSTPONED_TEAMS_DOC)
    }

    pub fn starting_players(league: &str) -> Self {
        Self::new(STARTING_PLAYERS, league)
    }

    pub fn team(team_key: &str) -> Self {
        Self::new(TEAMS, team_key)
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("document {path} is malformed: {message}")]
    Malformed { path: String, message: String },
}

impl From<StoreError> for MutationError {
    fn from(value: StoreError) -> Self {
        MutationError::System(SystemError {
            message: value.to_string(),
            retryable: true,
            status: None,
            code: Some("STORE_ERROR".to_string()),
        })
    }
}

/// Update step of a transaction.
///
/// Receives the current document (if any) and returns the document to write,
/// `None` to leave it untouched, or an error to abort. Stores may invoke it
/// more than once under contention, so it must not have side effects.
pub type TxUpdate<'a> =
    &'a (dyn Fn(Option<&Value>) -> Result<Option<Value>, MutationError> + Send + Sync);

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &DocPath) -> Result<Option<Value>, StoreError>;

    async fn set(&self, path: &DocPath, value: Value) -> Result<(), StoreError>;

    /// Shallow-merge `fields` into the document, creating it if missing.
    async fn merge(&self, path: &DocPath, fields: Value) -> Result<(), StoreError>;

    /// All documents of a collection as `(id, data)`.
    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, StoreError>;

    /// Atomic read-modify-write of one document.
    ///
    /// Returns the document as it stands once the transaction committed.
    async fn transaction(
        &self,
        path: &DocPath,
        update: TxUpdate<'_>,
    ) -> Result<Option<Value>, MutationError>;
}

pub fn decode_doc<T: DeserializeOwned>(path: &DocPath, value: Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::Malformed {
        path: path.to_string(),
        message: e.to_string(),
    })
}

pub fn encode_doc<T: Serialize>(path: &DocPath, value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Malformed {
        path: path.to_string(),
        message: e.to_string(),
    })
}

/// Read and decode one document.
pub async fn get_doc<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    path: &DocPath,
) -> Result<Option<T>, StoreError> {
    match store.get(path).await? {
        Some(value) => decode_doc(path, value).map(Some),
        None => Ok(None),
    }
}
