//! Type-specific task payloads.
//!
//! Stored as raw JSON in [`MutationTask::payload`](super::MutationTask) and
//! decoded only when the task executes.

use serde::{Deserialize, Serialize};

use super::TeamPayload;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetLineupPayload {
    pub uid: String,
    pub teams: Vec<TeamPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_changes: Option<Vec<serde_json::Value>>,
    /// Dispatched with the game check bypassed; execution honours the same override.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skip_games_check: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyTransactionsPayload {
    pub uid: String,
    pub teams: Vec<TeamPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_transactions: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionalScarcityPayload {
    pub uid: String,
    pub league_key: String,
}
