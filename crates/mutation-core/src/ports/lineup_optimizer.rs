//! LineupOptimizer port - the black-box mutation backend.
//!
//! Computes and applies lineup changes and roster transactions against the
//! fantasy API. Failures come back raw as [`UpstreamError`] and are
//! classified by the execution service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::domain::{League, TeamPayload, UpstreamError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineupRequest {
    pub uid: String,
    pub teams: Vec<TeamPayload>,
    /// Today's postponed teams; their players should not be started.
    #[serde(default)]
    pub postponed_teams: Vec<String>,
    #[serde(default)]
    pub starting_players: BTreeMap<League, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_changes: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineupReport {
    /// Teams whose lineup was written.
    #[serde(default)]
    pub updated_team_keys: Vec<String>,
    #[serde(default)]
    pub changes: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub uid: String,
    pub teams: Vec<TeamPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_transactions: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReport {
    #[serde(default)]
    pub executed: Vec<Value>,
}

#[async_trait]
pub trait LineupOptimizer: Send + Sync {
    async fn set_lineups(&self, request: &LineupRequest) -> Result<LineupReport, UpstreamError>;

    async fn process_transactions(
        &self,
        request: &TransactionRequest,
    ) -> Result<TransactionReport, UpstreamError>;

    async fn recalculate_positional_scarcity(
        &self,
        uid: &str,
        league_key: &str,
    ) -> Result<(), UpstreamError>;
}
