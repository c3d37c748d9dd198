//! HTTP handlers.
//!
//! Dispatch routes are triggered by the scheduler or an operator; the execute
//! route is called by the task queue.

use axum::Json;
use axum::extract::State;
use mutation_core::app::DispatchRequest;
use mutation_core::domain::{DispatchResponse, ExecuteMutationRequest, ExecuteMutationResponse};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::AppState;
use crate::error::ApiError;
use crate::validate::{
    Validate, ValidatedJson, into_result, require_non_empty, require_non_empty_opt,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetLineupBody {
    pub user_id: Option<String>,
    pub team_key: Option<String>,
    pub lineup_changes: Option<Vec<Value>>,
    pub skip_games_check: Option<bool>,
}

impl Validate for SetLineupBody {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        require_non_empty_opt(&mut errors, "userId", self.user_id.as_deref());
        require_non_empty_opt(&mut errors, "teamKey", self.team_key.as_deref());
        into_result(errors)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WeeklyTransactionsBody {
    pub user_id: Option<String>,
    pub team_key: Option<String>,
    pub transactions: Option<Vec<Value>>,
}

impl Validate for WeeklyTransactionsBody {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        require_non_empty_opt(&mut errors, "userId", self.user_id.as_deref());
        require_non_empty_opt(&mut errors, "teamKey", self.team_key.as_deref());
        into_result(errors)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionalScarcityBody {
    pub user_id: String,
    pub league_key: String,
}

impl Validate for PositionalScarcityBody {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        require_non_empty(&mut errors, "userId", &self.user_id);
        require_non_empty(&mut errors, "leagueKey", &self.league_key);
        into_result(errors)
    }
}

impl Validate for ExecuteMutationRequest {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        require_non_empty(&mut errors, "task.id", self.task.id.as_str());
        require_non_empty(&mut errors, "task.userId", &self.task.user_id);
        if !self.task.payload.is_object() {
            errors.push("task.payload must be an object".to_string());
        }
        into_result(errors)
    }
}

pub async fn set_lineup(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<SetLineupBody>,
) -> Result<Json<DispatchResponse>, ApiError> {
    let request = DispatchRequest {
        user_id: body.user_id,
        team_key: body.team_key,
        changes: body.lineup_changes,
        skip_games_check: body.skip_games_check.unwrap_or(false),
    };
    Ok(Json(state.dispatcher.dispatch_set_lineup(&request).await?))
}

pub async fn weekly_transactions(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<WeeklyTransactionsBody>,
) -> Result<Json<DispatchResponse>, ApiError> {
    let request = DispatchRequest {
        user_id: body.user_id,
        team_key: body.team_key,
        changes: body.transactions,
        skip_games_check: false,
    };
    Ok(Json(
        state.dispatcher.dispatch_weekly_transactions(&request).await?,
    ))
}

pub async fn calc_positional_scarcity(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<PositionalScarcityBody>,
) -> Result<Json<DispatchResponse>, ApiError> {
    Ok(Json(
        state
            .dispatcher
            .dispatch_positional_scarcity(&body.user_id, &body.league_key)
            .await?,
    ))
}

pub async fn execute_mutation(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<ExecuteMutationRequest>,
) -> Result<Json<ExecuteMutationResponse>, ApiError> {
    match state.executor.execute_mutation(request).await {
        Ok(response) => Ok(Json(response)),
        Err(error) => Err(ApiError::from_mutation(error, &state.executor).await),
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "mutation-api" }))
}
