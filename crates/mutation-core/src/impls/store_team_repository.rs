//! StoreTeamRepository - TeamRepository over the `teams` collection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use tracing::debug;
use std::sync::Arc;

use crate::domain::{League, TeamDocument};
use crate::ports::{DocPath, DocumentStore, StoreError, TeamRepository, document_store::TEAMS};

pub struct StoreTeamRepository {
    store: Arc<dyn DocumentStore>,
}

impl StoreTeamRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

/// Season not over at `now`. A missing `end_date` is let through.
fn season_open(doc: &TeamDocument, now_ms: i64) -> bool {
    doc.data
        .get("end_date")
        .and_then(Value::as_i64)
        .is_none_or(|end| end >= now_ms)
}

fn flag(doc: &TeamDocument, field: &str, default: bool) -> bool {
    doc.data.get(field).and_then(Value::as_bool).unwrap_or(default)
}

/// Lineup query: setting lineups, in a requested league, season not over.
///
/// Fields the filter cannot read are let through so schema validation can
/// reject and count the document downstream.
fn matches_lineup_query(doc: &TeamDocument, leagues: &[League], now_ms: i64) -> bool {
    let in_league = doc.league().is_some_and(|l| leagues.contains(&l));
    flag(doc, "is_setting_lineups", true) && in_league && season_open(doc, now_ms)
}

/// Transaction query: automated transactions enabled, season not over.
fn matches_transaction_query(doc: &TeamDocument, now_ms: i64) -> bool {
    flag(doc, "automated_transaction_processing", false) && season_open(doc, now_ms)
}

impl StoreTeamRepository {
    async fn query(
        &self,
        keep: impl Fn(&TeamDocument) -> bool + Send,
    ) -> Result<Vec<TeamDocument>, StoreError> {
        let docs = self.store.list(TEAMS).await?;
        Ok(docs
            .into_iter()
            .map(|(id, data)| TeamDocument::new(id, data))
            .filter(|doc| keep(doc))
            .collect())
    }

    /// Rewrite an existing team document; a missing one is left missing.
    async fn update_existing(
        &self,
        team_key: &str,
        update: &(dyn Fn(&mut Map<String, Value>) + Send + Sync),
    ) -> Result<(), StoreError> {
        let path = DocPath::team(team_key);
        let written = self
            .store
            .transaction(&path, &|current| match current {
                Some(Value::Object(map)) => {
                    let mut doc = map.clone();
                    update(&mut doc);
                    Ok(Some(Value::Object(doc)))
                }
                _ => Ok(None),
            })
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        if written.is_none() {
            debug!(team_key, "team document missing, bookkeeping skipped");
        }
        Ok(())
    }
}

#[async_trait]
impl TeamRepository for StoreTeamRepository {
    async fn fetch_active_teams(
        &self,
        leagues: &[League],
        now: DateTime<Utc>,
    ) -> Result<Vec<TeamDocument>, StoreError> {
        let now_ms = now.timestamp_millis();
        self.query(|doc| matches_lineup_query(doc, leagues, now_ms))
            .await
    }

    async fn fetch_transaction_teams(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<TeamDocument>, StoreError> {
        let now_ms = now.timestamp_millis();
        self.query(|doc| matches_transaction_query(doc, now_ms)).await
    }

    async fn fetch_teams(&self, team_keys: &[String]) -> Result<Vec<TeamDocument>, StoreError> {
        let mut docs = Vec::with_capacity(team_keys.len());
        for team_key in team_keys {
            if let Some(data) = self.store.get(&DocPath::team(team_key)).await? {
                docs.push(TeamDocument::new(team_key.clone(), data));
            }
        }
        Ok(docs)
    }

    async fn mark_lineups_updated(
        &self,
        team_keys: &[String],
        at_ms: i64,
    ) -> Result<(), StoreError> {
        for team_key in team_keys {
            self.update_existing(team_key, &|doc| {
                doc.insert("last_updated".into(), json!(at_ms));
                doc.insert("lineup_failure_count".into(), json!(0));
            })
            .await?;
        }
        Ok(())
    }

    async fn record_lineup_failure(
        &self,
        team_keys: &[String],
        at_ms: i64,
    ) -> Result<(), StoreError> {
        for team_key in team_keys {
            self.update_existing(team_key, &|doc| {
                let count = doc
                    .get("lineup_failure_count")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                doc.insert("lineup_failure_count".into(), json!(count + 1));
                doc.insert("last_lineup_failure_at".into(), json!(at_ms));
            })
            .await?;
        }
        Ok(())
    }
}
