//! TeamRepository port - the managed team snapshot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{League, TeamDocument};
use crate::ports::StoreError;

#[async_trait]
pub trait TeamRepository: Send + Sync {
    /// Teams that are setting lineups, in one of `leagues`, and whose season
    /// has not ended at `now`. One query per call.
    ///
    /// Documents come back unparsed; validation belongs to the caller.
    async fn fetch_active_teams(
        &self,
        leagues: &[League],
        now: DateTime<Utc>,
    ) -> Result<Vec<TeamDocument>, StoreError>;

    /// Teams with automated transactions enabled whose season has not ended
    /// at `now`, across every league. One query per call.
    async fn fetch_transaction_teams(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<TeamDocument>, StoreError>;

    /// Current documents for `team_keys`; missing teams are left out.
    async fn fetch_teams(&self, team_keys: &[String]) -> Result<Vec<TeamDocument>, StoreError>;

    /// Stamp `last_updated` and reset the failure counter of existing teams.
    async fn mark_lineups_updated(&self, team_keys: &[String], at_ms: i64)
    -> Result<(), StoreError>;

    /// Bump `lineup_failure_count` and stamp `last_lineup_failure_at` of existing teams.
    async fn record_lineup_failure(
        &self,
        team_keys: &[String],
        at_ms: i64,
    ) -> Result<(), StoreError>;
}
