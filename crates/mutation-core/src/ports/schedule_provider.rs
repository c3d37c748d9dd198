//! Upstream sports-data providers.
//!
//! Treated as unreliable: every call may fail, and callers decide how much
//! of a failure to tolerate.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::{League, UpstreamError};

#[async_trait]
pub trait GameScheduleProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Start timestamps (epoch ms) of the league's games on `date`.
    async fn game_start_times(
        &self,
        league: League,
        date: NaiveDate,
    ) -> Result<Vec<i64>, UpstreamError>;

    /// Team identifiers whose game on `date` was postponed.
    async fn postponed_teams(
        &self,
        league: League,
        date: NaiveDate,
    ) -> Result<Vec<String>, UpstreamError>;
}

#[async_trait]
pub trait StartingPlayersProvider: Send + Sync {
    /// Confirmed starters (goalies, pitchers) for the league on `date`.
    async fn starting_players(
        &self,
        league: League,
        date: NaiveDate,
    ) -> Result<Vec<String>, UpstreamError>;
}
