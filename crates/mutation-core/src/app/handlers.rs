//! Mutation handlers, one per [`MutationType`].
//!
//! Each delegates to the [`LineupOptimizer`] and converts its raw
//! [`UpstreamError`](crate::domain::UpstreamError) into a classified
//! [`MutationError`].

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::scheduling::still_needs_lineup;
use crate::domain::{
    League, MutationError, MutationTask, PositionalScarcityPayload, PostponedTeamsDocument,
    ReferenceCalendar, ScheduleInfo, SetLineupPayload, StartingPlayersDocument, TeamPayload,
    WeeklyTransactionsPayload,
};
use crate::ports::{
    Clock, DocPath, DocumentStore, LineupOptimizer, LineupRequest, ScheduleSource,
    TeamRepository, TransactionRequest, get_doc,
};
use crate::typed::Handler;

/// Sets lineups and keeps the per-team bookkeeping the scheduler reads.
///
/// Each team is re-read before the optimizer call and dropped when the
/// scheduling rules no longer select it, so a redelivered task does not set
/// the same lineup twice.
pub struct SetLineupHandler {
    optimizer: Arc<dyn LineupOptimizer>,
    teams: Arc<dyn TeamRepository>,
    schedule: Arc<dyn ScheduleSource>,
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    calendar: ReferenceCalendar,
}

impl SetLineupHandler {
    pub fn new(
        optimizer: Arc<dyn LineupOptimizer>,
        teams: Arc<dyn TeamRepository>,
        schedule: Arc<dyn ScheduleSource>,
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        calendar: ReferenceCalendar,
    ) -> Self {
        Self {
            optimizer,
            teams,
            schedule,
            store,
            clock,
            calendar,
        }
    }

    /// The latest version of each team that still needs a lineup now.
    ///
    /// When the current documents or the schedule cannot be read the
    /// dispatched snapshot is used unchanged.
    async fn pending_teams(
        &self,
        dispatched: Vec<TeamPayload>,
        skip_games_check: bool,
    ) -> Vec<TeamPayload> {
        let keys: Vec<String> = dispatched.iter().map(|t| t.team_key.clone()).collect();
        let current = match self.teams.fetch_teams(&keys).await {
            Ok(docs) => docs,
            Err(error) => {
                warn!(error = %error, "failed to reload teams, using dispatched snapshot");
                return dispatched;
            }
        };
        let schedule = if skip_games_check {
            ScheduleInfo::all_leagues_active()
        } else {
            match self.schedule.get_schedule_info().await {
                Ok(schedule) => schedule,
                Err(error) => {
                    warn!(error = %error, "failed to load schedule, using dispatched snapshot");
                    return dispatched;
                }
            }
        };

        let now = self.clock.now();
        let current: BTreeMap<String, _> =
            current.into_iter().map(|doc| (doc.id.clone(), doc)).collect();
        dispatched
            .into_iter()
            .filter_map(|team| {
                let Some(doc) = current.get(&team.team_key) else {
                    debug!(team_key = %team.team_key, "team no longer managed, skipping");
                    return None;
                };
                let latest = doc.parse().unwrap_or(team);
                if still_needs_lineup(&latest, &schedule, &self.calendar, now) {
                    Some(latest)
                } else {
                    debug!(team_key = %latest.team_key, "lineup already handled, skipping");
                    None
                }
            })
            .collect()
    }

    /// Today's postponed teams, as recorded by the dispatcher. Best-effort.
    async fn postponed_teams(&self, date_key: &str) -> Vec<String> {
        let path = DocPath::postponed_teams();
        match get_doc::<PostponedTeamsDocument>(self.store.as_ref(), &path).await {
            Ok(Some(doc)) if doc.date == date_key => doc.teams,
            Ok(_) => Vec::new(),
            Err(error) => {
                warn!(error = %error, "failed to read postponed teams");
                Vec::new()
            }
        }
    }

    /// Today's starters for the given leagues. Best-effort.
    async fn starting_players(
        &self,
        leagues: &BTreeSet<League>,
        date_key: &str,
    ) -> BTreeMap<League, Vec<String>> {
        let mut players = BTreeMap::new();
        for &league in leagues.iter().filter(|l| l.has_starting_players()) {
            let path = DocPath::starting_players(league.as_str());
            match get_doc::<StartingPlayersDocument>(self.store.as_ref(), &path).await {
                Ok(Some(doc)) if doc.date == date_key => {
                    players.insert(league, doc.players);
                }
                Ok(_) => {}
                Err(error) => warn!(league = %league, error = %error, "failed to read starting players"),
            }
        }
        players
    }
}

#[async_trait]
impl Handler<SetLineupPayload> for SetLineupHandler {
    async fn handle(
        &self,
        task: &MutationTask,
        payload: SetLineupPayload,
    ) -> Result<(), MutationError> {
        if payload.teams.is_empty() {
            return Err(MutationError::invalid_payload("set-lineup payload has no teams"));
        }
        let teams = self
            .pending_teams(payload.teams, payload.skip_games_check)
            .await;
        if teams.is_empty() {
            info!(task_id = %task.id, user_id = %task.user_id, "no team needs its lineup set");
            return Ok(());
        }

        let now = self.clock.now();
        let date_key = self.calendar.date_key(now);
        let leagues: BTreeSet<League> = teams.iter().map(|t| t.game_code).collect();
        let team_keys: Vec<String> = teams.iter().map(|t| t.team_key.clone()).collect();

        let request = LineupRequest {
            uid: payload.uid,
            postponed_teams: self.postponed_teams(&date_key).await,
            starting_players: self.starting_players(&leagues, &date_key).await,
            teams,
            requested_changes: payload.requested_changes,
        };

        match self.optimizer.set_lineups(&request).await {
            Ok(report) => {
                info!(
                    task_id = %task.id,
                    user_id = %task.user_id,
                    teams = team_keys.len(),
                    changes = report.changes.len(),
                    "lineups set"
                );
                if let Err(error) = self
                    .teams
                    .mark_lineups_updated(&team_keys, self.clock.now_ms())
                    .await
                {
                    warn!(task_id = %task.id, error = %error, "failed to stamp last_updated");
                }
                Ok(())
            }
            Err(upstream) => {
                let error = MutationError::from(upstream);
                if !error.is_revoked_credential()
                    && let Err(write_error) = self
                        .teams
                        .record_lineup_failure(&team_keys, self.clock.now_ms())
                        .await
                {
                    warn!(task_id = %task.id, error = %write_error, "failed to record lineup failure");
                }
                Err(error)
            }
        }
    }
}

pub struct WeeklyTransactionsHandler {
    optimizer: Arc<dyn LineupOptimizer>,
}

impl WeeklyTransactionsHandler {
    pub fn new(optimizer: Arc<dyn LineupOptimizer>) -> Self {
        Self { optimizer }
    }
}

#[async_trait]
impl Handler<WeeklyTransactionsPayload> for WeeklyTransactionsHandler {
    async fn handle(
        &self,
        task: &MutationTask,
        payload: WeeklyTransactionsPayload,
    ) -> Result<(), MutationError> {
        if payload.teams.is_empty() {
            return Err(MutationError::invalid_payload(
                "weekly-transactions payload has no teams",
            ));
        }
        let request = TransactionRequest {
            uid: payload.uid,
            teams: payload.teams,
            requested_transactions: payload.requested_transactions,
        };
        let report = self.optimizer.process_transactions(&request).await?;
        info!(
            task_id = %task.id,
            user_id = %task.user_id,
            executed = report.executed.len(),
            "weekly transactions processed"
        );
        Ok(())
    }
}

pub struct PositionalScarcityHandler {
    optimizer: Arc<dyn LineupOptimizer>,
}

impl PositionalScarcityHandler {
    pub fn new(optimizer: Arc<dyn LineupOptimizer>) -> Self {
        Self { optimizer }
    }
}

#[async_trait]
impl Handler<PositionalScarcityPayload> for PositionalScarcityHandler {
    async fn handle(
        &self,
        task: &MutationTask,
        payload: PositionalScarcityPayload,
    ) -> Result<(), MutationError> {
        self.optimizer
            .recalculate_positional_scarcity(&payload.uid, &payload.league_key)
            .await?;
        info!(task_id = %task.id, league_key = %payload.league_key, "positional scarcity recalculated");
        Ok(())
    }
}
