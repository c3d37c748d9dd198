//! SchedulingService - which teams need work right now.
//!
//! Eligibility for lineup work, in order:
//! 1. the document parses as a [`TeamPayload`] (otherwise skipped and counted)
//! 2. the team's season has started
//! 3. the team is not paused today
//! 4. the weekly deadline is daily, intraday, or today's weekday digit
//! 5. the lineup was not already set today, unless a game starts within the hour
//! 6. the team has not failed three times today
//!
//! Surviving teams are grouped by `uid`.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

use super::schedule_source::ProviderPair;
use crate::domain::{
    League, MutationError, PostponedTeamsDocument, ReferenceCalendar, ScheduleInfo,
    StartingPlayersDocument, TeamDocument, TeamPayload,
};
use crate::ports::{Clock, DocPath, DocumentStore, StartingPlayersProvider, encode_doc};

/// At this many failures today the team is left alone until tomorrow.
pub const MAX_DAILY_LINEUP_FAILURES: u32 = 3;

/// Outcome of eligibility mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EligibleTeams {
    pub by_user: BTreeMap<String, Vec<TeamPayload>>,
    /// Documents that failed schema validation.
    pub skipped_invalid: usize,
}

impl EligibleTeams {
    pub fn is_empty(&self) -> bool {
        self.by_user.is_empty()
    }

    pub fn user_count(&self) -> usize {
        self.by_user.len()
    }

    /// Keep only `user_id` and/or `team_key`, dropping users left without teams.
    pub fn restrict(&mut self, user_id: Option<&str>, team_key: Option<&str>) {
        if let Some(user_id) = user_id {
            self.by_user.retain(|uid, _| uid == user_id);
        }
        if let Some(team_key) = team_key {
            for teams in self.by_user.values_mut() {
                teams.retain(|t| t.team_key == team_key);
            }
            self.by_user.retain(|_, teams| !teams.is_empty());
        }
    }
}

/// Time-dependent inputs of one eligibility computation.
struct Today<'a> {
    calendar: &'a ReferenceCalendar,
    now: DateTime<Utc>,
    now_ms: i64,
    start_of_today_ms: i64,
    weekday: u32,
}

impl<'a> Today<'a> {
    fn new(calendar: &'a ReferenceCalendar, now: DateTime<Utc>) -> Self {
        Self {
            calendar,
            now,
            now_ms: now.timestamp_millis(),
            start_of_today_ms: calendar.start_of_today_ms(now),
            weekday: calendar.weekday_digit(now),
        }
    }

    fn is_today(&self, ts_ms: i64) -> bool {
        self.calendar.is_today(ts_ms, self.now)
    }
}

fn group(snapshot: &[TeamDocument], mut keep: impl FnMut(&TeamPayload) -> bool) -> EligibleTeams {
    let mut result = EligibleTeams::default();
    for doc in snapshot {
        let team = match doc.parse() {
            Ok(team) => team,
            Err(error) => {
                debug!(team_key = %doc.id, error = %error, "skipping invalid team document");
                result.skipped_invalid += 1;
                continue;
            }
        };
        if keep(&team) {
            result.by_user.entry(team.uid.clone()).or_default().push(team);
        }
    }
    result
}

fn is_paused_today(team: &TeamPayload, today: &Today) -> bool {
    team.is_paused() && today.is_today(team.lineup_paused_at)
}

fn needs_lineup(team: &TeamPayload, schedule: &ScheduleInfo, today: &Today) -> bool {
    if team.start_date > today.now_ms {
        return false;
    }
    if is_paused_today(team, today) {
        return false;
    }
    if !team.weekly_deadline.applies_on(today.weekday) {
        return false;
    }
    if team.last_updated >= today.start_of_today_ms && !schedule.has_game_next_hour(team.game_code)
    {
        return false;
    }
    let failed_today = team.last_lineup_failure_at.is_some_and(|at| today.is_today(at));
    !(team.lineup_failure_count >= MAX_DAILY_LINEUP_FAILURES && failed_today)
}

fn needs_transactions(team: &TeamPayload, today: &Today) -> bool {
    team.start_date <= today.now_ms
        && !is_paused_today(team, today)
        && team.weekly_deadline.applies_on(today.weekday)
        && team.automated_transaction_processing
        && team.can_transact()
}

/// Eligibility for lineup work at `now`. Never fails.
pub fn map_users_to_active_teams(
    snapshot: &[TeamDocument],
    schedule: &ScheduleInfo,
    calendar: &ReferenceCalendar,
    now: DateTime<Utc>,
) -> EligibleTeams {
    let today = Today::new(calendar, now);
    group(snapshot, |team| needs_lineup(team, schedule, &today))
}

/// Whether one team still needs its lineup set at `now`.
///
/// Same rules as [`map_users_to_active_teams`], applied to a single
/// already-validated team.
pub fn still_needs_lineup(
    team: &TeamPayload,
    schedule: &ScheduleInfo,
    calendar: &ReferenceCalendar,
    now: DateTime<Utc>,
) -> bool {
    needs_lineup(team, schedule, &Today::new(calendar, now))
}

/// Eligibility for automated weekly transactions at `now`. Never fails.
pub fn map_users_to_transaction_teams(
    snapshot: &[TeamDocument],
    calendar: &ReferenceCalendar,
    now: DateTime<Utc>,
) -> EligibleTeams {
    let today = Today::new(calendar, now);
    group(snapshot, |team| needs_transactions(team, &today))
}

/// Leagues that have at least one managed team in the snapshot.
pub fn leagues_in_snapshot(snapshot: &[TeamDocument]) -> BTreeSet<League> {
    snapshot.iter().filter_map(TeamDocument::league).collect()
}

pub struct SchedulingService {
    store: Arc<dyn DocumentStore>,
    providers: ProviderPair,
    starting_players: Arc<dyn StartingPlayersProvider>,
    clock: Arc<dyn Clock>,
    calendar: ReferenceCalendar,
}

impl SchedulingService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        providers: ProviderPair,
        starting_players: Arc<dyn StartingPlayersProvider>,
        clock: Arc<dyn Clock>,
        calendar: ReferenceCalendar,
    ) -> Self {
        Self {
            store,
            providers,
            starting_players,
            clock,
            calendar,
        }
    }

    pub fn map_users_to_active_teams(
        &self,
        snapshot: &[TeamDocument],
        schedule: &ScheduleInfo,
    ) -> EligibleTeams {
        map_users_to_active_teams(snapshot, schedule, &self.calendar, self.clock.now())
    }

    pub fn map_users_to_transaction_teams(&self, snapshot: &[TeamDocument]) -> EligibleTeams {
        map_users_to_transaction_teams(snapshot, &self.calendar, self.clock.now())
    }

    /// Record today's postponed teams for `leagues` at `schedule/postponedTeams`.
    ///
    /// Provider failures degrade to "nothing postponed" per league; only the
    /// final write can fail. Returns how many teams were recorded.
    pub async fn set_todays_postponed_teams(
        &self,
        leagues: &[League],
    ) -> Result<usize, MutationError> {
        let now = self.clock.now();
        let date = self.calendar.today(now);
        let mut teams = Vec::new();
        for &league in leagues {
            teams.extend(self.providers.postponed_teams(league, date).await);
        }
        teams.sort();
        teams.dedup();

        let path = DocPath::postponed_teams();
        let doc = PostponedTeamsDocument {
            date: self.calendar.date_key(now),
            teams,
        };
        self.store.set(&path, encode_doc(&path, &doc)?).await?;
        info!(count = doc.teams.len(), "recorded postponed teams");
        Ok(doc.teams.len())
    }

    /// Prefetch starting goalies / pitchers for leagues present in `snapshot`.
    ///
    /// Makes no upstream call when no managed team plays such a league.
    /// Returns the leagues that were refreshed.
    pub async fn set_starting_players_for_today(
        &self,
        snapshot: &[TeamDocument],
    ) -> Result<Vec<League>, MutationError> {
        let leagues: Vec<League> = leagues_in_snapshot(snapshot)
            .into_iter()
            .filter(|league| league.has_starting_players())
            .collect();
        if leagues.is_empty() {
            debug!("no managed teams need starting players");
            return Ok(leagues);
        }

        let now = self.clock.now();
        let date = self.calendar.today(now);
        let date_key = self.calendar.date_key(now);
        for &league in &leagues {
            let players = self.starting_players.starting_players(league, date).await?;
            let path = DocPath::starting_players(league.as_str());
            let doc = StartingPlayersDocument {
                date: date_key.clone(),
                players,
            };
            self.store.set(&path, encode_doc(&path, &doc)?).await?;
            info!(league = %league, count = doc.players.len(), "recorded starting players");
        }
        Ok(leagues)
    }
}
