//! Dispatcher - one scheduling pass per call.
//!
//! Set-lineup pass:
//! 1. skip at the configured rollover hour unless overridden
//! 2. load the schedule (or assume every league active under override)
//! 3. stop if no league plays today
//! 4. start postponed-team marking and starting-player prefetch
//! 5. fetch the team snapshot (fatal on failure)
//! 6. compute eligible users
//! 7. wait for both prefetches, whatever their outcome
//! 8. enqueue one task per eligible user (fatal on failure)
//!
//! The prefetches and the snapshot branch run under one `tokio::join!`, so
//! no return path leaves a prefetch running.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::scheduling::{EligibleTeams, SchedulingService};
use crate::config::{DispatchConfig, QueueConfig};
use crate::domain::{
    DispatchError, DispatchResponse, League, MutationTask, MutationType,
    PositionalScarcityPayload, QueueTarget, QueueTask, ReferenceCalendar, ScheduleInfo,
    SetLineupPayload, TeamDocument, TeamPayload, WeeklyTransactionsPayload,
};
use crate::ports::{Clock, IdGenerator, ScheduleSource, TaskQueue, TeamRepository};

/// Optional narrowing and pass-through data for a manual trigger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchRequest {
    pub user_id: Option<String>,
    pub team_key: Option<String>,
    /// Forwarded into the payload only when the pass is scoped to one user.
    pub changes: Option<Vec<Value>>,
    /// Skip the rollover-hour guard and the schedule lookup.
    pub skip_games_check: bool,
}

impl DispatchRequest {
    fn forwarded_changes(&self) -> Option<Vec<Value>> {
        self.user_id.as_ref().and(self.changes.clone())
    }
}

pub struct Dispatcher {
    schedule: Arc<dyn ScheduleSource>,
    scheduling: Arc<SchedulingService>,
    teams: Arc<dyn TeamRepository>,
    queue: Arc<dyn TaskQueue>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    config: DispatchConfig,
    queue_config: QueueConfig,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        schedule: Arc<dyn ScheduleSource>,
        scheduling: Arc<SchedulingService>,
        teams: Arc<dyn TeamRepository>,
        queue: Arc<dyn TaskQueue>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        config: DispatchConfig,
        queue_config: QueueConfig,
    ) -> Self {
        Self {
            schedule,
            scheduling,
            teams,
            queue,
            ids,
            clock,
            config,
            queue_config,
        }
    }

    fn calendar(&self) -> ReferenceCalendar {
        ReferenceCalendar::new(self.config.reference_tz)
    }

    fn is_rollover_hour(&self, now: DateTime<Utc>) -> bool {
        self.config
            .midnight_skip_hour
            .is_some_and(|hour| self.calendar().hour(now) == hour)
    }

    pub async fn dispatch_set_lineup(
        &self,
        request: &DispatchRequest,
    ) -> Result<DispatchResponse, DispatchError> {
        let now = self.clock.now();
        if !request.skip_games_check && self.is_rollover_hour(now) {
            info!("skipping set-lineup dispatch during midnight rollover");
            return Ok(DispatchResponse::skipped(
                "Skipping set-lineup dispatch at midnight: upstream schedule has not rolled over yet",
            ));
        }

        let schedule = if request.skip_games_check {
            ScheduleInfo::all_leagues_active()
        } else {
            self.schedule.get_schedule_info().await?
        };
        let leagues = schedule.leagues_with_games_today();
        if leagues.is_empty() {
            info!("no games today, nothing to dispatch");
            return Ok(DispatchResponse::skipped("No games scheduled today"));
        }

        let (snapshot_tx, snapshot_rx) = oneshot::channel::<Arc<Vec<TeamDocument>>>();

        let prefetches = async {
            let postponed = async {
                if let Err(error) = self.scheduling.set_todays_postponed_teams(&leagues).await {
                    warn!(error = %error, "failed to mark postponed teams");
                }
            };
            let starting_players = async {
                let Ok(snapshot) = snapshot_rx.await else {
                    debug!("no team snapshot, skipping starting players");
                    return;
                };
                if let Err(error) = self
                    .scheduling
                    .set_starting_players_for_today(&snapshot)
                    .await
                {
                    warn!(error = %error, "failed to prefetch starting players");
                }
            };
            tokio::join!(postponed, starting_players);
        };

        let eligibility = async {
            // Owned here so every exit, `?` included, closes the channel.
            let snapshot_tx = snapshot_tx;
            let snapshot = self
                .teams
                .fetch_active_teams(&leagues, now)
                .await
                .map_err(|e| DispatchError::TeamSnapshot(e.to_string()))?;
            let snapshot = Arc::new(snapshot);
            let _ = snapshot_tx.send(snapshot.clone());
            let mut eligible = self.scheduling.map_users_to_active_teams(&snapshot, &schedule);
            eligible.restrict(request.user_id.as_deref(), request.team_key.as_deref());
            Ok::<EligibleTeams, DispatchError>(eligible)
        };

        let ((), eligible) = tokio::join!(prefetches, eligibility);
        let eligible = eligible?;
        if eligible.skipped_invalid > 0 {
            warn!(
                skipped = eligible.skipped_invalid,
                "skipped invalid team documents"
            );
        }
        if eligible.is_empty() {
            info!("no eligible users for set-lineup");
            return Ok(DispatchResponse::skipped(
                "No users need their lineups set right now",
            ));
        }

        let changes = request.forwarded_changes();
        let task_count = self
            .enqueue_all(MutationType::SetLineup, eligible, now, |uid, teams| {
                SetLineupPayload {
                    uid,
                    teams,
                    requested_changes: changes.clone(),
                    skip_games_check: request.skip_games_check,
                }
            })
            .await?;

        let message = format!(
            "Enqueued {task_count} set-lineup tasks for leagues: {}",
            league_list(&leagues)
        );
        info!(task_count, leagues = %league_list(&leagues), "set-lineup dispatch complete");
        Ok(DispatchResponse::enqueued(task_count, message, leagues))
    }

    pub async fn dispatch_weekly_transactions(
        &self,
        request: &DispatchRequest,
    ) -> Result<DispatchResponse, DispatchError> {
        let now = self.clock.now();
        let snapshot = self
            .teams
            .fetch_transaction_teams(now)
            .await
            .map_err(|e| DispatchError::TeamSnapshot(e.to_string()))?;

        let mut eligible = self.scheduling.map_users_to_transaction_teams(&snapshot);
        eligible.restrict(request.user_id.as_deref(), request.team_key.as_deref());
        if eligible.is_empty() {
            info!("no eligible users for weekly transactions");
            return Ok(DispatchResponse::skipped(
                "No users need weekly transactions right now",
            ));
        }

        let mut leagues: Vec<League> = eligible
            .by_user
            .values()
            .flatten()
            .map(|team| team.game_code)
            .collect();
        leagues.sort();
        leagues.dedup();

        let transactions = request.forwarded_changes();
        let task_count = self
            .enqueue_all(
                MutationType::WeeklyTransactions,
                eligible,
                now,
                |uid, teams| WeeklyTransactionsPayload {
                    uid,
                    teams,
                    requested_transactions: transactions.clone(),
                },
            )
            .await?;

        let message = format!(
            "Enqueued {task_count} weekly-transactions tasks for leagues: {}",
            league_list(&leagues)
        );
        info!(task_count, "weekly-transactions dispatch complete");
        Ok(DispatchResponse::enqueued(task_count, message, leagues))
    }

    /// One task for one user and league; the schedule is not consulted.
    pub async fn dispatch_positional_scarcity(
        &self,
        user_id: &str,
        league_key: &str,
    ) -> Result<DispatchResponse, DispatchError> {
        let target = self.queue_config.target()?;
        let payload = PositionalScarcityPayload {
            uid: user_id.to_string(),
            league_key: league_key.to_string(),
        };
        self.enqueue_one(
            &target,
            MutationType::CalcPositionalScarcity,
            user_id,
            &payload,
            self.clock.now(),
        )
        .await?;
        info!(user_id, league_key, "positional scarcity task enqueued");
        Ok(DispatchResponse::enqueued(
            1,
            format!("Enqueued calc-positional-scarcity task for league {league_key}"),
            Vec::new(),
        ))
    }

    async fn enqueue_all<P: Serialize>(
        &self,
        mutation_type: MutationType,
        eligible: EligibleTeams,
        now: DateTime<Utc>,
        payload: impl Fn(String, Vec<TeamPayload>) -> P,
    ) -> Result<usize, DispatchError> {
        let target = self.queue_config.target()?;
        let mut count = 0;
        for (uid, teams) in eligible.by_user {
            let body = payload(uid.clone(), teams);
            self.enqueue_one(&target, mutation_type, &uid, &body, now)
                .await?;
            count += 1;
        }
        Ok(count)
    }

    async fn enqueue_one<P: Serialize>(
        &self,
        target: &QueueTarget,
        mutation_type: MutationType,
        user_id: &str,
        payload: &P,
        now: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        let enqueue_error = |message: String| DispatchError::Enqueue {
            user_id: user_id.to_string(),
            message,
        };
        let payload = serde_json::to_value(payload).map_err(|e| enqueue_error(e.to_string()))?;
        let task = MutationTask::new(
            self.ids.generate_task_id(),
            mutation_type,
            user_id,
            payload,
            now,
        );
        let entry =
            QueueTask::for_mutation(&task, target).map_err(|e| enqueue_error(e.to_string()))?;
        self.queue
            .enqueue(&entry)
            .await
            .map_err(|e| enqueue_error(e.to_string()))?;
        debug!(task_id = %task.id, user_id, mutation_type = %mutation_type, "task enqueued");
        Ok(())
    }
}

fn league_list(leagues: &[League]) -> String {
    leagues
        .iter()
        .map(|l| l.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::schedule_source::{CachedScheduleSource, ProviderPair};
    use crate::domain::{HOUR_MS, NOT_PAUSED, UpstreamError};
    use crate::impls::{
        InMemoryDocumentStore, InMemoryTaskQueue, StaticScheduleProvider, StaticStartingPlayers,
        StoreTeamRepository,
    };
    use crate::ports::{DocPath, FixedClock, UlidGenerator};
    use chrono::TimeZone;
    use serde_json::json;

    struct Fixture {
        store: Arc<InMemoryDocumentStore>,
        queue: Arc<InMemoryTaskQueue>,
        players: Arc<StaticStartingPlayers>,
        dispatcher: Dispatcher,
    }

    // 11:00 New York on Tuesday 2024-04-02.
    fn mid_morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 2, 15, 0, 0).unwrap()
    }

    // 00:30 New York.
    fn just_after_midnight() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 2, 4, 30, 0).unwrap()
    }

    fn queue_config() -> QueueConfig {
        QueueConfig {
            project_id: Some("proj".into()),
            location: Some("us-central1".into()),
            queue_name: Some("mutations".into()),
            execution_base_url: Some("https://api.example.com".into()),
            dispatch_deadline_secs: 300,
        }
    }

    fn team(key: &str, uid: &str, league: &str) -> serde_json::Value {
        json!({
            "team_key": key,
            "uid": uid,
            "game_code": league,
            "start_date": 0,
            "end_date": 9_999_999_999_999i64,
            "weekly_deadline": "",
            "last_updated": -1,
            "lineup_paused_at": NOT_PAUSED,
            "lineup_failure_count": 0,
            "automated_transaction_processing": true,
            "allow_add_drops": true,
        })
    }

    fn games_later_today(now: DateTime<Utc>) -> StaticScheduleProvider {
        let later = now.timestamp_millis() + 3 * HOUR_MS;
        StaticScheduleProvider::new("primary")
            .with_games(League::Nba, vec![later])
            .with_games(League::Mlb, vec![later])
    }

    fn fixture_with(
        now: DateTime<Utc>,
        primary: StaticScheduleProvider,
        players: StaticStartingPlayers,
        config: DispatchConfig,
        queue_config: QueueConfig,
    ) -> Fixture {
        let store = Arc::new(InMemoryDocumentStore::new());
        let queue = Arc::new(InMemoryTaskQueue::new());
        let players = Arc::new(players);
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(now));
        let calendar = ReferenceCalendar::new(config.reference_tz);
        let providers = ProviderPair::new(
            Arc::new(primary),
            Arc::new(StaticScheduleProvider::new("fallback")),
        );
        let schedule = Arc::new(CachedScheduleSource::new(
            store.clone(),
            providers.clone(),
            clock.clone(),
            calendar,
        ));
        let scheduling = Arc::new(SchedulingService::new(
            store.clone(),
            providers,
            players.clone(),
            clock.clone(),
            calendar,
        ));
        let dispatcher = Dispatcher::new(
            schedule,
            scheduling,
            Arc::new(StoreTeamRepository::new(store.clone())),
            queue.clone(),
            Arc::new(UlidGenerator::new(clock.clone())),
            clock,
            config,
            queue_config,
        );
        Fixture {
            store,
            queue,
            players,
            dispatcher,
        }
    }

    fn fixture(now: DateTime<Utc>, primary: StaticScheduleProvider) -> Fixture {
        fixture_with(
            now,
            primary,
            StaticStartingPlayers::new(),
            DispatchConfig::default(),
            queue_config(),
        )
    }

    fn seed(f: &Fixture, teams: &[(&str, &str, &str)]) {
        for (key, uid, league) in teams {
            f.store.insert(DocPath::team(key), team(key, uid, league));
        }
    }

    #[tokio::test]
    async fn three_users_in_two_leagues_get_three_tasks() {
        let f = fixture(mid_morning(), games_later_today(mid_morning()));
        seed(&f, &[("t1", "u1", "nba"), ("t2", "u2", "mlb"), ("t3", "u3", "nba")]);

        let response = f
            .dispatcher
            .dispatch_set_lineup(&DispatchRequest::default())
            .await
            .unwrap();

        assert_eq!(response.task_count, 3);
        assert!(response.message.contains("nba"));
        assert!(response.message.contains("mlb"));
        assert_eq!(f.queue.len(), 3);
    }

    #[tokio::test]
    async fn enqueued_task_decodes_to_the_same_task() {
        let f = fixture(mid_morning(), games_later_today(mid_morning()));
        seed(&f, &[("t1", "u1", "nba"), ("t2", "u1", "nba")]);
        f.dispatcher
            .dispatch_set_lineup(&DispatchRequest::default())
            .await
            .unwrap();

        let entry = &f.queue.tasks()[0];
        assert_eq!(entry.url, "https://api.example.com/mutations/execute/mutation");
        assert_eq!(entry.dispatch_deadline, "300s");
        let task = entry.decode_request().unwrap().task;
        assert!(entry.name.ends_with(task.id.as_str()));
        assert_eq!(task.mutation_type, MutationType::SetLineup);
        assert_eq!(task.user_id, "u1");
        let payload: SetLineupPayload = serde_json::from_value(task.payload).unwrap();
        assert_eq!(payload.teams.len(), 2);
    }

    #[tokio::test]
    async fn rollover_hour_skips_without_touching_anything() {
        let f = fixture(just_after_midnight(), games_later_today(just_after_midnight()));
        seed(&f, &[("t1", "u1", "nba")]);

        let response = f
            .dispatcher
            .dispatch_set_lineup(&DispatchRequest::default())
            .await
            .unwrap();

        assert_eq!(response.task_count, 0);
        assert!(response.message.contains("midnight"));
        assert_eq!(f.store.access_count("schedule"), 0);
        assert_eq!(f.store.access_count("teams"), 0);
        assert!(f.queue.is_empty());
    }

    #[tokio::test]
    async fn override_runs_at_rollover_hour_with_all_leagues() {
        let f = fixture(just_after_midnight(), StaticScheduleProvider::new("primary"));
        seed(&f, &[("t1", "u1", "nfl")]);

        let request = DispatchRequest {
            skip_games_check: true,
            ..Default::default()
        };
        let response = f.dispatcher.dispatch_set_lineup(&request).await.unwrap();
        assert_eq!(response.task_count, 1);
        assert_eq!(response.leagues, League::ALL.to_vec());
    }

    #[tokio::test]
    async fn disabled_guard_runs_at_midnight() {
        let f = fixture_with(
            just_after_midnight(),
            games_later_today(just_after_midnight()),
            StaticStartingPlayers::new(),
            DispatchConfig {
                midnight_skip_hour: None,
                ..Default::default()
            },
            queue_config(),
        );
        seed(&f, &[("t1", "u1", "nba")]);
        let response = f
            .dispatcher
            .dispatch_set_lineup(&DispatchRequest::default())
            .await
            .unwrap();
        assert_eq!(response.task_count, 1);
    }

    #[tokio::test]
    async fn no_games_today_returns_before_the_snapshot() {
        let f = fixture(mid_morning(), StaticScheduleProvider::new("primary"));
        seed(&f, &[("t1", "u1", "nba")]);

        let response = f
            .dispatcher
            .dispatch_set_lineup(&DispatchRequest::default())
            .await
            .unwrap();

        assert_eq!(response.task_count, 0);
        assert_eq!(f.store.access_count("teams"), 0);
        assert_eq!(f.store.access_count("rateLimits"), 0);
        assert!(f.queue.is_empty());
    }

    #[tokio::test]
    async fn snapshot_failure_is_fatal_but_prefetch_still_completes() {
        let f = fixture(mid_morning(), games_later_today(mid_morning()));
        f.store.fail_collection("teams");

        let err = f
            .dispatcher
            .dispatch_set_lineup(&DispatchRequest::default())
            .await
            .unwrap_err();

        assert_eq!(err.code(), "TEAM_SNAPSHOT_ERROR");
        assert!(f.store.snapshot(&DocPath::postponed_teams()).is_some());
        assert!(f.players.requested().is_empty());
    }

    #[tokio::test]
    async fn prefetch_failures_do_not_abort_the_pass() {
        let now = mid_morning();
        let f = fixture_with(
            now,
            games_later_today(now).with_postponed_error(League::Nba, UpstreamError::transport("x")),
            StaticStartingPlayers::new().with_error(League::Mlb, UpstreamError::transport("down")),
            DispatchConfig::default(),
            queue_config(),
        );
        seed(&f, &[("t1", "u1", "mlb")]);

        let response = f
            .dispatcher
            .dispatch_set_lineup(&DispatchRequest::default())
            .await
            .unwrap();
        assert_eq!(response.task_count, 1);
        assert_eq!(f.players.requested(), vec![League::Mlb]);
    }

    #[tokio::test]
    async fn starting_players_use_the_snapshot_leagues() {
        let now = mid_morning();
        let f = fixture_with(
            now,
            games_later_today(now),
            StaticStartingPlayers::new().with_players(League::Mlb, vec!["ace".into()]),
            DispatchConfig::default(),
            queue_config(),
        );
        seed(&f, &[("t1", "u1", "mlb"), ("t2", "u2", "nba")]);
        f.dispatcher
            .dispatch_set_lineup(&DispatchRequest::default())
            .await
            .unwrap();
        let doc = f.store.snapshot(&DocPath::starting_players("mlb")).unwrap();
        assert_eq!(doc["players"], json!(["ace"]));
    }

    #[tokio::test]
    async fn enqueue_failure_names_the_user() {
        let f = fixture(mid_morning(), games_later_today(mid_morning()));
        seed(&f, &[("t1", "u1", "nba"), ("t2", "u2", "nba")]);
        f.queue.reject_user("u2");

        let err = f
            .dispatcher
            .dispatch_set_lineup(&DispatchRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Enqueue { ref user_id, .. } if user_id == "u2"));
    }

    #[tokio::test]
    async fn missing_queue_config_is_fatal() {
        let f = fixture_with(
            mid_morning(),
            games_later_today(mid_morning()),
            StaticStartingPlayers::new(),
            DispatchConfig::default(),
            QueueConfig::default(),
        );
        seed(&f, &[("t1", "u1", "nba")]);
        let err = f
            .dispatcher
            .dispatch_set_lineup(&DispatchRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
        assert!(f.queue.is_empty());
    }

    #[tokio::test]
    async fn scoped_pass_forwards_changes() {
        let f = fixture(mid_morning(), games_later_today(mid_morning()));
        seed(&f, &[("t1", "u1", "nba"), ("t2", "u2", "nba")]);
        let request = DispatchRequest {
            user_id: Some("u1".into()),
            changes: Some(vec![json!({"player": "p1", "to": "BN"})]),
            ..Default::default()
        };
        let response = f.dispatcher.dispatch_set_lineup(&request).await.unwrap();
        assert_eq!(response.task_count, 1);

        let task = f.queue.tasks()[0].decode_request().unwrap().task;
        assert_eq!(task.user_id, "u1");
        assert_eq!(task.payload["requested_changes"][0]["player"], "p1");
    }

    #[tokio::test]
    async fn unscoped_pass_drops_changes() {
        let f = fixture(mid_morning(), games_later_today(mid_morning()));
        seed(&f, &[("t1", "u1", "nba")]);
        let request = DispatchRequest {
            changes: Some(vec![json!({"player": "p1"})]),
            ..Default::default()
        };
        f.dispatcher.dispatch_set_lineup(&request).await.unwrap();
        let task = f.queue.tasks()[0].decode_request().unwrap().task;
        assert!(task.payload.get("requested_changes").is_none());
    }

    #[tokio::test]
    async fn weekly_transactions_enqueue_automated_teams() {
        let f = fixture(mid_morning(), StaticScheduleProvider::new("primary"));
        seed(&f, &[("t1", "u1", "nfl"), ("t2", "u2", "nhl")]);
        f.store.insert(
            DocPath::team("t3"),
            json!({"team_key": "t3", "uid": "u3", "game_code": "nba", "start_date": 0, "end_date": 9_999_999_999_999i64}),
        );

        let response = f
            .dispatcher
            .dispatch_weekly_transactions(&DispatchRequest::default())
            .await
            .unwrap();
        assert_eq!(response.task_count, 2);
        assert_eq!(response.leagues, vec![League::Nfl, League::Nhl]);
        let task = f.queue.tasks()[0].decode_request().unwrap().task;
        assert_eq!(task.mutation_type, MutationType::WeeklyTransactions);
    }

    #[tokio::test]
    async fn positional_scarcity_enqueues_exactly_one_task() {
        let f = fixture(mid_morning(), StaticScheduleProvider::new("primary"));
        let response = f
            .dispatcher
            .dispatch_positional_scarcity("u1", "423.l.777")
            .await
            .unwrap();
        assert_eq!(response.task_count, 1);
        assert_eq!(f.store.access_count("schedule"), 0);

        let task = f.queue.tasks()[0].decode_request().unwrap().task;
        assert_eq!(task.mutation_type, MutationType::CalcPositionalScarcity);
        assert_eq!(task.payload["league_key"], "423.l.777");
    }
}
