//! CachedScheduleSource - today's schedule, rebuilt at most once per day.
//!
//! 1. Read `schedule/today`; reuse it when its date is today's date key.
//! 2. Otherwise ask the primary provider per league, then the fallback, then
//!    give that league no games.
//! 3. Persist the fresh start times before returning.
//!
//! The next-hour flag is always derived at call time from the stored start
//! times, never cached.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::{
    DispatchError, GameTimesDocument, League, LeagueSchedule, ReferenceCalendar, ScheduleInfo,
};
use crate::ports::{
    Clock, DocPath, DocumentStore, GameScheduleProvider, ScheduleSource, encode_doc, get_doc,
};

/// Primary provider with a per-league fallback.
#[derive(Clone)]
pub struct ProviderPair {
    primary: Arc<dyn GameScheduleProvider>,
    fallback: Arc<dyn GameScheduleProvider>,
}

impl ProviderPair {
    pub fn new(
        primary: Arc<dyn GameScheduleProvider>,
        fallback: Arc<dyn GameScheduleProvider>,
    ) -> Self {
        Self { primary, fallback }
    }

    /// Never fails: a league both providers fail on has no games.
    pub async fn game_start_times(&self, league: League, date: NaiveDate) -> Vec<i64> {
        match self.primary.game_start_times(league, date).await {
            Ok(times) => return times,
            Err(error) => warn!(
                league = %league,
                provider = self.primary.name(),
                error = %error,
                "primary schedule provider failed, trying fallback"
            ),
        }
        match self.fallback.game_start_times(league, date).await {
            Ok(times) => times,
            Err(error) => {
                warn!(
                    league = %league,
                    provider = self.fallback.name(),
                    error = %error,
                    "fallback schedule provider failed, assuming no games"
                );
                Vec::new()
            }
        }
    }

    /// Never fails: a league both providers fail on has no postponements.
    pub async fn postponed_teams(&self, league: League, date: NaiveDate) -> Vec<String> {
        match self.primary.postponed_teams(league, date).await {
            Ok(teams) => return teams,
            Err(error) => warn!(
                league = %league,
                provider = self.primary.name(),
                error = %error,
                "primary provider failed on postponed games, trying fallback"
            ),
        }
        match self.fallback.postponed_teams(league, date).await {
            Ok(teams) => teams,
            Err(error) => {
                warn!(
                    league = %league,
                    provider = self.fallback.name(),
                    error = %error,
                    "fallback provider failed on postponed games"
                );
                Vec::new()
            }
        }
    }
}

pub struct CachedScheduleSource {
    store: Arc<dyn DocumentStore>,
    providers: ProviderPair,
    clock: Arc<dyn Clock>,
    calendar: ReferenceCalendar,
}

impl CachedScheduleSource {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        providers: ProviderPair,
        clock: Arc<dyn Clock>,
        calendar: ReferenceCalendar,
    ) -> Self {
        Self {
            store,
            providers,
            clock,
            calendar,
        }
    }

    async fn fetch_game_times(&self, date: NaiveDate) -> BTreeMap<League, Vec<i64>> {
        let mut games = BTreeMap::new();
        for league in League::ALL {
            games.insert(league, self.providers.game_start_times(league, date).await);
        }
        games
    }
}

#[async_trait]
impl ScheduleSource for CachedScheduleSource {
    async fn get_schedule_info(&self) -> Result<ScheduleInfo, DispatchError> {
        let now = self.clock.now();
        let date_key = self.calendar.date_key(now);
        let path = DocPath::schedule_today();

        let cached: Option<GameTimesDocument> = get_doc(self.store.as_ref(), &path)
            .await
            .map_err(|e| DispatchError::Schedule(e.to_string()))?;

        let games = match cached {
            Some(doc) if doc.date == date_key => {
                debug!(date = %date_key, "using cached game times");
                doc.games
            }
            _ => {
                let games = self.fetch_game_times(self.calendar.today(now)).await;
                let doc = GameTimesDocument {
                    date: date_key.clone(),
                    games,
                };
                let persisted = match encode_doc(&path, &doc) {
                    Ok(value) => self.store.set(&path, value).await,
                    Err(e) => Err(e),
                };
                if let Err(error) = persisted {
                    warn!(error = %error, "failed to cache game times");
                }
                info!(date = %date_key, "refreshed game times");
                doc.games
            }
        };

        let now_ms = now.timestamp_millis();
        let leagues = League::ALL
            .iter()
            .map(|&league| {
                let times = games.get(&league).map(Vec::as_slice).unwrap_or(&[]);
                (league, LeagueSchedule::from_start_times(times, now_ms))
            })
            .collect();
        Ok(ScheduleInfo::new(leagues))
    }
}
