//! Canned sports-data providers for development and tests.
//!
//! Leagues without a scripted answer return an empty list; scripted errors
//! are returned on every call.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::domain::{League, UpstreamError};
use crate::ports::{GameScheduleProvider, StartingPlayersProvider};

type Scripted<T> = HashMap<League, Result<Vec<T>, UpstreamError>>;

fn lookup<T: Clone>(map: &Scripted<T>, league: League) -> Result<Vec<T>, UpstreamError> {
    map.get(&league).cloned().unwrap_or_else(|| Ok(Vec::new()))
}

#[derive(Default)]
struct ScheduleScript {
    games: Scripted<i64>,
    postponed: Scripted<String>,
}

pub struct StaticScheduleProvider {
    name: String,
    script: Mutex<ScheduleScript>,
    calls: AtomicUsize,
}

impl StaticScheduleProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(ScheduleScript::default()),
            calls: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScheduleScript> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_games(self, league: League, start_times_ms: Vec<i64>) -> Self {
        self.lock().games.insert(league, Ok(start_times_ms));
        self
    }

    pub fn with_games_error(self, league: League, error: UpstreamError) -> Self {
        self.lock().games.insert(league, Err(error));
        self
    }

    pub fn with_postponed(self, league: League, teams: Vec<String>) -> Self {
        self.lock().postponed.insert(league, Ok(teams));
        self
    }

    pub fn with_postponed_error(self, league: League, error: UpstreamError) -> Self {
        self.lock().postponed.insert(league, Err(error));
        self
    }

    /// Total calls across both operations.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GameScheduleProvider for StaticScheduleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn game_start_times(
        &self,
        league: League,
        _date: NaiveDate,
    ) -> Result<Vec<i64>, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lookup(&self.lock().games, league)
    }

    async fn postponed_teams(
        &self,
        league: League,
        _date: NaiveDate,
    ) -> Result<Vec<String>, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lookup(&self.lock().postponed, league)
    }
}

#[derive(Default)]
pub struct StaticStartingPlayers {
    players: Mutex<Scripted<String>>,
    requested: Mutex<Vec<League>>,
}

impl StaticStartingPlayers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_players(self, league: League, players: Vec<String>) -> Self {
        self.players
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(league, Ok(players));
        self
    }

    pub fn with_error(self, league: League, error: UpstreamError) -> Self {
        self.players
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(league, Err(error));
        self
    }

    /// Leagues asked for, in call order.
    pub fn requested(&self) -> Vec<League> {
        self.requested
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl StartingPlayersProvider for StaticStartingPlayers {
    async fn starting_players(
        &self,
        league: League,
        _date: NaiveDate,
    ) -> Result<Vec<String>, UpstreamError> {
        self.requested
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(league);
        lookup(
            &self.players.lock().unwrap_or_else(|e| e.into_inner()),
            league,
        )
    }
}
