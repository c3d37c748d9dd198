//! Leagues and per-league schedule flags.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::calendar::HOUR_MS;

/// Fantasy game codes the system manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum League {
    Nba,
    Nfl,
    Nhl,
    Mlb,
}

impl League {
    pub const ALL: [League; 4] = [League::Nba, League::Nfl, League::Nhl, League::Mlb];

    pub fn as_str(self) -> &'static str {
        match self {
            League::Nba => "nba",
            League::Nfl => "nfl",
            League::Nhl => "nhl",
            League::Mlb => "mlb",
        }
    }

    /// Leagues whose lineups depend on announced starters (goalies, pitchers).
    pub fn has_starting_players(self) -> bool {
        matches!(self, League::Nhl | League::Mlb)
    }
}

impl fmt::Display for League {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown league '{0}'")]
pub struct UnknownLeague(pub String);

impl FromStr for League {
    type Err = UnknownLeague;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nba" => Ok(League::Nba),
            "nfl" => Ok(League::Nfl),
            "nhl" => Ok(League::Nhl),
            "mlb" => Ok(League::Mlb),
            other => Err(UnknownLeague(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeagueSchedule {
    pub has_games_today: bool,
    pub has_game_next_hour: bool,
}

impl LeagueSchedule {
    /// Derive the flags from today's game start timestamps.
    ///
    /// The next-hour window is `(now, now + 1h]`: a game starting exactly now
    /// is already underway, a game starting exactly an hour out still counts.
    pub fn from_start_times(start_times_ms: &[i64], now_ms: i64) -> Self {
        let window_end = now_ms + HOUR_MS;
        Self {
            has_games_today: !start_times_ms.is_empty(),
            has_game_next_hour: start_times_ms
                .iter()
                .any(|&t| t > now_ms && t <= window_end),
        }
    }
}

/// Per-league flags for one scheduling pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleInfo {
    leagues: BTreeMap<League, LeagueSchedule>,
}

impl ScheduleInfo {
    pub fn new(leagues: BTreeMap<League, LeagueSchedule>) -> Self {
        Self { leagues }
    }

    /// Every league marked as having games today and a game in the next hour.
    pub fn all_leagues_active() -> Self {
        let leagues = League::ALL
            .iter()
            .map(|&league| {
                (
                    league,
                    LeagueSchedule {
                        has_games_today: true,
                        has_game_next_hour: true,
                    },
                )
            })
            .collect();
        Self { leagues }
    }

    pub fn league(&self, league: League) -> LeagueSchedule {
        self.leagues.get(&league).copied().unwrap_or_default()
    }

    pub fn has_games_today(&self, league: League) -> bool {
        self.league(league).has_games_today
    }

    pub fn has_game_next_hour(&self, league: League) -> bool {
        self.league(league).has_game_next_hour
    }

    pub fn leagues_with_games_today(&self) -> Vec<League> {
        self.leagues
            .iter()
            .filter(|(_, s)| s.has_games_today)
            .map(|(&league, _)| league)
            .collect()
    }
}

/// Cached game start times, persisted at `schedule/today`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameTimesDocument {
    pub date: String,
    pub games: BTreeMap<League, Vec<i64>>,
}

/// Teams whose game today was postponed, persisted at `schedule/postponedTeams`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostponedTeamsDocument {
    pub date: String,
    pub teams: Vec<String>,
}

/// Confirmed starters for one league, persisted at `startingPlayers/{league}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartingPlayersDocument {
    pub date: String,
    pub players: Vec<String>,
}
