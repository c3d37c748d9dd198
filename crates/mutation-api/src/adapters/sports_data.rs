//! HttpScheduleProvider - a sports-data service reached over HTTP.
//!
//! - `GET {base}/{league}/games?date=YYYY-MM-DD` -> `{"games": [Game]}`
//! - `GET {base}/{league}/starters?date=YYYY-MM-DD` -> `{"players": [id]}`

use async_trait::async_trait;
use chrono::NaiveDate;
use mutation_core::domain::{League, UpstreamError};
use mutation_core::ports::{GameScheduleProvider, StartingPlayersProvider};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::{transport_error, upstream_error};

pub struct HttpScheduleProvider {
    name: &'static str,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct GamesResponse {
    #[serde(default)]
    games: Vec<Game>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Game {
    /// Epoch millis.
    start_time: i64,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    home_team: Option<String>,
    #[serde(default)]
    away_team: Option<String>,
}

impl Game {
    fn is_postponed(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("postponed"))
    }
}

#[derive(Debug, Deserialize)]
struct StartersResponse {
    #[serde(default)]
    players: Vec<String>,
}

impl HttpScheduleProvider {
    pub fn new(name: &'static str, base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            name,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        league: League,
        resource: &str,
        date: NaiveDate,
    ) -> Result<T, UpstreamError> {
        let url = format!("{}/{}/{resource}", self.base_url, league.as_str());
        let response = self
            .client
            .get(&url)
            .query(&[("date", date.format("%Y-%m-%d").to_string())])
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }
        response.json().await.map_err(transport_error)
    }
}

fn postponed_team_ids(games: Vec<Game>) -> Vec<String> {
    games
        .into_iter()
        .filter(Game::is_postponed)
        .flat_map(|g| [g.home_team, g.away_team])
        .flatten()
        .collect()
}

#[async_trait]
impl GameScheduleProvider for HttpScheduleProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn game_start_times(
        &self,
        league: League,
        date: NaiveDate,
    ) -> Result<Vec<i64>, UpstreamError> {
        let body: GamesResponse = self.get(league, "games", date).await?;
        Ok(body
            .games
            .into_iter()
            .filter(|g| !g.is_postponed())
            .map(|g| g.start_time)
            .collect())
    }

    async fn postponed_teams(
        &self,
        league: League,
        date: NaiveDate,
    ) -> Result<Vec<String>, UpstreamError> {
        let body: GamesResponse = self.get(league, "games", date).await?;
        Ok(postponed_team_ids(body.games))
    }
}

#[async_trait]
impl StartingPlayersProvider for HttpScheduleProvider {
    async fn starting_players(
        &self,
        league: League,
        date: NaiveDate,
    ) -> Result<Vec<String>, UpstreamError> {
        let body: StartersResponse = self.get(league, "starters", date).await?;
        Ok(body.players)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn postponed_games_list_both_teams() {
        let body: GamesResponse = serde_json::from_value(json!({
            "games": [
                {"startTime": 1, "status": "scheduled", "homeTeam": "bos", "awayTeam": "nyy"},
                {"startTime": 2, "status": "Postponed", "homeTeam": "chc", "awayTeam": "stl"},
                {"startTime": 3}
            ]
        }))
        .unwrap();
        assert_eq!(postponed_team_ids(body.games), vec!["chc", "stl"]);
    }
}
