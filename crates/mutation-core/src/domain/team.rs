//! Managed fantasy team snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::League;

/// Sentinel stored in `lineup_paused_at` when the team is not paused.
pub const NOT_PAUSED: i64 = -1;

/// When a league locks weekly roster changes.
///
/// Stored as a string: `""` (daily leagues), `"intraday"`, or a day-of-week
/// digit `"0"`..`"6"` (Sunday = 0).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum WeeklyDeadline {
    #[default]
    Daily,
    Intraday,
    Weekday(u8),
}

impl WeeklyDeadline {
    /// Does a lineup need setting today under this deadline?
    pub fn applies_on(self, weekday_digit: u32) -> bool {
        match self {
            WeeklyDeadline::Daily | WeeklyDeadline::Intraday => true,
            WeeklyDeadline::Weekday(d) => u32::from(d) == weekday_digit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid weekly_deadline '{0}'")]
pub struct InvalidDeadline(pub String);

impl TryFrom<String> for WeeklyDeadline {
    type Error = InvalidDeadline;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "" => Ok(WeeklyDeadline::Daily),
            "intraday" => Ok(WeeklyDeadline::Intraday),
            digit => match digit.parse::<u8>() {
                Ok(d) if d <= 6 => Ok(WeeklyDeadline::Weekday(d)),
                _ => Err(InvalidDeadline(value)),
            },
        }
    }
}

impl From<WeeklyDeadline> for String {
    fn from(value: WeeklyDeadline) -> Self {
        match value {
            WeeklyDeadline::Daily => String::new(),
            WeeklyDeadline::Intraday => "intraday".to_string(),
            WeeklyDeadline::Weekday(d) => d.to_string(),
        }
    }
}

impl fmt::Display for WeeklyDeadline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from(*self))
    }
}

fn not_paused() -> i64 {
    NOT_PAUSED
}

fn never() -> i64 {
    -1
}

fn yes() -> bool {
    true
}

/// Denormalized snapshot of one managed fantasy team.
///
/// Timestamps are epoch millis. Field names match the stored documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamPayload {
    pub team_key: String,
    pub uid: String,
    pub game_code: League,

    pub start_date: i64,
    pub end_date: i64,

    #[serde(default)]
    pub weekly_deadline: WeeklyDeadline,

    #[serde(default)]
    pub allow_adding: bool,
    #[serde(default)]
    pub allow_dropping: bool,
    #[serde(default)]
    pub allow_add_drops: bool,
    #[serde(default)]
    pub allow_waiver_adds: bool,
    #[serde(default)]
    pub automated_transaction_processing: bool,

    #[serde(default = "yes")]
    pub is_setting_lineups: bool,

    #[serde(default = "never")]
    pub last_updated: i64,
    #[serde(default = "not_paused")]
    pub lineup_paused_at: i64,
    #[serde(default)]
    pub lineup_failure_count: u32,
    #[serde(default)]
    pub last_lineup_failure_at: Option<i64>,
}

impl TeamPayload {
    pub fn is_paused(&self) -> bool {
        self.lineup_paused_at != NOT_PAUSED
    }

    /// Whether any add/drop permission is granted.
    pub fn can_transact(&self) -> bool {
        self.allow_adding || self.allow_dropping || self.allow_add_drops || self.allow_waiver_adds
    }
}

/// Raw team document as returned by the snapshot query.
///
/// Kept untyped so one malformed document can be skipped without failing the
/// whole snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamDocument {
    pub id: String,
    pub data: serde_json::Value,
}

impl TeamDocument {
    pub fn new(id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    pub fn parse(&self) -> Result<TeamPayload, serde_json::Error> {
        TeamPayload::deserialize(&self.data)
    }

    /// League of the document, if one can be read without full validation.
    pub fn league(&self) -> Option<League> {
        self.data
            .get("game_code")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::daily("", WeeklyDeadline::Daily)]
    #[case::intraday("intraday", WeeklyDeadline::Intraday)]
    #[case::monday("1", WeeklyDeadline::Weekday(1))]
    #[case::saturday("6", WeeklyDeadline::Weekday(6))]
    fn deadline_parses(#[case] raw: &str, #[case] expected: WeeklyDeadline) {
        assert_eq!(WeeklyDeadline::try_from(raw.to_string()).unwrap(), expected);
    }

    #[rstest]
    #[case("7")]
    #[case("monday")]
    #[case("-1")]
    fn deadline_rejects_garbage(#[case] raw: &str) {
        assert!(WeeklyDeadline::try_from(raw.to_string()).is_err());
    }

    #[test]
    fn weekday_deadline_applies_only_on_its_day() {
        assert!(WeeklyDeadline::Weekday(1).applies_on(1));
        assert!(!WeeklyDeadline::Weekday(1).applies_on(2));
        assert!(WeeklyDeadline::Daily.applies_on(5));
        assert!(WeeklyDeadline::Intraday.applies_on(0));
    }

    #[test]
    fn minimal_document_fills_defaults() {
        let doc = TeamDocument::new(
            "423.l.1.t.1",
            serde_json::json!({
                "team_key": "423.l.1.t.1",
                "uid": "u1",
                "game_code": "nba",
                "start_date": 0,
                "end_date": 9_999_999_999_999i64,
            }),
        );
        let team = doc.parse().unwrap();
        assert_eq!(team.weekly_deadline, WeeklyDeadline::Daily);
        assert_eq!(team.lineup_paused_at, NOT_PAUSED);
        assert!(!team.is_paused());
        assert!(team.is_setting_lineups);
        assert_eq!(doc.league(), Some(League::Nba));
    }

    #[test]
    fn invalid_deadline_fails_document_validation() {
        let doc = TeamDocument::new(
            "t",
            serde_json::json!({
                "team_key": "t",
                "uid": "u1",
                "game_code": "nba",
                "start_date": 0,
                "end_date": 1,
                "weekly_deadline": "someday",
            }),
        );
        assert!(doc.parse().is_err());
    }
}
