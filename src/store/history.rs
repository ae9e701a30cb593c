//! Append-only match history (`matchhistory.json` / `testmatchhistory.json`).
//!
//! Files written by earlier versions of the bot store player and channel
//! ids as JSON numbers; both forms load, strings are written.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::series::Team;
use crate::store::PlayerId;

/// Ranked series and test series are logged to separate files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HistoryKind {
    Ranked,
    Test,
}

impl HistoryKind {
    pub fn from_test_mode(test_mode: bool) -> Self {
        if test_mode {
            Self::Test
        } else {
            Self::Ranked
        }
    }
}

/// Outcome recorded on a series entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SeriesWinner {
    Red,
    Blue,
    /// Stopped by an admin after at least one decided game.
    Cancelled,
    /// Only found in old files.
    Tie,
}

impl SeriesWinner {
    pub fn team(self) -> Option<Team> {
        match self {
            SeriesWinner::Red => Some(Team::Red),
            SeriesWinner::Blue => Some(Team::Blue),
            SeriesWinner::Cancelled | SeriesWinner::Tie => None,
        }
    }
}

impl From<Team> for SeriesWinner {
    fn from(team: Team) -> Self {
        match team {
            Team::Red => SeriesWinner::Red,
            Team::Blue => SeriesWinner::Blue,
        }
    }
}

impl fmt::Display for SeriesWinner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SeriesWinner::Red => "RED",
            SeriesWinner::Blue => "BLUE",
            SeriesWinner::Cancelled => "CANCELLED",
            SeriesWinner::Tie => "TIE",
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(u64),
}

impl From<RawId> for PlayerId {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

fn id<'de, D: Deserializer<'de>>(d: D) -> Result<PlayerId, D::Error> {
    RawId::deserialize(d).map(Into::into)
}

fn ids<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<PlayerId>, D::Error> {
    Vec::<RawId>::deserialize(d).map(|v| v.into_iter().map(Into::into).collect())
}

fn opt_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Option::<RawId>::deserialize(d).map(|v| v.map(Into::into))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRosters {
    #[serde(deserialize_with = "ids")]
    pub red: Vec<PlayerId>,
    #[serde(deserialize_with = "ids")]
    pub blue: Vec<PlayerId>,
}

/// One decided game, written as soon as the vote closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub match_type: HistoryKind,
    pub series_label: String,
    pub match_id: u64,
    pub game_number: u32,
    pub winner: Team,
    pub loser: Team,
    pub timestamp: String,
    pub teams_at_game: TeamRosters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalScore {
    pub red: u32,
    pub blue: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalTeam {
    #[serde(deserialize_with = "ids")]
    pub players: Vec<PlayerId>,
    #[serde(default, deserialize_with = "opt_id")]
    pub voice_channel_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalTeams {
    pub red: FinalTeam,
    pub blue: FinalTeam,
}

/// Per-game line inside a series entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameBreakdown {
    pub game_number: u32,
    pub winner: Team,
    pub loser: Team,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gametype: Option<String>,
}

/// A red player and a blue player trading teams before `game`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRecord {
    pub game: u32,
    #[serde(deserialize_with = "id")]
    pub red_to_blue: PlayerId,
    #[serde(deserialize_with = "id")]
    pub blue_to_red: PlayerId,
    pub timestamp: String,
}

/// One completed or cancelled series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub match_type: HistoryKind,
    pub series_label: String,
    pub match_id: u64,
    pub timestamp: String,
    pub timestamp_display: String,
    pub winner: SeriesWinner,
    pub final_score: FinalScore,
    pub teams_final: FinalTeams,
    pub games: Vec<GameBreakdown>,
    pub total_games_played: u32,
    pub stats_recorded: bool,
    #[serde(default)]
    pub swap_history: Vec<SwapRecord>,
}

/// A whole history file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchHistory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_ranked_matches: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_test_matches: Option<u64>,
    #[serde(default)]
    pub games: Vec<GameEntry>,
    #[serde(default)]
    pub matches: Vec<SeriesEntry>,
}

impl MatchHistory {
    /// Number of series of `kind` recorded in this file.
    pub fn total(&self, kind: HistoryKind) -> u64 {
        match kind {
            HistoryKind::Ranked => self.total_ranked_matches,
            HistoryKind::Test => self.total_test_matches,
        }
        .unwrap_or(0)
    }

    pub fn append_game(&mut self, entry: GameEntry) {
        self.games.push(entry);
    }

    /// Rewrite the winner of an already logged game. Returns whether the
    /// entry was found. The newest matching entry wins.
    pub fn correct_game(&mut self, match_id: u64, game_number: u32, winner: Team) -> bool {
        match self
            .games
            .iter_mut()
            .rev()
            .find(|g| g.match_id == match_id && g.game_number == game_number)
        {
            Some(entry) => {
                entry.winner = winner;
                entry.loser = winner.other();
                true
            }
            None => false,
        }
    }

    /// Drop the logged games of `match_id` numbered above `last_kept`.
    /// Returns how many were removed.
    pub fn drop_games_after(&mut self, match_id: u64, last_kept: u32) -> usize {
        let before = self.games.len();
        self.games
            .retain(|g| !(g.match_id == match_id && g.game_number > last_kept));
        before - self.games.len()
    }

    /// Append a series entry and bump the file's counter.
    pub fn append_series(&mut self, entry: SeriesEntry) {
        let counter = match entry.match_type {
            HistoryKind::Ranked => &mut self.total_ranked_matches,
            HistoryKind::Test => &mut self.total_test_matches,
        };
        *counter = Some(counter.unwrap_or(0) + 1);
        self.matches.push(entry);
    }
}
