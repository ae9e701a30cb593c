//! Per-player ladder stats (`rankstats.json`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ladder::RankTable;

/// Discord user id (snowflake as a string), the key of every player record.
pub type PlayerId = String;

pub const DEFAULT_MMR: i64 = 1500;
pub const MIN_MMR: i64 = 0;
pub const MAX_MMR: i64 = 10_000;

fn default_mmr() -> i64 {
    DEFAULT_MMR
}

/// One player's record. Unknown keys are kept in `extra` so the website's
/// fields survive a load/save cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    #[serde(default)]
    pub xp: i64,
    #[serde(default)]
    pub wins: i64,
    #[serde(default)]
    pub losses: i64,
    #[serde(default)]
    pub series_wins: i64,
    #[serde(default)]
    pub series_losses: i64,
    #[serde(default)]
    pub total_games: i64,
    #[serde(default)]
    pub total_series: i64,
    #[serde(default = "default_mmr")]
    pub mmr: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highest_rank: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kills: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deaths: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assists: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headshots: Option<i64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for PlayerStats {
    fn default() -> Self {
        Self {
            xp: 0,
            wins: 0,
            losses: 0,
            series_wins: 0,
            series_losses: 0,
            total_games: 0,
            total_series: 0,
            mmr: DEFAULT_MMR,
            discord_name: None,
            rank: None,
            highest_rank: None,
            kills: None,
            deaths: None,
            assists: None,
            headshots: None,
            extra: BTreeMap::new(),
        }
    }
}

impl PlayerStats {
    /// Win percentage over all recorded games, 0 when none.
    pub fn win_rate(&self) -> f64 {
        if self.total_games > 0 {
            self.wins as f64 / self.total_games as f64 * 100.0
        } else {
            0.0
        }
    }

    /// Apply an additive update. XP is floored at zero afterwards.
    pub fn apply(&mut self, delta: &StatsDelta) {
        self.xp += delta.xp;
        self.wins += delta.wins;
        self.losses += delta.losses;
        self.series_wins += delta.series_wins;
        self.series_losses += delta.series_losses;
        self.total_games += delta.total_games;
        self.total_series += delta.total_series;
        self.xp = self.xp.max(0);
    }

    /// Zero every ladder counter, keeping identity fields and MMR.
    pub fn reset_ladder(&mut self) {
        self.xp = 0;
        self.wins = 0;
        self.losses = 0;
        self.series_wins = 0;
        self.series_losses = 0;
        self.total_games = 0;
        self.total_series = 0;
        self.rank = Some(1);
        self.kills = None;
        self.deaths = None;
        self.assists = None;
        self.headshots = None;
    }
}

/// Additive change to a [`PlayerStats`] record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsDelta {
    pub xp: i64,
    pub wins: i64,
    pub losses: i64,
    pub series_wins: i64,
    pub series_losses: i64,
    pub total_games: i64,
    pub total_series: i64,
}

impl StatsDelta {
    pub fn game_win(xp: i64) -> Self {
        Self {
            xp,
            wins: 1,
            total_games: 1,
            ..Self::default()
        }
    }

    pub fn game_loss(xp: i64) -> Self {
        Self {
            xp,
            losses: 1,
            total_games: 1,
            ..Self::default()
        }
    }

    pub fn series_win() -> Self {
        Self {
            series_wins: 1,
            total_series: 1,
            ..Self::default()
        }
    }

    pub fn series_loss() -> Self {
        Self {
            series_losses: 1,
            total_series: 1,
            ..Self::default()
        }
    }

    /// The delta that undoes this one (modulo the XP floor).
    pub fn inverse(self) -> Self {
        Self {
            xp: -self.xp,
            wins: -self.wins,
            losses: -self.losses,
            series_wins: -self.series_wins,
            series_losses: -self.series_losses,
            total_games: -self.total_games,
            total_series: -self.total_series,
        }
    }
}

/// Leaderboard ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Rank,
    Wins,
    SeriesWins,
    Mmr,
}

impl SortKey {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rank" => Some(Self::Rank),
            "wins" => Some(Self::Wins),
            "series_wins" => Some(Self::SeriesWins),
            "mmr" => Some(Self::Mmr),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rank => "rank",
            Self::Wins => "wins",
            Self::SeriesWins => "series_wins",
            Self::Mmr => "mmr",
        }
    }

    /// Human label, e.g. `Series Wins`.
    pub fn title(self) -> &'static str {
        match self {
            Self::Rank => "Rank",
            Self::Wins => "Wins",
            Self::SeriesWins => "Series Wins",
            Self::Mmr => "Mmr",
        }
    }
}

/// A leaderboard row: player id, their record, and their computed level.
#[derive(Debug, Clone)]
pub struct Standing {
    pub player_id: PlayerId,
    pub stats: PlayerStats,
    pub level: u8,
}

/// The whole `rankstats.json` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RankStats {
    pub players: BTreeMap<PlayerId, PlayerStats>,
}

impl RankStats {
    pub fn get(&self, id: &str) -> Option<&PlayerStats> {
        self.players.get(id)
    }

    /// The player's record, created with defaults on first access.
    pub fn get_or_create(&mut self, id: &str) -> &mut PlayerStats {
        self.players.entry(id.to_string()).or_default()
    }

    /// MMR used for team balancing; unknown players count as the default.
    pub fn mmr_of(&self, id: &str) -> i64 {
        self.players.get(id).map_or(DEFAULT_MMR, |p| p.mmr)
    }

    pub fn apply(&mut self, id: &str, delta: &StatsDelta) {
        self.get_or_create(id).apply(delta);
    }

    pub fn set_mmr(&mut self, id: &str, mmr: i64) {
        self.get_or_create(id).mmr = mmr;
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// All players ordered for the leaderboard, best first.
    pub fn sorted(&self, key: SortKey, table: &RankTable) -> Vec<Standing> {
        let mut rows: Vec<Standing> = self
            .players
            .iter()
            .map(|(id, stats)| Standing {
                player_id: id.clone(),
                stats: stats.clone(),
                level: table.rank_for(stats.xp),
            })
            .collect();

        match key {
            SortKey::Rank => rows.sort_by(|a, b| (b.level, b.stats.xp).cmp(&(a.level, a.stats.xp))),
            SortKey::Wins => rows.sort_by(|a, b| b.stats.wins.cmp(&a.stats.wins)),
            SortKey::SeriesWins => rows.sort_by(|a, b| b.stats.series_wins.cmp(&a.stats.series_wins)),
            SortKey::Mmr => rows.sort_by(|a, b| b.stats.mmr.cmp(&a.stats.mmr)),
        }
        rows
    }
}
