//! Map/gametype log per match and game (`gamestats.json`).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MatchError;

/// The playlist: which gametypes are played on which map.
pub const MAP_GAMETYPES: &[(&str, &[&str])] = &[
    ("Midship", &["MLG CTF5", "MLG Team Slayer", "MLG Oddball", "MLG Bomb"]),
    ("Beaver Creek", &["MLG Team Slayer"]),
    ("Lockout", &["MLG Team Slayer", "MLG Oddball"]),
    ("Warlock", &["MLG Team Slayer", "MLG CTF5"]),
    ("Sanctuary", &["MLG CTF3", "MLG Team Slayer"]),
];

/// Every gametype in the playlist, in display order.
pub const ALL_GAMETYPES: &[&str] = &[
    "MLG CTF5",
    "MLG CTF3",
    "MLG Team Slayer",
    "MLG Oddball",
    "MLG Bomb",
];

/// Gametypes valid on `map`, or `None` for a map outside the playlist.
pub fn gametypes_for(map: &str) -> Option<&'static [&'static str]> {
    MAP_GAMETYPES
        .iter()
        .find(|(name, _)| *name == map)
        .map(|(_, types)| *types)
}

/// Check a map/gametype pair against the playlist.
pub fn validate(map: &str, gametype: &str) -> Result<(), MatchError> {
    let types = gametypes_for(map).ok_or_else(|| MatchError::UnknownMap(map.to_string()))?;
    if types.contains(&gametype) {
        Ok(())
    } else {
        Err(MatchError::InvalidGametype {
            map: map.to_string(),
            gametype: gametype.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameDetails {
    pub map: String,
    pub gametype: String,
    pub timestamp: String,
    /// `YYYY-MM-DD`, used by the site for rank resets.
    pub date: String,
}

/// `match_<n>` → `game_<m>` → details.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameStats {
    pub matches: BTreeMap<String, BTreeMap<String, GameDetails>>,
}

fn match_key(match_number: u64) -> String {
    format!("match_{}", match_number)
}

fn game_key(game_number: u32) -> String {
    format!("game_{}", game_number)
}

impl GameStats {
    /// Record the map and gametype of one game. An existing entry for the
    /// same game is replaced.
    pub fn add_game(
        &mut self,
        match_number: u64,
        game_number: u32,
        map: &str,
        gametype: &str,
        now: DateTime<Utc>,
    ) -> Result<(), MatchError> {
        validate(map, gametype)?;
        self.matches.entry(match_key(match_number)).or_default().insert(
            game_key(game_number),
            GameDetails {
                map: map.to_string(),
                gametype: gametype.to_string(),
                timestamp: now.to_rfc3339(),
                date: now.format("%Y-%m-%d").to_string(),
            },
        );
        Ok(())
    }

    pub fn lookup(&self, match_number: u64, game_number: u32) -> Option<&GameDetails> {
        self.matches
            .get(&match_key(match_number))?
            .get(&game_key(game_number))
    }
}
