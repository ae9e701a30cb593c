//! Rebuild the ladder from exported per-game reports.
//!
//! Every `*.json` report in the stats directory is read in file-name order.
//! Only 4v4 team games count. All players' ladder counters are zeroed, then
//! the games are replayed one by one so that the rank-dependent XP factors
//! see each player's rank as it was at the time of the game.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::ladder::{RankTable, XpConfig};
use crate::store::players::PlayerRegistry;
use crate::store::rankstats::RankStats;
use crate::store::{self, DataDir, PlayerId};

/// Playlist the rebuilt ladder belongs to; also the per-player key holding
/// the playlist rank.
pub const PLAYLIST: &str = "MLG 4v4";

/// MMR given to players created for names nobody could be matched to.
pub const UNMATCHED_MMR: i64 = 750;

const TEAM_SIZE: usize = 4;

/// One exported game report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameReport {
    /// `Map Name`, `Variant Name`, `Start Time`, ...
    #[serde(default)]
    pub details: BTreeMap<String, Value>,
    #[serde(default)]
    pub players: Vec<ReportPlayer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPlayer {
    pub name: String,
    #[serde(default)]
    pub team: String,
    /// Points, or an `M:SS` time for timed gametypes.
    #[serde(default)]
    pub score: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_numeric: Option<i64>,
    #[serde(default)]
    pub kills: i64,
    #[serde(default)]
    pub deaths: i64,
    #[serde(default)]
    pub assists: i64,
    #[serde(default)]
    pub head_shots: i64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl GameReport {
    /// Exactly eight players split between Red and Blue.
    pub fn is_team_game(&self) -> bool {
        let has = |team: &str| self.players.iter().any(|p| p.team.trim() == team);
        self.players.len() == TEAM_SIZE * 2 && has("Red") && has("Blue")
    }

    /// Normalise every score cell into its display string plus a numeric
    /// value in `score_numeric`.
    pub fn normalise_scores(&mut self) {
        for player in &mut self.players {
            let (numeric, display) = parse_score(&player.score);
            player.score = Value::String(display);
            player.score_numeric = Some(numeric);
        }
    }

    /// Names on the winning and losing sides by summed score. A tie, or a
    /// game without both teams, has neither.
    pub fn winners_and_losers(&self) -> (Vec<String>, Vec<String>) {
        let side = |team: &str| -> (i64, Vec<String>) {
            let members = self.players.iter().filter(|p| p.team.trim() == team);
            let score = members
                .clone()
                .map(|p| p.score_numeric.unwrap_or_else(|| parse_score(&p.score).0))
                .sum();
            (score, members.map(|p| p.name.clone()).collect())
        };
        let (red_score, red) = side("Red");
        let (blue_score, blue) = side("Blue");
        if red.is_empty() || blue.is_empty() || red_score == blue_score {
            return (Vec::new(), Vec::new());
        }
        if red_score > blue_score {
            (red, blue)
        } else {
            (blue, red)
        }
    }
}

/// `(numeric, display)` for a score cell. `M:SS` counts seconds; anything
/// unparseable counts as zero.
pub fn parse_score(cell: &Value) -> (i64, String) {
    match cell {
        Value::Null => (0, "0".into()),
        Value::Number(n) => {
            let v = n.as_f64().unwrap_or_default() as i64;
            (v, v.to_string())
        }
        Value::String(s) => {
            let s = s.trim();
            if let Some((minutes, seconds)) = s.split_once(':') {
                let seconds = seconds.split(':').next().unwrap_or_default().trim();
                let minutes = minutes.trim().parse::<i64>();
                let seconds = if seconds.is_empty() { Ok(0) } else { seconds.parse::<i64>() };
                return match (minutes, seconds) {
                    (Ok(m), Ok(sec)) => (m * 60 + sec, s.to_string()),
                    _ => (0, s.to_string()),
                };
            }
            match s.parse::<f64>() {
                Ok(v) => (v as i64, (v as i64).to_string()),
                Err(_) => (0, s.to_string()),
            }
        }
        other => (0, other.to_string()),
    }
}

/// Stable id for a player name no registry entry matched: the first eight
/// bytes of the name's SHA-256, big-endian, reduced below 10^18.
pub fn synthetic_id(name: &str) -> PlayerId {
    let digest = Sha256::digest(name.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % 1_000_000_000_000_000_000).to_string()
}

/// Find the id for an in-game name: the players registry first (only if
/// that id already has stats), then `discord_name` in the stats.
fn resolve(name: &str, stats: &RankStats, profiles: &HashMap<String, PlayerId>) -> Option<PlayerId> {
    let key = name.trim().to_lowercase();
    if let Some(id) = profiles.get(&key).filter(|id| stats.players.contains_key(*id)) {
        return Some(id.clone());
    }
    stats
        .players
        .iter()
        .find(|(_, p)| p.discord_name.as_deref().is_some_and(|d| d.to_lowercase() == key))
        .map(|(id, _)| id.clone())
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Progress {
    xp: i64,
    level: u8,
    highest: u8,
    wins: i64,
    losses: i64,
    games: i64,
    kills: i64,
    deaths: i64,
    assists: i64,
    headshots: i64,
}

/// What a rebuild did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub games: usize,
    pub players: usize,
    pub unmatched: usize,
}

/// Replay `games` in order onto `stats`, zeroing every ladder first.
pub fn rebuild(
    games: &[GameReport],
    stats: &mut RankStats,
    registry: &PlayerRegistry,
    xp: &XpConfig,
    table: &RankTable,
) -> Summary {
    for player in stats.players.values_mut() {
        player.reset_ladder();
    }

    let profiles = registry.profile_lookup();
    let names: BTreeSet<&str> = games
        .iter()
        .flat_map(|g| g.players.iter().map(|p| p.name.as_str()))
        .collect();
    let mut ids: HashMap<&str, PlayerId> = HashMap::new();
    let mut unmatched = 0;
    for name in names {
        let id = match resolve(name, stats, &profiles) {
            Some(id) => id,
            None => {
                let id = synthetic_id(name);
                let player = stats.get_or_create(&id);
                player.mmr = UNMATCHED_MMR;
                player.discord_name = Some(name.to_string());
                player.rank = Some(1);
                unmatched += 1;
                debug!(name, id = %id, "no match for player, created entry");
                id
            }
        };
        ids.insert(name, id);
    }

    let mut progress: BTreeMap<PlayerId, Progress> = ids
        .values()
        .map(|id| {
            let start = Progress {
                level: 1,
                highest: 1,
                ..Progress::default()
            };
            (id.clone(), start)
        })
        .collect();

    for (n, game) in games.iter().enumerate() {
        let (winners, losers) = game.winners_and_losers();
        for player in &game.players {
            let Some(p) = ids.get(player.name.as_str()).and_then(|id| progress.get_mut(id)) else {
                continue;
            };
            p.games += 1;
            p.kills += player.kills;
            p.deaths += player.deaths;
            p.assists += player.assists;
            p.headshots += player.head_shots;

            if winners.contains(&player.name) {
                p.wins += 1;
                p.xp += (xp.game_win as f64 * xp.win_factor(p.level)) as i64;
            } else if losers.contains(&player.name) {
                p.losses += 1;
                p.xp += (xp.game_loss as f64 * xp.loss_factor(p.level)) as i64;
            }
            p.xp = p.xp.max(0);
            p.level = table.rank_for(p.xp);
            p.highest = p.highest.max(p.level);
        }
        debug!(game = n + 1, winners = winners.len(), "game replayed");
    }

    for (id, p) in &progress {
        let player = stats.get_or_create(id);
        player.wins = p.wins;
        player.losses = p.losses;
        player.total_games = p.games;
        player.kills = Some(p.kills);
        player.deaths = Some(p.deaths);
        player.assists = Some(p.assists);
        player.headshots = Some(p.headshots);
        player.xp = p.xp;
        player.rank = Some(p.level);
        player.highest_rank = Some(p.highest);
        player.extra.insert(PLAYLIST.to_string(), json!(p.level));
    }

    Summary {
        games: games.len(),
        players: progress.len(),
        unmatched,
    }
}

fn read_report(path: &Path) -> StoreResult<GameReport> {
    let text = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// `*.json` files in `dir`, sorted by file name.
fn report_files(dir: &Path) -> StoreResult<Vec<PathBuf>> {
    let io_err = |source: std::io::Error| StoreError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == "json") {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Load the 4v4 team games from `stats_dir`, skipping anything else.
pub fn load_team_games(stats_dir: &Path) -> StoreResult<Vec<GameReport>> {
    let mut games = Vec::new();
    for path in report_files(stats_dir)? {
        let file = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut report = match read_report(&path) {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "skipping unreadable report");
                continue;
            }
        };
        if !report.is_team_game() {
            info!(file = %file, players = report.players.len(), "skipping non-4v4 game");
            continue;
        }
        report.normalise_scores();
        report.source_file = Some(file);
        report.playlist = Some(PLAYLIST.to_string());
        let map = report.details.get("Map Name").cloned().unwrap_or_default();
        info!(
            file = report.source_file.as_deref().unwrap_or_default(),
            map = %map,
            "found 4v4 game"
        );
        games.push(report);
    }
    Ok(games)
}

/// Rebuild `rankstats.json` and `gameshistory.json` in `data` from the
/// reports in `stats_dir`.
pub fn populate(stats_dir: &Path, data: &DataDir) -> StoreResult<Summary> {
    let xp = XpConfig::load_or_create(&data.xp_config())?;
    let table = xp.table()?;
    let mut stats: RankStats = store::load_or_default(&data.rankstats())?;
    let registry: PlayerRegistry = store::load_or_default(&data.players())?;
    info!(players = registry.players.len(), "loaded players registry");

    let games = load_team_games(stats_dir)?;
    let summary = rebuild(&games, &mut stats, &registry, &xp, &table);

    store::save(&data.rankstats(), &stats)?;
    store::save(&data.gameshistory(), &games)?;
    info!(
        games = summary.games,
        players = summary.players,
        unmatched = summary.unmatched,
        "stats rebuilt"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(name: &str, team: &str, score: Value) -> ReportPlayer {
        ReportPlayer {
            name: name.into(),
            team: team.into(),
            score,
            score_numeric: None,
            kills: 2,
            deaths: 1,
            assists: 0,
            head_shots: 1,
            extra: BTreeMap::new(),
        }
    }

    /// Red players `r0..r3` score `red` each, blue `b0..b3` score `blue`.
    fn game(red: i64, blue: i64) -> GameReport {
        let mut players: Vec<_> = (0..4).map(|i| player(&format!("r{}", i), "Red", json!(red))).collect();
        players.extend((0..4).map(|i| player(&format!("b{}", i), "Blue", json!(blue))));
        GameReport {
            players,
            ..Default::default()
        }
    }

    #[test]
    fn score_cells() {
        assert_eq!(parse_score(&json!(12)), (12, "12".into()));
        assert_eq!(parse_score(&json!(7.9)), (7, "7".into()));
        assert_eq!(parse_score(&json!("3:25")), (205, "3:25".into()));
        assert_eq!(parse_score(&json!("4:")), (240, "4:".into()));
        assert_eq!(parse_score(&json!(" 15 ")), (15, "15".into()));
        assert_eq!(parse_score(&json!("x:1")), (0, "x:1".into()));
        assert_eq!(parse_score(&json!("n/a")), (0, "n/a".into()));
        assert_eq!(parse_score(&Value::Null), (0, "0".into()));
    }

    #[test]
    fn team_game_needs_eight_on_two_teams() {
        assert!(game(1, 0).is_team_game());
        let mut ffa = game(1, 0);
        for p in &mut ffa.players {
            p.team = "None".into();
        }
        assert!(!ffa.is_team_game());
        let mut short = game(1, 0);
        short.players.pop();
        assert!(!short.is_team_game());
    }

    #[test]
    fn higher_score_wins_and_ties_count_for_nobody() {
        let (winners, losers) = game(10, 25).winners_and_losers();
        assert_eq!(winners, vec!["b0", "b1", "b2", "b3"]);
        assert_eq!(losers.len(), 4);
        assert_eq!(game(5, 5).winners_and_losers(), (vec![], vec![]));
    }

    #[test]
    fn timed_scores_compare_in_seconds() {
        let mut g = game(0, 0);
        for p in &mut g.players {
            p.score = if p.team == "Red" { json!("1:05") } else { json!("0:59") };
        }
        g.normalise_scores();
        assert_eq!(g.players[0].score_numeric, Some(65));
        assert_eq!(g.players[0].score, json!("1:05"));
        assert_eq!(g.winners_and_losers().0[0], "r0");
    }

    #[test]
    fn synthetic_ids_are_stable() {
        assert_eq!(synthetic_id("Chief"), synthetic_id("Chief"));
        assert_ne!(synthetic_id("Chief"), synthetic_id("Arbiter"));
        assert!(synthetic_id("Chief").len() <= 18);
        // Persisted in rankstats.json, so the value must not drift.
        assert_eq!(synthetic_id("Chief"), "750601739679749011");
        assert_eq!(synthetic_id("r0"), "931789994081791714");
    }

    #[test]
    fn rebuild_replays_games_in_order() {
        let xp = XpConfig::default();
        let table = xp.table().unwrap();
        let mut stats = RankStats::default();
        let summary = rebuild(
            &[game(10, 0), game(10, 0), game(0, 10)],
            &mut stats,
            &PlayerRegistry::default(),
            &xp,
            &table,
        );
        assert_eq!(summary, Summary { games: 3, players: 8, unmatched: 8 });

        let r0 = stats.get(&synthetic_id("r0")).unwrap();
        assert_eq!((r0.wins, r0.losses, r0.total_games), (2, 1, 3));
        assert_eq!(r0.xp, 50 + 50 + 10);
        assert_eq!(r0.rank, Some(table.rank_for(110)));
        assert_eq!(r0.mmr, UNMATCHED_MMR);
        assert_eq!(r0.discord_name.as_deref(), Some("r0"));
        assert_eq!(r0.kills, Some(6));
        assert_eq!(r0.extra.get(PLAYLIST), Some(&json!(r0.rank.unwrap())));
    }

    #[test]
    fn factors_truncate_and_xp_floors_at_zero() {
        let mut xp = XpConfig::default();
        xp.game_loss = -25;
        xp.loss_factors.insert("1".into(), 0.5);
        xp.loss_factors.insert("2".into(), 0.5);
        let table = xp.table().unwrap();
        let mut stats = RankStats::default();
        rebuild(&[game(0, 10)], &mut stats, &PlayerRegistry::default(), &xp, &table);
        let loser = stats.get(&synthetic_id("r0")).unwrap();
        assert_eq!(loser.xp, 0);
        assert_eq!(loser.highest_rank, Some(1));

        // -25 * 0.5 = -12.5 truncates to -12
        let mut stats = RankStats::default();
        rebuild(&[game(10, 0), game(10, 0), game(0, 10)], &mut stats, &PlayerRegistry::default(), &xp, &table);
        let r0 = stats.get(&synthetic_id("r0")).unwrap();
        assert_eq!(r0.xp, 100 - 12);
        assert_eq!(r0.highest_rank, Some(table.rank_for(100)));
    }

    #[test]
    fn names_match_registry_then_discord_name() {
        let registry: PlayerRegistry = serde_json::from_value(json!({
            "111": { "stats_profile": "R0" },
            "999": { "stats_profile": "b0" }
        }))
        .unwrap();
        let mut stats: RankStats = serde_json::from_value(json!({
            "111": { "xp": 5000, "wins": 90, "mmr": 2100 },
            "222": { "discord_name": "R1", "series_wins": 3 }
        }))
        .unwrap();
        let xp = XpConfig::default();
        let table = xp.table().unwrap();
        let summary = rebuild(&[game(1, 0)], &mut stats, &registry, &xp, &table);

        // 999 has no stats entry, so b0 falls through to a synthetic id.
        assert_eq!(summary.unmatched, 6);
        let chief = stats.get("111").unwrap();
        assert_eq!((chief.wins, chief.xp, chief.mmr), (1, 50, 2100));
        let second = stats.get("222").unwrap();
        assert_eq!((second.wins, second.series_wins), (1, 0));
        assert!(stats.get(&synthetic_id("b0")).is_some());
        assert!(stats.get("999").is_none());
    }

    #[test]
    fn populate_reads_reports_from_disk() {
        let stats_dir = tempfile::tempdir().unwrap();
        let data_dir = tempfile::tempdir().unwrap();
        let write = |name: &str, report: &GameReport| {
            std::fs::write(stats_dir.path().join(name), serde_json::to_string(report).unwrap()).unwrap();
        };
        let mut second = game(0, 10);
        second.details.insert("Map Name".into(), json!("Midship"));
        write("002.json", &second);
        write("001.json", &game(10, 0));
        let mut ffa = game(1, 0);
        ffa.players.truncate(3);
        write("003.json", &ffa);
        std::fs::write(stats_dir.path().join("notes.txt"), "ignore me").unwrap();
        std::fs::write(stats_dir.path().join("004.json"), "{ broken").unwrap();

        let data = DataDir::new(data_dir.path());
        let summary = populate(stats_dir.path(), &data).unwrap();
        assert_eq!(summary.games, 2);

        let history: Vec<GameReport> = store::load_or_default(&data.gameshistory()).unwrap();
        assert_eq!(history[0].source_file.as_deref(), Some("001.json"));
        assert_eq!(history[1].playlist.as_deref(), Some(PLAYLIST));
        assert_eq!(history[1].details["Map Name"], json!("Midship"));
        assert_eq!(history[0].players[0].score, json!("10"));

        let stats: RankStats = store::load_or_default(&data.rankstats()).unwrap();
        let r0 = stats.get(&synthetic_id("r0")).unwrap();
        assert_eq!((r0.wins, r0.losses, r0.xp), (1, 1, 60));
    }
}
