//! Queue, series and stats orchestration.
//!
//! [`Matchmaking`] owns the live state (queue plus at most one series) and
//! knows where the JSON stores live. Every operation that changes persisted
//! data loads the file, mutates it and writes it back immediately, so the
//! website always sees the latest numbers.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::{MatchError, MatchmakingError, StoreResult};
use crate::ladder::{RankTable, XpConfig};
use crate::queue::{Queue, MAX_QUEUE_SIZE};
use crate::series::{Series, SeriesStatus, Team, VoteOutcome};
use crate::store::gamestats::GameStats;
use crate::store::history::{
    FinalScore, FinalTeam, FinalTeams, GameBreakdown, GameEntry, HistoryKind, MatchHistory,
    SeriesEntry, SeriesWinner, TeamRosters,
};
use crate::store::queue_config::QueueConfig;
use crate::store::rankstats::{PlayerStats, RankStats, StatsDelta, MAX_MMR, MIN_MMR};
use crate::store::{self, DataDir, PlayerId};
use crate::teams::{self, TeamSplit};

type Result<T> = std::result::Result<T, MatchmakingError>;

/// Fewest players a forced start accepts.
pub const MIN_PLAYERS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesStart {
    pub match_number: u64,
    pub series_label: String,
    pub split: TeamSplit,
    pub test_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Queued { size: usize },
    Started(SeriesStart),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesEnd {
    pub match_number: u64,
    pub series_label: String,
    pub winner: Team,
    pub score: FinalScore,
    pub games_played: u32,
    pub test_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameResult {
    pub game_number: u32,
    pub winner: Team,
    pub red_wins: u32,
    pub blue_wins: u32,
    pub finished: Option<SeriesEnd>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteResult {
    Pending { red: usize, blue: usize, needed: usize },
    Decided(GameResult),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correction {
    pub game_number: usize,
    pub old_winner: Team,
    pub new_winner: Team,
    /// Games after the new deciding game that no longer count.
    pub dropped_games: usize,
    pub finished: Option<SeriesEnd>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    FromQueue,
    FromSeries(Team),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cancelled {
    pub match_number: u64,
    pub games_played: usize,
    /// Whether a `CANCELLED` series entry was written.
    pub logged: bool,
}

pub struct Matchmaking {
    data: DataDir,
    xp: XpConfig,
    table: RankTable,
    queue_config: QueueConfig,
    queue: Queue,
    series: Option<Series>,
}

impl Matchmaking {
    /// Load the XP and queue configuration from `data`, writing the default
    /// XP config if there is none.
    pub fn open(data: DataDir) -> StoreResult<Self> {
        let xp = XpConfig::load_or_create(&data.xp_config())?;
        let table = xp.table()?;
        let queue_config = store::load_or_default(&data.queue_config())?;
        info!(root = %data.root().display(), "matchmaking data loaded");
        Ok(Self {
            data,
            xp,
            table,
            queue_config,
            queue: Queue::new(),
            series: None,
        })
    }

    pub fn data_dir(&self) -> &DataDir {
        &self.data
    }

    pub fn xp_config(&self) -> &XpConfig {
        &self.xp
    }

    pub fn rank_table(&self) -> &RankTable {
        &self.table
    }

    pub fn queue_config(&self) -> &QueueConfig {
        &self.queue_config
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn series(&self) -> Option<&Series> {
        self.series.as_ref()
    }

    pub fn rankstats(&self) -> StoreResult<RankStats> {
        store::load_or_default(&self.data.rankstats())
    }

    /// A player's record, or the defaults if they have never played.
    pub fn player_stats(&self, player: &str) -> StoreResult<PlayerStats> {
        Ok(self.rankstats()?.get(player).cloned().unwrap_or_default())
    }

    // -----------------------------------------------------------------------
    // Queue
    // -----------------------------------------------------------------------

    /// Queue a member holding `roles`. Filling the queue starts a ranked
    /// series.
    pub fn join(&mut self, player: &str, roles: &[String], now: DateTime<Utc>) -> Result<JoinOutcome> {
        self.queue_config.check(roles)?;
        self.add_player(player, now)
    }

    /// Queue a player without the role check.
    pub fn add_player(&mut self, player: &str, now: DateTime<Utc>) -> Result<JoinOutcome> {
        if self.series.is_some() {
            return Err(MatchError::SeriesInProgress.into());
        }
        let size = self.queue.join(player, now)?;
        info!(player, size, "player joined queue");
        if size == MAX_QUEUE_SIZE {
            return self.start_series(false).map(JoinOutcome::Started);
        }
        Ok(JoinOutcome::Queued { size })
    }

    pub fn leave(&mut self, player: &str, now: DateTime<Utc>) -> std::result::Result<chrono::Duration, MatchError> {
        let waited = self.queue.leave(player, now)?;
        info!(player, size = self.queue.len(), "player left queue");
        Ok(waited)
    }

    /// Take a player out of the queue, or out of the live series.
    pub fn remove_player(&mut self, player: &str) -> std::result::Result<Removal, MatchError> {
        if self.queue.contains(player) {
            self.queue.leave(player, Utc::now())?;
            info!(player, "admin removed player from queue");
            return Ok(Removal::FromQueue);
        }
        let series = self.series.as_mut().ok_or(MatchError::NoActiveSeries)?;
        let team = series.remove_player(player)?;
        info!(player, team = %team, match_number = series.match_number, "admin removed player from series");
        Ok(Removal::FromSeries(team))
    }

    pub fn reset_queue(&mut self) -> Vec<PlayerId> {
        let removed = self.queue.reset();
        info!(count = removed.len(), "queue reset");
        removed
    }

    /// Start a series from whoever is queued.
    pub fn start_match(&mut self, test_mode: bool) -> Result<SeriesStart> {
        if self.series.is_some() {
            return Err(MatchError::SeriesInProgress.into());
        }
        if self.queue.len() < MIN_PLAYERS {
            return Err(MatchError::NotEnoughPlayers {
                needed: MIN_PLAYERS,
                have: self.queue.len(),
            }
            .into());
        }
        self.start_series(test_mode)
    }

    fn start_series(&mut self, test_mode: bool) -> Result<SeriesStart> {
        let kind = HistoryKind::from_test_mode(test_mode);
        let history: MatchHistory = store::load_or_default(&self.data.history(kind))?;
        let stats = self.rankstats()?;

        let players = self.queue.reset();
        let split = teams::balance(&players, &stats);
        let match_number = history.total(kind) + 1;
        let series_label = match kind {
            HistoryKind::Ranked => format!("Series {}", match_number),
            HistoryKind::Test => format!("Test {}", match_number),
        };

        info!(
            match_number,
            test_mode,
            red_avg = split.red_avg,
            blue_avg = split.blue_avg,
            diff = split.diff,
            "series started"
        );
        self.series = Some(Series::new(
            match_number,
            series_label.clone(),
            split.red.clone(),
            split.blue.clone(),
            test_mode,
        ));
        Ok(SeriesStart {
            match_number,
            series_label,
            split,
            test_mode,
        })
    }

    // -----------------------------------------------------------------------
    // Series
    // -----------------------------------------------------------------------

    /// Count a vote; a majority records the game.
    pub fn vote(&mut self, player: &str, team: Team, now: DateTime<Utc>) -> Result<VoteResult> {
        let series = self.series.as_mut().ok_or(MatchError::NoActiveSeries)?;
        match series.vote(player, team)? {
            VoteOutcome::Pending { red, blue, needed } => Ok(VoteResult::Pending { red, blue, needed }),
            VoteOutcome::Decided(winner) => self.record_winner(winner, now).map(VoteResult::Decided),
        }
    }

    /// Record the current game's winner: log it, apply ranked stats, and
    /// close the series if this was the deciding game.
    pub fn record_winner(&mut self, winner: Team, now: DateTime<Utc>) -> Result<GameResult> {
        let series = self.series.as_mut().ok_or(MatchError::NoActiveSeries)?;
        let status = series.record_game(winner)?;
        let game_number = series.games.len() as u32;
        let kind = HistoryKind::from_test_mode(series.test_mode);

        let entry = GameEntry {
            kind: "GAME".into(),
            match_type: kind,
            series_label: series.series_label.clone(),
            match_id: series.match_number,
            game_number,
            winner,
            loser: winner.other(),
            timestamp: now.to_rfc3339(),
            teams_at_game: TeamRosters {
                red: series.red.clone(),
                blue: series.blue.clone(),
            },
        };
        let red_wins = series.wins(Team::Red);
        let blue_wins = series.wins(Team::Blue);
        let test_mode = series.test_mode;
        let (winners, losers) = (series.roster(winner).to_vec(), series.roster(winner.other()).to_vec());
        info!(match_number = series.match_number, game_number, winner = %winner, "game recorded");

        let path = self.data.history(kind);
        let mut history: MatchHistory = store::load_or_default(&path)?;
        history.append_game(entry);
        store::save(&path, &history)?;

        if !test_mode {
            self.apply_game_stats(&winners, &losers, false)?;
        }

        let finished = match status {
            SeriesStatus::Ended(_) => Some(self.finish_series(now)?),
            SeriesStatus::InProgress => None,
        };
        Ok(GameResult {
            game_number,
            winner,
            red_wins,
            blue_wins,
            finished,
        })
    }

    /// Per-game XP and counters for both sides, or their reversal.
    fn apply_game_stats(&self, winners: &[PlayerId], losers: &[PlayerId], reverse: bool) -> StoreResult<()> {
        let path = self.data.rankstats();
        let mut stats: RankStats = store::load_or_default(&path)?;
        let (win, loss) = (
            StatsDelta::game_win(self.xp.game_win),
            StatsDelta::game_loss(self.xp.game_loss),
        );
        let (win, loss) = if reverse { (win.inverse(), loss.inverse()) } else { (win, loss) };
        for id in winners {
            stats.apply(id, &win);
        }
        for id in losers {
            stats.apply(id, &loss);
        }
        store::save(&path, &stats)
    }

    /// Append a series entry for `series` to its history file. This takes
    /// the file's next match number, so a later series never reuses it.
    fn log_series(&self, series: &Series, winner: SeriesWinner, now: DateTime<Utc>) -> StoreResult<()> {
        let kind = HistoryKind::from_test_mode(series.test_mode);
        let gamestats: GameStats = store::load_or_default(&self.data.gamestats())?;

        let games = series
            .games
            .iter()
            .enumerate()
            .map(|(i, &w)| {
                let game_number = i as u32 + 1;
                let details = gamestats.lookup(series.match_number, game_number);
                GameBreakdown {
                    game_number,
                    winner: w,
                    loser: w.other(),
                    map: details.map(|d| d.map.clone()),
                    gametype: details.map(|d| d.gametype.clone()),
                }
            })
            .collect();
        let entry = SeriesEntry {
            kind: "SERIES".into(),
            match_type: kind,
            series_label: series.series_label.clone(),
            match_id: series.match_number,
            timestamp: now.to_rfc3339(),
            timestamp_display: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            winner,
            final_score: FinalScore {
                red: series.wins(Team::Red),
                blue: series.wins(Team::Blue),
            },
            teams_final: FinalTeams {
                red: FinalTeam {
                    players: series.red.clone(),
                    voice_channel_id: series.red_vc_id.clone(),
                },
                blue: FinalTeam {
                    players: series.blue.clone(),
                    voice_channel_id: series.blue_vc_id.clone(),
                },
            },
            games,
            total_games_played: series.games.len() as u32,
            stats_recorded: !series.test_mode,
            swap_history: series.swap_history.clone(),
        };

        let path = self.data.history(kind);
        let mut history: MatchHistory = store::load_or_default(&path)?;
        history.append_series(entry);
        store::save(&path, &history)
    }

    /// Write the series entry, apply series counters for ranked play and
    /// clear the live state.
    fn finish_series(&mut self, now: DateTime<Utc>) -> Result<SeriesEnd> {
        let series = self.series.take().ok_or(MatchError::NoActiveSeries)?;
        let winner = match series.status() {
            SeriesStatus::Ended(team) => team,
            SeriesStatus::InProgress => {
                self.series = Some(series);
                return Err(MatchError::NoActiveSeries.into());
            }
        };
        self.log_series(&series, winner.into(), now)?;
        let score = FinalScore {
            red: series.wins(Team::Red),
            blue: series.wins(Team::Blue),
        };

        if !series.test_mode {
            let path = self.data.rankstats();
            let mut stats: RankStats = store::load_or_default(&path)?;
            for id in series.roster(winner) {
                stats.apply(id, &StatsDelta::series_win());
            }
            for id in series.roster(winner.other()) {
                stats.apply(id, &StatsDelta::series_loss());
            }
            store::save(&path, &stats)?;
        }
        self.queue.reset();

        info!(
            match_number = series.match_number,
            winner = %winner,
            red = score.red,
            blue = score.blue,
            "series finished"
        );
        Ok(SeriesEnd {
            match_number: series.match_number,
            series_label: series.series_label,
            winner,
            score,
            games_played: series.games.len() as u32,
            test_mode: series.test_mode,
        })
    }

    /// Drop the live series. Games already decided stay in the history and
    /// keep their stats, and a `CANCELLED` series entry closes them off. A
    /// series with no decided games leaves no trace.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<Cancelled> {
        let series = self.series.take().ok_or(MatchError::NoActiveSeries)?;
        let logged = !series.games.is_empty();
        if logged {
            if let Err(e) = self.log_series(&series, SeriesWinner::Cancelled, now) {
                self.series = Some(series);
                return Err(e.into());
            }
        }
        self.queue.reset();
        info!(match_number = series.match_number, games = series.games.len(), logged, "series cancelled");
        Ok(Cancelled {
            match_number: series.match_number,
            games_played: series.games.len(),
            logged,
        })
    }

    /// Change the winner of an already decided game of the live series.
    ///
    /// If the new result decides the series before its last recorded game,
    /// the games after the decider are discarded along with their history
    /// entries and ranked stats.
    pub fn correct_game(&mut self, game_number: usize, winner: Team, now: DateTime<Utc>) -> Result<Correction> {
        let series = self.series.as_mut().ok_or(MatchError::NoActiveSeries)?;
        let old_winner = series.correct_game(game_number, winner)?;
        let match_number = series.match_number;
        let kind = HistoryKind::from_test_mode(series.test_mode);
        let roster = series.rosters.get(game_number - 1).cloned();
        let dropped = series.drop_games_after_decider();
        let kept = series.games.len() as u32;
        let status = series.status();
        info!(match_number, game_number, old = %old_winner, new = %winner, dropped = dropped.len(), "game corrected");

        if old_winner != winner || !dropped.is_empty() {
            let path = self.data.history(kind);
            let mut history: MatchHistory = store::load_or_default(&path)?;
            if old_winner != winner && !history.correct_game(match_number, game_number as u32, winner) {
                warn!(match_number, game_number, "corrected game missing from history");
            }
            history.drop_games_after(match_number, kept);
            store::save(&path, &history)?;
        }

        if kind == HistoryKind::Ranked {
            if old_winner != winner {
                if let Some(TeamRosters { red, blue }) = roster {
                    let (old_w, old_l) = match old_winner {
                        Team::Red => (&red, &blue),
                        Team::Blue => (&blue, &red),
                    };
                    self.apply_game_stats(old_w, old_l, true)?;
                    self.apply_game_stats(old_l, old_w, false)?;
                }
            }
            for (team, TeamRosters { red, blue }) in &dropped {
                let (w, l) = match team {
                    Team::Red => (red, blue),
                    Team::Blue => (blue, red),
                };
                self.apply_game_stats(w, l, true)?;
            }
        }

        let finished = match status {
            SeriesStatus::Ended(_) => Some(self.finish_series(now)?),
            SeriesStatus::InProgress => None,
        };
        Ok(Correction {
            game_number,
            old_winner,
            new_winner: winner,
            dropped_games: dropped.len(),
            finished,
        })
    }

    pub fn swap(&mut self, red_player: &str, blue_player: &str, now: DateTime<Utc>) -> std::result::Result<(), MatchError> {
        let series = self.series.as_mut().ok_or(MatchError::NoActiveSeries)?;
        series.swap(red_player, blue_player, now.to_rfc3339())?;
        info!(red_player, blue_player, game = series.current_game, "players swapped");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Admin settings
    // -----------------------------------------------------------------------

    pub fn set_mmr(&mut self, player: &str, mmr: i64) -> Result<()> {
        if !(MIN_MMR..=MAX_MMR).contains(&mmr) {
            return Err(MatchError::MmrOutOfRange.into());
        }
        let path = self.data.rankstats();
        let mut stats: RankStats = store::load_or_default(&path)?;
        stats.set_mmr(player, mmr);
        store::save(&path, &stats)?;
        info!(player, mmr, "mmr set");
        Ok(())
    }

    pub fn add_game_stats(
        &mut self,
        match_number: u64,
        game_number: u32,
        map: &str,
        gametype: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let path = self.data.gamestats();
        let mut stats: GameStats = store::load_or_default(&path)?;
        stats.add_game(match_number, game_number, map, gametype, now)?;
        store::save(&path, &stats)?;
        info!(match_number, game_number, map, gametype, "game stats added");
        Ok(())
    }

    pub fn set_banned_roles(&mut self, roles: Vec<String>) -> StoreResult<()> {
        self.queue_config.banned_roles = roles;
        store::save(&self.data.queue_config(), &self.queue_config)
    }

    pub fn set_required_roles(&mut self, roles: Vec<String>) -> StoreResult<()> {
        self.queue_config.required_roles = roles;
        store::save(&self.data.queue_config(), &self.queue_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // The bot task owns this across awaits.
    static_assertions::assert_impl_all!(Matchmaking: Send, Sync);

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 21, 30, 0).unwrap()
    }

    fn open() -> (tempfile::TempDir, Matchmaking) {
        let dir = tempfile::tempdir().unwrap();
        let mm = Matchmaking::open(DataDir::new(dir.path())).unwrap();
        (dir, mm)
    }

    fn fill(mm: &mut Matchmaking) -> SeriesStart {
        let mut last = None;
        for i in 1..=MAX_QUEUE_SIZE {
            last = Some(mm.add_player(&i.to_string(), now()).unwrap());
        }
        match last {
            Some(JoinOutcome::Started(start)) => start,
            other => panic!("queue did not start a series: {:?}", other),
        }
    }

    #[test]
    fn open_writes_default_xp_config() {
        let (dir, mm) = open();
        assert!(dir.path().join("xp_config.json").exists());
        assert_eq!(mm.xp_config().game_win, 50);
    }

    #[test]
    fn eighth_join_starts_ranked_series() {
        let (_dir, mut mm) = open();
        let start = fill(&mut mm);
        assert_eq!(start.match_number, 1);
        assert_eq!(start.series_label, "Series 1");
        assert!(!start.test_mode);
        assert!(mm.queue().is_empty());
        assert!(mm.series().is_some());
    }

    #[test]
    fn joins_blocked_during_series() {
        let (_dir, mut mm) = open();
        fill(&mut mm);
        let err = mm.add_player("late", now()).unwrap_err();
        assert!(matches!(err, MatchmakingError::Match(MatchError::SeriesInProgress)));
    }

    #[test]
    fn banned_role_cannot_join() {
        let (_dir, mut mm) = open();
        mm.set_banned_roles(vec!["666".into()]).unwrap();
        let err = mm.join("1", &["666".into()], now()).unwrap_err();
        assert!(matches!(err, MatchmakingError::Match(MatchError::NotEligible(_))));
        assert!(mm.queue().is_empty());
    }

    #[test]
    fn start_match_needs_two_players() {
        let (_dir, mut mm) = open();
        mm.add_player("1", now()).unwrap();
        let err = mm.start_match(true).unwrap_err();
        assert!(matches!(
            err,
            MatchmakingError::Match(MatchError::NotEnoughPlayers { needed: 2, have: 1 })
        ));
        mm.add_player("2", now()).unwrap();
        let start = mm.start_match(true).unwrap();
        assert_eq!(start.series_label, "Test 1");
    }

    #[test]
    fn ranked_game_applies_stats() {
        let (_dir, mut mm) = open();
        let start = fill(&mut mm);
        mm.record_winner(Team::Red, now()).unwrap();
        let stats = mm.rankstats().unwrap();
        let red = stats.get(&start.split.red[0]).unwrap();
        let blue = stats.get(&start.split.blue[0]).unwrap();
        assert_eq!((red.wins, red.xp, red.total_games), (1, 50, 1));
        assert_eq!((blue.losses, blue.xp), (1, 10));
    }

    #[test]
    fn test_mode_leaves_stats_alone() {
        let (_dir, mut mm) = open();
        mm.add_player("1", now()).unwrap();
        mm.add_player("2", now()).unwrap();
        mm.start_match(true).unwrap();
        mm.record_winner(Team::Blue, now()).unwrap();
        assert!(mm.rankstats().unwrap().is_empty());
    }

    #[test]
    fn correction_moves_stats_to_new_winner() {
        let (_dir, mut mm) = open();
        let start = fill(&mut mm);
        mm.record_winner(Team::Red, now()).unwrap();
        let fix = mm.correct_game(1, Team::Blue, now()).unwrap();
        assert_eq!(fix.old_winner, Team::Red);
        assert!(fix.finished.is_none());

        let stats = mm.rankstats().unwrap();
        let red = stats.get(&start.split.red[0]).unwrap();
        let blue = stats.get(&start.split.blue[0]).unwrap();
        assert_eq!((red.wins, red.losses, red.xp), (0, 1, 10));
        assert_eq!((blue.wins, blue.losses, blue.xp), (1, 0, 50));

        let history: MatchHistory = store::load_or_default(&mm.data_dir().history(HistoryKind::Ranked)).unwrap();
        assert_eq!(history.games[0].winner, Team::Blue);
    }

    #[test]
    fn fourth_win_finishes_series() {
        let (_dir, mut mm) = open();
        let start = fill(&mut mm);
        for _ in 0..3 {
            assert!(mm.record_winner(Team::Blue, now()).unwrap().finished.is_none());
        }
        let last = mm.record_winner(Team::Blue, now()).unwrap();
        let end = last.finished.unwrap();
        assert_eq!(end.winner, Team::Blue);
        assert_eq!(end.score, FinalScore { red: 0, blue: 4 });
        assert!(mm.series().is_none());

        let stats = mm.rankstats().unwrap();
        let winner = stats.get(&start.split.blue[0]).unwrap();
        assert_eq!((winner.series_wins, winner.total_series, winner.wins), (1, 1, 4));

        let history: MatchHistory = store::load_or_default(&mm.data_dir().history(HistoryKind::Ranked)).unwrap();
        assert_eq!(history.total(HistoryKind::Ranked), 1);
        assert_eq!(history.games.len(), 4);
    }

    #[test]
    fn cancel_keeps_logged_games_and_closes_the_match() {
        let (_dir, mut mm) = open();
        fill(&mut mm);
        mm.record_winner(Team::Red, now()).unwrap();
        let cancelled = mm.cancel(now()).unwrap();
        assert_eq!(cancelled.games_played, 1);
        assert!(cancelled.logged);
        assert!(mm.series().is_none());

        let history: MatchHistory = store::load_or_default(&mm.data_dir().history(HistoryKind::Ranked)).unwrap();
        assert_eq!(history.games.len(), 1);
        assert_eq!(history.total(HistoryKind::Ranked), 1);
        let entry = &history.matches[0];
        assert_eq!(entry.winner, SeriesWinner::Cancelled);
        assert_eq!(entry.final_score, FinalScore { red: 1, blue: 0 });
        assert_eq!(entry.total_games_played, 1);

        // Cancelling adds no series counters.
        for id in ["1", "8"] {
            assert_eq!(mm.player_stats(id).unwrap().total_series, 0);
        }
        assert!(matches!(
            mm.cancel(now()),
            Err(MatchmakingError::Match(MatchError::NoActiveSeries))
        ));
    }

    #[test]
    fn cancel_before_any_game_leaves_no_entry() {
        let (_dir, mut mm) = open();
        fill(&mut mm);
        let cancelled = mm.cancel(now()).unwrap();
        assert!(!cancelled.logged);
        assert!(!mm.data_dir().history(HistoryKind::Ranked).exists());
        assert_eq!(fill(&mut mm).match_number, 1);
    }

    #[test]
    fn series_after_a_cancel_gets_its_own_match_number() {
        let (_dir, mut mm) = open();
        let first = fill(&mut mm);
        mm.record_winner(Team::Red, now()).unwrap();
        mm.cancel(now()).unwrap();

        let second = fill(&mut mm);
        assert_eq!((first.match_number, second.match_number), (1, 2));
        assert_eq!(second.series_label, "Series 2");
        mm.record_winner(Team::Red, now()).unwrap();
        mm.correct_game(1, Team::Blue, now()).unwrap();

        let history: MatchHistory = store::load_or_default(&mm.data_dir().history(HistoryKind::Ranked)).unwrap();
        let winners: Vec<_> = history.games.iter().map(|g| (g.match_id, g.game_number, g.winner)).collect();
        assert_eq!(winners, vec![(1, 1, Team::Red), (2, 1, Team::Blue)]);
    }

    #[test]
    fn correction_deciding_early_discards_later_games() {
        let (_dir, mut mm) = open();
        let start = fill(&mut mm);
        for t in [Team::Red, Team::Red, Team::Red, Team::Blue, Team::Blue] {
            mm.record_winner(t, now()).unwrap();
        }
        let fix = mm.correct_game(4, Team::Red, now()).unwrap();
        assert_eq!(fix.dropped_games, 1);
        let end = fix.finished.expect("series decided by the correction");
        assert_eq!(end.winner, Team::Red);
        assert_eq!(end.score, FinalScore { red: 4, blue: 0 });
        assert_eq!(end.games_played, 4);

        let history: MatchHistory = store::load_or_default(&mm.data_dir().history(HistoryKind::Ranked)).unwrap();
        assert_eq!(history.games.len(), 4);
        assert!(history.games.iter().all(|g| g.winner == Team::Red));
        let entry = &history.matches[0];
        assert_eq!(entry.total_games_played, 4);
        assert_eq!(entry.games.len(), 4);

        let stats = mm.rankstats().unwrap();
        let red = stats.get(&start.split.red[0]).unwrap();
        let blue = stats.get(&start.split.blue[0]).unwrap();
        assert_eq!((red.wins, red.losses, red.total_games, red.xp), (4, 0, 4, 200));
        assert_eq!((blue.wins, blue.losses, blue.total_games, blue.xp), (0, 4, 4, 40));
        assert_eq!((red.series_wins, blue.series_losses), (1, 1));
    }

    #[test]
    fn remove_player_prefers_queue() {
        let (_dir, mut mm) = open();
        mm.add_player("1", now()).unwrap();
        assert_eq!(mm.remove_player("1"), Ok(Removal::FromQueue));
        assert_eq!(mm.remove_player("1"), Err(MatchError::NoActiveSeries));
    }

    #[test]
    fn mmr_range_enforced() {
        let (_dir, mut mm) = open();
        assert!(mm.set_mmr("1", 10_001).is_err());
        mm.set_mmr("1", 2200).unwrap();
        assert_eq!(mm.player_stats("1").unwrap().mmr, 2200);
    }

    #[test]
    fn game_stats_validated_and_joined_into_series() {
        let (_dir, mut mm) = open();
        assert!(mm.add_game_stats(1, 1, "Lockout", "MLG CTF5", now()).is_err());
        mm.add_game_stats(1, 1, "Lockout", "MLG Oddball", now()).unwrap();
        fill(&mut mm);
        for _ in 0..4 {
            mm.record_winner(Team::Red, now()).unwrap();
        }
        let history: MatchHistory = store::load_or_default(&mm.data_dir().history(HistoryKind::Ranked)).unwrap();
        let game = &history.matches[0].games[0];
        assert_eq!(game.map.as_deref(), Some("Lockout"));
        assert_eq!(game.gametype.as_deref(), Some("MLG Oddball"));
        assert_eq!(history.matches[0].games[1].map, None);
    }
}
