//! Best-of-seven series between two fixed teams.
//!
//! A series is `InProgress` until one side first reaches [`WINS_NEEDED`]
//! game wins, then `Ended`. Seven games at most; a tie cannot happen.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::MatchError;
use crate::store::history::{SwapRecord, TeamRosters};
use crate::store::PlayerId;

pub const WINS_NEEDED: u32 = 4;
pub const MAX_GAMES: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Team {
    Red,
    Blue,
}

impl Team {
    pub fn other(self) -> Self {
        match self {
            Team::Red => Team::Blue,
            Team::Blue => Team::Red,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Team::Red => "RED",
            Team::Blue => "BLUE",
        }
    }

    /// Case-insensitive `red` / `blue`.
    pub fn parse(s: &str) -> Result<Self, MatchError> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RED" => Ok(Team::Red),
            "BLUE" => Ok(Team::Blue),
            _ => Err(MatchError::InvalidTeam),
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesStatus {
    InProgress,
    Ended(Team),
}

/// Result of casting a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Vote counted, no majority yet.
    Pending { red: usize, blue: usize, needed: usize },
    /// A majority picked a winner; the caller should record the game.
    Decided(Team),
}

/// In-memory state of one series.
#[derive(Debug, Clone)]
pub struct Series {
    pub match_number: u64,
    pub series_label: String,
    pub red: Vec<PlayerId>,
    pub blue: Vec<PlayerId>,
    /// Winner of each decided game, in order.
    pub games: Vec<Team>,
    /// Rosters as they stood when each game in `games` was decided.
    pub rosters: Vec<TeamRosters>,
    /// 1-based number of the game being played.
    pub current_game: u32,
    pub votes: HashMap<PlayerId, Team>,
    pub red_vc_id: Option<String>,
    pub blue_vc_id: Option<String>,
    pub test_mode: bool,
    pub swap_history: Vec<SwapRecord>,
}

impl Series {
    pub fn new(
        match_number: u64,
        series_label: impl Into<String>,
        red: Vec<PlayerId>,
        blue: Vec<PlayerId>,
        test_mode: bool,
    ) -> Self {
        Self {
            match_number,
            series_label: series_label.into(),
            red,
            blue,
            games: Vec::new(),
            rosters: Vec::new(),
            current_game: 1,
            votes: HashMap::new(),
            red_vc_id: None,
            blue_vc_id: None,
            test_mode,
            swap_history: Vec::new(),
        }
    }

    pub fn wins(&self, team: Team) -> u32 {
        self.games.iter().filter(|&&t| t == team).count() as u32
    }

    pub fn status(&self) -> SeriesStatus {
        status_of(&self.games)
    }

    pub fn is_over(&self) -> bool {
        matches!(self.status(), SeriesStatus::Ended(_))
    }

    pub fn team_of(&self, player: &str) -> Option<Team> {
        if self.red.iter().any(|p| p == player) {
            Some(Team::Red)
        } else if self.blue.iter().any(|p| p == player) {
            Some(Team::Blue)
        } else {
            None
        }
    }

    pub fn roster(&self, team: Team) -> &[PlayerId] {
        match team {
            Team::Red => &self.red,
            Team::Blue => &self.blue,
        }
    }

    /// Both rosters, red first.
    pub fn players(&self) -> Vec<PlayerId> {
        self.red.iter().chain(self.blue.iter()).cloned().collect()
    }

    /// Votes one side must hold to decide a game: a strict majority of the
    /// players in the series.
    pub fn votes_needed(&self) -> usize {
        (self.red.len() + self.blue.len()) / 2 + 1
    }

    /// Record `player`'s pick for the current game. A player may change
    /// their vote; only series players vote.
    pub fn vote(&mut self, player: &str, team: Team) -> Result<VoteOutcome, MatchError> {
        if self.is_over() {
            return Err(MatchError::SeriesOver);
        }
        if self.team_of(player).is_none() {
            return Err(MatchError::NotInSeries);
        }
        self.votes.insert(player.to_string(), team);

        let red = self.votes.values().filter(|&&t| t == Team::Red).count();
        let blue = self.votes.len() - red;
        let needed = self.votes_needed();
        if red >= needed {
            Ok(VoteOutcome::Decided(Team::Red))
        } else if blue >= needed {
            Ok(VoteOutcome::Decided(Team::Blue))
        } else {
            Ok(VoteOutcome::Pending { red, blue, needed })
        }
    }

    /// Append a game result and advance to the next game.
    pub fn record_game(&mut self, winner: Team) -> Result<SeriesStatus, MatchError> {
        if self.is_over() {
            return Err(MatchError::SeriesOver);
        }
        self.games.push(winner);
        self.rosters.push(TeamRosters {
            red: self.red.clone(),
            blue: self.blue.clone(),
        });
        self.votes.clear();
        self.current_game += 1;
        Ok(self.status())
    }

    /// Replace the winner of game `game_number` (1-based). Returns the
    /// previous winner.
    pub fn correct_game(&mut self, game_number: usize, winner: Team) -> Result<Team, MatchError> {
        if game_number == 0 || game_number > self.games.len() {
            return Err(MatchError::InvalidGameNumber(self.games.len()));
        }
        let old = std::mem::replace(&mut self.games[game_number - 1], winner);
        Ok(old)
    }

    /// Drop games recorded after the one that decided the series, which a
    /// correction can leave behind. Returns each dropped winner with the
    /// rosters it was played with, in game order.
    pub fn drop_games_after_decider(&mut self) -> Vec<(Team, TeamRosters)> {
        let keep = deciding_length(&self.games);
        if keep == self.games.len() {
            return Vec::new();
        }
        let rosters = self.rosters.split_off(keep.min(self.rosters.len()));
        let games = self.games.split_off(keep);
        self.current_game = keep as u32 + 1;
        self.votes.clear();
        games.into_iter().zip(rosters).collect()
    }

    /// Exchange a red player with a blue player, keeping their slots.
    pub fn swap(
        &mut self,
        red_player: &str,
        blue_player: &str,
        timestamp: String,
    ) -> Result<(), MatchError> {
        let ri = self
            .red
            .iter()
            .position(|p| p == red_player)
            .ok_or_else(|| MatchError::WrongTeam(format!("<@{}>", red_player), "Red"))?;
        let bi = self
            .blue
            .iter()
            .position(|p| p == blue_player)
            .ok_or_else(|| MatchError::WrongTeam(format!("<@{}>", blue_player), "Blue"))?;
        std::mem::swap(&mut self.red[ri], &mut self.blue[bi]);
        self.votes.clear();
        self.swap_history.push(SwapRecord {
            game: self.current_game,
            red_to_blue: red_player.to_string(),
            blue_to_red: blue_player.to_string(),
            timestamp,
        });
        Ok(())
    }

    /// Drop a player from whichever team holds them.
    pub fn remove_player(&mut self, player: &str) -> Result<Team, MatchError> {
        let team = self.team_of(player).ok_or(MatchError::NotInSeries)?;
        match team {
            Team::Red => self.red.retain(|p| p != player),
            Team::Blue => self.blue.retain(|p| p != player),
        }
        self.votes.remove(player);
        Ok(team)
    }
}

/// Status of a series whose games were won in `games` order. Ends at the
/// first game where either side reaches [`WINS_NEEDED`].
pub fn status_of(games: &[Team]) -> SeriesStatus {
    let (mut red, mut blue) = (0, 0);
    for &g in games {
        match g {
            Team::Red => red += 1,
            Team::Blue => blue += 1,
        }
        if red >= WINS_NEEDED {
            return SeriesStatus::Ended(Team::Red);
        }
        if blue >= WINS_NEEDED {
            return SeriesStatus::Ended(Team::Blue);
        }
    }
    SeriesStatus::InProgress
}

/// Games up to and including the one where a side first reached
/// [`WINS_NEEDED`]; all of them when nobody has.
pub fn deciding_length(games: &[Team]) -> usize {
    let (mut red, mut blue) = (0, 0);
    for (i, &g) in games.iter().enumerate() {
        match g {
            Team::Red => red += 1,
            Team::Blue => blue += 1,
        }
        if red >= WINS_NEEDED || blue >= WINS_NEEDED {
            return i + 1;
        }
    }
    games.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_test::{assert_tokens, Token};
    use std::collections::HashSet;

    fn ids(prefix: &str) -> Vec<PlayerId> {
        (1..=4).map(|i| format!("{}{}", prefix, i)).collect()
    }

    fn series() -> Series {
        Series::new(7, "Series 7", ids("r"), ids("b"), false)
    }

    fn player_set(s: &Series) -> HashSet<PlayerId> {
        s.players().into_iter().collect()
    }

    #[test]
    fn team_serializes_uppercase() {
        assert_tokens(&Team::Red, &[Token::UnitVariant { name: "Team", variant: "RED" }]);
        assert_tokens(&Team::Blue, &[Token::UnitVariant { name: "Team", variant: "BLUE" }]);
    }

    #[test]
    fn team_parse_is_case_insensitive() {
        assert_eq!(Team::parse("red"), Ok(Team::Red));
        assert_eq!(Team::parse(" Blue "), Ok(Team::Blue));
        assert_eq!(Team::parse("green"), Err(MatchError::InvalidTeam));
    }

    #[test]
    fn ends_when_first_side_reaches_four() {
        let mut s = series();
        for t in [Team::Red, Team::Blue, Team::Red, Team::Blue, Team::Red, Team::Blue] {
            assert_eq!(s.record_game(t).unwrap(), SeriesStatus::InProgress);
        }
        assert_eq!(s.record_game(Team::Blue).unwrap(), SeriesStatus::Ended(Team::Blue));
        assert_eq!(s.games.len(), 7);
        assert_eq!(s.record_game(Team::Red), Err(MatchError::SeriesOver));
    }

    #[test]
    fn sweep_ends_after_four_games() {
        let mut s = series();
        for _ in 0..3 {
            s.record_game(Team::Red).unwrap();
        }
        assert!(!s.is_over());
        assert_eq!(s.record_game(Team::Red).unwrap(), SeriesStatus::Ended(Team::Red));
        assert_eq!(s.current_game, 5);
        assert_eq!(s.rosters.len(), 4);
    }

    #[test]
    fn status_ends_at_first_fourth_win_only() {
        use Team::*;
        assert_eq!(status_of(&[Red, Red, Red]), SeriesStatus::InProgress);
        assert_eq!(status_of(&[Red, Blue, Red, Red, Red]), SeriesStatus::Ended(Red));
        assert_eq!(status_of(&[]), SeriesStatus::InProgress);
    }

    #[test]
    fn majority_vote_decides() {
        let mut s = series();
        assert_eq!(s.votes_needed(), 5);
        for p in ["r1", "r2", "r3", "r4"] {
            assert!(matches!(s.vote(p, Team::Red).unwrap(), VoteOutcome::Pending { .. }));
        }
        assert_eq!(s.vote("b1", Team::Red).unwrap(), VoteOutcome::Decided(Team::Red));
    }

    #[test]
    fn changing_vote_replaces_previous() {
        let mut s = series();
        s.vote("r1", Team::Red).unwrap();
        let outcome = s.vote("r1", Team::Blue).unwrap();
        assert_eq!(outcome, VoteOutcome::Pending { red: 0, blue: 1, needed: 5 });
    }

    #[test]
    fn outsiders_cannot_vote() {
        let mut s = series();
        assert_eq!(s.vote("spectator", Team::Red), Err(MatchError::NotInSeries));
    }

    #[test]
    fn recording_clears_votes() {
        let mut s = series();
        s.vote("r1", Team::Red).unwrap();
        s.record_game(Team::Red).unwrap();
        assert!(s.votes.is_empty());
    }

    #[test]
    fn swap_preserves_player_set() {
        let mut s = series();
        let before = player_set(&s);
        s.swap("r2", "b3", "t".into()).unwrap();
        assert_eq!(player_set(&s), before);
        assert_eq!(s.red[1], "b3");
        assert_eq!(s.blue[2], "r2");
        assert_eq!(s.swap_history.len(), 1);
        assert_eq!(s.swap_history[0].game, 1);
    }

    #[test]
    fn swap_requires_correct_sides() {
        let mut s = series();
        assert!(matches!(s.swap("b1", "b2", "t".into()), Err(MatchError::WrongTeam(_, "Red"))));
        assert!(matches!(s.swap("r1", "r2", "t".into()), Err(MatchError::WrongTeam(_, "Blue"))));
        assert!(s.swap_history.is_empty());
    }

    #[test]
    fn correction_keeps_players_and_can_end_series() {
        let mut s = series();
        for t in [Team::Red, Team::Red, Team::Red, Team::Blue] {
            s.record_game(t).unwrap();
        }
        let before = player_set(&s);
        assert_eq!(s.correct_game(4, Team::Red), Ok(Team::Blue));
        assert_eq!(player_set(&s), before);
        assert_eq!(s.status(), SeriesStatus::Ended(Team::Red));
    }

    #[test]
    fn correction_range_checked() {
        let mut s = series();
        s.record_game(Team::Red).unwrap();
        assert_eq!(s.correct_game(0, Team::Blue), Err(MatchError::InvalidGameNumber(1)));
        assert_eq!(s.correct_game(2, Team::Blue), Err(MatchError::InvalidGameNumber(1)));
    }

    #[test]
    fn remove_player_shrinks_team() {
        let mut s = series();
        assert_eq!(s.remove_player("b4"), Ok(Team::Blue));
        assert_eq!(s.blue.len(), 3);
        assert_eq!(s.remove_player("b4"), Err(MatchError::NotInSeries));
    }

    #[test]
    fn correction_that_decides_early_drops_later_games() {
        use Team::*;
        let mut s = series();
        for t in [Red, Red, Red, Blue, Blue] {
            s.record_game(t).unwrap();
        }
        s.swap("r1", "b1", "t".into()).unwrap();
        s.correct_game(4, Red).unwrap();
        assert_eq!(deciding_length(&s.games), 4);

        let dropped = s.drop_games_after_decider();
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].0, Blue);
        assert!(dropped[0].1.red.contains(&"r1".to_string()));
        assert_eq!(s.games, vec![Red, Red, Red, Red]);
        assert_eq!(s.rosters.len(), 4);
        assert_eq!(s.current_game, 5);
        assert_eq!(s.status(), SeriesStatus::Ended(Red));
        assert!(s.drop_games_after_decider().is_empty());
    }
}
