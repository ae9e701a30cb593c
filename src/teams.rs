//! MMR-balanced red/blue split.
//!
//! Players are ordered by MMR (highest first) and dealt alternately to red
//! and blue. The deal is then improved by trying every single red/blue
//! exchange and keeping the one with the smallest MMR sum difference.

use crate::store::{PlayerId, RankStats};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamSplit {
    pub red: Vec<PlayerId>,
    pub blue: Vec<PlayerId>,
    pub red_avg: i64,
    pub blue_avg: i64,
    /// Absolute difference of the MMR sums.
    pub diff: i64,
}

fn sum(team: &[(PlayerId, i64)]) -> i64 {
    team.iter().map(|(_, mmr)| mmr).sum()
}

fn avg(team: &[(PlayerId, i64)]) -> i64 {
    if team.is_empty() {
        0
    } else {
        sum(team) / team.len() as i64
    }
}

/// Split `players` into two teams using their MMR from `stats`.
pub fn balance(players: &[PlayerId], stats: &RankStats) -> TeamSplit {
    let mut rated: Vec<(PlayerId, i64)> = players
        .iter()
        .map(|id| (id.clone(), stats.mmr_of(id)))
        .collect();
    rated.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut red = Vec::new();
    let mut blue = Vec::new();
    for (i, p) in rated.into_iter().enumerate() {
        if i % 2 == 0 {
            red.push(p);
        } else {
            blue.push(p);
        }
    }

    let mut best = (sum(&red) - sum(&blue)).abs();
    let mut best_swap = None;
    for (ri, (_, rm)) in red.iter().enumerate() {
        for (bi, (_, bm)) in blue.iter().enumerate() {
            let diff = (sum(&red) - rm + bm - (sum(&blue) - bm + rm)).abs();
            if diff < best {
                best = diff;
                best_swap = Some((ri, bi));
            }
        }
    }
    if let Some((ri, bi)) = best_swap {
        std::mem::swap(&mut red[ri], &mut blue[bi]);
    }

    TeamSplit {
        red_avg: avg(&red),
        blue_avg: avg(&blue),
        diff: best,
        red: red.into_iter().map(|(id, _)| id).collect(),
        blue: blue.into_iter().map(|(id, _)| id).collect(),
    }
}
