//! XP rewards and the 50-level rank ladder (`xp_config.json`).
//!
//! A level is the highest threshold bucket whose minimum the player's XP has
//! reached. Buckets are contiguous and ascending; level 50's maximum is
//! effectively unbounded.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{StoreError, StoreResult};
use crate::store;

pub const MAX_LEVEL: u8 = 50;

/// Default XP thresholds, level 1 first.
const DEFAULT_THRESHOLDS: [(i64, i64); MAX_LEVEL as usize] = [
    (0, 88),
    (89, 188),
    (189, 288),
    (289, 388),
    (389, 488),
    (489, 588),
    (589, 688),
    (689, 788),
    (789, 888),
    (889, 988),
    (989, 1088),
    (1089, 1188),
    (1189, 1388),
    (1389, 1588),
    (1589, 1788),
    (1789, 1988),
    (1989, 2238),
    (2239, 2488),
    (2489, 2738),
    (2739, 2988),
    (2989, 3238),
    (3239, 3488),
    (3489, 3738),
    (3739, 3988),
    (3989, 4238),
    (4239, 4488),
    (4489, 4738),
    (4739, 4988),
    (4989, 5238),
    (5239, 5488),
    (5489, 5738),
    (5739, 5988),
    (5989, 6238),
    (6239, 6488),
    (6489, 6738),
    (6739, 6988),
    (6989, 7238),
    (7239, 7488),
    (7489, 7738),
    (7739, 7988),
    (7989, 8238),
    (8239, 8488),
    (8489, 8738),
    (8739, 8988),
    (8989, 9238),
    (9239, 9488),
    (9489, 9738),
    (9739, 9988),
    (9989, 10238),
    (10239, 1_000_000_000),
];

/// Base URL for the rank insignia images used in embeds.
pub const RANK_ICON_BASE: &str = "https://r2-cdn.insignia.live/h2-rank";

pub fn rank_icon_url(level: u8) -> String {
    format!("{}/{}.png", RANK_ICON_BASE, level)
}

// ---------------------------------------------------------------------------
// RankTable
// ---------------------------------------------------------------------------

/// Validated `[min, max]` ranges for levels 1..=50.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankTable {
    ranges: Vec<(i64, i64)>,
}

impl Default for RankTable {
    fn default() -> Self {
        Self {
            ranges: DEFAULT_THRESHOLDS.to_vec(),
        }
    }
}

impl RankTable {
    /// Build a table from ranges ordered by level, checking that there are
    /// exactly 50 of them and that each starts one past the previous max.
    pub fn new(ranges: Vec<(i64, i64)>) -> StoreResult<Self> {
        if ranges.len() != MAX_LEVEL as usize {
            return Err(StoreError::Config(format!(
                "expected {} rank thresholds, found {}",
                MAX_LEVEL,
                ranges.len()
            )));
        }
        for (i, pair) in ranges.windows(2).enumerate() {
            let (min, max) = pair[0];
            if min > max {
                return Err(StoreError::Config(format!(
                    "level {} has min {} above max {}",
                    i + 1,
                    min,
                    max
                )));
            }
            if pair[1].0 != max + 1 {
                return Err(StoreError::Config(format!(
                    "level {} starts at {} but level {} ends at {}",
                    i + 2,
                    pair[1].0,
                    i + 1,
                    max
                )));
            }
        }
        Ok(Self { ranges })
    }

    /// `[min, max]` for `level` (1-based).
    pub fn range(&self, level: u8) -> (i64, i64) {
        let idx = level.clamp(1, MAX_LEVEL) as usize - 1;
        self.ranges[idx]
    }

    /// Highest level whose minimum is at or below `xp`; 1 if none.
    pub fn rank_for(&self, xp: i64) -> u8 {
        self.ranges
            .iter()
            .rposition(|&(min, _)| xp >= min)
            .map_or(1, |idx| idx as u8 + 1)
    }

    /// `(level, xp earned inside the level, xp still needed for the next)`.
    pub fn progress(&self, xp: i64) -> (u8, i64, i64) {
        let level = self.rank_for(xp);
        if level == MAX_LEVEL {
            return (level, xp, 0);
        }
        let (current_min, _) = self.range(level);
        let (next_min, _) = self.range(level + 1);
        (level, xp - current_min, next_min - xp)
    }
}

// ---------------------------------------------------------------------------
// XpConfig
// ---------------------------------------------------------------------------

/// The `xp_config.json` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XpConfig {
    pub game_win: i64,
    pub game_loss: i64,
    pub rank_thresholds: BTreeMap<String, [i64; 2]>,
    /// Per-level multipliers on `game_win` above level 40.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub win_factors: BTreeMap<String, f64>,
    /// Per-level multipliers on `game_loss` below level 30.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub loss_factors: BTreeMap<String, f64>,
}

impl Default for XpConfig {
    fn default() -> Self {
        let rank_thresholds = DEFAULT_THRESHOLDS
            .iter()
            .enumerate()
            .map(|(i, &(min, max))| ((i + 1).to_string(), [min, max]))
            .collect();
        Self {
            game_win: 50,
            game_loss: 10,
            rank_thresholds,
            win_factors: BTreeMap::new(),
            loss_factors: BTreeMap::new(),
        }
    }
}

impl XpConfig {
    /// Load the config, writing the defaults first if the file is missing.
    pub fn load_or_create(path: &Path) -> StoreResult<Self> {
        if !path.exists() {
            let config = Self::default();
            store::save(path, &config)?;
            info!(path = %path.display(), "wrote default xp config");
            return Ok(config);
        }
        store::load_or_default(path)
    }

    /// Validated rank table from `rank_thresholds`.
    pub fn table(&self) -> StoreResult<RankTable> {
        let mut ranges = Vec::with_capacity(MAX_LEVEL as usize);
        for level in 1..=MAX_LEVEL {
            let [min, max] = self
                .rank_thresholds
                .get(&level.to_string())
                .copied()
                .ok_or_else(|| StoreError::Config(format!("missing threshold for level {}", level)))?;
            ranges.push((min, max));
        }
        RankTable::new(ranges)
    }

    /// High levels gain less XP per win.
    pub fn win_factor(&self, level: u8) -> f64 {
        if level <= 40 {
            return 1.0;
        }
        self.win_factors
            .get(&level.to_string())
            .copied()
            .unwrap_or(0.5)
    }

    /// Low levels lose less XP per loss.
    pub fn loss_factor(&self, level: u8) -> f64 {
        if level >= 30 {
            return 1.0;
        }
        self.loss_factors
            .get(&level.to_string())
            .copied()
            .unwrap_or(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_config_builds_default_table() {
        let table = XpConfig::default().table().unwrap();
        assert_eq!(table, RankTable::default());
    }

    #[test]
    fn rank_boundaries() {
        let t = RankTable::default();
        assert_eq!(t.rank_for(0), 1);
        assert_eq!(t.rank_for(88), 1);
        assert_eq!(t.rank_for(89), 2);
        assert_eq!(t.rank_for(1389), 14);
        assert_eq!(t.rank_for(10_238), 49);
        assert_eq!(t.rank_for(10_239), 50);
        assert_eq!(t.rank_for(i64::MAX), 50);
    }

    #[test]
    fn negative_xp_is_level_one() {
        assert_eq!(RankTable::default().rank_for(-5), 1);
    }

    #[test]
    fn progress_inside_a_level() {
        let t = RankTable::default();
        assert_eq!(t.progress(100), (2, 11, 89));
        assert_eq!(t.progress(0), (1, 0, 89));
    }

    #[test]
    fn progress_at_max_level() {
        assert_eq!(RankTable::default().progress(20_000), (50, 20_000, 0));
    }

    #[test]
    fn gap_in_thresholds_is_rejected() {
        let mut ranges = DEFAULT_THRESHOLDS.to_vec();
        ranges[10].0 += 5;
        assert!(matches!(RankTable::new(ranges), Err(StoreError::Config(_))));
    }

    #[test]
    fn missing_level_is_rejected() {
        let mut config = XpConfig::default();
        config.rank_thresholds.remove("17");
        assert!(config.table().is_err());
    }

    #[test]
    fn factors_apply_only_past_cutoffs() {
        let mut config = XpConfig::default();
        config.win_factors.insert("45".into(), 0.8);
        config.loss_factors.insert("3".into(), 0.25);
        assert_eq!(config.win_factor(40), 1.0);
        assert_eq!(config.win_factor(45), 0.8);
        assert_eq!(config.win_factor(46), 0.5);
        assert_eq!(config.loss_factor(3), 0.25);
        assert_eq!(config.loss_factor(4), 1.0);
        assert_eq!(config.loss_factor(30), 1.0);
    }

    #[test]
    fn load_or_create_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xp_config.json");
        let created = XpConfig::load_or_create(&path).unwrap();
        assert!(path.exists());
        let reloaded = XpConfig::load_or_create(&path).unwrap();
        assert_eq!(created, reloaded);
        assert_eq!(reloaded.rank_thresholds["50"], [10239, 1_000_000_000]);
    }

    proptest! {
        #[test]
        fn rank_is_monotonic_and_bounded(a in 0i64..2_000_000, b in 0i64..2_000_000) {
            let t = RankTable::default();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let (rlo, rhi) = (t.rank_for(lo), t.rank_for(hi));
            prop_assert!(rlo <= rhi);
            prop_assert!((1..=MAX_LEVEL).contains(&rlo));
            prop_assert!((1..=MAX_LEVEL).contains(&rhi));
        }
    }
}
