//! JSON-file stores backing the bot and the companion website.
//!
//! Every store is a plain serde type persisted as one pretty-printed JSON
//! document. Writes overwrite the whole file; there is no locking, the bot
//! processes events one at a time.

pub mod gamestats;
pub mod history;
pub mod players;
pub mod queue_config;
pub mod rankstats;

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{StoreError, StoreResult};

pub use gamestats::{GameDetails, GameStats, MAP_GAMETYPES};
pub use history::{GameEntry, HistoryKind, MatchHistory, SeriesEntry};
pub use players::PlayerRegistry;
pub use queue_config::QueueConfig;
pub use rankstats::{PlayerId, PlayerStats, RankStats, SortKey, StatsDelta};

pub const RANKSTATS_FILE: &str = "rankstats.json";
pub const GAMESTATS_FILE: &str = "gamestats.json";
pub const MATCHHISTORY_FILE: &str = "matchhistory.json";
pub const TEST_MATCHHISTORY_FILE: &str = "testmatchhistory.json";
pub const XP_CONFIG_FILE: &str = "xp_config.json";
pub const QUEUE_CONFIG_FILE: &str = "queue_config.json";
pub const PLAYERS_FILE: &str = "players.json";
pub const GAMESHISTORY_FILE: &str = "gameshistory.json";

/// Load `path` as JSON, or return `T::default()` when the file is missing.
pub fn load_or_default<T>(path: &Path) -> StoreResult<T>
where
    T: DeserializeOwned + Default,
{
    match fs::read_to_string(path) {
        Ok(text) => serde_json::from_str(&text).map_err(|source| StoreError::Json {
            path: path.to_path_buf(),
            source,
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "store file missing, using default");
            Ok(T::default())
        }
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Overwrite `path` with the pretty-printed JSON of `value`.
pub fn save<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    let text = serde_json::to_string_pretty(value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, text).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "store file written");
    Ok(())
}

/// Locations of every data file, rooted at one directory.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn rankstats(&self) -> PathBuf {
        self.root.join(RANKSTATS_FILE)
    }

    pub fn gamestats(&self) -> PathBuf {
        self.root.join(GAMESTATS_FILE)
    }

    pub fn history(&self, kind: HistoryKind) -> PathBuf {
        match kind {
            HistoryKind::Ranked => self.root.join(MATCHHISTORY_FILE),
            HistoryKind::Test => self.root.join(TEST_MATCHHISTORY_FILE),
        }
    }

    pub fn xp_config(&self) -> PathBuf {
        self.root.join(XP_CONFIG_FILE)
    }

    pub fn queue_config(&self) -> PathBuf {
        self.root.join(QUEUE_CONFIG_FILE)
    }

    pub fn players(&self) -> PathBuf {
        self.root.join(PLAYERS_FILE)
    }

    pub fn gameshistory(&self) -> PathBuf {
        self.root.join(GAMESHISTORY_FILE)
    }
}
