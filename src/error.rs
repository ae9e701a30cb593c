//! Error types shared by the stores, the ladder, and the matchmaking layer.
//!
//! Transport errors (`HttpError`, `GatewayError`) live next to their
//! transports in `http` and `gateway`.

use std::path::PathBuf;

use thiserror::Error;

/// Failure reading or writing one of the JSON data files.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying filesystem error.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file exists but does not hold the expected JSON shape.
    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A configuration file parsed but failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// A matchmaking operation the current state does not allow.
///
/// The `Display` text is shown to the Discord user as-is.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MatchError {
    #[error("You're already in the queue!")]
    AlreadyQueued,

    #[error("You're not in the queue!")]
    NotQueued,

    #[error("Queue is full!")]
    QueueFull,

    #[error("A match is already in progress!")]
    SeriesInProgress,

    #[error("No active match!")]
    NoActiveSeries,

    #[error("This series is already over!")]
    SeriesOver,

    #[error("You're not allowed to queue ({0})")]
    NotEligible(String),

    #[error("Need at least {needed} players to start, have {have}")]
    NotEnoughPlayers { needed: usize, have: usize },

    #[error("Only players in this match can vote!")]
    NotInSeries,

    #[error("{0} is not on the {1} team!")]
    WrongTeam(String, &'static str),

    #[error("Invalid game number! Must be between 1 and {0}")]
    InvalidGameNumber(usize),

    #[error("Winner must be RED or BLUE")]
    InvalidTeam,

    #[error("Sorry, {gametype} is not played on {map}")]
    InvalidGametype { map: String, gametype: String },

    #[error("Unknown map: {0}")]
    UnknownMap(String),

    #[error("MMR must be between 0 and 10000!")]
    MmrOutOfRange,

    #[error("Missing option: {0}")]
    MissingOption(String),
}

/// Anything a matchmaking operation can fail with: a rule violation to show
/// the user, or a store failure to log.
#[derive(Error, Debug)]
pub enum MatchmakingError {
    #[error(transparent)]
    Match(#[from] MatchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Convenience alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
