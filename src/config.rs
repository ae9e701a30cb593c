//! Bot configuration read from the environment (and `.env` via `dotenv`).

use std::path::PathBuf;

use thiserror::Error;

use crate::types::Snowflake;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    pub token: String,
    /// Directory holding the JSON stores.
    pub data_dir: PathBuf,
    /// Members holding any of these roles may run admin commands.
    pub admin_role_ids: Vec<Snowflake>,
    /// Where series announcements go; the interaction's channel if unset.
    pub queue_channel_id: Option<Snowflake>,
    /// Register commands for this guild only (instant) instead of globally.
    pub guild_id: Option<Snowflake>,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Ok(Self {
            token: var("DISCORD_TOKEN").ok_or(ConfigError::Missing("DISCORD_TOKEN"))?,
            data_dir: var("DATA_DIR").map_or_else(|| PathBuf::from("."), PathBuf::from),
            admin_role_ids: var("ADMIN_ROLE_IDS").map(|v| split_list(&v)).unwrap_or_default(),
            queue_channel_id: var("QUEUE_CHANNEL_ID"),
            guild_id: var("GUILD_ID"),
        })
    }

    pub fn is_admin(&self, member_roles: &[Snowflake]) -> bool {
        member_roles.iter().any(|r| self.admin_role_ids.contains(r))
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
