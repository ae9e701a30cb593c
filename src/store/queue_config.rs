//! Role gates for joining the queue (`queue_config.json`).

use serde::{Deserialize, Serialize};

use crate::error::MatchError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub banned_roles: Vec<String>,
    #[serde(default)]
    pub required_roles: Vec<String>,
}

impl QueueConfig {
    /// Whether a member holding `member_roles` may queue.
    pub fn check(&self, member_roles: &[String]) -> Result<(), MatchError> {
        if let Some(banned) = member_roles.iter().find(|r| self.banned_roles.contains(r)) {
            return Err(MatchError::NotEligible(format!("banned role <@&{}>", banned)));
        }
        if !self.required_roles.is_empty()
            && !member_roles.iter().any(|r| self.required_roles.contains(r))
        {
            return Err(MatchError::NotEligible("missing a required role".into()));
        }
        Ok(())
    }
}

/// Parse a comma separated list of role ids or `<@&id>` mentions.
pub fn parse_role_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(|s| {
            s.trim()
                .trim_start_matches("<@&")
                .trim_end_matches('>')
                .to_string()
        })
        .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
        .collect()
}
