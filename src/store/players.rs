//! Read-only registry linking in-game profile names to Discord ids
//! (`players.json`).

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::store::PlayerId;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerProfile {
    #[serde(default)]
    pub stats_profile: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerRegistry {
    pub players: BTreeMap<PlayerId, PlayerProfile>,
}

impl PlayerRegistry {
    /// Lower-cased profile name → user id. `stats_profile` and
    /// `display_name` both map; a later user wins on collision.
    pub fn profile_lookup(&self) -> HashMap<String, PlayerId> {
        let mut lookup = HashMap::new();
        for (id, profile) in &self.players {
            if !profile.stats_profile.is_empty() {
                lookup.insert(profile.stats_profile.to_lowercase(), id.clone());
            }
            if !profile.display_name.is_empty() {
                lookup.insert(profile.display_name.to_lowercase(), id.clone());
            }
        }
        lookup
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_is_case_insensitive_on_both_names() {
        let registry: PlayerRegistry = serde_json::from_value(json!({
            "100": { "stats_profile": "MasterChief", "display_name": "John", "mac_addresses": [] },
            "200": { "display_name": "Arbiter" }
        }))
        .unwrap();
        let lookup = registry.profile_lookup();
        assert_eq!(lookup.get("masterchief").map(String::as_str), Some("100"));
        assert_eq!(lookup.get("john").map(String::as_str), Some("100"));
        assert_eq!(lookup.get("arbiter").map(String::as_str), Some("200"));
        assert_eq!(lookup.len(), 3);
    }
}
