use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::auth::OfflineIdentity;
use crate::core::error::{LauncherError, LauncherResult};

/// Longest in-game name the client accepts.
pub const MAX_PLAYER_NAME_LEN: usize = 16;

/// A player profile as persisted in `profiles.json`.
///
/// Server-reported fields are caches: they are overwritten whenever the
/// online-players query returns a record for the same player name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub player_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// Local play time in seconds.
    #[serde(default)]
    pub play_time: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub achievements: Option<u32>,
    /// Server-reported play time in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_play_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_url: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(name: impl Into<String>, player_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            name: name.into(),
            player_name: player_name.into(),
            uuid: None,
            play_time: 0,
            achievements: None,
            server_play_time: None,
            head_url: None,
            created_at: Utc::now(),
        }
    }

    /// Rejects records the launch path cannot use.
    pub fn validate(&self) -> LauncherResult<()> {
        let player = self.player_name.trim();
        if player.is_empty() {
            return Err(LauncherError::InvalidProfile(format!(
                "profile '{}' has no player name",
                self.id
            )));
        }
        if player.chars().count() > MAX_PLAYER_NAME_LEN {
            return Err(LauncherError::InvalidProfile(format!(
                "player name '{player}' exceeds {MAX_PLAYER_NAME_LEN} characters"
            )));
        }
        if self.name.trim().is_empty() {
            return Err(LauncherError::InvalidProfile(format!(
                "profile '{}' has no display name",
                self.id
            )));
        }
        Ok(())
    }

    pub fn identity(&self) -> OfflineIdentity {
        OfflineIdentity::new(&self.player_name, self.uuid.as_deref())
    }
}
