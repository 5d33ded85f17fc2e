use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Placeholder token accepted by servers running in offline mode.
pub const OFFLINE_ACCESS_TOKEN: &str = "0";
pub const LEGACY_USER_TYPE: &str = "legacy";

/// Unverified identity handed to the game client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OfflineIdentity {
    pub username: String,
    pub uuid: String,
    pub access_token: String,
    pub user_type: String,
}

impl OfflineIdentity {
    /// Uses `uuid` when present and non-blank, otherwise derives one from the name.
    pub fn new(username: &str, uuid: Option<&str>) -> Self {
        let username = username.trim().to_string();
        let uuid = uuid
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| offline_uuid(&username));

        Self {
            username,
            uuid,
            access_token: OFFLINE_ACCESS_TOKEN.into(),
            user_type: LEGACY_USER_TYPE.into(),
        }
    }
}

/// MD5 of the player name, rendered as a hyphenated UUID.
///
/// Deterministic, so the same name keeps its world data across launches.
pub fn offline_uuid(player_name: &str) -> String {
    let digest: [u8; 16] = Md5::digest(player_name.as_bytes()).into();
    Uuid::from_bytes(digest).hyphenated().to_string()
}
