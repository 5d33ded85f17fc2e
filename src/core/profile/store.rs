use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::model::Profile;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::server::PlayerRecord;

/// Flat JSON store holding every profile in one array.
///
/// Each save rewrites the whole file. Writes go through a temp file and a
/// rename, and are serialized by an internal lock so that play-time accrual
/// racing a user save cannot interleave.
pub struct ProfileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ProfileStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored profiles. Missing or corrupt files read as empty.
    pub async fn load_all(&self) -> LauncherResult<Vec<Profile>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(LauncherError::io(&self.path, e)),
        };

        match serde_json::from_str::<Vec<Profile>>(&raw) {
            Ok(profiles) => Ok(profiles),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "corrupt profile store, starting empty");
                Ok(Vec::new())
            }
        }
    }

    /// Validates every profile, then replaces the stored set.
    pub async fn save_all(&self, profiles: &[Profile]) -> LauncherResult<()> {
        for profile in profiles {
            profile.validate()?;
        }
        let _guard = self.write_lock.lock().await;
        self.write(profiles).await
    }

    pub async fn get(&self, id: &str) -> LauncherResult<Profile> {
        self.load_all()
            .await?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| LauncherError::ProfileNotFound(id.to_string()))
    }

    /// Inserts or replaces the profile with the same id.
    pub async fn upsert(&self, profile: Profile) -> LauncherResult<()> {
        profile.validate()?;
        self.modify(|profiles| {
            match profiles.iter_mut().find(|p| p.id == profile.id) {
                Some(existing) => *existing = profile,
                None => profiles.push(profile),
            }
            true
        })
        .await?;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> LauncherResult<()> {
        let removed = self
            .modify(|profiles| {
                let before = profiles.len();
                profiles.retain(|p| p.id != id);
                profiles.len() != before
            })
            .await?;

        if !removed {
            return Err(LauncherError::ProfileNotFound(id.to_string()));
        }
        info!(profile = id, "profile deleted");
        Ok(())
    }

    pub async fn add_play_time(&self, id: &str, secs: u64) -> LauncherResult<()> {
        let found = self
            .modify(|profiles| match profiles.iter_mut().find(|p| p.id == id) {
                Some(profile) => {
                    profile.play_time = profile.play_time.saturating_add(secs);
                    true
                }
                None => false,
            })
            .await?;

        if !found {
            return Err(LauncherError::ProfileNotFound(id.to_string()));
        }
        debug!(profile = id, secs, "play time recorded");
        Ok(())
    }

    /// Copies server-reported stats onto profiles with the same player name.
    /// Returns how many profiles changed.
    pub async fn apply_server_stats(&self, players: &[PlayerRecord]) -> LauncherResult<usize> {
        let mut changed = 0;
        self.modify(|profiles| {
            for profile in profiles.iter_mut() {
                let Some(record) = players.iter().find(|r| r.name == profile.player_name) else {
                    continue;
                };
                if merge_stats(profile, record) {
                    changed += 1;
                }
            }
            changed > 0
        })
        .await?;
        Ok(changed)
    }

    /// Load, mutate, and write back when `f` reports a change.
    async fn modify<F>(&self, f: F) -> LauncherResult<bool>
    where
        F: FnOnce(&mut Vec<Profile>) -> bool,
    {
        let _guard = self.write_lock.lock().await;
        let mut profiles = self.load_all().await?;
        let changed = f(&mut profiles);
        if changed {
            self.write(&profiles).await?;
        }
        Ok(changed)
    }

    async fn write(&self, profiles: &[Profile]) -> LauncherResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io(parent, e))?;
        }

        let json = serde_json::to_string_pretty(profiles)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| LauncherError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| LauncherError::io(&self.path, e))?;
        Ok(())
    }
}

fn merge_stats(profile: &mut Profile, record: &PlayerRecord) -> bool {
    let before = profile.clone();

    if let Some(head) = record.head_url.as_deref().filter(|h| !h.is_empty()) {
        profile.head_url = Some(head.to_string());
    }
    if !record.uuid.is_empty() {
        profile.uuid = Some(record.uuid.clone());
    }
    profile.achievements = Some(record.achievements);
    if record.server_play_time > 0 {
        profile.server_play_time = Some(record.server_play_time);
    }

    *profile != before
}
