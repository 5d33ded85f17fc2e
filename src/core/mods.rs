// ─── Mod Sync ───
// Pulls the mod jars attached to a release feed into a version's mods dir and
// remembers which release was installed.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::downloader::{DownloadEntry, Downloader};
use crate::core::error::{LauncherError, LauncherResult};

/// Tag of the last fully synced release, inside the version directory.
pub const INSTALLED_VERSION_FILE: &str = "version.txt";

#[derive(Debug, Deserialize)]
struct Release {
    #[serde(default)]
    tag_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
}

impl Release {
    fn version(&self) -> Option<String> {
        self.tag_name
            .as_deref()
            .or(self.name.as_deref())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn jar_assets(&self) -> impl Iterator<Item = &ReleaseAsset> {
        self.assets.iter().filter(|a| a.name.ends_with(".jar"))
    }
}

#[derive(Debug, Deserialize)]
struct ReleaseAsset {
    name: String,
    browser_download_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModSyncReport {
    pub downloaded: Vec<String>,
    pub failed: Vec<String>,
    /// Release tag that was synced, when the feed names one.
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModUpdateStatus {
    /// Latest release tag.
    pub version: String,
    pub installed: Option<String>,
    /// The release has mod jars and they are not the installed ones.
    pub has_update: bool,
}

pub fn mods_dir(version_dir: &Path) -> PathBuf {
    version_dir.join("mods")
}

/// Tag recorded by the last complete sync into `version_dir`.
pub async fn installed_version(version_dir: &Path) -> Option<String> {
    let raw = tokio::fs::read_to_string(version_dir.join(INSTALLED_VERSION_FILE))
        .await
        .ok()?;
    Some(raw.trim().to_string()).filter(|v| !v.is_empty())
}

async fn fetch_release(downloader: &Downloader, release_url: &str) -> LauncherResult<Release> {
    let release: Release = downloader.fetch_json(release_url).await?;
    if release.version().is_none() && release.assets.is_empty() {
        return Err(LauncherError::Other(format!(
            "release feed {release_url} returned no tag and no assets"
        )));
    }
    Ok(release)
}

/// Compare the latest release with the tag installed in `version_dir`.
/// `None` when no feed is configured.
pub async fn check_mod_updates(
    downloader: &Downloader,
    release_url: Option<&str>,
    version_dir: &Path,
) -> LauncherResult<Option<ModUpdateStatus>> {
    let Some(release_url) = release_url.filter(|u| !u.is_empty()) else {
        debug!("no mods release configured, nothing to check");
        return Ok(None);
    };

    let release = fetch_release(downloader, release_url).await?;
    let Some(version) = release.version() else {
        return Err(LauncherError::Other(format!("release at {release_url} has no tag")));
    };
    let installed = installed_version(version_dir).await;
    let has_update = release.jar_assets().next().is_some() && installed.as_deref() != Some(version.as_str());

    info!(latest = %version, installed = ?installed, has_update, "checked mod updates");
    Ok(Some(ModUpdateStatus {
        version,
        installed,
        has_update,
    }))
}

/// Download every `*.jar` asset of the release at `release_url` into
/// `<version_dir>/mods`, replacing files of the same name. No URL means
/// nothing to do. The release tag is recorded only when every jar arrived.
pub async fn sync_mods(
    downloader: &Downloader,
    release_url: Option<&str>,
    version_dir: &Path,
) -> LauncherResult<ModSyncReport> {
    let Some(release_url) = release_url.filter(|u| !u.is_empty()) else {
        info!("no mods release configured, skipping sync");
        return Ok(ModSyncReport::default());
    };

    let mods_dir = mods_dir(version_dir);
    let release = fetch_release(downloader, release_url).await?;
    let version = release.version();
    let entries: Vec<DownloadEntry> = release
        .jar_assets()
        .filter(|a| {
            let plain = !a.name.contains(['/', '\\']) && a.name != "..";
            if !plain {
                warn!(asset = %a.name, "ignoring asset with a path in its name");
            }
            plain
        })
        .map(|a| DownloadEntry::new(a.browser_download_url.clone(), mods_dir.join(&a.name)))
        .collect();

    let names = |entries: &[DownloadEntry]| -> Vec<String> {
        entries
            .iter()
            .filter_map(|e| e.dest.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect()
    };
    let mut downloaded = names(&entries);

    let failures = downloader.download_batch(entries).await;
    let mut failed = Vec::with_capacity(failures.len());
    for (entry, error) in failures {
        warn!(url = %entry.url, error = %error, "mod download failed");
        if let Some(name) = entry.dest.file_name() {
            failed.push(name.to_string_lossy().into_owned());
        }
    }
    downloaded.retain(|n| !failed.contains(n));
    downloaded.sort();
    failed.sort();

    if let Some(tag) = version.as_deref().filter(|_| failed.is_empty()) {
        tokio::fs::create_dir_all(version_dir)
            .await
            .map_err(|e| LauncherError::io(version_dir, e))?;
        let file = version_dir.join(INSTALLED_VERSION_FILE);
        tokio::fs::write(&file, tag)
            .await
            .map_err(|e| LauncherError::io(&file, e))?;
    }

    info!(downloaded = downloaded.len(), failed = failed.len(), dir = %mods_dir.display(), "mods synced");
    Ok(ModSyncReport {
        downloaded,
        failed,
        version,
    })
}
