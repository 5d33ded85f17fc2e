// ─── Version Index ───
// The remote list of installable versions (Mojang version_manifest_v2).

use serde::Deserialize;
use tracing::info;

use crate::core::downloader::Downloader;
use crate::core::error::LauncherResult;

pub const VERSION_INDEX_URL: &str =
    "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json";

#[derive(Debug, Deserialize)]
pub struct VersionIndex {
    pub versions: Vec<VersionEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VersionEntry {
    pub id: String,
    #[serde(rename = "type", default)]
    pub version_type: Option<String>,
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
}

impl VersionIndex {
    pub async fn fetch(downloader: &Downloader, url: &str) -> LauncherResult<Self> {
        info!(url, "fetching version index");
        let index: VersionIndex = downloader.fetch_json(url).await?;
        info!(count = index.versions.len(), "loaded version index");
        Ok(index)
    }

    pub fn find_version(&self, id: &str) -> Option<&VersionEntry> {
        self.versions.iter().find(|v| v.id == id)
    }
}
