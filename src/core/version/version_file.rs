// ─── Version File ───
// Typed view of a version manifest JSON and OS rule evaluation for libraries.
// Unknown fields are ignored; only what the launcher consumes is modelled.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::maven::MavenArtifact;

/// One installable game version, as found in `versions/<dir>/<file>.json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionManifest {
    #[serde(default)]
    pub id: Option<String>,
    pub main_class: String,
    #[serde(default)]
    pub inherits_from: Option<String>,
    #[serde(default)]
    pub libraries: Vec<LibraryEntry>,
    #[serde(default)]
    pub downloads: Option<VersionDownloads>,
    #[serde(default)]
    pub asset_index: Option<AssetIndexInfo>,
    /// Legacy and loader manifests only carry the index id here.
    #[serde(default)]
    pub assets: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VersionDownloads {
    #[serde(default)]
    pub client: Option<DownloadArtifact>,
}

/// Direct download descriptor for the client archive.
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadArtifact {
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetIndexInfo {
    pub id: String,
}

// ─── Library Entry with Rules ───

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryEntry {
    pub name: String,
    /// Repository base for loader-style entries (`"https://maven.fabricmc.net/"`).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub downloads: Option<LibraryDownloads>,
    #[serde(default)]
    pub rules: Option<Vec<LibraryRule>>,
    /// Per-OS classifier template, e.g. `{"windows": "natives-windows-${arch}"}`.
    #[serde(default)]
    pub natives: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LibraryDownloads {
    #[serde(default)]
    pub artifact: Option<LibDownloadArtifact>,
    #[serde(default)]
    pub classifiers: BTreeMap<String, LibDownloadArtifact>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibDownloadArtifact {
    pub path: String,
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
}

// ─── OS Rule Evaluation ───

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryRule {
    pub action: RuleAction,
    #[serde(default)]
    pub os: Option<OsRule>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsRule {
    #[serde(default)]
    pub name: Option<String>,
}

/// Where a library lives locally and where to fetch it from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryLocation {
    pub path: PathBuf,
    pub url: String,
    pub sha1: Option<String>,
}

impl LibraryEntry {
    pub fn artifact(&self) -> LauncherResult<MavenArtifact> {
        MavenArtifact::parse(&self.name)
    }

    /// Rule evaluation, top to bottom:
    /// - no rules at all → allowed
    /// - otherwise start disallowed; every rule whose OS matches (or that has
    ///   no OS constraint) sets the state to its action; the last match wins.
    pub fn is_allowed_for(&self, os: &str) -> bool {
        let Some(rules) = &self.rules else {
            return true;
        };

        let mut allowed = false;
        for rule in rules {
            let os_matches = rule
                .os
                .as_ref()
                .and_then(|o| o.name.as_deref())
                .map_or(true, |name| name == os);

            if os_matches {
                allowed = rule.action == RuleAction::Allow;
            }
        }
        allowed
    }

    /// A native bundle either names a `natives-*` classifier in its coordinate
    /// or carries a per-OS `natives` map.
    pub fn is_native_bundle(&self) -> bool {
        self.name.contains(":natives-") || self.natives.is_some()
    }

    /// Classifier of the native archive for `os`, if this entry has one.
    pub fn native_classifier_for(&self, os: &str) -> Option<String> {
        if let Some(template) = self.natives.as_ref().and_then(|n| n.get(os)) {
            return Some(template.replace("${arch}", arch_bits()));
        }
        self.artifact()
            .ok()
            .filter(MavenArtifact::is_native_bundle)
            .and_then(|a| a.classifier)
    }

    /// Local path and download URL of the class archive.
    ///
    /// An explicit `downloads.artifact` wins; otherwise the coordinate is mapped
    /// to the repository layout under the entry's own repository, or
    /// `default_repo` when it declares none.
    pub fn location(&self, libraries_dir: &Path, default_repo: &str) -> LauncherResult<LibraryLocation> {
        if let Some(artifact) = self.downloads.as_ref().and_then(|d| d.artifact.as_ref()) {
            return Ok(LibraryLocation {
                path: libraries_dir.join(&artifact.path),
                url: artifact.url.clone(),
                sha1: artifact.sha1.clone(),
            });
        }

        let coordinate = self.artifact()?;
        let repo = self.url.as_deref().unwrap_or(default_repo);
        Ok(LibraryLocation {
            path: libraries_dir.join(coordinate.local_path()),
            url: coordinate.url(repo),
            sha1: None,
        })
    }

    /// Local path and download URL of the native archive for `os`.
    pub fn native_location(
        &self,
        os: &str,
        libraries_dir: &Path,
        default_repo: &str,
    ) -> LauncherResult<Option<LibraryLocation>> {
        let Some(classifier) = self.native_classifier_for(os) else {
            return Ok(None);
        };

        let declared = self
            .downloads
            .as_ref()
            .and_then(|d| d.classifiers.get(&classifier));
        if let Some(native) = declared {
            return Ok(Some(LibraryLocation {
                path: libraries_dir.join(&native.path),
                url: native.url.clone(),
                sha1: native.sha1.clone(),
            }));
        }

        // Split-native style: the coordinate already names the natives jar.
        let coordinate = self.artifact()?;
        if coordinate.classifier.as_deref() == Some(classifier.as_str()) {
            return self.location(libraries_dir, default_repo).map(Some);
        }

        let native = coordinate.with_classifier(&classifier);
        let repo = self.url.as_deref().unwrap_or(default_repo);
        Ok(Some(LibraryLocation {
            path: libraries_dir.join(native.local_path()),
            url: native.url(repo),
            sha1: None,
        }))
    }
}

impl VersionManifest {
    pub fn parse(raw: &str, path: &Path) -> LauncherResult<Self> {
        serde_json::from_str(raw).map_err(|source| LauncherError::ManifestParseError {
            path: path.to_path_buf(),
            source,
        })
    }

    pub async fn load(path: &Path) -> LauncherResult<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| LauncherError::io(path, e))?;
        Self::parse(&raw, path)
    }

    pub fn client_download(&self) -> Option<&DownloadArtifact> {
        self.downloads.as_ref().and_then(|d| d.client.as_ref())
    }

    pub fn asset_index_id(&self) -> Option<&str> {
        self.asset_index
            .as_ref()
            .map(|a| a.id.as_str())
            .or(self.assets.as_deref())
    }
}

/// Mojang OS name for the current platform.
pub fn current_os_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "osx"
    } else {
        "linux"
    }
}

fn arch_bits() -> &'static str {
    if cfg!(target_pointer_width = "64") {
        "64"
    } else {
        "32"
    }
}
