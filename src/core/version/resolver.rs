// ─── Manifest Resolver ───
// Finds a version manifest on disk by content, walks its inheritance chain and
// downloads a missing base version from the remote index.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::version::index::VersionIndex;
use crate::core::version::version_file::VersionManifest;

/// A manifest together with where it was found.
#[derive(Debug, Clone)]
pub struct ResolvedManifest {
    pub manifest: VersionManifest,
    pub manifest_path: PathBuf,
    /// Version directory holding the manifest (and eventually its client archive).
    pub dir: PathBuf,
}

impl ResolvedManifest {
    /// Directory name, which is what the game is told its version is.
    pub fn dir_name(&self) -> String {
        self.dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn id(&self) -> String {
        self.manifest.id.clone().unwrap_or_else(|| self.dir_name())
    }

    /// Conventional client archive location: `<dir>/<dir name>.jar`.
    pub fn client_archive_path(&self) -> PathBuf {
        self.dir.join(format!("{}.jar", self.dir_name()))
    }
}

/// Leaf-first inheritance chain. Never empty.
#[derive(Debug, Clone)]
pub struct ManifestChain {
    manifests: Vec<ResolvedManifest>,
}

impl ManifestChain {
    pub fn new(leaf: ResolvedManifest) -> Self {
        Self {
            manifests: vec![leaf],
        }
    }

    pub fn push_ancestor(&mut self, ancestor: ResolvedManifest) {
        self.manifests.push(ancestor);
    }

    pub fn leaf(&self) -> &ResolvedManifest {
        &self.manifests[0]
    }

    pub fn ancestors(&self) -> &[ResolvedManifest] {
        &self.manifests[1..]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedManifest> {
        self.manifests.iter()
    }

    pub fn main_class(&self) -> &str {
        &self.leaf().manifest.main_class
    }

    /// Nearest asset index id along the chain.
    pub fn asset_index_id(&self) -> Option<&str> {
        self.manifests
            .iter()
            .find_map(|m| m.manifest.asset_index_id())
    }
}

/// Locates manifests under the launcher's versions tree and a standard
/// installation's versions tree.
#[derive(Clone)]
pub struct ManifestResolver {
    versions_dir: PathBuf,
    fallback_versions_dir: Option<PathBuf>,
    downloader: Downloader,
    index_url: String,
}

impl ManifestResolver {
    pub fn new(
        versions_dir: PathBuf,
        fallback_versions_dir: Option<PathBuf>,
        downloader: Downloader,
        index_url: impl Into<String>,
    ) -> Self {
        Self {
            versions_dir,
            fallback_versions_dir,
            downloader,
            index_url: index_url.into(),
        }
    }

    pub fn versions_dir(&self) -> &Path {
        &self.versions_dir
    }

    pub fn fallback_versions_dir(&self) -> Option<&Path> {
        self.fallback_versions_dir.as_deref()
    }

    /// Resolve `version_id` and every ancestor it inherits from.
    ///
    /// `marker`, when set, must appear in the leaf's main class; it picks the
    /// loader manifest out of a directory that may hold several.
    pub async fn resolve(
        &self,
        version_id: &str,
        marker: Option<&str>,
    ) -> LauncherResult<ManifestChain> {
        let leaf = self.discover(version_id, marker).await?;
        info!(
            version = version_id,
            manifest = %leaf.manifest_path.display(),
            main_class = %leaf.manifest.main_class,
            "resolved version manifest"
        );

        let mut seen = HashSet::from([leaf.id()]);
        let mut next_parent = leaf.manifest.inherits_from.clone();
        let mut chain = ManifestChain::new(leaf);

        while let Some(parent_id) = next_parent {
            if !seen.insert(parent_id.clone()) {
                return Err(LauncherError::Other(format!(
                    "inheritance cycle through version {parent_id}"
                )));
            }
            let parent = self.resolve_parent(&parent_id).await?;
            debug!(parent = %parent_id, dir = %parent.dir.display(), "resolved parent manifest");
            next_parent = parent.manifest.inherits_from.clone();
            chain.push_ancestor(parent);
        }

        Ok(chain)
    }

    /// Scan for the leaf manifest: the version's own directory first, then,
    /// when a marker is given, every other immediate subdirectory of the tree.
    pub async fn discover(
        &self,
        version_id: &str,
        marker: Option<&str>,
    ) -> LauncherResult<ResolvedManifest> {
        let accepts = |m: &VersionManifest| marker.map_or(true, |mk| m.main_class.contains(mk));

        let primary = self.versions_dir.join(version_id);
        if let Some(found) = scan_version_dir(&primary, &accepts).await? {
            return Ok(found);
        }

        if marker.is_some() {
            for dir in subdirectories(&self.versions_dir).await? {
                if dir == primary {
                    continue;
                }
                if let Some(found) = scan_version_dir(&dir, &accepts).await? {
                    return Ok(found);
                }
            }
        }

        Err(LauncherError::ManifestNotFound(version_id.to_string()))
    }

    /// Parent lookup: launcher tree, then the standard installation, then a
    /// fresh download. Anything short of a manifest is `BaseVersionUnavailable`.
    pub async fn resolve_parent(&self, version_id: &str) -> LauncherResult<ResolvedManifest> {
        if let Some(found) = locate_exact(&self.versions_dir, version_id).await? {
            return Ok(found);
        }

        if let Some(fallback) = &self.fallback_versions_dir {
            if let Some(found) = locate_exact(fallback, version_id).await? {
                info!(version = version_id, dir = %found.dir.display(), "using standard installation");
                return Ok(found);
            }
        }

        info!(version = version_id, "base version not on disk, downloading");
        self.install_version(version_id).await.map_err(|e| {
            warn!(version = version_id, error = %e, "base version download failed");
            LauncherError::BaseVersionUnavailable(version_id.to_string())
        })
    }

    /// Download a version's manifest and client archive into the launcher tree.
    pub async fn install_version(&self, version_id: &str) -> LauncherResult<ResolvedManifest> {
        let index = VersionIndex::fetch(&self.downloader, &self.index_url).await?;
        let entry = index
            .find_version(version_id)
            .ok_or_else(|| LauncherError::ManifestNotFound(version_id.to_string()))?;

        let raw = self.downloader.fetch_text(&entry.url).await?;
        let dir = self.versions_dir.join(version_id);
        let manifest_path = dir.join(format!("{version_id}.json"));
        let manifest = VersionManifest::parse(&raw, &manifest_path)?;

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| LauncherError::io(&dir, e))?;
        tokio::fs::write(&manifest_path, &raw)
            .await
            .map_err(|e| LauncherError::io(&manifest_path, e))?;

        let resolved = ResolvedManifest {
            manifest,
            manifest_path,
            dir,
        };

        let client = resolved
            .manifest
            .client_download()
            .ok_or_else(|| LauncherError::ClientArchiveMissing(version_id.to_string()))?;
        let jar = resolved.client_archive_path();
        if let Some(size) = client.size {
            info!(version = version_id, mib = size / (1024 * 1024), "downloading client archive");
        }
        self.downloader
            .download_file(&client.url, &jar, client.sha1.as_deref())
            .await?;

        info!(version = version_id, dir = %resolved.dir.display(), "installed base version");
        Ok(resolved)
    }

    /// Whether `version_id` already has a manifest in the launcher tree.
    pub async fn is_installed(&self, version_id: &str) -> bool {
        matches!(locate_exact(&self.versions_dir, version_id).await, Ok(Some(_)))
    }
}

/// `<root>/<id>/<id>.json`, or any parseable manifest in `<root>/<id>/`.
async fn locate_exact(root: &Path, version_id: &str) -> LauncherResult<Option<ResolvedManifest>> {
    let dir = root.join(version_id);
    let conventional = dir.join(format!("{version_id}.json"));
    if tokio::fs::try_exists(&conventional).await.unwrap_or(false) {
        let manifest = VersionManifest::load(&conventional).await?;
        return Ok(Some(ResolvedManifest {
            manifest,
            manifest_path: conventional,
            dir,
        }));
    }
    scan_version_dir(&dir, &|_: &VersionManifest| true).await
}

/// First manifest in `dir` (sorted by file name) accepted by `accepts`.
/// Unparseable candidates are logged and skipped.
async fn scan_version_dir(
    dir: &Path,
    accepts: &(dyn Fn(&VersionManifest) -> bool + Sync),
) -> LauncherResult<Option<ResolvedManifest>> {
    let mut candidates = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(LauncherError::io(dir, e)),
    };
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| LauncherError::io(dir, e))?
    {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") && path.is_file() {
            candidates.push(path);
        }
    }
    candidates.sort();

    for path in candidates {
        match VersionManifest::load(&path).await {
            Ok(manifest) if accepts(&manifest) => {
                return Ok(Some(ResolvedManifest {
                    manifest,
                    manifest_path: path,
                    dir: dir.to_path_buf(),
                }));
            }
            Ok(_) => debug!(path = %path.display(), "manifest does not match, skipping"),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable manifest"),
        }
    }
    Ok(None)
}

async fn subdirectories(root: &Path) -> LauncherResult<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(dirs),
        Err(e) => return Err(LauncherError::io(root, e)),
    };
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| LauncherError::io(root, e))?
    {
        if entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::{ok, scratch_dir, serve_routes, serve_with};
    use std::time::Duration;

    const FABRIC_JSON: &str = r#"{
        "id": "fabric-loader-0.17.3-1.21.8",
        "inheritsFrom": "1.21.8",
        "mainClass": "net.fabricmc.loader.impl.launch.knot.KnotClient",
        "libraries": [{ "name": "net.fabricmc:fabric-loader:0.17.3" }]
    }"#;

    fn write(path: &Path, body: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    fn resolver(root: &Path, fallback: Option<PathBuf>, index_url: String) -> ManifestResolver {
        let client = crate::core::http::build_http_client(Duration::from_secs(2)).unwrap();
        ManifestResolver::new(
            root.join("versions"),
            fallback,
            Downloader::new(client, Duration::from_secs(2)),
            index_url,
        )
    }

    #[tokio::test]
    async fn discovers_by_marker_despite_file_name() {
        let root = scratch_dir("resolve-marker");
        let dir = root.join("versions").join("fabric-1.21.8");
        write(&dir.join("a-broken.json"), "{ nope");
        write(
            &dir.join("b-vanilla.json"),
            r#"{ "mainClass": "net.minecraft.client.main.Main" }"#,
        );
        write(&dir.join("c-loader.json"), FABRIC_JSON);

        let found = resolver(&root, None, String::new())
            .discover("fabric-1.21.8", Some("fabricmc"))
            .await
            .unwrap();

        assert!(found.manifest_path.ends_with("c-loader.json"));
        assert_eq!(found.dir_name(), "fabric-1.21.8");
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn discovers_in_sibling_directory() {
        let root = scratch_dir("resolve-sibling");
        write(
            &root.join("versions/fabric-loader-0.17.3-1.21.8/fabric-loader-0.17.3-1.21.8.json"),
            FABRIC_JSON,
        );

        let found = resolver(&root, None, String::new())
            .discover("fabric-1.21.8", Some("fabricmc"))
            .await
            .unwrap();

        assert_eq!(found.dir_name(), "fabric-loader-0.17.3-1.21.8");
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn missing_manifest_is_reported() {
        let root = scratch_dir("resolve-missing");
        let err = resolver(&root, None, String::new())
            .discover("fabric-1.21.8", Some("fabricmc"))
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::ManifestNotFound(id) if id == "fabric-1.21.8"));
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn parent_comes_from_standard_installation() {
        let root = scratch_dir("resolve-fallback");
        write(&root.join("versions/fabric-1.21.8/fabric.json"), FABRIC_JSON);
        let standard = root.join("dot-minecraft").join("versions");
        write(
            &standard.join("1.21.8/1.21.8.json"),
            r#"{ "id": "1.21.8", "mainClass": "net.minecraft.client.main.Main",
                 "assetIndex": { "id": "26" } }"#,
        );

        let chain = resolver(&root, Some(standard.clone()), String::new())
            .resolve("fabric-1.21.8", Some("fabricmc"))
            .await
            .unwrap();

        assert_eq!(chain.ancestors().len(), 1);
        assert_eq!(chain.ancestors()[0].dir, standard.join("1.21.8"));
        assert_eq!(chain.asset_index_id(), Some("26"));
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn absent_parent_is_downloaded() {
        let root = scratch_dir("resolve-download");
        write(&root.join("versions/fabric-1.21.8/fabric.json"), FABRIC_JSON);
        let base = serve_with(|base| {
            vec![
                (
                    "/index.json".to_string(),
                    ok(format!(
                        r#"{{ "versions": [{{ "id": "1.21.8", "url": "{base}/1.21.8.json" }}] }}"#
                    )),
                ),
                (
                    "/1.21.8.json".to_string(),
                    ok(format!(
                        r#"{{ "id": "1.21.8", "mainClass": "net.minecraft.client.main.Main",
                             "assetIndex": {{ "id": "26" }},
                             "downloads": {{ "client": {{ "url": "{base}/client.jar", "size": 6 }} }} }}"#
                    )),
                ),
                ("/client.jar".to_string(), ok(b"client")),
            ]
        })
        .await;

        let chain = resolver(&root, None, format!("{base}/index.json"))
            .resolve("fabric-1.21.8", Some("fabricmc"))
            .await
            .unwrap();

        let parent = &chain.ancestors()[0];
        assert_eq!(parent.dir, root.join("versions").join("1.21.8"));
        assert!(parent.manifest_path.ends_with("1.21.8/1.21.8.json"));
        assert_eq!(std::fs::read(parent.client_archive_path()).unwrap(), b"client");
        assert_eq!(chain.main_class(), "net.fabricmc.loader.impl.launch.knot.KnotClient");
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn undownloadable_parent_is_base_version_unavailable() {
        let root = scratch_dir("resolve-unavailable");
        write(&root.join("versions/fabric-1.21.8/fabric.json"), FABRIC_JSON);
        let base = serve_routes(vec![]).await;

        let err = resolver(&root, None, format!("{base}/index.json"))
            .resolve("fabric-1.21.8", Some("fabricmc"))
            .await
            .unwrap_err();

        assert!(matches!(err, LauncherError::BaseVersionUnavailable(id) if id == "1.21.8"));
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn inheritance_cycles_are_rejected() {
        let root = scratch_dir("resolve-cycle");
        write(
            &root.join("versions/a/a.json"),
            r#"{ "id": "a", "inheritsFrom": "b", "mainClass": "x.Main" }"#,
        );
        write(
            &root.join("versions/b/b.json"),
            r#"{ "id": "b", "inheritsFrom": "a", "mainClass": "x.Main" }"#,
        );

        let err = resolver(&root, None, String::new())
            .resolve("a", None)
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::Other(_)));
        std::fs::remove_dir_all(&root).unwrap();
    }
}
