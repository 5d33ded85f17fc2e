// ─── Classpath Assembler ───
// Turns a resolved manifest chain into the ordered, deduplicated list of
// archives handed to `-cp`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::core::downloader::{DownloadEntry, Downloader};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::maven::LibraryKey;
use crate::core::version::{LibraryEntry, LibraryLocation, ManifestChain, ManifestResolver, ResolvedManifest};

/// Ordered classpath. Rebuilt for every launch attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedClasspath {
    entries: Vec<PathBuf>,
}

impl ResolvedClasspath {
    pub fn from_entries(entries: Vec<PathBuf>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Joined `-cp` value using the platform separator.
    pub fn to_arg(&self) -> String {
        self.entries
            .iter()
            .map(|p| safe_path_str(p))
            .collect::<Vec<_>>()
            .join(get_classpath_separator())
    }
}

/// Platform-specific Java classpath separator.
pub fn get_classpath_separator() -> &'static str {
    if cfg!(target_os = "windows") {
        ";"
    } else {
        ":"
    }
}

// ─── Override plan ───

#[derive(Debug)]
struct PlannedLibrary {
    name: String,
    key: Option<LibraryKey>,
    location: LibraryLocation,
}

/// Insertion-ordered library set keyed by `(group, artifact)`.
///
/// A priority insert evicts any earlier path for the same key before it is
/// appended; a non-priority insert of a known key is dropped.
#[derive(Debug, Default)]
struct ClasspathPlan {
    entries: Vec<PlannedLibrary>,
    keys: HashSet<LibraryKey>,
}

impl ClasspathPlan {
    fn insert(&mut self, library: PlannedLibrary, priority: bool) -> bool {
        if let Some(key) = &library.key {
            if self.keys.contains(key) {
                if !priority {
                    debug!(library = %library.name, "skipping duplicate library");
                    return false;
                }
                self.entries.retain(|e| {
                    let evict = e.key.as_ref() == Some(key);
                    if evict {
                        debug!(old = %e.location.path.display(), "evicted older version from classpath");
                    }
                    !evict
                });
            }
            self.keys.insert(key.clone());
        }

        if self.entries.iter().any(|e| e.location.path == library.location.path) {
            return false;
        }
        self.entries.push(library);
        true
    }

    fn remove_paths(&mut self, failed: &HashSet<PathBuf>) {
        self.entries.retain(|e| !failed.contains(&e.location.path));
    }
}

// ─── Assembler ───

pub struct ClasspathAssembler {
    libraries_dir: PathBuf,
    default_repo: String,
    downloader: Downloader,
    resolver: ManifestResolver,
    mod_denylist: Option<String>,
    os: &'static str,
}

impl ClasspathAssembler {
    pub fn new(
        libraries_dir: PathBuf,
        default_repo: impl Into<String>,
        downloader: Downloader,
        resolver: ManifestResolver,
    ) -> Self {
        Self {
            libraries_dir,
            default_repo: default_repo.into(),
            downloader,
            resolver,
            mod_denylist: None,
            os: crate::core::version::current_os_name(),
        }
    }

    /// Mod archives whose file name contains `fragment` stay off the classpath.
    pub fn with_mod_denylist(mut self, fragment: Option<String>) -> Self {
        self.mod_denylist = fragment.filter(|f| !f.is_empty());
        self
    }

    pub fn with_os(mut self, os: &'static str) -> Self {
        self.os = os;
        self
    }

    pub async fn assemble(&self, chain: &ManifestChain) -> LauncherResult<ResolvedClasspath> {
        let mut plan = ClasspathPlan::default();
        self.plan_manifest(&mut plan, chain.leaf(), true);
        for ancestor in chain.ancestors() {
            self.plan_manifest(&mut plan, ancestor, false);
        }

        self.fetch_missing(&mut plan).await;

        let mut candidates: Vec<PathBuf> = plan.entries.into_iter().map(|e| e.location.path).collect();
        candidates.extend(self.collect_mods(&chain.leaf().dir).await);
        if let Some(client) = self.resolve_client_archive(chain).await? {
            candidates.push(client);
        }

        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(candidates.len());
        for path in candidates {
            if !path.is_file() {
                warn!(path = %path.display(), "classpath entry does not exist, omitting");
                continue;
            }
            if seen.insert(path.clone()) {
                entries.push(path);
            }
        }

        if entries.is_empty() {
            return Err(LauncherError::EmptyClasspath(chain.leaf().id()));
        }

        info!(entries = entries.len(), version = %chain.leaf().id(), "classpath assembled");
        Ok(ResolvedClasspath { entries })
    }

    fn plan_manifest(&self, plan: &mut ClasspathPlan, resolved: &ResolvedManifest, priority: bool) {
        for library in &resolved.manifest.libraries {
            if !library.is_allowed_for(self.os) {
                debug!(library = %library.name, "skipping library (OS rule)");
                continue;
            }
            if is_native_only(library) {
                continue;
            }

            let location = match library.location(&self.libraries_dir, &self.default_repo) {
                Ok(location) => location,
                Err(e) => {
                    warn!(library = %library.name, error = %e, "skipping unresolvable library");
                    continue;
                }
            };

            plan.insert(
                PlannedLibrary {
                    name: library.name.clone(),
                    key: library.artifact().ok().map(|a| a.key()),
                    location,
                },
                priority,
            );
        }
    }

    /// Download every planned archive not yet on disk. Failures drop that
    /// library from the plan and assembly carries on.
    async fn fetch_missing(&self, plan: &mut ClasspathPlan) {
        let missing: Vec<DownloadEntry> = plan
            .entries
            .iter()
            .filter(|e| !e.location.path.exists())
            .map(|e| {
                DownloadEntry::new(e.location.url.clone(), e.location.path.clone())
                    .with_sha1(e.location.sha1.clone())
            })
            .collect();

        if missing.is_empty() {
            return;
        }

        let failed: HashSet<PathBuf> = self
            .downloader
            .download_batch(missing)
            .await
            .into_iter()
            .map(|(entry, error)| {
                let name = plan
                    .entries
                    .iter()
                    .find(|e| e.location.path == entry.dest)
                    .map(|e| e.name.as_str())
                    .unwrap_or_default();
                warn!(library = name, url = %entry.url, error = %error, "library download failed, skipping");
                entry.dest
            })
            .collect();

        plan.remove_paths(&failed);
    }

    /// `<version dir>/mods/*.jar`, sorted, minus the denylisted fragment.
    async fn collect_mods(&self, version_dir: &Path) -> Vec<PathBuf> {
        let mods_dir = version_dir.join("mods");
        let mut mods = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(&mods_dir).await else {
            return mods;
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
            if !name.ends_with(".jar") {
                continue;
            }
            if let Some(fragment) = &self.mod_denylist {
                if name.contains(&fragment.to_ascii_lowercase()) {
                    debug!(file = %name, "mod excluded from classpath");
                    continue;
                }
            }
            mods.push(path);
        }

        mods.sort();
        mods
    }

    /// Client archive lookup, in order: an archive already on disk or a direct
    /// download descriptor along the chain, the standard installation's copy
    /// of the parent, a fresh download of the parent, any archive sitting in
    /// the leaf's directory.
    ///
    /// The leaf's own `<id>.jar` only counts when its manifest declares a
    /// client download; loader installers leave a placeholder there.
    async fn resolve_client_archive(&self, chain: &ManifestChain) -> LauncherResult<Option<PathBuf>> {
        for (depth, resolved) in chain.iter().enumerate() {
            let jar = resolved.client_archive_path();
            let client = resolved.manifest.client_download();
            if jar.is_file() && (client.is_some() || depth > 0) {
                return Ok(Some(jar));
            }
            let Some(client) = client else {
                continue;
            };
            match self
                .downloader
                .download_file(&client.url, &jar, client.sha1.as_deref())
                .await
            {
                Ok(()) => return Ok(Some(jar)),
                Err(e) => warn!(jar = %jar.display(), error = %e, "client archive download failed"),
            }
        }

        let leaf = chain.leaf();
        let parent = leaf.manifest.inherits_from.as_deref();

        if let Some(parent_id) = parent {
            if let Some(standard) = self.resolver.fallback_versions_dir() {
                let jar = standard.join(parent_id).join(format!("{parent_id}.jar"));
                if jar.is_file() {
                    info!(jar = %jar.display(), "using client archive from standard installation");
                    return Ok(Some(jar));
                }
            }

            match self.resolver.install_version(parent_id).await {
                Ok(installed) if installed.client_archive_path().is_file() => {
                    return Ok(Some(installed.client_archive_path()));
                }
                Ok(_) => {}
                Err(e) => warn!(version = parent_id, error = %e, "base version download failed"),
            }
        }

        if let Some(jar) = first_archive_in(&leaf.dir).await {
            warn!(jar = %jar.display(), "falling back to first archive in version directory");
            return Ok(Some(jar));
        }

        match parent {
            Some(parent_id) => Err(LauncherError::BaseVersionUnavailable(parent_id.to_string())),
            None => {
                warn!(version = %leaf.id(), "client archive not found");
                Ok(None)
            }
        }
    }
}

/// Pure native bundles carry no classes for the classpath.
fn is_native_only(library: &LibraryEntry) -> bool {
    if library.name.contains(":natives-") {
        return true;
    }
    library.natives.is_some()
        && library
            .downloads
            .as_ref()
            .and_then(|d| d.artifact.as_ref())
            .is_none()
}

async fn first_archive_in(dir: &Path) -> Option<PathBuf> {
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    let mut jars = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("jar")) {
            jars.push(path);
        }
    }
    jars.sort();
    jars.into_iter().next()
}

/// Convert path to string, without the `\\?\` prefix on Windows.
pub fn safe_path_str(path: &Path) -> String {
    let text = path.to_string_lossy().to_string();

    #[cfg(target_os = "windows")]
    {
        // Java reports ClassNotFoundException for extended-length classpath entries.
        if let Some(stripped) = text.strip_prefix(r"\\?\") {
            return stripped.to_string();
        }
    }

    text
}
