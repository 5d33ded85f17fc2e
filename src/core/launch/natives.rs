// ─── Native Library Extractor ───
// Unpacks platform shared libraries from native bundles into the natives dir.
// The directory is append-only: files already present by name are never
// rewritten, so repeated launches only add what is missing.

use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::maven::MavenArtifact;
use crate::core::version::{LibraryLocation, ManifestChain};

const SHARED_LIBRARY_EXTENSIONS: [&str; 4] = [".dll", ".so", ".dylib", ".jnilib"];

/// Shared libraries currently present in the natives directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeBundleSet {
    pub dir: PathBuf,
    pub files: BTreeSet<String>,
}

impl NativeBundleSet {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Well-known bundles tried when the manifests yield no shared libraries.
#[derive(Debug, Clone)]
pub struct NativeFallback {
    pub group_id: String,
    pub version: String,
    pub modules: Vec<String>,
    /// Tried in order for every module until one succeeds.
    pub repositories: Vec<String>,
}

pub struct NativeLibraryExtractor {
    libraries_dir: PathBuf,
    natives_dir: PathBuf,
    default_repo: String,
    downloader: Downloader,
    fallback: Option<NativeFallback>,
    os: &'static str,
    arch: &'static str,
}

impl NativeLibraryExtractor {
    pub fn new(
        libraries_dir: PathBuf,
        natives_dir: PathBuf,
        default_repo: impl Into<String>,
        downloader: Downloader,
    ) -> Self {
        Self {
            libraries_dir,
            natives_dir,
            default_repo: default_repo.into(),
            downloader,
            fallback: None,
            os: crate::core::version::current_os_name(),
            arch: current_arch(),
        }
    }

    pub fn with_fallback(mut self, fallback: Option<NativeFallback>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_os(mut self, os: &'static str) -> Self {
        self.os = os;
        self
    }

    /// `x64`, `arm64`, `x86` or `arm32`.
    pub fn with_arch(mut self, arch: &'static str) -> Self {
        self.arch = arch;
        self
    }

    pub fn natives_dir(&self) -> &Path {
        &self.natives_dir
    }

    pub async fn extract(&self, chain: &ManifestChain) -> LauncherResult<NativeBundleSet> {
        tokio::fs::create_dir_all(&self.natives_dir)
            .await
            .map_err(|e| LauncherError::io(&self.natives_dir, e))?;

        for location in self.native_locations(chain) {
            self.extract_location(&location).await;
        }

        let present = scan_natives(&self.natives_dir).await?;
        if !present.is_empty() {
            info!(files = present.files.len(), dir = %present.dir.display(), "native libraries ready");
            return Ok(present);
        }

        if let Some(fallback) = &self.fallback {
            warn!("no native libraries extracted, trying fallback bundles");
            self.extract_fallback(fallback).await;
        }

        let present = scan_natives(&self.natives_dir).await?;
        if present.is_empty() {
            warn!(dir = %self.natives_dir.display(), "natives directory is still empty");
        }
        Ok(present)
    }

    /// Native archives for the current OS across the chain, leaf first, without repeats.
    ///
    /// Per `(group, artifact)`, bundles built for this architecture win. A
    /// bundle with no architecture suffix counts as x64 and is kept as a
    /// stand-in only when no matching variant is listed.
    fn native_locations(&self, chain: &ManifestChain) -> Vec<LibraryLocation> {
        let mut candidates: Vec<(String, &'static str, LibraryLocation)> = Vec::new();
        for resolved in chain.iter() {
            for library in &resolved.manifest.libraries {
                if !library.is_native_bundle() || !library.is_allowed_for(self.os) {
                    continue;
                }
                let Some(classifier) = library.native_classifier_for(self.os) else {
                    debug!(library = %library.name, os = self.os, "no natives for this OS");
                    continue;
                };
                match library.native_location(self.os, &self.libraries_dir, &self.default_repo) {
                    Ok(Some(location)) => {
                        if candidates.iter().any(|(_, _, l)| l.path == location.path) {
                            continue;
                        }
                        let key = library
                            .artifact()
                            .map(|a| a.key().to_string())
                            .unwrap_or_else(|_| library.name.clone());
                        candidates.push((key, classifier_arch(&classifier), location));
                    }
                    Ok(None) => debug!(library = %library.name, os = self.os, "no natives for this OS"),
                    Err(e) => warn!(library = %library.name, error = %e, "skipping native bundle"),
                }
            }
        }

        let has_exact = |key: &str| candidates.iter().any(|(k, arch, _)| k == key && *arch == self.arch);
        candidates
            .iter()
            .filter(|(key, arch, location)| {
                let keep = *arch == self.arch || (*arch == "x64" && !has_exact(key));
                if !keep {
                    debug!(path = %location.path.display(), arch, host = self.arch, "skipping native bundle for other architecture");
                }
                keep
            })
            .map(|(_, _, location)| location.clone())
            .collect()
    }

    async fn extract_location(&self, location: &LibraryLocation) {
        if !location.path.exists() {
            if let Err(e) = self
                .downloader
                .download_file(&location.url, &location.path, location.sha1.as_deref())
                .await
            {
                warn!(url = %location.url, error = %e, "native bundle download failed");
                return;
            }
        }
        self.extract_logged(&location.path).await;
    }

    async fn extract_fallback(&self, fallback: &NativeFallback) {
        let classifier = fallback_classifier(self.os);
        for module in &fallback.modules {
            let artifact = MavenArtifact {
                group_id: fallback.group_id.clone(),
                artifact_id: module.clone(),
                version: fallback.version.clone(),
                classifier: Some(classifier.clone()),
                extension: "jar".into(),
            };
            let archive = self.libraries_dir.join(artifact.local_path());

            if !archive.exists() && !self.download_from_any(&artifact, &fallback.repositories, &archive).await {
                continue;
            }
            self.extract_logged(&archive).await;
        }
    }

    async fn download_from_any(&self, artifact: &MavenArtifact, repos: &[String], dest: &Path) -> bool {
        for repo in repos {
            let url = artifact.url(repo);
            match self.downloader.download_file(&url, dest, None).await {
                Ok(()) => return true,
                Err(e) => warn!(%url, error = %e, "fallback native download failed"),
            }
        }
        false
    }

    async fn extract_logged(&self, archive: &Path) {
        match extract_shared_libraries(archive, &self.natives_dir).await {
            Ok(extracted) if !extracted.is_empty() => {
                info!(archive = %archive.display(), count = extracted.len(), "extracted natives");
            }
            Ok(_) => debug!(archive = %archive.display(), "no new natives in archive"),
            Err(e) => warn!(error = %e, "native extraction failed, continuing"),
        }
    }
}

/// Copy every shared library in `archive` into `dest_dir` by base name,
/// skipping names already present. Returns the names written.
pub async fn extract_shared_libraries(archive: &Path, dest_dir: &Path) -> LauncherResult<Vec<String>> {
    let archive = archive.to_path_buf();
    let dest_dir = dest_dir.to_path_buf();
    let failed_path = archive.clone();

    tokio::task::spawn_blocking(move || extract_blocking(&archive, &dest_dir))
        .await
        .map_err(|e| LauncherError::NativeExtractionFailed {
            path: failed_path,
            reason: format!("task join error: {e}"),
        })?
}

fn extract_blocking(archive: &Path, dest_dir: &Path) -> LauncherResult<Vec<String>> {
    let failed = |reason: String| LauncherError::NativeExtractionFailed {
        path: archive.to_path_buf(),
        reason,
    };

    let file = std::fs::File::open(archive).map_err(|e| failed(e.to_string()))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| failed(e.to_string()))?;
    let mut written = Vec::new();

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| failed(e.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().replace('\\', "/");
        if name.starts_with("META-INF/") {
            continue;
        }
        let Some(base) = name.rsplit('/').next().filter(|b| is_shared_library(b)) else {
            continue;
        };

        let dest = dest_dir.join(base);
        let mut out = match OpenOptions::new().write(true).create_new(true).open(&dest) {
            Ok(out) => out,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(LauncherError::io(&dest, e)),
        };
        if let Err(e) = std::io::copy(&mut entry, &mut out) {
            drop(out);
            let _ = std::fs::remove_file(&dest);
            return Err(failed(format!("{base}: {e}")));
        }
        debug!(file = base, "extracted native");
        written.push(base.to_string());
    }

    Ok(written)
}

fn is_shared_library(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SHARED_LIBRARY_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

async fn scan_natives(dir: &Path) -> LauncherResult<NativeBundleSet> {
    let mut files = BTreeSet::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| LauncherError::io(dir, e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| LauncherError::io(dir, e))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_shared_library(&name) {
            files.insert(name);
        }
    }
    Ok(NativeBundleSet {
        dir: dir.to_path_buf(),
        files,
    })
}

/// Architecture of the running platform, named the way native classifiers do.
pub fn current_arch() -> &'static str {
    if cfg!(target_arch = "aarch64") {
        "arm64"
    } else if cfg!(target_arch = "arm") {
        "arm32"
    } else if cfg!(target_arch = "x86") {
        "x86"
    } else {
        "x64"
    }
}

/// Architecture a native classifier was built for. No suffix means x64, as
/// do the legacy `-64` and `-32` forms, which are already picked per host.
fn classifier_arch(classifier: &str) -> &'static str {
    if classifier.ends_with("-arm64") || classifier.ends_with("-aarch64") {
        "arm64"
    } else if classifier.ends_with("-arm32") {
        "arm32"
    } else if classifier.ends_with("-x86") {
        "x86"
    } else if classifier.ends_with("-32") {
        current_arch()
    } else {
        "x64"
    }
}

/// LWJGL 3 classifier for the running platform.
pub fn fallback_classifier(os: &str) -> String {
    let platform = match os {
        "windows" => "windows",
        "osx" => "macos",
        _ => "linux",
    };
    match current_arch() {
        "x64" => format!("natives-{platform}"),
        arch => format!("natives-{platform}-{arch}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::{ok, scratch_dir, serve_routes};
    use crate::core::version::ManifestResolver;
    use std::io::Write;
    use std::time::Duration;
    use zip::write::SimpleFileOptions;

    fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, body) in files {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(body).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn write(path: &Path, body: &[u8]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    fn downloader() -> Downloader {
        let client = crate::core::http::build_http_client(Duration::from_secs(2)).unwrap();
        Downloader::new(client, Duration::from_secs(2))
    }

    async fn chain(root: &Path, version: &str) -> ManifestChain {
        ManifestResolver::new(root.join("versions"), None, downloader(), "")
            .resolve(version, None)
            .await
            .unwrap()
    }

    fn extractor(root: &Path, repo: &str) -> NativeLibraryExtractor {
        NativeLibraryExtractor::new(root.join("libraries"), root.join("natives"), repo, downloader())
            .with_os("linux")
    }

    #[tokio::test]
    async fn extracts_nested_shared_libraries_once() {
        let root = scratch_dir("natives-idempotent");
        write(
            &root.join("versions/solo/solo.json"),
            br#"{ "id": "solo", "mainClass": "x.Main", "libraries": [
                  { "name": "org.lwjgl:lwjgl:3.3.3:natives-linux" },
                  { "name": "org.lwjgl:lwjgl:3.3.3:natives-windows",
                    "rules": [{ "action": "allow", "os": { "name": "windows" } }] },
                  { "name": "org.lwjgl:lwjgl:3.3.3" }
                ] }"#,
        );
        let archive = root
            .join("libraries")
            .join(MavenArtifact::parse("org.lwjgl:lwjgl:3.3.3:natives-linux").unwrap().local_path());
        write(
            &archive,
            &zip_bytes(&[
                ("linux/x64/org/lwjgl/liblwjgl.so", b"native"),
                ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0"),
                ("org/lwjgl/Version.class", b"class"),
            ]),
        );

        let chain = chain(&root, "solo").await;
        let extractor = extractor(&root, "http://127.0.0.1:9");

        let first = extractor.extract(&chain).await.unwrap();
        assert_eq!(first.files.iter().collect::<Vec<_>>(), ["liblwjgl.so"]);

        std::fs::write(root.join("natives/liblwjgl.so"), b"already here").unwrap();
        let second = extractor.extract(&chain).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(std::fs::read(root.join("natives/liblwjgl.so")).unwrap(), b"already here");
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn corrupt_archive_does_not_stop_the_rest() {
        let root = scratch_dir("natives-corrupt");
        write(
            &root.join("versions/solo/solo.json"),
            br#"{ "id": "solo", "mainClass": "x.Main", "libraries": [
                  { "name": "a:broken:1:natives-linux" },
                  { "name": "a:good:1:natives-linux" }
                ] }"#,
        );
        let libs = root.join("libraries");
        write(
            &libs.join(MavenArtifact::parse("a:broken:1:natives-linux").unwrap().local_path()),
            b"not a zip",
        );
        write(
            &libs.join(MavenArtifact::parse("a:good:1:natives-linux").unwrap().local_path()),
            &zip_bytes(&[("libgood.so", b"native")]),
        );

        let chain = chain(&root, "solo").await;
        let set = extractor(&root, "http://127.0.0.1:9").extract(&chain).await.unwrap();

        assert!(set.files.contains("libgood.so"));
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn fallback_tries_alternate_repository() {
        let root = scratch_dir("natives-fallback");
        write(
            &root.join("versions/solo/solo.json"),
            br#"{ "id": "solo", "mainClass": "x.Main", "libraries": [] }"#,
        );
        let classifier = fallback_classifier("linux");
        let jar = format!("/alt/org/lwjgl/lwjgl-glfw/3.3.3/lwjgl-glfw-3.3.3-{classifier}.jar");
        let base = serve_routes(vec![(jar, ok(zip_bytes(&[("libglfw.so", b"native")])))]).await;

        let fallback = NativeFallback {
            group_id: "org.lwjgl".into(),
            version: "3.3.3".into(),
            modules: vec!["lwjgl-glfw".into()],
            repositories: vec![format!("{base}/primary"), format!("{base}/alt")],
        };
        let chain = chain(&root, "solo").await;
        let set = extractor(&root, &base)
            .with_fallback(Some(fallback))
            .extract(&chain)
            .await
            .unwrap();

        assert_eq!(set.files.iter().collect::<Vec<_>>(), ["libglfw.so"]);
        std::fs::remove_dir_all(&root).unwrap();
    }

    const MAC_VARIANTS: &[u8] = br#"{ "id": "solo", "mainClass": "x.Main", "libraries": [
          { "name": "org.lwjgl:lwjgl:3.3.3:natives-macos",
            "rules": [{ "action": "allow", "os": { "name": "osx" } }] },
          { "name": "org.lwjgl:lwjgl:3.3.3:natives-macos-arm64",
            "rules": [{ "action": "allow", "os": { "name": "osx" } }] }
        ] }"#;

    fn write_mac_bundles(root: &Path) {
        write(&root.join("versions/solo/solo.json"), MAC_VARIANTS);
        let libs = root.join("libraries");
        for (classifier, body) in [("natives-macos", b"X64".as_slice()), ("natives-macos-arm64", b"ARM64")] {
            let coord = format!("org.lwjgl:lwjgl:3.3.3:{classifier}");
            write(
                &libs.join(MavenArtifact::parse(&coord).unwrap().local_path()),
                &zip_bytes(&[("macos/org/lwjgl/liblwjgl.dylib", body)]),
            );
        }
    }

    #[tokio::test]
    async fn host_architecture_variant_wins() {
        let root = scratch_dir("natives-arch-arm");
        write_mac_bundles(&root);

        let chain = chain(&root, "solo").await;
        extractor(&root, "http://127.0.0.1:9")
            .with_os("osx")
            .with_arch("arm64")
            .extract(&chain)
            .await
            .unwrap();

        assert_eq!(std::fs::read(root.join("natives/liblwjgl.dylib")).unwrap(), b"ARM64");
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn unsuffixed_variant_serves_x64() {
        let root = scratch_dir("natives-arch-x64");
        write_mac_bundles(&root);

        let chain = chain(&root, "solo").await;
        extractor(&root, "http://127.0.0.1:9")
            .with_os("osx")
            .with_arch("x64")
            .extract(&chain)
            .await
            .unwrap();

        assert_eq!(std::fs::read(root.join("natives/liblwjgl.dylib")).unwrap(), b"X64");
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn classifier_architectures() {
        assert_eq!(classifier_arch("natives-macos"), "x64");
        assert_eq!(classifier_arch("natives-macos-arm64"), "arm64");
        assert_eq!(classifier_arch("natives-windows-x86"), "x86");
        assert_eq!(classifier_arch("natives-windows-64"), "x64");
    }

    #[test]
    fn shared_library_extensions() {
        assert!(is_shared_library("lwjgl.dll"));
        assert!(is_shared_library("liblwjgl.so"));
        assert!(is_shared_library("libglfw.dylib"));
        assert!(is_shared_library("libjinput-osx.jnilib"));
        assert!(!is_shared_library("Version.class"));
        assert!(!is_shared_library("liblwjgl.so.sha1"));
    }

    #[test]
    fn fallback_classifier_names_platform() {
        assert!(fallback_classifier("windows").starts_with("natives-windows"));
        assert!(fallback_classifier("osx").starts_with("natives-macos"));
        assert!(fallback_classifier("linux").starts_with("natives-linux"));
    }
}
