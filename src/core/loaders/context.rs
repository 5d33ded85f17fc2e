use std::path::Path;

use crate::core::downloader::Downloader;
use crate::core::version::ManifestResolver;

/// Everything an installer needs, borrowed from the application state.
pub struct InstallContext<'a> {
    pub minecraft_version: &'a str,
    pub loader_version: &'a str,
    /// Root passed to the installer; holds `versions/` and `libraries/`.
    pub launcher_dir: &'a Path,
    pub libraries_dir: &'a Path,
    pub java: &'a Path,
    pub resolver: &'a ManifestResolver,
    pub downloader: &'a Downloader,
}
