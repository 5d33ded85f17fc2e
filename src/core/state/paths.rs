use std::path::{Path, PathBuf};

pub const APP_DIR_NAME: &str = ".angelauncher";
pub const HOME_ENV: &str = "ANGELAUNCHER_HOME";

/// On-disk layout of the launcher tree.
///
/// `<data_dir>` doubles as the game directory; versions, libraries and
/// natives live beneath it. Assets are borrowed from the standard
/// installation when it has them, since that is where language files and
/// menu resources already sit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherPaths {
    pub data_dir: PathBuf,
    /// The platform's regular `.minecraft`, if one is known.
    pub standard_game_dir: Option<PathBuf>,
}

impl LauncherPaths {
    pub fn new(data_dir: PathBuf, standard_game_dir: Option<PathBuf>) -> Self {
        Self {
            data_dir,
            standard_game_dir,
        }
    }

    /// `ANGELAUNCHER_HOME`, else `<platform data dir>/.angelauncher`.
    pub fn default_data_dir() -> PathBuf {
        if let Some(home) = std::env::var_os(HOME_ENV).filter(|h| !h.is_empty()) {
            return PathBuf::from(home);
        }
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
    }

    pub fn game_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.data_dir.join("versions")
    }

    pub fn version_dir(&self, version_id: &str) -> PathBuf {
        self.versions_dir().join(version_id)
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.data_dir.join("libraries")
    }

    pub fn natives_dir(&self) -> PathBuf {
        self.data_dir.join("natives")
    }

    pub fn profiles_file(&self) -> PathBuf {
        self.data_dir.join("profiles.json")
    }

    /// Versions tree of the standard installation, searched for parents.
    pub fn standard_versions_dir(&self) -> Option<PathBuf> {
        self.standard_game_dir.as_ref().map(|d| d.join("versions"))
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.standard_game_dir
            .as_ref()
            .map(|d| d.join("assets"))
            .filter(|d| d.is_dir())
            .unwrap_or_else(|| self.data_dir.join("assets"))
    }
}

/// Where the official launcher keeps its files on this platform.
pub fn default_standard_game_dir() -> Option<PathBuf> {
    if cfg!(target_os = "windows") {
        dirs::data_dir().map(|d| d.join(".minecraft"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir().map(|d| d.join("minecraft"))
    } else {
        dirs::home_dir().map(|d| d.join(".minecraft"))
    }
}
