use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::launch::{NativeFallback, SupervisorPolicy};
use crate::core::maven::{FABRIC_MAVEN, MAVEN_CENTRAL, MOJANG_LIBRARIES};
use crate::core::version::VERSION_INDEX_URL;

pub const SETTINGS_FILE: &str = "launcher_settings.json";

/// Launcher-wide settings persisted as `launcher_settings.json`.
///
/// Every field carries a serde default, so an old or hand-edited file with
/// missing keys still loads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    // ── Target installation ──
    /// Directory name of the modded version under `versions/`.
    pub version_id: String,
    /// Substring of the main class that identifies the loader manifest.
    pub main_class_marker: String,
    pub minecraft_version: String,
    pub loader_version: String,
    pub installer_url: String,
    /// ASM version the loader ships with; other versions are purged before install.
    pub pinned_asm_version: String,

    // ── Endpoints ──
    pub version_index_url: String,
    pub libraries_url: String,

    // ── Natives fallback ──
    pub native_fallback_repos: Vec<String>,
    pub native_fallback_version: String,
    pub native_fallback_modules: Vec<String>,

    // ── Mods ──
    pub mod_denylist_fragment: Option<String>,
    pub mods_release_url: Option<String>,

    // ── Server ──
    pub server: ServerEndpoint,
    pub bot_entry: Option<BotEntry>,

    // ── Timeouts (ms) ──
    pub network_timeout_ms: u64,
    pub players_api_timeout_ms: u64,
    pub players_query_timeout_ms: u64,

    pub download_concurrency: usize,
    pub supervisor: SupervisorPolicy,
    pub java_path: Option<PathBuf>,
    /// Overrides the platform's default `.minecraft` location.
    pub standard_game_dir: Option<PathBuf>,

    pub launch: LaunchSettings,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            version_id: "fabric-1.21.8".into(),
            main_class_marker: "fabricmc".into(),
            minecraft_version: "1.21.8".into(),
            loader_version: "0.17.3".into(),
            installer_url: format!(
                "{FABRIC_MAVEN}/net/fabricmc/fabric-installer/1.0.0/fabric-installer-1.0.0.jar"
            ),
            pinned_asm_version: "9.9".into(),
            version_index_url: VERSION_INDEX_URL.into(),
            libraries_url: MOJANG_LIBRARIES.into(),
            native_fallback_repos: vec![MAVEN_CENTRAL.into(), FABRIC_MAVEN.into()],
            native_fallback_version: "3.3.3".into(),
            native_fallback_modules: [
                "lwjgl",
                "lwjgl-glfw",
                "lwjgl-opengl",
                "lwjgl-openal",
                "lwjgl-stb",
                "lwjgl-tinyfd",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            mod_denylist_fragment: Some("fastjoin".into()),
            mods_release_url: None,
            server: ServerEndpoint::default(),
            bot_entry: Some(BotEntry::default()),
            network_timeout_ms: 5_000,
            players_api_timeout_ms: 3_000,
            players_query_timeout_ms: 2_000,
            download_concurrency: 4,
            supervisor: SupervisorPolicy::default(),
            java_path: None,
            standard_game_dir: None,
            launch: LaunchSettings::default(),
        }
    }
}

impl LauncherConfig {
    /// Reads `<data_dir>/launcher_settings.json`, falling back to defaults
    /// when the file is missing or unreadable.
    pub async fn load_or_default(data_dir: &Path) -> Self {
        let path = data_dir.join(SETTINGS_FILE);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no settings file, using defaults");
                return Self::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read settings, using defaults");
                return Self::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt settings file, using defaults");
                Self::default()
            }
        }
    }

    pub async fn save(&self, data_dir: &Path) -> LauncherResult<()> {
        tokio::fs::create_dir_all(data_dir)
            .await
            .map_err(|e| LauncherError::io(data_dir, e))?;
        let path = data_dir.join(SETTINGS_FILE);
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| LauncherError::io(&path, e))
    }

    pub fn native_fallback(&self) -> Option<NativeFallback> {
        if self.native_fallback_modules.is_empty() || self.native_fallback_repos.is_empty() {
            return None;
        }
        Some(NativeFallback {
            group_id: "org.lwjgl".into(),
            version: self.native_fallback_version.clone(),
            modules: self.native_fallback_modules.clone(),
            repositories: self.native_fallback_repos.clone(),
        })
    }
}

/// Per-launch choices made by the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct LaunchSettings {
    pub max_memory: String,
    pub min_memory: String,
    /// Free-form JVM arguments, split on whitespace.
    pub java_args: String,
    pub fullscreen: bool,
    /// Join the configured server directly from the title screen.
    pub quick_play: bool,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            max_memory: "2G".into(),
            min_memory: "1G".into(),
            java_args: String::new(),
            fullscreen: false,
            quick_play: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerEndpoint {
    pub host: String,
    pub game_port: u16,
    pub query_port: u16,
    pub api_port: u16,
}

impl Default for ServerEndpoint {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            game_port: 30081,
            query_port: 30081,
            api_port: 30761,
        }
    }
}

impl ServerEndpoint {
    /// `host:port` used for the quick-join argument.
    pub fn game_address(&self) -> String {
        format!("{}:{}", self.host, self.game_port)
    }

    pub fn players_api_url(&self) -> String {
        format!("http://{}:{}/api/players", self.host, self.api_port)
    }
}

/// Synthetic entry always shown at the top of the player list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct BotEntry {
    pub name: String,
    pub head_url: String,
}

impl Default for BotEntry {
    fn default() -> Self {
        Self {
            name: "Angella".into(),
            head_url: "https://cdn.discordapp.com/embed/avatars/0.png".into(),
        }
    }
}
