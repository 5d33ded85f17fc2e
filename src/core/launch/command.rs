// ─── Launch Composer ───
// Pure assembly of the Java argument vector. No I/O happens here, so the
// same inputs always yield the same arguments.

use std::path::Path;

use super::classpath::{safe_path_str, ResolvedClasspath};
use crate::core::profile::Profile;
use crate::core::state::LaunchSettings;

/// Asset index used when no manifest in the chain names one.
pub const DEFAULT_ASSET_INDEX: &str = "26";

/// Everything the argument vector depends on.
#[derive(Debug, Clone)]
pub struct LaunchInputs<'a> {
    pub classpath: &'a ResolvedClasspath,
    pub natives_dir: &'a Path,
    pub main_class: &'a str,
    /// Directory name of the leaf version.
    pub version_id: &'a str,
    pub game_dir: &'a Path,
    pub assets_dir: &'a Path,
    pub asset_index: Option<&'a str>,
    pub profile: &'a Profile,
    pub settings: &'a LaunchSettings,
    /// `host:port` joined when quick play is enabled.
    pub quick_play_server: Option<&'a str>,
}

pub fn compose(inputs: &LaunchInputs<'_>) -> Vec<String> {
    let settings = inputs.settings;
    let identity = inputs.profile.identity();
    let natives = safe_path_str(inputs.natives_dir);

    let mut args = vec![
        format!("-Xmx{}", memory_or(&settings.max_memory, "2G")),
        format!("-Xms{}", memory_or(&settings.min_memory, "1G")),
        format!("-Dorg.lwjgl.librarypath={natives}"),
        format!("-Djava.library.path={natives}"),
    ];
    args.extend(settings.java_args.split_whitespace().map(String::from));

    args.push("-cp".into());
    args.push(inputs.classpath.to_arg());
    args.push(inputs.main_class.to_string());

    let asset_index = inputs
        .asset_index
        .filter(|id| !id.is_empty())
        .unwrap_or(DEFAULT_ASSET_INDEX);

    args.extend([
        "--username".to_string(),
        identity.username,
        "--uuid".to_string(),
        identity.uuid,
        "--version".to_string(),
        inputs.version_id.to_string(),
        "--gameDir".to_string(),
        safe_path_str(inputs.game_dir),
        "--assetsDir".to_string(),
        safe_path_str(inputs.assets_dir),
        "--assetIndex".to_string(),
        asset_index.to_string(),
        "--accessToken".to_string(),
        identity.access_token,
        "--userType".to_string(),
        identity.user_type,
        "--versionType".to_string(),
        "release".to_string(),
    ]);

    if settings.fullscreen {
        args.push("--fullscreen".into());
    }
    if settings.quick_play {
        if let Some(server) = inputs.quick_play_server {
            args.push("--quickPlayMultiplayer".into());
            args.push(server.to_string());
        }
    }

    args
}

fn memory_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback
    } else {
        trimmed
    }
}
