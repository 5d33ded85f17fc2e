// ─── Launch Task ───
// Spawns the game process detached from the launcher, with piped output.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::core::error::{LauncherError, LauncherResult};

use super::classpath::safe_path_str;

/// What to run and where.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub java: PathBuf,
    pub args: Vec<String>,
    /// Working directory; the version directory.
    pub working_dir: PathBuf,
    pub natives_dir: PathBuf,
}

/// Start the game. Standard streams are piped, never inherited, and the
/// child is placed in its own process group so it survives the launcher.
pub fn spawn_game(request: &SpawnRequest) -> LauncherResult<Child> {
    let mut cmd = Command::new(&request.java);
    cmd.args(&request.args)
        .current_dir(&request.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    configure_native_library_env(&mut cmd, &request.natives_dir);
    configure_platform_spawn(&mut cmd);

    info!(java = %request.java.display(), dir = %request.working_dir.display(), "launching game");
    debug!("Command (copy/paste): {}", format_command_for_logs(&request.java, &request.args));

    let child = cmd.spawn().map_err(|source| LauncherError::ProcessSpawnError {
        program: request.java.clone(),
        source,
    })?;

    Ok(child)
}

fn configure_native_library_env(cmd: &mut Command, natives_dir: &Path) {
    let native_path = safe_path_str(natives_dir);

    if cfg!(target_os = "windows") {
        cmd.env("PATH", append_env_path("PATH", &native_path));
    } else if cfg!(target_os = "macos") {
        cmd.env("DYLD_LIBRARY_PATH", append_env_path("DYLD_LIBRARY_PATH", &native_path));
    } else {
        cmd.env("LD_LIBRARY_PATH", append_env_path("LD_LIBRARY_PATH", &native_path));
    }
}

fn configure_platform_spawn(cmd: &mut Command) {
    #[cfg(unix)]
    {
        cmd.process_group(0);
    }

    #[cfg(target_os = "windows")]
    {
        const DETACHED_PROCESS: u32 = 0x0000_0008;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);

        // Terminal markers make LWJGL treat the game as a console session.
        cmd.env_remove("WT_SESSION");
        cmd.env_remove("TERM");
        cmd.env_remove("ConEmuANSI");
    }
}

fn append_env_path(var_name: &str, value: &str) -> String {
    let separator = if cfg!(target_os = "windows") { ";" } else { ":" };
    match std::env::var(var_name) {
        Ok(existing) if !existing.trim().is_empty() => format!("{value}{separator}{existing}"),
        _ => value.to_string(),
    }
}

/// Shell-pasteable rendering of the command line with the access token masked.
pub fn format_command_for_logs(program: &Path, args: &[String]) -> String {
    let mut parts = vec![shell_escape(&program.to_string_lossy())];
    let mut mask_next = false;
    for arg in args {
        if mask_next {
            parts.push("***".into());
            mask_next = false;
            continue;
        }
        mask_next = arg == "--accessToken";
        parts.push(shell_escape(arg));
    }
    parts.join(" ")
}

fn shell_escape(raw: &str) -> String {
    if raw.is_empty() {
        return "\"\"".to_string();
    }

    if raw.chars().all(|ch| {
        ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '\\' | '=' | '+')
    }) {
        return raw.to_string();
    }

    format!("\"{}\"", raw.replace('"', "\\\""))
}
