use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::context::InstallContext;
use super::installer::{LoaderInstallResult, LoaderInstaller};
use crate::core::error::{LauncherError, LauncherResult};

const INSTALLER_FILE: &str = "fabric-installer.jar";
const STDERR_TAIL_LINES: usize = 5;

/// Runs the official Fabric installer jar in client mode.
///
/// The installer itself is treated as a black box: only its exit status and
/// output tail matter here.
pub struct FabricInstaller {
    installer_url: String,
    pinned_asm_version: String,
}

impl FabricInstaller {
    pub fn new(installer_url: impl Into<String>, pinned_asm_version: impl Into<String>) -> Self {
        Self {
            installer_url: installer_url.into(),
            pinned_asm_version: pinned_asm_version.into(),
        }
    }

    async fn ensure_base_version(&self, ctx: &InstallContext<'_>) -> LauncherResult<()> {
        if ctx.resolver.is_installed(ctx.minecraft_version).await {
            debug!(version = ctx.minecraft_version, "base version already installed");
            return Ok(());
        }

        info!(version = ctx.minecraft_version, "installing base version before loader");
        ctx.resolver
            .install_version(ctx.minecraft_version)
            .await
            .map(|_| ())
            .map_err(|e| {
                warn!(version = ctx.minecraft_version, error = %e, "base version download failed");
                LauncherError::BaseVersionUnavailable(ctx.minecraft_version.to_string())
            })
    }

    async fn run_installer(&self, ctx: &InstallContext<'_>, installer: &Path) -> LauncherResult<()> {
        let mut cmd = Command::new(ctx.java);
        cmd.arg("-jar")
            .arg(installer)
            .arg("client")
            .arg("-mcversion")
            .arg(ctx.minecraft_version)
            .arg("-loader")
            .arg(ctx.loader_version)
            .arg("-dir")
            .arg(ctx.launcher_dir)
            .arg("-noprofile")
            .current_dir(ctx.launcher_dir);

        info!(
            minecraft = ctx.minecraft_version,
            loader = ctx.loader_version,
            "running fabric installer"
        );
        let output = cmd
            .output()
            .await
            .map_err(|source| LauncherError::ProcessSpawnError {
                program: ctx.java.to_path_buf(),
                source,
            })?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!("[fabric-installer] {line}");
        }

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail = stderr_tail(&stderr);
        let reason = if tail.is_empty() {
            format!("installer exited with {}", output.status)
        } else {
            tail
        };
        Err(LauncherError::LoaderInstallFailed(reason))
    }
}

#[async_trait]
impl LoaderInstaller for FabricInstaller {
    async fn install(&self, ctx: InstallContext<'_>) -> LauncherResult<LoaderInstallResult> {
        self.ensure_base_version(&ctx).await?;
        remove_stale_libraries(ctx.libraries_dir, &self.pinned_asm_version).await;

        let installer = ctx.launcher_dir.join(INSTALLER_FILE);
        ctx.downloader
            .download_file(&self.installer_url, &installer, None)
            .await?;

        self.run_installer(&ctx, &installer).await?;

        let version_id = format!(
            "fabric-loader-{}-{}",
            ctx.loader_version, ctx.minecraft_version
        );
        info!(version = %version_id, "fabric installed");
        Ok(LoaderInstallResult {
            version_id,
            minecraft_version: ctx.minecraft_version.to_string(),
            loader_version: ctx.loader_version.to_string(),
        })
    }
}

/// Deletes loader jars from earlier installs and every ASM version except the
/// pinned one, so the installer never trips over locked or conflicting files.
/// Failures are logged and ignored.
pub async fn remove_stale_libraries(libraries_dir: &Path, pinned_asm_version: &str) {
    let loader_dir = libraries_dir.join("net").join("fabricmc").join("fabric-loader");
    remove_dir_logged(&loader_dir).await;

    let asm_root = libraries_dir.join("org").join("ow2").join("asm");
    for artifact_dir in list_dirs(&asm_root).await {
        for version_dir in list_dirs(&artifact_dir).await {
            let is_pinned = version_dir
                .file_name()
                .is_some_and(|name| name == pinned_asm_version);
            if !is_pinned {
                remove_dir_logged(&version_dir).await;
            }
        }
    }
}

async fn list_dirs(root: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(root).await else {
        return dirs;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            dirs.push(entry.path());
        }
    }
    dirs
}

async fn remove_dir_logged(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => debug!(dir = %dir.display(), "removed stale libraries"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(dir = %dir.display(), error = %e, "could not remove stale libraries"),
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join(" | ")
}
