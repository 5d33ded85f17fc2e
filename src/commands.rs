// ─── Launcher Commands ───
// The operations a front end invokes. Each one borrows the shared state,
// does its work through the core services and returns a plain value.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::java;
use crate::core::launch::{compose, spawn_game, GameEvent, GameStatus, LaunchInputs, LaunchVerdict, SpawnRequest};
use crate::core::loaders::{FabricInstaller, InstallContext, LoaderInstallResult, LoaderInstaller};
use crate::core::mods::{self, ModSyncReport, ModUpdateStatus};
use crate::core::profile::Profile;
use crate::core::server::OnlinePlayers;
use crate::core::state::{AppState, LaunchSettings};
use crate::core::system;

#[derive(Debug, Clone, Serialize)]
pub struct GameOutput {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

/// Application root. Owns the state and the single launch slot.
pub struct Launcher {
    state: Arc<AppState>,
    /// Held for the whole launch pipeline so two launches cannot interleave.
    launch_lock: Mutex<()>,
    play_time_task: Mutex<Option<JoinHandle<()>>>,
}

impl Launcher {
    pub fn new(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
            launch_lock: Mutex::new(()),
            play_time_task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    // ── Profiles ────────────────────────────────────────

    pub async fn get_profiles(&self) -> LauncherResult<Vec<Profile>> {
        self.state.profiles.load_all().await
    }

    pub async fn save_profiles(&self, profiles: Vec<Profile>) -> LauncherResult<()> {
        self.state.profiles.save_all(&profiles).await?;
        info!(count = profiles.len(), "profiles saved");
        Ok(())
    }

    pub async fn delete_profile(&self, id: &str) -> LauncherResult<()> {
        self.state.profiles.delete(id).await
    }

    // ── Game ────────────────────────────────────────────

    /// Resolve, assemble, spawn and supervise one launch of `profile_id`.
    ///
    /// `settings` defaults to the persisted launch settings. On `Running`, play
    /// time is added to the profile when the game exits.
    pub async fn launch_game(
        &self,
        profile_id: &str,
        settings: Option<LaunchSettings>,
    ) -> LauncherResult<LaunchVerdict> {
        let profile = self.state.profiles.get(profile_id).await?;
        profile.validate()?;

        let _launching = self.launch_lock.lock().await;
        if let Some(active) = self.state.supervisor.active().await {
            return Err(LauncherError::GameAlreadyRunning(active.pid));
        }

        let state = &self.state;
        let config = &state.config;
        let settings = settings.unwrap_or_else(|| config.launch.clone());
        let marker = Some(config.main_class_marker.as_str()).filter(|m| !m.is_empty());

        let chain = state.resolver().resolve(&config.version_id, marker).await?;
        let classpath = state.classpath_assembler().assemble(&chain).await?;
        let natives = state.native_extractor().extract(&chain).await?;
        let java = java::find_java(config.java_path.clone())?;

        let leaf = chain.leaf();
        let version_id = leaf.dir_name();
        let assets_dir = state.paths.assets_dir();
        let quick_play_server = config.server.game_address();
        let args = compose(&LaunchInputs {
            classpath: &classpath,
            natives_dir: &natives.dir,
            main_class: chain.main_class(),
            version_id: &version_id,
            game_dir: state.paths.game_dir(),
            assets_dir: &assets_dir,
            asset_index: chain.asset_index_id(),
            profile: &profile,
            settings: &settings,
            quick_play_server: Some(quick_play_server.as_str()),
        });

        let child = spawn_game(&SpawnRequest {
            java,
            args,
            working_dir: leaf.dir.clone(),
            natives_dir: natives.dir.clone(),
        })?;

        // subscribe before supervising so a quick exit is not missed
        let events = state.supervisor.subscribe();
        let verdict = state.supervisor.supervise(child, &profile.id).await?;

        if let LaunchVerdict::Running(handle) = &verdict {
            info!(pid = handle.pid, profile = %profile.id, "game running");
            let task = spawn_play_time_accrual(self.state.clone(), events, profile.id.clone());
            *self.play_time_task.lock().await = Some(task);
        }
        Ok(verdict)
    }

    pub async fn is_game_running(&self) -> bool {
        self.state.supervisor.is_running().await
    }

    pub async fn game_status(&self) -> GameStatus {
        self.state.supervisor.status().await
    }

    /// Latest stdout and stderr lines of the running game, if there is one.
    pub async fn game_output(&self) -> Option<GameOutput> {
        let (stdout, stderr) = self.state.supervisor.recent_output().await?;
        Some(GameOutput { stdout, stderr })
    }

    /// Wait until the running game exits and its play time is stored.
    pub async fn wait_for_game(&self) {
        let task = self.play_time_task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "play time task failed");
            }
        }
    }

    // ── Installation ────────────────────────────────────

    pub async fn install_loader(&self) -> LauncherResult<LoaderInstallResult> {
        if let Some(active) = self.state.supervisor.active().await {
            return Err(LauncherError::GameAlreadyRunning(active.pid));
        }

        let state = &self.state;
        let config = &state.config;
        let java = java::find_java(config.java_path.clone())?;
        let resolver = state.resolver();
        let libraries_dir = state.paths.libraries_dir();

        let installer = FabricInstaller::new(config.installer_url.clone(), config.pinned_asm_version.clone());
        installer
            .install(InstallContext {
                minecraft_version: &config.minecraft_version,
                loader_version: &config.loader_version,
                launcher_dir: &state.paths.data_dir,
                libraries_dir: &libraries_dir,
                java: &java,
                resolver: &resolver,
                downloader: &state.downloader,
            })
            .await
    }

    /// Version directory the game launches from, so mods land where the
    /// classpath looks for them. Before the loader is installed this is the
    /// configured version's own directory.
    async fn mods_version_dir(&self) -> PathBuf {
        let config = &self.state.config;
        let marker = Some(config.main_class_marker.as_str()).filter(|m| !m.is_empty());
        match self.state.resolver().discover(&config.version_id, marker).await {
            Ok(leaf) => leaf.dir,
            Err(e) => {
                debug!(error = %e, "no launchable version yet, using configured version dir");
                self.state.paths.version_dir(&config.version_id)
            }
        }
    }

    pub async fn sync_mods(&self) -> LauncherResult<ModSyncReport> {
        let version_dir = self.mods_version_dir().await;
        mods::sync_mods(
            &self.state.downloader,
            self.state.config.mods_release_url.as_deref(),
            &version_dir,
        )
        .await
    }

    pub async fn check_mod_updates(&self) -> LauncherResult<Option<ModUpdateStatus>> {
        let version_dir = self.mods_version_dir().await;
        mods::check_mod_updates(
            &self.state.downloader,
            self.state.config.mods_release_url.as_deref(),
            &version_dir,
        )
        .await
    }

    // ── Server ──────────────────────────────────────────

    /// Current player list. When it came from the server API, stats for
    /// players that match a stored profile are copied onto it.
    pub async fn online_players(&self) -> OnlinePlayers {
        let players = self.state.players_client().online_players().await;

        let stats = players.server_stats();
        if !stats.is_empty() {
            match self.state.profiles.apply_server_stats(&stats).await {
                Ok(0) => {}
                Ok(changed) => info!(changed, "profiles updated from server stats"),
                Err(e) => warn!(error = %e, "could not store server stats"),
            }
        }
        players
    }

    // ── System ──────────────────────────────────────────

    pub async fn system_memory_gb(&self) -> LauncherResult<u64> {
        tokio::task::spawn_blocking(system::total_memory_gb)
            .await
            .map_err(|e| LauncherError::Other(format!("memory probe failed: {e}")))
    }

    /// The game directory, created if missing.
    pub async fn open_game_dir(&self) -> LauncherResult<PathBuf> {
        let dir = self.state.paths.game_dir().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| LauncherError::io(&dir, e))?;
        Ok(dir)
    }
}

fn spawn_play_time_accrual(
    state: Arc<AppState>,
    mut events: tokio::sync::broadcast::Receiver<GameEvent>,
    profile_id: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(GameEvent::Exited {
                    profile_id: exited,
                    play_time_secs,
                    ..
                }) if exited == profile_id => {
                    if let Err(e) = state.profiles.add_play_time(&profile_id, play_time_secs).await {
                        warn!(profile = %profile_id, error = %e, "could not record play time");
                    }
                    return;
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "missed game events");
                }
                Err(RecvError::Closed) => return,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::server::query::tests::full_stat_response;
    use crate::core::server::PlayersSource;
    use crate::core::state::{LauncherConfig, ServerEndpoint};
    use crate::core::test_support::{ok, scratch_dir, serve_routes, serve_with};
    use std::path::Path;
    use tokio::net::UdpSocket;

    fn launcher(name: &str) -> (PathBuf, Launcher) {
        launcher_with(name, |_, _| {})
    }

    fn launcher_with(name: &str, adjust: impl FnOnce(&Path, &mut LauncherConfig)) -> (PathBuf, Launcher) {
        let dir = scratch_dir(name);
        let mut config = LauncherConfig {
            standard_game_dir: Some(dir.join("no-standard-install")),
            ..LauncherConfig::default()
        };
        adjust(&dir, &mut config);
        let state = AppState::with_config(dir.clone(), config).unwrap();
        (dir, Launcher::new(state))
    }

    fn write(path: &Path, body: &[u8]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    fn port_of(base: &str) -> u16 {
        base.rsplit(':').next().unwrap().parse().unwrap()
    }

    fn local_server(api_port: u16, query_port: u16) -> ServerEndpoint {
        ServerEndpoint {
            host: "127.0.0.1".into(),
            game_port: 30081,
            query_port,
            api_port,
        }
    }

    fn cached_steve() -> Profile {
        let mut profile = Profile::new("Main", "Steve");
        profile.achievements = Some(7);
        profile.head_url = Some("https://mc-heads.net/avatar/0bd9fcb2a1b6c8ab6eef4a4a3e82d6c4/32".into());
        profile
    }

    /// Answers one handshake and one full stat request listing `players`.
    async fn answer_query(server: UdpSocket, players: &'static [&'static str]) {
        let mut buf = [0u8; 64];
        let (_, peer) = server.recv_from(&mut buf).await.unwrap();
        let session = u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]);
        let mut reply = vec![0x09];
        reply.extend_from_slice(&session.to_be_bytes());
        reply.extend_from_slice(b"77\x00");
        server.send_to(&reply, peer).await.unwrap();
        let (_, peer) = server.recv_from(&mut buf).await.unwrap();
        server
            .send_to(&full_stat_response(session, players.len() as u32, 10, players), peer)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn invalid_profile_never_reaches_launch() {
        let (dir, launcher) = launcher("cmd-invalid");
        let mut profile = Profile::new("Main", "Steve");
        profile.player_name = "x".repeat(17);
        let raw = serde_json::to_string(&vec![profile.clone()]).unwrap();
        std::fs::write(dir.join("profiles.json"), raw).unwrap();

        let err = launcher.launch_game(&profile.id, None).await.unwrap_err();
        assert!(matches!(err, LauncherError::InvalidProfile(_)));
        assert!(!launcher.is_game_running().await);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn missing_manifest_fails_before_spawn() {
        let (dir, launcher) = launcher("cmd-no-manifest");
        let profile = Profile::new("Main", "Steve");
        launcher.save_profiles(vec![profile.clone()]).await.unwrap();

        let err = launcher.launch_game(&profile.id, None).await.unwrap_err();
        assert!(matches!(err, LauncherError::ManifestNotFound(_)));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn profile_round_trip_through_facade() {
        let (dir, launcher) = launcher("cmd-profiles");
        let profile = Profile::new("Main", "Steve");
        launcher.save_profiles(vec![profile.clone()]).await.unwrap();
        assert_eq!(launcher.get_profiles().await.unwrap(), vec![profile.clone()]);

        launcher.delete_profile(&profile.id).await.unwrap();
        assert!(launcher.get_profiles().await.unwrap().is_empty());
        assert!(matches!(
            launcher.launch_game(&profile.id, None).await,
            Err(LauncherError::ProfileNotFound(_))
        ));

        assert_eq!(launcher.open_game_dir().await.unwrap(), dir);
        assert_eq!(launcher.sync_mods().await.unwrap(), ModSyncReport::default());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn query_fallback_leaves_cached_stats_alone() {
        let api = serve_routes(vec![("/api/players".into(), ok(r#"{ "success": false }"#))]).await;
        let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let query_port = udp.local_addr().unwrap().port();
        tokio::spawn(answer_query(udp, &["Steve"]));

        let (dir, launcher) = launcher_with("cmd-query-stats", |_, config| {
            config.server = local_server(port_of(&api), query_port);
        });
        let profile = cached_steve();
        launcher.save_profiles(vec![profile.clone()]).await.unwrap();

        let players = launcher.online_players().await;
        assert_eq!(players.source, PlayersSource::Query);
        assert!(players.players.iter().any(|p| p.name == "Steve"));

        let stored = launcher.state().profiles.get(&profile.id).await.unwrap();
        assert_eq!(stored.achievements, Some(7));
        assert_eq!(stored.head_url, profile.head_url);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn api_stats_are_stored_on_matching_profiles() {
        let body = r#"{ "success": true, "online": 1, "max": 20, "players": [
            { "name": "Steve", "uuid": "0bd9fcb2-a1b6-c8ab-6eef-4a4a3e82d6c4", "online": true,
              "achievements": 9, "serverPlayTime": 3600 }
        ] }"#;
        let api = serve_routes(vec![("/api/players".into(), ok(body))]).await;
        let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let query_port = udp.local_addr().unwrap().port();

        let (dir, launcher) = launcher_with("cmd-api-stats", |_, config| {
            config.server = local_server(port_of(&api), query_port);
        });
        let profile = cached_steve();
        launcher.save_profiles(vec![profile.clone()]).await.unwrap();

        assert_eq!(launcher.online_players().await.source, PlayersSource::Api);

        let stored = launcher.state().profiles.get(&profile.id).await.unwrap();
        assert_eq!(stored.achievements, Some(9));
        assert_eq!(stored.server_play_time, Some(3600));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn synced_mods_reach_the_installed_loader_classpath() {
        let feed = serve_with(|base| {
            let release = format!(
                r#"{{ "tag_name": "v3", "assets": [
                    {{ "name": "synced-mod.jar", "browser_download_url": "{base}/synced-mod.jar" }}
                ] }}"#
            );
            vec![("/release".into(), ok(release)), ("/synced-mod.jar".into(), ok(b"mod"))]
        })
        .await;
        let (dir, launcher) = launcher_with("cmd-mods-loader", |_, config| {
            config.mods_release_url = Some(format!("{feed}/release"));
        });

        // what the Fabric installer leaves behind with -noprofile
        let loader = dir.join("versions/fabric-loader-0.17.3-1.21.8");
        write(
            &loader.join("fabric-loader-0.17.3-1.21.8.json"),
            br#"{ "id": "fabric-loader-0.17.3-1.21.8", "inheritsFrom": "1.21.8",
                  "mainClass": "net.fabricmc.loader.impl.launch.knot.KnotClient", "libraries": [] }"#,
        );
        write(
            &dir.join("versions/1.21.8/1.21.8.json"),
            br#"{ "id": "1.21.8", "mainClass": "net.minecraft.client.main.Main", "libraries": [] }"#,
        );
        write(&dir.join("versions/1.21.8/1.21.8.jar"), b"client");

        let report = launcher.sync_mods().await.unwrap();
        assert_eq!(report.downloaded, vec!["synced-mod.jar".to_string()]);
        assert!(loader.join("mods/synced-mod.jar").is_file());
        assert_eq!(mods::installed_version(&loader).await.as_deref(), Some("v3"));

        let status = launcher.check_mod_updates().await.unwrap().unwrap();
        assert!(!status.has_update);

        let state = launcher.state();
        let chain = state
            .resolver()
            .resolve(&state.config.version_id, Some("fabricmc"))
            .await
            .unwrap();
        let classpath = state.classpath_assembler().assemble(&chain).await.unwrap();
        assert!(classpath.entries().contains(&loader.join("mods/synced-mod.jar")));
        assert_eq!(classpath.entries().last(), Some(&dir.join("versions/1.21.8/1.21.8.jar")));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn no_output_without_a_running_game() {
        let (dir, launcher) = launcher("cmd-output");
        assert!(launcher.game_output().await.is_none());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
