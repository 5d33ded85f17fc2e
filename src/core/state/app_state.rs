use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::info;

use super::config::LauncherConfig;
use super::paths::{default_standard_game_dir, LauncherPaths};
use crate::core::downloader::Downloader;
use crate::core::error::LauncherResult;
use crate::core::http::build_http_client;
use crate::core::launch::{ClasspathAssembler, NativeLibraryExtractor, ProcessSupervisor};
use crate::core::profile::ProfileStore;
use crate::core::server::PlayersClient;
use crate::core::version::ManifestResolver;

/// Everything the launcher owns for its lifetime.
pub struct AppState {
    pub config: LauncherConfig,
    pub paths: LauncherPaths,
    pub http_client: Client,
    pub downloader: Downloader,
    pub profiles: ProfileStore,
    pub supervisor: Arc<ProcessSupervisor>,
}

impl AppState {
    /// Loads settings from `data_dir` and wires the shared services.
    pub async fn load(data_dir: PathBuf) -> LauncherResult<Self> {
        let config = LauncherConfig::load_or_default(&data_dir).await;
        Self::with_config(data_dir, config)
    }

    pub fn with_config(data_dir: PathBuf, config: LauncherConfig) -> LauncherResult<Self> {
        let standard_game_dir = config
            .standard_game_dir
            .clone()
            .or_else(default_standard_game_dir);
        let paths = LauncherPaths::new(data_dir, standard_game_dir);

        let timeout = Duration::from_millis(config.network_timeout_ms);
        let http_client = build_http_client(timeout)?;
        let downloader = Downloader::new(http_client.clone(), timeout)
            .with_concurrency(config.download_concurrency);
        let profiles = ProfileStore::new(paths.profiles_file());
        let supervisor = Arc::new(ProcessSupervisor::new(config.supervisor.clone()));

        info!(data_dir = %paths.data_dir.display(), "launcher state ready");
        Ok(Self {
            config,
            paths,
            http_client,
            downloader,
            profiles,
            supervisor,
        })
    }

    pub fn resolver(&self) -> ManifestResolver {
        ManifestResolver::new(
            self.paths.versions_dir(),
            self.paths.standard_versions_dir(),
            self.downloader.clone(),
            self.config.version_index_url.clone(),
        )
    }

    pub fn classpath_assembler(&self) -> ClasspathAssembler {
        ClasspathAssembler::new(
            self.paths.libraries_dir(),
            self.config.libraries_url.clone(),
            self.downloader.clone(),
            self.resolver(),
        )
        .with_mod_denylist(self.config.mod_denylist_fragment.clone())
    }

    pub fn native_extractor(&self) -> NativeLibraryExtractor {
        NativeLibraryExtractor::new(
            self.paths.libraries_dir(),
            self.paths.natives_dir(),
            self.config.libraries_url.clone(),
            self.downloader.clone(),
        )
        .with_fallback(self.config.native_fallback())
    }

    pub fn players_client(&self) -> PlayersClient {
        PlayersClient::new(
            self.http_client.clone(),
            self.config.server.clone(),
            Duration::from_millis(self.config.players_api_timeout_ms),
            Duration::from_millis(self.config.players_query_timeout_ms),
        )
        .with_bot(self.config.bot_entry.clone())
    }
}
