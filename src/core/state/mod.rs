pub mod app_state;
pub mod config;
pub mod paths;

pub use app_state::AppState;
pub use config::{BotEntry, LaunchSettings, LauncherConfig, ServerEndpoint};
pub use paths::LauncherPaths;
