pub mod classpath;
pub mod command;
pub mod natives;
pub mod supervisor;
pub mod task;

pub use classpath::{ClasspathAssembler, ResolvedClasspath};
pub use command::{compose, LaunchInputs, DEFAULT_ASSET_INDEX};
pub use natives::{NativeBundleSet, NativeFallback, NativeLibraryExtractor};
pub use supervisor::{
    GameEvent, GameProcessHandle, GameStatus, LaunchVerdict, ProcessSupervisor, SupervisorPolicy,
};
pub use task::{spawn_game, SpawnRequest};
