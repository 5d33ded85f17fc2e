use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the launcher backend.
/// Every module returns `Result<T, LauncherError>`.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("Artifact download failed for {url}: {reason}")]
    ArtifactDownloadFailed { url: String, reason: String },

    // ── Integrity ───────────────────────────────────────
    #[error("SHA-1 mismatch for {path:?}: expected {expected}, got {actual}")]
    Sha1Mismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    // ── Manifests ───────────────────────────────────────
    #[error("Version manifest not found: {0}")]
    ManifestNotFound(String),

    #[error("Malformed version manifest {path:?}: {source}")]
    ManifestParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Base version {0} is not installed and could not be downloaded")]
    BaseVersionUnavailable(String),

    #[error("Invalid Maven coordinate: {0}")]
    InvalidMavenCoordinate(String),

    // ── Assembly ────────────────────────────────────────
    #[error("Classpath is empty for version {0}")]
    EmptyClasspath(String),

    #[error("Client archive for version {0} could not be located")]
    ClientArchiveMissing(String),

    #[error("Native extraction failed for {path:?}: {reason}")]
    NativeExtractionFailed { path: PathBuf, reason: String },

    // ── Process ─────────────────────────────────────────
    #[error("Java runtime not found (searched install dirs, PATH and JAVA_HOME)")]
    JavaRuntimeNotFound,

    #[error("Failed to start game process {program:?}: {source}")]
    ProcessSpawnError {
        program: PathBuf,
        source: std::io::Error,
    },

    #[error("Game crashed on startup (exit code {code:?}): {diagnostic}")]
    ProcessCrashed {
        code: Option<i32>,
        diagnostic: String,
    },

    #[error("Game is already running (pid {0})")]
    GameAlreadyRunning(u32),

    // ── Profiles ────────────────────────────────────────
    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    // ── Loader ──────────────────────────────────────────
    #[error("Mod loader installation failed: {0}")]
    LoaderInstallFailed(String),

    // ── Server ──────────────────────────────────────────
    #[error("Player list unavailable: {0}")]
    PlayersUnavailable(String),

    // ── Serialization ───────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Zip extraction error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type LauncherResult<T> = Result<T, LauncherError>;

impl From<std::io::Error> for LauncherError {
    fn from(source: std::io::Error) -> Self {
        LauncherError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

impl LauncherError {
    /// Wraps an IO error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LauncherError::Io {
            path: path.into(),
            source,
        }
    }
}
