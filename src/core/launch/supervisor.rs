// ─── Process Supervisor ───
// Watches a freshly spawned game process for an observation window and
// decides whether it started or crashed. A started game is then handed to a
// background watcher that reports its exit.

use std::collections::VecDeque;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::core::error::{LauncherError, LauncherResult};

/// Timing and diagnostic knobs for crash detection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SupervisorPolicy {
    pub observation_window_ms: u64,
    pub liveness_interval_ms: u64,
    /// Second, shorter check after the window for processes that die late.
    pub confirmation_grace_ms: u64,
    /// How long to wait for the pipes to flush after an exit.
    pub output_drain_ms: u64,
    /// Matched case-sensitively against each output line.
    pub failure_keywords: Vec<String>,
    pub max_keyword_lines: usize,
    pub fallback_tail_lines: usize,
    pub preview_chars: usize,
    pub retained_tail_lines: usize,
}

impl Default for SupervisorPolicy {
    fn default() -> Self {
        Self {
            observation_window_ms: 5_000,
            liveness_interval_ms: 500,
            confirmation_grace_ms: 1_000,
            output_drain_ms: 500,
            failure_keywords: ["Error", "Exception", "Failed", "Could not", "ClassNotFoundException"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_keyword_lines: 3,
            fallback_tail_lines: 5,
            preview_chars: 500,
            retained_tail_lines: 20,
        }
    }
}

impl SupervisorPolicy {
    fn observation_window(&self) -> Duration {
        Duration::from_millis(self.observation_window_ms)
    }

    fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_interval_ms.max(1))
    }

    fn confirmation_grace(&self) -> Duration {
        Duration::from_millis(self.confirmation_grace_ms)
    }

    fn output_drain(&self) -> Duration {
        Duration::from_millis(self.output_drain_ms)
    }
}

/// A game process that survived its observation window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameProcessHandle {
    pub pid: u32,
    pub profile_id: String,
    pub started_at: DateTime<Utc>,
}

impl GameProcessHandle {
    pub fn play_time_secs(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }
}

#[derive(Debug)]
pub enum LaunchVerdict {
    Running(GameProcessHandle),
    /// Exited with code zero inside the window.
    ExitedCleanly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    Exited {
        profile_id: String,
        play_time_secs: u64,
        code: Option<i32>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStatus {
    pub running: bool,
    pub pid: Option<u32>,
    pub profile_id: Option<String>,
    pub play_time_secs: u64,
}

// ─── Output capture ───

/// Captured lines of one stream. Unbounded until a verdict is reached.
#[derive(Debug, Default)]
struct OutputBuffer {
    lines: VecDeque<String>,
    limit: Option<usize>,
}

impl OutputBuffer {
    fn push(&mut self, line: String) {
        self.lines.push_back(line);
        self.trim();
    }

    fn retain_last(&mut self, limit: usize) {
        self.limit = Some(limit);
        self.trim();
    }

    fn trim(&mut self) {
        if let Some(limit) = self.limit {
            while self.lines.len() > limit {
                self.lines.pop_front();
            }
        }
    }

    fn snapshot(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }
}

type SharedBuffer = Arc<Mutex<OutputBuffer>>;

#[derive(Clone, Default)]
struct CapturedOutput {
    stdout: SharedBuffer,
    stderr: SharedBuffer,
}

impl CapturedOutput {
    async fn retain_last(&self, limit: usize) {
        self.stdout.lock().await.retain_last(limit);
        self.stderr.lock().await.retain_last(limit);
    }
}

fn spawn_reader<R>(
    stream: Option<R>,
    buffer: SharedBuffer,
    profile_id: String,
    stream_name: &'static str,
) -> Option<JoinHandle<()>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let stream = stream?;
    Some(tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    debug!("[mc:{profile_id}] {stream_name}: {line}");
                    buffer.lock().await.push(line);
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(profile = %profile_id, stream = stream_name, error = %e, "stopped reading game output");
                    break;
                }
            }
        }
    }))
}

// ─── Supervisor ───

struct ActiveGame {
    handle: GameProcessHandle,
    output: CapturedOutput,
}

/// Owns the single active game slot of the launcher.
pub struct ProcessSupervisor {
    policy: SupervisorPolicy,
    active: Arc<Mutex<Option<ActiveGame>>>,
    events: broadcast::Sender<GameEvent>,
}

impl ProcessSupervisor {
    pub fn new(policy: SupervisorPolicy) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            policy,
            active: Arc::new(Mutex::new(None)),
            events,
        }
    }

    pub fn policy(&self) -> &SupervisorPolicy {
        &self.policy
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.events.subscribe()
    }

    pub async fn active(&self) -> Option<GameProcessHandle> {
        self.active.lock().await.as_ref().map(|game| game.handle.clone())
    }

    pub async fn is_running(&self) -> bool {
        self.active.lock().await.is_some()
    }

    pub async fn status(&self) -> GameStatus {
        match self.active().await {
            Some(handle) => GameStatus {
                running: true,
                pid: Some(handle.pid),
                play_time_secs: handle.play_time_secs(),
                profile_id: Some(handle.profile_id),
            },
            None => GameStatus::default(),
        }
    }

    /// Most recent stdout and stderr lines of the running game.
    pub async fn recent_output(&self) -> Option<(Vec<String>, Vec<String>)> {
        let active = self.active.lock().await;
        let game = active.as_ref()?;
        let stdout = game.output.stdout.lock().await.snapshot();
        let stderr = game.output.stderr.lock().await.snapshot();
        Some((stdout, stderr))
    }

    /// Classify a just-spawned process.
    ///
    /// Returns `Running` when the process outlives the observation window and
    /// the confirmation grace, `ExitedCleanly` when it exits with code zero
    /// inside them, and `ProcessCrashed` for any other exit.
    pub async fn supervise(
        &self,
        mut child: Child,
        profile_id: &str,
    ) -> LauncherResult<LaunchVerdict> {
        let pid = child.id().unwrap_or_default();
        let output = CapturedOutput::default();
        let readers: Vec<JoinHandle<()>> = [
            spawn_reader(child.stdout.take(), output.stdout.clone(), profile_id.to_string(), "stdout"),
            spawn_reader(child.stderr.take(), output.stderr.clone(), profile_id.to_string(), "stderr"),
        ]
        .into_iter()
        .flatten()
        .collect();

        let mut exit = watch_for_exit(&mut child, self.policy.observation_window(), self.policy.liveness_interval()).await?;
        if exit.is_none() {
            exit = watch_for_exit(&mut child, self.policy.confirmation_grace(), self.policy.liveness_interval()).await?;
        }

        if let Some(status) = exit {
            self.drain(readers).await;
            return self.classify_exit(status, &output).await;
        }

        output.retain_last(self.policy.retained_tail_lines).await;
        let handle = GameProcessHandle {
            pid,
            profile_id: profile_id.to_string(),
            started_at: Utc::now(),
        };
        *self.active.lock().await = Some(ActiveGame {
            handle: handle.clone(),
            output,
        });
        info!(pid, profile = profile_id, "game confirmed running");

        self.spawn_exit_watcher(child, handle.clone());
        Ok(LaunchVerdict::Running(handle))
    }

    async fn classify_exit(
        &self,
        status: ExitStatus,
        output: &CapturedOutput,
    ) -> LauncherResult<LaunchVerdict> {
        if status.success() {
            info!("game exited cleanly during observation window");
            return Ok(LaunchVerdict::ExitedCleanly);
        }

        let stderr = output.stderr.lock().await.snapshot();
        let stdout = output.stdout.lock().await.snapshot();
        let diagnostic = extract_diagnostic(&stderr, &stdout, &self.policy);
        warn!(code = ?status.code(), %diagnostic, "game crashed on startup");

        Err(LauncherError::ProcessCrashed {
            code: status.code(),
            diagnostic,
        })
    }

    async fn drain(&self, readers: Vec<JoinHandle<()>>) {
        let limit = self.policy.output_drain();
        for reader in readers {
            if tokio::time::timeout(limit, reader).await.is_err() {
                debug!("game output still open after exit, not waiting further");
            }
        }
    }

    fn spawn_exit_watcher(&self, mut child: Child, handle: GameProcessHandle) {
        let active = self.active.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!(pid = handle.pid, error = %e, "lost track of game process");
                    None
                }
            };
            let play_time_secs = handle.play_time_secs();

            {
                let mut slot = active.lock().await;
                if slot.as_ref().map(|game| game.handle.pid) == Some(handle.pid) {
                    *slot = None;
                }
            }

            info!(pid = handle.pid, ?code, play_time_secs, "game exited");
            // no subscribers is fine
            let _ = events.send(GameEvent::Exited {
                profile_id: handle.profile_id,
                play_time_secs,
                code,
            });
        });
    }
}

/// Polls the child until it exits or `window` elapses.
async fn watch_for_exit(
    child: &mut Child,
    window: Duration,
    interval: Duration,
) -> LauncherResult<Option<ExitStatus>> {
    let deadline = tokio::time::sleep(window);
    tokio::pin!(deadline);
    let mut probe = tokio::time::interval(interval);
    probe.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut deadline => return Ok(child.try_wait()?),
            _ = probe.tick() => {
                if let Some(status) = child.try_wait()? {
                    return Ok(Some(status));
                }
            }
        }
    }
}

/// Best-effort crash summary: the first keyword lines of stderr (stdout when
/// stderr is empty), else the last lines, truncated to the preview length.
pub fn extract_diagnostic(stderr: &[String], stdout: &[String], policy: &SupervisorPolicy) -> String {
    let has_text = |lines: &[String]| lines.iter().any(|l| !l.trim().is_empty());
    let source = if has_text(stderr) { stderr } else { stdout };

    let keyword_lines: Vec<&str> = source
        .iter()
        .map(|l| l.trim())
        .filter(|l| policy.failure_keywords.iter().any(|k| l.contains(k.as_str())))
        .take(policy.max_keyword_lines)
        .collect();

    let summary = if keyword_lines.is_empty() {
        let tail: Vec<&str> = source
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect();
        let start = tail.len().saturating_sub(policy.fallback_tail_lines);
        tail[start..].join(" | ")
    } else {
        keyword_lines.join(" | ")
    };

    if summary.is_empty() {
        return "no output captured".to_string();
    }
    truncate_chars(&summary, policy.preview_chars)
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn diagnostic_prefers_first_keyword_lines() {
        let policy = SupervisorPolicy::default();
        let stderr = lines(&[
            "Loading mods",
            "Exception in thread \"main\" java.lang.RuntimeException",
            "  at Foo.bar",
            "Caused by: ClassNotFoundException: net.Foo",
            "Error: could not start",
            "Failed to bootstrap",
        ]);
        let text = extract_diagnostic(&stderr, &[], &policy);
        assert_eq!(
            text,
            "Exception in thread \"main\" java.lang.RuntimeException | Caused by: ClassNotFoundException: net.Foo | Error: could not start"
        );
    }

    #[test]
    fn diagnostic_falls_back_to_tail_then_stdout() {
        let policy = SupervisorPolicy::default();
        let stderr = lines(&["a", "b", "c", "d", "e", "f", "g"]);
        assert_eq!(extract_diagnostic(&stderr, &[], &policy), "c | d | e | f | g");

        let stdout = lines(&["booting", "Could not reserve heap"]);
        assert_eq!(extract_diagnostic(&lines(&["", " "]), &stdout, &policy), "Could not reserve heap");
        assert_eq!(extract_diagnostic(&[], &[], &policy), "no output captured");
    }

    #[test]
    fn diagnostic_is_truncated_on_char_boundary() {
        let policy = SupervisorPolicy {
            preview_chars: 4,
            ..SupervisorPolicy::default()
        };
        let stderr = lines(&["Errör ünicode"]);
        assert_eq!(extract_diagnostic(&stderr, &[], &policy), "Errö...");
    }

    #[test]
    fn buffer_keeps_last_lines_after_limit() {
        let mut buffer = OutputBuffer::default();
        for i in 0..10 {
            buffer.push(i.to_string());
        }
        assert_eq!(buffer.snapshot().len(), 10);
        buffer.retain_last(3);
        buffer.push("10".into());
        assert_eq!(buffer.snapshot(), lines(&["8", "9", "10"]));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::process::Stdio;
        use tokio::process::Command;

        fn fast_policy() -> SupervisorPolicy {
            SupervisorPolicy {
                observation_window_ms: 400,
                liveness_interval_ms: 20,
                confirmation_grace_ms: 100,
                output_drain_ms: 500,
                ..SupervisorPolicy::default()
            }
        }

        fn sh(script: &str) -> Child {
            Command::new("sh")
                .arg("-c")
                .arg(script)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .unwrap()
        }

        #[tokio::test]
        async fn early_nonzero_exit_is_a_crash_with_diagnostic() {
            let supervisor = ProcessSupervisor::new(fast_policy());
            let child = sh("echo 'starting'; echo 'Exception: boom' >&2; exit 3");

            let err = supervisor.supervise(child, "p1").await.unwrap_err();
            match err {
                LauncherError::ProcessCrashed { code, diagnostic } => {
                    assert_eq!(code, Some(3));
                    assert_eq!(diagnostic, "Exception: boom");
                }
                other => panic!("unexpected error: {other}"),
            }
            assert!(!supervisor.is_running().await);
        }

        #[tokio::test]
        async fn clean_exit_is_never_a_failure() {
            let supervisor = ProcessSupervisor::new(fast_policy());
            let child = sh("echo 'Error: harmless warning' >&2; exit 0");

            let verdict = supervisor.supervise(child, "p1").await.unwrap();
            assert!(matches!(verdict, LaunchVerdict::ExitedCleanly));
            assert!(!supervisor.is_running().await);
        }

        #[tokio::test]
        async fn surviving_process_is_running_and_reports_exit() {
            let supervisor = ProcessSupervisor::new(fast_policy());
            let mut events = supervisor.subscribe();
            let child = sh("echo hello; sleep 1; exit 0");

            let verdict = supervisor.supervise(child, "p1").await.unwrap();
            let LaunchVerdict::Running(handle) = verdict else {
                panic!("expected running verdict");
            };
            assert_eq!(handle.profile_id, "p1");

            let status = supervisor.status().await;
            assert!(status.running);
            assert_eq!(status.pid, Some(handle.pid));
            let (stdout, _) = supervisor.recent_output().await.unwrap();
            assert_eq!(stdout, lines(&["hello"]));

            let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
                .await
                .unwrap()
                .unwrap();
            let GameEvent::Exited { profile_id, code, .. } = event;
            assert_eq!(profile_id, "p1");
            assert_eq!(code, Some(0));
            assert!(!supervisor.is_running().await);
            assert_eq!(supervisor.status().await, GameStatus::default());
        }
    }
}
