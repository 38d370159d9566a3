// ABOUTME: Owns the wake-up audio process: picks a backend from the mode document, launches, reaps, and kills it.
// ABOUTME: At most one playback session exists at a time; lingering backend processes are killed before each start.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};
use wakeup_ipc::{WakeupConfig, WakeupMode};

use crate::config::PlayerConfig;

/// Identity of one playback start, allocated by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Pianobar,
    Mp3,
    Fm,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Pianobar => write!(f, "pianobar"),
            Backend::Mp3 => write!(f, "mp3"),
            Backend::Fm => write!(f, "fm"),
        }
    }
}

/// What callers hold to refer to a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionHandle {
    pub id: SessionId,
    pub backend: Backend,
}

#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("failed to start {backend} backend ({command}): {source}")]
    Spawn {
        backend: Backend,
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to stop session {id}: {source}")]
    Kill {
        id: SessionId,
        #[source]
        source: std::io::Error,
    },
}

struct PlaybackSession {
    id: SessionId,
    backend: Backend,
    child: Child,
    current_volume: Option<u8>,
    start_time: Instant,
}

impl PlaybackSession {
    fn handle(&self) -> SessionHandle {
        SessionHandle {
            id: self.id,
            backend: self.backend,
        }
    }
}

/// The resolved command line for a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub backend: Backend,
    pub command: String,
    pub args: Vec<String>,
}

/// Choose the backend for `wakeup`, falling back to pianobar when the requested one is unusable.
pub fn select_backend(config: &PlayerConfig, music_dir: &Path, wakeup: &WakeupConfig) -> LaunchPlan {
    match wakeup.mode {
        WakeupMode::Mp3 => match &wakeup.mp3_track {
            Some(track) if music_dir.join(track).is_file() => {
                let path = music_dir.join(track).to_string_lossy().to_string();
                return LaunchPlan {
                    backend: Backend::Mp3,
                    command: config.mp3.command.clone(),
                    args: config.mp3.resolved_args(&[("track", &path)]),
                };
            }
            Some(track) => {
                tracing::warn!("MP3 track {track} not found in {}, using pianobar", music_dir.display())
            }
            None => tracing::warn!("MP3 mode without a selected track, using pianobar"),
        },
        WakeupMode::Fm => match &config.fm {
            Some(fm) => {
                return LaunchPlan {
                    backend: Backend::Fm,
                    command: fm.command.clone(),
                    args: fm.resolved_args(&[("station", &wakeup.fm_station)]),
                };
            }
            None => tracing::warn!("FM mode has no receiver command configured, using pianobar"),
        },
        WakeupMode::Pianobar => {}
    }

    LaunchPlan {
        backend: Backend::Pianobar,
        command: config.pianobar.command.clone(),
        args: config.pianobar.args.clone(),
    }
}

pub struct PlayerController {
    config: PlayerConfig,
    music_dir: PathBuf,
    current: tokio::sync::Mutex<Option<PlaybackSession>>,
}

impl PlayerController {
    pub fn new(config: &PlayerConfig, music_dir: &Path) -> Self {
        Self {
            config: config.clone(),
            music_dir: music_dir.to_path_buf(),
            current: tokio::sync::Mutex::new(None),
        }
    }

    /// Launch a fresh session, replacing whatever was playing.
    pub async fn start(
        &self,
        id: SessionId,
        wakeup: &WakeupConfig,
    ) -> Result<SessionHandle, PlayerError> {
        let mut current = self.current.lock().await;
        if let Some(old) = current.take() {
            tracing::info!("Replacing playback session {}", old.id);
            if let Err(e) = kill_session(old).await {
                tracing::warn!("{e}");
            }
        }
        self.kill_lingering().await;
        tokio::time::sleep(Duration::from_millis(self.config.settle_ms)).await;

        let plan = select_backend(&self.config, &self.music_dir, wakeup);
        tracing::info!(
            "Starting {} backend for session {id}: {} {}",
            plan.backend,
            plan.command,
            plan.args.join(" ")
        );

        let child = Command::new(&plan.command)
            .args(&plan.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PlayerError::Spawn {
                backend: plan.backend,
                command: plan.command.clone(),
                source,
            })?;

        let session = PlaybackSession {
            id,
            backend: plan.backend,
            child,
            current_volume: None,
            start_time: Instant::now(),
        };
        let handle = session.handle();
        *current = Some(session);
        Ok(handle)
    }

    /// Stop session `id`. Stopping a session that is already gone is a no-op.
    pub async fn stop(&self, id: SessionId) -> Result<(), PlayerError> {
        let mut current = self.current.lock().await;
        match current.take() {
            Some(session) if session.id == id => {
                tracing::info!(
                    "Stopping session {} after {:?} (volume {:?})",
                    session.id,
                    session.start_time.elapsed(),
                    session.current_volume
                );
                kill_session(session).await
            }
            other => {
                *current = other;
                tracing::debug!("Session {id} already stopped");
                Ok(())
            }
        }
    }

    /// Whether the session's process is still running. An exited process ends the session.
    pub async fn is_alive(&self, handle: &SessionHandle) -> bool {
        let mut current = self.current.lock().await;
        let Some(session) = current.as_mut().filter(|s| s.id == handle.id) else {
            return false;
        };
        match session.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                tracing::warn!("{} backend for session {} exited: {status}", session.backend, session.id);
                *current = None;
                false
            }
            Err(e) => {
                tracing::warn!("Failed to poll session {}: {e}", session.id);
                false
            }
        }
    }

    /// Remember the volume last applied to the session.
    pub async fn record_volume(&self, handle: &SessionHandle, percent: u8) {
        if let Some(session) = self.current.lock().await.as_mut() {
            if session.id == handle.id {
                session.current_volume = Some(percent);
            }
        }
    }

    /// Stop our own session and any backend processes left by others.
    pub async fn stop_all(&self) {
        if let Some(session) = self.current.lock().await.take() {
            if let Err(e) = kill_session(session).await {
                tracing::warn!("{e}");
            }
        }
        self.kill_lingering().await;
    }

    async fn kill_lingering(&self) {
        for name in &self.config.cleanup_processes {
            let status = Command::new("pkill")
                .args(["-9", "-x", name])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            match status {
                Ok(status) if status.success() => tracing::info!("Killed lingering {name} processes"),
                // pkill exits 1 when nothing matched
                Ok(_) => {}
                Err(e) => tracing::warn!("Failed to run pkill for {name}: {e}"),
            }
        }
    }
}

async fn kill_session(mut session: PlaybackSession) -> Result<(), PlayerError> {
    session
        .child
        .kill()
        .await
        .map_err(|source| PlayerError::Kill {
            id: session.id,
            source,
        })
}
