// ABOUTME: Raises the volume in even steps while a playback session is alive, on its own task.
// ABOUTME: Only one ramp runs at a time; a new ramp or a stop for its session cancels it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::engine::Event;
use crate::mixer::Mixer;
use crate::player::{PlayerController, SessionHandle, SessionId};

/// Volume levels visited from `start` to `end` inclusive.
pub fn ramp_steps(start: u8, end: u8, step: u8) -> Vec<u8> {
    if start >= end {
        return vec![end];
    }
    let mut steps: Vec<u8> = (start..=end).step_by(step.max(1) as usize).collect();
    if steps.last() != Some(&end) {
        steps.push(end);
    }
    steps
}

/// Pause between consecutive steps so the whole ramp spans `duration`.
fn step_gap(duration: Duration, count: usize) -> Duration {
    if count <= 1 {
        return Duration::ZERO;
    }
    duration / (count as u32 - 1)
}

pub struct RampController {
    player: Arc<PlayerController>,
    mixer: Arc<Mixer>,
    step_pct: u8,
    events: mpsc::Sender<Event>,
    current: Mutex<Option<(SessionId, JoinHandle<()>)>>,
}

impl RampController {
    pub fn new(
        player: Arc<PlayerController>,
        mixer: Arc<Mixer>,
        step_pct: u8,
        events: mpsc::Sender<Event>,
    ) -> Self {
        Self {
            player,
            mixer,
            step_pct,
            events,
            current: Mutex::new(None),
        }
    }

    pub fn begin_ramp(&self, handle: SessionHandle, start_pct: u8, end_pct: u8, duration: Duration) {
        let steps = ramp_steps(start_pct, end_pct, self.step_pct);
        let gap = step_gap(duration, steps.len());
        tracing::info!(
            "Ramping volume {start_pct}% -> {end_pct}% over {duration:?} for session {}",
            handle.id
        );

        let task = tokio::spawn(run_ramp(
            handle,
            steps,
            gap,
            self.player.clone(),
            self.mixer.clone(),
            self.events.clone(),
        ));
        if let Some((previous, task)) = self.current.lock().unwrap().replace((handle.id, task)) {
            tracing::debug!("Cancelling ramp for session {previous}");
            task.abort();
        }
    }

    /// Cancel the running ramp if it belongs to `session`.
    pub fn cancel(&self, session: SessionId) {
        let mut current = self.current.lock().unwrap();
        if current.as_ref().is_some_and(|(id, _)| *id == session) {
            if let Some((_, task)) = current.take() {
                task.abort();
            }
        }
    }
}

async fn run_ramp(
    handle: SessionHandle,
    steps: Vec<u8>,
    gap: Duration,
    player: Arc<PlayerController>,
    mixer: Arc<Mixer>,
    events: mpsc::Sender<Event>,
) {
    let mut applied = None;
    for (i, percent) in steps.into_iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(gap).await;
        }
        if !player.is_alive(&handle).await {
            tracing::debug!("Session {} ended, ramp stops at {applied:?}", handle.id);
            return;
        }
        match mixer.set_volume(percent).await {
            Ok(()) => {
                player.record_volume(&handle, percent).await;
                applied = Some(percent);
            }
            Err(e) => tracing::warn!("Volume step to {percent}% failed: {e}"),
        }
    }

    if let Some(percent) = applied {
        let _ = events
            .send(Event::RampFinished {
                session: handle.id,
                percent,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use wakeup_ipc::WakeupConfig;

    use crate::config::{CommandConfig, PlayerConfig, VolumeConfig};

    use super::*;

    #[test]
    fn ramp_steps_cover_both_ends() {
        let steps = ramp_steps(60, 100, 2);
        assert_eq!(steps.len(), 21);
        assert_eq!(steps.first(), Some(&60));
        assert_eq!(steps.last(), Some(&100));
        assert!(steps.windows(2).all(|w| w[1] - w[0] == 2));
    }

    #[test]
    fn ramp_steps_finish_on_end_when_step_does_not_divide() {
        assert_eq!(ramp_steps(60, 100, 15), vec![60, 75, 90, 100]);
    }

    #[test]
    fn ramp_steps_degenerate_inputs() {
        assert_eq!(ramp_steps(100, 60, 2), vec![60]);
        assert_eq!(ramp_steps(80, 80, 2), vec![80]);
        assert_eq!(ramp_steps(1, 3, 0), vec![1, 2, 3]);
    }

    #[test]
    fn step_gap_spreads_duration() {
        assert_eq!(step_gap(Duration::from_secs(10), 21), Duration::from_millis(500));
        assert_eq!(step_gap(Duration::from_secs(10), 1), Duration::ZERO);
    }

    struct Rig {
        player: Arc<PlayerController>,
        ramp: RampController,
        rx: mpsc::Receiver<Event>,
        log: std::path::PathBuf,
        _dir: tempfile::TempDir,
    }

    fn rig() -> Rig {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("volumes");
        let script = format!("printf '%s\\n' \"$0\" >> {}", log.display());
        let mixer = Arc::new(Mixer::new(&VolumeConfig {
            mixer: CommandConfig::new("sh", &["-c", &script, "{percent}"]),
            ..VolumeConfig::default()
        }));
        let player = Arc::new(PlayerController::new(
            &PlayerConfig {
                pianobar: CommandConfig::new("sleep", &["30"]),
                cleanup_processes: Vec::new(),
                settle_ms: 0,
                ..PlayerConfig::default()
            },
            Path::new("/nonexistent"),
        ));
        let (tx, rx) = mpsc::channel(8);
        let ramp = RampController::new(player.clone(), mixer, 2, tx);
        Rig {
            player,
            ramp,
            rx,
            log,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn ramp_applies_each_step_and_reports_finish() {
        let mut rig = rig();
        let handle = rig
            .player
            .start(SessionId(1), &WakeupConfig::default())
            .await
            .unwrap();

        rig.ramp.begin_ramp(handle, 60, 64, Duration::from_millis(40));
        let event = tokio::time::timeout(Duration::from_secs(5), rig.rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            event,
            Event::RampFinished {
                session: SessionId(1),
                percent: 64
            }
        ));
        assert_eq!(std::fs::read_to_string(&rig.log).unwrap(), "60\n62\n64\n");
        rig.player.stop_all().await;
    }

    #[tokio::test]
    async fn ramp_ends_silently_when_session_is_gone() {
        let mut rig = rig();
        let handle = rig
            .player
            .start(SessionId(1), &WakeupConfig::default())
            .await
            .unwrap();
        rig.player.stop(handle.id).await.unwrap();

        rig.ramp.begin_ramp(handle, 60, 64, Duration::from_millis(40));
        let waited = tokio::time::timeout(Duration::from_millis(300), rig.rx.recv()).await;
        assert!(waited.is_err() || waited.unwrap().is_none());
        assert!(!rig.log.exists());
    }

    #[tokio::test]
    async fn cancel_only_stops_matching_session() {
        let mut rig = rig();
        let handle = rig
            .player
            .start(SessionId(2), &WakeupConfig::default())
            .await
            .unwrap();

        rig.ramp.begin_ramp(handle, 60, 64, Duration::from_millis(40));
        rig.ramp.cancel(SessionId(1));
        let event = tokio::time::timeout(Duration::from_secs(5), rig.rx.recv()).await;
        assert!(matches!(event, Ok(Some(Event::RampFinished { .. }))));

        rig.ramp.begin_ramp(handle, 60, 64, Duration::from_secs(2));
        rig.ramp.cancel(SessionId(2));
        let waited = tokio::time::timeout(Duration::from_millis(300), rig.rx.recv()).await;
        assert!(waited.is_err());
        rig.player.stop_all().await;
    }
}
