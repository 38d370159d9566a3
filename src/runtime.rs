// ABOUTME: Imperative shell around the engine: periodic pollers, the single event queue, and action execution.
// ABOUTME: Every process or network call runs on its own task so the engine loop never waits on one.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use wakeup_ipc::{DisplayStatus, WakeupConfig};

use crate::DynError;
use crate::clock::SystemClock;
use crate::config::Config;
use crate::display::DisplayWriter;
use crate::engine::{Action, Engine, EngineSettings, Event};
use crate::mixer::Mixer;
use crate::persistence::StateStore;
use crate::player::PlayerController;
use crate::ramp::RampController;
use crate::schedule::ScheduleClient;
use crate::signals::SignalWatcher;

/// Executes engine actions against the real world.
pub struct Driver {
    player: Arc<PlayerController>,
    mixer: Arc<Mixer>,
    ramp: RampController,
    display: DisplayWriter,
    wakeup_config_path: PathBuf,
    events: mpsc::Sender<Event>,
}

impl Driver {
    pub fn new(config: &Config, events: mpsc::Sender<Event>) -> Self {
        let layout = config.layout();
        let player = Arc::new(PlayerController::new(&config.player, &layout.music_dir()));
        let mixer = Arc::new(Mixer::new(&config.volume));
        let ramp = RampController::new(
            player.clone(),
            mixer.clone(),
            config.volume.ramp_step_pct,
            events.clone(),
        );
        Self {
            player,
            mixer,
            ramp,
            display: DisplayWriter::new(&layout.display_file()),
            wakeup_config_path: layout.wakeup_config_file(),
            events,
        }
    }

    pub fn apply(&self, actions: Vec<Action>) {
        for action in actions {
            tracing::debug!("Action: {action:?}");
            match action {
                Action::StartPlayback {
                    session,
                    volume_pct,
                } => {
                    let player = self.player.clone();
                    let mixer = self.mixer.clone();
                    let events = self.events.clone();
                    let path = self.wakeup_config_path.clone();
                    tokio::spawn(async move {
                        if let Err(e) = mixer.set_volume(volume_pct).await {
                            tracing::warn!("Failed to set starting volume: {e}");
                        }
                        let wakeup = load_wakeup_config(&path);
                        let result = player.start(session, &wakeup).await;
                        let _ = events.send(Event::PlaybackStarted { session, result }).await;
                    });
                }
                Action::StopPlayback { session } => {
                    self.ramp.cancel(session);
                    let player = self.player.clone();
                    tokio::spawn(async move {
                        if let Err(e) = player.stop(session).await {
                            tracing::error!("{e}");
                        }
                    });
                }
                Action::BeginRamp {
                    handle,
                    start_pct,
                    end_pct,
                    duration,
                } => self.ramp.begin_ramp(handle, start_pct, end_pct, duration),
                Action::ResetVolume { percent } => {
                    let mixer = self.mixer.clone();
                    tokio::spawn(async move {
                        if let Err(e) = mixer.set_volume(percent).await {
                            tracing::warn!("Failed to reset volume to {percent}%: {e}");
                        }
                    });
                }
                Action::Display(status) => self.display.write(&status),
            }
        }
    }
}

/// Read the mode document, falling back to defaults so the alarm always has something to play.
fn load_wakeup_config(path: &Path) -> WakeupConfig {
    match WakeupConfig::load(path) {
        Ok(config) => config,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No wake-up mode file at {}, using defaults", path.display());
            WakeupConfig::default()
        }
        Err(e) => {
            tracing::warn!("Failed to read wake-up mode from {}: {e}", path.display());
            WakeupConfig::default()
        }
    }
}

/// Fetch the schedule on a fixed cadence; a slow fetch delays the next tick instead of bunching.
pub fn spawn_schedule_poller(
    client: ScheduleClient,
    interval: Duration,
    events: mpsc::Sender<Event>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let result = client.fetch().await;
            if events.send(Event::Schedule(result)).await.is_err() {
                break;
            }
        }
    })
}

/// Poll the markers on the fine cadence, then tick the engine's timers.
/// Marker scans touch the filesystem and may shell out to `rm`, so they run on the blocking pool.
pub fn spawn_signal_watcher(
    mut watcher: SignalWatcher,
    interval: Duration,
    events: mpsc::Sender<Event>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let scan = tokio::task::spawn_blocking(move || {
                let mut signals = Vec::new();
                while let Some(signal) = watcher.poll() {
                    watcher.consume(&signal);
                    signals.push(signal);
                }
                (watcher, signals)
            })
            .await;
            let signals = match scan {
                Ok((returned, signals)) => {
                    watcher = returned;
                    signals
                }
                Err(e) => {
                    tracing::error!("Signal scan failed, no longer watching markers: {e}");
                    return;
                }
            };

            for signal in signals {
                tracing::info!("Received {} signal from {}", signal.kind, signal.path.display());
                if events.send(Event::Signal(signal.kind)).await.is_err() {
                    return;
                }
            }
            if events.send(Event::SubPoll).await.is_err() {
                return;
            }
        }
    })
}

/// Run the daemon until the event queue closes.
pub async fn run(config: &Config, store: StateStore) -> Result<(), DynError> {
    let layout = config.layout();
    let client = ScheduleClient::new(&config.schedule)?;

    let mut watcher = SignalWatcher::new(&layout, &config.legacy_signal_dirs());
    watcher.clear_stale();

    let (tx, mut rx) = mpsc::channel::<Event>(32);
    let driver = Driver::new(config, tx.clone());
    let mut engine = Engine::new(
        EngineSettings::from_config(config),
        Arc::new(SystemClock),
        store,
    );
    driver.apply(vec![Action::Display(engine.display_status())]);

    let poller = spawn_schedule_poller(client, config.trigger.poll_interval(), tx.clone());
    let signals = spawn_signal_watcher(watcher, config.trigger.sub_poll_interval(), tx);
    tracing::info!(
        "Watching for wake time every {:?}, signals every {:?}",
        config.trigger.poll_interval(),
        config.trigger.sub_poll_interval()
    );

    while let Some(event) = rx.recv().await {
        let actions = engine.handle(event);
        driver.apply(actions);
    }

    poller.abort();
    signals.abort();
    Ok(())
}

/// Leave nothing sounding and no stale markers behind.
pub async fn shutdown(config: &Config) {
    let layout = config.layout();
    PlayerController::new(&config.player, &layout.music_dir())
        .stop_all()
        .await;
    DisplayWriter::new(&layout.display_file()).write(&DisplayStatus::Idle);
    SignalWatcher::new(&layout, &config.legacy_signal_dirs()).clear_stale();
    tracing::info!("Shutdown complete");
}
