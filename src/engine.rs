// ABOUTME: The alarm trigger engine: decides when to fire, snooze, stop, and reset from events and the clock.
// ABOUTME: Synchronous and side-effect free apart from persisting state; everything external is returned as actions.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta, Timelike};
use wakeup_ipc::DisplayStatus;

use crate::clock::Clock;
use crate::config::Config;
use crate::persistence::{AlarmState, StateStore};
use crate::player::{PlayerError, SessionHandle, SessionId};
use crate::schedule::{FetchError, WakeSchedule};
use crate::signals::SignalKind;
use crate::state::{Phase, Transition};

/// Everything the engine reacts to, delivered through a single queue.
#[derive(Debug)]
pub enum Event {
    Schedule(Result<WakeSchedule, FetchError>),
    Signal(SignalKind),
    SubPoll,
    PlaybackStarted {
        session: SessionId,
        result: Result<SessionHandle, PlayerError>,
    },
    RampFinished {
        session: SessionId,
        percent: u8,
    },
}

/// External work the engine asks the driver to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Set the starting volume, then launch the configured backend.
    StartPlayback { session: SessionId, volume_pct: u8 },
    StopPlayback { session: SessionId },
    BeginRamp {
        handle: SessionHandle,
        start_pct: u8,
        end_pct: u8,
        duration: Duration,
    },
    ResetVolume { percent: u8 },
    Display(DisplayStatus),
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub window: TimeDelta,
    pub snooze: TimeDelta,
    pub alarm_ceiling: TimeDelta,
    pub ramp_start_pct: u8,
    pub ramp_end_pct: u8,
    pub ramp_duration: Duration,
    pub baseline_pct: u8,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            window: TimeDelta::seconds(config.trigger.window_secs as i64),
            snooze: config.trigger.snooze(),
            alarm_ceiling: TimeDelta::minutes(config.trigger.alarm_duration_minutes as i64),
            ramp_start_pct: config.volume.ramp_start_pct,
            ramp_end_pct: config.volume.ramp_end_pct,
            ramp_duration: config.volume.ramp_duration(),
            baseline_pct: config.volume.baseline_pct,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// The playback the engine currently expects to be sounding.
struct Session {
    id: SessionId,
    handle: Option<SessionHandle>,
}

pub struct Engine {
    settings: EngineSettings,
    clock: Arc<dyn Clock>,
    store: StateStore,
    alarm: AlarmState,
    phase: Phase,
    schedule: Option<WakeSchedule>,
    fetch_failures: u32,
    next_session: u64,
    session: Option<Session>,
    /// First trigger of the current alarm; snooze re-fires keep it.
    alarm_started: Option<NaiveDateTime>,
    missed_warned: Option<NaiveDate>,
}

impl Engine {
    /// Build the engine from persisted state, settling anything a crash left behind.
    pub fn new(settings: EngineSettings, clock: Arc<dyn Clock>, store: StateStore) -> Self {
        let mut alarm = store.load();
        let now = clock.now();
        let today = now.date();
        let before = alarm.clone();

        let phase = match alarm.snooze_until {
            // A snooze that ran out while we were down only resumes within the trigger window
            Some(until) if until > now || now - until <= settings.window => {
                alarm.is_active = false;
                tracing::info!("Resuming snooze until {}", until.format("%H:%M:%S"));
                Phase::Snoozed
            }
            _ => {
                alarm.snooze_until = None;
                if alarm.last_triggered_date == Some(today) {
                    if alarm.is_active {
                        tracing::warn!(
                            "Alarm was sounding when the daemon stopped; not restarting it today"
                        );
                        alarm.is_active = false;
                    }
                    Phase::StoppedToday
                } else {
                    alarm.is_active = false;
                    Phase::Idle
                }
            }
        };
        if alarm.snooze_until.is_none() && before.snooze_until.is_some() {
            tracing::info!("Dropping snooze that expired while the daemon was down");
        }

        let engine = Self {
            settings,
            clock,
            store,
            alarm,
            phase,
            schedule: None,
            fetch_failures: 0,
            next_session: 1,
            session: None,
            alarm_started: None,
            missed_warned: None,
        };
        if engine.alarm != before {
            engine.persist();
        }
        eprintln!("STATE: {phase}");
        engine
    }

    /// What the external display should show for the current phase.
    pub fn display_status(&self) -> DisplayStatus {
        match (self.phase, self.alarm.snooze_until) {
            (Phase::Triggered, _) => DisplayStatus::Wake,
            (Phase::Snoozed, Some(until)) => DisplayStatus::Snoozed {
                hour: until.hour(),
                minute: until.minute(),
            },
            _ => DisplayStatus::Idle,
        }
    }

    pub fn handle(&mut self, event: Event) -> Vec<Action> {
        match event {
            Event::Schedule(result) => self.on_schedule(result),
            Event::Signal(kind) => self.on_signal(kind),
            Event::SubPoll => self.on_sub_poll(),
            Event::PlaybackStarted { session, result } => self.on_playback_started(session, result),
            Event::RampFinished { session, percent } => {
                tracing::info!("Volume ramp for session {session} finished at {percent}%");
                Vec::new()
            }
        }
    }

    fn on_schedule(&mut self, result: Result<WakeSchedule, FetchError>) -> Vec<Action> {
        match result {
            Ok(schedule) => {
                if self.fetch_failures > 0 {
                    tracing::info!(
                        "Schedule service reachable again after {} failed polls",
                        self.fetch_failures
                    );
                    self.fetch_failures = 0;
                }
                if self.schedule != Some(schedule) {
                    if schedule.enabled {
                        tracing::info!("Wake time set to {}", schedule.time_of_day);
                    } else {
                        tracing::info!("Wake alarm disabled");
                    }
                }
                self.schedule = Some(schedule);
            }
            Err(e) => {
                self.fetch_failures += 1;
                tracing::warn!(
                    "Schedule fetch failed ({} in a row), keeping last known schedule: {e}",
                    self.fetch_failures
                );
                return Vec::new();
            }
        }

        let now = self.clock.now();
        self.check_rollover(now);
        if self.phase == Phase::Idle {
            return self.check_window(now);
        }
        Vec::new()
    }

    fn check_rollover(&mut self, now: NaiveDateTime) {
        let Some(date) = self.alarm.last_triggered_date else {
            return;
        };
        if date == now.date() {
            return;
        }
        let Some(next) = self.phase.transition(&Transition::DayRolledOver) else {
            tracing::debug!("New day, but alarm is still {}; keeping {date}", self.phase);
            return;
        };
        tracing::info!("New day, clearing trigger date {date}");
        self.alarm.last_triggered_date = None;
        self.persist();
        self.set_phase(next);
    }

    fn check_window(&mut self, now: NaiveDateTime) -> Vec<Action> {
        let Some(schedule) = self.schedule.filter(|s| s.enabled) else {
            return Vec::new();
        };
        let today = now.date();
        if self.alarm.last_triggered_date == Some(today) {
            return Vec::new();
        }

        let delta = schedule.on(today) - now;
        if delta > TimeDelta::zero() {
            return Vec::new();
        }
        if delta < -self.settings.window {
            if self.missed_warned != Some(today) {
                tracing::warn!(
                    "Missed today's wake time {} by {}s (window is {}s); not firing",
                    schedule.time_of_day,
                    -delta.num_seconds(),
                    self.settings.window.num_seconds()
                );
                self.missed_warned = Some(today);
            }
            return Vec::new();
        }

        let Some(armed) = self.phase.transition(&Transition::WindowOpened) else {
            return Vec::new();
        };
        tracing::info!("Wake time {} reached", schedule.time_of_day);
        self.set_phase(armed);
        self.alarm.last_triggered_date = Some(today);
        self.fire(now)
    }

    /// Armed -> Triggered: persist first, then ask for audio.
    fn fire(&mut self, now: NaiveDateTime) -> Vec<Action> {
        let Some(next) = self.phase.transition(&Transition::Fired) else {
            return Vec::new();
        };
        self.alarm.is_active = true;
        self.alarm.snooze_until = None;
        self.persist();
        self.set_phase(next);

        let id = SessionId(self.next_session);
        self.next_session += 1;
        self.session = Some(Session { id, handle: None });
        self.alarm_started.get_or_insert(now);
        tracing::info!("Alarm firing, starting playback session {id}");

        vec![
            Action::Display(DisplayStatus::Wake),
            Action::StartPlayback {
                session: id,
                volume_pct: self.settings.ramp_start_pct,
            },
        ]
    }

    fn on_signal(&mut self, kind: SignalKind) -> Vec<Action> {
        let transition = match kind {
            SignalKind::Stop => Transition::Stop,
            SignalKind::Snooze => Transition::Snooze,
            SignalKind::Reset => Transition::Reset,
        };
        let Some(next) = self.phase.transition(&transition) else {
            tracing::info!("Ignoring {kind} request while {}", self.phase);
            return Vec::new();
        };

        let now = self.clock.now();
        match kind {
            SignalKind::Stop => {
                tracing::info!("Stop requested");
                self.end_alarm(next)
            }
            SignalKind::Snooze => self.snooze(now, next),
            SignalKind::Reset => self.reset(next),
        }
    }

    fn on_sub_poll(&mut self) -> Vec<Action> {
        let now = self.clock.now();
        match self.phase {
            Phase::Triggered => {
                let Some(started) = self.alarm_started else {
                    return Vec::new();
                };
                if now - started < self.settings.alarm_ceiling {
                    return Vec::new();
                }
                let Some(next) = self.phase.transition(&Transition::Timeout) else {
                    return Vec::new();
                };
                tracing::warn!(
                    "Alarm sounded for {} minutes without a response, stopping automatically",
                    self.settings.alarm_ceiling.num_minutes()
                );
                self.end_alarm(next)
            }
            Phase::Snoozed => {
                if self.alarm.snooze_until.is_some_and(|until| now < until) {
                    return Vec::new();
                }
                let Some(armed) = self.phase.transition(&Transition::SnoozeElapsed) else {
                    return Vec::new();
                };
                tracing::info!("Snooze over");
                self.set_phase(armed);
                self.fire(now)
            }
            _ => Vec::new(),
        }
    }

    fn on_playback_started(
        &mut self,
        id: SessionId,
        result: Result<SessionHandle, PlayerError>,
    ) -> Vec<Action> {
        let current = self.session.as_mut().filter(|s| s.id == id);
        match (current, result) {
            (Some(session), Ok(handle)) => {
                session.handle = Some(handle);
                tracing::info!("Playback session {id} running on {}", handle.backend);
                vec![Action::BeginRamp {
                    handle,
                    start_pct: self.settings.ramp_start_pct,
                    end_pct: self.settings.ramp_end_pct,
                    duration: self.settings.ramp_duration,
                }]
            }
            (Some(_), Err(e)) => {
                tracing::error!("Alarm is {} but playback failed: {e}", self.phase);
                Vec::new()
            }
            (None, Ok(_)) => {
                tracing::info!("Discarding late playback session {id}");
                vec![Action::StopPlayback { session: id }]
            }
            (None, Err(e)) => {
                tracing::debug!("Late playback session {id} failed: {e}");
                Vec::new()
            }
        }
    }

    /// Stop any sounding session and put the volume back to the baseline.
    fn silence(&mut self) -> Vec<Action> {
        match self.session.take() {
            Some(session) => vec![
                Action::StopPlayback {
                    session: session.id,
                },
                Action::ResetVolume {
                    percent: self.settings.baseline_pct,
                },
            ],
            None => Vec::new(),
        }
    }

    fn end_alarm(&mut self, next: Phase) -> Vec<Action> {
        let mut actions = self.silence();
        self.alarm_started = None;
        self.alarm.is_active = false;
        self.alarm.snooze_until = None;
        self.persist();
        self.set_phase(next);
        actions.push(Action::Display(DisplayStatus::Idle));
        actions
    }

    fn snooze(&mut self, now: NaiveDateTime, next: Phase) -> Vec<Action> {
        let mut actions = self.silence();
        let until = now + self.settings.snooze;
        tracing::info!("Snoozing until {}", until.format("%H:%M:%S"));
        self.alarm.snooze_until = Some(until);
        self.alarm.is_active = false;
        self.persist();
        self.set_phase(next);
        actions.push(Action::Display(DisplayStatus::Snoozed {
            hour: until.hour(),
            minute: until.minute(),
        }));
        actions
    }

    fn reset(&mut self, next: Phase) -> Vec<Action> {
        tracing::info!("Reset requested, clearing alarm state");
        let mut actions = self.silence();
        self.alarm = AlarmState::default();
        self.alarm_started = None;
        self.missed_warned = None;
        self.persist();
        self.set_phase(next);
        actions.push(Action::Display(DisplayStatus::Idle));
        actions
    }

    /// A failed save is logged and the engine carries on; waking the user matters more.
    fn persist(&self) {
        if let Err(e) = self.store.save(&self.alarm) {
            tracing::error!("Failed to save alarm state to {}: {e}", self.store.path().display());
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        if phase != self.phase {
            self.phase = phase;
            eprintln!("STATE: {phase}");
        }
    }
}

#[cfg(test)]
impl Engine {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn alarm(&self) -> &AlarmState {
        &self.alarm
    }

    pub fn schedule(&self) -> Option<WakeSchedule> {
        self.schedule
    }

    pub fn fetch_failures(&self) -> u32 {
        self.fetch_failures
    }
}
