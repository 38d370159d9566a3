// ABOUTME: Alarm phase machine with explicit phases and transition rules.
// ABOUTME: Any phase/transition pair not listed is ignored, so stray button presses cannot corrupt the day's state.

use std::fmt;

/// Where the alarm is in its daily cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Armed,
    Triggered,
    Snoozed,
    StoppedToday,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "Idle"),
            Phase::Armed => write!(f, "Armed"),
            Phase::Triggered => write!(f, "Triggered"),
            Phase::Snoozed => write!(f, "Snoozed"),
            Phase::StoppedToday => write!(f, "StoppedToday"),
        }
    }
}

/// Things that move the alarm between phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    WindowOpened,
    Fired,
    Snooze,
    Stop,
    Timeout,
    SnoozeElapsed,
    Reset,
    DayRolledOver,
}

impl Phase {
    /// Attempt a transition. Returns the new phase if it is valid,
    /// or None if the transition should be ignored in the current phase.
    pub fn transition(self, transition: &Transition) -> Option<Phase> {
        match (self, transition) {
            // Idle + WindowOpened -> Armed
            (Phase::Idle, Transition::WindowOpened) => Some(Phase::Armed),

            // Armed + Fired -> Triggered
            (Phase::Armed, Transition::Fired) => Some(Phase::Triggered),

            // Sounding + Stop/Timeout -> StoppedToday
            (Phase::Triggered, Transition::Stop) => Some(Phase::StoppedToday),
            (Phase::Triggered, Transition::Timeout) => Some(Phase::StoppedToday),

            // Snoozed + Stop -> StoppedToday (cancels the pending re-fire)
            (Phase::Snoozed, Transition::Stop) => Some(Phase::StoppedToday),

            // Triggered + Snooze -> Snoozed
            (Phase::Triggered, Transition::Snooze) => Some(Phase::Snoozed),

            // Snoozed + SnoozeElapsed -> Armed (fires again straight away)
            (Phase::Snoozed, Transition::SnoozeElapsed) => Some(Phase::Armed),

            // Any + Reset -> Idle
            (_, Transition::Reset) => Some(Phase::Idle),

            // Midnight only clears a day that is not mid-alarm
            (Phase::Idle | Phase::Armed | Phase::StoppedToday, Transition::DayRolledOver) => {
                Some(Phase::Idle)
            }

            // Ignore other combinations
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_day_cycle() {
        let armed = Phase::Idle.transition(&Transition::WindowOpened).unwrap();
        let triggered = armed.transition(&Transition::Fired).unwrap();
        let snoozed = triggered.transition(&Transition::Snooze).unwrap();
        let rearmed = snoozed.transition(&Transition::SnoozeElapsed).unwrap();
        let triggered = rearmed.transition(&Transition::Fired).unwrap();
        assert_eq!(triggered.transition(&Transition::Stop), Some(Phase::StoppedToday));
    }

    #[test]
    fn stop_while_snoozed_ends_the_day() {
        assert_eq!(
            Phase::Snoozed.transition(&Transition::Stop),
            Some(Phase::StoppedToday)
        );
    }

    #[test]
    fn timeout_only_applies_while_triggered() {
        assert_eq!(
            Phase::Triggered.transition(&Transition::Timeout),
            Some(Phase::StoppedToday)
        );
        assert_eq!(Phase::Snoozed.transition(&Transition::Timeout), None);
    }

    #[test]
    fn buttons_are_ignored_when_nothing_is_sounding() {
        for phase in [Phase::Idle, Phase::Armed, Phase::StoppedToday] {
            assert_eq!(phase.transition(&Transition::Stop), None);
            assert_eq!(phase.transition(&Transition::Snooze), None);
        }
        assert_eq!(Phase::Snoozed.transition(&Transition::Snooze), None);
    }

    #[test]
    fn reset_returns_every_phase_to_idle() {
        for phase in [
            Phase::Idle,
            Phase::Armed,
            Phase::Triggered,
            Phase::Snoozed,
            Phase::StoppedToday,
        ] {
            assert_eq!(phase.transition(&Transition::Reset), Some(Phase::Idle));
        }
    }

    #[test]
    fn rollover_waits_for_alarm_to_finish() {
        assert_eq!(Phase::Triggered.transition(&Transition::DayRolledOver), None);
        assert_eq!(Phase::Snoozed.transition(&Transition::DayRolledOver), None);
        assert_eq!(
            Phase::StoppedToday.transition(&Transition::DayRolledOver),
            Some(Phase::Idle)
        );
    }

    #[test]
    fn cannot_fire_without_arming() {
        assert_eq!(Phase::Idle.transition(&Transition::Fired), None);
        assert_eq!(Phase::StoppedToday.transition(&Transition::WindowOpened), None);
    }
}
