// ABOUTME: Wall-clock source for the trigger engine, expressed in local naive time.
// ABOUTME: Tests substitute a manual clock they can set and advance.

use chrono::NaiveDateTime;

pub trait Clock: Send + Sync {
    /// Current local date and time.
    fn now(&self) -> NaiveDateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

#[cfg(test)]
pub use manual::ManualClock;

#[cfg(test)]
mod manual {
    use std::sync::{Arc, Mutex};

    use chrono::{NaiveDateTime, TimeDelta};

    use super::Clock;

    /// Clock whose time only moves when a test says so. Clones share the same time.
    #[derive(Clone)]
    pub struct ManualClock {
        now: Arc<Mutex<NaiveDateTime>>,
    }

    impl ManualClock {
        pub fn at(text: &str) -> Self {
            Self {
                now: Arc::new(Mutex::new(parse(text))),
            }
        }

        pub fn set(&self, text: &str) {
            *self.now.lock().unwrap() = parse(text);
        }

        pub fn advance(&self, by: TimeDelta) {
            let mut now = self.now.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> NaiveDateTime {
            *self.now.lock().unwrap()
        }
    }

    /// Parse "YYYY-MM-DD HH:MM:SS".
    pub fn parse(text: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").unwrap()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::at("2025-03-10 06:29:50");
        let other = clock.clone();
        clock.advance(TimeDelta::seconds(15));
        assert_eq!(other.now(), manual::parse("2025-03-10 06:30:05"));
        other.set("2025-03-11 00:00:00");
        assert_eq!(clock.now(), manual::parse("2025-03-11 00:00:00"));
    }
}
