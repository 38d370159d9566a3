// ABOUTME: Watches the snooze, stop, and reset marker files dropped by the button handler and operators.
// ABOUTME: Consumes each marker once with fallback deletion strategies and never redelivers a stuck marker.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use wakeup_ipc::Layout;

/// Delete attempts per marker (the first in `consume`, the rest on later polls).
const MAX_DELETE_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Stop,
    Snooze,
    Reset,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::Stop => write!(f, "stop"),
            SignalKind::Snooze => write!(f, "snooze"),
            SignalKind::Reset => write!(f, "reset"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalEvent {
    pub kind: SignalKind,
    pub path: PathBuf,
}

pub(crate) type Remover = fn(&Path) -> io::Result<()>;

const STRATEGIES: &[(&str, Remover)] = &[
    ("remove_file", remove_directly as Remover),
    ("rename", rename_aside as Remover),
    ("rm -f", remove_with_rm as Remover),
];

/// A marker we already delivered but could not delete.
struct Stuck {
    attempts: u32,
}

pub struct SignalWatcher {
    /// Ordered by precedence: stop before snooze before reset.
    markers: Vec<(SignalKind, PathBuf)>,
    stuck: HashMap<PathBuf, Stuck>,
    strategies: &'static [(&'static str, Remover)],
}

impl SignalWatcher {
    pub fn new(layout: &Layout, legacy_dirs: &[PathBuf]) -> Self {
        let mut markers = vec![(SignalKind::Stop, layout.stop_marker())];
        markers.extend(
            legacy_dirs
                .iter()
                .map(|dir| (SignalKind::Stop, dir.join(wakeup_ipc::STOP_MARKER))),
        );
        markers.push((SignalKind::Snooze, layout.snooze_marker()));
        markers.extend(
            legacy_dirs
                .iter()
                .map(|dir| (SignalKind::Snooze, dir.join(wakeup_ipc::SNOOZE_MARKER))),
        );
        markers.push((SignalKind::Reset, layout.reset_marker()));

        Self {
            markers,
            stuck: HashMap::new(),
            strategies: STRATEGIES,
        }
    }

    /// Highest-precedence marker that is present and not yet delivered.
    pub fn poll(&mut self) -> Option<SignalEvent> {
        for (kind, path) in &self.markers {
            if !path.exists() {
                self.stuck.remove(path);
                continue;
            }
            if let Some(stuck) = self.stuck.get_mut(path) {
                if stuck.attempts < MAX_DELETE_ATTEMPTS {
                    stuck.attempts += 1;
                    if best_effort_remove(path, self.strategies) {
                        self.stuck.remove(path);
                    } else if stuck.attempts == MAX_DELETE_ATTEMPTS {
                        tracing::error!(
                            "Giving up on deleting {} after {MAX_DELETE_ATTEMPTS} attempts; it will be ignored",
                            path.display()
                        );
                    }
                }
                continue;
            }
            return Some(SignalEvent {
                kind: *kind,
                path: path.clone(),
            });
        }
        None
    }

    /// Delete the marker behind `event`. Failure is logged and remembered, never returned.
    pub fn consume(&mut self, event: &SignalEvent) {
        if best_effort_remove(&event.path, self.strategies) {
            tracing::debug!("Consumed {} marker {}", event.kind, event.path.display());
        } else {
            self.stuck.insert(event.path.clone(), Stuck { attempts: 1 });
        }
    }

    /// Remove snooze/stop markers left over from before this process started.
    /// The reset marker is kept so it still takes effect.
    pub fn clear_stale(&mut self) {
        for (kind, path) in &self.markers {
            if *kind == SignalKind::Reset || !path.exists() {
                continue;
            }
            if best_effort_remove(path, self.strategies) {
                tracing::info!("Cleaned up leftover {kind} marker: {}", path.display());
            }
        }
    }
}

#[cfg(test)]
impl SignalWatcher {
    pub(crate) fn with_strategies(mut self, strategies: &'static [(&'static str, Remover)]) -> Self {
        self.strategies = strategies;
        self
    }
}

/// Try each strategy in turn until the path is gone. Returns whether it is gone.
fn best_effort_remove(path: &Path, strategies: &[(&str, Remover)]) -> bool {
    for (name, remove) in strategies {
        match remove(path) {
            Ok(()) if !path.exists() => return true,
            Ok(()) => tracing::warn!("{name} reported success but {} still exists", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return true,
            Err(e) => tracing::warn!("{name} failed for {}: {e}", path.display()),
        }
    }
    tracing::error!("Could not remove marker {}", path.display());
    false
}

fn remove_directly(path: &Path) -> io::Result<()> {
    std::fs::remove_file(path)
}

/// Moving the marker aside works where unlinking is refused but the directory is writable.
fn rename_aside(path: &Path) -> io::Result<()> {
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "marker has no file name"))?;
    let target = path.with_file_name(format!(
        "{}_{}",
        name.to_string_lossy(),
        chrono::Utc::now().timestamp()
    ));
    std::fs::rename(path, target)
}

fn remove_with_rm(path: &Path) -> io::Result<()> {
    let status = std::process::Command::new("rm").arg("-f").arg(path).status()?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::other(format!("rm exited with {status}")))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn watcher_in(dir: &Path) -> (SignalWatcher, Layout) {
        let layout = Layout::new(dir);
        std::fs::create_dir_all(layout.signals_dir()).unwrap();
        (SignalWatcher::new(&layout, &[]), layout)
    }

    #[test]
    fn poll_without_markers_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let (mut watcher, _) = watcher_in(dir.path());
        assert_eq!(watcher.poll(), None);
    }

    #[test]
    fn consume_deletes_marker() {
        let dir = tempfile::tempdir().unwrap();
        let (mut watcher, layout) = watcher_in(dir.path());
        std::fs::write(layout.snooze_marker(), b"").unwrap();

        let event = watcher.poll().unwrap();
        assert_eq!(event.kind, SignalKind::Snooze);
        watcher.consume(&event);
        assert!(!layout.snooze_marker().exists());
        assert_eq!(watcher.poll(), None);
    }

    #[test]
    fn stop_is_reported_before_snooze() {
        let dir = tempfile::tempdir().unwrap();
        let (mut watcher, layout) = watcher_in(dir.path());
        std::fs::write(layout.snooze_marker(), b"").unwrap();
        std::fs::write(layout.stop_marker(), b"").unwrap();

        let first = watcher.poll().unwrap();
        assert_eq!(first.kind, SignalKind::Stop);
        watcher.consume(&first);
        let second = watcher.poll().unwrap();
        assert_eq!(second.kind, SignalKind::Snooze);
    }

    #[test]
    fn legacy_directory_markers_are_seen() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        let mut watcher = SignalWatcher::new(&layout, &[legacy.path().to_path_buf()]);
        std::fs::write(legacy.path().join("alarm_stop"), b"").unwrap();

        let event = watcher.poll().unwrap();
        assert_eq!(event.kind, SignalKind::Stop);
        assert_eq!(event.path, legacy.path().join("alarm_stop"));
    }

    #[test]
    fn reset_marker_lives_in_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let (mut watcher, layout) = watcher_in(dir.path());
        std::fs::write(layout.reset_marker(), b"").unwrap();
        assert_eq!(watcher.poll().unwrap().kind, SignalKind::Reset);
    }

    #[test]
    fn clear_stale_keeps_reset_marker() {
        let dir = tempfile::tempdir().unwrap();
        let (mut watcher, layout) = watcher_in(dir.path());
        for path in [layout.stop_marker(), layout.snooze_marker(), layout.reset_marker()] {
            std::fs::write(path, b"").unwrap();
        }

        watcher.clear_stale();
        assert!(!layout.stop_marker().exists());
        assert!(!layout.snooze_marker().exists());
        assert!(layout.reset_marker().exists());
    }

    #[test]
    fn rename_fallback_moves_marker_aside() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("alarm_stop");
        std::fs::write(&marker, b"").unwrap();

        fn refuse(_: &Path) -> io::Result<()> {
            Err(io::Error::from(io::ErrorKind::PermissionDenied))
        }
        let strategies: &[(&str, Remover)] =
            &[("refuse", refuse as Remover), ("rename", rename_aside as Remover)];
        assert!(best_effort_remove(&marker, strategies));
        assert!(!marker.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    static REFUSALS: AtomicU32 = AtomicU32::new(0);
    static REFUSING: &[(&str, Remover)] = &[("refuse", refuse_counted as Remover)];

    fn refuse_counted(_: &Path) -> io::Result<()> {
        REFUSALS.fetch_add(1, Ordering::SeqCst);
        Err(io::Error::from(io::ErrorKind::PermissionDenied))
    }

    #[test]
    fn stuck_marker_is_delivered_once_and_retried_a_bounded_number_of_times() {
        let dir = tempfile::tempdir().unwrap();
        let (mut watcher, layout) = watcher_in(dir.path());
        watcher.strategies = REFUSING;
        std::fs::write(layout.stop_marker(), b"").unwrap();

        let event = watcher.poll().unwrap();
        watcher.consume(&event);
        for _ in 0..20 {
            assert_eq!(watcher.poll(), None);
        }
        assert_eq!(REFUSALS.load(Ordering::SeqCst), MAX_DELETE_ATTEMPTS);

        // Once the marker is gone a fresh press is delivered again
        std::fs::remove_file(layout.stop_marker()).unwrap();
        assert_eq!(watcher.poll(), None);
        std::fs::write(layout.stop_marker(), b"").unwrap();
        assert_eq!(watcher.poll().unwrap().kind, SignalKind::Stop);
    }
}
