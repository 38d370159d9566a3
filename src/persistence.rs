// ABOUTME: Persists the alarm's daily trigger state as JSON so restarts neither double-fire nor miss a wake time.
// ABOUTME: Writes atomically via a temp file and rename; unreadable state loads as a fresh default.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// The only alarm state that survives a restart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmState {
    #[serde(default)]
    pub last_triggered_date: Option<NaiveDate>,
    #[serde(default)]
    pub snooze_until: Option<NaiveDateTime>,
    #[serde(default)]
    pub is_active: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("state directory {path} is not usable: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write state: {0}")]
    Write(#[from] std::io::Error),
    #[error("failed to encode state: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to replace state file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Ensure the state directory exists and accepts new files.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let dir = state_dir(path);
        let directory_error = |source| StoreError::Directory {
            path: dir.to_path_buf(),
            source,
        };
        std::fs::create_dir_all(dir).map_err(directory_error)?;
        // Dropping the probe removes it again
        tempfile::NamedTempFile::new_in(dir).map_err(directory_error)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load persisted state, returning the default if missing or unreadable.
    pub fn load(&self) -> AlarmState {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(state) => {
                    tracing::info!("Loaded alarm state from {}", self.path.display());
                    state
                }
                Err(e) => {
                    tracing::warn!("Alarm state file is corrupt (starting fresh): {e}");
                    AlarmState::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No alarm state file found, starting fresh");
                AlarmState::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read alarm state (starting fresh): {e}");
                AlarmState::default()
            }
        }
    }

    /// Replace the state file with `state`.
    pub fn save(&self, state: &AlarmState) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(state)?;
        let mut tmp = tempfile::NamedTempFile::new_in(state_dir(&self.path))?;
        tmp.write_all(contents.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;
        tracing::debug!("Saved alarm state to {}", self.path.display());
        Ok(())
    }
}

fn state_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
