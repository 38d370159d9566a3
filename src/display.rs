// ABOUTME: Publishes the alarm status line read by the external clock display.
// ABOUTME: Writes are best-effort; a failed write is logged and the alarm carries on.

use std::path::{Path, PathBuf};

use wakeup_ipc::DisplayStatus;

pub struct DisplayWriter {
    path: PathBuf,
}

impl DisplayWriter {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn write(&self, status: &DisplayStatus) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("Failed to create display directory {}: {e}", parent.display());
                return;
            }
        }
        match std::fs::write(&self.path, status.to_string()) {
            Ok(()) => tracing::debug!("Display status: {status:?}"),
            Err(e) => tracing::warn!("Failed to write display status to {}: {e}", self.path.display()),
        }
    }
}
