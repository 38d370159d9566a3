// ABOUTME: Sets the output volume by running the configured mixer command (pactl by default).
// ABOUTME: Each call is bounded by a timeout so a hung mixer cannot stall a ramp.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::config::{CommandConfig, VolumeConfig};

#[derive(Debug, thiserror::Error)]
pub enum MixerError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{command} failed ({status}): {stderr}")]
    Failed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("{command} did not finish within {timeout:?}")]
    Timeout { command: String, timeout: Duration },
}

pub struct Mixer {
    command: CommandConfig,
    timeout: Duration,
}

impl Mixer {
    pub fn new(config: &VolumeConfig) -> Self {
        Self {
            command: config.mixer.clone(),
            timeout: Duration::from_millis(config.mixer_timeout_ms),
        }
    }

    /// Set the output volume to `percent` (clamped to 100).
    pub async fn set_volume(&self, percent: u8) -> Result<(), MixerError> {
        let percent = percent.min(100).to_string();
        let args = self.command.resolved_args(&[("percent", &percent)]);
        tracing::debug!("Setting volume: {} {}", self.command.command, args.join(" "));

        let run = Command::new(&self.command.command)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| MixerError::Timeout {
                command: self.command.command.clone(),
                timeout: self.timeout,
            })?
            .map_err(|source| MixerError::Spawn {
                command: self.command.command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(MixerError::Failed {
                command: self.command.command.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}
