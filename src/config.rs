// ABOUTME: Loads the daemon's TOML configuration with per-field defaults.
// ABOUTME: Covers file locations, schedule endpoints, trigger timing, volume ramp, and audio backend commands.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use wakeup_ipc::Layout;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub trigger: TriggerConfig,
    #[serde(default)]
    pub volume: VolumeConfig,
    #[serde(default)]
    pub player: PlayerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Overrides the shared base directory from wakeup-ipc.
    #[serde(default)]
    pub base_dir: Option<String>,
    /// Extra directories where the button handler may drop snooze/stop markers.
    #[serde(default = "default_legacy_signal_dirs")]
    pub legacy_signal_dirs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_local_url")]
    pub local_url: String,
    #[serde(default = "default_production_url")]
    pub production_url: String,
    #[serde(default = "default_status_path")]
    pub status_path: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_sub_poll_interval_ms")]
    pub sub_poll_interval_ms: u64,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_snooze_minutes")]
    pub snooze_minutes: u64,
    #[serde(default = "default_alarm_duration_minutes")]
    pub alarm_duration_minutes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeConfig {
    #[serde(default = "default_ramp_start_pct")]
    pub ramp_start_pct: u8,
    #[serde(default = "default_ramp_end_pct")]
    pub ramp_end_pct: u8,
    #[serde(default = "default_ramp_secs")]
    pub ramp_secs: u64,
    #[serde(default = "default_ramp_step_pct")]
    pub ramp_step_pct: u8,
    #[serde(default = "default_baseline_pct")]
    pub baseline_pct: u8,
    #[serde(default = "default_mixer")]
    pub mixer: CommandConfig,
    #[serde(default = "default_mixer_timeout_ms")]
    pub mixer_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default = "default_pianobar")]
    pub pianobar: CommandConfig,
    #[serde(default = "default_mp3")]
    pub mp3: CommandConfig,
    /// No FM receiver command by default; FM mode then falls back to pianobar.
    #[serde(default)]
    pub fm: Option<CommandConfig>,
    /// Process names force-killed before every start.
    #[serde(default = "default_cleanup_processes")]
    pub cleanup_processes: Vec<String>,
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

/// An external command with `{placeholder}` arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandConfig {
    pub fn new(command: &str, args: &[&str]) -> Self {
        Self {
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Arguments with `{key}` replaced by `value` for each pair.
    pub fn resolved_args(&self, replacements: &[(&str, &str)]) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                replacements
                    .iter()
                    .fold(arg.clone(), |acc, (key, value)| acc.replace(&format!("{{{key}}}"), value))
            })
            .collect()
    }
}

fn default_legacy_signal_dirs() -> Vec<String> {
    vec!["/tmp".to_string()]
}

fn default_local_url() -> String {
    "http://127.0.0.1:3001".to_string()
}

fn default_production_url() -> String {
    "http://192.168.0.15:3001".to_string()
}

fn default_status_path() -> String {
    "/api/scheduler/wake-up/status".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

fn default_request_timeout_ms() -> u64 {
    3000
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_sub_poll_interval_ms() -> u64 {
    200
}

fn default_window_secs() -> u64 {
    90
}

fn default_snooze_minutes() -> u64 {
    9
}

fn default_alarm_duration_minutes() -> u64 {
    60
}

fn default_ramp_start_pct() -> u8 {
    60
}

fn default_ramp_end_pct() -> u8 {
    100
}

fn default_ramp_secs() -> u64 {
    10
}

fn default_ramp_step_pct() -> u8 {
    2
}

fn default_baseline_pct() -> u8 {
    80
}

fn default_mixer() -> CommandConfig {
    CommandConfig::new("pactl", &["set-sink-volume", "@DEFAULT_SINK@", "{percent}%"])
}

fn default_mixer_timeout_ms() -> u64 {
    2000
}

fn default_pianobar() -> CommandConfig {
    CommandConfig::new("pianobar", &[])
}

fn default_mp3() -> CommandConfig {
    CommandConfig::new("mpg123", &["--loop", "-1", "{track}"])
}

fn default_cleanup_processes() -> Vec<String> {
    vec!["pianobar".to_string(), "mpg123".to_string()]
}

fn default_settle_ms() -> u64 {
    500
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            legacy_signal_dirs: default_legacy_signal_dirs(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            local_url: default_local_url(),
            production_url: default_production_url(),
            status_path: default_status_path(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            sub_poll_interval_ms: default_sub_poll_interval_ms(),
            window_secs: default_window_secs(),
            snooze_minutes: default_snooze_minutes(),
            alarm_duration_minutes: default_alarm_duration_minutes(),
        }
    }
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            ramp_start_pct: default_ramp_start_pct(),
            ramp_end_pct: default_ramp_end_pct(),
            ramp_secs: default_ramp_secs(),
            ramp_step_pct: default_ramp_step_pct(),
            baseline_pct: default_baseline_pct(),
            mixer: default_mixer(),
            mixer_timeout_ms: default_mixer_timeout_ms(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            pianobar: default_pianobar(),
            mp3: default_mp3(),
            fm: None,
            cleanup_processes: default_cleanup_processes(),
            settle_ms: default_settle_ms(),
        }
    }
}

impl TriggerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn sub_poll_interval(&self) -> Duration {
        Duration::from_millis(self.sub_poll_interval_ms.max(10))
    }

    /// Snooze length; at least a minute so the deadline always lies in the future.
    pub fn snooze(&self) -> chrono::TimeDelta {
        chrono::TimeDelta::minutes(self.snooze_minutes.max(1) as i64)
    }
}

impl VolumeConfig {
    pub fn ramp_duration(&self) -> Duration {
        Duration::from_secs(self.ramp_secs)
    }
}

impl Config {
    /// Load configuration from $WAKEUP_ALARM_CONFIG or the standard config file location.
    /// Falls back to defaults if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_file_path();
        if !config_path.exists() {
            return Ok(Config::default());
        }
        let contents = std::fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;
        let config = Self::load_from_str(&contents)?;
        tracing::info!("Configuration loaded from {}", config_path.display());
        Ok(config)
    }

    fn load_from_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    fn config_file_path() -> PathBuf {
        if let Ok(override_path) = std::env::var("WAKEUP_ALARM_CONFIG") {
            return PathBuf::from(override_path);
        }
        let xdg_config = std::env::var("XDG_CONFIG_HOME")
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                format!("{home}/.config")
            });
        Path::new(&xdg_config).join("wakeup-alarm").join("config.toml")
    }

    /// File layout rooted at the configured or shared default base directory.
    pub fn layout(&self) -> Layout {
        match &self.paths.base_dir {
            Some(dir) => Layout::new(dir),
            None => Layout::default(),
        }
    }

    pub fn legacy_signal_dirs(&self) -> Vec<PathBuf> {
        self.paths.legacy_signal_dirs.iter().map(PathBuf::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_empty_toml_gives_defaults() {
        let config = Config::load_from_str("").unwrap();
        assert_eq!(config.trigger.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.trigger.sub_poll_interval(), Duration::from_millis(200));
        assert_eq!(config.trigger.window_secs, 90);
        assert_eq!(config.trigger.snooze_minutes, 9);
        assert_eq!(config.trigger.alarm_duration_minutes, 60);
        assert_eq!(config.volume.ramp_start_pct, 60);
        assert_eq!(config.volume.ramp_end_pct, 100);
        assert_eq!(config.volume.baseline_pct, 80);
        assert_eq!(config.player.pianobar.command, "pianobar");
        assert!(config.player.fm.is_none());
        assert_eq!(config.paths.legacy_signal_dirs, vec!["/tmp"]);
    }

    #[test]
    fn load_partial_sections_keeps_other_defaults() {
        let toml = r#"
[paths]
base_dir = "/home/pi/monty-alarm"

[trigger]
window_secs = 120

[player.fm]
command = "rtl_fm"
args = ["-f", "{station}M"]
"#;
        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.trigger.window_secs, 120);
        assert_eq!(config.trigger.snooze_minutes, 9);
        assert_eq!(config.layout().base(), Path::new("/home/pi/monty-alarm"));
        let fm = config.player.fm.unwrap();
        assert_eq!(fm.resolved_args(&[("station", "101.1")]), vec!["-f", "101.1M"]);
    }

    #[test]
    fn zero_snooze_is_raised_to_one_minute() {
        let config = Config::load_from_str("[trigger]\nsnooze_minutes = 0").unwrap();
        assert_eq!(config.trigger.snooze(), chrono::TimeDelta::minutes(1));
        assert_eq!(Config::default().trigger.snooze(), chrono::TimeDelta::minutes(9));
    }

    #[test]
    fn load_rejects_wrong_types() {
        assert!(matches!(
            Config::load_from_str("[trigger]\nwindow_secs = \"soon\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn resolved_args_replaces_every_placeholder() {
        let mixer = default_mixer();
        assert_eq!(
            mixer.resolved_args(&[("percent", "60")]),
            vec!["set-sink-volume", "@DEFAULT_SINK@", "60%"]
        );
        let mp3 = default_mp3();
        assert_eq!(
            mp3.resolved_args(&[("track", "/music/birds.mp3")]),
            vec!["--loop", "-1", "/music/birds.mp3"]
        );
    }
}
