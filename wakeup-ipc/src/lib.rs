// ABOUTME: Shared filesystem contract between the wake-up alarm daemon, the button handler, and wakeup-ctl.
// ABOUTME: Defines marker and status file names, the directory layout, display strings, and the wake-up mode document.

use std::ffi::OsStr;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Marker written by the button handler when snooze is pressed.
pub const SNOOZE_MARKER: &str = "alarm_snooze";

/// Marker written by the button handler on a long press of the check button.
pub const STOP_MARKER: &str = "alarm_stop";

/// Marker an operator creates to re-arm the alarm for the current day.
pub const RESET_MARKER: &str = "reset_alarm_state";

/// Status string consumed by the external display.
pub const DISPLAY_FILE: &str = "alarm_display.txt";

const STATE_FILE: &str = "alarm_state.json";
const WAKEUP_CONFIG_FILE: &str = "wakeup_config.json";
const SIGNALS_DIR: &str = "signals";
const MUSIC_DIR: &str = "music";

/// Base directory for all alarm files: $WAKEUP_ALARM_HOME, else ~/.local/share/wakeup-alarm/
pub fn default_base_dir() -> PathBuf {
    if let Ok(home) = std::env::var("WAKEUP_ALARM_HOME") {
        return PathBuf::from(home);
    }
    let data_dir = std::env::var("XDG_DATA_HOME")
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            format!("{home}/.local/share")
        });
    PathBuf::from(data_dir).join("wakeup-alarm")
}

/// Resolves every well-known file below one base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    base: PathBuf,
}

impl Layout {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn signals_dir(&self) -> PathBuf {
        self.base.join(SIGNALS_DIR)
    }

    pub fn snooze_marker(&self) -> PathBuf {
        self.signals_dir().join(SNOOZE_MARKER)
    }

    pub fn stop_marker(&self) -> PathBuf {
        self.signals_dir().join(STOP_MARKER)
    }

    pub fn reset_marker(&self) -> PathBuf {
        self.base.join(RESET_MARKER)
    }

    pub fn display_file(&self) -> PathBuf {
        self.signals_dir().join(DISPLAY_FILE)
    }

    pub fn state_file(&self) -> PathBuf {
        self.base.join(STATE_FILE)
    }

    pub fn wakeup_config_file(&self) -> PathBuf {
        self.base.join(WAKEUP_CONFIG_FILE)
    }

    pub fn music_dir(&self) -> PathBuf {
        self.base.join(MUSIC_DIR)
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::new(default_base_dir())
    }
}

/// What the external display should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayStatus {
    Idle,
    Wake,
    Snoozed { hour: u32, minute: u32 },
}

impl fmt::Display for DisplayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayStatus::Idle => Ok(()),
            DisplayStatus::Wake => write!(f, "WAKE!"),
            DisplayStatus::Snoozed { hour, minute } => write!(f, "SNZ {hour:02}:{minute:02}"),
        }
    }
}

impl std::str::FromStr for DisplayStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(DisplayStatus::Idle);
        }
        if s == "WAKE!" {
            return Ok(DisplayStatus::Wake);
        }
        let parse = |rest: &str| -> Option<DisplayStatus> {
            let (h, m) = rest.split_once(':')?;
            Some(DisplayStatus::Snoozed {
                hour: h.parse().ok()?,
                minute: m.parse().ok()?,
            })
        };
        s.strip_prefix("SNZ ")
            .and_then(parse)
            .ok_or_else(|| format!("Unknown display status: {s}"))
    }
}

/// Which audio backend wakes the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WakeupMode {
    #[default]
    Pianobar,
    Mp3,
    Fm,
}

impl WakeupMode {
    pub fn description(self) -> &'static str {
        match self {
            WakeupMode::Pianobar => "Pandora internet radio (pianobar)",
            WakeupMode::Mp3 => "Local MP3 file",
            WakeupMode::Fm => "FM radio",
        }
    }
}

impl fmt::Display for WakeupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WakeupMode::Pianobar => write!(f, "pianobar"),
            WakeupMode::Mp3 => write!(f, "mp3"),
            WakeupMode::Fm => write!(f, "fm"),
        }
    }
}

impl std::str::FromStr for WakeupMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pianobar" => Ok(WakeupMode::Pianobar),
            "mp3" => Ok(WakeupMode::Mp3),
            "fm" => Ok(WakeupMode::Fm),
            other => Err(format!("Invalid mode '{other}'. Valid modes: pianobar, mp3, fm")),
        }
    }
}

/// The wake-up mode document, written by wakeup-ctl and read by the daemon at each alarm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WakeupConfig {
    #[serde(default)]
    pub mode: WakeupMode,
    #[serde(default)]
    pub mp3_track: Option<String>,
    #[serde(default = "default_fm_station")]
    pub fm_station: String,
}

fn default_fm_station() -> String {
    "101.1".to_string()
}

impl Default for WakeupConfig {
    fn default() -> Self {
        Self {
            mode: WakeupMode::default(),
            mp3_track: None,
            fm_station: default_fm_station(),
        }
    }
}

impl WakeupConfig {
    /// Read the document. A missing file surfaces as `ErrorKind::NotFound`.
    pub fn load(path: &Path) -> io::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
    }

    /// Select `filename` from `music_dir` as the MP3 wake-up track.
    /// Does not switch the mode.
    pub fn select_track(&mut self, music_dir: &Path, filename: &str) -> Result<(), TrackError> {
        check_library_name(filename)?;
        if !is_mp3(filename) {
            return Err(TrackError::NotMp3(filename.to_string()));
        }
        if !music_dir.join(filename).is_file() {
            return Err(TrackError::NotFound(filename.to_string()));
        }
        self.mp3_track = Some(filename.to_string());
        Ok(())
    }
}

/// Reasons a library operation is refused or fails.
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("Track '{0}' not found")]
    NotFound(String),
    #[error("Only MP3 files supported: '{0}'")]
    NotMp3(String),
    #[error("File '{0}' already exists")]
    AlreadyExists(String),
    #[error("'{0}' is not a plain file name")]
    InvalidName(String),
    #[error("Cannot create {}: {source}", .dir.display())]
    CreateDir {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Error copying '{name}': {source}")]
    Copy {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("Error removing '{name}': {source}")]
    Remove {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// An MP3 file in the music library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub filename: String,
    pub size_bytes: u64,
}

/// List MP3 files in `music_dir`, sorted by name. A missing directory is an empty library.
pub fn list_tracks(music_dir: &Path) -> io::Result<Vec<Track>> {
    let entries = match std::fs::read_dir(music_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut tracks = Vec::new();
    for entry in entries {
        let entry = entry?;
        let filename = entry.file_name().to_string_lossy().to_string();
        if !is_mp3(&filename) {
            continue;
        }
        let metadata = entry.metadata()?;
        if metadata.is_file() {
            tracks.push(Track {
                filename,
                size_bytes: metadata.len(),
            });
        }
    }
    tracks.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(tracks)
}

fn is_mp3(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".mp3")
}

/// Library entries are addressed by a single file name, never a path.
fn check_library_name(name: &str) -> Result<(), TrackError> {
    if Path::new(name).file_name() == Some(OsStr::new(name)) {
        Ok(())
    } else {
        Err(TrackError::InvalidName(name.to_string()))
    }
}

/// Copy `source` into the library, optionally renamed. Existing files are never overwritten.
/// Returns the library file name.
pub fn add_track(music_dir: &Path, source: &Path, new_name: Option<&str>) -> Result<String, TrackError> {
    if !source.is_file() {
        return Err(TrackError::NotFound(source.display().to_string()));
    }
    let filename = match new_name {
        Some(name) => name.to_string(),
        None => source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
    };
    check_library_name(&filename)?;
    if !is_mp3(&source.to_string_lossy()) || !is_mp3(&filename) {
        return Err(TrackError::NotMp3(filename));
    }

    std::fs::create_dir_all(music_dir).map_err(|source| TrackError::CreateDir {
        dir: music_dir.to_path_buf(),
        source,
    })?;
    let dest = music_dir.join(&filename);
    if dest.exists() {
        return Err(TrackError::AlreadyExists(filename));
    }
    if let Err(source) = std::fs::copy(source, &dest) {
        return Err(TrackError::Copy {
            name: filename,
            source,
        });
    }
    Ok(filename)
}

/// Delete the MP3 `filename` from the library.
pub fn remove_track(music_dir: &Path, filename: &str) -> Result<(), TrackError> {
    check_library_name(filename)?;
    if !is_mp3(filename) {
        return Err(TrackError::NotMp3(filename.to_string()));
    }
    let path = music_dir.join(filename);
    if !path.is_file() {
        return Err(TrackError::NotFound(filename.to_string()));
    }
    std::fs::remove_file(&path).map_err(|source| TrackError::Remove {
        name: filename.to_string(),
        source,
    })
}
