// ABOUTME: Command-line control for the wake-up alarm: mode, music library, FM station, and button markers.
// ABOUTME: Talks to the daemon through the files defined in wakeup-ipc and reuses its player to test playback.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use wakeup_alarm::DynError;
use wakeup_alarm::config::Config;
use wakeup_alarm::player::{PlayerController, SessionId};
use wakeup_ipc::{DisplayStatus, Layout, WakeupConfig, WakeupMode};

const TEST_POLL: Duration = Duration::from_millis(200);

#[derive(Parser)]
#[command(name = "wakeup-ctl", version, about = "Control the wake-up alarm")]
struct Cli {
    /// Alarm data directory (defaults to $WAKEUP_ALARM_HOME or ~/.local/share/wakeup-alarm)
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the wake-up mode, alarm state, display, and pending markers
    Status,
    /// Choose what plays at wake time (pianobar, mp3, fm)
    Mode { mode: WakeupMode },
    /// List MP3 files in the music library
    Tracks,
    /// Select the MP3 wake-up track (does not change the mode)
    Select { filename: String },
    /// Copy an MP3 file into the music library
    Add {
        path: PathBuf,
        /// Store under a different file name
        #[arg(long)]
        name: Option<String>,
    },
    /// Delete a track from the music library
    Remove { filename: String },
    /// Set the FM station, e.g. 101.1
    Station { frequency: String },
    /// Play the current wake-up mode briefly to check it works
    Test {
        /// How long to play before stopping
        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },
    /// Snooze the ringing alarm
    Snooze,
    /// Stop the alarm for today
    Stop,
    /// Clear today's trigger so the alarm can fire again
    Reset,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let layout = cli.base_dir.map(Layout::new).unwrap_or_default();

    if let Err(e) = run(cli.command, &layout) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(command: Commands, layout: &Layout) -> Result<(), DynError> {
    match command {
        Commands::Status => {
            print!("{}", status_report(layout)?);
            Ok(())
        }
        Commands::Mode { mode } => set_mode(layout, mode),
        Commands::Tracks => list_tracks(layout),
        Commands::Select { filename } => select_track(layout, &filename),
        Commands::Add { path, name } => {
            let filename = wakeup_ipc::add_track(&layout.music_dir(), &path, name.as_deref())?;
            println!("Added '{filename}' to music library");
            Ok(())
        }
        Commands::Remove { filename } => remove_track(layout, &filename),
        Commands::Station { frequency } => set_station(layout, &frequency),
        Commands::Test { seconds } => {
            let config = Config::load()?;
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?
                .block_on(test_playback(&config, layout, Duration::from_secs(seconds)))
        }
        Commands::Snooze => raise_marker(&layout.snooze_marker(), "Snooze"),
        Commands::Stop => raise_marker(&layout.stop_marker(), "Stop"),
        Commands::Reset => raise_marker(&layout.reset_marker(), "Reset"),
    }
}

/// The mode document, or defaults if none has been written yet.
fn load_config(layout: &Layout) -> Result<WakeupConfig, DynError> {
    let path = layout.wakeup_config_file();
    match WakeupConfig::load(&path) {
        Ok(config) => Ok(config),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(WakeupConfig::default()),
        Err(e) => Err(format!("cannot read {}: {e}", path.display()).into()),
    }
}

fn save_config(layout: &Layout, config: &WakeupConfig) -> Result<(), DynError> {
    let path = layout.wakeup_config_file();
    config
        .save(&path)
        .map_err(|e| format!("cannot write {}: {e}", path.display()))?;
    tracing::debug!("Saved {}", path.display());
    Ok(())
}

fn set_mode(layout: &Layout, mode: WakeupMode) -> Result<(), DynError> {
    let mut config = load_config(layout)?;
    let old = config.mode;
    config.mode = mode;
    save_config(layout, &config)?;
    println!("Wake-up mode changed from '{old}' to '{mode}' ({})", mode.description());
    if mode == WakeupMode::Mp3 && config.mp3_track.is_none() {
        println!("No MP3 track selected yet; the alarm will use pianobar until you run 'select'");
    }
    Ok(())
}

fn list_tracks(layout: &Layout) -> Result<(), DynError> {
    let config = load_config(layout)?;
    let tracks = wakeup_ipc::list_tracks(&layout.music_dir())?;
    if tracks.is_empty() {
        println!("No MP3 files found in {}", layout.music_dir().display());
        return Ok(());
    }
    for track in tracks {
        let marker = if config.mp3_track.as_deref() == Some(track.filename.as_str()) {
            "*"
        } else {
            " "
        };
        let size_mb = track.size_bytes as f64 / (1024.0 * 1024.0);
        println!("{marker} {} ({size_mb:.1} MB)", track.filename);
    }
    Ok(())
}

fn select_track(layout: &Layout, filename: &str) -> Result<(), DynError> {
    let mut config = load_config(layout)?;
    config.select_track(&layout.music_dir(), filename)?;
    save_config(layout, &config)?;
    println!("Selected '{filename}' as MP3 wake-up track");
    if config.mode != WakeupMode::Mp3 {
        println!("Mode is still '{}'; run 'mode mp3' to use it", config.mode);
    }
    Ok(())
}

fn remove_track(layout: &Layout, filename: &str) -> Result<(), DynError> {
    wakeup_ipc::remove_track(&layout.music_dir(), filename)?;
    let mut config = load_config(layout)?;
    if config.mp3_track.as_deref() == Some(filename) {
        config.mp3_track = None;
        save_config(layout, &config)?;
        println!("Cleared the selected track");
    }
    println!("Removed '{filename}'");
    Ok(())
}

fn set_station(layout: &Layout, frequency: &str) -> Result<(), DynError> {
    let mhz: f32 = frequency
        .parse()
        .map_err(|_| format!("'{frequency}' is not a frequency in MHz"))?;
    if !(87.5..=108.0).contains(&mhz) {
        return Err(format!("{frequency} MHz is outside the FM band (87.5-108.0)").into());
    }
    let mut config = load_config(layout)?;
    config.fm_station = frequency.to_string();
    save_config(layout, &config)?;
    println!("FM station set to {frequency}");
    Ok(())
}

/// Start the backend the daemon would pick right now, let it play for `limit`, then kill it.
async fn test_playback(config: &Config, layout: &Layout, limit: Duration) -> Result<(), DynError> {
    let wakeup = load_config(layout)?;
    let player = PlayerController::new(&config.player, &layout.music_dir());
    let handle = player.start(SessionId(0), &wakeup).await?;
    println!("Testing '{}' mode on the {} backend for {}s", wakeup.mode, handle.backend, limit.as_secs());

    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if !player.is_alive(&handle).await {
            println!("{} backend exited before the test ended; check its configuration", handle.backend);
            return Ok(());
        }
        tokio::time::sleep(TEST_POLL).await;
    }
    player.stop(handle.id).await?;
    println!("Test complete");
    Ok(())
}

/// Create the marker the daemon watches for; it deletes the marker once handled.
fn raise_marker(path: &Path, what: &str) -> Result<(), DynError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, b"")?;
    tracing::debug!("Created {}", path.display());
    println!("{what} requested");
    Ok(())
}

fn status_report(layout: &Layout) -> Result<String, DynError> {
    let config = load_config(layout)?;
    let mut report = String::new();

    report.push_str(&format!("Mode: {} ({})\n", config.mode, config.mode.description()));
    match &config.mp3_track {
        Some(track) if layout.music_dir().join(track).is_file() => {
            report.push_str(&format!("MP3 track: {track}\n"));
        }
        Some(track) => report.push_str(&format!("MP3 track: {track} (missing)\n")),
        None => report.push_str("MP3 track: none selected\n"),
    }
    report.push_str(&format!("FM station: {}\n", config.fm_station));

    report.push_str(&format!("Alarm: {}\n", describe_alarm_state(&layout.state_file())));

    let display = std::fs::read_to_string(layout.display_file())
        .ok()
        .and_then(|text| text.parse::<DisplayStatus>().ok())
        .unwrap_or(DisplayStatus::Idle);
    let display = match display {
        DisplayStatus::Idle => "idle".to_string(),
        other => other.to_string(),
    };
    report.push_str(&format!("Display: {display}\n"));

    let pending: Vec<&str> = [
        (layout.stop_marker(), wakeup_ipc::STOP_MARKER),
        (layout.snooze_marker(), wakeup_ipc::SNOOZE_MARKER),
        (layout.reset_marker(), wakeup_ipc::RESET_MARKER),
    ]
    .iter()
    .filter(|(path, _)| path.exists())
    .map(|(_, name)| *name)
    .collect();
    if pending.is_empty() {
        report.push_str("Pending markers: none\n");
    } else {
        report.push_str(&format!("Pending markers: {}\n", pending.join(", ")));
    }
    Ok(report)
}

/// One-line summary of the daemon's persisted state file.
fn describe_alarm_state(path: &Path) -> String {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return "no state recorded".to_string();
    };
    let Ok(state) = serde_json::from_str::<serde_json::Value>(&contents) else {
        return "state file unreadable".to_string();
    };

    let mut parts = Vec::new();
    match state["last_triggered_date"].as_str() {
        Some(date) => parts.push(format!("last fired {date}")),
        None => parts.push("not fired today".to_string()),
    }
    if let Some(until) = state["snooze_until"].as_str() {
        parts.push(format!("snoozed until {until}"));
    }
    if state["is_active"].as_bool() == Some(true) {
        parts.push("ringing".to_string());
    }
    parts.join(", ")
}
