//! # AlterTune - Command-line Player
//!
//! Plays a looping arpeggio over an alternative string tuning and manages
//! saved fingering presets.
//!
//! ## Architecture
//! - **Main Thread**: argument parsing, session loading, waiting for the user
//! - **Scheduler Thread**: lookahead scheduling of plucked notes
//! - **Audio Callback**: CPAL output stream rendering the notes
//! - **Communication**: Crossbeam channel from scheduler to audio callback

use altertune_core::{
    Player, SessionFile, SharedSession,
    audio,
    presets::{FingeringPreset, JsonPresetStore, PresetStore},
    tuning::Fingering,
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "altertune")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Explore alternative string tunings by ear", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a session until Enter is pressed or the duration runs out
    Play {
        /// Session file (JSON); the built-in standard-tuning session if omitted
        #[arg(short, long, value_name = "FILE")]
        session: Option<PathBuf>,

        /// Stop after this many seconds
        #[arg(long)]
        seconds: Option<f64>,

        /// Override the session tempo
        #[arg(long)]
        bpm: Option<f64>,

        /// Use the fingering of a saved preset
        #[arg(long, value_name = "ID")]
        preset: Option<String>,

        /// Preset store file
        #[arg(long, value_name = "FILE")]
        store: Option<PathBuf>,
    },

    /// Write the built-in session to a file as a starting point for editing
    Init {
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },

    /// Manage saved fingerings
    Presets {
        /// Preset store file
        #[arg(long, value_name = "FILE")]
        store: Option<PathBuf>,

        #[command(subcommand)]
        action: PresetCommand,
    },
}

#[derive(Subcommand, Debug)]
enum PresetCommand {
    /// List presets, newest first
    List {
        /// Only presets for this many strings
        #[arg(long)]
        strings: Option<usize>,
    },
    /// Save a fingering given as comma-separated frets (x or -1 mutes), or from a session file
    Save {
        name: String,
        #[arg(long, allow_hyphen_values = true, conflicts_with = "session")]
        frets: Option<String>,
        /// Take the fingering and tuning name from a session file
        #[arg(long, value_name = "FILE")]
        session: Option<PathBuf>,
        /// Overwrite the preset with this id
        #[arg(long)]
        id: Option<String>,
    },
    /// Rename a preset
    Rename { id: String, name: String },
    /// Delete a preset
    Delete { id: String },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match args.command {
        Commands::Play {
            session,
            seconds,
            bpm,
            preset,
            store,
        } => play(session.as_deref(), seconds, bpm, preset.as_deref(), store),
        Commands::Init { path } => {
            SessionFile::default().save(&path)?;
            log::info!("Wrote default session to {}", path.display());
            Ok(())
        }
        Commands::Presets { store, action } => {
            let mut store = JsonPresetStore::new(store_path(store)?);
            run_preset_command(&mut store, action)
        }
    }
}

/// Default preset location under the user's data directory.
fn store_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => dirs::data_dir()
            .map(|dir| dir.join("altertune").join("fingerings.json"))
            .ok_or_else(|| anyhow!("No data directory available; pass --store")),
    }
}

fn load_session(path: Option<&Path>) -> Result<SessionFile> {
    match path {
        Some(path) => SessionFile::load(path),
        None => Ok(SessionFile::default()),
    }
}

fn play(
    session_path: Option<&Path>,
    seconds: Option<f64>,
    bpm: Option<f64>,
    preset: Option<&str>,
    store: Option<PathBuf>,
) -> Result<()> {
    let SessionFile { session, scheduler } = load_session(session_path)?;
    let session = SharedSession::new(session);

    if let Some(id) = preset {
        let store = JsonPresetStore::new(store_path(store)?);
        let preset = store
            .get(id)?
            .ok_or_else(|| anyhow!("No preset with id {}", id))?;
        apply_preset(&session, &preset);
    }

    let output = audio::start_audio_output().context("Failed to start audio output")?;
    let mut player = Player::new(session, output.timeline(), output.sink(), scheduler)?;
    if let Some(bpm) = bpm {
        player.set_bpm(bpm);
    }

    {
        let session = player.session().read();
        log::info!(
            "Playing {} at {} BPM, frets {:?}",
            session.tuning.name.as_deref().unwrap_or("custom tuning"),
            session.transport.bpm,
            session.fingering.frets
        );
    }
    player.play();

    match seconds {
        Some(seconds) if seconds.is_finite() && seconds > 0.0 => {
            std::thread::sleep(Duration::from_secs_f64(seconds));
        }
        _ => {
            println!("Press Enter to stop.");
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
        }
    }

    player.stop();
    let stats = player.stats();
    log::info!(
        "Stopped after {} ticks ({} skipped), {} notes, {} capped windows",
        stats.ticks,
        stats.skipped_ticks,
        stats.notes_delivered,
        player.cap_hits()
    );
    // Let the last notes ring out.
    std::thread::sleep(Duration::from_millis(300));
    output.pause()?;
    Ok(())
}

fn apply_preset(session: &SharedSession, preset: &FingeringPreset) {
    session.update(|s| {
        if preset.strings_count != s.tuning.string_count() {
            log::warn!(
                "Preset {:?} is for {} strings, the tuning has {}",
                preset.name,
                preset.strings_count,
                s.tuning.string_count()
            );
        }
        s.fingering = preset.fingering.clone();
    });
    log::info!("Using fingering preset {:?}", preset.name);
}

fn parse_frets(text: &str) -> Result<Fingering> {
    let frets = text
        .split(',')
        .map(|f| match f.trim() {
            "x" | "X" => Ok(-1),
            f => f
                .parse::<i32>()
                .with_context(|| format!("Invalid fret {:?}", f)),
        })
        .collect::<Result<Vec<_>>>()?;
    let mut fingering = Fingering::default();
    for (i, fret) in frets.into_iter().enumerate() {
        fingering.set_fret(i, fret);
    }
    Ok(fingering)
}

fn run_preset_command(store: &mut dyn PresetStore, action: PresetCommand) -> Result<()> {
    match action {
        PresetCommand::List { strings } => {
            let presets = match strings {
                Some(n) => store.list_for_strings(n)?,
                None => store.list()?,
            };
            for preset in presets {
                println!(
                    "{}  {:<24} {} strings  {:?}{}",
                    preset.id,
                    preset.name,
                    preset.strings_count,
                    preset.fingering.frets,
                    preset
                        .tuning_name
                        .map(|t| format!("  ({})", t))
                        .unwrap_or_default()
                );
            }
        }
        PresetCommand::Save {
            name,
            frets,
            session,
            id,
        } => {
            let (fingering, strings_count, tuning_name) = match (frets, session) {
                (Some(frets), _) => {
                    let fingering = parse_frets(&frets)?;
                    let count = fingering.frets.len();
                    (fingering, count, None)
                }
                (None, path) => {
                    let file = load_session(path.as_deref())?;
                    let tuning = file.session.tuning;
                    (file.session.fingering, tuning.string_count(), tuning.name)
                }
            };
            let preset = store.save(
                &name,
                &fingering,
                strings_count,
                tuning_name.as_deref(),
                id.as_deref(),
            )?;
            println!("{}", preset.id);
        }
        PresetCommand::Rename { id, name } => store.rename(&id, &name)?,
        PresetCommand::Delete { id } => store.remove(&id)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use altertune_core::presets::MemoryPresetStore;

    #[test]
    fn parses_fret_lists() {
        assert_eq!(parse_frets("x,3,2,0,1,0").unwrap().frets, vec![-1, 3, 2, 0, 1, 0]);
        assert_eq!(parse_frets(" -1, 30 ").unwrap().frets, vec![-1, 24]);
        assert!(parse_frets("0,a").is_err());
    }

    #[test]
    fn save_from_frets_records_string_count() {
        let mut store = MemoryPresetStore::new();
        run_preset_command(
            &mut store,
            PresetCommand::Save {
                name: "C major".into(),
                frets: Some("x,3,2,0,1,0".into()),
                session: None,
                id: Some("c".into()),
            },
        )
        .unwrap();
        let preset = store.get("c").unwrap().unwrap();
        assert_eq!(preset.strings_count, 6);
        assert_eq!(preset.fingering.frets[0], -1);
    }

    #[test]
    fn cli_arguments_parse() {
        let args = Args::try_parse_from(["altertune", "play", "--seconds", "2", "--bpm", "90"]).unwrap();
        assert!(matches!(
            args.command,
            Commands::Play { seconds: Some(s), bpm: Some(b), .. } if s == 2.0 && b == 90.0
        ));
        let args =
            Args::try_parse_from(["altertune", "presets", "save", "Mute", "--frets", "-1,0,0"]).unwrap();
        assert!(matches!(args.command, Commands::Presets { action: PresetCommand::Save { .. }, .. }));
    }

    #[test]
    fn preset_fingering_replaces_the_session_fingering() {
        let session = SharedSession::default();
        let mut store = MemoryPresetStore::new();
        let preset = store
            .save("Barre", &Fingering::from_frets([5, 7, 7, 6, 5, 5]), 6, None, None)
            .unwrap();
        apply_preset(&session, &preset);
        assert_eq!(session.read().fingering.frets, vec![5, 7, 7, 6, 5, 5]);
    }
}
