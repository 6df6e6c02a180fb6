//! jamseq: build backing-track sequences from TOML arrangements

mod arrangement;
mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use jamseq_core::{BuiltSequence, CompingGenerator, GeneratorRegistry, MidiMix, Song};
use jamseq_services::{BuildWorker, MidiFileExporter};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::arrangement::Arrangement;
use crate::config::CliConfig;

#[derive(Parser)]
#[command(name = "jamseq", version, about = "Build backing-track MIDI sequences")]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the sequence and write a Standard MIDI File
    Export {
        arrangement: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Build the sequence and print a JSON summary of its tracks
    Inspect { arrangement: PathBuf },
}

#[derive(Serialize)]
struct Summary<'a> {
    song: &'a str,
    tempo: u32,
    bars: u32,
    ppq: u32,
    ticks: u64,
    tracks: Vec<TrackSummary>,
}

#[derive(Serialize)]
struct TrackSummary {
    index: usize,
    name: Option<String>,
    voice: Option<String>,
    channel: Option<u8>,
    events: usize,
    notes: usize,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(config::config_path);
    let config = config::load_config(&config_path);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("jamseq=info"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Command::Export { arrangement, output } => export(&config, &arrangement, output),
        Command::Inspect { arrangement } => inspect(&arrangement),
    }
}

/// Build on the worker thread with the comping generator as fallback for every rhythm
fn build(arrangement: &Arrangement) -> anyhow::Result<(MidiMix, BuiltSequence)> {
    let mix = arrangement.midi_mix()?;
    let registry = Arc::new(GeneratorRegistry::new().with_fallback(Box::new(CompingGenerator::new())));

    let worker = BuildWorker::spawn(arrangement.song.clone(), mix.clone(), registry);
    let built = worker
        .wait_with(|stage| info!(%stage, "Building"))
        .with_context(|| format!("Failed to build \"{}\"", arrangement.song.name))?;
    Ok((mix, built))
}

fn export(config: &CliConfig, path: &Path, output: Option<PathBuf>) -> anyhow::Result<()> {
    let arrangement = Arrangement::load(path)?;
    let (mix, built) = build(&arrangement)?;

    let output = output.unwrap_or_else(|| {
        config
            .export
            .directory
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(file_name(&arrangement.song))
    });
    MidiFileExporter::new(&arrangement.song, &mix)
        .with_copyright(config.export.copyright.clone())
        .prepare(built)
        .context("Failed to prepare MIDI export")?
        .write(&output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("{}", output.display());
    Ok(())
}

fn inspect(path: &Path) -> anyhow::Result<()> {
    let arrangement = Arrangement::load(path)?;
    let (mix, built) = build(&arrangement)?;
    let song = &arrangement.song;

    let tracks = built
        .sequence
        .tracks
        .iter()
        .enumerate()
        .map(|(index, track)| {
            let voice = built.voice_of(index);
            TrackSummary {
                index,
                name: track.name().map(str::to_string),
                voice: voice.map(ToString::to_string),
                channel: voice.and_then(|v| mix.channel_of(v)),
                events: track.len(),
                notes: track.iter().filter(|e| e.event.is_note_on()).count(),
            }
        })
        .collect();
    let summary = Summary {
        song: &song.name,
        tempo: song.tempo,
        bars: song.total_bars(),
        ppq: built.sequence.ppq,
        ticks: built.sequence.tick_length(),
        tracks,
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn file_name(song: &Song) -> String {
    let stem: String = song
        .name
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    format!("{stem}.mid")
}
