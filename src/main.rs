use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::info;

use audioprint::{Config, FingerprintIndex, Matcher, PeakPicker, TrackMetadata};

/// Snapshot every this many tracks during a long batch, so a crash loses
/// at most one chunk of work.
const FLUSH_EVERY: usize = 25;

const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "flac", "ogg", "m4a", "aac"];

#[derive(Parser)]
#[command(name = "audioprint", about = "Fingerprint a music catalog and identify clips against it")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fingerprint every audio file in a directory into an index.
    Ingest {
        /// Directory of audio files, named "Artist - Title.ext".
        #[arg(long)]
        dir: PathBuf,
        /// Output directory for the index snapshot.
        #[arg(long)]
        out: PathBuf,
        /// Use the adaptive peak extractor targeting this many peaks per
        /// second instead of the fixed filter.
        #[arg(long)]
        target_peaks_per_second: Option<u32>,
    },
    /// Identify an audio clip against an index.
    Identify {
        /// Index directory written by `ingest`.
        #[arg(long)]
        db: PathBuf,
        /// The clip to identify.
        clip: PathBuf,
    },
    /// Print index summary counters.
    Stats {
        #[arg(long)]
        db: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    match Cli::parse().command {
        Command::Ingest {
            dir,
            out,
            target_peaks_per_second,
        } => ingest(&dir, &out, target_peaks_per_second),
        Command::Identify { db, clip } => identify(&db, &clip),
        Command::Stats { db } => stats(&db),
    }
}

fn ingest(dir: &Path, out: &Path, target_peaks_per_second: Option<u32>) -> anyhow::Result<()> {
    let config = Config {
        peak_picker: match target_peaks_per_second {
            Some(target_peaks_per_second) => PeakPicker::Adaptive {
                target_peaks_per_second,
            },
            None => PeakPicker::Fixed,
        },
        ..Config::default()
    };

    // Extend an existing index in place; otherwise start fresh.
    let mut index = if out.join("index.bin").exists() {
        let index = FingerprintIndex::load_checked(out, &config)
            .context("existing index is incompatible with the requested parameters")?;
        info!("extending existing index ({} tracks)", index.stats().tracks);
        index
    } else {
        FingerprintIndex::new(config)
    };

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| AUDIO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        })
        .collect();
    files.sort();
    if files.is_empty() {
        bail!("no audio files in {}", dir.display());
    }
    info!("found {} audio files", files.len());

    let already: std::collections::HashSet<String> = index
        .tracks()
        .filter_map(|t| t.extra.get("filename"))
        .filter_map(|v| v.as_str().map(str::to_owned))
        .collect();
    let mut next_id = index.tracks().map(|t| t.id).max().unwrap_or(0) + 1;

    let mut batch = Vec::new();
    for path in files {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_owned();
        if already.contains(&filename) {
            info!("already ingested, skipping {}", filename);
            continue;
        }
        let (artist, title) = parse_artist_title(&filename);
        let mut metadata = TrackMetadata::new(next_id, title, artist);
        metadata
            .extra
            .insert("filename".into(), serde_json::Value::String(filename));
        next_id += 1;
        batch.push((path, metadata));
    }

    let mut failed = 0usize;
    for chunk in batch.chunks(FLUSH_EVERY) {
        failed += index.ingest_batch(chunk.to_vec()).len();
        index.save(out)?;
    }

    let stats = index.stats();
    println!(
        "{} tracks indexed ({} failed), {} keys, {} postings",
        stats.tracks, failed, stats.keys, stats.postings
    );
    Ok(())
}

fn identify(db: &Path, clip: &Path) -> anyhow::Result<()> {
    let index = FingerprintIndex::load(db)?;
    let matcher = Matcher::new(&index)?;
    let result = matcher.identify_file(clip)?;

    match &result.track {
        Some(track) => {
            let percent = result.confidence * 100.0;
            let verdict = if percent > 70.0 {
                "high"
            } else if percent > 40.0 {
                "medium"
            } else {
                "low"
            };
            println!("Best match: '{}' by {}", track.title, track.artist);
            println!(
                "Confidence: {:.1}% ({}), offset {} frames",
                percent,
                verdict,
                result.time_offset.unwrap_or(0)
            );
        }
        None => println!("No match found"),
    }
    Ok(())
}

fn stats(db: &Path) -> anyhow::Result<()> {
    let index = FingerprintIndex::load(db)?;
    let stats = index.stats();
    println!("tracks:   {}", stats.tracks);
    println!("keys:     {}", stats.keys);
    println!("postings: {}", stats.postings);
    println!("config:   {:?}", index.config());
    Ok(())
}

/// Derive (artist, title) from an "Artist - Title.ext" filename. Files
/// without the separator keep the whole stem as the title.
fn parse_artist_title(filename: &str) -> (String, String) {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);
    match stem.split_once(" - ") {
        Some((artist, title)) => (artist.trim().to_owned(), title.trim().to_owned()),
        None => ("Unknown Artist".to_owned(), stem.to_owned()),
    }
}
