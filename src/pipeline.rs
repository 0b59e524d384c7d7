//! The conversion pipeline: walks the export tree, converts every event, and
//! writes the output file and the unmatched report.
//!
//! Processing is sequential and the output array preserves input order
//! (files in sorted walk order, lines in file order). Per-event failures are
//! logged and skipped; cache and output I/O failures abort the run.

use anyhow::{Context, Result};
use rustc_hash::FxHashSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;
use walkdir::WalkDir;

use crate::models::{ConversionStats, OutputRecord, RawPlayEvent};
use crate::progress::{create_progress_bar, log_progress};
use crate::record::{BuildError, RecordBuilder, Resolution};
use crate::spotify::SearchApi;

/// Recognized input extension.
const INPUT_EXTENSION: &str = "jsonl";

/// Plays submitted from this service already exist in Spotify's own export
/// and would only duplicate history.
const SKIPPED_SERVICE: &str = "spotify.com";

/// All `.jsonl` files under `folder`, recursively, in deterministic sorted
/// walk order.
pub fn jsonl_files_in(folder: &Path) -> Vec<PathBuf> {
    WalkDir::new(folder)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == INPUT_EXTENSION))
        .collect()
}

/// Runs the full conversion. Returns the run statistics; the output file and
/// unmatched report are written before returning.
pub fn run<S: SearchApi>(
    data_folder: &Path,
    mut builder: RecordBuilder<S>,
    output_path: &Path,
    unknowns_path: &Path,
) -> Result<ConversionStats> {
    let start = Instant::now();
    let mut stats = ConversionStats::default();

    // Recreate the report up front so a failed run never leaves a stale one.
    fs::write(unknowns_path, "").with_context(|| {
        format!("failed to create unmatched report {}", unknowns_path.display())
    })?;

    let files = jsonl_files_in(data_folder);
    stats.files_scanned = files.len();

    let mut records: Vec<OutputRecord> = Vec::new();
    let mut unmatched: FxHashSet<String> = FxHashSet::default();
    let mut events_seen: u64 = 0;

    let pb = create_progress_bar(files.len() as u64, "Converting");
    for path in &files {
        let file = File::open(path)
            .with_context(|| format!("failed to open input file {}", path.display()))?;
        for line in BufReader::new(file).lines() {
            let line =
                line.with_context(|| format!("failed to read from {}", path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            events_seen += 1;
            log_progress("convert", events_seen, 100);

            let event: RawPlayEvent = match serde_json::from_str(&line) {
                Ok(event) => event,
                Err(err) => {
                    stats.parse_errors += 1;
                    eprintln!("[parse] {}: {}", path.display(), err);
                    continue;
                }
            };

            let meta = &event.track_metadata;
            if meta.additional_info.music_service.as_deref() == Some(SKIPPED_SERVICE) {
                stats.skipped_spotify += 1;
                continue;
            }

            let built = match builder.build(&event) {
                Ok(built) => built,
                Err(BuildError::Timestamp(ts)) => {
                    stats.parse_errors += 1;
                    eprintln!("[parse] {}: listened_at {} out of range", path.display(), ts);
                    continue;
                }
                Err(BuildError::Cache(err)) => return Err(err),
            };

            match built.resolution {
                Resolution::DirectUri => stats.direct_uri += 1,
                Resolution::Matched => stats.resolved += 1,
                Resolution::Unmatched => {
                    unmatched.insert(format!(
                        "{} – {}",
                        meta.artist_name.trim(),
                        meta.track_name.trim()
                    ));
                }
            }
            records.push(built.record);
            stats.converted += 1;
        }
        pb.inc(1);
    }
    pb.finish_with_message(format!("Converted {} events", stats.converted));

    write_output(output_path, &records)?;
    write_unmatched_report(unknowns_path, &unmatched)?;

    let mut unique_artists: FxHashSet<&str> = FxHashSet::default();
    let mut unique_tracks: FxHashSet<&str> = FxHashSet::default();
    for record in &records {
        unique_artists.insert(&record.master_metadata_album_artist_name);
        unique_tracks.insert(&record.master_metadata_track_name);
        stats.total_ms_played += record.ms_played;
    }
    stats.unique_artists = unique_artists.len();
    stats.unique_tracks = unique_tracks.len();
    stats.unmatched = unmatched.len();
    stats.cache_hits = builder.resolver().cache_hits;
    stats.api_queries = builder.resolver().api_queries;
    stats.elapsed_seconds = start.elapsed().as_secs_f64();

    Ok(stats)
}

/// One pretty-printed JSON array, written once at end of run.
fn write_output(path: &Path, records: &[OutputRecord]) -> Result<()> {
    let json = serde_json::to_string_pretty(records)?;
    fs::write(path, json)
        .with_context(|| format!("failed to write output file {}", path.display()))
}

/// Sorted, newline-delimited raw "artist – track" strings.
fn write_unmatched_report(path: &Path, unmatched: &FxHashSet<String>) -> Result<()> {
    let mut lines: Vec<&str> = unmatched.iter().map(String::as_str).collect();
    lines.sort_unstable();
    fs::write(path, lines.join("\n"))
        .with_context(|| format!("failed to write unmatched report {}", path.display()))
}
