//! Core data models for the conversion pipeline.
//!
//! This module contains the input event schema, the cache value shape, the
//! Spotify streaming-history output record, and the run statistics.

use anyhow::Result;
use serde::{Deserialize, Serialize};

// ============================================================================
// Input Models (ListenBrainz export)
// ============================================================================

/// One played track from a ListenBrainz export line.
///
/// `listened_at` and `track_metadata` are required; a line missing either
/// fails deserialization and is skipped as a parse error. Everything below
/// them is optional with explicit defaults, so a sparse event never turns
/// into a null deep inside record construction.
#[derive(Clone, Debug, Deserialize)]
pub struct RawPlayEvent {
    pub listened_at: i64,
    pub track_metadata: TrackMetadata,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TrackMetadata {
    #[serde(default)]
    pub artist_name: String,
    #[serde(default)]
    pub track_name: String,
    #[serde(default)]
    pub release_name: String,
    #[serde(default)]
    pub additional_info: AdditionalInfo,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AdditionalInfo {
    /// Play duration; absent or null means unknown and becomes 0 in output.
    #[serde(default)]
    pub duration_ms: Option<i64>,
    /// Service the play was submitted from, e.g. "spotify.com".
    #[serde(default)]
    pub music_service: Option<String>,
    /// Track page URL submitted by the client, when it knew one.
    #[serde(default)]
    pub spotify_id: Option<String>,
}

// ============================================================================
// Resolution Models
// ============================================================================

/// A resolved Spotify match. Also the positive cache value shape; the
/// negative cache entry is a JSON `null` tombstone (`Option::None`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedMatch {
    pub spotify_track_uri: String,
    pub album_name: String,
}

// ============================================================================
// Output Models (Spotify extended streaming history)
// ============================================================================

/// One record of Spotify's extended streaming history schema.
///
/// The field set and order are fixed by the target format. Episode fields are
/// always null for music plays; `shuffle`/`skipped`/`incognito_mode` are
/// always false and `offline` always true, since the source export carries no
/// equivalent signals.
#[derive(Clone, Debug, Serialize)]
pub struct OutputRecord {
    pub ts: String,
    pub username: String,
    pub platform: String,
    pub ms_played: i64,
    pub conn_country: String,
    pub ip_addr_decrypted: Option<String>,
    pub user_agent_decrypted: Option<String>,
    pub master_metadata_track_name: String,
    pub master_metadata_album_artist_name: String,
    pub master_metadata_album_album_name: String,
    pub spotify_track_uri: Option<String>,
    pub episode_name: Option<String>,
    pub episode_show_name: Option<String>,
    pub spotify_episode_uri: Option<String>,
    pub reason_start: String,
    pub reason_end: Option<String>,
    pub shuffle: bool,
    pub skipped: bool,
    pub offline: bool,
    pub offline_timestamp: i64,
    pub incognito_mode: bool,
}

// ============================================================================
// Statistics (Instrumentation)
// ============================================================================

/// Per-run conversion statistics, printed as the final summary and optionally
/// written as JSON.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ConversionStats {
    pub files_scanned: usize,
    pub converted: usize,
    pub skipped_spotify: usize,
    pub parse_errors: usize,

    // How each converted record got its URI
    pub direct_uri: usize,
    pub resolved: usize,
    pub unmatched: usize,

    // Resolver traffic
    pub cache_hits: usize,
    pub api_queries: usize,

    // Computed over the emitted records
    pub unique_artists: usize,
    pub unique_tracks: usize,
    pub total_ms_played: i64,

    pub elapsed_seconds: f64,
}

impl ConversionStats {
    /// Share of converted records that carry a Spotify URI, as a percentage.
    pub fn match_rate(&self) -> f64 {
        if self.converted == 0 {
            0.0
        } else {
            100.0 * (self.converted - self.unmatched) as f64 / self.converted as f64
        }
    }

    /// Total play time as whole hours and leftover minutes.
    pub fn play_time_hours_minutes(&self) -> (i64, i64) {
        let total_minutes = self.total_ms_played / 60_000;
        (total_minutes / 60, total_minutes % 60)
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &std::path::Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_parses_with_sparse_metadata() {
        let event: RawPlayEvent =
            serde_json::from_str(r#"{"listened_at": 1700000000, "track_metadata": {}}"#).unwrap();
        assert_eq!(event.listened_at, 1700000000);
        assert_eq!(event.track_metadata.artist_name, "");
        assert_eq!(event.track_metadata.additional_info.duration_ms, None);
    }

    #[test]
    fn test_event_rejects_missing_required_fields() {
        assert!(serde_json::from_str::<RawPlayEvent>(r#"{"track_metadata": {}}"#).is_err());
        assert!(serde_json::from_str::<RawPlayEvent>(r#"{"listened_at": 1}"#).is_err());
    }

    #[test]
    fn test_event_tolerates_null_duration() {
        let event: RawPlayEvent = serde_json::from_str(
            r#"{"listened_at": 1, "track_metadata": {"additional_info": {"duration_ms": null}}}"#,
        )
        .unwrap();
        assert_eq!(event.track_metadata.additional_info.duration_ms, None);
    }

    #[test]
    fn test_match_rate() {
        let stats = ConversionStats {
            converted: 200,
            unmatched: 50,
            ..Default::default()
        };
        assert!((stats.match_rate() - 75.0).abs() < f64::EPSILON);
        assert_eq!(ConversionStats::default().match_rate(), 0.0);
    }

    #[test]
    fn test_play_time_hours_minutes() {
        let stats = ConversionStats {
            total_ms_played: 2 * 3_600_000 + 15 * 60_000 + 59_000,
            ..Default::default()
        };
        assert_eq!(stats.play_time_hours_minutes(), (2, 15));
    }
}
