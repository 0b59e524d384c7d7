//! Builds Spotify streaming-history records from raw play events.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{AdditionalInfo, OutputRecord, RawPlayEvent};
use crate::resolver::Resolver;
use crate::spotify::SearchApi;

/// Platform string stamped on every converted record.
pub const PLATFORM: &str = "ListenBrainz Importer";

const REASON_START: &str = "trackdone";

/// Record construction failure.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The event's timestamp cannot be represented; recoverable, the event
    /// is skipped like any other malformed input.
    #[error("listened_at {0} outside the representable range")]
    Timestamp(i64),
    /// Cache persistence failure from the resolver; fatal to the run.
    #[error(transparent)]
    Cache(#[from] anyhow::Error),
}

/// How a record obtained (or failed to obtain) its track URI.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// The event already embedded a track page reference; no search ran.
    DirectUri,
    /// The resolver produced a match (from cache or the network).
    Matched,
    /// Every strategy came up empty; raw album, null URI.
    Unmatched,
}

pub struct BuiltRecord {
    pub record: OutputRecord,
    pub resolution: Resolution,
}

/// Fast path: a `spotify_id` pointing at a recognized track page yields the
/// canonical URI from its last path segment, bypassing search entirely.
pub fn direct_track_uri(info: &AdditionalInfo) -> Option<String> {
    let id = info.spotify_id.as_deref()?;
    if !id.contains("open.spotify.com/track/") {
        return None;
    }
    let tail = id.rsplit('/').next()?;
    Some(format!("spotify:track:{tail}"))
}

fn iso_utc(epoch_seconds: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(epoch_seconds, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
}

/// Turns one raw play event into one output record, consulting the resolver
/// only when the event does not already carry a usable track reference.
pub struct RecordBuilder<S: SearchApi> {
    resolver: Resolver<S>,
    username: String,
    country_code: String,
}

impl<S: SearchApi> RecordBuilder<S> {
    pub fn new(resolver: Resolver<S>, username: String, country_code: String) -> Self {
        Self {
            resolver,
            username,
            country_code,
        }
    }

    pub fn resolver(&self) -> &Resolver<S> {
        &self.resolver
    }

    pub fn build(&mut self, event: &RawPlayEvent) -> Result<BuiltRecord, BuildError> {
        let ts = iso_utc(event.listened_at).ok_or(BuildError::Timestamp(event.listened_at))?;

        let meta = &event.track_metadata;
        let info = &meta.additional_info;
        let artist_raw = meta.artist_name.trim();
        let track_raw = meta.track_name.trim();
        let album_raw = meta.release_name.trim();

        let (spotify_track_uri, album_name, resolution) = if let Some(uri) = direct_track_uri(info)
        {
            (Some(uri), album_raw.to_string(), Resolution::DirectUri)
        } else {
            match self.resolver.resolve(artist_raw, track_raw)? {
                Some(resolved) => (
                    Some(resolved.spotify_track_uri),
                    resolved.album_name,
                    Resolution::Matched,
                ),
                None => (None, album_raw.to_string(), Resolution::Unmatched),
            }
        };

        let record = OutputRecord {
            ts,
            username: self.username.clone(),
            platform: PLATFORM.to_string(),
            ms_played: info.duration_ms.unwrap_or(0),
            conn_country: self.country_code.clone(),
            ip_addr_decrypted: None,
            user_agent_decrypted: None,
            master_metadata_track_name: track_raw.to_string(),
            master_metadata_album_artist_name: artist_raw.to_string(),
            master_metadata_album_album_name: album_name,
            spotify_track_uri,
            episode_name: None,
            episode_show_name: None,
            spotify_episode_uri: None,
            reason_start: REASON_START.to_string(),
            reason_end: None,
            shuffle: false,
            skipped: false,
            offline: true,
            offline_timestamp: event.listened_at * 1000,
            incognito_mode: false,
        };

        Ok(BuiltRecord { record, resolution })
    }
}
