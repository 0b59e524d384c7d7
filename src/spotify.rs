//! Spotify Web API collaborators: token exchange and track search.
//!
//! The search side is behind the `SearchApi` trait so the resolver can be
//! exercised against stub endpoints in tests. `SpotifyClient` is the
//! production implementation.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Client-credentials token exchange endpoint.
pub const TOKEN_ENDPOINT: &str = "https://accounts.spotify.com/api/token";

/// Track search endpoint.
pub const SEARCH_ENDPOINT: &str = "https://api.spotify.com/v1/search";

/// Token exchange failure. Fatal: nothing can be resolved without a token.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token endpoint returned status {0}")]
    Status(u16),
    #[error("token request failed: {0}")]
    Transport(Box<ureq::Error>),
    #[error("malformed token response: {0}")]
    Body(#[from] std::io::Error),
}

/// Failure of a single search request. Recoverable: the resolver logs it and
/// moves on to the next query formulation.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("search returned status {0}")]
    Status(u16),
    #[error("search request failed: {0}")]
    Transport(Box<ureq::Error>),
    #[error("malformed search response: {0}")]
    Body(#[from] std::io::Error),
}

impl From<ureq::Error> for AuthError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, _) => AuthError::Status(code),
            other => AuthError::Transport(Box::new(other)),
        }
    }
}

impl From<ureq::Error> for QueryError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, _) => QueryError::Status(code),
            other => QueryError::Transport(Box::new(other)),
        }
    }
}

/// Top search hit for one query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackHit {
    pub uri: String,
    pub album_name: String,
}

/// Search endpoint seam. One query string in, at most one top hit out.
pub trait SearchApi {
    fn search_track(&self, query: &str) -> Result<Option<TrackHit>, QueryError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

// The search response is parsed permissively: an absent "tracks" page or
// "items" list is an empty result, not a shape error.
#[derive(Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    tracks: TracksPage,
}

#[derive(Default, Deserialize)]
struct TracksPage {
    #[serde(default)]
    items: Vec<TrackItem>,
}

#[derive(Deserialize)]
struct TrackItem {
    uri: String,
    album: AlbumRef,
}

#[derive(Deserialize)]
struct AlbumRef {
    name: String,
}

/// Shared blocking agent with per-request timeouts. Network timeouts are the
/// only timeout handling in the pipeline.
pub fn http_agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(5))
        .timeout_read(Duration::from_secs(10))
        .timeout_write(Duration::from_secs(10))
        .build()
}

/// Exchanges client credentials for a bearer token. Called once per run; the
/// token is reused for every search (runs are short-lived batch jobs, no
/// refresh logic).
pub fn fetch_access_token(
    agent: &ureq::Agent,
    client_id: &str,
    client_secret: &str,
) -> Result<String, AuthError> {
    let basic = BASE64.encode(format!("{client_id}:{client_secret}"));
    let response = agent
        .post(TOKEN_ENDPOINT)
        .set("Authorization", &format!("Basic {basic}"))
        .send_form(&[("grant_type", "client_credentials")])?;
    let body: TokenResponse = response.into_json()?;
    Ok(body.access_token)
}

/// Production search client: bearer-authenticated GET against the fixed
/// search endpoint, top result only.
pub struct SpotifyClient {
    agent: ureq::Agent,
    bearer: String,
}

impl SpotifyClient {
    pub fn new(agent: ureq::Agent, access_token: &str) -> Self {
        Self {
            agent,
            bearer: format!("Bearer {access_token}"),
        }
    }
}

impl SearchApi for SpotifyClient {
    fn search_track(&self, query: &str) -> Result<Option<TrackHit>, QueryError> {
        let url = format!(
            "{SEARCH_ENDPOINT}?q={}&type=track&limit=1",
            urlencoding::encode(query)
        );
        let response = self.agent.get(&url).set("Authorization", &self.bearer).call()?;
        let body: SearchResponse = response.into_json()?;
        Ok(body
            .tracks
            .items
            .into_iter()
            .next()
            .map(|item| TrackHit {
                uri: item.uri,
                album_name: item.album.name,
            }))
    }
}
