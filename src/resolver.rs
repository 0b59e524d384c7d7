//! Multi-strategy search resolution with write-through caching.
//!
//! Resolution has two distinct lookup granularities that must not be
//! conflated: an outer cache phase keyed by the *base* normalized pair
//! (hit, tombstone, or absent), and an inner fallback loop over query
//! variants that only runs when the base key is absent entirely. Whatever
//! the loop learns is cached back under the base key, so one entry answers
//! every future lookup for that pair.

use anyhow::Result;
use rustc_hash::FxHashSet;

use crate::cache::{cache_key, ResultCache};
use crate::models::ResolvedMatch;
use crate::normalize::{normalize, PARENTHETICAL};
use crate::spotify::SearchApi;

/// Ordered query variants for one normalized (artist, track) pair. First
/// match wins:
/// (a) the pair unchanged, (b) track-only, (c) artist truncated at " feat",
/// (d) track with any parenthetical/bracketed remainder stripped,
/// (e) track with the literal "remastered" removed.
fn query_variants(artist_norm: &str, track_norm: &str) -> [(String, String); 5] {
    [
        (artist_norm.to_string(), track_norm.to_string()),
        (String::new(), track_norm.to_string()),
        (
            artist_norm
                .split(" feat")
                .next()
                .unwrap_or(artist_norm)
                .to_string(),
            track_norm.to_string(),
        ),
        (
            artist_norm.to_string(),
            PARENTHETICAL.replace_all(track_norm, "").to_string(),
        ),
        (
            artist_norm.to_string(),
            track_norm.replace("remastered", "").trim().to_string(),
        ),
    ]
}

/// The three query formulations tried, in order, for one variant.
fn formulations(artist: &str, track: &str) -> [String; 3] {
    [
        format!("{track} artist:{artist}"),
        format!("{track} {artist}"),
        format!("track:{track}"),
    ]
}

/// Resolves raw (artist, track) pairs to Spotify matches through the cache
/// and the fallback search protocol.
pub struct Resolver<S: SearchApi> {
    search: S,
    cache: ResultCache,
    pub cache_hits: usize,
    pub api_queries: usize,
}

impl<S: SearchApi> Resolver<S> {
    pub fn new(search: S, cache: ResultCache) -> Self {
        Self {
            search,
            cache,
            cache_hits: 0,
            api_queries: 0,
        }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Resolves one raw pair. `Ok(None)` is a definitive no-match; `Err` is a
    /// cache persistence failure and fatal to the run. Search failures never
    /// surface here: each is logged and treated as no-result for that one
    /// formulation.
    pub fn resolve(&mut self, artist_raw: &str, track_raw: &str) -> Result<Option<ResolvedMatch>> {
        let artist_norm = normalize(artist_raw);
        let track_norm = normalize(track_raw);
        let base_key = cache_key(&artist_norm, &track_norm);

        if let Some(entry) = self.cache.get(&base_key) {
            self.cache_hits += 1;
            return Ok(entry.clone());
        }

        let mut tried: FxHashSet<(String, String)> = FxHashSet::default();
        let mut queried = false;

        for (alt_artist, alt_track) in query_variants(&artist_norm, &track_norm) {
            let alt_artist = alt_artist.trim().to_string();
            let alt_track = alt_track.trim().to_string();
            if alt_track.is_empty() {
                continue;
            }
            // Variants often collapse into each other once normalization has
            // already stripped parentheses; query each distinct pair once.
            if !tried.insert((alt_artist.clone(), alt_track.clone())) {
                continue;
            }

            for query in formulations(&alt_artist, &alt_track) {
                queried = true;
                self.api_queries += 1;
                match self.search.search_track(&query) {
                    Ok(Some(hit)) => {
                        let resolved = ResolvedMatch {
                            spotify_track_uri: hit.uri,
                            album_name: hit.album_name,
                        };
                        self.cache.put(&base_key, Some(resolved.clone()))?;
                        return Ok(Some(resolved));
                    }
                    Ok(None) => {}
                    Err(err) => {
                        eprintln!("[search] query '{query}' failed: {err}");
                    }
                }
            }
        }

        // Only a real exhausted search earns a tombstone. If every variant
        // was skipped (empty track), nothing was learned from the network
        // and nothing is cached.
        if queried {
            self.cache.put(&base_key, None)?;
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spotify::{QueryError, TrackHit};
    use rustc_hash::FxHashMap;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::TempDir;

    /// Stub search endpoint answering only the exact query strings it was
    /// seeded with, recording every query it sees.
    struct StubSearch {
        answers: FxHashMap<String, TrackHit>,
        failing: FxHashSet<String>,
        calls: Rc<RefCell<Vec<String>>>,
    }

    impl StubSearch {
        fn new(calls: Rc<RefCell<Vec<String>>>) -> Self {
            Self {
                answers: FxHashMap::default(),
                failing: FxHashSet::default(),
                calls,
            }
        }

        fn answer(mut self, query: &str, uri: &str, album: &str) -> Self {
            self.answers.insert(
                query.to_string(),
                TrackHit {
                    uri: uri.to_string(),
                    album_name: album.to_string(),
                },
            );
            self
        }

        fn fail_on(mut self, query: &str) -> Self {
            self.failing.insert(query.to_string());
            self
        }
    }

    impl SearchApi for StubSearch {
        fn search_track(&self, query: &str) -> Result<Option<TrackHit>, QueryError> {
            self.calls.borrow_mut().push(query.to_string());
            if self.failing.contains(query) {
                return Err(QueryError::Status(503));
            }
            Ok(self.answers.get(query).cloned())
        }
    }

    fn resolver_in(
        dir: &TempDir,
        stub: StubSearch,
    ) -> Resolver<StubSearch> {
        let cache = ResultCache::load(&dir.path().join("cache.json")).unwrap();
        Resolver::new(stub, cache)
    }

    #[test]
    fn test_resolve_first_formulation_wins() {
        let dir = TempDir::new().unwrap();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let stub = StubSearch::new(Rc::clone(&calls)).answer(
            "let it be artist:the beatles",
            "spotify:track:abc123",
            "Let It Be",
        );
        let mut resolver = resolver_in(&dir, stub);

        let resolved = resolver.resolve("The Beatles", "Let It Be").unwrap().unwrap();
        assert_eq!(resolved.spotify_track_uri, "spotify:track:abc123");
        assert_eq!(resolved.album_name, "Let It Be");
        assert_eq!(calls.borrow().len(), 1);
        assert_eq!(
            resolver.cache().get("the beatles|let it be"),
            Some(&Some(resolved))
        );
    }

    #[test]
    fn test_second_resolve_answered_from_cache() {
        let dir = TempDir::new().unwrap();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let stub = StubSearch::new(Rc::clone(&calls)).answer(
            "let it be artist:the beatles",
            "spotify:track:abc123",
            "Let It Be",
        );
        let mut resolver = resolver_in(&dir, stub);

        let first = resolver.resolve("The Beatles", "Let It Be").unwrap();
        let second = resolver.resolve("The Beatles", "Let It Be").unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.borrow().len(), 1, "second call must not hit the network");
        assert_eq!(resolver.cache_hits, 1);
    }

    #[test]
    fn test_exhausted_search_writes_tombstone() {
        let dir = TempDir::new().unwrap();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut resolver = resolver_in(&dir, StubSearch::new(Rc::clone(&calls)));

        assert_eq!(resolver.resolve("The Beatles", "Let It Be").unwrap(), None);
        // Variants (c)-(e) collapse into (a) for this input, so only the
        // full-key and track-only variants query: 2 variants x 3 formulations.
        assert_eq!(calls.borrow().len(), 6);
        assert_eq!(resolver.cache().get("the beatles|let it be"), Some(&None));

        // The tombstone answers the next call without any network traffic.
        assert_eq!(resolver.resolve("The Beatles", "Let It Be").unwrap(), None);
        assert_eq!(calls.borrow().len(), 6);
        assert_eq!(resolver.cache_hits, 1);
    }

    #[test]
    fn test_tombstone_persists_across_runs() {
        let dir = TempDir::new().unwrap();

        let calls_one = Rc::new(RefCell::new(Vec::new()));
        let mut first_run = resolver_in(&dir, StubSearch::new(Rc::clone(&calls_one)));
        assert_eq!(first_run.resolve("Ghost Artist", "Ghost Track").unwrap(), None);
        assert!(!calls_one.borrow().is_empty());
        drop(first_run);

        // Second run reloads the persisted cache. Even though the stub now
        // knows the track, the tombstone wins: no expiry, no retry.
        let calls_two = Rc::new(RefCell::new(Vec::new()));
        let stub = StubSearch::new(Rc::clone(&calls_two)).answer(
            "ghost track artist:ghost artist",
            "spotify:track:late",
            "Too Late",
        );
        let mut second_run = resolver_in(&dir, stub);
        assert_eq!(second_run.resolve("Ghost Artist", "Ghost Track").unwrap(), None);
        assert!(calls_two.borrow().is_empty());
    }

    #[test]
    fn test_variant_priority_order() {
        let dir = TempDir::new().unwrap();
        let calls = Rc::new(RefCell::new(Vec::new()));
        // Findable only under the track-only variant's first formulation.
        let stub = StubSearch::new(Rc::clone(&calls)).answer(
            "yesterday artist:",
            "spotify:track:y1",
            "Help!",
        );
        let mut resolver = resolver_in(&dir, stub);

        let resolved = resolver.resolve("The Beatles", "Yesterday").unwrap().unwrap();
        assert_eq!(resolved.spotify_track_uri, "spotify:track:y1");

        // The full-key variant's three formulations must all run first.
        assert_eq!(
            *calls.borrow(),
            vec![
                "yesterday artist:the beatles",
                "yesterday the beatles",
                "track:yesterday",
                "yesterday artist:",
            ]
        );
    }

    #[test]
    fn test_feat_truncated_artist_variant() {
        let dir = TempDir::new().unwrap();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let stub = StubSearch::new(Rc::clone(&calls)).answer(
            "song artist:artist",
            "spotify:track:f1",
            "Album",
        );
        let mut resolver = resolver_in(&dir, stub);

        // "feat" without parentheses survives normalization, so the
        // truncated-artist variant differs from the base pair.
        let resolved = resolver.resolve("Artist feat Other", "Song").unwrap().unwrap();
        assert_eq!(resolved.spotify_track_uri, "spotify:track:f1");
        assert_eq!(calls.borrow().last().unwrap(), "song artist:artist");
        // Base variant (3) + track-only variant (3) precede the hit.
        assert_eq!(calls.borrow().len(), 7);
        // The result is cached under the base key, not the variant's.
        assert_eq!(
            resolver.cache().get("artist feat other|song"),
            Some(&Some(resolved))
        );
    }

    #[test]
    fn test_empty_track_skips_every_variant() {
        let dir = TempDir::new().unwrap();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut resolver = resolver_in(&dir, StubSearch::new(Rc::clone(&calls)));

        assert_eq!(resolver.resolve("Some Artist", "?!...").unwrap(), None);
        assert!(calls.borrow().is_empty(), "no query may be issued");
        assert!(resolver.cache().is_empty(), "nothing learned, nothing cached");
    }

    #[test]
    fn test_query_error_is_contained_to_one_formulation() {
        let dir = TempDir::new().unwrap();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let stub = StubSearch::new(Rc::clone(&calls))
            .fail_on("let it be artist:the beatles")
            .answer("let it be the beatles", "spotify:track:abc123", "Let It Be");
        let mut resolver = resolver_in(&dir, stub);

        let resolved = resolver.resolve("The Beatles", "Let It Be").unwrap();
        assert!(resolved.is_some(), "fallback must survive a failed formulation");
        assert_eq!(calls.borrow().len(), 2);
    }
}
