//! Shared search ladder used by every provider adapter.
//!
//! Providers only know how to run a single lookup; the ladder decides which
//! lookups to run, scores candidates and picks the winner:
//!
//! 1. exact ISRC lookup when the query carries one (first hit wins)
//! 2. metadata queries from raw then cleaned metadata, most specific first
//! 3. up to [`CANDIDATES_PER_QUERY`] candidates per query, scored against the
//!    reference song; return on a score above [`EXCELLENT_MATCH_SCORE`], stop
//!    descending once above [`GOOD_MATCH_SCORE`]

use crate::clean::clean;
use crate::error::{MatchError, Result};
use crate::similarity::score;
use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::music::{ProviderKind, Song, SongQuery};
use std::fmt;
use tracing::{debug, instrument, warn};

/// Score above which the first candidate is accepted immediately
pub const EXCELLENT_MATCH_SCORE: f64 = 95.0;

/// Score above which less specific queries are not tried
pub const GOOD_MATCH_SCORE: f64 = 85.0;

/// Candidates fetched per metadata query
pub const CANDIDATES_PER_QUERY: usize = 5;

/// One metadata lookup. Providers render it in their own query syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataQuery {
    pub track: String,
    pub artist: Option<String>,
    pub album: Option<String>,
}

impl MetadataQuery {
    /// Space separated free-text form, for providers without field filters.
    pub fn to_free_text(&self) -> String {
        let mut parts = vec![self.track.as_str()];
        if let Some(artist) = &self.artist {
            parts.push(artist);
        }
        if let Some(album) = &self.album {
            parts.push(album);
        }
        parts.join(" ")
    }
}

impl fmt::Display for MetadataQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_free_text())
    }
}

/// Single lookups a provider can perform on behalf of the ladder.
#[async_trait]
pub trait TrackSearch: Send + Sync {
    /// Provider the candidates come from.
    fn provider(&self) -> ProviderKind;

    /// Exact lookup by ISRC. Providers without one return `Ok(None)`.
    async fn search_isrc(&self, _isrc: &str) -> BridgeResult<Option<Song>> {
        Ok(None)
    }

    /// Up to `limit` candidates for a metadata query.
    async fn search_metadata(&self, query: &MetadataQuery, limit: usize)
        -> BridgeResult<Vec<Song>>;
}

/// Builds the metadata ladder for `query`, most specific first.
///
/// Raw metadata contributes track+artist+album and track+artist; cleaned
/// metadata contributes track+artist+album, track+artist, track+album and
/// track. Only the first artist and album are used. Duplicates and queries
/// with an empty component are skipped.
pub fn build_queries(query: &SongQuery) -> Vec<MetadataQuery> {
    let raw_track = first_non_empty(&query.names);
    let raw_artist = first_non_empty(&query.artist_names);
    let raw_album = first_non_empty(&query.album_names);

    let clean_track = raw_track.map(clean).filter(|s| !s.is_empty());
    let clean_artist = raw_artist.map(clean).filter(|s| !s.is_empty());
    let clean_album = raw_album.map(clean).filter(|s| !s.is_empty());

    let mut queries: Vec<MetadataQuery> = Vec::new();
    let mut push = |track: Option<&str>, artist: Option<&str>, album: Option<&str>| {
        let Some(track) = track else { return };
        let candidate = MetadataQuery {
            track: track.to_string(),
            artist: artist.map(str::to_string),
            album: album.map(str::to_string),
        };
        if !queries.contains(&candidate) {
            queries.push(candidate);
        }
    };

    if let (Some(artist), Some(album)) = (raw_artist, raw_album) {
        push(raw_track, Some(artist), Some(album));
    }
    if let Some(artist) = raw_artist {
        push(raw_track, Some(artist), None);
    }

    let clean_track = clean_track.as_deref();
    let clean_artist = clean_artist.as_deref();
    let clean_album = clean_album.as_deref();

    if let (Some(artist), Some(album)) = (clean_artist, clean_album) {
        push(clean_track, Some(artist), Some(album));
    }
    if let Some(artist) = clean_artist {
        push(clean_track, Some(artist), None);
    }
    if let Some(album) = clean_album {
        push(clean_track, None, Some(album));
    }
    push(clean_track, None, None);

    queries
}

/// Song the candidates are scored against.
pub fn reference_song(query: &SongQuery, provider: ProviderKind) -> Song {
    let song = Song::new(
        first_non_empty(&query.names).unwrap_or_default(),
        query
            .artist_names
            .iter()
            .filter(|a| !a.trim().is_empty())
            .cloned()
            .collect(),
        first_non_empty(&query.album_names).unwrap_or_default(),
        provider,
        "",
    );
    match &query.isrc {
        Some(isrc) => song.with_isrc(isrc.as_str()),
        None => song,
    }
}

/// Runs the search ladder against `searcher`.
///
/// # Errors
///
/// [`MatchError::NoMatch`] when no query produced a single candidate. Failing
/// lookups are logged and skipped, never returned.
#[instrument(skip(searcher, query), fields(provider = %searcher.provider()))]
pub async fn find_best_match(searcher: &dyn TrackSearch, query: &SongQuery) -> Result<Song> {
    if let Some(isrc) = query.isrc.as_deref().filter(|i| !i.trim().is_empty()) {
        match searcher.search_isrc(isrc).await {
            Ok(Some(song)) => {
                debug!(isrc = %isrc, "Matched by ISRC");
                return Ok(song);
            }
            Ok(None) => debug!(isrc = %isrc, "No ISRC hit, falling back to metadata"),
            Err(e) => warn!(isrc = %isrc, error = %e, "ISRC lookup failed, falling back to metadata"),
        }
    }

    let reference = reference_song(query, searcher.provider());
    let mut best: Option<(Song, f64)> = None;

    for metadata_query in build_queries(query) {
        let candidates = match searcher
            .search_metadata(&metadata_query, CANDIDATES_PER_QUERY)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(query = %metadata_query, error = %e, "Search failed, trying next query");
                continue;
            }
        };

        for candidate in candidates.into_iter().take(CANDIDATES_PER_QUERY) {
            let candidate_score = score(&reference, &candidate);
            let improves = best
                .as_ref()
                .map_or(true, |(_, best_score)| candidate_score > *best_score);
            if improves {
                best = Some((candidate, candidate_score));
            }

            if let Some((song, best_score)) = &best {
                if *best_score > EXCELLENT_MATCH_SCORE {
                    debug!(score = best_score, query = %metadata_query, "Excellent match");
                    return Ok(song.clone());
                }
            }
        }

        if best
            .as_ref()
            .is_some_and(|(_, best_score)| *best_score > GOOD_MATCH_SCORE)
        {
            break;
        }
    }

    match best {
        Some((song, best_score)) => {
            debug!(score = best_score, "Best match selected");
            Ok(song)
        }
        None => Err(MatchError::NoMatch {
            name: reference.name().to_string(),
        }),
    }
}

fn first_non_empty(values: &[String]) -> Option<&str> {
    values
        .iter()
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
}
