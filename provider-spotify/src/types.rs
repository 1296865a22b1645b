//! Spotify Web API response types
//!
//! Data structures for (de)serializing Spotify Web API v1 payloads.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Offset-paginated list
///
/// See: https://developer.spotify.com/documentation/web-api/concepts/api-calls#pagination
#[derive(Debug, Deserialize)]
pub struct Paging<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,

    /// Absolute URL of the next page, absent on the last one
    pub next: Option<String>,

    #[serde(default)]
    pub total: u32,
}

/// Simplified or full playlist object
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyPlaylist {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Sizes vary; Spotify may also send `null`
    #[serde(default)]
    pub images: Option<Vec<SpotifyImage>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyImage {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Entry of `/playlists/{id}/tracks`
#[derive(Debug, Deserialize)]
pub struct PlaylistTrackItem {
    /// `null` for removed or unavailable tracks
    pub track: Option<SpotifyTrack>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyTrack {
    /// `null` for local files
    pub id: Option<String>,
    pub name: String,

    #[serde(default)]
    pub artists: Vec<SpotifyArtist>,

    pub album: Option<SpotifyAlbum>,

    #[serde(default)]
    pub external_ids: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyArtist {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyAlbum {
    pub name: String,
}

/// `/search` response; only the track section is requested
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    pub tracks: Option<Paging<SpotifyTrack>>,
}

/// Body of add (`POST`) and replace (`PUT`) item requests
#[derive(Debug, Serialize)]
pub struct TrackUris {
    pub uris: Vec<String>,
}
