//! Tidal Open API v2 (JSON:API) types
//!
//! See: https://developer.tidal.com/apiref

use serde::{Deserialize, Serialize};

/// Top-level JSON:API document
#[derive(Debug, Deserialize)]
pub struct Document<D> {
    pub data: D,

    #[serde(default = "Vec::new")]
    pub included: Vec<Resource>,

    #[serde(default)]
    pub links: Links,
}

#[derive(Debug, Default, Deserialize)]
pub struct Links {
    /// Path of the next page, relative to the API host
    pub next: Option<String>,
}

/// `{ "id", "type" }` plus the playlist item `meta` when present
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ItemMeta>,
}

impl ResourceIdentifier {
    pub fn track(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: TRACKS.to_string(),
            meta: None,
        }
    }

    pub fn is_track(&self) -> bool {
        self.kind == TRACKS
    }
}

/// Position of a track inside one playlist; removal addresses items by it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
}

pub const TRACKS: &str = "tracks";

/// Full resource object, discriminated by `type`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum Resource {
    #[serde(rename = "tracks")]
    Track(TrackResource),

    #[serde(rename = "playlists")]
    Playlist(PlaylistResource),

    /// Artists, albums, videos and anything else we do not read
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackResource {
    pub id: String,
    pub attributes: TrackAttributes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackAttributes {
    pub title: String,

    #[serde(default)]
    pub isrc: Option<String>,

    #[serde(default)]
    pub artists: Vec<ArtistSummary>,

    #[serde(default)]
    pub album: Option<AlbumSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistSummary {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlbumSummary {
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistResource {
    pub id: String,
    pub attributes: PlaylistAttributes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistAttributes {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,
}

/// `/users/me`
#[derive(Debug, Deserialize)]
pub struct UserResource {
    pub id: String,
    pub attributes: UserAttributes,
}

#[derive(Debug, Deserialize)]
pub struct UserAttributes {
    #[serde(default)]
    pub country: String,
}

/// Body of relationship add/remove requests
#[derive(Debug, Serialize)]
pub struct RelationshipBody {
    pub data: Vec<ResourceIdentifier>,
}
