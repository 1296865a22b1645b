//! YouTube Data API response types
//!
//! Data structures for (de)serializing YouTube Data API v3 payloads.

use serde::{Deserialize, Serialize};

/// Page-token paginated list response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,

    pub next_page_token: Option<String>,
}

/// See: https://developers.google.com/youtube/v3/docs/playlists#resource
#[derive(Debug, Clone, Deserialize)]
pub struct YouTubePlaylist {
    pub id: String,
    pub snippet: PlaylistSnippet,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistSnippet {
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub thumbnails: Thumbnails,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Thumbnails {
    pub default: Option<Thumbnail>,
    pub medium: Option<Thumbnail>,
    pub high: Option<Thumbnail>,
    pub standard: Option<Thumbnail>,
    pub maxres: Option<Thumbnail>,
}

impl Thumbnails {
    /// Highest resolution available
    pub fn best_url(&self) -> Option<String> {
        [
            &self.maxres,
            &self.standard,
            &self.high,
            &self.medium,
            &self.default,
        ]
        .into_iter()
        .find_map(|thumbnail| thumbnail.as_ref().map(|t| t.url.clone()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thumbnail {
    pub url: String,
}

/// See: https://developers.google.com/youtube/v3/docs/playlistItems#resource
#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistItem {
    pub id: String,

    /// Absent when only `part=id` was requested
    pub snippet: Option<PlaylistItemSnippet>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItemSnippet {
    pub title: String,

    /// Channel owning the playlist
    #[serde(default)]
    pub channel_title: String,

    /// Channel that uploaded the video; absent for deleted videos
    pub video_owner_channel_title: Option<String>,

    pub resource_id: ResourceId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceId {
    pub kind: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
}

/// See: https://developers.google.com/youtube/v3/docs/search#resource
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResult {
    pub id: SearchResultId,
    pub snippet: SearchSnippet,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultId {
    pub video_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSnippet {
    pub title: String,

    #[serde(default)]
    pub channel_title: String,
}

/// Body of `playlistItems.insert`
#[derive(Debug, Serialize)]
pub struct InsertPlaylistItem {
    pub snippet: InsertSnippet,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertSnippet {
    pub playlist_id: String,
    pub resource_id: ResourceId,
}

impl InsertPlaylistItem {
    pub fn video(playlist_id: &str, video_id: &str) -> Self {
        Self {
            snippet: InsertSnippet {
                playlist_id: playlist_id.to_string(),
                resource_id: ResourceId {
                    kind: "youtube#video".to_string(),
                    video_id: Some(video_id.to_string()),
                },
            },
        }
    }
}
