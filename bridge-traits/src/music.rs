//! Shared music data model
//!
//! Types exchanged between the provider adapters, the matching engine and
//! the sync orchestrator.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Provider Kind
// ============================================================================

/// Streaming services a playlist can live on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Spotify,
    YouTube,
    Tidal,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] =
        [ProviderKind::Spotify, ProviderKind::YouTube, ProviderKind::Tidal];

    /// Human-readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::Spotify => "Spotify",
            ProviderKind::YouTube => "YouTube",
            ProviderKind::Tidal => "Tidal",
        }
    }

    /// Stable identifier used in storage keys and canonical playlist keys
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Spotify => "spotify",
            ProviderKind::YouTube => "youtube",
            ProviderKind::Tidal => "tidal",
        }
    }

    /// Case-insensitive parse of a provider identifier
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spotify" => Some(ProviderKind::Spotify),
            "youtube" => Some(ProviderKind::YouTube),
            "tidal" => Some(ProviderKind::Tidal),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

// ============================================================================
// User
// ============================================================================

/// Opaque identifier of the user owning credentials and sync configurations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ============================================================================
// Song
// ============================================================================

/// A track as seen on one provider.
///
/// Songs are immutable once built. Matching identity is derived from the
/// cleaned metadata (or the ISRC) and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    name: String,
    artist_names: Vec<String>,
    album: String,
    provider: ProviderKind,
    provider_song_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    isrc: Option<String>,
}

impl Song {
    pub fn new(
        name: impl Into<String>,
        artist_names: Vec<String>,
        album: impl Into<String>,
        provider: ProviderKind,
        provider_song_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            artist_names,
            album: album.into(),
            provider,
            provider_song_id: provider_song_id.into(),
            isrc: None,
        }
    }

    /// Attach an ISRC. Blank values are treated as absent.
    pub fn with_isrc(mut self, isrc: impl Into<String>) -> Self {
        let isrc = isrc.into();
        let trimmed = isrc.trim();
        self.isrc = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
        self
    }

    /// Copy of this song with replaced descriptive metadata. Provider,
    /// provider id and ISRC are kept.
    pub fn with_metadata(
        &self,
        name: impl Into<String>,
        artist_names: Vec<String>,
        album: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            artist_names,
            album: album.into(),
            provider: self.provider,
            provider_song_id: self.provider_song_id.clone(),
            isrc: self.isrc.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn artist_names(&self) -> &[String] {
        &self.artist_names
    }

    pub fn album(&self) -> &str {
        &self.album
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    pub fn provider_song_id(&self) -> &str {
        &self.provider_song_id
    }

    pub fn isrc(&self) -> Option<&str> {
        self.isrc.as_deref()
    }
}

impl fmt::Display for Song {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.artist_names.join(", "), self.name)
    }
}

/// Search input handed to a provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SongQuery {
    pub names: Vec<String>,
    pub artist_names: Vec<String>,
    pub album_names: Vec<String>,
    pub isrc: Option<String>,
}

impl SongQuery {
    pub fn from_song(song: &Song) -> Self {
        let album_names = if song.album().trim().is_empty() {
            Vec::new()
        } else {
            vec![song.album().to_string()]
        };

        Self {
            names: vec![song.name().to_string()],
            artist_names: song.artist_names().to_vec(),
            album_names,
            isrc: song.isrc().map(str::to_string),
        }
    }
}

// ============================================================================
// Playlists
// ============================================================================

/// A playlist on a specific provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlaylistRef {
    pub provider: ProviderKind,
    pub playlist_id: String,
}

impl PlaylistRef {
    pub fn new(provider: ProviderKind, playlist_id: impl Into<String>) -> Self {
        Self {
            provider,
            playlist_id: playlist_id.into(),
        }
    }

    /// `"<provider>:<playlist_id>"`, used to compare sync configurations.
    pub fn canonical_key(&self) -> String {
        format!("{}:{}", self.provider.as_str(), self.playlist_id)
    }
}

impl fmt::Display for PlaylistRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_key())
    }
}

/// Playlist summary as listed by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub source: PlaylistRef,
    pub name: String,
    pub description: String,
    pub image_url: Option<String>,
}
