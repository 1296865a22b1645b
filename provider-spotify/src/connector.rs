//! Spotify Web API connector implementation
//!
//! Implements the `MusicProvider` trait for Spotify Web API v1.

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::{Playlist, PlaylistRef, ProviderKind, Song, SongQuery, UserId};
use core_auth::{CredentialManager, OAuthTokens};
use core_matching::{find_best_match, MetadataQuery, TrackSearch};
use core_sync::MusicProvider;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SpotifyError};
use crate::types::{
    Paging, PlaylistTrackItem, SearchResponse, SpotifyPlaylist, SpotifyTrack, TrackUris,
};

/// Spotify Web API base URL
const SPOTIFY_API_BASE: &str = "https://api.spotify.com/v1";

/// Page size for playlist and track listings
const PAGE_LIMIT: usize = 50;

/// Maximum tracks per add request (Spotify API limit)
const ADD_BATCH_SIZE: usize = 100;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Spotify Web API connector
///
/// Every call fetches the user's access token from the `CredentialManager`,
/// which refreshes it when it is about to expire.
///
/// # Example
///
/// ```ignore
/// use provider_spotify::SpotifyConnector;
/// use core_sync::MusicProvider;
///
/// let connector = SpotifyConnector::new(http_client, credentials);
/// let songs = connector.get_playlist_songs(&user, "37i9dQZF1DXcBWIGoYBM5M").await?;
/// ```
pub struct SpotifyConnector {
    http_client: Arc<dyn HttpClient>,
    credentials: Arc<CredentialManager>,
    retry_policy: RetryPolicy,
}

impl SpotifyConnector {
    pub fn new(http_client: Arc<dyn HttpClient>, credentials: Arc<CredentialManager>) -> Self {
        Self {
            http_client,
            credentials,
            retry_policy: RetryPolicy::default(),
        }
    }

    async fn access_token(&self, user: &UserId) -> Result<String> {
        Ok(self
            .credentials
            .access_token(user, ProviderKind::Spotify)
            .await?)
    }

    fn request(method: HttpMethod, url: String, token: &str) -> HttpRequest {
        HttpRequest::new(method, url)
            .bearer_token(token)
            .header("Accept", "application/json")
            .timeout(REQUEST_TIMEOUT)
    }

    /// Execute API request, retrying throttling and server errors
    #[instrument(skip(self, request), fields(method = ?request.method, url = %request.url))]
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = self
            .http_client
            .execute_with_retry(request, self.retry_policy.clone())
            .await?;

        if response.is_success() {
            debug!(status = response.status, "API request succeeded");
            return Ok(response);
        }

        warn!(status = response.status, "API request failed");
        Err(status_error(&response, self.retry_policy.max_attempts.max(1)))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String, token: &str) -> Result<T> {
        let response = self.send(Self::request(HttpMethod::Get, url, token)).await?;
        serde_json::from_slice(&response.body).map_err(|e| SpotifyError::ParseError(e.to_string()))
    }

    async fn send_uris(
        &self,
        method: HttpMethod,
        playlist_id: &str,
        uris: Vec<String>,
        token: &str,
    ) -> Result<()> {
        let url = format!("{}/playlists/{}/tracks", SPOTIFY_API_BASE, playlist_id);
        let request = Self::request(method, url, token).json(&TrackUris { uris })?;
        self.send(request).await?;
        Ok(())
    }

    fn convert_playlist(playlist: SpotifyPlaylist) -> Playlist {
        let image_url = playlist.images.as_deref().and_then(|images| {
            images
                .iter()
                .max_by_key(|image| image.width.unwrap_or(0) * image.height.unwrap_or(0))
                .map(|image| image.url.clone())
        });

        Playlist {
            source: PlaylistRef::new(ProviderKind::Spotify, playlist.id),
            name: playlist.name,
            description: playlist.description.unwrap_or_default(),
            image_url,
        }
    }

    /// Returns `None` for local files, which have no Spotify id.
    fn convert_track(track: SpotifyTrack) -> Option<Song> {
        let id = track.id?;
        let artists = track.artists.into_iter().map(|a| a.name).collect();
        let album = track.album.map(|a| a.name).unwrap_or_default();

        let song = Song::new(track.name, artists, album, ProviderKind::Spotify, id);
        Some(match track.external_ids.get("isrc") {
            Some(isrc) => song.with_isrc(isrc.as_str()),
            None => song,
        })
    }

    fn validate_playlist_id(playlist_id: &str) -> Result<()> {
        if playlist_id.trim().is_empty() {
            return Err(SpotifyError::InvalidPlaylistId(playlist_id.to_string()));
        }
        Ok(())
    }

    async fn search_tracks(&self, query: &str, limit: usize, token: &str) -> Result<Vec<SpotifyTrack>> {
        let url = format!(
            "{}/search?q={}&type=track&limit={}",
            SPOTIFY_API_BASE,
            urlencoding::encode(query),
            limit
        );
        let response: SearchResponse = self.get_json(url, token).await?;
        Ok(response.tracks.map(|page| page.items).unwrap_or_default())
    }
}

/// Maps a final non-success response to an error.
fn status_error(response: &HttpResponse, attempts: u32) -> SpotifyError {
    let message = String::from_utf8_lossy(&response.body).to_string();
    match response.status {
        401 => SpotifyError::AuthenticationFailed(message),
        429 => SpotifyError::RateLimitExceeded { attempts },
        status_code => SpotifyError::ApiError {
            status_code,
            message,
        },
    }
}

/// Spotify search filter syntax: `track:"…" artist:"…" album:"…"`
fn render_query(query: &MetadataQuery) -> String {
    let mut rendered = format!("track:\"{}\"", query.track);
    if let Some(artist) = &query.artist {
        rendered.push_str(&format!(" artist:\"{}\"", artist));
    }
    if let Some(album) = &query.album {
        rendered.push_str(&format!(" album:\"{}\"", album));
    }
    rendered
}

/// Lookups for one user, driven by the shared search ladder.
struct SpotifyTrackSearch<'a> {
    connector: &'a SpotifyConnector,
    token: String,
}

#[async_trait]
impl TrackSearch for SpotifyTrackSearch<'_> {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Spotify
    }

    async fn search_isrc(&self, isrc: &str) -> BridgeResult<Option<Song>> {
        let tracks = self
            .connector
            .search_tracks(&format!("isrc:{}", isrc), 1, &self.token)
            .await?;
        Ok(tracks.into_iter().find_map(SpotifyConnector::convert_track))
    }

    async fn search_metadata(
        &self,
        query: &MetadataQuery,
        limit: usize,
    ) -> BridgeResult<Vec<Song>> {
        let tracks = self
            .connector
            .search_tracks(&render_query(query), limit, &self.token)
            .await?;
        Ok(tracks
            .into_iter()
            .filter_map(SpotifyConnector::convert_track)
            .collect())
    }
}

#[async_trait]
impl MusicProvider for SpotifyConnector {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Spotify
    }

    #[instrument(skip(self, code, code_verifier))]
    async fn exchange_code_for_token(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> BridgeResult<OAuthTokens> {
        let tokens = self
            .credentials
            .flow(ProviderKind::Spotify)
            .map_err(SpotifyError::from)?
            .exchange_code(code, code_verifier)
            .await
            .map_err(SpotifyError::from)?;
        Ok(tokens)
    }

    #[instrument(skip(self), fields(user_id = %user))]
    async fn get_playlists(&self, user: &UserId) -> BridgeResult<Vec<Playlist>> {
        let token = self.access_token(user).await?;
        let mut playlists = Vec::new();
        let mut offset = 0;

        loop {
            let url = format!(
                "{}/me/playlists?limit={}&offset={}",
                SPOTIFY_API_BASE, PAGE_LIMIT, offset
            );
            let page: Paging<SpotifyPlaylist> = self.get_json(url, &token).await?;
            let count = page.items.len();
            playlists.extend(page.items.into_iter().map(Self::convert_playlist));

            if page.next.is_none() || count < PAGE_LIMIT {
                break;
            }
            offset += PAGE_LIMIT;
        }

        info!("Listed {} playlists from Spotify", playlists.len());
        Ok(playlists)
    }

    #[instrument(skip(self), fields(user_id = %user))]
    async fn get_playlist(&self, user: &UserId, playlist_id: &str) -> BridgeResult<Playlist> {
        Self::validate_playlist_id(playlist_id)?;
        let token = self.access_token(user).await?;

        let url = format!(
            "{}/playlists/{}?fields=id,name,description,images",
            SPOTIFY_API_BASE, playlist_id
        );
        let playlist: SpotifyPlaylist = self.get_json(url, &token).await.map_err(|e| match e {
            SpotifyError::ApiError {
                status_code: 404, ..
            } => SpotifyError::PlaylistNotFound {
                playlist_id: playlist_id.to_string(),
            },
            other => other,
        })?;

        Ok(Self::convert_playlist(playlist))
    }

    #[instrument(skip(self), fields(user_id = %user))]
    async fn get_playlist_songs(&self, user: &UserId, playlist_id: &str) -> BridgeResult<Vec<Song>> {
        Self::validate_playlist_id(playlist_id)?;
        let token = self.access_token(user).await?;
        let mut songs = Vec::new();
        let mut skipped = 0usize;
        let mut offset = 0;

        loop {
            let url = format!(
                "{}/playlists/{}/tracks?limit={}&offset={}",
                SPOTIFY_API_BASE, playlist_id, PAGE_LIMIT, offset
            );
            let page: Paging<PlaylistTrackItem> = self.get_json(url, &token).await?;
            let count = page.items.len();

            for item in page.items {
                match item.track.and_then(Self::convert_track) {
                    Some(song) => songs.push(song),
                    None => skipped += 1,
                }
            }

            if page.next.is_none() || count < PAGE_LIMIT {
                break;
            }
            offset += PAGE_LIMIT;
        }

        info!(skipped, "Fetched {} songs from Spotify playlist", songs.len());
        Ok(songs)
    }

    #[instrument(skip(self, songs), fields(user_id = %user, count = songs.len()))]
    async fn add_to_playlist(
        &self,
        user: &UserId,
        playlist_id: &str,
        songs: &[Song],
    ) -> BridgeResult<()> {
        Self::validate_playlist_id(playlist_id)?;
        if songs.is_empty() {
            return Ok(());
        }
        let token = self.access_token(user).await?;

        for batch in songs.chunks(ADD_BATCH_SIZE) {
            let uris = batch
                .iter()
                .map(|song| format!("spotify:track:{}", song.provider_song_id()))
                .collect();
            self.send_uris(HttpMethod::Post, playlist_id, uris, &token)
                .await?;
            debug!(batch = batch.len(), "Added batch to Spotify playlist");
        }

        info!("Added {} songs to Spotify playlist", songs.len());
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user))]
    async fn clear_playlist(&self, user: &UserId, playlist_id: &str) -> BridgeResult<()> {
        Self::validate_playlist_id(playlist_id)?;
        let token = self.access_token(user).await?;

        // Replacing the items with an empty list removes all of them
        self.send_uris(HttpMethod::Put, playlist_id, Vec::new(), &token)
            .await?;

        info!("Cleared Spotify playlist");
        Ok(())
    }

    #[instrument(skip(self, query), fields(user_id = %user))]
    async fn search(&self, user: &UserId, query: &SongQuery) -> BridgeResult<Song> {
        let token = self.access_token(user).await?;
        let searcher = SpotifyTrackSearch {
            connector: self,
            token,
        };

        let song = find_best_match(&searcher, query)
            .await
            .map_err(SpotifyError::from)?;
        Ok(song)
    }
}
