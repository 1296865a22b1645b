//! YouTube Data API connector implementation
//!
//! Implements the `MusicProvider` trait for YouTube Data API v3.

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

use crate::error::{Result, YouTubeError};
use crate::title::parse_title;
use crate::types::{
    InsertPlaylistItem, ListResponse, PlaylistItem, SearchResult, YouTubePlaylist,
};

/// YouTube Data API base URL
const YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Maximum results per page (YouTube API limit)
const MAX_RESULTS: usize = 50;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// YouTube Data API connector
///
/// Playlists are regular YouTube playlists; songs are videos. There is no
/// ISRC lookup, so search relies on free-text queries only.
pub struct YouTubeConnector {
    http_client: Arc<dyn HttpClient>,
    credentials: Arc<CredentialManager>,
    retry_policy: RetryPolicy,
}

impl YouTubeConnector {
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
            .access_token(user, ProviderKind::YouTube)
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
        serde_json::from_slice(&response.body).map_err(|e| YouTubeError::ParseError(e.to_string()))
    }

    /// Follows `nextPageToken` until the last page.
    async fn list_all<T: DeserializeOwned>(&self, base_url: &str, token: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let url = match &page_token {
                Some(page) => format!("{}&pageToken={}", base_url, urlencoding::encode(page)),
                None => base_url.to_string(),
            };
            let page: ListResponse<T> = self.get_json(url, token).await?;
            items.extend(page.items);

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        Ok(items)
    }

    fn convert_playlist(playlist: YouTubePlaylist) -> Playlist {
        Playlist {
            source: PlaylistRef::new(ProviderKind::YouTube, playlist.id),
            image_url: playlist.snippet.thumbnails.best_url(),
            name: playlist.snippet.title,
            description: playlist.snippet.description,
        }
    }

    /// Returns `None` for entries without a video (deleted or private).
    fn convert_item(item: PlaylistItem) -> Option<Song> {
        let snippet = item.snippet?;
        let video_id = snippet.resource_id.video_id.filter(|id| !id.is_empty())?;
        let channel = snippet
            .video_owner_channel_title
            .unwrap_or(snippet.channel_title);

        let (name, artists) = parse_title(&snippet.title, &channel);
        Some(Song::new(name, artists, "", ProviderKind::YouTube, video_id))
    }

    fn convert_search_result(result: SearchResult) -> Option<Song> {
        let video_id = result.id.video_id.filter(|id| !id.is_empty())?;
        let (name, artists) = parse_title(&result.snippet.title, &result.snippet.channel_title);
        Some(Song::new(name, artists, "", ProviderKind::YouTube, video_id))
    }

    fn validate_playlist_id(playlist_id: &str) -> Result<()> {
        if playlist_id.trim().is_empty() {
            return Err(YouTubeError::InvalidPlaylistId(playlist_id.to_string()));
        }
        Ok(())
    }
}

/// Maps a final non-success response to an error.
fn status_error(response: &HttpResponse, attempts: u32) -> YouTubeError {
    let message = String::from_utf8_lossy(&response.body).to_string();
    match response.status {
        401 => YouTubeError::AuthenticationFailed(message),
        403 if message.contains("quotaExceeded") => YouTubeError::QuotaExceeded,
        429 => YouTubeError::RateLimitExceeded { attempts },
        status_code => YouTubeError::ApiError {
            status_code,
            message,
        },
    }
}

/// Lookups for one user, driven by the shared search ladder.
struct YouTubeVideoSearch<'a> {
    connector: &'a YouTubeConnector,
    token: String,
}

#[async_trait]
impl TrackSearch for YouTubeVideoSearch<'_> {
    fn provider(&self) -> ProviderKind {
        ProviderKind::YouTube
    }

    async fn search_metadata(
        &self,
        query: &MetadataQuery,
        limit: usize,
    ) -> BridgeResult<Vec<Song>> {
        let url = format!(
            "{}/search?part=snippet&type=video&maxResults={}&q={}",
            YOUTUBE_API_BASE,
            limit,
            urlencoding::encode(&query.to_free_text())
        );
        let response: ListResponse<SearchResult> = self.connector.get_json(url, &self.token).await?;

        Ok(response
            .items
            .into_iter()
            .filter_map(YouTubeConnector::convert_search_result)
            .collect())
    }
}

#[async_trait]
impl MusicProvider for YouTubeConnector {
    fn kind(&self) -> ProviderKind {
        ProviderKind::YouTube
    }

    #[instrument(skip(self, code, code_verifier))]
    async fn exchange_code_for_token(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> BridgeResult<OAuthTokens> {
        let tokens = self
            .credentials
            .flow(ProviderKind::YouTube)
            .map_err(YouTubeError::from)?
            .exchange_code(code, code_verifier)
            .await
            .map_err(YouTubeError::from)?;
        Ok(tokens)
    }

    #[instrument(skip(self), fields(user_id = %user))]
    async fn get_playlists(&self, user: &UserId) -> BridgeResult<Vec<Playlist>> {
        let token = self.access_token(user).await?;
        let url = format!(
            "{}/playlists?part=snippet&mine=true&maxResults={}",
            YOUTUBE_API_BASE, MAX_RESULTS
        );

        let playlists: Vec<YouTubePlaylist> = self.list_all(&url, &token).await?;
        info!("Listed {} playlists from YouTube", playlists.len());

        Ok(playlists.into_iter().map(Self::convert_playlist).collect())
    }

    #[instrument(skip(self), fields(user_id = %user))]
    async fn get_playlist(&self, user: &UserId, playlist_id: &str) -> BridgeResult<Playlist> {
        Self::validate_playlist_id(playlist_id)?;
        let token = self.access_token(user).await?;

        let url = format!(
            "{}/playlists?part=snippet&id={}",
            YOUTUBE_API_BASE,
            urlencoding::encode(playlist_id)
        );
        let response: ListResponse<YouTubePlaylist> = self.get_json(url, &token).await?;

        let playlist = response.items.into_iter().next().ok_or_else(|| {
            YouTubeError::PlaylistNotFound {
                playlist_id: playlist_id.to_string(),
            }
        })?;
        Ok(Self::convert_playlist(playlist))
    }

    #[instrument(skip(self), fields(user_id = %user))]
    async fn get_playlist_songs(&self, user: &UserId, playlist_id: &str) -> BridgeResult<Vec<Song>> {
        Self::validate_playlist_id(playlist_id)?;
        let token = self.access_token(user).await?;

        let url = format!(
            "{}/playlistItems?part=snippet&playlistId={}&maxResults={}",
            YOUTUBE_API_BASE,
            urlencoding::encode(playlist_id),
            MAX_RESULTS
        );
        let items: Vec<PlaylistItem> = self.list_all(&url, &token).await?;
        let total = items.len();

        let songs: Vec<Song> = items.into_iter().filter_map(Self::convert_item).collect();
        info!(
            skipped = total - songs.len(),
            "Fetched {} songs from YouTube playlist",
            songs.len()
        );
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
        let url = format!("{}/playlistItems?part=snippet", YOUTUBE_API_BASE);

        // The API inserts one item per request
        for song in songs {
            let body = InsertPlaylistItem::video(playlist_id, song.provider_song_id());
            let request = Self::request(HttpMethod::Post, url.clone(), &token).json(&body)?;
            self.send(request).await.map_err(|e| {
                warn!(video_id = song.provider_song_id(), error = %e, "Failed to insert video");
                e
            })?;
        }

        info!("Added {} videos to YouTube playlist", songs.len());
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user))]
    async fn clear_playlist(&self, user: &UserId, playlist_id: &str) -> BridgeResult<()> {
        Self::validate_playlist_id(playlist_id)?;
        let token = self.access_token(user).await?;

        // Collect every id first; deleting while paging shifts the pages
        let url = format!(
            "{}/playlistItems?part=id&playlistId={}&maxResults={}",
            YOUTUBE_API_BASE,
            urlencoding::encode(playlist_id),
            MAX_RESULTS
        );
        let items: Vec<PlaylistItem> = self.list_all(&url, &token).await?;

        for item in &items {
            let url = format!(
                "{}/playlistItems?id={}",
                YOUTUBE_API_BASE,
                urlencoding::encode(&item.id)
            );
            self.send(Self::request(HttpMethod::Delete, url, &token))
                .await?;
        }

        info!("Removed {} items from YouTube playlist", items.len());
        Ok(())
    }

    #[instrument(skip(self, query), fields(user_id = %user))]
    async fn search(&self, user: &UserId, query: &SongQuery) -> BridgeResult<Song> {
        let token = self.access_token(user).await?;
        let searcher = YouTubeVideoSearch {
            connector: self,
            token,
        };

        let song = find_best_match(&searcher, query)
            .await
            .map_err(YouTubeError::from)?;
        Ok(song)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::InMemorySecureStore;
    use bytes::Bytes;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn user() -> UserId {
        UserId::new("user-1")
    }

    async fn connector(http: MockHttpClient) -> YouTubeConnector {
        let credentials = CredentialManager::new(Arc::new(InMemorySecureStore::new()));
        credentials
            .store_tokens(
                &user(),
                ProviderKind::YouTube,
                &OAuthTokens::new("yt_token".to_string(), None, 3600),
            )
            .await
            .unwrap();

        YouTubeConnector::new(Arc::new(http), Arc::new(credentials))
    }

    #[tokio::test]
    async fn test_get_playlists_follows_page_tokens() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(2).returning(|req| {
            assert!(req.url.contains("mine=true"));
            if req.url.contains("pageToken=CAEQAA") {
                Ok(response(
                    200,
                    r#"{"items": [{"id": "PL2", "snippet": {"title": "Second"}}]}"#,
                ))
            } else {
                Ok(response(
                    200,
                    r#"{
                        "items": [{
                            "id": "PL1",
                            "snippet": {
                                "title": "First",
                                "description": "Mine",
                                "thumbnails": {"default": {"url": "d"}, "maxres": {"url": "max"}}
                            }
                        }],
                        "nextPageToken": "CAEQAA"
                    }"#,
                ))
            }
        });

        let playlists = connector(mock_http).await.get_playlists(&user()).await.unwrap();

        assert_eq!(playlists.len(), 2);
        assert_eq!(playlists[0].image_url.as_deref(), Some("max"));
        assert_eq!(playlists[1].source.playlist_id, "PL2");
        assert!(playlists[1].image_url.is_none());
    }

    #[tokio::test]
    async fn test_get_playlist_not_found() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(response(200, r#"{"items": []}"#)));

        let error = connector(mock_http)
            .await
            .get_playlist(&user(), "PLmissing")
            .await
            .unwrap_err();

        assert!(error.to_string().contains("Playlist not found: PLmissing"));
    }

    #[tokio::test]
    async fn test_get_playlist_songs_parses_titles() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|_| {
            Ok(response(
                200,
                r#"{
                    "items": [
                        {
                            "id": "item1",
                            "snippet": {
                                "title": "Daft Punk - Get Lucky",
                                "channelTitle": "My Channel",
                                "videoOwnerChannelTitle": "DaftPunkVEVO",
                                "resourceId": {"kind": "youtube#video", "videoId": "v1"}
                            }
                        },
                        {
                            "id": "item2",
                            "snippet": {
                                "title": "Deleted video",
                                "channelTitle": "My Channel",
                                "resourceId": {"kind": "youtube#video"}
                            }
                        },
                        {
                            "id": "item3",
                            "snippet": {
                                "title": "Bohemian Rhapsody",
                                "channelTitle": "My Channel",
                                "videoOwnerChannelTitle": "Queen - Topic",
                                "resourceId": {"kind": "youtube#video", "videoId": "v3"}
                            }
                        }
                    ]
                }"#,
            ))
        });

        let songs = connector(mock_http)
            .await
            .get_playlist_songs(&user(), "PL1")
            .await
            .unwrap();

        assert_eq!(songs.len(), 2);
        assert_eq!(songs[0].name(), "Get Lucky");
        assert_eq!(songs[0].artist_names(), ["Daft Punk".to_string()]);
        assert_eq!(songs[1].provider_song_id(), "v3");
        assert_eq!(songs[1].artist_names(), ["Queen".to_string()]);
    }

    #[tokio::test]
    async fn test_add_to_playlist_inserts_one_item_per_song() {
        let songs = vec![
            Song::new("A", vec![], "", ProviderKind::YouTube, "v1"),
            Song::new("B", vec![], "", ProviderKind::YouTube, "v2"),
        ];

        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(2).returning(|req| {
            assert_eq!(req.method, HttpMethod::Post);
            let body: serde_json::Value = serde_json::from_slice(req.body.as_ref().unwrap()).unwrap();
            assert_eq!(body["snippet"]["playlistId"], "PL1");
            Ok(response(200, r#"{"id": "new"}"#))
        });

        connector(mock_http)
            .await
            .add_to_playlist(&user(), "PL1", &songs)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_clear_playlist_deletes_every_item() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(3).returning(|req| {
            if req.method == HttpMethod::Get {
                assert!(req.url.contains("part=id"));
                return Ok(response(200, r#"{"items": [{"id": "i1"}, {"id": "i2"}]}"#));
            }

            assert_eq!(req.method, HttpMethod::Delete);
            assert!(req.url.ends_with("id=i1") || req.url.ends_with("id=i2"));
            Ok(response(204, ""))
        });

        connector(mock_http)
            .await
            .clear_playlist(&user(), "PL1")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_search_uses_free_text_queries() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|req| {
            assert!(req.url.contains("type=video"));
            assert!(req.url.contains("q=Get%20Lucky%20Daft%20Punk"));
            Ok(response(
                200,
                r#"{
                    "items": [{
                        "id": {"kind": "youtube#video", "videoId": "v1"},
                        "snippet": {"title": "Daft Punk - Get Lucky", "channelTitle": "DaftPunkVEVO"}
                    }]
                }"#,
            ))
        });

        let query = SongQuery {
            names: vec!["Get Lucky".to_string()],
            artist_names: vec!["Daft Punk".to_string()],
            album_names: vec![],
            // ignored: YouTube has no ISRC lookup
            isrc: Some("USQX91300108".to_string()),
        };
        let song = connector(mock_http).await.search(&user(), &query).await.unwrap();

        assert_eq!(song.provider_song_id(), "v1");
        assert_eq!(song.provider(), ProviderKind::YouTube);
    }

    #[tokio::test]
    async fn test_quota_exceeded_is_not_retried() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|_| {
            Ok(response(
                403,
                r#"{"error": {"errors": [{"reason": "quotaExceeded"}]}}"#,
            ))
        });

        let error = connector(mock_http)
            .await
            .get_playlists(&user())
            .await
            .unwrap_err();

        assert!(error.to_string().contains("quota exceeded"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_errors_exhaust_retries() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(3)
            .returning(|_| Ok(response(503, "backend error")));

        let error = connector(mock_http)
            .await
            .get_playlists(&user())
            .await
            .unwrap_err();

        assert!(error.to_string().contains("status 503"));
    }
}
