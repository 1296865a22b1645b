//! Tidal Open API connector implementation
//!
//! Implements the `MusicProvider` trait for the Tidal v2 JSON:API.

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::{Playlist, PlaylistRef, ProviderKind, Song, SongQuery, UserId};
use core_auth::{CredentialManager, OAuthTokens};
use core_matching::{find_best_match, MetadataQuery, TrackSearch};
use core_sync::MusicProvider;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, TidalError};
use crate::types::{
    Document, PlaylistResource, RelationshipBody, Resource, ResourceIdentifier, TrackResource,
    UserResource,
};

const TIDAL_API_HOST: &str = "https://openapi.tidal.com";

/// Tidal Open API base URL
const TIDAL_API_BASE: &str = "https://openapi.tidal.com/v2";

const JSON_API: &str = "application/vnd.api+json";

/// Page size for collection endpoints
const PAGE_LIMIT: usize = 50;

/// Maximum items per add/remove request
const ITEM_BATCH_SIZE: usize = 20;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Tidal Open API connector
///
/// Most endpoints require the account's country code, so every operation
/// starts with a `/users/me` lookup.
pub struct TidalConnector {
    http_client: Arc<dyn HttpClient>,
    credentials: Arc<CredentialManager>,
    retry_policy: RetryPolicy,
}

/// Tidal account id and country code
#[derive(Debug, Clone)]
struct Profile {
    user_id: String,
    country: String,
}

impl TidalConnector {
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
            .access_token(user, ProviderKind::Tidal)
            .await?)
    }

    fn request(method: HttpMethod, url: String, token: &str) -> HttpRequest {
        HttpRequest::new(method, url)
            .bearer_token(token)
            .header("Accept", JSON_API)
            .timeout(REQUEST_TIMEOUT)
    }

    fn relationship_request(
        method: HttpMethod,
        url: String,
        token: &str,
        data: Vec<ResourceIdentifier>,
    ) -> Result<HttpRequest> {
        let request = Self::request(method, url, token).json(&RelationshipBody { data })?;
        Ok(request.header("Content-Type", JSON_API))
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
        serde_json::from_slice(&response.body).map_err(|e| TidalError::ParseError(e.to_string()))
    }

    /// Follows `links.next` and concatenates every page.
    async fn get_all<D: DeserializeOwned>(
        &self,
        url: String,
        token: &str,
    ) -> Result<Vec<Document<Vec<D>>>> {
        let mut pages = Vec::new();
        let mut next = Some(url);

        while let Some(url) = next.take() {
            let page: Document<Vec<D>> = self.get_json(url, token).await?;
            next = page.links.next.as_deref().map(absolute_url);
            pages.push(page);
        }

        Ok(pages)
    }

    async fn profile(&self, token: &str) -> Result<Profile> {
        let url = format!("{}/users/me", TIDAL_API_BASE);
        let me: Document<UserResource> = self.get_json(url, token).await?;

        if me.data.id.is_empty() {
            return Err(TidalError::IncompleteProfile("missing user id".to_string()));
        }
        if me.data.attributes.country.is_empty() {
            return Err(TidalError::IncompleteProfile(
                "missing country code".to_string(),
            ));
        }

        Ok(Profile {
            user_id: me.data.id,
            country: me.data.attributes.country,
        })
    }

    /// Playlists saved to the user's collection.
    async fn collection_playlists(
        &self,
        profile: &Profile,
        token: &str,
    ) -> Result<Vec<PlaylistResource>> {
        let url = format!(
            "{}/userCollections/{}/relationships/playlists?countryCode={}&include=playlists&limit={}",
            TIDAL_API_BASE,
            urlencoding::encode(&profile.user_id),
            profile.country,
            PAGE_LIMIT
        );
        let pages: Vec<Document<Vec<ResourceIdentifier>>> = self.get_all(url, token).await?;

        Ok(pages
            .into_iter()
            .flat_map(|page| page.included)
            .filter_map(|resource| match resource {
                Resource::Playlist(playlist) => Some(playlist),
                _ => None,
            })
            .collect())
    }

    /// Playlists the user created.
    async fn owned_playlists(&self, profile: &Profile, token: &str) -> Result<Vec<PlaylistResource>> {
        let url = format!(
            "{}/playlists?filter[owners.id]={}&countryCode={}&limit={}",
            TIDAL_API_BASE,
            urlencoding::encode(&profile.user_id),
            profile.country,
            PAGE_LIMIT
        );
        let pages: Vec<Document<Vec<PlaylistResource>>> = self.get_all(url, token).await?;

        Ok(pages.into_iter().flat_map(|page| page.data).collect())
    }

    /// Every item identifier of a playlist, with tracks resolved from `included`.
    async fn playlist_items(
        &self,
        playlist_id: &str,
        country: &str,
        token: &str,
    ) -> Result<(Vec<ResourceIdentifier>, HashMap<String, TrackResource>)> {
        let url = format!(
            "{}/playlists/{}/relationships/items?countryCode={}&include=items&limit={}",
            TIDAL_API_BASE,
            urlencoding::encode(playlist_id),
            country,
            PAGE_LIMIT
        );

        let pages: Vec<Document<Vec<ResourceIdentifier>>> = match self.get_all(url, token).await {
            Err(TidalError::ApiError {
                status_code: 404, ..
            }) => {
                return Err(TidalError::PlaylistNotFound {
                    playlist_id: playlist_id.to_string(),
                })
            }
            other => other?,
        };

        let mut items = Vec::new();
        let mut tracks = HashMap::new();
        for page in pages {
            items.extend(page.data);
            tracks.extend(page.included.into_iter().filter_map(|resource| match resource {
                Resource::Track(track) => Some((track.id.clone(), track)),
                _ => None,
            }));
        }

        Ok((items, tracks))
    }

    fn convert_playlist(playlist: PlaylistResource) -> Playlist {
        Playlist {
            source: PlaylistRef::new(ProviderKind::Tidal, playlist.id),
            name: playlist.attributes.name,
            description: playlist.attributes.description.unwrap_or_default(),
            image_url: None,
        }
    }

    fn convert_track(track: TrackResource) -> Song {
        let attributes = track.attributes;
        let artists = attributes.artists.into_iter().map(|a| a.name).collect();
        let album = attributes.album.map(|a| a.title).unwrap_or_default();

        let song = Song::new(attributes.title, artists, album, ProviderKind::Tidal, track.id);
        match attributes.isrc {
            Some(isrc) => song.with_isrc(isrc),
            None => song,
        }
    }

    fn validate_playlist_id(playlist_id: &str) -> Result<()> {
        if playlist_id.trim().is_empty() {
            return Err(TidalError::InvalidPlaylistId(playlist_id.to_string()));
        }
        Ok(())
    }
}

/// `links.next` is relative to the API host.
fn absolute_url(next: &str) -> String {
    if next.starts_with("http") {
        next.to_string()
    } else {
        format!("{}{}", TIDAL_API_HOST, next)
    }
}

/// Maps a final non-success response to an error.
fn status_error(response: &HttpResponse, attempts: u32) -> TidalError {
    let message = String::from_utf8_lossy(&response.body).to_string();
    match response.status {
        401 => TidalError::AuthenticationFailed(message),
        429 => TidalError::RateLimitExceeded { attempts },
        status_code => TidalError::ApiError {
            status_code,
            message,
        },
    }
}

/// Lookups for one user, driven by the shared search ladder.
struct TidalTrackSearch<'a> {
    connector: &'a TidalConnector,
    token: String,
    country: String,
}

#[async_trait]
impl TrackSearch for TidalTrackSearch<'_> {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Tidal
    }

    async fn search_isrc(&self, isrc: &str) -> BridgeResult<Option<Song>> {
        let url = format!(
            "{}/tracks?countryCode={}&filter[isrc]={}",
            TIDAL_API_BASE,
            self.country,
            urlencoding::encode(isrc)
        );
        let response: Document<Vec<Resource>> =
            self.connector.get_json(url, &self.token).await?;

        Ok(response.data.into_iter().find_map(|resource| match resource {
            Resource::Track(track) => Some(TidalConnector::convert_track(track)),
            _ => None,
        }))
    }

    async fn search_metadata(
        &self,
        query: &MetadataQuery,
        limit: usize,
    ) -> BridgeResult<Vec<Song>> {
        let url = format!(
            "{}/searchResults/{}/relationships/tracks?countryCode={}&include=tracks&limit={}",
            TIDAL_API_BASE,
            urlencoding::encode(&query.to_free_text()),
            self.country,
            limit
        );
        let response: Document<Vec<ResourceIdentifier>> =
            self.connector.get_json(url, &self.token).await?;

        let mut tracks: HashMap<String, TrackResource> = response
            .included
            .into_iter()
            .filter_map(|resource| match resource {
                Resource::Track(track) => Some((track.id.clone(), track)),
                _ => None,
            })
            .collect();

        // Relevance order comes from `data`
        Ok(response
            .data
            .iter()
            .filter(|id| id.is_track())
            .filter_map(|id| tracks.remove(&id.id))
            .take(limit)
            .map(TidalConnector::convert_track)
            .collect())
    }
}

#[async_trait]
impl MusicProvider for TidalConnector {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Tidal
    }

    #[instrument(skip(self, code, code_verifier))]
    async fn exchange_code_for_token(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> BridgeResult<OAuthTokens> {
        let tokens = self
            .credentials
            .flow(ProviderKind::Tidal)
            .map_err(TidalError::from)?
            .exchange_code(code, code_verifier)
            .await
            .map_err(TidalError::from)?;
        Ok(tokens)
    }

    /// Collection playlists followed by owned ones, deduplicated by id.
    ///
    /// Each source is best-effort; a failing one is logged and skipped.
    #[instrument(skip(self), fields(user_id = %user))]
    async fn get_playlists(&self, user: &UserId) -> BridgeResult<Vec<Playlist>> {
        let token = self.access_token(user).await?;
        let profile = self.profile(&token).await?;

        let mut playlists = Vec::new();
        match self.collection_playlists(&profile, &token).await {
            Ok(found) => playlists.extend(found),
            Err(e) => warn!(error = %e, "Failed to list collection playlists"),
        }
        match self.owned_playlists(&profile, &token).await {
            Ok(found) => playlists.extend(found),
            Err(e) => warn!(error = %e, "Failed to list owned playlists"),
        }

        let mut seen = HashSet::new();
        let playlists: Vec<Playlist> = playlists
            .into_iter()
            .filter(|p| seen.insert(p.id.clone()))
            .map(Self::convert_playlist)
            .collect();

        info!("Listed {} playlists from Tidal", playlists.len());
        Ok(playlists)
    }

    #[instrument(skip(self), fields(user_id = %user))]
    async fn get_playlist(&self, user: &UserId, playlist_id: &str) -> BridgeResult<Playlist> {
        Self::validate_playlist_id(playlist_id)?;
        let token = self.access_token(user).await?;
        let profile = self.profile(&token).await?;

        let url = format!(
            "{}/playlists/{}?countryCode={}",
            TIDAL_API_BASE,
            urlencoding::encode(playlist_id),
            profile.country
        );
        let playlist: Document<PlaylistResource> = match self.get_json(url, &token).await {
            Err(TidalError::ApiError {
                status_code: 404, ..
            }) => {
                return Err(TidalError::PlaylistNotFound {
                    playlist_id: playlist_id.to_string(),
                }
                .into())
            }
            other => other?,
        };

        Ok(Self::convert_playlist(playlist.data))
    }

    #[instrument(skip(self), fields(user_id = %user))]
    async fn get_playlist_songs(&self, user: &UserId, playlist_id: &str) -> BridgeResult<Vec<Song>> {
        Self::validate_playlist_id(playlist_id)?;
        let token = self.access_token(user).await?;
        let profile = self.profile(&token).await?;

        let (items, mut tracks) = self
            .playlist_items(playlist_id, &profile.country, &token)
            .await?;

        // Videos and unresolved items are skipped
        let songs: Vec<Song> = items
            .iter()
            .filter(|item| item.is_track())
            .filter_map(|item| tracks.remove(&item.id))
            .map(Self::convert_track)
            .collect();

        info!(
            skipped = items.len() - songs.len(),
            "Fetched {} songs from Tidal playlist",
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
        let profile = self.profile(&token).await?;

        let url = format!(
            "{}/playlists/{}/relationships/items?countryCode={}",
            TIDAL_API_BASE,
            urlencoding::encode(playlist_id),
            profile.country
        );

        for (batch_index, batch) in songs.chunks(ITEM_BATCH_SIZE).enumerate() {
            let data = batch
                .iter()
                .map(|song| ResourceIdentifier::track(song.provider_song_id()))
                .collect();
            let request =
                Self::relationship_request(HttpMethod::Post, url.clone(), &token, data)?;

            self.send(request).await.map_err(|e| {
                warn!(batch = batch_index, error = %e, "Failed to add tracks batch");
                e
            })?;
            debug!(batch = batch_index, size = batch.len(), "Added tracks batch");
        }

        info!("Added {} tracks to Tidal playlist", songs.len());
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user))]
    async fn clear_playlist(&self, user: &UserId, playlist_id: &str) -> BridgeResult<()> {
        Self::validate_playlist_id(playlist_id)?;
        let token = self.access_token(user).await?;
        let profile = self.profile(&token).await?;

        // Removal addresses items by `meta.itemId`
        let (items, _) = self
            .playlist_items(playlist_id, &profile.country, &token)
            .await?;
        if items.is_empty() {
            return Ok(());
        }

        let url = format!(
            "{}/playlists/{}/relationships/items?countryCode={}",
            TIDAL_API_BASE,
            urlencoding::encode(playlist_id),
            profile.country
        );
        for batch in items.chunks(ITEM_BATCH_SIZE) {
            let request =
                Self::relationship_request(HttpMethod::Delete, url.clone(), &token, batch.to_vec())?;
            self.send(request).await?;
        }

        info!("Removed {} items from Tidal playlist", items.len());
        Ok(())
    }

    #[instrument(skip(self, query), fields(user_id = %user))]
    async fn search(&self, user: &UserId, query: &SongQuery) -> BridgeResult<Song> {
        let token = self.access_token(user).await?;
        let profile = self.profile(&token).await?;
        let searcher = TidalTrackSearch {
            connector: self,
            token,
            country: profile.country,
        };

        let song = find_best_match(&searcher, query)
            .await
            .map_err(TidalError::from)?;
        Ok(song)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::InMemorySecureStore;
    use bytes::Bytes;
    use mockall::mock;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    const ME: &str = r#"{"data": {"id": "u42", "type": "users", "attributes": {"country": "NO"}}}"#;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn body_json(request: &HttpRequest) -> serde_json::Value {
        serde_json::from_slice(request.body.as_ref().unwrap()).unwrap()
    }

    fn user() -> UserId {
        UserId::new("user-1")
    }

    async fn connector(http: MockHttpClient) -> TidalConnector {
        let credentials = CredentialManager::new(Arc::new(InMemorySecureStore::new()));
        credentials
            .store_tokens(
                &user(),
                ProviderKind::Tidal,
                &OAuthTokens::new("tidal_token".to_string(), None, 3600),
            )
            .await
            .unwrap();

        TidalConnector::new(Arc::new(http), Arc::new(credentials))
    }

    fn track_json(id: &str, title: &str, isrc: &str) -> String {
        format!(
            r#"{{"id": "{id}", "type": "tracks", "attributes": {{
                "title": "{title}", "isrc": "{isrc}",
                "album": {{"title": "Album {id}"}},
                "artists": [{{"name": "Artist {id}"}}]
            }}}}"#
        )
    }

    #[test]
    fn test_absolute_url() {
        assert_eq!(
            absolute_url("/v2/playlists?page[cursor]=x"),
            "https://openapi.tidal.com/v2/playlists?page[cursor]=x"
        );
        assert_eq!(absolute_url("https://other/next"), "https://other/next");
    }

    #[tokio::test]
    async fn test_get_playlists_merges_collection_and_owned() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(3).returning(|req| {
            assert_eq!(req.headers.get("Accept").map(String::as_str), Some(JSON_API));
            if req.url.ends_with("/users/me") {
                return Ok(response(200, ME));
            }
            if req.url.contains("/userCollections/u42/") {
                assert!(req.url.contains("countryCode=NO"));
                return Ok(response(
                    200,
                    r#"{
                        "data": [{"id": "p1", "type": "playlists"}, {"id": "p2", "type": "playlists"}],
                        "included": [
                            {"id": "p1", "type": "playlists", "attributes": {"name": "Saved"}},
                            {"id": "p2", "type": "playlists", "attributes": {"name": "Mine", "description": "d"}}
                        ]
                    }"#,
                ));
            }
            assert!(req.url.contains("filter[owners.id]=u42"));
            Ok(response(
                200,
                r#"{"data": [
                    {"id": "p2", "type": "playlists", "attributes": {"name": "Mine", "description": "d"}},
                    {"id": "p3", "type": "playlists", "attributes": {"name": "Fresh"}}
                ]}"#,
            ))
        });

        let playlists = connector(mock_http).await.get_playlists(&user()).await.unwrap();

        let ids: Vec<&str> = playlists
            .iter()
            .map(|p| p.source.playlist_id.as_str())
            .collect();
        assert_eq!(ids, vec!["p1", "p2", "p3"]);
        assert_eq!(playlists[1].description, "d");
    }

    #[tokio::test]
    async fn test_get_playlists_tolerates_failing_collection() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(3).returning(|req| {
            if req.url.ends_with("/users/me") {
                Ok(response(200, ME))
            } else if req.url.contains("/userCollections/") {
                Ok(response(403, "forbidden"))
            } else {
                Ok(response(
                    200,
                    r#"{"data": [{"id": "p3", "type": "playlists", "attributes": {"name": "Fresh"}}]}"#,
                ))
            }
        });

        let playlists = connector(mock_http).await.get_playlists(&user()).await.unwrap();

        assert_eq!(playlists.len(), 1);
        assert_eq!(playlists[0].name, "Fresh");
    }

    #[tokio::test]
    async fn test_missing_country_code_fails() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|_| {
            Ok(response(
                200,
                r#"{"data": {"id": "u42", "type": "users", "attributes": {}}}"#,
            ))
        });

        let error = connector(mock_http)
            .await
            .get_playlist(&user(), "p1")
            .await
            .unwrap_err();

        assert!(error.to_string().contains("missing country code"));
    }

    #[tokio::test]
    async fn test_get_playlist_not_found() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(2).returning(|req| {
            if req.url.ends_with("/users/me") {
                Ok(response(200, ME))
            } else {
                Ok(response(404, r#"{"errors": []}"#))
            }
        });

        let error = connector(mock_http)
            .await
            .get_playlist(&user(), "missing")
            .await
            .unwrap_err();

        assert!(error.to_string().contains("Playlist not found: missing"));
    }

    #[tokio::test]
    async fn test_get_playlist_songs_follows_next_links() {
        let first_page = format!(
            r#"{{
                "data": [
                    {{"id": "t1", "type": "tracks", "meta": {{"itemId": "i1"}}}},
                    {{"id": "v1", "type": "videos", "meta": {{"itemId": "i2"}}}}
                ],
                "included": [{}, {{"id": "v1", "type": "videos", "attributes": {{"title": "Clip"}}}}],
                "links": {{"next": "/v2/playlists/p1/relationships/items?page[cursor]=c2"}}
            }}"#,
            track_json("t1", "Halo", "USSM10804555")
        );
        let second_page = format!(
            r#"{{
                "data": [{{"id": "t2", "type": "tracks", "meta": {{"itemId": "i3"}}}}],
                "included": [{}]
            }}"#,
            track_json("t2", "Crazy in Love", "")
        );

        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(3).returning(move |req| {
            if req.url.ends_with("/users/me") {
                Ok(response(200, ME))
            } else if req.url.contains("page[cursor]=c2") {
                assert!(req.url.starts_with("https://openapi.tidal.com/v2/playlists/p1"));
                Ok(response(200, &second_page))
            } else {
                assert!(req.url.contains("include=items"));
                Ok(response(200, &first_page))
            }
        });

        let songs = connector(mock_http)
            .await
            .get_playlist_songs(&user(), "p1")
            .await
            .unwrap();

        assert_eq!(songs.len(), 2);
        assert_eq!(songs[0].name(), "Halo");
        assert_eq!(songs[0].isrc(), Some("USSM10804555"));
        assert_eq!(songs[0].album(), "Album t1");
        assert_eq!(songs[0].artist_names(), ["Artist t1".to_string()]);
        assert_eq!(songs[1].provider_song_id(), "t2");
        assert_eq!(songs[1].isrc(), None);
    }

    #[tokio::test]
    async fn test_add_to_playlist_batches_by_twenty() {
        let songs: Vec<Song> = (0..45)
            .map(|i| Song::new(format!("S{i}"), vec![], "", ProviderKind::Tidal, format!("{i}")))
            .collect();

        let mut mock_http = MockHttpClient::new();
        let (tx, rx) = std::sync::mpsc::channel();
        mock_http.expect_execute().times(4).returning(move |req| {
            if req.url.ends_with("/users/me") {
                return Ok(response(200, ME));
            }
            assert_eq!(req.method, HttpMethod::Post);
            assert_eq!(
                req.headers.get("Content-Type").map(String::as_str),
                Some(JSON_API)
            );
            let body = body_json(&req);
            assert_eq!(body["data"][0]["type"], "tracks");
            tx.send(body["data"].as_array().unwrap().len()).unwrap();
            Ok(response(201, ""))
        });

        connector(mock_http)
            .await
            .add_to_playlist(&user(), "p1", &songs)
            .await
            .unwrap();

        let batches: Vec<usize> = rx.try_iter().collect();
        assert_eq!(batches, vec![20, 20, 5]);
    }

    #[tokio::test]
    async fn test_add_empty_list_is_noop() {
        let mock_http = MockHttpClient::new();

        connector(mock_http)
            .await
            .add_to_playlist(&user(), "p1", &[])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_clear_playlist_removes_items_by_item_id() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(3).returning(|req| {
            if req.url.ends_with("/users/me") {
                return Ok(response(200, ME));
            }
            if req.method == HttpMethod::Get {
                return Ok(response(
                    200,
                    r#"{"data": [
                        {"id": "t1", "type": "tracks", "meta": {"itemId": "i1"}},
                        {"id": "t2", "type": "tracks", "meta": {"itemId": "i2"}}
                    ]}"#,
                ));
            }

            assert_eq!(req.method, HttpMethod::Delete);
            assert_eq!(
                body_json(&req),
                serde_json::json!({"data": [
                    {"id": "t1", "type": "tracks", "meta": {"itemId": "i1"}},
                    {"id": "t2", "type": "tracks", "meta": {"itemId": "i2"}}
                ]})
            );
            Ok(response(204, ""))
        });

        connector(mock_http)
            .await
            .clear_playlist(&user(), "p1")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_search_by_isrc() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(2).returning(|req| {
            if req.url.ends_with("/users/me") {
                return Ok(response(200, ME));
            }
            assert!(req.url.contains("filter[isrc]=USSM10804555"));
            Ok(response(
                200,
                &format!(r#"{{"data": [{}]}}"#, track_json("t1", "Halo", "USSM10804555")),
            ))
        });

        let query = SongQuery {
            names: vec!["Halo".to_string()],
            artist_names: vec!["Beyoncé".to_string()],
            album_names: vec![],
            isrc: Some("USSM10804555".to_string()),
        };
        let song = connector(mock_http).await.search(&user(), &query).await.unwrap();

        assert_eq!(song.provider_song_id(), "t1");
        assert_eq!(song.provider(), ProviderKind::Tidal);
    }

    #[tokio::test]
    async fn test_search_metadata_keeps_relevance_order() {
        let body = format!(
            r#"{{
                "data": [{{"id": "t2", "type": "tracks"}}, {{"id": "t1", "type": "tracks"}}],
                "included": [{}, {}]
            }}"#,
            track_json("t1", "Other Song", ""),
            track_json("t2", "Get Lucky", "")
        );

        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(2).returning(move |req| {
            if req.url.ends_with("/users/me") {
                return Ok(response(200, ME));
            }
            assert!(req.url.contains("/searchResults/Get%20Lucky%20Artist%20t2%20Album%20t2/"));
            Ok(response(200, &body))
        });

        let query = SongQuery {
            names: vec!["Get Lucky".to_string()],
            artist_names: vec!["Artist t2".to_string()],
            album_names: vec!["Album t2".to_string()],
            isrc: None,
        };
        let song = connector(mock_http).await.search(&user(), &query).await.unwrap();

        assert_eq!(song.provider_song_id(), "t2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_is_retried() {
        let mut mock_http = MockHttpClient::new();
        let mut me_calls = 0;
        mock_http.expect_execute().times(3).returning(move |req| {
            if req.url.ends_with("/users/me") {
                me_calls += 1;
                if me_calls == 1 {
                    return Ok(response(429, "slow down"));
                }
                return Ok(response(200, ME));
            }
            Ok(response(
                200,
                r#"{"data": {"id": "p1", "type": "playlists", "attributes": {"name": "Mix"}}}"#,
            ))
        });

        let playlist = connector(mock_http)
            .await
            .get_playlist(&user(), "p1")
            .await
            .unwrap();

        assert_eq!(playlist.name, "Mix");
    }
}
