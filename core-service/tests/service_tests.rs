//! Integration tests for the sync service façade
//!
//! Real SQLite stores and credential manager, stub providers.

use async_trait::async_trait;
use bridge_desktop::InMemorySecureStore;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{Playlist, PlaylistRef, ProviderKind, Song, SongQuery, UserId};
use core_auth::{CredentialManager, OAuthTokens};
use core_runtime::config::SyncSettings;
use core_service::{CoreError, SyncService};
use core_sync::db::create_test_pool;
use core_sync::{
    MusicProvider, ProviderRegistry, SqliteSyncConfigRepository, SqliteSyncRunRepository,
    SyncError, SyncKind, SyncRun, SyncStatus,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Provider whose playlists are fixed and whose search echoes the query
struct StubProvider {
    kind: ProviderKind,
    playlists: HashMap<String, Vec<Song>>,
    added: Mutex<Vec<Song>>,
}

impl StubProvider {
    fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            playlists: HashMap::new(),
            added: Mutex::new(Vec::new()),
        }
    }

    fn with_playlist(mut self, id: &str, songs: Vec<Song>) -> Self {
        self.playlists.insert(id.to_string(), songs);
        self
    }
}

#[async_trait]
impl MusicProvider for StubProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn exchange_code_for_token(
        &self,
        code: &str,
        _code_verifier: Option<&str>,
    ) -> BridgeResult<OAuthTokens> {
        if code == "bad-code" {
            return Err(BridgeError::OperationFailed("invalid_grant".to_string()));
        }
        Ok(OAuthTokens::new(format!("token-{code}"), None, 3600))
    }

    async fn get_playlists(&self, _user: &UserId) -> BridgeResult<Vec<Playlist>> {
        let mut ids: Vec<&String> = self.playlists.keys().collect();
        ids.sort();
        Ok(ids
            .into_iter()
            .map(|id| Playlist {
                source: PlaylistRef::new(self.kind, id.clone()),
                name: format!("Playlist {id}"),
                description: String::new(),
                image_url: None,
            })
            .collect())
    }

    async fn get_playlist(&self, user: &UserId, playlist_id: &str) -> BridgeResult<Playlist> {
        self.get_playlists(user)
            .await?
            .into_iter()
            .find(|p| p.source.playlist_id == playlist_id)
            .ok_or_else(|| BridgeError::OperationFailed(format!("no playlist {playlist_id}")))
    }

    async fn get_playlist_songs(
        &self,
        _user: &UserId,
        playlist_id: &str,
    ) -> BridgeResult<Vec<Song>> {
        Ok(self.playlists.get(playlist_id).cloned().unwrap_or_default())
    }

    async fn add_to_playlist(
        &self,
        _user: &UserId,
        _playlist_id: &str,
        songs: &[Song],
    ) -> BridgeResult<()> {
        self.added.lock().unwrap().extend_from_slice(songs);
        Ok(())
    }

    async fn clear_playlist(&self, _user: &UserId, _playlist_id: &str) -> BridgeResult<()> {
        Ok(())
    }

    async fn search(&self, _user: &UserId, query: &SongQuery) -> BridgeResult<Song> {
        let name = query.names.first().cloned().unwrap_or_default();
        Ok(Song::new(
            name.clone(),
            query.artist_names.clone(),
            "",
            self.kind,
            format!("{}-{}", self.kind.as_str(), name),
        ))
    }
}

fn user() -> UserId {
    UserId::new("alice")
}

fn spotify_songs() -> Vec<Song> {
    vec![
        Song::new("Halo", vec!["Beyoncé".into()], "I Am", ProviderKind::Spotify, "s1"),
        Song::new("Get Lucky", vec!["Daft Punk".into()], "RAM", ProviderKind::Spotify, "s2"),
    ]
}

struct Harness {
    service: SyncService,
    youtube: Arc<StubProvider>,
}

async fn harness() -> Harness {
    let pool = create_test_pool().await.unwrap();
    let credentials = Arc::new(CredentialManager::new(Arc::new(InMemorySecureStore::new())));

    let providers = Arc::new(ProviderRegistry::new());
    let youtube = Arc::new(StubProvider::new(ProviderKind::YouTube));
    providers
        .register(Arc::new(
            StubProvider::new(ProviderKind::Spotify).with_playlist("sp-1", spotify_songs()),
        ))
        .await;
    providers.register(youtube.clone()).await;

    let service = SyncService::from_parts(
        credentials,
        providers,
        Arc::new(SqliteSyncConfigRepository::new(pool.clone())),
        Arc::new(SqliteSyncRunRepository::new(pool)),
        &SyncSettings::default(),
        None,
    );

    Harness { service, youtube }
}

async fn connect_all(service: &SyncService) {
    for provider in [ProviderKind::Spotify, ProviderKind::YouTube] {
        service
            .connect_provider(&user(), provider, "code", None)
            .await
            .unwrap();
    }
}

fn spotify_to_youtube() -> SyncKind {
    SyncKind::one_way(
        PlaylistRef::new(ProviderKind::Spotify, "sp-1"),
        PlaylistRef::new(ProviderKind::YouTube, "yt-1"),
        true,
    )
}

async fn wait_for_terminal(service: &SyncService, sync_id: &core_sync::SyncId) -> SyncRun {
    timeout(Duration::from_secs(5), async {
        loop {
            let runs = service.list_runs(&user(), sync_id).await.unwrap();
            if let Some(run) = runs.into_iter().find(|r| r.status.is_terminal()) {
                return run;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("run did not finish")
}

#[tokio::test]
async fn test_connect_and_disconnect_provider() {
    let h = harness().await;

    h.service
        .connect_provider(&user(), ProviderKind::Spotify, "abc", Some("verifier"))
        .await
        .unwrap();
    assert_eq!(
        h.service.connected_providers(&user()).await.unwrap(),
        vec![ProviderKind::Spotify]
    );

    h.service
        .disconnect_provider(&user(), ProviderKind::Spotify)
        .await
        .unwrap();
    assert!(h.service.connected_providers(&user()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_code_exchange_stores_nothing() {
    let h = harness().await;

    let error = h
        .service
        .connect_provider(&user(), ProviderKind::YouTube, "bad-code", None)
        .await
        .unwrap_err();

    assert!(error.to_string().contains("failed to connect"));
    assert!(h.service.connected_providers(&user()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_connect_unregistered_provider() {
    let h = harness().await;

    let error = h
        .service
        .connect_provider(&user(), ProviderKind::Tidal, "code", None)
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        CoreError::Sync(SyncError::ProviderUnavailable(ProviderKind::Tidal))
    ));
}

#[tokio::test]
async fn test_create_sync_requires_connected_providers() {
    let h = harness().await;
    h.service
        .connect_provider(&user(), ProviderKind::Spotify, "code", None)
        .await
        .unwrap();

    let error = h
        .service
        .create_sync(&user(), spotify_to_youtube())
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        CoreError::Sync(SyncError::ProviderNotConnected(ProviderKind::YouTube))
    ));
    assert!(h.service.list_syncs(&user()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_create_sync_rejects_duplicates() {
    let h = harness().await;
    connect_all(&h.service).await;

    let created = h
        .service
        .create_sync(&user(), spotify_to_youtube())
        .await
        .unwrap();
    assert!(created.created_at.is_some());

    // Same sync, overwrite flag aside
    let duplicate = SyncKind::one_way(
        PlaylistRef::new(ProviderKind::Spotify, "sp-1"),
        PlaylistRef::new(ProviderKind::YouTube, "yt-1"),
        false,
    );
    let error = h.service.create_sync(&user(), duplicate).await.unwrap_err();

    assert!(matches!(error, CoreError::Sync(SyncError::DuplicateSync(_))));
    assert_eq!(h.service.list_syncs(&user()).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_equivalent_creates_store_one_sync() {
    let h = harness().await;
    connect_all(&h.service).await;

    let first = tokio::spawn({
        let service = h.service.clone();
        async move { service.create_sync(&user(), spotify_to_youtube()).await }
    });
    let second = tokio::spawn({
        let service = h.service.clone();
        async move { service.create_sync(&user(), spotify_to_youtube()).await }
    });
    let results = [first.await.unwrap(), second.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(CoreError::Sync(SyncError::DuplicateSync(_))))));
    assert_eq!(h.service.list_syncs(&user()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_syncs_are_scoped_to_their_owner() {
    let h = harness().await;
    connect_all(&h.service).await;
    let created = h
        .service
        .create_sync(&user(), spotify_to_youtube())
        .await
        .unwrap();

    let stranger = UserId::new("mallory");
    let error = h.service.get_sync(&stranger, &created.id).await.unwrap_err();
    assert!(matches!(error, CoreError::Sync(SyncError::SyncNotFound { .. })));
    assert!(h.service.run_sync(&stranger, &created.id).await.is_err());
    assert!(h.service.delete_sync(&stranger, &created.id).await.is_err());

    assert_eq!(
        h.service.get_sync(&user(), &created.id).await.unwrap().id,
        created.id
    );
}

#[tokio::test]
async fn test_run_sync_returns_pending_and_completes_in_background() {
    let h = harness().await;
    connect_all(&h.service).await;
    let config = h
        .service
        .create_sync(&user(), spotify_to_youtube())
        .await
        .unwrap();

    let pending = h.service.run_sync(&user(), &config.id).await.unwrap();
    assert_eq!(pending.status, SyncStatus::Pending);

    let done = wait_for_terminal(&h.service, &config.id).await;
    assert_eq!(done.id, pending.id);
    assert_eq!(done.status, SyncStatus::Completed);
    assert!(done.unmatched_songs.is_empty());

    let added = h.youtube.added.lock().unwrap().clone();
    let ids: Vec<&str> = added.iter().map(|s| s.provider_song_id()).collect();
    assert_eq!(ids, vec!["youtube-Halo", "youtube-Get Lucky"]);
}

#[tokio::test]
async fn test_subscribe_status_streams_run_lifecycle() {
    let h = harness().await;
    connect_all(&h.service).await;
    let config = h
        .service
        .create_sync(&user(), spotify_to_youtube())
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let mut updates = h
        .service
        .subscribe_status(&user(), &config.id, cancel.clone())
        .await
        .unwrap();
    // Let the stream subscribe before the run starts
    tokio::time::sleep(Duration::from_millis(50)).await;

    h.service.run_sync(&user(), &config.id).await.unwrap();

    let mut seen = Vec::new();
    timeout(Duration::from_secs(5), async {
        while let Some(run) = updates.recv().await {
            seen.push(run.status);
            if run.status.is_terminal() {
                break;
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(
        seen,
        vec![SyncStatus::Pending, SyncStatus::Running, SyncStatus::Completed]
    );

    cancel.cancel();
    let closed = timeout(Duration::from_secs(5), updates.recv()).await.unwrap();
    assert!(closed.is_none());
}

#[tokio::test]
async fn test_delete_sync_keeps_runs_but_hides_config() {
    let h = harness().await;
    connect_all(&h.service).await;
    let config = h
        .service
        .create_sync(&user(), spotify_to_youtube())
        .await
        .unwrap();
    h.service.run_sync(&user(), &config.id).await.unwrap();
    wait_for_terminal(&h.service, &config.id).await;

    h.service.delete_sync(&user(), &config.id).await.unwrap();

    assert!(h.service.list_syncs(&user()).await.unwrap().is_empty());
    assert!(h.service.get_sync(&user(), &config.id).await.is_err());
}

#[tokio::test]
async fn test_playlist_browsing() {
    let h = harness().await;
    connect_all(&h.service).await;

    let playlists = h
        .service
        .list_playlists(&user(), ProviderKind::Spotify)
        .await
        .unwrap();
    assert_eq!(playlists.len(), 1);
    assert_eq!(playlists[0].name, "Playlist sp-1");

    let playlist = h
        .service
        .get_playlist(&user(), &PlaylistRef::new(ProviderKind::Spotify, "sp-1"))
        .await
        .unwrap();
    assert_eq!(playlist.source.playlist_id, "sp-1");

    let error = h
        .service
        .get_playlist(&user(), &PlaylistRef::new(ProviderKind::Spotify, "nope"))
        .await
        .unwrap_err();
    assert!(error.to_string().contains("failed to fetch playlist spotify:nope"));
}

#[tokio::test]
async fn test_shutdown_closes_subscriptions() {
    let h = harness().await;
    connect_all(&h.service).await;
    let config = h
        .service
        .create_sync(&user(), spotify_to_youtube())
        .await
        .unwrap();

    let mut updates = h
        .service
        .subscribe_status(&user(), &config.id, CancellationToken::new())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    h.service.shutdown();

    let closed = timeout(Duration::from_secs(5), updates.recv()).await.unwrap();
    assert!(closed.is_none());
}
