//! # Provider Capability
//!
//! What the sync engine needs from a streaming service, and the registry the
//! orchestrator resolves providers from.

use crate::{Result, SyncError};
use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{Playlist, ProviderKind, Song, SongQuery, UserId};
use core_auth::OAuthTokens;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Playlist and search operations of one streaming service.
///
/// Implementations obtain the user's access token themselves, so every call
/// takes the acting user. Errors cross this boundary as
/// [`BridgeError`](bridge_traits::BridgeError).
#[async_trait]
pub trait MusicProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Trade an OAuth authorization code for tokens.
    async fn exchange_code_for_token(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> BridgeResult<OAuthTokens>;

    /// Playlists owned or followed by the user
    async fn get_playlists(&self, user: &UserId) -> BridgeResult<Vec<Playlist>>;

    async fn get_playlist(&self, user: &UserId, playlist_id: &str) -> BridgeResult<Playlist>;

    /// Every song of the playlist, all pages fetched
    async fn get_playlist_songs(&self, user: &UserId, playlist_id: &str)
        -> BridgeResult<Vec<Song>>;

    /// Append songs in order. Every song must be native to this provider.
    async fn add_to_playlist(
        &self,
        user: &UserId,
        playlist_id: &str,
        songs: &[Song],
    ) -> BridgeResult<()>;

    /// Remove every item of the playlist
    async fn clear_playlist(&self, user: &UserId, playlist_id: &str) -> BridgeResult<()>;

    /// Best match for `query` on this provider.
    ///
    /// Fails when no candidate could be found at all.
    async fn search(&self, user: &UserId, query: &SongQuery) -> BridgeResult<Song>;
}

/// Providers available to the orchestrator, by kind
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<ProviderKind, Arc<dyn MusicProvider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the provider for its kind
    pub async fn register(&self, provider: Arc<dyn MusicProvider>) {
        let kind = provider.kind();
        self.providers.write().await.insert(kind, provider);
        info!(provider = %kind, "Registered music provider");
    }

    /// # Errors
    ///
    /// Returns [`SyncError::ProviderUnavailable`] if nothing is registered
    /// for `kind`
    pub async fn get(&self, kind: ProviderKind) -> Result<Arc<dyn MusicProvider>> {
        self.providers
            .read()
            .await
            .get(&kind)
            .cloned()
            .ok_or(SyncError::ProviderUnavailable(kind))
    }

    pub async fn kinds(&self) -> Vec<ProviderKind> {
        let providers = self.providers.read().await;
        ProviderKind::ALL
            .into_iter()
            .filter(|kind| providers.contains_key(kind))
            .collect()
    }
}
