//! Sync service façade
//!
//! Entry point for host applications: sync configuration CRUD, run
//! triggering, status subscriptions and provider connections, scoped to the
//! calling user.

use std::sync::Arc;
use std::time::Duration;

use bridge_traits::{Playlist, PlaylistRef, ProviderKind, UserId};
use core_auth::CredentialManager;
use core_matching::SongNormalizer;
use core_runtime::config::SyncSettings;
use core_sync::{
    stream_status, ProviderRegistry, StatusBroadcaster, SyncConfig, SyncConfigRepository,
    SyncError, SyncId, SyncKind, SyncOrchestrator, SyncRun, SyncRunRepository,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::Result;

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct SyncService {
    credentials: Arc<CredentialManager>,
    providers: Arc<ProviderRegistry>,
    syncs: Arc<dyn SyncConfigRepository>,
    runs: Arc<dyn SyncRunRepository>,
    broadcaster: Arc<StatusBroadcaster>,
    orchestrator: Arc<SyncOrchestrator>,
    subscriber_capacity: usize,
    heartbeat: Duration,
}

impl SyncService {
    /// Assembles the service from already constructed components.
    pub fn from_parts(
        credentials: Arc<CredentialManager>,
        providers: Arc<ProviderRegistry>,
        syncs: Arc<dyn SyncConfigRepository>,
        runs: Arc<dyn SyncRunRepository>,
        settings: &SyncSettings,
        normalizer: Option<Arc<dyn SongNormalizer>>,
    ) -> Self {
        let broadcaster = Arc::new(StatusBroadcaster::new(settings.subscriber_capacity));

        let mut orchestrator =
            SyncOrchestrator::new(providers.clone(), runs.clone(), broadcaster.clone())
                .with_settings(settings);
        if let Some(normalizer) = normalizer {
            orchestrator = orchestrator.with_normalizer(normalizer);
        }

        Self {
            credentials,
            providers,
            syncs,
            runs,
            broadcaster,
            orchestrator: Arc::new(orchestrator),
            subscriber_capacity: settings.subscriber_capacity,
            heartbeat: settings.heartbeat,
        }
    }

    pub fn credentials(&self) -> &Arc<CredentialManager> {
        &self.credentials
    }

    // ------------------------------------------------------------------------
    // Sync configurations
    // ------------------------------------------------------------------------

    /// Validates and stores a new sync configuration for `user`.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Validation`] for a malformed configuration
    /// - [`SyncError::ProviderNotConnected`] when a source or the destination
    ///   lives on a provider the user has not connected
    /// - [`SyncError::DuplicateSync`] when the user already has an
    ///   equivalent configuration
    #[instrument(skip(self, kind), fields(user_id = %user, kind = kind.name()))]
    pub async fn create_sync(&self, user: &UserId, kind: SyncKind) -> Result<SyncConfig> {
        let connected = self.credentials.connected_providers(user).await?;
        let existing = self.syncs.list_syncs(user).await?;

        let config = SyncConfig::new(user.clone(), kind);
        config.validate_for_user(&connected, &existing)?;

        self.syncs.create_sync(&config).await?;
        let stored = self.syncs.get_sync(&config.id).await?;
        let stored = stored.unwrap_or(config);

        info!(sync_id = %stored.id, "Sync configuration created");
        Ok(stored)
    }

    pub async fn list_syncs(&self, user: &UserId) -> Result<Vec<SyncConfig>> {
        Ok(self.syncs.list_syncs(user).await?)
    }

    /// # Errors
    ///
    /// Returns [`SyncError::SyncNotFound`] if the sync doesn't exist or
    /// belongs to another user
    pub async fn get_sync(&self, user: &UserId, sync_id: &SyncId) -> Result<SyncConfig> {
        match self.syncs.get_sync(sync_id).await? {
            Some(config) if &config.user_id == user => Ok(config),
            _ => Err(SyncError::SyncNotFound {
                sync_id: sync_id.to_string(),
            }
            .into()),
        }
    }

    /// Deletes a configuration. Its run history is kept.
    #[instrument(skip(self), fields(user_id = %user, sync_id = %sync_id))]
    pub async fn delete_sync(&self, user: &UserId, sync_id: &SyncId) -> Result<()> {
        self.syncs.delete_sync(user, sync_id).await?;
        info!("Sync configuration deleted");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Runs
    // ------------------------------------------------------------------------

    /// Starts a run of the sync in the background.
    ///
    /// Returns the `Pending` run once it is stored; progress and the outcome
    /// are only visible through [`list_runs`](Self::list_runs) and
    /// [`subscribe_status`](Self::subscribe_status).
    #[instrument(skip(self), fields(user_id = %user, sync_id = %sync_id))]
    pub async fn run_sync(&self, user: &UserId, sync_id: &SyncId) -> Result<SyncRun> {
        let config = self.get_sync(user, sync_id).await?;
        let run = self.orchestrator.spawn_sync(user.clone(), config).await?;

        info!(run_id = %run.id, "Sync run scheduled");
        Ok(run)
    }

    /// Runs of the sync, newest first.
    pub async fn list_runs(&self, user: &UserId, sync_id: &SyncId) -> Result<Vec<SyncRun>> {
        let config = self.get_sync(user, sync_id).await?;
        Ok(self
            .runs
            .find_runs(None, Some(std::slice::from_ref(&config.id)))
            .await?)
    }

    /// Streams run updates of the sync until `cancel` fires, the receiver
    /// is dropped or the service shuts down.
    ///
    /// The latest known run is delivered first; while idle it is repeated
    /// at the configured heartbeat.
    #[instrument(skip(self, cancel), fields(user_id = %user, sync_id = %sync_id))]
    pub async fn subscribe_status(
        &self,
        user: &UserId,
        sync_id: &SyncId,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<SyncRun>> {
        let config = self.get_sync(user, sync_id).await?;
        let (sink, receiver) = mpsc::channel(self.subscriber_capacity);

        let broadcaster = self.broadcaster.clone();
        let runs = self.runs.clone();
        let heartbeat = self.heartbeat;
        tokio::spawn(async move {
            match stream_status(&broadcaster, runs.as_ref(), config.id, heartbeat, cancel, sink)
                .await
            {
                Ok(end) => debug!(sync_id = %config.id, ?end, "Status stream ended"),
                Err(e) => warn!(sync_id = %config.id, error = %e, "Status stream failed"),
            }
        });

        Ok(receiver)
    }

    // ------------------------------------------------------------------------
    // Providers
    // ------------------------------------------------------------------------

    /// Completes an OAuth authorization and stores the tokens for `user`.
    #[instrument(skip(self, code, code_verifier), fields(user_id = %user, provider = %provider))]
    pub async fn connect_provider(
        &self,
        user: &UserId,
        provider: ProviderKind,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<()> {
        let connector = self.providers.get(provider).await?;
        let tokens = connector
            .exchange_code_for_token(code, code_verifier)
            .await
            .map_err(|e| SyncError::provider(format!("failed to connect {provider}"), e))?;

        self.credentials.store_tokens(user, provider, &tokens).await?;
        info!("Provider connected");
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user, provider = %provider))]
    pub async fn disconnect_provider(&self, user: &UserId, provider: ProviderKind) -> Result<()> {
        Ok(self.credentials.disconnect(user, provider).await?)
    }

    pub async fn connected_providers(&self, user: &UserId) -> Result<Vec<ProviderKind>> {
        Ok(self.credentials.connected_providers(user).await?)
    }

    pub async fn list_playlists(&self, user: &UserId, provider: ProviderKind) -> Result<Vec<Playlist>> {
        let connector = self.providers.get(provider).await?;
        let playlists = connector.get_playlists(user).await.map_err(|e| {
            SyncError::provider(format!("failed to list {provider} playlists"), e)
        })?;
        Ok(playlists)
    }

    pub async fn get_playlist(&self, user: &UserId, playlist: &PlaylistRef) -> Result<Playlist> {
        let connector = self.providers.get(playlist.provider).await?;
        let found = connector
            .get_playlist(user, &playlist.playlist_id)
            .await
            .map_err(|e| SyncError::provider(format!("failed to fetch playlist {playlist}"), e))?;
        Ok(found)
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Cancels in-flight runs and closes every status subscription.
    pub fn shutdown(&self) {
        info!("Shutting down sync service");
        self.orchestrator.shutdown();
        self.broadcaster.close_all();
    }
}
