//! # Sync Orchestrator
//!
//! Executes sync configurations and drives each run through its lifecycle.
//!
//! ## Workflow
//!
//! 1. **Validate**: reject malformed configurations before any run exists
//! 2. **Pending**: create the run record, re-read it, broadcast it
//! 3. **Running**: persist and broadcast the transition
//! 4. **Strategy**: by variant
//!    - *One-way*: fetch source → normalize → resolve on destination →
//!      clear (optional) → append
//!    - *Merge*: fetch every source (failing sources skipped) → deduplicate
//!      → normalize → resolve → clear (optional) → append
//! 5. **Finalize**: `Completed` with the unmatched songs, or `Failed`;
//!    always persisted and broadcast, even after a strategy panic
//!
//! Every write is followed by a re-read so broadcasts carry the store's
//! timestamps. If the re-read fails the in-memory run is broadcast instead.
//!
//! ## Cancellation
//!
//! Each run gets a child of the orchestrator's shutdown token. The token is
//! checked before every provider call; an in-flight call is allowed to
//! finish. A cancelled run ends `Failed`.
//!
//! ## Usage
//!
//! ```no_run
//! use core_sync::{ProviderRegistry, StatusBroadcaster, SyncOrchestrator};
//! use core_sync::repository::SqliteSyncRunRepository;
//! use std::sync::Arc;
//! # async fn example(
//! #     pool: sqlx::SqlitePool,
//! #     user: bridge_traits::UserId,
//! #     config: core_sync::SyncConfig,
//! # ) -> core_sync::Result<()> {
//! let orchestrator = Arc::new(SyncOrchestrator::new(
//!     Arc::new(ProviderRegistry::new()),
//!     Arc::new(SqliteSyncRunRepository::new(pool)),
//!     Arc::new(StatusBroadcaster::default()),
//! ));
//!
//! // Returns the PENDING run; the sync continues in the background
//! let run = orchestrator.spawn_sync(user, config).await?;
//! println!("Started run {}", run.id);
//! # Ok(())
//! # }
//! ```

use crate::broadcaster::StatusBroadcaster;
use crate::provider::{MusicProvider, ProviderRegistry};
use crate::repository::SyncRunRepository;
use crate::{Result, SyncConfig, SyncError, SyncKind, SyncRun};
use bridge_traits::{PlaylistRef, Song, SongQuery, UserId};
use core_matching::{deduplicate, SongNormalizer};
use core_runtime::config::{SyncSettings, DEFAULT_DEDUP_THRESHOLD};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// What a strategy produced
#[derive(Debug, Default)]
struct StrategyReport {
    added: usize,
    unmatched: Vec<Song>,
}

/// Runs sync strategies and owns the run lifecycle.
pub struct SyncOrchestrator {
    providers: Arc<ProviderRegistry>,
    runs: Arc<dyn SyncRunRepository>,
    broadcaster: Arc<StatusBroadcaster>,
    normalizer: Option<Arc<dyn SongNormalizer>>,
    dedup_threshold: f64,
    shutdown: CancellationToken,
}

impl SyncOrchestrator {
    pub fn new(
        providers: Arc<ProviderRegistry>,
        runs: Arc<dyn SyncRunRepository>,
        broadcaster: Arc<StatusBroadcaster>,
    ) -> Self {
        Self {
            providers,
            runs,
            broadcaster,
            normalizer: None,
            dedup_threshold: DEFAULT_DEDUP_THRESHOLD,
            shutdown: CancellationToken::new(),
        }
    }

    /// Normalize song metadata before resolution
    pub fn with_normalizer(mut self, normalizer: Arc<dyn SongNormalizer>) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    pub fn with_settings(mut self, settings: &SyncSettings) -> Self {
        self.dedup_threshold = settings.dedup_threshold;
        self
    }

    pub fn dedup_threshold(&self) -> f64 {
        self.dedup_threshold
    }

    /// Cancels every in-flight run at its next suspension point.
    pub fn shutdown(&self) {
        info!("Cancelling in-flight sync runs");
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    // ------------------------------------------------------------------------
    // Entry points
    // ------------------------------------------------------------------------

    /// Runs `config` to completion and returns the terminal run.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Validation`] for a malformed configuration; no run is
    ///   created
    /// - A persistence error if the run record cannot be created
    /// - The strategy error of a failed run (the `Failed` run is persisted
    ///   and broadcast first)
    pub async fn run_sync(&self, user: &UserId, config: &SyncConfig) -> Result<SyncRun> {
        let run = self.create_run(config).await?;
        self.execute(run, user, config).await
    }

    /// Creates the run and executes it on a detached task.
    ///
    /// Returns the `Pending` run as soon as it is persisted. Later failures
    /// surface only through the run record and the status broadcasts.
    ///
    /// # Errors
    ///
    /// Same as [`create_run`](Self::create_run)
    pub async fn spawn_sync(self: &Arc<Self>, user: UserId, config: SyncConfig) -> Result<SyncRun> {
        let run = self.create_run(&config).await?;

        let orchestrator = Arc::clone(self);
        let pending = run.clone();
        tokio::spawn(async move {
            if let Err(e) = orchestrator.execute(run, &user, &config).await {
                warn!(sync_id = %config.id, error = %e, "Background sync run failed");
            }
        });

        Ok(pending)
    }

    /// Validates `config` and records a new `Pending` run for it.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Validation`] for a malformed configuration, or
    /// the store error if the run cannot be created
    #[instrument(skip(self, config), fields(sync_id = %config.id))]
    pub async fn create_run(&self, config: &SyncConfig) -> Result<SyncRun> {
        config.kind.validate_shape()?;

        let run = SyncRun::new(config.id);
        let stored = self.store_and_broadcast(run, true).await.map_err(|e| {
            error!(error = %e, "Failed to store initial sync run");
            e
        })?;

        info!(run_id = %stored.id, kind = config.kind.name(), "Sync run created");
        Ok(stored)
    }

    /// Drives a `Pending` run to a terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidStateTransition`] if `run` is not
    /// `Pending`, otherwise the strategy error of a failed run
    #[instrument(skip(self, run, user, config), fields(sync_id = %config.id, run_id = %run.id))]
    pub async fn execute(&self, run: SyncRun, user: &UserId, config: &SyncConfig) -> Result<SyncRun> {
        let running = run.start()?;
        let cancel = self.shutdown.child_token();

        let (current, outcome) = match self.store_and_broadcast(running.clone(), false).await {
            Ok(stored) => {
                info!("Sync run started");
                let outcome = AssertUnwindSafe(self.run_strategy(user, config, &cancel))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        let message = panic_message(panic);
                        error!(panic = %message, "Recovered from panic in sync strategy");
                        Err(SyncError::Panicked(message))
                    });
                (stored, outcome)
            }
            Err(e) => {
                error!(error = %e, "Failed to store running sync status");
                (running, Err(e))
            }
        };

        let (terminal, failure) = match outcome {
            Ok(report) => {
                info!(
                    added = report.added,
                    unmatched = report.unmatched.len(),
                    "Sync run completed"
                );
                (current.complete(report.unmatched)?, None)
            }
            Err(e) => {
                warn!(error = %e, "Sync run failed");
                (current.fail(e.to_string())?, Some(e))
            }
        };

        let terminal = self.finalize(terminal).await;

        match failure {
            Some(e) => Err(e),
            None => Ok(terminal),
        }
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// Writes `run`, re-reads it and broadcasts the stored copy.
    async fn store_and_broadcast(&self, run: SyncRun, is_create: bool) -> Result<SyncRun> {
        if is_create {
            self.runs.create_run(&run).await?;
        } else {
            self.runs.update_run(&run).await?;
        }

        Ok(self.refresh_and_broadcast(run).await)
    }

    async fn refresh_and_broadcast(&self, run: SyncRun) -> SyncRun {
        let run = match self.runs.find_run(&run.id).await {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                warn!(run_id = %run.id, "Sync run missing after store, broadcasting in-memory copy");
                run
            }
            Err(e) => {
                warn!(run_id = %run.id, error = %e, "Failed to re-read sync run, broadcasting in-memory copy");
                run
            }
        };

        debug!(run_id = %run.id, status = %run.status, "Broadcasting sync run status");
        self.broadcaster.broadcast(&run);
        run
    }

    /// Last step of every executed run; never fails.
    async fn finalize(&self, run: SyncRun) -> SyncRun {
        match self.runs.update_run(&run).await {
            Ok(()) => self.refresh_and_broadcast(run).await,
            Err(e) => {
                error!(
                    run_id = %run.id,
                    status = %run.status,
                    error = %e,
                    "CRITICAL: failed to store final sync run state"
                );
                self.broadcaster.broadcast(&run);
                run
            }
        }
    }

    // ------------------------------------------------------------------------
    // Strategies
    // ------------------------------------------------------------------------

    async fn run_strategy(
        &self,
        user: &UserId,
        config: &SyncConfig,
        cancel: &CancellationToken,
    ) -> Result<StrategyReport> {
        match &config.kind {
            SyncKind::OneWay {
                source,
                destination,
                overwrite_existing,
            } => {
                self.run_one_way(user, source, destination, *overwrite_existing, cancel)
                    .await
            }
            SyncKind::Merge {
                sources,
                destination,
                overwrite_existing,
            } => {
                self.run_merge(user, sources, destination, *overwrite_existing, cancel)
                    .await
            }
        }
    }

    async fn run_one_way(
        &self,
        user: &UserId,
        source: &PlaylistRef,
        destination: &PlaylistRef,
        overwrite_existing: bool,
        cancel: &CancellationToken,
    ) -> Result<StrategyReport> {
        let source_provider = self.providers.get(source.provider).await?;

        ensure_active(cancel)?;
        info!(source = %source, "Fetching source playlist");
        let songs = source_provider
            .get_playlist_songs(user, &source.playlist_id)
            .await
            .map_err(|e| {
                SyncError::provider(format!("failed to fetch source playlist {source}"), e)
            })?;
        info!(count = songs.len(), "Fetched source songs");

        let songs = self.normalize(songs, cancel).await?;
        self.write_destination(user, destination, overwrite_existing, songs, cancel)
            .await
    }

    async fn run_merge(
        &self,
        user: &UserId,
        sources: &[PlaylistRef],
        destination: &PlaylistRef,
        overwrite_existing: bool,
        cancel: &CancellationToken,
    ) -> Result<StrategyReport> {
        let mut all_songs = Vec::new();
        let mut fetched_sources = 0;
        let mut last_error = None;

        for source in sources {
            let provider = self.providers.get(source.provider).await?;

            ensure_active(cancel)?;
            match provider.get_playlist_songs(user, &source.playlist_id).await {
                Ok(songs) => {
                    info!(source = %source, count = songs.len(), "Fetched merge source");
                    fetched_sources += 1;
                    all_songs.extend(songs);
                }
                Err(e) => {
                    warn!(source = %source, error = %e, "Could not fetch merge source, skipping");
                    last_error = Some(e);
                }
            }
        }

        // Nothing readable: leave the destination untouched
        if fetched_sources == 0 {
            if let Some(e) = last_error {
                return Err(SyncError::provider(
                    format!("none of the {} merge sources could be fetched", sources.len()),
                    e,
                ));
            }
        }

        let fetched = all_songs.len();
        let unique = deduplicate(all_songs, self.dedup_threshold);
        info!(
            fetched,
            unique = unique.len(),
            threshold = self.dedup_threshold,
            "Deduplicated merge sources"
        );

        let songs = self.normalize(unique, cancel).await?;
        self.write_destination(user, destination, overwrite_existing, songs, cancel)
            .await
    }

    async fn normalize(&self, songs: Vec<Song>, cancel: &CancellationToken) -> Result<Vec<Song>> {
        let Some(normalizer) = &self.normalizer else {
            return Ok(songs);
        };
        if songs.is_empty() {
            return Ok(songs);
        }

        ensure_active(cancel)?;
        info!(count = songs.len(), "Normalizing song metadata");
        Ok(normalizer.normalize(songs).await?)
    }

    /// Resolve → optional clear → append, shared by both strategies.
    async fn write_destination(
        &self,
        user: &UserId,
        destination: &PlaylistRef,
        overwrite_existing: bool,
        songs: Vec<Song>,
        cancel: &CancellationToken,
    ) -> Result<StrategyReport> {
        let provider = self.providers.get(destination.provider).await?;

        let (resolved, unmatched) = resolve_songs(provider.as_ref(), user, songs, cancel).await?;
        if !unmatched.is_empty() {
            warn!(
                destination = %destination,
                unmatched = unmatched.len(),
                "Some songs have no match on the destination"
            );
        }

        if overwrite_existing {
            ensure_active(cancel)?;
            info!(destination = %destination, "Clearing destination playlist");
            provider
                .clear_playlist(user, &destination.playlist_id)
                .await
                .map_err(|e| {
                    SyncError::provider(
                        format!("failed to clear destination playlist {destination}"),
                        e,
                    )
                })?;
        }

        if resolved.is_empty() {
            info!(destination = %destination, "Nothing to add to destination playlist");
        } else {
            ensure_active(cancel)?;
            info!(
                destination = %destination,
                count = resolved.len(),
                "Adding songs to destination playlist"
            );
            provider
                .add_to_playlist(user, &destination.playlist_id, &resolved)
                .await
                .map_err(|e| {
                    SyncError::provider(
                        format!("failed to add songs to destination playlist {destination}"),
                        e,
                    )
                })?;
        }

        Ok(StrategyReport {
            added: resolved.len(),
            unmatched,
        })
    }
}

/// Finds every song on `destination`. Songs already native to it are kept
/// as they are; songs without a match are returned separately.
async fn resolve_songs(
    destination: &dyn MusicProvider,
    user: &UserId,
    songs: Vec<Song>,
    cancel: &CancellationToken,
) -> Result<(Vec<Song>, Vec<Song>)> {
    let kind = destination.kind();
    let mut resolved = Vec::with_capacity(songs.len());
    let mut unmatched = Vec::new();

    for song in songs {
        if song.provider() == kind {
            resolved.push(song);
            continue;
        }

        ensure_active(cancel)?;
        match destination.search(user, &SongQuery::from_song(&song)).await {
            Ok(found) => {
                debug!(song = %song, found = found.provider_song_id(), "Resolved song");
                resolved.push(found);
            }
            Err(e) => {
                warn!(song = %song, provider = %kind, error = %e, "Failed to resolve song");
                unmatched.push(song);
            }
        }
    }

    Ok((resolved, unmatched))
}

fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(SyncError::Cancelled);
    }
    Ok(())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("normalizer", &self.normalizer.is_some())
            .field("dedup_threshold", &self.dedup_threshold)
            .field("shut_down", &self.shutdown.is_cancelled())
            .finish()
    }
}
