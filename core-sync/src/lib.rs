//! # Playlist Sync Module
//!
//! Copies and merges playlists across streaming providers.
//!
//! ## Overview
//!
//! This module manages the lifecycle of sync runs, including:
//! - Validating user sync configurations (one-way and merge)
//! - Fetching source playlists through the provider capability
//! - Deduplicating merged sources and resolving songs on the destination
//! - Persisting every run transition and broadcasting it to subscribers
//!
//! ## Components
//!
//! - **Sync Configuration** (`config`): One-way and merge variants, validation, canonical keys
//! - **Sync Run State Machine** (`run`): Run lifecycle with validated transitions
//! - **Provider Capability** (`provider`): What a streaming service must offer, plus the registry
//! - **Repository** (`repository`): SQLite persistence for configurations and runs
//! - **Status Broadcaster** (`broadcaster`): Per-sync fan-out of run updates
//! - **Status Stream** (`status_stream`): Subscription loop with heartbeat
//! - **Sync Orchestrator** (`orchestrator`): Runs strategies and owns the lifecycle

pub mod broadcaster;
pub mod config;
pub mod db;
pub mod error;
pub mod orchestrator;
pub mod provider;
pub mod repository;
pub mod run;
pub mod status_stream;

pub use broadcaster::{StatusBroadcaster, Subscription, SubscriptionId};
pub use config::{SyncConfig, SyncId, SyncKind};
pub use error::{Result, SyncError};
pub use orchestrator::SyncOrchestrator;
pub use provider::{MusicProvider, ProviderRegistry};
pub use repository::{
    SqliteSyncConfigRepository, SqliteSyncRunRepository, SyncConfigRepository, SyncRunRepository,
};
pub use run::{SyncRun, SyncRunId, SyncStatus};
pub use status_stream::{stream_status, StreamEnd};
