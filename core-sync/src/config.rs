//! # Sync Configuration
//!
//! User-owned description of what to copy where.
//!
//! A configuration is either a one-way copy of a single playlist or a merge
//! of several playlists into one destination. Two configurations of the same
//! user are equivalent when they share a variant, a destination and the same
//! *set* of sources; [`SyncKind::canonical_key`] captures that equivalence so
//! `[a, b] → d` and `[b, a] → d` collide.

use crate::{Result, SyncError};
use bridge_traits::{PlaylistRef, ProviderKind, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minimum number of sources of a merge
pub const MIN_MERGE_SOURCES: usize = 2;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier of a sync configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncId(Uuid);

impl SyncId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Ok(Self(
            Uuid::parse_str(s).map_err(|e| SyncError::InvalidId(e.to_string()))?,
        ))
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SyncId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SyncId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SyncId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// Sync Kind
// ============================================================================

/// The two supported sync strategies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncKind {
    /// Copy one playlist into another
    OneWay {
        source: PlaylistRef,
        destination: PlaylistRef,
        overwrite_existing: bool,
    },
    /// Union of several playlists, deduplicated, into one destination
    Merge {
        sources: Vec<PlaylistRef>,
        destination: PlaylistRef,
        overwrite_existing: bool,
    },
}

impl SyncKind {
    pub fn one_way(source: PlaylistRef, destination: PlaylistRef, overwrite_existing: bool) -> Self {
        SyncKind::OneWay {
            source,
            destination,
            overwrite_existing,
        }
    }

    pub fn merge(
        sources: Vec<PlaylistRef>,
        destination: PlaylistRef,
        overwrite_existing: bool,
    ) -> Self {
        SyncKind::Merge {
            sources,
            destination,
            overwrite_existing,
        }
    }

    /// Short variant name used in logs and canonical keys
    pub fn name(&self) -> &'static str {
        match self {
            SyncKind::OneWay { .. } => "one_way",
            SyncKind::Merge { .. } => "merge",
        }
    }

    pub fn sources(&self) -> Vec<&PlaylistRef> {
        match self {
            SyncKind::OneWay { source, .. } => vec![source],
            SyncKind::Merge { sources, .. } => sources.iter().collect(),
        }
    }

    pub fn destination(&self) -> &PlaylistRef {
        match self {
            SyncKind::OneWay { destination, .. } | SyncKind::Merge { destination, .. } => {
                destination
            }
        }
    }

    pub fn overwrite_existing(&self) -> bool {
        match self {
            SyncKind::OneWay {
                overwrite_existing, ..
            }
            | SyncKind::Merge {
                overwrite_existing, ..
            } => *overwrite_existing,
        }
    }

    /// Every provider the sync reads from or writes to, destination last.
    pub fn providers(&self) -> Vec<ProviderKind> {
        let mut providers: Vec<ProviderKind> = Vec::new();
        for playlist in self.sources().into_iter().chain([self.destination()]) {
            if !providers.contains(&playlist.provider) {
                providers.push(playlist.provider);
            }
        }
        providers
    }

    /// Checks the rules that need no outside state: non-empty playlist ids
    /// and at least two merge sources.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Validation`] describing the first violation
    pub fn validate_shape(&self) -> Result<()> {
        if let SyncKind::Merge { sources, .. } = self {
            if sources.len() < MIN_MERGE_SOURCES {
                return Err(SyncError::Validation(format!(
                    "A merge needs at least {} sources, got {}",
                    MIN_MERGE_SOURCES,
                    sources.len()
                )));
            }
        }

        for source in self.sources() {
            if source.playlist_id.trim().is_empty() {
                return Err(SyncError::Validation(format!(
                    "Source playlist id on {} cannot be empty",
                    source.provider
                )));
            }
        }

        let destination = self.destination();
        if destination.playlist_id.trim().is_empty() {
            return Err(SyncError::Validation(format!(
                "Destination playlist id on {} cannot be empty",
                destination.provider
            )));
        }

        Ok(())
    }

    /// Order-independent identity of the sync:
    /// `"<variant>:<sorted source keys joined by |>-><destination key>"`.
    pub fn canonical_key(&self) -> String {
        let mut source_keys: Vec<String> = self
            .sources()
            .into_iter()
            .map(PlaylistRef::canonical_key)
            .collect();
        source_keys.sort();
        source_keys.dedup();

        format!(
            "{}:{}->{}",
            self.name(),
            source_keys.join("|"),
            self.destination().canonical_key()
        )
    }
}

// ============================================================================
// Sync Config Entity
// ============================================================================

/// A persisted sync configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub id: SyncId,
    pub user_id: UserId,
    pub kind: SyncKind,
    /// Assigned by the sync store on insert
    pub created_at: Option<DateTime<Utc>>,
}

impl SyncConfig {
    pub fn new(user_id: UserId, kind: SyncKind) -> Self {
        Self {
            id: SyncId::new(),
            user_id,
            kind,
            created_at: None,
        }
    }

    /// Full creation-time validation.
    ///
    /// `connected` lists the providers the user holds credentials for and
    /// `existing` the user's current configurations.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Validation`] for a malformed configuration
    /// - [`SyncError::ProviderNotConnected`] for a source or destination on a
    ///   provider without credentials
    /// - [`SyncError::DuplicateSync`] when an equivalent configuration exists
    pub fn validate_for_user(
        &self,
        connected: &[ProviderKind],
        existing: &[SyncConfig],
    ) -> Result<()> {
        self.kind.validate_shape()?;

        for provider in self.kind.providers() {
            if !connected.contains(&provider) {
                return Err(SyncError::ProviderNotConnected(provider));
            }
        }

        let key = self.kind.canonical_key();
        if let Some(duplicate) = existing
            .iter()
            .find(|other| other.user_id == self.user_id && other.kind.canonical_key() == key)
        {
            return Err(SyncError::DuplicateSync(duplicate.id.to_string()));
        }

        Ok(())
    }
}
