//! # Sync Run State Machine
//!
//! One execution attempt of a sync configuration.
//!
//! ## State Machine
//!
//! ```text
//! Pending → Running → Completed
//!     ↓         ↓
//!     └──────→ Failed
//! ```
//!
//! Transitions consume the run and return the advanced copy, so a run value
//! that failed to transition is never half-updated. Timestamps are assigned
//! by the run store; the values held here are provisional until re-read.
//!
//! ## Usage
//!
//! ```
//! use core_sync::{SyncId, SyncRun, SyncStatus};
//!
//! let run = SyncRun::new(SyncId::new());
//! let run = run.start()?;
//! let run = run.complete(Vec::new())?;
//! assert_eq!(run.status, SyncStatus::Completed);
//! # Ok::<(), core_sync::SyncError>(())
//! ```

use crate::config::SyncId;
use crate::{Result, SyncError};
use bridge_traits::Song;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier of a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncRunId(Uuid);

impl SyncRunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a run ID from a string
    ///
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

impl Default for SyncRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SyncRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SyncRunId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// Status Types
// ============================================================================

/// Lifecycle status of a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Run record created, nothing executed yet
    Pending,
    /// Strategy in progress
    Running,
    /// Strategy finished; some songs may be unmatched
    Completed,
    /// Strategy aborted, panicked or was cancelled
    Failed,
}

impl SyncStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStatus::Completed | SyncStatus::Failed)
    }

    /// Whether `self → to` is an edge of the run state machine
    pub fn can_transition_to(&self, to: SyncStatus) -> bool {
        matches!(
            (self, to),
            (SyncStatus::Pending, SyncStatus::Running)
                | (SyncStatus::Pending, SyncStatus::Failed)
                | (SyncStatus::Running, SyncStatus::Completed)
                | (SyncStatus::Running, SyncStatus::Failed)
        )
    }

    /// Get the string representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Running => "running",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(SyncStatus::Pending),
            "running" => Ok(SyncStatus::Running),
            "completed" => Ok(SyncStatus::Completed),
            "failed" => Ok(SyncStatus::Failed),
            _ => Err(SyncError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Sync Run Entity
// ============================================================================

/// One execution attempt of a [`SyncConfig`](crate::SyncConfig).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: SyncRunId,
    pub sync_id: SyncId,
    pub status: SyncStatus,
    /// Songs that could not be resolved on the destination
    pub unmatched_songs: Vec<Song>,
    /// Failure reason of a `Failed` run
    pub error_message: Option<String>,
    /// Assigned by the run store on insert
    pub created_at: Option<DateTime<Utc>>,
    /// Refreshed by the run store on every update
    pub updated_at: Option<DateTime<Utc>>,
}

impl SyncRun {
    /// New run in `Pending` state
    pub fn new(sync_id: SyncId) -> Self {
        Self {
            id: SyncRunId::new(),
            sync_id,
            status: SyncStatus::Pending,
            unmatched_songs: Vec::new(),
            error_message: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// # Errors
    ///
    /// Returns an error if the run is not `Pending`
    pub fn start(mut self) -> Result<Self> {
        self.validate_transition(SyncStatus::Running)?;
        self.status = SyncStatus::Running;
        Ok(self)
    }

    /// Finish the run, keeping the songs that found no destination match.
    ///
    /// # Errors
    ///
    /// Returns an error if the run is not `Running`
    pub fn complete(mut self, unmatched_songs: Vec<Song>) -> Result<Self> {
        self.validate_transition(SyncStatus::Completed)?;
        self.status = SyncStatus::Completed;
        self.unmatched_songs = unmatched_songs;
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns an error if the run is already terminal
    pub fn fail(mut self, error_message: impl Into<String>) -> Result<Self> {
        self.validate_transition(SyncStatus::Failed)?;
        self.status = SyncStatus::Failed;
        self.error_message = Some(error_message.into());
        Ok(self)
    }

    fn validate_transition(&self, to: SyncStatus) -> Result<()> {
        if self.status.can_transition_to(to) {
            return Ok(());
        }

        Err(SyncError::InvalidStateTransition {
            from: self.status.as_str().to_string(),
            to: to.as_str().to_string(),
            reason: format!(
                "Cannot transition from {} to {}",
                self.status.as_str(),
                to.as_str()
            ),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
