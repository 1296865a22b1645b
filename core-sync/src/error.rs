use bridge_traits::{error::BridgeError, ProviderKind};
use core_auth::AuthError;
use core_matching::MatchError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid sync configuration: {0}")]
    Validation(String),

    #[error("An equivalent sync already exists: {0}")]
    DuplicateSync(String),

    #[error("Provider {0} is not connected")]
    ProviderNotConnected(ProviderKind),

    #[error("Provider {0} is not available")]
    ProviderUnavailable(ProviderKind),

    #[error("Sync {sync_id} not found")]
    SyncNotFound { sync_id: String },

    #[error("Sync run {run_id} not found")]
    RunNotFound { run_id: String },

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Invalid ID: {0}")]
    InvalidId(String),

    #[error("Invalid sync status: {0}")]
    InvalidStatus(String),

    #[error("{context}: {source}")]
    Provider {
        context: String,
        #[source]
        source: BridgeError,
    },

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Matching error: {0}")]
    Match(#[from] MatchError),

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Sync task panicked: {0}")]
    Panicked(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SyncError {
    /// Wraps a provider failure with the operation it interrupted.
    pub fn provider(context: impl Into<String>, source: BridgeError) -> Self {
        SyncError::Provider {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
