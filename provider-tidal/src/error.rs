//! Error types for Tidal provider

use bridge_traits::error::BridgeError;
use core_auth::AuthError;
use core_matching::MatchError;
use thiserror::Error;

/// Tidal provider errors
#[derive(Error, Debug)]
pub enum TidalError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Tidal API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limit exceeded after {attempts} attempts")]
    RateLimitExceeded { attempts: u32 },

    #[error("Playlist not found: {playlist_id}")]
    PlaylistNotFound { playlist_id: String },

    #[error("Invalid playlist id: {0:?}")]
    InvalidPlaylistId(String),

    /// `/users/me` lacked the user id or country code
    #[error("Incomplete Tidal user profile: {0}")]
    IncompleteProfile(String),

    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for Tidal operations
pub type Result<T> = std::result::Result<T, TidalError>;

impl From<AuthError> for TidalError {
    fn from(error: AuthError) -> Self {
        TidalError::AuthenticationFailed(error.to_string())
    }
}

impl From<TidalError> for BridgeError {
    fn from(error: TidalError) -> Self {
        match error {
            TidalError::BridgeError(e) => e,
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = TidalError::IncompleteProfile("missing country code".to_string());

        assert_eq!(
            error.to_string(),
            "Incomplete Tidal user profile: missing country code"
        );
    }
}
