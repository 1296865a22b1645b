//! Error types for Spotify provider

use bridge_traits::error::BridgeError;
use core_auth::AuthError;
use core_matching::MatchError;
use thiserror::Error;

/// Spotify provider errors
#[derive(Error, Debug)]
pub enum SpotifyError {
    /// No usable access token, or the API rejected it
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// API request returned an error
    #[error("Spotify API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Still throttled after every retry
    #[error("Rate limit exceeded after {attempts} attempts")]
    RateLimitExceeded { attempts: u32 },

    #[error("Playlist not found: {playlist_id}")]
    PlaylistNotFound { playlist_id: String },

    #[error("Invalid playlist id: {0:?}")]
    InvalidPlaylistId(String),

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for Spotify operations
pub type Result<T> = std::result::Result<T, SpotifyError>;

impl From<AuthError> for SpotifyError {
    fn from(error: AuthError) -> Self {
        SpotifyError::AuthenticationFailed(error.to_string())
    }
}

impl From<SpotifyError> for BridgeError {
    fn from(error: SpotifyError) -> Self {
        match error {
            SpotifyError::BridgeError(e) => e,
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = SpotifyError::ApiError {
            status_code: 403,
            message: "Insufficient client scope".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Spotify API error (status 403): Insufficient client scope"
        );
    }

    #[test]
    fn test_error_conversion() {
        let error = SpotifyError::RateLimitExceeded { attempts: 3 };
        let bridge_error: BridgeError = error.into();

        assert!(matches!(bridge_error, BridgeError::OperationFailed(ref m) if m.contains("3 attempts")));
    }

    #[test]
    fn test_bridge_error_passes_through() {
        let error = SpotifyError::from(BridgeError::NotAvailable("network".to_string()));
        assert!(matches!(BridgeError::from(error), BridgeError::NotAvailable(_)));
    }
}
