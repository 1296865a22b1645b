//! Error types for YouTube provider

use bridge_traits::error::BridgeError;
use core_auth::AuthError;
use core_matching::MatchError;
use thiserror::Error;

/// YouTube provider errors
#[derive(Error, Debug)]
pub enum YouTubeError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("YouTube API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limit exceeded after {attempts} attempts")]
    RateLimitExceeded { attempts: u32 },

    /// The daily API quota is spent; retrying today is pointless
    #[error("YouTube API quota exceeded")]
    QuotaExceeded,

    #[error("Playlist not found: {playlist_id}")]
    PlaylistNotFound { playlist_id: String },

    #[error("Invalid playlist id: {0:?}")]
    InvalidPlaylistId(String),

    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for YouTube operations
pub type Result<T> = std::result::Result<T, YouTubeError>;

impl From<AuthError> for YouTubeError {
    fn from(error: AuthError) -> Self {
        YouTubeError::AuthenticationFailed(error.to_string())
    }
}

impl From<YouTubeError> for BridgeError {
    fn from(error: YouTubeError) -> Self {
        match error {
            YouTubeError::BridgeError(e) => e,
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let bridge_error: BridgeError = YouTubeError::QuotaExceeded.into();

        assert!(matches!(
            bridge_error,
            BridgeError::OperationFailed(ref m) if m == "YouTube API quota exceeded"
        ));
    }
}
