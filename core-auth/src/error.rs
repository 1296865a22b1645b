use crate::types::ProviderKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Provider {provider} authentication failed: {reason}")]
    AuthenticationFailed { provider: ProviderKind, reason: String },

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("Invalid authorization code: {0}")]
    InvalidAuthCode(String),

    #[error("OAuth state mismatch (expected {expected}, got {actual})")]
    StateMismatch { expected: String, actual: String },

    #[error("Secure storage unavailable: {0}")]
    SecureStorageUnavailable(String),

    #[error("Stored tokens for {provider} are corrupted: {reason}")]
    TokenCorrupted { provider: ProviderKind, reason: String },

    #[error("Failed to serialize {context}: {source}")]
    SerializationFailed {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("No OAuth flow registered for provider {0}")]
    InvalidProvider(ProviderKind),

    #[error("Not authenticated with {0}")]
    NotAuthenticated(ProviderKind),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, AuthError>;
