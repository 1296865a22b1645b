//! Secure Token Storage
//!
//! Persists OAuth tokens per (user, provider) pair through the platform
//! `SecureStore` (keychain, credential manager, or an in-memory store in tests).
//!
//! ## Security Features
//!
//! - Tokens are never logged or exposed in error messages
//! - Corrupted entries are erased on read
//! - Audit logging without exposing sensitive data
//!
//! ## Example
//!
//! ```no_run
//! use core_auth::{OAuthTokens, ProviderKind, TokenStore, UserId};
//! use std::sync::Arc;
//! # use bridge_traits::storage::SecureStore;
//! # async fn example(secure_store: Arc<dyn SecureStore>) -> core_auth::Result<()> {
//! let token_store = TokenStore::new(secure_store);
//! let user = UserId::new("user-1");
//!
//! let tokens = OAuthTokens::new("access".to_string(), Some("refresh".to_string()), 3600);
//! token_store.store_tokens(&user, ProviderKind::Spotify, &tokens).await?;
//!
//! let retrieved = token_store.retrieve_tokens(&user, ProviderKind::Spotify).await?;
//! assert!(retrieved.is_some());
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::{OAuthTokens, ProviderKind, UserId};
use bridge_traits::storage::SecureStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Secure storage for OAuth tokens.
///
/// Tokens are serialized to JSON before storage. Token values are never
/// logged; failed operations are audited by user and provider only.
#[derive(Clone)]
pub struct TokenStore {
    secure_store: Arc<dyn SecureStore>,
}

/// On-disk shape of a token set.
#[derive(Debug, Serialize, Deserialize)]
struct StoredTokens {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: DateTime<Utc>,
}

impl TokenStore {
    pub fn new(secure_store: Arc<dyn SecureStore>) -> Self {
        debug!("Initializing TokenStore");
        Self { secure_store }
    }

    /// Store OAuth tokens for a user's provider connection.
    ///
    /// Existing tokens for the same pair are overwritten.
    pub async fn store_tokens(
        &self,
        user: &UserId,
        provider: ProviderKind,
        tokens: &OAuthTokens,
    ) -> Result<()> {
        let key = Self::storage_key(user, provider);

        let stored = StoredTokens {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            expires_at: tokens.expires_at,
        };

        let json = serde_json::to_vec(&stored).map_err(|e| {
            warn!(
                user_id = %user,
                provider = %provider,
                error = %e,
                "Failed to serialize tokens"
            );
            AuthError::SerializationFailed {
                context: "token serialization".to_string(),
                source: e,
            }
        })?;

        self.secure_store
            .set_secret(&key, &json)
            .await
            .map_err(|e| {
                warn!(
                    user_id = %user,
                    provider = %provider,
                    error = %e,
                    "Failed to store tokens in secure storage"
                );
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;

        info!(
            user_id = %user,
            provider = %provider,
            has_refresh_token = stored.refresh_token.is_some(),
            "Tokens stored securely"
        );

        Ok(())
    }

    /// Retrieve OAuth tokens for a user's provider connection.
    ///
    /// Returns `Ok(None)` when nothing is stored. Undecodable data is
    /// deleted and reported as [`AuthError::TokenCorrupted`].
    pub async fn retrieve_tokens(
        &self,
        user: &UserId,
        provider: ProviderKind,
    ) -> Result<Option<OAuthTokens>> {
        let key = Self::storage_key(user, provider);

        let data = self.secure_store.get_secret(&key).await.map_err(|e| {
            warn!(
                user_id = %user,
                provider = %provider,
                error = %e,
                "Failed to retrieve tokens from secure storage"
            );
            AuthError::SecureStorageUnavailable(e.to_string())
        })?;

        let Some(data) = data else {
            debug!(user_id = %user, provider = %provider, "No tokens found in storage");
            return Ok(None);
        };

        let stored: StoredTokens = match serde_json::from_slice(&data) {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(
                    user_id = %user,
                    provider = %provider,
                    error = %e,
                    "Failed to deserialize tokens, they may be corrupted"
                );

                if let Err(delete_err) = self.secure_store.delete_secret(&key).await {
                    warn!(
                        user_id = %user,
                        provider = %provider,
                        error = %delete_err,
                        "Failed to delete corrupted token data"
                    );
                }

                return Err(AuthError::TokenCorrupted {
                    provider,
                    reason: e.to_string(),
                });
            }
        };

        debug!(
            user_id = %user,
            provider = %provider,
            expires_at = %stored.expires_at,
            "Tokens retrieved"
        );

        Ok(Some(OAuthTokens {
            access_token: stored.access_token,
            refresh_token: stored.refresh_token,
            expires_at: stored.expires_at,
        }))
    }

    /// Delete tokens. Idempotent.
    pub async fn delete_tokens(&self, user: &UserId, provider: ProviderKind) -> Result<()> {
        let key = Self::storage_key(user, provider);

        self.secure_store.delete_secret(&key).await.map_err(|e| {
            warn!(
                user_id = %user,
                provider = %provider,
                error = %e,
                "Failed to delete tokens from secure storage"
            );
            AuthError::SecureStorageUnavailable(e.to_string())
        })?;

        info!(user_id = %user, provider = %provider, "Tokens deleted");

        Ok(())
    }

    /// Check for stored tokens without decoding them.
    pub async fn has_tokens(&self, user: &UserId, provider: ProviderKind) -> Result<bool> {
        let key = Self::storage_key(user, provider);

        self.secure_store.has_secret(&key).await.map_err(|e| {
            warn!(
                user_id = %user,
                provider = %provider,
                error = %e,
                "Failed to check token existence in secure storage"
            );
            AuthError::SecureStorageUnavailable(e.to_string())
        })
    }

    fn storage_key(user: &UserId, provider: ProviderKind) -> String {
        format!("tokens:{}:{}", user.as_str(), provider.as_str())
    }
}
