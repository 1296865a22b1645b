//! # Credential Manager
//!
//! Per-user provider connections: one OAuth flow manager per provider, tokens
//! in the secure store, and transparent refresh of expired access tokens.
//!
//! ## Usage
//!
//! ```no_run
//! use core_auth::{CredentialManager, ProviderKind, UserId};
//! use core_runtime::config::AppConfig;
//! use std::sync::Arc;
//! # use bridge_traits::{http::HttpClient, SecureStore};
//! # async fn example(
//! #     secure_store: Arc<dyn SecureStore>,
//! #     http_client: Arc<dyn HttpClient>,
//! # ) -> core_auth::Result<()> {
//! let config = AppConfig::from_env().expect("config");
//! let credentials = CredentialManager::from_config(secure_store, http_client, &config);
//!
//! let user = UserId::new("user-1");
//! credentials
//!     .connect(&user, ProviderKind::Spotify, "code-from-callback", None)
//!     .await?;
//! let token = credentials.access_token(&user, ProviderKind::Spotify).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::oauth::{OAuthConfig, OAuthFlowManager};
use crate::token_store::TokenStore;
use crate::types::{OAuthTokens, ProviderKind, UserId, DEFAULT_EXPIRY_BUFFER_SECS};
use bridge_traits::{http::HttpClient, SecureStore};
use core_runtime::config::AppConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, instrument, warn};

/// Upper bound on a single token refresh, retries included
const REFRESH_TIMEOUT: Duration = Duration::from_secs(120);

type RefreshKey = (UserId, ProviderKind);

/// Owns every provider connection of every user.
pub struct CredentialManager {
    token_store: TokenStore,
    flows: HashMap<ProviderKind, OAuthFlowManager>,
    /// Serializes refreshes per connection so a rotated refresh token is
    /// never used twice
    refresh_locks: Mutex<HashMap<RefreshKey, Arc<Mutex<()>>>>,
}

impl CredentialManager {
    /// Manager with no registered flows.
    pub fn new(secure_store: Arc<dyn SecureStore>) -> Self {
        Self {
            token_store: TokenStore::new(secure_store),
            flows: HashMap::new(),
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a flow for every provider with an OAuth client in `config`.
    pub fn from_config(
        secure_store: Arc<dyn SecureStore>,
        http_client: Arc<dyn HttpClient>,
        config: &AppConfig,
    ) -> Self {
        let mut manager = Self::new(secure_store);

        for provider in ProviderKind::ALL {
            match config.oauth_client(provider) {
                Some(settings) => {
                    manager.register_flow(OAuthFlowManager::new(
                        OAuthConfig::from_settings(provider, settings),
                        http_client.clone(),
                    ));
                }
                None => debug!(provider = %provider, "No OAuth client configured"),
            }
        }

        manager
    }

    /// Adds or replaces the flow for the flow's provider.
    pub fn register_flow(&mut self, flow: OAuthFlowManager) {
        info!(provider = %flow.provider(), "Registered OAuth flow");
        self.flows.insert(flow.provider(), flow);
    }

    pub fn flow(&self, provider: ProviderKind) -> Result<&OAuthFlowManager> {
        self.flows
            .get(&provider)
            .ok_or(AuthError::InvalidProvider(provider))
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.token_store
    }

    /// Exchanges an authorization code and stores the resulting tokens.
    #[instrument(skip(self, code, code_verifier), fields(user_id = %user, provider = %provider))]
    pub async fn connect(
        &self,
        user: &UserId,
        provider: ProviderKind,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<()> {
        let tokens = self.flow(provider)?.exchange_code(code, code_verifier).await?;
        self.store_tokens(user, provider, &tokens).await
    }

    pub async fn store_tokens(
        &self,
        user: &UserId,
        provider: ProviderKind,
        tokens: &OAuthTokens,
    ) -> Result<()> {
        self.token_store.store_tokens(user, provider, tokens).await
    }

    /// Returns a usable access token, refreshing it first when it expires
    /// within five minutes.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NotAuthenticated`] when the user never connected
    /// - [`AuthError::TokenRefreshFailed`] when refresh is impossible or rejected
    #[instrument(skip(self), fields(user_id = %user, provider = %provider))]
    pub async fn access_token(&self, user: &UserId, provider: ProviderKind) -> Result<String> {
        let refresh_lock = {
            let mut locks = self.refresh_locks.lock().await;
            locks
                .entry((user.clone(), provider))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = refresh_lock.lock().await;

        let tokens = self
            .token_store
            .retrieve_tokens(user, provider)
            .await?
            .ok_or(AuthError::NotAuthenticated(provider))?;

        if !tokens.is_expired_with_buffer(DEFAULT_EXPIRY_BUFFER_SECS) {
            debug!("Token is valid, no refresh needed");
            return Ok(tokens.access_token);
        }

        info!("Token expired or expiring soon, refreshing");

        let refresh_token = tokens.refresh_token.ok_or_else(|| {
            error!("No refresh token available");
            AuthError::TokenRefreshFailed(format!("no refresh token stored for {}", provider))
        })?;

        let flow = self.flow(provider)?;

        let new_tokens = match timeout(REFRESH_TIMEOUT, flow.refresh_access_token(&refresh_token))
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                warn!("Token refresh timed out");
                return Err(AuthError::TokenRefreshFailed(
                    "token refresh timed out".to_string(),
                ));
            }
        };

        self.token_store
            .store_tokens(user, provider, &new_tokens)
            .await?;

        Ok(new_tokens.access_token)
    }

    /// Providers for which the user has stored tokens, in declaration order.
    pub async fn connected_providers(&self, user: &UserId) -> Result<Vec<ProviderKind>> {
        let mut connected = Vec::new();
        for provider in ProviderKind::ALL {
            if self.token_store.has_tokens(user, provider).await? {
                connected.push(provider);
            }
        }
        Ok(connected)
    }

    pub async fn is_connected(&self, user: &UserId, provider: ProviderKind) -> Result<bool> {
        self.token_store.has_tokens(user, provider).await
    }

    /// Removes the stored tokens. Idempotent.
    #[instrument(skip(self), fields(user_id = %user, provider = %provider))]
    pub async fn disconnect(&self, user: &UserId, provider: ProviderKind) -> Result<()> {
        self.token_store.delete_tokens(user, provider).await?;
        self.refresh_locks
            .lock()
            .await
            .remove(&(user.clone(), provider));
        info!("Provider disconnected");
        Ok(())
    }
}
