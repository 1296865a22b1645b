//! OAuth 2.0 Authorization Flow Manager with PKCE Support
//!
//! This module implements RFC 6749 (OAuth 2.0) and RFC 7636 (PKCE) for the
//! authorization code flows of the supported streaming providers.
//!
//! # Overview
//!
//! The OAuth flow manager handles:
//! - Building authorization URLs with PKCE challenge
//! - Exchanging authorization codes for tokens
//! - Refreshing access tokens
//! - State verification for CSRF protection
//!
//! # Security
//!
//! - Generates cryptographically secure random state and code verifier
//! - Never logs sensitive values (tokens, codes, verifiers)
//!
//! # Example
//!
//! ```no_run
//! use core_auth::oauth::{OAuthConfig, OAuthFlowManager};
//! use core_auth::ProviderKind;
//! use std::sync::Arc;
//!
//! # async fn example() -> core_auth::Result<()> {
//! # use bridge_traits::http::HttpClient;
//! # let http_client: Arc<dyn HttpClient> = todo!();
//! let config = OAuthConfig::for_provider(
//!     ProviderKind::Spotify,
//!     "client-id",
//!     Some("client-secret".to_string()),
//!     "http://localhost:8080/callback",
//! );
//!
//! let flow_manager = OAuthFlowManager::new(config, http_client);
//! let (auth_url, pkce_verifier) = flow_manager.build_auth_url()?;
//! // Redirect user to auth_url, then on callback:
//! let tokens = flow_manager
//!     .exchange_code("code-from-callback", Some(pkce_verifier.verifier()))
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::{OAuthTokens, ProviderKind};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use bytes::Bytes;
use core_runtime::config::OAuthClientSettings;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Maximum token refresh attempts on 5xx/transport failures
const MAX_REFRESH_ATTEMPTS: u32 = 3;

/// OAuth 2.0 provider configuration.
#[derive(Clone)]
pub struct OAuthConfig {
    pub provider: ProviderKind,
    pub client_id: String,
    /// OAuth client secret (optional for public clients)
    pub client_secret: Option<String>,
    /// Redirect URI for OAuth callback
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    /// Authorization endpoint URL
    pub auth_url: String,
    /// Token endpoint URL
    pub token_url: String,
}

impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("provider", &self.provider)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .finish()
    }
}

impl OAuthConfig {
    /// Endpoint and scope preset for `provider`.
    pub fn for_provider(
        provider: ProviderKind,
        client_id: impl Into<String>,
        client_secret: Option<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        let (auth_url, token_url, scopes): (&str, &str, &[&str]) = match provider {
            ProviderKind::Spotify => (
                "https://accounts.spotify.com/authorize",
                "https://accounts.spotify.com/api/token",
                &[
                    "playlist-read-private",
                    "playlist-read-collaborative",
                    "playlist-modify-public",
                    "playlist-modify-private",
                ],
            ),
            ProviderKind::YouTube => (
                "https://accounts.google.com/o/oauth2/auth",
                "https://oauth2.googleapis.com/token",
                &["https://www.googleapis.com/auth/youtube"],
            ),
            ProviderKind::Tidal => (
                "https://auth.tidal.com/v1/oauth2/authorize",
                "https://auth.tidal.com/v1/oauth2/token",
                &[
                    "user.read",
                    "playlists.read",
                    "playlists.write",
                    "collection.read",
                    "search.read",
                ],
            ),
        };

        Self {
            provider,
            client_id: client_id.into(),
            client_secret,
            redirect_uri: redirect_uri.into(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            auth_url: auth_url.to_string(),
            token_url: token_url.to_string(),
        }
    }

    /// Preset for `provider` using the client registration from the environment.
    pub fn from_settings(provider: ProviderKind, settings: &OAuthClientSettings) -> Self {
        Self::for_provider(
            provider,
            settings.client_id.clone(),
            Some(settings.client_secret.clone()),
            settings.redirect_uri.clone(),
        )
    }
}

/// PKCE (Proof Key for Code Exchange) verifier.
///
/// Contains the code verifier that must be kept by the caller during
/// the authorization flow and used when exchanging the authorization code.
#[derive(Debug, Clone)]
pub struct PkceVerifier {
    /// The code verifier (base64-url-encoded random string)
    verifier: String,
    /// The state parameter for CSRF protection
    state: String,
}

impl PkceVerifier {
    /// Create a new PKCE verifier with cryptographically secure random values.
    ///
    /// Generates a 32-byte code verifier and a 16-byte state, both URL-safe
    /// base64 without padding.
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();

        // 43 characters once encoded, within RFC 7636 bounds
        let mut verifier_bytes = [0u8; 32];
        rng.fill(&mut verifier_bytes);
        let verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);

        let mut state_bytes = [0u8; 16];
        rng.fill(&mut state_bytes);
        let state = URL_SAFE_NO_PAD.encode(state_bytes);

        Self { verifier, state }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// Compute the code challenge from the verifier.
    ///
    /// Uses S256 method: BASE64URL(SHA256(code_verifier))
    pub fn challenge(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.verifier.as_bytes());
        let hash = hasher.finalize();
        URL_SAFE_NO_PAD.encode(hash)
    }

    /// Compare the state echoed by the callback with the one sent.
    pub fn verify_state(&self, state: &str) -> Result<()> {
        if state != self.state {
            warn!("OAuth state mismatch on callback");
            return Err(AuthError::StateMismatch {
                expected: self.state.clone(),
                actual: state.to_string(),
            });
        }
        Ok(())
    }
}

impl Default for PkceVerifier {
    fn default() -> Self {
        Self::new()
    }
}

/// OAuth 2.0 flow manager.
///
/// Handles the complete OAuth 2.0 authorization code flow with PKCE support
/// for one provider.
pub struct OAuthFlowManager {
    config: OAuthConfig,
    http_client: Arc<dyn HttpClient>,
}

impl OAuthFlowManager {
    pub fn new(config: OAuthConfig, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            config,
            http_client,
        }
    }

    pub fn provider(&self) -> ProviderKind {
        self.config.provider
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Build the authorization URL with PKCE challenge.
    ///
    /// Returns both the URL and the PKCE verifier, which the caller keeps
    /// until the callback arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if the authorization URL cannot be parsed.
    #[instrument(skip(self), fields(provider = %self.config.provider))]
    pub fn build_auth_url(&self) -> Result<(String, PkceVerifier)> {
        let verifier = PkceVerifier::new();
        let challenge = verifier.challenge();

        let mut url = Url::parse(&self.config.auth_url)
            .map_err(|e| AuthError::Other(format!("Invalid auth URL: {}", e)))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.config.client_id);
            query.append_pair("redirect_uri", &self.config.redirect_uri);
            query.append_pair("response_type", "code");
            query.append_pair("scope", &self.config.scopes.join(" "));
            query.append_pair("state", verifier.state());
            query.append_pair("code_challenge", &challenge);
            query.append_pair("code_challenge_method", "S256");
            if self.config.provider == ProviderKind::YouTube {
                // Google only issues refresh tokens for offline access
                query.append_pair("access_type", "offline");
                query.append_pair("prompt", "consent");
            }
        }

        debug!("Built authorization URL");

        Ok((url.to_string(), verifier))
    }

    /// Exchange an authorization code for OAuth tokens.
    ///
    /// `code_verifier` is required by providers that enforce PKCE (Tidal)
    /// and optional for the others.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The authorization code is invalid
    /// - Network errors occur
    /// - The token endpoint returns an error
    #[instrument(skip(self, code, code_verifier), fields(provider = %self.config.provider))]
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<OAuthTokens> {
        if code.trim().is_empty() {
            return Err(AuthError::InvalidAuthCode(
                "authorization code is empty".to_string(),
            ));
        }

        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("code", code);
        params.insert("redirect_uri", &self.config.redirect_uri);
        params.insert("client_id", &self.config.client_id);

        if let Some(verifier) = code_verifier {
            params.insert("code_verifier", verifier);
        }

        if let Some(ref client_secret) = self.config.client_secret {
            params.insert("client_secret", client_secret);
        }

        debug!(
            with_verifier = code_verifier.is_some(),
            "Exchanging authorization code for tokens"
        );

        let request = self.token_request(&params)?;

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))?;

        if !response.is_success() {
            let status = response.status;
            let error_body = response
                .text()
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            warn!(
                status = status,
                error = %error_body,
                "Token exchange failed while exchanging authorization code"
            );

            return Err(AuthError::InvalidAuthCode(format!(
                "Token endpoint returned {}: {}",
                status, error_body
            )));
        }

        let token_response: TokenResponse = response
            .json()
            .map_err(|e| AuthError::Other(format!("Failed to parse token response: {}", e)))?;

        info!(
            expires_in = token_response.expires_in,
            has_refresh_token = token_response.refresh_token.is_some(),
            "Exchanged authorization code for tokens"
        );

        Ok(OAuthTokens::new(
            token_response.access_token,
            token_response.refresh_token,
            token_response.expires_in,
        ))
    }

    /// Refresh an access token using a refresh token.
    ///
    /// 4xx responses fail immediately; 5xx responses and transport failures
    /// are retried with exponential backoff. When the provider does not
    /// rotate the refresh token, the old one is kept.
    #[instrument(skip(self, refresh_token), fields(provider = %self.config.provider))]
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<OAuthTokens> {
        let mut params = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token);
        params.insert("client_id", &self.config.client_id);

        if let Some(ref client_secret) = self.config.client_secret {
            params.insert("client_secret", client_secret);
        }

        debug!("Refreshing access token");

        let mut attempts = 0;

        loop {
            attempts += 1;

            let request = self.token_request(&params)?;

            let last_error = match self.http_client.execute(request).await {
                Ok(response) if response.is_success() => {
                    let token_response: TokenResponse = response.json().map_err(|e| {
                        AuthError::Other(format!("Failed to parse token response: {}", e))
                    })?;

                    info!(
                        expires_in = token_response.expires_in,
                        "Refreshed access token"
                    );

                    return Ok(OAuthTokens::new(
                        token_response.access_token,
                        token_response
                            .refresh_token
                            .or_else(|| Some(refresh_token.to_string())),
                        token_response.expires_in,
                    ));
                }
                Ok(response) => {
                    let status = response.status;
                    let error_body = response
                        .text()
                        .unwrap_or_else(|_| "Unable to read error response".to_string());

                    if response.is_client_error() {
                        warn!(
                            status = status,
                            error = %error_body,
                            "Token refresh rejected"
                        );
                        return Err(AuthError::TokenRefreshFailed(format!(
                            "Token endpoint returned {}: {}",
                            status, error_body
                        )));
                    }

                    format!("{} - {}", status, error_body)
                }
                Err(e) => e.to_string(),
            };

            if attempts >= MAX_REFRESH_ATTEMPTS {
                return Err(AuthError::TokenRefreshFailed(format!(
                    "Token refresh failed after {} attempts. Last error: {}",
                    attempts, last_error
                )));
            }

            let delay = Duration::from_millis(100 * 2u64.pow(attempts - 1));
            warn!(
                attempts = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %last_error,
                "Token refresh failed, retrying"
            );
            sleep(delay).await;
        }
    }

    fn token_request(&self, params: &HashMap<&str, &str>) -> Result<HttpRequest> {
        let encoded_body = serde_urlencoded::to_string(params)
            .map_err(|e| AuthError::Other(format!("Failed to encode token request: {}", e)))?;

        Ok(
            HttpRequest::new(HttpMethod::Post, self.config.token_url.clone())
                .header("Content-Type", "application/x-www-form-urlencoded")
                .header("Accept", "application/json")
                .body(Bytes::from(encoded_body)),
        )
    }
}

/// Token response from the OAuth provider.
#[derive(Debug, Deserialize, Serialize)]
struct TokenResponse {
    access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
}

fn default_expires_in() -> i64 {
    3600 // Default to 1 hour if not specified
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::http::HttpResponse;
    use mockall::mock;

    mock! {
        HttpClient {}

        #[async_trait::async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn spotify_config() -> OAuthConfig {
        OAuthConfig::for_provider(
            ProviderKind::Spotify,
            "test-client",
            Some("secret".to_string()),
            "http://localhost:8080/callback",
        )
    }

    #[test]
    fn test_pkce_verifier_generation() {
        let verifier = PkceVerifier::new();

        assert_eq!(verifier.verifier().len(), 43);
        assert!(!verifier.state().is_empty());
        assert_eq!(verifier.challenge(), verifier.challenge());

        let verifier2 = PkceVerifier::new();
        assert_ne!(verifier.verifier(), verifier2.verifier());
        assert_ne!(verifier.state(), verifier2.state());
    }

    #[test]
    fn test_pkce_challenge_computation() {
        // RFC 7636 appendix B
        let verifier = PkceVerifier {
            verifier: "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string(),
            state: "state".to_string(),
        };

        assert_eq!(
            verifier.challenge(),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_verify_state() {
        let verifier = PkceVerifier::new();
        let state = verifier.state().to_string();

        assert!(verifier.verify_state(&state).is_ok());
        assert!(matches!(
            verifier.verify_state("forged"),
            Err(AuthError::StateMismatch { .. })
        ));
    }

    #[test]
    fn test_provider_presets() {
        let tidal = OAuthConfig::for_provider(ProviderKind::Tidal, "id", None, "http://cb");
        assert_eq!(tidal.token_url, "https://auth.tidal.com/v1/oauth2/token");
        assert!(tidal.scopes.contains(&"playlists.write".to_string()));

        let youtube = OAuthConfig::from_settings(
            ProviderKind::YouTube,
            &OAuthClientSettings {
                client_id: "yt".to_string(),
                client_secret: "s".to_string(),
                redirect_uri: "http://cb".to_string(),
            },
        );
        assert_eq!(youtube.auth_url, "https://accounts.google.com/o/oauth2/auth");
        assert_eq!(youtube.client_secret.as_deref(), Some("s"));
    }

    #[test]
    fn test_build_auth_url() {
        let manager = OAuthFlowManager::new(spotify_config(), Arc::new(MockHttpClient::new()));
        let (url, verifier) = manager.build_auth_url().unwrap();

        assert!(url.starts_with("https://accounts.spotify.com/authorize?"));
        assert!(url.contains("client_id=test-client"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("playlist-modify-private"));
        assert!(url.contains(&format!("state={}", verifier.state())));
        assert!(url.contains(&format!("code_challenge={}", verifier.challenge())));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(!url.contains("access_type=offline"));
    }

    #[test]
    fn test_build_auth_url_requests_offline_access_for_youtube() {
        let config = OAuthConfig::for_provider(ProviderKind::YouTube, "id", None, "http://cb");
        let manager = OAuthFlowManager::new(config, Arc::new(MockHttpClient::new()));
        let (url, _) = manager.build_auth_url().unwrap();

        assert!(url.contains("access_type=offline"));
    }

    #[test]
    fn test_build_auth_url_invalid_url() {
        let mut config = spotify_config();
        config.auth_url = "not a valid url".to_string();

        let manager = OAuthFlowManager::new(config, Arc::new(MockHttpClient::new()));
        assert!(manager.build_auth_url().is_err());
    }

    #[tokio::test]
    async fn test_exchange_code_success() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(|req| {
                let body = String::from_utf8(req.body.clone().unwrap().to_vec()).unwrap();
                req.url == "https://accounts.spotify.com/api/token"
                    && body.contains("grant_type=authorization_code")
                    && body.contains("code=abc")
                    && body.contains("code_verifier=verifier")
            })
            .times(1)
            .returning(|_| {
                Ok(response(
                    200,
                    r#"{"access_token":"BQD","refresh_token":"AQC","expires_in":3600,"token_type":"Bearer"}"#,
                ))
            });

        let manager = OAuthFlowManager::new(spotify_config(), Arc::new(http));
        let tokens = manager.exchange_code("abc", Some("verifier")).await.unwrap();

        assert_eq!(tokens.access_token, "BQD");
        assert_eq!(tokens.refresh_token.as_deref(), Some("AQC"));
        assert!(!tokens.is_expired());
    }

    #[tokio::test]
    async fn test_exchange_code_rejected() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(response(400, r#"{"error":"invalid_grant"}"#)));

        let manager = OAuthFlowManager::new(spotify_config(), Arc::new(http));
        let result = manager.exchange_code("expired", None).await;

        assert!(matches!(result, Err(AuthError::InvalidAuthCode(_))));
    }

    #[tokio::test]
    async fn test_exchange_empty_code_skips_request() {
        let manager = OAuthFlowManager::new(spotify_config(), Arc::new(MockHttpClient::new()));
        let result = manager.exchange_code("  ", None).await;

        assert!(matches!(result, Err(AuthError::InvalidAuthCode(_))));
    }

    #[tokio::test]
    async fn test_refresh_keeps_refresh_token_when_not_rotated() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(response(200, r#"{"access_token":"new","expires_in":1800}"#)));

        let manager = OAuthFlowManager::new(spotify_config(), Arc::new(http));
        let tokens = manager.refresh_access_token("old-refresh").await.unwrap();

        assert_eq!(tokens.access_token, "new");
        assert_eq!(tokens.refresh_token.as_deref(), Some("old-refresh"));
    }

    #[tokio::test]
    async fn test_refresh_retries_server_errors() {
        let mut http = MockHttpClient::new();
        let mut seq = mockall::Sequence::new();
        http.expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(response(503, "unavailable")));
        http.expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(BridgeError::OperationFailed("connection reset".to_string())));
        http.expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(response(200, r#"{"access_token":"new"}"#)));

        let manager = OAuthFlowManager::new(spotify_config(), Arc::new(http));
        let tokens = manager.refresh_access_token("refresh").await.unwrap();

        assert_eq!(tokens.access_token, "new");
    }

    #[tokio::test]
    async fn test_refresh_fails_fast_on_client_error() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(response(401, r#"{"error":"invalid_client"}"#)));

        let manager = OAuthFlowManager::new(spotify_config(), Arc::new(http));
        let result = manager.refresh_access_token("refresh").await;

        assert!(matches!(result, Err(AuthError::TokenRefreshFailed(_))));
    }

    #[test]
    fn test_token_response_deserialization_minimal() {
        let response: TokenResponse = serde_json::from_str(r#"{"access_token": "token"}"#).unwrap();
        assert_eq!(response.access_token, "token");
        assert_eq!(response.refresh_token, None);
        assert_eq!(response.expires_in, 3600);
    }
}
