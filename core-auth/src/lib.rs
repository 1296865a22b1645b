//! # Authentication Module
//!
//! Provider credentials for the playlist sync engine.
//!
//! ## Overview
//!
//! This module handles the OAuth 2.0 authorization code flows for Spotify,
//! YouTube and Tidal, stores each user's tokens per provider in the platform
//! secure store, and refreshes access tokens before they expire.
//!
//! ## Features
//!
//! - OAuth 2.0 authorization flows with PKCE support
//! - Automatic token refresh before expiration
//! - Secure token storage via platform-specific secure stores
//! - Per-user connected provider tracking

pub mod credentials;
pub mod error;
pub mod oauth;
pub mod token_store;
pub mod types;

pub use credentials::CredentialManager;
pub use error::{AuthError, Result};
pub use oauth::{OAuthConfig, OAuthFlowManager, PkceVerifier};
pub use token_store::TokenStore;
pub use types::{OAuthTokens, ProviderKind, UserId};
