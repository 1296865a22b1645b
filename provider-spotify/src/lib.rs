//! # Spotify Provider
//!
//! Implements `MusicProvider` for the Spotify Web API v1.
//!
//! ## Overview
//!
//! This module provides:
//! - Authorization code exchange through the registered OAuth flow
//! - Playlist listing and offset-paginated track listing
//! - Batched playlist writes and clearing
//! - Track search with ISRC lookup and field-filtered metadata queries
//! - Exponential backoff on rate limiting and server errors

pub mod connector;
pub mod error;
pub mod types;

pub use connector::SpotifyConnector;
pub use error::{Result, SpotifyError};
