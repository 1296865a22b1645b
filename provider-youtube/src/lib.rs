//! # YouTube Provider
//!
//! Implements `MusicProvider` for the YouTube Data API v3.
//!
//! YouTube has no notion of tracks, so songs are derived from video titles:
//! `Artist - Title` is split into its parts, anything else falls back to the
//! uploading channel as the artist.

pub mod connector;
pub mod error;
pub mod title;
pub mod types;

pub use connector::YouTubeConnector;
pub use error::{Result, YouTubeError};
