//! # Host Bridge Traits
//!
//! Contracts between the sync engine and the host platform, plus the music
//! data model every other crate shares.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Async HTTP operations with retry
//! - [`SecureStore`](storage::SecureStore) - Credential persistence (keychain)
//! - [`LoggerSink`](log::LoggerSink) - Forward structured logs to host logging
//!
//! ## Data model
//!
//! - [`ProviderKind`](music::ProviderKind), [`UserId`](music::UserId)
//! - [`Song`](music::Song) and [`SongQuery`](music::SongQuery)
//! - [`Playlist`](music::Playlist) and [`PlaylistRef`](music::PlaylistRef)
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Higher
//! crates convert their own errors into it at the capability boundary.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! across tokio tasks behind an `Arc`.

pub mod error;
pub mod http;
pub mod log;
pub mod music;
pub mod storage;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use log::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use music::{Playlist, PlaylistRef, ProviderKind, Song, SongQuery, UserId};
pub use storage::SecureStore;
