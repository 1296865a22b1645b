//! # Tidal Provider
//!
//! Implements `MusicProvider` for the Tidal Open API v2.
//!
//! The API speaks JSON:API (`application/vnd.api+json`): collections are
//! resource identifiers with the resources themselves in `included`, and
//! pagination follows `links.next`. Most endpoints need the user's country
//! code, which is read from `/users/me` once per operation.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::TidalConnector;
pub use error::{Result, TidalError};
