//! Workspace umbrella crate.
//!
//! Re-exports the [`core_service`] façade so host applications can depend on
//! `playlist-sync-workspace` alone and pick the bridge shims through
//! features.

pub use core_service::*;
