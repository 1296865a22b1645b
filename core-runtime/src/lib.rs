//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the playlist sync engine:
//! - Logging and tracing infrastructure
//! - Environment-driven configuration
//!
//! ## Overview
//!
//! Every other crate reads its tunables from [`config::AppConfig`] and logs
//! through the subscriber installed by [`logging::init_logging`].

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
