//! # Song Matching
//!
//! Cross-provider song reconciliation: metadata cleaning, the similarity
//! scorer, greedy deduplication, the search ladder shared by every provider
//! adapter and the optional metadata normalizer.
//!
//! ```
//! use core_matching::{deduplicate, score};
//! use bridge_traits::music::{ProviderKind, Song};
//!
//! let a = Song::new("Halo", vec!["Beyoncé".into()], "", ProviderKind::Spotify, "1");
//! let b = Song::new("Halo (Live)", vec!["Beyonce".into()], "", ProviderKind::Tidal, "2");
//!
//! assert!(score(&a, &b) > 90.0);
//! assert_eq!(deduplicate(vec![a, b], 90.0).len(), 1);
//! ```

pub mod clean;
pub mod dedup;
pub mod error;
pub mod normalizer;
pub mod search;
pub mod similarity;

pub use clean::clean;
pub use dedup::deduplicate;
pub use error::{MatchError, Result};
pub use normalizer::{LlmSongNormalizer, SongNormalizer};
pub use search::{build_queries, find_best_match, MetadataQuery, TrackSearch};
pub use similarity::score;
