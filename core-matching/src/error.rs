use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("No suitable track found after trying all queries for: {name}")]
    NoMatch { name: String },

    #[error("Normalization failed: {0}")]
    Normalization(String),

    #[error("Normalizer returned {actual} songs for {expected} inputs")]
    LengthMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, MatchError>;
