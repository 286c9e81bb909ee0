//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Encoding a control value failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Decoding a control value failed.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// A request already carries a control of the same kind.
    #[error("duplicate {0} control on search request")]
    DuplicateControl(&'static str),

    /// Invalid message format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
