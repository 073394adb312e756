//! Error types for the DNS codec

use thiserror::Error;

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while parsing or marshalling DNS messages
#[derive(Debug, Error)]
pub enum Error {
    #[error("truncated message: need {needed} more bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("label too long: {0} octets (maximum 63)")]
    LabelTooLong(usize),

    #[error("name too long: {0} octets serialized (maximum 255)")]
    NameTooLong(usize),

    #[error("section too large: {0} entries do not fit a 16-bit count")]
    SectionTooLarge(usize),

    #[error("RDATA window [{start}..{end}] outside backing buffer of {len} octets")]
    BadWindow {
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for inputs that simply ran out of bytes, as opposed to
    /// structurally invalid ones.
    pub fn is_truncated(&self) -> bool {
        matches!(self, Error::Truncated { .. })
    }
}
