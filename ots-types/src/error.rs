//! Error types for OpenTimestamps proofs

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Malformed proof: {0}")]
    Format(#[from] FormatError),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Invalid digest length for {algorithm}: expected {expected}, got {actual}")]
    InvalidDigestLength {
        algorithm: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Hex encoding error: {0}")]
    HexEncoding(#[from] hex::FromHexError),
}

impl Error {
    /// True for errors caused by malformed binary input.
    pub fn is_format(&self) -> bool {
        matches!(self, Error::Format(_))
    }
}

/// Failures while reading or writing the binary proof grammar.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Unexpected end of stream: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("Varuint does not fit in 64 bits")]
    VaruintOverflow,

    #[error("Length {len} outside of allowed range {min}..={max}")]
    LengthOutOfRange { len: u64, min: usize, max: usize },

    #[error("Unknown operation tag 0x{0:02x}")]
    UnknownOpTag(u8),

    #[error("Unknown hash algorithm tag 0x{0:02x}")]
    UnknownHashTag(u8),

    #[error("Message of {len} bytes exceeds the {max} byte limit")]
    MessageTooLong { len: usize, max: usize },

    #[error("Invalid calendar URI: {0}")]
    InvalidUri(String),

    #[error("Recursion limit exceeded")]
    RecursionLimit,

    #[error("Bad magic bytes, not a timestamp file")]
    BadMagic,

    #[error("Unsupported major version {0}")]
    UnsupportedVersion(u64),

    #[error("Trailing bytes after end of proof")]
    TrailingBytes,

    #[error("An empty timestamp cannot be serialized")]
    EmptyTimestamp,
}
