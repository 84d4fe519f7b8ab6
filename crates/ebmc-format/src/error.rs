//! Serialization errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FormatError {
    /// A value does not fit in the prefix varint range (< 2^62).
    #[error("value {value} exceeds the varint range")]
    VarintOverflow { value: u64 },

    /// Input ended inside an entry or varint.
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof { offset: usize },

    /// An unknown kind code was read for the named body family.
    #[error("unknown {family} kind code {code}")]
    UnknownKind { family: &'static str, code: u16 },

    /// The module version byte is not one we can read.
    #[error("unsupported format version {version}")]
    UnsupportedVersion { version: u8 },

    /// A declared length disagrees with the decoded element count.
    #[error("length mismatch for {what}: declared {declared}, found {found}")]
    LengthMismatch { what: String, declared: u64, found: u64 },

    /// A string field held invalid UTF-8.
    #[error("invalid utf-8 in string field: {reason}")]
    InvalidUtf8 { reason: String },

    /// The JSON form was structurally invalid.
    #[error("malformed JSON module: {reason}")]
    MalformedJson { reason: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FormatError>;
