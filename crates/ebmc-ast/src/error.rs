//! AST loading errors (the malformed-input class).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AstError {
    /// The JSON tree could not be parsed into nodes.
    #[error("malformed AST input: {0}")]
    Parse(#[from] serde_json::Error),

    /// A node referenced an index outside the arena.
    #[error("node {holder} references missing node {target}")]
    BadNodeRef { holder: u32, target: u32 },

    /// The arena is empty or the root is not a program node.
    #[error("AST has no program root")]
    NoRoot,

    /// A base64-encoded string literal failed to decode.
    #[error("invalid base64 string literal: {reason}")]
    BadBase64 { reason: String },
}

pub type Result<T> = std::result::Result<T, AstError>;
