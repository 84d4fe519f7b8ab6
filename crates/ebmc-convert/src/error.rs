//! Converter errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvertError {
    /// The AST uses a construct the converter does not handle.
    #[error("unsupported construct: {what}")]
    Unsupported { what: String },

    /// The AST is missing a field the converter requires.
    #[error("{node} node is missing required {field}")]
    MissingInput { node: &'static str, field: &'static str },

    /// An internal consistency check failed; this is a converter bug.
    #[error("internal converter error: {reason}")]
    Internal { reason: String },

    #[error(transparent)]
    Ast(#[from] ebmc_ast::AstError),

    #[error(transparent)]
    Core(#[from] ebmc_core::CoreError),
}

impl ConvertError {
    pub fn unsupported(what: impl Into<String>) -> Self {
        ConvertError::Unsupported { what: what.into() }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        ConvertError::Internal { reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;
