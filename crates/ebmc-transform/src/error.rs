//! Transform pipeline errors. Every failure names the pass and, where one
//! exists, the offending ref.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransformError {
    /// A pass hit a module shape it cannot handle.
    #[error("{pass}: unsupported input at ref {at}: {reason}")]
    Unsupported { pass: &'static str, at: u64, reason: String },

    /// A pass invariant failed; this is a pipeline bug.
    #[error("{pass}: internal error: {reason}")]
    Internal { pass: &'static str, reason: String },

    /// IR construction inside a pass failed.
    #[error(transparent)]
    Build(#[from] ebmc_convert::ConvertError),

    #[error(transparent)]
    Core(#[from] ebmc_core::CoreError),
}

impl TransformError {
    pub fn internal(pass: &'static str, reason: impl Into<String>) -> Self {
        TransformError::Internal { pass, reason: reason.into() }
    }

    pub fn unsupported(pass: &'static str, at: u64, reason: impl Into<String>) -> Self {
        TransformError::Unsupported { pass, at, reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, TransformError>;
