//! Visitor errors and the pass sentinel.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VisitError {
    /// The sentinel: this hook chose not to act; keep searching. Never
    /// fatal; the dispatcher interprets it as "continue".
    #[error("pass")]
    Pass,

    /// A required sub-body or ref was absent during context construction.
    #[error("missing {what} at ref {at}")]
    Missing { what: &'static str, at: u64 },

    /// No hook in the merged chain handled this context.
    #[error("no visitor hook handled {context}")]
    Unhandled { context: &'static str },

    /// A hook failed.
    #[error("{0}")]
    Hook(String),
}

impl VisitError {
    /// `true` for the non-fatal continue signal.
    pub fn is_pass(&self) -> bool {
        matches!(self, VisitError::Pass)
    }
}

pub type VisitResult<T> = std::result::Result<T, VisitError>;
