//! Core error types for the EBM data model and arenas.

use crate::id::AnyRef;
use thiserror::Error;

/// Errors produced by the arena repositories and the module container.
#[derive(Debug, Error)]
pub enum CoreError {
    /// `add_with_id` was called with an id already present in the arena.
    #[error("id {id} already in use")]
    DuplicateId { id: u64 },

    /// A ref did not resolve in its arena, even via the alias table.
    #[error("unresolved {kind} ref {id}", kind = kind, id = id)]
    Unresolved { kind: &'static str, id: u64 },

    /// An alias chain pointed at another alias entry.
    #[error("alias {from} forwards to alias {to}", from = from.0, to = to.0)]
    AliasToAlias { from: AnyRef, to: AnyRef },

    /// The id source ran past the varint-encodable range.
    #[error("id space exhausted (ids cap at 2^62 - 1)")]
    IdExhausted,

    /// A structural invariant of the module was violated.
    #[error("module inconsistency: {reason}")]
    Inconsistency { reason: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
