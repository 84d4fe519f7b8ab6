//! Ref newtypes and the monotonic id source.
//!
//! Every IR object is addressed by a ref: a globally unique unsigned id
//! pointing into one of the five arenas. All refs are distinct newtype
//! wrappers over `u64`, so a `TypeRef` cannot be accidentally used where a
//! `StatementRef` is expected. Id 0 is reserved for "nil/absent"; id 1 is
//! reserved for the module's root statement.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Id reserved for "nil/absent".
pub const NIL_ID: u64 = 0;
/// Id reserved for the module entry-point statement.
pub const ENTRY_ID: u64 = 1;
/// Ids are serialized as prefix varints and therefore cap at 2^62 - 1.
pub const MAX_ID: u64 = (1 << 62) - 1;

macro_rules! ref_type {
    ($(#[$doc:meta])* $name:ident, $kind:expr) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
            Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// The nil (absent) ref.
            pub const NIL: $name = $name(NIL_ID);

            /// Returns `true` if this ref is nil.
            pub fn is_nil(self) -> bool {
                self.0 == NIL_ID
            }

            /// Returns the raw id value.
            pub fn value(self) -> u64 {
                self.0
            }

            /// The arena this ref addresses.
            pub fn kind(self) -> RefKind {
                $kind
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$name> for AnyRef {
            fn from(r: $name) -> AnyRef {
                AnyRef(r.0)
            }
        }
    };
}

ref_type!(
    /// Ref into the identifier arena.
    IdentifierRef,
    RefKind::Identifier
);
ref_type!(
    /// Ref into the string arena.
    StringRef,
    RefKind::String
);
ref_type!(
    /// Ref into the type arena.
    TypeRef,
    RefKind::Type
);
ref_type!(
    /// Ref into the statement arena.
    StatementRef,
    RefKind::Statement
);
ref_type!(
    /// Ref into the expression arena.
    ExpressionRef,
    RefKind::Expression
);

impl StatementRef {
    /// The module entry-point statement.
    pub const ENTRY: StatementRef = StatementRef(ENTRY_ID);
}

/// A ref whose arena is not statically known (alias table, inverse-ref map,
/// renumbering tables).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AnyRef(pub u64);

impl AnyRef {
    pub const NIL: AnyRef = AnyRef(NIL_ID);

    pub fn is_nil(self) -> bool {
        self.0 == NIL_ID
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AnyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which arena (or the alias layer) a ref belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefKind {
    Identifier,
    String,
    Type,
    Statement,
    Expression,
}

/// Monotonic id source shared by all five arenas.
///
/// Fresh ids start at 2: 0 is nil and 1 is the entry point. The dead-object
/// pass resets the source before renumbering survivors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdSource {
    current: u64,
}

impl Default for IdSource {
    fn default() -> Self {
        IdSource { current: ENTRY_ID }
    }
}

impl IdSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a fresh unique id. Never returns 0 or 1.
    pub fn next_id(&mut self) -> u64 {
        self.current += 1;
        self.current
    }

    /// The highest id handed out so far.
    pub fn current(&self) -> u64 {
        self.current
    }

    /// Resets the source so the next id is `base + 1`. Used by renumbering.
    pub fn reset(&mut self, base: u64) {
        self.current = base.max(ENTRY_ID);
    }
}

/// Internal constructor trait so the arena can mint typed refs.
pub trait RefId: Copy + Eq + std::hash::Hash + Into<AnyRef> {
    fn from_value(id: u64) -> Self;
    fn value(self) -> u64;
    fn is_nil(self) -> bool {
        self.value() == NIL_ID
    }
}

macro_rules! impl_ref_id {
    ($($name:ident),*) => {
        $(impl RefId for $name {
            fn from_value(id: u64) -> Self {
                $name(id)
            }
            fn value(self) -> u64 {
                self.0
            }
        })*
    };
}

impl_ref_id!(IdentifierRef, StringRef, TypeRef, StatementRef, ExpressionRef, AnyRef);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ids_skip_nil_and_entry() {
        let mut src = IdSource::new();
        assert_eq!(src.next_id(), 2);
        assert_eq!(src.next_id(), 3);
        assert_eq!(src.current(), 3);
    }

    #[test]
    fn reset_restarts_after_base() {
        let mut src = IdSource::new();
        src.next_id();
        src.next_id();
        src.reset(1);
        assert_eq!(src.next_id(), 2);
    }

    #[test]
    fn nil_and_display() {
        assert!(TypeRef::NIL.is_nil());
        assert!(!StatementRef::ENTRY.is_nil());
        assert_eq!(format!("{}", ExpressionRef(42)), "42");
    }

    #[test]
    fn ref_kinds_are_distinct() {
        assert_eq!(TypeRef(5).kind(), RefKind::Type);
        assert_eq!(StatementRef(5).kind(), RefKind::Statement);
        assert_ne!(TypeRef(5).kind(), StatementRef(5).kind());
    }
}
