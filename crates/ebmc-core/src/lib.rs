//! Core data model for the Extended Binary Module (EBM).
//!
//! An EBM is five id-indexed arenas (identifiers, strings, types,
//! statements, expressions) plus an alias table. Bodies are tagged unions
//! that reference each other by integer ref only; ownership never cycles.

pub mod arena;
pub mod error;
pub mod expr;
pub mod id;
pub mod module;
pub mod ops;
pub mod stmt;
pub mod types;
pub mod visit;

pub use arena::{Arena, Entry};
pub use error::CoreError;
pub use expr::{CallDesc, ExprOp, ExpressionBody, ExpressionKind};
pub use id::{
    AnyRef, ExpressionRef, IdSource, IdentifierRef, RefKind, StatementRef, StringRef, TypeRef,
    ENTRY_ID, MAX_ID, NIL_ID,
};
pub use module::{
    Alias, DebugLoc, Identifier, InverseRef, Module, StringLiteral, FORMAT_VERSION,
};
pub use ops::{
    AliasHint, BinaryOp, CastKind, Endian, FunctionKind, LengthCheckKind, LoopKind, LoweringKind,
    MergeMode, SetterStatus, SizeUnit, StreamKind, UnaryOp,
};
pub use stmt::{
    CompositeFieldDecl, EnumDecl, EnumMemberDecl, FieldDecl, FunctionDecl, IoAttribute, IoData,
    IoSize, LoopStatement, LoweredStatement, MatchBranch, MatchStatement, ParameterDecl, PhiNode,
    PropertyDecl, PropertyMemberDecl, SizeValue, StatementBody, StatementKind, StructDecl,
    VariableDecl,
};
pub use types::{TypeBody, TypeKind, VariantDesc};
pub use visit::VisitRefs;
