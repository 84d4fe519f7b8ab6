//! The EBM expression layer.
//!
//! Every expression records its own type; the converter guarantees `ty` is
//! set before an expression enters the arena. The operation payload is a
//! tagged union selected by [`ExpressionKind`].

use serde::{Deserialize, Serialize};

use crate::id::{ExpressionRef, StatementRef, StringRef, TypeRef};
use crate::ops::{BinaryOp, CastKind, SetterStatus, StreamKind, UnaryOp};
use crate::stmt::IoSize;

/// Discriminant of an [`ExprOp`]. Declaration order fixes the `u16` wire
/// code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u16)]
pub enum ExpressionKind {
    LiteralInt,
    LiteralBool,
    LiteralString,
    LiteralType,
    Identifier,
    BinaryOp,
    UnaryOp,
    IndexAccess,
    MemberAccess,
    TypeCast,
    Range,
    Call,
    ArraySize,
    MaxValue,
    DefaultValue,
    IsLittleEndian,
    IsError,
    GetStreamOffset,
    GetRemainingBytes,
    CanReadStream,
    NewObject,
    ReadData,
    WriteData,
    ConditionalStatement,
    Addressof,
    Optionalof,
    SetterStatus,
    OrCond,
}

/// A call: callee expression plus ordered arguments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallDesc {
    pub callee: ExpressionRef,
    pub arguments: Vec<ExpressionRef>,
}

/// An entry in the expression arena: the expression's type plus its
/// operation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionBody {
    #[serde(rename = "type")]
    pub ty: TypeRef,
    #[serde(flatten)]
    pub op: ExprOp,
}

impl ExpressionBody {
    pub fn new(ty: TypeRef, op: ExprOp) -> Self {
        ExpressionBody { ty, op }
    }

    pub fn kind(&self) -> ExpressionKind {
        self.op.kind()
    }
}

/// Operation payload of an expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExprOp {
    /// Unsigned integer literal re-encoded into the narrowest fitting type.
    LiteralInt { value: u64 },
    LiteralBool { value: bool },
    LiteralString { value: StringRef },
    LiteralType { type_ref: TypeRef },
    /// Reference to a declaration statement (variable, parameter, field,
    /// function).
    Identifier { decl: StatementRef },
    BinaryOp { op: BinaryOp, left: ExpressionRef, right: ExpressionRef },
    UnaryOp { op: UnaryOp, operand: ExpressionRef },
    IndexAccess { base: ExpressionRef, index: ExpressionRef },
    /// `base.member` where `member` is an identifier expression resolving to
    /// the member's declaration.
    MemberAccess { base: ExpressionRef, member: ExpressionRef },
    TypeCast {
        source: ExpressionRef,
        from_type: TypeRef,
        cast_kind: CastKind,
        /// Concrete CAST-kind method, filled by the cast-resolution pass for
        /// `FUNCTION_CAST`.
        cast_function: StatementRef,
    },
    /// Range literal; nil start/end means open on that side.
    Range { start: ExpressionRef, end: ExpressionRef },
    Call(CallDesc),
    /// Runtime element count of an array or vector expression.
    ArraySize { array: ExpressionRef },
    /// Maximum representable value of the expression's type; `lowered`
    /// carries the portable bit-twiddling form.
    MaxValue { lowered: ExpressionRef },
    /// Zero value of the expression's type.
    DefaultValue,
    /// Endianness test; `dynamic_ref` names the live selector statement for
    /// dynamic endian, nil for native.
    IsLittleEndian { dynamic_ref: StatementRef },
    /// Tests a coder-result value for failure.
    IsError { target: ExpressionRef },
    GetStreamOffset { stream: StreamKind, unit: crate::ops::SizeUnit },
    GetRemainingBytes { stream: StreamKind },
    /// `true` when at least `size` more is readable.
    CanReadStream { stream: StreamKind, size: IoSize },
    /// Freshly constructed value of the expression's type.
    NewObject,
    /// Read as an expression: a setup declaration plus the read statement;
    /// the value is the declared target.
    ReadData { target_decl: StatementRef, io_statement: StatementRef },
    /// Write as an expression: the written value plus the write statement.
    WriteData { target: ExpressionRef, io_statement: StatementRef },
    /// Statement-valued expression: the declared result plus the statement
    /// computing it.
    ConditionalStatement { target_decl: StatementRef, statement: StatementRef },
    Addressof { target: ExpressionRef },
    Optionalof { target: ExpressionRef },
    SetterStatus { status: SetterStatus },
    /// N-way OR over coalesced no-field property conditions.
    OrCond { conditions: Vec<ExpressionRef> },
}

impl ExprOp {
    pub fn kind(&self) -> ExpressionKind {
        match self {
            ExprOp::LiteralInt { .. } => ExpressionKind::LiteralInt,
            ExprOp::LiteralBool { .. } => ExpressionKind::LiteralBool,
            ExprOp::LiteralString { .. } => ExpressionKind::LiteralString,
            ExprOp::LiteralType { .. } => ExpressionKind::LiteralType,
            ExprOp::Identifier { .. } => ExpressionKind::Identifier,
            ExprOp::BinaryOp { .. } => ExpressionKind::BinaryOp,
            ExprOp::UnaryOp { .. } => ExpressionKind::UnaryOp,
            ExprOp::IndexAccess { .. } => ExpressionKind::IndexAccess,
            ExprOp::MemberAccess { .. } => ExpressionKind::MemberAccess,
            ExprOp::TypeCast { .. } => ExpressionKind::TypeCast,
            ExprOp::Range { .. } => ExpressionKind::Range,
            ExprOp::Call(_) => ExpressionKind::Call,
            ExprOp::ArraySize { .. } => ExpressionKind::ArraySize,
            ExprOp::MaxValue { .. } => ExpressionKind::MaxValue,
            ExprOp::DefaultValue => ExpressionKind::DefaultValue,
            ExprOp::IsLittleEndian { .. } => ExpressionKind::IsLittleEndian,
            ExprOp::IsError { .. } => ExpressionKind::IsError,
            ExprOp::GetStreamOffset { .. } => ExpressionKind::GetStreamOffset,
            ExprOp::GetRemainingBytes { .. } => ExpressionKind::GetRemainingBytes,
            ExprOp::CanReadStream { .. } => ExpressionKind::CanReadStream,
            ExprOp::NewObject => ExpressionKind::NewObject,
            ExprOp::ReadData { .. } => ExpressionKind::ReadData,
            ExprOp::WriteData { .. } => ExpressionKind::WriteData,
            ExprOp::ConditionalStatement { .. } => ExpressionKind::ConditionalStatement,
            ExprOp::Addressof { .. } => ExpressionKind::Addressof,
            ExprOp::Optionalof { .. } => ExpressionKind::Optionalof,
            ExprOp::SetterStatus { .. } => ExpressionKind::SetterStatus,
            ExprOp::OrCond { .. } => ExpressionKind::OrCond,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let body = ExpressionBody::new(TypeRef(3), ExprOp::LiteralInt { value: 7 });
        assert_eq!(body.kind(), ExpressionKind::LiteralInt);
        assert_eq!(
            ExprOp::OrCond { conditions: vec![] }.kind(),
            ExpressionKind::OrCond
        );
    }

    #[test]
    fn type_field_serializes_flat() {
        let body = ExpressionBody::new(TypeRef(3), ExprOp::LiteralBool { value: true });
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["type"], 3);
        assert_eq!(json["kind"], "LITERAL_BOOL");
        assert_eq!(json["value"], true);
    }
}
