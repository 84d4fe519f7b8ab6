//! The EBM statement layer: declarations, control flow, and I/O.
//!
//! Statements are the largest body family; declarations (structs, enums,
//! functions, fields, properties) live here alongside control flow and the
//! `READ_DATA`/`WRITE_DATA` descriptors.

use serde::{Deserialize, Serialize};

use crate::id::{ExpressionRef, IdentifierRef, StatementRef, StringRef, TypeRef};
use crate::ops::{
    Endian, FunctionKind, LengthCheckKind, LoopKind, LoweringKind, MergeMode, SizeUnit,
};

/// Discriminant of a [`StatementBody`]. Declaration order fixes the `u16`
/// wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u16)]
pub enum StatementKind {
    Block,
    IfStatement,
    LoopStatement,
    MatchStatement,
    MatchBranch,
    Break,
    Continue,
    Return,
    Assignment,
    VariableDecl,
    ParameterDecl,
    FieldDecl,
    CompositeFieldDecl,
    StructDecl,
    EnumDecl,
    EnumMemberDecl,
    FunctionDecl,
    PropertyDecl,
    PropertyMemberDecl,
    ReadData,
    WriteData,
    Assert,
    LengthCheck,
    ErrorReport,
    ErrorReturn,
    LoweredStatements,
    Expression,
    ProgramDecl,
    Metadata,
    ImportModule,
    PhiNode,
}

// ---------------------------------------------------------------------------
// I/O descriptor
// ---------------------------------------------------------------------------

/// Size of an I/O operation: a unit plus either a literal amount or a
/// run-time expression.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IoSize {
    pub unit: SizeUnit,
    pub value: SizeValue,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeValue {
    #[default]
    None,
    Fixed {
        size: u64,
    },
    Dynamic {
        size_expr: ExpressionRef,
    },
}

impl IoSize {
    pub fn fixed(value: u64, unit: SizeUnit) -> Self {
        IoSize { unit, value: SizeValue::Fixed { size: value } }
    }

    pub fn dynamic(expr: ExpressionRef, unit: SizeUnit) -> Self {
        IoSize { unit, value: SizeValue::Dynamic { size_expr: expr } }
    }

    /// Literal amount when the unit is fixed.
    pub fn fixed_value(&self) -> Option<u64> {
        match self.value {
            SizeValue::Fixed { size } => Some(size),
            _ => None,
        }
    }

    /// Size expression when the unit is dynamic.
    pub fn expr(&self) -> Option<ExpressionRef> {
        match self.value {
            SizeValue::Dynamic { size_expr } => Some(size_expr),
            _ => None,
        }
    }

    /// Statically known total in bits, when the unit allows it.
    pub fn bits(&self) -> Option<u64> {
        match (self.unit, &self.value) {
            (SizeUnit::BitFixed, SizeValue::Fixed { size }) => Some(*size),
            (SizeUnit::ByteFixed, SizeValue::Fixed { size }) => Some(size * 8),
            _ => None,
        }
    }
}

/// Endian, sign, and lowering attributes of an I/O operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IoAttribute {
    pub endian: Endian,
    pub signed: bool,
    /// Read without consuming.
    pub peek: bool,
    pub has_lowered_statement: bool,
    /// Live endian-selector statement for `Endian::Dynamic`. The selector
    /// expression is assumed side-effect free; it may be referenced from
    /// both branches of an endian test.
    pub dynamic_ref: StatementRef,
}

/// Descriptor attached to `READ_DATA`/`WRITE_DATA`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IoData {
    /// The stream declaration this operation acts on.
    pub io_ref: StatementRef,
    /// Originating field statement, or nil for synthesized I/O.
    pub field: StatementRef,
    /// Expression read into or written from.
    pub target: ExpressionRef,
    pub data_type: TypeRef,
    pub attribute: IoAttribute,
    pub size: IoSize,
    /// More primitive equivalent (a `LOWERED_STATEMENTS` entry), or nil.
    pub lowered_statement: StatementRef,
}

// ---------------------------------------------------------------------------
// Declaration payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoopStatement {
    pub loop_kind: LoopKind,
    /// C-style init statement, or nil.
    pub init: StatementRef,
    pub condition: ExpressionRef,
    /// C-style step statement, or nil.
    pub increment: StatementRef,
    /// FOR_EACH item variable declaration, or nil.
    pub item_var: StatementRef,
    /// FOR_EACH collection expression, or nil.
    pub collection: ExpressionRef,
    pub body: StatementRef,
    /// Counter-loop form of a FOR_EACH, or nil.
    pub lowered_statement: StatementRef,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchStatement {
    pub target: ExpressionRef,
    pub exhaustive: bool,
    pub branches: Vec<StatementRef>,
    /// If-chain form, or nil.
    pub lowered_statement: StatementRef,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchBranch {
    pub condition: ExpressionRef,
    pub body: StatementRef,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableDecl {
    pub name: IdentifierRef,
    pub var_type: TypeRef,
    pub initial_value: ExpressionRef,
    pub constant: bool,
    /// Binds a view of an existing place rather than a copy (loop items).
    pub reference: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterDecl {
    pub name: IdentifierRef,
    pub param_type: TypeRef,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: IdentifierRef,
    pub field_type: TypeRef,
    pub parent_struct: StatementRef,
    pub state_variable: bool,
    /// Grouping composite field when this is an adjacent bit field, or nil.
    pub composite_field: StatementRef,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositeFieldDecl {
    pub name: IdentifierRef,
    pub parent_struct: StatementRef,
    /// Unsigned integer wide enough for the grouped bits.
    pub composite_type: TypeRef,
    pub fields: Vec<StatementRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructDecl {
    pub name: IdentifierRef,
    /// Field declarations, composite fields, and nested declarations only.
    pub fields: Vec<StatementRef>,
    /// Derived property and setter functions.
    pub properties: Vec<StatementRef>,
    pub encode_fn: StatementRef,
    pub decode_fn: StatementRef,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnumDecl {
    pub name: IdentifierRef,
    pub base_type: TypeRef,
    pub members: Vec<StatementRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnumMemberDecl {
    pub name: IdentifierRef,
    pub value: ExpressionRef,
    pub string_repr: StringRef,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub kind: FunctionKind,
    pub name: IdentifierRef,
    /// Declaring struct, or nil for free functions.
    pub parent_format: StatementRef,
    pub return_type: TypeRef,
    /// Parameter declarations. For encoders/decoders, `params[0]` is the
    /// coder input variable.
    pub params: Vec<StatementRef>,
    pub body: StatementRef,
    /// Property or field this function was synthesized for, or nil.
    pub related_property: StatementRef,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyDecl {
    pub name: IdentifierRef,
    pub property_type: TypeRef,
    pub parent_format: StatementRef,
    pub merge_mode: MergeMode,
    pub getter_condition: ExpressionRef,
    pub setter_condition: ExpressionRef,
    /// `PROPERTY_MEMBER_DECL` statements, one per union candidate position.
    pub members: Vec<StatementRef>,
    /// Strict properties a merged property was built from.
    pub derived_from: Vec<StatementRef>,
    pub getter_function: StatementRef,
    pub setter_function: StatementRef,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyMemberDecl {
    pub getter_condition: ExpressionRef,
    pub setter_condition: ExpressionRef,
    /// Backing field, or nil for a coalesced no-field member.
    pub field: StatementRef,
}

/// One lowering alternative attached to a `LOWERED_STATEMENTS` list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoweredStatement {
    pub lowering_kind: LoweringKind,
    pub block: StatementRef,
}

/// SSA-style merge of values arriving from different flow edges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhiNode {
    pub target: StatementRef,
    pub incoming: Vec<PhiIncoming>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhiIncoming {
    pub from: StatementRef,
    pub value: ExpressionRef,
}

// ---------------------------------------------------------------------------
// The statement body
// ---------------------------------------------------------------------------

/// Body of an entry in the statement arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatementBody {
    /// Ordered container of statements.
    Block { container: Vec<StatementRef> },
    IfStatement {
        condition: ExpressionRef,
        then_block: StatementRef,
        /// Nil when there is no else branch.
        else_block: StatementRef,
    },
    LoopStatement(LoopStatement),
    MatchStatement(MatchStatement),
    MatchBranch(MatchBranch),
    Break { related_loop: StatementRef },
    Continue { related_loop: StatementRef },
    Return {
        /// Nil for a bare return.
        value: ExpressionRef,
        related_function: StatementRef,
    },
    Assignment {
        target: ExpressionRef,
        value: ExpressionRef,
    },
    VariableDecl(VariableDecl),
    ParameterDecl(ParameterDecl),
    FieldDecl(FieldDecl),
    CompositeFieldDecl(CompositeFieldDecl),
    StructDecl(StructDecl),
    EnumDecl(EnumDecl),
    EnumMemberDecl(EnumMemberDecl),
    FunctionDecl(FunctionDecl),
    PropertyDecl(PropertyDecl),
    PropertyMemberDecl(PropertyMemberDecl),
    ReadData(IoData),
    WriteData(IoData),
    Assert {
        condition: ExpressionRef,
        lowered_statement: StatementRef,
    },
    LengthCheck {
        check_kind: LengthCheckKind,
        actual: ExpressionRef,
        limit: ExpressionRef,
        related_function: StatementRef,
        lowered_statement: StatementRef,
    },
    ErrorReport {
        message: StringRef,
        arguments: Vec<ExpressionRef>,
    },
    ErrorReturn { value: ExpressionRef },
    /// Ordered, non-empty list of lowering alternatives.
    LoweredStatements { alternatives: Vec<LoweredStatement> },
    Expression { expression: ExpressionRef },
    ProgramDecl { container: Vec<StatementRef> },
    Metadata {
        name: IdentifierRef,
        values: Vec<ExpressionRef>,
    },
    ImportModule { module_name: IdentifierRef },
    PhiNode(PhiNode),
}

impl StatementBody {
    pub fn kind(&self) -> StatementKind {
        match self {
            StatementBody::Block { .. } => StatementKind::Block,
            StatementBody::IfStatement { .. } => StatementKind::IfStatement,
            StatementBody::LoopStatement(_) => StatementKind::LoopStatement,
            StatementBody::MatchStatement(_) => StatementKind::MatchStatement,
            StatementBody::MatchBranch(_) => StatementKind::MatchBranch,
            StatementBody::Break { .. } => StatementKind::Break,
            StatementBody::Continue { .. } => StatementKind::Continue,
            StatementBody::Return { .. } => StatementKind::Return,
            StatementBody::Assignment { .. } => StatementKind::Assignment,
            StatementBody::VariableDecl(_) => StatementKind::VariableDecl,
            StatementBody::ParameterDecl(_) => StatementKind::ParameterDecl,
            StatementBody::FieldDecl(_) => StatementKind::FieldDecl,
            StatementBody::CompositeFieldDecl(_) => StatementKind::CompositeFieldDecl,
            StatementBody::StructDecl(_) => StatementKind::StructDecl,
            StatementBody::EnumDecl(_) => StatementKind::EnumDecl,
            StatementBody::EnumMemberDecl(_) => StatementKind::EnumMemberDecl,
            StatementBody::FunctionDecl(_) => StatementKind::FunctionDecl,
            StatementBody::PropertyDecl(_) => StatementKind::PropertyDecl,
            StatementBody::PropertyMemberDecl(_) => StatementKind::PropertyMemberDecl,
            StatementBody::ReadData(_) => StatementKind::ReadData,
            StatementBody::WriteData(_) => StatementKind::WriteData,
            StatementBody::Assert { .. } => StatementKind::Assert,
            StatementBody::LengthCheck { .. } => StatementKind::LengthCheck,
            StatementBody::ErrorReport { .. } => StatementKind::ErrorReport,
            StatementBody::ErrorReturn { .. } => StatementKind::ErrorReturn,
            StatementBody::LoweredStatements { .. } => StatementKind::LoweredStatements,
            StatementBody::Expression { .. } => StatementKind::Expression,
            StatementBody::ProgramDecl { .. } => StatementKind::ProgramDecl,
            StatementBody::Metadata { .. } => StatementKind::Metadata,
            StatementBody::ImportModule { .. } => StatementKind::ImportModule,
            StatementBody::PhiNode(_) => StatementKind::PhiNode,
        }
    }

    /// The I/O descriptor when this statement is a read or write.
    pub fn io_data(&self) -> Option<&IoData> {
        match self {
            StatementBody::ReadData(d) | StatementBody::WriteData(d) => Some(d),
            _ => None,
        }
    }

    pub fn io_data_mut(&mut self) -> Option<&mut IoData> {
        match self {
            StatementBody::ReadData(d) | StatementBody::WriteData(d) => Some(d),
            _ => None,
        }
    }

    /// The statement container when this is a block-shaped statement.
    pub fn block(&self) -> Option<&[StatementRef]> {
        match self {
            StatementBody::Block { container } | StatementBody::ProgramDecl { container } => {
                Some(container)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let block = StatementBody::Block { container: vec![StatementRef(4)] };
        assert_eq!(block.kind(), StatementKind::Block);
        assert_eq!(
            StatementBody::ReadData(IoData::default()).kind(),
            StatementKind::ReadData
        );
    }

    #[test]
    fn io_size_bits() {
        assert_eq!(IoSize::fixed(3, SizeUnit::BitFixed).bits(), Some(3));
        assert_eq!(IoSize::fixed(2, SizeUnit::ByteFixed).bits(), Some(16));
        assert_eq!(IoSize::dynamic(ExpressionRef(9), SizeUnit::ByteDynamic).bits(), None);
    }

    #[test]
    fn io_data_accessor_covers_both_directions() {
        let read = StatementBody::ReadData(IoData::default());
        let write = StatementBody::WriteData(IoData::default());
        assert!(read.io_data().is_some());
        assert!(write.io_data().is_some());
        assert!(StatementBody::Block { container: vec![] }.io_data().is_none());
    }

    #[test]
    fn json_kind_tags() {
        let json = serde_json::to_value(StatementBody::Break { related_loop: StatementRef(7) })
            .unwrap();
        assert_eq!(json["kind"], "BREAK");
        assert_eq!(json["related_loop"], 7);
    }
}
