//! Operator and attribute enums shared across the EBM body types.
//!
//! Every enum here is a closed vocabulary with a stable `u16` wire code
//! (its declaration order) and a symbolic serde name used by the JSON form.

use serde::{Deserialize, Serialize};

/// Binary operators. `define_assign`/`const_assign` never appear here; the
/// converter turns them into variable declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u16)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Equal,
    NotEqual,
    Less,
    LessOrEq,
    Greater,
    GreaterOrEq,
    LogicalAnd,
    LogicalOr,
    LeftShift,
    RightShift,
    BitAnd,
    BitOr,
    BitXor,
}

/// Unary operators. `BitNot` is produced only by the max-value lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u16)]
pub enum UnaryOp {
    LogicalNot,
    MinusSign,
    BitNot,
}

/// Cast classification, chosen by the converter from the source and
/// destination type descriptors. Ties favor the no-op-most kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u16)]
pub enum CastKind {
    IntToIntSameSize,
    SmallIntToLargeInt,
    LargeIntToSmallInt,
    SignedToUnsigned,
    UnsignedToSigned,
    /// Reinterpret integer bits as a float of the same width.
    IntToFloatBit,
    /// Reinterpret float bits as an integer of the same width.
    FloatToIntBit,
    IntToBool,
    BoolToInt,
    IntToEnum,
    EnumToInt,
    /// Cast via a user-declared CAST-kind method; resolved by a transform
    /// pass to a concrete function.
    FunctionCast,
    Other,
}

/// Byte order of an I/O operation.
///
/// `Unspec` resolves against the converter's current default; `Dynamic`
/// selects at run time through `IoAttribute::dynamic_ref`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u16)]
pub enum Endian {
    #[default]
    Unspec,
    Little,
    Big,
    Native,
    Dynamic,
}

/// Unit of an I/O size descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u16)]
pub enum SizeUnit {
    #[default]
    Unknown,
    BitFixed,
    ByteFixed,
    BitDynamic,
    ByteDynamic,
    ElementFixed,
    ElementDynamic,
    Dynamic,
}

impl SizeUnit {
    /// Fixed units carry a literal size; the rest carry an expression or
    /// nothing.
    pub fn is_fixed(self) -> bool {
        matches!(self, SizeUnit::BitFixed | SizeUnit::ByteFixed | SizeUnit::ElementFixed)
    }
}

/// Which stream an I/O expression acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u16)]
pub enum StreamKind {
    Input,
    Output,
}

/// Loop shape of a `LOOP_STATEMENT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u16)]
pub enum LoopKind {
    For,
    While,
    ForEach,
    #[default]
    Infinite,
}

/// Role of a `FUNCTION_DECL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u16)]
pub enum FunctionKind {
    #[default]
    Normal,
    Encoder,
    Decoder,
    PropertyGetter,
    PropertySetter,
    VectorSetter,
    Cast,
}

/// How a property was merged out of a discriminated union.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u16)]
pub enum MergeMode {
    /// All union candidates share one field type.
    #[default]
    StrictType,
    /// Candidates cluster under a synthesized common-typed variant.
    CommonType,
    /// More than one cluster remained; a single wrapping variant with no
    /// common type.
    UncommonType,
}

/// Result of a property or vector setter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u16)]
pub enum SetterStatus {
    Success,
    Failed,
}

/// Why a `LENGTH_CHECK` statement exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u16)]
pub enum LengthCheckKind {
    SetterVectorLength,
}

/// What a lowered alternative was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u16)]
pub enum LoweringKind {
    /// Direct re-expression with more primitive statements.
    #[default]
    Naive,
    /// Multi-byte integer via a fixed byte array.
    IntToByteArray,
    /// Enum via its underlying integer type.
    EnumToBaseInt,
    /// Array element loop.
    ArrayForEach,
    /// String literal byte loop.
    StringForEach,
    /// Nested struct via its encode/decode function.
    StructCall,
    /// Run of fixed-size I/O merged into one buffered operation.
    VectorizedIo,
    /// Dynamic bit-packing group.
    DynamicBits,
}

/// Kind hint stored with an alias entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u16)]
pub enum AliasHint {
    Identifier,
    String,
    Type,
    Statement,
    Expression,
}
