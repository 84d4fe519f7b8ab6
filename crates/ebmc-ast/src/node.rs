//! The source-language AST we consume.
//!
//! Nodes live in one arena indexed by [`NodeId`]; cross-references
//! (including weak back-references to declaring scopes) are plain ids. The
//! upstream parser ships the tree as JSON with a `node_type` tag per node;
//! `serde` does the heavy lifting. String literals arrive base64-encoded.

use serde::{Deserialize, Serialize};

/// Index into [`Ast::nodes`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Source-level binary operators, including the assignment family that the
/// converter splits off into statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AstBinaryOp {
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
    Assign,
    DefineAssign,
    ConstAssign,
    /// `for x in y` binder.
    InAssign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    LeftShiftAssign,
    RightShiftAssign,
    BitAndAssign,
    BitOrAssign,
    BitXorAssign,
}

impl AstBinaryOp {
    /// The plain operator behind a compound assignment, if this is one.
    pub fn compound_base(self) -> Option<AstBinaryOp> {
        Some(match self {
            AstBinaryOp::AddAssign => AstBinaryOp::Add,
            AstBinaryOp::SubAssign => AstBinaryOp::Sub,
            AstBinaryOp::MulAssign => AstBinaryOp::Mul,
            AstBinaryOp::DivAssign => AstBinaryOp::Div,
            AstBinaryOp::ModAssign => AstBinaryOp::Mod,
            AstBinaryOp::LeftShiftAssign => AstBinaryOp::LeftShift,
            AstBinaryOp::RightShiftAssign => AstBinaryOp::RightShift,
            AstBinaryOp::BitAndAssign => AstBinaryOp::BitAnd,
            AstBinaryOp::BitOrAssign => AstBinaryOp::BitOr,
            AstBinaryOp::BitXorAssign => AstBinaryOp::BitXor,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AstUnaryOp {
    Not,
    MinusSign,
}

/// Declared byte order of a scalar field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AstEndian {
    #[default]
    Unspec,
    Little,
    Big,
    Native,
    Dynamic,
}

/// Built-in stream operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IoMethod {
    InputOffset,
    InputBitOffset,
    InputRemain,
    InputSubrange,
    InputPeek,
    InputGet,
    OutputPut,
}

/// What comes after an open-length vector field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Follow {
    #[default]
    Unknown,
    /// Nothing follows; the vector runs to end of stream.
    End,
    /// A fixed-size tail follows.
    Fixed,
    /// A constant (string-literal magic) follows.
    Constant,
}

/// Per-field annotations from the schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldArguments {
    /// Alignment requirement in bits, when the field pads to alignment.
    #[serde(default)]
    pub alignment_value: Option<u64>,
    /// The field lives inside a sub-byte window of the stream.
    #[serde(default)]
    pub sub_byte_length: bool,
}

/// One node of the source AST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node_type", rename_all = "snake_case")]
pub enum Node {
    // -- types -------------------------------------------------------------
    IntType {
        is_signed: bool,
        bit_size: u8,
        #[serde(default)]
        endian: AstEndian,
    },
    FloatType {
        bit_size: u8,
        #[serde(default)]
        endian: AstEndian,
    },
    BoolType {},
    VoidType {},
    MetaType {},
    /// Named alias of another type.
    IdentType { base: NodeId },
    /// Type of an integer literal used in type position.
    IntLiteralType { base: NodeId },
    /// Type of a string literal used in type position (fixed magic).
    StrLiteralType {
        base: NodeId,
        #[serde(default)]
        bit_size: Option<u64>,
    },
    ArrayType {
        element_type: NodeId,
        #[serde(default)]
        length: Option<NodeId>,
        #[serde(default)]
        length_value: Option<u64>,
    },
    /// Struct type; doubles as the member container of its declaration.
    StructType {
        #[serde(default)]
        base: Option<NodeId>,
        #[serde(default)]
        fields: Vec<NodeId>,
        #[serde(default)]
        recursive: bool,
        #[serde(default)]
        bit_size: Option<u64>,
        /// Total size in bits of the fixed-size fields after an
        /// eventual-end vector.
        #[serde(default)]
        fixed_tail_size: u64,
    },
    /// Union of struct alternatives selected by a match.
    StructUnionType {
        structs: Vec<NodeId>,
        #[serde(default)]
        exhaustive: bool,
    },
    /// Discriminated union of field alternatives; becomes a property.
    UnionType {
        #[serde(default)]
        cond: Option<NodeId>,
        candidates: Vec<NodeId>,
        #[serde(default)]
        common_type: Option<NodeId>,
    },
    UnionCandidate {
        #[serde(default)]
        cond: Option<NodeId>,
        #[serde(default)]
        field: Option<NodeId>,
    },
    EnumType { base: NodeId },
    RangeType {
        #[serde(default)]
        base_type: Option<NodeId>,
        range: NodeId,
    },
    FunctionType {
        #[serde(default)]
        parameters: Vec<NodeId>,
        #[serde(default)]
        return_type: Option<NodeId>,
    },

    // -- expressions -------------------------------------------------------
    Ident {
        expr_type: NodeId,
        ident: String,
        /// Declaration this identifier resolves to.
        base: NodeId,
    },
    IntLiteral {
        expr_type: NodeId,
        value: u64,
    },
    BoolLiteral {
        expr_type: NodeId,
        value: bool,
    },
    /// `value` is base64-encoded payload bytes.
    StrLiteral {
        expr_type: NodeId,
        value: String,
    },
    TypeLiteral {
        expr_type: NodeId,
        type_literal: NodeId,
    },
    Binary {
        expr_type: NodeId,
        op: AstBinaryOp,
        left: NodeId,
        right: NodeId,
    },
    Unary {
        expr_type: NodeId,
        op: AstUnaryOp,
        expr: NodeId,
    },
    /// `expr_type` is the destination type.
    Cast {
        expr_type: NodeId,
        expr: NodeId,
    },
    Index {
        expr_type: NodeId,
        expr: NodeId,
        index: NodeId,
    },
    MemberAccess {
        expr_type: NodeId,
        target: NodeId,
        member: NodeId,
    },
    Range {
        expr_type: NodeId,
        #[serde(default)]
        start: Option<NodeId>,
        #[serde(default)]
        end: Option<NodeId>,
        #[serde(default)]
        inclusive: bool,
    },
    IoOperation {
        expr_type: NodeId,
        method: IoMethod,
        #[serde(default)]
        arguments: Vec<NodeId>,
    },

    // -- statements and declarations ---------------------------------------
    Program { elements: Vec<NodeId> },
    Format {
        ident: String,
        body: NodeId,
        #[serde(default)]
        encode_fn: Option<NodeId>,
        #[serde(default)]
        decode_fn: Option<NodeId>,
    },
    Field {
        #[serde(default)]
        ident: Option<String>,
        field_type: NodeId,
        #[serde(default)]
        belong: Option<NodeId>,
        #[serde(default)]
        is_state_variable: bool,
        #[serde(default)]
        arguments: Option<FieldArguments>,
        #[serde(default)]
        follow: Follow,
        #[serde(default)]
        eventual_follow: Follow,
        /// Next sibling field, for constant-terminated vectors.
        #[serde(default)]
        next: Option<NodeId>,
        /// The struct type this field sits in.
        #[serde(default)]
        belong_struct: Option<NodeId>,
    },
    Function {
        ident: String,
        #[serde(default)]
        belong: Option<NodeId>,
        #[serde(default)]
        parameters: Vec<NodeId>,
        #[serde(default)]
        return_type: Option<NodeId>,
        body: NodeId,
    },
    Enum {
        ident: String,
        #[serde(default)]
        base_type: Option<NodeId>,
        members: Vec<NodeId>,
    },
    EnumMember {
        ident: String,
        #[serde(default)]
        value: Option<NodeId>,
        #[serde(default)]
        str_literal: Option<NodeId>,
    },
    If {
        cond: NodeId,
        then: NodeId,
        #[serde(default)]
        els: Option<NodeId>,
    },
    Loop {
        #[serde(default)]
        init: Option<NodeId>,
        #[serde(default)]
        cond: Option<NodeId>,
        #[serde(default)]
        step: Option<NodeId>,
        body: NodeId,
    },
    Match {
        cond: NodeId,
        branch: Vec<NodeId>,
        #[serde(default)]
        exhaustive: bool,
    },
    MatchBranch {
        cond: NodeId,
        #[serde(default)]
        then: Option<NodeId>,
    },
    Return {
        #[serde(default)]
        expr: Option<NodeId>,
    },
    Break {},
    Continue {},
    Assert { cond: NodeId },
    ExplicitError {
        message: NodeId,
        #[serde(default)]
        arguments: Vec<NodeId>,
    },
    Metadata {
        name: String,
        #[serde(default)]
        values: Vec<NodeId>,
    },
    Import { path: String },
    State { ident: String, body: NodeId },
    IndentBlock {
        elements: Vec<NodeId>,
        #[serde(default)]
        struct_type: Option<NodeId>,
    },
    ImplicitYield { expr: NodeId },
    ScopedStatement { statement: NodeId },
}

impl Node {
    /// The declared type of an expression node, or `None` for non-expression
    /// nodes.
    pub fn expr_type(&self) -> Option<NodeId> {
        match self {
            Node::Ident { expr_type, .. }
            | Node::IntLiteral { expr_type, .. }
            | Node::BoolLiteral { expr_type, .. }
            | Node::StrLiteral { expr_type, .. }
            | Node::TypeLiteral { expr_type, .. }
            | Node::Binary { expr_type, .. }
            | Node::Unary { expr_type, .. }
            | Node::Cast { expr_type, .. }
            | Node::Index { expr_type, .. }
            | Node::MemberAccess { expr_type, .. }
            | Node::Range { expr_type, .. }
            | Node::IoOperation { expr_type, .. } => Some(*expr_type),
            _ => None,
        }
    }

    pub fn is_expression(&self) -> bool {
        self.expr_type().is_some()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Node::IntType { .. } => "int_type",
            Node::FloatType { .. } => "float_type",
            Node::BoolType {} => "bool_type",
            Node::VoidType {} => "void_type",
            Node::MetaType {} => "meta_type",
            Node::IdentType { .. } => "ident_type",
            Node::IntLiteralType { .. } => "int_literal_type",
            Node::StrLiteralType { .. } => "str_literal_type",
            Node::ArrayType { .. } => "array_type",
            Node::StructType { .. } => "struct_type",
            Node::StructUnionType { .. } => "struct_union_type",
            Node::UnionType { .. } => "union_type",
            Node::UnionCandidate { .. } => "union_candidate",
            Node::EnumType { .. } => "enum_type",
            Node::RangeType { .. } => "range_type",
            Node::FunctionType { .. } => "function_type",
            Node::Ident { .. } => "ident",
            Node::IntLiteral { .. } => "int_literal",
            Node::BoolLiteral { .. } => "bool_literal",
            Node::StrLiteral { .. } => "str_literal",
            Node::TypeLiteral { .. } => "type_literal",
            Node::Binary { .. } => "binary",
            Node::Unary { .. } => "unary",
            Node::Cast { .. } => "cast",
            Node::Index { .. } => "index",
            Node::MemberAccess { .. } => "member_access",
            Node::Range { .. } => "range",
            Node::IoOperation { .. } => "io_operation",
            Node::Program { .. } => "program",
            Node::Format { .. } => "format",
            Node::Field { .. } => "field",
            Node::Function { .. } => "function",
            Node::Enum { .. } => "enum",
            Node::EnumMember { .. } => "enum_member",
            Node::If { .. } => "if",
            Node::Loop { .. } => "loop",
            Node::Match { .. } => "match",
            Node::MatchBranch { .. } => "match_branch",
            Node::Return { .. } => "return",
            Node::Break {} => "break",
            Node::Continue {} => "continue",
            Node::Assert { .. } => "assert",
            Node::ExplicitError { .. } => "explicit_error",
            Node::Metadata { .. } => "metadata",
            Node::Import { .. } => "import",
            Node::State { .. } => "state",
            Node::IndentBlock { .. } => "indent_block",
            Node::ImplicitYield { .. } => "implicit_yield",
            Node::ScopedStatement { .. } => "scoped_statement",
        }
    }
}
