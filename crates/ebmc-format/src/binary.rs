//! The EBM binary format.
//!
//! Layout: `version | max_id | identifiers | strings | types | statements |
//! expressions | aliases | debug_files | debug_locs`, each sequence preceded
//! by its varint length. Every entry is `id (varint) | body_len (varint) |
//! body`. A body starts with its `u16` kind code followed by only the fields
//! meaningful for that kind, in declaration order.

use ebmc_core::expr::{CallDesc, ExprOp, ExpressionBody, ExpressionKind};
use ebmc_core::id::{
    AnyRef, ExpressionRef, IdentifierRef, RefId, StatementRef, StringRef, TypeRef,
};
use ebmc_core::module::{Alias, DebugLoc, Identifier, Module, StringLiteral, FORMAT_VERSION};
use ebmc_core::ops::{
    AliasHint, BinaryOp, CastKind, Endian, FunctionKind, LengthCheckKind, LoopKind, LoweringKind,
    MergeMode, SetterStatus, SizeUnit, StreamKind, UnaryOp,
};
use ebmc_core::stmt::{
    CompositeFieldDecl, EnumDecl, EnumMemberDecl, FieldDecl, FunctionDecl, IoAttribute, IoData,
    IoSize, LoopStatement, LoweredStatement, MatchBranch, MatchStatement, ParameterDecl,
    PhiIncoming, PhiNode, PropertyDecl, PropertyMemberDecl, SizeValue, StatementBody,
    StatementKind, StructDecl, VariableDecl,
};
use ebmc_core::types::{TypeBody, TypeKind, VariantDesc};
use ebmc_core::Arena;

use crate::error::{FormatError, Result};
use crate::varint::{read_varint, write_varint};

// ---------------------------------------------------------------------------
// Writer / Reader
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct Writer {
    pub buf: Vec<u8>,
}

impl Writer {
    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn boolean(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    fn varint(&mut self, v: u64) -> Result<()> {
        write_varint(&mut self.buf, v)
    }

    fn bytes(&mut self, data: &[u8]) -> Result<()> {
        self.varint(data.len() as u64)?;
        self.buf.extend_from_slice(data);
        Ok(())
    }
}

pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn u8(&mut self) -> Result<u8> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or(FormatError::UnexpectedEof { offset: self.pos })?;
        self.pos += 1;
        Ok(b)
    }

    fn u16(&mut self) -> Result<u16> {
        let hi = self.u8()?;
        let lo = self.u8()?;
        Ok(u16::from_be_bytes([hi, lo]))
    }

    fn boolean(&mut self) -> Result<bool> {
        Ok(self.u8()? != 0)
    }

    fn varint(&mut self) -> Result<u64> {
        read_varint(self.buf, &mut self.pos)
    }

    fn bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.varint()? as usize;
        if self.pos + len > self.buf.len() {
            return Err(FormatError::UnexpectedEof { offset: self.buf.len() });
        }
        let out = self.buf[self.pos..self.pos + len].to_vec();
        self.pos += len;
        Ok(out)
    }

    fn at_end(&self) -> bool {
        self.pos == self.buf.len()
    }
}

// ---------------------------------------------------------------------------
// Wire trait
// ---------------------------------------------------------------------------

pub(crate) trait Wire: Sized {
    fn encode(&self, w: &mut Writer) -> Result<()>;
    fn decode(r: &mut Reader) -> Result<Self>;
}

impl Wire for u8 {
    fn encode(&self, w: &mut Writer) -> Result<()> {
        w.u8(*self);
        Ok(())
    }
    fn decode(r: &mut Reader) -> Result<Self> {
        r.u8()
    }
}

impl Wire for bool {
    fn encode(&self, w: &mut Writer) -> Result<()> {
        w.boolean(*self);
        Ok(())
    }
    fn decode(r: &mut Reader) -> Result<Self> {
        r.boolean()
    }
}

impl Wire for u64 {
    fn encode(&self, w: &mut Writer) -> Result<()> {
        w.varint(*self)
    }
    fn decode(r: &mut Reader) -> Result<Self> {
        r.varint()
    }
}

impl Wire for String {
    fn encode(&self, w: &mut Writer) -> Result<()> {
        w.bytes(self.as_bytes())
    }
    fn decode(r: &mut Reader) -> Result<Self> {
        let data = r.bytes()?;
        String::from_utf8(data).map_err(|e| FormatError::InvalidUtf8 { reason: e.to_string() })
    }
}

impl<T: Wire> Wire for Vec<T> {
    fn encode(&self, w: &mut Writer) -> Result<()> {
        w.varint(self.len() as u64)?;
        for item in self {
            item.encode(w)?;
        }
        Ok(())
    }
    fn decode(r: &mut Reader) -> Result<Self> {
        let len = r.varint()? as usize;
        let mut out = Vec::with_capacity(len.min(4096));
        for _ in 0..len {
            out.push(T::decode(r)?);
        }
        Ok(out)
    }
}

macro_rules! wire_ref {
    ($($ty:ident),*) => {
        $(impl Wire for $ty {
            fn encode(&self, w: &mut Writer) -> Result<()> {
                w.varint(self.0)
            }
            fn decode(r: &mut Reader) -> Result<Self> {
                Ok($ty(r.varint()?))
            }
        })*
    };
}

wire_ref!(IdentifierRef, StringRef, TypeRef, StatementRef, ExpressionRef, AnyRef);

macro_rules! wire_enum {
    ($family:literal $ty:ident { $($variant:ident),* $(,)? }) => {
        impl Wire for $ty {
            fn encode(&self, w: &mut Writer) -> Result<()> {
                w.u16(*self as u16);
                Ok(())
            }
            fn decode(r: &mut Reader) -> Result<Self> {
                const ALL: &[$ty] = &[$(<$ty>::$variant),*];
                let code = r.u16()?;
                ALL.get(code as usize)
                    .copied()
                    .ok_or(FormatError::UnknownKind { family: $family, code })
            }
        }
    };
}

wire_enum!("binary_op" BinaryOp {
    Add, Sub, Mul, Div, Mod, Equal, NotEqual, Less, LessOrEq, Greater, GreaterOrEq,
    LogicalAnd, LogicalOr, LeftShift, RightShift, BitAnd, BitOr, BitXor,
});
wire_enum!("unary_op" UnaryOp { LogicalNot, MinusSign, BitNot });
wire_enum!("cast_kind" CastKind {
    IntToIntSameSize, SmallIntToLargeInt, LargeIntToSmallInt, SignedToUnsigned,
    UnsignedToSigned, IntToFloatBit, FloatToIntBit, IntToBool, BoolToInt, IntToEnum,
    EnumToInt, FunctionCast, Other,
});
wire_enum!("endian" Endian { Unspec, Little, Big, Native, Dynamic });
wire_enum!("size_unit" SizeUnit {
    Unknown, BitFixed, ByteFixed, BitDynamic, ByteDynamic, ElementFixed, ElementDynamic,
    Dynamic,
});
wire_enum!("stream" StreamKind { Input, Output });
wire_enum!("loop_kind" LoopKind { For, While, ForEach, Infinite });
wire_enum!("function_kind" FunctionKind {
    Normal, Encoder, Decoder, PropertyGetter, PropertySetter, VectorSetter, Cast,
});
wire_enum!("merge_mode" MergeMode { StrictType, CommonType, UncommonType });
wire_enum!("setter_status" SetterStatus { Success, Failed });
wire_enum!("length_check" LengthCheckKind { SetterVectorLength });
wire_enum!("lowering_kind" LoweringKind {
    Naive, IntToByteArray, EnumToBaseInt, ArrayForEach, StringForEach, StructCall,
    VectorizedIo, DynamicBits,
});
wire_enum!("alias_hint" AliasHint { Identifier, String, Type, Statement, Expression });
wire_enum!("type_kind" TypeKind {
    Int, Uint, Usize, Float, Bool, Void, Meta, Enum, Struct, RecursiveStruct, Array,
    Vector, Variant, Range, Function, EncoderInput, DecoderInput, EncoderReturn,
    DecoderReturn, PropertySetterReturn, Optional, Ptr,
});
wire_enum!("statement_kind" StatementKind {
    Block, IfStatement, LoopStatement, MatchStatement, MatchBranch, Break, Continue,
    Return, Assignment, VariableDecl, ParameterDecl, FieldDecl, CompositeFieldDecl,
    StructDecl, EnumDecl, EnumMemberDecl, FunctionDecl, PropertyDecl, PropertyMemberDecl,
    ReadData, WriteData, Assert, LengthCheck, ErrorReport, ErrorReturn, LoweredStatements,
    Expression, ProgramDecl, Metadata, ImportModule, PhiNode,
});
wire_enum!("expression_kind" ExpressionKind {
    LiteralInt, LiteralBool, LiteralString, LiteralType, Identifier, BinaryOp, UnaryOp,
    IndexAccess, MemberAccess, TypeCast, Range, Call, ArraySize, MaxValue, DefaultValue,
    IsLittleEndian, IsError, GetStreamOffset, GetRemainingBytes, CanReadStream, NewObject,
    ReadData, WriteData, ConditionalStatement, Addressof, Optionalof, SetterStatus, OrCond,
});

macro_rules! wire_struct {
    ($ty:ident { $($field:ident),* $(,)? }) => {
        impl Wire for $ty {
            fn encode(&self, w: &mut Writer) -> Result<()> {
                $(self.$field.encode(w)?;)*
                Ok(())
            }
            fn decode(r: &mut Reader) -> Result<Self> {
                Ok($ty { $($field: Wire::decode(r)?),* })
            }
        }
    };
}

wire_struct!(VariantDesc { common_type, members, related_field });
wire_struct!(LoopStatement {
    loop_kind, init, condition, increment, item_var, collection, body, lowered_statement,
});
wire_struct!(MatchStatement { target, exhaustive, branches, lowered_statement });
wire_struct!(MatchBranch { condition, body });
wire_struct!(VariableDecl { name, var_type, initial_value, constant, reference });
wire_struct!(ParameterDecl { name, param_type });
wire_struct!(FieldDecl { name, field_type, parent_struct, state_variable, composite_field });
wire_struct!(CompositeFieldDecl { name, parent_struct, composite_type, fields });
wire_struct!(StructDecl { name, fields, properties, encode_fn, decode_fn });
wire_struct!(EnumDecl { name, base_type, members });
wire_struct!(EnumMemberDecl { name, value, string_repr });
wire_struct!(FunctionDecl {
    kind, name, parent_format, return_type, params, body, related_property,
});
wire_struct!(PropertyDecl {
    name, property_type, parent_format, merge_mode, getter_condition, setter_condition,
    members, derived_from, getter_function, setter_function,
});
wire_struct!(PropertyMemberDecl { getter_condition, setter_condition, field });
wire_struct!(LoweredStatement { lowering_kind, block });
wire_struct!(PhiIncoming { from, value });
wire_struct!(PhiNode { target, incoming });
wire_struct!(CallDesc { callee, arguments });
wire_struct!(IoData {
    io_ref, field, target, data_type, attribute, size, lowered_statement,
});
wire_struct!(Identifier { name });
wire_struct!(StringLiteral { data });
wire_struct!(Alias { from, to, hint });
wire_struct!(DebugLoc { ident, file, line, column });

impl Wire for IoSize {
    fn encode(&self, w: &mut Writer) -> Result<()> {
        self.unit.encode(w)?;
        match &self.value {
            SizeValue::None => w.u8(0),
            SizeValue::Fixed { size } => {
                w.u8(1);
                w.varint(*size)?;
            }
            SizeValue::Dynamic { size_expr } => {
                w.u8(2);
                size_expr.encode(w)?;
            }
        }
        Ok(())
    }
    fn decode(r: &mut Reader) -> Result<Self> {
        let unit = SizeUnit::decode(r)?;
        let value = match r.u8()? {
            0 => SizeValue::None,
            1 => SizeValue::Fixed { size: r.varint()? },
            2 => SizeValue::Dynamic { size_expr: ExpressionRef::decode(r)? },
            tag => {
                return Err(FormatError::UnknownKind { family: "size_value", code: tag.into() })
            }
        };
        Ok(IoSize { unit, value })
    }
}

impl Wire for IoAttribute {
    fn encode(&self, w: &mut Writer) -> Result<()> {
        self.endian.encode(w)?;
        let flags = (self.signed as u8)
            | ((self.peek as u8) << 1)
            | ((self.has_lowered_statement as u8) << 2);
        w.u8(flags);
        self.dynamic_ref.encode(w)
    }
    fn decode(r: &mut Reader) -> Result<Self> {
        let endian = Endian::decode(r)?;
        let flags = r.u8()?;
        Ok(IoAttribute {
            endian,
            signed: flags & 1 != 0,
            peek: flags & 2 != 0,
            has_lowered_statement: flags & 4 != 0,
            dynamic_ref: StatementRef::decode(r)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Bodies
// ---------------------------------------------------------------------------

impl Wire for TypeBody {
    fn encode(&self, w: &mut Writer) -> Result<()> {
        self.kind().encode(w)?;
        match self {
            TypeBody::Int { size } | TypeBody::Uint { size } | TypeBody::Float { size } => {
                w.u8(*size);
                Ok(())
            }
            TypeBody::Enum { decl, base_type } => {
                decl.encode(w)?;
                base_type.encode(w)
            }
            TypeBody::Struct { decl } | TypeBody::RecursiveStruct { decl } => decl.encode(w),
            TypeBody::Array { element, length } => {
                element.encode(w)?;
                w.varint(*length)
            }
            TypeBody::Vector { element } => element.encode(w),
            TypeBody::Variant(desc) => desc.encode(w),
            TypeBody::Range { base_type } => base_type.encode(w),
            TypeBody::Function { params, return_type } => {
                params.encode(w)?;
                return_type.encode(w)
            }
            TypeBody::Optional { inner } => inner.encode(w),
            TypeBody::Ptr { pointee } => pointee.encode(w),
            TypeBody::Usize
            | TypeBody::Bool
            | TypeBody::Void
            | TypeBody::Meta
            | TypeBody::EncoderInput
            | TypeBody::DecoderInput
            | TypeBody::EncoderReturn
            | TypeBody::DecoderReturn
            | TypeBody::PropertySetterReturn => Ok(()),
        }
    }

    fn decode(r: &mut Reader) -> Result<Self> {
        Ok(match TypeKind::decode(r)? {
            TypeKind::Int => TypeBody::Int { size: r.u8()? },
            TypeKind::Uint => TypeBody::Uint { size: r.u8()? },
            TypeKind::Usize => TypeBody::Usize,
            TypeKind::Float => TypeBody::Float { size: r.u8()? },
            TypeKind::Bool => TypeBody::Bool,
            TypeKind::Void => TypeBody::Void,
            TypeKind::Meta => TypeBody::Meta,
            TypeKind::Enum => TypeBody::Enum {
                decl: Wire::decode(r)?,
                base_type: Wire::decode(r)?,
            },
            TypeKind::Struct => TypeBody::Struct { decl: Wire::decode(r)? },
            TypeKind::RecursiveStruct => TypeBody::RecursiveStruct { decl: Wire::decode(r)? },
            TypeKind::Array => TypeBody::Array {
                element: Wire::decode(r)?,
                length: r.varint()?,
            },
            TypeKind::Vector => TypeBody::Vector { element: Wire::decode(r)? },
            TypeKind::Variant => TypeBody::Variant(Wire::decode(r)?),
            TypeKind::Range => TypeBody::Range { base_type: Wire::decode(r)? },
            TypeKind::Function => TypeBody::Function {
                params: Wire::decode(r)?,
                return_type: Wire::decode(r)?,
            },
            TypeKind::EncoderInput => TypeBody::EncoderInput,
            TypeKind::DecoderInput => TypeBody::DecoderInput,
            TypeKind::EncoderReturn => TypeBody::EncoderReturn,
            TypeKind::DecoderReturn => TypeBody::DecoderReturn,
            TypeKind::PropertySetterReturn => TypeBody::PropertySetterReturn,
            TypeKind::Optional => TypeBody::Optional { inner: Wire::decode(r)? },
            TypeKind::Ptr => TypeBody::Ptr { pointee: Wire::decode(r)? },
        })
    }
}

impl Wire for StatementBody {
    fn encode(&self, w: &mut Writer) -> Result<()> {
        self.kind().encode(w)?;
        match self {
            StatementBody::Block { container } | StatementBody::ProgramDecl { container } => {
                container.encode(w)
            }
            StatementBody::IfStatement { condition, then_block, else_block } => {
                condition.encode(w)?;
                then_block.encode(w)?;
                else_block.encode(w)
            }
            StatementBody::LoopStatement(l) => l.encode(w),
            StatementBody::MatchStatement(m) => m.encode(w),
            StatementBody::MatchBranch(b) => b.encode(w),
            StatementBody::Break { related_loop } | StatementBody::Continue { related_loop } => {
                related_loop.encode(w)
            }
            StatementBody::Return { value, related_function } => {
                value.encode(w)?;
                related_function.encode(w)
            }
            StatementBody::Assignment { target, value } => {
                target.encode(w)?;
                value.encode(w)
            }
            StatementBody::VariableDecl(d) => d.encode(w),
            StatementBody::ParameterDecl(d) => d.encode(w),
            StatementBody::FieldDecl(d) => d.encode(w),
            StatementBody::CompositeFieldDecl(d) => d.encode(w),
            StatementBody::StructDecl(d) => d.encode(w),
            StatementBody::EnumDecl(d) => d.encode(w),
            StatementBody::EnumMemberDecl(d) => d.encode(w),
            StatementBody::FunctionDecl(d) => d.encode(w),
            StatementBody::PropertyDecl(d) => d.encode(w),
            StatementBody::PropertyMemberDecl(d) => d.encode(w),
            StatementBody::ReadData(d) | StatementBody::WriteData(d) => d.encode(w),
            StatementBody::Assert { condition, lowered_statement } => {
                condition.encode(w)?;
                lowered_statement.encode(w)
            }
            StatementBody::LengthCheck {
                check_kind,
                actual,
                limit,
                related_function,
                lowered_statement,
            } => {
                check_kind.encode(w)?;
                actual.encode(w)?;
                limit.encode(w)?;
                related_function.encode(w)?;
                lowered_statement.encode(w)
            }
            StatementBody::ErrorReport { message, arguments } => {
                message.encode(w)?;
                arguments.encode(w)
            }
            StatementBody::ErrorReturn { value } => value.encode(w),
            StatementBody::LoweredStatements { alternatives } => alternatives.encode(w),
            StatementBody::Expression { expression } => expression.encode(w),
            StatementBody::Metadata { name, values } => {
                name.encode(w)?;
                values.encode(w)
            }
            StatementBody::ImportModule { module_name } => module_name.encode(w),
            StatementBody::PhiNode(p) => p.encode(w),
        }
    }

    fn decode(r: &mut Reader) -> Result<Self> {
        Ok(match StatementKind::decode(r)? {
            StatementKind::Block => StatementBody::Block { container: Wire::decode(r)? },
            StatementKind::IfStatement => StatementBody::IfStatement {
                condition: Wire::decode(r)?,
                then_block: Wire::decode(r)?,
                else_block: Wire::decode(r)?,
            },
            StatementKind::LoopStatement => StatementBody::LoopStatement(Wire::decode(r)?),
            StatementKind::MatchStatement => StatementBody::MatchStatement(Wire::decode(r)?),
            StatementKind::MatchBranch => StatementBody::MatchBranch(Wire::decode(r)?),
            StatementKind::Break => StatementBody::Break { related_loop: Wire::decode(r)? },
            StatementKind::Continue => StatementBody::Continue { related_loop: Wire::decode(r)? },
            StatementKind::Return => StatementBody::Return {
                value: Wire::decode(r)?,
                related_function: Wire::decode(r)?,
            },
            StatementKind::Assignment => StatementBody::Assignment {
                target: Wire::decode(r)?,
                value: Wire::decode(r)?,
            },
            StatementKind::VariableDecl => StatementBody::VariableDecl(Wire::decode(r)?),
            StatementKind::ParameterDecl => StatementBody::ParameterDecl(Wire::decode(r)?),
            StatementKind::FieldDecl => StatementBody::FieldDecl(Wire::decode(r)?),
            StatementKind::CompositeFieldDecl => {
                StatementBody::CompositeFieldDecl(Wire::decode(r)?)
            }
            StatementKind::StructDecl => StatementBody::StructDecl(Wire::decode(r)?),
            StatementKind::EnumDecl => StatementBody::EnumDecl(Wire::decode(r)?),
            StatementKind::EnumMemberDecl => StatementBody::EnumMemberDecl(Wire::decode(r)?),
            StatementKind::FunctionDecl => StatementBody::FunctionDecl(Wire::decode(r)?),
            StatementKind::PropertyDecl => StatementBody::PropertyDecl(Wire::decode(r)?),
            StatementKind::PropertyMemberDecl => {
                StatementBody::PropertyMemberDecl(Wire::decode(r)?)
            }
            StatementKind::ReadData => StatementBody::ReadData(Wire::decode(r)?),
            StatementKind::WriteData => StatementBody::WriteData(Wire::decode(r)?),
            StatementKind::Assert => StatementBody::Assert {
                condition: Wire::decode(r)?,
                lowered_statement: Wire::decode(r)?,
            },
            StatementKind::LengthCheck => StatementBody::LengthCheck {
                check_kind: Wire::decode(r)?,
                actual: Wire::decode(r)?,
                limit: Wire::decode(r)?,
                related_function: Wire::decode(r)?,
                lowered_statement: Wire::decode(r)?,
            },
            StatementKind::ErrorReport => StatementBody::ErrorReport {
                message: Wire::decode(r)?,
                arguments: Wire::decode(r)?,
            },
            StatementKind::ErrorReturn => StatementBody::ErrorReturn { value: Wire::decode(r)? },
            StatementKind::LoweredStatements => {
                StatementBody::LoweredStatements { alternatives: Wire::decode(r)? }
            }
            StatementKind::Expression => {
                StatementBody::Expression { expression: Wire::decode(r)? }
            }
            StatementKind::ProgramDecl => StatementBody::ProgramDecl { container: Wire::decode(r)? },
            StatementKind::Metadata => StatementBody::Metadata {
                name: Wire::decode(r)?,
                values: Wire::decode(r)?,
            },
            StatementKind::ImportModule => {
                StatementBody::ImportModule { module_name: Wire::decode(r)? }
            }
            StatementKind::PhiNode => StatementBody::PhiNode(Wire::decode(r)?),
        })
    }
}

impl Wire for ExpressionBody {
    fn encode(&self, w: &mut Writer) -> Result<()> {
        self.kind().encode(w)?;
        self.ty.encode(w)?;
        match &self.op {
            ExprOp::LiteralInt { value } => w.varint(*value),
            ExprOp::LiteralBool { value } => value.encode(w),
            ExprOp::LiteralString { value } => value.encode(w),
            ExprOp::LiteralType { type_ref } => type_ref.encode(w),
            ExprOp::Identifier { decl } => decl.encode(w),
            ExprOp::BinaryOp { op, left, right } => {
                op.encode(w)?;
                left.encode(w)?;
                right.encode(w)
            }
            ExprOp::UnaryOp { op, operand } => {
                op.encode(w)?;
                operand.encode(w)
            }
            ExprOp::IndexAccess { base, index } => {
                base.encode(w)?;
                index.encode(w)
            }
            ExprOp::MemberAccess { base, member } => {
                base.encode(w)?;
                member.encode(w)
            }
            ExprOp::TypeCast { source, from_type, cast_kind, cast_function } => {
                source.encode(w)?;
                from_type.encode(w)?;
                cast_kind.encode(w)?;
                cast_function.encode(w)
            }
            ExprOp::Range { start, end } => {
                start.encode(w)?;
                end.encode(w)
            }
            ExprOp::Call(desc) => desc.encode(w),
            ExprOp::ArraySize { array } => array.encode(w),
            ExprOp::MaxValue { lowered } => lowered.encode(w),
            ExprOp::DefaultValue | ExprOp::NewObject => Ok(()),
            ExprOp::IsLittleEndian { dynamic_ref } => dynamic_ref.encode(w),
            ExprOp::IsError { target } => target.encode(w),
            ExprOp::GetStreamOffset { stream, unit } => {
                stream.encode(w)?;
                unit.encode(w)
            }
            ExprOp::GetRemainingBytes { stream } => stream.encode(w),
            ExprOp::CanReadStream { stream, size } => {
                stream.encode(w)?;
                size.encode(w)
            }
            ExprOp::ReadData { target_decl, io_statement } => {
                target_decl.encode(w)?;
                io_statement.encode(w)
            }
            ExprOp::WriteData { target, io_statement } => {
                target.encode(w)?;
                io_statement.encode(w)
            }
            ExprOp::ConditionalStatement { target_decl, statement } => {
                target_decl.encode(w)?;
                statement.encode(w)
            }
            ExprOp::Addressof { target } | ExprOp::Optionalof { target } => target.encode(w),
            ExprOp::SetterStatus { status } => status.encode(w),
            ExprOp::OrCond { conditions } => conditions.encode(w),
        }
    }

    fn decode(r: &mut Reader) -> Result<Self> {
        let kind = ExpressionKind::decode(r)?;
        let ty = TypeRef::decode(r)?;
        let op = match kind {
            ExpressionKind::LiteralInt => ExprOp::LiteralInt { value: r.varint()? },
            ExpressionKind::LiteralBool => ExprOp::LiteralBool { value: Wire::decode(r)? },
            ExpressionKind::LiteralString => ExprOp::LiteralString { value: Wire::decode(r)? },
            ExpressionKind::LiteralType => ExprOp::LiteralType { type_ref: Wire::decode(r)? },
            ExpressionKind::Identifier => ExprOp::Identifier { decl: Wire::decode(r)? },
            ExpressionKind::BinaryOp => ExprOp::BinaryOp {
                op: Wire::decode(r)?,
                left: Wire::decode(r)?,
                right: Wire::decode(r)?,
            },
            ExpressionKind::UnaryOp => ExprOp::UnaryOp {
                op: Wire::decode(r)?,
                operand: Wire::decode(r)?,
            },
            ExpressionKind::IndexAccess => ExprOp::IndexAccess {
                base: Wire::decode(r)?,
                index: Wire::decode(r)?,
            },
            ExpressionKind::MemberAccess => ExprOp::MemberAccess {
                base: Wire::decode(r)?,
                member: Wire::decode(r)?,
            },
            ExpressionKind::TypeCast => ExprOp::TypeCast {
                source: Wire::decode(r)?,
                from_type: Wire::decode(r)?,
                cast_kind: Wire::decode(r)?,
                cast_function: Wire::decode(r)?,
            },
            ExpressionKind::Range => ExprOp::Range {
                start: Wire::decode(r)?,
                end: Wire::decode(r)?,
            },
            ExpressionKind::Call => ExprOp::Call(Wire::decode(r)?),
            ExpressionKind::ArraySize => ExprOp::ArraySize { array: Wire::decode(r)? },
            ExpressionKind::MaxValue => ExprOp::MaxValue { lowered: Wire::decode(r)? },
            ExpressionKind::DefaultValue => ExprOp::DefaultValue,
            ExpressionKind::IsLittleEndian => {
                ExprOp::IsLittleEndian { dynamic_ref: Wire::decode(r)? }
            }
            ExpressionKind::IsError => ExprOp::IsError { target: Wire::decode(r)? },
            ExpressionKind::GetStreamOffset => ExprOp::GetStreamOffset {
                stream: Wire::decode(r)?,
                unit: Wire::decode(r)?,
            },
            ExpressionKind::GetRemainingBytes => {
                ExprOp::GetRemainingBytes { stream: Wire::decode(r)? }
            }
            ExpressionKind::CanReadStream => ExprOp::CanReadStream {
                stream: Wire::decode(r)?,
                size: Wire::decode(r)?,
            },
            ExpressionKind::NewObject => ExprOp::NewObject,
            ExpressionKind::ReadData => ExprOp::ReadData {
                target_decl: Wire::decode(r)?,
                io_statement: Wire::decode(r)?,
            },
            ExpressionKind::WriteData => ExprOp::WriteData {
                target: Wire::decode(r)?,
                io_statement: Wire::decode(r)?,
            },
            ExpressionKind::ConditionalStatement => ExprOp::ConditionalStatement {
                target_decl: Wire::decode(r)?,
                statement: Wire::decode(r)?,
            },
            ExpressionKind::Addressof => ExprOp::Addressof { target: Wire::decode(r)? },
            ExpressionKind::Optionalof => ExprOp::Optionalof { target: Wire::decode(r)? },
            ExpressionKind::SetterStatus => ExprOp::SetterStatus { status: Wire::decode(r)? },
            ExpressionKind::OrCond => ExprOp::OrCond { conditions: Wire::decode(r)? },
        };
        Ok(ExpressionBody { ty, op })
    }
}

// ---------------------------------------------------------------------------
// Entries and the module
// ---------------------------------------------------------------------------

fn encode_arena<R: RefId + Wire, B: Wire>(w: &mut Writer, arena: &Arena<R, B>) -> Result<()> {
    w.varint(arena.len() as u64)?;
    for entry in arena.entries() {
        w.varint(entry.id.value())?;
        let mut body = Writer::default();
        entry.body.encode(&mut body)?;
        w.bytes(&body.buf)?;
    }
    Ok(())
}

fn decode_arena<R: RefId + Wire, B: Wire>(r: &mut Reader) -> Result<Arena<R, B>> {
    let len = r.varint()? as usize;
    let mut entries = Vec::with_capacity(len.min(4096));
    for _ in 0..len {
        let id = R::from_value(r.varint()?);
        let body_bytes = r.bytes()?;
        let mut body_reader = Reader::new(&body_bytes);
        let body = B::decode(&mut body_reader)?;
        if !body_reader.at_end() {
            return Err(FormatError::LengthMismatch {
                what: format!("entry {} body", id.value()),
                declared: body_bytes.len() as u64,
                found: body_reader.pos as u64,
            });
        }
        entries.push(ebmc_core::Entry { id, body });
    }
    Ok(Arena::from_entries(entries))
}

/// Serializes a module into the EBM binary format.
pub fn encode_module(module: &Module) -> Result<Vec<u8>> {
    let mut w = Writer::default();
    w.u8(FORMAT_VERSION);
    w.varint(module.max_id())?;
    encode_arena(&mut w, &module.identifiers)?;
    encode_arena(&mut w, &module.strings)?;
    encode_arena(&mut w, &module.types)?;
    encode_arena(&mut w, &module.statements)?;
    encode_arena(&mut w, &module.expressions)?;
    module.aliases().to_vec().encode(&mut w)?;
    module.debug_files.encode(&mut w)?;
    module.debug_locs.to_vec().encode(&mut w)?;
    Ok(w.buf)
}

/// Parses the EBM binary format back into a module.
pub fn decode_module(data: &[u8]) -> Result<Module> {
    let mut r = Reader::new(data);
    let version = r.u8()?;
    if version != FORMAT_VERSION {
        return Err(FormatError::UnsupportedVersion { version });
    }
    let max_id = r.varint()?;
    let mut module = Module::new();
    module.identifiers = decode_arena(&mut r)?;
    module.strings = decode_arena(&mut r)?;
    module.types = decode_arena(&mut r)?;
    module.statements = decode_arena(&mut r)?;
    module.expressions = decode_arena(&mut r)?;
    module.set_aliases(Wire::decode(&mut r)?);
    module.debug_files = Wire::decode(&mut r)?;
    module.debug_locs = Wire::decode(&mut r)?;
    module.set_max_id(max_id);
    if !r.at_end() {
        return Err(FormatError::LengthMismatch {
            what: "module".into(),
            declared: data.len() as u64,
            found: r.pos as u64,
        });
    }
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ebmc_core::ops::SizeUnit;

    fn sample_module() -> Module {
        let mut m = Module::new();
        let u8t = m.add_type(TypeBody::Uint { size: 8 }).unwrap();
        let name = m.add_identifier("payload").unwrap();
        let lit = m
            .add_expression(ExpressionBody::new(u8t, ExprOp::LiteralInt { value: 0xAB }))
            .unwrap();
        let field = m
            .add_statement(StatementBody::FieldDecl(FieldDecl {
                name,
                field_type: u8t,
                ..FieldDecl::default()
            }))
            .unwrap();
        let io = m
            .add_statement(StatementBody::WriteData(IoData {
                field,
                target: lit,
                data_type: u8t,
                size: IoSize::fixed(1, SizeUnit::ByteFixed),
                ..IoData::default()
            }))
            .unwrap();
        m.statements
            .add_with_id(StatementRef::ENTRY, StatementBody::Block { container: vec![io] })
            .unwrap();
        m
    }

    #[test]
    fn module_roundtrip_is_structural_identity() {
        let module = sample_module();
        let bytes = encode_module(&module).unwrap();
        let back = decode_module(&bytes).unwrap();
        assert_eq!(module.max_id(), back.max_id());
        assert_eq!(module.types.entries(), back.types.entries());
        assert_eq!(module.statements.entries(), back.statements.entries());
        assert_eq!(module.expressions.entries(), back.expressions.entries());
        assert_eq!(module.identifiers.entries(), back.identifiers.entries());
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let mut bytes = encode_module(&sample_module()).unwrap();
        bytes[0] = 99;
        assert!(matches!(
            decode_module(&bytes),
            Err(FormatError::UnsupportedVersion { version: 99 })
        ));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let mut bytes = encode_module(&sample_module()).unwrap();
        bytes.push(0);
        assert!(decode_module(&bytes).is_err());
    }

    #[test]
    fn body_starts_with_kind_code() {
        let mut w = Writer::default();
        TypeBody::Uint { size: 16 }.encode(&mut w).unwrap();
        // UINT is the second kind in declaration order
        assert_eq!(&w.buf[..2], &[0, 1]);
        assert_eq!(w.buf[2], 16);
    }
}
