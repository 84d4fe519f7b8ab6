//! Per-field-type decode lowering.
//!
//! Mirrors the encode side, with the extra open-vector shapes: read-to-end,
//! eventual-end with a fixed tail, and constant-terminated.

use ebmc_ast::{decode_base64, Follow, Node, NodeId};
use ebmc_core::{
    BinaryOp, ExprOp, ExpressionRef, IoAttribute, IoData, IoSize, LoopKind, LoopStatement,
    LoweringKind, SizeUnit, StatementBody, StatementRef, StreamKind, TypeBody, TypeRef,
};

use crate::build::{make_io_data, Build};
use crate::context::Converter;
use crate::error::{ConvertError, Result};

impl Converter<'_> {
    /// Decodes one field of the given AST type into `base`.
    pub(crate) fn decode_field_type(
        &mut self,
        ty_node: NodeId,
        base: ExpressionRef,
        field: Option<NodeId>,
    ) -> Result<StatementBody> {
        let resolved = self.ast.resolve_type(ty_node);
        let data_type = self.convert_type(resolved, field)?;
        let (io_ref, _) = self.current_stream()?;
        let field_ref = match field {
            Some(f) => self.convert_decl(f)?,
            None => StatementRef::NIL,
        };
        let mut io = make_io_data(
            io_ref,
            field_ref,
            base,
            data_type,
            IoAttribute::default(),
            IoSize::default(),
        );
        let mut lowered: Vec<(LoweringKind, StatementRef)> = Vec::new();

        match self.node(resolved).clone() {
            Node::IntType { bit_size, endian, is_signed } => {
                io.attribute = self.io_attribute(endian, is_signed);
                io.size = self.io_size_for_bits(u64::from(bit_size));
                if io.size.unit == SizeUnit::ByteFixed {
                    let block = self.decode_multi_byte_int(
                        u64::from(bit_size) / 8,
                        io.attribute,
                        io_ref,
                        base,
                        data_type,
                    )?;
                    lowered.push((LoweringKind::IntToByteArray, block));
                }
            }
            Node::FloatType { bit_size, endian } => {
                io.attribute = self.io_attribute(endian, false);
                io.size = self.io_size_for_bits(u64::from(bit_size));
                if io.size.unit == SizeUnit::ByteFixed {
                    let block = self.decode_multi_byte_int(
                        u64::from(bit_size) / 8,
                        io.attribute,
                        io_ref,
                        base,
                        data_type,
                    )?;
                    lowered.push((LoweringKind::IntToByteArray, block));
                }
            }
            Node::EnumType { base: enum_node } => {
                let base_type_node = match self.node(enum_node) {
                    Node::Enum { base_type: Some(bt), .. } => *bt,
                    Node::Enum { base_type: None, .. } => {
                        return Err(ConvertError::unsupported(
                            "decoding an enum without a base type",
                        ))
                    }
                    _ => {
                        return Err(ConvertError::MissingInput { node: "enum_type", field: "base" })
                    }
                };
                let base_t = self.convert_type(base_type_node, None)?;
                let init = self.default_value(base_t)?;
                let (tmp, tmp_def) = self.define_anon_var(base_t, init)?;
                let inner_body = self.decode_field_type(base_type_node, tmp, None)?;
                let (attr, size) = match &inner_body {
                    StatementBody::ReadData(d) => (d.attribute, d.size.clone()),
                    _ => (IoAttribute::default(), IoSize::default()),
                };
                let inner = self.add_stmt(inner_body)?;
                let casted = self.cast(data_type, base_t, tmp)?;
                let assign = self.assign(base, casted)?;
                let block = self.block(vec![tmp_def, inner, assign])?;
                io.attribute = attr;
                io.size = size;
                lowered.push((LoweringKind::EnumToBaseInt, block));
            }
            Node::StrLiteralType { base: lit, .. } => {
                // read the magic and assert each byte matches the literal
                let bytes = match self.node(lit) {
                    Node::StrLiteral { value, .. } => decode_base64(value)?,
                    _ => {
                        return Err(ConvertError::MissingInput {
                            node: "str_literal_type",
                            field: "base",
                        })
                    }
                };
                io.size = IoSize::fixed(bytes.len() as u64, SizeUnit::ByteFixed);
                let buffer_type = self.u8_array_type(bytes.len() as u64)?;
                let init = self.default_value(buffer_type)?;
                let (buffer, buffer_def) = self.define_anon_var(buffer_type, init)?;
                let read = self.add_stmt(StatementBody::ReadData(make_io_data(
                    io_ref,
                    field_ref,
                    buffer,
                    buffer_type,
                    io.attribute,
                    io.size.clone(),
                )))?;
                let mut container = vec![buffer_def, read];
                let u8t = self.uint_type(8)?;
                let bool_type = self.bool_type()?;
                for (i, byte) in bytes.iter().enumerate() {
                    let index = self.int_literal(i as u64)?;
                    let expected = self.int_literal(u64::from(*byte))?;
                    let actual = self.index(u8t, buffer, index)?;
                    let eq = self.binary(BinaryOp::Equal, bool_type, actual, expected)?;
                    container.push(self.assert_stmt(eq)?);
                }
                let block = self.block(container)?;
                lowered.push((LoweringKind::StringForEach, block));
            }
            Node::ArrayType { element_type, length, length_value } => {
                self.decode_array_type(
                    &mut io,
                    element_type,
                    length,
                    length_value,
                    base,
                    field,
                    &mut lowered,
                )?;
            }
            Node::StructType { base: Some(format_node), bit_size, .. } => {
                self.coder_call(&mut io, format_node, bit_size, base, false, &mut lowered)?;
            }
            other => {
                return Err(ConvertError::unsupported(format!(
                    "decoding a {} field",
                    other.name()
                )))
            }
        }

        if io.size.unit == SizeUnit::Unknown {
            return Err(ConvertError::internal(
                "decode lowering left the I/O size unknown".to_string(),
            ));
        }
        if !lowered.is_empty() {
            io.attribute.has_lowered_statement = true;
            io.lowered_statement = self.lowered_statements(lowered)?;
        }
        Ok(StatementBody::ReadData(io))
    }

    /// The fixed-array lowering of a whole-byte integer read:
    /// `value |= (buffer[i] << (8 * shift_index))` per byte.
    pub(crate) fn decode_multi_byte_int(
        &mut self,
        n: u64,
        attribute: IoAttribute,
        io_ref: StatementRef,
        to: ExpressionRef,
        cast_to: TypeRef,
    ) -> Result<StatementRef> {
        let buffer_type = self.u8_array_type(n)?;
        let init = self.default_value(buffer_type)?;
        let (buffer, buffer_def) = self.define_anon_var(buffer_type, init)?;
        let value_type = self.uint_type((n * 8) as u8)?;
        let u8t = self.uint_type(8)?;
        let io_size = IoSize::fixed(n, SizeUnit::ByteFixed);
        let read = self.add_stmt(StatementBody::ReadData(make_io_data(
            io_ref,
            StatementRef::NIL,
            buffer,
            buffer_type,
            attribute,
            io_size,
        )))?;

        if n == 1 {
            let zero = self.int_literal(0)?;
            let byte = self.index(u8t, buffer, zero)?;
            let casted = self.cast(cast_to, u8t, byte)?;
            let assign = self.assign(to, casted)?;
            return self.block(vec![buffer_def, read, assign]);
        }

        let zero = self.default_value(value_type)?;
        let (holder, holder_def) = self.define_anon_var(value_type, zero)?;
        let counter_type = self.counter_type()?;
        let (counter, counter_def) = self.counter_loop_start()?;
        let eight = self.int_literal(8)?;

        let load_byte = |c: &mut Self, shift_index: ExpressionRef| -> Result<StatementRef> {
            let shift = c.binary(BinaryOp::Mul, counter_type, shift_index, eight)?;
            let byte = c.index(u8t, buffer, counter)?;
            let widened = c.cast(value_type, u8t, byte)?;
            let shifted = c.binary(BinaryOp::LeftShift, value_type, widened, shift)?;
            let merged = c.binary(BinaryOp::BitOr, value_type, holder, shifted)?;
            c.assign(holder, merged)
        };

        let body = self.add_endian_specific(
            attribute,
            |c| load_byte(c, counter),
            |c| {
                let n_minus_one = c.int_literal(n - 1)?;
                let shift_index = c.binary(BinaryOp::Sub, counter_type, n_minus_one, counter)?;
                load_byte(c, shift_index)
            },
        )?;

        let limit = self.int_literal(n)?;
        let loop_stmt = self.counter_loop_end(counter, limit, body)?;
        let casted = self.cast(cast_to, value_type, holder)?;
        let assign = self.assign(to, casted)?;
        self.block(vec![holder_def, buffer_def, counter_def, read, loop_stmt, assign])
    }

    #[allow(clippy::too_many_arguments)]
    fn decode_array_type(
        &mut self,
        io: &mut IoData,
        element_type: NodeId,
        length: Option<NodeId>,
        length_value: Option<u64>,
        base: ExpressionRef,
        field: Option<NodeId>,
        lowered: &mut Vec<(LoweringKind, StatementRef)>,
    ) -> Result<()> {
        let element_t = self.convert_type(element_type, None)?;
        let is_byte = matches!(
            self.module.get_type(element_t).map(|e| &e.body),
            Some(TypeBody::Uint { size: 8 })
        );
        let fixed_unit = if is_byte { SizeUnit::ByteFixed } else { SizeUnit::ElementFixed };
        let dynamic_unit = if is_byte { SizeUnit::ByteDynamic } else { SizeUnit::ElementDynamic };

        // fixed-length arrays decode in place; vectors append
        let mut fixed_length: Option<ExpressionRef> = None;
        let mut dynamic_length: Option<ExpressionRef> = None;
        let mut cond_loop: Option<StatementRef> = None;

        if let Some(n) = length_value {
            io.size = IoSize::fixed(n, fixed_unit);
            fixed_length = Some(self.int_literal(n)?);
        } else if self.is_open_range(length) {
            let field_id = field.ok_or_else(|| {
                ConvertError::unsupported("open-length vector outside a field")
            })?;
            let (follow, eventual_follow, sub_byte, next) = match self.node(field_id) {
                Node::Field { follow, eventual_follow, arguments, next, .. } => (
                    *follow,
                    *eventual_follow,
                    arguments.as_ref().is_some_and(|a| a.sub_byte_length),
                    *next,
                ),
                _ => (Follow::Unknown, Follow::Unknown, false, None),
            };
            if let Some(align_bits) = self.alignment_vector_bits(field) {
                let required = self.alignment_requirement(align_bits / 8, StreamKind::Input)?;
                io.size = IoSize::dynamic(required, dynamic_unit);
                dynamic_length = Some(required);
            } else if follow == Follow::End || sub_byte {
                // while one more byte is readable, decode and append
                let bool_type = self.bool_type()?;
                let can_read = self.add_expr(
                    bool_type,
                    ExprOp::CanReadStream {
                        stream: StreamKind::Input,
                        size: IoSize::fixed(1, SizeUnit::ByteFixed),
                    },
                )?;
                let element = self.decode_one_element(element_type, element_t, base, None)?;
                cond_loop = Some(self.while_loop(can_read, element)?);
                let counter_type = self.counter_type()?;
                let remain = self.add_expr(
                    counter_type,
                    ExprOp::GetRemainingBytes { stream: StreamKind::Input },
                )?;
                io.size = IoSize::dynamic(remain, dynamic_unit);
            } else if eventual_follow == Follow::End && follow == Follow::Fixed {
                let tail_bits = field
                    .and_then(|f| match self.node(f) {
                        Node::Field { belong_struct: Some(bs), .. } => Some(*bs),
                        _ => None,
                    })
                    .and_then(|bs| match self.node(bs) {
                        Node::StructType { fixed_tail_size, .. } => Some(*fixed_tail_size),
                        _ => None,
                    })
                    .ok_or_else(|| {
                        ConvertError::MissingInput { node: "field", field: "belong_struct" }
                    })?;
                let counter_type = self.counter_type()?;
                let bool_type = self.bool_type()?;
                let tail = self.int_literal(tail_bits / 8)?;
                let remain = self.add_expr(
                    counter_type,
                    ExprOp::GetRemainingBytes { stream: StreamKind::Input },
                )?;
                let cond = self.binary(BinaryOp::Greater, bool_type, remain, tail)?;
                let element = self.decode_one_element(element_type, element_t, base, None)?;
                cond_loop = Some(self.while_loop(cond, element)?);
                let usable = self.binary(BinaryOp::Sub, counter_type, remain, tail)?;
                io.size = IoSize::dynamic(usable, dynamic_unit);
            } else if follow == Follow::Constant {
                let loop_ref =
                    self.decode_until_terminator(io, next, element_type, element_t, base)?;
                cond_loop = Some(loop_ref);
            } else {
                return Err(ConvertError::unsupported(format!(
                    "open vector with follow {follow:?}/{eventual_follow:?}"
                )));
            }
        } else {
            let length = length.ok_or(ConvertError::MissingInput {
                node: "array_type",
                field: "length",
            })?;
            let len = self.convert_expr(length)?;
            let len_type = self
                .module
                .get_expression(len)
                .map(|e| e.body.ty)
                .unwrap_or(TypeRef::NIL);
            let counter_type = self.counter_type()?;
            let casted = self.cast(counter_type, len_type, len)?;
            io.size = IoSize::dynamic(casted, dynamic_unit);
            dynamic_length = Some(casted);
        }

        let loop_stmt = if let Some(cond_loop) = cond_loop {
            cond_loop
        } else {
            let limit = fixed_length.or(dynamic_length).ok_or_else(|| {
                ConvertError::internal("vector decode derived no length".to_string())
            })?;
            let (counter, counter_def) = self.counter_loop_start()?;
            let indexed = if fixed_length.is_some() { Some(counter) } else { None };
            let element = self.decode_one_element(element_type, element_t, base, indexed)?;
            let loop_stmt = self.counter_loop_end(counter, limit, element)?;
            self.block(vec![counter_def, loop_stmt])?
        };
        lowered.push((LoweringKind::ArrayForEach, loop_stmt));
        Ok(())
    }

    /// Decodes one element, either in place at `base[index]` (fixed arrays)
    /// or into a temporary that is appended (vectors).
    fn decode_one_element(
        &mut self,
        element_type: NodeId,
        element_t: TypeRef,
        base: ExpressionRef,
        index: Option<ExpressionRef>,
    ) -> Result<StatementRef> {
        match index {
            Some(index) => {
                let slot = self.index(element_t, base, index)?;
                let name = self.module.add_anonymous_identifier()?;
                let (element, element_def) =
                    self.define_var(name, element_t, slot, false, true)?;
                let inner = self.decode_field_type(element_type, element, None)?;
                let inner = self.add_stmt(inner)?;
                self.block(vec![element_def, inner])
            }
            None => {
                let init = self.default_value(element_t)?;
                let (tmp, tmp_def) = self.define_anon_var(element_t, init)?;
                let inner = self.decode_field_type(element_type, tmp, None)?;
                let inner = self.add_stmt(inner)?;
                let appended = self.append_element(base, element_t, tmp)?;
                self.block(vec![tmp_def, inner, appended])
            }
        }
    }

    /// Constant-terminated vector: peek the terminator's width each pass,
    /// break on match, otherwise decode one element and append.
    fn decode_until_terminator(
        &mut self,
        io: &mut IoData,
        next_field: Option<NodeId>,
        element_type: NodeId,
        element_t: TypeRef,
        base: ExpressionRef,
    ) -> Result<StatementRef> {
        let next = next_field.ok_or(ConvertError::MissingInput { node: "field", field: "next" })?;
        let terminator = match self.node(next) {
            Node::Field { field_type, .. } => {
                let resolved = self.ast.resolve_type(*field_type);
                match self.node(resolved) {
                    Node::StrLiteralType { base, .. } => match self.node(*base) {
                        Node::StrLiteral { value, .. } => decode_base64(value)?,
                        _ => {
                            return Err(ConvertError::MissingInput {
                                node: "str_literal_type",
                                field: "base",
                            })
                        }
                    },
                    other => {
                        return Err(ConvertError::unsupported(format!(
                            "vector terminated by {}",
                            other.name()
                        )))
                    }
                }
            }
            _ => return Err(ConvertError::MissingInput { node: "field", field: "next" }),
        };

        io.size = IoSize { unit: SizeUnit::Dynamic, ..IoSize::default() };

        let buffer_type = self.u8_array_type(terminator.len() as u64)?;
        let init = self.default_value(buffer_type)?;
        let (buffer, buffer_def) = self.define_anon_var(buffer_type, init)?;
        let mut peek_io = make_io_data(
            io.io_ref,
            io.field,
            buffer,
            buffer_type,
            io.attribute,
            IoSize::fixed(terminator.len() as u64, SizeUnit::ByteFixed),
        );
        peek_io.attribute.peek = true;
        let peek = self.add_stmt(StatementBody::ReadData(peek_io))?;

        let u8t = self.uint_type(8)?;
        let bool_type = self.bool_type()?;
        let mut cond: Option<ExpressionRef> = None;
        for (i, byte) in terminator.iter().enumerate() {
            let index = self.int_literal(i as u64)?;
            let expected = self.int_literal(u64::from(*byte))?;
            let actual = self.index(u8t, buffer, index)?;
            let check = self.binary(BinaryOp::Equal, bool_type, actual, expected)?;
            cond = Some(match cond {
                Some(prev) => self.binary(BinaryOp::LogicalAnd, bool_type, prev, check)?,
                None => check,
            });
        }
        let cond = cond
            .ok_or_else(|| ConvertError::internal("empty vector terminator".to_string()))?;

        let loop_id = self.module.reserve_statement_id()?;
        let brk = self.add_stmt(StatementBody::Break { related_loop: loop_id })?;
        let stop = self.if_stmt(cond, brk, StatementRef::NIL)?;
        let element = self.decode_one_element(element_type, element_t, base, None)?;
        let body = self.block(vec![buffer_def, peek, stop, element])?;
        let loop_stmt = StatementBody::LoopStatement(LoopStatement {
            loop_kind: LoopKind::Infinite,
            body,
            ..LoopStatement::default()
        });
        Ok(self.module.statements.add_with_id(loop_id, loop_stmt)?)
    }
}
