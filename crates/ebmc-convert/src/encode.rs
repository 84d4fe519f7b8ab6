//! Per-field-type encode lowering.
//!
//! Every field produces one `WRITE_DATA` carrying an `IoData`; when the
//! operation has no native equivalent on some targets, a lowered block with
//! a portable primitive sequence rides along.

use ebmc_ast::{decode_base64, AstEndian, Node, NodeId};
use ebmc_core::{
    BinaryOp, Endian, ExpressionRef, IoAttribute, IoData, IoSize, LoweringKind, SizeUnit,
    StatementBody, StatementRef, StreamKind, TypeBody, TypeRef,
};

use crate::build::{make_io_data, Build};
use crate::context::Converter;
use crate::error::{ConvertError, Result};

impl Converter<'_> {
    /// Maps a declared endian to a resolved I/O attribute.
    pub(crate) fn io_attribute(&self, declared: AstEndian, signed: bool) -> IoAttribute {
        let declared = match declared {
            AstEndian::Unspec => Endian::Unspec,
            AstEndian::Little => Endian::Little,
            AstEndian::Big => Endian::Big,
            AstEndian::Native => Endian::Native,
            AstEndian::Dynamic => Endian::Dynamic,
        };
        let (endian, dynamic_ref) = self.resolved_endian(declared);
        IoAttribute { endian, signed, dynamic_ref, ..IoAttribute::default() }
    }

    /// `..` (fully open) range used as a vector length.
    pub(crate) fn is_open_range(&self, length: Option<NodeId>) -> bool {
        match length {
            Some(id) => matches!(
                self.node(id),
                Node::Range { start: None, end: None, .. }
            ),
            None => false,
        }
    }

    /// Encodes one field of the given AST type into `base`.
    pub(crate) fn encode_field_type(
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
                    let block = self.encode_multi_byte_int(
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
                    let block = self.encode_multi_byte_int(
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
                            "encoding an enum without a base type",
                        ))
                    }
                    _ => {
                        return Err(ConvertError::MissingInput { node: "enum_type", field: "base" })
                    }
                };
                let base_t = self.convert_type(base_type_node, None)?;
                let casted = self.cast(base_t, data_type, base)?;
                let inner_body = self.encode_field_type(base_type_node, casted, None)?;
                let (attr, size) = match &inner_body {
                    StatementBody::WriteData(d) => (d.attribute, d.size.clone()),
                    _ => (IoAttribute::default(), IoSize::default()),
                };
                let inner = self.add_stmt(inner_body)?;
                io.attribute = attr;
                io.size = size;
                lowered.push((LoweringKind::EnumToBaseInt, inner));
            }
            Node::StrLiteralType { base: lit, .. } => {
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
                let init = self.new_object(buffer_type)?;
                let (buffer, buffer_def) = self.define_anon_var(buffer_type, init)?;
                let mut container = vec![buffer_def];
                self.construct_string_array(&mut container, buffer, &bytes)?;
                let write = self.add_stmt(StatementBody::WriteData(make_io_data(
                    io_ref,
                    field_ref,
                    buffer,
                    buffer_type,
                    io.attribute,
                    io.size.clone(),
                )))?;
                container.push(write);
                let block = self.block(container)?;
                lowered.push((LoweringKind::StringForEach, block));
            }
            Node::ArrayType { element_type, length, length_value } => {
                self.encode_array_type(
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
                self.coder_call(
                    &mut io,
                    format_node,
                    bit_size,
                    base,
                    true,
                    &mut lowered,
                )?;
            }
            other => {
                return Err(ConvertError::unsupported(format!(
                    "encoding a {} field",
                    other.name()
                )))
            }
        }

        if io.size.unit == SizeUnit::Unknown {
            return Err(ConvertError::internal(
                "encode lowering left the I/O size unknown".to_string(),
            ));
        }
        if !lowered.is_empty() {
            io.attribute.has_lowered_statement = true;
            io.lowered_statement = self.lowered_statements(lowered)?;
        }
        Ok(StatementBody::WriteData(io))
    }

    /// The fixed-array lowering of a whole-byte integer write:
    /// `buffer[i] = (value >> (8 * shift_index)) & 0xFF` per byte, then one
    /// buffer write. `shift_index` is `i` little-endian, `n-1-i` big-endian.
    pub(crate) fn encode_multi_byte_int(
        &mut self,
        n: u64,
        attribute: IoAttribute,
        io_ref: StatementRef,
        from: ExpressionRef,
        cast_from: TypeRef,
    ) -> Result<StatementRef> {
        let buffer_type = self.u8_array_type(n)?;
        let init = self.new_object(buffer_type)?;
        let (buffer, buffer_def) = self.define_anon_var(buffer_type, init)?;
        let value_type = self.uint_type((n * 8) as u8)?;
        let u8t = self.uint_type(8)?;
        let io_size = IoSize::fixed(n, SizeUnit::ByteFixed);
        let write = self.add_stmt(StatementBody::WriteData(make_io_data(
            io_ref,
            StatementRef::NIL,
            buffer,
            buffer_type,
            attribute,
            io_size,
        )))?;
        let casted = self.cast(value_type, cast_from, from)?;

        if n == 1 {
            let zero = self.int_literal(0)?;
            let slot = self.index(u8t, buffer, zero)?;
            let byte = self.cast(u8t, value_type, casted)?;
            let assign = self.assign(slot, byte)?;
            return self.block(vec![buffer_def, assign, write]);
        }

        let counter_type = self.counter_type()?;
        let (counter, counter_def) = self.counter_loop_start()?;
        let eight = self.int_literal(8)?;
        let mask = self.int_literal(0xff)?;

        let store_byte = |c: &mut Self, shift_index: ExpressionRef| -> Result<StatementRef> {
            let shift = c.binary(BinaryOp::Mul, counter_type, shift_index, eight)?;
            let shifted = c.binary(BinaryOp::RightShift, value_type, casted, shift)?;
            let masked = c.binary(BinaryOp::BitAnd, value_type, shifted, mask)?;
            let byte = c.cast(u8t, value_type, masked)?;
            let slot = c.index(u8t, buffer, counter)?;
            c.assign(slot, byte)
        };

        let body = self.add_endian_specific(
            attribute,
            |c| store_byte(c, counter),
            |c| {
                let n_minus_one = c.int_literal(n - 1)?;
                let shift_index = c.binary(BinaryOp::Sub, counter_type, n_minus_one, counter)?;
                store_byte(c, shift_index)
            },
        )?;

        let limit = self.int_literal(n)?;
        let loop_stmt = self.counter_loop_end(counter, limit, body)?;
        self.block(vec![buffer_def, counter_def, loop_stmt, write])
    }

    #[allow(clippy::too_many_arguments)]
    fn encode_array_type(
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

        let mut guard = None;
        let limit = if let Some(n) = length_value {
            io.size = IoSize::fixed(n, fixed_unit);
            self.int_literal(n)?
        } else if self.is_open_range(length) {
            if let Some(align_bits) = self.alignment_vector_bits(field) {
                let required =
                    self.alignment_requirement(align_bits / 8, StreamKind::Output)?;
                io.size = IoSize::dynamic(required, dynamic_unit);
                required
            } else {
                let size = self.array_size(base)?;
                io.size = IoSize::dynamic(size, dynamic_unit);
                size
            }
        } else {
            let length = length.ok_or(ConvertError::MissingInput {
                node: "array_type",
                field: "length",
            })?;
            let len = self.convert_expr(length)?;
            let actual = self.array_size(base)?;
            let bool_type = self.bool_type()?;
            let eq = self.binary(BinaryOp::Equal, bool_type, actual, len)?;
            guard = Some(self.assert_stmt(eq)?);
            io.size = IoSize::dynamic(len, dynamic_unit);
            len
        };

        let (counter, counter_def) = self.counter_loop_start()?;
        let indexed = self.index(element_t, base, counter)?;
        let inner = self.encode_field_type(element_type, indexed, None)?;
        let inner = self.add_stmt(inner)?;
        let loop_stmt = self.counter_loop_end(counter, limit, inner)?;

        let mut container = vec![counter_def];
        if let Some(guard) = guard {
            container.push(guard);
        }
        container.push(loop_stmt);
        let block = self.block(container)?;
        lowered.push((LoweringKind::ArrayForEach, block));
        Ok(())
    }

    /// Emits the call to a nested format's encoder or decoder: stream handle
    /// first, then the state variables the callee expects, with error
    /// propagation on failure.
    pub(crate) fn coder_call(
        &mut self,
        io: &mut IoData,
        format_node: NodeId,
        bit_size: Option<u64>,
        base: ExpressionRef,
        encode: bool,
        lowered: &mut Vec<(LoweringKind, StatementRef)>,
    ) -> Result<()> {
        let has_custom = match self.node(format_node) {
            Node::Format { encode_fn, decode_fn, .. } => {
                encode_fn.is_some() || decode_fn.is_some()
            }
            _ => return Err(ConvertError::MissingInput { node: "struct_type", field: "base" }),
        };
        io.size = match bit_size {
            Some(bits) if !has_custom => self.io_size_for_bits(bits),
            _ => IoSize { unit: SizeUnit::Dynamic, ..IoSize::default() },
        };

        self.convert_decl(format_node)?;
        let callee_coder = self.coder(format_node)?.clone();
        let current = self.current_coder()?.clone();
        let (fn_expr, stream_expr, return_t) = if encode {
            let t = self.intern_type(TypeBody::EncoderReturn)?;
            (callee_coder.encode_fn_expr, current.encoder_input_expr, t)
        } else {
            let t = self.intern_type(TypeBody::DecoderReturn)?;
            (callee_coder.decode_fn_expr, current.decoder_input_expr, t)
        };
        let fn_type = self
            .module
            .get_expression(fn_expr)
            .map(|e| e.body.ty)
            .unwrap_or(TypeRef::NIL);
        let callee = self.member_access(fn_type, base, fn_expr)?;

        let mut arguments = vec![stream_expr];
        for state in &callee_coder.state_vars {
            let passed = current
                .state_vars
                .iter()
                .find(|s| s.field_node == state.field_node)
                .map(|s| s.expr)
                .unwrap_or(state.expr);
            arguments.push(passed);
        }
        let call = self.add_expr(
            return_t,
            ebmc_core::ExprOp::Call(ebmc_core::CallDesc { callee, arguments }),
        )?;
        let (result, result_def) = self.define_anon_var(return_t, call)?;
        let bool_type = self.bool_type()?;
        let failed = self.add_expr(bool_type, ebmc_core::ExprOp::IsError { target: result })?;
        let propagate = self.add_stmt(StatementBody::ErrorReturn { value: result })?;
        let guard = self.if_stmt(failed, propagate, StatementRef::NIL)?;
        let block = self.block(vec![result_def, guard])?;
        lowered.push((LoweringKind::StructCall, block));
        Ok(())
    }
}
