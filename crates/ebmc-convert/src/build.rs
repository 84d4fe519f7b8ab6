//! Statement and expression construction helpers.
//!
//! The converter and the transform passes build a lot of boilerplate IR:
//! counter loops, casts, buffer declarations, endian branches. These helpers
//! keep that construction in one place. Types are interned so repeated
//! requests for `u8` or `bool` share one arena entry.

use ebmc_core::{
    BinaryOp, CastKind, Endian, ExprOp, ExpressionBody, ExpressionRef, IdentifierRef, IoAttribute,
    IoData, IoSize, LoopKind, LoopStatement, LoweredStatement, LoweringKind, SizeUnit,
    StatementBody, StatementRef, StreamKind, TypeBody, TypeKind, TypeRef, UnaryOp, VariableDecl,
};

use std::collections::HashMap;

use crate::context::Converter;
use crate::error::{ConvertError, Result};

/// Construction helpers shared by the converter and the transform passes.
///
/// Implementors expose the module under construction plus a type-interning
/// cache; everything else comes as default methods.
pub trait Build {
    fn module(&self) -> &ebmc_core::Module;
    fn module_mut(&mut self) -> &mut ebmc_core::Module;
    fn intern_map(&mut self) -> &mut HashMap<TypeBody, TypeRef>;

    // -- types -------------------------------------------------------------

    /// Interns a type body, returning the existing ref for an identical one.
    fn intern_type(&mut self, body: TypeBody) -> Result<TypeRef> {
        if let Some(found) = self.intern_map().get(&body) {
            return Ok(*found);
        }
        let r = self.module_mut().add_type(body.clone())?;
        self.intern_map().insert(body, r);
        Ok(r)
    }

    fn uint_type(&mut self, bits: u8) -> Result<TypeRef> {
        self.intern_type(TypeBody::Uint { size: bits })
    }

    /// The loop-counter and size type.
    fn counter_type(&mut self) -> Result<TypeRef> {
        self.uint_type(64)
    }

    fn bool_type(&mut self) -> Result<TypeRef> {
        self.intern_type(TypeBody::Bool)
    }

    fn void_type(&mut self) -> Result<TypeRef> {
        self.intern_type(TypeBody::Void)
    }

    fn u8_array_type(&mut self, len: u64) -> Result<TypeRef> {
        let u8t = self.uint_type(8)?;
        self.intern_type(TypeBody::Array { element: u8t, length: len })
    }

    // -- expressions -------------------------------------------------------

    fn add_expr(&mut self, ty: TypeRef, op: ExprOp) -> Result<ExpressionRef> {
        Ok(self.module_mut().add_expression(ExpressionBody::new(ty, op))?)
    }

    /// An unsigned literal typed with the narrowest fitting width
    /// (promoted 8 -> 16 -> 32 -> 64).
    fn int_literal(&mut self, value: u64) -> Result<ExpressionRef> {
        let bits: u8 = match value {
            v if v <= 0xFF => 8,
            v if v <= 0xFFFF => 16,
            v if v <= 0xFFFF_FFFF => 32,
            _ => 64,
        };
        let ty = self.uint_type(bits)?;
        self.add_expr(ty, ExprOp::LiteralInt { value })
    }

    fn bool_literal(&mut self, value: bool) -> Result<ExpressionRef> {
        let ty = self.bool_type()?;
        self.add_expr(ty, ExprOp::LiteralBool { value })
    }

    fn default_value(&mut self, ty: TypeRef) -> Result<ExpressionRef> {
        self.add_expr(ty, ExprOp::DefaultValue)
    }

    fn new_object(&mut self, ty: TypeRef) -> Result<ExpressionRef> {
        self.add_expr(ty, ExprOp::NewObject)
    }

    /// Identifier expression referring to a declaration statement.
    fn identifier_expr(&mut self, decl: StatementRef, ty: TypeRef) -> Result<ExpressionRef> {
        self.add_expr(ty, ExprOp::Identifier { decl })
    }

    fn binary(
        &mut self,
        op: BinaryOp,
        ty: TypeRef,
        left: ExpressionRef,
        right: ExpressionRef,
    ) -> Result<ExpressionRef> {
        self.add_expr(ty, ExprOp::BinaryOp { op, left, right })
    }

    fn unary(
        &mut self,
        op: UnaryOp,
        ty: TypeRef,
        operand: ExpressionRef,
    ) -> Result<ExpressionRef> {
        self.add_expr(ty, ExprOp::UnaryOp { op, operand })
    }

    fn index(
        &mut self,
        ty: TypeRef,
        base: ExpressionRef,
        index: ExpressionRef,
    ) -> Result<ExpressionRef> {
        self.add_expr(ty, ExprOp::IndexAccess { base, index })
    }

    fn member_access(
        &mut self,
        ty: TypeRef,
        base: ExpressionRef,
        member: ExpressionRef,
    ) -> Result<ExpressionRef> {
        self.add_expr(ty, ExprOp::MemberAccess { base, member })
    }

    fn array_size(&mut self, array: ExpressionRef) -> Result<ExpressionRef> {
        let ty = self.counter_type()?;
        self.add_expr(ty, ExprOp::ArraySize { array })
    }

    /// Classifies a cast between two type descriptors. Ties favor the
    /// no-op-most kind.
    fn cast_kind_of(&mut self, dest: TypeRef, src: TypeRef) -> Result<CastKind> {
        let dest_body = self
            .module()
            .get_type(dest)
            .ok_or_else(|| ConvertError::internal(format!("cast to unresolved type {dest}")))?
            .body
            .clone();
        let src_body = self
            .module()
            .get_type(src)
            .ok_or_else(|| ConvertError::internal(format!("cast from unresolved type {src}")))?
            .body
            .clone();
        use TypeKind::*;
        let kind = match (dest_body.kind(), src_body.kind()) {
            (Int | Uint, Enum) => CastKind::EnumToInt,
            (Int | Uint, Float) => CastKind::FloatToIntBit,
            (Int | Uint, Bool) => CastKind::BoolToInt,
            (Int | Uint, Int | Uint) => {
                let d = dest_body.bit_size().unwrap_or(0);
                let s = src_body.bit_size().unwrap_or(0);
                if d < s {
                    CastKind::LargeIntToSmallInt
                } else if d > s {
                    CastKind::SmallIntToLargeInt
                } else {
                    match (dest_body.kind(), src_body.kind()) {
                        (Uint, Int) => CastKind::SignedToUnsigned,
                        (Int, Uint) => CastKind::UnsignedToSigned,
                        _ => CastKind::IntToIntSameSize,
                    }
                }
            }
            (Enum, Int | Uint) => CastKind::IntToEnum,
            (Float, Int | Uint) => CastKind::IntToFloatBit,
            (Bool, Int | Uint) => CastKind::IntToBool,
            (_, Struct | RecursiveStruct) => CastKind::FunctionCast,
            _ => CastKind::Other,
        };
        Ok(kind)
    }

    /// Casts `expr` from `from` to `to`; the identity cast is a no-op.
    fn cast(
        &mut self,
        to: TypeRef,
        from: TypeRef,
        expr: ExpressionRef,
    ) -> Result<ExpressionRef> {
        if to == from {
            return Ok(expr);
        }
        let cast_kind = self.cast_kind_of(to, from)?;
        self.add_expr(
            to,
            ExprOp::TypeCast {
                source: expr,
                from_type: from,
                cast_kind,
                cast_function: StatementRef::NIL,
            },
        )
    }

    /// Maximum representable value of an integral (or enum-backed) type,
    /// with the portable lowering `~default` (shifted once for signed).
    fn max_value_expr(&mut self, ty: TypeRef) -> Result<ExpressionRef> {
        let (bits, signed) = self.integral_size_and_sign(ty)?;
        let value_type = self.uint_type(bits)?;
        let zero = self.default_value(value_type)?;
        let mut result = self.unary(UnaryOp::BitNot, value_type, zero)?;
        if signed {
            let one = self.int_literal(1)?;
            result = self.binary(BinaryOp::RightShift, value_type, result, one)?;
        }
        let lowered = self.cast(ty, value_type, result)?;
        self.add_expr(ty, ExprOp::MaxValue { lowered })
    }

    /// Bit width and signedness of an integer or enum-backed type.
    fn integral_size_and_sign(&mut self, ty: TypeRef) -> Result<(u8, bool)> {
        let mut cur = ty;
        loop {
            let body = self
                .module()
                .get_type(cur)
                .ok_or_else(|| ConvertError::internal(format!("unresolved type {cur}")))?
                .body
                .clone();
            match body {
                TypeBody::Int { size } => return Ok((size, true)),
                TypeBody::Uint { size } => return Ok((size, false)),
                TypeBody::Enum { base_type, .. } if !base_type.is_nil() => cur = base_type,
                other => {
                    return Err(ConvertError::unsupported(format!(
                        "max value of {:?} type",
                        other.kind()
                    )))
                }
            }
        }
    }

    // -- statements --------------------------------------------------------

    fn add_stmt(&mut self, body: StatementBody) -> Result<StatementRef> {
        Ok(self.module_mut().add_statement(body)?)
    }

    fn block(&mut self, container: Vec<StatementRef>) -> Result<StatementRef> {
        self.add_stmt(StatementBody::Block { container })
    }

    fn assign(&mut self, target: ExpressionRef, value: ExpressionRef) -> Result<StatementRef> {
        self.add_stmt(StatementBody::Assignment { target, value })
    }

    fn if_stmt(
        &mut self,
        condition: ExpressionRef,
        then_block: StatementRef,
        else_block: StatementRef,
    ) -> Result<StatementRef> {
        self.add_stmt(StatementBody::IfStatement { condition, then_block, else_block })
    }

    fn while_loop(&mut self, condition: ExpressionRef, body: StatementRef) -> Result<StatementRef> {
        self.add_stmt(StatementBody::LoopStatement(LoopStatement {
            loop_kind: LoopKind::While,
            condition,
            body,
            ..LoopStatement::default()
        }))
    }

    /// Declares an anonymous variable; returns its identifier expression and
    /// declaration statement.
    fn define_anon_var(
        &mut self,
        ty: TypeRef,
        initial_value: ExpressionRef,
    ) -> Result<(ExpressionRef, StatementRef)> {
        let name = self.module_mut().add_anonymous_identifier()?;
        self.define_var(name, ty, initial_value, false, false)
    }

    fn define_var(
        &mut self,
        name: IdentifierRef,
        ty: TypeRef,
        initial_value: ExpressionRef,
        constant: bool,
        reference: bool,
    ) -> Result<(ExpressionRef, StatementRef)> {
        let decl = self.add_stmt(StatementBody::VariableDecl(VariableDecl {
            name,
            var_type: ty,
            initial_value,
            constant,
            reference,
        }))?;
        let expr = self.identifier_expr(decl, ty)?;
        Ok((expr, decl))
    }

    /// `target = target + 1`; EBM has no increment operator.
    fn increment(&mut self, target: ExpressionRef, ty: TypeRef) -> Result<StatementRef> {
        let one = self.int_literal(1)?;
        let bumped = self.binary(BinaryOp::Add, ty, target, one)?;
        self.assign(target, bumped)
    }

    /// Declares a zero-initialized `u64` counter. Pair with
    /// [`Build::counter_loop_end`].
    fn counter_loop_start(&mut self) -> Result<(ExpressionRef, StatementRef)> {
        let counter_type = self.counter_type()?;
        self.counter_loop_start_typed(counter_type)
    }

    fn counter_loop_start_typed(
        &mut self,
        counter_type: TypeRef,
    ) -> Result<(ExpressionRef, StatementRef)> {
        let zero = self.int_literal(0)?;
        let zero = {
            let zero_ty = self.module().get_expression(zero).map(|e| e.body.ty);
            match zero_ty {
                Some(t) if t == counter_type => zero,
                Some(t) => self.cast(counter_type, t, zero)?,
                None => zero,
            }
        };
        self.define_anon_var(counter_type, zero)
    }

    /// `while counter < limit { body; counter = counter + 1 }`.
    fn counter_loop_end(
        &mut self,
        counter: ExpressionRef,
        limit: ExpressionRef,
        body: StatementRef,
    ) -> Result<StatementRef> {
        let bool_type = self.bool_type()?;
        let counter_type = self.counter_type()?;
        let cmp = self.binary(BinaryOp::Less, bool_type, counter, limit)?;
        let inc = self.increment(counter, counter_type)?;
        let loop_block = self.block(vec![body, inc])?;
        self.while_loop(cmp, loop_block)
    }

    /// Assert with its portable lowering: `if !cond { error_report }`.
    fn assert_stmt(&mut self, condition: ExpressionRef) -> Result<StatementRef> {
        let body = self.assert_stmt_body(condition)?;
        self.add_stmt(body)
    }

    fn assert_stmt_body(&mut self, condition: ExpressionRef) -> Result<StatementBody> {
        let message = self.module_mut().add_string(b"Assertion failed".to_vec())?;
        let report = self.add_stmt(StatementBody::ErrorReport { message, arguments: vec![] })?;
        let bool_type = self.bool_type()?;
        let not_cond = self.unary(UnaryOp::LogicalNot, bool_type, condition)?;
        let guarded = self.if_stmt(not_cond, report, StatementRef::NIL)?;
        let lowered = self.lowered_statements(vec![(LoweringKind::Naive, guarded)])?;
        Ok(StatementBody::Assert { condition, lowered_statement: lowered })
    }

    /// Wraps lowering alternatives into a `LOWERED_STATEMENTS` statement.
    fn lowered_statements(
        &mut self,
        alternatives: Vec<(LoweringKind, StatementRef)>,
    ) -> Result<StatementRef> {
        if alternatives.is_empty() {
            return Err(ConvertError::internal("empty lowered statement list".to_string()));
        }
        let alternatives = alternatives
            .into_iter()
            .map(|(lowering_kind, block)| LoweredStatement { lowering_kind, block })
            .collect();
        self.add_stmt(StatementBody::LoweredStatements { alternatives })
    }

    // -- endian ------------------------------------------------------------

    /// Emits one branch when the endian is statically known, otherwise an
    /// `IS_LITTLE_ENDIAN` test selecting between the two expansions.
    fn add_endian_specific(
        &mut self,
        attribute: IoAttribute,
        on_little: impl FnOnce(&mut Self) -> Result<StatementRef>,
        on_big: impl FnOnce(&mut Self) -> Result<StatementRef>,
    ) -> Result<StatementRef>
    where
        Self: Sized,
    {
        match attribute.endian {
            Endian::Little => on_little(self),
            Endian::Big => on_big(self),
            Endian::Native | Endian::Dynamic => {
                let bool_type = self.bool_type()?;
                let test = self.add_expr(
                    bool_type,
                    ExprOp::IsLittleEndian { dynamic_ref: attribute.dynamic_ref },
                )?;
                let little = on_little(self)?;
                let big = on_big(self)?;
                self.if_stmt(test, little, big)
            }
            Endian::Unspec => Err(ConvertError::internal(
                "unresolved endian reached emission".to_string(),
            )),
        }
    }

    // -- I/O ---------------------------------------------------------------

    /// I/O size for a scalar of `bit_size` bits: whole bytes when aligned.
    fn io_size_for_bits(&self, bit_size: u64) -> IoSize {
        if bit_size % 8 == 0 {
            IoSize::fixed(bit_size / 8, SizeUnit::ByteFixed)
        } else {
            IoSize::fixed(bit_size, SizeUnit::BitFixed)
        }
    }

    /// Remaining distance to an alignment boundary, computed from the
    /// current stream offset. Alignment one is the literal 1; zero is an
    /// error.
    fn alignment_requirement(
        &mut self,
        alignment_bytes: u64,
        stream: StreamKind,
    ) -> Result<ExpressionRef> {
        if alignment_bytes == 0 {
            return Err(ConvertError::unsupported("alignment of zero bytes"));
        }
        if alignment_bytes == 1 {
            return self.int_literal(1);
        }
        let counter_type = self.counter_type()?;
        let offset = self.add_expr(
            counter_type,
            ExprOp::GetStreamOffset { stream, unit: SizeUnit::ByteFixed },
        )?;
        let alignment = self.int_literal(alignment_bytes)?;
        if alignment_bytes.is_power_of_two() {
            let mask = self.int_literal(alignment_bytes - 1)?;
            let rem = self.binary(BinaryOp::BitAnd, counter_type, offset, mask)?;
            let diff = self.binary(BinaryOp::Sub, counter_type, alignment, rem)?;
            self.binary(BinaryOp::BitAnd, counter_type, diff, mask)
        } else {
            let rem = self.binary(BinaryOp::Mod, counter_type, offset, alignment)?;
            let diff = self.binary(BinaryOp::Sub, counter_type, alignment, rem)?;
            self.binary(BinaryOp::Mod, counter_type, diff, alignment)
        }
    }

    /// Appends `value` to the vector expression `base`. Expressed as an
    /// assignment into the one-past-end slot.
    fn append_element(
        &mut self,
        base: ExpressionRef,
        element_type: TypeRef,
        value: ExpressionRef,
    ) -> Result<StatementRef> {
        let size = self.array_size(base)?;
        let slot = self.index(element_type, base, size)?;
        self.assign(slot, value)
    }
}

impl Build for Converter<'_> {
    fn module(&self) -> &ebmc_core::Module {
        &self.module
    }
    fn module_mut(&mut self) -> &mut ebmc_core::Module {
        &mut self.module
    }
    fn intern_map(&mut self) -> &mut HashMap<TypeBody, TypeRef> {
        &mut self.type_intern
    }
}

/// Plain constructor for an I/O descriptor.
pub fn make_io_data(
    io_ref: StatementRef,
    field: StatementRef,
    target: ExpressionRef,
    data_type: TypeRef,
    attribute: IoAttribute,
    size: IoSize,
) -> IoData {
    IoData {
        io_ref,
        field,
        target,
        data_type,
        attribute,
        size,
        lowered_statement: StatementRef::NIL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ebmc_ast::Ast;

    #[test]
    fn types_are_interned() {
        let ast = Ast::new();
        let mut c = Converter::new(&ast);
        let a = c.uint_type(8).unwrap();
        let b = c.uint_type(8).unwrap();
        let other = c.uint_type(16).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, other);
    }

    #[test]
    fn int_literal_fits_narrowest_type() {
        let ast = Ast::new();
        let mut c = Converter::new(&ast);
        let small = c.int_literal(200).unwrap();
        let big = c.int_literal(70_000).unwrap();
        let small_ty = c.module.get_expression(small).unwrap().body.ty;
        let big_ty = c.module.get_expression(big).unwrap().body.ty;
        assert_eq!(c.module.get_type(small_ty).unwrap().body, TypeBody::Uint { size: 8 });
        assert_eq!(c.module.get_type(big_ty).unwrap().body, TypeBody::Uint { size: 32 });
    }

    #[test]
    fn identity_cast_is_a_noop() {
        let ast = Ast::new();
        let mut c = Converter::new(&ast);
        let t = c.uint_type(8).unwrap();
        let lit = c.int_literal(1).unwrap();
        assert_eq!(c.cast(t, t, lit).unwrap(), lit);
    }

    #[test]
    fn cast_kinds_follow_the_descriptor_rules() {
        let ast = Ast::new();
        let mut c = Converter::new(&ast);
        let u8t = c.uint_type(8).unwrap();
        let u16t = c.uint_type(16).unwrap();
        let i16t = c.intern_type(TypeBody::Int { size: 16 }).unwrap();
        let f32t = c.intern_type(TypeBody::Float { size: 32 }).unwrap();
        let boolt = c.bool_type().unwrap();
        assert_eq!(c.cast_kind_of(u16t, u8t).unwrap(), CastKind::SmallIntToLargeInt);
        assert_eq!(c.cast_kind_of(u8t, u16t).unwrap(), CastKind::LargeIntToSmallInt);
        assert_eq!(c.cast_kind_of(u16t, i16t).unwrap(), CastKind::SignedToUnsigned);
        assert_eq!(c.cast_kind_of(i16t, u16t).unwrap(), CastKind::UnsignedToSigned);
        assert_eq!(c.cast_kind_of(u16t, f32t).unwrap(), CastKind::FloatToIntBit);
        assert_eq!(c.cast_kind_of(f32t, u16t).unwrap(), CastKind::IntToFloatBit);
        assert_eq!(c.cast_kind_of(boolt, u8t).unwrap(), CastKind::IntToBool);
        assert_eq!(c.cast_kind_of(u8t, boolt).unwrap(), CastKind::BoolToInt);
    }

    #[test]
    fn alignment_requirement_uses_mask_for_powers_of_two() {
        let ast = Ast::new();
        let mut c = Converter::new(&ast);
        let aligned = c.alignment_requirement(4, StreamKind::Output).unwrap();
        let body = &c.module.get_expression(aligned).unwrap().body;
        assert!(matches!(body.op, ExprOp::BinaryOp { op: BinaryOp::BitAnd, .. }));
        let odd = c.alignment_requirement(6, StreamKind::Output).unwrap();
        let body = &c.module.get_expression(odd).unwrap().body;
        assert!(matches!(body.op, ExprOp::BinaryOp { op: BinaryOp::Mod, .. }));
        assert!(c.alignment_requirement(0, StreamKind::Output).is_err());
    }

    #[test]
    fn counter_loop_shape() {
        let ast = Ast::new();
        let mut c = Converter::new(&ast);
        let (counter, _def) = c.counter_loop_start().unwrap();
        let limit = c.int_literal(10).unwrap();
        let body = c.block(vec![]).unwrap();
        let loop_ref = c.counter_loop_end(counter, limit, body).unwrap();
        let loop_body = &c.module.get_statement(loop_ref).unwrap().body;
        match loop_body {
            StatementBody::LoopStatement(l) => {
                assert_eq!(l.loop_kind, LoopKind::While);
                assert!(!l.condition.is_nil());
            }
            other => panic!("expected loop, got {:?}", other.kind()),
        }
    }
}
