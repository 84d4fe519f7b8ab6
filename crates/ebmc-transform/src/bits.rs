//! Bit extraction and insertion over a temporary byte buffer.
//!
//! Canonical forms, per step, with `offset = cur_bit / 8`,
//! `bit_offset = cur_bit % 8`, `bit_to_read = min(8 - bit_offset,
//! bit_size - bits_processed)`:
//!
//! - byte shift: big-endian `8 - bit_to_read - bit_offset`, little-endian
//!   `bit_offset`;
//! - expression shift: big-endian `bit_size - bits_processed - bit_to_read`,
//!   little-endian `bits_processed`;
//! - mask: `(1 << bit_to_read) - 1`.
//!
//! Read: `piece = (buf[offset] >> byte_shift) & mask;
//! result |= T(piece) << expr_shift`. Write inverts:
//! `piece = (source >> expr_shift) & mask; buf[offset] |= piece << byte_shift`.
//!
//! The constant path folds all shifts and masks; the dynamic path emits the
//! same formulas over run-time expressions inside a
//! `while bits_processed < bit_size` loop.

use ebmc_convert::Build;
use ebmc_core::{BinaryOp, Endian, ExpressionRef, StatementRef, TypeRef};

use crate::ctx::TransformCtx;
use crate::error::Result;

pub struct BitManipulator {
    buffer: ExpressionRef,
    u8_type: TypeRef,
}

impl BitManipulator {
    pub fn new(buffer: ExpressionRef, u8_type: TypeRef) -> Self {
        BitManipulator { buffer, u8_type }
    }

    fn byte_shift(endian: Endian, bit_offset: u64, bit_to_read: u64) -> u64 {
        match endian {
            Endian::Little => bit_offset,
            _ => 8 - bit_to_read - bit_offset,
        }
    }

    fn expr_shift(endian: Endian, bit_size: u64, bits_processed: u64, bit_to_read: u64) -> u64 {
        match endian {
            Endian::Little => bits_processed,
            _ => bit_size - bits_processed - bit_to_read,
        }
    }

    fn mask(bit_to_read: u64) -> u64 {
        (1u64 << bit_to_read) - 1
    }

    /// Constant-folded read of `bit_size` bits starting at `start_bit`,
    /// assigned to `dst` as one OR-chain.
    pub fn read_bits(
        &self,
        ctx: &mut TransformCtx,
        start_bit: u64,
        bit_size: u64,
        endian: Endian,
        target_type: TypeRef,
        dst: ExpressionRef,
    ) -> Result<StatementRef> {
        let mut bits_processed = 0u64;
        let mut cur = start_bit;
        let mut combined: Option<ExpressionRef> = None;
        while bits_processed < bit_size {
            let offset = cur / 8;
            let bit_offset = cur % 8;
            let bit_to_read = (8 - bit_offset).min(bit_size - bits_processed);
            let byte_shift = Self::byte_shift(endian, bit_offset, bit_to_read);
            let expr_shift = Self::expr_shift(endian, bit_size, bits_processed, bit_to_read);
            let mask = Self::mask(bit_to_read);

            let offset_lit = ctx.int_literal(offset)?;
            let byte = ctx.index(self.u8_type, self.buffer, offset_lit)?;
            let mut piece = byte;
            if byte_shift > 0 {
                let shift = ctx.int_literal(byte_shift)?;
                piece = ctx.binary(BinaryOp::RightShift, self.u8_type, piece, shift)?;
            }
            if mask != 0xFF || bit_to_read < 8 {
                let mask_lit = ctx.int_literal(mask)?;
                piece = ctx.binary(BinaryOp::BitAnd, self.u8_type, piece, mask_lit)?;
            }
            let mut widened = ctx.cast(target_type, self.u8_type, piece)?;
            if expr_shift > 0 {
                let shift = ctx.int_literal(expr_shift)?;
                widened = ctx.binary(BinaryOp::LeftShift, target_type, widened, shift)?;
            }
            combined = Some(match combined {
                None => widened,
                Some(acc) => ctx.binary(BinaryOp::BitOr, target_type, acc, widened)?,
            });

            bits_processed += bit_to_read;
            cur += bit_to_read;
        }
        let combined = combined.unwrap_or(dst);
        ctx.assign(dst, combined).map_err(Into::into)
    }

    /// Constant-folded write of `bit_size` bits of `src` starting at
    /// `start_bit`: one OR-assignment into the buffer per touched byte.
    pub fn write_bits(
        &self,
        ctx: &mut TransformCtx,
        start_bit: u64,
        bit_size: u64,
        endian: Endian,
        source_type: TypeRef,
        src: ExpressionRef,
    ) -> Result<StatementRef> {
        let mut container = Vec::new();
        let mut bits_processed = 0u64;
        let mut cur = start_bit;
        while bits_processed < bit_size {
            let offset = cur / 8;
            let bit_offset = cur % 8;
            let bit_to_read = (8 - bit_offset).min(bit_size - bits_processed);
            let byte_shift = Self::byte_shift(endian, bit_offset, bit_to_read);
            let expr_shift = Self::expr_shift(endian, bit_size, bits_processed, bit_to_read);
            let mask = Self::mask(bit_to_read);

            let mut piece = src;
            if expr_shift > 0 {
                let shift = ctx.int_literal(expr_shift)?;
                piece = ctx.binary(BinaryOp::RightShift, source_type, piece, shift)?;
            }
            let mask_lit = ctx.int_literal(mask)?;
            piece = ctx.binary(BinaryOp::BitAnd, source_type, piece, mask_lit)?;
            let mut byte = ctx.cast(self.u8_type, source_type, piece)?;
            if byte_shift > 0 {
                let shift = ctx.int_literal(byte_shift)?;
                byte = ctx.binary(BinaryOp::LeftShift, self.u8_type, byte, shift)?;
            }
            let offset_lit = ctx.int_literal(offset)?;
            let slot = ctx.index(self.u8_type, self.buffer, offset_lit)?;
            let merged = ctx.binary(BinaryOp::BitOr, self.u8_type, slot, byte)?;
            container.push(ctx.assign(slot, merged)?);

            bits_processed += bit_to_read;
            cur += bit_to_read;
        }
        ctx.block(container).map_err(Into::into)
    }

    /// `min(a, b)` materialized through a declared temporary.
    fn runtime_min(
        &self,
        ctx: &mut TransformCtx,
        a: ExpressionRef,
        b: ExpressionRef,
    ) -> Result<(ExpressionRef, Vec<StatementRef>)> {
        let counter_type = ctx.counter_type()?;
        let bool_type = ctx.bool_type()?;
        let (out, out_def) = {
            let init = ctx.default_value(counter_type)?;
            ctx.define_anon_var(counter_type, init)?
        };
        let less = ctx.binary(BinaryOp::Less, bool_type, a, b)?;
        let take_a = ctx.assign(out, a)?;
        let take_b = ctx.assign(out, b)?;
        let pick = ctx.if_stmt(less, take_a, take_b)?;
        Ok((out, vec![out_def, pick]))
    }

    /// Dynamic read: the same per-chunk formula evaluated at run time inside
    /// a `while bits_processed < bit_size` loop. `start_bit` is a run-time
    /// expression; `bit_size` is a literal value.
    pub fn read_bits_dynamic(
        &self,
        ctx: &mut TransformCtx,
        start_bit: ExpressionRef,
        bit_size: u64,
        endian: Endian,
        target_type: TypeRef,
        dst: ExpressionRef,
    ) -> Result<StatementRef> {
        let counter_type = ctx.counter_type()?;
        let bool_type = ctx.bool_type()?;
        let zero = ctx.int_literal(0)?;
        let eight = ctx.int_literal(8)?;
        let one = ctx.int_literal(1)?;
        let size_lit = ctx.int_literal(bit_size)?;

        let (processed, processed_def) = ctx.define_anon_var(counter_type, zero)?;
        let mut setup = vec![processed_def];

        // loop body
        let cur = ctx.binary(BinaryOp::Add, counter_type, start_bit, processed)?;
        let offset = ctx.binary(BinaryOp::Div, counter_type, cur, eight)?;
        let bit_offset = ctx.binary(BinaryOp::Mod, counter_type, cur, eight)?;
        let room = ctx.binary(BinaryOp::Sub, counter_type, eight, bit_offset)?;
        let left = ctx.binary(BinaryOp::Sub, counter_type, size_lit, processed)?;
        let (bit_to_read, mut min_stmts) = self.runtime_min(ctx, room, left)?;

        let byte = ctx.index(self.u8_type, self.buffer, offset)?;
        let byte_shift = match endian {
            Endian::Little => bit_offset,
            _ => {
                let minus_read = ctx.binary(BinaryOp::Sub, counter_type, eight, bit_to_read)?;
                ctx.binary(BinaryOp::Sub, counter_type, minus_read, bit_offset)?
            }
        };
        let expr_shift = match endian {
            Endian::Little => processed,
            _ => {
                let minus_proc = ctx.binary(BinaryOp::Sub, counter_type, size_lit, processed)?;
                ctx.binary(BinaryOp::Sub, counter_type, minus_proc, bit_to_read)?
            }
        };
        let mask = {
            let shifted = ctx.binary(BinaryOp::LeftShift, counter_type, one, bit_to_read)?;
            ctx.binary(BinaryOp::Sub, counter_type, shifted, one)?
        };
        let shifted_byte = ctx.binary(BinaryOp::RightShift, self.u8_type, byte, byte_shift)?;
        let masked = ctx.binary(BinaryOp::BitAnd, self.u8_type, shifted_byte, mask)?;
        let widened = ctx.cast(target_type, self.u8_type, masked)?;
        let positioned = ctx.binary(BinaryOp::LeftShift, target_type, widened, expr_shift)?;
        let merged = ctx.binary(BinaryOp::BitOr, target_type, dst, positioned)?;
        let store = ctx.assign(dst, merged)?;
        let advance = {
            let next = ctx.binary(BinaryOp::Add, counter_type, processed, bit_to_read)?;
            ctx.assign(processed, next)?
        };

        let mut body = Vec::new();
        body.append(&mut min_stmts);
        body.push(store);
        body.push(advance);
        let body = ctx.block(body)?;
        let cond = ctx.binary(BinaryOp::Less, bool_type, processed, size_lit)?;
        let loop_stmt = ctx.while_loop(cond, body)?;
        setup.push(loop_stmt);
        ctx.block(setup).map_err(Into::into)
    }

    /// Dynamic write, the inverse formula of [`Self::read_bits_dynamic`].
    pub fn write_bits_dynamic(
        &self,
        ctx: &mut TransformCtx,
        start_bit: ExpressionRef,
        bit_size: u64,
        endian: Endian,
        source_type: TypeRef,
        src: ExpressionRef,
    ) -> Result<StatementRef> {
        let counter_type = ctx.counter_type()?;
        let bool_type = ctx.bool_type()?;
        let zero = ctx.int_literal(0)?;
        let eight = ctx.int_literal(8)?;
        let one = ctx.int_literal(1)?;
        let size_lit = ctx.int_literal(bit_size)?;

        let (processed, processed_def) = ctx.define_anon_var(counter_type, zero)?;
        let mut setup = vec![processed_def];

        let cur = ctx.binary(BinaryOp::Add, counter_type, start_bit, processed)?;
        let offset = ctx.binary(BinaryOp::Div, counter_type, cur, eight)?;
        let bit_offset = ctx.binary(BinaryOp::Mod, counter_type, cur, eight)?;
        let room = ctx.binary(BinaryOp::Sub, counter_type, eight, bit_offset)?;
        let left = ctx.binary(BinaryOp::Sub, counter_type, size_lit, processed)?;
        let (bit_to_read, mut min_stmts) = self.runtime_min(ctx, room, left)?;

        let byte_shift = match endian {
            Endian::Little => bit_offset,
            _ => {
                let minus_read = ctx.binary(BinaryOp::Sub, counter_type, eight, bit_to_read)?;
                ctx.binary(BinaryOp::Sub, counter_type, minus_read, bit_offset)?
            }
        };
        let expr_shift = match endian {
            Endian::Little => processed,
            _ => {
                let minus_proc = ctx.binary(BinaryOp::Sub, counter_type, size_lit, processed)?;
                ctx.binary(BinaryOp::Sub, counter_type, minus_proc, bit_to_read)?
            }
        };
        let mask = {
            let shifted = ctx.binary(BinaryOp::LeftShift, counter_type, one, bit_to_read)?;
            ctx.binary(BinaryOp::Sub, counter_type, shifted, one)?
        };
        let shifted_src = ctx.binary(BinaryOp::RightShift, source_type, src, expr_shift)?;
        let piece = ctx.binary(BinaryOp::BitAnd, source_type, shifted_src, mask)?;
        let byte = ctx.cast(self.u8_type, source_type, piece)?;
        let positioned = ctx.binary(BinaryOp::LeftShift, self.u8_type, byte, byte_shift)?;
        let slot = ctx.index(self.u8_type, self.buffer, offset)?;
        let merged = ctx.binary(BinaryOp::BitOr, self.u8_type, slot, positioned)?;
        let store = ctx.assign(slot, merged)?;
        let advance = {
            let next = ctx.binary(BinaryOp::Add, counter_type, processed, bit_to_read)?;
            ctx.assign(processed, next)?
        };

        let mut body = Vec::new();
        body.append(&mut min_stmts);
        body.push(store);
        body.push(advance);
        let body = ctx.block(body)?;
        let cond = ctx.binary(BinaryOp::Less, bool_type, processed, size_lit)?;
        let loop_stmt = ctx.while_loop(cond, body)?;
        setup.push(loop_stmt);
        ctx.block(setup).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ebmc_core::{ExprOp, Module, StatementBody};

    fn fixture() -> (TransformCtx, BitManipulator, ExpressionRef, TypeRef) {
        let mut ctx = TransformCtx::new(Module::new());
        let u8t = ctx.uint_type(8).unwrap();
        let buffer_type = ctx.u8_array_type(2).unwrap();
        let init = ctx.default_value(buffer_type).unwrap();
        let (buffer, _def) = ctx.define_anon_var(buffer_type, init).unwrap();
        let target_type = ctx.uint_type(8).unwrap();
        let init = ctx.default_value(target_type).unwrap();
        let (dst, _dst_def) = ctx.define_anon_var(target_type, init).unwrap();
        let manip = BitManipulator::new(buffer, u8t);
        (ctx, manip, dst, target_type)
    }

    /// 3 bits at offset 0 big-endian: `dst = buf[0] >> 5`.
    #[test]
    fn high_bits_read_shifts_only() {
        let (mut ctx, manip, dst, ty) = fixture();
        let stmt = manip.read_bits(&mut ctx, 0, 3, Endian::Big, ty, dst).unwrap();
        let StatementBody::Assignment { value, .. } =
            ctx.module.get_statement(stmt).unwrap().body.clone()
        else {
            panic!("expected one assignment");
        };
        // 8 - 3 - 0 = 5: one right shift, mask 0b111
        let body = &ctx.module.get_expression(value).unwrap().body;
        let ExprOp::BinaryOp { op: BinaryOp::BitAnd, left, right } = body.op else {
            panic!("expected mask, got {:?}", body.op);
        };
        let shift = &ctx.module.get_expression(left).unwrap().body;
        assert!(matches!(shift.op, ExprOp::BinaryOp { op: BinaryOp::RightShift, .. }));
        let mask = &ctx.module.get_expression(right).unwrap().body;
        assert!(matches!(mask.op, ExprOp::LiteralInt { value: 0b111 }));
    }

    /// 5 bits at offset 3 big-endian fill the rest of the byte:
    /// `dst = buf[0] & 0x1F`.
    #[test]
    fn low_bits_read_masks_only() {
        let (mut ctx, manip, dst, ty) = fixture();
        let stmt = manip.read_bits(&mut ctx, 3, 5, Endian::Big, ty, dst).unwrap();
        let StatementBody::Assignment { value, .. } =
            ctx.module.get_statement(stmt).unwrap().body.clone()
        else {
            panic!("expected one assignment");
        };
        let body = &ctx.module.get_expression(value).unwrap().body;
        let ExprOp::BinaryOp { op: BinaryOp::BitAnd, left, right } = body.op else {
            panic!("expected mask, got {:?}", body.op);
        };
        // byte shift is zero, so the masked operand is the raw byte
        let base = &ctx.module.get_expression(left).unwrap().body;
        assert!(matches!(base.op, ExprOp::IndexAccess { .. }));
        let mask = &ctx.module.get_expression(right).unwrap().body;
        assert!(matches!(mask.op, ExprOp::LiteralInt { value: 0x1F }));
    }

    /// A 10-bit big-endian read crosses a byte boundary in two chunks.
    #[test]
    fn cross_byte_read_combines_chunks() {
        let (mut ctx, manip, _, _) = fixture();
        let u16t = ctx.uint_type(16).unwrap();
        let init = ctx.default_value(u16t).unwrap();
        let (dst, _) = ctx.define_anon_var(u16t, init).unwrap();
        let stmt = manip.read_bits(&mut ctx, 6, 10, Endian::Big, u16t, dst).unwrap();
        let StatementBody::Assignment { value, .. } =
            ctx.module.get_statement(stmt).unwrap().body.clone()
        else {
            panic!("expected one assignment");
        };
        let body = &ctx.module.get_expression(value).unwrap().body;
        assert!(matches!(body.op, ExprOp::BinaryOp { op: BinaryOp::BitOr, .. }));
    }

    #[test]
    fn write_touches_each_covered_byte_once() {
        let (mut ctx, manip, src, ty) = fixture();
        let stmt = manip.write_bits(&mut ctx, 4, 8, Endian::Big, ty, src).unwrap();
        let StatementBody::Block { container } =
            ctx.module.get_statement(stmt).unwrap().body.clone()
        else {
            panic!("expected a block");
        };
        // 8 bits starting at bit 4 touch two bytes
        assert_eq!(container.len(), 2);
    }
}
