//! I/O vectorization: coalesce runs of adjacent fixed-size reads or writes
//! into one operation over a temporary buffer.
//!
//! The original statements survive inside the merged operation's lowered
//! block; every reference to a replaced statement from outside that block is
//! rewritten to the merged statement.

use std::collections::HashMap;

use ebmc_convert::{make_io_data, Build};
use ebmc_core::{
    AnyRef, IoSize, LoweredStatement, LoweringKind, RefKind, SizeUnit, StatementBody,
    StatementRef, TypeBody,
};

use crate::ctx::TransformCtx;
use crate::error::{Result, TransformError};

const PASS: &str = "vectorized_io";

fn fixed_io_bits(body: &StatementBody, write: bool) -> Option<u64> {
    let io = match (body, write) {
        (StatementBody::WriteData(d), true) | (StatementBody::ReadData(d), false) => d,
        _ => return None,
    };
    io.size.bits()
}

struct Run {
    /// Position range in the containing block, inclusive.
    range: (usize, usize),
    members: Vec<StatementRef>,
    total_bits: u64,
    all_bytes: bool,
}

/// Maximal runs of length >= 2 of same-direction fixed-size I/O within one
/// block.
fn find_runs(ctx: &TransformCtx, container: &[StatementRef], write: bool) -> Result<Vec<Run>> {
    let mut runs = Vec::new();
    let mut current: Option<Run> = None;
    for (position, child) in container.iter().enumerate() {
        let entry = ctx.module.get_statement(*child).ok_or_else(|| {
            TransformError::internal(PASS, format!("unresolved statement {child}"))
        })?;
        let bits = fixed_io_bits(&entry.body, write);
        match bits {
            Some(bits) => {
                let byte_sized = bits % 8 == 0
                    && entry
                        .body
                        .io_data()
                        .map(|io| io.size.unit == SizeUnit::ByteFixed)
                        .unwrap_or(false);
                match current.as_mut() {
                    Some(run) => {
                        run.range.1 = position;
                        run.members.push(*child);
                        run.total_bits += bits;
                        run.all_bytes &= byte_sized;
                    }
                    None => {
                        current = Some(Run {
                            range: (position, position),
                            members: vec![*child],
                            total_bits: bits,
                            all_bytes: byte_sized,
                        });
                    }
                }
            }
            None => {
                if let Some(run) = current.take() {
                    if run.members.len() > 1 {
                        runs.push(run);
                    }
                }
            }
        }
    }
    if let Some(run) = current.take() {
        if run.members.len() > 1 {
            runs.push(run);
        }
    }
    Ok(runs)
}

/// Builds the merged statement for one run and returns its ref.
fn merge_run(ctx: &mut TransformCtx, run: &Run, write: bool) -> Result<StatementRef> {
    let (total_size, data_type) = if run.all_bytes || run.total_bits % 8 == 0 {
        let bytes = run.total_bits / 8;
        (IoSize::fixed(bytes, SizeUnit::ByteFixed), ctx.u8_array_type(bytes)?)
    } else {
        (
            IoSize::fixed(run.total_bits, SizeUnit::BitFixed),
            ctx.intern_type(TypeBody::Uint { size: run.total_bits as u8 })?,
        )
    };

    let first = ctx
        .module
        .get_statement(run.members[0])
        .and_then(|e| e.body.io_data().cloned())
        .ok_or_else(|| TransformError::internal(PASS, "run head is not I/O".to_string()))?;
    // attribute the merged operation to the composite field when the head
    // field is part of one
    let mut field = first.field;
    if let Some(StatementBody::FieldDecl(decl)) =
        ctx.module.get_statement(field).map(|e| &e.body)
    {
        if !decl.composite_field.is_nil() {
            field = decl.composite_field;
        }
    }

    let originals = ctx.block(run.members.clone())?;
    let lowered = ctx.add_stmt(StatementBody::LoweredStatements {
        alternatives: vec![LoweredStatement {
            lowering_kind: LoweringKind::VectorizedIo,
            block: originals,
        }],
    })?;
    let mut io = make_io_data(
        first.io_ref,
        field,
        ebmc_core::ExpressionRef::NIL,
        data_type,
        Default::default(),
        total_size,
    );
    io.attribute.has_lowered_statement = true;
    io.lowered_statement = lowered;
    let body = if write { StatementBody::WriteData(io) } else { StatementBody::ReadData(io) };
    Ok(ctx.add_stmt(body)?)
}

/// The pass entry for one direction. Block containers are rewritten in
/// place; out-of-block references to replaced statements are remapped over
/// all arenas, aliases, and debug locations.
pub fn vectorized_io(ctx: &mut TransformCtx, write: bool) -> Result<()> {
    let original_len = ctx.module.statements.len();
    let blocks: Vec<StatementRef> = ctx
        .module
        .statements
        .entries()
        .iter()
        .take(original_len)
        .filter(|e| e.body.block().is_some())
        .map(|e| e.id)
        .collect();

    let mut replaced: HashMap<u64, StatementRef> = HashMap::new();
    for block_ref in blocks {
        let container: Vec<StatementRef> = ctx
            .module
            .get_statement(block_ref)
            .and_then(|e| e.body.block())
            .map(|c| c.to_vec())
            .unwrap_or_default();
        let runs = find_runs(ctx, &container, write)?;
        if runs.is_empty() {
            continue;
        }
        tracing::debug!(block = block_ref.0, runs = runs.len(), write, "vectorizing I/O runs");
        let mut merged: Vec<(usize, usize, StatementRef)> = Vec::new();
        for run in &runs {
            let statement = merge_run(ctx, run, write)?;
            for member in &run.members {
                replaced.insert(member.0, statement);
            }
            merged.push((run.range.0, run.range.1, statement));
        }
        // rebuild the container, source order preserved
        let mut updated = Vec::with_capacity(container.len());
        let mut next_run = 0;
        let mut position = 0;
        while position < container.len() {
            if next_run < merged.len() && merged[next_run].0 == position {
                updated.push(merged[next_run].2);
                position = merged[next_run].1 + 1;
                next_run += 1;
            } else {
                updated.push(container[position]);
                position += 1;
            }
        }
        let entry = ctx.module.statements.get_mut(block_ref).ok_or_else(|| {
            TransformError::internal(PASS, format!("block {block_ref} vanished"))
        })?;
        match &mut entry.body {
            StatementBody::Block { container } | StatementBody::ProgramDecl { container } => {
                *container = updated;
            }
            _ => unreachable!("filtered to blocks"),
        }
    }

    if replaced.is_empty() {
        return Ok(());
    }
    // remap references from everything that predates this pass; statements
    // created here (the lowered blocks) intentionally keep the originals
    use ebmc_core::VisitRefs;
    let mut rewrite = |kind: RefKind, r: AnyRef| -> AnyRef {
        if kind == RefKind::Statement {
            if let Some(new) = replaced.get(&r.0) {
                return AnyRef(new.0);
            }
        }
        r
    };
    for entry in ctx.module.statements.entries_mut().iter_mut().take(original_len) {
        entry.body.map_refs(&mut rewrite);
    }
    for entry in ctx.module.expressions.entries_mut() {
        entry.body.map_refs(&mut rewrite);
    }
    for entry in ctx.module.types.entries_mut() {
        entry.body.map_refs(&mut rewrite);
    }
    ctx.module.rewrite_aliases(|alias| {
        alias.from = rewrite(RefKind::Statement, alias.from);
        alias.to = rewrite(RefKind::Statement, alias.to);
        true
    });
    for loc in &mut ctx.module.debug_locs {
        loc.ident = rewrite(RefKind::Statement, loc.ident);
    }
    Ok(())
}
