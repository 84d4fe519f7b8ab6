//! Dynamic bit-field I/O lowering.
//!
//! For every fixed-size bit read/write, search forward in the CFG for all
//! simple paths whose accumulated size reaches a byte boundary before any
//! non-fixed I/O shows up. Each such path is a byte-aligned group: the
//! statements on it get a lowered form that packs or unpacks through one
//! temporary byte buffer. Positions are constant-folded when every route
//! agrees on a statement's bit offset; otherwise the run-time cursor form is
//! emitted.

use std::collections::{HashMap, HashSet, VecDeque};

use ebmc_convert::{make_io_data, Build};
use ebmc_core::{
    BinaryOp, Endian, ExpressionRef, IoSize, LoweredStatement, LoweringKind, SizeUnit,
    StatementBody, StatementRef, TypeRef,
};
use petgraph::stable_graph::NodeIndex;
use petgraph::Direction;

use crate::bits::BitManipulator;
use crate::cfg::{CfgSet, FunctionCfg};
use crate::ctx::TransformCtx;
use crate::error::{Result, TransformError};

const PASS: &str = "lowered_dynamic_bit_io";

#[derive(Clone)]
struct Route {
    nodes: Vec<NodeIndex>,
    bits: u64,
}

fn io_of(body: &StatementBody, write: bool) -> Option<&ebmc_core::IoData> {
    match (body, write) {
        (StatementBody::WriteData(d), true) | (StatementBody::ReadData(d), false) => Some(d),
        _ => None,
    }
}

/// BFS over `next` edges accumulating fixed sizes; routes terminate when the
/// total hits a multiple of eight and die on non-fixed I/O. Route length is
/// capped by the graph size as a cycle guard.
fn search_byte_aligned_routes(
    ctx: &TransformCtx,
    function: &FunctionCfg,
    root: NodeIndex,
    root_bits: u64,
    write: bool,
) -> Vec<Route> {
    let node_cap = function.cfg.graph.node_count();
    let mut finalized = Vec::new();
    let mut candidates = VecDeque::new();
    candidates.push_back(Route { nodes: vec![root], bits: root_bits });
    while let Some(route) = candidates.pop_front() {
        if route.nodes.len() > node_cap {
            continue;
        }
        let last = *route.nodes.last().expect("route never empty");
        for next in function.cfg.graph.neighbors_directed(last, Direction::Outgoing) {
            let mut grown = route.clone();
            grown.nodes.push(next);
            let statement = function.cfg.graph[next].statement;
            let Some(entry) = ctx.module.get_statement(statement) else {
                continue; // synthetic node, drop the route
            };
            if let Some(io) = io_of(&entry.body, write) {
                match io.size.bits() {
                    Some(bits) => {
                        grown.bits += bits;
                        if grown.bits % 8 == 0 {
                            finalized.push(grown);
                            continue;
                        }
                    }
                    None => continue, // non-fixed I/O kills the route
                }
            }
            candidates.push_back(grown);
        }
    }
    finalized
}

/// Per-node constant offset across routes: `Some(bits)` when every route
/// reaches the node at the same accumulated offset.
fn stable_offsets(
    ctx: &TransformCtx,
    routes: &[Route],
    write: bool,
    function: &FunctionCfg,
) -> HashMap<NodeIndex, Option<u64>> {
    let mut offsets: HashMap<NodeIndex, Option<u64>> = HashMap::new();
    for route in routes {
        let mut cursor = 0u64;
        for &node in &route.nodes {
            let statement = function.cfg.graph[node].statement;
            let Some(entry) = ctx.module.get_statement(statement) else { continue };
            let Some(io) = io_of(&entry.body, write) else { continue };
            let Some(bits) = io.size.bits() else { continue };
            offsets
                .entry(node)
                .and_modify(|existing| {
                    if *existing != Some(cursor) {
                        *existing = None;
                    }
                })
                .or_insert(Some(cursor));
            cursor += bits;
        }
    }
    offsets
}

struct GroupState {
    buffer: ExpressionRef,
    buffer_def: StatementRef,
    buffer_type: TypeRef,
    cursor: ExpressionRef,
    cursor_def: StatementRef,
    read_offset: ExpressionRef,
    read_offset_def: StatementRef,
}

fn group_state(ctx: &mut TransformCtx, max_bits: u64) -> Result<GroupState> {
    let buffer_type = ctx.u8_array_type(max_bits / 8)?;
    let counter_type = ctx.counter_type()?;
    let init = ctx.default_value(buffer_type)?;
    let (buffer, buffer_def) = ctx.define_anon_var(buffer_type, init)?;
    let zero = ctx.int_literal(0)?;
    let (cursor, cursor_def) = ctx.define_anon_var(counter_type, zero)?;
    let zero = ctx.int_literal(0)?;
    let (read_offset, read_offset_def) = ctx.define_anon_var(counter_type, zero)?;
    Ok(GroupState {
        buffer,
        buffer_def,
        buffer_type,
        cursor,
        cursor_def,
        read_offset,
        read_offset_def,
    })
}

/// `while read_offset < ceil((cursor + added)/8): buf[read_offset++] = read u8`.
fn read_incremental(
    ctx: &mut TransformCtx,
    state: &GroupState,
    io_ref: StatementRef,
    new_size_bits: ExpressionRef,
) -> Result<StatementRef> {
    let counter_type = ctx.counter_type()?;
    let bool_type = ctx.bool_type()?;
    let u8t = ctx.uint_type(8)?;
    let seven = ctx.int_literal(7)?;
    let eight = ctx.int_literal(8)?;
    let rounded = ctx.binary(BinaryOp::Add, counter_type, new_size_bits, seven)?;
    let new_size = ctx.binary(BinaryOp::Div, counter_type, rounded, eight)?;
    let cond = ctx.binary(BinaryOp::Less, bool_type, state.read_offset, new_size)?;
    let slot = ctx.index(u8t, state.buffer, state.read_offset)?;
    let read = ctx.add_stmt(StatementBody::ReadData(make_io_data(
        io_ref,
        StatementRef::NIL,
        slot,
        u8t,
        Default::default(),
        IoSize::fixed(1, SizeUnit::ByteFixed),
    )))?;
    let bump = ctx.increment(state.read_offset, counter_type)?;
    let body = ctx.block(vec![read, bump])?;
    ctx.while_loop(cond, body).map_err(Into::into)
}

/// One write of the packed buffer, `new_size_bits / 8` bytes.
fn flush_buffer(
    ctx: &mut TransformCtx,
    state: &GroupState,
    io_ref: StatementRef,
    new_size_bits: ExpressionRef,
) -> Result<StatementRef> {
    let counter_type = ctx.counter_type()?;
    let eight = ctx.int_literal(8)?;
    let bytes = ctx.binary(BinaryOp::Div, counter_type, new_size_bits, eight)?;
    let io = make_io_data(
        io_ref,
        StatementRef::NIL,
        state.buffer,
        state.buffer_type,
        Default::default(),
        IoSize::dynamic(bytes, SizeUnit::ByteDynamic),
    );
    ctx.add_stmt(StatementBody::WriteData(io)).map_err(Into::into)
}

/// Appends a lowered alternative to a statement's `LOWERED_STATEMENTS`,
/// creating the list when absent, and flags the attribute.
fn attach_lowered(
    ctx: &mut TransformCtx,
    statement: StatementRef,
    block: StatementRef,
) -> Result<()> {
    let existing = ctx
        .module
        .get_statement(statement)
        .and_then(|e| e.body.io_data())
        .map(|io| io.lowered_statement)
        .ok_or_else(|| TransformError::internal(PASS, format!("{statement} is not I/O")))?;
    if existing.is_nil() {
        let lowered = ctx.add_stmt(StatementBody::LoweredStatements {
            alternatives: vec![LoweredStatement {
                lowering_kind: LoweringKind::DynamicBits,
                block,
            }],
        })?;
        let io = ctx
            .module
            .statements
            .get_mut(statement)
            .and_then(|e| e.body.io_data_mut())
            .ok_or_else(|| TransformError::internal(PASS, format!("{statement} vanished")))?;
        io.lowered_statement = lowered;
        io.attribute.has_lowered_statement = true;
    } else {
        let entry = ctx.module.statements.get_mut(existing).ok_or_else(|| {
            TransformError::internal(PASS, format!("unresolved lowered list {existing}"))
        })?;
        let StatementBody::LoweredStatements { alternatives } = &mut entry.body else {
            return Err(TransformError::internal(
                PASS,
                format!("{existing} is not a lowered list"),
            ));
        };
        alternatives.push(LoweredStatement {
            lowering_kind: LoweringKind::DynamicBits,
            block,
        });
        let io = ctx
            .module
            .statements
            .get_mut(statement)
            .and_then(|e| e.body.io_data_mut())
            .ok_or_else(|| TransformError::internal(PASS, format!("{statement} vanished")))?;
        io.attribute.has_lowered_statement = true;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn lower_group(
    ctx: &mut TransformCtx,
    function: &FunctionCfg,
    io_ref: StatementRef,
    routes: &[Route],
    write: bool,
) -> Result<()> {
    let max_bits = routes.iter().map(|r| r.bits).max().unwrap_or(0);
    if max_bits == 0 {
        return Ok(());
    }
    tracing::debug!(routes = routes.len(), max_bits, write, "byte-aligned group found");
    let state = group_state(ctx, max_bits)?;
    let u8t = ctx.uint_type(8)?;
    let counter_type = ctx.counter_type()?;
    let manip = BitManipulator::new(state.buffer, u8t);
    let offsets = stable_offsets(ctx, routes, write, function);

    let mut reached: HashSet<NodeIndex> = HashSet::new();
    for route in routes {
        for (position, &node) in route.nodes.iter().enumerate() {
            if !reached.insert(node) {
                continue;
            }
            let statement = function.cfg.graph[node].statement;
            let Some(entry) = ctx.module.get_statement(statement) else { continue };
            let Some(io) = io_of(&entry.body, write) else { continue };
            let io = io.clone();
            let Some(add_bits) = io.size.bits() else { continue };

            let endian = match io.attribute.endian {
                Endian::Little => Endian::Little,
                _ => Endian::Big,
            };
            let value_type = ctx.uint_type(add_bits as u8)?;
            let bits_lit = ctx.int_literal(add_bits)?;
            let new_size_bits =
                ctx.binary(BinaryOp::Add, counter_type, state.cursor, bits_lit)?;
            let advance = ctx.assign(state.cursor, new_size_bits)?;

            let mut container = Vec::new();
            if position == 0 {
                container.push(state.buffer_def);
                container.push(state.cursor_def);
                if !write {
                    container.push(state.read_offset_def);
                }
            }
            if write {
                let narrowed = ctx.cast(value_type, io.data_type, io.target)?;
                let pack = match offsets.get(&node).copied().flatten() {
                    Some(start) => manip.write_bits(
                        ctx, start, add_bits, endian, value_type, narrowed,
                    )?,
                    None => manip.write_bits_dynamic(
                        ctx,
                        state.cursor,
                        add_bits,
                        endian,
                        value_type,
                        narrowed,
                    )?,
                };
                container.push(pack);
                if position + 1 == route.nodes.len() {
                    let flush = flush_buffer(ctx, &state, io_ref, new_size_bits)?;
                    container.push(flush);
                }
            } else {
                let fill = read_incremental(ctx, &state, io_ref, new_size_bits)?;
                container.push(fill);
                let init = ctx.default_value(value_type)?;
                let (holder, holder_def) = ctx.define_anon_var(value_type, init)?;
                container.push(holder_def);
                let unpack = match offsets.get(&node).copied().flatten() {
                    Some(start) => {
                        manip.read_bits(ctx, start, add_bits, endian, value_type, holder)?
                    }
                    None => manip.read_bits_dynamic(
                        ctx,
                        state.cursor,
                        add_bits,
                        endian,
                        value_type,
                        holder,
                    )?,
                };
                container.push(unpack);
                let casted = ctx.cast(io.data_type, value_type, holder)?;
                let store = ctx.assign(io.target, casted)?;
                container.push(store);
            }
            container.push(advance);
            let block = ctx.block(container)?;
            attach_lowered(ctx, statement, block)?;
        }
    }
    Ok(())
}

/// The pass entry: one direction (read or write) over every block in the
/// module.
pub fn lowered_dynamic_bit_io(
    ctx: &mut TransformCtx,
    cfg: &CfgSet,
    write: bool,
) -> Result<()> {
    let block_count = ctx.module.statements.len();
    let mut targets = Vec::new();
    for entry in ctx.module.statements.entries().iter().take(block_count) {
        let Some(container) = entry.body.block() else { continue };
        for child in container {
            let Some(child_entry) = ctx.module.get_statement(*child) else { continue };
            let Some(io) = io_of(&child_entry.body, write) else { continue };
            if io.size.unit == SizeUnit::BitFixed {
                targets.push((*child, io.io_ref, io.size.fixed_value().unwrap_or(0)));
            }
        }
    }
    for (statement, io_ref, bits) in targets {
        let Some((function, node)) = cfg.node_of(statement) else {
            return Err(TransformError::internal(
                PASS,
                format!("no CFG node for statement {statement}"),
            ));
        };
        let routes = search_byte_aligned_routes(ctx, function, node, bits, write);
        if !routes.is_empty() {
            lower_group(ctx, function, io_ref, &routes, write)?;
        }
    }
    Ok(())
}
