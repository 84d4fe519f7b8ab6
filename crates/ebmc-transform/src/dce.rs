//! Dead-object elimination and id renumbering.
//!
//! Reachability runs to a fixed point over the use-graph: an object survives
//! when it is the entry point, when some live object references it, or when
//! a live alias forwards to it. Survivors are then renumbered by descending
//! use count (stable on arena order), ids 2..N+1, with the entry point
//! taking the final id; every ref in the module is rewritten through the
//! old-to-new map and the arenas are re-sorted.

use std::collections::{HashMap, HashSet};

use ebmc_core::{AnyRef, Module, StatementRef, ENTRY_ID};

use crate::ctx::TransformCtx;
use crate::error::{Result, TransformError};

const PASS: &str = "remove_unused_object";

/// Inverse-use counts over arena bodies plus alias forwarding: a live alias
/// source makes its target used.
fn collect_used(module: &Module) -> HashMap<u64, u64> {
    let mut used: HashMap<u64, u64> = HashMap::new();
    for (target, holders) in module.inverse_refs() {
        used.insert(target, holders.len() as u64);
    }
    for alias in module.aliases() {
        if used.contains_key(&alias.from.0) {
            *used.entry(alias.to.0).or_insert(0) += 1;
        }
    }
    used
}

fn arena_ids(module: &Module) -> Vec<u64> {
    let mut ids = Vec::with_capacity(
        module.identifiers.len()
            + module.strings.len()
            + module.types.len()
            + module.statements.len()
            + module.expressions.len(),
    );
    ids.extend(module.identifiers.entries().iter().map(|e| e.id.0));
    ids.extend(module.strings.entries().iter().map(|e| e.id.0));
    ids.extend(module.types.entries().iter().map(|e| e.id.0));
    ids.extend(module.statements.entries().iter().map(|e| e.id.0));
    ids.extend(module.expressions.entries().iter().map(|e| e.id.0));
    ids
}

/// The pass entry. Returns the number of removed objects.
pub fn remove_unused_object(ctx: &mut TransformCtx) -> Result<usize> {
    let module = &mut ctx.module;
    let before = arena_ids(module).len();

    // reachability to a fixed point
    let mut used = collect_used(module);
    loop {
        let mut dead: HashSet<u64> = HashSet::new();
        for id in arena_ids(module) {
            if id != ENTRY_ID && !used.contains_key(&id) {
                dead.insert(id);
            }
        }
        if dead.is_empty() {
            break;
        }
        module.identifiers.retain(|e| !dead.contains(&e.id.0));
        module.strings.retain(|e| !dead.contains(&e.id.0));
        module.types.retain(|e| !dead.contains(&e.id.0));
        module.statements.retain(|e| !dead.contains(&e.id.0));
        module.expressions.retain(|e| !dead.contains(&e.id.0));
        module.rewrite_aliases(|alias| {
            !dead.contains(&alias.from.0) && !dead.contains(&alias.to.0)
        });
        used = collect_used(module);
    }

    // renumber: descending use count, stable on arena order; the entry point
    // takes the last id
    let mut ranked: Vec<(u64, u64)> = Vec::new();
    let mut listed: HashSet<u64> = HashSet::new();
    for id in arena_ids(module) {
        if id == ENTRY_ID || !listed.insert(id) {
            continue;
        }
        ranked.push((id, used.get(&id).copied().unwrap_or(0)));
    }
    for alias in module.aliases() {
        let id = alias.from.0;
        if id != ENTRY_ID && listed.insert(id) {
            ranked.push((id, used.get(&id).copied().unwrap_or(0)));
        }
    }
    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    let mut old_to_new: HashMap<u64, u64> = HashMap::new();
    let mut next = ENTRY_ID + 1;
    for (old, _) in &ranked {
        old_to_new.insert(*old, next);
        next += 1;
    }
    old_to_new.insert(ENTRY_ID, next);
    let final_max = next;

    // debug entries whose identifying ref was removed are dropped
    module
        .debug_locs
        .retain(|loc| old_to_new.contains_key(&loc.ident.0));

    module.map_all_refs(&mut |_, r: AnyRef| match old_to_new.get(&r.0) {
        Some(new) => AnyRef(*new),
        None => r,
    });
    module.set_max_id(final_max);
    module.finalize()?;

    if module.get_statement(StatementRef(final_max)).is_none() {
        return Err(TransformError::internal(PASS, "entry point lost in renumbering".to_string()));
    }
    let after = arena_ids(module).len();
    tracing::info!(removed = before - after, live = after, "dead objects removed");
    Ok(before - after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ebmc_core::{ExprOp, ExpressionBody, StatementBody, TypeBody};

    #[test]
    fn unused_objects_disappear_and_ids_compact() {
        let mut m = Module::new();
        let used_t = m.add_type(TypeBody::Uint { size: 8 }).unwrap();
        let _unused_t = m.add_type(TypeBody::Uint { size: 32 }).unwrap();
        let _unused_ident = m.add_identifier("never").unwrap();
        let lit = m
            .add_expression(ExpressionBody::new(used_t, ExprOp::LiteralInt { value: 3 }))
            .unwrap();
        let stmt = m.add_statement(StatementBody::Expression { expression: lit }).unwrap();
        m.statements
            .add_with_id(StatementRef::ENTRY, StatementBody::Block { container: vec![stmt] })
            .unwrap();
        let max_before = m.max_id();

        let mut ctx = TransformCtx::new(m);
        let removed = remove_unused_object(&mut ctx).unwrap();
        let m = ctx.into_module();
        assert_eq!(removed, 2);
        assert!(m.identifiers.is_empty());
        assert_eq!(m.types.len(), 1);
        assert!(m.max_id() < max_before);
        // live ids are contiguous from 2 through max, entry last
        let mut ids = arena_ids(&m);
        ids.sort_unstable();
        let expected: Vec<u64> = (2..=m.max_id()).collect();
        assert_eq!(ids, expected);
        assert!(m.get_statement(StatementRef(m.max_id())).is_some());
        m.validate().unwrap();
    }

    #[test]
    fn usage_order_puts_hot_objects_first() {
        let mut m = Module::new();
        let hot = m.add_type(TypeBody::Uint { size: 8 }).unwrap();
        let cold = m.add_type(TypeBody::Bool).unwrap();
        let a = m
            .add_expression(ExpressionBody::new(hot, ExprOp::DefaultValue))
            .unwrap();
        let b = m
            .add_expression(ExpressionBody::new(hot, ExprOp::DefaultValue))
            .unwrap();
        let c = m
            .add_expression(ExpressionBody::new(cold, ExprOp::DefaultValue))
            .unwrap();
        let s1 = m.add_statement(StatementBody::Expression { expression: a }).unwrap();
        let s2 = m.add_statement(StatementBody::Expression { expression: b }).unwrap();
        let s3 = m.add_statement(StatementBody::Expression { expression: c }).unwrap();
        m.statements
            .add_with_id(
                StatementRef::ENTRY,
                StatementBody::Block { container: vec![s1, s2, s3] },
            )
            .unwrap();

        let mut ctx = TransformCtx::new(m);
        remove_unused_object(&mut ctx).unwrap();
        let m = ctx.into_module();
        // the twice-used scalar type got the smallest surviving id
        let hot_entry = m
            .types
            .entries()
            .iter()
            .find(|e| e.body == TypeBody::Uint { size: 8 })
            .unwrap();
        assert_eq!(hot_entry.id.0, 2);
    }
}
