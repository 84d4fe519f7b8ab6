//! The `Module`: five arenas, the alias table, and debug info.
//!
//! All lookups go through the module so that aliases are followed
//! transparently. The converter and every transform pass mutate exactly one
//! module; passes that reorder or renumber call [`Module::finalize`] to
//! rebuild the caches before anyone reads again.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::arena::{Arena, Entry};
use crate::error::{CoreError, Result};
use crate::expr::{ExpressionBody, ExpressionKind};
use crate::id::{
    AnyRef, ExpressionRef, IdSource, IdentifierRef, RefId, RefKind, StatementRef, StringRef,
    TypeRef, ENTRY_ID,
};
use crate::ops::AliasHint;
use crate::stmt::{StatementBody, StatementKind};
use crate::types::{TypeBody, TypeKind};
use crate::visit::VisitRefs;

/// Serialization format version of the EBM binary form.
pub const FORMAT_VERSION: u8 = 1;

/// An interned identifier. An empty name marks an anonymous (converter
/// generated) identifier; printers render those as `tmp<id>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identifier {
    pub name: String,
}

/// An interned string literal, stored as its decoded bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StringLiteral {
    pub data: Vec<u8>,
}

/// A forwarding entry: lookups of `from` resolve to `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    pub from: AnyRef,
    pub to: AnyRef,
    pub hint: AliasHint,
}

/// Source location attached to a declaration for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugLoc {
    pub ident: AnyRef,
    pub file: StringRef,
    pub line: u64,
    pub column: u64,
}

/// A holder of some ref, produced by the inverse-ref walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InverseRef {
    pub holder: AnyRef,
    pub holder_kind: RefKind,
}

/// The Extended Binary Module under construction or transformation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub identifiers: Arena<IdentifierRef, Identifier>,
    pub strings: Arena<StringRef, StringLiteral>,
    pub types: Arena<TypeRef, TypeBody>,
    pub statements: Arena<StatementRef, StatementBody>,
    pub expressions: Arena<ExpressionRef, ExpressionBody>,
    aliases: Vec<Alias>,
    #[serde(skip)]
    alias_index: HashMap<u64, AnyRef>,
    pub debug_files: Vec<StringRef>,
    pub debug_locs: Vec<DebugLoc>,
    pub ids: IdSource,
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

impl Module {
    pub fn new() -> Self {
        Module {
            identifiers: Arena::new(),
            strings: Arena::new(),
            types: Arena::new(),
            statements: Arena::new(),
            expressions: Arena::new(),
            aliases: Vec::new(),
            alias_index: HashMap::new(),
            debug_files: Vec::new(),
            debug_locs: Vec::new(),
            ids: IdSource::new(),
        }
    }

    /// The highest id handed out so far.
    pub fn max_id(&self) -> u64 {
        self.ids.current()
    }

    /// Restores the id source after loading a serialized module.
    pub fn set_max_id(&mut self, max_id: u64) {
        self.ids.reset(max_id);
    }

    // -- insertion ---------------------------------------------------------

    pub fn add_type(&mut self, body: TypeBody) -> Result<TypeRef> {
        self.types.add(&mut self.ids, body)
    }

    pub fn add_statement(&mut self, body: StatementBody) -> Result<StatementRef> {
        self.statements.add(&mut self.ids, body)
    }

    pub fn add_expression(&mut self, body: ExpressionBody) -> Result<ExpressionRef> {
        self.expressions.add(&mut self.ids, body)
    }

    pub fn add_identifier(&mut self, name: impl Into<String>) -> Result<IdentifierRef> {
        self.identifiers.add(&mut self.ids, Identifier { name: name.into() })
    }

    /// A fresh anonymous identifier.
    pub fn add_anonymous_identifier(&mut self) -> Result<IdentifierRef> {
        self.add_identifier(String::new())
    }

    pub fn add_string(&mut self, data: impl Into<Vec<u8>>) -> Result<StringRef> {
        self.strings.add(&mut self.ids, StringLiteral { data: data.into() })
    }

    /// Reserves a statement id without a body; pair with
    /// [`Arena::add_with_id`] on `statements`.
    pub fn reserve_statement_id(&mut self) -> Result<StatementRef> {
        let id = self.ids.next_id();
        if id > crate::id::MAX_ID {
            return Err(CoreError::IdExhausted);
        }
        Ok(StatementRef(id))
    }

    // -- aliases -----------------------------------------------------------

    /// Records `from -> to`. `to` must not itself be an alias source.
    pub fn add_alias(&mut self, from: AnyRef, to: AnyRef, hint: AliasHint) -> Result<()> {
        if self.alias_index.contains_key(&to.0) {
            return Err(CoreError::AliasToAlias { from, to });
        }
        self.alias_index.insert(from.0, to);
        self.aliases.push(Alias { from, to, hint });
        Ok(())
    }

    pub fn aliases(&self) -> &[Alias] {
        &self.aliases
    }

    /// Rewrites the alias vector in place and rebuilds the lookup cache.
    pub fn rewrite_aliases(&mut self, f: impl FnMut(&mut Alias) -> bool) {
        let mut f = f;
        self.aliases.retain_mut(|a| f(a));
        self.rebuild_alias_index();
    }

    fn rebuild_alias_index(&mut self) {
        self.alias_index.clear();
        for a in &self.aliases {
            self.alias_index.insert(a.from.0, a.to);
        }
    }

    fn resolve<R: RefId>(&self, r: R, in_arena: impl Fn(R) -> bool) -> R {
        let mut cur = r;
        // alias chains are forbidden at insertion, so one hop suffices; the
        // loop guards modules loaded from outside.
        let mut hops = 0;
        while !in_arena(cur) && hops <= self.aliases.len() {
            match self.alias_index.get(&cur.value()) {
                Some(next) => cur = R::from_value(next.0),
                None => break,
            }
            hops += 1;
        }
        cur
    }

    // -- lookups (alias-following) -----------------------------------------

    pub fn get_type(&self, r: TypeRef) -> Option<&Entry<TypeRef, TypeBody>> {
        let r = self.resolve(r, |x| self.types.contains(x));
        self.types.get(r)
    }

    pub fn get_statement(&self, r: StatementRef) -> Option<&Entry<StatementRef, StatementBody>> {
        let r = self.resolve(r, |x| self.statements.contains(x));
        self.statements.get(r)
    }

    pub fn get_expression(
        &self,
        r: ExpressionRef,
    ) -> Option<&Entry<ExpressionRef, ExpressionBody>> {
        let r = self.resolve(r, |x| self.expressions.contains(x));
        self.expressions.get(r)
    }

    pub fn get_identifier(&self, r: IdentifierRef) -> Option<&Identifier> {
        let r = self.resolve(r, |x| self.identifiers.contains(x));
        self.identifiers.get(r).map(|e| &e.body)
    }

    pub fn get_string(&self, r: StringRef) -> Option<&StringLiteral> {
        let r = self.resolve(r, |x| self.strings.contains(x));
        self.strings.get(r).map(|e| &e.body)
    }

    pub fn type_kind(&self, r: TypeRef) -> Option<TypeKind> {
        self.get_type(r).map(|e| e.body.kind())
    }

    pub fn statement_kind(&self, r: StatementRef) -> Option<StatementKind> {
        self.get_statement(r).map(|e| e.body.kind())
    }

    pub fn expression_kind(&self, r: ExpressionRef) -> Option<ExpressionKind> {
        self.get_expression(r).map(|e| e.body.kind())
    }

    /// The identifier's name, or `<prefix><fallback id>` when the identifier
    /// is absent or anonymous.
    pub fn identifier_or(&self, r: IdentifierRef, fallback: AnyRef, prefix: &str) -> String {
        match self.get_identifier(r) {
            Some(ident) if !ident.name.is_empty() => ident.name.clone(),
            _ => format!("{prefix}{fallback}"),
        }
    }

    /// The module's root statement.
    pub fn entry_point(&self) -> Option<&Entry<StatementRef, StatementBody>> {
        self.get_statement(StatementRef(ENTRY_ID))
    }

    // -- whole-module walks -------------------------------------------------

    /// Builds the inverse-ref map in one pass over the arenas: for each
    /// target id, the list of holders referencing it.
    pub fn inverse_refs(&self) -> HashMap<u64, Vec<InverseRef>> {
        let mut map: HashMap<u64, Vec<InverseRef>> = HashMap::new();
        fn scan<R: RefId, B: VisitRefs>(
            arena: &Arena<R, B>,
            kind: RefKind,
            map: &mut HashMap<u64, Vec<InverseRef>>,
        ) {
            for e in arena.entries() {
                let holder = InverseRef { holder: e.id.into(), holder_kind: kind };
                e.body.for_each_ref(&mut |_, target| {
                    map.entry(target.0).or_default().push(holder);
                });
            }
        }
        scan(&self.types, RefKind::Type, &mut map);
        scan(&self.statements, RefKind::Statement, &mut map);
        scan(&self.expressions, RefKind::Expression, &mut map);
        map
    }

    /// Rewrites every ref held anywhere in the module (arena bodies, entry
    /// ids, aliases, debug locations) through the supplied mapping.
    pub fn map_all_refs(&mut self, f: &mut dyn FnMut(RefKind, AnyRef) -> AnyRef) {
        fn remap<R: RefId, B: VisitRefs>(
            arena: &mut Arena<R, B>,
            kind: RefKind,
            f: &mut dyn FnMut(RefKind, AnyRef) -> AnyRef,
        ) {
            for e in arena.entries_mut() {
                e.id = R::from_value(f(kind, e.id.into()).0);
                e.body.map_refs(f);
            }
            arena.rebuild_index();
        }
        remap(&mut self.identifiers, RefKind::Identifier, f);
        remap(&mut self.strings, RefKind::String, f);
        remap(&mut self.types, RefKind::Type, f);
        remap(&mut self.statements, RefKind::Statement, f);
        remap(&mut self.expressions, RefKind::Expression, f);
        for a in &mut self.aliases {
            let kind = match a.hint {
                AliasHint::Identifier => RefKind::Identifier,
                AliasHint::String => RefKind::String,
                AliasHint::Type => RefKind::Type,
                AliasHint::Statement => RefKind::Statement,
                AliasHint::Expression => RefKind::Expression,
            };
            a.from = f(kind, a.from);
            a.to = f(kind, a.to);
        }
        self.rebuild_alias_index();
        for loc in &mut self.debug_locs {
            loc.ident = f(RefKind::Statement, loc.ident);
            loc.file.map_refs(f);
        }
        for file in &mut self.debug_files {
            file.map_refs(f);
        }
    }

    /// Sorts every arena by id, rebuilds all caches, and checks id
    /// uniqueness. Run after any pass that reorders or renumbers.
    pub fn finalize(&mut self) -> Result<()> {
        self.identifiers.sort_by_id()?;
        self.strings.sort_by_id()?;
        self.types.sort_by_id()?;
        self.statements.sort_by_id()?;
        self.expressions.sort_by_id()?;
        self.aliases.sort_by_key(|a| a.from.0);
        self.rebuild_alias_index();
        Ok(())
    }

    /// Checks that every held ref resolves in its arena (possibly via an
    /// alias). Returns the first dangling ref.
    pub fn validate(&self) -> Result<()> {
        let mut dangling: Option<(RefKind, AnyRef)> = None;
        let mut check = |kind: RefKind, r: AnyRef, ok: bool| {
            if !ok && dangling.is_none() {
                dangling = Some((kind, r));
            }
        };
        let mut visit = |kind: RefKind, r: AnyRef| {
            let ok = match kind {
                RefKind::Identifier => self.get_identifier(IdentifierRef(r.0)).is_some(),
                RefKind::String => self.get_string(StringRef(r.0)).is_some(),
                RefKind::Type => self.get_type(TypeRef(r.0)).is_some(),
                RefKind::Statement => self.get_statement(StatementRef(r.0)).is_some(),
                RefKind::Expression => self.get_expression(ExpressionRef(r.0)).is_some(),
            };
            check(kind, r, ok);
        };
        for e in self.types.entries() {
            e.body.for_each_ref(&mut visit);
        }
        for e in self.statements.entries() {
            e.body.for_each_ref(&mut visit);
        }
        for e in self.expressions.entries() {
            e.body.for_each_ref(&mut visit);
        }
        match dangling {
            Some((kind, r)) => Err(CoreError::Inconsistency {
                reason: format!("dangling {kind:?} ref {r}"),
            }),
            None => Ok(()),
        }
    }

    /// Rebuilds every id-to-index cache without reordering. Needed after
    /// deserialization.
    pub fn rebuild_caches(&mut self) {
        self.identifiers.rebuild_index();
        self.strings.rebuild_index();
        self.types.rebuild_index();
        self.statements.rebuild_index();
        self.expressions.rebuild_index();
        self.rebuild_alias_index();
    }

    /// Replaces the alias vector wholesale (deserialization).
    pub fn set_aliases(&mut self, aliases: Vec<Alias>) {
        self.aliases = aliases;
        self.rebuild_alias_index();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ExprOp;

    #[test]
    fn lookup_follows_alias() {
        let mut m = Module::new();
        let t = m.add_type(TypeBody::Bool).unwrap();
        let ghost = TypeRef(999);
        m.add_alias(ghost.into(), t.into(), AliasHint::Type).unwrap();
        assert_eq!(m.get_type(ghost).unwrap().id, t);
        assert_eq!(m.type_kind(ghost), Some(TypeKind::Bool));
    }

    #[test]
    fn alias_to_alias_is_rejected() {
        let mut m = Module::new();
        let t = m.add_type(TypeBody::Void).unwrap();
        m.add_alias(AnyRef(50), t.into(), AliasHint::Type).unwrap();
        let err = m.add_alias(AnyRef(51), AnyRef(50), AliasHint::Type).unwrap_err();
        assert!(matches!(err, CoreError::AliasToAlias { .. }));
    }

    #[test]
    fn inverse_refs_find_all_holders() {
        let mut m = Module::new();
        let t = m.add_type(TypeBody::Uint { size: 8 }).unwrap();
        let e = m
            .add_expression(ExpressionBody::new(t, ExprOp::LiteralInt { value: 1 }))
            .unwrap();
        let s = m
            .add_statement(StatementBody::Expression { expression: e })
            .unwrap();
        let inv = m.inverse_refs();
        let holders: Vec<u64> = inv[&t.0].iter().map(|h| h.holder.0).collect();
        assert_eq!(holders, vec![e.0]);
        assert_eq!(inv[&e.0][0].holder.0, s.0);
        assert!(!inv.contains_key(&s.0));
    }

    #[test]
    fn validate_catches_dangling_refs() {
        let mut m = Module::new();
        let t = m.add_type(TypeBody::Uint { size: 8 }).unwrap();
        m.add_expression(ExpressionBody::new(t, ExprOp::Identifier { decl: StatementRef(77) }))
            .unwrap();
        assert!(m.validate().is_err());
    }

    #[test]
    fn map_all_refs_rewrites_ids_and_bodies() {
        let mut m = Module::new();
        let t = m.add_type(TypeBody::Uint { size: 8 }).unwrap();
        let e = m
            .add_expression(ExpressionBody::new(t, ExprOp::DefaultValue))
            .unwrap();
        m.map_all_refs(&mut |_, r| AnyRef(r.0 + 10));
        assert!(m.get_type(t).is_none());
        let moved = m.get_expression(ExpressionRef(e.0 + 10)).unwrap();
        assert_eq!(moved.body.ty, TypeRef(t.0 + 10));
        assert!(m.validate().is_ok());
    }

    #[test]
    fn identifier_or_falls_back_for_anonymous() {
        let mut m = Module::new();
        let anon = m.add_anonymous_identifier().unwrap();
        let named = m.add_identifier("field").unwrap();
        assert_eq!(m.identifier_or(anon, AnyRef(7), "tmp"), "tmp7");
        assert_eq!(m.identifier_or(named, AnyRef(7), "tmp"), "field");
    }
}
