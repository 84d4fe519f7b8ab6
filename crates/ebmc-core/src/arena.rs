//! Id-indexed arena repositories.
//!
//! Each arena is an ordered sequence of `{id, body}` entries with an
//! id-to-index cache. Insertion through [`Arena::add`] is the only way an id
//! is minted; [`Arena::add_with_id`] appends under a reserved id so a
//! statement can reference itself before its body exists.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::id::{IdSource, RefId, MAX_ID};

/// One arena entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry<R, B> {
    pub id: R,
    pub body: B,
}

/// Ordered, id-indexed store for one family of IR objects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Arena<R: RefId, B> {
    entries: Vec<Entry<R, B>>,
    #[serde(skip)]
    index: HashMap<u64, usize>,
}

impl<R: RefId, B> Arena<R, B> {
    pub fn new() -> Self {
        Arena { entries: Vec::new(), index: HashMap::new() }
    }

    /// Rebuilds an arena from deserialized entries.
    pub fn from_entries(entries: Vec<Entry<R, B>>) -> Self {
        let mut arena = Arena { entries, index: HashMap::new() };
        arena.rebuild_index();
        arena
    }

    /// Allocates a fresh id, appends `{id, body}`, returns the ref.
    pub fn add(&mut self, ids: &mut IdSource, body: B) -> Result<R> {
        let id = ids.next_id();
        if id > MAX_ID {
            return Err(CoreError::IdExhausted);
        }
        let r = R::from_value(id);
        self.index.insert(id, self.entries.len());
        self.entries.push(Entry { id: r, body });
        Ok(r)
    }

    /// Appends under an externally reserved id. Fails if the id is already
    /// present.
    pub fn add_with_id(&mut self, id: R, body: B) -> Result<R> {
        if self.index.contains_key(&id.value()) {
            return Err(CoreError::DuplicateId { id: id.value() });
        }
        self.index.insert(id.value(), self.entries.len());
        self.entries.push(Entry { id, body });
        Ok(id)
    }

    /// Looks up an entry by ref. Does not follow aliases; the module layer
    /// does.
    pub fn get(&self, r: R) -> Option<&Entry<R, B>> {
        self.index.get(&r.value()).map(|&i| &self.entries[i])
    }

    pub fn get_mut(&mut self, r: R) -> Option<&mut Entry<R, B>> {
        self.index.get(&r.value()).map(|&i| &mut self.entries[i])
    }

    pub fn contains(&self, r: R) -> bool {
        self.index.contains_key(&r.value())
    }

    pub fn entries(&self) -> &[Entry<R, B>] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [Entry<R, B>] {
        &mut self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops entries not matching the predicate and rebuilds the cache.
    pub fn retain(&mut self, mut keep: impl FnMut(&Entry<R, B>) -> bool) {
        self.entries.retain(|e| keep(e));
        self.rebuild_index();
    }

    /// Sorts entries by id and rebuilds the cache. Fails on duplicate ids.
    pub fn sort_by_id(&mut self) -> Result<()> {
        self.entries.sort_by_key(|e| e.id.value());
        self.rebuild_index();
        if self.index.len() != self.entries.len() {
            let mut seen = HashMap::new();
            for e in &self.entries {
                if seen.insert(e.id.value(), ()).is_some() {
                    return Err(CoreError::DuplicateId { id: e.id.value() });
                }
            }
        }
        Ok(())
    }

    /// Rebuilds the id-to-index cache. Must be called after any reordering
    /// or id rewrite done through `entries_mut`.
    pub fn rebuild_index(&mut self) {
        self.index.clear();
        for (i, e) in self.entries.iter().enumerate() {
            self.index.insert(e.id.value(), i);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::TypeRef;

    #[test]
    fn add_assigns_monotonic_ids() {
        let mut ids = IdSource::new();
        let mut arena: Arena<TypeRef, &str> = Arena::new();
        let a = arena.add(&mut ids, "a").unwrap();
        let b = arena.add(&mut ids, "b").unwrap();
        assert_eq!(a, TypeRef(2));
        assert_eq!(b, TypeRef(3));
        assert_eq!(arena.get(a).unwrap().body, "a");
    }

    #[test]
    fn add_with_id_rejects_duplicates() {
        let mut arena: Arena<TypeRef, &str> = Arena::new();
        arena.add_with_id(TypeRef(5), "x").unwrap();
        let err = arena.add_with_id(TypeRef(5), "y").unwrap_err();
        assert!(matches!(err, CoreError::DuplicateId { id: 5 }));
    }

    #[test]
    fn retain_and_reindex() {
        let mut ids = IdSource::new();
        let mut arena: Arena<TypeRef, u32> = Arena::new();
        let a = arena.add(&mut ids, 10).unwrap();
        let b = arena.add(&mut ids, 20).unwrap();
        arena.retain(|e| e.body != 10);
        assert!(arena.get(a).is_none());
        assert_eq!(arena.get(b).unwrap().body, 20);
        assert_eq!(arena.len(), 1);
    }

    proptest::proptest! {
        /// Ids stay unique and equal in cardinality to the arena length, no
        /// matter how many objects are added.
        #[test]
        fn ids_unique_and_cover_the_arena(count in 0usize..200) {
            let mut ids = IdSource::new();
            let mut arena: Arena<TypeRef, usize> = Arena::new();
            for i in 0..count {
                arena.add(&mut ids, i).unwrap();
            }
            let mut seen: std::collections::HashSet<u64> =
                arena.entries().iter().map(|e| e.id.value()).collect();
            proptest::prop_assert_eq!(seen.len(), arena.len());
            seen.retain(|id| *id >= 2);
            proptest::prop_assert_eq!(seen.len(), arena.len());
        }
    }

    #[test]
    fn sort_by_id_detects_duplicates() {
        let mut arena: Arena<TypeRef, u32> = Arena::new();
        arena.add_with_id(TypeRef(9), 1).unwrap();
        // force a duplicate through the raw entries to simulate a buggy pass
        arena.entries_mut()[0].id = TypeRef(9);
        arena.add_with_id(TypeRef(4), 2).unwrap();
        arena.entries_mut()[1].id = TypeRef(9);
        assert!(arena.sort_by_id().is_err());
    }
}
