//! Transform pass context.

use std::collections::HashMap;

use ebmc_convert::Build;
use ebmc_core::{Module, TypeBody, TypeRef};

/// Owns the module between passes and carries the type-interning cache the
/// construction helpers expect. Passes take `&mut TransformCtx`; a pass that
/// renumbers ids must leave the module finalized.
pub struct TransformCtx {
    pub module: Module,
    intern: HashMap<TypeBody, TypeRef>,
}

impl TransformCtx {
    pub fn new(module: Module) -> Self {
        // seed the cache from the existing arena; first occurrence wins so
        // interning stays stable across converter and transform stages
        let mut intern = HashMap::new();
        for entry in module.types.entries() {
            intern.entry(entry.body.clone()).or_insert(entry.id);
        }
        TransformCtx { module, intern }
    }

    pub fn into_module(self) -> Module {
        self.module
    }
}

impl Build for TransformCtx {
    fn module(&self) -> &Module {
        &self.module
    }
    fn module_mut(&mut self) -> &mut Module {
        &mut self.module
    }
    fn intern_map(&mut self) -> &mut HashMap<TypeBody, TypeRef> {
        &mut self.intern
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_reuses_existing_types() {
        let mut module = Module::new();
        let existing = module.add_type(TypeBody::Uint { size: 8 }).unwrap();
        let mut ctx = TransformCtx::new(module);
        assert_eq!(ctx.uint_type(8).unwrap(), existing);
        let fresh = ctx.uint_type(16).unwrap();
        assert_ne!(fresh, existing);
    }
}
