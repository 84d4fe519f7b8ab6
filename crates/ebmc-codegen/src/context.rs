//! Dispatcher contexts.
//!
//! A context captures one destructured arena entry plus the module it lives
//! in; hooks receive it by reference for every phase. The phase tells a hook
//! whether it runs before the main logic (and may hijack the result), as the
//! main logic, or after it (with the main result in hand).

use ebmc_core::{
    ExpressionBody, ExpressionKind, ExpressionRef, Module, StatementBody, StatementKind,
    StatementRef, TypeBody, TypeKind, TypeRef,
};

/// Hook phase, in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Before,
    Main,
    After,
}

pub struct TypeCtx<'m> {
    pub module: &'m Module,
    pub id: TypeRef,
    pub body: &'m TypeBody,
}

impl TypeCtx<'_> {
    pub fn kind(&self) -> TypeKind {
        self.body.kind()
    }
}

pub struct StatementCtx<'m> {
    pub module: &'m Module,
    pub id: StatementRef,
    pub body: &'m StatementBody,
}

impl StatementCtx<'_> {
    pub fn kind(&self) -> StatementKind {
        self.body.kind()
    }

    /// The declaration's display name, `tmp<id>` style for anonymous ones.
    pub fn name_of(&self, ident: ebmc_core::IdentifierRef) -> String {
        self.module.identifier_or(ident, self.id.into(), "tmp")
    }
}

pub struct ExpressionCtx<'m> {
    pub module: &'m Module,
    pub id: ExpressionRef,
    pub body: &'m ExpressionBody,
}

impl ExpressionCtx<'_> {
    pub fn kind(&self) -> ExpressionKind {
        self.body.kind()
    }
}
