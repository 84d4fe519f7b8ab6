//! Converter state.
//!
//! One [`Converter`] owns the module under construction plus the scoped
//! mutable state of the walk: the visited map (AST node -> statement ref,
//! keyed by generate mode), the current generate mode, the endian defaults,
//! the enclosing function/loop, and the per-format coder registry. Scoped
//! changes go through the `with_*` helpers, which restore the previous
//! value on every exit path.

use std::collections::HashMap;

use ebmc_ast::{Ast, Node, NodeId};
use ebmc_core::{Endian, ExpressionRef, Module, StatementRef};
use indexmap::IndexMap;

use crate::error::{ConvertError, Result};

/// What the converter is currently generating from the AST walk. Fields
/// convert differently under `Encode`/`Decode` (into I/O statements), and
/// union conditions are translated once per property access direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerateMode {
    Normal,
    Encode,
    Decode,
    PropertyGetter,
    PropertySetter,
}

/// A state-variable field visible inside a format, with its declaration and
/// an identifier expression for argument passing.
#[derive(Debug, Clone, Copy)]
pub struct StateVar {
    pub field_node: NodeId,
    pub decl: StatementRef,
    pub expr: ExpressionRef,
}

/// Encoder/decoder synthesis results for one format, registered before the
/// bodies are converted so nested formats can call them.
#[derive(Debug, Clone, Default)]
pub struct CoderInfo {
    pub encode_fn: StatementRef,
    pub decode_fn: StatementRef,
    pub encode_fn_expr: ExpressionRef,
    pub decode_fn_expr: ExpressionRef,
    /// Variable declarations standing for the stream handles.
    pub encoder_input: StatementRef,
    pub decoder_input: StatementRef,
    pub encoder_input_expr: ExpressionRef,
    pub decoder_input_expr: ExpressionRef,
    pub state_vars: Vec<StateVar>,
}

pub struct Converter<'a> {
    pub ast: &'a Ast,
    pub module: Module,
    pub(crate) visited: HashMap<(NodeId, GenerateMode), StatementRef>,
    pub(crate) mode: GenerateMode,
    pub(crate) global_endian: Endian,
    pub(crate) local_endian: Endian,
    pub(crate) on_function: bool,
    pub(crate) dynamic_endian: StatementRef,
    /// Interning cache so identical type bodies share one arena entry.
    pub(crate) type_intern: HashMap<ebmc_core::TypeBody, ebmc_core::TypeRef>,
    /// Insertion order matters: nested formats must come out deterministic.
    pub(crate) coders: IndexMap<NodeId, CoderInfo>,
    pub(crate) current_format: Option<NodeId>,
    pub(crate) current_function: StatementRef,
    pub(crate) loop_stack: Vec<StatementRef>,
}

impl<'a> Converter<'a> {
    pub fn new(ast: &'a Ast) -> Self {
        Converter {
            ast,
            module: Module::new(),
            visited: HashMap::new(),
            mode: GenerateMode::Normal,
            global_endian: Endian::Big,
            local_endian: Endian::Unspec,
            on_function: false,
            dynamic_endian: StatementRef::NIL,
            type_intern: HashMap::new(),
            coders: IndexMap::new(),
            current_format: None,
            current_function: StatementRef::NIL,
            loop_stack: Vec::new(),
        }
    }

    pub(crate) fn node(&self, id: NodeId) -> &'a Node {
        self.ast.node(id)
    }

    // -- scoped state ------------------------------------------------------

    pub(crate) fn with_mode<T>(
        &mut self,
        mode: GenerateMode,
        f: impl FnOnce(&mut Self) -> T,
    ) -> T {
        let saved = std::mem::replace(&mut self.mode, mode);
        let out = f(self);
        self.mode = saved;
        out
    }

    pub(crate) fn with_function<T>(
        &mut self,
        function: StatementRef,
        f: impl FnOnce(&mut Self) -> T,
    ) -> T {
        let saved_fn = std::mem::replace(&mut self.current_function, function);
        let saved_on = std::mem::replace(&mut self.on_function, true);
        let saved_endian = std::mem::replace(&mut self.local_endian, Endian::Unspec);
        let out = f(self);
        self.current_function = saved_fn;
        self.on_function = saved_on;
        self.local_endian = saved_endian;
        out
    }

    pub(crate) fn with_format<T>(
        &mut self,
        format: NodeId,
        f: impl FnOnce(&mut Self) -> T,
    ) -> T {
        let saved = std::mem::replace(&mut self.current_format, Some(format));
        let out = f(self);
        self.current_format = saved;
        out
    }

    pub(crate) fn with_loop<T>(
        &mut self,
        loop_ref: StatementRef,
        f: impl FnOnce(&mut Self) -> T,
    ) -> T {
        self.loop_stack.push(loop_ref);
        let out = f(self);
        self.loop_stack.pop();
        out
    }

    // -- endian ------------------------------------------------------------

    /// Resolves a declared endian against the scoped defaults; a dynamic
    /// result carries the live selector ref.
    pub(crate) fn resolved_endian(&self, declared: Endian) -> (Endian, StatementRef) {
        let mut endian = declared;
        if endian == Endian::Unspec {
            endian = self.global_endian;
            if self.on_function && self.local_endian != Endian::Unspec {
                endian = self.local_endian;
            }
        }
        if endian == Endian::Dynamic {
            (endian, self.dynamic_endian)
        } else {
            (endian, StatementRef::NIL)
        }
    }

    /// Installs a new default endian. Dynamic endian is only valid inside a
    /// function.
    pub(crate) fn set_endian(&mut self, endian: Endian, selector: StatementRef) -> bool {
        if self.on_function {
            self.local_endian = endian;
            self.dynamic_endian = selector;
            return true;
        }
        if endian == Endian::Dynamic {
            return false;
        }
        self.global_endian = endian;
        true
    }

    // -- coder registry ----------------------------------------------------

    pub(crate) fn register_coder(&mut self, format: NodeId, info: CoderInfo) {
        self.coders.insert(format, info);
    }

    pub(crate) fn coder(&self, format: NodeId) -> Result<&CoderInfo> {
        self.coders.get(&format).ok_or_else(|| {
            ConvertError::internal(format!("no coder registered for node {}", format.0))
        })
    }

    /// The coder of the format currently being generated.
    pub(crate) fn current_coder(&self) -> Result<&CoderInfo> {
        let format = self.current_format.ok_or_else(|| {
            ConvertError::internal("coder requested outside of a format".to_string())
        })?;
        self.coder(format)
    }

    /// The stream-handle expression for the active generate mode.
    pub(crate) fn current_stream(&self) -> Result<(StatementRef, ExpressionRef)> {
        let coder = self.current_coder()?;
        Ok(match self.mode {
            GenerateMode::Encode => (coder.encoder_input, coder.encoder_input_expr),
            _ => (coder.decoder_input, coder.decoder_input_expr),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_mode_restores_on_exit() {
        let ast = Ast::new();
        let mut conv = Converter::new(&ast);
        assert_eq!(conv.mode, GenerateMode::Normal);
        conv.with_mode(GenerateMode::Encode, |c| {
            assert_eq!(c.mode, GenerateMode::Encode);
        });
        assert_eq!(conv.mode, GenerateMode::Normal);
    }

    #[test]
    fn endian_resolution_prefers_local_inside_function() {
        let ast = Ast::new();
        let mut conv = Converter::new(&ast);
        assert_eq!(conv.resolved_endian(Endian::Unspec).0, Endian::Big);
        conv.set_endian(Endian::Little, StatementRef::NIL);
        assert_eq!(conv.resolved_endian(Endian::Unspec).0, Endian::Little);
        conv.on_function = true;
        conv.set_endian(Endian::Dynamic, StatementRef(9));
        let (endian, selector) = conv.resolved_endian(Endian::Unspec);
        assert_eq!(endian, Endian::Dynamic);
        assert_eq!(selector, StatementRef(9));
        // declared endian always wins
        assert_eq!(conv.resolved_endian(Endian::Big).0, Endian::Big);
    }

    #[test]
    fn dynamic_global_endian_is_rejected() {
        let ast = Ast::new();
        let mut conv = Converter::new(&ast);
        assert!(!conv.set_endian(Endian::Dynamic, StatementRef(3)));
    }
}
