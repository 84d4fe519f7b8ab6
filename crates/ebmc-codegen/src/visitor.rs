//! The visitor trait and the merged-hook search chain.

use crate::context::{ExpressionCtx, Phase, StatementCtx, TypeCtx};
use crate::error::{VisitError, VisitResult};

/// A code-generation visitor.
///
/// Every hook defaults to the pass sentinel, so a visitor implements only
/// the contexts it cares about. `Before` may hijack the visit, `Main`
/// produces the result, the `*_after` hooks observe (and may replace) it.
/// `fallback` is the end of the search chain; the default rejects, so an
/// unhandled context surfaces as a hard error rather than silent output.
pub trait Visitor {
    type Output: Default;

    fn type_hook(&mut self, phase: Phase, ctx: &TypeCtx<'_>) -> VisitResult<Self::Output> {
        let _ = (phase, ctx);
        Err(VisitError::Pass)
    }

    fn type_after(
        &mut self,
        ctx: &TypeCtx<'_>,
        main_result: &Self::Output,
    ) -> VisitResult<Self::Output> {
        let _ = (ctx, main_result);
        Err(VisitError::Pass)
    }

    fn statement_hook(
        &mut self,
        phase: Phase,
        ctx: &StatementCtx<'_>,
    ) -> VisitResult<Self::Output> {
        let _ = (phase, ctx);
        Err(VisitError::Pass)
    }

    fn statement_after(
        &mut self,
        ctx: &StatementCtx<'_>,
        main_result: &Self::Output,
    ) -> VisitResult<Self::Output> {
        let _ = (ctx, main_result);
        Err(VisitError::Pass)
    }

    fn expression_hook(
        &mut self,
        phase: Phase,
        ctx: &ExpressionCtx<'_>,
    ) -> VisitResult<Self::Output> {
        let _ = (phase, ctx);
        Err(VisitError::Pass)
    }

    fn expression_after(
        &mut self,
        ctx: &ExpressionCtx<'_>,
        main_result: &Self::Output,
    ) -> VisitResult<Self::Output> {
        let _ = (ctx, main_result);
        Err(VisitError::Pass)
    }

    /// End of the hook search chain for an unclaimed main phase.
    fn fallback(&mut self, context: &'static str) -> VisitResult<Self::Output> {
        Err(VisitError::Unhandled { context })
    }

    /// Folds a list item into the accumulated output. The default keeps the
    /// last item; text generators append instead.
    fn merge(&mut self, acc: &mut Self::Output, item: Self::Output) {
        *acc = item;
    }
}

/// Hook layers tried in registration order: the first non-pass answer wins.
/// Models the user hook -> DSL hook -> default code-gen hook -> fallback
/// search as a flat ordered list.
pub struct MergedVisitor<O> {
    layers: Vec<Box<dyn Visitor<Output = O>>>,
}

impl<O: Default> MergedVisitor<O> {
    pub fn new() -> Self {
        MergedVisitor { layers: Vec::new() }
    }

    /// Appends a layer; earlier layers shadow later ones.
    pub fn layer(mut self, layer: Box<dyn Visitor<Output = O>>) -> Self {
        self.layers.push(layer);
        self
    }
}

impl<O: Default> Default for MergedVisitor<O> {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! merged_hook {
    ($name:ident, $ctx:ty) => {
        fn $name(&mut self, phase: Phase, ctx: &$ctx) -> VisitResult<Self::Output> {
            for layer in &mut self.layers {
                match layer.$name(phase, ctx) {
                    Err(VisitError::Pass) => continue,
                    other => return other,
                }
            }
            Err(VisitError::Pass)
        }
    };
}

macro_rules! merged_after {
    ($name:ident, $ctx:ty) => {
        fn $name(&mut self, ctx: &$ctx, main_result: &Self::Output) -> VisitResult<Self::Output> {
            for layer in &mut self.layers {
                match layer.$name(ctx, main_result) {
                    Err(VisitError::Pass) => continue,
                    other => return other,
                }
            }
            Err(VisitError::Pass)
        }
    };
}

impl<O: Default> Visitor for MergedVisitor<O> {
    type Output = O;

    merged_hook!(type_hook, TypeCtx<'_>);
    merged_hook!(statement_hook, StatementCtx<'_>);
    merged_hook!(expression_hook, ExpressionCtx<'_>);
    merged_after!(type_after, TypeCtx<'_>);
    merged_after!(statement_after, StatementCtx<'_>);
    merged_after!(expression_after, ExpressionCtx<'_>);

    fn fallback(&mut self, context: &'static str) -> VisitResult<Self::Output> {
        for layer in &mut self.layers {
            match layer.fallback(context) {
                Err(VisitError::Pass) => continue,
                other => return other,
            }
        }
        Err(VisitError::Unhandled { context })
    }

    fn merge(&mut self, acc: &mut Self::Output, item: Self::Output) {
        if let Some(first) = self.layers.first_mut() {
            first.merge(acc, item);
        } else {
            *acc = item;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{run_main_statement, visit_statement};
    use ebmc_core::{Module, StatementBody, StatementKind};

    struct CountingVisitor {
        befores: usize,
        afters: usize,
    }

    impl Visitor for CountingVisitor {
        type Output = String;

        fn statement_hook(
            &mut self,
            phase: Phase,
            ctx: &StatementCtx<'_>,
        ) -> VisitResult<String> {
            match phase {
                Phase::Before => {
                    self.befores += 1;
                    Err(VisitError::Pass)
                }
                Phase::Main => Ok(format!("{:?}", ctx.kind())),
                Phase::After => Err(VisitError::Pass),
            }
        }

        fn statement_after(
            &mut self,
            _ctx: &StatementCtx<'_>,
            _main: &String,
        ) -> VisitResult<String> {
            self.afters += 1;
            Err(VisitError::Pass)
        }
    }

    fn module_with_block() -> (Module, ebmc_core::StatementRef) {
        let mut m = Module::new();
        let s = m.add_statement(StatementBody::Block { container: vec![] }).unwrap();
        (m, s)
    }

    /// Invariant: pass-returning before and after hooks leave the result
    /// identical to running the main logic directly.
    #[test]
    fn passing_hooks_do_not_change_the_result() {
        let (m, s) = module_with_block();
        let mut v = CountingVisitor { befores: 0, afters: 0 };
        let full = visit_statement(&mut v, &m, s).unwrap();
        let entry = m.get_statement(s).unwrap();
        let ctx = StatementCtx { module: &m, id: entry.id, body: &entry.body };
        let main_only = run_main_statement(&mut v, &ctx).unwrap();
        assert_eq!(full, main_only);
        assert_eq!(v.befores, 1);
        assert_eq!(v.afters, 1);
    }

    struct Hijacker;

    impl Visitor for Hijacker {
        type Output = String;
        fn statement_hook(
            &mut self,
            phase: Phase,
            _ctx: &StatementCtx<'_>,
        ) -> VisitResult<String> {
            match phase {
                Phase::Before => Ok("hijacked".into()),
                _ => Ok("main".into()),
            }
        }
    }

    #[test]
    fn before_hook_hijacks_the_visit() {
        let (m, s) = module_with_block();
        let out = visit_statement(&mut Hijacker, &m, s).unwrap();
        assert_eq!(out, "hijacked");
    }

    #[test]
    fn merged_layers_search_in_order() {
        struct Silent;
        impl Visitor for Silent {
            type Output = String;
        }
        let (m, s) = module_with_block();
        let mut merged = MergedVisitor::new()
            .layer(Box::new(Silent) as Box<dyn Visitor<Output = String>>)
            .layer(Box::new(CountingVisitor { befores: 0, afters: 0 }));
        let out = visit_statement(&mut merged, &m, s).unwrap();
        assert_eq!(out, format!("{:?}", StatementKind::Block));
    }

    #[test]
    fn unhandled_context_is_a_hard_error() {
        struct Silent;
        impl Visitor for Silent {
            type Output = String;
        }
        let (m, s) = module_with_block();
        let err = visit_statement(&mut Silent, &m, s).unwrap_err();
        assert!(matches!(err, VisitError::Unhandled { .. }));
    }
}
