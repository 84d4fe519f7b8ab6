//! The double-dispatch core.
//!
//! For each object kind the dispatcher: (1) resolves and destructures the
//! entry, failing fast on a dangling ref; (2) offers the `Before` phase to
//! the visitor, where a non-pass result hijacks the whole visit; (3) runs
//! the `Main` phase (a before/after hook may re-enter it explicitly through
//! [`run_main_type`] and friends, which stand in for the main-logic
//! closure); (4) offers the `After` phase with the main result, which may
//! also hijack; (5) returns the main result.
//!
//! The pass sentinel [`VisitError::Pass`] always means "keep going", never
//! failure.

use ebmc_core::{AnyRef, ExpressionRef, Module, RefKind, StatementRef, TypeRef};

use crate::context::{ExpressionCtx, Phase, StatementCtx, TypeCtx};
use crate::error::{VisitError, VisitResult};
use crate::visitor::Visitor;

macro_rules! dispatcher {
    ($visit:ident, $run_main:ident, $ctx:ident<$lt:lifetime>, $refty:ty, $get:ident,
     $hook:ident, $after:ident, $missing:literal) => {
        /// Runs the main phase only: the visitor's hook, then its default
        /// layer when the hook passes.
        pub fn $run_main<V: Visitor>(v: &mut V, ctx: &$ctx<'_>) -> VisitResult<V::Output> {
            match v.$hook(Phase::Main, ctx) {
                Err(VisitError::Pass) => v.fallback(stringify!($ctx)),
                other => other,
            }
        }

        /// Full before/main/after dispatch for one object.
        pub fn $visit<V: Visitor>(
            v: &mut V,
            module: &Module,
            r: $refty,
        ) -> VisitResult<V::Output> {
            let entry = module
                .$get(r)
                .ok_or(VisitError::Missing { what: $missing, at: r.0 })?;
            let ctx = $ctx { module, id: entry.id, body: &entry.body };

            match v.$hook(Phase::Before, &ctx) {
                Ok(hijacked) => return Ok(hijacked),
                Err(VisitError::Pass) => {}
                Err(other) => return Err(other),
            }

            let main_result = $run_main(v, &ctx)?;

            match v.$after(&ctx, &main_result) {
                Ok(hijacked) => return Ok(hijacked),
                Err(VisitError::Pass) => {}
                Err(other) => return Err(other),
            }

            Ok(main_result)
        }
    };
}

dispatcher!(
    visit_type, run_main_type, TypeCtx<'m>, TypeRef, get_type,
    type_hook, type_after, "type"
);
dispatcher!(
    visit_statement, run_main_statement, StatementCtx<'m>, StatementRef, get_statement,
    statement_hook, statement_after, "statement"
);
dispatcher!(
    visit_expression, run_main_expression, ExpressionCtx<'m>, ExpressionRef, get_expression,
    expression_hook, expression_after, "expression"
);

/// List dispatcher over a statement container, merging per-item results.
pub fn visit_block<V: Visitor>(
    v: &mut V,
    module: &Module,
    container: &[StatementRef],
) -> VisitResult<V::Output> {
    let mut acc = V::Output::default();
    for item in container {
        let piece = visit_statement(v, module, *item)?;
        v.merge(&mut acc, piece);
    }
    Ok(acc)
}

/// List dispatcher over expressions.
pub fn visit_expressions<V: Visitor>(
    v: &mut V,
    module: &Module,
    items: &[ExpressionRef],
) -> VisitResult<V::Output> {
    let mut acc = V::Output::default();
    for item in items {
        let piece = visit_expression(v, module, *item)?;
        v.merge(&mut acc, piece);
    }
    Ok(acc)
}

/// List dispatcher over types.
pub fn visit_types<V: Visitor>(
    v: &mut V,
    module: &Module,
    items: &[TypeRef],
) -> VisitResult<V::Output> {
    let mut acc = V::Output::default();
    for item in items {
        let piece = visit_type(v, module, *item)?;
        v.merge(&mut acc, piece);
    }
    Ok(acc)
}

/// The generic entry point: forwards any ref to its kind dispatcher.
pub fn visit_object<V: Visitor>(
    v: &mut V,
    module: &Module,
    kind: RefKind,
    r: AnyRef,
) -> VisitResult<V::Output> {
    match kind {
        RefKind::Type => visit_type(v, module, TypeRef(r.0)),
        RefKind::Statement => visit_statement(v, module, StatementRef(r.0)),
        RefKind::Expression => visit_expression(v, module, ExpressionRef(r.0)),
        RefKind::Identifier | RefKind::String => Err(VisitError::Unhandled {
            context: "interned literal",
        }),
    }
}
