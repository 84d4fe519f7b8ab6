//! FUNCTION_CAST resolution.
//!
//! Casts out of a struct type resolve to one of the struct's CAST-kind
//! methods: an exact return-type match wins; otherwise an integer-like
//! return may serve an integer-like destination (the last such candidate
//! wins). Missing candidates are an error naming the type.

use ebmc_core::{
    CastKind, ExprOp, ExpressionRef, FunctionKind, StatementBody, StatementRef, TypeBody, TypeKind,
};

use crate::ctx::TransformCtx;
use crate::error::{Result, TransformError};

const PASS: &str = "add_cast_func";

fn is_int_like(kind: TypeKind) -> bool {
    matches!(kind, TypeKind::Int | TypeKind::Uint | TypeKind::Usize)
}

fn struct_decl_of(ctx: &TransformCtx, ty: ebmc_core::TypeRef) -> Option<StatementRef> {
    match ctx.module.get_type(ty).map(|e| &e.body) {
        Some(TypeBody::Struct { decl } | TypeBody::RecursiveStruct { decl }) => Some(*decl),
        _ => None,
    }
}

fn find_cast_method(
    ctx: &TransformCtx,
    parent: StatementRef,
    wanted: ebmc_core::TypeRef,
) -> Option<StatementRef> {
    let wanted_kind = ctx.module.type_kind(wanted)?;
    let mut candidate = None;
    for entry in ctx.module.statements.entries() {
        let StatementBody::FunctionDecl(decl) = &entry.body else { continue };
        if decl.kind != FunctionKind::Cast || decl.parent_format != parent {
            continue;
        }
        if decl.return_type == wanted {
            return Some(entry.id);
        }
        if is_int_like(wanted_kind) {
            if let Some(ret_kind) = ctx.module.type_kind(decl.return_type) {
                if is_int_like(ret_kind) {
                    candidate = Some(entry.id);
                }
            }
        }
    }
    candidate
}

/// The pass entry: fills `cast_function` on every FUNCTION_CAST expression.
pub fn add_cast_func(ctx: &mut TransformCtx) -> Result<()> {
    let pending: Vec<(ExpressionRef, ebmc_core::TypeRef, ebmc_core::TypeRef)> = ctx
        .module
        .expressions
        .entries()
        .iter()
        .filter_map(|e| match &e.body.op {
            ExprOp::TypeCast { cast_kind: CastKind::FunctionCast, from_type, cast_function, .. }
                if cast_function.is_nil() =>
            {
                Some((e.id, *from_type, e.body.ty))
            }
            _ => None,
        })
        .collect();

    for (expr, from_type, to_type) in pending {
        let parent = struct_decl_of(ctx, from_type).ok_or_else(|| {
            TransformError::unsupported(
                PASS,
                expr.0,
                "function cast out of a non-struct type",
            )
        })?;
        let method = find_cast_method(ctx, parent, to_type).ok_or_else(|| {
            TransformError::unsupported(
                PASS,
                expr.0,
                format!("no cast method on struct {parent} for this destination"),
            )
        })?;
        let entry = ctx
            .module
            .expressions
            .get_mut(expr)
            .ok_or_else(|| TransformError::internal(PASS, format!("expression {expr} vanished")))?;
        if let ExprOp::TypeCast { cast_function, .. } = &mut entry.body.op {
            *cast_function = method;
        }
    }
    Ok(())
}
