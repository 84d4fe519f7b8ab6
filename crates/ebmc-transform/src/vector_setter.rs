//! Vector setter synthesis.
//!
//! A write whose size expression resolves to an integer length field and
//! whose target resolves to a vector field gets a setter function: length
//! bounds check against the length type's maximum, the vector assignment,
//! and the cast length store.

use std::collections::HashSet;

use ebmc_convert::Build;
use ebmc_core::{
    BinaryOp, ExprOp, ExpressionRef, FunctionDecl, FunctionKind, LengthCheckKind, ParameterDecl,
    SetterStatus, StatementBody, StatementRef, TypeBody, TypeRef,
};

use crate::ctx::TransformCtx;
use crate::error::{Result, TransformError};

const PASS: &str = "derive_vector_setter";

struct SetterTarget {
    vector_field: StatementRef,
    vector_type: TypeRef,
    length_field: StatementRef,
    length_type: TypeRef,
    parent_struct: StatementRef,
}

/// Peels casts and member accesses down to the referenced field declaration.
fn resolve_field(ctx: &TransformCtx, expr: ExpressionRef) -> Option<StatementRef> {
    let mut cur = expr;
    for _ in 0..16 {
        let body = &ctx.module.get_expression(cur)?.body;
        match &body.op {
            ExprOp::Identifier { decl } => return Some(*decl),
            ExprOp::TypeCast { source, .. } => cur = *source,
            ExprOp::MemberAccess { member, .. } => cur = *member,
            _ => return None,
        }
    }
    None
}

fn field_type_of(ctx: &TransformCtx, field: StatementRef) -> Option<(TypeRef, StatementRef)> {
    match ctx.module.get_statement(field).map(|e| &e.body) {
        Some(StatementBody::FieldDecl(decl)) => Some((decl.field_type, decl.parent_struct)),
        _ => None,
    }
}

fn setter_target(ctx: &TransformCtx, io: &ebmc_core::IoData) -> Option<SetterTarget> {
    if io.field.is_nil() {
        return None;
    }
    let length_expr = io.size.expr()?;
    let length_field = resolve_field(ctx, length_expr)?;
    let (length_type, _) = field_type_of(ctx, length_field)?;
    if !matches!(
        ctx.module.get_type(length_type).map(|e| &e.body),
        Some(TypeBody::Int { .. } | TypeBody::Uint { .. })
    ) {
        return None;
    }
    let vector_field = resolve_field(ctx, io.target)?;
    let (vector_type, parent_struct) = field_type_of(ctx, vector_field)?;
    if !matches!(
        ctx.module.get_type(vector_type).map(|e| &e.body),
        Some(TypeBody::Vector { .. })
    ) {
        return None;
    }
    Some(SetterTarget { vector_field, vector_type, length_field, length_type, parent_struct })
}

fn synthesize(ctx: &mut TransformCtx, target: &SetterTarget) -> Result<StatementRef> {
    let fn_id = ctx.module.reserve_statement_id()?;
    let return_type = ctx.intern_type(TypeBody::PropertySetterReturn)?;

    let value_name = ctx.module_mut().add_anonymous_identifier()?;
    let value_param = ctx.add_stmt(StatementBody::ParameterDecl(ParameterDecl {
        name: value_name,
        param_type: target.vector_type,
    }))?;
    let value = ctx.identifier_expr(value_param, target.vector_type)?;

    // if value.length > max(length_type) { return FAILED }
    let counter_type = ctx.counter_type()?;
    let bool_type = ctx.bool_type()?;
    let max_value = ctx.max_value_expr(target.length_type)?;
    let limit = ctx.cast(counter_type, target.length_type, max_value)?;
    let actual = ctx.array_size(value)?;
    let over = ctx.binary(BinaryOp::Greater, bool_type, actual, limit)?;
    let failed = ctx.add_expr(
        return_type,
        ExprOp::SetterStatus { status: SetterStatus::Failed },
    )?;
    let bail = ctx.add_stmt(StatementBody::Return {
        value: failed,
        related_function: fn_id,
    })?;
    let guard = ctx.if_stmt(over, bail, StatementRef::NIL)?;
    let check = ctx.add_stmt(StatementBody::LengthCheck {
        check_kind: LengthCheckKind::SetterVectorLength,
        actual,
        limit,
        related_function: fn_id,
        lowered_statement: guard,
    })?;

    // vector_field = value; length_field = (cast) value.length
    let vector_expr = ctx.identifier_expr(target.vector_field, target.vector_type)?;
    let assign_vector = ctx.assign(vector_expr, value)?;
    let length_expr = ctx.identifier_expr(target.length_field, target.length_type)?;
    let casted_len = ctx.cast(target.length_type, counter_type, actual)?;
    let assign_length = ctx.assign(length_expr, casted_len)?;

    let success = ctx.add_expr(
        return_type,
        ExprOp::SetterStatus { status: SetterStatus::Success },
    )?;
    let done = ctx.add_stmt(StatementBody::Return {
        value: success,
        related_function: fn_id,
    })?;
    let body = ctx.block(vec![check, assign_vector, assign_length, done])?;

    let field_name = match ctx.module.get_statement(target.vector_field).map(|e| &e.body) {
        Some(StatementBody::FieldDecl(decl)) => Some(decl.name),
        _ => None,
    };
    let name = match field_name {
        Some(name) => name,
        None => ctx.module_mut().add_anonymous_identifier()?,
    };
    let decl = FunctionDecl {
        kind: FunctionKind::VectorSetter,
        name,
        parent_format: target.parent_struct,
        return_type,
        params: vec![value_param],
        body,
        related_property: target.vector_field,
    };
    ctx.module
        .statements
        .add_with_id(fn_id, StatementBody::FunctionDecl(decl))?;
    Ok(fn_id)
}

/// The pass entry: one setter per distinct length-prefixed vector field.
pub fn derive_vector_setter(ctx: &mut TransformCtx) -> Result<()> {
    let snapshot = ctx.module.statements.len();
    let mut seen: HashSet<u64> = HashSet::new();
    let mut targets = Vec::new();
    for entry in ctx.module.statements.entries().iter().take(snapshot) {
        let StatementBody::WriteData(io) = &entry.body else { continue };
        let Some(target) = setter_target(ctx, io) else { continue };
        if seen.insert(target.vector_field.0) {
            targets.push(target);
        }
    }
    for target in targets {
        // a length type wider than the counter cannot be bounds-checked
        if let Some(TypeBody::Uint { size } | TypeBody::Int { size }) =
            ctx.module.get_type(target.length_type).map(|e| e.body.clone())
        {
            if size > 62 {
                return Err(TransformError::internal(
                    PASS,
                    format!("length field {} wider than 62 bits", target.length_field),
                ));
            }
        }
        let fn_id = synthesize(ctx, &target)?;
        // attach to the parent struct's property list
        if !target.parent_struct.is_nil() {
            let entry = ctx.module.statements.get_mut(target.parent_struct).ok_or_else(
                || TransformError::internal(PASS, format!("struct {} vanished", target.parent_struct)),
            )?;
            if let StatementBody::StructDecl(decl) = &mut entry.body {
                decl.properties.push(fn_id);
            }
        }
        tracing::debug!(field = target.vector_field.0, "synthesized vector setter");
    }
    Ok(())
}
