//! Property getter/setter synthesis.
//!
//! Every `PROPERTY_DECL` grows two functions: a getter returning a pointer
//! (strict merge) or an optional (merged types), and a setter returning a
//! success/failure status. Both dispatch through a match over the property's
//! access-direction condition, with an if-chain lowering attached for
//! targets without native match.

use ebmc_convert::Build;
use ebmc_core::{
    BinaryOp, ExprOp, ExpressionRef, FieldDecl, FunctionDecl, FunctionKind, MatchBranch,
    MatchStatement, MergeMode, ParameterDecl, PropertyDecl, SetterStatus, StatementBody,
    StatementRef, TypeBody, TypeRef,
};

use crate::ctx::TransformCtx;
use crate::error::{Result, TransformError};

const PASS: &str = "derive_property_setter_getter";

/// State-variable parameter declarations of the property's parent struct.
fn state_params(ctx: &mut TransformCtx, parent: StatementRef) -> Result<Vec<StatementRef>> {
    let fields = match ctx.module.get_statement(parent).map(|e| &e.body) {
        Some(StatementBody::StructDecl(decl)) => decl.fields.clone(),
        _ => return Ok(Vec::new()),
    };
    let mut params = Vec::new();
    for field in fields {
        let Some(StatementBody::FieldDecl(decl)) =
            ctx.module.get_statement(field).map(|e| &e.body)
        else {
            continue;
        };
        if decl.state_variable {
            let decl = decl.clone();
            params.push(ctx.add_stmt(StatementBody::ParameterDecl(ParameterDecl {
                name: decl.name,
                param_type: decl.field_type,
            }))?);
        }
    }
    Ok(params)
}

fn field_decl_of(ctx: &TransformCtx, field: StatementRef) -> Option<FieldDecl> {
    match ctx.module.get_statement(field).map(|e| &e.body) {
        Some(StatementBody::FieldDecl(decl)) => Some(decl.clone()),
        _ => None,
    }
}

/// `true` when the field's parent struct is an alternative of some variant
/// type; access then re-checks the discriminant first.
fn in_variant_struct(ctx: &TransformCtx, decl: &FieldDecl) -> bool {
    if decl.parent_struct.is_nil() {
        return false;
    }
    ctx.module.types.entries().iter().any(|entry| match &entry.body {
        TypeBody::Variant(v) => v
            .members
            .iter()
            .any(|member| struct_decl_of(ctx, *member) == Some(decl.parent_struct)),
        _ => false,
    })
}

fn struct_decl_of(ctx: &TransformCtx, ty: TypeRef) -> Option<StatementRef> {
    match ctx.module.get_type(ty).map(|e| &e.body) {
        Some(TypeBody::Struct { decl } | TypeBody::RecursiveStruct { decl }) => Some(*decl),
        _ => None,
    }
}

/// If-chain lowering of a property match: equality tests against the target
/// when one exists, the raw branch conditions otherwise.
fn derive_match_lowered_if(
    ctx: &mut TransformCtx,
    stmt: &mut MatchStatement,
) -> Result<()> {
    let bool_type = ctx.bool_type()?;
    let mut chain = StatementRef::NIL;
    for branch_ref in stmt.branches.iter().rev() {
        let Some(StatementBody::MatchBranch(branch)) =
            ctx.module.get_statement(*branch_ref).map(|e| e.body.clone())
        else {
            return Err(TransformError::internal(PASS, "missing match branch".to_string()));
        };
        let cond = if stmt.target.is_nil() {
            branch.condition
        } else {
            ctx.binary(BinaryOp::Equal, bool_type, stmt.target, branch.condition)?
        };
        chain = ctx.if_stmt(cond, branch.body, chain)?;
    }
    stmt.lowered_statement = chain;
    Ok(())
}

struct MemberInfo {
    getter_condition: ExpressionRef,
    setter_condition: ExpressionRef,
    field: StatementRef,
}

fn members_of(ctx: &TransformCtx, prop: &PropertyDecl) -> Result<Vec<MemberInfo>> {
    let mut out = Vec::with_capacity(prop.members.len());
    for member_ref in &prop.members {
        let Some(StatementBody::PropertyMemberDecl(member)) =
            ctx.module.get_statement(*member_ref).map(|e| e.body.clone())
        else {
            return Err(TransformError::internal(
                PASS,
                format!("member {member_ref} is not a property member"),
            ));
        };
        out.push(MemberInfo {
            getter_condition: member.getter_condition,
            setter_condition: member.setter_condition,
            field: member.field,
        });
    }
    Ok(out)
}

fn synthesize_getter(
    ctx: &mut TransformCtx,
    prop_ref: StatementRef,
    prop: &PropertyDecl,
    getter_id: StatementRef,
    params: &[StatementRef],
) -> Result<FunctionDecl> {
    let return_type = if prop.merge_mode == MergeMode::StrictType {
        ctx.intern_type(TypeBody::Ptr { pointee: prop.property_type })?
    } else {
        ctx.intern_type(TypeBody::Optional { inner: prop.property_type })?
    };
    let nothing = ctx.default_value(return_type)?;
    let default_return = ctx.add_stmt(StatementBody::Return {
        value: nothing,
        related_function: getter_id,
    })?;

    let mut stmt = MatchStatement { target: prop.getter_condition, ..MatchStatement::default() };
    for member in members_of(ctx, prop)? {
        let body = if member.field.is_nil() {
            default_return
        } else {
            let field_decl = field_decl_of(ctx, member.field);
            let field_type = field_decl
                .as_ref()
                .map(|d| d.field_type)
                .unwrap_or(prop.property_type);
            let self_expr = ctx.identifier_expr(member.field, field_type)?;
            let result = if prop.merge_mode == MergeMode::StrictType {
                ctx.add_expr(return_type, ExprOp::Addressof { target: self_expr })?
            } else {
                let casted = ctx.cast(prop.property_type, field_type, self_expr)?;
                ctx.add_expr(return_type, ExprOp::Optionalof { target: casted })?
            };
            let ret = ctx.add_stmt(StatementBody::Return {
                value: result,
                related_function: getter_id,
            })?;
            match field_decl {
                Some(decl) if in_variant_struct(ctx, &decl) => {
                    // the alternative must be the active one before reading
                    let check = ctx.assert_stmt(member.getter_condition)?;
                    ctx.block(vec![check, ret])?
                }
                _ => ret,
            }
        };
        let branch = ctx.add_stmt(StatementBody::MatchBranch(MatchBranch {
            condition: member.getter_condition,
            body,
        }))?;
        stmt.branches.push(branch);
    }
    derive_match_lowered_if(ctx, &mut stmt)?;
    let match_ref = ctx.add_stmt(StatementBody::MatchStatement(stmt))?;
    let body = ctx.block(vec![match_ref, default_return])?;

    Ok(FunctionDecl {
        kind: FunctionKind::PropertyGetter,
        name: prop.name,
        parent_format: prop.parent_format,
        return_type,
        params: params.to_vec(),
        body,
        related_property: prop_ref,
    })
}

fn synthesize_setter(
    ctx: &mut TransformCtx,
    prop_ref: StatementRef,
    prop: &PropertyDecl,
    setter_id: StatementRef,
    params: &[StatementRef],
) -> Result<FunctionDecl> {
    let return_type = ctx.intern_type(TypeBody::PropertySetterReturn)?;
    let value_name = ctx.module_mut().add_anonymous_identifier()?;
    let value_param = ctx.add_stmt(StatementBody::ParameterDecl(ParameterDecl {
        name: value_name,
        param_type: prop.property_type,
    }))?;
    let value_expr = ctx.identifier_expr(value_param, prop.property_type)?;

    let failed = ctx.add_expr(
        return_type,
        ExprOp::SetterStatus { status: SetterStatus::Failed },
    )?;
    let default_return = ctx.add_stmt(StatementBody::Return {
        value: failed,
        related_function: setter_id,
    })?;

    let mut stmt = MatchStatement { target: prop.setter_condition, ..MatchStatement::default() };
    for member in members_of(ctx, prop)? {
        let body = if member.field.is_nil() {
            default_return
        } else {
            let field_decl = field_decl_of(ctx, member.field);
            let field_type = field_decl
                .as_ref()
                .map(|d| d.field_type)
                .unwrap_or(prop.property_type);
            let mut container = Vec::new();
            if let Some(decl) = field_decl.as_ref() {
                if in_variant_struct(ctx, decl) {
                    container.push(ctx.assert_stmt(member.setter_condition)?);
                }
            }
            let self_expr = ctx.identifier_expr(member.field, field_type)?;
            let casted = ctx.cast(field_type, prop.property_type, value_expr)?;
            container.push(ctx.assign(self_expr, casted)?);
            let success = ctx.add_expr(
                return_type,
                ExprOp::SetterStatus { status: SetterStatus::Success },
            )?;
            container.push(ctx.add_stmt(StatementBody::Return {
                value: success,
                related_function: setter_id,
            })?);
            ctx.block(container)?
        };
        let branch = ctx.add_stmt(StatementBody::MatchBranch(MatchBranch {
            condition: member.setter_condition,
            body,
        }))?;
        stmt.branches.push(branch);
    }
    derive_match_lowered_if(ctx, &mut stmt)?;
    let match_ref = ctx.add_stmt(StatementBody::MatchStatement(stmt))?;
    let body = ctx.block(vec![match_ref, default_return])?;

    let mut all_params = vec![value_param];
    all_params.extend_from_slice(params);
    Ok(FunctionDecl {
        kind: FunctionKind::PropertySetter,
        name: prop.name,
        parent_format: prop.parent_format,
        return_type,
        params: all_params,
        body,
        related_property: prop_ref,
    })
}

/// The pass entry: synthesize and attach getter/setter pairs for every
/// property declaration present before the pass ran.
pub fn derive_property_setter_getter(ctx: &mut TransformCtx) -> Result<()> {
    let snapshot = ctx.module.statements.len();
    let properties: Vec<(StatementRef, PropertyDecl)> = ctx
        .module
        .statements
        .entries()
        .iter()
        .take(snapshot)
        .filter_map(|e| match &e.body {
            StatementBody::PropertyDecl(p) if p.getter_function.is_nil() => {
                Some((e.id, p.clone()))
            }
            _ => None,
        })
        .collect();
    for (prop_ref, prop) in properties {
        let getter_id = ctx.module.reserve_statement_id()?;
        let setter_id = ctx.module.reserve_statement_id()?;
        let params = state_params(ctx, prop.parent_format)?;
        let getter = synthesize_getter(ctx, prop_ref, &prop, getter_id, &params)?;
        let setter = synthesize_setter(ctx, prop_ref, &prop, setter_id, &params)?;
        ctx.module
            .statements
            .add_with_id(getter_id, StatementBody::FunctionDecl(getter))?;
        ctx.module
            .statements
            .add_with_id(setter_id, StatementBody::FunctionDecl(setter))?;
        let entry = ctx.module.statements.get_mut(prop_ref).ok_or_else(|| {
            TransformError::internal(PASS, format!("property {prop_ref} vanished"))
        })?;
        let StatementBody::PropertyDecl(decl) = &mut entry.body else {
            return Err(TransformError::internal(PASS, "property changed kind".to_string()));
        };
        decl.getter_function = getter_id;
        decl.setter_function = setter_id;
        tracing::debug!(property = prop_ref.0, "synthesized property accessors");
    }
    Ok(())
}
