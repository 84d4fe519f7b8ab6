//! Composite field grouping.
//!
//! Adjacent struct fields whose bit sizes are statically known merge under
//! one `COMPOSITE_FIELD_DECL` so downstream I/O passes can treat the run as
//! a single unit. A run keeps growing while the accumulated size is not
//! byte-aligned, while it is byte-aligned but not a common machine width
//! (8/16/32/64), or when an odd-sized field completes a common width.
//! Fields with unknown size always stand alone; non-field struct members
//! keep their declarations and move after the grouped runs.

use ebmc_convert::Build;
use ebmc_core::{CompositeFieldDecl, StatementBody, StatementRef, TypeBody, TypeRef};

use crate::ctx::TransformCtx;
use crate::error::{Result, TransformError};

const PASS: &str = "merge_bit_fields";

/// Static bit size of a type: scalars directly, enums and ranges through
/// their base type, variants as the widest member, everything else unknown.
fn sizeof_type(ctx: &TransformCtx, ty: TypeRef) -> Option<u64> {
    let body = ctx.module.get_type(ty).map(|e| e.body.clone())?;
    if let Some(bits) = body.bit_size() {
        return Some(bits);
    }
    match body {
        TypeBody::Enum { base_type, .. } | TypeBody::Range { base_type }
            if !base_type.is_nil() =>
        {
            sizeof_type(ctx, base_type)
        }
        TypeBody::Variant(v) => {
            let mut widest = 0;
            for member in &v.members {
                widest = widest.max(sizeof_type(ctx, *member)?);
            }
            Some(widest)
        }
        _ => None,
    }
}

fn is_common_width(bits: u64) -> bool {
    matches!(bits, 8 | 16 | 32 | 64)
}

/// Greedy run grouping over the sized fields, in declaration order.
fn group_fields(sized: &[(usize, Option<u64>)]) -> Vec<(Option<u64>, Vec<usize>)> {
    let mut groups: Vec<(Option<u64>, Vec<usize>)> = Vec::new();
    for &(index, size) in sized {
        let Some(size) = size else {
            groups.push((None, vec![index]));
            continue;
        };
        let extend = match groups.last() {
            Some((Some(last_size), _)) => {
                *last_size % 8 != 0
                    || !is_common_width(*last_size)
                    || (!is_common_width(size) && is_common_width(*last_size + size))
            }
            _ => false,
        };
        if extend {
            let (last_size, indexes) = groups.last_mut().expect("run in progress");
            *last_size = Some(last_size.unwrap_or(0) + size);
            indexes.push(index);
        } else {
            groups.push((Some(size), vec![index]));
        }
    }
    groups
}

/// The pass entry: rewrites every struct's member list, one composite
/// declaration per multi-field run, and points each grouped field back at
/// its composite.
pub fn merge_bit_fields(ctx: &mut TransformCtx) -> Result<()> {
    let snapshot = ctx.module.statements.len();
    let structs: Vec<StatementRef> = ctx
        .module
        .statements
        .entries()
        .iter()
        .take(snapshot)
        .filter(|e| matches!(e.body, StatementBody::StructDecl(_)))
        .map(|e| e.id)
        .collect();

    for struct_ref in structs {
        let fields: Vec<StatementRef> = match ctx.module.get_statement(struct_ref).map(|e| &e.body)
        {
            Some(StatementBody::StructDecl(decl)) => decl.fields.clone(),
            _ => continue,
        };
        let mut sized: Vec<(usize, Option<u64>)> = Vec::new();
        let mut passthrough: Vec<usize> = Vec::new();
        for (index, field) in fields.iter().enumerate() {
            match ctx.module.get_statement(*field).map(|e| &e.body) {
                Some(StatementBody::FieldDecl(decl)) => {
                    let size = sizeof_type(ctx, decl.field_type);
                    sized.push((index, size));
                }
                _ => passthrough.push(index),
            }
        }
        let groups = group_fields(&sized);
        if groups.len() == sized.len() {
            continue;
        }
        tracing::debug!(
            struct_decl = struct_ref.0,
            groups = groups.len(),
            fields = sized.len(),
            "merging adjacent bit fields"
        );

        let mut container = Vec::with_capacity(groups.len() + passthrough.len());
        for (size, indexes) in groups {
            if indexes.len() == 1 {
                container.push(fields[indexes[0]]);
                continue;
            }
            let total = size.ok_or_else(|| {
                TransformError::internal(PASS, "multi-field group lost its size".to_string())
            })?;
            if total > 255 {
                // wider than any representable scalar; keep the run apart
                for index in indexes {
                    container.push(fields[index]);
                }
                continue;
            }
            let members: Vec<StatementRef> = indexes.iter().map(|&i| fields[i]).collect();
            let composite_type = ctx.uint_type(total as u8)?;
            let name = ctx.module_mut().add_anonymous_identifier()?;
            let composite = ctx.add_stmt(StatementBody::CompositeFieldDecl(CompositeFieldDecl {
                name,
                parent_struct: struct_ref,
                composite_type,
                fields: members.clone(),
            }))?;
            for member in &members {
                let entry = ctx.module.statements.get_mut(*member).ok_or_else(|| {
                    TransformError::internal(PASS, format!("field {member} vanished"))
                })?;
                if let StatementBody::FieldDecl(decl) = &mut entry.body {
                    decl.composite_field = composite;
                }
            }
            container.push(composite);
        }
        for index in passthrough {
            container.push(fields[index]);
        }
        let entry = ctx.module.statements.get_mut(struct_ref).ok_or_else(|| {
            TransformError::internal(PASS, format!("struct {struct_ref} vanished"))
        })?;
        let StatementBody::StructDecl(decl) = &mut entry.body else {
            return Err(TransformError::internal(PASS, "struct changed kind".to_string()));
        };
        decl.fields = container;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ebmc_core::{FieldDecl, Module, StructDecl};

    fn field(ctx: &mut TransformCtx, bits: u8) -> StatementRef {
        let ty = ctx.uint_type(bits).unwrap();
        ctx.add_stmt(StatementBody::FieldDecl(FieldDecl {
            field_type: ty,
            ..FieldDecl::default()
        }))
        .unwrap()
    }

    #[test]
    fn adjacent_sub_byte_fields_merge_into_one_composite() {
        let mut ctx = TransformCtx::new(Module::new());
        let a = field(&mut ctx, 4);
        let b = field(&mut ctx, 4);
        let s = ctx
            .add_stmt(StatementBody::StructDecl(StructDecl {
                fields: vec![a, b],
                ..StructDecl::default()
            }))
            .unwrap();

        merge_bit_fields(&mut ctx).unwrap();

        let StatementBody::StructDecl(decl) = ctx.module.get_statement(s).unwrap().body.clone()
        else {
            panic!("struct lost");
        };
        assert_eq!(decl.fields.len(), 1);
        let StatementBody::CompositeFieldDecl(comp) =
            ctx.module.get_statement(decl.fields[0]).unwrap().body.clone()
        else {
            panic!("expected a composite field");
        };
        assert_eq!(comp.fields, vec![a, b]);
        assert_eq!(comp.parent_struct, s);
        assert_eq!(
            ctx.module.get_type(comp.composite_type).map(|e| e.body.clone()),
            Some(TypeBody::Uint { size: 8 })
        );
        for member in [a, b] {
            let StatementBody::FieldDecl(f) =
                ctx.module.get_statement(member).unwrap().body.clone()
            else {
                panic!("field lost");
            };
            assert_eq!(f.composite_field, decl.fields[0]);
        }
    }

    /// 3 + 5 bits complete one byte; the trailing aligned u16 stays alone.
    #[test]
    fn runs_split_at_common_widths() {
        let mut ctx = TransformCtx::new(Module::new());
        let a = field(&mut ctx, 3);
        let b = field(&mut ctx, 5);
        let c = field(&mut ctx, 16);
        let s = ctx
            .add_stmt(StatementBody::StructDecl(StructDecl {
                fields: vec![a, b, c],
                ..StructDecl::default()
            }))
            .unwrap();

        merge_bit_fields(&mut ctx).unwrap();

        let StatementBody::StructDecl(decl) = ctx.module.get_statement(s).unwrap().body.clone()
        else {
            panic!("struct lost");
        };
        assert_eq!(decl.fields.len(), 2);
        assert!(matches!(
            ctx.module.get_statement(decl.fields[0]).unwrap().body,
            StatementBody::CompositeFieldDecl(_)
        ));
        assert_eq!(decl.fields[1], c);
        let StatementBody::FieldDecl(f) = ctx.module.get_statement(c).unwrap().body.clone()
        else {
            panic!("field lost");
        };
        assert!(f.composite_field.is_nil());
    }

    #[test]
    fn aligned_fields_do_not_merge() {
        let mut ctx = TransformCtx::new(Module::new());
        let a = field(&mut ctx, 8);
        let b = field(&mut ctx, 8);
        let s = ctx
            .add_stmt(StatementBody::StructDecl(StructDecl {
                fields: vec![a, b],
                ..StructDecl::default()
            }))
            .unwrap();

        merge_bit_fields(&mut ctx).unwrap();

        let StatementBody::StructDecl(decl) = ctx.module.get_statement(s).unwrap().body.clone()
        else {
            panic!("struct lost");
        };
        assert_eq!(decl.fields, vec![a, b]);
    }
}
