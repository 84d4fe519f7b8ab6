//! Transform pipeline scenarios over hand-built modules.

use ebmc_convert::{make_io_data, Build};
use ebmc_core::{
    Endian, ExprOp, ExpressionBody, ExpressionRef, FunctionDecl, IoAttribute, IoSize, Module,
    SizeUnit, StatementBody, StatementRef, TypeBody,
};
use ebmc_transform::cfg::analyze_function;
use ebmc_transform::{bit_io, vectorize, TransformCtx};

fn byte_write(ctx: &mut TransformCtx, value: u64) -> StatementRef {
    let u8t = ctx.uint_type(8).unwrap();
    let lit = ctx.int_literal(value).unwrap();
    ctx.add_stmt(StatementBody::WriteData(make_io_data(
        StatementRef::NIL,
        StatementRef::NIL,
        lit,
        u8t,
        IoAttribute::default(),
        IoSize::fixed(1, SizeUnit::ByteFixed),
    )))
    .unwrap()
}

fn bit_read(ctx: &mut TransformCtx, bits: u64) -> StatementRef {
    let ty = ctx.uint_type(bits as u8).unwrap();
    let init = ctx.default_value(ty).unwrap();
    let (target, _def) = ctx.define_anon_var(ty, init).unwrap();
    let attribute = IoAttribute { endian: Endian::Big, ..IoAttribute::default() };
    ctx.add_stmt(StatementBody::ReadData(make_io_data(
        StatementRef::NIL,
        StatementRef::NIL,
        target,
        ty,
        attribute,
        IoSize::fixed(bits, SizeUnit::BitFixed),
    )))
    .unwrap()
}

/// S1: two adjacent one-byte writes vectorize into a single `u8[2]` write
/// whose lowered block holds the originals in order.
#[test]
fn adjacent_byte_writes_vectorize() {
    let mut ctx = TransformCtx::new(Module::new());
    let a = byte_write(&mut ctx, 1);
    let b = byte_write(&mut ctx, 2);
    let block = ctx.block(vec![a, b]).unwrap();

    vectorize::vectorized_io(&mut ctx, true).unwrap();

    let module = ctx.into_module();
    let container = module.get_statement(block).unwrap().body.block().unwrap().to_vec();
    assert_eq!(container.len(), 1);
    let StatementBody::WriteData(io) = &module.get_statement(container[0]).unwrap().body else {
        panic!("expected the merged write");
    };
    assert_eq!(io.size.unit, SizeUnit::ByteFixed);
    assert_eq!(io.size.fixed_value(), Some(2));
    assert_eq!(
        module.get_type(io.data_type).map(|e| e.body.clone()),
        Some(TypeBody::Array {
            element: module
                .types
                .entries()
                .iter()
                .find(|t| t.body == TypeBody::Uint { size: 8 })
                .unwrap()
                .id,
            length: 2
        })
    );
    assert!(io.attribute.has_lowered_statement);
    let StatementBody::LoweredStatements { alternatives } =
        &module.get_statement(io.lowered_statement).unwrap().body
    else {
        panic!("expected the lowered list");
    };
    let originals = module
        .get_statement(alternatives[0].block)
        .unwrap()
        .body
        .block()
        .unwrap()
        .to_vec();
    assert_eq!(originals, vec![a, b]);
}

/// Two adjacent 4-bit fields group under one composite, and their
/// vectorized write attributes to it rather than to the first field.
#[test]
fn vectorized_run_attributes_to_the_composite_field() {
    let mut ctx = TransformCtx::new(Module::new());
    let u4 = ctx.uint_type(4).unwrap();
    let field_a = ctx
        .add_stmt(StatementBody::FieldDecl(ebmc_core::FieldDecl {
            field_type: u4,
            ..ebmc_core::FieldDecl::default()
        }))
        .unwrap();
    let field_b = ctx
        .add_stmt(StatementBody::FieldDecl(ebmc_core::FieldDecl {
            field_type: u4,
            ..ebmc_core::FieldDecl::default()
        }))
        .unwrap();
    ctx.add_stmt(StatementBody::StructDecl(ebmc_core::StructDecl {
        fields: vec![field_a, field_b],
        ..ebmc_core::StructDecl::default()
    }))
    .unwrap();

    ebmc_transform::composite::merge_bit_fields(&mut ctx).unwrap();

    let composite = match &ctx.module.get_statement(field_a).unwrap().body {
        StatementBody::FieldDecl(decl) => decl.composite_field,
        other => panic!("expected a field decl, got {:?}", other.kind()),
    };
    assert!(!composite.is_nil());

    let writes: Vec<StatementRef> = [field_a, field_b]
        .into_iter()
        .map(|field| {
            let lit = ctx.int_literal(1).unwrap();
            ctx.add_stmt(StatementBody::WriteData(make_io_data(
                StatementRef::NIL,
                field,
                lit,
                u4,
                IoAttribute::default(),
                IoSize::fixed(4, SizeUnit::BitFixed),
            )))
            .unwrap()
        })
        .collect();
    let block = ctx.block(writes).unwrap();

    vectorize::vectorized_io(&mut ctx, true).unwrap();

    let module = ctx.into_module();
    let container = module.get_statement(block).unwrap().body.block().unwrap().to_vec();
    assert_eq!(container.len(), 1);
    let StatementBody::WriteData(io) = &module.get_statement(container[0]).unwrap().body else {
        panic!("expected the merged write");
    };
    assert_eq!(io.field, composite);
    assert_eq!(io.size.unit, SizeUnit::ByteFixed);
    assert_eq!(io.size.fixed_value(), Some(1));
}

/// S2: bit fields of 3, 5, and 4 bits: {3,5} forms a byte-aligned group and
/// both statements get a packed lowering; the trailing 4-bit read stays
/// untouched.
#[test]
fn bit_fields_group_on_byte_boundary() {
    let mut ctx = TransformCtx::new(Module::new());
    let a = bit_read(&mut ctx, 3);
    let b = bit_read(&mut ctx, 5);
    let c = bit_read(&mut ctx, 4);
    let body = ctx.block(vec![a, b, c]).unwrap();
    let function = ctx
        .add_stmt(StatementBody::FunctionDecl(FunctionDecl {
            body,
            ..FunctionDecl::default()
        }))
        .unwrap();

    let flow = ebmc_transform::analyze_module(&ctx.module).unwrap();
    assert!(flow.for_function(function).is_some());
    bit_io::lowered_dynamic_bit_io(&mut ctx, &flow, false).unwrap();

    let module = ctx.into_module();
    let io_of = |s: StatementRef| module.get_statement(s).unwrap().body.io_data().cloned().unwrap();
    assert!(io_of(a).attribute.has_lowered_statement);
    assert!(io_of(b).attribute.has_lowered_statement);
    assert!(!io_of(c).attribute.has_lowered_statement);

    // the group buffer is one byte wide
    let u8t = module
        .types
        .entries()
        .iter()
        .find(|t| t.body == TypeBody::Uint { size: 8 })
        .unwrap()
        .id;
    assert!(module
        .types
        .entries()
        .iter()
        .any(|t| t.body == TypeBody::Array { element: u8t, length: 1 }));

    // the emitted lowering reads the stream one byte at a time
    assert!(module.statements.entries().iter().any(|e| match &e.body {
        StatementBody::ReadData(io) => {
            io.size.unit == SizeUnit::ByteFixed && io.size.fixed_value() == Some(1)
        }
        _ => false,
    }));
}

/// S6: in an if/else diamond the merge point's immediate dominator is the
/// branching statement.
#[test]
fn merge_point_is_dominated_by_the_branch() {
    let mut ctx = TransformCtx::new(Module::new());
    let boolt = ctx.bool_type().unwrap();
    let cond = ctx
        .add_expr(boolt, ExprOp::LiteralBool { value: true })
        .unwrap();
    let then_stmt = expr_stmt(&mut ctx, cond);
    let else_stmt = expr_stmt(&mut ctx, cond);
    let branch = ctx.if_stmt(cond, then_stmt, else_stmt).unwrap();
    let after = expr_stmt(&mut ctx, cond);
    let body = ctx.block(vec![branch, after]).unwrap();
    let function = ctx
        .add_stmt(StatementBody::FunctionDecl(FunctionDecl {
            body,
            ..FunctionDecl::default()
        }))
        .unwrap();

    let module = ctx.into_module();
    let result = analyze_function(&module, function).unwrap();
    let branch_node = result.cfg.by_statement[&branch.0];
    let after_node = result.cfg.by_statement[&after.0];

    // walk the idom chain from the merge point; the branch must come first
    let mut cursor = after_node;
    let mut found = false;
    while let Some(parent) = result.dominators.idom.get(&cursor) {
        if *parent == branch_node {
            found = true;
            break;
        }
        cursor = *parent;
    }
    assert!(found, "branch does not dominate the merge point");
    // and neither arm dominates it
    let then_node = result.cfg.by_statement[&then_stmt.0];
    assert_ne!(result.dominators.idom.get(&after_node), Some(&then_node));
}

fn expr_stmt(ctx: &mut TransformCtx, expr: ExpressionRef) -> StatementRef {
    ctx.add_stmt(StatementBody::Expression { expression: expr }).unwrap()
}

/// S5 companion: the escape hatch leaves unused objects in place.
#[test]
fn transform_can_skip_dead_code_removal() {
    let mut module = Module::new();
    let unused = module.add_identifier("kept").unwrap();
    let t = module.add_type(TypeBody::Bool).unwrap();
    let e = module
        .add_expression(ExpressionBody::new(t, ExprOp::LiteralBool { value: true }))
        .unwrap();
    let s = module.add_statement(StatementBody::Expression { expression: e }).unwrap();
    module
        .statements
        .add_with_id(StatementRef::ENTRY, StatementBody::Block { container: vec![s] })
        .unwrap();

    let mut kept = module.clone();
    ebmc_transform::transform(&mut kept, &ebmc_transform::Options { remove_unused: false })
        .unwrap();
    assert!(kept.get_identifier(unused).is_some());

    let mut pruned = module;
    ebmc_transform::transform(&mut pruned, &ebmc_transform::Options::default()).unwrap();
    assert!(pruned.identifiers.is_empty());
}
