//! End-to-end converter scenarios over hand-built ASTs.

use ebmc_ast::{Ast, AstBinaryOp, AstEndian, Follow, Node, NodeId};
use ebmc_core::{
    BinaryOp, ExprOp, FunctionKind, LoopKind, MergeMode, SizeUnit, StatementBody, StatementKind,
    TypeBody, TypeKind,
};
use ebmc_convert::{convert_ast, Converter};

fn field(ident: &str, field_type: NodeId, belong: Option<NodeId>) -> Node {
    Node::Field {
        ident: Some(ident.into()),
        field_type,
        belong,
        is_state_variable: false,
        arguments: None,
        follow: Follow::Unknown,
        eventual_follow: Follow::Unknown,
        next: None,
        belong_struct: None,
    }
}

fn uint(bits: u8) -> Node {
    Node::IntType { is_signed: false, bit_size: bits, endian: AstEndian::Unspec }
}

/// `for i in 0..10 { }` lowers to a counter loop.
#[test]
fn int_range_loop_lowers_to_counter_loop() {
    let mut ast = Ast::new();
    ast.push(Node::Program { elements: vec![] });
    let u8t = ast.push(uint(8));
    // range expr and its type reference each other; patch after push
    let start = ast.push(Node::IntLiteral { expr_type: u8t, value: 0 });
    let end = ast.push(Node::IntLiteral { expr_type: u8t, value: 10 });
    let range_ty = ast.push(Node::VoidType {});
    let range = ast.push(Node::Range {
        expr_type: range_ty,
        start: Some(start),
        end: Some(end),
        inclusive: false,
    });
    ast.nodes[range_ty.index()] = Node::RangeType { base_type: Some(u8t), range };
    let binder_ty = ast.push(Node::VoidType {});
    let init = ast.push(Node::VoidType {});
    let binder = ast.push(Node::Ident { expr_type: u8t, ident: "i".into(), base: init });
    ast.nodes[binder_ty.index()] = Node::VoidType {};
    let body = ast.push(Node::IndentBlock { elements: vec![], struct_type: None });
    ast.nodes[init.index()] = Node::Binary {
        expr_type: range_ty,
        op: AstBinaryOp::InAssign,
        left: binder,
        right: range,
    };
    let loop_node = ast.push(Node::Loop { init: Some(init), cond: None, step: None, body });
    ast.nodes[0] = Node::Program { elements: vec![loop_node] };

    let mut conv = Converter::new(&ast);
    let loop_ref = conv.convert_statement(loop_node).unwrap();
    let StatementBody::LoopStatement(stmt) = &conv.module.get_statement(loop_ref).unwrap().body
    else {
        panic!("expected a loop statement");
    };
    assert_eq!(stmt.loop_kind, LoopKind::ForEach);
    assert!(!stmt.item_var.is_nil());
    assert!(!stmt.collection.is_nil());

    // lowered form: a block declaring the counter and running a while loop
    let lowered = conv.module.get_statement(stmt.lowered_statement).unwrap();
    let StatementBody::Block { container } = &lowered.body else {
        panic!("expected a lowered block");
    };
    let kinds: Vec<StatementKind> = container
        .iter()
        .map(|s| conv.module.statement_kind(*s).unwrap())
        .collect();
    assert_eq!(kinds, vec![StatementKind::VariableDecl, StatementKind::LoopStatement]);
    let StatementBody::LoopStatement(inner) =
        &conv.module.get_statement(container[1]).unwrap().body
    else {
        panic!("expected the counter loop");
    };
    assert_eq!(inner.loop_kind, LoopKind::While);
    let cond = &conv.module.get_expression(inner.condition).unwrap().body;
    assert!(matches!(cond.op, ExprOp::BinaryOp { op: BinaryOp::Less, .. }));
}

/// A `u8 | u16` union derives one COMMON_TYPE property over a variant whose
/// common type is the wider integer.
#[test]
fn two_int_union_derives_common_type_property() {
    let mut ast = Ast::new();
    ast.push(Node::Program { elements: vec![] });
    let u8t = ast.push(uint(8));
    let u16t = ast.push(uint(16));
    let boolt = ast.push(Node::BoolType {});
    let cond_a = ast.push(Node::BoolLiteral { expr_type: boolt, value: true });
    let cond_b = ast.push(Node::BoolLiteral { expr_type: boolt, value: false });
    let field_a = ast.push(field("narrow", u8t, None));
    let field_b = ast.push(field("wide", u16t, None));
    let cand_a = ast.push(Node::UnionCandidate { cond: Some(cond_a), field: Some(field_a) });
    let cand_b = ast.push(Node::UnionCandidate { cond: Some(cond_b), field: Some(field_b) });
    let union_ty = ast.push(Node::UnionType {
        cond: None,
        candidates: vec![cand_a, cand_b],
        common_type: None,
    });
    let union_field = ast.push(field("value", union_ty, None));
    ast.nodes[0] = Node::Program { elements: vec![union_field] };

    let mut conv = Converter::new(&ast);
    let prop_ref = conv.convert_statement(union_field).unwrap();
    let StatementBody::PropertyDecl(prop) = &conv.module.get_statement(prop_ref).unwrap().body
    else {
        panic!("expected a property decl");
    };
    assert_eq!(prop.merge_mode, MergeMode::CommonType);
    assert_eq!(prop.members.len(), 2);
    assert_eq!(prop.derived_from.len(), 2);

    let TypeBody::Variant(variant) = &conv.module.get_type(prop.property_type).unwrap().body
    else {
        panic!("expected a variant property type");
    };
    assert_eq!(variant.members.len(), 2);
    let common = conv.module.get_type(variant.common_type).unwrap();
    assert_eq!(common.body, TypeBody::Uint { size: 16 });

    // every member carries both access-direction conditions
    for member in &prop.members {
        let StatementBody::PropertyMemberDecl(m) =
            &conv.module.get_statement(*member).unwrap().body
        else {
            panic!("expected property members");
        };
        assert!(!m.getter_condition.is_nil());
        assert!(!m.setter_condition.is_nil());
        assert_ne!(m.getter_condition, m.setter_condition);
    }
}

/// A one-field format converts into a struct declaration with eager encoder
/// and decoder functions whose first parameter is the stream handle.
#[test]
fn format_synthesizes_encoder_and_decoder() {
    let mut ast = Ast::new();
    ast.push(Node::Program { elements: vec![] });
    let u8t = ast.push(uint(8));
    let format = ast.push(Node::VoidType {});
    let f = ast.push(field("a", u8t, Some(format)));
    let stype = ast.push(Node::StructType {
        base: Some(format),
        fields: vec![f],
        recursive: false,
        bit_size: Some(8),
        fixed_tail_size: 0,
    });
    let body = ast.push(Node::IndentBlock { elements: vec![f], struct_type: Some(stype) });
    ast.nodes[format.index()] = Node::Format {
        ident: "Simple".into(),
        body,
        encode_fn: None,
        decode_fn: None,
    };
    ast.nodes[0] = Node::Program { elements: vec![format] };

    let module = convert_ast(&ast).unwrap();
    module.validate().unwrap();

    let entry = module.entry_point().unwrap();
    assert_eq!(entry.body.kind(), StatementKind::ProgramDecl);

    let decl = module
        .statements
        .entries()
        .iter()
        .find_map(|e| match &e.body {
            StatementBody::StructDecl(d) => Some(d.clone()),
            _ => None,
        })
        .expect("struct decl present");
    assert_eq!(decl.fields.len(), 1);

    for (fn_ref, kind) in [(decl.encode_fn, FunctionKind::Encoder), (decl.decode_fn, FunctionKind::Decoder)] {
        let StatementBody::FunctionDecl(func) = &module.get_statement(fn_ref).unwrap().body
        else {
            panic!("expected coder function");
        };
        assert_eq!(func.kind, kind);
        // params[0] is the coder input variable declaration
        let StatementBody::VariableDecl(input) =
            &module.get_statement(func.params[0]).unwrap().body
        else {
            panic!("expected stream parameter");
        };
        let expect = if kind == FunctionKind::Encoder {
            TypeKind::EncoderInput
        } else {
            TypeKind::DecoderInput
        };
        assert_eq!(module.type_kind(input.var_type), Some(expect));
    }

    // the u8 field became one fixed one-byte write with a lowered form
    let write = module
        .statements
        .entries()
        .iter()
        .find_map(|e| match &e.body {
            StatementBody::WriteData(d) if !d.field.is_nil() => Some(d.clone()),
            _ => None,
        })
        .expect("field write present");
    assert_eq!(write.size.unit, SizeUnit::ByteFixed);
    assert_eq!(write.size.fixed_value(), Some(1));
    assert!(write.attribute.has_lowered_statement);
    assert!(!write.lowered_statement.is_nil());
}
