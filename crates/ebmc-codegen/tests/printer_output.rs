//! The printer renders a converted module end to end.

use ebmc_ast::{Ast, AstEndian, Follow, Node};
use ebmc_convert::convert_ast;

fn simple_format_ast() -> Ast {
    let mut ast = Ast::new();
    ast.push(Node::Program { elements: vec![] });
    let u8t = ast.push(Node::IntType {
        is_signed: false,
        bit_size: 8,
        endian: AstEndian::Unspec,
    });
    let format = ast.push(Node::VoidType {});
    let field = ast.push(Node::Field {
        ident: Some("a".into()),
        field_type: u8t,
        belong: Some(format),
        is_state_variable: false,
        arguments: None,
        follow: Follow::Unknown,
        eventual_follow: Follow::Unknown,
        next: None,
        belong_struct: None,
    });
    let stype = ast.push(Node::StructType {
        base: Some(format),
        fields: vec![field],
        recursive: false,
        bit_size: Some(8),
        fixed_tail_size: 0,
    });
    let body = ast.push(Node::IndentBlock { elements: vec![field], struct_type: Some(stype) });
    ast.nodes[format.index()] = Node::Format {
        ident: "Simple".into(),
        body,
        encode_fn: None,
        decode_fn: None,
    };
    ast.nodes[0] = Node::Program { elements: vec![format] };
    ast
}

#[test]
fn dump_code_renders_declarations_and_io() {
    let module = convert_ast(&simple_format_ast()).unwrap();
    let text = ebmc_codegen::dump_code(&module).unwrap();
    assert!(text.contains("format Simple"), "missing struct header:\n{text}");
    assert!(text.contains("a: u8"), "missing field line:\n{text}");
    assert!(text.contains("fn encode"), "missing encoder:\n{text}");
    assert!(text.contains("fn decode"), "missing decoder:\n{text}");
    assert!(text.contains("write "), "missing write statement:\n{text}");
    assert!(text.contains("read "), "missing read statement:\n{text}");
    // the lowered byte-array form rides along
    assert!(text.contains("lowered:"), "missing lowered block:\n{text}");
}
