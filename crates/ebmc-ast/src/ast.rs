//! The AST arena, its JSON loader, and literal decoding.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{AstError, Result};
use crate::node::{Node, NodeId};

/// The whole source tree: an arena of tagged nodes. `nodes[root]` is the
/// `Program`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ast {
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub root: NodeId,
}

impl Ast {
    pub fn new() -> Self {
        Ast { nodes: Vec::new(), root: NodeId(0) }
    }

    /// Appends a node and returns its id. Test fixtures and the loader are
    /// the only writers.
    pub fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Follows `IdentType` aliases down to the underlying type node.
    pub fn resolve_type(&self, mut id: NodeId) -> NodeId {
        let mut hops = 0;
        while let Node::IdentType { base } = self.node(id) {
            id = *base;
            hops += 1;
            if hops > self.nodes.len() {
                break;
            }
        }
        id
    }

    /// The declared type of an expression node.
    pub fn expr_type_of(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).expr_type()
    }

    /// Parses the loader JSON (`{"nodes": [...], "root": n}`) and validates
    /// every cross-reference.
    pub fn from_json_str(text: &str) -> Result<Ast> {
        let ast: Ast = serde_json::from_str(text)?;
        ast.validate()?;
        Ok(ast)
    }

    /// Checks that every node reference lands inside the arena and that the
    /// root is a program.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.get(self.root), Some(Node::Program { .. })) {
            return Err(AstError::NoRoot);
        }
        for (index, node) in self.nodes.iter().enumerate() {
            for child in child_ids(node) {
                if child.index() >= self.nodes.len() {
                    return Err(AstError::BadNodeRef { holder: index as u32, target: child.0 });
                }
            }
        }
        Ok(())
    }
}

/// Decodes a base64-encoded string-literal payload.
pub fn decode_base64(value: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(value)
        .map_err(|e| AstError::BadBase64 { reason: e.to_string() })
}

/// Every node id held by `node`, in field order.
pub fn child_ids(node: &Node) -> Vec<NodeId> {
    let mut out = Vec::new();
    macro_rules! one {
        ($id:expr) => {
            out.push(*$id)
        };
    }
    macro_rules! opt {
        ($id:expr) => {
            if let Some(id) = $id {
                out.push(*id);
            }
        };
    }
    match node {
        Node::IntType { .. }
        | Node::FloatType { .. }
        | Node::BoolType {}
        | Node::VoidType {}
        | Node::MetaType {}
        | Node::Break {}
        | Node::Continue {}
        | Node::Import { .. } => {}
        Node::IdentType { base } | Node::IntLiteralType { base } | Node::EnumType { base } => {
            one!(base)
        }
        Node::StrLiteralType { base, .. } => one!(base),
        Node::ArrayType { element_type, length, .. } => {
            one!(element_type);
            opt!(length);
        }
        Node::StructType { base, fields, .. } => {
            opt!(base);
            fields.iter().for_each(|id| one!(id));
        }
        Node::StructUnionType { structs, .. } => structs.iter().for_each(|id| one!(id)),
        Node::UnionType { cond, candidates, common_type } => {
            opt!(cond);
            candidates.iter().for_each(|id| one!(id));
            opt!(common_type);
        }
        Node::UnionCandidate { cond, field } => {
            opt!(cond);
            opt!(field);
        }
        Node::RangeType { base_type, range } => {
            opt!(base_type);
            one!(range);
        }
        Node::FunctionType { parameters, return_type } => {
            parameters.iter().for_each(|id| one!(id));
            opt!(return_type);
        }
        Node::Ident { expr_type, base, .. } => {
            one!(expr_type);
            one!(base);
        }
        Node::IntLiteral { expr_type, .. }
        | Node::BoolLiteral { expr_type, .. }
        | Node::StrLiteral { expr_type, .. } => one!(expr_type),
        Node::TypeLiteral { expr_type, type_literal } => {
            one!(expr_type);
            one!(type_literal);
        }
        Node::Binary { expr_type, left, right, .. } => {
            one!(expr_type);
            one!(left);
            one!(right);
        }
        Node::Unary { expr_type, expr, .. } | Node::Cast { expr_type, expr } => {
            one!(expr_type);
            one!(expr);
        }
        Node::Index { expr_type, expr, index } => {
            one!(expr_type);
            one!(expr);
            one!(index);
        }
        Node::MemberAccess { expr_type, target, member } => {
            one!(expr_type);
            one!(target);
            one!(member);
        }
        Node::Range { expr_type, start, end, .. } => {
            one!(expr_type);
            opt!(start);
            opt!(end);
        }
        Node::IoOperation { expr_type, arguments, .. } => {
            one!(expr_type);
            arguments.iter().for_each(|id| one!(id));
        }
        Node::Program { elements } => elements.iter().for_each(|id| one!(id)),
        Node::Format { body, encode_fn, decode_fn, .. } => {
            one!(body);
            opt!(encode_fn);
            opt!(decode_fn);
        }
        Node::Field { field_type, belong, next, belong_struct, .. } => {
            one!(field_type);
            opt!(belong);
            opt!(next);
            opt!(belong_struct);
        }
        Node::Function { belong, parameters, return_type, body, .. } => {
            opt!(belong);
            parameters.iter().for_each(|id| one!(id));
            opt!(return_type);
            one!(body);
        }
        Node::Enum { base_type, members, .. } => {
            opt!(base_type);
            members.iter().for_each(|id| one!(id));
        }
        Node::EnumMember { value, str_literal, .. } => {
            opt!(value);
            opt!(str_literal);
        }
        Node::If { cond, then, els } => {
            one!(cond);
            one!(then);
            opt!(els);
        }
        Node::Loop { init, cond, step, body } => {
            opt!(init);
            opt!(cond);
            opt!(step);
            one!(body);
        }
        Node::Match { cond, branch, .. } => {
            one!(cond);
            branch.iter().for_each(|id| one!(id));
        }
        Node::MatchBranch { cond, then } => {
            one!(cond);
            opt!(then);
        }
        Node::Return { expr } => opt!(expr),
        Node::Assert { cond } => one!(cond),
        Node::ExplicitError { message, arguments } => {
            one!(message);
            arguments.iter().for_each(|id| one!(id));
        }
        Node::Metadata { values, .. } => values.iter().for_each(|id| one!(id)),
        Node::State { body, .. } => one!(body),
        Node::IndentBlock { elements, struct_type } => {
            elements.iter().for_each(|id| one!(id));
            opt!(struct_type);
        }
        Node::ImplicitYield { expr } | Node::ScopedStatement { statement: expr } => one!(expr),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_lookup() {
        let mut ast = Ast::new();
        let root = ast.push(Node::Program { elements: vec![] });
        assert_eq!(root, NodeId(0));
        assert!(matches!(ast.node(root), Node::Program { .. }));
    }

    #[test]
    fn validate_rejects_dangling_refs() {
        let mut ast = Ast::new();
        ast.push(Node::Program { elements: vec![NodeId(42)] });
        assert!(matches!(
            ast.validate(),
            Err(AstError::BadNodeRef { holder: 0, target: 42 })
        ));
    }

    #[test]
    fn resolve_type_follows_ident_chain() {
        let mut ast = Ast::new();
        ast.push(Node::Program { elements: vec![] });
        let int = ast.push(Node::IntType { is_signed: false, bit_size: 8, endian: Default::default() });
        let alias = ast.push(Node::IdentType { base: int });
        let alias2 = ast.push(Node::IdentType { base: alias });
        assert_eq!(ast.resolve_type(alias2), int);
    }

    #[test]
    fn base64_literals_decode() {
        assert_eq!(decode_base64("QUJD").unwrap(), b"ABC");
        assert!(decode_base64("!!!").is_err());
    }

    #[test]
    fn json_loader_roundtrip() {
        let mut ast = Ast::new();
        let _root = ast.push(Node::Program { elements: vec![] });
        let text = serde_json::to_string(&ast).unwrap();
        let back = Ast::from_json_str(&text).unwrap();
        assert_eq!(ast, back);
    }
}
