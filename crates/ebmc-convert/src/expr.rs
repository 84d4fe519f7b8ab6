//! AST expression -> EBM expression conversion.
//!
//! Every converted expression records its type. Assignment-family binary
//! operators never reach this layer; the statement converter owns them.

use ebmc_ast::{decode_base64, AstBinaryOp, AstUnaryOp, IoMethod, Node, NodeId};
use ebmc_core::{BinaryOp, ExprOp, ExpressionRef, SizeUnit, StreamKind, UnaryOp};

use crate::build::Build;
use crate::context::Converter;
use crate::error::{ConvertError, Result};

pub(crate) fn convert_binary_op(op: AstBinaryOp) -> Result<BinaryOp> {
    Ok(match op {
        AstBinaryOp::Add => BinaryOp::Add,
        AstBinaryOp::Sub => BinaryOp::Sub,
        AstBinaryOp::Mul => BinaryOp::Mul,
        AstBinaryOp::Div => BinaryOp::Div,
        AstBinaryOp::Mod => BinaryOp::Mod,
        AstBinaryOp::Equal => BinaryOp::Equal,
        AstBinaryOp::NotEqual => BinaryOp::NotEqual,
        AstBinaryOp::Less => BinaryOp::Less,
        AstBinaryOp::LessOrEq => BinaryOp::LessOrEq,
        AstBinaryOp::Greater => BinaryOp::Greater,
        AstBinaryOp::GreaterOrEq => BinaryOp::GreaterOrEq,
        AstBinaryOp::LogicalAnd => BinaryOp::LogicalAnd,
        AstBinaryOp::LogicalOr => BinaryOp::LogicalOr,
        AstBinaryOp::LeftShift => BinaryOp::LeftShift,
        AstBinaryOp::RightShift => BinaryOp::RightShift,
        AstBinaryOp::BitAnd => BinaryOp::BitAnd,
        AstBinaryOp::BitOr => BinaryOp::BitOr,
        AstBinaryOp::BitXor => BinaryOp::BitXor,
        other => {
            return Err(ConvertError::unsupported(format!(
                "binary operator {other:?} in expression position"
            )))
        }
    })
}

fn convert_unary_op(op: AstUnaryOp) -> UnaryOp {
    match op {
        AstUnaryOp::Not => UnaryOp::LogicalNot,
        AstUnaryOp::MinusSign => UnaryOp::MinusSign,
    }
}

impl Converter<'_> {
    pub fn convert_expr(&mut self, node_id: NodeId) -> Result<ExpressionRef> {
        let node = self.node(node_id).clone();
        let expr_type = node.expr_type().ok_or_else(|| {
            ConvertError::internal(format!("{} is not an expression", node.name()))
        })?;

        match node {
            Node::IntLiteral { value, .. } => {
                // re-encoded with the narrowest fitting unsigned type
                self.int_literal(value)
            }
            Node::BoolLiteral { value, .. } => self.bool_literal(value),
            Node::StrLiteral { value, .. } => {
                let data = decode_base64(&value)?;
                let ty = self.convert_type(expr_type, None)?;
                let string = self.module.add_string(data)?;
                self.add_expr(ty, ExprOp::LiteralString { value: string })
            }
            Node::TypeLiteral { type_literal, .. } => {
                let ty = self.convert_type(expr_type, None)?;
                let inner = self.convert_type(type_literal, None)?;
                self.add_expr(ty, ExprOp::LiteralType { type_ref: inner })
            }
            Node::Ident { base, .. } => {
                let ty = self.convert_type(expr_type, None)?;
                let decl = self.convert_decl(base)?;
                self.add_expr(ty, ExprOp::Identifier { decl })
            }
            Node::Binary { op, left, right, .. } => {
                if matches!(op, AstBinaryOp::DefineAssign | AstBinaryOp::ConstAssign) {
                    return Err(ConvertError::unsupported(
                        "definition assignment in expression position",
                    ));
                }
                let ty = self.convert_type(expr_type, None)?;
                let left = self.convert_expr(left)?;
                let right = self.convert_expr(right)?;
                let op = convert_binary_op(op)?;
                self.add_expr(ty, ExprOp::BinaryOp { op, left, right })
            }
            Node::Unary { op, expr, .. } => {
                let ty = self.convert_type(expr_type, None)?;
                let operand = self.convert_expr(expr)?;
                self.add_expr(ty, ExprOp::UnaryOp { op: convert_unary_op(op), operand })
            }
            Node::Index { expr, index, .. } => {
                let ty = self.convert_type(expr_type, None)?;
                let base = self.convert_expr(expr)?;
                let index = self.convert_expr(index)?;
                self.add_expr(ty, ExprOp::IndexAccess { base, index })
            }
            Node::MemberAccess { target, member, .. } => {
                let ty = self.convert_type(expr_type, None)?;
                let base = self.convert_expr(target)?;
                let member = self.convert_expr(member)?;
                self.add_expr(ty, ExprOp::MemberAccess { base, member })
            }
            Node::Cast { expr, .. } => {
                let to = self.convert_type(expr_type, None)?;
                let from_node = self.ast.expr_type_of(expr).ok_or_else(|| {
                    ConvertError::internal("cast source is not an expression".to_string())
                })?;
                let from = self.convert_type(from_node, None)?;
                let source = self.convert_expr(expr)?;
                self.cast(to, from, source)
            }
            Node::Range { start, end, .. } => {
                let ty = self.convert_type(expr_type, None)?;
                let start = match start {
                    Some(s) => self.convert_expr(s)?,
                    None => ExpressionRef::NIL,
                };
                let end = match end {
                    Some(e) => self.convert_expr(e)?,
                    None => ExpressionRef::NIL,
                };
                self.add_expr(ty, ExprOp::Range { start, end })
            }
            Node::IoOperation { method, .. } => self.convert_io_operation(method, expr_type),
            other => Err(ConvertError::unsupported(format!(
                "expression conversion of {}",
                other.name()
            ))),
        }
    }

    fn convert_io_operation(
        &mut self,
        method: IoMethod,
        _expr_type: NodeId,
    ) -> Result<ExpressionRef> {
        let counter_type = self.counter_type()?;
        match method {
            IoMethod::InputOffset | IoMethod::InputBitOffset => self.add_expr(
                counter_type,
                ExprOp::GetStreamOffset {
                    stream: StreamKind::Input,
                    unit: if method == IoMethod::InputBitOffset {
                        SizeUnit::BitFixed
                    } else {
                        SizeUnit::ByteFixed
                    },
                },
            ),
            IoMethod::InputRemain => self.add_expr(
                counter_type,
                ExprOp::GetRemainingBytes { stream: StreamKind::Input },
            ),
            // reserved for transform-stage lowering
            IoMethod::OutputPut | IoMethod::InputPeek | IoMethod::InputSubrange
            | IoMethod::InputGet => Err(ConvertError::unsupported(format!(
                "stream operation {method:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ebmc_ast::{Ast, AstEndian};
    use ebmc_core::ExpressionKind;

    fn small_ast() -> (Ast, NodeId, NodeId) {
        let mut ast = Ast::new();
        ast.push(Node::Program { elements: vec![] });
        let u8t = ast.push(Node::IntType { is_signed: false, bit_size: 8, endian: AstEndian::Unspec });
        let boolt = ast.push(Node::BoolType {});
        (ast, u8t, boolt)
    }

    #[test]
    fn binary_expr_records_operands_and_type() {
        let (mut ast, u8t, boolt) = small_ast();
        let one = ast.push(Node::IntLiteral { expr_type: u8t, value: 1 });
        let two = ast.push(Node::IntLiteral { expr_type: u8t, value: 2 });
        let cmp = ast.push(Node::Binary {
            expr_type: boolt,
            op: AstBinaryOp::Less,
            left: one,
            right: two,
        });
        let mut c = Converter::new(&ast);
        let e = c.convert_expr(cmp).unwrap();
        let body = &c.module.get_expression(e).unwrap().body;
        assert!(matches!(body.op, ExprOp::BinaryOp { op: BinaryOp::Less, .. }));
        assert_eq!(c.module.type_kind(body.ty), Some(ebmc_core::TypeKind::Bool));
    }

    #[test]
    fn definition_assign_is_not_an_expression() {
        let (mut ast, u8t, _) = small_ast();
        let lit = ast.push(Node::IntLiteral { expr_type: u8t, value: 1 });
        let bad = ast.push(Node::Binary {
            expr_type: u8t,
            op: AstBinaryOp::DefineAssign,
            left: lit,
            right: lit,
        });
        let mut c = Converter::new(&ast);
        assert!(c.convert_expr(bad).is_err());
    }

    #[test]
    fn stream_offset_methods_carry_units() {
        let (mut ast, u8t, _) = small_ast();
        let bit = ast.push(Node::IoOperation {
            expr_type: u8t,
            method: IoMethod::InputBitOffset,
            arguments: vec![],
        });
        let rem = ast.push(Node::IoOperation {
            expr_type: u8t,
            method: IoMethod::InputRemain,
            arguments: vec![],
        });
        let mut c = Converter::new(&ast);
        let e = c.convert_expr(bit).unwrap();
        assert!(matches!(
            c.module.get_expression(e).unwrap().body.op,
            ExprOp::GetStreamOffset { unit: SizeUnit::BitFixed, .. }
        ));
        let e = c.convert_expr(rem).unwrap();
        assert_eq!(c.module.expression_kind(e), Some(ExpressionKind::GetRemainingBytes));
    }

    #[test]
    fn string_literal_is_decoded_and_interned() {
        let (mut ast, _, _) = small_ast();
        let strty = ast.push(Node::StrLiteralType {
            base: NodeId(0),
            bit_size: Some(24),
        });
        let lit = ast.push(Node::StrLiteral { expr_type: strty, value: "QUJD".into() });
        let mut c = Converter::new(&ast);
        let e = c.convert_expr(lit).unwrap();
        let ExprOp::LiteralString { value } = c.module.get_expression(e).unwrap().body.op else {
            panic!("expected string literal");
        };
        assert_eq!(c.module.get_string(value).unwrap().data, b"ABC");
    }
}
