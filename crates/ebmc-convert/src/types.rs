//! AST type -> EBM type conversion.

use ebmc_ast::{decode_base64, Node, NodeId};
use ebmc_core::{TypeBody, TypeRef, VariantDesc};

use crate::build::Build;
use crate::context::Converter;
use crate::error::{ConvertError, Result};

impl Converter<'_> {
    /// Converts an AST type node. `field` carries the declaring field when
    /// one exists; alignment-padded vectors need its annotations.
    pub fn convert_type(&mut self, ty: NodeId, field: Option<NodeId>) -> Result<TypeRef> {
        let body = match self.node(ty).clone() {
            Node::IntType { is_signed, bit_size, .. } => {
                if bit_size == 0 {
                    return Err(ConvertError::MissingInput { node: "int_type", field: "bit_size" });
                }
                if is_signed {
                    TypeBody::Int { size: bit_size }
                } else {
                    TypeBody::Uint { size: bit_size }
                }
            }
            Node::FloatType { bit_size, .. } => {
                if bit_size == 0 {
                    return Err(ConvertError::MissingInput {
                        node: "float_type",
                        field: "bit_size",
                    });
                }
                TypeBody::Float { size: bit_size }
            }
            Node::BoolType {} => TypeBody::Bool,
            Node::VoidType {} => TypeBody::Void,
            Node::MetaType {} => TypeBody::Meta,
            Node::IdentType { base } => {
                return self.convert_type(base, field);
            }
            Node::IntLiteralType { base } => {
                let value = match self.node(base) {
                    Node::IntLiteral { value, .. } => *value,
                    other => {
                        return Err(ConvertError::unsupported(format!(
                            "int literal type backed by {}",
                            other.name()
                        )))
                    }
                };
                let bits: u8 = match value {
                    v if v <= 0xFF => 8,
                    v if v <= 0xFFFF => 16,
                    v if v <= 0xFFFF_FFFF => 32,
                    _ => 64,
                };
                TypeBody::Uint { size: bits }
            }
            Node::StrLiteralType { base, bit_size } => {
                let byte_len = match bit_size {
                    Some(bits) => bits / 8,
                    None => match self.node(base) {
                        Node::StrLiteral { value, .. } => decode_base64(value)?.len() as u64,
                        other => {
                            return Err(ConvertError::unsupported(format!(
                                "string literal type backed by {}",
                                other.name()
                            )))
                        }
                    },
                };
                let element = self.uint_type(8)?;
                TypeBody::Array { element, length: byte_len }
            }
            Node::ArrayType { element_type, length_value, .. } => {
                let element = self.convert_type(element_type, None)?;
                if let Some(len) = length_value {
                    TypeBody::Array { element, length: len }
                } else if let Some(align_len) = self.alignment_array_length(field) {
                    TypeBody::Array { element, length: align_len }
                } else {
                    TypeBody::Vector { element }
                }
            }
            Node::EnumType { base } => {
                let decl = self.convert_decl(base)?;
                let base_type = match self.node(base) {
                    Node::Enum { base_type: Some(bt), .. } => {
                        let bt = *bt;
                        self.convert_type(bt, None)?
                    }
                    _ => TypeRef::NIL,
                };
                TypeBody::Enum { decl, base_type }
            }
            Node::StructType { base, recursive, .. } => {
                let base = base.ok_or(ConvertError::MissingInput {
                    node: "struct_type",
                    field: "base",
                })?;
                let decl = self.convert_decl(base)?;
                if recursive {
                    TypeBody::RecursiveStruct { decl }
                } else {
                    TypeBody::Struct { decl }
                }
            }
            Node::StructUnionType { structs, .. } => {
                let mut members = Vec::with_capacity(structs.len());
                for member in structs {
                    members.push(self.convert_type(member, None)?);
                }
                TypeBody::Variant(VariantDesc {
                    common_type: TypeRef::NIL,
                    members,
                    related_field: ebmc_core::StatementRef::NIL,
                })
            }
            Node::RangeType { base_type, .. } => {
                let base_type = match base_type {
                    Some(bt) => self.convert_type(bt, None)?,
                    None => TypeRef::NIL,
                };
                TypeBody::Range { base_type }
            }
            Node::FunctionType { parameters, return_type } => {
                let mut params = Vec::with_capacity(parameters.len());
                for param in parameters {
                    params.push(self.convert_type(param, None)?);
                }
                let return_type = match return_type {
                    Some(rt) => self.convert_type(rt, None)?,
                    None => self.void_type()?,
                };
                TypeBody::Function { params, return_type }
            }
            other => {
                return Err(ConvertError::unsupported(format!(
                    "type conversion of {}",
                    other.name()
                )))
            }
        };
        self.intern_type(body)
    }

    /// Fixed length of an alignment-padded byte vector
    /// (`alignment_bytes - 1`), or `None` when the field is not one.
    fn alignment_array_length(&self, field: Option<NodeId>) -> Option<u64> {
        let align_bits = self.alignment_vector_bits(field)?;
        Some(align_bits / 8 - 1)
    }

    /// Alignment in bits when `field` is a byte vector padding to an
    /// alignment boundary.
    pub(crate) fn alignment_vector_bits(&self, field: Option<NodeId>) -> Option<u64> {
        let field = field?;
        let Node::Field { field_type, arguments, .. } = self.node(field) else {
            return None;
        };
        let align = arguments.as_ref()?.alignment_value?;
        if align == 0 || align % 8 != 0 {
            return None;
        }
        let resolved = self.ast.resolve_type(*field_type);
        let Node::ArrayType { element_type, .. } = self.node(resolved) else {
            return None;
        };
        match self.node(self.ast.resolve_type(*element_type)) {
            Node::IntType { is_signed: false, bit_size: 8, .. } => Some(align),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ebmc_ast::{Ast, AstEndian, FieldArguments, Follow};
    use ebmc_core::TypeKind;

    fn ast_with_program() -> Ast {
        let mut ast = Ast::new();
        ast.push(Node::Program { elements: vec![] });
        ast
    }

    #[test]
    fn scalar_types() {
        let mut ast = ast_with_program();
        let u16 = ast.push(Node::IntType { is_signed: false, bit_size: 16, endian: AstEndian::Unspec });
        let i32 = ast.push(Node::IntType { is_signed: true, bit_size: 32, endian: AstEndian::Unspec });
        let f64 = ast.push(Node::FloatType { bit_size: 64, endian: AstEndian::Unspec });
        let mut c = Converter::new(&ast);
        let t = c.convert_type(u16, None).unwrap();
        assert_eq!(c.module.get_type(t).unwrap().body, TypeBody::Uint { size: 16 });
        let t = c.convert_type(i32, None).unwrap();
        assert_eq!(c.module.get_type(t).unwrap().body, TypeBody::Int { size: 32 });
        let t = c.convert_type(f64, None).unwrap();
        assert_eq!(c.module.get_type(t).unwrap().body, TypeBody::Float { size: 64 });
    }

    #[test]
    fn literal_array_becomes_fixed_array() {
        let mut ast = ast_with_program();
        let u8t = ast.push(Node::IntType { is_signed: false, bit_size: 8, endian: AstEndian::Unspec });
        let arr = ast.push(Node::ArrayType { element_type: u8t, length: None, length_value: Some(4) });
        let open = ast.push(Node::ArrayType { element_type: u8t, length: None, length_value: None });
        let mut c = Converter::new(&ast);
        let t = c.convert_type(arr, None).unwrap();
        assert!(matches!(
            c.module.get_type(t).unwrap().body,
            TypeBody::Array { length: 4, .. }
        ));
        let t = c.convert_type(open, None).unwrap();
        assert_eq!(c.module.type_kind(t), Some(TypeKind::Vector));
    }

    #[test]
    fn alignment_vector_gets_computed_length() {
        let mut ast = ast_with_program();
        let u8t = ast.push(Node::IntType { is_signed: false, bit_size: 8, endian: AstEndian::Unspec });
        let arr = ast.push(Node::ArrayType { element_type: u8t, length: None, length_value: None });
        let field = ast.push(Node::Field {
            ident: Some("pad".into()),
            field_type: arr,
            belong: None,
            is_state_variable: false,
            arguments: Some(FieldArguments { alignment_value: Some(32), sub_byte_length: false }),
            follow: Follow::Unknown,
            eventual_follow: Follow::Unknown,
            next: None,
            belong_struct: None,
        });
        let mut c = Converter::new(&ast);
        let t = c.convert_type(arr, Some(field)).unwrap();
        // 32-bit alignment: up to alignment_bytes - 1 = 3 padding bytes
        assert!(matches!(
            c.module.get_type(t).unwrap().body,
            TypeBody::Array { length: 3, .. }
        ));
    }

    #[test]
    fn ident_type_recurses_to_base() {
        let mut ast = ast_with_program();
        let boolt = ast.push(Node::BoolType {});
        let alias = ast.push(Node::IdentType { base: boolt });
        let mut c = Converter::new(&ast);
        let t = c.convert_type(alias, None).unwrap();
        assert_eq!(c.module.type_kind(t), Some(TypeKind::Bool));
    }
}
