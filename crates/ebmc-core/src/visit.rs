//! The ref walk: enumerate or rewrite every ref held by a body.
//!
//! [`VisitRefs`] is the sole mechanism behind inverse-ref building,
//! dead-object marking, and id renumbering; passes never hardcode body field
//! names. Nil refs are skipped in both directions, so a rewrite can never
//! resurrect id 0.

use crate::expr::{CallDesc, ExprOp, ExpressionBody};
use crate::id::{
    AnyRef, ExpressionRef, IdentifierRef, RefId, RefKind, StatementRef, StringRef, TypeRef,
};
use crate::module::{Identifier, StringLiteral};
use crate::stmt::{
    CompositeFieldDecl, EnumDecl, EnumMemberDecl, FieldDecl, FunctionDecl, IoAttribute, IoData,
    IoSize, LoopStatement, LoweredStatement, MatchBranch, MatchStatement, ParameterDecl, PhiNode,
    PropertyDecl, PropertyMemberDecl, SizeValue, StatementBody, StructDecl, VariableDecl,
};
use crate::types::{TypeBody, VariantDesc};

/// Walks every ref held by a value.
///
/// `for_each_ref` visits each non-nil ref with its arena kind;
/// `map_refs` rewrites each non-nil ref through the supplied mapping.
pub trait VisitRefs {
    fn for_each_ref(&self, f: &mut dyn FnMut(RefKind, AnyRef));
    fn map_refs(&mut self, f: &mut dyn FnMut(RefKind, AnyRef) -> AnyRef);
}

macro_rules! impl_visit_for_ref {
    ($($ty:ident => $kind:expr),* $(,)?) => {
        $(impl VisitRefs for $ty {
            fn for_each_ref(&self, f: &mut dyn FnMut(RefKind, AnyRef)) {
                if !self.is_nil() {
                    f($kind, AnyRef(self.0));
                }
            }
            fn map_refs(&mut self, f: &mut dyn FnMut(RefKind, AnyRef) -> AnyRef) {
                if !self.is_nil() {
                    *self = $ty::from_value(f($kind, AnyRef(self.0)).0);
                }
            }
        })*
    };
}

impl_visit_for_ref!(
    IdentifierRef => RefKind::Identifier,
    StringRef => RefKind::String,
    TypeRef => RefKind::Type,
    StatementRef => RefKind::Statement,
    ExpressionRef => RefKind::Expression,
);

impl<T: VisitRefs> VisitRefs for Vec<T> {
    fn for_each_ref(&self, f: &mut dyn FnMut(RefKind, AnyRef)) {
        for item in self {
            item.for_each_ref(f);
        }
    }
    fn map_refs(&mut self, f: &mut dyn FnMut(RefKind, AnyRef) -> AnyRef) {
        for item in self {
            item.map_refs(f);
        }
    }
}

/// Expands one body into per-field walk calls for both directions.
macro_rules! walk {
    ($self:ident, $f:ident, $method:ident; $($field:expr),* $(,)?) => {{
        $($field.$method($f);)*
    }};
}

impl VisitRefs for Identifier {
    fn for_each_ref(&self, _f: &mut dyn FnMut(RefKind, AnyRef)) {}
    fn map_refs(&mut self, _f: &mut dyn FnMut(RefKind, AnyRef) -> AnyRef) {}
}

impl VisitRefs for StringLiteral {
    fn for_each_ref(&self, _f: &mut dyn FnMut(RefKind, AnyRef)) {}
    fn map_refs(&mut self, _f: &mut dyn FnMut(RefKind, AnyRef) -> AnyRef) {}
}

impl VisitRefs for VariantDesc {
    fn for_each_ref(&self, f: &mut dyn FnMut(RefKind, AnyRef)) {
        walk!(self, f, for_each_ref; self.common_type, self.members, self.related_field);
    }
    fn map_refs(&mut self, f: &mut dyn FnMut(RefKind, AnyRef) -> AnyRef) {
        walk!(self, f, map_refs; self.common_type, self.members, self.related_field);
    }
}

macro_rules! type_body_fields {
    ($self:ident, $f:ident, $method:ident) => {
        match $self {
            TypeBody::Enum { decl, base_type } => walk!(self, $f, $method; decl, base_type),
            TypeBody::Struct { decl } | TypeBody::RecursiveStruct { decl } => {
                walk!(self, $f, $method; decl)
            }
            TypeBody::Array { element, .. } => walk!(self, $f, $method; element),
            TypeBody::Vector { element } => walk!(self, $f, $method; element),
            TypeBody::Variant(desc) => desc.$method($f),
            TypeBody::Range { base_type } => walk!(self, $f, $method; base_type),
            TypeBody::Function { params, return_type } => {
                walk!(self, $f, $method; params, return_type)
            }
            TypeBody::Optional { inner } => walk!(self, $f, $method; inner),
            TypeBody::Ptr { pointee } => walk!(self, $f, $method; pointee),
            TypeBody::Int { .. }
            | TypeBody::Uint { .. }
            | TypeBody::Usize
            | TypeBody::Float { .. }
            | TypeBody::Bool
            | TypeBody::Void
            | TypeBody::Meta
            | TypeBody::EncoderInput
            | TypeBody::DecoderInput
            | TypeBody::EncoderReturn
            | TypeBody::DecoderReturn
            | TypeBody::PropertySetterReturn => {}
        }
    };
}

impl VisitRefs for TypeBody {
    fn for_each_ref(&self, f: &mut dyn FnMut(RefKind, AnyRef)) {
        type_body_fields!(self, f, for_each_ref);
    }
    fn map_refs(&mut self, f: &mut dyn FnMut(RefKind, AnyRef) -> AnyRef) {
        type_body_fields!(self, f, map_refs);
    }
}

impl VisitRefs for IoSize {
    fn for_each_ref(&self, f: &mut dyn FnMut(RefKind, AnyRef)) {
        if let SizeValue::Dynamic { size_expr } = &self.value {
            size_expr.for_each_ref(f);
        }
    }
    fn map_refs(&mut self, f: &mut dyn FnMut(RefKind, AnyRef) -> AnyRef) {
        if let SizeValue::Dynamic { size_expr } = &mut self.value {
            size_expr.map_refs(f);
        }
    }
}

impl VisitRefs for IoAttribute {
    fn for_each_ref(&self, f: &mut dyn FnMut(RefKind, AnyRef)) {
        self.dynamic_ref.for_each_ref(f);
    }
    fn map_refs(&mut self, f: &mut dyn FnMut(RefKind, AnyRef) -> AnyRef) {
        self.dynamic_ref.map_refs(f);
    }
}

macro_rules! impl_visit_struct {
    ($ty:ident; $($field:ident),* $(,)?) => {
        impl VisitRefs for $ty {
            fn for_each_ref(&self, f: &mut dyn FnMut(RefKind, AnyRef)) {
                $(self.$field.for_each_ref(f);)*
            }
            fn map_refs(&mut self, f: &mut dyn FnMut(RefKind, AnyRef) -> AnyRef) {
                $(self.$field.map_refs(f);)*
            }
        }
    };
}

impl_visit_struct!(IoData; io_ref, field, target, data_type, attribute, size, lowered_statement);
impl_visit_struct!(LoopStatement; init, condition, increment, item_var, collection, body, lowered_statement);
impl_visit_struct!(MatchStatement; target, branches, lowered_statement);
impl_visit_struct!(MatchBranch; condition, body);
impl_visit_struct!(VariableDecl; name, var_type, initial_value);
impl_visit_struct!(ParameterDecl; name, param_type);
impl_visit_struct!(FieldDecl; name, field_type, parent_struct, composite_field);
impl_visit_struct!(CompositeFieldDecl; name, parent_struct, composite_type, fields);
impl_visit_struct!(StructDecl; name, fields, properties, encode_fn, decode_fn);
impl_visit_struct!(EnumDecl; name, base_type, members);
impl_visit_struct!(EnumMemberDecl; name, value, string_repr);
impl_visit_struct!(FunctionDecl; name, parent_format, return_type, params, body, related_property);
impl_visit_struct!(PropertyDecl; name, property_type, parent_format, getter_condition, setter_condition, members, derived_from, getter_function, setter_function);
impl_visit_struct!(PropertyMemberDecl; getter_condition, setter_condition, field);
impl_visit_struct!(LoweredStatement; block);
impl_visit_struct!(CallDesc; callee, arguments);

impl VisitRefs for PhiNode {
    fn for_each_ref(&self, f: &mut dyn FnMut(RefKind, AnyRef)) {
        self.target.for_each_ref(f);
        for inc in &self.incoming {
            inc.from.for_each_ref(f);
            inc.value.for_each_ref(f);
        }
    }
    fn map_refs(&mut self, f: &mut dyn FnMut(RefKind, AnyRef) -> AnyRef) {
        self.target.map_refs(f);
        for inc in &mut self.incoming {
            inc.from.map_refs(f);
            inc.value.map_refs(f);
        }
    }
}

macro_rules! stmt_body_fields {
    ($self:ident, $f:ident, $method:ident) => {
        match $self {
            StatementBody::Block { container } | StatementBody::ProgramDecl { container } => {
                container.$method($f)
            }
            StatementBody::IfStatement { condition, then_block, else_block } => {
                walk!(self, $f, $method; condition, then_block, else_block)
            }
            StatementBody::LoopStatement(l) => l.$method($f),
            StatementBody::MatchStatement(m) => m.$method($f),
            StatementBody::MatchBranch(b) => b.$method($f),
            StatementBody::Break { related_loop } | StatementBody::Continue { related_loop } => {
                related_loop.$method($f)
            }
            StatementBody::Return { value, related_function } => {
                walk!(self, $f, $method; value, related_function)
            }
            StatementBody::Assignment { target, value } => walk!(self, $f, $method; target, value),
            StatementBody::VariableDecl(v) => v.$method($f),
            StatementBody::ParameterDecl(p) => p.$method($f),
            StatementBody::FieldDecl(d) => d.$method($f),
            StatementBody::CompositeFieldDecl(d) => d.$method($f),
            StatementBody::StructDecl(d) => d.$method($f),
            StatementBody::EnumDecl(d) => d.$method($f),
            StatementBody::EnumMemberDecl(d) => d.$method($f),
            StatementBody::FunctionDecl(d) => d.$method($f),
            StatementBody::PropertyDecl(d) => d.$method($f),
            StatementBody::PropertyMemberDecl(d) => d.$method($f),
            StatementBody::ReadData(d) | StatementBody::WriteData(d) => d.$method($f),
            StatementBody::Assert { condition, lowered_statement } => {
                walk!(self, $f, $method; condition, lowered_statement)
            }
            StatementBody::LengthCheck {
                actual, limit, related_function, lowered_statement, ..
            } => walk!(self, $f, $method; actual, limit, related_function, lowered_statement),
            StatementBody::ErrorReport { message, arguments } => {
                walk!(self, $f, $method; message, arguments)
            }
            StatementBody::ErrorReturn { value } => value.$method($f),
            StatementBody::LoweredStatements { alternatives } => alternatives.$method($f),
            StatementBody::Expression { expression } => expression.$method($f),
            StatementBody::Metadata { name, values } => walk!(self, $f, $method; name, values),
            StatementBody::ImportModule { module_name } => module_name.$method($f),
            StatementBody::PhiNode(p) => p.$method($f),
        }
    };
}

impl VisitRefs for StatementBody {
    fn for_each_ref(&self, f: &mut dyn FnMut(RefKind, AnyRef)) {
        stmt_body_fields!(self, f, for_each_ref);
    }
    fn map_refs(&mut self, f: &mut dyn FnMut(RefKind, AnyRef) -> AnyRef) {
        stmt_body_fields!(self, f, map_refs);
    }
}

macro_rules! expr_op_fields {
    ($self:ident, $f:ident, $method:ident) => {
        match $self {
            ExprOp::LiteralString { value } => value.$method($f),
            ExprOp::LiteralType { type_ref } => type_ref.$method($f),
            ExprOp::Identifier { decl } => decl.$method($f),
            ExprOp::BinaryOp { left, right, .. } => walk!(self, $f, $method; left, right),
            ExprOp::UnaryOp { operand, .. } => operand.$method($f),
            ExprOp::IndexAccess { base, index } => walk!(self, $f, $method; base, index),
            ExprOp::MemberAccess { base, member } => walk!(self, $f, $method; base, member),
            ExprOp::TypeCast { source, from_type, cast_function, .. } => {
                walk!(self, $f, $method; source, from_type, cast_function)
            }
            ExprOp::Range { start, end } => walk!(self, $f, $method; start, end),
            ExprOp::Call(desc) => desc.$method($f),
            ExprOp::ArraySize { array } => array.$method($f),
            ExprOp::MaxValue { lowered } => lowered.$method($f),
            ExprOp::IsLittleEndian { dynamic_ref } => dynamic_ref.$method($f),
            ExprOp::IsError { target } => target.$method($f),
            ExprOp::CanReadStream { size, .. } => size.$method($f),
            ExprOp::ReadData { target_decl, io_statement } => {
                walk!(self, $f, $method; target_decl, io_statement)
            }
            ExprOp::WriteData { target, io_statement } => {
                walk!(self, $f, $method; target, io_statement)
            }
            ExprOp::ConditionalStatement { target_decl, statement } => {
                walk!(self, $f, $method; target_decl, statement)
            }
            ExprOp::Addressof { target } | ExprOp::Optionalof { target } => target.$method($f),
            ExprOp::OrCond { conditions } => conditions.$method($f),
            ExprOp::LiteralInt { .. }
            | ExprOp::LiteralBool { .. }
            | ExprOp::DefaultValue
            | ExprOp::GetStreamOffset { .. }
            | ExprOp::GetRemainingBytes { .. }
            | ExprOp::NewObject
            | ExprOp::SetterStatus { .. } => {}
        }
    };
}

impl VisitRefs for ExprOp {
    fn for_each_ref(&self, f: &mut dyn FnMut(RefKind, AnyRef)) {
        expr_op_fields!(self, f, for_each_ref);
    }
    fn map_refs(&mut self, f: &mut dyn FnMut(RefKind, AnyRef) -> AnyRef) {
        expr_op_fields!(self, f, map_refs);
    }
}

impl VisitRefs for ExpressionBody {
    fn for_each_ref(&self, f: &mut dyn FnMut(RefKind, AnyRef)) {
        self.ty.for_each_ref(f);
        self.op.for_each_ref(f);
    }
    fn map_refs(&mut self, f: &mut dyn FnMut(RefKind, AnyRef) -> AnyRef) {
        self.ty.map_refs(f);
        self.op.map_refs(f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::BinaryOp;

    fn collect(body: &impl VisitRefs) -> Vec<(RefKind, u64)> {
        let mut out = Vec::new();
        body.for_each_ref(&mut |kind, r| out.push((kind, r.0)));
        out
    }

    #[test]
    fn nil_refs_are_skipped() {
        let body = StatementBody::IfStatement {
            condition: ExpressionRef(5),
            then_block: StatementRef(6),
            else_block: StatementRef::NIL,
        };
        assert_eq!(
            collect(&body),
            vec![(RefKind::Expression, 5), (RefKind::Statement, 6)]
        );
    }

    #[test]
    fn expression_walk_includes_type() {
        let body = ExpressionBody::new(
            TypeRef(2),
            ExprOp::BinaryOp { op: BinaryOp::Add, left: ExpressionRef(3), right: ExpressionRef(4) },
        );
        assert_eq!(
            collect(&body),
            vec![(RefKind::Type, 2), (RefKind::Expression, 3), (RefKind::Expression, 4)]
        );
    }

    #[test]
    fn map_rewrites_in_place() {
        let mut body = StatementBody::Block {
            container: vec![StatementRef(3), StatementRef(9), StatementRef::NIL],
        };
        body.map_refs(&mut |_, r| AnyRef(r.0 + 100));
        assert_eq!(
            body,
            StatementBody::Block {
                container: vec![StatementRef(103), StatementRef(109), StatementRef::NIL],
            }
        );
    }

    #[test]
    fn dynamic_io_size_holds_a_ref() {
        let mut io = IoData {
            size: IoSize::dynamic(ExpressionRef(8), crate::ops::SizeUnit::ByteDynamic),
            ..IoData::default()
        };
        assert!(collect(&io).contains(&(RefKind::Expression, 8)));
        io.map_refs(&mut |_, r| AnyRef(r.0 + 1));
        assert_eq!(io.size.expr(), Some(ExpressionRef(9)));
    }
}
