//! The EBM type layer: `TypeBody` and its kind discriminant.
//!
//! Types are interned in the type arena and addressed by `TypeRef`. A type
//! body is a tagged union; kinds that refer to declarations (enums, structs)
//! point at the statement arena.

use serde::{Deserialize, Serialize};

use crate::id::{StatementRef, TypeRef};

/// Discriminant of a [`TypeBody`]. The declaration order fixes the `u16`
/// wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u16)]
pub enum TypeKind {
    Int,
    Uint,
    Usize,
    Float,
    Bool,
    Void,
    Meta,
    Enum,
    Struct,
    RecursiveStruct,
    Array,
    Vector,
    Variant,
    Range,
    Function,
    EncoderInput,
    DecoderInput,
    EncoderReturn,
    DecoderReturn,
    PropertySetterReturn,
    Optional,
    Ptr,
}

/// A variant (tagged sum) type: member types plus an optional common
/// super-type. `common_type` is nil exactly when the variant is in
/// uncommon-merge mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariantDesc {
    pub common_type: TypeRef,
    pub members: Vec<TypeRef>,
    /// The property or field statement this variant was derived for, or nil.
    pub related_field: StatementRef,
}

/// Body of an entry in the type arena.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TypeBody {
    /// Signed integer with the given bit width.
    Int { size: u8 },
    /// Unsigned integer with the given bit width.
    Uint { size: u8 },
    /// Platform-size unsigned integer (array lengths, counters).
    Usize,
    /// IEEE float with the given bit width.
    Float { size: u8 },
    Bool,
    Void,
    /// Compile-time-only value (type literals, metadata arguments).
    Meta,
    /// Enum type: the declaring statement plus its underlying integer type
    /// (nil when the enum has no declared base).
    Enum { decl: StatementRef, base_type: TypeRef },
    /// Struct type pointing at its declaration.
    Struct { decl: StatementRef },
    /// Struct type participating in a reference cycle.
    RecursiveStruct { decl: StatementRef },
    /// Fixed-length array.
    Array { element: TypeRef, length: u64 },
    /// Variable-length sequence.
    Vector { element: TypeRef },
    Variant(VariantDesc),
    /// Range over a base type; nil base means an open (`..`) range.
    Range { base_type: TypeRef },
    Function { params: Vec<TypeRef>, return_type: TypeRef },
    /// Opaque stream handle taken by an encoder.
    EncoderInput,
    /// Opaque stream handle taken by a decoder.
    DecoderInput,
    EncoderReturn,
    DecoderReturn,
    PropertySetterReturn,
    Optional { inner: TypeRef },
    Ptr { pointee: TypeRef },
}

impl TypeBody {
    pub fn kind(&self) -> TypeKind {
        match self {
            TypeBody::Int { .. } => TypeKind::Int,
            TypeBody::Uint { .. } => TypeKind::Uint,
            TypeBody::Usize => TypeKind::Usize,
            TypeBody::Float { .. } => TypeKind::Float,
            TypeBody::Bool => TypeKind::Bool,
            TypeBody::Void => TypeKind::Void,
            TypeBody::Meta => TypeKind::Meta,
            TypeBody::Enum { .. } => TypeKind::Enum,
            TypeBody::Struct { .. } => TypeKind::Struct,
            TypeBody::RecursiveStruct { .. } => TypeKind::RecursiveStruct,
            TypeBody::Array { .. } => TypeKind::Array,
            TypeBody::Vector { .. } => TypeKind::Vector,
            TypeBody::Variant(_) => TypeKind::Variant,
            TypeBody::Range { .. } => TypeKind::Range,
            TypeBody::Function { .. } => TypeKind::Function,
            TypeBody::EncoderInput => TypeKind::EncoderInput,
            TypeBody::DecoderInput => TypeKind::DecoderInput,
            TypeBody::EncoderReturn => TypeKind::EncoderReturn,
            TypeBody::DecoderReturn => TypeKind::DecoderReturn,
            TypeBody::PropertySetterReturn => TypeKind::PropertySetterReturn,
            TypeBody::Optional { .. } => TypeKind::Optional,
            TypeBody::Ptr { .. } => TypeKind::Ptr,
        }
    }

    /// Bit width for sized scalars, `None` otherwise.
    pub fn bit_size(&self) -> Option<u64> {
        match self {
            TypeBody::Int { size } | TypeBody::Uint { size } | TypeBody::Float { size } => {
                Some(u64::from(*size))
            }
            TypeBody::Bool => Some(1),
            _ => None,
        }
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, TypeBody::Int { .. } | TypeBody::Uint { .. } | TypeBody::Usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(TypeBody::Uint { size: 8 }.kind(), TypeKind::Uint);
        assert_eq!(
            TypeBody::Array { element: TypeRef(3), length: 4 }.kind(),
            TypeKind::Array
        );
        assert_eq!(TypeBody::Variant(VariantDesc::default()).kind(), TypeKind::Variant);
    }

    #[test]
    fn bit_size_of_scalars() {
        assert_eq!(TypeBody::Uint { size: 24 }.bit_size(), Some(24));
        assert_eq!(TypeBody::Float { size: 32 }.bit_size(), Some(32));
        assert_eq!(TypeBody::Void.bit_size(), None);
    }

    #[test]
    fn json_kind_tag_is_symbolic() {
        let json = serde_json::to_value(TypeBody::Uint { size: 8 }).unwrap();
        assert_eq!(json["kind"], "UINT");
        assert_eq!(json["size"], 8);
    }
}
