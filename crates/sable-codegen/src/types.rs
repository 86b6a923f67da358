//! Type resolution: registry `TypeId` -> SSA type.
//!
//! Value conventions: integers, `bool`, and `double` are immediate;
//! `str` is a two-field `{ptr, usize}` struct passed by value; `c_str`
//! and refs are pointers; objects, enums, and arrays live in memory and
//! flow as pointers. Storage slots (locals, struct fields, globals) use
//! the same representation, so a struct-typed field holds a pointer --
//! object bindings share, they do not copy.

use sable_types::{Primitive, TypeId, TypeKind, TypeRegistry};

use sable_ssa::SsaType;

use crate::Codegen;

impl<'a> Codegen<'a> {
    /// The SSA type of a value of a Sable type.
    pub(crate) fn lowered_type(&self, ty: TypeId) -> SsaType {
        let resolved = self.types.resolve_alias(ty);
        match self.types.kind(resolved) {
            // An unresolved slot can only appear downstream of a
            // reported error; an opaque pointer keeps the module
            // printable.
            TypeKind::Unknown => SsaType::Ptr,
            TypeKind::Primitive(p) => match p {
                Primitive::Int { bits, .. } => SsaType::Int(*bits),
                Primitive::Bool => SsaType::Int(1),
                Primitive::Double => SsaType::Double,
                Primitive::Void => SsaType::Void,
                Primitive::Str => {
                    SsaType::Struct(self.str_struct.expect("str struct materialized"))
                }
                Primitive::CStr => SsaType::Ptr,
            },
            TypeKind::Object(_) | TypeKind::Enum { .. } | TypeKind::Array { .. } => SsaType::Ptr,
            TypeKind::Ref { .. } => SsaType::Ptr,
            TypeKind::Alias { .. } => unreachable!("resolve_alias returned an alias"),
            TypeKind::Function(_) => SsaType::Ptr,
        }
    }

    /// The type a slot (local, global, struct field) holds. Identical
    /// to the value representation.
    pub(crate) fn storage_type(&self, ty: TypeId) -> SsaType {
        self.lowered_type(ty)
    }

    /// The materialized SSA struct behind an object/enum/array type.
    pub(crate) fn struct_of(&self, ty: TypeId) -> Option<sable_ssa::StructId> {
        self.struct_cache
            .get(&self.types.resolve_alias(ty))
            .copied()
    }

    /// Signedness of an integer type (after aliases); false for
    /// everything else.
    pub(crate) fn is_signed_int(&self, ty: TypeId) -> bool {
        matches!(
            self.types.kind(self.types.resolve_alias(ty)),
            TypeKind::Primitive(Primitive::Int { signed: true, .. })
        )
    }

    pub(crate) fn is_double(&self, ty: TypeId) -> bool {
        self.types.resolve_alias(ty) == TypeRegistry::DOUBLE
    }
}
