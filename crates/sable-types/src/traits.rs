//! Trait registry, impl lookup, and on-demand impl installation.
//!
//! Traits are named capabilities with generic type parameters (e.g.
//! `Rhs` on the binary operator traits) and associated types (e.g.
//! `Output`). A [`TraitImpl`] binds one trait for one implementing type
//! with a concrete parameter-binding vector; lookup matches by
//! alias-resolved implementing type *and* binding vector. The linear
//! trait and impl lists are deliberate: tens of traits and hundreds of
//! impls per compilation.

use rustc_hash::FxHashMap;
use sable_common::NodeId;

use crate::registry::{TypeId, TypeKind, TypeRegistry};

/// Handle to a trait definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraitId(pub u32);

/// A stable reference to one impl: trait plus position in its impl
/// list. Impl lists are append-only, so the index never moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImplRef {
    pub trait_id: TraitId,
    pub index: u32,
}

/// Comparison flavor carried by compare intrinsics; signedness is
/// decided at lowering from the operand type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpKind {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// SSA emission strategies for compiler-provided trait methods.
///
/// Each kind names one concrete instruction sequence; the codegen crate
/// owns the mapping from kind to emitted SSA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    // Integer arithmetic and bitwise. Width comes from the operands;
    // signedness of div/rem/shift-right is taken from the operand type.
    IAdd,
    ISub,
    IMul,
    IDiv,
    IRem,
    IAnd,
    IOr,
    IXor,
    IShl,
    IShr,
    ICmp(CmpKind),
    INeg,
    // Double-precision float.
    FAdd,
    FSub,
    FMul,
    FDiv,
    FRem,
    FCmp(CmpKind),
    FNeg,
    // Bool.
    BoolNot,
    // Strings (the `{ptr, usize}` layout).
    StrConcat,
    StrEq,
    StrNe,
    StrLen,
    StrIndex,
    StrRefIndex,
    StrToCStr,
    // Arrays (the `{ptr, usize}` layout).
    ArrayLen,
    ArrayIndex,
    ArrayRefIndex,
    // Integer widening (`From<integer>` for `usize`).
    ZExt,
    // Enums (tagged layout).
    EnumEq,
    EnumNe,
    EnumToString,
}

/// How a trait method is provided by an impl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodKind {
    /// Inline SSA emission.
    Intrinsic(Intrinsic),
    /// A user-defined function; the declaration node leads to the
    /// function type whose specialization is looked up at lowering.
    Function(NodeId),
    /// An external symbol to be linked.
    External(String),
}

/// A trait definition.
#[derive(Debug, Clone)]
pub struct TraitDef {
    pub name: String,
    /// Generic parameter names, e.g. `["Rhs"]`.
    pub type_params: Vec<String>,
    /// Associated type names, e.g. `["Output"]`.
    pub assoc_types: Vec<String>,
    /// Required method names.
    pub methods: Vec<String>,
}

/// One implementation of a trait for a type.
#[derive(Debug, Clone)]
pub struct TraitImpl {
    pub trait_id: TraitId,
    pub impl_type: TypeId,
    /// Concrete bindings for the trait's generic parameters, in
    /// declaration order.
    pub param_bindings: Vec<TypeId>,
    /// Concrete bindings for the trait's associated types.
    pub assoc_bindings: Vec<(String, TypeId)>,
    /// Provided methods.
    pub methods: Vec<(String, MethodKind)>,
}

impl TraitImpl {
    pub fn method(&self, name: &str) -> Option<&MethodKind> {
        self.methods
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, k)| k)
    }

    pub fn assoc(&self, name: &str) -> Option<TypeId> {
        self.assoc_bindings
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| *t)
    }
}

/// The trait registry: definitions plus per-trait impl lists.
#[derive(Debug, Default)]
pub struct TraitRegistry {
    traits: Vec<TraitDef>,
    by_name: FxHashMap<String, TraitId>,
    /// Impl lists, parallel to `traits`.
    impls: Vec<Vec<TraitImpl>>,
}

impl TraitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a trait. Defining an existing name returns the existing
    /// id unchanged, which keeps the `ensure_*` installers idempotent.
    pub fn define(
        &mut self,
        name: &str,
        type_params: &[&str],
        assoc_types: &[&str],
        methods: &[&str],
    ) -> TraitId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = TraitId(self.traits.len() as u32);
        self.traits.push(TraitDef {
            name: name.to_string(),
            type_params: type_params.iter().map(|s| s.to_string()).collect(),
            assoc_types: assoc_types.iter().map(|s| s.to_string()).collect(),
            methods: methods.iter().map(|s| s.to_string()).collect(),
        });
        self.impls.push(Vec::new());
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn trait_id(&self, name: &str) -> Option<TraitId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: TraitId) -> &TraitDef {
        &self.traits[id.0 as usize]
    }

    pub fn defs(&self) -> impl Iterator<Item = &TraitDef> {
        self.traits.iter()
    }

    pub fn impls_of(&self, id: TraitId) -> &[TraitImpl] {
        &self.impls[id.0 as usize]
    }

    /// Attach an implementation. Duplicate detection is the caller's
    /// responsibility; the `ensure_*` wrappers check before installing.
    pub fn add_impl(&mut self, imp: TraitImpl) {
        self.impls[imp.trait_id.0 as usize].push(imp);
    }

    /// Find the impl for `(trait, impl_type, param_bindings)`, matching
    /// after alias resolution.
    pub fn find_impl(
        &self,
        trait_id: TraitId,
        impl_type: TypeId,
        param_bindings: &[TypeId],
        reg: &TypeRegistry,
    ) -> Option<&TraitImpl> {
        self.impls[trait_id.0 as usize].iter().find(|imp| {
            reg.types_equal(imp.impl_type, impl_type)
                && imp.param_bindings.len() == param_bindings.len()
                && imp
                    .param_bindings
                    .iter()
                    .zip(param_bindings)
                    .all(|(&a, &b)| reg.types_equal(a, b))
        })
    }

    pub fn has_impl(
        &self,
        trait_id: TraitId,
        impl_type: TypeId,
        param_bindings: &[TypeId],
        reg: &TypeRegistry,
    ) -> bool {
        self.find_impl(trait_id, impl_type, param_bindings, reg)
            .is_some()
    }

    /// Like [`find_impl`](Self::find_impl) but returns a stable
    /// [`ImplRef`] suitable for storing on AST nodes.
    pub fn find_impl_ref(
        &self,
        trait_id: TraitId,
        impl_type: TypeId,
        param_bindings: &[TypeId],
        reg: &TypeRegistry,
    ) -> Option<ImplRef> {
        self.impls[trait_id.0 as usize]
            .iter()
            .position(|imp| {
                reg.types_equal(imp.impl_type, impl_type)
                    && imp.param_bindings.len() == param_bindings.len()
                    && imp
                        .param_bindings
                        .iter()
                        .zip(param_bindings)
                        .all(|(&a, &b)| reg.types_equal(a, b))
            })
            .map(|index| ImplRef {
                trait_id,
                index: index as u32,
            })
    }

    /// Dereference an [`ImplRef`].
    pub fn impl_by_ref(&self, r: ImplRef) -> &TraitImpl {
        &self.impls[r.trait_id.0 as usize][r.index as usize]
    }

    /// The associated-type binding of a matching impl, or `None`.
    pub fn get_assoc_type(
        &self,
        trait_id: TraitId,
        impl_type: TypeId,
        param_bindings: &[TypeId],
        name: &str,
        reg: &TypeRegistry,
    ) -> Option<TypeId> {
        self.find_impl(trait_id, impl_type, param_bindings, reg)?
            .assoc(name)
    }

    /// Operator convenience: look up `trait` for `lhs` with bindings
    /// `[rhs]` and return the impl together with the named method.
    pub fn get_binary_method(
        &self,
        trait_name: &str,
        lhs: TypeId,
        rhs: TypeId,
        method: &str,
        reg: &TypeRegistry,
    ) -> Option<(&TraitImpl, &MethodKind)> {
        let id = self.trait_id(trait_name)?;
        let imp = self.find_impl(id, lhs, &[rhs], reg)?;
        let kind = imp.method(method)?;
        Some((imp, kind))
    }

    /// Unary analogue of [`get_binary_method`] (empty binding vector).
    pub fn get_unary_method(
        &self,
        trait_name: &str,
        operand: TypeId,
        method: &str,
        reg: &TypeRegistry,
    ) -> Option<(&TraitImpl, &MethodKind)> {
        let id = self.trait_id(trait_name)?;
        let imp = self.find_impl(id, operand, &[], reg)?;
        let kind = imp.method(method)?;
        Some((imp, kind))
    }

    /// All impls providing a method with this name for the receiver
    /// type, across every trait, in (trait, insertion) order. More than
    /// one result means the call is ambiguous.
    pub fn find_method(
        &self,
        method: &str,
        receiver: TypeId,
        reg: &TypeRegistry,
    ) -> Vec<(TraitId, &TraitImpl, &MethodKind)> {
        let mut out = Vec::new();
        for (i, impl_list) in self.impls.iter().enumerate() {
            for imp in impl_list {
                if reg.types_equal(imp.impl_type, receiver) {
                    if let Some(kind) = imp.method(method) {
                        out.push((TraitId(i as u32), imp, kind));
                    }
                }
            }
        }
        out
    }

    // ── On-demand impls for parameterized built-ins ──────────────────
    //
    // Impls for `T[]` and `str` are installed lazily at first use, not
    // pre-registered for every element type. Inference and lowering
    // both call these; they are idempotent.

    /// Install `Index` for an indexable built-in and return its
    /// `Output`. Arrays take `Index<i32>` with `Output = T`; `str` takes
    /// `Index<usize>` with `Output = i8`. Returns `None` when the type
    /// is not an indexable built-in.
    pub fn ensure_index_impl(&mut self, reg: &TypeRegistry, ty: TypeId) -> Option<TypeId> {
        self.ensure_indexing(reg, ty, "Index", "index", false)
    }

    /// `RefIndex` analogue of [`ensure_index_impl`], used for index
    /// writes.
    pub fn ensure_ref_index_impl(&mut self, reg: &TypeRegistry, ty: TypeId) -> Option<TypeId> {
        self.ensure_indexing(reg, ty, "RefIndex", "ref_index", true)
    }

    fn ensure_indexing(
        &mut self,
        reg: &TypeRegistry,
        ty: TypeId,
        trait_name: &str,
        method: &str,
        by_ref: bool,
    ) -> Option<TypeId> {
        let resolved = reg.resolve_alias(ty);
        let (idx_ty, output, intrinsic) = match reg.kind(resolved) {
            TypeKind::Array { elem } => (
                TypeRegistry::I32,
                *elem,
                if by_ref {
                    Intrinsic::ArrayRefIndex
                } else {
                    Intrinsic::ArrayIndex
                },
            ),
            TypeKind::Primitive(crate::registry::Primitive::Str) => (
                TypeRegistry::USIZE,
                TypeRegistry::I8,
                if by_ref {
                    Intrinsic::StrRefIndex
                } else {
                    Intrinsic::StrIndex
                },
            ),
            _ => return None,
        };
        let trait_id = self.define(trait_name, &["Idx"], &["Output"], &[method]);
        if let Some(existing) = self.find_impl(trait_id, resolved, &[idx_ty], reg) {
            return existing.assoc("Output");
        }
        tracing::trace!(ty = reg.name(resolved), trait_name, "on-demand impl");
        self.add_impl(TraitImpl {
            trait_id,
            impl_type: resolved,
            param_bindings: vec![idx_ty],
            assoc_bindings: vec![("Output".to_string(), output)],
            methods: vec![(method.to_string(), MethodKind::Intrinsic(intrinsic))],
        });
        Some(output)
    }

    /// Install `Length` for arrays (`Output = u32`) or `str`
    /// (`Output = usize`). Returns the output type.
    pub fn ensure_length_impl(&mut self, reg: &TypeRegistry, ty: TypeId) -> Option<TypeId> {
        let resolved = reg.resolve_alias(ty);
        let (output, intrinsic) = match reg.kind(resolved) {
            TypeKind::Array { .. } => (TypeRegistry::U32, Intrinsic::ArrayLen),
            TypeKind::Primitive(crate::registry::Primitive::Str) => {
                (TypeRegistry::USIZE, Intrinsic::StrLen)
            }
            _ => return None,
        };
        let trait_id = self.define("Length", &[], &["Output"], &["len"]);
        if let Some(existing) = self.find_impl(trait_id, resolved, &[], reg) {
            return existing.assoc("Output");
        }
        self.add_impl(TraitImpl {
            trait_id,
            impl_type: resolved,
            param_bindings: vec![],
            assoc_bindings: vec![("Output".to_string(), output)],
            methods: vec![("len".to_string(), MethodKind::Intrinsic(intrinsic))],
        });
        Some(output)
    }

    /// Install `CStr` for `str` (`Output = c_str`).
    pub fn ensure_cstr_impl(&mut self, reg: &TypeRegistry, ty: TypeId) -> Option<TypeId> {
        let resolved = reg.resolve_alias(ty);
        if !matches!(
            reg.kind(resolved),
            TypeKind::Primitive(crate::registry::Primitive::Str)
        ) {
            return None;
        }
        let trait_id = self.define("CStr", &[], &["Output"], &["to_c_str"]);
        if let Some(existing) = self.find_impl(trait_id, resolved, &[], reg) {
            return existing.assoc("Output");
        }
        self.add_impl(TraitImpl {
            trait_id,
            impl_type: resolved,
            param_bindings: vec![],
            assoc_bindings: vec![("Output".to_string(), TypeRegistry::C_STR)],
            methods: vec![(
                "to_c_str".to_string(),
                MethodKind::Intrinsic(Intrinsic::StrToCStr),
            )],
        });
        Some(TypeRegistry::C_STR)
    }

    /// Install `From<source>` for `target` where the conversion is a
    /// compiler-known one: `str -> c_str`, or any integer -> `usize`
    /// (zero-extend). Returns whether an impl exists after the call.
    pub fn ensure_from_impl(
        &mut self,
        reg: &TypeRegistry,
        target: TypeId,
        source: TypeId,
    ) -> bool {
        let target = reg.resolve_alias(target);
        let source = reg.resolve_alias(source);
        use crate::registry::Primitive;
        let intrinsic = match (reg.kind(target), reg.kind(source)) {
            (TypeKind::Primitive(Primitive::CStr), TypeKind::Primitive(Primitive::Str)) => {
                Intrinsic::StrToCStr
            }
            (TypeKind::Primitive(Primitive::Int { .. }), TypeKind::Primitive(Primitive::Int { .. }))
                if target == reg.resolve_alias(TypeRegistry::USIZE) =>
            {
                Intrinsic::ZExt
            }
            _ => return false,
        };
        let trait_id = self.define("From", &["T"], &[], &["from"]);
        if self.find_impl(trait_id, target, &[source], reg).is_some() {
            return true;
        }
        self.add_impl(TraitImpl {
            trait_id,
            impl_type: target,
            param_bindings: vec![source],
            assoc_bindings: vec![],
            methods: vec![("from".to_string(), MethodKind::Intrinsic(intrinsic))],
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Target;

    fn reg() -> TypeRegistry {
        TypeRegistry::new(Target::default())
    }

    fn add_trait(traits: &mut TraitRegistry) -> TraitId {
        traits.define("Add", &["Rhs"], &["Output"], &["add"])
    }

    fn int_add_impl(trait_id: TraitId, ty: TypeId) -> TraitImpl {
        TraitImpl {
            trait_id,
            impl_type: ty,
            param_bindings: vec![ty],
            assoc_bindings: vec![("Output".to_string(), ty)],
            methods: vec![("add".to_string(), MethodKind::Intrinsic(Intrinsic::IAdd))],
        }
    }

    #[test]
    fn define_is_idempotent() {
        let mut traits = TraitRegistry::new();
        let a = add_trait(&mut traits);
        let b = add_trait(&mut traits);
        assert_eq!(a, b);
        assert_eq!(traits.defs().count(), 1);
    }

    #[test]
    fn impl_lookup_matches_bindings() {
        let r = reg();
        let mut traits = TraitRegistry::new();
        let add = add_trait(&mut traits);
        traits.add_impl(int_add_impl(add, TypeRegistry::I32));
        traits.add_impl(int_add_impl(add, TypeRegistry::DOUBLE));

        assert!(traits.has_impl(add, TypeRegistry::I32, &[TypeRegistry::I32], &r));
        // Mixed bindings don't match the i32 impl.
        assert!(!traits.has_impl(add, TypeRegistry::I32, &[TypeRegistry::DOUBLE], &r));
        assert_eq!(
            traits.get_assoc_type(add, TypeRegistry::DOUBLE, &[TypeRegistry::DOUBLE], "Output", &r),
            Some(TypeRegistry::DOUBLE)
        );
    }

    #[test]
    fn lookup_resolves_aliases() {
        let r = reg();
        let mut traits = TraitRegistry::new();
        let add = add_trait(&mut traits);
        traits.add_impl(int_add_impl(add, TypeRegistry::U64));

        // usize resolves to u64 on the default target.
        assert!(traits.has_impl(add, TypeRegistry::USIZE, &[TypeRegistry::USIZE], &r));
        let (imp, kind) = traits
            .get_binary_method("Add", TypeRegistry::USIZE, TypeRegistry::U64, "add", &r)
            .unwrap();
        assert_eq!(imp.impl_type, TypeRegistry::U64);
        assert_eq!(kind, &MethodKind::Intrinsic(Intrinsic::IAdd));
    }

    #[test]
    fn on_demand_array_index_is_installed_once() {
        let mut r = reg();
        let mut traits = TraitRegistry::new();
        let arr = r.get_or_create_array_type(TypeRegistry::I64);

        let out1 = traits.ensure_index_impl(&r, arr);
        let out2 = traits.ensure_index_impl(&r, arr);
        assert_eq!(out1, Some(TypeRegistry::I64));
        assert_eq!(out2, Some(TypeRegistry::I64));

        let index = traits.trait_id("Index").unwrap();
        assert_eq!(traits.impls_of(index).len(), 1);
        let imp = &traits.impls_of(index)[0];
        assert_eq!(imp.param_bindings, vec![TypeRegistry::I32]);
    }

    #[test]
    fn str_indexing_is_bytewise() {
        let r = reg();
        let mut traits = TraitRegistry::new();
        let out = traits.ensure_index_impl(&r, TypeRegistry::STR);
        assert_eq!(out, Some(TypeRegistry::I8));

        let index = traits.trait_id("Index").unwrap();
        let imp = &traits.impls_of(index)[0];
        // str indexes with usize.
        assert_eq!(imp.param_bindings, vec![TypeRegistry::USIZE]);
    }

    #[test]
    fn length_outputs_differ_for_arrays_and_str() {
        let mut r = reg();
        let mut traits = TraitRegistry::new();
        let arr = r.get_or_create_array_type(TypeRegistry::I32);
        assert_eq!(traits.ensure_length_impl(&r, arr), Some(TypeRegistry::U32));
        assert_eq!(
            traits.ensure_length_impl(&r, TypeRegistry::STR),
            Some(TypeRegistry::USIZE)
        );
        assert_eq!(traits.ensure_length_impl(&r, TypeRegistry::I32), None);
    }

    #[test]
    fn from_impls_for_usize_and_cstr() {
        let r = reg();
        let mut traits = TraitRegistry::new();
        assert!(traits.ensure_from_impl(&r, TypeRegistry::USIZE, TypeRegistry::U8));
        assert!(traits.ensure_from_impl(&r, TypeRegistry::C_STR, TypeRegistry::STR));
        // Not a compiler-known conversion.
        assert!(!traits.ensure_from_impl(&r, TypeRegistry::BOOL, TypeRegistry::I32));

        // Idempotent: second call installs nothing new.
        assert!(traits.ensure_from_impl(&r, TypeRegistry::USIZE, TypeRegistry::U8));
        let from = traits.trait_id("From").unwrap();
        assert_eq!(traits.impls_of(from).len(), 2);
    }

    #[test]
    fn find_method_reports_ambiguity() {
        let r = reg();
        let mut traits = TraitRegistry::new();
        let a = traits.define("Sizer", &[], &[], &["len"]);
        let b = traits.define("Measure", &[], &[], &["len"]);
        for t in [a, b] {
            traits.add_impl(TraitImpl {
                trait_id: t,
                impl_type: TypeRegistry::STR,
                param_bindings: vec![],
                assoc_bindings: vec![],
                methods: vec![("len".to_string(), MethodKind::Intrinsic(Intrinsic::StrLen))],
            });
        }
        let hits = traits.find_method("len", TypeRegistry::STR, &r);
        assert_eq!(hits.len(), 2);
        assert!(traits.find_method("len", TypeRegistry::I32, &r).is_empty());
    }
}
