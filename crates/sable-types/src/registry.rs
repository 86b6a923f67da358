//! The type registry: owner of every type in one compilation.
//!
//! Types live in an arena indexed by [`TypeId`]; "pointer equality" is
//! `TypeId` equality after alias resolution. Primitives occupy fixed,
//! well-known slots created at registry construction, so every phase can
//! name them without a lookup. Anonymous object types are interned by
//! structural equality; named structs and enums are nominal.

use std::fmt;

use sable_common::NodeId;

/// A stable handle to a type owned by a [`TypeRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Pointer width of the compilation target; selects the platform alias
/// bindings (`usize`, `nint`, `uint`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtrWidth {
    W32,
    W64,
}

/// Compilation target description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub ptr_width: PtrWidth,
}

impl Default for Target {
    fn default() -> Self {
        Target {
            ptr_width: PtrWidth::W64,
        }
    }
}

/// A primitive type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    /// Integer with explicit width (8..64) and signedness.
    Int { bits: u8, signed: bool },
    Bool,
    Double,
    Void,
    /// The built-in string type, laid out as `{ i8* data, usize length }`.
    Str,
    /// A null-terminated C string pointer.
    CStr,
}

/// An object type: an ordered property list.
///
/// Anonymous objects (from literals) are structural and interned; named
/// structs set `nominal` and are distinct regardless of field layout.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectType {
    pub properties: Vec<(String, TypeId)>,
    /// Declaring struct node, if this object came from a declaration.
    pub decl: Option<NodeId>,
    pub nominal: bool,
}

impl ObjectType {
    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|(n, _)| n == name)
    }
}

/// One variant of an enum.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumVariant {
    pub name: String,
    pub fields: Vec<(String, TypeId)>,
    /// Companion object type `"Enum.Variant"`, present for non-empty
    /// variants; used for payload destructuring.
    pub payload: Option<TypeId>,
}

/// A monomorphized instance of a function for one concrete argument
/// type vector.
#[derive(Debug, Clone)]
pub struct Specialization {
    /// Linkage name: `module__name_arg1_arg2...`.
    pub mangled_name: String,
    /// Alias-resolved parameter types of this instance.
    pub params: Vec<TypeId>,
    /// Inferred return type; `None` while the cloned body is still being
    /// inferred (self-recursive calls observe this in-progress state).
    pub ret: Option<TypeId>,
    /// Cloned, re-typed body; `None` for external specializations.
    pub body: Option<NodeId>,
    pub is_external: bool,
}

/// A function type with its specialization table.
#[derive(Debug, Clone)]
pub struct FunctionType {
    pub params: Vec<TypeId>,
    pub ret: TypeId,
    pub variadic: bool,
    /// All parameter and return types known (non-Unknown) at declaration.
    pub is_fully_typed: bool,
    /// The original (un-cloned) body; `None` for extern declarations.
    pub body: Option<NodeId>,
    pub is_extern: bool,
    /// Prefix of the defining module, embedded in mangled names.
    pub module: Option<String>,
    /// Specializations in creation order. Enumeration order is a
    /// deterministic function of the input program.
    pub specializations: Vec<Specialization>,
}

/// The kind payload of a type.
#[derive(Debug, Clone)]
pub enum TypeKind {
    Unknown,
    Primitive(Primitive),
    Object(ObjectType),
    Array { elem: TypeId },
    Ref { target: TypeId, mutable: bool },
    Alias { target: TypeId },
    Function(FunctionType),
    Enum { variants: Vec<EnumVariant> },
}

/// A registered type: name plus kind payload.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub name: String,
    pub kind: TypeKind,
}

/// Errors from registration operations. Inference maps these onto
/// diagnostics; the registry itself never reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    DuplicateName(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateName(name) => write!(f, "duplicate type name '{name}'"),
        }
    }
}

impl std::error::Error for RegistryError {}

/// The registry. One per compilation; all phases share it.
#[derive(Debug)]
pub struct TypeRegistry {
    types: Vec<TypeInfo>,
    target: Target,
    /// Counter behind `Object_<n>` names for interned anonymous objects.
    object_counter: u32,
    /// Total specializations created, across all function types.
    spec_counter: u32,
}

impl TypeRegistry {
    pub const UNKNOWN: TypeId = TypeId(0);
    pub const VOID: TypeId = TypeId(1);
    pub const BOOL: TypeId = TypeId(2);
    pub const I8: TypeId = TypeId(3);
    pub const I16: TypeId = TypeId(4);
    pub const I32: TypeId = TypeId(5);
    pub const I64: TypeId = TypeId(6);
    pub const U8: TypeId = TypeId(7);
    pub const U16: TypeId = TypeId(8);
    pub const U32: TypeId = TypeId(9);
    pub const U64: TypeId = TypeId(10);
    pub const DOUBLE: TypeId = TypeId(11);
    pub const STR: TypeId = TypeId(12);
    pub const C_STR: TypeId = TypeId(13);
    pub const USIZE: TypeId = TypeId(14);
    pub const NINT: TypeId = TypeId(15);
    pub const UINT: TypeId = TypeId(16);

    /// Create a registry with the primitive and platform-alias slots
    /// filled for the given target.
    pub fn new(target: Target) -> Self {
        let mut reg = TypeRegistry {
            types: Vec::with_capacity(32),
            target,
            object_counter: 0,
            spec_counter: 0,
        };
        reg.types.push(TypeInfo {
            name: "unknown".to_string(),
            kind: TypeKind::Unknown,
        });
        let mut prim = |name: &str, p: Primitive| {
            reg.types.push(TypeInfo {
                name: name.to_string(),
                kind: TypeKind::Primitive(p),
            });
        };
        prim("void", Primitive::Void);
        prim("bool", Primitive::Bool);
        for (name, bits) in [("i8", 8u8), ("i16", 16), ("i32", 32), ("i64", 64)] {
            prim(name, Primitive::Int { bits, signed: true });
        }
        for (name, bits) in [("u8", 8u8), ("u16", 16), ("u32", 32), ("u64", 64)] {
            prim(name, Primitive::Int { bits, signed: false });
        }
        prim("double", Primitive::Double);
        prim("str", Primitive::Str);
        prim("c_str", Primitive::CStr);

        let (usize_target, nint_target, uint_target) = match target.ptr_width {
            PtrWidth::W64 => (Self::U64, Self::I64, Self::U64),
            PtrWidth::W32 => (Self::U32, Self::I32, Self::U32),
        };
        let mut alias = |name: &str, t: TypeId| {
            reg.types.push(TypeInfo {
                name: name.to_string(),
                kind: TypeKind::Alias { target: t },
            });
        };
        alias("usize", usize_target);
        alias("nint", nint_target);
        alias("uint", uint_target);
        reg
    }

    pub fn target(&self) -> Target {
        self.target
    }

    /// Number of registered types, primitive slots included.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn get(&self, id: TypeId) -> &TypeInfo {
        &self.types[id.index()]
    }

    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.types[id.index()].kind
    }

    pub fn name(&self, id: TypeId) -> &str {
        &self.types[id.index()].name
    }

    /// Iterate every type id in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = TypeId> {
        (0..self.types.len() as u32).map(TypeId)
    }

    // ── Alias resolution ─────────────────────────────────────────────

    /// Follow alias links to a non-alias type. Idempotent.
    pub fn resolve_alias(&self, id: TypeId) -> TypeId {
        let mut cur = id;
        loop {
            match self.kind(cur) {
                TypeKind::Alias { target } => cur = *target,
                _ => return cur,
            }
        }
    }

    // ── Lookup ───────────────────────────────────────────────────────

    /// Name lookup over the whole registry, primitives included.
    pub fn find_type(&self, name: &str) -> Option<TypeId> {
        self.types
            .iter()
            .position(|t| t.name == name)
            .map(|i| TypeId(i as u32))
    }

    // ── Equality ─────────────────────────────────────────────────────

    /// Type equality per the language rules: identity after alias
    /// resolution, structural equality between anonymous objects, and
    /// element-wise equality between arrays. Functions, enums, and named
    /// structs are nominal.
    pub fn types_equal(&self, a: TypeId, b: TypeId) -> bool {
        let a = self.resolve_alias(a);
        let b = self.resolve_alias(b);
        if a == b {
            return true;
        }
        match (self.kind(a), self.kind(b)) {
            (TypeKind::Object(oa), TypeKind::Object(ob)) => {
                if oa.nominal || ob.nominal {
                    return false;
                }
                oa.properties.len() == ob.properties.len()
                    && oa
                        .properties
                        .iter()
                        .zip(&ob.properties)
                        .all(|((na, ta), (nb, tb))| na == nb && self.types_equal(*ta, *tb))
            }
            (TypeKind::Array { elem: ea }, TypeKind::Array { elem: eb }) => {
                self.types_equal(*ea, *eb)
            }
            _ => false,
        }
    }

    /// Specialization-key equality: plain equality with `T ↔ ref<T>`
    /// tolerance in either direction.
    pub fn spec_arg_matches(&self, a: TypeId, b: TypeId) -> bool {
        let a = self.resolve_alias(a);
        let b = self.resolve_alias(b);
        if self.types_equal(a, b) {
            return true;
        }
        match (self.kind(a), self.kind(b)) {
            (TypeKind::Ref { target, .. }, _) => self.types_equal(*target, b),
            (_, TypeKind::Ref { target, .. }) => self.types_equal(a, *target),
            _ => false,
        }
    }

    // ── Object types ─────────────────────────────────────────────────

    /// Intern an anonymous object type built from a literal.
    ///
    /// Property types must already be resolved (literals type
    /// bottom-up, so nested object literals are interned before their
    /// parent). Returns the canonical entry when a structurally equal
    /// anonymous object exists; otherwise registers the candidate under
    /// the next `Object_<n>` name.
    pub fn intern_object_type(&mut self, properties: Vec<(String, TypeId)>) -> TypeId {
        for id in self.ids() {
            if let TypeKind::Object(obj) = self.kind(id) {
                if !obj.nominal
                    && obj.properties.len() == properties.len()
                    && obj
                        .properties
                        .iter()
                        .zip(&properties)
                        .all(|((na, ta), (nb, tb))| na == nb && self.types_equal(*ta, *tb))
                {
                    return id;
                }
            }
        }
        let name = format!("Object_{}", self.object_counter);
        self.object_counter += 1;
        self.push(TypeInfo {
            name,
            kind: TypeKind::Object(ObjectType {
                properties,
                decl: None,
                nominal: false,
            }),
        })
    }

    /// Register a named struct. Nominal: never interned, never merged.
    pub fn create_struct_type(
        &mut self,
        name: &str,
        properties: Vec<(String, TypeId)>,
        decl: Option<NodeId>,
    ) -> Result<TypeId, RegistryError> {
        if self.find_type(name).is_some() {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }
        Ok(self.push(TypeInfo {
            name: name.to_string(),
            kind: TypeKind::Object(ObjectType {
                properties,
                decl,
                nominal: true,
            }),
        }))
    }

    /// Replace an object type's property list.
    ///
    /// Declarations register struct names first and fill fields second,
    /// so a struct can hold a ref to itself (or to a later struct).
    pub fn set_object_properties(&mut self, id: TypeId, properties: Vec<(String, TypeId)>) {
        match &mut self.types[id.index()].kind {
            TypeKind::Object(obj) => obj.properties = properties,
            other => panic!("set_object_properties on non-object type: {other:?}"),
        }
    }

    // ── Ref and array types ──────────────────────────────────────────

    /// The shared ref type for `(target, mutable)`; created on first use.
    pub fn get_or_create_ref_type(&mut self, target: TypeId, mutable: bool) -> TypeId {
        for id in self.ids() {
            if let TypeKind::Ref {
                target: t,
                mutable: m,
            } = self.kind(id)
            {
                if *t == target && *m == mutable {
                    return id;
                }
            }
        }
        let name = format!("ref<{}>", self.name(target));
        self.push(TypeInfo {
            name,
            kind: TypeKind::Ref { target, mutable },
        })
    }

    /// The shared array type for an element type; created on first use.
    pub fn get_or_create_array_type(&mut self, elem: TypeId) -> TypeId {
        for id in self.ids() {
            if let TypeKind::Array { elem: e } = self.kind(id) {
                if *e == elem {
                    return id;
                }
            }
        }
        let name = format!("{}[]", self.name(elem));
        self.push(TypeInfo {
            name,
            kind: TypeKind::Array { elem },
        })
    }

    // ── Aliases ──────────────────────────────────────────────────────

    pub fn create_alias(&mut self, name: &str, target: TypeId) -> Result<TypeId, RegistryError> {
        if self.find_type(name).is_some() {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }
        Ok(self.push(TypeInfo {
            name: name.to_string(),
            kind: TypeKind::Alias { target },
        }))
    }

    // ── Function types ───────────────────────────────────────────────

    /// Register a function type. The parameter vector is owned by the
    /// registry (callers keep their own copies); duplicates within one
    /// module are rejected.
    #[allow(clippy::too_many_arguments)]
    pub fn create_function_type(
        &mut self,
        name: &str,
        params: &[TypeId],
        ret: TypeId,
        body: Option<NodeId>,
        variadic: bool,
        is_extern: bool,
        module: Option<&str>,
    ) -> Result<TypeId, RegistryError> {
        for id in self.ids() {
            if let TypeKind::Function(f) = self.kind(id) {
                if self.name(id) == name && f.module.as_deref() == module {
                    return Err(RegistryError::DuplicateName(name.to_string()));
                }
            }
        }
        let is_fully_typed =
            ret != Self::UNKNOWN && params.iter().all(|&p| p != Self::UNKNOWN);
        Ok(self.push(TypeInfo {
            name: name.to_string(),
            kind: TypeKind::Function(FunctionType {
                params: params.to_vec(),
                ret,
                variadic,
                is_fully_typed,
                body,
                is_extern,
                module: module.map(str::to_string),
                specializations: Vec::new(),
            }),
        }))
    }

    pub fn function(&self, id: TypeId) -> Option<&FunctionType> {
        match self.kind(id) {
            TypeKind::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn function_mut(&mut self, id: TypeId) -> Option<&mut FunctionType> {
        match &mut self.types[id.index()].kind {
            TypeKind::Function(f) => Some(f),
            _ => None,
        }
    }

    /// All function type ids, in registration order.
    pub fn function_ids(&self) -> Vec<TypeId> {
        self.ids()
            .filter(|&id| matches!(self.kind(id), TypeKind::Function(_)))
            .collect()
    }

    // ── Specializations ──────────────────────────────────────────────

    /// Find a specialization matching the argument types.
    ///
    /// Variadic functions match when at least the declared parameters
    /// are present and those match pairwise; extra arguments are not
    /// part of the key. Non-variadic functions match exactly.
    pub fn find_specialization(&self, func: TypeId, args: &[TypeId]) -> Option<usize> {
        let f = self.function(func)?;
        let required = f.params.len();
        f.specializations.iter().position(|s| {
            if f.variadic {
                args.len() >= required
                    && s.params
                        .iter()
                        .zip(args)
                        .take(required)
                        .all(|(&p, &a)| self.spec_arg_matches(p, a))
            } else {
                s.params.len() == args.len()
                    && s.params
                        .iter()
                        .zip(args)
                        .all(|(&p, &a)| self.spec_arg_matches(p, a))
            }
        })
    }

    /// Get or create the specialization for an argument-type vector.
    ///
    /// Returns `(index, created)`. The body is not cloned here; callers
    /// clone and attach it when they decide to infer the instance.
    pub fn add_specialization(&mut self, func: TypeId, args: &[TypeId]) -> (usize, bool) {
        if let Some(idx) = self.find_specialization(func, args) {
            return (idx, false);
        }
        let resolved: Vec<TypeId> = args.iter().map(|&a| self.resolve_alias(a)).collect();
        let f = self.function(func).expect("not a function type");
        let required = f.params.len();
        let key: Vec<TypeId> = if f.variadic {
            resolved[..required.min(resolved.len())].to_vec()
        } else {
            resolved.clone()
        };
        let is_external = f.is_extern;
        // Externals link against the symbol they declare; only bodied
        // functions get per-instance mangled names.
        let mangled_name = if is_external {
            self.name(func).to_string()
        } else {
            self.mangle_spec_name(func, &key)
        };
        tracing::debug!(func = self.name(func), name = %mangled_name, "new specialization");
        let f = self.function_mut(func).expect("not a function type");
        f.specializations.push(Specialization {
            mangled_name,
            params: key,
            ret: None,
            body: None,
            is_external,
        });
        self.spec_counter += 1;
        (self.function(func).unwrap().specializations.len() - 1, true)
    }

    pub fn specialization(&self, func: TypeId, idx: usize) -> &Specialization {
        &self.function(func).expect("not a function type").specializations[idx]
    }

    pub fn specialization_mut(&mut self, func: TypeId, idx: usize) -> &mut Specialization {
        &mut self
            .function_mut(func)
            .expect("not a function type")
            .specializations[idx]
    }

    /// Total number of specializations created in this registry.
    pub fn specialization_count(&self) -> u32 {
        self.spec_counter
    }

    /// Mangled linkage name: `module__name` plus one sanitized segment
    /// per argument type.
    fn mangle_spec_name(&self, func: TypeId, args: &[TypeId]) -> String {
        let f = self.function(func).expect("not a function type");
        let mut out = String::new();
        if let Some(module) = &f.module {
            out.push_str(module);
            out.push_str("__");
        }
        out.push_str(self.name(func));
        for &a in args {
            out.push('_');
            out.push_str(&sanitize_type_name(self.name(a)));
        }
        out
    }

    // ── Enums ────────────────────────────────────────────────────────

    /// Register an enum and synthesize `"Enum.Variant"` companion object
    /// types for every non-empty variant. Trait registration for the
    /// enum (`Eq`, `Display`) is layered on top by the type checker's
    /// builtin wiring, which owns the trait registry.
    pub fn create_enum_type(
        &mut self,
        name: &str,
        variants: Vec<(String, Vec<(String, TypeId)>)>,
        decl: Option<NodeId>,
    ) -> Result<TypeId, RegistryError> {
        let id = self.create_enum_shell(name, decl)?;
        self.fill_enum_variants(id, variants);
        Ok(id)
    }

    /// Register an enum name with no variants yet; paired with
    /// [`fill_enum_variants`](Self::fill_enum_variants) so variant field
    /// annotations can reference the enum itself.
    pub fn create_enum_shell(
        &mut self,
        name: &str,
        _decl: Option<NodeId>,
    ) -> Result<TypeId, RegistryError> {
        if self.find_type(name).is_some() {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }
        Ok(self.push(TypeInfo {
            name: name.to_string(),
            kind: TypeKind::Enum {
                variants: Vec::new(),
            },
        }))
    }

    /// Attach variants to an enum shell, synthesizing the companion
    /// object types for non-empty variants.
    pub fn fill_enum_variants(
        &mut self,
        id: TypeId,
        variants: Vec<(String, Vec<(String, TypeId)>)>,
    ) {
        let name = self.name(id).to_string();
        let mut built = Vec::with_capacity(variants.len());
        for (vname, fields) in variants {
            let payload = if fields.is_empty() {
                None
            } else {
                let companion = format!("{name}.{vname}");
                Some(self.push(TypeInfo {
                    name: companion,
                    kind: TypeKind::Object(ObjectType {
                        properties: fields.clone(),
                        decl: None,
                        nominal: true,
                    }),
                }))
            };
            built.push(EnumVariant {
                name: vname,
                fields,
                payload,
            });
        }
        match &mut self.types[id.index()].kind {
            TypeKind::Enum { variants } => *variants = built,
            other => panic!("fill_enum_variants on non-enum type: {other:?}"),
        }
    }

    pub fn enum_variants(&self, id: TypeId) -> Option<&[EnumVariant]> {
        match self.kind(self.resolve_alias(id)) {
            TypeKind::Enum { variants } => Some(variants),
            _ => None,
        }
    }

    // ── Internals ────────────────────────────────────────────────────

    fn push(&mut self, info: TypeInfo) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(info);
        id
    }
}

/// Make a type name safe for linkage identifiers: `[]` becomes `_arr`,
/// every other non-alphanumeric character becomes `_`, and trailing
/// underscores are trimmed.
pub fn sanitize_type_name(name: &str) -> String {
    let name = name.replace("[]", "_arr");
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    while out.ends_with('_') {
        out.pop();
    }
    out
}
