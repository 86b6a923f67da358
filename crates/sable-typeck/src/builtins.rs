//! Built-in trait and function registration.
//!
//! Defines the compiler-known traits (Add .. DivAssign, Not, Neg,
//! Index/RefIndex, Length, CStr, From, Display) and installs their
//! impls for the primitive types: every integer width, `double`, `bool`,
//! and `str`. Also installs the builtin functions (`print`, `println`,
//! `format`, `assert`) into the module scope.

use sable_ast::{ScopeId, Symbol, SymbolKind, SymbolTable};
use sable_types::{
    CmpKind, Intrinsic, MethodKind, TraitImpl, TraitRegistry, TypeId, TypeRegistry,
};

/// The eight integer primitives, signed first.
pub const INT_TYPES: [TypeId; 8] = [
    TypeRegistry::I8,
    TypeRegistry::I16,
    TypeRegistry::I32,
    TypeRegistry::I64,
    TypeRegistry::U8,
    TypeRegistry::U16,
    TypeRegistry::U32,
    TypeRegistry::U64,
];

fn is_signed(ty: TypeId) -> bool {
    matches!(
        ty,
        TypeRegistry::I8 | TypeRegistry::I16 | TypeRegistry::I32 | TypeRegistry::I64
    )
}

/// Define every compiler-known trait and register the primitive impls.
pub fn install(types: &TypeRegistry, traits: &mut TraitRegistry) {
    define_known_traits(traits);

    let out = |ty: TypeId| vec![("Output".to_string(), ty)];

    // ── Integers ─────────────────────────────────────────────────────

    let arith: [(&str, &str, Intrinsic); 10] = [
        ("Add", "add", Intrinsic::IAdd),
        ("Sub", "sub", Intrinsic::ISub),
        ("Mul", "mul", Intrinsic::IMul),
        ("Div", "div", Intrinsic::IDiv),
        ("Rem", "rem", Intrinsic::IRem),
        ("BitAnd", "bitand", Intrinsic::IAnd),
        ("BitOr", "bitor", Intrinsic::IOr),
        ("BitXor", "bitxor", Intrinsic::IXor),
        ("Shl", "shl", Intrinsic::IShl),
        ("Shr", "shr", Intrinsic::IShr),
    ];
    let assigns: [(&str, &str, Intrinsic); 4] = [
        ("AddAssign", "add_assign", Intrinsic::IAdd),
        ("SubAssign", "sub_assign", Intrinsic::ISub),
        ("MulAssign", "mul_assign", Intrinsic::IMul),
        ("DivAssign", "div_assign", Intrinsic::IDiv),
    ];

    for ty in INT_TYPES {
        for (trait_name, method, intrinsic) in arith {
            single_method_impl(traits, trait_name, ty, vec![ty], out(ty), method, intrinsic);
        }
        for (trait_name, method, intrinsic) in assigns {
            single_method_impl(traits, trait_name, ty, vec![ty], out(ty), method, intrinsic);
        }
        cmp_impls(traits, ty, false);
        if is_signed(ty) {
            single_method_impl(
                traits,
                "Neg",
                ty,
                vec![],
                out(ty),
                "neg",
                Intrinsic::INeg,
            );
        }
        display_impl(types, traits, ty);
    }

    // ── Double ───────────────────────────────────────────────────────

    let d = TypeRegistry::DOUBLE;
    let farith: [(&str, &str, Intrinsic); 5] = [
        ("Add", "add", Intrinsic::FAdd),
        ("Sub", "sub", Intrinsic::FSub),
        ("Mul", "mul", Intrinsic::FMul),
        ("Div", "div", Intrinsic::FDiv),
        ("Rem", "rem", Intrinsic::FRem),
    ];
    let fassigns: [(&str, &str, Intrinsic); 4] = [
        ("AddAssign", "add_assign", Intrinsic::FAdd),
        ("SubAssign", "sub_assign", Intrinsic::FSub),
        ("MulAssign", "mul_assign", Intrinsic::FMul),
        ("DivAssign", "div_assign", Intrinsic::FDiv),
    ];
    for (trait_name, method, intrinsic) in farith {
        single_method_impl(traits, trait_name, d, vec![d], out(d), method, intrinsic);
    }
    for (trait_name, method, intrinsic) in fassigns {
        single_method_impl(traits, trait_name, d, vec![d], out(d), method, intrinsic);
    }
    cmp_impls(traits, d, true);
    single_method_impl(traits, "Neg", d, vec![], out(d), "neg", Intrinsic::FNeg);
    display_impl(types, traits, d);

    // ── Bool ─────────────────────────────────────────────────────────

    let b = TypeRegistry::BOOL;
    traits.add_impl(TraitImpl {
        trait_id: traits.trait_id("Eq").unwrap(),
        impl_type: b,
        param_bindings: vec![b],
        assoc_bindings: vec![("Output".to_string(), TypeRegistry::BOOL)],
        methods: vec![
            ("eq".to_string(), MethodKind::Intrinsic(Intrinsic::ICmp(CmpKind::Eq))),
            ("ne".to_string(), MethodKind::Intrinsic(Intrinsic::ICmp(CmpKind::Ne))),
        ],
    });
    single_method_impl(traits, "Not", b, vec![], out(b), "not", Intrinsic::BoolNot);
    for (trait_name, method, intrinsic) in [
        ("BitAnd", "bitand", Intrinsic::IAnd),
        ("BitOr", "bitor", Intrinsic::IOr),
        ("BitXor", "bitxor", Intrinsic::IXor),
    ] {
        single_method_impl(traits, trait_name, b, vec![b], out(b), method, intrinsic);
    }
    display_impl(types, traits, b);

    // ── Str ──────────────────────────────────────────────────────────

    let s = TypeRegistry::STR;
    single_method_impl(
        traits,
        "Add",
        s,
        vec![s],
        vec![("Output".to_string(), s)],
        "add",
        Intrinsic::StrConcat,
    );
    traits.add_impl(TraitImpl {
        trait_id: traits.trait_id("Eq").unwrap(),
        impl_type: s,
        param_bindings: vec![s],
        assoc_bindings: vec![("Output".to_string(), TypeRegistry::BOOL)],
        methods: vec![
            ("eq".to_string(), MethodKind::Intrinsic(Intrinsic::StrEq)),
            ("ne".to_string(), MethodKind::Intrinsic(Intrinsic::StrNe)),
        ],
    });
}

/// `Eq` and `Ord` for enums compare discriminants; `Display` yields the
/// variant name. Installed by the checker when an enum is declared.
pub fn register_enum_impls(traits: &mut TraitRegistry, enum_ty: TypeId) {
    let eq = traits.define("Eq", &["Rhs"], &["Output"], &["eq", "ne"]);
    traits.add_impl(TraitImpl {
        trait_id: eq,
        impl_type: enum_ty,
        param_bindings: vec![enum_ty],
        assoc_bindings: vec![("Output".to_string(), TypeRegistry::BOOL)],
        methods: vec![
            ("eq".to_string(), MethodKind::Intrinsic(Intrinsic::EnumEq)),
            ("ne".to_string(), MethodKind::Intrinsic(Intrinsic::EnumNe)),
        ],
    });
    let display = traits.define("Display", &[], &[], &["to_string"]);
    traits.add_impl(TraitImpl {
        trait_id: display,
        impl_type: enum_ty,
        param_bindings: vec![],
        assoc_bindings: vec![],
        methods: vec![(
            "to_string".to_string(),
            MethodKind::Intrinsic(Intrinsic::EnumToString),
        )],
    });
}

/// Install the builtin functions into a module scope: `print(str)`,
/// `println(str)`, `format(str, ...) -> str`, `assert(bool, str, ...)`.
/// All are externals provided by the runtime.
pub fn install_builtin_functions(
    types: &mut TypeRegistry,
    symbols: &mut SymbolTable,
    scope: ScopeId,
) {
    let defs: [(&str, Vec<TypeId>, TypeId, bool); 4] = [
        ("print", vec![TypeRegistry::STR], TypeRegistry::VOID, false),
        ("println", vec![TypeRegistry::STR], TypeRegistry::VOID, false),
        ("format", vec![TypeRegistry::STR], TypeRegistry::STR, true),
        (
            "assert",
            vec![TypeRegistry::BOOL, TypeRegistry::STR],
            TypeRegistry::VOID,
            true,
        ),
    ];
    for (name, params, ret, variadic) in defs {
        let ft = types
            .create_function_type(name, &params, ret, None, variadic, true, None)
            .expect("builtin registered twice");
        symbols.insert(
            scope,
            Symbol {
                name: name.to_string(),
                kind: SymbolKind::Function,
                ty: ft,
                decl: None,
            },
        );
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn define_known_traits(traits: &mut TraitRegistry) {
    for (name, method) in [
        ("Add", "add"),
        ("Sub", "sub"),
        ("Mul", "mul"),
        ("Div", "div"),
        ("Rem", "rem"),
        ("BitAnd", "bitand"),
        ("BitOr", "bitor"),
        ("BitXor", "bitxor"),
        ("Shl", "shl"),
        ("Shr", "shr"),
        ("AddAssign", "add_assign"),
        ("SubAssign", "sub_assign"),
        ("MulAssign", "mul_assign"),
        ("DivAssign", "div_assign"),
    ] {
        traits.define(name, &["Rhs"], &["Output"], &[method]);
    }
    traits.define("Eq", &["Rhs"], &["Output"], &["eq", "ne"]);
    traits.define("Ord", &["Rhs"], &["Output"], &["lt", "le", "gt", "ge"]);
    traits.define("Not", &[], &["Output"], &["not"]);
    traits.define("Neg", &[], &["Output"], &["neg"]);
    traits.define("Index", &["Idx"], &["Output"], &["index"]);
    traits.define("RefIndex", &["Idx"], &["Output"], &["ref_index"]);
    traits.define("Length", &[], &["Output"], &["len"]);
    traits.define("CStr", &[], &["Output"], &["to_c_str"]);
    traits.define("From", &["T"], &[], &["from"]);
    traits.define("Display", &[], &[], &["to_string"]);
}

fn single_method_impl(
    traits: &mut TraitRegistry,
    trait_name: &str,
    impl_type: TypeId,
    param_bindings: Vec<TypeId>,
    assoc_bindings: Vec<(String, TypeId)>,
    method: &str,
    intrinsic: Intrinsic,
) {
    let trait_id = traits
        .trait_id(trait_name)
        .expect("known trait defined before impls");
    traits.add_impl(TraitImpl {
        trait_id,
        impl_type,
        param_bindings,
        assoc_bindings,
        methods: vec![(method.to_string(), MethodKind::Intrinsic(intrinsic))],
    });
}

fn cmp_impls(traits: &mut TraitRegistry, ty: TypeId, float: bool) {
    let pick = |k: CmpKind| {
        if float {
            Intrinsic::FCmp(k)
        } else {
            Intrinsic::ICmp(k)
        }
    };
    let eq = traits.trait_id("Eq").unwrap();
    traits.add_impl(TraitImpl {
        trait_id: eq,
        impl_type: ty,
        param_bindings: vec![ty],
        assoc_bindings: vec![("Output".to_string(), TypeRegistry::BOOL)],
        methods: vec![
            ("eq".to_string(), MethodKind::Intrinsic(pick(CmpKind::Eq))),
            ("ne".to_string(), MethodKind::Intrinsic(pick(CmpKind::Ne))),
        ],
    });
    let ord = traits.trait_id("Ord").unwrap();
    traits.add_impl(TraitImpl {
        trait_id: ord,
        impl_type: ty,
        param_bindings: vec![ty],
        assoc_bindings: vec![("Output".to_string(), TypeRegistry::BOOL)],
        methods: vec![
            ("lt".to_string(), MethodKind::Intrinsic(pick(CmpKind::Lt))),
            ("le".to_string(), MethodKind::Intrinsic(pick(CmpKind::Le))),
            ("gt".to_string(), MethodKind::Intrinsic(pick(CmpKind::Gt))),
            ("ge".to_string(), MethodKind::Intrinsic(pick(CmpKind::Ge))),
        ],
    });
}

/// Display for a primitive calls a runtime symbol, e.g.
/// `sable_display_i32(i32) -> str`.
fn display_impl(types: &TypeRegistry, traits: &mut TraitRegistry, ty: TypeId) {
    let display = traits.trait_id("Display").unwrap();
    let symbol = format!("sable_display_{}", types.name(ty));
    traits.add_impl(TraitImpl {
        trait_id: display,
        impl_type: ty,
        param_bindings: vec![],
        assoc_bindings: vec![],
        methods: vec![("to_string".to_string(), MethodKind::External(symbol))],
    });
}
