//! Integration tests for call-site monomorphization: specialization
//! creation and deduplication, recursion, mutual recursion, variadic
//! externals, and mangled-name stability.

use sable_ast::{Ast, Param, TypeAnn};
use sable_common::{DiagnosticSink, SinkMode, SourceLoc};
use sable_types::{BinaryOp, Target, TypeRegistry};
use sable_typeck::{check_program, CheckResult};

// ── Helpers ────────────────────────────────────────────────────────────

fn loc(line: u32) -> SourceLoc {
    SourceLoc::new("test.sb", line, 1)
}

fn sink() -> DiagnosticSink {
    DiagnosticSink::with_writer(SinkMode::Collect, Box::new(std::io::sink()))
}

fn param(name: &str) -> Param {
    Param {
        name: name.to_string(),
        ann: None,
        loc: loc(1),
    }
}

fn typed_param(name: &str, ty: &str) -> Param {
    Param {
        name: name.to_string(),
        ann: Some(TypeAnn::named(ty)),
        loc: loc(1),
    }
}

/// `function add(a, b) { return a + b; }`
fn build_add(ast: &mut Ast) -> sable_common::NodeId {
    let a = ast.ident(loc(1), "a");
    let b = ast.ident(loc(1), "b");
    let sum = ast.binary(loc(1), BinaryOp::Add, a, b);
    let ret = ast.ret(loc(1), Some(sum));
    let body = ast.block(loc(1), vec![ret]);
    ast.function_decl(loc(1), "add", vec![param("a"), param("b")], None, Some(body))
}

fn check(ast: &mut Ast, program: sable_common::NodeId) -> (CheckResult, DiagnosticSink) {
    let mut s = sink();
    let res = check_program(ast, program, Target::default(), &mut s);
    (res, s)
}

// ── Specialization per argument-type vector ──────────────────────────

#[test]
fn distinct_argument_types_spawn_distinct_specializations() {
    let mut ast = Ast::new();
    let f = build_add(&mut ast);

    let add1 = ast.ident(loc(2), "add");
    let one = ast.number(loc(2), 1.0);
    let two = ast.number(loc(2), 2.0);
    let c1 = ast.call(loc(2), add1, vec![one, two]);
    let s1 = ast.expr_stmt(loc(2), c1);

    let add2 = ast.ident(loc(3), "add");
    let x = ast.float(loc(3), 1.5);
    let y = ast.float(loc(3), 2.5);
    let c2 = ast.call(loc(3), add2, vec![x, y]);
    let s2 = ast.expr_stmt(loc(3), c2);

    let program = ast.program(loc(1), vec![f, s1, s2]);
    let (res, s) = check(&mut ast, program);
    assert_eq!(s.error_count(), 0, "diags: {:?}", s.diagnostics());

    let add_ty = res.types.find_type("add").unwrap();
    let func = res.types.function(add_ty).unwrap();
    assert_eq!(func.specializations.len(), 2);
    assert_eq!(func.specializations[0].mangled_name, "add_i32_i32");
    assert_eq!(func.specializations[0].ret, Some(TypeRegistry::I32));
    assert_eq!(func.specializations[1].mangled_name, "add_double_double");
    assert_eq!(func.specializations[1].ret, Some(TypeRegistry::DOUBLE));

    // Call sites point at their specializations.
    assert_eq!(ast.node(c1).callee_fn, Some(add_ty));
    assert_eq!(ast.node(c1).spec_index, Some(0));
    assert_eq!(ast.node(c2).spec_index, Some(1));
    assert_eq!(ast.ty(c1), TypeRegistry::I32);
    assert_eq!(ast.ty(c2), TypeRegistry::DOUBLE);
}

#[test]
fn repeated_call_reuses_the_specialization() {
    let mut ast = Ast::new();
    let f = build_add(&mut ast);
    let mut stmts = vec![f];
    for line in 2..5 {
        let callee = ast.ident(loc(line), "add");
        let a = ast.number(loc(line), 1.0);
        let b = ast.number(loc(line), 2.0);
        let c = ast.call(loc(line), callee, vec![a, b]);
        stmts.push(ast.expr_stmt(loc(line), c));
    }
    let program = ast.program(loc(1), stmts);
    let (res, s) = check(&mut ast, program);
    assert_eq!(s.error_count(), 0);

    let add_ty = res.types.find_type("add").unwrap();
    assert_eq!(res.types.function(add_ty).unwrap().specializations.len(), 1);
    assert_eq!(res.types.specialization_count(), 1);
}

#[test]
fn mixed_width_call_reports_operator_not_supported() {
    let mut ast = Ast::new();
    let f = build_add(&mut ast);
    let callee = ast.ident(loc(2), "add");
    let a = ast.number(loc(2), 1.0);
    let b = ast.float(loc(2), 2.5);
    let c = ast.call(loc(2), callee, vec![a, b]);
    let s1 = ast.expr_stmt(loc(2), c);
    let program = ast.program(loc(1), vec![f, s1]);

    let (_res, s) = check(&mut ast, program);
    assert!(
        s.diagnostics().iter().any(|d| d.code == "TE309"),
        "expected TE309, got {:?}",
        s.diagnostics()
    );
}

// ── Recursion ────────────────────────────────────────────────────────

/// `function fact(n) { if (n <= 1) { return 1; } return n * fact(n - 1); }`
#[test]
fn self_recursion_resolves_in_one_walk() {
    let mut ast = Ast::new();
    let n1 = ast.ident(loc(1), "n");
    let one = ast.number(loc(1), 1.0);
    let cond = ast.binary(loc(1), BinaryOp::Le, n1, one);
    let lit1 = ast.number(loc(1), 1.0);
    let ret1 = ast.ret(loc(1), Some(lit1));
    let then_blk = ast.block(loc(1), vec![ret1]);
    let if_stmt = ast.if_stmt(loc(1), cond, then_blk, None);

    let n2 = ast.ident(loc(2), "n");
    let n3 = ast.ident(loc(2), "n");
    let one2 = ast.number(loc(2), 1.0);
    let sub = ast.binary(loc(2), BinaryOp::Sub, n3, one2);
    let fact_ref = ast.ident(loc(2), "fact");
    let rec = ast.call(loc(2), fact_ref, vec![sub]);
    let mul = ast.binary(loc(2), BinaryOp::Mul, n2, rec);
    let ret2 = ast.ret(loc(2), Some(mul));

    let body = ast.block(loc(1), vec![if_stmt, ret2]);
    let f = ast.function_decl(loc(1), "fact", vec![param("n")], None, Some(body));

    let callee = ast.ident(loc(3), "fact");
    let five = ast.number(loc(3), 5.0);
    let call = ast.call(loc(3), callee, vec![five]);
    let s1 = ast.expr_stmt(loc(3), call);

    let program = ast.program(loc(1), vec![f, s1]);
    let (res, s) = check(&mut ast, program);
    assert_eq!(s.error_count(), 0, "diags: {:?}", s.diagnostics());

    let fact_ty = res.types.find_type("fact").unwrap();
    let func = res.types.function(fact_ty).unwrap();
    assert_eq!(func.specializations.len(), 1);
    assert_eq!(func.specializations[0].mangled_name, "fact_i32");
    assert_eq!(func.specializations[0].ret, Some(TypeRegistry::I32));
    assert_eq!(ast.ty(call), TypeRegistry::I32);
}

/// f calls g before g's return type can be known; a re-walk resolves it.
#[test]
fn mutual_recursion_converges_via_re_walk() {
    let mut ast = Ast::new();

    // function f(n) { return g(n); }
    let n = ast.ident(loc(1), "n");
    let g_ref = ast.ident(loc(1), "g");
    let call_g = ast.call(loc(1), g_ref, vec![n]);
    let ret_f = ast.ret(loc(1), Some(call_g));
    let f_body = ast.block(loc(1), vec![ret_f]);
    let f = ast.function_decl(loc(1), "f", vec![param("n")], None, Some(f_body));

    // function g(n) { if (n == 0) { return 0; } return f(n - 1); }
    let n1 = ast.ident(loc(2), "n");
    let zero = ast.number(loc(2), 0.0);
    let cond = ast.binary(loc(2), BinaryOp::Eq, n1, zero);
    let zero2 = ast.number(loc(2), 0.0);
    let ret0 = ast.ret(loc(2), Some(zero2));
    let then_blk = ast.block(loc(2), vec![ret0]);
    let if_stmt = ast.if_stmt(loc(2), cond, then_blk, None);
    let n2 = ast.ident(loc(3), "n");
    let one = ast.number(loc(3), 1.0);
    let sub = ast.binary(loc(3), BinaryOp::Sub, n2, one);
    let f_ref = ast.ident(loc(3), "f");
    let call_f = ast.call(loc(3), f_ref, vec![sub]);
    let ret_g = ast.ret(loc(3), Some(call_f));
    let g_body = ast.block(loc(2), vec![if_stmt, ret_g]);
    let g = ast.function_decl(loc(2), "g", vec![param("n")], None, Some(g_body));

    let f_ref2 = ast.ident(loc(4), "f");
    let three = ast.number(loc(4), 3.0);
    let call = ast.call(loc(4), f_ref2, vec![three]);
    let s1 = ast.expr_stmt(loc(4), call);

    let program = ast.program(loc(1), vec![f, g, s1]);
    let (res, s) = check(&mut ast, program);
    assert_eq!(s.error_count(), 0, "diags: {:?}", s.diagnostics());

    for name in ["f", "g"] {
        let ty = res.types.find_type(name).unwrap();
        let func = res.types.function(ty).unwrap();
        assert_eq!(func.specializations.len(), 1, "{name}");
        assert_eq!(
            func.specializations[0].ret,
            Some(TypeRegistry::I32),
            "{name} return type"
        );
    }
}

// ── Variadic externals ───────────────────────────────────────────────

#[test]
fn variadic_extern_specializes_on_required_prefix_only() {
    let mut ast = Ast::new();
    // extern function printf(fmt: c_str, ...) -> i32;
    let printf = ast.extern_function_decl(
        loc(1),
        "printf",
        vec![typed_param("fmt", "c_str")],
        Some(TypeAnn::named("i32")),
        true,
    );

    // Two calls with different extras land in one specialization.
    let mut stmts = vec![printf];
    let c1 = ast.ident(loc(2), "printf");
    let fmt1 = ast.ident(loc(2), "fmt_val");
    let extra1 = ast.boolean(loc(2), true);
    let call1 = ast.call(loc(2), c1, vec![fmt1, extra1]);
    stmts.push(ast.expr_stmt(loc(2), call1));
    let c2 = ast.ident(loc(3), "printf");
    let fmt2 = ast.ident(loc(3), "fmt_val");
    let extra2 = ast.number(loc(3), 7.0);
    let extra3 = ast.number(loc(3), 9.0);
    let call2 = ast.call(loc(3), c2, vec![fmt2, extra2, extra3]);
    stmts.push(ast.expr_stmt(loc(3), call2));
    // fmt_val: a c_str variable to pass as the format.
    let fmt_decl = ast.var_decl(loc(1), "fmt_val", false, Some(TypeAnn::named("c_str")), None);
    stmts.insert(1, fmt_decl);

    let program = ast.program(loc(1), stmts);
    let (res, s) = check(&mut ast, program);
    assert_eq!(s.error_count(), 0, "diags: {:?}", s.diagnostics());

    let printf_ty = res.types.find_type("printf").unwrap();
    let func = res.types.function(printf_ty).unwrap();
    assert_eq!(func.specializations.len(), 1);
    assert_eq!(func.specializations[0].mangled_name, "printf");
    assert!(func.specializations[0].is_external);
    assert_eq!(func.specializations[0].ret, Some(TypeRegistry::I32));
}

#[test]
fn str_literal_converts_to_c_str_parameter() {
    let mut ast = Ast::new();
    let printf = ast.extern_function_decl(
        loc(1),
        "printf",
        vec![typed_param("fmt", "c_str")],
        Some(TypeAnn::named("i32")),
        true,
    );
    let callee = ast.ident(loc(2), "printf");
    let fmt = ast.string(loc(2), "%d\n");
    let flag = ast.boolean(loc(2), true);
    let call = ast.call(loc(2), callee, vec![fmt, flag]);
    let st = ast.expr_stmt(loc(2), call);
    let program = ast.program(loc(1), vec![printf, st]);

    let (res, s) = check(&mut ast, program);
    // The str literal reaches the c_str parameter through the
    // compiler-known From conversion; no diagnostic.
    assert_eq!(s.error_count(), 0, "diags: {:?}", s.diagnostics());
    let printf_ty = res.types.find_type("printf").unwrap();
    assert_eq!(
        res.types.function(printf_ty).unwrap().specializations[0].mangled_name,
        "printf"
    );
    // From<str> for c_str was installed on demand.
    let from = res.traits.trait_id("From").unwrap();
    assert!(res
        .traits
        .find_impl(from, TypeRegistry::C_STR, &[TypeRegistry::STR], &res.types)
        .is_some());
}

#[test]
fn variadic_call_below_required_arity_is_rejected() {
    let mut ast = Ast::new();
    let printf = ast.extern_function_decl(
        loc(1),
        "printf",
        vec![typed_param("fmt", "c_str")],
        Some(TypeAnn::named("i32")),
        true,
    );
    let callee = ast.ident(loc(2), "printf");
    let call = ast.call(loc(2), callee, vec![]);
    let s1 = ast.expr_stmt(loc(2), call);
    let program = ast.program(loc(1), vec![printf, s1]);

    let (_res, s) = check(&mut ast, program);
    assert!(s.diagnostics().iter().any(|d| d.code == "TE308"));
}

// ── Determinism ──────────────────────────────────────────────────────

#[test]
fn mangled_names_are_stable_across_runs() {
    let build = || {
        let mut ast = Ast::new();
        let f = build_add(&mut ast);
        let c1 = {
            let callee = ast.ident(loc(2), "add");
            let a = ast.number(loc(2), 1.0);
            let b = ast.number(loc(2), 2.0);
            ast.call(loc(2), callee, vec![a, b])
        };
        let s1 = ast.expr_stmt(loc(2), c1);
        let c2 = {
            let callee = ast.ident(loc(3), "add");
            let a = ast.float(loc(3), 1.0);
            let b = ast.float(loc(3), 2.0);
            ast.call(loc(3), callee, vec![a, b])
        };
        let s2 = ast.expr_stmt(loc(3), c2);
        let program = ast.program(loc(1), vec![f, s1, s2]);
        (ast, program)
    };

    let names = |ast: &mut Ast, program| {
        let mut s = sink();
        let res = check_program(ast, program, Target::default(), &mut s);
        let add_ty = res.types.find_type("add").unwrap();
        res.types
            .function(add_ty)
            .unwrap()
            .specializations
            .iter()
            .map(|sp| sp.mangled_name.clone())
            .collect::<Vec<_>>()
    };

    let (mut ast1, p1) = build();
    let (mut ast2, p2) = build();
    assert_eq!(names(&mut ast1, p1), names(&mut ast2, p2));
}

#[test]
fn module_prefix_flows_into_mangled_names() {
    use sable_ast::SymbolTable;
    use sable_types::TraitRegistry;
    use sable_typeck::Inferencer;

    let mut ast = Ast::new();
    let f = build_add(&mut ast);
    let callee = ast.ident(loc(2), "add");
    let a = ast.number(loc(2), 1.0);
    let b = ast.number(loc(2), 2.0);
    let c = ast.call(loc(2), callee, vec![a, b]);
    let s1 = ast.expr_stmt(loc(2), c);
    let program = ast.program(loc(1), vec![f, s1]);

    let mut types = TypeRegistry::new(Target::default());
    let mut traits = TraitRegistry::new();
    let mut symbols = SymbolTable::new();
    sable_typeck::builtins::install(&types, &mut traits);
    let scope = symbols.new_scope(None);
    let mut s = sink();
    let mut inf = Inferencer::new(
        &mut ast,
        &mut types,
        &mut traits,
        &mut symbols,
        &mut s,
        Some("math_vec"),
    );
    inf.run(program, scope);

    let add_ty = types.find_type("add").unwrap();
    assert_eq!(
        types.function(add_ty).unwrap().specializations[0].mangled_name,
        "math_vec__add_i32_i32"
    );
}
