//! End-to-end lowering tests: build an AST, check it, emit SSA, and
//! assert over the printed module.

use sable_ast::{Ast, Param, TypeAnn};
use sable_codegen::{emit, CodegenOptions};
use sable_common::{DiagnosticSink, NodeId, SinkMode, SourceLoc};
use sable_ssa::print::print_module;
use sable_types::{BinaryOp, Target};
use sable_typeck::check_program;

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

/// Check and lower; panics on type errors, returns the printed module.
fn lower(ast: &mut Ast, program: NodeId) -> String {
    let mut s = sink();
    let check = check_program(ast, program, Target::default(), &mut s);
    assert_eq!(s.error_count(), 0, "diags: {:?}", s.diagnostics());
    let module = emit(ast, program, &check, &mut s, &CodegenOptions::default())
        .expect("no errors, so IR is produced");
    assert_eq!(s.error_count(), 0, "codegen diags: {:?}", s.diagnostics());
    print_module(&module)
}

fn build_add(ast: &mut Ast) -> NodeId {
    let a = ast.ident(loc(1), "a");
    let b = ast.ident(loc(1), "b");
    let sum = ast.binary(loc(1), BinaryOp::Add, a, b);
    let ret = ast.ret(loc(1), Some(sum));
    let body = ast.block(loc(1), vec![ret]);
    ast.function_decl(loc(1), "add", vec![param("a"), param("b")], None, Some(body))
}

// ── Specialization bodies ────────────────────────────────────────────

#[test]
fn one_ssa_function_per_specialization() {
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
        let a = ast.float(loc(3), 1.5);
        let b = ast.float(loc(3), 2.5);
        ast.call(loc(3), callee, vec![a, b])
    };
    let s2 = ast.expr_stmt(loc(3), c2);
    let program = ast.program(loc(1), vec![f, s1, s2]);

    let text = lower(&mut ast, program);
    assert_eq!(text.matches("define i32 @add_i32_i32(").count(), 1);
    assert_eq!(text.matches("define double @add_double_double(").count(), 1);
    // The integer instance adds with `add`, the double one with `fadd`.
    assert!(text.contains("add i32"), "got:\n{text}");
    assert!(text.contains("fadd double"), "got:\n{text}");
    // The entry calls both.
    assert!(text.contains("call i32 @add_i32_i32("));
    assert!(text.contains("call double @add_double_double("));
    assert!(text.contains("define i32 @main()"));
}

#[test]
fn scalar_parameters_get_stack_slots() {
    let mut ast = Ast::new();
    let f = build_add(&mut ast);
    let callee = ast.ident(loc(2), "add");
    let a = ast.number(loc(2), 1.0);
    let b = ast.number(loc(2), 2.0);
    let c = ast.call(loc(2), callee, vec![a, b]);
    let s1 = ast.expr_stmt(loc(2), c);
    let program = ast.program(loc(1), vec![f, s1]);

    let text = lower(&mut ast, program);
    // Parameters stored to allocas, reloaded on use.
    assert!(text.contains("store i32 %v0, ptr"), "got:\n{text}");
    assert!(text.contains("store i32 %v1, ptr"));
    assert!(text.contains("ret i32"));
}

#[test]
fn signedness_selects_division_opcode() {
    let mut ast = Ast::new();
    // function halve(n: u32) { return n / 2; } plus an i32 twin.
    let mk = |ast: &mut Ast, name: &str, ty: &str| {
        let n = ast.ident(loc(1), "n");
        let two = ast.number(loc(1), 2.0);
        let div = ast.binary(loc(1), BinaryOp::Div, n, two);
        let ret = ast.ret(loc(1), Some(div));
        let body = ast.block(loc(1), vec![ret]);
        ast.function_decl(
            loc(1),
            name,
            vec![Param {
                name: "n".into(),
                ann: Some(TypeAnn::named(ty)),
                loc: loc(1),
            }],
            None,
            Some(body),
        )
    };
    let hu = mk(&mut ast, "halve_u", "u32");
    let hi = mk(&mut ast, "halve_i", "i32");
    let mut stmts = vec![hu, hi];
    for (line, name) in [(2u32, "halve_u"), (3, "halve_i")] {
        let callee = ast.ident(loc(line), name);
        let v = ast.number(loc(line), 8.0);
        let call = ast.call(loc(line), callee, vec![v]);
        stmts.push(ast.expr_stmt(loc(line), call));
    }
    let program = ast.program(loc(1), stmts);

    let text = lower(&mut ast, program);
    assert!(text.contains("udiv i32"), "got:\n{text}");
    assert!(text.contains("sdiv i32"));
}

// ── Globals ──────────────────────────────────────────────────────────

#[test]
fn globals_materialize_constants_and_defer_the_rest() {
    let mut ast = Ast::new();
    let five = ast.number(loc(1), 5.0);
    let g1 = ast.var_decl(loc(1), "counter", false, None, Some(five));

    // computed = counter + 1 -- not a constant, stored by main.
    let c_ref = ast.ident(loc(2), "counter");
    let one = ast.number(loc(2), 1.0);
    let sum = ast.binary(loc(2), BinaryOp::Add, c_ref, one);
    let g2 = ast.var_decl(loc(2), "computed", false, None, Some(sum));

    let program = ast.program(loc(1), vec![g1, g2]);
    let text = lower(&mut ast, program);

    assert!(text.contains("@counter = global i32 5"), "got:\n{text}");
    assert!(text.contains("@computed = global i32 0"));
    // The deferred store runs in the entry function.
    assert!(text.contains("store i32 %v"), "deferred store, got:\n{text}");
    assert!(text.contains("load i32, ptr @counter"));
}

// ── Objects ──────────────────────────────────────────────────────────

#[test]
fn interned_object_struct_is_emitted_once() {
    let mut ast = Ast::new();
    let mk = |ast: &mut Ast, line: u32, name: &str| {
        let x = ast.number(loc(line), 1.0);
        let y = ast.number(loc(line), 2.0);
        let lit = ast.object_lit(loc(line), vec![("x".into(), x), ("y".into(), y)]);
        ast.var_decl(loc(line), name, false, None, Some(lit))
    };
    let a = mk(&mut ast, 1, "a");
    let b = mk(&mut ast, 2, "b");

    let a_ref = ast.ident(loc(3), "a");
    let mem = ast.member(loc(3), a_ref, "y");
    let d = ast.var_decl(loc(3), "c", false, None, Some(mem));

    let program = ast.program(loc(1), vec![a, b, d]);
    let text = lower(&mut ast, program);

    assert_eq!(text.matches("%Object_0 = type { i32, i32 }").count(), 1);
    // Member read: field address then load.
    assert!(
        text.contains("getelementptr %Object_0, ptr %v"),
        "got:\n{text}"
    );
}

// ── Enums ────────────────────────────────────────────────────────────

#[test]
fn enum_construction_and_pattern_test() {
    let mut ast = Ast::new();
    let decl = ast.enum_decl(
        loc(1),
        "Shape",
        vec![
            ("Circle".into(), vec![("r".into(), TypeAnn::named("double"))]),
            ("Square".into(), vec![("side".into(), TypeAnn::named("i32"))]),
        ],
    );
    let shape_ref = ast.ident(loc(2), "Shape");
    let callee = ast.member(loc(2), shape_ref, "Circle");
    let r = ast.float(loc(2), 1.0);
    let ctor = ast.call(loc(2), callee, vec![r]);
    let vd = ast.var_decl(loc(2), "s", false, None, Some(ctor));

    let s_ref = ast.ident(loc(3), "s");
    let binding = ast.pattern_binding(loc(3), "r");
    let pat = ast.is_pattern(loc(3), s_ref, "Shape", "Circle", vec![binding]);
    let r_use = ast.ident(loc(4), "r");
    let d = ast.var_decl(loc(4), "radius", false, None, Some(r_use));
    let then_blk = ast.block(loc(3), vec![d]);
    let if_stmt = ast.if_stmt(loc(3), pat, then_blk, None);

    let program = ast.program(loc(1), vec![decl, vd, if_stmt]);
    let text = lower(&mut ast, program);

    // Tagged layout: i32 discriminant plus a payload sized to the
    // largest variant (double = 8 bytes).
    assert!(text.contains("%Shape = type { i32, [8 x i8] }"), "got:\n{text}");
    assert!(text.contains("%Shape_Circle = type { double }"));
    // Construction stores the tag; the guard compares it.
    assert!(text.contains("store i32 0, ptr %v"));
    assert!(text.contains("icmp eq i32"));
    // Payload destructuring loads the double field.
    assert!(text.contains("load double, ptr %v"));
}

// ── Control flow ─────────────────────────────────────────────────────

#[test]
fn while_loops_have_cond_body_end_blocks() {
    let mut ast = Ast::new();
    let zero = ast.number(loc(1), 0.0);
    let i_decl = ast.var_decl(loc(1), "i", false, None, Some(zero));

    let i1 = ast.ident(loc(2), "i");
    let ten = ast.number(loc(2), 10.0);
    let cond = ast.binary(loc(2), BinaryOp::Lt, i1, ten);
    let i2 = ast.ident(loc(3), "i");
    let one = ast.number(loc(3), 1.0);
    let i3 = ast.ident(loc(3), "i");
    let sum = ast.binary(loc(3), BinaryOp::Add, i3, one);
    let assign = ast.assign(loc(3), i2, sum);
    let st = ast.expr_stmt(loc(3), assign);
    let body = ast.block(loc(2), vec![st]);
    let while_stmt = ast.while_stmt(loc(2), cond, body);

    let program = ast.program(loc(1), vec![i_decl, while_stmt]);
    let text = lower(&mut ast, program);

    assert!(text.contains("loop.cond"), "got:\n{text}");
    assert!(text.contains("loop.body"));
    assert!(text.contains("loop.end"));
    assert!(text.contains("br i1 %v"));
    assert!(text.contains("icmp slt i32"));
}

#[test]
fn code_after_return_is_not_emitted() {
    let mut ast = Ast::new();
    let one = ast.number(loc(1), 1.0);
    let ret = ast.ret(loc(1), Some(one));
    let two = ast.number(loc(2), 2.0);
    let three = ast.number(loc(2), 3.0);
    let dead = ast.binary(loc(2), BinaryOp::Mul, two, three);
    let dead_stmt = ast.expr_stmt(loc(2), dead);
    let body = ast.block(loc(1), vec![ret, dead_stmt]);
    let f = ast.function_decl(loc(1), "f", vec![], None, Some(body));
    let f_ref = ast.ident(loc(3), "f");
    let call = ast.call(loc(3), f_ref, vec![]);
    let st = ast.expr_stmt(loc(3), call);
    let program = ast.program(loc(1), vec![f, st]);

    // The checker warns (TW301) but does not error; lowering skips the
    // dead multiply entirely.
    let mut s = sink();
    let check = check_program(&mut ast, program, Target::default(), &mut s);
    assert_eq!(s.error_count(), 0);
    let module = emit(&ast, program, &check, &mut s, &CodegenOptions::default()).unwrap();
    let text = print_module(&module);
    assert!(!text.contains("mul i32"), "dead code emitted:\n{text}");
}

// ── Strings and variadics ────────────────────────────────────────────

#[test]
fn string_literals_become_constants() {
    let mut ast = Ast::new();
    let hello = ast.string(loc(1), "hello");
    let decl = ast.var_decl(loc(1), "s", false, None, Some(hello));
    let program = ast.program(loc(1), vec![decl]);
    let text = lower(&mut ast, program);

    assert!(text.contains("%str = type { ptr, i64 }"), "got:\n{text}");
    assert!(
        text.contains("@.str.0 = constant [6 x i8] c\"hello\\00\""),
        "got:\n{text}"
    );
    assert!(text.contains("{ ptr @.str.0, i64 5 }"));
}

#[test]
fn concat_with_non_string_goes_through_display() {
    let mut ast = Ast::new();
    let s = ast.string(loc(1), "n = ");
    let n = ast.number(loc(1), 42.0);
    let cat = ast.binary(loc(1), BinaryOp::Add, s, n);
    let decl = ast.var_decl(loc(1), "out", false, None, Some(cat));
    let program = ast.program(loc(1), vec![decl]);
    let text = lower(&mut ast, program);

    assert!(
        text.contains("call %str @sable_display_i32(i32 42)"),
        "got:\n{text}"
    );
    assert!(text.contains("call %str @sable_str_concat("));
    assert!(text.contains("declare %str @sable_display_i32(i32)"));
}

#[test]
fn variadic_bool_argument_promotes_to_i32() {
    let mut ast = Ast::new();
    let printf = ast.extern_function_decl(
        loc(1),
        "printf",
        vec![Param {
            name: "fmt".into(),
            ann: Some(TypeAnn::named("c_str")),
            loc: loc(1),
        }],
        Some(TypeAnn::named("i32")),
        true,
    );
    let callee = ast.ident(loc(2), "printf");
    let fmt = ast.string(loc(2), "%d\n");
    let flag = ast.boolean(loc(2), true);
    let call = ast.call(loc(2), callee, vec![fmt, flag]);
    let st = ast.expr_stmt(loc(2), call);
    let program = ast.program(loc(1), vec![printf, st]);

    let text = lower(&mut ast, program);
    assert!(text.contains("declare i32 @printf(ptr, ...)"), "got:\n{text}");
    assert!(text.contains("zext i1 true to i32"), "got:\n{text}");
    assert!(text.contains("call i32 @printf(ptr"), "got:\n{text}");
}

// ── Gatekeeping ──────────────────────────────────────────────────────

#[test]
fn no_ir_for_programs_with_errors() {
    let mut ast = Ast::new();
    let ghost = ast.ident(loc(1), "ghost");
    let st = ast.expr_stmt(loc(1), ghost);
    let program = ast.program(loc(1), vec![st]);

    let mut s = sink();
    let check = check_program(&mut ast, program, Target::default(), &mut s);
    assert!(s.has_errors());
    assert!(emit(&ast, program, &check, &mut s, &CodegenOptions::default()).is_none());
}

#[test]
fn debug_mode_threads_source_locations() {
    let mut ast = Ast::new();
    let one = ast.number(SourceLoc::new("test.sb", 9, 2), 1.0);
    let decl = ast.var_decl(SourceLoc::new("test.sb", 9, 2), "x", false, None, Some(one));
    let x = ast.ident(SourceLoc::new("test.sb", 10, 2), "x");
    let two = ast.number(SourceLoc::new("test.sb", 10, 6), 2.0);
    let sum = ast.binary(SourceLoc::new("test.sb", 10, 4), BinaryOp::Add, x, two);
    let d2 = ast.var_decl(SourceLoc::new("test.sb", 10, 1), "y", false, None, Some(sum));
    let program = ast.program(loc(1), vec![decl, d2]);

    let mut s = sink();
    let check = check_program(&mut ast, program, Target::default(), &mut s);
    assert_eq!(s.error_count(), 0);
    let opts = CodegenOptions {
        module_name: "test".into(),
        source_file: "test.sb".into(),
        debug: true,
    };
    let module = emit(&ast, program, &check, &mut s, &opts).unwrap();
    let text = print_module(&module);
    assert!(text.contains("; producer: sablec"), "got:\n{text}");
    assert!(text.contains("; test.sb:10:4"), "got:\n{text}");
}
