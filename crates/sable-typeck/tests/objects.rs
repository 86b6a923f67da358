//! Integration tests for object typing: structural interning of
//! anonymous literals, named struct nominality, member access with
//! recorded property indices, and assignment checking.

use sable_ast::{Ast, TypeAnn};
use sable_common::{DiagnosticSink, NodeId, SinkMode, SourceLoc};
use sable_types::{Target, TypeKind, TypeRegistry};
use sable_typeck::{check_program, CheckResult};

// ── Helpers ────────────────────────────────────────────────────────────

fn loc(line: u32) -> SourceLoc {
    SourceLoc::new("test.sb", line, 1)
}

fn sink() -> DiagnosticSink {
    DiagnosticSink::with_writer(SinkMode::Collect, Box::new(std::io::sink()))
}

fn check(ast: &mut Ast, program: NodeId) -> (CheckResult, DiagnosticSink) {
    let mut s = sink();
    let res = check_program(ast, program, Target::default(), &mut s);
    (res, s)
}

/// `var <name> = { x: <x>, y: <y> };`
fn point_literal(ast: &mut Ast, line: u32, name: &str, x: f64, y: f64) -> (NodeId, NodeId) {
    let xv = ast.number(loc(line), x);
    let yv = ast.number(loc(line), y);
    let lit = ast.object_lit(loc(line), vec![("x".into(), xv), ("y".into(), yv)]);
    let decl = ast.var_decl(loc(line), name, false, None, Some(lit));
    (decl, lit)
}

// ── Structural interning ─────────────────────────────────────────────

#[test]
fn identical_literals_share_one_interned_type() {
    let mut ast = Ast::new();
    let (a_decl, a_lit) = point_literal(&mut ast, 1, "a", 1.0, 2.0);
    let (b_decl, b_lit) = point_literal(&mut ast, 2, "b", 3.0, 4.0);
    let program = ast.program(loc(1), vec![a_decl, b_decl]);

    let (res, s) = check(&mut ast, program);
    assert_eq!(s.error_count(), 0, "diags: {:?}", s.diagnostics());

    let ta = ast.ty(a_lit);
    let tb = ast.ty(b_lit);
    assert_eq!(ta, tb, "structurally equal literals must share a type");
    assert_eq!(res.types.name(ta), "Object_0");

    // Exactly one anonymous object type exists.
    let object_count = res
        .types
        .ids()
        .filter(|&id| match res.types.kind(id) {
            TypeKind::Object(o) => !o.nominal,
            _ => false,
        })
        .count();
    assert_eq!(object_count, 1);
    match res.types.kind(ta) {
        TypeKind::Object(o) => {
            assert_eq!(
                o.properties,
                vec![
                    ("x".to_string(), TypeRegistry::I32),
                    ("y".to_string(), TypeRegistry::I32)
                ]
            );
        }
        other => panic!("expected object type, got {other:?}"),
    }
}

#[test]
fn nested_literals_intern_bottom_up() {
    let mut ast = Ast::new();
    // var a = { p: { x: 1 } }; var b = { p: { x: 2 } };
    let build = |ast: &mut Ast, line: u32, name: &str, x: f64| {
        let xv = ast.number(loc(line), x);
        let inner = ast.object_lit(loc(line), vec![("x".into(), xv)]);
        let outer = ast.object_lit(loc(line), vec![("p".into(), inner)]);
        let decl = ast.var_decl(loc(line), name, false, None, Some(outer));
        (decl, outer, inner)
    };
    let (da, oa, ia) = build(&mut ast, 1, "a", 1.0);
    let (db, ob, ib) = build(&mut ast, 2, "b", 2.0);
    let program = ast.program(loc(1), vec![da, db]);

    let (_res, s) = check(&mut ast, program);
    assert_eq!(s.error_count(), 0);
    assert_eq!(ast.ty(ia), ast.ty(ib));
    assert_eq!(ast.ty(oa), ast.ty(ob));
    assert_ne!(ast.ty(ia), ast.ty(oa));
}

// ── Named structs ────────────────────────────────────────────────────

#[test]
fn struct_declaration_is_nominal_and_reaches_annotations() {
    let mut ast = Ast::new();
    let decl = ast.struct_decl(
        loc(1),
        "Point",
        vec![
            ("x".into(), TypeAnn::named("i32")),
            ("y".into(), TypeAnn::named("i32")),
        ],
    );
    // An anonymous literal with the same layout stays separate.
    let (vdecl, lit) = point_literal(&mut ast, 2, "p", 1.0, 2.0);
    let program = ast.program(loc(1), vec![decl, vdecl]);

    let (res, s) = check(&mut ast, program);
    assert_eq!(s.error_count(), 0);

    let point = res.types.find_type("Point").unwrap();
    assert_ne!(ast.ty(lit), point);
    assert!(!res.types.types_equal(ast.ty(lit), point));
}

#[test]
fn self_referential_struct_registers() {
    let mut ast = Ast::new();
    let decl = ast.struct_decl(
        loc(1),
        "Node",
        vec![
            ("value".into(), TypeAnn::named("i32")),
            (
                "next".into(),
                TypeAnn::Ref {
                    target: Box::new(TypeAnn::named("Node")),
                    mutable: true,
                },
            ),
        ],
    );
    let program = ast.program(loc(1), vec![decl]);
    let (res, s) = check(&mut ast, program);
    assert_eq!(s.error_count(), 0, "diags: {:?}", s.diagnostics());

    let node = res.types.find_type("Node").unwrap();
    match res.types.kind(node) {
        TypeKind::Object(o) => {
            let next = o.properties[1].1;
            match res.types.kind(next) {
                TypeKind::Ref { target, mutable } => {
                    assert_eq!(*target, node);
                    assert!(*mutable);
                }
                other => panic!("expected ref, got {other:?}"),
            }
        }
        other => panic!("expected object, got {other:?}"),
    }
}

// ── Member access ────────────────────────────────────────────────────

#[test]
fn member_access_records_property_index() {
    let mut ast = Ast::new();
    let (decl, _lit) = point_literal(&mut ast, 1, "a", 1.0, 2.0);
    let a_ref = ast.ident(loc(2), "a");
    let member = ast.member(loc(2), a_ref, "y");
    let vd = ast.var_decl(loc(2), "b", false, None, Some(member));
    let program = ast.program(loc(1), vec![decl, vd]);

    let (_res, s) = check(&mut ast, program);
    assert_eq!(s.error_count(), 0);
    assert_eq!(ast.node(member).prop_index, Some(1));
    assert_eq!(ast.ty(member), TypeRegistry::I32);
}

#[test]
fn unknown_property_is_te306() {
    let mut ast = Ast::new();
    let (decl, _lit) = point_literal(&mut ast, 1, "a", 1.0, 2.0);
    let a_ref = ast.ident(loc(2), "a");
    let member = ast.member(loc(2), a_ref, "z");
    let st = ast.expr_stmt(loc(2), member);
    let program = ast.program(loc(1), vec![decl, st]);

    let (_res, s) = check(&mut ast, program);
    assert!(s.diagnostics().iter().any(|d| d.code == "TE306"));
    assert_eq!(ast.ty(member), TypeRegistry::UNKNOWN);
}

// ── Arrays and builtin properties ────────────────────────────────────

#[test]
fn array_literals_index_and_length() {
    let mut ast = Ast::new();
    let e1 = ast.number(loc(1), 1.0);
    let e2 = ast.number(loc(1), 2.0);
    let arr = ast.array_lit(loc(1), vec![e1, e2]);
    let decl = ast.var_decl(loc(1), "xs", false, None, Some(arr));

    let xs1 = ast.ident(loc(2), "xs");
    let zero = ast.number(loc(2), 0.0);
    let idx = ast.index(loc(2), xs1, zero);
    let d2 = ast.var_decl(loc(2), "first", false, None, Some(idx));

    let xs2 = ast.ident(loc(3), "xs");
    let len = ast.member(loc(3), xs2, "length");
    let d3 = ast.var_decl(loc(3), "n", false, None, Some(len));

    let program = ast.program(loc(1), vec![decl, d2, d3]);
    let (res, s) = check(&mut ast, program);
    assert_eq!(s.error_count(), 0, "diags: {:?}", s.diagnostics());

    let arr_ty = ast.ty(arr);
    assert_eq!(res.types.name(arr_ty), "i32[]");
    assert_eq!(ast.ty(idx), TypeRegistry::I32);
    // Array length is u32.
    assert_eq!(ast.ty(len), TypeRegistry::U32);
    // The on-demand impls were installed exactly once.
    let index_trait = res.traits.trait_id("Index").unwrap();
    assert_eq!(res.traits.impls_of(index_trait).len(), 1);
}

// ── Assignment ───────────────────────────────────────────────────────

#[test]
fn assignment_to_const_is_te304() {
    let mut ast = Ast::new();
    let init = ast.number(loc(1), 1.0);
    let decl = ast.var_decl(loc(1), "k", true, None, Some(init));
    let k = ast.ident(loc(2), "k");
    let two = ast.number(loc(2), 2.0);
    let assign = ast.assign(loc(2), k, two);
    let st = ast.expr_stmt(loc(2), assign);
    let program = ast.program(loc(1), vec![decl, st]);

    let (_res, s) = check(&mut ast, program);
    assert!(s.diagnostics().iter().any(|d| d.code == "TE304"));
}

#[test]
fn member_assignment_types_against_the_property() {
    let mut ast = Ast::new();
    let (decl, _lit) = point_literal(&mut ast, 1, "a", 1.0, 2.0);
    let a_ref = ast.ident(loc(2), "a");
    let member = ast.member(loc(2), a_ref, "x");
    let val = ast.string(loc(2), "nope");
    let assign = ast.assign(loc(2), member, val);
    let st = ast.expr_stmt(loc(2), assign);
    let program = ast.program(loc(1), vec![decl, st]);

    let (_res, s) = check(&mut ast, program);
    assert!(s.diagnostics().iter().any(|d| d.code == "TE313"));
}

#[test]
fn annotation_widens_integer_literals() {
    let mut ast = Ast::new();
    let init = ast.number(loc(1), 7.0);
    let decl = ast.var_decl(loc(1), "n", false, Some(TypeAnn::named("u64")), Some(init));
    let program = ast.program(loc(1), vec![decl]);

    let (_res, s) = check(&mut ast, program);
    assert_eq!(s.error_count(), 0);
    assert_eq!(ast.ty(init), TypeRegistry::U64);
    assert_eq!(ast.ty(decl), TypeRegistry::U64);
}
