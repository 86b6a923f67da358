//! Deterministic LLVM-flavored text rendering of a module.
//!
//! This is the backend handoff surface and what the snapshot tests pin
//! down. Output order: module header, struct types, globals, function
//! declarations, function definitions -- each in creation order.

use std::fmt::Write;

use crate::ir::{
    BinOp, CastOp, FloatPred, Function, GlobalInit, Inst, IntPred, Module, Operand, SsaType, Term,
};

/// Render a whole module.
pub fn print_module(m: &Module) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "; ModuleID = '{}'", m.name);
    if let Some(debug) = &m.debug {
        let _ = writeln!(out, "; producer: {}", debug.producer);
        let _ = writeln!(out, "; file: {}", debug.file);
    }

    if !m.structs.is_empty() {
        out.push('\n');
        for s in &m.structs {
            let fields: Vec<String> = s.fields.iter().map(|f| type_str(m, f)).collect();
            let _ = writeln!(out, "%{} = type {{ {} }}", s.name, fields.join(", "));
        }
    }

    if !m.globals.is_empty() {
        out.push('\n');
        for g in &m.globals {
            let linkage = if g.is_const { "constant" } else { "global" };
            let init = match &g.init {
                GlobalInit::Zero => zero_str(&g.ty),
                GlobalInit::Int(v) => format!("{v}"),
                GlobalInit::Double(d) => double_str(*d),
                GlobalInit::Bytes(bytes) => format!("c\"{}\"", escape_bytes(bytes)),
            };
            let _ = writeln!(out, "@{} = {} {} {}", g.name, linkage, type_str(m, &g.ty), init);
        }
    }

    for f in m.funcs.iter().filter(|f| f.is_declaration()) {
        out.push('\n');
        let _ = writeln!(out, "declare {} @{}({})", type_str(m, &f.ret), f.name, sig_str(m, f));
    }

    for f in m.funcs.iter().filter(|f| !f.is_declaration()) {
        out.push('\n');
        let params: Vec<String> = f
            .params
            .iter()
            .enumerate()
            .map(|(i, p)| format!("{} %v{}", type_str(m, p), i))
            .collect();
        let _ = writeln!(
            out,
            "define {} @{}({}) {{",
            type_str(m, &f.ret),
            f.name,
            params.join(", ")
        );
        for block in &f.blocks {
            let _ = writeln!(out, "{}:", block.name);
            for data in &block.insts {
                let line = inst_str(m, &data.inst);
                match (&m.debug, &data.loc) {
                    (Some(_), Some(loc)) => {
                        let _ = writeln!(out, "  {line}  ; {loc}");
                    }
                    _ => {
                        let _ = writeln!(out, "  {line}");
                    }
                }
            }
            match &block.term {
                Some(term) => {
                    let _ = writeln!(out, "  {}", term_str(m, f, term));
                }
                None => {
                    let _ = writeln!(out, "  ; <unterminated>");
                }
            }
        }
        let _ = writeln!(out, "}}");
    }
    out
}

fn sig_str(m: &Module, f: &Function) -> String {
    let mut parts: Vec<String> = f.params.iter().map(|p| type_str(m, p)).collect();
    if f.variadic {
        parts.push("...".to_string());
    }
    parts.join(", ")
}

/// Render a type.
pub fn type_str(m: &Module, t: &SsaType) -> String {
    match t {
        SsaType::Void => "void".to_string(),
        SsaType::Int(bits) => format!("i{bits}"),
        SsaType::Double => "double".to_string(),
        SsaType::Ptr => "ptr".to_string(),
        SsaType::Struct(id) => format!("%{}", m.struct_def(*id).name),
        SsaType::Array { elem, len } => format!("[{} x {}]", len, type_str(m, elem)),
    }
}

fn zero_str(t: &SsaType) -> String {
    match t {
        SsaType::Int(_) => "0".to_string(),
        SsaType::Double => "0.0".to_string(),
        SsaType::Ptr => "null".to_string(),
        SsaType::Void => "void".to_string(),
        SsaType::Struct(_) | SsaType::Array { .. } => "zeroinitializer".to_string(),
    }
}

fn double_str(d: f64) -> String {
    if d == d.trunc() && d.is_finite() {
        format!("{d:.1}")
    } else {
        format!("{d}")
    }
}

fn operand_str(m: &Module, op: &Operand) -> String {
    match op {
        Operand::Value(v) => format!("%v{}", v.0),
        Operand::ConstInt { value, .. } => format!("{value}"),
        Operand::ConstDouble(d) => double_str(*d),
        Operand::ConstBool(b) => if *b { "true" } else { "false" }.to_string(),
        Operand::ConstStr { data, len } => {
            format!("{{ ptr @{}, i64 {} }}", m.global(*data).name, len)
        }
        Operand::Zero(ty) => zero_str(ty),
        Operand::Global(g) => format!("@{}", m.global(*g).name),
        Operand::FuncRef(f) => format!("@{}", m.func(*f).name),
    }
}

/// Best-effort operand type, used for variadic call arguments where the
/// callee signature runs out.
fn operand_type_str(m: &Module, op: &Operand) -> String {
    match op {
        Operand::ConstInt { ty, .. } => type_str(m, ty),
        Operand::ConstDouble(_) => "double".to_string(),
        Operand::ConstBool(_) => "i1".to_string(),
        Operand::Zero(ty) => type_str(m, ty),
        Operand::ConstStr { .. } | Operand::Global(_) | Operand::FuncRef(_) => "ptr".to_string(),
        Operand::Value(_) => "i64".to_string(),
    }
}

fn bin_op_str(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "add",
        BinOp::Sub => "sub",
        BinOp::Mul => "mul",
        BinOp::SDiv => "sdiv",
        BinOp::UDiv => "udiv",
        BinOp::SRem => "srem",
        BinOp::URem => "urem",
        BinOp::And => "and",
        BinOp::Or => "or",
        BinOp::Xor => "xor",
        BinOp::Shl => "shl",
        BinOp::LShr => "lshr",
        BinOp::AShr => "ashr",
        BinOp::FAdd => "fadd",
        BinOp::FSub => "fsub",
        BinOp::FMul => "fmul",
        BinOp::FDiv => "fdiv",
        BinOp::FRem => "frem",
    }
}

fn int_pred_str(p: IntPred) -> &'static str {
    match p {
        IntPred::Eq => "eq",
        IntPred::Ne => "ne",
        IntPred::Slt => "slt",
        IntPred::Sle => "sle",
        IntPred::Sgt => "sgt",
        IntPred::Sge => "sge",
        IntPred::Ult => "ult",
        IntPred::Ule => "ule",
        IntPred::Ugt => "ugt",
        IntPred::Uge => "uge",
    }
}

fn float_pred_str(p: FloatPred) -> &'static str {
    match p {
        FloatPred::Oeq => "oeq",
        FloatPred::One => "one",
        FloatPred::Olt => "olt",
        FloatPred::Ole => "ole",
        FloatPred::Ogt => "ogt",
        FloatPred::Oge => "oge",
    }
}

fn cast_op_str(op: CastOp) -> &'static str {
    match op {
        CastOp::Zext => "zext",
        CastOp::Sext => "sext",
        CastOp::Trunc => "trunc",
    }
}

fn inst_str(m: &Module, inst: &Inst) -> String {
    match inst {
        Inst::Alloca { res, ty } => format!("%v{} = alloca {}", res.0, type_str(m, ty)),
        Inst::Load { res, ty, ptr } => format!(
            "%v{} = load {}, ptr {}",
            res.0,
            type_str(m, ty),
            operand_str(m, ptr)
        ),
        Inst::Store { ty, value, ptr } => format!(
            "store {} {}, ptr {}",
            type_str(m, ty),
            operand_str(m, value),
            operand_str(m, ptr)
        ),
        Inst::FieldPtr {
            res,
            strukt,
            base,
            index,
        } => format!(
            "%v{} = getelementptr %{}, ptr {}, i32 0, i32 {}",
            res.0,
            m.struct_def(*strukt).name,
            operand_str(m, base),
            index
        ),
        Inst::ElemPtr {
            res,
            elem,
            base,
            index,
        } => format!(
            "%v{} = getelementptr {}, ptr {}, i64 {}",
            res.0,
            type_str(m, elem),
            operand_str(m, base),
            operand_str(m, index)
        ),
        Inst::Bin {
            res,
            op,
            ty,
            lhs,
            rhs,
        } => format!(
            "%v{} = {} {} {}, {}",
            res.0,
            bin_op_str(*op),
            type_str(m, ty),
            operand_str(m, lhs),
            operand_str(m, rhs)
        ),
        Inst::ICmp {
            res,
            pred,
            ty,
            lhs,
            rhs,
        } => format!(
            "%v{} = icmp {} {} {}, {}",
            res.0,
            int_pred_str(*pred),
            type_str(m, ty),
            operand_str(m, lhs),
            operand_str(m, rhs)
        ),
        Inst::FCmp { res, pred, lhs, rhs } => format!(
            "%v{} = fcmp {} double {}, {}",
            res.0,
            float_pred_str(*pred),
            operand_str(m, lhs),
            operand_str(m, rhs)
        ),
        Inst::Cast {
            res,
            op,
            val,
            from,
            to,
        } => format!(
            "%v{} = {} {} {} to {}",
            res.0,
            cast_op_str(*op),
            type_str(m, from),
            operand_str(m, val),
            type_str(m, to)
        ),
        Inst::Select {
            res,
            cond,
            ty,
            then_v,
            else_v,
        } => format!(
            "%v{} = select i1 {}, {} {}, {} {}",
            res.0,
            operand_str(m, cond),
            type_str(m, ty),
            operand_str(m, then_v),
            type_str(m, ty),
            operand_str(m, else_v)
        ),
        Inst::Call { res, func, args } => {
            let callee = m.func(*func);
            let rendered: Vec<String> = args
                .iter()
                .enumerate()
                .map(|(i, a)| {
                    let ty = callee
                        .params
                        .get(i)
                        .map(|p| type_str(m, p))
                        .unwrap_or_else(|| operand_type_str(m, a));
                    format!("{} {}", ty, operand_str(m, a))
                })
                .collect();
            match res {
                Some(v) => format!(
                    "%v{} = call {} @{}({})",
                    v.0,
                    type_str(m, &callee.ret),
                    callee.name,
                    rendered.join(", ")
                ),
                None => format!("call void @{}({})", callee.name, rendered.join(", ")),
            }
        }
    }
}

fn term_str(m: &Module, f: &Function, term: &Term) -> String {
    match term {
        Term::Br(b) => format!("br label %{}", f.block(*b).name),
        Term::CondBr {
            cond,
            then_blk,
            else_blk,
        } => format!(
            "br i1 {}, label %{}, label %{}",
            operand_str(m, cond),
            f.block(*then_blk).name,
            f.block(*else_blk).name
        ),
        Term::Ret(None) => "ret void".to_string(),
        Term::Ret(Some((ty, v))) => format!("ret {} {}", type_str(m, ty), operand_str(m, v)),
        Term::Unreachable => "unreachable".to_string(),
    }
}

fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'"' | b'\\' => {
                let _ = write!(out, "\\{b:02X}");
            }
            0x20..=0x7e => out.push(b as char),
            _ => {
                let _ = write!(out, "\\{b:02X}");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::ir::{GlobalInit, Operand, ValueId};

    #[test]
    fn prints_a_minimal_function() {
        let mut b = Builder::new(Module::new("main"));
        let f = b.declare_function(
            "add_i32_i32",
            vec![SsaType::Int(32), SsaType::Int(32)],
            SsaType::Int(32),
            false,
        );
        let entry = b.create_block(f, "entry");
        b.position_at_end(f, entry);
        let sum = b
            .bin(
                BinOp::Add,
                SsaType::Int(32),
                Operand::Value(ValueId(0)),
                Operand::Value(ValueId(1)),
            )
            .unwrap();
        b.ret(Some((SsaType::Int(32), Operand::Value(sum))));

        let text = print_module(&b.finish());
        insta::assert_snapshot!(text, @r#"
        ; ModuleID = 'main'

        define i32 @add_i32_i32(i32 %v0, i32 %v1) {
        entry:
          %v2 = add i32 %v0, %v1
          ret i32 %v2
        }
        "#);
    }

    #[test]
    fn prints_structs_globals_and_declarations() {
        let mut m = Module::new("m");
        let s = m.add_struct("Object_0", vec![SsaType::Int(32), SsaType::Int(32)]);
        m.add_global(
            ".str.0",
            SsaType::Array {
                elem: Box::new(SsaType::Int(8)),
                len: 3,
            },
            GlobalInit::Bytes(b"hi\0".to_vec()),
            true,
        );
        m.add_global("counter", SsaType::Struct(s), GlobalInit::Zero, false);
        m.declare_function("printf", vec![SsaType::Ptr], SsaType::Int(32), true);

        let text = print_module(&m);
        assert!(text.contains("%Object_0 = type { i32, i32 }"));
        assert!(text.contains("@.str.0 = constant [3 x i8] c\"hi\\00\""));
        assert!(text.contains("@counter = global %Object_0 zeroinitializer"));
        assert!(text.contains("declare i32 @printf(ptr, ...)"));
    }

    #[test]
    fn variadic_call_extras_use_operand_types() {
        let mut b = Builder::new(Module::new("m"));
        let printf = b.declare_function("printf", vec![SsaType::Ptr], SsaType::Int(32), true);
        let f = b.declare_function("main", vec![], SsaType::Int(32), false);
        let entry = b.create_block(f, "entry");
        b.position_at_end(f, entry);
        b.call(
            printf,
            vec![
                Operand::Zero(SsaType::Ptr),
                Operand::ConstInt {
                    value: 42,
                    ty: SsaType::Int(32),
                },
            ],
        );
        b.ret(Some((
            SsaType::Int(32),
            Operand::ConstInt {
                value: 0,
                ty: SsaType::Int(32),
            },
        )));

        let text = print_module(&b.finish());
        assert!(text.contains("call i32 @printf(ptr null, i32 42)"));
    }

    #[test]
    fn debug_mode_appends_locations() {
        use sable_common::SourceLoc;

        let mut module = Module::new("m");
        module.debug = Some(crate::ir::DebugInfo {
            file: "main.sb".to_string(),
            producer: "sablec".to_string(),
        });
        let mut b = Builder::new(module);
        let f = b.declare_function("f", vec![], SsaType::Void, false);
        let entry = b.create_block(f, "entry");
        b.position_at_end(f, entry);
        b.set_loc(Some(SourceLoc::new("main.sb", 3, 1)));
        b.alloca(SsaType::Int(32));
        b.ret(None);

        let text = print_module(&b.finish());
        assert!(text.contains("; producer: sablec"));
        assert!(text.contains("%v0 = alloca i32  ; main.sb:3:1"));
    }
}
