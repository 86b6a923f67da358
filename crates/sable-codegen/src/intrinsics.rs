//! Intrinsic trait-method emission.
//!
//! Every compiler-provided trait method maps to one concrete
//! instruction sequence. Signedness of divisions, remainders,
//! right-shifts, and comparisons is selected from the operand's type
//! here; the SSA opcodes carry it explicitly. String operations that
//! need allocation call into runtime symbols declared on first use.

use sable_common::SourceLoc;
use sable_common::diag::codes;
use sable_ssa::{BinOp, CastOp, FloatPred, FuncId, GlobalInit, IntPred, Operand, SsaType, ValueId};
use sable_types::{CmpKind, Intrinsic, MethodKind, TypeId, TypeRegistry};

use crate::Codegen;

impl<'a> Codegen<'a> {
    /// Declare (or fetch) a runtime support function.
    pub(crate) fn runtime_fn(&mut self, name: &str, params: Vec<SsaType>, ret: SsaType) -> FuncId {
        self.b.declare_function(name, params, ret, false)
    }

    pub(crate) fn str_type(&self) -> SsaType {
        SsaType::Struct(self.str_struct.expect("str struct materialized"))
    }

    /// Intern a string literal: global bytes (null-terminated) plus a
    /// `{ptr, len}` constant.
    pub(crate) fn str_const(&mut self, s: &str) -> Operand {
        let data = match self.str_lits.get(s) {
            Some(&g) => g,
            None => {
                let mut bytes = s.as_bytes().to_vec();
                bytes.push(0);
                let name = format!(".str.{}", self.str_count);
                self.str_count += 1;
                let g = self.b.add_global(
                    name,
                    SsaType::Array {
                        elem: Box::new(SsaType::Int(8)),
                        len: bytes.len() as u32,
                    },
                    GlobalInit::Bytes(bytes),
                    true,
                );
                self.str_lits.insert(s.to_string(), g);
                g
            }
        };
        Operand::ConstStr {
            data,
            len: s.len() as u64,
        }
    }

    /// Spill a `str` value into a stack slot so its fields can be
    /// addressed.
    pub(crate) fn spill_str(&mut self, v: Operand) -> Option<ValueId> {
        let ty = self.str_type();
        let slot = self.b.alloca(ty.clone())?;
        self.b.store(ty, v, Operand::Value(slot))?;
        Some(slot)
    }

    // ── Binary intrinsics ────────────────────────────────────────────

    /// Emit a binary trait-method intrinsic. `operand_ty` is the left
    /// operand's (alias-resolved) Sable type; it decides widths and
    /// signedness.
    pub(crate) fn emit_binary_intrinsic(
        &mut self,
        intr: Intrinsic,
        operand_ty: TypeId,
        lhs: Operand,
        rhs: Operand,
    ) -> Option<Operand> {
        let signed = self.is_signed_int(operand_ty);
        let ty = self.lowered_type(operand_ty);
        let op = match intr {
            Intrinsic::IAdd => BinOp::Add,
            Intrinsic::ISub => BinOp::Sub,
            Intrinsic::IMul => BinOp::Mul,
            Intrinsic::IDiv => {
                if signed {
                    BinOp::SDiv
                } else {
                    BinOp::UDiv
                }
            }
            Intrinsic::IRem => {
                if signed {
                    BinOp::SRem
                } else {
                    BinOp::URem
                }
            }
            Intrinsic::IAnd => BinOp::And,
            Intrinsic::IOr => BinOp::Or,
            Intrinsic::IXor => BinOp::Xor,
            Intrinsic::IShl => BinOp::Shl,
            Intrinsic::IShr => {
                if signed {
                    BinOp::AShr
                } else {
                    BinOp::LShr
                }
            }
            Intrinsic::FAdd => BinOp::FAdd,
            Intrinsic::FSub => BinOp::FSub,
            Intrinsic::FMul => BinOp::FMul,
            Intrinsic::FDiv => BinOp::FDiv,
            Intrinsic::FRem => BinOp::FRem,
            Intrinsic::ICmp(k) => {
                let v = self.b.icmp(int_pred(k, signed), ty, lhs, rhs)?;
                return Some(Operand::Value(v));
            }
            Intrinsic::FCmp(k) => {
                let v = self.b.fcmp(float_pred(k), lhs, rhs)?;
                return Some(Operand::Value(v));
            }
            Intrinsic::StrConcat => {
                let st = self.str_type();
                let f = self.runtime_fn("sable_str_concat", vec![st.clone(), st.clone()], st);
                let v = self.b.call(f, vec![lhs, rhs])?;
                return v.map(Operand::Value);
            }
            Intrinsic::StrEq | Intrinsic::StrNe => {
                let st = self.str_type();
                let f =
                    self.runtime_fn("sable_str_eq", vec![st.clone(), st], SsaType::Int(1));
                let eq = self.b.call(f, vec![lhs, rhs])??;
                if intr == Intrinsic::StrEq {
                    return Some(Operand::Value(eq));
                }
                let v = self.b.bin(
                    BinOp::Xor,
                    SsaType::Int(1),
                    Operand::Value(eq),
                    Operand::ConstBool(true),
                )?;
                return Some(Operand::Value(v));
            }
            Intrinsic::EnumEq | Intrinsic::EnumNe => {
                let lt = self.enum_tag(operand_ty, lhs)?;
                let rt = self.enum_tag(operand_ty, rhs)?;
                let pred = if intr == Intrinsic::EnumEq {
                    IntPred::Eq
                } else {
                    IntPred::Ne
                };
                let v = self.b.icmp(
                    pred,
                    SsaType::Int(32),
                    Operand::Value(lt),
                    Operand::Value(rt),
                )?;
                return Some(Operand::Value(v));
            }
            other => {
                // Not a binary emission strategy.
                debug_assert!(false, "non-binary intrinsic {other:?}");
                return None;
            }
        };
        let v = self.b.bin(op, ty, lhs, rhs)?;
        Some(Operand::Value(v))
    }

    // ── Unary intrinsics ─────────────────────────────────────────────

    pub(crate) fn emit_unary_intrinsic(
        &mut self,
        intr: Intrinsic,
        operand_ty: TypeId,
        v: Operand,
    ) -> Option<Operand> {
        let out = match intr {
            Intrinsic::BoolNot => self.b.bin(
                BinOp::Xor,
                SsaType::Int(1),
                v,
                Operand::ConstBool(true),
            )?,
            Intrinsic::INeg => {
                let ty = self.lowered_type(operand_ty);
                self.b.bin(
                    BinOp::Sub,
                    ty.clone(),
                    Operand::ConstInt { value: 0, ty },
                    v,
                )?
            }
            Intrinsic::FNeg => self.b.bin(
                BinOp::FSub,
                SsaType::Double,
                Operand::ConstDouble(0.0),
                v,
            )?,
            other => {
                debug_assert!(false, "non-unary intrinsic {other:?}");
                return None;
            }
        };
        Some(Operand::Value(out))
    }

    // ── Receiver intrinsics (methods and properties) ─────────────────

    /// Emit a no-argument receiver intrinsic: `len`, `to_c_str`,
    /// `to_string` for enums.
    pub(crate) fn emit_receiver_intrinsic(
        &mut self,
        intr: Intrinsic,
        recv_ty: TypeId,
        recv: Operand,
    ) -> Option<Operand> {
        match intr {
            Intrinsic::ArrayLen => {
                let s = self.struct_of(recv_ty)?;
                let len_ptr = self.b.field_ptr(s, recv, 1)?;
                let len = self.b.load(SsaType::Int(64), Operand::Value(len_ptr))?;
                // Array length is u32 at the language level.
                let v = self.b.cast(
                    CastOp::Trunc,
                    Operand::Value(len),
                    SsaType::Int(64),
                    SsaType::Int(32),
                )?;
                Some(Operand::Value(v))
            }
            Intrinsic::StrLen => {
                let slot = self.spill_str(recv)?;
                let s = self.str_struct.expect("str struct");
                let len_ptr = self.b.field_ptr(s, Operand::Value(slot), 1)?;
                let v = self.b.load(SsaType::Int(64), Operand::Value(len_ptr))?;
                Some(Operand::Value(v))
            }
            Intrinsic::StrToCStr => {
                let slot = self.spill_str(recv)?;
                let s = self.str_struct.expect("str struct");
                let data_ptr = self.b.field_ptr(s, Operand::Value(slot), 0)?;
                let v = self.b.load(SsaType::Ptr, Operand::Value(data_ptr))?;
                Some(Operand::Value(v))
            }
            Intrinsic::EnumToString => self.emit_enum_to_string(recv_ty, recv),
            other => {
                debug_assert!(false, "non-receiver intrinsic {other:?}");
                None
            }
        }
    }

    /// Load an enum value's discriminant.
    pub(crate) fn enum_tag(&mut self, enum_ty: TypeId, v: Operand) -> Option<ValueId> {
        let s = self.struct_of(enum_ty)?;
        let tag_ptr = self.b.field_ptr(s, v, 0)?;
        self.b.load(SsaType::Int(32), Operand::Value(tag_ptr))
    }

    /// Enum Display: a select chain over the variant names.
    fn emit_enum_to_string(&mut self, enum_ty: TypeId, v: Operand) -> Option<Operand> {
        let names: Vec<String> = self
            .types
            .enum_variants(self.types.resolve_alias(enum_ty))?
            .iter()
            .map(|var| var.name.clone())
            .collect();
        let tag = self.enum_tag(enum_ty, v)?;
        let st = self.str_type();
        let mut acc = self.str_const(names.last()?);
        for (i, name) in names.iter().enumerate().rev().skip(1) {
            let name_const = self.str_const(name);
            let cond = self.b.icmp(
                IntPred::Eq,
                SsaType::Int(32),
                Operand::Value(tag),
                Operand::ConstInt {
                    value: i as i64,
                    ty: SsaType::Int(32),
                },
            )?;
            let sel = self
                .b
                .select(Operand::Value(cond), st.clone(), name_const, acc)?;
            acc = Operand::Value(sel);
        }
        Some(acc)
    }

    /// Stringify a value through its Display impl: an external runtime
    /// symbol for primitives, the select chain for enums.
    pub(crate) fn emit_display(
        &mut self,
        val_ty: TypeId,
        val: Operand,
        loc: &SourceLoc,
    ) -> Option<Operand> {
        let resolved = self.types.resolve_alias(val_ty);
        let display = self.traits.trait_id("Display")?;
        let Some(imp) = self.traits.find_impl(display, resolved, &[], self.types) else {
            let name = self.types.name(resolved).to_string();
            self.ce(
                codes::CE_MISSING_TRAIT_IMPL,
                loc.clone(),
                format!("no impl of 'Display' for '{name}' at lowering"),
            );
            return None;
        };
        match imp.method("to_string")?.clone() {
            MethodKind::External(sym) => {
                let pty = self.lowered_type(resolved);
                let st = self.str_type();
                let f = self.runtime_fn(&sym, vec![pty], st);
                let out = self.b.call(f, vec![val])?;
                out.map(Operand::Value)
            }
            MethodKind::Intrinsic(intr) => self.emit_receiver_intrinsic(intr, resolved, val),
            MethodKind::Function(_) => None,
        }
    }

    /// Compiler-known From conversion applied at call boundaries:
    /// `str -> c_str` and integer zero-extension to `usize`.
    pub(crate) fn emit_from_conversion(
        &mut self,
        target: TypeId,
        source: TypeId,
        v: Operand,
    ) -> Option<Operand> {
        let target = self.types.resolve_alias(target);
        let source = self.types.resolve_alias(source);
        if target == source {
            return Some(v);
        }
        if target == self.types.resolve_alias(TypeRegistry::C_STR)
            && source == TypeRegistry::STR
        {
            return self.emit_receiver_intrinsic(Intrinsic::StrToCStr, source, v);
        }
        let (SsaType::Int(to_bits), SsaType::Int(from_bits)) =
            (self.lowered_type(target), self.lowered_type(source))
        else {
            return Some(v);
        };
        if from_bits == to_bits {
            return Some(v);
        }
        let op = if from_bits < to_bits {
            CastOp::Zext
        } else {
            CastOp::Trunc
        };
        let out = self.b.cast(
            op,
            v,
            SsaType::Int(from_bits),
            SsaType::Int(to_bits),
        )?;
        Some(Operand::Value(out))
    }
}

fn int_pred(k: CmpKind, signed: bool) -> IntPred {
    match (k, signed) {
        (CmpKind::Eq, _) => IntPred::Eq,
        (CmpKind::Ne, _) => IntPred::Ne,
        (CmpKind::Lt, true) => IntPred::Slt,
        (CmpKind::Le, true) => IntPred::Sle,
        (CmpKind::Gt, true) => IntPred::Sgt,
        (CmpKind::Ge, true) => IntPred::Sge,
        (CmpKind::Lt, false) => IntPred::Ult,
        (CmpKind::Le, false) => IntPred::Ule,
        (CmpKind::Gt, false) => IntPred::Ugt,
        (CmpKind::Ge, false) => IntPred::Uge,
    }
}

fn float_pred(k: CmpKind) -> FloatPred {
    match k {
        CmpKind::Eq => FloatPred::Oeq,
        CmpKind::Ne => FloatPred::One,
        CmpKind::Lt => FloatPred::Olt,
        CmpKind::Le => FloatPred::Ole,
        CmpKind::Gt => FloatPred::Ogt,
        CmpKind::Ge => FloatPred::Oge,
    }
}
