//! Statement and expression lowering.
//!
//! Expressions lower to operands: scalars by value, `str` as a
//! two-field struct value, objects/enums/arrays as pointers into stack
//! or global memory. `lower_addr` produces the address of an lvalue;
//! assignment is an address plus a store. A failed lowering returns
//! `None` and the surrounding statement is skipped -- the `CE*`
//! diagnostic has already been recorded and the specialization is
//! abandoned by the caller.

use sable_ast::{NodeKind, SymbolKind};
use sable_common::diag::codes;
use sable_common::NodeId;
use sable_ssa::{CastOp, Operand, SsaType};
use sable_types::{AssignOp, BinaryOp, Intrinsic, MethodKind, TypeId, TypeKind, TypeRegistry};

use crate::Codegen;

impl<'a> Codegen<'a> {
    // ── Statements ───────────────────────────────────────────────────

    pub(crate) fn lower_stmt(&mut self, id: NodeId) {
        let loc = self.ast.loc(id);
        self.set_debug_loc(&loc);
        match self.ast.kind(id).clone() {
            NodeKind::FunctionDecl { .. }
            | NodeKind::StructDecl { .. }
            | NodeKind::EnumDecl { .. } => {}
            NodeKind::VarDecl { init, .. } => self.lower_var_decl(id, init),
            NodeKind::ExprStmt { expr } => {
                self.lower_expr(expr);
            }
            NodeKind::Return { value } => self.lower_return(value),
            NodeKind::Break => {
                if let Some(&(_, break_blk)) = self.loop_stack.last() {
                    self.b.br(break_blk);
                }
            }
            NodeKind::Continue => {
                if let Some(&(cont_blk, _)) = self.loop_stack.last() {
                    self.b.br(cont_blk);
                }
            }
            NodeKind::Block { stmts } => self.lower_stmts(&stmts),
            NodeKind::If {
                cond,
                then_blk,
                else_blk,
            } => self.lower_if(cond, then_blk, else_blk),
            NodeKind::While { cond, body } => self.lower_while(cond, body),
            NodeKind::For {
                init,
                cond,
                update,
                body,
            } => self.lower_for(init, cond, update, body),
            _ => {
                self.lower_expr(id);
            }
        }
    }

    /// Lower a statement sequence; a terminator short-circuits the rest
    /// of the sequence.
    pub(crate) fn lower_stmts(&mut self, stmts: &[NodeId]) {
        for &stmt in stmts {
            if self.failed || self.b.is_terminated() {
                break;
            }
            self.lower_stmt(stmt);
        }
    }

    fn lower_var_decl(&mut self, id: NodeId, init: Option<NodeId>) {
        let Some(sym) = self.ast.node(id).symbol else {
            return;
        };
        let ty = self.storage_type(self.ast.ty(id));

        if let Some(&g) = self.globals.get(&sym) {
            // Module-scope variable: the global already exists; a
            // constant initializer was materialized with it, anything
            // else stores here, in source order.
            if let Some(init) = init {
                let constant = matches!(
                    self.ast.kind(init),
                    NodeKind::NumberLit { .. } | NodeKind::BoolLit { .. }
                );
                if !constant {
                    if let Some(v) = self.lower_value(init) {
                        self.b.store(ty, v, Operand::Global(g));
                    }
                }
            }
            return;
        }

        let Some(slot) = self.b.alloca(ty.clone()) else {
            return;
        };
        self.locals.insert(sym, slot);
        if let Some(init) = init {
            if let Some(v) = self.lower_value(init) {
                self.b.store(ty, v, Operand::Value(slot));
            }
        }
    }

    fn lower_return(&mut self, value: Option<NodeId>) {
        match (value, self.current_ret.clone()) {
            (_, SsaType::Void) => {
                self.b.ret(None);
            }
            (Some(v), ret_ty) => {
                if let Some(op) = self.lower_value(v) {
                    self.b.ret(Some((ret_ty, op)));
                }
            }
            (None, ret_ty) => {
                self.b.ret(Some((ret_ty.clone(), Operand::Zero(ret_ty))));
            }
        }
    }

    fn lower_if(&mut self, cond: NodeId, then_blk: NodeId, else_blk: Option<NodeId>) {
        let Some(c) = self.lower_value(cond) else {
            return;
        };
        let Some(func) = self.b.current_func() else {
            return;
        };
        let then_bb = self.b.create_block(func, "then");
        let merge_bb = self.b.create_block(func, "endif");
        let else_bb = else_blk.map(|_| self.b.create_block(func, "else"));

        self.b.cond_br(c, then_bb, else_bb.unwrap_or(merge_bb));

        self.b.position_at_end(func, then_bb);
        self.lower_block_node(then_blk);
        if !self.b.is_terminated() {
            self.b.br(merge_bb);
        }

        if let (Some(e), Some(else_bb)) = (else_blk, else_bb) {
            self.b.position_at_end(func, else_bb);
            self.lower_block_node(e);
            if !self.b.is_terminated() {
                self.b.br(merge_bb);
            }
        }

        self.b.position_at_end(func, merge_bb);
    }

    fn lower_while(&mut self, cond: NodeId, body: NodeId) {
        let Some(func) = self.b.current_func() else {
            return;
        };
        let cond_bb = self.b.create_block(func, "loop.cond");
        let body_bb = self.b.create_block(func, "loop.body");
        let merge_bb = self.b.create_block(func, "loop.end");

        self.b.br(cond_bb);
        self.b.position_at_end(func, cond_bb);
        let Some(c) = self.lower_value(cond) else {
            return;
        };
        self.b.cond_br(c, body_bb, merge_bb);

        self.b.position_at_end(func, body_bb);
        self.loop_stack.push((cond_bb, merge_bb));
        self.lower_block_node(body);
        self.loop_stack.pop();
        if !self.b.is_terminated() {
            self.b.br(cond_bb);
        }

        self.b.position_at_end(func, merge_bb);
    }

    fn lower_for(
        &mut self,
        init: Option<NodeId>,
        cond: Option<NodeId>,
        update: Option<NodeId>,
        body: NodeId,
    ) {
        let Some(func) = self.b.current_func() else {
            return;
        };
        if let Some(i) = init {
            self.lower_stmt(i);
        }
        let cond_bb = self.b.create_block(func, "for.cond");
        let body_bb = self.b.create_block(func, "for.body");
        let update_bb = self.b.create_block(func, "for.step");
        let merge_bb = self.b.create_block(func, "for.end");

        self.b.br(cond_bb);
        self.b.position_at_end(func, cond_bb);
        let c = match cond {
            Some(c) => match self.lower_value(c) {
                Some(v) => v,
                None => return,
            },
            None => Operand::ConstBool(true),
        };
        self.b.cond_br(c, body_bb, merge_bb);

        self.b.position_at_end(func, body_bb);
        self.loop_stack.push((update_bb, merge_bb));
        self.lower_block_node(body);
        self.loop_stack.pop();
        if !self.b.is_terminated() {
            self.b.br(update_bb);
        }

        self.b.position_at_end(func, update_bb);
        if let Some(u) = update {
            self.lower_expr(u);
        }
        self.b.br(cond_bb);

        self.b.position_at_end(func, merge_bb);
    }

    fn lower_block_node(&mut self, id: NodeId) {
        match self.ast.kind(id) {
            NodeKind::Block { stmts } => {
                let stmts = stmts.clone();
                self.lower_stmts(&stmts);
            }
            _ => self.lower_stmt(id),
        }
    }

    // ── Expressions ──────────────────────────────────────────────────

    /// Lower an expression to its value operand.
    pub(crate) fn lower_expr(&mut self, id: NodeId) -> Option<Operand> {
        if self.failed {
            return None;
        }
        let loc = self.ast.loc(id);
        self.set_debug_loc(&loc);
        match self.ast.kind(id).clone() {
            NodeKind::NumberLit { value, .. } => {
                let ty = self.ast.ty(id);
                if self.is_double(ty) {
                    Some(Operand::ConstDouble(value))
                } else {
                    Some(Operand::ConstInt {
                        value: value as i64,
                        ty: self.lowered_type(ty),
                    })
                }
            }
            NodeKind::BoolLit { value } => Some(Operand::ConstBool(value)),
            NodeKind::StringLit { value } => Some(self.str_const(&value)),
            NodeKind::Ident { .. } => self.lower_ident(id),
            NodeKind::ObjectLit { props } => self.lower_object_lit(id, &props),
            NodeKind::ArrayLit { elems } => self.lower_array_lit(id, &elems),
            NodeKind::Binary { op, lhs, rhs } => self.lower_binary(id, op, lhs, rhs),
            NodeKind::Unary { operand, .. } => self.lower_unary(id, operand),
            NodeKind::Assign { target, value } => self.lower_assign(target, value),
            NodeKind::CompoundAssign { op, target, value } => {
                self.lower_compound_assign(id, op, target, value)
            }
            NodeKind::IncDec {
                increment,
                prefix,
                target,
            } => self.lower_incdec(id, increment, prefix, target),
            NodeKind::Call { callee, args } => self.lower_call(id, callee, &args),
            NodeKind::Member { object, property } => self.lower_member(id, object, &property),
            NodeKind::Index { object, index } => self.lower_index(id, object, index),
            NodeKind::IsPattern {
                value, bindings, ..
            } => self.lower_is_pattern(id, value, &bindings),
            NodeKind::PatternBinding { .. } => self.lower_ident(id),
            _ => None,
        }
    }

    /// Lower an expression and strip one level of ref: scalar refs load
    /// their target, refs to memory-shaped types are already the usable
    /// pointer.
    pub(crate) fn lower_value(&mut self, id: NodeId) -> Option<Operand> {
        let v = self.lower_expr(id)?;
        let t = self.types.resolve_alias(self.ast.ty(id));
        if let TypeKind::Ref { target, .. } = self.types.kind(t) {
            let target = *target;
            let lowered = self.storage_type(target);
            if lowered == SsaType::Ptr {
                return Some(v);
            }
            let loaded = self.b.load(lowered, v)?;
            return Some(Operand::Value(loaded));
        }
        Some(v)
    }

    fn lower_ident(&mut self, id: NodeId) -> Option<Operand> {
        let loc = self.ast.loc(id);
        let Some(sym) = self.ast.node(id).symbol else {
            self.ce(
                codes::JE_INTERNAL,
                loc,
                "internal error: unresolved identifier at lowering".to_string(),
            );
            return None;
        };
        let symbol = self.symbols.symbol(sym);
        if symbol.kind == SymbolKind::Function {
            // A function used as a value; calls through the binding are
            // resolved statically at the call site.
            let ft = symbol.ty;
            if let Some(f) = self
                .types
                .function(ft)
                .filter(|f| !f.specializations.is_empty())
                .and_then(|f| self.b.get_function(&f.specializations[0].mangled_name))
            {
                return Some(Operand::FuncRef(f));
            }
            return Some(Operand::Zero(SsaType::Ptr));
        }
        let ty = self.storage_type(symbol.ty);
        if let Some(&slot) = self.locals.get(&sym) {
            let v = self.b.load(ty, Operand::Value(slot))?;
            return Some(Operand::Value(v));
        }
        if let Some(&g) = self.globals.get(&sym) {
            let v = self.b.load(ty, Operand::Global(g))?;
            return Some(Operand::Value(v));
        }
        let name = symbol.name.clone();
        self.ce(
            codes::JE_INTERNAL,
            loc,
            format!("internal error: no storage for '{name}'"),
        );
        None
    }

    /// The address of an lvalue.
    fn lower_addr(&mut self, id: NodeId) -> Option<Operand> {
        let loc = self.ast.loc(id);
        match self.ast.kind(id).clone() {
            NodeKind::Ident { .. } | NodeKind::PatternBinding { .. } => {
                let sym = self.ast.node(id).symbol?;
                if let Some(&slot) = self.locals.get(&sym) {
                    return Some(Operand::Value(slot));
                }
                if let Some(&g) = self.globals.get(&sym) {
                    return Some(Operand::Global(g));
                }
                None
            }
            NodeKind::Member { object, .. } => {
                // Namespace members carry the member symbol directly.
                if let Some(sym) = self.ast.node(id).symbol {
                    if let Some(&slot) = self.locals.get(&sym) {
                        return Some(Operand::Value(slot));
                    }
                    if let Some(&g) = self.globals.get(&sym) {
                        return Some(Operand::Global(g));
                    }
                }
                let index = self.ast.node(id).prop_index?;
                let obj_ty = self.value_ty_of(object);
                let obj = self.lower_value(object)?;
                let Some(s) = self.struct_of(obj_ty) else {
                    let name = self.types.name(obj_ty).to_string();
                    self.ce(
                        codes::CE_MISSING_STRUCT_TYPE,
                        loc,
                        format!("no struct type materialized for '{name}'"),
                    );
                    return None;
                };
                let p = self.b.field_ptr(s, obj, index)?;
                Some(Operand::Value(p))
            }
            NodeKind::Index { object, index } => self.lower_elem_addr(id, object, index),
            _ => {
                self.ce(
                    codes::CE_INVALID_LVALUE,
                    loc,
                    "expression is not assignable".to_string(),
                );
                None
            }
        }
    }

    fn lower_assign(&mut self, target: NodeId, value: NodeId) -> Option<Operand> {
        let addr = self.lower_addr(target)?;
        let v = self.lower_value(value)?;
        let ty = self.storage_type(self.ast.ty(target));
        self.b.store(ty, v.clone(), addr)?;
        Some(v)
    }

    fn lower_compound_assign(
        &mut self,
        id: NodeId,
        op: AssignOp,
        target: NodeId,
        value: NodeId,
    ) -> Option<Operand> {
        let t_res = self.value_ty_of(target);
        let addr = self.lower_addr(target)?;
        let ty = self.storage_type(self.ast.ty(target));
        let cur = self.b.load(ty.clone(), addr.clone())?;
        let rhs = self.lower_value(value)?;

        let intr = self.method_intrinsic(id, op.trait_method().1)?;
        let new = self.emit_binary_intrinsic(intr, t_res, Operand::Value(cur), rhs)?;
        self.b.store(ty, new.clone(), addr)?;
        Some(new)
    }

    fn lower_incdec(
        &mut self,
        id: NodeId,
        increment: bool,
        prefix: bool,
        target: NodeId,
    ) -> Option<Operand> {
        let t_res = self.value_ty_of(target);
        let addr = self.lower_addr(target)?;
        let ty = self.storage_type(self.ast.ty(target));
        let cur = self.b.load(ty.clone(), addr.clone())?;
        let one = if self.is_double(t_res) {
            Operand::ConstDouble(1.0)
        } else {
            Operand::ConstInt {
                value: 1,
                ty: ty.clone(),
            }
        };
        let method = if increment { "add_assign" } else { "sub_assign" };
        let intr = self.method_intrinsic(id, method)?;
        let new = self.emit_binary_intrinsic(intr, t_res, Operand::Value(cur), one)?;
        self.b.store(ty, new.clone(), addr)?;
        Some(if prefix { new } else { Operand::Value(cur) })
    }

    /// The intrinsic behind the trait method recorded on a node.
    fn method_intrinsic(&mut self, id: NodeId, method: &str) -> Option<Intrinsic> {
        let loc = self.ast.loc(id);
        let Some(r) = self.ast.node(id).impl_ref else {
            self.ce(
                codes::CE_MISSING_TRAIT_IMPL,
                loc,
                "no trait impl recorded on the node at lowering".to_string(),
            );
            return None;
        };
        match self.traits.impl_by_ref(r).method(method) {
            Some(MethodKind::Intrinsic(i)) => Some(*i),
            _ => {
                self.ce(
                    codes::CE_MISSING_TRAIT_IMPL,
                    loc,
                    format!("trait method '{method}' has no intrinsic at lowering"),
                );
                None
            }
        }
    }

    /// Alias-resolved, ref-stripped type of an expression node.
    pub(crate) fn value_ty_of(&self, id: NodeId) -> TypeId {
        let t = self.types.resolve_alias(self.ast.ty(id));
        match self.types.kind(t) {
            TypeKind::Ref { target, .. } => self.types.resolve_alias(*target),
            _ => t,
        }
    }

    fn lower_binary(
        &mut self,
        id: NodeId,
        op: BinaryOp,
        lhs: NodeId,
        rhs: NodeId,
    ) -> Option<Operand> {
        let loc = self.ast.loc(id);
        let lt = self.value_ty_of(lhs);
        let rt = self.value_ty_of(rhs);

        // String concatenation stringifies the non-string side first.
        if self.ast.ty(id) == TypeRegistry::STR
            && op == BinaryOp::Add
            && (lt == TypeRegistry::STR || rt == TypeRegistry::STR)
            && lt != rt
        {
            let lv = self.lower_value(lhs)?;
            let rv = self.lower_value(rhs)?;
            let lv = if lt == TypeRegistry::STR {
                lv
            } else {
                self.emit_display(lt, lv, &loc)?
            };
            let rv = if rt == TypeRegistry::STR {
                rv
            } else {
                self.emit_display(rt, rv, &loc)?
            };
            return self.emit_binary_intrinsic(Intrinsic::StrConcat, TypeRegistry::STR, lv, rv);
        }

        let Some(r) = self.ast.node(id).impl_ref else {
            self.ce(
                codes::CE_MISSING_TRAIT_IMPL,
                loc,
                format!("no impl for operator '{op}' at lowering"),
            );
            return None;
        };
        let method = op.trait_method().1;
        let kind = self.traits.impl_by_ref(r).method(method)?.clone();
        let lv = self.lower_value(lhs)?;
        let rv = self.lower_value(rhs)?;
        // Operand lowering moved the debug cursor; the operator
        // instruction belongs to this node.
        self.set_debug_loc(&loc);
        match kind {
            MethodKind::Intrinsic(intr) => self.emit_binary_intrinsic(intr, lt, lv, rv),
            MethodKind::External(sym) => {
                let pl = self.lowered_type(lt);
                let pr = self.lowered_type(rt);
                let ret = self.lowered_type(self.ast.ty(id));
                let f = self.runtime_fn(&sym, vec![pl, pr], ret);
                let out = self.b.call(f, vec![lv, rv])?;
                out.map(Operand::Value)
            }
            MethodKind::Function(decl) => {
                let ft = self.ast.ty(decl);
                let Some(idx) = self.types.find_specialization(ft, &[lt, rt]) else {
                    let name = self.types.name(ft).to_string();
                    self.ce(
                        codes::CE_MISSING_SPECIALIZATION,
                        loc,
                        format!("no specialization of '{name}' for the call's argument types"),
                    );
                    return None;
                };
                let func = self.spec_funcs.get(&(ft, idx as u32)).copied()?;
                let out = self.b.call(func, vec![lv, rv])?;
                out.map(Operand::Value)
            }
        }
    }

    fn lower_unary(&mut self, id: NodeId, operand: NodeId) -> Option<Operand> {
        let ot = self.value_ty_of(operand);
        let op_kind = match self.ast.kind(id) {
            NodeKind::Unary { op, .. } => *op,
            _ => return None,
        };
        let method = op_kind.trait_method().1;
        let intr = self.method_intrinsic(id, method)?;
        let v = self.lower_value(operand)?;
        self.emit_unary_intrinsic(intr, ot, v)
    }

    // ── Calls ────────────────────────────────────────────────────────

    fn lower_call(&mut self, id: NodeId, callee: NodeId, args: &[NodeId]) -> Option<Operand> {
        let loc = self.ast.loc(id);

        // Specialized function call.
        if let (Some(ft), Some(idx)) = (self.ast.node(id).callee_fn, self.ast.node(id).spec_index)
        {
            return self.lower_spec_call(id, ft, idx, args);
        }

        // Enum construction.
        if let Some(vi) = self.ast.node(id).prop_index {
            let ety = self.types.resolve_alias(self.ast.ty(id));
            if self.types.enum_variants(ety).is_some() {
                return self.lower_enum_ctor(id, ety, vi, args);
            }
        }

        // Trait-method call (intrinsic or external receiver method).
        if let Some(r) = self.ast.node(id).impl_ref {
            let NodeKind::Member { object, property } = self.ast.kind(callee).clone() else {
                return None;
            };
            let recv_ty = self.value_ty_of(object);
            let recv = self.lower_value(object)?;
            let kind = self.traits.impl_by_ref(r).method(&property)?.clone();
            return match kind {
                MethodKind::Intrinsic(intr) => {
                    self.emit_receiver_intrinsic(intr, recv_ty, recv)
                }
                MethodKind::External(sym) => {
                    let pty = self.lowered_type(recv_ty);
                    let ret = self.lowered_type(self.ast.ty(id));
                    let f = self.runtime_fn(&sym, vec![pty], ret);
                    let out = self.b.call(f, vec![recv])?;
                    out.map(Operand::Value)
                }
                MethodKind::Function(_) => None,
            };
        }

        self.ce(
            codes::CE_MISSING_SPECIALIZATION,
            loc,
            "no specialization recorded for call at lowering".to_string(),
        );
        None
    }

    fn lower_spec_call(
        &mut self,
        id: NodeId,
        ft: TypeId,
        idx: u32,
        args: &[NodeId],
    ) -> Option<Operand> {
        let loc = self.ast.loc(id);
        let Some(&func) = self.spec_funcs.get(&(ft, idx)) else {
            let name = self.types.name(ft).to_string();
            self.ce(
                codes::CE_MISSING_SPECIALIZATION,
                loc,
                format!("no specialization of '{name}' for the call's argument types"),
            );
            return None;
        };
        let params = self.types.specialization(ft, idx as usize).params.clone();

        let mut lowered = Vec::with_capacity(args.len());
        for (i, &arg) in args.iter().enumerate() {
            let op = match params.get(i) {
                Some(&p) => self.lower_call_arg(arg, p)?,
                None => self.lower_variadic_extra(arg)?,
            };
            lowered.push(op);
        }
        let out = self.b.call(func, lowered)?;
        Some(out.map(Operand::Value).unwrap_or(Operand::Zero(SsaType::Void)))
    }

    /// Lower one required argument, honoring ref tolerance and the
    /// compiler-known From conversions.
    fn lower_call_arg(&mut self, arg: NodeId, param: TypeId) -> Option<Operand> {
        let p = self.types.resolve_alias(param);
        let a = self.types.resolve_alias(self.ast.ty(arg));

        if let TypeKind::Ref { .. } = self.types.kind(p) {
            if !matches!(self.types.kind(a), TypeKind::Ref { .. }) {
                // T passed where ref<T> is expected: take the lvalue's
                // address, or spill a temporary.
                if let Some(addr) = self.lower_addr_quiet(arg) {
                    return Some(addr);
                }
                let v = self.lower_expr(arg)?;
                let ty = self.storage_type(a);
                let slot = self.b.alloca(ty.clone())?;
                self.b.store(ty, v, Operand::Value(slot))?;
                return Some(Operand::Value(slot));
            }
        }

        let v = self.lower_value(arg)?;
        let a_val = self.value_ty_of(arg);
        self.emit_from_conversion(p, a_val, v)
    }

    /// Extra variadic arguments: `bool` promotes to `i32`; everything
    /// else passes through.
    fn lower_variadic_extra(&mut self, arg: NodeId) -> Option<Operand> {
        let v = self.lower_value(arg)?;
        if self.types.resolve_alias(self.ast.ty(arg)) == TypeRegistry::BOOL {
            let z = self
                .b
                .cast(CastOp::Zext, v, SsaType::Int(1), SsaType::Int(32))?;
            return Some(Operand::Value(z));
        }
        Some(v)
    }

    /// `lower_addr` without the invalid-lvalue diagnostic, for the
    /// by-ref argument path where a temporary is the fallback.
    fn lower_addr_quiet(&mut self, id: NodeId) -> Option<Operand> {
        match self.ast.kind(id) {
            NodeKind::Ident { .. } | NodeKind::Member { .. } | NodeKind::Index { .. } => {
                self.lower_addr(id)
            }
            _ => None,
        }
    }

    // ── Objects, arrays, enums ───────────────────────────────────────

    fn lower_object_lit(&mut self, id: NodeId, props: &[(String, NodeId)]) -> Option<Operand> {
        let loc = self.ast.loc(id);
        let ty = self.ast.ty(id);
        let Some(s) = self.struct_of(ty) else {
            let name = self.types.name(ty).to_string();
            self.ce(
                codes::CE_MISSING_STRUCT_TYPE,
                loc,
                format!("no struct type materialized for '{name}'"),
            );
            return None;
        };
        let ptr = self.b.alloca(SsaType::Struct(s))?;
        for (i, (_, value)) in props.iter().enumerate() {
            let v = self.lower_value(*value)?;
            let fty = self.storage_type(self.ast.ty(*value));
            let fp = self.b.field_ptr(s, Operand::Value(ptr), i as u32)?;
            self.b.store(fty, v, Operand::Value(fp))?;
        }
        Some(Operand::Value(ptr))
    }

    fn lower_array_lit(&mut self, id: NodeId, elems: &[NodeId]) -> Option<Operand> {
        let arr_ty = self.types.resolve_alias(self.ast.ty(id));
        let TypeKind::Array { elem } = *self.types.kind(arr_ty) else {
            return None;
        };
        let elem_lowered = self.storage_type(elem);
        let data = self.b.alloca(SsaType::Array {
            elem: Box::new(elem_lowered.clone()),
            len: elems.len() as u32,
        })?;
        for (i, &e) in elems.iter().enumerate() {
            let v = self.lower_value(e)?;
            let ep = self.b.elem_ptr(
                elem_lowered.clone(),
                Operand::Value(data),
                Operand::ConstInt {
                    value: i as i64,
                    ty: SsaType::Int(64),
                },
            )?;
            self.b.store(elem_lowered.clone(), v, Operand::Value(ep))?;
        }

        let s = self.struct_of(arr_ty)?;
        let ptr = self.b.alloca(SsaType::Struct(s))?;
        let data_fp = self.b.field_ptr(s, Operand::Value(ptr), 0)?;
        self.b
            .store(SsaType::Ptr, Operand::Value(data), Operand::Value(data_fp))?;
        let len_fp = self.b.field_ptr(s, Operand::Value(ptr), 1)?;
        self.b.store(
            SsaType::Int(64),
            Operand::ConstInt {
                value: elems.len() as i64,
                ty: SsaType::Int(64),
            },
            Operand::Value(len_fp),
        )?;
        Some(Operand::Value(ptr))
    }

    pub(crate) fn lower_enum_ctor(
        &mut self,
        id: NodeId,
        enum_ty: TypeId,
        variant: u32,
        args: &[NodeId],
    ) -> Option<Operand> {
        let loc = self.ast.loc(id);
        let Some(s) = self.struct_of(enum_ty) else {
            let name = self.types.name(enum_ty).to_string();
            self.ce(
                codes::CE_MISSING_STRUCT_TYPE,
                loc,
                format!("no struct type materialized for '{name}'"),
            );
            return None;
        };
        let ptr = self.b.alloca(SsaType::Struct(s))?;
        let tag_fp = self.b.field_ptr(s, Operand::Value(ptr), 0)?;
        self.b.store(
            SsaType::Int(32),
            Operand::ConstInt {
                value: i64::from(variant),
                ty: SsaType::Int(32),
            },
            Operand::Value(tag_fp),
        )?;

        if !args.is_empty() {
            let payload = self
                .types
                .enum_variants(enum_ty)
                .and_then(|vs| vs.get(variant as usize))
                .and_then(|v| v.payload)?;
            let Some(comp) = self.struct_of(payload) else {
                let name = self.types.name(payload).to_string();
                self.ce(
                    codes::CE_MISSING_STRUCT_TYPE,
                    loc,
                    format!("no struct type materialized for '{name}'"),
                );
                return None;
            };
            let payload_fp = self.b.field_ptr(s, Operand::Value(ptr), 1)?;
            for (i, &arg) in args.iter().enumerate() {
                let v = self.lower_value(arg)?;
                let fty = self.storage_type(self.ast.ty(arg));
                let fp = self
                    .b
                    .field_ptr(comp, Operand::Value(payload_fp), i as u32)?;
                self.b.store(fty, v, Operand::Value(fp))?;
            }
        }
        Some(Operand::Value(ptr))
    }

    fn lower_is_pattern(
        &mut self,
        id: NodeId,
        value: NodeId,
        bindings: &[NodeId],
    ) -> Option<Operand> {
        let enum_ty = self.value_ty_of(value);
        let vi = self.ast.node(id).prop_index?;
        let v = self.lower_value(value)?;
        let tag = self.enum_tag(enum_ty, v.clone())?;
        let cmp = self.b.icmp(
            sable_ssa::IntPred::Eq,
            SsaType::Int(32),
            Operand::Value(tag),
            Operand::ConstInt {
                value: i64::from(vi),
                ty: SsaType::Int(32),
            },
        )?;

        // Bind the payload fields now; the loads read union bytes and
        // are only observed when the guard takes the branch.
        if !bindings.is_empty() {
            let s = self.struct_of(enum_ty)?;
            let payload = self
                .types
                .enum_variants(enum_ty)
                .and_then(|vs| vs.get(vi as usize))
                .and_then(|var| var.payload)?;
            let comp = self.struct_of(payload)?;
            let payload_fp = self.b.field_ptr(s, v, 1)?;
            for (i, &binding) in bindings.iter().enumerate() {
                let sym = self.ast.node(binding).symbol?;
                let fty = self.storage_type(self.ast.ty(binding));
                let fp = self
                    .b
                    .field_ptr(comp, Operand::Value(payload_fp), i as u32)?;
                let loaded = self.b.load(fty.clone(), Operand::Value(fp))?;
                let slot = self.b.alloca(fty.clone())?;
                self.b
                    .store(fty, Operand::Value(loaded), Operand::Value(slot))?;
                self.locals.insert(sym, slot);
            }
        }
        Some(Operand::Value(cmp))
    }

    // ── Member and index access ──────────────────────────────────────

    fn lower_member(&mut self, id: NodeId, object: NodeId, _property: &str) -> Option<Operand> {
        // Namespace member: resolved to a symbol, read like an
        // identifier.
        if self.ast.node(id).symbol.is_some() {
            return self.lower_ident(id);
        }

        // `length` (or another receiver intrinsic) on a builtin.
        if let Some(r) = self.ast.node(id).impl_ref {
            let recv_ty = self.value_ty_of(object);
            let recv = self.lower_value(object)?;
            let kind = self.traits.impl_by_ref(r).method("len")?.clone();
            return match kind {
                MethodKind::Intrinsic(intr) => self.emit_receiver_intrinsic(intr, recv_ty, recv),
                _ => None,
            };
        }

        // Bare payload-less enum variant.
        let node_ty = self.types.resolve_alias(self.ast.ty(id));
        if self.types.enum_variants(node_ty).is_some() {
            if let Some(vi) = self.ast.node(id).prop_index {
                if self.ast.node(object).symbol.is_none() {
                    return self.lower_enum_ctor(id, node_ty, vi, &[]);
                }
            }
        }

        // Ordinary property read.
        let addr = self.lower_addr(id)?;
        let ty = self.storage_type(self.ast.ty(id));
        let v = self.b.load(ty, addr)?;
        Some(Operand::Value(v))
    }

    fn lower_index(&mut self, id: NodeId, object: NodeId, index: NodeId) -> Option<Operand> {
        let addr = self.lower_elem_addr(id, object, index)?;
        let ty = self.storage_type(self.ast.ty(id));
        let v = self.b.load(ty, addr)?;
        Some(Operand::Value(v))
    }

    /// Address of `obj[i]` against the builtin `{ptr, usize}` layouts.
    fn lower_elem_addr(
        &mut self,
        id: NodeId,
        object: NodeId,
        index: NodeId,
    ) -> Option<Operand> {
        let loc = self.ast.loc(id);
        let obj_ty = self.value_ty_of(object);
        match self.types.kind(obj_ty).clone() {
            TypeKind::Array { elem } => {
                let obj = self.lower_value(object)?;
                let idx = self.lower_value(index)?;
                let Some(s) = self.struct_of(obj_ty) else {
                    let name = self.types.name(obj_ty).to_string();
                    self.ce(
                        codes::CE_MISSING_STRUCT_TYPE,
                        loc,
                        format!("no struct type materialized for '{name}'"),
                    );
                    return None;
                };
                let data_fp = self.b.field_ptr(s, obj, 0)?;
                let data = self.b.load(SsaType::Ptr, Operand::Value(data_fp))?;
                // Array indices are i32; widen for the address math.
                let idx64 = self
                    .b
                    .cast(CastOp::Sext, idx, SsaType::Int(32), SsaType::Int(64))?;
                let ep = self.b.elem_ptr(
                    self.storage_type(elem),
                    Operand::Value(data),
                    Operand::Value(idx64),
                )?;
                Some(Operand::Value(ep))
            }
            TypeKind::Primitive(sable_types::Primitive::Str) => {
                let v = self.lower_value(object)?;
                let idx = self.lower_value(index)?;
                let slot = self.spill_str(v)?;
                let s = self.str_struct.expect("str struct");
                let data_fp = self.b.field_ptr(s, Operand::Value(slot), 0)?;
                let data = self.b.load(SsaType::Ptr, Operand::Value(data_fp))?;
                let ep = self
                    .b
                    .elem_ptr(SsaType::Int(8), Operand::Value(data), idx)?;
                Some(Operand::Value(ep))
            }
            _ => {
                let name = self.types.name(obj_ty).to_string();
                self.ce(
                    codes::CE_MISSING_TRAIT_IMPL,
                    loc,
                    format!("no impl of 'Index' for '{name}' at lowering"),
                );
                None
            }
        }
    }
}
