//! The instruction builder.
//!
//! The builder owns the module under construction and holds exactly one
//! insertion point. Callers lowering nested functions must save the
//! point before entering a body and restore it afterwards. Emission
//! into a terminated block (or with no position) is refused: the
//! instruction is skipped and `None` comes back, which is how dead code
//! after `return`/`break` falls away without malformed IR.

use sable_common::SourceLoc;

use crate::ir::{
    BinOp, BlockId, CastOp, FloatPred, FuncId, GlobalId, GlobalInit, Inst, InstData, IntPred,
    Module, Operand, SsaType, StructId, Term, ValueId,
};

/// A saved insertion point (see [`Builder::save_point`]).
pub type InsertPoint = Option<(FuncId, BlockId)>;

/// Builds SSA instructions into a [`Module`].
#[derive(Debug)]
pub struct Builder {
    module: Module,
    pos: InsertPoint,
    loc: Option<SourceLoc>,
}

impl Builder {
    pub fn new(module: Module) -> Self {
        Builder {
            module,
            pos: None,
            loc: None,
        }
    }

    /// Consume the builder and hand back the finished module.
    pub fn finish(self) -> Module {
        self.module
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    // ── Module passthroughs ──────────────────────────────────────────

    pub fn add_struct(&mut self, name: impl Into<String>, fields: Vec<SsaType>) -> StructId {
        self.module.add_struct(name, fields)
    }

    pub fn set_struct_fields(&mut self, id: StructId, fields: Vec<SsaType>) {
        self.module.struct_def_mut(id).fields = fields;
    }

    pub fn add_global(
        &mut self,
        name: impl Into<String>,
        ty: SsaType,
        init: GlobalInit,
        is_const: bool,
    ) -> GlobalId {
        self.module.add_global(name, ty, init, is_const)
    }

    pub fn declare_function(
        &mut self,
        name: impl Into<String>,
        params: Vec<SsaType>,
        ret: SsaType,
        variadic: bool,
    ) -> FuncId {
        self.module.declare_function(name, params, ret, variadic)
    }

    pub fn get_function(&self, name: &str) -> Option<FuncId> {
        self.module.get_function(name)
    }

    // ── Position management ──────────────────────────────────────────

    /// Append a block to a function. The hint keeps printed IR
    /// readable; a per-function index keeps names unique.
    pub fn create_block(&mut self, func: FuncId, hint: &str) -> BlockId {
        let f = self.module.func_mut(func);
        let idx = f.blocks.len();
        let name = if idx == 0 {
            hint.to_string()
        } else {
            format!("{hint}{idx}")
        };
        f.blocks.push(crate::ir::Block {
            name,
            insts: Vec::new(),
            term: None,
        });
        BlockId(idx as u32)
    }

    pub fn position_at_end(&mut self, func: FuncId, block: BlockId) {
        self.pos = Some((func, block));
    }

    pub fn clear_position(&mut self) {
        self.pos = None;
    }

    /// Save the insertion point before descending into another function
    /// body; pair with [`restore_point`](Self::restore_point).
    pub fn save_point(&self) -> InsertPoint {
        self.pos
    }

    pub fn restore_point(&mut self, point: InsertPoint) {
        self.pos = point;
    }

    pub fn current_func(&self) -> Option<FuncId> {
        self.pos.map(|(f, _)| f)
    }

    pub fn current_block(&self) -> Option<BlockId> {
        self.pos.map(|(_, b)| b)
    }

    /// True when there is no live insertion point: no position, or the
    /// current block already has a terminator.
    pub fn is_terminated(&self) -> bool {
        match self.pos {
            None => true,
            Some((f, b)) => self.module.func(f).block(b).is_terminated(),
        }
    }

    /// Set the debug location attached to subsequently emitted
    /// instructions.
    pub fn set_loc(&mut self, loc: Option<SourceLoc>) {
        self.loc = loc;
    }

    fn emittable(&self) -> Option<(FuncId, BlockId)> {
        let (f, b) = self.pos?;
        if self.module.func(f).block(b).is_terminated() {
            return None;
        }
        Some((f, b))
    }

    fn push_inst(&mut self, func: FuncId, block: BlockId, inst: Inst) {
        let loc = self.loc.clone();
        self.module
            .func_mut(func)
            .block_mut(block)
            .insts
            .push(InstData { inst, loc });
    }

    // ── Instructions ─────────────────────────────────────────────────

    pub fn alloca(&mut self, ty: SsaType) -> Option<ValueId> {
        let (f, b) = self.emittable()?;
        let res = self.module.func_mut(f).new_value();
        self.push_inst(f, b, Inst::Alloca { res, ty });
        Some(res)
    }

    pub fn load(&mut self, ty: SsaType, ptr: Operand) -> Option<ValueId> {
        let (f, b) = self.emittable()?;
        let res = self.module.func_mut(f).new_value();
        self.push_inst(f, b, Inst::Load { res, ty, ptr });
        Some(res)
    }

    pub fn store(&mut self, ty: SsaType, value: Operand, ptr: Operand) -> Option<()> {
        let (f, b) = self.emittable()?;
        self.push_inst(f, b, Inst::Store { ty, value, ptr });
        Some(())
    }

    pub fn field_ptr(&mut self, strukt: StructId, base: Operand, index: u32) -> Option<ValueId> {
        let (f, b) = self.emittable()?;
        let res = self.module.func_mut(f).new_value();
        self.push_inst(
            f,
            b,
            Inst::FieldPtr {
                res,
                strukt,
                base,
                index,
            },
        );
        Some(res)
    }

    pub fn elem_ptr(&mut self, elem: SsaType, base: Operand, index: Operand) -> Option<ValueId> {
        let (f, b) = self.emittable()?;
        let res = self.module.func_mut(f).new_value();
        self.push_inst(
            f,
            b,
            Inst::ElemPtr {
                res,
                elem,
                base,
                index,
            },
        );
        Some(res)
    }

    pub fn bin(&mut self, op: BinOp, ty: SsaType, lhs: Operand, rhs: Operand) -> Option<ValueId> {
        let (f, b) = self.emittable()?;
        let res = self.module.func_mut(f).new_value();
        self.push_inst(f, b, Inst::Bin { res, op, ty, lhs, rhs });
        Some(res)
    }

    pub fn icmp(
        &mut self,
        pred: IntPred,
        ty: SsaType,
        lhs: Operand,
        rhs: Operand,
    ) -> Option<ValueId> {
        let (f, b) = self.emittable()?;
        let res = self.module.func_mut(f).new_value();
        self.push_inst(
            f,
            b,
            Inst::ICmp {
                res,
                pred,
                ty,
                lhs,
                rhs,
            },
        );
        Some(res)
    }

    pub fn fcmp(&mut self, pred: FloatPred, lhs: Operand, rhs: Operand) -> Option<ValueId> {
        let (f, b) = self.emittable()?;
        let res = self.module.func_mut(f).new_value();
        self.push_inst(f, b, Inst::FCmp { res, pred, lhs, rhs });
        Some(res)
    }

    pub fn cast(
        &mut self,
        op: CastOp,
        val: Operand,
        from: SsaType,
        to: SsaType,
    ) -> Option<ValueId> {
        let (f, b) = self.emittable()?;
        let res = self.module.func_mut(f).new_value();
        self.push_inst(f, b, Inst::Cast { res, op, val, from, to });
        Some(res)
    }

    pub fn select(
        &mut self,
        cond: Operand,
        ty: SsaType,
        then_v: Operand,
        else_v: Operand,
    ) -> Option<ValueId> {
        let (f, b) = self.emittable()?;
        let res = self.module.func_mut(f).new_value();
        self.push_inst(
            f,
            b,
            Inst::Select {
                res,
                cond,
                ty,
                then_v,
                else_v,
            },
        );
        Some(res)
    }

    /// Emit a call. The outer `None` means nothing was emitted; the
    /// inner option is `None` for void callees.
    pub fn call(&mut self, func: FuncId, args: Vec<Operand>) -> Option<Option<ValueId>> {
        let (f, b) = self.emittable()?;
        let res = if self.module.func(func).ret.is_void() {
            None
        } else {
            Some(self.module.func_mut(f).new_value())
        };
        self.push_inst(f, b, Inst::Call { res, func, args });
        Some(res)
    }

    // ── Terminators ──────────────────────────────────────────────────

    fn terminate(&mut self, term: Term) -> bool {
        match self.emittable() {
            Some((f, b)) => {
                self.module.func_mut(f).block_mut(b).term = Some(term);
                true
            }
            None => false,
        }
    }

    pub fn br(&mut self, dest: BlockId) -> bool {
        self.terminate(Term::Br(dest))
    }

    pub fn cond_br(&mut self, cond: Operand, then_blk: BlockId, else_blk: BlockId) -> bool {
        self.terminate(Term::CondBr {
            cond,
            then_blk,
            else_blk,
        })
    }

    pub fn ret(&mut self, value: Option<(SsaType, Operand)>) -> bool {
        self.terminate(Term::Ret(value))
    }

    pub fn unreachable(&mut self) -> bool {
        self.terminate(Term::Unreachable)
    }
}
