//! The SSA data model: module, types, functions, blocks, instructions.

use rustc_hash::FxHashMap;
use sable_common::SourceLoc;

/// Handle to a named struct type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StructId(pub u32);

/// Handle to a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(pub u32);

/// Handle to a global.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalId(pub u32);

/// Handle to a basic block within a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

/// Handle to an SSA value within a function. Parameters occupy the
/// first value slots; instruction results follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(pub u32);

/// An SSA-level type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SsaType {
    Void,
    /// Integer with bit width (1, 8, 16, 32, 64). Signedness lives in
    /// the instructions, not the type.
    Int(u8),
    Double,
    /// Opaque pointer.
    Ptr,
    Struct(StructId),
    /// Fixed-size byte blob, used for enum payload areas.
    Array { elem: Box<SsaType>, len: u32 },
}

impl SsaType {
    pub fn is_void(&self) -> bool {
        matches!(self, SsaType::Void)
    }
}

/// A named struct type.
#[derive(Debug, Clone)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<SsaType>,
}

/// Initializer for a global.
#[derive(Debug, Clone, PartialEq)]
pub enum GlobalInit {
    Zero,
    Int(i64),
    Double(f64),
    /// Raw bytes, used for string data (null terminator included by the
    /// producer when one is wanted).
    Bytes(Vec<u8>),
}

/// A module-scope variable or constant data.
#[derive(Debug, Clone)]
pub struct GlobalDef {
    pub name: String,
    pub ty: SsaType,
    pub init: GlobalInit,
    /// Constant data (true) vs. mutable global (false).
    pub is_const: bool,
}

/// An instruction or terminator operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(ValueId),
    ConstInt { value: i64, ty: SsaType },
    ConstDouble(f64),
    ConstBool(bool),
    /// A `str` constant: pointer to global bytes plus length.
    ConstStr { data: GlobalId, len: u64 },
    /// Zero of an arbitrary type (default returns, zero-init stores).
    Zero(SsaType),
    /// Address of a global.
    Global(GlobalId),
    /// Address of a function.
    FuncRef(FuncId),
}

/// Integer binary opcodes. Signed/unsigned variants are distinct
/// opcodes, selected by the producer from the operand's signedness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    SRem,
    URem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
    FAdd,
    FSub,
    FMul,
    FDiv,
    FRem,
}

/// Integer comparison predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntPred {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
}

/// Ordered float comparison predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatPred {
    Oeq,
    One,
    Olt,
    Ole,
    Ogt,
    Oge,
}

/// Width-change casts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOp {
    Zext,
    Sext,
    Trunc,
}

/// A non-terminator instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    Alloca {
        res: ValueId,
        ty: SsaType,
    },
    Load {
        res: ValueId,
        ty: SsaType,
        ptr: Operand,
    },
    Store {
        ty: SsaType,
        value: Operand,
        ptr: Operand,
    },
    /// Address of struct field `index`.
    FieldPtr {
        res: ValueId,
        strukt: StructId,
        base: Operand,
        index: u32,
    },
    /// Address of array element `index` from a base pointer.
    ElemPtr {
        res: ValueId,
        elem: SsaType,
        base: Operand,
        index: Operand,
    },
    Bin {
        res: ValueId,
        op: BinOp,
        ty: SsaType,
        lhs: Operand,
        rhs: Operand,
    },
    ICmp {
        res: ValueId,
        pred: IntPred,
        ty: SsaType,
        lhs: Operand,
        rhs: Operand,
    },
    FCmp {
        res: ValueId,
        pred: FloatPred,
        lhs: Operand,
        rhs: Operand,
    },
    Cast {
        res: ValueId,
        op: CastOp,
        val: Operand,
        from: SsaType,
        to: SsaType,
    },
    Call {
        /// `None` for void callees.
        res: Option<ValueId>,
        func: FuncId,
        args: Vec<Operand>,
    },
    Select {
        res: ValueId,
        cond: Operand,
        ty: SsaType,
        then_v: Operand,
        else_v: Operand,
    },
}

impl Inst {
    /// The value defined by this instruction, if any.
    pub fn result(&self) -> Option<ValueId> {
        match self {
            Inst::Alloca { res, .. }
            | Inst::Load { res, .. }
            | Inst::FieldPtr { res, .. }
            | Inst::ElemPtr { res, .. }
            | Inst::Bin { res, .. }
            | Inst::ICmp { res, .. }
            | Inst::FCmp { res, .. }
            | Inst::Cast { res, .. }
            | Inst::Select { res, .. } => Some(*res),
            Inst::Call { res, .. } => *res,
            Inst::Store { .. } => None,
        }
    }
}

/// An instruction plus its debug location.
#[derive(Debug, Clone)]
pub struct InstData {
    pub inst: Inst,
    pub loc: Option<SourceLoc>,
}

/// A block terminator.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Br(BlockId),
    CondBr {
        cond: Operand,
        then_blk: BlockId,
        else_blk: BlockId,
    },
    Ret(Option<(SsaType, Operand)>),
    Unreachable,
}

/// A basic block: straight-line instructions plus one terminator.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub name: String,
    pub insts: Vec<InstData>,
    pub term: Option<Term>,
}

impl Block {
    pub fn is_terminated(&self) -> bool {
        self.term.is_some()
    }
}

/// A function: signature plus body blocks. Declarations (externals)
/// have no blocks.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<SsaType>,
    pub ret: SsaType,
    pub variadic: bool,
    pub blocks: Vec<Block>,
    next_value: u32,
}

impl Function {
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The value holding parameter `i`.
    pub fn param_value(&self, i: usize) -> ValueId {
        debug_assert!(i < self.params.len());
        ValueId(i as u32)
    }

    pub fn new_value(&mut self) -> ValueId {
        let v = ValueId(self.next_value);
        self.next_value += 1;
        v
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.0 as usize]
    }
}

/// Debug metadata attached to a module when debug mode is enabled.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugInfo {
    pub file: String,
    pub producer: String,
}

/// A whole SSA module.
#[derive(Debug, Default)]
pub struct Module {
    pub name: String,
    pub structs: Vec<StructDef>,
    pub globals: Vec<GlobalDef>,
    pub funcs: Vec<Function>,
    pub debug: Option<DebugInfo>,
    funcs_by_name: FxHashMap<String, FuncId>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn add_struct(&mut self, name: impl Into<String>, fields: Vec<SsaType>) -> StructId {
        let id = StructId(self.structs.len() as u32);
        self.structs.push(StructDef {
            name: name.into(),
            fields,
        });
        id
    }

    pub fn struct_def(&self, id: StructId) -> &StructDef {
        &self.structs[id.0 as usize]
    }

    /// Mutable access, used by producers that register struct names
    /// first and fill fields second (recursive types).
    pub fn struct_def_mut(&mut self, id: StructId) -> &mut StructDef {
        &mut self.structs[id.0 as usize]
    }

    pub fn add_global(
        &mut self,
        name: impl Into<String>,
        ty: SsaType,
        init: GlobalInit,
        is_const: bool,
    ) -> GlobalId {
        let id = GlobalId(self.globals.len() as u32);
        self.globals.push(GlobalDef {
            name: name.into(),
            ty,
            init,
            is_const,
        });
        id
    }

    pub fn global(&self, id: GlobalId) -> &GlobalDef {
        &self.globals[id.0 as usize]
    }

    /// Declare a function (no body). Re-declaring an existing name
    /// returns the existing id.
    pub fn declare_function(
        &mut self,
        name: impl Into<String>,
        params: Vec<SsaType>,
        ret: SsaType,
        variadic: bool,
    ) -> FuncId {
        let name = name.into();
        if let Some(&id) = self.funcs_by_name.get(&name) {
            return id;
        }
        let next_value = params.len() as u32;
        let id = FuncId(self.funcs.len() as u32);
        self.funcs.push(Function {
            name: name.clone(),
            params,
            ret,
            variadic,
            blocks: Vec::new(),
            next_value,
        });
        self.funcs_by_name.insert(name, id);
        id
    }

    pub fn func(&self, id: FuncId) -> &Function {
        &self.funcs[id.0 as usize]
    }

    pub fn func_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.funcs[id.0 as usize]
    }

    pub fn get_function(&self, name: &str) -> Option<FuncId> {
        self.funcs_by_name.get(name).copied()
    }
}
