//! SSA intermediate representation for the Sable compiler.
//!
//! An LLVM-compatible, block-structured SSA module: named struct types,
//! globals, functions made of basic blocks, and value-producing
//! instructions. [`builder::Builder`] is the single way instructions are
//! emitted -- it holds exactly one insertion point and refuses emission
//! into a terminated block. [`print`] renders the module as
//! deterministic LLVM-flavored text, which is the backend handoff
//! surface.

pub mod builder;
pub mod ir;
pub mod print;

pub use builder::Builder;
pub use ir::{
    BinOp, Block, BlockId, CastOp, DebugInfo, FloatPred, FuncId, Function, GlobalDef, GlobalId,
    GlobalInit, Inst, IntPred, Module, Operand, SsaType, StructDef, StructId, Term, ValueId,
};
