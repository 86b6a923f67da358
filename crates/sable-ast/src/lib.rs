//! AST model and symbol tables for the Sable compiler.
//!
//! The parser produces an [`Ast`]: an arena of nodes carrying a source
//! location, a type slot (filled by inference), and resolution slots
//! (symbol, trait impl, property index, specialization) that inference
//! fills and lowering reads. [`symbol`] holds the nested scopes.

pub mod ast;
pub mod symbol;

pub use ast::{Ast, Node, NodeKind, Param, TypeAnn};
pub use symbol::{ScopeId, Symbol, SymbolId, SymbolKind, SymbolTable};
