//! Type inference and monomorphization for the Sable compiler.
//!
//! [`builtins`] registers the compiler-known traits and their primitive
//! impls. [`infer`] performs the single bottom-up typing walk: it fills
//! every node's type slot, resolves operators and members through the
//! trait registry, and materializes one specialization of a function per
//! distinct call-site argument-type vector, cloning and re-typing the
//! body under the concrete bindings.

pub mod builtins;
pub mod infer;

pub use infer::{check_program, CheckResult, Inferencer, MAX_INFER_PASSES};
