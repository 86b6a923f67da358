//! SSA lowering for the Sable compiler.
//!
//! Consumes the typed AST and the check result and emits an SSA module
//! in five passes: named struct materialization, specialization
//! declaration, module globals, specialization bodies, and the entry
//! function holding the module-level statements. Operator and method
//! dispatch goes through the trait impls inference recorded on the
//! nodes; intrinsic methods expand inline ([`intrinsics`]), user
//! methods call their specialization, externals call a declared symbol.
//!
//! Codegen errors (`CE*`) are internal consistency failures: something
//! inference promised is missing. They abort the current specialization
//! and lowering continues with the rest.

mod expr;
mod intrinsics;
mod types;

use rustc_hash::FxHashMap;

use sable_ast::{Ast, NodeKind, SymbolId, SymbolTable};
use sable_common::{DiagnosticSink, NodeId, SourceLoc};
use sable_ssa::{
    BlockId, Builder, DebugInfo, FuncId, GlobalId, GlobalInit, Module, Operand, SsaType, StructId,
};
use sable_types::{TraitRegistry, TypeId, TypeKind, TypeRegistry};
use sable_typeck::CheckResult;

/// Lowering options.
#[derive(Debug, Clone)]
pub struct CodegenOptions {
    pub module_name: String,
    /// Source file recorded in debug metadata.
    pub source_file: String,
    /// Attach debug locations to every emitted instruction.
    pub debug: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        CodegenOptions {
            module_name: "main".to_string(),
            source_file: "main.sb".to_string(),
            debug: false,
        }
    }
}

/// Lower a checked program to an SSA module.
///
/// Returns `None` when the sink already carries errors: no IR is
/// produced for a program that failed type checking.
pub fn emit(
    ast: &Ast,
    program: NodeId,
    check: &CheckResult,
    sink: &mut DiagnosticSink,
    opts: &CodegenOptions,
) -> Option<Module> {
    if sink.has_errors() {
        return None;
    }
    let mut module = Module::new(opts.module_name.clone());
    if opts.debug {
        module.debug = Some(DebugInfo {
            file: opts.source_file.clone(),
            producer: "sablec".to_string(),
        });
    }
    let mut cg = Codegen {
        ast,
        types: &check.types,
        traits: &check.traits,
        symbols: &check.symbols,
        sink,
        b: Builder::new(module),
        struct_cache: FxHashMap::default(),
        str_struct: None,
        spec_funcs: FxHashMap::default(),
        locals: FxHashMap::default(),
        globals: FxHashMap::default(),
        str_lits: FxHashMap::default(),
        str_count: 0,
        loop_stack: Vec::new(),
        current_ret: SsaType::Void,
        spec_scopes: check.spec_scopes.clone(),
        failed: false,
        debug: opts.debug,
    };

    cg.materialize_types();
    cg.declare_specializations();
    cg.emit_globals(program);
    cg.emit_bodies();
    cg.emit_entry(program);

    Some(cg.b.finish())
}

/// The lowering context. One per emitted module.
pub(crate) struct Codegen<'a> {
    pub(crate) ast: &'a Ast,
    pub(crate) types: &'a TypeRegistry,
    pub(crate) traits: &'a TraitRegistry,
    pub(crate) symbols: &'a SymbolTable,
    pub(crate) sink: &'a mut DiagnosticSink,
    pub(crate) b: Builder,

    /// Sable type -> materialized SSA struct (objects, enums, arrays,
    /// str). Every reference to the same type sees the same struct.
    pub(crate) struct_cache: FxHashMap<TypeId, StructId>,
    pub(crate) str_struct: Option<StructId>,
    /// Specialization -> declared SSA function.
    pub(crate) spec_funcs: FxHashMap<(TypeId, u32), FuncId>,
    /// Symbol -> stack slot (or parameter pointer) in the current body.
    pub(crate) locals: FxHashMap<SymbolId, sable_ssa::ValueId>,
    /// Module-level variable symbols -> globals.
    pub(crate) globals: FxHashMap<SymbolId, GlobalId>,
    /// Interned string literal data.
    pub(crate) str_lits: FxHashMap<String, GlobalId>,
    pub(crate) str_count: u32,
    /// (continue target, break target) per enclosing loop.
    pub(crate) loop_stack: Vec<(BlockId, BlockId)>,
    pub(crate) current_ret: SsaType,
    pub(crate) spec_scopes: FxHashMap<(TypeId, u32), sable_ast::ScopeId>,
    /// Set by `ce()`: the current specialization is abandoned.
    pub(crate) failed: bool,
    pub(crate) debug: bool,
}

impl<'a> Codegen<'a> {
    /// Report a codegen-internal error and abandon the current
    /// specialization.
    pub(crate) fn ce(&mut self, code: &'static str, loc: SourceLoc, msg: String) {
        self.sink.error(code, loc, msg);
        self.failed = true;
    }

    pub(crate) fn set_debug_loc(&mut self, loc: &SourceLoc) {
        if self.debug {
            self.b.set_loc(Some(loc.clone()));
        }
    }

    // ── Pass 1: type materialization ─────────────────────────────────

    /// Pre-create a named SSA struct for every object, enum, and array
    /// type (plus the `str` layout), then fill the field lists. The
    /// two-step shape lets recursive types resolve: a ref field lowers
    /// to `ptr` and never recurses.
    fn materialize_types(&mut self) {
        let str_struct = self.b.add_struct("str", vec![SsaType::Ptr, SsaType::Int(64)]);
        self.str_struct = Some(str_struct);
        self.struct_cache.insert(TypeRegistry::STR, str_struct);

        let ids: Vec<TypeId> = self.types.ids().collect();
        for &id in &ids {
            match self.types.kind(id) {
                TypeKind::Object(_) | TypeKind::Enum { .. } | TypeKind::Array { .. } => {
                    let name = sable_types::registry::sanitize_type_name(self.types.name(id));
                    let s = self.b.add_struct(name, Vec::new());
                    self.struct_cache.insert(id, s);
                }
                _ => {}
            }
        }
        for &id in &ids {
            let Some(&s) = self.struct_cache.get(&id) else {
                continue;
            };
            if id == TypeRegistry::STR {
                continue;
            }
            let fields = match self.types.kind(id) {
                TypeKind::Object(obj) => obj
                    .properties
                    .iter()
                    .map(|(_, t)| self.storage_type(*t))
                    .collect(),
                TypeKind::Enum { .. } => {
                    let payload = self.enum_payload_size(id);
                    vec![
                        SsaType::Int(32),
                        SsaType::Array {
                            elem: Box::new(SsaType::Int(8)),
                            len: payload,
                        },
                    ]
                }
                // Arrays share the `{ptr, usize}` layout.
                TypeKind::Array { .. } => vec![SsaType::Ptr, SsaType::Int(64)],
                _ => continue,
            };
            self.b.set_struct_fields(s, fields);
        }
    }

    /// Byte size of the largest variant payload.
    fn enum_payload_size(&self, id: TypeId) -> u32 {
        let Some(variants) = self.types.enum_variants(id) else {
            return 0;
        };
        variants
            .iter()
            .map(|v| {
                v.fields
                    .iter()
                    .map(|(_, t)| self.size_of(&self.storage_type(*t)))
                    .sum::<u32>()
            })
            .max()
            .unwrap_or(0)
    }

    pub(crate) fn size_of(&self, t: &SsaType) -> u32 {
        match t {
            SsaType::Void => 0,
            SsaType::Int(bits) => u32::from(*bits).div_ceil(8),
            SsaType::Double => 8,
            SsaType::Ptr => 8,
            SsaType::Struct(id) => {
                let fields = self.b.module().struct_def(*id).fields.clone();
                fields.iter().map(|f| self.size_of(f)).sum()
            }
            SsaType::Array { elem, len } => self.size_of(elem) * len,
        }
    }

    // ── Pass 2: specialization declaration ───────────────────────────

    fn declare_specializations(&mut self) {
        for ft in self.types.function_ids() {
            let f = self.types.function(ft).expect("function id");
            let variadic = f.variadic;
            let specs: Vec<(u32, Vec<TypeId>, Option<TypeId>, String)> = f
                .specializations
                .iter()
                .enumerate()
                .map(|(i, s)| (i as u32, s.params.clone(), s.ret, s.mangled_name.clone()))
                .collect();
            for (i, params, ret, name) in specs {
                let param_tys: Vec<SsaType> =
                    params.iter().map(|&p| self.storage_type(p)).collect();
                let ret_ty = ret
                    .map(|r| self.lowered_type(r))
                    .unwrap_or(SsaType::Void);
                let func = self.b.declare_function(name, param_tys, ret_ty, variadic);
                self.spec_funcs.insert((ft, i), func);
            }
        }
    }

    // ── Pass 3: globals ──────────────────────────────────────────────

    /// Module-scope variables become globals. Constant number/bool
    /// initializers are materialized directly; everything else is
    /// zero-initialized here and stored by the entry function when its
    /// statement runs.
    fn emit_globals(&mut self, program: NodeId) {
        let stmts = match self.ast.kind(program) {
            NodeKind::Program { stmts } => stmts.clone(),
            _ => return,
        };
        for stmt in stmts {
            let NodeKind::VarDecl { name, init, .. } = self.ast.kind(stmt) else {
                continue;
            };
            let Some(sym) = self.ast.node(stmt).symbol else {
                continue;
            };
            let ty = self.storage_type(self.ast.ty(stmt));
            let init_val = init.and_then(|i| match self.ast.kind(i) {
                NodeKind::NumberLit { value, .. } => match ty {
                    SsaType::Double => Some(GlobalInit::Double(*value)),
                    SsaType::Int(_) => Some(GlobalInit::Int(*value as i64)),
                    _ => None,
                },
                NodeKind::BoolLit { value } => Some(GlobalInit::Int(i64::from(*value))),
                _ => None,
            });
            let g = self
                .b
                .add_global(name.clone(), ty, init_val.unwrap_or(GlobalInit::Zero), false);
            self.globals.insert(sym, g);
        }
    }

    // ── Pass 4: specialization bodies ────────────────────────────────

    fn emit_bodies(&mut self) {
        for ft in self.types.function_ids() {
            let count = self
                .types
                .function(ft)
                .map(|f| f.specializations.len())
                .unwrap_or(0);
            for i in 0..count as u32 {
                let spec = self.types.specialization(ft, i as usize);
                if spec.is_external || spec.body.is_none() {
                    continue;
                }
                self.emit_spec_body(ft, i);
            }
        }
    }

    fn emit_spec_body(&mut self, ft: TypeId, idx: u32) {
        let spec = self.types.specialization(ft, idx as usize);
        let body = spec.body.expect("checked body");
        let params = spec.params.clone();
        let name = spec.mangled_name.clone();
        let ret = spec.ret;
        let Some(&func) = self.spec_funcs.get(&(ft, idx)) else {
            return;
        };
        tracing::debug!(spec = %name, "lowering specialization");

        let saved_point = self.b.save_point();
        let saved_locals = std::mem::take(&mut self.locals);
        let ret_ty = ret.map(|r| self.lowered_type(r)).unwrap_or(SsaType::Void);
        let saved_ret = std::mem::replace(&mut self.current_ret, ret_ty);
        self.failed = false;

        let entry = self.b.create_block(func, "entry");
        self.b.position_at_end(func, entry);

        // Parameters: objects arrive as pointers and are used directly;
        // scalars get a stack slot so assignments to parameters work.
        if let Some(&scope) = self.spec_scopes.get(&(ft, idx)) {
            let entries: Vec<SymbolId> = self.symbols.entries(scope).to_vec();
            for (i, sym) in entries.iter().enumerate() {
                let pty = params.get(i).copied().unwrap_or(TypeRegistry::UNKNOWN);
                let lowered = self.storage_type(pty);
                let pv = self.b.module().func(func).param_value(i);
                let slot = self
                    .b
                    .alloca(lowered.clone())
                    .expect("entry block is live");
                self.b.store(lowered, Operand::Value(pv), Operand::Value(slot));
                self.locals.insert(*sym, slot);
            }
        }

        let stmts = match self.ast.kind(body) {
            NodeKind::Block { stmts } => stmts.clone(),
            _ => vec![body],
        };
        for stmt in &stmts {
            if self.failed {
                break;
            }
            self.lower_stmt(*stmt);
        }

        // Synthesize a default return when the last block falls off the
        // end.
        if !self.failed && !self.b.is_terminated() {
            match &self.current_ret {
                SsaType::Void => {
                    self.b.ret(None);
                }
                t => {
                    let t = t.clone();
                    self.b.ret(Some((t.clone(), Operand::Zero(t))));
                }
            }
        }
        if self.failed {
            // Abandoned: cap the block so the module stays printable.
            self.b.unreachable();
        }

        self.locals = saved_locals;
        self.current_ret = saved_ret;
        self.b.restore_point(saved_point);
    }

    // ── Pass 5: entry function ───────────────────────────────────────

    /// Module-level non-declaration statements run in a `main`-like
    /// entry in source order.
    fn emit_entry(&mut self, program: NodeId) {
        let func = self
            .b
            .declare_function("main", Vec::new(), SsaType::Int(32), false);
        let entry = self.b.create_block(func, "entry");
        self.b.position_at_end(func, entry);
        let saved_ret = std::mem::replace(&mut self.current_ret, SsaType::Int(32));
        self.failed = false;

        let stmts = match self.ast.kind(program) {
            NodeKind::Program { stmts } => stmts.clone(),
            _ => Vec::new(),
        };
        for stmt in stmts {
            if self.failed {
                break;
            }
            match self.ast.kind(stmt) {
                NodeKind::FunctionDecl { .. }
                | NodeKind::StructDecl { .. }
                | NodeKind::EnumDecl { .. } => {}
                _ => self.lower_stmt(stmt),
            }
        }
        if self.failed {
            self.b.unreachable();
        } else if !self.b.is_terminated() {
            self.b.ret(Some((
                SsaType::Int(32),
                Operand::ConstInt {
                    value: 0,
                    ty: SsaType::Int(32),
                },
            )));
        }
        self.current_ret = saved_ret;
        self.b.clear_position();
    }
}
