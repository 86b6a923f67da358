//! The inference walk and specialization engine.
//!
//! One bottom-up pass computes the type of every expression, resolves
//! every operator to a concrete trait impl, every identifier to a symbol
//! entry, and every member access to a property index. For every call
//! whose arguments are fully typed it materializes a specialization of
//! the callee: the body is cloned, a fresh parameter scope binds the
//! concrete types, and the clone is inferred depth-first -- which drives
//! transitive specialization. Recursive calls observe the in-progress
//! specialization (return type set eagerly as `return` statements are
//! typed); mutually recursive groups that cannot resolve in one walk are
//! re-walked until the return types stop changing, bounded by
//! [`MAX_INFER_PASSES`].
//!
//! Inference never aborts: user errors become diagnostics plus `Unknown`
//! types, and operators over `Unknown` operands stay silent so one bad
//! expression does not cascade.

use rustc_hash::FxHashMap;

use sable_ast::{Ast, NodeKind, ScopeId, Symbol, SymbolKind, SymbolTable, TypeAnn};
use sable_common::diag::{codes, Diagnostic, Severity};
use sable_common::format::{check_format, FormatIssue};
use sable_common::{DiagnosticSink, NodeId, SourceLoc};
use sable_types::registry::RegistryError;
use sable_types::{
    AssignOp, BinaryOp, Target, TraitRegistry, TypeId, TypeKind, TypeRegistry, UnaryOp,
};

use crate::builtins;

/// Bound on re-walk passes for mutually recursive specializations.
pub const MAX_INFER_PASSES: usize = 16;

/// Everything the checker produces for one program.
pub struct CheckResult {
    pub types: TypeRegistry,
    pub traits: TraitRegistry,
    pub symbols: SymbolTable,
    pub module_scope: ScopeId,
    /// Parameter scope of each specialization; lowering binds the
    /// entries (in insertion order) to the SSA parameters.
    pub spec_scopes: FxHashMap<(TypeId, u32), ScopeId>,
}

/// Check a single-module program: build the registries, install the
/// builtins, and run inference.
pub fn check_program(
    ast: &mut Ast,
    program: NodeId,
    target: Target,
    sink: &mut DiagnosticSink,
) -> CheckResult {
    let mut types = TypeRegistry::new(target);
    let mut traits = TraitRegistry::new();
    let mut symbols = SymbolTable::new();
    builtins::install(&types, &mut traits);
    let module_scope = symbols.new_scope(None);
    builtins::install_builtin_functions(&mut types, &mut symbols, module_scope);

    let mut inf = Inferencer::new(ast, &mut types, &mut traits, &mut symbols, sink, None);
    inf.run(program, module_scope);
    let spec_scopes = inf.spec_scopes.clone();

    CheckResult {
        types,
        traits,
        symbols,
        module_scope,
        spec_scopes,
    }
}

/// Install an imported module's exports under a namespace name, so
/// `ns.member` resolves in the importer.
pub fn install_namespace(
    symbols: &mut SymbolTable,
    scope: ScopeId,
    name: &str,
    exports: ScopeId,
) {
    symbols.insert(
        scope,
        Symbol {
            name: name.to_string(),
            kind: SymbolKind::Namespace { exports },
            ty: TypeRegistry::VOID,
            decl: None,
        },
    );
}

/// A unit of (re-)inference: the top level, or one specialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Unit {
    Top,
    Spec(TypeId, u32),
}

impl Unit {
    fn order_key(self) -> (u32, u32, u32) {
        match self {
            Unit::Top => (0, 0, 0),
            Unit::Spec(f, i) => (1, f.0, i),
        }
    }
}

/// The inference engine. Borrows the program and the compilation-wide
/// registries; shares nothing across compilations.
pub struct Inferencer<'a> {
    ast: &'a mut Ast,
    types: &'a mut TypeRegistry,
    traits: &'a mut TraitRegistry,
    symbols: &'a mut SymbolTable,
    sink: &'a mut DiagnosticSink,
    module_prefix: Option<String>,

    /// Function decl node -> function type.
    fn_types: FxHashMap<NodeId, TypeId>,
    /// Function type -> decl node (for parameter names).
    fn_decls: FxHashMap<TypeId, NodeId>,
    /// Function type -> defining scope (parent of parameter scopes).
    fn_scopes: FxHashMap<TypeId, ScopeId>,
    /// Block/program/for node -> its scope; stable across re-walks.
    block_scopes: FxHashMap<NodeId, ScopeId>,
    /// Specialization -> its parameter scope; stable across re-walks.
    spec_scopes: FxHashMap<(TypeId, u32), ScopeId>,

    current_scope: ScopeId,
    current_spec: Option<(TypeId, u32)>,
    /// Specializations whose bodies are on the inference stack.
    in_progress: Vec<(TypeId, u32)>,
    /// Scope `is`-pattern bindings land in (the guarded branch).
    pattern_scope: Option<ScopeId>,
    /// Set when the current unit observed an in-progress callee with an
    /// unresolved return type.
    incomplete: bool,

    /// Units needing another pass.
    stale: Vec<Unit>,
    /// Per-unit diagnostic buffers; a re-walk replaces its unit's
    /// buffer, so only the converged walk's diagnostics survive.
    unit_diags: FxHashMap<Unit, Vec<Diagnostic>>,
    diag_stack: Vec<Vec<Diagnostic>>,
    /// Programs whose declarations ran; one engine checks a whole
    /// module graph, one `run` per module.
    declared: rustc_hash::FxHashSet<NodeId>,
}

impl<'a> Inferencer<'a> {
    pub fn new(
        ast: &'a mut Ast,
        types: &'a mut TypeRegistry,
        traits: &'a mut TraitRegistry,
        symbols: &'a mut SymbolTable,
        sink: &'a mut DiagnosticSink,
        module_prefix: Option<&str>,
    ) -> Self {
        Inferencer {
            ast,
            types,
            traits,
            symbols,
            sink,
            module_prefix: module_prefix.map(str::to_string),
            fn_types: FxHashMap::default(),
            fn_decls: FxHashMap::default(),
            fn_scopes: FxHashMap::default(),
            block_scopes: FxHashMap::default(),
            spec_scopes: FxHashMap::default(),
            current_scope: ScopeId(0),
            current_spec: None,
            in_progress: Vec::new(),
            pattern_scope: None,
            incomplete: false,
            stale: Vec::new(),
            unit_diags: FxHashMap::default(),
            diag_stack: Vec::new(),
            declared: rustc_hash::FxHashSet::default(),
        }
    }

    /// Switch the module prefix before checking another module of the
    /// same compilation.
    pub fn set_module_prefix(&mut self, prefix: Option<&str>) {
        self.module_prefix = prefix.map(str::to_string);
    }

    /// Install another module's exports as a namespace in `scope`
    /// (boundary of the module graph: `ns.member` then resolves here).
    pub fn install_namespace(&mut self, scope: ScopeId, name: &str, exports: ScopeId) {
        install_namespace(self.symbols, scope, name, exports);
    }

    /// Parameter scopes created for specializations so far.
    pub fn spec_scopes(&self) -> &FxHashMap<(TypeId, u32), ScopeId> {
        &self.spec_scopes
    }

    /// Run inference over a program rooted at `program`, with
    /// module-level declarations and statements in `module_scope`.
    pub fn run(&mut self, program: NodeId, module_scope: ScopeId) {
        self.current_scope = module_scope;
        self.block_scopes.insert(program, module_scope);

        self.walk_top(program, module_scope);

        let mut passes = 1;
        while !self.stale.is_empty() && passes < MAX_INFER_PASSES {
            let work = std::mem::take(&mut self.stale);
            tracing::debug!(pass = passes, units = work.len(), "re-inference pass");
            for unit in work {
                match unit {
                    Unit::Top => self.walk_top(program, module_scope),
                    Unit::Spec(f, i) => self.walk_spec(f, i),
                }
            }
            passes += 1;
        }

        // The cap guarantees termination on pathological inputs; any
        // survivor is a recursion whose return type never grounds out.
        for unit in std::mem::take(&mut self.stale) {
            if let Unit::Spec(f, i) = unit {
                if self.types.specialization(f, i as usize).ret.is_none() {
                    let name = self.types.specialization(f, i as usize).mangled_name.clone();
                    let loc = self
                        .fn_decls
                        .get(&f)
                        .map(|&d| self.ast.loc(d))
                        .unwrap_or_else(SourceLoc::synthetic);
                    self.error(
                        codes::TE_RETURN_TYPE_MISMATCH,
                        loc,
                        format!("return type of '{name}' never resolves; recursion has no base case"),
                    );
                }
            }
        }

        self.flush_diags();
    }

    // ── Diagnostics ──────────────────────────────────────────────────

    fn report(&mut self, severity: Severity, code: &'static str, loc: SourceLoc, msg: String) {
        let d = Diagnostic::new(severity, code, loc, msg);
        match self.diag_stack.last_mut() {
            Some(buf) => buf.push(d),
            None => self.sink.report(d),
        }
    }

    fn error(&mut self, code: &'static str, loc: SourceLoc, msg: String) {
        self.report(Severity::Error, code, loc, msg);
    }

    fn warning(&mut self, code: &'static str, loc: SourceLoc, msg: String) {
        self.report(Severity::Warning, code, loc, msg);
    }

    fn flush_diags(&mut self) {
        let mut keys: Vec<Unit> = self.unit_diags.keys().copied().collect();
        keys.sort_by_key(|u| u.order_key());
        for key in keys {
            if let Some(buf) = self.unit_diags.remove(&key) {
                for d in buf {
                    self.sink.report(d);
                }
            }
        }
    }

    fn mark_stale(&mut self, unit: Unit) {
        if !self.stale.contains(&unit) {
            self.stale.push(unit);
        }
    }

    // ── Unit walkers ─────────────────────────────────────────────────

    fn walk_top(&mut self, program: NodeId, module_scope: ScopeId) {
        self.diag_stack.push(Vec::new());
        let saved_incomplete = self.incomplete;
        self.incomplete = false;
        let saved_scope = self.current_scope;
        self.current_scope = module_scope;

        if self.declared.insert(program) {
            self.declare(program, module_scope);
        }
        let stmts = match self.ast.kind(program) {
            NodeKind::Program { stmts } => stmts.clone(),
            _ => Vec::new(),
        };
        self.infer_stmts(&stmts);

        self.current_scope = saved_scope;
        let stale = self.incomplete;
        self.incomplete = saved_incomplete;
        let buf = self.diag_stack.pop().expect("diag stack underflow");
        self.unit_diags.insert(Unit::Top, buf);
        if stale {
            self.mark_stale(Unit::Top);
        }
    }

    fn walk_spec(&mut self, ft: TypeId, idx: u32) {
        let Some(body) = self.types.specialization(ft, idx as usize).body else {
            return;
        };
        tracing::debug!(
            spec = %self.types.specialization(ft, idx as usize).mangled_name,
            "inferring specialization body"
        );
        self.diag_stack.push(Vec::new());
        let saved_incomplete = self.incomplete;
        self.incomplete = false;
        let saved_scope = self.current_scope;
        let saved_spec = self.current_spec;
        self.in_progress.push((ft, idx));

        let scope = self.spec_scope(ft, idx);
        self.current_scope = scope;
        self.current_spec = Some((ft, idx));

        self.infer_block_in_scope(body, scope);

        if !self.incomplete && self.types.specialization(ft, idx as usize).ret.is_none() {
            self.types.specialization_mut(ft, idx as usize).ret = Some(TypeRegistry::VOID);
        }

        self.in_progress.pop();
        self.current_spec = saved_spec;
        self.current_scope = saved_scope;
        let stale = self.incomplete;
        self.incomplete = saved_incomplete;
        let buf = self.diag_stack.pop().expect("diag stack underflow");
        self.unit_diags.insert(Unit::Spec(ft, idx), buf);
        if stale {
            self.mark_stale(Unit::Spec(ft, idx));
        }
    }

    /// The parameter scope of a specialization, created once and reused
    /// by re-walks.
    fn spec_scope(&mut self, ft: TypeId, idx: u32) -> ScopeId {
        if let Some(&s) = self.spec_scopes.get(&(ft, idx)) {
            return s;
        }
        let parent = self.fn_scopes.get(&ft).copied();
        let scope = self.symbols.new_scope(parent);
        let decl = self.fn_decls.get(&ft).copied();
        if let Some(decl) = decl {
            let params = match self.ast.kind(decl) {
                NodeKind::FunctionDecl { params, .. } => params.clone(),
                _ => Vec::new(),
            };
            let spec_params = self.types.specialization(ft, idx as usize).params.clone();
            for (i, p) in params.iter().enumerate() {
                let ty = spec_params
                    .get(i)
                    .copied()
                    .unwrap_or(TypeRegistry::UNKNOWN);
                self.symbols.insert(
                    scope,
                    Symbol {
                        name: p.name.clone(),
                        kind: SymbolKind::Parameter,
                        ty,
                        decl: Some(decl),
                    },
                );
            }
        }
        self.spec_scopes.insert((ft, idx), scope);
        scope
    }

    // ── Declarations (hoisted) ───────────────────────────────────────

    fn declare(&mut self, program: NodeId, scope: ScopeId) {
        let stmts = match self.ast.kind(program) {
            NodeKind::Program { stmts } => stmts.clone(),
            _ => return,
        };

        // Struct and enum names first, so fields can reference any of
        // them (self-references included)...
        for &stmt in &stmts {
            match self.ast.kind(stmt).clone() {
                NodeKind::StructDecl { name, .. } => {
                    let loc = self.ast.loc(stmt);
                    match self.types.create_struct_type(&name, Vec::new(), Some(stmt)) {
                        Ok(id) => self.ast.set_ty(stmt, id),
                        Err(RegistryError::DuplicateName(n)) => self.error(
                            codes::TE_DUPLICATE_DECLARATION,
                            loc,
                            format!("'{n}' is already declared in this scope"),
                        ),
                    }
                }
                NodeKind::EnumDecl { name, .. } => {
                    let loc = self.ast.loc(stmt);
                    match self.types.create_enum_shell(&name, Some(stmt)) {
                        Ok(id) => self.ast.set_ty(stmt, id),
                        Err(RegistryError::DuplicateName(n)) => self.error(
                            codes::TE_DUPLICATE_DECLARATION,
                            loc,
                            format!("'{n}' is already declared in this scope"),
                        ),
                    }
                }
                _ => {}
            }
        }

        // ...then field lists...
        for &stmt in &stmts {
            match self.ast.kind(stmt).clone() {
                NodeKind::StructDecl { fields, .. } => {
                    let id = self.ast.ty(stmt);
                    if id == TypeRegistry::UNKNOWN {
                        continue;
                    }
                    let loc = self.ast.loc(stmt);
                    let props = fields
                        .iter()
                        .map(|(n, ann)| (n.clone(), self.resolve_ann(ann, &loc)))
                        .collect();
                    self.types.set_object_properties(id, props);
                }
                NodeKind::EnumDecl { variants, .. } => {
                    let id = self.ast.ty(stmt);
                    if id == TypeRegistry::UNKNOWN {
                        continue;
                    }
                    let loc = self.ast.loc(stmt);
                    let built: Vec<(String, Vec<(String, TypeId)>)> = variants
                        .iter()
                        .map(|(vname, fields)| {
                            let fs = fields
                                .iter()
                                .map(|(n, ann)| (n.clone(), self.resolve_ann(ann, &loc)))
                                .collect();
                            (vname.clone(), fs)
                        })
                        .collect();
                    self.types.fill_enum_variants(id, built);
                    builtins::register_enum_impls(self.traits, id);
                }
                _ => {}
            }
        }

        // ...then functions, hoisted so calls may precede declarations.
        for &stmt in &stmts {
            if let NodeKind::FunctionDecl {
                name,
                params,
                ret_ann,
                body,
                variadic,
                is_extern,
            } = self.ast.kind(stmt).clone()
            {
                let loc = self.ast.loc(stmt);
                let param_tys: Vec<TypeId> = params
                    .iter()
                    .map(|p| {
                        p.ann
                            .as_ref()
                            .map(|a| self.resolve_ann(a, &p.loc))
                            .unwrap_or(TypeRegistry::UNKNOWN)
                    })
                    .collect();
                let ret = match &ret_ann {
                    Some(a) => self.resolve_ann(a, &loc),
                    None if is_extern => TypeRegistry::VOID,
                    None => TypeRegistry::UNKNOWN,
                };
                match self.types.create_function_type(
                    &name,
                    &param_tys,
                    ret,
                    body,
                    variadic,
                    is_extern,
                    self.module_prefix.as_deref(),
                ) {
                    Ok(ft) => {
                        self.ast.set_ty(stmt, ft);
                        let sym = self.symbols.insert(
                            scope,
                            Symbol {
                                name: name.clone(),
                                kind: SymbolKind::Function,
                                ty: ft,
                                decl: Some(stmt),
                            },
                        );
                        self.ast.node_mut(stmt).symbol = Some(sym);
                        self.fn_types.insert(stmt, ft);
                        self.fn_decls.insert(ft, stmt);
                        self.fn_scopes.insert(ft, scope);
                    }
                    Err(RegistryError::DuplicateName(n)) => self.error(
                        codes::TE_DUPLICATE_DECLARATION,
                        loc,
                        format!("'{n}' is already declared in this scope"),
                    ),
                }
            }
        }
    }

    fn resolve_ann(&mut self, ann: &TypeAnn, loc: &SourceLoc) -> TypeId {
        match ann {
            TypeAnn::Named(name) => match self.types.find_type(name) {
                Some(t) => t,
                None => {
                    self.error(
                        codes::TE_UNDEFINED_TYPE,
                        loc.clone(),
                        format!("undefined type '{name}'"),
                    );
                    TypeRegistry::UNKNOWN
                }
            },
            TypeAnn::Array(elem) => {
                let e = self.resolve_ann(elem, loc);
                self.types.get_or_create_array_type(e)
            }
            TypeAnn::Ref { target, mutable } => {
                let t = self.resolve_ann(target, loc);
                self.types.get_or_create_ref_type(t, *mutable)
            }
        }
    }

    // ── Statements ───────────────────────────────────────────────────

    fn infer_stmts(&mut self, stmts: &[NodeId]) {
        let mut terminated = false;
        for &stmt in stmts {
            if terminated {
                let loc = self.ast.loc(stmt);
                self.warning(
                    codes::TW_UNREACHABLE_CODE,
                    loc,
                    "unreachable statement".to_string(),
                );
                break;
            }
            self.infer_stmt(stmt);
            if matches!(
                self.ast.kind(stmt),
                NodeKind::Return { .. } | NodeKind::Break | NodeKind::Continue
            ) {
                terminated = true;
            }
        }
    }

    fn infer_stmt(&mut self, id: NodeId) {
        match self.ast.kind(id).clone() {
            NodeKind::FunctionDecl { .. }
            | NodeKind::StructDecl { .. }
            | NodeKind::EnumDecl { .. } => {} // handled by declare()
            NodeKind::VarDecl {
                name,
                is_const,
                ann,
                init,
            } => self.infer_var_decl(id, &name, is_const, ann.as_ref(), init),
            NodeKind::ExprStmt { expr } => {
                self.infer_expr(expr, None);
            }
            NodeKind::Return { value } => self.infer_return(id, value),
            NodeKind::Break | NodeKind::Continue => {
                self.ast.set_ty(id, TypeRegistry::VOID);
            }
            NodeKind::Block { .. } => {
                let scope = self.scope_for(id);
                self.infer_block_in_scope(id, scope);
            }
            NodeKind::If {
                cond,
                then_blk,
                else_blk,
            } => self.infer_if(cond, then_blk, else_blk),
            NodeKind::While { cond, body } => {
                let ct = self.infer_expr(cond, None);
                self.check_bool_cond(cond, ct);
                let scope = self.scope_for(body);
                self.infer_block_in_scope(body, scope);
            }
            NodeKind::For {
                init,
                cond,
                update,
                body,
            } => {
                let for_scope = self.scope_for(id);
                let saved = self.current_scope;
                self.current_scope = for_scope;
                if let Some(i) = init {
                    self.infer_stmt(i);
                }
                if let Some(c) = cond {
                    let ct = self.infer_expr(c, None);
                    self.check_bool_cond(c, ct);
                }
                let scope = self.scope_for(body);
                self.infer_block_in_scope(body, scope);
                if let Some(u) = update {
                    self.infer_expr(u, None);
                }
                self.current_scope = saved;
            }
            _ => {
                self.infer_expr(id, None);
            }
        }
    }

    /// The stable scope for a block-like node, created as a child of the
    /// current scope on first visit.
    fn scope_for(&mut self, id: NodeId) -> ScopeId {
        if let Some(&s) = self.block_scopes.get(&id) {
            return s;
        }
        let scope = self.symbols.new_scope(Some(self.current_scope));
        self.block_scopes.insert(id, scope);
        scope
    }

    fn infer_block_in_scope(&mut self, block: NodeId, scope: ScopeId) {
        let stmts = match self.ast.kind(block) {
            NodeKind::Block { stmts } => stmts.clone(),
            // A non-block body (single statement) is walked directly.
            _ => {
                self.infer_stmt(block);
                return;
            }
        };
        let saved = self.current_scope;
        self.current_scope = scope;
        self.infer_stmts(&stmts);
        self.current_scope = saved;
        self.ast.set_ty(block, TypeRegistry::VOID);
    }

    fn infer_if(&mut self, cond: NodeId, then_blk: NodeId, else_blk: Option<NodeId>) {
        // The guarded branch's scope must exist before the condition is
        // typed: `is`-pattern bindings land there.
        let then_scope = self.scope_for(then_blk);
        let saved_pattern = self.pattern_scope.take();
        self.pattern_scope = Some(then_scope);
        let ct = self.infer_expr(cond, None);
        self.pattern_scope = saved_pattern;
        self.check_bool_cond(cond, ct);

        self.infer_block_in_scope(then_blk, then_scope);
        if let Some(e) = else_blk {
            let scope = self.scope_for(e);
            self.infer_block_in_scope(e, scope);
        }
    }

    fn check_bool_cond(&mut self, cond: NodeId, ct: TypeId) {
        if ct == TypeRegistry::UNKNOWN {
            return;
        }
        if !self.types.types_equal(self.value_ty(ct), TypeRegistry::BOOL) {
            let loc = self.ast.loc(cond);
            let name = self.types.name(ct).to_string();
            self.error(
                codes::TE_CONDITION_NOT_BOOL,
                loc,
                format!("condition must be 'bool', got '{name}'"),
            );
        }
    }

    fn infer_var_decl(
        &mut self,
        id: NodeId,
        name: &str,
        is_const: bool,
        ann: Option<&TypeAnn>,
        init: Option<NodeId>,
    ) {
        let loc = self.ast.loc(id);
        let ann_ty = ann.map(|a| self.resolve_ann(a, &loc));
        let init_ty = init.map(|i| {
            self.infer_expr(i, ann_ty.filter(|&t| t != TypeRegistry::UNKNOWN))
        });

        let ty = match (ann_ty, init_ty) {
            (Some(a), Some(i)) => {
                if a != TypeRegistry::UNKNOWN
                    && i != TypeRegistry::UNKNOWN
                    && !self.types.types_equal(a, i)
                {
                    let an = self.types.name(a).to_string();
                    let inn = self.types.name(i).to_string();
                    self.error(
                        codes::TE_TYPE_MISMATCH,
                        loc.clone(),
                        format!("expected '{an}', got '{inn}'"),
                    );
                }
                a
            }
            (Some(a), None) => a,
            (None, Some(i)) => i,
            (None, None) => TypeRegistry::UNKNOWN,
        };
        self.ast.set_ty(id, ty);

        match self.ast.node(id).symbol {
            Some(sym) => {
                // Re-walk: the binding already exists, refresh its type.
                self.symbols.set_type(sym, ty);
            }
            None => {
                if self.symbols.lookup_local(self.current_scope, name).is_some() {
                    self.error(
                        codes::TE_DUPLICATE_DECLARATION,
                        loc,
                        format!("'{name}' is already declared in this scope"),
                    );
                }
                let sym = self.symbols.insert(
                    self.current_scope,
                    Symbol {
                        name: name.to_string(),
                        kind: SymbolKind::Variable { is_const },
                        ty,
                        decl: Some(id),
                    },
                );
                self.ast.node_mut(id).symbol = Some(sym);
            }
        }
    }

    fn infer_return(&mut self, id: NodeId, value: Option<NodeId>) {
        let expected = self
            .current_spec
            .and_then(|(f, i)| self.types.specialization(f, i as usize).ret)
            .filter(|&t| t != TypeRegistry::UNKNOWN);
        let vt = match value {
            Some(v) => self.infer_expr(v, expected),
            None => TypeRegistry::VOID,
        };
        self.ast.set_ty(id, TypeRegistry::VOID);

        let Some((f, i)) = self.current_spec else {
            return;
        };
        if vt == TypeRegistry::UNKNOWN {
            return;
        }
        match self.types.specialization(f, i as usize).ret {
            None => self.types.specialization_mut(f, i as usize).ret = Some(vt),
            Some(prev) => {
                if prev != TypeRegistry::UNKNOWN && !self.types.types_equal(prev, vt) {
                    let loc = self.ast.loc(id);
                    let pn = self.types.name(prev).to_string();
                    let vn = self.types.name(vt).to_string();
                    self.error(
                        codes::TE_RETURN_TYPE_MISMATCH,
                        loc,
                        format!("return type '{vn}' conflicts with earlier return type '{pn}'"),
                    );
                }
            }
        }
    }

    // ── Expressions ──────────────────────────────────────────────────

    /// Infer an expression, record its type on the node, and return it.
    /// `expected` is the context type used to pick literal widths.
    pub fn infer_expr(&mut self, id: NodeId, expected: Option<TypeId>) -> TypeId {
        let ty = match self.ast.kind(id).clone() {
            NodeKind::NumberLit { has_decimal, .. } => self.number_type(expected, has_decimal),
            NodeKind::StringLit { .. } => TypeRegistry::STR,
            NodeKind::BoolLit { .. } => TypeRegistry::BOOL,
            NodeKind::Ident { name } => self.infer_ident(id, &name),
            NodeKind::ObjectLit { props } => self.infer_object_lit(&props),
            NodeKind::ArrayLit { elems } => self.infer_array_lit(id, &elems, expected),
            NodeKind::Binary { op, lhs, rhs } => self.infer_binary(id, op, lhs, rhs),
            NodeKind::Unary { op, operand } => self.infer_unary(id, op, operand),
            NodeKind::Assign { target, value } => self.infer_assign(id, target, value),
            NodeKind::CompoundAssign { op, target, value } => {
                self.infer_compound_assign(id, op, target, value)
            }
            NodeKind::IncDec {
                increment, target, ..
            } => self.infer_incdec(id, increment, target),
            NodeKind::Call { callee, args } => self.infer_call(id, callee, &args),
            NodeKind::Member { object, property } => self.infer_member(id, object, &property),
            NodeKind::Index { object, index } => self.infer_index(id, object, index, false),
            NodeKind::IsPattern {
                value,
                enum_name,
                variant,
                bindings,
            } => self.infer_is_pattern(id, value, &enum_name, &variant, &bindings),
            NodeKind::PatternBinding { .. } => self.ast.ty(id),
            _ => {
                // Statement nodes reached through expression position.
                self.infer_stmt(id);
                return self.ast.ty(id);
            }
        };
        self.ast.set_ty(id, ty);
        ty
    }

    fn number_type(&self, expected: Option<TypeId>, has_decimal: bool) -> TypeId {
        if let Some(e) = expected {
            let e = self.value_ty(e);
            match self.types.kind(e) {
                TypeKind::Primitive(sable_types::Primitive::Int { .. }) if !has_decimal => {
                    return e;
                }
                TypeKind::Primitive(sable_types::Primitive::Double) => {
                    return TypeRegistry::DOUBLE;
                }
                _ => {}
            }
        }
        if has_decimal {
            TypeRegistry::DOUBLE
        } else {
            TypeRegistry::I32
        }
    }

    /// Alias-resolve and strip one level of ref: the "value type" used
    /// for operator, member, and index resolution.
    fn value_ty(&self, t: TypeId) -> TypeId {
        let t = self.types.resolve_alias(t);
        match self.types.kind(t) {
            TypeKind::Ref { target, .. } => self.types.resolve_alias(*target),
            _ => t,
        }
    }

    fn infer_ident(&mut self, id: NodeId, name: &str) -> TypeId {
        match self.symbols.lookup(self.current_scope, name) {
            Some(sym) => {
                self.ast.node_mut(id).symbol = Some(sym);
                self.symbols.symbol(sym).ty
            }
            None => {
                let loc = self.ast.loc(id);
                self.error(
                    codes::TE_UNDEFINED_VARIABLE,
                    loc,
                    format!("undefined variable '{name}'"),
                );
                TypeRegistry::UNKNOWN
            }
        }
    }

    fn infer_object_lit(&mut self, props: &[(String, NodeId)]) -> TypeId {
        let mut typed = Vec::with_capacity(props.len());
        let mut unknown = false;
        for (name, value) in props {
            let vt = self.infer_expr(*value, None);
            if vt == TypeRegistry::UNKNOWN {
                unknown = true;
            }
            typed.push((name.clone(), vt));
        }
        if unknown {
            return TypeRegistry::UNKNOWN;
        }
        self.types.intern_object_type(typed)
    }

    fn infer_array_lit(
        &mut self,
        id: NodeId,
        elems: &[NodeId],
        expected: Option<TypeId>,
    ) -> TypeId {
        let expected_elem = expected.and_then(|e| match self.types.kind(self.value_ty(e)) {
            TypeKind::Array { elem } => Some(*elem),
            _ => None,
        });
        let mut elem_ty = expected_elem;
        for &e in elems {
            let et = self.infer_expr(e, elem_ty);
            if et == TypeRegistry::UNKNOWN {
                return TypeRegistry::UNKNOWN;
            }
            match elem_ty {
                None => elem_ty = Some(et),
                Some(t) => {
                    if !self.types.types_equal(t, et) {
                        let loc = self.ast.loc(e);
                        let tn = self.types.name(t).to_string();
                        let en = self.types.name(et).to_string();
                        self.error(
                            codes::TE_TYPE_MISMATCH,
                            loc,
                            format!("expected '{tn}', got '{en}'"),
                        );
                    }
                }
            }
        }
        match elem_ty {
            Some(t) => self.types.get_or_create_array_type(t),
            None => {
                // Empty literal with no context to type it.
                let loc = self.ast.loc(id);
                self.error(
                    codes::TE_TYPE_MISMATCH,
                    loc,
                    "cannot infer the element type of an empty array".to_string(),
                );
                TypeRegistry::UNKNOWN
            }
        }
    }

    fn infer_binary(&mut self, id: NodeId, op: BinaryOp, lhs: NodeId, rhs: NodeId) -> TypeId {
        let lt = self.infer_expr(lhs, None);
        // A bare literal adopts the width of an already-typed left
        // operand (literal widening happens at literals, never values).
        let rhs_expected = if matches!(self.ast.kind(rhs), NodeKind::NumberLit { .. }) {
            let l = self.value_ty(lt);
            match self.types.kind(l) {
                TypeKind::Primitive(sable_types::Primitive::Int { .. })
                | TypeKind::Primitive(sable_types::Primitive::Double) => Some(l),
                _ => None,
            }
        } else {
            None
        };
        let rt = self.infer_expr(rhs, rhs_expected);
        if lt == TypeRegistry::UNKNOWN || rt == TypeRegistry::UNKNOWN {
            return TypeRegistry::UNKNOWN;
        }

        let l = self.value_ty(lt);
        let r = self.value_ty(rt);

        // String concatenation stringifies a non-string operand through
        // its Display impl.
        if op == BinaryOp::Add
            && ((l == TypeRegistry::STR) != (r == TypeRegistry::STR))
        {
            let other = if l == TypeRegistry::STR { r } else { l };
            let display = self.traits.trait_id("Display");
            let ok = display
                .map(|d| self.traits.has_impl(d, other, &[], self.types))
                .unwrap_or(false);
            if !ok {
                let loc = self.ast.loc(id);
                let on = self.types.name(other).to_string();
                self.error(
                    codes::TE_TRAIT_NOT_IMPLEMENTED,
                    loc,
                    format!("trait 'Display' is not implemented for '{on}'"),
                );
                return TypeRegistry::UNKNOWN;
            }
            let add = self.traits.trait_id("Add").expect("Add is built in");
            self.ast.node_mut(id).impl_ref = self.traits.find_impl_ref(
                add,
                TypeRegistry::STR,
                &[TypeRegistry::STR],
                self.types,
            );
            return TypeRegistry::STR;
        }

        let (trait_name, method) = op.trait_method();
        let Some(trait_id) = self.traits.trait_id(trait_name) else {
            return TypeRegistry::UNKNOWN;
        };
        match self.traits.find_impl_ref(trait_id, l, &[r], self.types) {
            Some(r_ref) => {
                self.ast.node_mut(id).impl_ref = Some(r_ref);
                let imp = self.traits.impl_by_ref(r_ref);
                debug_assert!(imp.method(method).is_some());
                imp.assoc("Output").unwrap_or(TypeRegistry::UNKNOWN)
            }
            None => {
                let loc = self.ast.loc(id);
                let ln = self.types.name(l).to_string();
                let rn = self.types.name(r).to_string();
                self.error(
                    codes::TE_OPERATOR_NOT_SUPPORTED,
                    loc,
                    format!("operator '{op}' is not supported for '{ln}' and '{rn}'"),
                );
                TypeRegistry::UNKNOWN
            }
        }
    }

    fn infer_unary(&mut self, id: NodeId, op: UnaryOp, operand: NodeId) -> TypeId {
        let ot = self.infer_expr(operand, None);
        if ot == TypeRegistry::UNKNOWN {
            return TypeRegistry::UNKNOWN;
        }
        let o = self.value_ty(ot);
        let (trait_name, method) = op.trait_method();
        let trait_id = self.traits.trait_id(trait_name);
        match trait_id.and_then(|t| self.traits.find_impl_ref(t, o, &[], self.types)) {
            Some(r_ref) => {
                self.ast.node_mut(id).impl_ref = Some(r_ref);
                let imp = self.traits.impl_by_ref(r_ref);
                debug_assert!(imp.method(method).is_some());
                imp.assoc("Output").unwrap_or(TypeRegistry::UNKNOWN)
            }
            None => {
                let loc = self.ast.loc(id);
                let on = self.types.name(o).to_string();
                self.error(
                    codes::TE_OPERATOR_NOT_SUPPORTED,
                    loc,
                    format!("operator '{op}' is not supported for '{on}'"),
                );
                TypeRegistry::UNKNOWN
            }
        }
    }

    fn infer_assign(&mut self, id: NodeId, target: NodeId, value: NodeId) -> TypeId {
        let tt = match self.ast.kind(target).clone() {
            NodeKind::Index { object, index } => {
                let t = self.infer_index(target, object, index, true);
                self.ast.set_ty(target, t);
                t
            }
            _ => self.infer_expr(target, None),
        };
        // Constness: only direct variable targets carry it.
        if let Some(sym) = self.ast.node(target).symbol {
            let s = self.symbols.symbol(sym);
            if matches!(s.kind, SymbolKind::Variable { is_const: true }) {
                let name = s.name.clone();
                let loc = self.ast.loc(id);
                self.error(
                    codes::TE_ASSIGN_TO_CONST,
                    loc,
                    format!("cannot assign to constant '{name}'"),
                );
            }
        }
        let expected = Some(tt).filter(|&t| t != TypeRegistry::UNKNOWN);
        let vt = self.infer_expr(value, expected);
        if tt != TypeRegistry::UNKNOWN
            && vt != TypeRegistry::UNKNOWN
            && !self.types.types_equal(self.value_ty(tt), self.value_ty(vt))
        {
            let loc = self.ast.loc(id);
            let tn = self.types.name(tt).to_string();
            let vn = self.types.name(vt).to_string();
            self.error(
                codes::TE_TYPE_MISMATCH,
                loc,
                format!("expected '{tn}', got '{vn}'"),
            );
        }
        tt
    }

    fn infer_compound_assign(
        &mut self,
        id: NodeId,
        op: AssignOp,
        target: NodeId,
        value: NodeId,
    ) -> TypeId {
        let tt = self.infer_expr(target, None);
        let expected = Some(tt).filter(|&t| t != TypeRegistry::UNKNOWN);
        let vt = self.infer_expr(value, expected);
        if tt == TypeRegistry::UNKNOWN || vt == TypeRegistry::UNKNOWN {
            return TypeRegistry::UNKNOWN;
        }
        let t = self.value_ty(tt);
        let v = self.value_ty(vt);
        let (trait_name, method) = op.trait_method();
        let trait_id = self.traits.trait_id(trait_name);
        match trait_id.and_then(|tr| self.traits.find_impl_ref(tr, t, &[v], self.types)) {
            Some(r_ref) => {
                self.ast.node_mut(id).impl_ref = Some(r_ref);
                let imp = self.traits.impl_by_ref(r_ref);
                debug_assert!(imp.method(method).is_some());
                t
            }
            None => {
                let loc = self.ast.loc(id);
                let tn = self.types.name(t).to_string();
                let vn = self.types.name(v).to_string();
                self.error(
                    codes::TE_OPERATOR_NOT_SUPPORTED,
                    loc,
                    format!("operator '{op}' is not supported for '{tn}' and '{vn}'"),
                );
                TypeRegistry::UNKNOWN
            }
        }
    }

    fn infer_incdec(&mut self, id: NodeId, increment: bool, target: NodeId) -> TypeId {
        let tt = self.infer_expr(target, None);
        if tt == TypeRegistry::UNKNOWN {
            return TypeRegistry::UNKNOWN;
        }
        let t = self.value_ty(tt);
        let trait_name = if increment { "AddAssign" } else { "SubAssign" };
        let trait_id = self.traits.trait_id(trait_name);
        match trait_id.and_then(|tr| self.traits.find_impl_ref(tr, t, &[t], self.types)) {
            Some(r_ref) => {
                self.ast.node_mut(id).impl_ref = Some(r_ref);
                t
            }
            None => {
                let loc = self.ast.loc(id);
                let op = if increment { "++" } else { "--" };
                let tn = self.types.name(t).to_string();
                self.error(
                    codes::TE_OPERATOR_NOT_SUPPORTED,
                    loc,
                    format!("operator '{op}' is not supported for '{tn}'"),
                );
                TypeRegistry::UNKNOWN
            }
        }
    }

    fn infer_index(&mut self, id: NodeId, object: NodeId, index: NodeId, write: bool) -> TypeId {
        let ot = self.infer_expr(object, None);
        if ot == TypeRegistry::UNKNOWN {
            self.infer_expr(index, None);
            return TypeRegistry::UNKNOWN;
        }
        let o = self.value_ty(ot);

        // Builtin indexables get their impls on demand; the index
        // expression adopts the Idx type so bare literals fit.
        let idx_expected = match self.types.kind(o) {
            TypeKind::Array { .. } => {
                self.traits.ensure_index_impl(self.types, o);
                self.traits.ensure_ref_index_impl(self.types, o);
                Some(TypeRegistry::I32)
            }
            TypeKind::Primitive(sable_types::Primitive::Str) => {
                self.traits.ensure_index_impl(self.types, o);
                self.traits.ensure_ref_index_impl(self.types, o);
                Some(TypeRegistry::USIZE)
            }
            _ => None,
        };
        let it = self.infer_expr(index, idx_expected);
        if it == TypeRegistry::UNKNOWN {
            return TypeRegistry::UNKNOWN;
        }
        let i = self.types.resolve_alias(it);

        let (trait_name, method) = if write {
            ("RefIndex", "ref_index")
        } else {
            ("Index", "index")
        };
        let trait_id = self.traits.trait_id(trait_name);
        match trait_id.and_then(|t| self.traits.find_impl_ref(t, o, &[i], self.types)) {
            Some(r_ref) => {
                self.ast.node_mut(id).impl_ref = Some(r_ref);
                let imp = self.traits.impl_by_ref(r_ref);
                debug_assert!(imp.method(method).is_some());
                imp.assoc("Output").unwrap_or(TypeRegistry::UNKNOWN)
            }
            None => {
                let loc = self.ast.loc(id);
                let on = self.types.name(o).to_string();
                self.error(
                    codes::TE_NOT_INDEXABLE,
                    loc,
                    format!("type '{on}' cannot be indexed"),
                );
                TypeRegistry::UNKNOWN
            }
        }
    }

    fn infer_member(&mut self, id: NodeId, object: NodeId, property: &str) -> TypeId {
        // Namespace member or bare enum variant?
        if let NodeKind::Ident { name } = self.ast.kind(object).clone() {
            if let Some(sym) = self.symbols.lookup(self.current_scope, &name) {
                if let SymbolKind::Namespace { exports } = self.symbols.symbol(sym).kind {
                    self.ast.node_mut(object).symbol = Some(sym);
                    self.ast.set_ty(object, TypeRegistry::VOID);
                    return match self.symbols.lookup_local(exports, property) {
                        Some(m) => {
                            self.ast.node_mut(id).symbol = Some(m);
                            self.symbols.symbol(m).ty
                        }
                        None => {
                            let loc = self.ast.loc(id);
                            self.error(
                                codes::TE_UNKNOWN_PROPERTY,
                                loc,
                                format!("type '{name}' has no property '{property}'"),
                            );
                            TypeRegistry::UNKNOWN
                        }
                    };
                }
            } else if let Some(et) = self.types.find_type(&name) {
                if let Some(variants) = self.types.enum_variants(et) {
                    let found = variants
                        .iter()
                        .position(|v| v.name == property)
                        .map(|i| (i, variants[i].fields.len()));
                    self.ast.set_ty(object, et);
                    return match found {
                        Some((vi, 0)) => {
                            self.ast.node_mut(id).prop_index = Some(vi as u32);
                            et
                        }
                        Some((_, n)) => {
                            let loc = self.ast.loc(id);
                            self.error(
                                codes::TE_WRONG_ARGUMENT_COUNT,
                                loc,
                                format!("'{name}.{property}' expects {n} argument(s), got 0"),
                            );
                            TypeRegistry::UNKNOWN
                        }
                        None => {
                            let loc = self.ast.loc(id);
                            self.error(
                                codes::TE_UNKNOWN_VARIANT,
                                loc,
                                format!("enum '{name}' has no variant '{property}'"),
                            );
                            TypeRegistry::UNKNOWN
                        }
                    };
                }
            }
        }

        let ot = self.infer_expr(object, None);
        if ot == TypeRegistry::UNKNOWN {
            return TypeRegistry::UNKNOWN;
        }
        let o = self.value_ty(ot);
        match self.types.kind(o).clone() {
            TypeKind::Object(obj) => match obj.property_index(property) {
                Some(i) => {
                    self.ast.node_mut(id).prop_index = Some(i as u32);
                    obj.properties[i].1
                }
                None => {
                    let loc = self.ast.loc(id);
                    let on = self.types.name(o).to_string();
                    self.error(
                        codes::TE_UNKNOWN_PROPERTY,
                        loc,
                        format!("type '{on}' has no property '{property}'"),
                    );
                    TypeRegistry::UNKNOWN
                }
            },
            TypeKind::Array { .. } | TypeKind::Primitive(sable_types::Primitive::Str)
                if property == "length" =>
            {
                let out = self
                    .traits
                    .ensure_length_impl(self.types, o)
                    .expect("length impl for builtin");
                let length = self.traits.trait_id("Length").expect("Length defined");
                self.ast.node_mut(id).impl_ref =
                    self.traits.find_impl_ref(length, o, &[], self.types);
                out
            }
            _ => {
                let loc = self.ast.loc(id);
                let on = self.types.name(o).to_string();
                self.error(
                    codes::TE_UNKNOWN_PROPERTY,
                    loc,
                    format!("type '{on}' has no property '{property}'"),
                );
                TypeRegistry::UNKNOWN
            }
        }
    }

    fn infer_is_pattern(
        &mut self,
        id: NodeId,
        value: NodeId,
        enum_name: &str,
        variant: &str,
        bindings: &[NodeId],
    ) -> TypeId {
        let vt = self.infer_expr(value, None);
        let loc = self.ast.loc(id);

        let Some(et) = self.types.find_type(enum_name) else {
            self.error(
                codes::TE_UNDEFINED_TYPE,
                loc,
                format!("undefined type '{enum_name}'"),
            );
            return TypeRegistry::UNKNOWN;
        };
        let Some(variants) = self.types.enum_variants(et) else {
            self.error(
                codes::TE_UNDEFINED_TYPE,
                loc,
                format!("undefined type '{enum_name}'"),
            );
            return TypeRegistry::UNKNOWN;
        };
        let variants: Vec<_> = variants.to_vec();

        if vt != TypeRegistry::UNKNOWN && !self.types.types_equal(self.value_ty(vt), et) {
            let vn = self.types.name(vt).to_string();
            self.error(
                codes::TE_TYPE_MISMATCH,
                loc.clone(),
                format!("expected '{enum_name}', got '{vn}'"),
            );
        }

        let Some(vi) = variants.iter().position(|v| v.name == variant) else {
            self.error(
                codes::TE_UNKNOWN_VARIANT,
                loc,
                format!("enum '{enum_name}' has no variant '{variant}'"),
            );
            return TypeRegistry::UNKNOWN;
        };
        let fields = variants[vi].fields.clone();
        if bindings.len() != fields.len() {
            self.error(
                codes::TE_WRONG_ARGUMENT_COUNT,
                loc,
                format!(
                    "'{enum_name}.{variant}' expects {} binding(s), got {}",
                    fields.len(),
                    bindings.len()
                ),
            );
        }
        self.ast.node_mut(id).prop_index = Some(vi as u32);

        let scope = self.pattern_scope.unwrap_or(self.current_scope);
        for (b, (_, fty)) in bindings.iter().zip(fields.iter()) {
            self.ast.set_ty(*b, *fty);
            let name = match self.ast.kind(*b) {
                NodeKind::PatternBinding { name } => name.clone(),
                _ => continue,
            };
            match self.ast.node(*b).symbol {
                Some(sym) => self.symbols.set_type(sym, *fty),
                None => {
                    let sym = self.symbols.insert(
                        scope,
                        Symbol {
                            name,
                            kind: SymbolKind::Variable { is_const: true },
                            ty: *fty,
                            decl: Some(*b),
                        },
                    );
                    self.ast.node_mut(*b).symbol = Some(sym);
                }
            }
        }
        TypeRegistry::BOOL
    }

    // ── Calls and specialization ─────────────────────────────────────

    fn infer_call(&mut self, id: NodeId, callee: NodeId, args: &[NodeId]) -> TypeId {
        match self.ast.kind(callee).clone() {
            NodeKind::Ident { name } => {
                let Some(sym) = self.symbols.lookup(self.current_scope, &name) else {
                    let loc = self.ast.loc(callee);
                    self.error(
                        codes::TE_UNDEFINED_VARIABLE,
                        loc,
                        format!("undefined variable '{name}'"),
                    );
                    self.infer_args_only(args);
                    return TypeRegistry::UNKNOWN;
                };
                self.ast.node_mut(callee).symbol = Some(sym);
                let sym_ty = self.symbols.symbol(sym).ty;
                self.ast.set_ty(callee, sym_ty);
                if self.types.function(sym_ty).is_none() {
                    let loc = self.ast.loc(callee);
                    self.error(
                        codes::TE_NOT_A_FUNCTION,
                        loc,
                        format!("'{name}' is not a function"),
                    );
                    self.infer_args_only(args);
                    return TypeRegistry::UNKNOWN;
                }
                self.infer_plain_call(id, sym_ty, args, &name)
            }
            NodeKind::Member { object, property } => {
                self.infer_callee_member(id, callee, object, &property, args)
            }
            _ => {
                let ct = self.infer_expr(callee, None);
                if self.types.function(ct).is_some() {
                    self.infer_plain_call(id, ct, args, "<expr>")
                } else {
                    if ct != TypeRegistry::UNKNOWN {
                        let loc = self.ast.loc(callee);
                        let cn = self.types.name(ct).to_string();
                        self.error(
                            codes::TE_NOT_A_FUNCTION,
                            loc,
                            format!("'{cn}' is not a function"),
                        );
                    }
                    self.infer_args_only(args);
                    TypeRegistry::UNKNOWN
                }
            }
        }
    }

    fn infer_args_only(&mut self, args: &[NodeId]) {
        for &a in args {
            self.infer_expr(a, None);
        }
    }

    /// Call through a `a.b(...)` callee: namespace function, enum
    /// variant construction, or trait method dispatch.
    fn infer_callee_member(
        &mut self,
        id: NodeId,
        callee: NodeId,
        object: NodeId,
        property: &str,
        args: &[NodeId],
    ) -> TypeId {
        if let NodeKind::Ident { name } = self.ast.kind(object).clone() {
            if let Some(sym) = self.symbols.lookup(self.current_scope, &name) {
                if let SymbolKind::Namespace { exports } = self.symbols.symbol(sym).kind {
                    self.ast.node_mut(object).symbol = Some(sym);
                    self.ast.set_ty(object, TypeRegistry::VOID);
                    match self.symbols.lookup_local(exports, property) {
                        Some(m) => {
                            self.ast.node_mut(callee).symbol = Some(m);
                            let ft = self.symbols.symbol(m).ty;
                            self.ast.set_ty(callee, ft);
                            if self.types.function(ft).is_none() {
                                let loc = self.ast.loc(callee);
                                self.error(
                                    codes::TE_NOT_A_FUNCTION,
                                    loc,
                                    format!("'{name}.{property}' is not a function"),
                                );
                                self.infer_args_only(args);
                                return TypeRegistry::UNKNOWN;
                            }
                            return self.infer_plain_call(id, ft, args, property);
                        }
                        None => {
                            let loc = self.ast.loc(callee);
                            self.error(
                                codes::TE_UNKNOWN_PROPERTY,
                                loc,
                                format!("type '{name}' has no property '{property}'"),
                            );
                            self.infer_args_only(args);
                            return TypeRegistry::UNKNOWN;
                        }
                    }
                }
            } else if let Some(et) = self.types.find_type(&name) {
                if self.types.enum_variants(et).is_some() {
                    return self.infer_enum_ctor(id, callee, object, et, property, args);
                }
            }
        }

        // Method call on a value.
        let ot = self.infer_expr(object, None);
        if ot == TypeRegistry::UNKNOWN {
            self.infer_args_only(args);
            return TypeRegistry::UNKNOWN;
        }
        let recv = self.value_ty(ot);

        // Builtin receivers get their impls on demand, keyed by the
        // method being asked for.
        match self.types.kind(recv) {
            TypeKind::Array { .. } => {
                if property == "len" {
                    self.traits.ensure_length_impl(self.types, recv);
                }
            }
            TypeKind::Primitive(sable_types::Primitive::Str) => match property {
                "len" => {
                    self.traits.ensure_length_impl(self.types, recv);
                }
                "to_c_str" => {
                    self.traits.ensure_cstr_impl(self.types, recv);
                }
                _ => {}
            },
            _ => {}
        }

        // A function-typed property is callable.
        if let TypeKind::Object(obj) = self.types.kind(recv).clone() {
            if let Some(i) = obj.property_index(property) {
                let pt = obj.properties[i].1;
                if self.types.function(pt).is_some() {
                    self.ast.node_mut(callee).prop_index = Some(i as u32);
                    self.ast.set_ty(callee, pt);
                    return self.infer_plain_call(id, pt, args, property);
                }
            }
        }

        let hits = self.traits.find_method(property, recv, self.types);
        let Some(&(_, imp_ptr, kind_ptr)) = hits.first() else {
            let loc = self.ast.loc(callee);
            let rn = self.types.name(recv).to_string();
            self.error(
                codes::TE_METHOD_NOT_FOUND,
                loc,
                format!("no method '{property}' on type '{rn}'"),
            );
            self.infer_args_only(args);
            return TypeRegistry::UNKNOWN;
        };
        let trait_id = hits[0].0;
        let output = imp_ptr.assoc("Output");
        let bindings = imp_ptr.param_bindings.clone();
        let kind = kind_ptr.clone();
        let r_ref = self
            .traits
            .find_impl_ref(trait_id, recv, &bindings, self.types);
        self.ast.node_mut(callee).impl_ref = r_ref;
        self.ast.node_mut(id).impl_ref = r_ref;

        match kind {
            sable_types::MethodKind::Function(decl) => {
                let Some(&ft) = self.fn_types.get(&decl) else {
                    self.infer_args_only(args);
                    return TypeRegistry::UNKNOWN;
                };
                // The receiver becomes the leading argument.
                let mut arg_tys = vec![ot];
                for &a in args {
                    arg_tys.push(self.infer_expr(a, None));
                }
                if arg_tys.iter().any(|&t| t == TypeRegistry::UNKNOWN) {
                    return TypeRegistry::UNKNOWN;
                }
                self.finish_call(id, ft, &arg_tys)
            }
            sable_types::MethodKind::Intrinsic(_) | sable_types::MethodKind::External(_) => {
                self.infer_args_only(args);
                let trait_name = self.traits.get(trait_id).name.clone();
                match output {
                    Some(t) => t,
                    None if trait_name == "Display" => TypeRegistry::STR,
                    None => TypeRegistry::VOID,
                }
            }
        }
    }

    fn infer_enum_ctor(
        &mut self,
        id: NodeId,
        callee: NodeId,
        object: NodeId,
        et: TypeId,
        variant: &str,
        args: &[NodeId],
    ) -> TypeId {
        self.ast.set_ty(object, et);
        self.ast.set_ty(callee, et);
        let ename = self.types.name(et).to_string();
        let variants = self.types.enum_variants(et).expect("checked enum").to_vec();
        let loc = self.ast.loc(id);

        let Some(vi) = variants.iter().position(|v| v.name == variant) else {
            self.error(
                codes::TE_UNKNOWN_VARIANT,
                loc,
                format!("enum '{ename}' has no variant '{variant}'"),
            );
            self.infer_args_only(args);
            return TypeRegistry::UNKNOWN;
        };
        let fields = variants[vi].fields.clone();
        if args.len() != fields.len() {
            self.error(
                codes::TE_WRONG_ARGUMENT_COUNT,
                loc,
                format!(
                    "'{ename}.{variant}' expects {} argument(s), got {}",
                    fields.len(),
                    args.len()
                ),
            );
            self.infer_args_only(args);
            return TypeRegistry::UNKNOWN;
        }
        for (&a, (fname, fty)) in args.iter().zip(fields.iter()) {
            let at = self.infer_expr(a, Some(*fty));
            if at != TypeRegistry::UNKNOWN && !self.types.types_equal(at, *fty) {
                let aloc = self.ast.loc(a);
                let fn_ = self.types.name(*fty).to_string();
                let an = self.types.name(at).to_string();
                self.error(
                    codes::TE_TYPE_MISMATCH,
                    aloc,
                    format!("field '{fname}' expects '{fn_}', got '{an}'"),
                );
            }
        }
        self.ast.node_mut(id).prop_index = Some(vi as u32);
        self.ast.node_mut(callee).prop_index = Some(vi as u32);
        et
    }

    fn infer_plain_call(
        &mut self,
        id: NodeId,
        ft: TypeId,
        args: &[NodeId],
        fname: &str,
    ) -> TypeId {
        let (params, variadic) = {
            let f = self.types.function(ft).expect("checked function type");
            (f.params.clone(), f.variadic)
        };
        let required = params.len();
        let loc = self.ast.loc(id);

        let arity_ok = if variadic {
            args.len() >= required
        } else {
            args.len() == required
        };
        if !arity_ok {
            self.error(
                codes::TE_WRONG_ARGUMENT_COUNT,
                loc,
                format!(
                    "'{fname}' expects {required} argument(s), got {}",
                    args.len()
                ),
            );
            self.infer_args_only(args);
            return TypeRegistry::UNKNOWN;
        }

        let mut arg_tys = Vec::with_capacity(args.len());
        for (i, &a) in args.iter().enumerate() {
            let expected = params
                .get(i)
                .copied()
                .filter(|&p| p != TypeRegistry::UNKNOWN);
            let at = self.infer_expr(a, expected);
            if let Some(p) = expected {
                // A compiler-known From conversion (str -> c_str,
                // integer -> usize) bridges the remaining gap; lowering
                // consults the same impl.
                if at != TypeRegistry::UNKNOWN
                    && !self.types.spec_arg_matches(p, at)
                    && !self.traits.ensure_from_impl(self.types, p, at)
                {
                    let aloc = self.ast.loc(a);
                    let pn = self.types.name(p).to_string();
                    let an = self.types.name(at).to_string();
                    self.error(
                        codes::TE_TYPE_MISMATCH,
                        aloc,
                        format!("expected '{pn}', got '{an}'"),
                    );
                }
            }
            arg_tys.push(at);
        }

        // Brace-format validation for the builtins that take one.
        let fmt_arg = match fname {
            "format" => Some(0),
            "assert" => Some(1),
            _ => None,
        };
        if let Some(fi) = fmt_arg {
            if let Some(&fmt_node) = args.get(fi) {
                if let NodeKind::StringLit { value } = self.ast.kind(fmt_node).clone() {
                    match check_format(&value, args.len() - fi - 1) {
                        Some(FormatIssue::TooFewArgs { placeholders, args }) => self.error(
                            codes::VE_FORMAT_PLACEHOLDER_MISMATCH,
                            loc.clone(),
                            format!("format requires {placeholders} argument(s), got {args}"),
                        ),
                        Some(FormatIssue::ExtraArgs { placeholders, args }) => self.warning(
                            codes::VW_FORMAT_EXTRA_ARGS,
                            loc.clone(),
                            format!(
                                "format uses {placeholders} placeholder(s) but {args} argument(s) were given"
                            ),
                        ),
                        None => {}
                    }
                }
            }
        }

        if arg_tys
            .iter()
            .take(required)
            .any(|&t| t == TypeRegistry::UNKNOWN)
        {
            return TypeRegistry::UNKNOWN;
        }

        // Annotated parameters fix the specialization key; only
        // unannotated positions take their type from the argument.
        let mut key = arg_tys;
        for i in 0..required {
            if params[i] != TypeRegistry::UNKNOWN {
                key[i] = params[i];
            }
        }
        self.finish_call(id, ft, &key)
    }

    /// Resolve (or create) the specialization for a typed call site and
    /// take the call's type from its return slot.
    fn finish_call(&mut self, id: NodeId, ft: TypeId, arg_tys: &[TypeId]) -> TypeId {
        let (idx, created) = self.types.add_specialization(ft, arg_tys);
        let idx_u = idx as u32;
        if created {
            let (is_extern, body, ret_ann) = {
                let f = self.types.function(ft).expect("function type");
                (f.is_extern, f.body, f.ret)
            };
            if is_extern || body.is_none() {
                let ret = if ret_ann == TypeRegistry::UNKNOWN {
                    TypeRegistry::VOID
                } else {
                    ret_ann
                };
                self.types.specialization_mut(ft, idx).ret = Some(ret);
            } else {
                let clone = self.ast.clone_subtree(body.expect("checked body"));
                {
                    let s = self.types.specialization_mut(ft, idx);
                    s.body = Some(clone);
                    if ret_ann != TypeRegistry::UNKNOWN {
                        s.ret = Some(ret_ann);
                    }
                }
                self.walk_spec(ft, idx_u);
            }
        }

        self.ast.node_mut(id).callee_fn = Some(ft);
        self.ast.node_mut(id).spec_index = Some(idx_u);
        match self.types.specialization(ft, idx).ret {
            Some(t) => t,
            None => {
                // In-progress recursive callee; its return type lands in
                // a later pass.
                self.incomplete = true;
                TypeRegistry::UNKNOWN
            }
        }
    }
}
