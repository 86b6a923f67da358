//! The node arena and node kinds.
//!
//! Nodes are stored in a single `Vec` indexed by [`NodeId`]; children are
//! held by id. Every node carries its source location (copied, never
//! aliased), a type slot that stays `Unknown` until inference, and the
//! resolution slots inference fills. The deep cloner used by
//! specialization preserves locations and clears all resolution state so
//! the clone can be re-inferred under new parameter bindings.

use sable_common::{NodeId, SourceLoc};
use sable_types::{AssignOp, BinaryOp, ImplRef, TypeId, TypeRegistry, UnaryOp};

use crate::symbol::SymbolId;

/// A type annotation as written in source; resolved by inference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeAnn {
    /// A named type: `i32`, `str`, `Point`, `usize`.
    Named(String),
    /// An array annotation: `T[]`.
    Array(Box<TypeAnn>),
    /// A reference annotation: `ref<T>`.
    Ref { target: Box<TypeAnn>, mutable: bool },
}

impl TypeAnn {
    pub fn named(name: impl Into<String>) -> Self {
        TypeAnn::Named(name.into())
    }
}

/// A function parameter.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ann: Option<TypeAnn>,
    pub loc: SourceLoc,
}

/// Node kind and payload.
#[derive(Debug, Clone)]
pub enum NodeKind {
    // ── Declarations and statements ──────────────────────────────────
    Program {
        stmts: Vec<NodeId>,
    },
    FunctionDecl {
        name: String,
        params: Vec<Param>,
        ret_ann: Option<TypeAnn>,
        /// `None` for `extern` declarations.
        body: Option<NodeId>,
        variadic: bool,
        is_extern: bool,
    },
    StructDecl {
        name: String,
        fields: Vec<(String, TypeAnn)>,
    },
    EnumDecl {
        name: String,
        variants: Vec<(String, Vec<(String, TypeAnn)>)>,
    },
    VarDecl {
        name: String,
        is_const: bool,
        ann: Option<TypeAnn>,
        init: Option<NodeId>,
    },
    Block {
        stmts: Vec<NodeId>,
    },
    If {
        cond: NodeId,
        then_blk: NodeId,
        else_blk: Option<NodeId>,
    },
    While {
        cond: NodeId,
        body: NodeId,
    },
    For {
        init: Option<NodeId>,
        cond: Option<NodeId>,
        update: Option<NodeId>,
        body: NodeId,
    },
    Return {
        value: Option<NodeId>,
    },
    Break,
    Continue,
    ExprStmt {
        expr: NodeId,
    },

    // ── Expressions ──────────────────────────────────────────────────
    /// Numeric literal; the payload is always `double`, with
    /// `has_decimal` distinguishing `1` from `1.0`.
    NumberLit {
        value: f64,
        has_decimal: bool,
    },
    StringLit {
        value: String,
    },
    BoolLit {
        value: bool,
    },
    Ident {
        name: String,
    },
    ObjectLit {
        props: Vec<(String, NodeId)>,
    },
    ArrayLit {
        elems: Vec<NodeId>,
    },
    Binary {
        op: BinaryOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    Unary {
        op: UnaryOp,
        operand: NodeId,
    },
    Assign {
        target: NodeId,
        value: NodeId,
    },
    CompoundAssign {
        op: AssignOp,
        target: NodeId,
        value: NodeId,
    },
    /// `++x`, `x--`, etc. Lowered through AddAssign/SubAssign with a
    /// literal 1.
    IncDec {
        increment: bool,
        prefix: bool,
        target: NodeId,
    },
    Call {
        callee: NodeId,
        args: Vec<NodeId>,
    },
    Member {
        object: NodeId,
        property: String,
    },
    Index {
        object: NodeId,
        index: NodeId,
    },
    /// `expr is Enum.Variant(let a, let b)`; yields `bool` and binds the
    /// pattern names inside the guarded branch.
    IsPattern {
        value: NodeId,
        enum_name: String,
        variant: String,
        bindings: Vec<NodeId>,
    },
    /// One `let name` inside an `is` pattern.
    PatternBinding {
        name: String,
    },
}

/// A node: location, type slot, resolution slots, kind.
#[derive(Debug, Clone)]
pub struct Node {
    pub loc: SourceLoc,
    /// Filled by inference; `TypeRegistry::UNKNOWN` until then.
    pub ty: TypeId,
    /// Resolved binding for identifiers, declarations, and pattern
    /// bindings.
    pub symbol: Option<SymbolId>,
    /// Resolved trait impl for operator/index/member-method nodes.
    pub impl_ref: Option<ImplRef>,
    /// Property index for member accesses into object types.
    pub prop_index: Option<u32>,
    /// For calls: the callee's function type and the specialization
    /// chosen for this site.
    pub callee_fn: Option<TypeId>,
    pub spec_index: Option<u32>,
    pub kind: NodeKind,
}

/// The arena. The program root owns every node, clones included.
#[derive(Debug, Default)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, loc: SourceLoc, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            loc,
            ty: TypeRegistry::UNKNOWN,
            symbol: None,
            impl_ref: None,
            prop_index: None,
            callee_fn: None,
            spec_index: None,
            kind,
        });
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    pub fn loc(&self, id: NodeId) -> SourceLoc {
        self.nodes[id.index()].loc.clone()
    }

    pub fn ty(&self, id: NodeId) -> TypeId {
        self.nodes[id.index()].ty
    }

    pub fn set_ty(&mut self, id: NodeId, ty: TypeId) {
        self.nodes[id.index()].ty = ty;
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // ── Constructors the parser (and tests) build trees with ─────────

    pub fn program(&mut self, loc: SourceLoc, stmts: Vec<NodeId>) -> NodeId {
        self.push(loc, NodeKind::Program { stmts })
    }

    pub fn number(&mut self, loc: SourceLoc, value: f64) -> NodeId {
        let has_decimal = value.fract() != 0.0;
        self.push(loc, NodeKind::NumberLit { value, has_decimal })
    }

    /// A literal written with a decimal point, regardless of value
    /// (`1.0` is a `double` even though its fraction is zero).
    pub fn float(&mut self, loc: SourceLoc, value: f64) -> NodeId {
        self.push(
            loc,
            NodeKind::NumberLit {
                value,
                has_decimal: true,
            },
        )
    }

    pub fn string(&mut self, loc: SourceLoc, value: impl Into<String>) -> NodeId {
        self.push(
            loc,
            NodeKind::StringLit {
                value: value.into(),
            },
        )
    }

    pub fn boolean(&mut self, loc: SourceLoc, value: bool) -> NodeId {
        self.push(loc, NodeKind::BoolLit { value })
    }

    pub fn ident(&mut self, loc: SourceLoc, name: impl Into<String>) -> NodeId {
        self.push(loc, NodeKind::Ident { name: name.into() })
    }

    pub fn binary(&mut self, loc: SourceLoc, op: BinaryOp, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.push(loc, NodeKind::Binary { op, lhs, rhs })
    }

    pub fn unary(&mut self, loc: SourceLoc, op: UnaryOp, operand: NodeId) -> NodeId {
        self.push(loc, NodeKind::Unary { op, operand })
    }

    pub fn call(&mut self, loc: SourceLoc, callee: NodeId, args: Vec<NodeId>) -> NodeId {
        self.push(loc, NodeKind::Call { callee, args })
    }

    pub fn member(&mut self, loc: SourceLoc, object: NodeId, property: impl Into<String>) -> NodeId {
        self.push(
            loc,
            NodeKind::Member {
                object,
                property: property.into(),
            },
        )
    }

    pub fn index(&mut self, loc: SourceLoc, object: NodeId, index: NodeId) -> NodeId {
        self.push(loc, NodeKind::Index { object, index })
    }

    pub fn object_lit(&mut self, loc: SourceLoc, props: Vec<(String, NodeId)>) -> NodeId {
        self.push(loc, NodeKind::ObjectLit { props })
    }

    pub fn array_lit(&mut self, loc: SourceLoc, elems: Vec<NodeId>) -> NodeId {
        self.push(loc, NodeKind::ArrayLit { elems })
    }

    pub fn var_decl(
        &mut self,
        loc: SourceLoc,
        name: impl Into<String>,
        is_const: bool,
        ann: Option<TypeAnn>,
        init: Option<NodeId>,
    ) -> NodeId {
        self.push(
            loc,
            NodeKind::VarDecl {
                name: name.into(),
                is_const,
                ann,
                init,
            },
        )
    }

    pub fn assign(&mut self, loc: SourceLoc, target: NodeId, value: NodeId) -> NodeId {
        self.push(loc, NodeKind::Assign { target, value })
    }

    pub fn compound_assign(
        &mut self,
        loc: SourceLoc,
        op: AssignOp,
        target: NodeId,
        value: NodeId,
    ) -> NodeId {
        self.push(loc, NodeKind::CompoundAssign { op, target, value })
    }

    pub fn block(&mut self, loc: SourceLoc, stmts: Vec<NodeId>) -> NodeId {
        self.push(loc, NodeKind::Block { stmts })
    }

    pub fn expr_stmt(&mut self, loc: SourceLoc, expr: NodeId) -> NodeId {
        self.push(loc, NodeKind::ExprStmt { expr })
    }

    pub fn ret(&mut self, loc: SourceLoc, value: Option<NodeId>) -> NodeId {
        self.push(loc, NodeKind::Return { value })
    }

    pub fn if_stmt(
        &mut self,
        loc: SourceLoc,
        cond: NodeId,
        then_blk: NodeId,
        else_blk: Option<NodeId>,
    ) -> NodeId {
        self.push(
            loc,
            NodeKind::If {
                cond,
                then_blk,
                else_blk,
            },
        )
    }

    pub fn while_stmt(&mut self, loc: SourceLoc, cond: NodeId, body: NodeId) -> NodeId {
        self.push(loc, NodeKind::While { cond, body })
    }

    pub fn function_decl(
        &mut self,
        loc: SourceLoc,
        name: impl Into<String>,
        params: Vec<Param>,
        ret_ann: Option<TypeAnn>,
        body: Option<NodeId>,
    ) -> NodeId {
        self.push(
            loc,
            NodeKind::FunctionDecl {
                name: name.into(),
                params,
                ret_ann,
                body,
                variadic: false,
                is_extern: false,
            },
        )
    }

    pub fn extern_function_decl(
        &mut self,
        loc: SourceLoc,
        name: impl Into<String>,
        params: Vec<Param>,
        ret_ann: Option<TypeAnn>,
        variadic: bool,
    ) -> NodeId {
        self.push(
            loc,
            NodeKind::FunctionDecl {
                name: name.into(),
                params,
                ret_ann,
                body: None,
                variadic,
                is_extern: true,
            },
        )
    }

    pub fn struct_decl(
        &mut self,
        loc: SourceLoc,
        name: impl Into<String>,
        fields: Vec<(String, TypeAnn)>,
    ) -> NodeId {
        self.push(
            loc,
            NodeKind::StructDecl {
                name: name.into(),
                fields,
            },
        )
    }

    pub fn enum_decl(
        &mut self,
        loc: SourceLoc,
        name: impl Into<String>,
        variants: Vec<(String, Vec<(String, TypeAnn)>)>,
    ) -> NodeId {
        self.push(
            loc,
            NodeKind::EnumDecl {
                name: name.into(),
                variants,
            },
        )
    }

    pub fn pattern_binding(&mut self, loc: SourceLoc, name: impl Into<String>) -> NodeId {
        self.push(loc, NodeKind::PatternBinding { name: name.into() })
    }

    pub fn is_pattern(
        &mut self,
        loc: SourceLoc,
        value: NodeId,
        enum_name: impl Into<String>,
        variant: impl Into<String>,
        bindings: Vec<NodeId>,
    ) -> NodeId {
        self.push(
            loc,
            NodeKind::IsPattern {
                value,
                enum_name: enum_name.into(),
                variant: variant.into(),
                bindings,
            },
        )
    }

    // ── Cloning ──────────────────────────────────────────────────────

    /// Deep-copy a subtree for specialization.
    ///
    /// Locations are preserved; type slots revert to `Unknown` and every
    /// resolution slot (symbol, impl, property index, specialization) is
    /// cleared so inference can refill them in the clone's context.
    pub fn clone_subtree(&mut self, root: NodeId) -> NodeId {
        let Node { loc, kind, .. } = self.nodes[root.index()].clone();
        let kind = match kind {
            NodeKind::Program { stmts } => NodeKind::Program {
                stmts: self.clone_all(stmts),
            },
            NodeKind::FunctionDecl {
                name,
                params,
                ret_ann,
                body,
                variadic,
                is_extern,
            } => NodeKind::FunctionDecl {
                name,
                params,
                ret_ann,
                body: body.map(|b| self.clone_subtree(b)),
                variadic,
                is_extern,
            },
            NodeKind::StructDecl { name, fields } => NodeKind::StructDecl { name, fields },
            NodeKind::EnumDecl { name, variants } => NodeKind::EnumDecl { name, variants },
            NodeKind::VarDecl {
                name,
                is_const,
                ann,
                init,
            } => NodeKind::VarDecl {
                name,
                is_const,
                ann,
                init: init.map(|i| self.clone_subtree(i)),
            },
            NodeKind::Block { stmts } => NodeKind::Block {
                stmts: self.clone_all(stmts),
            },
            NodeKind::If {
                cond,
                then_blk,
                else_blk,
            } => NodeKind::If {
                cond: self.clone_subtree(cond),
                then_blk: self.clone_subtree(then_blk),
                else_blk: else_blk.map(|e| self.clone_subtree(e)),
            },
            NodeKind::While { cond, body } => NodeKind::While {
                cond: self.clone_subtree(cond),
                body: self.clone_subtree(body),
            },
            NodeKind::For {
                init,
                cond,
                update,
                body,
            } => NodeKind::For {
                init: init.map(|n| self.clone_subtree(n)),
                cond: cond.map(|n| self.clone_subtree(n)),
                update: update.map(|n| self.clone_subtree(n)),
                body: self.clone_subtree(body),
            },
            NodeKind::Return { value } => NodeKind::Return {
                value: value.map(|v| self.clone_subtree(v)),
            },
            NodeKind::Break => NodeKind::Break,
            NodeKind::Continue => NodeKind::Continue,
            NodeKind::ExprStmt { expr } => NodeKind::ExprStmt {
                expr: self.clone_subtree(expr),
            },
            NodeKind::NumberLit { value, has_decimal } => {
                NodeKind::NumberLit { value, has_decimal }
            }
            NodeKind::StringLit { value } => NodeKind::StringLit { value },
            NodeKind::BoolLit { value } => NodeKind::BoolLit { value },
            NodeKind::Ident { name } => NodeKind::Ident { name },
            NodeKind::ObjectLit { props } => {
                let props = props
                    .into_iter()
                    .map(|(n, v)| (n, self.clone_subtree(v)))
                    .collect();
                NodeKind::ObjectLit { props }
            }
            NodeKind::ArrayLit { elems } => NodeKind::ArrayLit {
                elems: self.clone_all(elems),
            },
            NodeKind::Binary { op, lhs, rhs } => NodeKind::Binary {
                op,
                lhs: self.clone_subtree(lhs),
                rhs: self.clone_subtree(rhs),
            },
            NodeKind::Unary { op, operand } => NodeKind::Unary {
                op,
                operand: self.clone_subtree(operand),
            },
            NodeKind::Assign { target, value } => NodeKind::Assign {
                target: self.clone_subtree(target),
                value: self.clone_subtree(value),
            },
            NodeKind::CompoundAssign { op, target, value } => NodeKind::CompoundAssign {
                op,
                target: self.clone_subtree(target),
                value: self.clone_subtree(value),
            },
            NodeKind::IncDec {
                increment,
                prefix,
                target,
            } => NodeKind::IncDec {
                increment,
                prefix,
                target: self.clone_subtree(target),
            },
            NodeKind::Call { callee, args } => NodeKind::Call {
                callee: self.clone_subtree(callee),
                args: self.clone_all(args),
            },
            NodeKind::Member { object, property } => NodeKind::Member {
                object: self.clone_subtree(object),
                property,
            },
            NodeKind::Index { object, index } => NodeKind::Index {
                object: self.clone_subtree(object),
                index: self.clone_subtree(index),
            },
            NodeKind::IsPattern {
                value,
                enum_name,
                variant,
                bindings,
            } => NodeKind::IsPattern {
                value: self.clone_subtree(value),
                enum_name,
                variant,
                bindings: self.clone_all(bindings),
            },
            NodeKind::PatternBinding { name } => NodeKind::PatternBinding { name },
        };
        self.push(loc, kind)
    }

    fn clone_all(&mut self, ids: Vec<NodeId>) -> Vec<NodeId> {
        ids.into_iter().map(|id| self.clone_subtree(id)).collect()
    }
}
