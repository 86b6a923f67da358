//! Nested symbol tables.
//!
//! Scopes form a parent chain; lookup searches the current scope
//! linearly, then walks outward, so the innermost binding shadows.
//! Insertion is unchecked at this layer -- duplicate declarations are a
//! semantic error diagnosed by inference, not a data-structure error.

use sable_common::NodeId;
use sable_types::TypeId;

/// Handle to a symbol entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u32);

/// Handle to a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

/// What a name is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolKind {
    Variable { is_const: bool },
    Parameter,
    Function,
    /// An imported module namespace; members resolve in the export
    /// scope.
    Namespace { exports: ScopeId },
}

/// One binding.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub ty: TypeId,
    /// Declaring AST node, when one exists.
    pub decl: Option<NodeId>,
}

#[derive(Debug)]
struct Scope {
    parent: Option<ScopeId>,
    entries: Vec<SymbolId>,
}

/// Arena of scopes and symbol entries. A scope's parent always outlives
/// it: scopes are never removed while the table is alive.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    scopes: Vec<Scope>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scope; `parent: None` makes a root scope.
    pub fn new_scope(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            parent,
            entries: Vec::new(),
        });
        id
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope.0 as usize].parent
    }

    /// Insert a binding into a scope. Unchecked: shadowing and
    /// duplicates both land here; callers diagnose duplicates.
    pub fn insert(&mut self, scope: ScopeId, symbol: Symbol) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(symbol);
        self.scopes[scope.0 as usize].entries.push(id);
        id
    }

    /// Lookup in one scope only, innermost binding last inserted wins.
    pub fn lookup_local(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        self.scopes[scope.0 as usize]
            .entries
            .iter()
            .rev()
            .copied()
            .find(|&id| self.symbols[id.0 as usize].name == name)
    }

    /// Lookup with shadowing: current scope first, then the parent
    /// chain.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        let mut cur = Some(scope);
        while let Some(s) = cur {
            if let Some(id) = self.lookup_local(s, name) {
                return Some(id);
            }
            cur = self.scopes[s.0 as usize].parent;
        }
        None
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0 as usize]
    }

    pub fn set_type(&mut self, id: SymbolId, ty: TypeId) {
        self.symbols[id.0 as usize].ty = ty;
    }

    /// Entries of one scope in insertion order.
    pub fn entries(&self, scope: ScopeId) -> &[SymbolId] {
        &self.scopes[scope.0 as usize].entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_types::TypeRegistry;

    fn var(name: &str, ty: TypeId) -> Symbol {
        Symbol {
            name: name.to_string(),
            kind: SymbolKind::Variable { is_const: false },
            ty,
            decl: None,
        }
    }

    #[test]
    fn lookup_walks_parent_chain() {
        let mut table = SymbolTable::new();
        let root = table.new_scope(None);
        let inner = table.new_scope(Some(root));
        let x = table.insert(root, var("x", TypeRegistry::I32));

        assert_eq!(table.lookup(inner, "x"), Some(x));
        assert_eq!(table.lookup_local(inner, "x"), None);
        assert_eq!(table.lookup(inner, "y"), None);
    }

    #[test]
    fn innermost_binding_shadows() {
        let mut table = SymbolTable::new();
        let root = table.new_scope(None);
        let inner = table.new_scope(Some(root));
        table.insert(root, var("x", TypeRegistry::I32));
        let shadow = table.insert(inner, var("x", TypeRegistry::DOUBLE));

        assert_eq!(table.lookup(inner, "x"), Some(shadow));
        assert_eq!(table.symbol(shadow).ty, TypeRegistry::DOUBLE);
    }

    #[test]
    fn duplicate_insertion_is_permitted_here() {
        // The table accepts duplicates; inference is the layer that
        // diagnoses them.
        let mut table = SymbolTable::new();
        let root = table.new_scope(None);
        let first = table.insert(root, var("x", TypeRegistry::I32));
        let second = table.insert(root, var("x", TypeRegistry::I64));
        assert_ne!(first, second);
        // Linear scan from the back: the later duplicate wins.
        assert_eq!(table.lookup(root, "x"), Some(second));
        assert_eq!(table.entries(root).len(), 2);
    }

    #[test]
    fn namespace_members_resolve_in_export_scope() {
        let mut table = SymbolTable::new();
        let root = table.new_scope(None);
        let exports = table.new_scope(None);
        let norm = table.insert(exports, var("norm", TypeRegistry::UNKNOWN));
        let ns = table.insert(
            root,
            Symbol {
                name: "vec".to_string(),
                kind: SymbolKind::Namespace { exports },
                ty: TypeRegistry::VOID,
                decl: None,
            },
        );

        let found = table.lookup(root, "vec").unwrap();
        assert_eq!(found, ns);
        match table.symbol(found).kind {
            SymbolKind::Namespace { exports: e } => {
                assert_eq!(table.lookup_local(e, "norm"), Some(norm));
            }
            _ => panic!("expected namespace"),
        }
    }
}
