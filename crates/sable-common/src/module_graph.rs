//! The module graph: compilation units and their import edges.
//!
//! Each Sable module shares the compilation's type registry but owns its
//! symbol scope; exported names are installed into importers under a
//! namespace prefix, and that prefix is embedded in mangled
//! specialization names so functions from distinct modules never collide.
//! This file owns only the graph shape and ordering -- resolving import
//! paths to source text is the loader's job.

use std::fmt;
use std::path::PathBuf;

use rustc_hash::FxHashMap;
use serde::Serialize;

/// A unique identifier for a module within one compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ModuleId(pub u32);

/// Metadata about a single module.
#[derive(Debug, Serialize)]
pub struct ModuleInfo {
    pub id: ModuleId,
    /// Dotted module name as written in imports, e.g. `"math.vec"`.
    pub name: String,
    /// Path relative to the project root, e.g. `"math/vec.sb"`.
    pub path: PathBuf,
    /// Modules this module imports.
    pub imports: Vec<ModuleId>,
    /// Whether this module is the compilation entry point.
    pub is_entry: bool,
}

impl ModuleInfo {
    /// The prefix embedded in mangled specialization names.
    ///
    /// Dots become underscores so the result stays a valid linkage
    /// identifier: `"math.vec"` -> `"math_vec"`.
    pub fn symbol_prefix(&self) -> String {
        self.name.replace('.', "_")
    }
}

/// An import cycle, reported as the names along the cycle with the
/// starting module repeated at the end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError {
    pub cycle_path: Vec<String>,
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cycle_path.join(" -> "))
    }
}

/// A directed graph of modules and their import edges.
///
/// Modules are stored in insertion order; `ModuleId` indexes the store
/// directly.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    modules: Vec<ModuleInfo>,
    by_name: FxHashMap<String, ModuleId>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module; IDs are assigned sequentially from zero.
    pub fn add_module(&mut self, name: impl Into<String>, path: PathBuf, is_entry: bool) -> ModuleId {
        let name = name.into();
        let id = ModuleId(self.modules.len() as u32);
        self.by_name.insert(name.clone(), id);
        self.modules.push(ModuleInfo {
            id,
            name,
            path,
            imports: Vec::new(),
            is_entry,
        });
        id
    }

    /// Look up a module by its dotted name.
    pub fn resolve(&self, name: &str) -> Option<ModuleId> {
        self.by_name.get(name).copied()
    }

    /// Record that `importer` imports `imported`.
    /// Self-edges and duplicates are ignored.
    pub fn add_import(&mut self, importer: ModuleId, imported: ModuleId) {
        if importer == imported {
            return;
        }
        let imports = &mut self.modules[importer.0 as usize].imports;
        if !imports.contains(&imported) {
            imports.push(imported);
        }
    }

    pub fn get(&self, id: ModuleId) -> &ModuleInfo {
        &self.modules[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleInfo> {
        self.modules.iter()
    }

    /// Compilation order: every module after all of its imports.
    ///
    /// Depth-first post-order over insertion-ordered roots, so the result
    /// is a deterministic function of the graph. Returns the first cycle
    /// found as an error.
    pub fn compile_order(&self) -> Result<Vec<ModuleId>, CycleError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            White,
            Gray,
            Black,
        }

        let mut marks = vec![Mark::White; self.modules.len()];
        let mut order = Vec::with_capacity(self.modules.len());

        // Non-recursive DFS; the stack entry tracks how many imports of
        // the module have been visited so far.
        for root in 0..self.modules.len() {
            if marks[root] != Mark::White {
                continue;
            }
            let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
            marks[root] = Mark::Gray;
            while let Some(&mut (m, ref mut next)) = stack.last_mut() {
                let imports = &self.modules[m].imports;
                if *next < imports.len() {
                    let dep = imports[*next].0 as usize;
                    *next += 1;
                    match marks[dep] {
                        Mark::White => {
                            marks[dep] = Mark::Gray;
                            stack.push((dep, 0));
                        }
                        Mark::Gray => {
                            return Err(self.cycle_from(&stack, dep));
                        }
                        Mark::Black => {}
                    }
                } else {
                    marks[m] = Mark::Black;
                    order.push(ModuleId(m as u32));
                    stack.pop();
                }
            }
        }
        Ok(order)
    }

    /// Build the cycle path from the DFS stack once a gray module is
    /// re-entered.
    fn cycle_from(&self, stack: &[(usize, usize)], repeat: usize) -> CycleError {
        let begin = stack
            .iter()
            .position(|&(m, _)| m == repeat)
            .unwrap_or(0);
        let mut cycle_path: Vec<String> = stack[begin..]
            .iter()
            .map(|&(m, _)| self.modules[m].name.clone())
            .collect();
        cycle_path.push(self.modules[repeat].name.clone());
        CycleError { cycle_path }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph3() -> (ModuleGraph, ModuleId, ModuleId, ModuleId) {
        let mut g = ModuleGraph::new();
        let main = g.add_module("main", "main.sb".into(), true);
        let vec = g.add_module("math.vec", "math/vec.sb".into(), false);
        let util = g.add_module("util", "util.sb".into(), false);
        (g, main, vec, util)
    }

    #[test]
    fn add_and_resolve() {
        let (g, main, vec, _) = graph3();
        assert_eq!(g.resolve("main"), Some(main));
        assert_eq!(g.resolve("math.vec"), Some(vec));
        assert_eq!(g.resolve("nope"), None);
        assert_eq!(g.len(), 3);
    }

    #[test]
    fn symbol_prefix_replaces_dots() {
        let (g, _, vec, _) = graph3();
        assert_eq!(g.get(vec).symbol_prefix(), "math_vec");
    }

    #[test]
    fn imports_dedupe_and_skip_self() {
        let (mut g, main, vec, _) = graph3();
        g.add_import(main, vec);
        g.add_import(main, vec);
        g.add_import(main, main);
        assert_eq!(g.get(main).imports, vec![vec]);
    }

    #[test]
    fn compile_order_puts_imports_first() {
        let (mut g, main, vec, util) = graph3();
        g.add_import(main, vec);
        g.add_import(main, util);
        g.add_import(vec, util);

        let order = g.compile_order().unwrap();
        let pos = |id: ModuleId| order.iter().position(|&m| m == id).unwrap();
        assert!(pos(util) < pos(vec));
        assert!(pos(vec) < pos(main));
        assert_eq!(order.len(), 3);
    }

    #[test]
    fn compile_order_is_deterministic() {
        let (mut g, main, vec, util) = graph3();
        g.add_import(main, util);
        g.add_import(main, vec);
        let first = g.compile_order().unwrap();
        let second = g.compile_order().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn cycle_is_reported_with_path() {
        let (mut g, main, vec, util) = graph3();
        g.add_import(main, vec);
        g.add_import(vec, util);
        g.add_import(util, vec);

        let err = g.compile_order().unwrap_err();
        assert_eq!(err.cycle_path.first(), err.cycle_path.last());
        assert!(err.cycle_path.contains(&"math.vec".to_string()));
        assert!(err.cycle_path.contains(&"util".to_string()));
        assert!(err.to_string().contains(" -> "));
    }
}
