//! Source locations and shared AST handles.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

/// A handle to an AST node within its owning program arena.
///
/// Defined here rather than in `sable-ast` so that the type registry can
/// hold declaration back-references without a crate cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A 1-based source position: file, line, column.
///
/// Locations are value types -- every node stores its own copy. The file
/// name is shared via `Arc<str>` so copies stay cheap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SourceLoc {
    pub file: Arc<str>,
    pub line: u32,
    pub col: u32,
}

impl SourceLoc {
    pub fn new(file: impl Into<Arc<str>>, line: u32, col: u32) -> Self {
        SourceLoc {
            file: file.into(),
            line,
            col,
        }
    }

    /// A placeholder location for synthesized nodes (line and column 0).
    pub fn synthetic() -> Self {
        SourceLoc::new("<generated>", 0, 0)
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_loc_display() {
        let loc = SourceLoc::new("main.sb", 12, 4);
        assert_eq!(loc.to_string(), "main.sb:12:4");
    }

    #[test]
    fn source_loc_copies_are_equal() {
        let loc = SourceLoc::new("lib.sb", 3, 9);
        let copy = loc.clone();
        assert_eq!(loc, copy);
    }
}
