//! Diagnostic codes, the static catalog, and the diagnostic sink.
//!
//! Every report carries a stable code of the form `[A-Z]{2}\d{3}`:
//! `JE` internal, `PE` parser, `TE` type, `CE` codegen, `VE` validation,
//! with `JW`/`TW`/`CW`/`VW` for warnings. The sink runs in one of two
//! modes: `Direct` flushes each diagnostic at the point of discovery,
//! `Collect` buffers everything and emits it with a summary count at
//! `finish()`.

use std::fmt;
use std::io::{self, Write};

use serde::Serialize;

use crate::source::SourceLoc;

/// Stable diagnostic codes.
///
/// Codes already present in released compilers are preserved bit-for-bit;
/// new codes are appended, never renumbered.
pub mod codes {
    /// Internal compiler error.
    pub const JE_INTERNAL: &str = "JE001";
    /// Parser could not make progress on a token.
    pub const PE_STUCK_ON_TOKEN: &str = "PE229";
    /// Undefined variable.
    pub const TE_UNDEFINED_VARIABLE: &str = "TE301";
    /// Undefined type name.
    pub const TE_UNDEFINED_TYPE: &str = "TE302";
    /// Duplicate declaration in the same scope.
    pub const TE_DUPLICATE_DECLARATION: &str = "TE303";
    /// Assignment to a constant binding.
    pub const TE_ASSIGN_TO_CONST: &str = "TE304";
    /// Call target is not a function.
    pub const TE_NOT_A_FUNCTION: &str = "TE305";
    /// Object type has no such property.
    pub const TE_UNKNOWN_PROPERTY: &str = "TE306";
    /// Enum has no such variant.
    pub const TE_UNKNOWN_VARIANT: &str = "TE307";
    /// Wrong argument count.
    pub const TE_WRONG_ARGUMENT_COUNT: &str = "TE308";
    /// Operator not supported for the operand types.
    pub const TE_OPERATOR_NOT_SUPPORTED: &str = "TE309";
    /// Return type conflicts with an earlier return.
    pub const TE_RETURN_TYPE_MISMATCH: &str = "TE310";
    /// Type cannot be indexed.
    pub const TE_NOT_INDEXABLE: &str = "TE311";
    /// Condition expression is not `bool`.
    pub const TE_CONDITION_NOT_BOOL: &str = "TE312";
    /// Value type does not match the declared or expected type.
    pub const TE_TYPE_MISMATCH: &str = "TE313";
    /// Module import cycle.
    pub const TE_MODULE_CYCLE: &str = "TE314";
    /// Trait not implemented for the type.
    pub const TE_TRAIT_NOT_IMPLEMENTED: &str = "TE324";
    /// Method not found on the type or any trait impl.
    pub const TE_METHOD_NOT_FOUND: &str = "TE325";
    /// Statement is unreachable.
    pub const TW_UNREACHABLE_CODE: &str = "TW301";
    /// No specialization exists for a call lowering expected to find.
    pub const CE_MISSING_SPECIALIZATION: &str = "CE401";
    /// No SSA struct was materialized for an object type.
    pub const CE_MISSING_STRUCT_TYPE: &str = "CE402";
    /// No trait impl at lowering where inference promised one.
    pub const CE_MISSING_TRAIT_IMPL: &str = "CE403";
    /// Expression is not a valid assignment target.
    pub const CE_INVALID_LVALUE: &str = "CE404";
    /// Format string has more placeholders than arguments.
    pub const VE_FORMAT_PLACEHOLDER_MISMATCH: &str = "VE301";
    /// Format string has fewer placeholders than arguments.
    pub const VW_FORMAT_EXTRA_ARGS: &str = "VW301";
}

/// The static catalog: code -> printf-style message template.
///
/// Call sites format their own messages; the catalog is the single place
/// that fixes the wording and is what the code-format tests check.
pub const CATALOG: &[(&str, &str)] = &[
    (codes::JE_INTERNAL, "internal error: %s"),
    (codes::PE_STUCK_ON_TOKEN, "stuck on token '%s'"),
    (codes::TE_UNDEFINED_VARIABLE, "undefined variable '%s'"),
    (codes::TE_UNDEFINED_TYPE, "undefined type '%s'"),
    (codes::TE_DUPLICATE_DECLARATION, "'%s' is already declared in this scope"),
    (codes::TE_ASSIGN_TO_CONST, "cannot assign to constant '%s'"),
    (codes::TE_NOT_A_FUNCTION, "'%s' is not a function"),
    (codes::TE_UNKNOWN_PROPERTY, "type '%s' has no property '%s'"),
    (codes::TE_UNKNOWN_VARIANT, "enum '%s' has no variant '%s'"),
    (codes::TE_WRONG_ARGUMENT_COUNT, "'%s' expects %d argument(s), got %d"),
    (codes::TE_OPERATOR_NOT_SUPPORTED, "operator '%s' is not supported for '%s' and '%s'"),
    (codes::TE_RETURN_TYPE_MISMATCH, "return type '%s' conflicts with earlier return type '%s'"),
    (codes::TE_NOT_INDEXABLE, "type '%s' cannot be indexed"),
    (codes::TE_CONDITION_NOT_BOOL, "condition must be 'bool', got '%s'"),
    (codes::TE_TYPE_MISMATCH, "expected '%s', got '%s'"),
    (codes::TE_MODULE_CYCLE, "module import cycle: %s"),
    (codes::TE_TRAIT_NOT_IMPLEMENTED, "trait '%s' is not implemented for '%s'"),
    (codes::TE_METHOD_NOT_FOUND, "no method '%s' on type '%s'"),
    (codes::TW_UNREACHABLE_CODE, "unreachable statement"),
    (codes::CE_MISSING_SPECIALIZATION, "no specialization of '%s' for the call's argument types"),
    (codes::CE_MISSING_STRUCT_TYPE, "no struct type materialized for '%s'"),
    (codes::CE_MISSING_TRAIT_IMPL, "no impl of '%s' for '%s' at lowering"),
    (codes::CE_INVALID_LVALUE, "expression is not assignable"),
    (codes::VE_FORMAT_PLACEHOLDER_MISMATCH, "format requires %d argument(s), got %d"),
    (codes::VW_FORMAT_EXTRA_ARGS, "format uses %d placeholder(s) but %d argument(s) were given"),
];

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Error,
    Warning,
    Info,
    Hint,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
            Severity::Hint => write!(f, "hint"),
        }
    }
}

/// A single report: severity, stable code, location, formatted message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: &'static str,
    pub loc: SourceLoc,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        code: &'static str,
        loc: SourceLoc,
        message: impl Into<String>,
    ) -> Self {
        Diagnostic {
            severity,
            code,
            loc,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The stable line format consumed by editors and test harnesses.
        write!(
            f,
            "[{}:{}] {}: {}",
            self.severity, self.code, self.loc, self.message
        )
    }
}

/// Sink operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkMode {
    /// Flush each diagnostic to the writer at the point of discovery.
    Direct,
    /// Buffer everything; `finish()` writes the batch plus a summary.
    Collect,
}

/// The diagnostic sink.
///
/// Reports are always retained for programmatic inspection; the mode only
/// controls when they reach the writer. Duplicate suppression is not
/// performed.
pub struct DiagnosticSink {
    mode: SinkMode,
    out: Box<dyn Write>,
    diags: Vec<Diagnostic>,
    errors: usize,
    warnings: usize,
}

impl DiagnosticSink {
    /// Create a sink writing to stderr.
    pub fn new(mode: SinkMode) -> Self {
        Self::with_writer(mode, Box::new(io::stderr()))
    }

    /// Create a sink with an injected writer (used by tests and drivers).
    pub fn with_writer(mode: SinkMode, out: Box<dyn Write>) -> Self {
        DiagnosticSink {
            mode,
            out,
            diags: Vec::new(),
            errors: 0,
            warnings: 0,
        }
    }

    pub fn mode(&self) -> SinkMode {
        self.mode
    }

    /// Report a diagnostic.
    pub fn report(&mut self, diag: Diagnostic) {
        match diag.severity {
            Severity::Error => self.errors += 1,
            Severity::Warning => self.warnings += 1,
            Severity::Info | Severity::Hint => {}
        }
        if self.mode == SinkMode::Direct {
            let _ = writeln!(self.out, "{diag}");
        }
        self.diags.push(diag);
    }

    pub fn error(&mut self, code: &'static str, loc: SourceLoc, message: impl Into<String>) {
        self.report(Diagnostic::new(Severity::Error, code, loc, message));
    }

    pub fn warning(&mut self, code: &'static str, loc: SourceLoc, message: impl Into<String>) {
        self.report(Diagnostic::new(Severity::Warning, code, loc, message));
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    /// All reports seen so far, in report order.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diags
    }

    /// End-of-compilation flush.
    ///
    /// In `Collect` mode this writes every buffered diagnostic followed by
    /// a summary line. In `Direct` mode only the summary is written, and
    /// only when something was reported.
    pub fn finish(&mut self) {
        if self.mode == SinkMode::Collect {
            for d in &self.diags {
                let _ = writeln!(self.out, "{d}");
            }
        }
        if self.errors > 0 || self.warnings > 0 {
            let _ = writeln!(
                self.out,
                "{} error(s), {} warning(s)",
                self.errors, self.warnings
            );
        }
        let _ = self.out.flush();
    }
}

impl fmt::Debug for DiagnosticSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticSink")
            .field("mode", &self.mode)
            .field("errors", &self.errors)
            .field("warnings", &self.warnings)
            .field("diags", &self.diags.len())
            .finish()
    }
}
