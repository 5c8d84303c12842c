//! Error types shared across every compiler pass.

use std::fmt;
use std::path::PathBuf;

/// Every way compilation can fail.
///
/// Pyre aborts on the first error (see the design notes on failure
/// semantics): there is no accumulation, no recovery, just a diagnostic and
/// a non-zero exit.
#[derive(Debug)]
pub enum CompileError {
    /// A source or imported file could not be read.
    Io { path: PathBuf, source: std::io::Error },
    /// A lexeme did not match any recogniser, or a literal was malformed.
    Lexical { detail: String },
    /// A procedure name was declared more than once.
    DuplicateDefinition { name: String },
    /// A macro expansion or a variable retrieve named something unknown.
    UnknownReference { detail: String },
    /// Block nesting was violated, or an internal invariant was broken.
    Structural { detail: String },
    /// `nasm` or `ld` exited with a non-zero status, or could not be spawned.
    External { tool: String, stderr: String },
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Io { path, source } => {
                write!(f, "could not read {}: {source}", path.display())
            }
            CompileError::Lexical { detail } => write!(f, "lexical error: {detail}"),
            CompileError::DuplicateDefinition { name } => {
                write!(f, "the procedure {name} was previously defined")
            }
            CompileError::UnknownReference { detail } => {
                write!(f, "unknown reference: {detail}")
            }
            CompileError::Structural { detail } => write!(f, "structural error: {detail}"),
            CompileError::External { tool, stderr } => {
                write!(f, "{tool} failed:\n{stderr}")
            }
        }
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompileError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<std::fmt::Error> for CompileError {
    fn from(e: std::fmt::Error) -> Self {
        CompileError::Structural { detail: e.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_mentions_the_procedure_name() {
        let err = CompileError::DuplicateDefinition { name: "add".into() };
        assert!(err.to_string().contains("add"));
    }

    #[test]
    fn external_display_includes_captured_stderr() {
        let err = CompileError::External { tool: "nasm".into(), stderr: "boom".into() };
        let rendered = err.to_string();
        assert!(rendered.contains("nasm"));
        assert!(rendered.contains("boom"));
    }
}
