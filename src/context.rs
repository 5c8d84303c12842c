//! The process-wide compiler state, threaded by `&mut` through every pass
//! instead of living as module-level globals.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// A procedure's declared signature: parameter names, then return names.
pub type ProcedureSignature = (Vec<String>, Vec<String>);

#[derive(Debug, Default)]
pub struct Context {
    /// Declared procedure names, in declaration order.
    pub procedures: HashSet<String>,
    /// Procedure name → (inputs, returns).
    pub procedure_signatures: HashMap<String, ProcedureSignature>,
    /// Macro name → its body, filled in by the loader.
    pub macros: HashMap<String, Vec<crate::token::Token>>,
    /// Canonicalized paths already folded in by `import`.
    pub imports: HashSet<PathBuf>,
    /// Supplies `string_literal<N>` labels.
    pub string_literal_counter: usize,
    /// Shared monotonic counter for every block label
    /// (`while<N>`, `elif<N>`, `else<N>`, `end<N>` all draw from the same
    /// sequence, not one counter per keyword).
    pub label_counter: usize,
    /// Compile-time scope: identifiers currently bound by an enclosing
    /// `procedure` or `where`, innermost last.
    pub scope: Vec<String>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_string_literal_label(&mut self) -> String {
        let label = format!("string_literal{}", self.string_literal_counter);
        self.string_literal_counter += 1;
        label
    }

    pub fn next_label(&mut self, prefix: &str) -> String {
        let label = format!("{prefix}{}", self.label_counter);
        self.label_counter += 1;
        label
    }
}

/// `main` compiles to `_start`; every other procedure gets a `procedure_`
/// prefix so it can never collide with a reserved assembly symbol.
pub fn procedure_label(name: &str) -> String {
    if name == "main" { "_start".to_string() } else { format!("procedure_{name}") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_counter_is_shared_across_keywords() {
        let mut ctx = Context::new();
        assert_eq!(ctx.next_label("while"), "while0");
        assert_eq!(ctx.next_label("end"), "end1");
        assert_eq!(ctx.next_label("elif"), "elif2");
    }

    #[test]
    fn main_mangles_to_start() {
        assert_eq!(procedure_label("main"), "_start");
        assert_eq!(procedure_label("add"), "procedure_add");
    }
}
