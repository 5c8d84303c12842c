//! Compiler configuration: the knobs the driver and the CLI share.

use std::path::PathBuf;

/// Configuration for a single compilation.
///
/// Mirrors the builder shape used elsewhere in this codebase for compiler
/// configuration: plain fields, `with_*` setters that take `self` by value
/// and return `Self`, and a `Default` impl holding the values that match the
/// documented external interface.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Name or path of the assembler binary.
    pub assembler: String,
    /// Name or path of the linker binary.
    pub linker: String,
    /// Directory `import "name"` is resolved against. Defaults to the
    /// directory containing the entry source file.
    pub include_dir: Option<PathBuf>,
    /// Override for the output executable path.
    pub output: Option<PathBuf>,
    /// Keep the intermediate `.o` file around after linking.
    pub keep_object: bool,
    /// Run the resulting executable after a successful link.
    pub run_after_build: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            assembler: "nasm".to_string(),
            linker: "ld".to_string(),
            include_dir: None,
            output: None,
            keep_object: false,
            run_after_build: false,
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_assembler(mut self, assembler: impl Into<String>) -> Self {
        self.assembler = assembler.into();
        self
    }

    pub fn with_linker(mut self, linker: impl Into<String>) -> Self {
        self.linker = linker.into();
        self
    }

    pub fn with_include_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.include_dir = Some(dir.into());
        self
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn with_keep_object(mut self, keep: bool) -> Self {
        self.keep_object = keep;
        self
    }

    pub fn with_run_after_build(mut self, run: bool) -> Self {
        self.run_after_build = run;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_assembler_and_linker_match_the_documented_contract() {
        let config = CompilerConfig::default();
        assert_eq!(config.assembler, "nasm");
        assert_eq!(config.linker, "ld");
        assert!(!config.run_after_build);
    }

    #[test]
    fn builder_methods_chain() {
        let config = CompilerConfig::new()
            .with_assembler("/usr/bin/nasm")
            .with_run_after_build(true);
        assert_eq!(config.assembler, "/usr/bin/nasm");
        assert!(config.run_after_build);
    }
}
