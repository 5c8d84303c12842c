//! Pyre: a compiler from a small stack-oriented source language to x86-64
//! NASM assembly.
//!
//! The pipeline is: tokenize (folding in `import`s as they're found) →
//! fold out macro definitions → expand macro calls → link the block graph
//! → generate assembly → hand it to an external assembler and linker.
//! [`compile_file`] and [`compile_file_with_config`] run that whole
//! pipeline; the individual passes live in their own modules for anyone who
//! wants to stop partway (inspecting the token stream, say, without
//! shelling out to `nasm`).

pub mod codegen;
pub mod config;
pub mod context;
pub mod error;
pub mod expander;
pub mod linker;
pub mod loader;
pub mod operator;
pub mod source;
pub mod token;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

pub use config::CompilerConfig;
pub use error::CompileError;

/// Compile `path` with the default toolchain configuration.
pub fn compile_file(path: &Path) -> Result<PathBuf, CompileError> {
    compile_file_with_config(path, &CompilerConfig::default())
}

/// Run the full pipeline: tokenize, link, generate assembly, assemble,
/// link the executable, and optionally run it. Returns the path to the
/// produced executable.
pub fn compile_file_with_config(path: &Path, config: &CompilerConfig) -> Result<PathBuf, CompileError> {
    let source_text =
        fs::read_to_string(path).map_err(|source| CompileError::Io { path: path.to_path_buf(), source })?;

    let base_dir = config.include_dir.clone().unwrap_or_else(|| token::resolve_base_dir(path));
    let mut ctx = context::Context::new();

    let tokens = token::tokenize(&source_text, &base_dir, &mut ctx)?;
    let loaded = loader::load_macros(tokens, &mut ctx)?;
    let expanded = expander::expand_macros(loaded, &ctx)?;
    let program = linker::link(expanded, &mut ctx)?;
    let assembly = codegen::generate(&program, &ctx)?;

    let asm_path = path.with_extension("asm");
    fs::write(&asm_path, &assembly).map_err(|source| CompileError::Io { path: asm_path.clone(), source })?;

    let object_path = path.with_extension("o");
    run_tool(
        &config.assembler,
        &["-felf64", path_str(&asm_path), "-o", path_str(&object_path)],
    )?;

    let executable = config.output.clone().unwrap_or_else(|| path.with_extension(""));
    run_tool(&config.linker, &[path_str(&object_path), "-o", path_str(&executable)])?;

    if !config.keep_object {
        let _ = fs::remove_file(&object_path);
    }

    if config.run_after_build {
        let status = Command::new(&executable)
            .status()
            .map_err(|source| CompileError::Io { path: executable.clone(), source })?;
        if !status.success() {
            eprintln!("{} exited with {status}", executable.display());
        }
    }

    Ok(executable)
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("Pyre source paths are required to be valid UTF-8")
}

fn run_tool(tool: &str, args: &[&str]) -> Result<(), CompileError> {
    let output = Command::new(tool)
        .args(args)
        .output()
        .map_err(|source| CompileError::Io { path: PathBuf::from(tool), source })?;
    if !output.status.success() {
        return Err(CompileError::External {
            tool: tool.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn compile_file_stops_at_codegen_errors_before_touching_the_toolchain() {
        let dir = tempdir().unwrap();
        let source_path = dir.path().join("broken.pyre");
        let mut file = fs::File::create(&source_path).unwrap();
        writeln!(file, "procedure main in stray end").unwrap();

        let err = compile_file(&source_path).unwrap_err();
        assert!(matches!(err, CompileError::UnknownReference { .. }));
    }

    #[test]
    fn missing_source_file_is_an_io_error() {
        let err = compile_file(Path::new("/nonexistent/path/does/not/exist.pyre")).unwrap_err();
        assert!(matches!(err, CompileError::Io { .. }));
    }
}
