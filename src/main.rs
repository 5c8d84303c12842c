//! Pyre CLI
//!
//! Command-line interface for compiling `.pyre` programs to NASM-built
//! executables.

use clap::Parser as ClapParser;
use std::path::PathBuf;
use std::process;

#[derive(ClapParser)]
#[command(name = "pyre")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Pyre compiler - compile .pyre programs to x86-64 executables", long_about = None)]
struct Cli {
    /// Input .pyre source file
    source: PathBuf,

    /// Output executable path (defaults to the input filename without its extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Run the executable immediately after a successful build
    #[arg(short, long)]
    run: bool,

    /// Keep the intermediate .asm and .o files around after linking
    #[arg(long)]
    keep_asm: bool,

    /// Assembler binary to invoke
    #[arg(long, default_value = "nasm")]
    assembler: String,

    /// Linker binary to invoke
    #[arg(long, default_value = "ld")]
    linker: String,
}

fn main() {
    let cli = Cli::parse();

    let config = pyre::CompilerConfig::new()
        .with_assembler(cli.assembler)
        .with_linker(cli.linker)
        .with_keep_object(cli.keep_asm)
        .with_run_after_build(cli.run);
    let config = match cli.output {
        Some(path) => config.with_output(path),
        None => config,
    };

    match pyre::compile_file_with_config(&cli.source, &config) {
        Ok(executable) => {
            println!("Compiled {} -> {}", cli.source.display(), executable.display());
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
