//! APL Compiler CLI
//!
//! Command-line interface for compiling APL source files to MIPS-flavored
//! assembly and the intermediate dumps (`.ast`, `.cfg`, `.sym`).

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;

use aplc::CompilerConfig;

#[derive(ClapParser)]
#[command(name = "aplc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "APL compiler - compile APL sources to MIPS-flavored assembly", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a source file; artifacts are written next to it
    Compile {
        /// Input source file
        input: PathBuf,

        /// Path to a compiler configuration (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Compile { input, config } => {
            run_compile(&input, config.as_deref());
        }
        Commands::Completions { shell } => {
            run_completions(shell);
        }
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "aplc", &mut io::stdout());
}

fn load_config(path: Option<&Path>) -> CompilerConfig {
    let path = match path {
        Some(path) => path,
        None => return CompilerConfig::default(),
    };
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error reading config {}: {}", path.display(), e);
            process::exit(1);
        }
    };
    match CompilerConfig::from_toml(&content) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn run_compile(input: &Path, config_path: Option<&Path>) {
    let config = load_config(config_path);

    match aplc::compile_file(input, &config) {
        Ok(_) => {
            println!(
                "Compiled {} -> {}",
                input.display(),
                aplc::artifact_path(input, "s").display()
            );
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
