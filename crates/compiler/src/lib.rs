//! APL Compiler Library
//!
//! Provides single-pass compilation of APL source text to MIPS-flavored
//! assembly, with the intermediate artifacts exposed alongside it:
//!
//! - `.ast` - the parsed tree, one node per line, indented
//! - `.cfg` - per-function basic blocks in three-address form
//! - `.sym` - procedure and variable tables
//! - `.s`   - the assembly text
//!
//! ```rust,ignore
//! use aplc::CompilerConfig;
//!
//! // compile a file, writing the artifacts next to it
//! aplc::compile_file(Path::new("prog.apl"), &CompilerConfig::default())?;
//!
//! // or compile in memory
//! let artifacts = aplc::compile_source("void main() { int a; a = 1; }")?;
//! println!("{}", artifacts.asm);
//! ```
//!
//! Compilation is single-shot: the first error ends the run and nothing
//! is written.

pub mod ast;
pub mod cfg;
pub mod codegen;
pub mod config;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod symtab;
pub mod types;

pub use cfg::Cfg;
pub use codegen::CodeGen;
pub use config::{CompilerConfig, EmitConfig};
pub use error::CompileError;
pub use parser::Parser;
pub use types::{BaseType, Type};

use std::fs;
use std::path::{Path, PathBuf};

/// The four text artifacts of one compilation.
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub ast: String,
    pub cfg: String,
    pub sym: String,
    pub asm: String,
}

/// Compile source text into its artifacts.
pub fn compile_source(source: &str) -> Result<Artifacts, CompileError> {
    let (stmts, mut symtab) = Parser::new(source)?.parse()?;

    let ast_dump = ast::render_program(&stmts);

    let mut sym_dump = symtab.procedure_table();
    sym_dump.push_str(&symtab.variable_table());

    let cfg = Cfg::build(&stmts);
    let cfg_dump = cfg.to_string();

    let asm = CodeGen::new(&cfg, &mut symtab).generate()?;

    Ok(Artifacts {
        ast: ast_dump,
        cfg: cfg_dump,
        sym: sym_dump,
        asm,
    })
}

/// Artifact path for a source file: the extension is appended to the full
/// file name (`prog.apl` -> `prog.apl.ast`), next to the source.
pub fn artifact_path(source_path: &Path, ext: &str) -> PathBuf {
    let mut name = source_path.as_os_str().to_os_string();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Compile a source file and write the artifacts selected by `config`
/// next to it. Nothing is written unless the whole pipeline succeeds.
pub fn compile_file(source_path: &Path, config: &CompilerConfig) -> Result<(), CompileError> {
    let source = fs::read_to_string(source_path)?;
    let artifacts = compile_source(&source)?;

    if config.emit.ast {
        fs::write(artifact_path(source_path, "ast"), &artifacts.ast)?;
    }
    if config.emit.cfg {
        fs::write(artifact_path(source_path, "cfg"), &artifacts.cfg)?;
    }
    if config.emit.sym {
        fs::write(artifact_path(source_path, "sym"), &artifacts.sym)?;
    }
    if config.emit.asm {
        fs::write(artifact_path(source_path, "s"), &artifacts.asm)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_assignment() {
        let artifacts =
            compile_source("void main() { int a, b; a = 5; b = a; }").expect("compile failed");

        assert!(artifacts.ast.starts_with("FUNC(main)\n(\n"));
        assert!(
            artifacts
                .ast
                .contains("\tASGN\n\t(\n\t\tVAR(a)\n\t\t,\n\t\tCONST(5)\n\t)\n")
        );
        assert!(
            artifacts
                .ast
                .contains("\tASGN\n\t(\n\t\tVAR(b)\n\t\t,\n\t\tVAR(a)\n\t)\n")
        );

        assert!(artifacts.cfg.contains("function main()"));
        assert!(artifacts.cfg.contains("a = 5\nb = a\ngoto <bb 1>"));

        assert!(artifacts.asm.contains("sub $sp, $sp, 16\t# Make space for the locals"));
        let stores = artifacts
            .asm
            .matches("($sp)")
            .count();
        assert!(stores >= 2);
        assert!(artifacts.asm.contains("sw $s0, 4($sp)"));
        assert!(artifacts.asm.contains("sw $s0, 8($sp)"));
    }

    #[test]
    fn test_scenario_pointer() {
        let artifacts = compile_source("void main() { int a; int *p; p = &a; *p = 7; }")
            .expect("compile failed");
        assert!(artifacts.asm.contains("addi $s0, $sp, 4"));
        assert!(artifacts.asm.contains("sw $s0, 8($sp)"));
        assert!(artifacts.asm.contains("li $s0, 7"));
        assert!(artifacts.asm.contains("sw $s0, 0($s1)"));
    }

    #[test]
    fn test_scenario_if_else() {
        let artifacts =
            compile_source("void main() { int a; a = 1; if (a < 2) a = 2; else a = 3; }")
                .expect("compile failed");
        // init, condition, both arms, join/return, end
        assert!(artifacts.cfg.contains("<bb 0>\na = 1\ngoto <bb 1>"));
        assert!(artifacts.cfg.contains("t0 = a < 2\nif(t0) goto <bb 2>\nelse goto <bb 3>"));
        assert!(artifacts.cfg.contains("<bb 2>\na = 2\ngoto <bb 4>"));
        assert!(artifacts.cfg.contains("<bb 3>\na = 3\ngoto <bb 4>"));
        assert!(artifacts.cfg.contains("<bb 4>\nreturn"));
    }

    #[test]
    fn test_scenario_while() {
        let artifacts = compile_source("void main() { int i; i = 0; while (i < 10) i = i + 1; }")
            .expect("compile failed");
        assert!(artifacts.cfg.contains("t0 = i < 10\nif(t0) goto <bb 2>\nelse goto <bb 3>"));
        // the body's trailing goto is the condition block's id
        assert!(artifacts.cfg.contains("t1 = i + 1\ni = t1\ngoto <bb 1>"));
    }

    #[test]
    fn test_scenario_function_with_prototype() {
        let artifacts = compile_source(
            "int add(int x, int y);\n\
             int add(int x, int y) { return x + y; }\n\
             void main() { int r; r = add(1, 2); }",
        )
        .expect("compile failed");
        assert!(artifacts.cfg.contains("function add(int x, int y)"));
        assert!(artifacts.sym.contains("add\t\t|\tint\t\t|\tint x, int y"));
        assert!(artifacts.asm.contains("jal add # function call"));

        let err = compile_source(
            "int add(int x, float y);\n\
             int add(int x, int y) { return x + y; }\n\
             void main() { int r; r = add(1, 2); }",
        )
        .expect_err("prototype mismatch must fail");
        assert!(matches!(err, CompileError::ProtoMismatch(_)), "{:?}", err);
    }

    #[test]
    fn test_scenario_semantic_error() {
        let err = compile_source("void main() { int a; *a = 3; }")
            .expect_err("deref of non-pointer must fail");
        assert!(matches!(err, CompileError::BadPointerUse(_)), "{:?}", err);
    }

    #[test]
    fn test_sym_dump_lists_scopes() {
        let artifacts = compile_source(
            "int g;\n\
             int twice(int *p) { int local; local = *p + *p; return local + local; }\n\
             void main() { int a; a = 1; }",
        )
        .expect("compile failed");
        assert!(artifacts.sym.contains("Procedure table :-"));
        assert!(artifacts.sym.contains("twice\t\t|\tint\t\t|\tint *p"));
        assert!(artifacts.sym.contains("Variable table :- "));
        assert!(artifacts.sym.contains("g\t\t|\tglobal"));
        assert!(artifacts.sym.contains("local\t\t|\tprocedure twice"));
        assert!(artifacts.sym.contains("a\t\t|\tprocedure main"));
    }

    #[test]
    fn test_dumps_are_byte_stable() {
        let src = "int g;\n\
                   int add(int x, int y) { return x + y; }\n\
                   void main() { int i; i = 0; while (i < 3) i = i + 1; g = add(1, 2); }";
        let first = compile_source(src).expect("compile failed");
        let second = compile_source(src).expect("compile failed");
        assert_eq!(first.ast, second.ast);
        assert_eq!(first.cfg, second.cfg);
        assert_eq!(first.sym, second.sym);
        assert_eq!(first.asm, second.asm);
    }

    #[test]
    fn test_compile_file_writes_artifacts_next_to_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source_path = dir.path().join("prog.apl");
        std::fs::write(&source_path, "void main() { int a; a = 1; }").expect("write source");

        compile_file(&source_path, &CompilerConfig::default()).expect("compile failed");

        assert!(dir.path().join("prog.apl.ast").exists());
        assert!(dir.path().join("prog.apl.cfg").exists());
        assert!(dir.path().join("prog.apl.sym").exists());
        assert!(dir.path().join("prog.apl.s").exists());
    }

    #[test]
    fn test_compile_file_honors_emit_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source_path = dir.path().join("prog.apl");
        std::fs::write(&source_path, "void main() { int a; a = 1; }").expect("write source");

        compile_file(&source_path, &CompilerConfig::new().asm_only()).expect("compile failed");

        assert!(!dir.path().join("prog.apl.ast").exists());
        assert!(!dir.path().join("prog.apl.cfg").exists());
        assert!(!dir.path().join("prog.apl.sym").exists());
        assert!(dir.path().join("prog.apl.s").exists());
    }

    #[test]
    fn test_failed_compile_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source_path = dir.path().join("bad.apl");
        std::fs::write(&source_path, "void main() { int a; *a = 3; }").expect("write source");

        let err = compile_file(&source_path, &CompilerConfig::default())
            .expect_err("compile must fail");
        assert!(matches!(err, CompileError::BadPointerUse(_)));
        assert!(!dir.path().join("bad.apl.s").exists());
        assert!(!dir.path().join("bad.apl.ast").exists());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = compile_file(Path::new("/nonexistent/prog.apl"), &CompilerConfig::default())
            .expect_err("must fail");
        assert!(matches!(err, CompileError::Io(_)));
    }
}
