//! Compiler configuration
//!
//! Controls which artifacts a compilation writes. Loadable from TOML
//! (`aplc compile --config aplc.toml`) or built programmatically:
//!
//! ```rust,ignore
//! use aplc::CompilerConfig;
//!
//! // only the assembly, skip the intermediate dumps
//! let config = CompilerConfig::new().asm_only();
//! aplc::compile_file(path, &config)?;
//! ```

use serde::Deserialize;

fn default_true() -> bool {
    true
}

/// Which artifact files to write next to the source.
#[derive(Debug, Clone, Deserialize)]
pub struct EmitConfig {
    /// Write the `.ast` tree dump.
    #[serde(default = "default_true")]
    pub ast: bool,
    /// Write the `.cfg` basic-block dump.
    #[serde(default = "default_true")]
    pub cfg: bool,
    /// Write the `.sym` symbol-table dump.
    #[serde(default = "default_true")]
    pub sym: bool,
    /// Write the `.s` assembly.
    #[serde(default = "default_true")]
    pub asm: bool,
}

impl Default for EmitConfig {
    fn default() -> Self {
        EmitConfig {
            ast: true,
            cfg: true,
            sym: true,
            asm: true,
        }
    }
}

/// Configuration for one compilation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompilerConfig {
    #[serde(default)]
    pub emit: EmitConfig,
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse compiler config: {}", e))
    }

    /// Keep only the `.s` output (builder form).
    pub fn asm_only(mut self) -> Self {
        self.emit = EmitConfig {
            ast: false,
            cfg: false,
            sym: false,
            asm: true,
        };
        self
    }

    /// Toggle a single artifact (builder form).
    pub fn with_emit(mut self, ast: bool, cfg: bool, sym: bool, asm: bool) -> Self {
        self.emit = EmitConfig { ast, cfg, sym, asm };
        self
    }
}
