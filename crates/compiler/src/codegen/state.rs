//! CodeGen state and register allocation.
//!
//! The allocator is a first-free scheme over two fixed pools, one for the
//! general registers and one for the single-precision float registers.
//! Every `alloc` is paired with a `free` by the caller; exhaustion is a
//! fatal error (no spilling).

use crate::cfg::Cfg;
use crate::error::CompileError;
use crate::symtab::SymbolTable;

/// General-purpose pool, in allocation order.
const INT_REGISTERS: [&str; 18] = [
    "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "t0", "t1", "t2", "t3", "t4", "t5", "t6",
    "t7", "t8", "t9",
];

/// Float pool (even single-precision registers; `$f0` is reserved for
/// float return values).
const FLOAT_REGISTERS: [&str; 15] = [
    "f2", "f4", "f6", "f8", "f10", "f12", "f14", "f16", "f18", "f20", "f22", "f24", "f26",
    "f28", "f30",
];

pub(super) struct RegisterPool {
    regs: Vec<(&'static str, bool)>,
    kind: &'static str,
}

impl RegisterPool {
    fn new(names: &[&'static str], kind: &'static str) -> Self {
        RegisterPool {
            regs: names.iter().map(|n| (*n, true)).collect(),
            kind,
        }
    }

    /// First free register, marked in use.
    pub(super) fn alloc(&mut self) -> Result<&'static str, CompileError> {
        for (name, free) in &mut self.regs {
            if *free {
                *free = false;
                return Ok(*name);
            }
        }
        Err(CompileError::Allocator(format!(
            "out of {} registers; expression too complex",
            self.kind
        )))
    }

    /// Release a register. Names outside the pool (`v1`, `f0`) are
    /// ignored, so callers can free whatever an emitter returned.
    pub(super) fn free(&mut self, name: &str) {
        for (reg, free) in &mut self.regs {
            if *reg == name {
                *free = true;
            }
        }
    }

    #[cfg(test)]
    fn free_count(&self) -> usize {
        self.regs.iter().filter(|(_, free)| *free).count()
    }
}

/// MIPS text emitter. Walks the CFG's blocks per function, resolving
/// variables through the scope tree (and writing their frame offsets into
/// it during prologue computation).
pub struct CodeGen<'a> {
    pub(super) cfg: &'a Cfg,
    pub(super) symtab: &'a mut SymbolTable,
    pub(super) out: String,
    pub(super) regs: RegisterPool,
    pub(super) fregs: RegisterPool,
    /// Counter for float-comparison label pairs.
    pub(super) fcmp_count: usize,
}

impl<'a> CodeGen<'a> {
    pub fn new(cfg: &'a Cfg, symtab: &'a mut SymbolTable) -> Self {
        CodeGen {
            cfg,
            symtab,
            out: String::new(),
            regs: RegisterPool::new(&INT_REGISTERS, "integer"),
            fregs: RegisterPool::new(&FLOAT_REGISTERS, "float"),
            fcmp_count: 0,
        }
    }

    pub(super) fn alloc_int(&mut self) -> Result<String, CompileError> {
        self.regs.alloc().map(str::to_string)
    }

    pub(super) fn alloc_float(&mut self) -> Result<String, CompileError> {
        self.fregs.alloc().map(str::to_string)
    }

    /// Free a register whichever pool it came from; return-value
    /// registers pass through harmlessly.
    pub(super) fn free_reg(&mut self, name: &str) {
        self.regs.free(name);
        self.fregs.free(name);
    }
}

/// Join emitted lines, indenting instructions; lines prefixed with `@`
/// are labels and keep column zero.
pub(super) fn code_string(code: &[String]) -> String {
    let mut out = String::new();
    for line in code {
        match line.strip_prefix('@') {
            Some(label) => out.push_str(label),
            None => {
                out.push('\t');
                out.push_str(line);
            }
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_allocates_in_order() {
        let mut pool = RegisterPool::new(&INT_REGISTERS, "integer");
        assert_eq!(pool.alloc().unwrap(), "s0");
        assert_eq!(pool.alloc().unwrap(), "s1");
        pool.free("s0");
        // first-free, not next-unused
        assert_eq!(pool.alloc().unwrap(), "s0");
    }

    #[test]
    fn test_pool_exhaustion_is_an_error() {
        let mut pool = RegisterPool::new(&INT_REGISTERS, "integer");
        for _ in 0..INT_REGISTERS.len() {
            pool.alloc().unwrap();
        }
        let err = pool.alloc().unwrap_err();
        assert!(matches!(err, CompileError::Allocator(_)));
    }

    #[test]
    fn test_freeing_foreign_names_is_harmless() {
        let mut pool = RegisterPool::new(&FLOAT_REGISTERS, "float");
        pool.free("v1");
        pool.free("s0");
        assert_eq!(pool.free_count(), FLOAT_REGISTERS.len());
    }

    #[test]
    fn test_code_string_indents_and_labels() {
        let code = vec![
            "li $s0, 1".to_string(),
            "@L_CondFalse_0:".to_string(),
            "li $s0, 0".to_string(),
        ];
        assert_eq!(
            code_string(&code),
            "\tli $s0, 1\nL_CondFalse_0:\n\tli $s0, 0\n"
        );
    }
}
