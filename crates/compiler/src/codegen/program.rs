//! Whole-program emission: the `.data` section, then one `.text` block
//! per function with prologue, labeled basic blocks, and epilogue.
//!
//! Frame layout (descending stack): `0($sp)` holds the saved return
//! address, `-4($sp)` the saved frame pointer; the prologue drops `$sp`
//! by `8 + local_bytes`. Locals are name-sorted and packed from offset 4
//! upward; parameters sit above them (`8 + local_bytes + 4` onward) in
//! declaration order, pushed by the caller.

use std::fmt::Write as _;

use crate::cfg::CfgNode;
use crate::error::CompileError;
use crate::symtab::{Entry, GLOBAL_SCOPE, ScopeId, SymbolTable, VarRef};

use super::CodeGen;

/// Every variable entry of a function scope and its nested blocks.
fn collect_locals(
    symtab: &SymbolTable,
    scope: ScopeId,
    skip: usize,
    out: &mut Vec<(String, VarRef, u32)>,
) {
    for (index, (name, entry)) in symtab.scope(scope).entries.iter().enumerate() {
        if index < skip {
            continue;
        }
        match entry {
            Entry::Variable { width, .. } => {
                out.push((name.clone(), VarRef { scope, index }, *width));
            }
            Entry::Block { table } => collect_locals(symtab, *table, 0, out),
            Entry::Function { .. } => {}
        }
    }
}

impl<'a> CodeGen<'a> {
    /// Emit the whole program.
    pub fn generate(mut self) -> Result<String, CompileError> {
        self.data_section()?;
        let cfg = self.cfg;
        for slice in cfg.function_slices() {
            self.func_code(slice)?;
        }
        Ok(self.out)
    }

    /// One directive per global, sorted by name. Words get `.word 0`,
    /// floats reserve 8 bytes.
    fn data_section(&mut self) -> Result<(), CompileError> {
        writeln!(self.out, "\t.data")?;

        let mut globals: Vec<(String, bool)> = self
            .symtab
            .scope(GLOBAL_SCOPE)
            .entries
            .iter()
            .filter_map(|(name, entry)| match entry {
                Entry::Variable { dtype, .. } => Some((name.clone(), dtype.is_word())),
                _ => None,
            })
            .collect();
        globals.sort_by(|a, b| a.0.cmp(&b.0));

        for (name, is_word) in globals {
            if is_word {
                writeln!(self.out, "global_{}:\t.word\t0", name)?;
            } else {
                writeln!(self.out, "global_{}:\t.space\t8", name)?;
            }
        }
        writeln!(self.out)?;
        Ok(())
    }

    /// Fill frame offsets for one function and return its local size.
    fn compute_frame(&mut self, func_name: &str) -> Result<u32, CompileError> {
        let (table, num_params) = match self
            .symtab
            .look_up(GLOBAL_SCOPE, func_name)
            .map(|var| self.symtab.entry(var).clone())
        {
            Some(Entry::Function {
                table, num_params, ..
            }) => (table, num_params),
            _ => {
                return Err(CompileError::Undefined(format!(
                    "function '{}' in code generator",
                    func_name
                )));
            }
        };

        let mut locals = Vec::new();
        collect_locals(self.symtab, table, num_params, &mut locals);
        locals.sort_by(|a, b| a.0.cmp(&b.0));

        let mut offset = 4u32;
        let mut local_size = 0u32;
        for (_, var, width) in &locals {
            if let Entry::Variable { offset: slot, .. } = self.symtab.entry_mut(*var) {
                *slot = Some(offset);
            }
            offset += width;
            local_size += width;
        }

        let mut offset = 8 + local_size + 4;
        for index in 0..num_params {
            let var = VarRef {
                scope: table,
                index,
            };
            if let Entry::Variable {
                width,
                offset: slot,
                ..
            } = self.symtab.entry_mut(var)
            {
                let width = *width;
                *slot = Some(offset);
                offset += width;
            }
        }

        Ok(local_size)
    }

    fn func_code(&mut self, nodes: &[CfgNode]) -> Result<(), CompileError> {
        let func_name = match nodes.first().and_then(|n| n.func.as_ref()) {
            Some(info) => info.name.clone(),
            None => return Ok(()),
        };

        let local_size = self.compute_frame(&func_name)?;

        writeln!(self.out, "\t.text\t# The .text assembler directive indicates")?;
        writeln!(self.out, "\t.globl {}\t# The following is the code", func_name)?;
        writeln!(self.out, "{}:", func_name)?;
        writeln!(self.out, "# Prologue begins")?;
        writeln!(self.out, "\tsw $ra, 0($sp)\t# Save the return address")?;
        writeln!(self.out, "\tsw $fp, -4($sp)\t# Save the frame pointer")?;
        writeln!(self.out, "\tsub $fp, $sp, 8\t# Update the frame pointer")?;
        writeln!(
            self.out,
            "\tsub $sp, $sp, {}\t# Make space for the locals",
            8 + local_size
        )?;
        writeln!(self.out, "# Prologue ends")?;

        for node in nodes {
            writeln!(self.out, "label{}:", node.id)?;
            let code = self.node_code(node, &func_name)?;
            self.out.push_str(&code);
        }

        writeln!(self.out, "# Epilogue begins")?;
        writeln!(self.out, "epilogue_{}:", func_name)?;
        writeln!(self.out, "\tadd $sp, $sp, {}", 8 + local_size)?;
        writeln!(self.out, "\tlw $fp, -4($sp)")?;
        writeln!(self.out, "\tlw $ra, 0($sp)")?;
        writeln!(self.out, "\tjr $ra\t# Jump back to the called procedure")?;
        writeln!(self.out, "# Epilogue ends")?;
        Ok(())
    }
}
