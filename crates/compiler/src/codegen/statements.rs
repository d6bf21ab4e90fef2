//! Per-node translation: assignments, conditional branches, returns, and
//! statement-position calls.

use crate::ast::{Expr, Op, Stmt};
use crate::cfg::{CfgNode, NodeKind};
use crate::error::CompileError;

use super::state::code_string;
use super::{CodeGen, expr::VarLoc};

impl<'a> CodeGen<'a> {
    pub(super) fn node_code(
        &mut self,
        node: &CfgNode,
        func_name: &str,
    ) -> Result<String, CompileError> {
        match &node.kind {
            NodeKind::End => Ok(String::new()),

            NodeKind::Return { value, .. } => {
                let mut out = String::new();
                if let Some(expr) = value {
                    out.push_str(&self.return_code(expr)?);
                }
                out.push_str(&format!("\tj epilogue_{}\n\n", func_name));
                Ok(out)
            }

            NodeKind::Logical {
                cond,
                goto_t,
                goto_f,
            } => match (goto_t, goto_f) {
                (Some(t), Some(f)) => self.logical_code(cond, *t, *f),
                _ => Ok(String::new()),
            },

            NodeKind::Seq { stmts, goto_ } => {
                let mut out = String::new();
                for stmt in stmts {
                    match stmt {
                        Stmt::Assign { lhs, rhs } => {
                            out.push_str(&self.assignment_code(lhs, rhs)?);
                        }
                        Stmt::Call(call) => {
                            let mut code = Vec::new();
                            let reg = self.expr_code(call, &mut code)?;
                            self.free_reg(&reg);
                            out.push_str(&code_string(&code));
                        }
                        _ => {}
                    }
                }
                if let Some(target) = goto_ {
                    out.push_str(&format!("\tj label{}\n", target));
                }
                Ok(out)
            }
        }
    }

    /// Evaluate the condition and branch: taken edge first, fall-through
    /// as an unconditional jump.
    fn logical_code(
        &mut self,
        cond: &Expr,
        goto_t: usize,
        goto_f: usize,
    ) -> Result<String, CompileError> {
        let mut code = Vec::new();
        let reg = self.expr_code(cond, &mut code)?;
        code.push(format!("bne ${}, $0, label{}", reg, goto_t));
        code.push(format!("j label{}", goto_f));
        self.free_reg(&reg);
        Ok(code_string(&code))
    }

    /// Move the return value into its register; the epilogue jump is
    /// appended by the caller.
    fn return_code(&mut self, expr: &Expr) -> Result<String, CompileError> {
        let mut code = Vec::new();
        let reg = self.expr_code(expr, &mut code)?;
        if expr.dtype().is_word() {
            if reg != "v1" {
                code.push(format!("move $v1, ${} # move return value to $v1", reg));
                self.free_reg(&reg);
            }
        } else if reg != "f0" {
            code.push(format!("mov.s $f0, ${} # move return value to $f0", reg));
            self.free_reg(&reg);
        }
        Ok(code_string(&code))
    }

    fn assignment_code(&mut self, lhs: &Expr, rhs: &Expr) -> Result<String, CompileError> {
        let mut code = Vec::new();
        let mut rhs_reg = self.expr_code(rhs, &mut code)?;

        // copy a call result out of the return-value register
        if matches!(rhs, Expr::Call { .. }) {
            if rhs.dtype().is_word() {
                let reg = self.alloc_int()?;
                code.push(format!(
                    "move ${}, $v1 # using the return value of called function",
                    reg
                ));
                rhs_reg = reg;
            } else {
                let reg = self.alloc_float()?;
                code.push(format!(
                    "mov.s ${}, $f0 # using the return value of called function",
                    reg
                ));
                rhs_reg = reg;
            }
        }

        match lhs {
            Expr::Var {
                name, var, dtype, ..
            } => {
                let store = if dtype.is_word() { "sw" } else { "s.s" };
                match self.var_location(*var, name)? {
                    VarLoc::Global(label) => {
                        code.push(format!("{} ${}, {}", store, rhs_reg, label))
                    }
                    VarLoc::Frame(offset) => {
                        code.push(format!("{} ${}, {}($sp)", store, rhs_reg, offset))
                    }
                }
            }
            Expr::Unary {
                op: Op::Deref,
                child,
                dtype,
            } => {
                let addr = self.expr_code(child, &mut code)?;
                let store = if dtype.is_word() { "sw" } else { "s.s" };
                code.push(format!("{} ${}, 0(${})", store, rhs_reg, addr));
                self.free_reg(&addr);
            }
            other => {
                return Err(CompileError::TypeMismatch(format!(
                    "'{}' is not assignable",
                    other.as_line()
                )));
            }
        }

        self.free_reg(&rhs_reg);
        Ok(code_string(&code))
    }
}
