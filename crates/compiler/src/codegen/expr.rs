//! Expression emission.
//!
//! `expr_code` evaluates an expression tree into a register and returns
//! its name. Integer and pointer values travel in the general pool; float
//! values in the float pool. A function call leaves its result in the
//! return-value register (`v1`, or `f0` for floats) and that name is
//! returned instead.

use crate::ast::{Expr, Op};
use crate::error::CompileError;
use crate::symtab::{Entry, GLOBAL_SCOPE, VarRef};

use super::CodeGen;

/// Where a named variable lives.
pub(super) enum VarLoc {
    Global(String),
    Frame(u32),
}

impl<'a> CodeGen<'a> {
    pub(super) fn var_location(&self, var: Option<VarRef>, name: &str) -> Result<VarLoc, CompileError> {
        let var = var.ok_or_else(|| {
            CompileError::Undefined(format!("unresolved variable '{}' in code generator", name))
        })?;
        if var.scope == GLOBAL_SCOPE {
            return Ok(VarLoc::Global(format!("global_{}", name)));
        }
        match self.symtab.entry(var) {
            Entry::Variable {
                offset: Some(offset),
                ..
            } => Ok(VarLoc::Frame(*offset)),
            _ => Err(CompileError::Undefined(format!(
                "variable '{}' has no frame slot",
                name
            ))),
        }
    }

    /// Load a named variable into a fresh register.
    fn var_code(
        &mut self,
        var: Option<VarRef>,
        name: &str,
        dtype: crate::types::Type,
        code: &mut Vec<String>,
    ) -> Result<String, CompileError> {
        let loc = self.var_location(var, name)?;
        if dtype.is_word() {
            let reg = self.alloc_int()?;
            match loc {
                VarLoc::Global(label) => code.push(format!("lw ${}, {}", reg, label)),
                VarLoc::Frame(offset) => code.push(format!("lw ${}, {}($sp)", reg, offset)),
            }
            Ok(reg)
        } else {
            let reg = self.alloc_float()?;
            match loc {
                VarLoc::Global(label) => code.push(format!("l.s ${}, {}", reg, label)),
                VarLoc::Frame(offset) => code.push(format!("l.s ${}, {}($sp)", reg, offset)),
            }
            Ok(reg)
        }
    }

    pub(super) fn expr_code(
        &mut self,
        expr: &Expr,
        code: &mut Vec<String>,
    ) -> Result<String, CompileError> {
        match expr {
            Expr::Const { text, dtype } => {
                if dtype.is_word() {
                    let reg = self.alloc_int()?;
                    code.push(format!("li ${}, {}", reg, text));
                    Ok(reg)
                } else {
                    let reg = self.alloc_float()?;
                    code.push(format!("li.s ${}, {}", reg, text));
                    Ok(reg)
                }
            }

            Expr::Var {
                name, var, dtype, ..
            } => self.var_code(*var, name, *dtype, code),

            Expr::Unary {
                op: Op::Deref,
                child,
                dtype,
            } => {
                // *&x collapses to a direct load of x
                if let Expr::Unary {
                    op: Op::Addr,
                    child: inner,
                    ..
                } = child.as_ref()
                {
                    if let Expr::Var { name, var, dtype } = inner.as_ref() {
                        return self.var_code(*var, name, *dtype, code);
                    }
                }

                let addr = self.expr_code(child, code)?;
                if dtype.is_word() {
                    let reg = self.alloc_int()?;
                    code.push(format!("lw ${}, 0(${})", reg, addr));
                    self.free_reg(&addr);
                    Ok(reg)
                } else {
                    let reg = self.alloc_float()?;
                    code.push(format!("l.s ${}, 0(${})", reg, addr));
                    self.free_reg(&addr);
                    Ok(reg)
                }
            }

            Expr::Unary {
                op: Op::Addr,
                child,
                ..
            } => {
                let (name, var) = match child.as_ref() {
                    Expr::Var { name, var, .. } => (name.as_str(), *var),
                    other => {
                        return Err(CompileError::BadPointerUse(format!(
                            "cannot take the address of '{}'",
                            other.as_line()
                        )));
                    }
                };
                let loc = self.var_location(var, name)?;
                let reg = self.alloc_int()?;
                match loc {
                    VarLoc::Global(label) => code.push(format!("la ${}, {}", reg, label)),
                    VarLoc::Frame(offset) => code.push(format!("addi ${}, $sp, {}", reg, offset)),
                }
                Ok(reg)
            }

            Expr::Unary {
                op: Op::Uminus,
                child,
                dtype,
            } => {
                let src = self.expr_code(child, code)?;
                if dtype.is_word() {
                    let reg = self.alloc_int()?;
                    code.push(format!("negu ${}, ${}", reg, src));
                    self.free_reg(&src);
                    Ok(reg)
                } else {
                    let reg = self.alloc_float()?;
                    code.push(format!("neg.s ${}, ${}", reg, src));
                    self.free_reg(&src);
                    Ok(reg)
                }
            }

            Expr::Unary {
                op: Op::Not, child, ..
            } => {
                let src = self.expr_code(child, code)?;
                let reg = self.alloc_int()?;
                code.push(format!("xori ${}, ${}, 1", reg, src));
                self.free_reg(&src);
                Ok(reg)
            }

            Expr::Unary { op, child, .. } => Err(CompileError::Allocator(format!(
                "operator {} cannot be emitted over '{}'",
                op.tag(),
                child.as_line()
            ))),

            Expr::Binary {
                op, left, right, ..
            } => self.binop_code(*op, left, right, code),

            Expr::Call { .. } => self.call_code(expr, code),
        }
    }

    fn binop_code(
        &mut self,
        op: Op,
        left: &Expr,
        right: &Expr,
        code: &mut Vec<String>,
    ) -> Result<String, CompileError> {
        let operand_type = left.dtype();

        if operand_type.is_bool() {
            let r1 = self.expr_code(left, code)?;
            let r2 = self.expr_code(right, code)?;
            let reg = self.alloc_int()?;
            let mnemonic = if op == Op::And { "and" } else { "or" };
            code.push(format!("{} ${}, ${}, ${}", mnemonic, reg, r1, r2));
            self.free_reg(&r1);
            self.free_reg(&r2);
            return Ok(reg);
        }

        if operand_type.is_word() {
            let r1 = self.expr_code(left, code)?;
            let r2 = self.expr_code(right, code)?;
            let reg = self.alloc_int()?;
            match op {
                Op::Plus => code.push(format!("add ${}, ${}, ${}", reg, r1, r2)),
                Op::Minus => code.push(format!("sub ${}, ${}, ${}", reg, r1, r2)),
                Op::Mul => code.push(format!("mul ${}, ${}, ${}", reg, r1, r2)),
                Op::Div => {
                    code.push(format!("div ${}, ${}", r1, r2));
                    code.push(format!("mflo ${}", reg));
                }
                Op::Lt => code.push(format!("slt ${}, ${}, ${}", reg, r1, r2)),
                Op::Gt => code.push(format!("slt ${}, ${}, ${}", reg, r2, r1)),
                Op::Le => code.push(format!("sle ${}, ${}, ${}", reg, r1, r2)),
                Op::Ge => code.push(format!("sle ${}, ${}, ${}", reg, r2, r1)),
                Op::Eq => code.push(format!("seq ${}, ${}, ${}", reg, r1, r2)),
                Op::Ne => code.push(format!("sne ${}, ${}, ${}", reg, r1, r2)),
                other => {
                    return Err(CompileError::Allocator(format!(
                        "operator {} cannot be emitted for integer operands",
                        other.tag()
                    )));
                }
            }
            self.free_reg(&r1);
            self.free_reg(&r2);
            return Ok(reg);
        }

        // float operands
        let r1 = self.expr_code(left, code)?;
        let r2 = self.expr_code(right, code)?;

        if matches!(op, Op::Plus | Op::Minus | Op::Mul | Op::Div) {
            let reg = self.alloc_float()?;
            let mnemonic = match op {
                Op::Plus => "add.s",
                Op::Minus => "sub.s",
                Op::Mul => "mul.s",
                _ => "div.s",
            };
            code.push(format!("{} ${}, ${}, ${}", mnemonic, reg, r1, r2));
            self.free_reg(&r1);
            self.free_reg(&r2);
            return Ok(reg);
        }

        if !op.is_comparison() {
            return Err(CompileError::Allocator(format!(
                "operator {} cannot be emitted for float operands",
                op.tag()
            )));
        }

        // float comparison: condition flag + 0/1 materialization
        let label = self.fcmp_count;
        self.fcmp_count += 1;
        let reg = self.alloc_int()?;

        if op == Op::Ne {
            code.push(format!("c.eq.s ${}, ${}", r2, r1));
            code.push(format!("bc1f L_CondTrue_{}", label));
            code.push(format!("li ${}, 0", reg));
            code.push(format!("j L_CondEnd_{}", label));
            code.push(format!("@L_CondTrue_{}:", label));
            code.push(format!("li ${}, 1", reg));
            code.push(format!("@L_CondEnd_{}:", label));
        } else {
            match op {
                Op::Lt => code.push(format!("c.lt.s ${}, ${}", r1, r2)),
                Op::Gt => code.push(format!("c.lt.s ${}, ${}", r2, r1)),
                Op::Le => code.push(format!("c.le.s ${}, ${}", r1, r2)),
                Op::Ge => code.push(format!("c.le.s ${}, ${}", r2, r1)),
                _ => code.push(format!("c.eq.s ${}, ${}", r2, r1)),
            }
            code.push(format!("bc1f L_CondFalse_{}", label));
            code.push(format!("li ${}, 1", reg));
            code.push(format!("j L_CondEnd_{}", label));
            code.push(format!("@L_CondFalse_{}:", label));
            code.push(format!("li ${}, 0", reg));
            code.push(format!("@L_CondEnd_{}:", label));
        }

        self.free_reg(&r1);
        self.free_reg(&r2);
        Ok(reg)
    }

    /// Emit a call: arguments stored below `$sp` right-to-left (argument
    /// 0 lowest), stack bumped for the callee's view, result left in the
    /// return-value register. Each argument is evaluated exactly once.
    fn call_code(&mut self, call: &Expr, code: &mut Vec<String>) -> Result<String, CompileError> {
        let (name, args, dtype) = match call {
            Expr::Call { name, args, dtype } => (name, args, dtype),
            other => {
                return Err(CompileError::Undefined(format!(
                    "'{}' is not a call",
                    other.as_line()
                )));
            }
        };

        let widths: Vec<i64> = args.iter().map(|a| i64::from(a.dtype().width())).collect();
        let count = args.len();
        let mut offsets = vec![0i64; count];
        let mut offset = 0i64;
        for i in (0..count).rev() {
            offsets[i] = offset;
            offset -= widths[i];
        }
        let total = -offset;

        code.push("# setting up activation record for called function".to_string());
        for (i, arg) in args.iter().enumerate() {
            let reg = self.expr_code(arg, code)?;
            if arg.dtype().is_word() {
                code.push(format!("sw ${}, {}($sp)", reg, offsets[i]));
            } else {
                code.push(format!("s.s ${}, {}($sp)", reg, offsets[i]));
            }
            self.free_reg(&reg);
        }

        code.push(format!("sub $sp, $sp, {}", total));
        code.push(format!("jal {} # function call", name));
        code.push(format!(
            "add $sp, $sp, {} # destroying activation record of called function",
            total
        ));

        if dtype.is_word() || dtype.is_void() {
            Ok("v1".to_string())
        } else {
            Ok("f0".to_string())
        }
    }
}
