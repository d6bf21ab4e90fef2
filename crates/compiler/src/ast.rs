//! Abstract syntax tree for APL
//!
//! Expression nodes carry their computed type (`dtype`), filled in by the
//! parser's semantic actions. Each node supports two renderings:
//! `as_tree` (indented multi-line, for the `.ast` dump) and `as_line`
//! (single line, used inside `.cfg` basic blocks). `as_line` never inserts
//! parentheses; evaluation order is already fixed by the tree shape.

use crate::symtab::VarRef;
use crate::types::{BaseType, Type};

/// Operator and node tags. A closed enumeration so emission code can be
/// checked for exhaustiveness at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Plus,
    Minus,
    Mul,
    Div,
    Uminus,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    Not,
    Deref,
    Addr,
    Asgn,
}

impl Op {
    /// Dump tag, e.g. `PLUS`, `ASGN`.
    pub fn tag(self) -> &'static str {
        match self {
            Op::Plus => "PLUS",
            Op::Minus => "MINUS",
            Op::Mul => "MUL",
            Op::Div => "DIV",
            Op::Uminus => "UMINUS",
            Op::Lt => "LT",
            Op::Le => "LE",
            Op::Gt => "GT",
            Op::Ge => "GE",
            Op::Eq => "EQ",
            Op::Ne => "NE",
            Op::And => "AND",
            Op::Or => "OR",
            Op::Not => "NOT",
            Op::Deref => "DEREF",
            Op::Addr => "ADDR",
            Op::Asgn => "ASGN",
        }
    }

    /// Source glyph, e.g. `+`, `=`.
    pub fn symbol(self) -> &'static str {
        match self {
            Op::Plus => "+",
            Op::Minus | Op::Uminus => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Eq => "==",
            Op::Ne => "!=",
            Op::And => "&&",
            Op::Or => "||",
            Op::Not => "!",
            Op::Deref => "*",
            Op::Addr => "&",
            Op::Asgn => "=",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(self, Op::Lt | Op::Le | Op::Gt | Op::Ge | Op::Eq | Op::Ne)
    }
}

/// Expression nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal; `text` is the source lexeme, preserved verbatim for dumps
    /// and for `li`/`li.s` immediates.
    Const { text: String, dtype: Type },
    /// Identifier reference. `var` is filled by the resolver and is `None`
    /// only for synthetic temporaries introduced by the CFG builder.
    Var {
        name: String,
        var: Option<VarRef>,
        dtype: Type,
    },
    Unary {
        op: Op,
        child: Box<Expr>,
        dtype: Type,
    },
    Binary {
        op: Op,
        left: Box<Expr>,
        right: Box<Expr>,
        dtype: Type,
    },
    Call {
        name: String,
        args: Vec<Expr>,
        dtype: Type,
    },
}

impl Expr {
    pub fn dtype(&self) -> Type {
        match self {
            Expr::Const { dtype, .. }
            | Expr::Var { dtype, .. }
            | Expr::Unary { dtype, .. }
            | Expr::Binary { dtype, .. }
            | Expr::Call { dtype, .. } => *dtype,
        }
    }

    /// A synthetic temporary for the three-address form.
    pub fn temp(n: usize) -> Expr {
        Expr::Var {
            name: format!("t{}", n),
            var: None,
            dtype: Type::bool(),
        }
    }

    /// True when every leaf of the expression is a constant.
    pub fn const_leaves(&self) -> bool {
        match self {
            Expr::Const { .. } => true,
            Expr::Var { .. } | Expr::Call { .. } => false,
            Expr::Unary { child, .. } => child.const_leaves(),
            Expr::Binary { left, right, .. } => left.const_leaves() && right.const_leaves(),
        }
    }

    pub fn as_tree(&self, depth: usize) -> String {
        let tab = "\t".repeat(depth);
        match self {
            Expr::Const { text, .. } => format!("{}CONST({})\n", tab, text),
            Expr::Var { name, .. } => format!("{}VAR({})\n", tab, name),
            Expr::Unary { op, child, .. } => format!(
                "{}{}\n{}(\n{}{})\n",
                tab,
                op.tag(),
                tab,
                child.as_tree(depth + 1),
                tab
            ),
            Expr::Binary {
                op, left, right, ..
            } => format!(
                "{}{}\n{}(\n{}{}\t,\n{}{})\n",
                tab,
                op.tag(),
                tab,
                left.as_tree(depth + 1),
                tab,
                right.as_tree(depth + 1),
                tab
            ),
            Expr::Call { name, args, .. } => {
                let mut s = format!("{}FUNC_CALL({})\n{}(\n", tab, name, tab);
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        s.push_str(&format!("{}\t,\n", tab));
                    }
                    s.push_str(&arg.as_tree(depth + 1));
                }
                s.push_str(&format!("{})\n", tab));
                s
            }
        }
    }

    pub fn as_line(&self) -> String {
        match self {
            Expr::Const { text, .. } => text.clone(),
            Expr::Var { name, .. } => name.clone(),
            Expr::Unary { op, child, .. } => format!("{}{}", op.symbol(), child.as_line()),
            Expr::Binary {
                op, left, right, ..
            } => format!("{} {} {}", left.as_line(), op.symbol(), right.as_line()),
            Expr::Call { name, args, .. } => {
                let args: Vec<String> = args.iter().map(|a| a.as_line()).collect();
                format!("{}({})", name, args.join(", "))
            }
        }
    }
}

/// A single variable declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Decl {
    pub name: String,
    pub base: BaseType,
    pub ptr_level: usize,
}

/// A formal parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub dtype: Type,
}

impl std::fmt::Display for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}{}",
            self.dtype.base,
            "*".repeat(self.dtype.ptr_level),
            self.name
        )
    }
}

/// A function definition or prototype (`body` absent for prototypes).
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub ret_type: Type,
    pub name: String,
    pub params: Vec<Param>,
    pub body: Option<Vec<Stmt>>,
}

/// Statement nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `lhs = rhs`. The left side is a `Var` or a chain of derefs; `=` is
    /// not an rvalue and never appears inside an expression.
    Assign { lhs: Expr, rhs: Expr },
    /// Function call in statement position.
    Call(Expr),
    /// Declarations. Built by the parser but filtered out of statement
    /// lists: they only populate the symbol table.
    DeclList(Vec<Decl>),
    If {
        cond: Expr,
        body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    While { cond: Expr, body: Vec<Stmt> },
    Block(Vec<Stmt>),
    Return(Option<Expr>),
    Function(Function),
}

impl Stmt {
    pub fn as_tree(&self, depth: usize) -> String {
        let tab = "\t".repeat(depth);
        match self {
            Stmt::Assign { lhs, rhs } => format!(
                "{}{}\n{}(\n{}{}\t,\n{}{})\n",
                tab,
                Op::Asgn.tag(),
                tab,
                lhs.as_tree(depth + 1),
                tab,
                rhs.as_tree(depth + 1),
                tab
            ),
            Stmt::Call(call) => call.as_tree(depth),
            Stmt::DeclList(decls) => {
                let mut s = String::new();
                for d in decls {
                    s.push_str(&format!(
                        "{}DECL({} {}{})\n",
                        tab,
                        d.base,
                        "*".repeat(d.ptr_level),
                        d.name
                    ));
                }
                s
            }
            Stmt::If {
                cond,
                body,
                else_body,
            } => {
                let mut s = format!("{}IF\n{}(\n{}{}\t,\n", tab, tab, cond.as_tree(depth + 1), tab);
                for stmt in body {
                    s.push_str(&stmt.as_tree(depth + 1));
                }
                if !else_body.is_empty() {
                    s.push_str(&format!("{}\t,\n", tab));
                    for stmt in else_body {
                        s.push_str(&stmt.as_tree(depth + 1));
                    }
                }
                s.push_str(&format!("{})\n", tab));
                s
            }
            Stmt::While { cond, body } => {
                let mut s = format!(
                    "{}WHILE\n{}(\n{}{}\t,\n",
                    tab,
                    tab,
                    cond.as_tree(depth + 1),
                    tab
                );
                for stmt in body {
                    s.push_str(&stmt.as_tree(depth + 1));
                }
                s.push_str(&format!("{})\n", tab));
                s
            }
            Stmt::Block(body) => {
                let mut s = format!("{}BLOCK\n{}(\n", tab, tab);
                for stmt in body {
                    s.push_str(&stmt.as_tree(depth + 1));
                }
                s.push_str(&format!("{})\n", tab));
                s
            }
            Stmt::Return(value) => match value {
                Some(expr) => format!(
                    "{}RETURN\n{}(\n{}{})\n",
                    tab,
                    tab,
                    expr.as_tree(depth + 1),
                    tab
                ),
                None => format!("{}RETURN\n", tab),
            },
            Stmt::Function(func) => {
                let mut s = format!("{}FUNC({})\n{}(\n", tab, func.name, tab);
                for param in &func.params {
                    s.push_str(&format!("{}\tPARAM({})\n", tab, param));
                }
                if let Some(body) = &func.body {
                    if !func.params.is_empty() {
                        s.push_str(&format!("{}\t,\n", tab));
                    }
                    for stmt in body {
                        s.push_str(&stmt.as_tree(depth + 1));
                    }
                }
                s.push_str(&format!("{})\n", tab));
                s
            }
        }
    }

    /// Single-line form, defined for the statement kinds that appear in
    /// CFG basic blocks.
    pub fn as_line(&self) -> String {
        match self {
            Stmt::Assign { lhs, rhs } => format!(
                "{} {} {}",
                lhs.as_line(),
                Op::Asgn.symbol(),
                rhs.as_line()
            ),
            Stmt::Call(call) => call.as_line(),
            _ => String::new(),
        }
    }
}

/// Render a whole top-level statement list as the `.ast` artifact.
pub fn render_program(stmts: &[Stmt]) -> String {
    let mut out = String::new();
    for stmt in stmts {
        out.push_str(&stmt.as_tree(0));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Expr {
        Expr::Var {
            name: name.to_string(),
            var: None,
            dtype: Type::int(),
        }
    }

    fn int_const(text: &str) -> Expr {
        Expr::Const {
            text: text.to_string(),
            dtype: Type::int(),
        }
    }

    #[test]
    fn test_assign_tree_dump() {
        let stmt = Stmt::Assign {
            lhs: var("a"),
            rhs: int_const("5"),
        };
        assert_eq!(stmt.as_tree(0), "ASGN\n(\n\tVAR(a)\n\t,\n\tCONST(5)\n)\n");
    }

    #[test]
    fn test_binop_line_is_single_line() {
        let expr = Expr::Binary {
            op: Op::Plus,
            left: Box::new(var("a")),
            right: Box::new(Expr::Unary {
                op: Op::Deref,
                child: Box::new(var("p")),
                dtype: Type::int(),
            }),
            dtype: Type::int(),
        };
        let line = expr.as_line();
        assert_eq!(line, "a + *p");
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_call_line() {
        let call = Expr::Call {
            name: "add".to_string(),
            args: vec![int_const("1"), int_const("2")],
            dtype: Type::int(),
        };
        assert_eq!(call.as_line(), "add(1, 2)");
    }

    #[test]
    fn test_const_leaves() {
        assert!(int_const("5").const_leaves());
        assert!(!var("a").const_leaves());
        let mixed = Expr::Binary {
            op: Op::Plus,
            left: Box::new(int_const("1")),
            right: Box::new(var("a")),
            dtype: Type::int(),
        };
        assert!(!mixed.const_leaves());
        let all_const = Expr::Binary {
            op: Op::Mul,
            left: Box::new(int_const("2")),
            right: Box::new(int_const("3")),
            dtype: Type::int(),
        };
        assert!(all_const.const_leaves());
    }

    #[test]
    fn test_uminus_and_addr_lines() {
        let neg = Expr::Unary {
            op: Op::Uminus,
            child: Box::new(var("x")),
            dtype: Type::int(),
        };
        assert_eq!(neg.as_line(), "-x");
        let addr = Expr::Unary {
            op: Op::Addr,
            child: Box::new(var("x")),
            dtype: Type::new(BaseType::Int, 1),
        };
        assert_eq!(addr.as_line(), "&x");
    }

    #[test]
    fn test_if_tree_shape() {
        let stmt = Stmt::If {
            cond: Expr::Binary {
                op: Op::Lt,
                left: Box::new(var("a")),
                right: Box::new(int_const("2")),
                dtype: Type::bool(),
            },
            body: vec![Stmt::Assign {
                lhs: var("a"),
                rhs: int_const("2"),
            }],
            else_body: vec![],
        };
        let dump = stmt.as_tree(0);
        assert!(dump.starts_with("IF\n(\n\tLT\n"));
        assert!(dump.contains("\tASGN\n"));
    }
}
