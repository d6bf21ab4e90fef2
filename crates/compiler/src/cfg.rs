//! Control-flow graph construction
//!
//! Lowers each function's statement list into numbered basic blocks of
//! three-address code. Block ids are dense and program-wide (assembly
//! labels are derived from them); temporary numbering restarts at every
//! function and is monotone across its blocks.
//!
//! Each node keeps two renditions of its body: the cloned original
//! statements (walked again by the code generator) and the three-address
//! form with `tN` temporaries (used by the `.cfg` dump). Cloning keeps the
//! parser's AST pristine for the `.ast` dump.

use crate::ast::{Expr, Function, Param, Stmt};

/// Marks the first block of a function, for dump headers and for grouping
/// blocks during code generation.
#[derive(Debug, Clone)]
pub struct FuncInfo {
    pub name: String,
    pub params: Vec<Param>,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Straight-line run of assignments and calls, ending in a jump.
    Seq {
        stmts: Vec<Stmt>,
        goto_: Option<usize>,
    },
    /// One condition expression with a two-way branch.
    Logical {
        cond: Expr,
        goto_t: Option<usize>,
        goto_f: Option<usize>,
    },
    /// `value` is the original expression (for the code generator),
    /// `operand` its lowered single-operand form (for the dump).
    Return {
        value: Option<Expr>,
        operand: Option<Expr>,
    },
    /// Sentinel with no successors.
    End,
}

#[derive(Debug, Clone)]
pub struct CfgNode {
    pub id: usize,
    pub func: Option<FuncInfo>,
    pub kind: NodeKind,
    /// Three-address rendition of the body.
    pub tac: Vec<Stmt>,
    pub temp_start: usize,
    pub temp_count: usize,
}

impl CfgNode {
    fn is_empty(&self) -> bool {
        matches!(&self.kind, NodeKind::Seq { stmts, .. } if stmts.is_empty())
    }

    fn render(&self, out: &mut String) {
        if let Some(func) = &self.func {
            let params: Vec<String> = func.params.iter().map(|p| p.to_string()).collect();
            out.push_str(&format!("function {}({})\n", func.name, params.join(", ")));
        }
        out.push_str(&format!("<bb {}>\n", self.id));

        match &self.kind {
            NodeKind::End => out.push_str("End"),
            NodeKind::Return { operand, .. } => {
                for line in &self.tac {
                    out.push_str(&line.as_line());
                    out.push('\n');
                }
                out.push_str("return");
                if let Some(op) = operand {
                    out.push(' ');
                    out.push_str(&op.as_line());
                }
                out.push('\n');
            }
            NodeKind::Logical { goto_t, goto_f, .. } => {
                for line in &self.tac {
                    out.push_str(&line.as_line());
                    out.push('\n');
                }
                if let (Some(t), Some(f)) = (goto_t, goto_f) {
                    out.push_str(&format!(
                        "if(t{}) goto <bb {}>\n",
                        self.temp_start + self.temp_count - 1,
                        t
                    ));
                    out.push_str(&format!("else goto <bb {}>\n", f));
                }
            }
            NodeKind::Seq { goto_, .. } => {
                for line in &self.tac {
                    out.push_str(&line.as_line());
                    out.push('\n');
                }
                if let Some(g) = goto_ {
                    out.push_str(&format!("goto <bb {}>\n", g));
                }
            }
        }
    }
}

/// Lowers expressions inside one node into three-address lines.
struct NodeBuilder {
    temp_start: usize,
    temp_count: usize,
    tac: Vec<Stmt>,
}

impl NodeBuilder {
    fn new(temp_start: usize) -> Self {
        NodeBuilder {
            temp_start,
            temp_count: 0,
            tac: Vec::new(),
        }
    }

    fn fresh_temp(&mut self) -> Expr {
        let t = Expr::temp(self.temp_start + self.temp_count);
        self.temp_count += 1;
        t
    }

    /// Recursively split an expression, materializing a temp per binary
    /// operator. Unary operators and calls stay inline; the emitter
    /// handles them directly.
    fn split(&mut self, expr: &Expr) -> Expr {
        match expr {
            Expr::Binary {
                op, left, right, dtype,
            } => {
                let tl = self.split(left);
                let tr = self.split(right);
                let temp = self.fresh_temp();
                self.tac.push(Stmt::Assign {
                    lhs: temp.clone(),
                    rhs: Expr::Binary {
                        op: *op,
                        left: Box::new(tl),
                        right: Box::new(tr),
                        dtype: *dtype,
                    },
                });
                temp
            }
            Expr::Unary { op, child, dtype } => Expr::Unary {
                op: *op,
                child: Box::new(self.split(child)),
                dtype: *dtype,
            },
            Expr::Call { name, args, dtype } => Expr::Call {
                name: name.clone(),
                args: args.iter().map(|a| self.split(a)).collect(),
                dtype: *dtype,
            },
            leaf => leaf.clone(),
        }
    }

    fn lower_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Assign { lhs, rhs } => {
                let tl = self.split(lhs);
                let tr = self.split(rhs);
                self.tac.push(Stmt::Assign { lhs: tl, rhs: tr });
            }
            Stmt::Call(call) => {
                let lowered = self.split(call);
                self.tac.push(Stmt::Call(lowered));
            }
            _ => {}
        }
    }

    /// Lower a condition, guaranteeing the chain ends in a temp so the
    /// branch line can name it.
    fn lower_cond(&mut self, cond: &Expr) {
        let result = self.split(cond);
        let is_last_temp = self.temp_count > 0
            && matches!(
                &result,
                Expr::Var { name, var: None, .. }
                    if *name == format!("t{}", self.temp_start + self.temp_count - 1)
            );
        if !is_last_temp {
            let temp = self.fresh_temp();
            self.tac.push(Stmt::Assign {
                lhs: temp,
                rhs: result,
            });
        }
    }
}

/// The program's control-flow graph: one group of blocks per function
/// followed by a single end sentinel.
#[derive(Debug, Clone)]
pub struct Cfg {
    pub nodes: Vec<CfgNode>,
    temp_count: usize,
}

impl Cfg {
    pub fn build(program: &[Stmt]) -> Cfg {
        let mut cfg = Cfg {
            nodes: Vec::new(),
            temp_count: 0,
        };
        let mut no_func = None;
        cfg.create_nodes(program, &mut no_func);

        let id = cfg.nodes.len();
        cfg.nodes.push(CfgNode {
            id,
            func: None,
            kind: NodeKind::End,
            tac: Vec::new(),
            temp_start: cfg.temp_count,
            temp_count: 0,
        });

        cfg.clean_up();
        cfg
    }

    /// Contiguous per-function block slices, in emission order. The end
    /// sentinel is not part of any function.
    pub fn function_slices(&self) -> Vec<&[CfgNode]> {
        let mut slices = Vec::new();
        let mut start: Option<usize> = None;
        for (i, node) in self.nodes.iter().enumerate() {
            let is_boundary = node.func.is_some() || matches!(node.kind, NodeKind::End);
            if is_boundary {
                if let Some(s) = start {
                    slices.push(&self.nodes[s..i]);
                }
                start = if matches!(node.kind, NodeKind::End) {
                    None
                } else {
                    Some(i)
                };
            }
        }
        slices
    }

    fn push_node(&mut self, mut node: CfgNode) -> usize {
        let id = self.nodes.len();
        node.id = id;
        self.temp_count += node.temp_count;
        self.nodes.push(node);
        id
    }

    fn set_goto(&mut self, id: usize, target: usize) {
        if let NodeKind::Seq { goto_, .. } = &mut self.nodes[id].kind {
            *goto_ = Some(target);
        }
    }

    fn create_nodes(&mut self, stmts: &[Stmt], func: &mut Option<FuncInfo>) {
        let n = stmts.len();
        let mut i = 0;

        while i < n {
            // maximal run of straight-line statements
            let mut j = i;
            while j < n && matches!(stmts[j], Stmt::Assign { .. } | Stmt::Call(_)) {
                j += 1;
            }

            if i != j {
                let mut builder = NodeBuilder::new(self.temp_count);
                for stmt in &stmts[i..j] {
                    builder.lower_stmt(stmt);
                }
                let id = self.push_node(CfgNode {
                    id: 0,
                    func: func.take(),
                    kind: NodeKind::Seq {
                        stmts: stmts[i..j].to_vec(),
                        goto_: None,
                    },
                    tac: builder.tac,
                    temp_start: builder.temp_start,
                    temp_count: builder.temp_count,
                });
                let next = self.nodes.len();
                self.set_goto(id, next);
            }

            if j < n {
                match &stmts[j] {
                    Stmt::If {
                        cond,
                        body,
                        else_body,
                    } => self.create_if(cond, body, else_body, func),
                    Stmt::While { cond, body } => self.create_while(cond, body, func),
                    Stmt::Function(f) => {
                        self.create_function(f);
                        *func = None;
                    }
                    Stmt::Return(value) => {
                        let mut builder = NodeBuilder::new(self.temp_count);
                        let operand = value.as_ref().map(|e| builder.split(e));
                        self.push_node(CfgNode {
                            id: 0,
                            func: func.take(),
                            kind: NodeKind::Return {
                                value: value.clone(),
                                operand,
                            },
                            tac: builder.tac,
                            temp_start: builder.temp_start,
                            temp_count: builder.temp_count,
                        });
                    }
                    // nested braces: lower the contents in place
                    Stmt::Block(body) => self.create_nodes(body, func),
                    Stmt::DeclList(_) => {}
                    Stmt::Assign { .. } | Stmt::Call(_) => {}
                }
                j += 1;
            }

            i = j;
        }

        // blank join node; spliced out during clean-up unless something
        // still points at it
        let id = self.push_node(CfgNode {
            id: 0,
            func: None,
            kind: NodeKind::Seq {
                stmts: Vec::new(),
                goto_: None,
            },
            tac: Vec::new(),
            temp_start: self.temp_count,
            temp_count: 0,
        });
        let next = self.nodes.len();
        self.set_goto(id, next);
    }

    fn create_if(
        &mut self,
        cond: &Expr,
        body: &[Stmt],
        else_body: &[Stmt],
        func: &mut Option<FuncInfo>,
    ) {
        let mut builder = NodeBuilder::new(self.temp_count);
        builder.lower_cond(cond);
        let cond_id = self.push_node(CfgNode {
            id: 0,
            func: func.take(),
            kind: NodeKind::Logical {
                cond: cond.clone(),
                goto_t: None,
                goto_f: None,
            },
            tac: builder.tac,
            temp_start: builder.temp_start,
            temp_count: builder.temp_count,
        });

        let body_start = self.nodes.len();
        let mut no_func = None;
        self.create_nodes(body, &mut no_func);
        let last_if = self.nodes.len() - 1;

        let else_start = self.nodes.len();
        self.create_nodes(else_body, &mut no_func);
        let last_else = self.nodes.len() - 1;

        if let NodeKind::Logical { goto_t, goto_f, .. } = &mut self.nodes[cond_id].kind {
            *goto_t = Some(body_start);
            *goto_f = Some(else_start);
        }

        // both arms join at the next slot
        let join = self.nodes.len();
        self.set_goto(last_if, join);
        self.set_goto(last_else, join);
    }

    fn create_while(&mut self, cond: &Expr, body: &[Stmt], func: &mut Option<FuncInfo>) {
        let mut builder = NodeBuilder::new(self.temp_count);
        builder.lower_cond(cond);
        let cond_id = self.push_node(CfgNode {
            id: 0,
            func: func.take(),
            kind: NodeKind::Logical {
                cond: cond.clone(),
                goto_t: None,
                goto_f: None,
            },
            tac: builder.tac,
            temp_start: builder.temp_start,
            temp_count: builder.temp_count,
        });

        let body_start = self.nodes.len();
        let mut no_func = None;
        self.create_nodes(body, &mut no_func);
        let last = self.nodes.len() - 1;

        let after_loop = self.nodes.len();
        if let NodeKind::Logical { goto_t, goto_f, .. } = &mut self.nodes[cond_id].kind {
            *goto_t = Some(body_start);
            *goto_f = Some(after_loop);
        }
        // loop back to the condition
        self.set_goto(last, cond_id);
    }

    fn create_function(&mut self, f: &Function) {
        let body = match &f.body {
            Some(body) => body,
            // prototypes contribute no blocks
            None => return,
        };

        self.temp_count = 0;
        let mut stmts = body.clone();
        if f.ret_type.is_void() && !matches!(stmts.last(), Some(Stmt::Return(_))) {
            stmts.push(Stmt::Return(None));
        }

        let mut func = Some(FuncInfo {
            name: f.name.clone(),
            params: f.params.clone(),
        });
        self.create_nodes(&stmts, &mut func);
    }

    /// Splice out empty blocks and renumber densely.
    fn clean_up(&mut self) {
        // predecessor lists: (parent id, which link)
        const GOTO: u8 = 0;
        const GOTO_T: u8 = 1;
        const GOTO_F: u8 = 2;

        let mut parents: Vec<Vec<(usize, u8)>> = vec![Vec::new(); self.nodes.len()];
        for node in &self.nodes {
            match &node.kind {
                NodeKind::Seq { goto_: Some(g), .. } => parents[*g].push((node.id, GOTO)),
                NodeKind::Logical { goto_t, goto_f, .. } => {
                    if let Some(t) = goto_t {
                        parents[*t].push((node.id, GOTO_T));
                    }
                    if let Some(f) = goto_f {
                        parents[*f].push((node.id, GOTO_F));
                    }
                }
                _ => {}
            }
        }

        // redirect each empty node's predecessors to its successor; empty
        // chains only ever point forward, so one pass suffices
        for idx in 0..self.nodes.len() {
            if !self.nodes[idx].is_empty() {
                continue;
            }
            let target = match &self.nodes[idx].kind {
                NodeKind::Seq { goto_, .. } => *goto_,
                _ => None,
            };
            let node_parents = std::mem::take(&mut parents[idx]);
            for (p, link) in &node_parents {
                self.redirect(*p, *link, target);
            }
            if let Some(t) = target {
                parents[t].extend(node_parents);
            }
        }

        // dense renumbering, original order preserved
        let mut map = vec![usize::MAX; self.nodes.len()];
        let mut next = 0;
        for (idx, node) in self.nodes.iter().enumerate() {
            if !node.is_empty() {
                map[idx] = next;
                next += 1;
            }
        }
        self.nodes.retain(|n| !n.is_empty());
        for node in &mut self.nodes {
            node.id = map[node.id];
            match &mut node.kind {
                NodeKind::Seq { goto_, .. } => {
                    if let Some(g) = goto_ {
                        *g = map[*g];
                    }
                }
                NodeKind::Logical { goto_t, goto_f, .. } => {
                    if let Some(t) = goto_t {
                        *t = map[*t];
                    }
                    if let Some(f) = goto_f {
                        *f = map[*f];
                    }
                }
                _ => {}
            }
        }
    }

    fn redirect(&mut self, parent: usize, link: u8, target: Option<usize>) {
        match (&mut self.nodes[parent].kind, link) {
            (NodeKind::Seq { goto_, .. }, 0) => *goto_ = target,
            (NodeKind::Logical { goto_t, .. }, 1) => *goto_t = target,
            (NodeKind::Logical { goto_f, .. }, 2) => *goto_f = target,
            _ => {}
        }
    }
}

impl std::fmt::Display for Cfg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = String::new();
        for node in &self.nodes {
            out.push('\n');
            node.render(&mut out);
        }
        write!(f, "{}", out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn build(source: &str) -> Cfg {
        let (stmts, _) = Parser::new(source)
            .expect("tokenize failed")
            .parse()
            .expect("parse failed");
        Cfg::build(&stmts)
    }

    fn seq_goto(node: &CfgNode) -> usize {
        match &node.kind {
            NodeKind::Seq { goto_: Some(g), .. } => *g,
            other => panic!("expected seq with goto, got {:?}", other),
        }
    }

    fn branch_targets(node: &CfgNode) -> (usize, usize) {
        match &node.kind {
            NodeKind::Logical {
                goto_t: Some(t),
                goto_f: Some(f),
                ..
            } => (*t, *f),
            other => panic!("expected logical node, got {:?}", other),
        }
    }

    #[test]
    fn test_straight_line_single_block() {
        let cfg = build("void main() { int a, b; a = 5; b = a; }");
        // sequential block, implicit return, end sentinel
        assert_eq!(cfg.nodes.len(), 3);
        assert_eq!(seq_goto(&cfg.nodes[0]), 1);
        assert!(matches!(cfg.nodes[1].kind, NodeKind::Return { .. }));
        assert!(matches!(cfg.nodes[2].kind, NodeKind::End));

        let dump = cfg.to_string();
        assert!(dump.contains("function main()\n<bb 0>\na = 5\nb = a\ngoto <bb 1>"));
    }

    #[test]
    fn test_block_ids_dense() {
        let cfg = build(
            "void main() { int a; a = 1; if (a < 2) a = 2; else a = 3; while (a < 9) a = a + 1; }",
        );
        for (i, node) in cfg.nodes.iter().enumerate() {
            assert_eq!(node.id, i);
        }
    }

    #[test]
    fn test_if_else_shape() {
        let cfg = build("void main() { int a; a = 1; if (a < 2) a = 2; else a = 3; }");
        // 0: a = 1; 1: cond; 2: then; 3: else; 4: return; 5: end
        assert_eq!(cfg.nodes.len(), 6);
        assert_eq!(seq_goto(&cfg.nodes[0]), 1);
        let (t, f) = branch_targets(&cfg.nodes[1]);
        assert_eq!((t, f), (2, 3));
        // both arms join at the return block
        assert_eq!(seq_goto(&cfg.nodes[2]), 4);
        assert_eq!(seq_goto(&cfg.nodes[3]), 4);
        assert!(matches!(cfg.nodes[4].kind, NodeKind::Return { .. }));

        let dump = cfg.to_string();
        assert!(dump.contains("t0 = a < 2\nif(t0) goto <bb 2>\nelse goto <bb 3>"));
    }

    #[test]
    fn test_while_back_edge() {
        let cfg = build("void main() { int i; i = 0; while (i < 10) i = i + 1; }");
        // 0: i = 0; 1: cond; 2: body; 3: return; 4: end
        assert_eq!(cfg.nodes.len(), 5);
        let (t, f) = branch_targets(&cfg.nodes[1]);
        assert_eq!(t, 2);
        assert_eq!(f, 3);
        // body jumps back to the condition block
        assert_eq!(seq_goto(&cfg.nodes[2]), 1);
    }

    #[test]
    fn test_no_empty_blocks_remain() {
        let cfg = build(
            "void main() { int a; a = 0; if (a < 1) { a = 1; } while (a < 5) { a = a + 1; } }",
        );
        for node in &cfg.nodes {
            assert!(
                !matches!(&node.kind, NodeKind::Seq { stmts, .. } if stmts.is_empty()),
                "empty block {} survived clean-up",
                node.id
            );
        }
    }

    #[test]
    fn test_temp_numbering_monotone_within_function() {
        let cfg = build(
            "void main() { int a, b, c; a = 1; b = a + a * a; if (a + b < a * c) c = a + b; }",
        );
        let mut expected = 0;
        for node in &cfg.nodes {
            assert_eq!(node.temp_start, expected);
            expected += node.temp_count;
        }
    }

    #[test]
    fn test_temps_restart_per_function() {
        let cfg = build(
            "int f(int *x) { return *x + *x; }\n\
             void main() { int a, b; a = 1; b = a + a; }",
        );
        let slices = cfg.function_slices();
        assert_eq!(slices.len(), 2);
        // each function's first temp-bearing block starts at t0
        for slice in &slices {
            let first_with_temps = slice.iter().find(|n| n.temp_count > 0);
            if let Some(node) = first_with_temps {
                assert_eq!(node.temp_start, 0);
            }
        }
        let dump = cfg.to_string();
        assert!(dump.contains("function f(int *x)"));
        assert!(dump.contains("return t0"));
    }

    #[test]
    fn test_not_condition_materializes_temp() {
        let cfg = build("void main() { int a; a = 1; if (!(a < 2)) a = 2; }");
        let dump = cfg.to_string();
        assert!(dump.contains("t0 = a < 2\nt1 = !t0\nif(t1) goto"));
    }

    #[test]
    fn test_call_statement_kept_in_block() {
        let cfg = build(
            "void ping(int *p) { *p = 1; }\n\
             void main() { int a; int *q; q = &a; ping(q); a = 2; }",
        );
        let dump = cfg.to_string();
        assert!(dump.contains("ping(q)\n"));
    }

    #[test]
    fn test_prototype_contributes_no_blocks() {
        let cfg = build("int add(int x, int y);\nvoid main() { int a; a = 1; }");
        assert_eq!(cfg.function_slices().len(), 1);
        assert!(!cfg.to_string().contains("function add"));
    }

    #[test]
    fn test_void_function_with_explicit_return_not_duplicated() {
        let cfg = build("void main() { int a; a = 1; return; }");
        let returns = cfg
            .nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Return { .. }))
            .count();
        assert_eq!(returns, 1);
    }

    #[test]
    fn test_nested_block_statements_are_lowered() {
        let cfg = build("void main() { int a; a = 1; { int b; b = 2; } a = 3; }");
        let dump = cfg.to_string();
        assert!(dump.contains("b = 2"));
        assert!(dump.contains("a = 3"));
    }

    #[test]
    fn test_dump_is_stable() {
        let src = "void main() { int i; i = 0; while (i < 10) i = i + 1; }";
        let first = build(src).to_string();
        let second = build(src).to_string();
        assert_eq!(first, second);
    }
}
