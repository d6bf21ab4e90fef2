//! Recursive-descent parser and semantic analysis for APL
//!
//! Each construct is checked as soon as it is reduced: identifier
//! resolution, operator typing, pointer-level rules, call arity and
//! argument types, return matching, and prototype reconciliation all
//! happen here, producing AST nodes with their `dtype` filled in. Scope
//! handling follows the classic scheme: an explicit stack of
//! `(scope, offset)` pairs, pushed when a function or block opens and
//! popped (recording the accumulated width) when it closes.
//!
//! Compilation is single-shot: the first error aborts the parse, there is
//! no recovery.

use crate::ast::{Decl, Expr, Function, Op, Param, Stmt};
use crate::error::CompileError;
use crate::lexer::{Token, TokenKind, tokenize};
use crate::symtab::{Entry, GLOBAL_SCOPE, ScopeId, ScopeKind, SymbolTable};
use crate::types::{BaseType, Type};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    symtab: SymbolTable,
    /// Scope-stack discipline: `(scope, running offset)`, global at the
    /// bottom. The offset counts declared widths inside the open scope.
    scope_stack: Vec<(ScopeId, u32)>,
    block_id: usize,
}

impl Parser {
    pub fn new(source: &str) -> Result<Self, CompileError> {
        let tokens = tokenize(source)?;
        Ok(Parser {
            tokens,
            pos: 0,
            symtab: SymbolTable::new(),
            scope_stack: vec![(GLOBAL_SCOPE, 0)],
            block_id: 0,
        })
    }

    /// Parse a whole translation unit, returning the top-level statement
    /// list (functions; global declarations only populate the table) and
    /// the finished scope tree.
    pub fn parse(mut self) -> Result<(Vec<Stmt>, SymbolTable), CompileError> {
        let mut program = Vec::new();
        while !self.is_at_end() {
            let stmt = self.parse_global_statement()?;
            if !matches!(stmt, Stmt::DeclList(_)) {
                program.push(stmt);
            }
        }
        Ok((program, self.symtab))
    }

    // ---- token helpers ----

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn peek_kind_at(&self, offset: usize) -> Option<TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| t.kind)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn consume(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, CompileError> {
        match self.peek() {
            Some(tok) if tok.kind == kind => {
                let tok = tok.clone();
                self.pos += 1;
                Ok(tok)
            }
            Some(tok) => Err(CompileError::Syntax(format!(
                "expected {} but found '{}' at line {}",
                what,
                tok.text,
                tok.line + 1
            ))),
            None => Err(CompileError::Syntax(format!(
                "expected {} but found end of file",
                what
            ))),
        }
    }

    /// 1-based line of the current token, for diagnostics.
    fn line(&self) -> usize {
        self.peek()
            .or_else(|| self.tokens.last())
            .map(|t| t.line + 1)
            .unwrap_or(1)
    }

    // ---- scope helpers ----

    fn current_scope(&self) -> ScopeId {
        self.scope_stack.last().map(|(s, _)| *s).unwrap_or(GLOBAL_SCOPE)
    }

    fn bump_offset(&mut self, width: u32) {
        if let Some((_, offset)) = self.scope_stack.last_mut() {
            *offset += width;
        }
    }

    fn pop_scope(&mut self) {
        if let Some((scope, offset)) = self.scope_stack.pop() {
            self.symtab.add_width(scope, offset);
        }
    }

    // ---- global level ----

    fn parse_global_statement(&mut self) -> Result<Stmt, CompileError> {
        match self.peek_kind() {
            Some(TokenKind::Void) => {
                self.advance();
                if self.check(TokenKind::Main) {
                    self.advance();
                    self.parse_main_def()
                } else {
                    let name = self.expect(TokenKind::Ident, "function name")?;
                    self.parse_function(Type::void(), name)
                }
            }
            Some(TokenKind::Int) | Some(TokenKind::Float) => {
                let base = self.parse_base_type()?;
                let ptr_level = self.parse_stars();
                let name = self.expect(TokenKind::Ident, "identifier")?;
                if self.check(TokenKind::LParen) {
                    self.parse_function(Type::new(base, ptr_level), name)
                } else {
                    self.parse_declaration_tail(base, ptr_level, name)
                }
            }
            Some(_) => {
                let line = self.line();
                let text = self.peek().map(|t| t.text.clone()).unwrap_or_default();
                Err(CompileError::Syntax(format!(
                    "unexpected '{}' at line {}",
                    text, line
                )))
            }
            None => Err(CompileError::Syntax(
                "unexpected end of file".to_string(),
            )),
        }
    }

    fn parse_base_type(&mut self) -> Result<BaseType, CompileError> {
        match self.peek_kind() {
            Some(TokenKind::Int) => {
                self.advance();
                Ok(BaseType::Int)
            }
            Some(TokenKind::Float) => {
                self.advance();
                Ok(BaseType::Float)
            }
            _ => Err(CompileError::Syntax(format!(
                "expected type name at line {}",
                self.line()
            ))),
        }
    }

    fn parse_stars(&mut self) -> usize {
        let mut level = 0;
        while self.consume(TokenKind::Star) {
            level += 1;
        }
        level
    }

    /// Rest of a declaration after `type stars ident` has been read.
    fn parse_declaration_tail(
        &mut self,
        base: BaseType,
        first_ptr: usize,
        first_name: Token,
    ) -> Result<Stmt, CompileError> {
        let mut decls = Vec::new();
        let mut pending = Some((first_ptr, first_name));
        loop {
            let (ptr_level, name) = match pending.take() {
                Some(p) => p,
                None => {
                    let ptr_level = self.parse_stars();
                    let name = self.expect(TokenKind::Ident, "identifier")?;
                    (ptr_level, name)
                }
            };
            let dtype = Type::new(base, ptr_level);
            let width = dtype.width();
            let scope = self.current_scope();
            self.symtab
                .enter(scope, &name.text, dtype, width)
                .map_err(|e| match e {
                    CompileError::Redeclaration(msg) => CompileError::Redeclaration(format!(
                        "{} at line {}",
                        msg,
                        name.line + 1
                    )),
                    other => other,
                })?;
            self.bump_offset(width);
            decls.push(Decl {
                name: name.text,
                base,
                ptr_level,
            });

            if !self.consume(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(Stmt::DeclList(decls))
    }

    // ---- functions ----

    fn parse_main_def(&mut self) -> Result<Stmt, CompileError> {
        self.expect(TokenKind::LParen, "'('")?;
        let table = self.open_function_scope("main", Type::void())?;
        self.expect(TokenKind::RParen, "')'")?;
        self.symtab.scope_mut(table).num_params = 0;

        self.check_not_redefined("main")?;
        self.expect(TokenKind::LBrace, "'{'")?;
        let body = self.parse_statement_list()?;
        self.expect(TokenKind::RBrace, "'}'")?;
        self.pop_scope();
        self.mark_function_defined("main");

        Ok(Stmt::Function(Function {
            ret_type: Type::void(),
            name: "main".to_string(),
            params: Vec::new(),
            body: Some(body),
        }))
    }

    fn parse_function(&mut self, ret_type: Type, name: Token) -> Result<Stmt, CompileError> {
        self.expect(TokenKind::LParen, "'('")?;
        let (table, had_prototype) = self.open_or_reuse_function_scope(&name, ret_type)?;
        let params = self.parse_formal_params()?;
        self.finish_params(table, &params, had_prototype, &name.text)?;
        self.expect(TokenKind::RParen, "')'")?;

        if self.consume(TokenKind::Semicolon) {
            // prototype
            self.pop_scope();
            return Ok(Stmt::Function(Function {
                ret_type,
                name: name.text,
                params,
                body: None,
            }));
        }

        self.check_not_redefined(&name.text)?;
        self.expect(TokenKind::LBrace, "'{'")?;
        let body = self.parse_statement_list()?;
        self.expect(TokenKind::RBrace, "'}'")?;
        self.pop_scope();
        self.mark_function_defined(&name.text);

        Ok(Stmt::Function(Function {
            ret_type,
            name: name.text,
            params,
            body: Some(body),
        }))
    }

    fn open_function_scope(
        &mut self,
        name: &str,
        ret_type: Type,
    ) -> Result<ScopeId, CompileError> {
        let table = self.symtab.mktable(GLOBAL_SCOPE, name, ScopeKind::Function);
        self.symtab
            .enter_function(GLOBAL_SCOPE, name, table, ret_type)?;
        self.scope_stack.push((table, 0));
        Ok(table)
    }

    /// The scope-opening action for a function header. When a prototype
    /// exists, its subtable is adopted and the return type must match.
    fn open_or_reuse_function_scope(
        &mut self,
        name: &Token,
        ret_type: Type,
    ) -> Result<(ScopeId, bool), CompileError> {
        if let Some(index) = self.symtab.scope(GLOBAL_SCOPE).find(&name.text) {
            let entry = self.symtab.scope(GLOBAL_SCOPE).entries[index].1.clone();
            match entry {
                Entry::Function {
                    ret_type: existing,
                    table,
                    defined,
                    ..
                } => {
                    if defined {
                        return Err(CompileError::Redeclaration(format!(
                            "redefinition of function '{}' at line {}",
                            name.text,
                            name.line + 1
                        )));
                    }
                    if existing != ret_type {
                        return Err(CompileError::ProtoMismatch(format!(
                            "function '{}' return type {} does not match prototype {}",
                            name.text, ret_type, existing
                        )));
                    }
                    self.scope_stack.push((table, 0));
                    Ok((table, true))
                }
                _ => Err(CompileError::Redeclaration(format!(
                    "'{}' already declared at line {}",
                    name.text,
                    name.line + 1
                ))),
            }
        } else {
            let table = self.open_function_scope(&name.text, ret_type)?;
            Ok((table, false))
        }
    }

    fn parse_formal_params(&mut self) -> Result<Vec<Param>, CompileError> {
        let mut params = Vec::new();
        if self.check(TokenKind::RParen) {
            return Ok(params);
        }
        loop {
            let base = self.parse_base_type()?;
            let ptr_level = self.parse_stars();
            let name = self.expect(TokenKind::Ident, "parameter name")?;
            params.push(Param {
                name: name.text,
                dtype: Type::new(base, ptr_level),
            });
            if !self.consume(TokenKind::Comma) {
                break;
            }
        }
        Ok(params)
    }

    /// Populate the function scope with parameters, reconciling against a
    /// prototype when one exists: count and positional types must match,
    /// then the prototype's slots are replaced by the definition's names.
    fn finish_params(
        &mut self,
        table: ScopeId,
        params: &[Param],
        had_prototype: bool,
        func_name: &str,
    ) -> Result<(), CompileError> {
        if had_prototype {
            let proto_count = self.symtab.scope(table).num_params;
            if proto_count != params.len() {
                return Err(CompileError::ProtoMismatch(format!(
                    "function '{}' expected {} parameters per prototype, got {}",
                    func_name,
                    proto_count,
                    params.len()
                )));
            }
            for (i, param) in params.iter().enumerate() {
                let proto_type = match &self.symtab.scope(table).entries[i].1 {
                    Entry::Variable { dtype, .. } => *dtype,
                    _ => continue,
                };
                if proto_type != param.dtype {
                    return Err(CompileError::ProtoMismatch(format!(
                        "function '{}' parameter #{} type mismatch with prototype",
                        func_name,
                        i + 1
                    )));
                }
            }
            self.symtab.clear_entries(table);
        }

        for param in params {
            let width = param.dtype.width();
            self.symtab.enter(table, &param.name, param.dtype, width)?;
            self.bump_offset(width);
        }
        self.symtab.scope_mut(table).num_params = params.len();
        Ok(())
    }

    fn check_not_redefined(&self, name: &str) -> Result<(), CompileError> {
        if let Some(var) = self.symtab.look_up(GLOBAL_SCOPE, name) {
            if let Entry::Function { defined: true, .. } = self.symtab.entry(var) {
                return Err(CompileError::Redeclaration(format!(
                    "redefinition of function '{}'",
                    name
                )));
            }
        }
        Ok(())
    }

    fn mark_function_defined(&mut self, name: &str) {
        if let Some(var) = self.symtab.look_up(GLOBAL_SCOPE, name) {
            if let Entry::Function { defined, .. } = self.symtab.entry_mut(var) {
                *defined = true;
            }
        }
    }

    // ---- statements ----

    fn parse_statement_list(&mut self) -> Result<Vec<Stmt>, CompileError> {
        let mut stmts = Vec::new();
        while !self.check(TokenKind::RBrace) {
            if self.is_at_end() {
                return Err(CompileError::Syntax(
                    "unexpected end of file inside block".to_string(),
                ));
            }
            let stmt = self.parse_statement()?;
            // declarations only populate the symbol table
            if !matches!(stmt, Stmt::DeclList(_)) {
                stmts.push(stmt);
            }
        }
        Ok(stmts)
    }

    fn parse_statement(&mut self) -> Result<Stmt, CompileError> {
        match self.peek_kind() {
            Some(TokenKind::Int) | Some(TokenKind::Float) => {
                let base = self.parse_base_type()?;
                let ptr_level = self.parse_stars();
                let name = self.expect(TokenKind::Ident, "identifier")?;
                self.parse_declaration_tail(base, ptr_level, name)
            }
            Some(TokenKind::If) => self.parse_if(),
            Some(TokenKind::While) => self.parse_while(),
            Some(TokenKind::Return) => self.parse_return(),
            Some(TokenKind::LBrace) => self.parse_block(),
            Some(TokenKind::Ident) if self.peek_kind_at(1) == Some(TokenKind::LParen) => {
                let name = self.expect(TokenKind::Ident, "identifier")?;
                let call = self.parse_call(name)?;
                self.expect(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::Call(call))
            }
            Some(TokenKind::Ident) | Some(TokenKind::Star) => self.parse_assignment(),
            Some(_) => {
                let text = self.peek().map(|t| t.text.clone()).unwrap_or_default();
                Err(CompileError::Syntax(format!(
                    "unexpected '{}' at line {}",
                    text,
                    self.line()
                )))
            }
            None => Err(CompileError::Syntax(
                "unexpected end of file inside block".to_string(),
            )),
        }
    }

    fn parse_block(&mut self) -> Result<Stmt, CompileError> {
        let parent = self.current_scope();
        let block_name = format!("@block_{}", self.block_id);
        self.block_id += 1;
        let table = self.symtab.mktable(parent, &block_name, ScopeKind::Block);
        self.symtab.enter_block(parent, &block_name, table);
        self.scope_stack.push((table, 0));

        self.expect(TokenKind::LBrace, "'{'")?;
        let body = self.parse_statement_list()?;
        self.expect(TokenKind::RBrace, "'}'")?;
        self.pop_scope();
        Ok(Stmt::Block(body))
    }

    /// An `if`/`while` arm: either a braced block (flattened into its
    /// statement list; the block scope still exists in the table) or a
    /// single statement.
    fn parse_branch_body(&mut self) -> Result<Vec<Stmt>, CompileError> {
        if self.check(TokenKind::LBrace) {
            match self.parse_block()? {
                Stmt::Block(stmts) => Ok(stmts),
                _ => Ok(Vec::new()),
            }
        } else {
            let stmt = self.parse_statement()?;
            if matches!(stmt, Stmt::DeclList(_)) {
                Ok(Vec::new())
            } else {
                Ok(vec![stmt])
            }
        }
    }

    fn parse_if(&mut self) -> Result<Stmt, CompileError> {
        self.expect(TokenKind::If, "'if'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let cond = self.parse_logical()?;
        self.check_direct_access(&cond)?;
        self.expect(TokenKind::RParen, "')'")?;
        let body = self.parse_branch_body()?;
        // dangling else binds to the nearest if
        let else_body = if self.consume(TokenKind::Else) {
            self.parse_branch_body()?
        } else {
            Vec::new()
        };
        Ok(Stmt::If {
            cond,
            body,
            else_body,
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, CompileError> {
        self.expect(TokenKind::While, "'while'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let cond = self.parse_logical()?;
        self.check_direct_access(&cond)?;
        self.expect(TokenKind::RParen, "')'")?;
        let body = self.parse_branch_body()?;
        Ok(Stmt::While { cond, body })
    }

    fn parse_return(&mut self) -> Result<Stmt, CompileError> {
        let line = self.line();
        self.expect(TokenKind::Return, "'return'")?;

        // the enclosing function scope sits just above global on the stack
        let func_scope = match self.scope_stack.get(1) {
            Some((scope, _)) => *scope,
            None => {
                return Err(CompileError::Syntax(format!(
                    "'return' outside of a function at line {}",
                    line
                )));
            }
        };
        let func_name = self.symtab.scope(func_scope).name.clone();
        let ret_type = match self
            .symtab
            .look_up(GLOBAL_SCOPE, &func_name)
            .map(|var| self.symtab.entry(var).clone())
        {
            Some(Entry::Function { ret_type, .. }) => ret_type,
            _ => Type::void(),
        };

        if self.consume(TokenKind::Semicolon) {
            if !ret_type.is_void() {
                return Err(CompileError::BadReturn(format!(
                    "expected {}, got void at line {}",
                    ret_type, line
                )));
            }
            return Ok(Stmt::Return(None));
        }

        let expr = self.parse_expression()?;
        self.check_direct_access(&expr)?;
        if expr.dtype() != ret_type {
            return Err(CompileError::BadReturn(format!(
                "expected {}, got {} at line {}",
                ret_type,
                expr.dtype(),
                line
            )));
        }
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(Stmt::Return(Some(expr)))
    }

    fn parse_assignment(&mut self) -> Result<Stmt, CompileError> {
        let line = self.line();
        let lhs = self.parse_lhs()?;
        self.expect(TokenKind::Assign, "'='")?;
        let rhs = self.parse_expression()?;
        self.expect(TokenKind::Semicolon, "';'")?;

        if lhs.dtype() != rhs.dtype() {
            return Err(CompileError::TypeMismatch(format!(
                "invalid usage of operator '=' at line {}: LHS is {}, RHS is {}",
                line,
                lhs.dtype(),
                rhs.dtype()
            )));
        }
        Ok(Stmt::Assign { lhs, rhs })
    }

    /// `lhs := ID | '*' lhs`
    fn parse_lhs(&mut self) -> Result<Expr, CompileError> {
        if self.consume(TokenKind::Star) {
            let line = self.line();
            let inner = self.parse_lhs()?;
            let dtype = inner.dtype();
            if !dtype.is_pointer() {
                return Err(CompileError::BadPointerUse(format!(
                    "cannot dereference value of type {} at line {}",
                    dtype, line
                )));
            }
            return Ok(Expr::Unary {
                op: Op::Deref,
                child: Box::new(inner),
                dtype: dtype.deref(),
            });
        }
        let name = self.expect(TokenKind::Ident, "identifier")?;
        self.resolve_var(&name)
    }

    // ---- expressions ----

    fn resolve_var(&mut self, name: &Token) -> Result<Expr, CompileError> {
        let var = self
            .symtab
            .look_up(self.current_scope(), &name.text)
            .ok_or_else(|| {
                CompileError::Undefined(format!(
                    "identifier '{}' at line {}",
                    name.text,
                    name.line + 1
                ))
            })?;
        match self.symtab.entry(var) {
            Entry::Variable { dtype, .. } => Ok(Expr::Var {
                name: name.text.clone(),
                var: Some(var),
                dtype: *dtype,
            }),
            _ => Err(CompileError::TypeMismatch(format!(
                "invalid usage of function '{}' at line {}",
                name.text,
                name.line + 1
            ))),
        }
    }

    /// The dialect's "direct access of non-pointer" rule: a plain variable
    /// of pointer level 0 may not flow into an argument, return value, or
    /// condition position.
    fn check_direct_access(&self, expr: &Expr) -> Result<(), CompileError> {
        if let Expr::Var { name, dtype, .. } = expr {
            if !dtype.is_pointer() {
                return Err(CompileError::BadPointerUse(format!(
                    "direct access of non-pointer '{}'",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Condition entry point: `||` below `&&` below `!` below comparisons.
    fn parse_logical(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_logical_and()?;
        while self.check(TokenKind::OrOr) {
            let line = self.line();
            self.advance();
            let right = self.parse_logical_and()?;
            self.check_logical_operands(Op::Or, &left, &right, line)?;
            left = Expr::Binary {
                op: Op::Or,
                left: Box::new(left),
                right: Box::new(right),
                dtype: Type::bool(),
            };
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_logical_not()?;
        while self.check(TokenKind::AndAnd) {
            let line = self.line();
            self.advance();
            let right = self.parse_logical_not()?;
            self.check_logical_operands(Op::And, &left, &right, line)?;
            left = Expr::Binary {
                op: Op::And,
                left: Box::new(left),
                right: Box::new(right),
                dtype: Type::bool(),
            };
        }
        Ok(left)
    }

    fn parse_logical_not(&mut self) -> Result<Expr, CompileError> {
        if self.consume(TokenKind::Not) {
            let line = self.line();
            let child = self.parse_logical_not()?;
            if !child.dtype().is_bool() {
                return Err(CompileError::TypeMismatch(format!(
                    "invalid usage of operator '!' at line {}: operand is {}",
                    line,
                    child.dtype()
                )));
            }
            return Ok(Expr::Unary {
                op: Op::Not,
                child: Box::new(child),
                dtype: Type::bool(),
            });
        }
        self.parse_relational()
    }

    /// Either `expr relop expr` or a parenthesized logical expression.
    /// A leading `(` is ambiguous between the two, so a comparison parse
    /// is attempted first and a purely syntactic failure backtracks to the
    /// parenthesized-logical form. Semantic errors are never swallowed.
    fn parse_relational(&mut self) -> Result<Expr, CompileError> {
        if self.check(TokenKind::LParen) {
            let save = self.pos;
            match self.parse_comparison() {
                Ok(expr) => Ok(expr),
                Err(CompileError::Syntax(_)) => {
                    self.pos = save;
                    self.expect(TokenKind::LParen, "'('")?;
                    let expr = self.parse_logical()?;
                    self.expect(TokenKind::RParen, "')'")?;
                    Ok(expr)
                }
                Err(other) => Err(other),
            }
        } else {
            self.parse_comparison()
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, CompileError> {
        let left = self.parse_expression()?;
        let op = match self.peek_kind() {
            Some(TokenKind::Lt) => Op::Lt,
            Some(TokenKind::Le) => Op::Le,
            Some(TokenKind::Gt) => Op::Gt,
            Some(TokenKind::Ge) => Op::Ge,
            Some(TokenKind::EqEq) => Op::Eq,
            Some(TokenKind::Ne) => Op::Ne,
            _ => {
                return Err(CompileError::Syntax(format!(
                    "expected comparison operator at line {}",
                    self.line()
                )));
            }
        };
        let line = self.line();
        self.advance();
        let right = self.parse_expression()?;
        self.check_operand_pair(op, &left, &right, line)?;
        Ok(Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            dtype: Type::bool(),
        })
    }

    fn check_logical_operands(
        &self,
        op: Op,
        left: &Expr,
        right: &Expr,
        line: usize,
    ) -> Result<(), CompileError> {
        if !left.dtype().is_bool() || !right.dtype().is_bool() {
            return Err(CompileError::TypeMismatch(format!(
                "invalid usage of operator '{}' at line {}: LHS is {}, RHS is {}",
                op.symbol(),
                line,
                left.dtype(),
                right.dtype()
            )));
        }
        Ok(())
    }

    /// Shared operand rule for arithmetic and comparison operators: equal
    /// types, non-pointer, non-void, int or float base.
    fn check_operand_pair(
        &self,
        op: Op,
        left: &Expr,
        right: &Expr,
        line: usize,
    ) -> Result<(), CompileError> {
        let lt = left.dtype();
        let rt = right.dtype();
        let bad = lt != rt
            || lt.is_pointer()
            || matches!(lt.base, BaseType::Void | BaseType::Bool);
        if bad {
            return Err(CompileError::TypeMismatch(format!(
                "invalid usage of operator '{}' at line {}: LHS is {}, RHS is {}",
                op.symbol(),
                line,
                lt,
                rt
            )));
        }
        Ok(())
    }

    fn parse_expression(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => Op::Plus,
                Some(TokenKind::Minus) => Op::Minus,
                _ => break,
            };
            let line = self.line();
            self.advance();
            let right = self.parse_term()?;
            self.check_operand_pair(op, &left, &right, line)?;
            let dtype = left.dtype();
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                dtype,
            };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => Op::Mul,
                Some(TokenKind::Slash) => Op::Div,
                _ => break,
            };
            let line = self.line();
            self.advance();
            let right = self.parse_unary()?;
            self.check_operand_pair(op, &left, &right, line)?;
            let dtype = left.dtype();
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                dtype,
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        match self.peek_kind() {
            Some(TokenKind::Minus) => {
                let line = self.line();
                self.advance();
                let child = self.parse_unary()?;
                let dtype = child.dtype();
                if dtype.is_pointer() || matches!(dtype.base, BaseType::Void | BaseType::Bool) {
                    return Err(CompileError::TypeMismatch(format!(
                        "invalid usage of unary minus at line {}: operand is {}",
                        line, dtype
                    )));
                }
                Ok(Expr::Unary {
                    op: Op::Uminus,
                    child: Box::new(child),
                    dtype,
                })
            }
            Some(TokenKind::Star) => {
                let line = self.line();
                self.advance();
                let child = self.parse_unary()?;
                let dtype = child.dtype();
                if !dtype.is_pointer() {
                    return Err(CompileError::BadPointerUse(format!(
                        "cannot dereference value of type {} at line {}",
                        dtype, line
                    )));
                }
                Ok(Expr::Unary {
                    op: Op::Deref,
                    child: Box::new(child),
                    dtype: dtype.deref(),
                })
            }
            Some(TokenKind::Amp) => {
                self.advance();
                let name = self.expect(TokenKind::Ident, "identifier after '&'")?;
                let var = self.resolve_var(&name).map_err(|e| match e {
                    CompileError::TypeMismatch(_) => CompileError::BadPointerUse(format!(
                        "cannot take the address of function '{}' at line {}",
                        name.text,
                        name.line + 1
                    )),
                    other => other,
                })?;
                let dtype = var.dtype().address_of();
                Ok(Expr::Unary {
                    op: Op::Addr,
                    child: Box::new(var),
                    dtype,
                })
            }
            Some(TokenKind::LParen) => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            Some(TokenKind::Integer) => {
                let tok = self.expect(TokenKind::Integer, "integer literal")?;
                Ok(Expr::Const {
                    text: tok.text,
                    dtype: Type::int(),
                })
            }
            Some(TokenKind::Real) => {
                let tok = self.expect(TokenKind::Real, "real literal")?;
                Ok(Expr::Const {
                    text: tok.text,
                    dtype: Type::float(),
                })
            }
            Some(TokenKind::Ident) => {
                let name = self.expect(TokenKind::Ident, "identifier")?;
                if self.check(TokenKind::LParen) {
                    self.parse_call(name)
                } else {
                    self.resolve_var(&name)
                }
            }
            _ => {
                let text = self.peek().map(|t| t.text.clone()).unwrap_or_default();
                Err(CompileError::Syntax(format!(
                    "unexpected '{}' in expression at line {}",
                    text,
                    self.line()
                )))
            }
        }
    }

    fn parse_call(&mut self, name: Token) -> Result<Expr, CompileError> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                let arg = self.parse_expression()?;
                self.check_direct_access(&arg)?;
                args.push(arg);
                if !self.consume(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;

        let var = self
            .symtab
            .look_up(self.current_scope(), &name.text)
            .ok_or_else(|| {
                CompileError::Undefined(format!(
                    "identifier '{}' at line {}",
                    name.text,
                    name.line + 1
                ))
            })?;
        let (ret_type, table, num_params) = match self.symtab.entry(var) {
            Entry::Function {
                ret_type,
                table,
                num_params,
                ..
            } => (*ret_type, *table, *num_params),
            _ => {
                return Err(CompileError::Undefined(format!(
                    "function '{}' at line {}",
                    name.text,
                    name.line + 1
                )));
            }
        };

        if num_params != args.len() {
            return Err(CompileError::Arity(format!(
                "function '{}' expected {} parameters, got {} at line {}",
                name.text,
                num_params,
                args.len(),
                name.line + 1
            )));
        }
        for (i, arg) in args.iter().enumerate() {
            let param_type = match &self.symtab.scope(table).entries[i].1 {
                Entry::Variable { dtype, .. } => *dtype,
                _ => continue,
            };
            if param_type != arg.dtype() {
                return Err(CompileError::TypeMismatch(format!(
                    "function '{}' expected {} as parameter #{}, got {}",
                    name.text,
                    param_type,
                    i + 1,
                    arg.dtype()
                )));
            }
        }

        Ok(Expr::Call {
            name: name.text,
            args,
            dtype: ret_type,
        })
    }
}
