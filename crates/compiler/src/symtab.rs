//! Nested symbol tables for APL
//!
//! Scopes form a tree: global at the root, one child per function, and one
//! per nested block (`@block_N`). The tree is stored as an arena of
//! [`Scope`]s addressed by [`ScopeId`]; resolved variable references hold a
//! [`VarRef`] (scope id + entry index) instead of a shared pointer, which
//! keeps the AST free of cycles and cheap to clone.
//!
//! Entries are insertion-ordered. A function scope's first `num_params`
//! entries are its parameters in declaration order; the remainder are
//! locals and nested block tables.

use crate::error::CompileError;
use crate::types::Type;

pub type ScopeId = usize;

/// The root scope created by [`SymbolTable::new`].
pub const GLOBAL_SCOPE: ScopeId = 0;

/// A resolved reference to one entry in one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarRef {
    pub scope: ScopeId,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Function,
    Block,
}

/// One identifier entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Variable {
        dtype: Type,
        width: u32,
        /// Frame offset, filled by the code generator during prologue
        /// computation. `None` for globals.
        offset: Option<u32>,
    },
    Function {
        ret_type: Type,
        table: ScopeId,
        num_params: usize,
        /// False while only a prototype has been seen.
        defined: bool,
    },
    Block {
        table: ScopeId,
    },
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub name: String,
    pub kind: ScopeKind,
    pub entries: Vec<(String, Entry)>,
    /// Accumulated width of the scope's variables, set on scope close.
    pub width: u32,
    pub num_params: usize,
}

impl Scope {
    pub fn find(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(n, _)| n == name)
    }
}

/// The whole scope tree.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// Create a table holding only the global scope.
    pub fn new() -> Self {
        SymbolTable {
            scopes: vec![Scope {
                parent: None,
                name: "global".to_string(),
                kind: ScopeKind::Global,
                entries: Vec::new(),
                width: 0,
                num_params: 0,
            }],
        }
    }

    /// Create a child scope and return its id.
    pub fn mktable(&mut self, parent: ScopeId, name: &str, kind: ScopeKind) -> ScopeId {
        let id = self.scopes.len();
        self.scopes.push(Scope {
            parent: Some(parent),
            name: name.to_string(),
            kind,
            entries: Vec::new(),
            width: 0,
            num_params: 0,
        });
        id
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id]
    }

    pub fn entry(&self, var: VarRef) -> &Entry {
        &self.scopes[var.scope].entries[var.index].1
    }

    pub fn entry_mut(&mut self, var: VarRef) -> &mut Entry {
        &mut self.scopes[var.scope].entries[var.index].1
    }

    pub fn entry_name(&self, var: VarRef) -> &str {
        &self.scopes[var.scope].entries[var.index].0
    }

    /// Insert a variable entry. Redeclaration in the same scope is an
    /// error; shadowing an outer scope is fine.
    pub fn enter(
        &mut self,
        scope: ScopeId,
        name: &str,
        dtype: Type,
        width: u32,
    ) -> Result<usize, CompileError> {
        if self.scopes[scope].find(name).is_some() {
            return Err(CompileError::Redeclaration(format!(
                "variable '{}'",
                name
            )));
        }
        let index = self.scopes[scope].entries.len();
        self.scopes[scope].entries.push((
            name.to_string(),
            Entry::Variable {
                dtype,
                width,
                offset: None,
            },
        ));
        Ok(index)
    }

    /// Insert a fresh function entry. The prototype-reconciliation path
    /// reuses the existing entry instead of calling this again.
    pub fn enter_function(
        &mut self,
        scope: ScopeId,
        name: &str,
        table: ScopeId,
        ret_type: Type,
    ) -> Result<usize, CompileError> {
        if self.scopes[scope].find(name).is_some() {
            return Err(CompileError::Redeclaration(format!(
                "function '{}'",
                name
            )));
        }
        let index = self.scopes[scope].entries.len();
        self.scopes[scope].entries.push((
            name.to_string(),
            Entry::Function {
                ret_type,
                table,
                num_params: 0,
                defined: false,
            },
        ));
        Ok(index)
    }

    /// Insert an anonymous-block entry.
    pub fn enter_block(&mut self, scope: ScopeId, name: &str, table: ScopeId) {
        self.scopes[scope]
            .entries
            .push((name.to_string(), Entry::Block { table }));
    }

    /// Walk the parent chain looking for `name`.
    pub fn look_up(&self, from: ScopeId, name: &str) -> Option<VarRef> {
        let mut current = Some(from);
        while let Some(id) = current {
            if let Some(index) = self.scopes[id].find(name) {
                return Some(VarRef { scope: id, index });
            }
            current = self.scopes[id].parent;
        }
        None
    }

    /// Record the accumulated frame width of a scope on close.
    pub fn add_width(&mut self, scope: ScopeId, width: u32) {
        self.scopes[scope].width = width;
    }

    /// Drop a scope's entries (prototype parameters being replaced by the
    /// definition's named parameters).
    pub fn clear_entries(&mut self, scope: ScopeId) {
        self.scopes[scope].entries.clear();
        self.scopes[scope].num_params = 0;
    }

    /// The "Procedure table" section of the `.sym` dump. `main` is
    /// omitted, matching the reference output.
    pub fn procedure_table(&self) -> String {
        let mut out = String::new();
        out.push_str("Procedure table :-\n");
        out.push_str("-----------------------------------------------------------------\n");
        out.push_str("Name\t\t|\tReturn Type  |  Parameter List\n");

        for (name, entry) in &self.scopes[GLOBAL_SCOPE].entries {
            let (ret_type, table) = match entry {
                Entry::Function {
                    ret_type, table, ..
                } if name != "main" => (ret_type, *table),
                _ => continue,
            };
            let scope = &self.scopes[table];
            let params: Vec<String> = scope.entries[..scope.num_params]
                .iter()
                .map(|(pname, pentry)| match pentry {
                    Entry::Variable { dtype, .. } => format!(
                        "{} {}{}",
                        dtype.base,
                        "*".repeat(dtype.ptr_level),
                        pname
                    ),
                    _ => String::new(),
                })
                .collect();
            out.push_str(&format!(
                "{}\t\t|\t{}\t\t|\t{}\n",
                name,
                ret_type,
                params.join(", ")
            ));
        }

        out.push_str("-----------------------------------------------------------------\n");
        out
    }

    /// The "Variable table" section of the `.sym` dump: every variable
    /// entry anywhere in the tree, with its enclosing procedure.
    pub fn variable_table(&self) -> String {
        let mut out = String::new();
        out.push_str(
            "Variable table :- \n-----------------------------------------------------------------\n",
        );
        out.push_str("Name\t|\tScope\t\t|\tBase Type  |  Derived Type\n");
        out.push_str("-----------------------------------------------------------------\n");
        self.variable_rows(GLOBAL_SCOPE, None, &mut out);
        out.push_str(
            "-----------------------------------------------------------------\n-----------------------------------------------------------------\n",
        );
        out
    }

    fn variable_rows(&self, scope: ScopeId, proc_name: Option<&str>, out: &mut String) {
        for (name, entry) in &self.scopes[scope].entries {
            match entry {
                Entry::Function { table, .. } => {
                    self.variable_rows(*table, Some(name), out);
                }
                Entry::Block { table } => {
                    // nested blocks stay attributed to their procedure
                    self.variable_rows(*table, proc_name, out);
                }
                Entry::Variable { dtype, .. } => {
                    let scope_col = match proc_name {
                        Some(f) => format!("procedure {}\t|\t", f),
                        None => "global\t\t|\t".to_string(),
                    };
                    out.push_str(&format!(
                        "{}\t\t|\t{}{}\t   |\t{}\n",
                        name,
                        scope_col,
                        dtype.base,
                        "*".repeat(dtype.ptr_level)
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BaseType, Type};

    #[test]
    fn test_lookup_walks_parents() {
        let mut st = SymbolTable::new();
        st.enter(GLOBAL_SCOPE, "g", Type::int(), 4).unwrap();
        let func = st.mktable(GLOBAL_SCOPE, "f", ScopeKind::Function);
        let block = st.mktable(func, "@block_0", ScopeKind::Block);

        let found = st.look_up(block, "g").expect("g visible from block");
        assert_eq!(found.scope, GLOBAL_SCOPE);
        assert!(st.look_up(block, "nope").is_none());
    }

    #[test]
    fn test_shadowing_resolves_innermost() {
        let mut st = SymbolTable::new();
        st.enter(GLOBAL_SCOPE, "x", Type::int(), 4).unwrap();
        let func = st.mktable(GLOBAL_SCOPE, "f", ScopeKind::Function);
        st.enter(func, "x", Type::float(), 8).unwrap();

        let found = st.look_up(func, "x").unwrap();
        assert_eq!(found.scope, func);
        match st.entry(found) {
            Entry::Variable { dtype, .. } => assert_eq!(*dtype, Type::float()),
            other => panic!("unexpected entry {:?}", other),
        }
    }

    #[test]
    fn test_redeclaration_in_same_scope() {
        let mut st = SymbolTable::new();
        st.enter(GLOBAL_SCOPE, "a", Type::int(), 4).unwrap();
        let err = st.enter(GLOBAL_SCOPE, "a", Type::int(), 4).unwrap_err();
        assert!(matches!(err, CompileError::Redeclaration(_)));
    }

    #[test]
    fn test_function_entry_ordering() {
        let mut st = SymbolTable::new();
        let table = st.mktable(GLOBAL_SCOPE, "add", ScopeKind::Function);
        st.enter_function(GLOBAL_SCOPE, "add", table, Type::int())
            .unwrap();
        st.enter(table, "x", Type::int(), 4).unwrap();
        st.enter(table, "y", Type::int(), 4).unwrap();
        st.scope_mut(table).num_params = 2;
        st.enter(table, "local", Type::int(), 4).unwrap();

        let scope = st.scope(table);
        let names: Vec<&str> = scope.entries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["x", "y", "local"]);
        assert_eq!(scope.num_params, 2);
    }

    #[test]
    fn test_procedure_table_skips_main() {
        let mut st = SymbolTable::new();
        let add = st.mktable(GLOBAL_SCOPE, "add", ScopeKind::Function);
        st.enter_function(GLOBAL_SCOPE, "add", add, Type::int())
            .unwrap();
        st.enter(add, "x", Type::new(BaseType::Int, 1), 4).unwrap();
        st.scope_mut(add).num_params = 1;

        let main = st.mktable(GLOBAL_SCOPE, "main", ScopeKind::Function);
        st.enter_function(GLOBAL_SCOPE, "main", main, Type::void())
            .unwrap();

        let dump = st.procedure_table();
        assert!(dump.contains("add"));
        assert!(dump.contains("int *x"));
        assert!(!dump.contains("main"));
    }

    #[test]
    fn test_variable_table_scope_column() {
        let mut st = SymbolTable::new();
        st.enter(GLOBAL_SCOPE, "g", Type::int(), 4).unwrap();
        let f = st.mktable(GLOBAL_SCOPE, "f", ScopeKind::Function);
        st.enter_function(GLOBAL_SCOPE, "f", f, Type::void())
            .unwrap();
        st.enter(f, "a", Type::float(), 8).unwrap();
        let b = st.mktable(f, "@block_0", ScopeKind::Block);
        st.enter_block(f, "@block_0", b);
        st.enter(b, "inner", Type::int(), 4).unwrap();

        let dump = st.variable_table();
        assert!(dump.contains("g\t\t|\tglobal"));
        assert!(dump.contains("a\t\t|\tprocedure f"));
        assert!(dump.contains("inner\t\t|\tprocedure f"));
    }
}
