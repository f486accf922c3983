//! Interned symbols and lexically scoped lookup.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

/// Source of unique per-program ids, so symbols from different programs
/// can never alias even across concurrent compilations.
static NEXT_PROGRAM_ID: AtomicU32 = AtomicU32::new(1);

/// An interned identifier, valid only within the program that created it.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct Symbol {
    program: u32,
    index: u32,
}

impl Symbol {
    /// The dense index of this symbol within its program.
    pub fn index(self) -> usize {
        self.index as usize
    }
}

/// Per-program symbol table with a stack of lexical scopes.
///
/// Lookup walks enclosing scopes outward; shadowing resolves to the
/// innermost declaration. Using a symbol from a different program is a
/// compiler bug and panics.
#[derive(Debug)]
pub struct SymbolTable {
    program: u32,
    names: Vec<String>,
    scopes: Vec<HashMap<String, Symbol>>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// Creates a table with the module scope open.
    pub fn new() -> Self {
        Self {
            program: NEXT_PROGRAM_ID.fetch_add(1, Ordering::Relaxed),
            names: Vec::new(),
            scopes: vec![HashMap::new()],
        }
    }

    /// The id of the owning program.
    pub fn program_id(&self) -> u32 {
        self.program
    }

    /// Opens a nested scope (function body, block).
    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Closes the innermost scope. The module scope stays open.
    pub fn pop_scope(&mut self) {
        assert!(self.scopes.len() > 1, "cannot pop the module scope");
        self.scopes.pop();
    }

    /// Declares `name` in the innermost scope. Shadowing an outer scope
    /// is permitted; redeclaring within the same scope returns the
    /// existing symbol as an error.
    pub fn declare(&mut self, name: &str) -> Result<Symbol, Symbol> {
        let scope = self.scopes.last_mut().expect("scope stack is never empty");
        if let Some(&existing) = scope.get(name) {
            return Err(existing);
        }
        let symbol = Symbol {
            program: self.program,
            index: u32::try_from(self.names.len())
                .unwrap_or_else(|_| panic!("symbol table overflow: {}", self.names.len())),
        };
        self.names.push(name.to_string());
        scope.insert(name.to_string(), symbol);
        Ok(symbol)
    }

    /// Resolves `name`, walking enclosing scopes outward.
    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    /// The interned name of `symbol`.
    ///
    /// # Panics
    ///
    /// Panics if `symbol` was created by a different program; that is an
    /// invariant violation, never user error.
    pub fn name(&self, symbol: Symbol) -> &str {
        assert_eq!(
            symbol.program, self.program,
            "symbol used across programs (owner {}, this {})",
            symbol.program, self.program
        );
        &self.names[symbol.index()]
    }

    /// The number of interned symbols.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` if no symbols have been declared.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declare_and_lookup() {
        let mut table = SymbolTable::new();
        let a = table.declare("a").unwrap();
        assert_eq!(table.lookup("a"), Some(a));
        assert_eq!(table.lookup("b"), None);
        assert_eq!(table.name(a), "a");
    }

    #[test]
    fn shadowing_resolves_innermost() {
        let mut table = SymbolTable::new();
        let outer = table.declare("x").unwrap();
        table.push_scope();
        let inner = table.declare("x").unwrap();
        assert_ne!(outer, inner);
        assert_eq!(table.lookup("x"), Some(inner));
        table.pop_scope();
        assert_eq!(table.lookup("x"), Some(outer));
    }

    #[test]
    fn redeclaration_in_same_scope_is_rejected() {
        let mut table = SymbolTable::new();
        let first = table.declare("x").unwrap();
        assert_eq!(table.declare("x"), Err(first));
    }

    #[test]
    fn symbols_from_different_programs_never_alias() {
        let mut a = SymbolTable::new();
        let mut b = SymbolTable::new();
        let sa = a.declare("same").unwrap();
        let sb = b.declare("same").unwrap();
        assert_ne!(sa, sb);
    }

    #[test]
    #[should_panic(expected = "symbol used across programs")]
    fn cross_program_use_panics() {
        let mut a = SymbolTable::new();
        let b = SymbolTable::new();
        let sa = a.declare("x").unwrap();
        let _ = b.name(sa);
    }
}
