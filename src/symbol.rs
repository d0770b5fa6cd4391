//! Symbol tables and lexical scopes.
//!
//! A stack of per-block name maps rather than one flat map, so a block scope
//! can be discarded (and its destructors scheduled, see
//! [`crate::codegen::destructors`]) without mutating its parent.

use crate::backend::builder::Value;
use crate::ident::Identifier;
use crate::types::Type;
use std::collections::HashMap;

/// Compile-time binding for a source-level variable: the back-end
/// allocation handle, its language-level type, mutability, and signedness
/// tag.
#[derive(Debug, Clone)]
pub struct Variable {
    pub alloca: Value,
    pub ty: Type,
    pub mutable: bool,
}

impl Variable {
    pub fn new(alloca: Value, ty: Type, mutable: bool) -> Self {
        Variable {
            alloca,
            ty,
            mutable,
        }
    }
}

/// A single lexical scope's bindings.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    bindings: HashMap<Identifier, Variable>,
    /// Declaration order, so destructor scheduling can run in reverse
    /// declaration order.
    order: Vec<Identifier>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// Insert a fresh binding. Returns `false` if a binding with the same
    /// name already exists *in this table* (shadowing across scopes is
    /// fine; redeclaration within one scope is not).
    pub fn insert(&mut self, name: Identifier, var: Variable) -> bool {
        if self.bindings.contains_key(&name) {
            return false;
        }
        self.order.push(name.clone());
        self.bindings.insert(name, var);
        true
    }

    /// Insert, shadowing any existing binding of the same name in this
    /// table.
    pub fn insert_or_overwrite(&mut self, name: Identifier, var: Variable) {
        if !self.bindings.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.bindings.insert(name, var);
    }

    pub fn get(&self, name: &Identifier) -> Option<&Variable> {
        self.bindings.get(name)
    }

    /// Bindings in reverse declaration order, the iteration order
    /// [`crate::codegen::destructors`] needs.
    pub fn in_reverse_declaration_order(&self) -> impl Iterator<Item = (&Identifier, &Variable)> {
        self.order
            .iter()
            .rev()
            .map(move |name| (name, self.bindings.get(name).expect("order is consistent")))
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// A stack of lexical scopes. Lookup walks innermost-to-outermost — the
/// effect of `merge(parent, local)` without materializing a
/// new merged table on every block entry.
#[derive(Debug, Clone, Default)]
pub struct ScopeStack {
    scopes: Vec<SymbolTable>,
}

impl ScopeStack {
    pub fn new() -> Self {
        ScopeStack { scopes: Vec::new() }
    }

    pub fn push(&mut self) {
        self.scopes.push(SymbolTable::new());
    }

    pub fn pop(&mut self) -> SymbolTable {
        self.scopes.pop().expect("pop on empty ScopeStack")
    }

    pub fn current_mut(&mut self) -> &mut SymbolTable {
        self.scopes.last_mut().expect("no current scope")
    }

    pub fn current(&self) -> &SymbolTable {
        self.scopes.last().expect("no current scope")
    }

    /// `child wins on collision`: search innermost first.
    pub fn lookup(&self, name: &Identifier) -> Option<&Variable> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Every scope at or above `floor`, innermost last. Used by
    /// [`crate::codegen::destructors`] to drain every scope a `break`/
    /// `continue` jumps out of, not just the innermost one (    /// destructor scheduling).
    pub fn frames_above(&self, floor: usize) -> &[SymbolTable] {
        &self.scopes[floor.min(self.scopes.len())..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::builder::Value;

    fn var() -> Variable {
        Variable::new(Value::register("%x"), Type::i32(), true)
    }

    #[test]
    fn child_shadows_parent() {
        let mut scopes = ScopeStack::new();
        scopes.push();
        scopes
            .current_mut()
            .insert(Identifier::new("x"), var());
        scopes.push();
        scopes
            .current_mut()
            .insert_or_overwrite(Identifier::new("x"), Variable::new(Value::register("%y"), Type::i32(), false));
        let found = scopes.lookup(&Identifier::new("x")).unwrap();
        assert_eq!(found.alloca, Value::register("%y"));
        scopes.pop();
        let found = scopes.lookup(&Identifier::new("x")).unwrap();
        assert_eq!(found.alloca, Value::register("%x"));
    }

    #[test]
    fn double_insert_in_same_scope_fails() {
        let mut table = SymbolTable::new();
        assert!(table.insert(Identifier::new("x"), var()));
        assert!(!table.insert(Identifier::new("x"), var()));
    }

    #[test]
    fn reverse_declaration_order() {
        let mut table = SymbolTable::new();
        table.insert(Identifier::new("a"), var());
        table.insert(Identifier::new("b"), var());
        table.insert(Identifier::new("c"), var());
        let names: Vec<String> = table
            .in_reverse_declaration_order()
            .map(|(n, _)| n.as_utf8())
            .collect();
        assert_eq!(names, vec!["c", "b", "a"]);
    }
}
