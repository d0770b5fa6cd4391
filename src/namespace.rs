//! Namespace stack: resolves a name through an arbitrary stack of nested
//! namespace/class scopes by walking from innermost outward, trying each
//! prefix of the enclosing path before falling back to the next one out.

use crate::ident::Identifier;

/// Whether a namespace-stack entry came from a `namespace` block or from a
/// class body pushed as a namespace while lowering its methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Namespace,
    Class,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespaceEntry {
    pub name: Identifier,
    pub kind: EntryKind,
}

/// An ordered sequence of `(name, kind)` entries, comparable
/// lexicographically, used both for resolution and mangling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NamespaceStack(Vec<NamespaceEntry>);

impl NamespaceStack {
    pub fn new() -> Self {
        NamespaceStack(Vec::new())
    }

    pub fn push(&mut self, name: Identifier, kind: EntryKind) {
        self.0.push(NamespaceEntry { name, kind });
    }

    pub fn pop(&mut self) -> Option<NamespaceEntry> {
        self.0.pop()
    }

    pub fn entries(&self) -> &[NamespaceEntry] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All prefixes of the current stack, innermost (full stack) first,
    /// down to the root (empty stack). Used to try `a::b::c` resolution at
    /// each enclosing namespace before falling back outward.
    pub fn prefixes_innermost_first(&self) -> Vec<Vec<NamespaceEntry>> {
        let mut out = Vec::with_capacity(self.0.len() + 1);
        for i in (0..=self.0.len()).rev() {
            out.push(self.0[..i].to_vec());
        }
        out
    }

    /// `true` if the current stack has a class entry we are "inside" of,
    /// i.e. the innermost entry is a class (used to resolve `this`,
    /// constructors, and destructors).
    pub fn innermost_class(&self) -> Option<&Identifier> {
        match self.0.last() {
            Some(NamespaceEntry {
                name,
                kind: EntryKind::Class,
            }) => Some(name),
            _ => None,
        }
    }
}

impl PartialOrd for NamespaceStack {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NamespaceStack {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0
            .iter()
            .map(|e| (&e.name, e.kind as u8))
            .cmp(other.0.iter().map(|e| (&e.name, e.kind as u8)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_go_from_innermost_to_root() {
        let mut ns = NamespaceStack::new();
        ns.push(Identifier::new("a"), EntryKind::Namespace);
        ns.push(Identifier::new("b"), EntryKind::Namespace);
        let prefixes = ns.prefixes_innermost_first();
        assert_eq!(prefixes.len(), 3);
        assert_eq!(prefixes[0].len(), 2);
        assert_eq!(prefixes[2].len(), 0);
    }

    #[test]
    fn innermost_class_detected() {
        let mut ns = NamespaceStack::new();
        ns.push(Identifier::new("ns"), EntryKind::Namespace);
        ns.push(Identifier::new("Box"), EntryKind::Class);
        assert_eq!(ns.innermost_class().unwrap().as_utf8(), "Box");
    }
}
