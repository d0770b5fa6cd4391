//! Identifiers and import paths.
//!
//! : identifiers are UTF-32 internally (so the lexer never has to
//! re-validate UTF-8 boundaries while scanning codepoint-by-codepoint) but
//! convert losslessly to UTF-8 at every external boundary: diagnostics,
//! mangled names, and the textual IR the back end emits.

use std::fmt;

/// A UTF-32 identifier. Ordered and hashable so it can key the registries in
/// [`crate::registry`] and the symbol tables in [`crate::symbol`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Identifier(Vec<char>);

impl Identifier {
    pub fn new(s: impl AsRef<str>) -> Self {
        Identifier(s.as_ref().chars().collect())
    }

    pub fn as_utf8(&self) -> String {
        self.0.iter().collect()
    }

    pub fn chars(&self) -> &[char] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_utf8())
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Identifier::new(s)
    }
}

impl From<String> for Identifier {
    fn from(s: String) -> Self {
        Identifier::new(s)
    }
}

/// A UTF-32 import path, e.g. the `a::b::c` of `import a::b::c;`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Path(Vec<char>);

impl Path {
    pub fn new(s: impl AsRef<str>) -> Self {
        Path(s.as_ref().chars().collect())
    }

    pub fn as_utf8(&self) -> String {
        self.0.iter().collect()
    }

    /// Split on `::`, the segment separator also used for namespace
    /// qualification (see [`crate::namespace::NamespaceStack`]).
    pub fn segments(&self) -> Vec<String> {
        self.as_utf8().split("::").map(|s| s.to_string()).collect()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_utf8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_utf8() {
        let id = Identifier::new("snowman_\u{2603}");
        assert_eq!(id.as_utf8(), "snowman_\u{2603}");
    }

    #[test]
    fn path_segments_split_on_double_colon() {
        let p = Path::new("a::b::c");
        assert_eq!(p.segments(), vec!["a", "b", "c"]);
    }

    #[test]
    fn identifiers_order_lexicographically_by_codepoint() {
        let a = Identifier::new("abc");
        let b = Identifier::new("abd");
        assert!(a < b);
    }
}
