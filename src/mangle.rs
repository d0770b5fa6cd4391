//! Deterministic name mangling.
//!
//! Escapes one identifier segment into a valid LLVM identifier (`-` → `_`,
//! `?` → `_Q_`, etc.), then layers a namespace path, an accessibility tag,
//! and overload-distinguishing parameter types on top — the escaping step
//! is one stage of a larger encoding, not the whole of it.

use crate::ident::Identifier;
use crate::namespace::{EntryKind, NamespaceEntry};
use crate::types::Type;

/// Accessibility, encoded into the mangled name alongside the namespace
/// path and parameter types so overloads that differ only in accessibility
/// still collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accessibility {
    Public,
    Private,
}

impl Accessibility {
    fn tag(self) -> &'static str {
        match self {
            Accessibility::Public => "pub",
            Accessibility::Private => "priv",
        }
    }
}

/// Reserved method names: constructors are looked up as a function named
/// `new` in the class scope, destructors under this reserved name.
pub const CONSTRUCTOR_NAME: &str = "new";
pub const DESTRUCTOR_NAME: &str = "__dtor";

/// Escape one identifier segment into characters valid in an LLVM
/// identifier: hyphen → underscore; everything else either passes through
/// or is hex-encoded.
fn escape_segment(name: &str) -> String {
    let mut out = String::new();
    for c in name.chars() {
        match c {
            '_' | '.' | '$' => out.push(c),
            c if c.is_alphanumeric() => out.push(c),
            '-' => out.push('_'),
            c => out.push_str(&format!("_x{:04X}_", c as u32)),
        }
    }
    out
}

fn mangle_namespace_path(entries: &[NamespaceEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let tag = match entry.kind {
            EntryKind::Namespace => 'N',
            EntryKind::Class => 'C',
        };
        out.push_str(&format!("{tag}{}", escape_segment(&entry.name.as_utf8())));
    }
    out
}

fn mangle_type(ty: &Type) -> String {
    // A compact, unambiguous encoding; need not be human-readable, only
    // injective.
    match ty {
        Type::Builtin(b) => b.name().to_string(),
        Type::UserDefined(name) => format!("U{}{}", name.as_utf8().len(), name.as_utf8()),
        Type::UserDefinedTemplate { base, args } => {
            let base = base.as_utf8();
            let args_text = args.iter().map(mangle_type).collect::<Vec<_>>().join("_");
            format!("T{}{}I{}E", base.len(), base, args_text)
        }
        Type::Array { element, size } => format!("A{}_{}", size, mangle_type(element)),
        Type::Pointer { pointee, depth } => format!("P{}{}", depth, mangle_type(pointee)),
        Type::Reference(referent) => format!("R{}", mangle_type(referent)),
    }
}

/// Produce the deterministic mangled symbol for a function.
///
/// `nomangle`-attributed external-linkage functions should never reach this
/// function at all; callers check the attribute first and keep the source
/// name verbatim.
pub fn mangle_function(
    namespace: &[NamespaceEntry],
    name: &Identifier,
    accessibility: Accessibility,
    param_types: &[Type],
) -> String {
    let ns = mangle_namespace_path(namespace);
    let params = param_types
        .iter()
        .map(mangle_type)
        .collect::<Vec<_>>()
        .join("_");
    format!(
        "_EM{ns}F{}{}_{}{}",
        escape_segment(&name.as_utf8()).len(),
        escape_segment(&name.as_utf8()),
        accessibility.tag(),
        if params.is_empty() {
            "_v".to_string()
        } else {
            format!("_{params}")
        }
    )
}

/// Mangled name for a class's constructor: the class pushed onto the
/// namespace path as a `Class` entry, named [`CONSTRUCTOR_NAME`].
pub fn mangle_constructor(namespace: &[NamespaceEntry], class_name: &Identifier, param_types: &[Type]) -> String {
    let mut path = namespace.to_vec();
    path.push(NamespaceEntry {
        name: class_name.clone(),
        kind: EntryKind::Class,
    });
    mangle_function(&path, &Identifier::new(CONSTRUCTOR_NAME), Accessibility::Public, param_types)
}

/// Mangled name for an instance method: the class pushed onto the
/// namespace path as a `Class` entry, the same construction
/// [`mangle_constructor`]/[`mangle_destructor`] use.
pub fn mangle_method(
    namespace: &[NamespaceEntry],
    class_name: &Identifier,
    method_name: &Identifier,
    accessibility: Accessibility,
    param_types: &[Type],
) -> String {
    let mut path = namespace.to_vec();
    path.push(NamespaceEntry {
        name: class_name.clone(),
        kind: EntryKind::Class,
    });
    mangle_function(&path, method_name, accessibility, param_types)
}

/// Mangled name for a class's destructor. Destructors take no declared
/// parameters beyond the implicit receiver, which the back end passes as a
/// bare `ptr` outside the mangled signature.
pub fn mangle_destructor(namespace: &[NamespaceEntry], class_name: &Identifier) -> String {
    let mut path = namespace.to_vec();
    path.push(NamespaceEntry {
        name: class_name.clone(),
        kind: EntryKind::Class,
    });
    mangle_function(&path, &Identifier::new(DESTRUCTOR_NAME), Accessibility::Public, &[])
}

/// Mangled name for a template instantiation: a fresh mangled function
/// suffixed with the argument encoding.
pub fn mangle_template_instantiation(
    namespace: &[NamespaceEntry],
    name: &Identifier,
    accessibility: Accessibility,
    param_types: &[Type],
    template_args: &[Type],
) -> String {
    let base = mangle_function(namespace, name, accessibility, param_types);
    let args_text = template_args.iter().map(mangle_type).collect::<Vec<_>>().join("_");
    format!("{base}_Tmpl{args_text}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BuiltinKind;

    fn ns(names: &[(&str, EntryKind)]) -> Vec<NamespaceEntry> {
        names
            .iter()
            .map(|(n, k)| NamespaceEntry {
                name: Identifier::new(*n),
                kind: *k,
            })
            .collect()
    }

    #[test]
    fn overloads_differing_only_in_params_get_distinct_names() {
        let a = mangle_function(&[], &Identifier::new("f"), Accessibility::Public, &[Type::i32()]);
        let b = mangle_function(
            &[],
            &Identifier::new("f"),
            Accessibility::Public,
            &[Type::Builtin(BuiltinKind::F64)],
        );
        assert_ne!(a, b);
    }

    #[test]
    fn same_signature_in_different_namespaces_differs() {
        let a = mangle_function(
            &ns(&[("a", EntryKind::Namespace)]),
            &Identifier::new("f"),
            Accessibility::Public,
            &[],
        );
        let b = mangle_function(
            &ns(&[("b", EntryKind::Namespace)]),
            &Identifier::new("f"),
            Accessibility::Public,
            &[],
        );
        assert_ne!(a, b);
    }

    #[test]
    fn template_instantiation_names_are_injective_per_args() {
        let a = mangle_template_instantiation(
            &[],
            &Identifier::new("id"),
            Accessibility::Public,
            &[Type::UserDefined(Identifier::new("T"))],
            &[Type::i32()],
        );
        let b = mangle_template_instantiation(
            &[],
            &Identifier::new("id"),
            Accessibility::Public,
            &[Type::UserDefined(Identifier::new("T"))],
            &[Type::Builtin(BuiltinKind::F64)],
        );
        assert_ne!(a, b);
    }

    #[test]
    fn same_name_same_args_mangles_identically_memoization_friendly() {
        let a = mangle_template_instantiation(
            &[],
            &Identifier::new("id"),
            Accessibility::Public,
            &[Type::UserDefined(Identifier::new("T"))],
            &[Type::i32()],
        );
        let b = mangle_template_instantiation(
            &[],
            &Identifier::new("id"),
            Accessibility::Public,
            &[Type::UserDefined(Identifier::new("T"))],
            &[Type::i32()],
        );
        assert_eq!(a, b);
    }
}
