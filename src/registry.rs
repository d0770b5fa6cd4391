//! Per-translation-unit registries: `HashMap`-keyed function, class, union,
//! alias, and template tables, plus instantiation memoization.
//!
//! Registries holding AST fragments use owned storage and clone on
//! instantiation: `function_templates`/`class_templates` own their AST
//! fragments rather than borrowing from the parse tree.

use crate::ast::{ClassDef, FunctionDef, UnionDef};
use crate::ident::Identifier;
use crate::types::Type;
use std::collections::HashMap;

/// Key for a template registry: name, arity, and defining namespace path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateKey {
    pub name: Identifier,
    pub arity: usize,
    pub namespace: Vec<String>,
}

/// Key for the instantiation memoization table: a template key plus the
/// concrete argument types it was instantiated with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstantiationKey {
    pub template: TemplateKey,
    pub args: Vec<Type>,
}

/// A fully-qualified name: namespace path segments plus the local name,
/// used to key `classes`/`unions`/`aliases`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    pub namespace: Vec<String>,
    pub name: Identifier,
}

impl QualifiedName {
    pub fn new(namespace: Vec<String>, name: Identifier) -> Self {
        QualifiedName { namespace, name }
    }
}

/// A function handle: the mangled symbol name, unique within one
/// translation unit. Keys `function_return_type`/`function_param_types`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionHandle(pub String);

/// Per-translation-unit symbol/type registries.
#[derive(Debug, Default)]
pub struct Registries {
    pub function_return_type: HashMap<FunctionHandle, Type>,
    pub function_param_types: HashMap<FunctionHandle, Vec<Type>>,
    pub classes: HashMap<QualifiedName, ClassDef>,
    pub unions: HashMap<QualifiedName, UnionDef>,
    pub aliases: HashMap<QualifiedName, Type>,
    pub function_templates: HashMap<TemplateKey, FunctionDef>,
    pub class_templates: HashMap<TemplateKey, ClassDef>,
    created_class_templates: HashMap<InstantiationKey, Type>,
    /// Stack of scopes mapping template-parameter names to concrete types,
    /// pushed on instantiation entry and popped on exit.
    template_argument_stack: Vec<HashMap<Identifier, Type>>,
    /// Already-generated mangled symbols, so a second `(name, args,
    /// namespace)` instantiation never recompiles the body.
    instantiated_symbols: HashMap<InstantiationKey, String>,
}

impl Registries {
    pub fn new() -> Self {
        Registries::default()
    }

    /// No double-registration of a function symbol with an identical
    /// mangled name.
    pub fn register_function(
        &mut self,
        handle: FunctionHandle,
        return_type: Type,
        param_types: Vec<Type>,
    ) -> Result<(), String> {
        if self.function_return_type.contains_key(&handle) {
            return Err(format!("function '{}' already registered", handle.0));
        }
        self.function_param_types
            .insert(handle.clone(), param_types);
        self.function_return_type.insert(handle, return_type);
        Ok(())
    }

    pub fn push_template_args(&mut self, args: HashMap<Identifier, Type>) {
        self.template_argument_stack.push(args);
    }

    pub fn pop_template_args(&mut self) -> Option<HashMap<Identifier, Type>> {
        self.template_argument_stack.pop()
    }

    /// Resolve a template parameter name through the current
    /// (innermost-first) stack of instantiation scopes.
    pub fn lookup_template_arg(&self, name: &Identifier) -> Option<&Type> {
        self.template_argument_stack
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
    }

    /// Look up a memoized instantiation, or record that `mangled` is now
    /// the canonical symbol for `key`. Returns `Some(existing)` if this
    /// exact `(name, args, namespace)` was
    /// already instantiated — the caller should reuse it instead of
    /// lowering the body again.
    pub fn memoize_instantiation(&mut self, key: InstantiationKey, mangled: impl Into<String>) -> Option<String> {
        if let Some(existing) = self.instantiated_symbols.get(&key) {
            return Some(existing.clone());
        }
        self.instantiated_symbols.insert(key, mangled.into());
        None
    }

    pub fn record_created_class_template(&mut self, key: InstantiationKey, ty: Type) {
        self.created_class_templates.insert(key, ty);
    }

    pub fn lookup_created_class_template(&self, key: &InstantiationKey) -> Option<&Type> {
        self.created_class_templates.get(key)
    }

    /// Find a registered class by its bare name, ignoring namespace.
    /// `Type::UserDefined` carries no namespace path (`Type`
    /// is namespace-agnostic, resolution happens earlier), so member
    /// access and `new`/`delete` lowering can only key on the name itself;
    /// two classes of the same name in different namespaces are expected
    /// to be distinguished upstream during name resolution, not here.
    pub fn find_class_by_name(&self, name: &Identifier) -> Option<&ClassDef> {
        self.classes.iter().find(|(q, _)| &q.name == name).map(|(_, c)| c)
    }

    /// Find a registered union by bare name, the same simplification as
    /// [`Registries::find_class_by_name`] and for the same reason.
    pub fn find_union_by_name(&self, name: &Identifier) -> Option<&UnionDef> {
        self.unions.iter().find(|(q, _)| &q.name == name).map(|(_, u)| u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_registration_of_same_mangled_name_fails() {
        let mut reg = Registries::new();
        let h = FunctionHandle("_EM_Ffoo".to_string());
        assert!(reg.register_function(h.clone(), Type::void(), vec![]).is_ok());
        assert!(reg.register_function(h, Type::void(), vec![]).is_err());
    }

    #[test]
    fn template_instantiation_memoized_given_identical_key() {
        let mut reg = Registries::new();
        let key = InstantiationKey {
            template: TemplateKey {
                name: Identifier::new("id"),
                arity: 1,
                namespace: vec![],
            },
            args: vec![Type::i32()],
        };
        assert_eq!(reg.memoize_instantiation(key.clone(), "id_i32"), None);
        assert_eq!(
            reg.memoize_instantiation(key, "id_i32_again_ignored"),
            Some("id_i32".to_string())
        );
    }

    #[test]
    fn template_arg_lookup_walks_innermost_first() {
        let mut reg = Registries::new();
        let mut outer = HashMap::new();
        outer.insert(Identifier::new("T"), Type::i32());
        reg.push_template_args(outer);
        let mut inner = HashMap::new();
        inner.insert(Identifier::new("T"), Type::Builtin(crate::types::BuiltinKind::F64));
        reg.push_template_args(inner);
        assert_eq!(
            reg.lookup_template_arg(&Identifier::new("T")),
            Some(&Type::Builtin(crate::types::BuiltinKind::F64))
        );
        reg.pop_template_args();
        assert_eq!(reg.lookup_template_arg(&Identifier::new("T")), Some(&Type::i32()));
    }
}
