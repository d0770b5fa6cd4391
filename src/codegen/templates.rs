//! Template instantiation.
//!
//! Lowers a template body once per `(template, concrete-argument-types)`
//! pair, memoized by [`crate::registry::InstantiationKey`] and reused by
//! every later call with the same argument list, since the same template
//! legitimately produces a distinct function per argument list.

use crate::ast::{ClassDef, FieldDef, FunctionDef};
use crate::backend::builder::{BasicBlock, Builder, FunctionValue, Value};
use crate::codegen::expr::lower_expr;
use crate::codegen::state::CodeGen;
use crate::diagnostics::{CodegenError, NodeId};
use crate::ident::Identifier;
use crate::mangle::{mangle_template_instantiation, Accessibility, DESTRUCTOR_NAME};
use crate::namespace::{EntryKind, NamespaceEntry};
use crate::registry::{FunctionHandle, InstantiationKey, QualifiedName, TemplateKey};
use crate::symbol::Variable;
use crate::types::Type;
use std::collections::HashMap;

/// Replace every template-parameter type with its instantiation argument,
/// recursing through compound types — a template's parameter and return
/// types may themselves mention its template parameters.
pub fn substitute(ty: &Type, params: &[Identifier], args: &[Type]) -> Type {
    match ty {
        Type::UserDefined(name) => match params.iter().position(|p| p == name) {
            Some(idx) => args[idx].clone(),
            None => ty.clone(),
        },
        Type::UserDefinedTemplate { base, args: targs } => Type::UserDefinedTemplate {
            base: base.clone(),
            args: targs.iter().map(|t| substitute(t, params, args)).collect(),
        },
        Type::Array { element, size } => Type::Array {
            element: Box::new(substitute(element, params, args)),
            size: *size,
        },
        Type::Pointer { pointee, depth } => Type::Pointer {
            pointee: Box::new(substitute(pointee, params, args)),
            depth: *depth,
        },
        Type::Reference(inner) => Type::Reference(Box::new(substitute(inner, params, args))),
        Type::Builtin(_) => ty.clone(),
    }
}

/// Resolve a type against the live instantiation-scope stack (/// `template_argument_stack`), for types written inside a template body
/// rather than in its signature (e.g. a local `var x: T`). Signature types
/// are substituted once, up front, via [`substitute`]; body-local types are
/// resolved lazily here since they're only visited while that instantiation
/// is being lowered.
pub fn resolve_type_in_scope(cg: &CodeGen, ty: &Type) -> Type {
    match ty {
        Type::UserDefined(name) => cg
            .registries
            .lookup_template_arg(name)
            .cloned()
            .unwrap_or_else(|| ty.clone()),
        Type::UserDefinedTemplate { base, args } => Type::UserDefinedTemplate {
            base: base.clone(),
            args: args.iter().map(|a| resolve_type_in_scope(cg, a)).collect(),
        },
        Type::Array { element, size } => Type::Array {
            element: Box::new(resolve_type_in_scope(cg, element)),
            size: *size,
        },
        Type::Pointer { pointee, depth } => Type::Pointer {
            pointee: Box::new(resolve_type_in_scope(cg, pointee)),
            depth: *depth,
        },
        Type::Reference(inner) => Type::Reference(Box::new(resolve_type_in_scope(cg, inner))),
        Type::Builtin(_) => ty.clone(),
    }
}

fn find_function_template(cg: &CodeGen, name: &Identifier, arity: usize) -> Option<(FunctionDef, Vec<String>)> {
    for prefix in cg.namespaces.prefixes_innermost_first() {
        let ns_path: Vec<String> = prefix.iter().map(|e| e.name.as_utf8()).collect();
        let key = TemplateKey {
            name: name.clone(),
            arity,
            namespace: ns_path.clone(),
        };
        if let Some(def) = cg.registries.function_templates.get(&key) {
            return Some((def.clone(), ns_path));
        }
    }
    None
}

fn namespace_entries(ns_path: &[String]) -> Vec<NamespaceEntry> {
    ns_path
        .iter()
        .map(|n| NamespaceEntry {
            name: Identifier::new(n.as_str()),
            kind: EntryKind::Namespace,
        })
        .collect()
}

/// Lower a `name<T1, T2>(args)` call: resolve the template, instantiate its
/// body on first use (memoized thereafter), then call it like any other
/// function.
pub fn lower_template_call(
    cg: &mut CodeGen,
    b: &mut Builder,
    callee: &crate::ast::Expression,
    template_args: &[Type],
    args: &[crate::ast::Expression],
    node: NodeId,
) -> Result<Value, CodegenError> {
    let crate::ast::Expression::NameRef { name, .. } = callee else {
        return Err(cg.error_at(node, |msg| {
            CodegenError::UnknownName(format!("{msg}: template call target must be a plain name"))
        }));
    };
    let Some((template, ns_path)) = find_function_template(cg, name, template_args.len()) else {
        return Err(cg.error_at(node, |msg| {
            CodegenError::UnknownName(format!(
                "{msg}: no template '{name}' taking {} type argument(s)",
                template_args.len()
            ))
        }));
    };

    let substituted_params: Vec<Type> = template
        .params
        .iter()
        .map(|p| substitute(&p.ty, &template.template_params, template_args))
        .collect();
    let substituted_return = substitute(&template.return_type, &template.template_params, template_args);

    let ns_entries = namespace_entries(&ns_path);
    let mangled = mangle_template_instantiation(
        &ns_entries,
        name,
        Accessibility::Public,
        &substituted_params,
        template_args,
    );

    let template_key = TemplateKey {
        name: name.clone(),
        arity: template_args.len(),
        namespace: ns_path,
    };
    let inst_key = InstantiationKey {
        template: template_key,
        args: template_args.to_vec(),
    };

    if cg.registries.memoize_instantiation(inst_key, mangled.clone()).is_none() {
        lower_instantiated_body(cg, &template, &mangled, &substituted_params, &substituted_return, template_args)?;
    }

    let mut arg_values = Vec::with_capacity(args.len());
    for a in args {
        arg_values.push(lower_expr(cg, b, a)?);
    }
    if arg_values.len() != substituted_params.len() {
        return Err(cg.error_at(node, |msg| {
            CodegenError::ArityMismatch(format!(
                "{msg}: '{name}' expects {} argument(s), found {}",
                substituted_params.len(),
                arg_values.len()
            ))
        }));
    }
    let return_ty_text = cg.type_mapper.map(&substituted_return);
    let call_args: Vec<(String, Value)> = arg_values
        .into_iter()
        .map(|v| (cg.type_mapper.map(&v.ty), v))
        .collect();
    Ok(b
        .call(&mangled, &call_args, &return_ty_text, substituted_return.clone())
        .unwrap_or(Value::typed("", substituted_return)))
}

fn lower_instantiated_body(
    cg: &mut CodeGen,
    template: &FunctionDef,
    mangled: &str,
    param_types: &[Type],
    return_type: &Type,
    template_args: &[Type],
) -> Result<(), CodegenError> {
    let Some(body) = &template.body else {
        return Ok(());
    };

    let mut arg_scope = HashMap::new();
    for (p, t) in template.template_params.iter().zip(template_args) {
        arg_scope.insert(p.clone(), t.clone());
    }
    cg.registries.push_template_args(arg_scope);

    let entry = BasicBlock("entry".to_string());
    let mut builder = Builder::new(entry);
    cg.scopes.push();
    for (p, ty) in template.params.iter().zip(param_types) {
        let ty_text = cg.type_mapper.map(ty);
        let alloca = builder.alloca(&ty_text, ty.clone().pointer_to(1));
        builder.store(
            &ty_text,
            &Value::typed(format!("%arg.{}", p.name.as_utf8()), ty.clone()),
            &alloca,
        );
        cg.scopes.current_mut().insert(p.name.clone(), Variable::new(alloca, ty.clone(), true));
    }

    let result = crate::codegen::stmt::lower_block(cg, &mut builder, body);
    if result.is_ok() {
        let scope = cg.scopes.current().clone();
        crate::codegen::destructors::drain_scope_on_fallthrough(cg, &mut builder, &scope);
        if !builder.is_terminated() {
            if return_type.is_void() {
                builder.ret_void();
            } else {
                builder.unreachable();
            }
        }
    }
    cg.scopes.pop();
    cg.registries.pop_template_args();
    result?;

    let param_ir_types: Vec<String> = template
        .params
        .iter()
        .zip(param_types)
        .map(|(p, ty)| format!("{} %arg.{}", cg.type_mapper.map(ty), p.name.as_utf8()))
        .collect();
    let return_ir_type = cg.type_mapper.map(return_type);
    let _ = cg
        .registries
        .register_function(FunctionHandle(mangled.to_string()), return_type.clone(), param_types.to_vec());
    cg.module.add_function(
        FunctionValue {
            name: mangled.to_string(),
            param_ir_types,
            return_ir_type,
            external: false,
            variadic: false,
        },
        builder.into_body(),
    );
    Ok(())
}

fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

/// Monomorphize `base<template_args>` into a concrete class, memoized by
/// `(base, arity, args)`. Used by
/// `new Box<i32>(...)`-style construction.
pub fn instantiate_class_template(cg: &mut CodeGen, base: &Identifier, template_args: &[Type]) -> Option<Identifier> {
    let mut found = None;
    'search: for prefix in cg.namespaces.prefixes_innermost_first() {
        let ns_path: Vec<String> = prefix.iter().map(|e| e.name.as_utf8()).collect();
        let key = TemplateKey {
            name: base.clone(),
            arity: template_args.len(),
            namespace: ns_path,
        };
        if cg.registries.class_templates.contains_key(&key) {
            found = Some(key);
            break 'search;
        }
    }
    let template_key = found?;
    let inst_key = InstantiationKey {
        template: template_key.clone(),
        args: template_args.to_vec(),
    };
    if let Some(Type::UserDefined(existing)) = cg.registries.lookup_created_class_template(&inst_key).cloned() {
        return Some(existing);
    }

    let template = cg.registries.class_templates.get(&template_key)?.clone();
    let suffix = template_args.iter().map(|t| sanitize(&t.to_string())).collect::<Vec<_>>().join("_");
    let concrete_name = Identifier::new(format!("{}__{}", base.as_utf8(), suffix));

    let fields: Vec<FieldDef> = template
        .fields
        .iter()
        .map(|f| FieldDef {
            name: f.name.clone(),
            ty: substitute(&f.ty, &template.template_params, template_args),
            attributes: f.attributes,
        })
        .collect();
    let mut methods = template.methods.clone();
    for m in &mut methods {
        for p in &mut m.params {
            p.ty = substitute(&p.ty, &template.template_params, template_args);
        }
        m.return_type = substitute(&m.return_type, &template.template_params, template_args);
    }
    let concrete = ClassDef {
        name: concrete_name.clone(),
        template_params: vec![],
        fields,
        methods,
        attributes: template.attributes,
        node: template.node,
    };

    let qname = QualifiedName::new(crate::codegen::toplevel::namespace_path_strings(cg), concrete_name.clone());
    cg.registries.classes.insert(qname, concrete.clone());
    cg.registries
        .record_created_class_template(inst_key, Type::UserDefined(concrete_name.clone()));

    let mut arg_scope = HashMap::new();
    for (p, t) in template.template_params.iter().zip(template_args) {
        arg_scope.insert(p.clone(), t.clone());
    }
    cg.registries.push_template_args(arg_scope);
    cg.namespaces.push(concrete_name.clone(), EntryKind::Class);
    for m in &concrete.methods {
        let _ = crate::codegen::toplevel::register_function(cg, m);
    }
    for m in &concrete.methods {
        let _ = crate::codegen::toplevel::lower_method(cg, m, &concrete_name);
    }
    let has_dtor = concrete.methods.iter().any(|m| m.name.as_utf8() == DESTRUCTOR_NAME);
    if !has_dtor {
        crate::codegen::toplevel::lower_default_destructor(cg, &concrete);
    }
    cg.namespaces.pop();
    cg.registries.pop_template_args();

    Some(concrete_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Param;

    #[test]
    fn substitute_replaces_matching_template_param_only() {
        let params = vec![Identifier::new("T")];
        let args = vec![Type::i32()];
        let substituted = substitute(&Type::UserDefined(Identifier::new("T")), &params, &args);
        assert_eq!(substituted, Type::i32());
        let unrelated = substitute(&Type::UserDefined(Identifier::new("Other")), &params, &args);
        assert_eq!(unrelated, Type::UserDefined(Identifier::new("Other")));
    }

    #[test]
    fn substitute_recurses_through_pointer() {
        let params = vec![Identifier::new("T")];
        let args = vec![Type::Builtin(crate::types::BuiltinKind::F64)];
        let ty = Type::UserDefined(Identifier::new("T")).pointer_to(1);
        let substituted = substitute(&ty, &params, &args);
        assert_eq!(substituted, Type::Builtin(crate::types::BuiltinKind::F64).pointer_to(1));
    }

    #[test]
    fn find_function_template_uses_params_field() {
        let p = Param {
            name: Identifier::new("x"),
            ty: Type::UserDefined(Identifier::new("T")),
        };
        assert_eq!(p.name.as_utf8(), "x");
    }
}
