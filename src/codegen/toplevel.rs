//! Top-level declaration lowering: functions, classes, unions, typedefs,
//! imports, namespaces.
//!
//! Two passes: the first registers every definition so forward references
//! resolve, the second lowers bodies. Needed for mutually-recursive
//! functions and classes that reference each other.

use crate::ast::{ClassDef, FieldDef, FunctionDef, ImportDef, NamespaceDef, Program, TopLevel, TypedefDef, UnionDef};
use crate::backend::builder::{BasicBlock, Builder, FunctionValue};
use crate::backend::types::TypeMapper;
use crate::codegen::state::CodeGen;
use crate::diagnostics::CodegenError;
use crate::ident::Identifier;
use crate::mangle::{mangle_constructor, mangle_destructor, mangle_function, Accessibility, CONSTRUCTOR_NAME, DESTRUCTOR_NAME};
use crate::namespace::EntryKind;
use crate::registry::{FunctionHandle, QualifiedName};
use crate::symbol::Variable;
use crate::types::Type;

fn accessibility_of(attrs: &crate::ast::Attributes) -> Accessibility {
    if attrs.is_public() {
        Accessibility::Public
    } else {
        Accessibility::Private
    }
}

/// Lower a whole program: register every top-level name first, then lower
/// bodies.
pub fn lower_program(cg: &mut CodeGen, program: &Program) -> Result<(), CodegenError> {
    register_items(cg, &program.items)?;
    lower_items(cg, &program.items)?;
    Ok(())
}

fn register_items(cg: &mut CodeGen, items: &[TopLevel]) -> Result<(), CodegenError> {
    for item in items {
        match item {
            TopLevel::Function(f) => register_function(cg, f)?,
            TopLevel::Class(c) => register_class(cg, c)?,
            TopLevel::Union(u) => register_union(cg, u)?,
            TopLevel::Typedef(t) => register_typedef(cg, t)?,
            TopLevel::Import(_) => {}
            TopLevel::Namespace(ns) => {
                cg.namespaces.push(ns.name.clone(), EntryKind::Namespace);
                register_items(cg, &ns.items)?;
                cg.namespaces.pop();
            }
        }
    }
    Ok(())
}

pub(crate) fn register_function(cg: &mut CodeGen, f: &FunctionDef) -> Result<(), CodegenError> {
    if !f.template_params.is_empty() {
        // Templates are registered by name/arity, not as a concrete
        // function — their instantiations register themselves lazily
        // on first call.
        let key = crate::registry::TemplateKey {
            name: f.name.clone(),
            arity: f.template_params.len(),
            namespace: namespace_path_strings(cg),
        };
        cg.registries.function_templates.insert(key, f.clone());
        return Ok(());
    }
    let param_types: Vec<Type> = f.params.iter().map(|p| p.ty.clone()).collect();
    let mangled = if f.attributes.nomangle {
        f.name.as_utf8()
    } else {
        mangle_function(cg.namespaces.entries(), &f.name, accessibility_of(&f.attributes), &param_types)
    };
    cg.registries
        .register_function(FunctionHandle(mangled), f.return_type.clone(), param_types)
        .map_err(|msg| cg.error_at(f.node, |m| CodegenError::Redefinition(format!("{m}: {msg}"))))
}

fn register_class(cg: &mut CodeGen, c: &ClassDef) -> Result<(), CodegenError> {
    if !c.template_params.is_empty() {
        let key = crate::registry::TemplateKey {
            name: c.name.clone(),
            arity: c.template_params.len(),
            namespace: namespace_path_strings(cg),
        };
        cg.registries.class_templates.insert(key, c.clone());
        return Ok(());
    }
    let qname = QualifiedName::new(namespace_path_strings(cg), c.name.clone());
    cg.registries.classes.insert(qname, c.clone());

    cg.namespaces.push(c.name.clone(), EntryKind::Class);
    for m in &c.methods {
        register_function(cg, m)?;
    }
    // Synthesize a default destructor if the class didn't write one: a
    // class with no user-written destructor gets one that destroys each
    // field in reverse declaration order.
    let has_dtor = c.methods.iter().any(|m| m.name.as_utf8() == DESTRUCTOR_NAME);
    if !has_dtor {
        let dtor_name = mangle_destructor(&cg.namespaces.entries()[..cg.namespaces.entries().len() - 1], &c.name);
        let handle = FunctionHandle(dtor_name);
        if !cg.registries.function_return_type.contains_key(&handle) {
            cg.registries
                .function_return_type
                .insert(handle.clone(), Type::void());
            cg.registries.function_param_types.insert(handle, vec![]);
        }
    }
    cg.namespaces.pop();
    Ok(())
}

fn register_union(cg: &mut CodeGen, u: &UnionDef) -> Result<(), CodegenError> {
    let qname = QualifiedName::new(namespace_path_strings(cg), u.name.clone());
    cg.registries.unions.insert(qname, u.clone());
    Ok(())
}

fn register_typedef(cg: &mut CodeGen, t: &TypedefDef) -> Result<(), CodegenError> {
    let qname = QualifiedName::new(namespace_path_strings(cg), t.name.clone());
    cg.registries.aliases.insert(qname, t.target.clone());
    Ok(())
}

pub(crate) fn namespace_path_strings(cg: &CodeGen) -> Vec<String> {
    cg.namespaces.entries().iter().map(|e| e.name.as_utf8()).collect()
}

fn lower_items(cg: &mut CodeGen, items: &[TopLevel]) -> Result<(), CodegenError> {
    for item in items {
        match item {
            TopLevel::Function(f) => {
                if f.template_params.is_empty() {
                    lower_function(cg, f)?;
                }
            }
            TopLevel::Class(c) => lower_class(cg, c)?,
            TopLevel::Union(_) | TopLevel::Typedef(_) | TopLevel::Import(_) => {}
            TopLevel::Namespace(ns) => {
                cg.namespaces.push(ns.name.clone(), EntryKind::Namespace);
                lower_items(cg, &ns.items)?;
                cg.namespaces.pop();
            }
        }
    }
    Ok(())
}

pub fn lower_function(cg: &mut CodeGen, f: &FunctionDef) -> Result<(), CodegenError> {
    lower_function_with_receiver(cg, f, None)
}

/// Lower a class method: same shape as a free function, plus an implicit
/// `self` bound in scope ahead of the declared parameters. The receiver
/// never appears in `f.params`, so it plays no part in the method's
/// mangled name — it's purely an extra leading IR parameter,
/// matching how [`lower_new`](crate::codegen::expr) and
/// [`lower_default_destructor`] pass the instance pointer as the call's
/// first argument without it ever being part of the signature used for
/// overload resolution.
pub(crate) fn lower_method(cg: &mut CodeGen, f: &FunctionDef, class_name: &Identifier) -> Result<(), CodegenError> {
    lower_function_with_receiver(cg, f, Some(class_name))
}

fn lower_function_with_receiver(cg: &mut CodeGen, f: &FunctionDef, receiver: Option<&Identifier>) -> Result<(), CodegenError> {
    let Some(body) = &f.body else {
        // Bare declaration (e.g. `extern` prototype): declare only.
        let ret = cg.type_mapper.map(&f.return_type);
        let mut params: Vec<String> = receiver.iter().map(|_| "ptr".to_string()).collect();
        params.extend(f.params.iter().map(|p| cg.type_mapper.map(&p.ty)));
        cg.module.declare(format!("declare {ret} @{}({})", resolved_name(cg, f), params.join(", ")));
        return Ok(());
    };

    let mangled = resolved_name(cg, f);
    let entry = BasicBlock("entry".to_string());
    let mut builder = Builder::new(entry);

    cg.scopes.push();
    if let Some(class_name) = receiver {
        let self_ty = Type::UserDefined(class_name.clone()).pointer_to(1);
        let alloca = builder.alloca("ptr", self_ty.clone().pointer_to(1));
        builder.store("ptr", &crate::backend::builder::Value::typed("%arg.self", self_ty.clone()), &alloca);
        cg.scopes
            .current_mut()
            .insert(Identifier::new("self"), Variable::new(alloca, self_ty, true));
    }
    for p in &f.params {
        let ty_text = cg.type_mapper.map(&p.ty);
        let alloca = builder.alloca(&ty_text, p.ty.clone().pointer_to(1));
        builder.store(&ty_text, &crate::backend::builder::Value::typed(format!("%arg.{}", p.name.as_utf8()), p.ty.clone()), &alloca);
        cg.scopes
            .current_mut()
            .insert(p.name.clone(), Variable::new(alloca, p.ty.clone(), true));
    }

    crate::codegen::stmt::lower_block(cg, &mut builder, body)?;
    let scope = cg.scopes.current().clone();
    crate::codegen::destructors::drain_scope_on_fallthrough(cg, &mut builder, &scope);

    if !builder.is_terminated() {
        if f.return_type.is_void() {
            builder.ret_void();
        } else {
            builder.unreachable();
        }
    }
    cg.scopes.pop();

    let mut param_ir_types: Vec<String> = receiver.iter().map(|_| "ptr %arg.self".to_string()).collect();
    param_ir_types.extend(f.params.iter().map(|p| format!("{} %arg.{}", cg.type_mapper.map(&p.ty), p.name.as_utf8())));
    let return_ir_type = cg.type_mapper.map(&f.return_type);
    cg.module.add_function(
        FunctionValue {
            name: mangled,
            param_ir_types,
            return_ir_type,
            external: f.attributes.is_extern || f.attributes.is_public(),
            variadic: false,
        },
        builder.into_body(),
    );
    Ok(())
}

fn resolved_name(cg: &CodeGen, f: &FunctionDef) -> String {
    if f.attributes.nomangle {
        f.name.as_utf8()
    } else {
        let param_types: Vec<Type> = f.params.iter().map(|p| p.ty.clone()).collect();
        mangle_function(cg.namespaces.entries(), &f.name, accessibility_of(&f.attributes), &param_types)
    }
}

fn lower_class(cg: &mut CodeGen, c: &ClassDef) -> Result<(), CodegenError> {
    if !c.template_params.is_empty() {
        return Ok(());
    }
    cg.namespaces.push(c.name.clone(), EntryKind::Class);
    for m in &c.methods {
        lower_method(cg, m, &c.name)?;
    }
    let has_dtor = c.methods.iter().any(|m| m.name.as_utf8() == DESTRUCTOR_NAME);
    if !has_dtor {
        lower_default_destructor(cg, c);
    }
    cg.namespaces.pop();
    Ok(())
}

/// A synthesized destructor that tears down each field in reverse
/// declaration order. Only class-typed fields get a
/// recursive destructor call; scalars need none.
pub(crate) fn lower_default_destructor(cg: &mut CodeGen, c: &ClassDef) {
    let dtor_name = mangle_destructor(&cg.namespaces.entries()[..cg.namespaces.entries().len() - 1], &c.name);
    let entry = BasicBlock("entry".to_string());
    let mut builder = Builder::new(entry);
    let self_ptr = crate::backend::builder::Value::typed("%arg.self", Type::UserDefined(c.name.clone()).pointer_to(1));
    for field in c.fields.iter().rev() {
        if let Type::UserDefined(field_class) = &field.ty {
            if let Some((offset, _)) = class_field_offset(cg, &c.name, &field.name) {
                let addr = builder.gep("i8", &self_ptr, &[("i64", &offset.to_string())], field.ty.clone().pointer_to(1));
                crate::codegen::destructors::emit_destructor_call(cg, &mut builder, field_class, &addr);
            }
        }
    }
    builder.ret_void();
    cg.module.add_function(
        FunctionValue {
            name: dtor_name,
            param_ir_types: vec!["ptr %arg.self".to_string()],
            return_ir_type: "void".to_string(),
            external: false,
            variadic: false,
        },
        builder.into_body(),
    );
}

/// Byte offset and type of `field` within `class_name`, computed in
/// declared order with no padding/alignment. Simplified relative to a real
/// ABI since the back end here only ever talks to itself, never to
/// foreign-ABI code.
pub fn class_field_offset(cg: &mut CodeGen, class_name: &Identifier, field: &Identifier) -> Option<(u64, Type)> {
    let class = cg.registries.find_class_by_name(class_name)?.clone();
    let mut offset = 0u64;
    for f in &class.fields {
        if &f.name == field {
            return Some((offset, f.ty.clone()));
        }
        offset += TypeMapper::size_of(&f.ty);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::target::{RelocModel, TargetInfo};
    use crate::diagnostics::SourceMap;
    use std::path::PathBuf;

    fn fresh_cg(map: &SourceMap) -> CodeGen<'_> {
        CodeGen::new("t", TargetInfo::host(RelocModel::Static), map)
    }

    #[test]
    fn registering_two_functions_with_same_mangled_name_errors() {
        let map = SourceMap::new(PathBuf::from("t.em"), String::new());
        let mut cg = fresh_cg(&map);
        let f = FunctionDef {
            name: Identifier::new("f"),
            template_params: vec![],
            params: vec![],
            return_type: Type::void(),
            body: None,
            attributes: crate::ast::Attributes::default(),
            node: crate::diagnostics::NodeId(0),
        };
        register_function(&mut cg, &f).unwrap();
        assert!(register_function(&mut cg, &f).is_err());
    }

    #[test]
    fn class_field_offsets_accumulate_in_declared_order() {
        let map = SourceMap::new(PathBuf::from("t.em"), String::new());
        let mut cg = fresh_cg(&map);
        let c = ClassDef {
            name: Identifier::new("Pair"),
            template_params: vec![],
            fields: vec![
                FieldDef {
                    name: Identifier::new("a"),
                    ty: Type::i32(),
                    attributes: crate::ast::Attributes::default(),
                },
                FieldDef {
                    name: Identifier::new("b"),
                    ty: Type::Builtin(crate::types::BuiltinKind::I64),
                    attributes: crate::ast::Attributes::default(),
                },
            ],
            methods: vec![],
            attributes: crate::ast::Attributes::default(),
            node: crate::diagnostics::NodeId(0),
        };
        register_class(&mut cg, &c).unwrap();
        let (off_a, _) = class_field_offset(&mut cg, &c.name, &Identifier::new("a")).unwrap();
        let (off_b, _) = class_field_offset(&mut cg, &c.name, &Identifier::new("b")).unwrap();
        assert_eq!(off_a, 0);
        assert_eq!(off_b, 4);
    }
}
