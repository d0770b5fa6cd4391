//! Destructor scheduling.
//!
//! Always drains every live class-typed local in reverse declaration order
//! on every exit path a scope can take — falling off the end of a block,
//! `return`, `break`, and `continue` all resolve this the same way (see
//! DESIGN.md's Open Question note: full draining over partial/no cleanup on
//! early exit).

use crate::backend::builder::{Builder, Value};
use crate::codegen::state::CodeGen;
use crate::ident::Identifier;
use crate::mangle::mangle_destructor;
use crate::registry::FunctionHandle;
use crate::symbol::SymbolTable;
use crate::types::Type;

/// Call `class_name`'s destructor on `receiver`, if one is registered.
/// Unregistered classes (e.g. ones only ever used by value as opaque
/// externs) are left alone rather than treated as an error — `new`/`delete`
/// are the only place a destructor call is mandatory.
pub fn emit_destructor_call(cg: &mut CodeGen, b: &mut Builder, class_name: &Identifier, receiver: &Value) {
    let dtor = mangle_destructor(cg.namespaces.entries(), class_name);
    if !cg.registries.function_return_type.contains_key(&FunctionHandle(dtor.clone())) {
        return;
    }
    b.call(&dtor, &[("ptr".to_string(), receiver.clone())], "void", Type::void());
}

/// Destroy every class-typed binding in `scope`, reverse declaration order,
/// on fallthrough exit. A no-op once the block already has a
/// terminator, since [`Builder::emit`] elides instructions after one.
pub fn drain_scope_on_fallthrough(cg: &mut CodeGen, b: &mut Builder, scope: &SymbolTable) {
    for (_, var) in scope.in_reverse_declaration_order() {
        let Type::UserDefined(class_name) = var.ty.clone() else {
            continue;
        };
        let ty_text = cg.type_mapper.map(&var.ty);
        let receiver = b.load(&ty_text, &var.alloca, var.ty.clone());
        emit_destructor_call(cg, b, &class_name, &receiver);
    }
}

/// Drain every scope from the current depth down to (but not including)
/// `floor`, innermost scope first — what a `break`/`continue` must do before
/// jumping out of however many nested blocks sit between it and the loop it
/// targets.
pub fn drain_scopes_to_floor(cg: &mut CodeGen, b: &mut Builder, floor: usize) {
    let frames: Vec<SymbolTable> = cg.scopes.frames_above(floor).to_vec();
    for scope in frames.iter().rev() {
        drain_scope_on_fallthrough(cg, b, scope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::builder::BasicBlock;
    use crate::backend::target::{RelocModel, TargetInfo};
    use crate::diagnostics::SourceMap;
    use crate::mangle::{mangle_destructor, Accessibility};
    use crate::registry::FunctionHandle;
    use crate::symbol::Variable;
    use std::path::PathBuf;

    fn fresh_cg(map: &SourceMap) -> CodeGen<'_> {
        CodeGen::new("t", TargetInfo::host(RelocModel::Static), map)
    }

    #[test]
    fn unregistered_class_emits_no_call() {
        let map = SourceMap::new(PathBuf::from("t.em"), String::new());
        let mut cg = fresh_cg(&map);
        let mut b = Builder::new(BasicBlock("entry".to_string()));
        emit_destructor_call(&mut cg, &mut b, &Identifier::new("Widget"), &Value::register("%p"));
        assert!(!b.into_body().contains("call"));
    }

    #[test]
    fn registered_destructor_is_called_once_per_scope_variable() {
        let map = SourceMap::new(PathBuf::from("t.em"), String::new());
        let mut cg = fresh_cg(&map);
        let dtor = mangle_destructor(cg.namespaces.entries(), &Identifier::new("Widget"));
        cg.registries
            .register_function(FunctionHandle(dtor), Type::void(), vec![])
            .unwrap();
        let mut b = Builder::new(BasicBlock("entry".to_string()));
        let mut scope = SymbolTable::new();
        scope.insert(
            Identifier::new("w"),
            Variable::new(Value::register("%w.addr"), Type::UserDefined(Identifier::new("Widget")), true),
        );
        drain_scope_on_fallthrough(&mut cg, &mut b, &scope);
        let body = b.into_body();
        assert_eq!(body.matches("call void @").count(), 1);
        let _ = Accessibility::Public;
    }
}
