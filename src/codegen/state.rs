//! `CodeGen`: the single struct that owns everything a lowering pass
//! touches.
//!
//! One mutable struct, passed `&mut` through every lowering function,
//! rather than threading five separate parameters everywhere.

use crate::backend::module::Module;
use crate::backend::target::TargetInfo;
use crate::backend::types::TypeMapper;
use crate::diagnostics::{CodegenError, NodeId, SourceMap};
use crate::namespace::NamespaceStack;
use crate::registry::Registries;
use crate::symbol::ScopeStack;

/// Everything one `compile` call's lowering phase needs. Per-translation-unit
/// state with the lifetime of exactly one `compile` call.
pub struct CodeGen<'a> {
    pub module: Module,
    pub target: TargetInfo,
    pub type_mapper: TypeMapper,
    pub scopes: ScopeStack,
    pub namespaces: NamespaceStack,
    pub registries: Registries,
    pub map: &'a SourceMap,
}

impl<'a> CodeGen<'a> {
    pub fn new(module_name: impl Into<String>, target: TargetInfo, map: &'a SourceMap) -> Self {
        CodeGen {
            module: Module::new(module_name),
            target,
            type_mapper: TypeMapper::new(),
            scopes: ScopeStack::new(),
            namespaces: NamespaceStack::new(),
            registries: Registries::new(),
            map,
        }
    }

    pub fn offset_of(&self, node: NodeId) -> usize {
        self.map.span_of(node).map(|s| s.start).unwrap_or(0)
    }

    pub fn error_at(&self, node: NodeId, make: impl FnOnce(String) -> CodegenError) -> CodegenError {
        CodegenError::at(self.map, self.offset_of(node), make)
    }
}
