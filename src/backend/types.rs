//! Type → back-end type mapping, memoized per translation unit. Injective
//! within a translation unit: distinct source types never collapse onto the
//! same IR type text, matching how a real LLVM `Context`'s type-interning
//! table behaves.

use crate::types::{BuiltinKind, Type};
use std::collections::HashMap;

/// Maps [`Type`] to LLVM IR type syntax (e.g. `i32`, `ptr`, `[4 x i32]`),
/// caching the result so repeated lookups of the same `Type` are injective
/// and cheap.
#[derive(Debug, Default)]
pub struct TypeMapper {
    cache: HashMap<Type, String>,
}

impl TypeMapper {
    pub fn new() -> Self {
        TypeMapper::default()
    }

    pub fn map(&mut self, ty: &Type) -> String {
        if let Some(cached) = self.cache.get(ty) {
            return cached.clone();
        }
        let text = Self::lower(ty);
        self.cache.insert(ty.clone(), text.clone());
        text
    }

    fn lower(ty: &Type) -> String {
        match ty {
            Type::Builtin(BuiltinKind::Void) => "void".to_string(),
            // Booleans are always 8-bit in IR.
            Type::Builtin(BuiltinKind::Bool) => "i8".to_string(),
            Type::Builtin(b) if b.is_integer() => format!("i{}", b.bit_width()),
            Type::Builtin(BuiltinKind::F32) => "float".to_string(),
            Type::Builtin(BuiltinKind::F64) => "double".to_string(),
            Type::Builtin(_) => unreachable!("exhaustive over BuiltinKind"),
            // Opaque pointers: classes/unions are always accessed through a
            // pointer in IR (LLVM 15+ opaque-pointer convention).
            Type::UserDefined(_) | Type::UserDefinedTemplate { .. } => "ptr".to_string(),
            Type::Array { element, size } => {
                format!("[{size} x {}]", Self::lower(element))
            }
            Type::Pointer { .. } => "ptr".to_string(),
            Type::Reference(_) => "ptr".to_string(),
        }
    }

    /// Size in bytes, used by `sizeof` lowering and by union layout.
    /// Pointers and references are always the platform pointer width; we
    /// target 64-bit hosts exclusively; `Void` has size 0.
    pub fn size_of(ty: &Type) -> u64 {
        match ty {
            Type::Builtin(BuiltinKind::Void) => 0,
            Type::Builtin(b) => (b.bit_width() as u64).div_ceil(8),
            Type::UserDefined(_) | Type::UserDefinedTemplate { .. } => 8, // opaque handle width
            Type::Array { element, size } => Self::size_of(element) * size,
            Type::Pointer { .. } | Type::Reference(_) => 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_maps_to_8_bit() {
        let mut m = TypeMapper::new();
        assert_eq!(m.map(&Type::bool()), "i8");
    }

    #[test]
    fn array_maps_to_sized_array_syntax() {
        let mut m = TypeMapper::new();
        let t = Type::Array {
            element: Box::new(Type::i32()),
            size: 4,
        };
        assert_eq!(m.map(&t), "[4 x i32]");
    }

    #[test]
    fn mapping_is_memoized() {
        let mut m = TypeMapper::new();
        let t = Type::i32();
        let a = m.map(&t);
        let b = m.map(&t);
        assert_eq!(a, b);
        assert_eq!(m.cache.len(), 1);
    }

    #[test]
    fn size_of_array_multiplies_element_by_len() {
        let t = Type::Array {
            element: Box::new(Type::Builtin(BuiltinKind::I64)),
            size: 3,
        };
        assert_eq!(TypeMapper::size_of(&t), 24);
    }
}
