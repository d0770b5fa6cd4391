//! Declarations for the small set of C runtime functions `new`/`delete`
//! lower to.
//!
//! One table, declared once per translation unit and deduplicated by
//! `Module::declare`, covering the two allocator entry points `new`/`delete`
//! need.

/// LLVM declarations for the allocator functions backing `new`/`delete`.
pub const ALLOC_DECLARATIONS: &[&str] = &[
    "declare ptr @malloc(i64)",
    "declare void @free(ptr)",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declares_malloc_and_free() {
        assert!(ALLOC_DECLARATIONS.iter().any(|d| d.contains("@malloc")));
        assert!(ALLOC_DECLARATIONS.iter().any(|d| d.contains("@free")));
    }
}
