//! The `Context`/`Module` pair of the back-end contract.
//!
//! Accumulates declarations, globals, and function bodies across typed
//! fields rather than one flat buffer, so [`crate::driver::Driver`] can
//! append target metadata (`backend::target::TargetInfo`) before rendering.

use crate::backend::builder::FunctionValue;
use crate::backend::target::TargetInfo;
use std::fmt::Write as _;

/// One compiled translation unit's accumulated IR, analogous to an LLVM
/// `Module` owned by a `Context`.
#[derive(Debug, Default)]
pub struct Module {
    pub name: String,
    declarations: Vec<String>,
    globals: Vec<String>,
    functions: Vec<(FunctionValue, String)>,
    next_global: u32,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn declare(&mut self, decl: impl Into<String>) {
        let decl = decl.into();
        if !self.declarations.contains(&decl) {
            self.declarations.push(decl);
        }
    }

    /// Emit a fresh global constant (e.g. a string literal) and return its
    /// `@`-prefixed name.
    pub fn add_global(&mut self, definition_without_name: &str) -> String {
        let name = format!("@.str.{}", self.next_global);
        self.next_global += 1;
        self.globals.push(format!("{name} = {definition_without_name}"));
        name
    }

    pub fn add_function(&mut self, handle: FunctionValue, body: String) {
        self.functions.push((handle, body));
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.iter().any(|(f, _)| f.name == name)
    }

    /// Render the final textual IR — the input format [`crate::backend::jit`]
    /// and object/asm emission both shell out to `clang` with.
    pub fn render(&self, target: &TargetInfo) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "; ModuleID = '{}'", self.name);
        let _ = writeln!(out, "target datalayout = \"{}\"", target.data_layout);
        let _ = writeln!(out, "target triple = \"{}\"", target.triple);
        out.push('\n');
        for g in &self.globals {
            let _ = writeln!(out, "{g}");
        }
        if !self.globals.is_empty() {
            out.push('\n');
        }
        for d in &self.declarations {
            let _ = writeln!(out, "{d}");
        }
        if !self.declarations.is_empty() {
            out.push('\n');
        }
        for (handle, body) in &self.functions {
            let linkage = if handle.external { "" } else { "internal " };
            let params = handle.param_ir_types.join(", ");
            let _ = writeln!(
                out,
                "define {linkage}{} @{}({params}) {{",
                handle.return_ir_type, handle.name
            );
            out.push_str(body);
            let _ = writeln!(out, "}}\n");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::target::{RelocModel, TargetInfo};

    #[test]
    fn declare_is_deduplicated() {
        let mut m = Module::new("t");
        m.declare("declare ptr @malloc(i64)");
        m.declare("declare ptr @malloc(i64)");
        let target = TargetInfo::host(RelocModel::Static);
        let rendered = m.render(&target);
        assert_eq!(rendered.matches("declare ptr @malloc").count(), 1);
    }

    #[test]
    fn globals_get_unique_names() {
        let mut m = Module::new("t");
        let a = m.add_global("constant [1 x i8] zeroinitializer");
        let b = m.add_global("constant [1 x i8] zeroinitializer");
        assert_ne!(a, b);
    }
}
