//! Compiler configuration.
//!
//! A plain struct with `Default` plus `with_*` builder methods, populated by
//! the CLI layer and passed down into the compile entry point rather than
//! read from a config file — Ember has no project-level config file format.

use crate::backend::target::{OptLevel, RelocModel};
use std::path::PathBuf;

/// What [`crate::driver::Driver`] should produce from a compiled module:
/// textual IR, assembly, a linked object file, or a JIT run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitKind {
    TextualIr,
    Assembly,
    Object,
    Jit,
}

/// One `compile_file`/`compile_file_with_config` call's tunables.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    pub emit: EmitKind,
    pub opt_level: OptLevel,
    pub target_triple: Option<String>,
    pub reloc_model: RelocModel,
    /// Output path template; the driver fills in per-artifact extensions.
    pub output_path: Option<PathBuf>,
    /// Search paths for `import` resolution.
    pub search_paths: Vec<PathBuf>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            emit: EmitKind::Object,
            opt_level: OptLevel(0),
            target_triple: None,
            reloc_model: RelocModel::Pic,
            output_path: None,
            search_paths: Vec::new(),
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    pub fn with_emit(mut self, emit: EmitKind) -> Self {
        self.emit = emit;
        self
    }

    pub fn with_opt_level(mut self, level: u8) -> Self {
        self.opt_level = OptLevel(level);
        self
    }

    pub fn with_target_triple(mut self, triple: impl Into<String>) -> Self {
        self.target_triple = Some(triple.into());
        self
    }

    pub fn with_reloc_model(mut self, model: RelocModel) -> Self {
        self.reloc_model = model;
        self
    }

    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_emits_object_at_opt_zero() {
        let cfg = CompilerConfig::default();
        assert_eq!(cfg.emit, EmitKind::Object);
        assert_eq!(cfg.opt_level, OptLevel(0));
    }

    #[test]
    fn builder_methods_chain() {
        let cfg = CompilerConfig::new()
            .with_emit(EmitKind::Jit)
            .with_opt_level(2)
            .with_target_triple("x86_64-unknown-linux-gnu")
            .with_search_path("/usr/include/ember");
        assert_eq!(cfg.emit, EmitKind::Jit);
        assert_eq!(cfg.opt_level, OptLevel(2));
        assert_eq!(cfg.target_triple.as_deref(), Some("x86_64-unknown-linux-gnu"));
        assert_eq!(cfg.search_paths.len(), 1);
    }
}
