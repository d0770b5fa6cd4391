//! `emberc`: compiler front end and middle end for the Ember language.
//!
//! `compile_file`/`compile_file_with_config` are the crate's public entry
//! points, wiring lexer → parser → codegen → driver together behind a
//! single `Result`. Name resolution happens inline during codegen's
//! two-pass top-level lowering rather than as a separate pass (see
//! `codegen::toplevel`).

pub mod ast;
pub mod backend;
pub mod codegen;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod ident;
pub mod lexer;
pub mod mangle;
pub mod namespace;
pub mod parser;
pub mod registry;
pub mod symbol;
pub mod types;

use crate::config::{CompilerConfig, EmitKind};
use crate::diagnostics::{CompileError, IoError, SourceMap};
use std::path::{Path, PathBuf};

/// What one `compile_file_with_config` call produced.
#[derive(Debug)]
pub enum CompileOutcome {
    /// Emitted artifact paths (object/assembly/textual-IR modes).
    Artifacts(Vec<PathBuf>),
    /// `main`'s return value (JIT mode): the process exit of `main`'s
    /// return.
    JitExit(i32),
}

/// Compile one source file with the default [`CompilerConfig`].
pub fn compile_file(path: &Path) -> Result<CompileOutcome, CompileError> {
    compile_file_with_config(path, &CompilerConfig::default())
}

/// Parse, lower, and emit one translation unit. All per-translation-unit
/// state lives only as long as this call.
pub fn compile_file_with_config(path: &Path, config: &CompilerConfig) -> Result<CompileOutcome, CompileError> {
    let raw = std::fs::read_to_string(path).map_err(|e| IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    let source = strip_bom_and_normalize(&raw);

    let mut map = SourceMap::new(path.to_path_buf(), source.clone());
    let mut parser = parser::Parser::new(&source, &mut map).map_err(|_| CompileError::Parse(1, path.to_path_buf()))?;
    let program = parser.parse_program().map_err(|errors| {
        tracing::error!(count = errors.len(), file = %path.display(), "parse failed");
        CompileError::Parse(errors.len(), path.to_path_buf())
    })?;
    tracing::info!(file = %path.display(), items = program.items.len(), "parsed translation unit");

    let target = match config.target_triple.as_deref() {
        Some(triple) => backend::target::TargetInfo::for_triple(triple, config.reloc_model),
        None => backend::target::TargetInfo::host(config.reloc_model),
    };

    let module_name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("module");
    let mut cg = codegen::CodeGen::new(module_name, target.clone(), &map);
    let start = std::time::Instant::now();
    codegen::lower_program(&mut cg, &program).inspect_err(|e| {
        tracing::error!(error = %e, file = %path.display(), "codegen failed");
    })?;
    tracing::info!(file = %path.display(), elapsed = ?start.elapsed(), "lowered translation unit");

    if config.emit == EmitKind::Jit {
        let driver = driver::Driver::new(target);
        let exit = driver.run_jit(&cg.module)?;
        return Ok(CompileOutcome::JitExit(exit));
    }

    let output_path = config.output_path.clone().unwrap_or_else(|| path.with_extension(""));
    let mut driver = driver::Driver::new(target);
    driver.add_unit(cg.module, output_path);
    let artifacts = driver.emit_all(config)?;
    Ok(CompileOutcome::Artifacts(artifacts))
}

/// Strip an optional UTF-8 BOM and normalize `\r\n` to `\n`.
fn strip_bom_and_normalize(source: &str) -> String {
    source.strip_prefix('\u{feff}').unwrap_or(source).replace("\r\n", "\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_bom_and_normalizes_line_endings() {
        let with_bom = "\u{feff}func main() -> i32 {\r\n  ret 0;\r\n}\r\n";
        let cleaned = strip_bom_and_normalize(with_bom);
        assert!(!cleaned.starts_with('\u{feff}'));
        assert!(!cleaned.contains('\r'));
    }
}
