//! The driver: owns `(module, output-path)` pairs and drives emission.
//!
//! Reads source, runs the pipeline, then shells out to `clang` once per
//! translation unit to produce an artifact. Covers four emission modes
//! (object, assembly, textual IR, JIT) and keeps a list of queued units
//! instead of compiling-and-linking in one step, so a caller can batch
//! several translation units before emitting.

use crate::backend::jit::Jit;
use crate::backend::module::Module;
use crate::backend::target::TargetInfo;
use crate::config::{CompilerConfig, EmitKind};
use crate::diagnostics::BackendError;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Queues compiled modules against their intended output paths and emits
/// them per a shared [`CompilerConfig`].
pub struct Driver {
    units: Vec<(Module, PathBuf)>,
    target: TargetInfo,
}

impl Driver {
    pub fn new(target: TargetInfo) -> Self {
        Driver {
            units: Vec::new(),
            target,
        }
    }

    pub fn add_unit(&mut self, module: Module, output_path: PathBuf) {
        self.units.push((module, output_path));
    }

    pub fn target(&self) -> &TargetInfo {
        &self.target
    }

    /// Emit every queued unit per `config.emit`, returning the produced
    /// artifact paths.
    pub fn emit_all(&self, config: &CompilerConfig) -> Result<Vec<PathBuf>, BackendError> {
        self.units.iter().map(|(module, path)| self.emit_one(module, path, config)).collect()
    }

    fn emit_one(&self, module: &Module, output_path: &Path, config: &CompilerConfig) -> Result<PathBuf, BackendError> {
        let rendered = module.render(&self.target);
        match config.emit {
            EmitKind::TextualIr => {
                let path = output_path.with_extension("ll");
                write_file(&path, &rendered)?;
                Ok(path)
            }
            EmitKind::Assembly => {
                let ir_path = output_path.with_extension("ll");
                write_file(&ir_path, &rendered)?;
                let path = output_path.with_extension("s");
                run_clang("-S", &path, &ir_path, &self.target, config)?;
                Ok(path)
            }
            EmitKind::Object => {
                let ir_path = output_path.with_extension("ll");
                write_file(&ir_path, &rendered)?;
                let path = output_path.with_extension("o");
                run_clang("-c", &path, &ir_path, &self.target, config)?;
                Ok(path)
            }
            EmitKind::Jit => {
                let path = output_path.with_extension("ll");
                write_file(&path, &rendered)?;
                Ok(path)
            }
        }
    }

    /// JIT mode: move `module` into an execution engine and invoke `main`,
    /// returning its integer result.
    pub fn run_jit(&self, module: &Module) -> Result<i32, BackendError> {
        let jit = Jit::add_module(module, &self.target)?;
        jit.run_main()
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), BackendError> {
    std::fs::write(path, contents).map_err(|e| BackendError::Emit(format!("could not write {}: {e}", path.display())))
}

fn run_clang(
    mode_flag: &str,
    output: &Path,
    ir_path: &Path,
    target: &TargetInfo,
    config: &CompilerConfig,
) -> Result<(), BackendError> {
    let mut cmd = Command::new("clang");
    cmd.arg(mode_flag)
        .arg(target.clang_reloc_flag())
        .arg(config.opt_level.clang_flag())
        .arg("-o")
        .arg(output)
        .arg(ir_path);
    if let Some(triple) = &config.target_triple {
        cmd.arg(format!("--target={triple}"));
    }
    let result = cmd
        .output()
        .map_err(|e| BackendError::Emit(format!("failed to invoke clang: {e}")))?;
    if !result.status.success() {
        return Err(BackendError::Emit(format!(
            "clang failed:\n{}",
            String::from_utf8_lossy(&result.stderr)
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::target::RelocModel;

    #[test]
    fn textual_ir_emission_writes_rendered_module() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = Driver::new(TargetInfo::host(RelocModel::Pic));
        driver.add_unit(Module::new("t"), dir.path().join("t"));
        let config = CompilerConfig::new().with_emit(EmitKind::TextualIr);
        let outputs = driver.emit_all(&config).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].extension().unwrap(), "ll");
        assert!(std::fs::read_to_string(&outputs[0]).unwrap().contains("ModuleID"));
    }
}
