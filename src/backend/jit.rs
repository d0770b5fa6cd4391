//! JIT execution environment: `add_module(module, context)` and
//! `lookup(symbol)` returning a raw function address.
//!
//! Hands the textual IR to the system `clang`, asking it for a shared
//! object instead of an executable, then `dlopen`s it — the textual-IR
//! equivalent of `add_module` followed by `lookup`.

use crate::backend::module::Module;
use crate::backend::target::TargetInfo;
use crate::diagnostics::BackendError;
use libloading::{Library, Symbol};
use std::io::Write;
use std::process::Command;
use tempfile::TempDir;

/// Moves a rendered [`Module`] into an execution engine. Per ,
/// this move "invalidates further lowering" of that module — there is no
/// API here to mutate a module once it has been handed to [`Jit::add_module`].
pub struct Jit {
    _workdir: TempDir,
    library: Library,
}

impl Jit {
    /// Compile `module` to a temporary shared object via `clang` and load
    /// it. Mirrors `add_module(module, context)`.
    pub fn add_module(module: &Module, target: &TargetInfo) -> Result<Self, BackendError> {
        let workdir = tempfile::tempdir()
            .map_err(|e| BackendError::Emit(format!("could not create temp dir: {e}")))?;
        let ir_path = workdir.path().join("module.ll");
        let so_path = workdir.path().join("module.so");

        let rendered = module.render(target);
        let mut f = std::fs::File::create(&ir_path)
            .map_err(|e| BackendError::Emit(format!("could not write {}: {e}", ir_path.display())))?;
        f.write_all(rendered.as_bytes())
            .map_err(|e| BackendError::Emit(format!("could not write {}: {e}", ir_path.display())))?;

        let output = Command::new("clang")
            .arg("-shared")
            .arg(target.clang_reloc_flag())
            .arg("-o")
            .arg(&so_path)
            .arg(&ir_path)
            .output()
            .map_err(|e| BackendError::Emit(format!("failed to invoke clang: {e}")))?;
        if !output.status.success() {
            return Err(BackendError::Emit(format!(
                "clang failed:\n{}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        // SAFETY: `so_path` was just produced by `clang` from IR this
        // process generated; no untrusted input reaches `dlopen` here.
        let library = unsafe { Library::new(&so_path) }
            .map_err(|e| BackendError::JitLookup(format!("dlopen failed: {e}")))?;

        Ok(Jit {
            _workdir: workdir,
            library,
        })
    }

    /// Resolve a symbol's address`).
    ///
    /// # Safety
    /// The caller must ensure `T` matches the actual signature of the
    /// symbol named `name` in the loaded module.
    pub unsafe fn lookup<T>(&self, name: &str) -> Result<Symbol<'_, T>, BackendError> {
        unsafe {
            self.library
                .get(name.as_bytes())
                .map_err(|e| BackendError::JitLookup(format!("symbol '{name}' not found: {e}")))
        }
    }

    /// Run `main` and return its `i32` exit value.
    pub fn run_main(&self) -> Result<i32, BackendError> {
        let main_fn: Symbol<unsafe extern "C" fn() -> i32> = unsafe { self.lookup("main")? };
        Ok(unsafe { main_fn() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::builder::FunctionValue;

    fn clang_available() -> bool {
        Command::new("clang")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[test]
    fn jit_runs_constant_returning_main() {
        if !clang_available() {
            eprintln!("skipping: clang not available in this environment");
            return;
        }
        let mut module = Module::new("jit_test");
        module.add_function(
            FunctionValue {
                name: "main".to_string(),
                param_ir_types: vec![],
                return_ir_type: "i32".to_string(),
                external: true,
                variadic: false,
            },
            "entry:\n  ret i32 42\n".to_string(),
        );
        let target = crate::backend::target::TargetInfo::host(crate::backend::target::RelocModel::Pic);
        let jit = Jit::add_module(&module, &target).expect("jit compile");
        assert_eq!(jit.run_main().unwrap(), 42);
    }
}
