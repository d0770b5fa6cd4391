//! Target machine selection: a factory producing a data layout for the
//! selected triple, plus relocation model, with an explicit override over
//! host-triple detection.

use std::fmt;

/// Relocation model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocModel {
    Static,
    Pic,
}

impl fmt::Display for RelocModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelocModel::Static => write!(f, "static"),
            RelocModel::Pic => write!(f, "pic"),
        }
    }
}

/// The resolved target triple, data layout, and relocation model for one
/// compilation.
#[derive(Debug, Clone)]
pub struct TargetInfo {
    pub triple: String,
    pub data_layout: String,
    pub reloc_model: RelocModel,
}

impl TargetInfo {
    /// Detect the host triple.
    pub fn host(reloc_model: RelocModel) -> Self {
        TargetInfo::for_triple(&Self::host_triple(), reloc_model)
    }

    pub fn for_triple(triple: &str, reloc_model: RelocModel) -> Self {
        TargetInfo {
            triple: triple.to_string(),
            data_layout: Self::data_layout_for(triple),
            reloc_model,
        }
    }

    fn host_triple() -> String {
        #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
        {
            "arm64-apple-macosx".to_string()
        }
        #[cfg(all(target_os = "macos", target_arch = "x86_64"))]
        {
            "x86_64-apple-macosx".to_string()
        }
        #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
        {
            "x86_64-unknown-linux-gnu".to_string()
        }
        #[cfg(all(target_os = "linux", target_arch = "aarch64"))]
        {
            "aarch64-unknown-linux-gnu".to_string()
        }
        #[cfg(not(any(
            all(target_os = "macos", target_arch = "aarch64"),
            all(target_os = "macos", target_arch = "x86_64"),
            all(target_os = "linux", target_arch = "x86_64"),
            all(target_os = "linux", target_arch = "aarch64"),
        )))]
        {
            "x86_64-unknown-linux-gnu".to_string()
        }
    }

    /// A minimal LLVM data-layout string per target family. Real precision
    /// isn't needed here: the back end proper (`clang`/`llc`, see
    /// `backend::jit`) recomputes its own authoritative layout; this one
    /// only has to be well-formed enough for `clang` to accept the module.
    fn data_layout_for(triple: &str) -> String {
        if triple.contains("apple") {
            "e-m:o-i64:64-i128:128-n32:64-S128".to_string()
        } else {
            "e-m:e-p270:32:32-p271:32:32-p272:64:64-i64:64-i128:128-n32:64-S128".to_string()
        }
    }

    /// The `-relocation-model=` style flag the `clang` subprocess in
    /// [`crate::backend::jit`] and [`crate::driver`] pass through.
    pub fn clang_reloc_flag(&self) -> &'static str {
        match self.reloc_model {
            RelocModel::Static => "-fno-pic",
            RelocModel::Pic => "-fpic",
        }
    }
}

/// Optimization level, CLI flag "optimization level 0-3". Deferred entirely
/// to the `clang` subprocess's own `-O{level}` at the link step rather than
/// running any passes in-process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct OptLevel(pub u8);

impl OptLevel {
    pub fn clang_flag(self) -> String {
        format!("-O{}", self.0.min(3))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reloc_flags_differ() {
        let static_t = TargetInfo::for_triple("x86_64-unknown-linux-gnu", RelocModel::Static);
        let pic_t = TargetInfo::for_triple("x86_64-unknown-linux-gnu", RelocModel::Pic);
        assert_ne!(static_t.clang_reloc_flag(), pic_t.clang_reloc_flag());
    }

    #[test]
    fn opt_level_clamped_to_3() {
        assert_eq!(OptLevel(9).clang_flag(), "-O3");
    }
}
