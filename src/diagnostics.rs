//! Diagnostics: source position recovery and the error taxonomy.
//!
//! Formats `path:line:col: message` at every fallible boundary, centralized
//! in one place instead of re-deriving the format string at each call site,
//! and keeps a side table from node identity to source range rather than
//! inlining a position into every AST node.

use std::fmt;
use std::path::PathBuf;

/// A half-open byte range into the original source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
}

impl SourceSpan {
    pub fn new(start: usize, end: usize) -> Self {
        SourceSpan { start, end }
    }
}

/// Stable integer identity assigned to AST nodes at parse time, used as the
/// key into [`SourceMap`] rather than embedding a span in every node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// A recovered 1-based line/column plus the source line text, ready to
/// render a caret diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineCol {
    pub line: usize,
    pub column: usize,
    pub line_text: String,
}

/// Side table mapping node identity to source ranges, and source ranges to
/// recovered line/column/text. One per translation unit.
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    file: PathBuf,
    source: String,
    /// Byte offset of the start of each line (line 0 starts at offset 0).
    line_starts: Vec<usize>,
    spans: Vec<Option<SourceSpan>>,
}

impl SourceMap {
    pub fn new(file: PathBuf, source: String) -> Self {
        let mut line_starts = vec![0];
        for (i, c) in source.char_indices() {
            if c == '\n' {
                line_starts.push(i + 1);
            }
        }
        SourceMap {
            file,
            source,
            line_starts,
            spans: Vec::new(),
        }
    }

    pub fn file(&self) -> &PathBuf {
        &self.file
    }

    /// Allocate a fresh [`NodeId`] and record its span.
    pub fn intern(&mut self, span: SourceSpan) -> NodeId {
        let id = NodeId(self.spans.len() as u32);
        self.spans.push(Some(span));
        id
    }

    pub fn span_of(&self, id: NodeId) -> Option<SourceSpan> {
        self.spans.get(id.0 as usize).copied().flatten()
    }

    /// Recover 1-based line/column and the source line text for a byte
    /// offset, used to render diagnostics.
    pub fn resolve(&self, offset: usize) -> LineCol {
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let line_start = self.line_starts[line_idx];
        let line_end = self
            .line_starts
            .get(line_idx + 1)
            .map(|&s| s.saturating_sub(1))
            .unwrap_or(self.source.len());
        let column = self.source[line_start..offset.min(self.source.len())]
            .chars()
            .count()
            + 1;
        let line_text = self.source[line_start..line_end.max(line_start)].to_string();
        LineCol {
            line: line_idx + 1,
            column,
            line_text,
        }
    }

    pub fn resolve_node(&self, id: NodeId) -> Option<LineCol> {
        self.span_of(id).map(|s| self.resolve(s.start))
    }

    /// Render a `file:line:col` prefix plus a caret-annotated source
    /// excerpt, the shape requires for `CodegenError`.
    pub fn render(&self, offset: usize) -> String {
        let lc = self.resolve(offset);
        let caret_pad = " ".repeat(lc.column.saturating_sub(1));
        format!(
            "{}:{}:{}\n  {}\n  {}^",
            self.file.display(),
            lc.line,
            lc.column,
            lc.line_text,
            caret_pad
        )
    }
}

/// A recoverable syntax error: a failed expectation at a source offset.
/// The parser batches these — recoverable via synchronization, counted,
/// surfaced at end of parse — rather than aborting immediately, and rather
/// than tallying them in a process-global counter.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{rendered}")]
pub struct ParseError {
    pub offset: usize,
    pub message: String,
    pub rendered: String,
}

impl ParseError {
    pub fn new(map: &SourceMap, offset: usize, message: impl Into<String>) -> Self {
        let message = message.into();
        let rendered = format!("{}: {}", map.render(offset), message);
        ParseError {
            offset,
            message,
            rendered,
        }
    }
}

/// Semantic/lowering errors. Immediately raised: lowering aborts the
/// current translation unit on the first one.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CodegenError {
    #[error("{0}")]
    TypeMismatch(String),
    #[error("{0}")]
    UnknownName(String),
    #[error("{0}")]
    Redefinition(String),
    #[error("{0}")]
    InvalidCast(String),
    #[error("{0}")]
    NotAssignable(String),
    #[error("{0}")]
    ArityMismatch(String),
    #[error("{0}")]
    UnknownOperator(String),
    #[error("{0}")]
    IncompleteType(String),
    #[error("{0}")]
    TemplateInstantiation(String),
}

impl CodegenError {
    /// Wrap a bare message with the `file:line:col` + caret excerpt every
    /// `CodegenError` constructor needs.
    pub fn at(map: &SourceMap, offset: usize, make: impl FnOnce(String) -> CodegenError) -> Self {
        make(map.render(offset))
    }
}

/// Back-end verification/emission/JIT failures. Non-recoverable for the
/// current translation unit.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend verification failed: {0}")]
    Verification(String),
    #[error("backend emission failed: {0}")]
    Emit(String),
    #[error("JIT symbol lookup failed: {0}")]
    JitLookup(String),
}

/// File I/O failures, surfaced to the driver.
#[derive(Debug, thiserror::Error)]
#[error("I/O error: {path}: {source}")]
pub struct IoError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// The unified error type threaded through one `compile` call.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("{0} parse error(s) in {1}")]
    Parse(usize, PathBuf),
    #[error(transparent)]
    Codegen(#[from] CodegenError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Io(#[from] IoError),
}

impl CompileError {
    /// Exit code: non-zero on parse failure, type/name
    /// error, back-end verification failure, or I/O error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CompileError::Parse(_, _) => 1,
            CompileError::Codegen(_) => 2,
            CompileError::Backend(_) => 3,
            CompileError::Io(_) => 4,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_first_line_first_column() {
        let map = SourceMap::new(PathBuf::from("t.em"), "func main()".to_string());
        let lc = map.resolve(0);
        assert_eq!(lc.line, 1);
        assert_eq!(lc.column, 1);
    }

    #[test]
    fn resolves_second_line() {
        let src = "line one\nline two\n";
        let map = SourceMap::new(PathBuf::from("t.em"), src.to_string());
        let lc = map.resolve(9); // 'l' of "line two"
        assert_eq!(lc.line, 2);
        assert_eq!(lc.column, 1);
        assert_eq!(lc.line_text, "line two");
    }

    #[test]
    fn intern_and_lookup_round_trips() {
        let mut map = SourceMap::new(PathBuf::from("t.em"), "abc".to_string());
        let id = map.intern(SourceSpan::new(0, 3));
        assert_eq!(map.span_of(id), Some(SourceSpan::new(0, 3)));
    }

    #[test]
    fn parse_error_message_has_caret() {
        let map = SourceMap::new(PathBuf::from("t.em"), "func main( {".to_string());
        let err = ParseError::new(&map, 11, "expected ')'");
        assert!(err.rendered.contains("expected ')'"));
        assert!(err.rendered.contains('^'));
    }
}
