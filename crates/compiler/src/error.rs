//! Compiler diagnostics.
//!
//! Errors are fatal and abort the compilation unit; warnings are collected
//! and surfaced next to successful output without ever changing the emitted
//! bytecode.

use std::fmt;

/// A location in the compiled source, 1-based line and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePos {
    pub line: u32,
    pub col: u32,
    pub offset: usize,
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Classification of a fatal diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    Type,
    Name,
    Mutability,
    Inheritance,
    Assets,
    Return,
    Internal,
}

/// A fatal compilation error. The message is stable; the optional position
/// and snippet add context for syntax errors.
#[derive(Debug, Clone)]
pub struct CompilerError {
    pub kind: ErrorKind,
    pub message: String,
    pub position: Option<SourcePos>,
    pub snippet: Option<String>,
}

impl std::error::Error for CompilerError {}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(pos) = self.position {
            write!(f, "\n  --> {pos}")?;
        }
        if let Some(snippet) = &self.snippet {
            write!(f, "\n{snippet}")?;
        }
        Ok(())
    }
}

impl CompilerError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), position: None, snippet: None }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, message)
    }

    /// A syntax error pointing at `pos`, with the offending line and a
    /// caret rendered from `source`.
    pub fn syntax_at(message: impl Into<String>, pos: SourcePos, source: &str) -> Self {
        let snippet = render_snippet(source, pos);
        Self { kind: ErrorKind::Syntax, message: message.into(), position: Some(pos), snippet }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type, message)
    }

    pub fn name(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Name, message)
    }

    pub fn mutability(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Mutability, message)
    }

    pub fn inheritance(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Inheritance, message)
    }

    pub fn assets(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Assets, message)
    }

    pub fn invalid_return(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Return, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn at(mut self, pos: SourcePos) -> Self {
        self.position = Some(pos);
        self
    }
}

fn render_snippet(source: &str, pos: SourcePos) -> Option<String> {
    let line = source.lines().nth(pos.line.checked_sub(1)? as usize)?;
    let gutter = pos.line.to_string();
    let pad = " ".repeat(gutter.len());
    let caret_pad = " ".repeat(pos.col.saturating_sub(1) as usize);
    Some(format!("{pad} |\n{gutter} | {line}\n{pad} | {caret_pad}^"))
}

pub type Result<T, E = CompilerError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_points_at_column() {
        let source = "Contract Foo() {\n  fn foo() -> {\n}\n";
        let err = CompilerError::syntax_at(
            "Expected a type, got \"{\"",
            SourcePos { line: 2, col: 15, offset: 31 },
            source,
        );
        let rendered = err.to_string();
        assert!(rendered.starts_with("Expected a type"));
        assert!(rendered.contains("--> 2:15"));
        assert!(rendered.contains("fn foo() -> {"));
        assert!(rendered.lines().last().unwrap().ends_with('^'));
    }
}
