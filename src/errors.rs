//! Driver error types
//!
//! Two layers mirror the compilation pipeline: the lexer and parser report
//! `SyntaxError`/`ParseError` with source positions, and everything at or
//! above the object table reports `RuntimeError`, a structured record with
//! an error kind, a message, and optional object/source context.

use std::fmt;

use thiserror::Error;

/// Lexical error with the position of the offending byte.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("SyntaxError at {line}:{col}: {reason}")]
pub struct SyntaxError {
    pub line: usize,
    pub col: usize,
    pub reason: String,
}

impl SyntaxError {
    pub fn new(line: usize, col: usize, reason: impl Into<String>) -> Self {
        SyntaxError {
            line,
            col,
            reason: reason.into(),
        }
    }
}

/// Parse error with the token that broke the grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ParseError in {file} at line {line}: {reason} (near `{token}`)")]
pub struct ParseError {
    pub file: String,
    pub line: usize,
    pub reason: String,
    pub token: String,
}

impl ParseError {
    pub fn new(line: usize, reason: impl Into<String>, token: impl Into<String>) -> Self {
        ParseError {
            file: String::new(),
            line,
            reason: reason.into(),
            token: token.into(),
        }
    }

    pub fn in_file(mut self, file: &str) -> Self {
        self.file = file.to_string();
        self
    }
}

/// The closed set of error kinds the runtime surfaces to scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    Parse,
    Path,
    Type,
    Arith,
    Index,
    EvalBudgetExceeded,
    Load,
    Io,
    Assert,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ErrorKind::Syntax => "SyntaxError",
            ErrorKind::Parse => "ParseError",
            ErrorKind::Path => "PathError",
            ErrorKind::Type => "TypeError",
            ErrorKind::Arith => "ArithError",
            ErrorKind::Index => "IndexError",
            ErrorKind::EvalBudgetExceeded => "EvalBudgetExceeded",
            ErrorKind::Load => "LoadError",
            ErrorKind::Io => "IOError",
            ErrorKind::Assert => "AssertError",
        };
        write!(f, "{}", name)
    }
}

/// Structured runtime error: `{kind, message, object_id?, source_path?, line?}`.
///
/// Errors in a command dispatch abort the dispatch chain; the initiating
/// interactive object receives the rendering from [`RuntimeError::render`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub message: String,
    pub object_id: Option<String>,
    pub source_path: Option<String>,
    pub line: Option<usize>,
}

impl RuntimeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        RuntimeError {
            kind,
            message: message.into(),
            object_id: None,
            source_path: None,
            line: None,
        }
    }

    pub fn path(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Path, message)
    }

    pub fn typed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type, message)
    }

    pub fn arith(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Arith, message)
    }

    pub fn index(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Index, message)
    }

    pub fn budget() -> Self {
        Self::new(
            ErrorKind::EvalBudgetExceeded,
            "instruction budget exceeded",
        )
    }

    pub fn load(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Load, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn assert(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Assert, message)
    }

    pub fn at_object(mut self, id: &str) -> Self {
        self.object_id = Some(id.to_string());
        self
    }

    pub fn at_source(mut self, path: &str) -> Self {
        self.source_path = Some(path.to_string());
        self
    }

    /// The concise rendering delivered to the initiating interactive object.
    pub fn render(&self) -> String {
        format!("Error: {}: {}", self.kind, self.message)
    }
}

impl From<SyntaxError> for RuntimeError {
    fn from(e: SyntaxError) -> Self {
        let mut err = RuntimeError::new(ErrorKind::Syntax, e.reason.clone());
        err.line = Some(e.line);
        err
    }
}

impl From<ParseError> for RuntimeError {
    fn from(e: ParseError) -> Self {
        let mut err = RuntimeError::new(ErrorKind::Parse, e.reason.clone());
        err.line = Some(e.line);
        if !e.file.is_empty() {
            err.source_path = Some(e.file.clone());
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_format() {
        let err = RuntimeError::arith("division by zero");
        assert_eq!(err.render(), "Error: ArithError: division by zero");
    }

    #[test]
    fn test_syntax_error_conversion_keeps_line() {
        let syn = SyntaxError::new(12, 3, "unterminated string");
        let err: RuntimeError = syn.into();
        assert_eq!(err.kind, ErrorKind::Syntax);
        assert_eq!(err.line, Some(12));
    }

    #[test]
    fn test_context_builders() {
        let err = RuntimeError::load("parent failed")
            .at_object("/std/object#3")
            .at_source("/std/object");
        assert_eq!(err.object_id.as_deref(), Some("/std/object#3"));
        assert_eq!(err.source_path.as_deref(), Some("/std/object"));
    }
}
