//! The single error kind every pipeline stage reports through.
//!
//! One kind, three fields: a message, an optional `(line, col)` position, and an optional
//! source path. Lexer, parser, resolver, checker, optimizer, compiler, container codec and VM
//! all raise the same `Diagnostic` so callers never need to match on a stage-specific error type.

use std::fmt;

/// A single error value carrying a message, an optional position, and an optional source path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub line: Option<usize>,
    pub col: Option<usize>,
    pub path: Option<String>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            line: None,
            col: None,
            path: None,
        }
    }

    pub fn at(message: impl Into<String>, line: usize, col: usize) -> Self {
        Diagnostic {
            message: message.into(),
            line: Some(line),
            col: Some(col),
            path: None,
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut location = String::new();
        if let Some(path) = &self.path {
            location.push_str(path);
        }
        if let Some(line) = self.line {
            location.push_str(&format!(":{line}"));
            if let Some(col) = self.col {
                location.push_str(&format!(":{col}"));
            }
        }
        if location.is_empty() {
            write!(f, "ошибка: {}", self.message)
        } else {
            write!(f, "{location}: ошибка: {}", self.message)
        }
    }
}

impl std::error::Error for Diagnostic {}

/// Crate-wide result alias used by every pipeline stage.
pub type Result<T> = std::result::Result<T, Diagnostic>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_without_location() {
        let d = Diagnostic::new("oops");
        assert_eq!(d.to_string(), "ошибка: oops");
    }

    #[test]
    fn display_with_full_location() {
        let d = Diagnostic::at("oops", 3, 7).with_path("a.яс");
        assert_eq!(d.to_string(), "a.яс:3:7: ошибка: oops");
    }

    #[test]
    fn display_with_path_only() {
        let mut d = Diagnostic::new("oops");
        d.path = Some("a.яс".to_string());
        assert_eq!(d.to_string(), "a.яс: ошибка: oops");
    }
}
