//! Error types with source location tracking.
//!
//! All recoverable errors in the pawc pipeline carry a [`Span`] indicating
//! where in the source the problem sits. Components that know their file
//! convert a [`CompileError`] into a full [`Diagnostic`](crate::Diagnostic)
//! when reporting; internally the pipeline just threads `Result<T>`.
//!
//! # Example
//!
//! ```
//! use pawc_base::{CompileError, Span, Result};
//!
//! fn parse_width(s: &str) -> Result<u32> {
//!     s.parse().map_err(|_| CompileError::new(
//!         format!("invalid integer width '{}'", s),
//!         Span::new(1, 1),
//!     ))
//! }
//!
//! assert!(parse_width("i32").is_err());
//! ```

use crate::span::Span;
use std::fmt;

/// An error annotated with its source location.
///
/// Implements [`std::error::Error`] and [`fmt::Display`]. The display format
/// is `{message} at {line}:{column}`.
#[derive(Debug, Clone)]
pub struct CompileError {
    /// Human-readable error description.
    pub message: String,
    /// Location in source where the error occurred.
    pub span: Span,
    /// Optional follow-up hints, rendered as `= help:` lines.
    pub hints: Vec<String>,
}

impl CompileError {
    /// Creates an error with the given message and source location.
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            hints: Vec::new(),
        }
    }

    /// Attaches a `help:` hint to the error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.span)
    }
}

impl std::error::Error for CompileError {}

/// Alias for `std::result::Result<T, CompileError>`.
pub type Result<T> = std::result::Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_error_display_includes_position() {
        let err = CompileError::new("unknown type 'Vec'", Span::new(4, 17));
        let display = err.to_string();
        assert!(display.contains("unknown type 'Vec'"));
        assert!(display.contains("4:17"));
    }

    #[test]
    fn with_hint_accumulates() {
        let err = CompileError::new("x", Span::default())
            .with_hint("first")
            .with_hint("second");
        assert_eq!(err.hints.len(), 2);
    }
}
