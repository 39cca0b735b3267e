//! Diagnostic rendering for compiler errors, warnings, and notes.
//!
//! The pipeline reports problems as [`Diagnostic`] values through a shared
//! [`Reporter`]. The rendered format is:
//!
//! ```text
//! error: unknown function 'secrt'
//!   --> src/main.paw:7:12
//!    |
//!  7 |     let x = secrt(40, 2);
//!    |            ^
//!   = help: 'secret' in module 'm' exists but is not public
//! ```
//!
//! The `-->` location line is always present when the span is real; the
//! source snippet appears only when the reporter has been given the file's
//! text via [`Reporter::add_source`]. Hints render as `= help:` lines.

use crate::error::CompileError;
use crate::span::Span;
use crate::style::Style;
use std::collections::HashMap;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl Severity {
    fn label(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        }
    }

    fn colored_label(self) -> String {
        match self {
            Severity::Error => Style::bold_red("error"),
            Severity::Warning => Style::bold_yellow("warning"),
            Severity::Note => Style::bold_cyan("note"),
        }
    }
}

/// A single compiler message with location and optional hints.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Path of the file the span refers to. Empty for file-less messages
    /// (e.g. linker failures).
    pub file: String,
    pub span: Span,
    /// Rendered as `= help:` lines below the snippet.
    pub hints: Vec<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, file: impl Into<String>, span: Span) -> Self {
        Self::new(Severity::Error, message, file, span)
    }

    pub fn warning(message: impl Into<String>, file: impl Into<String>, span: Span) -> Self {
        Self::new(Severity::Warning, message, file, span)
    }

    pub fn note(message: impl Into<String>, file: impl Into<String>, span: Span) -> Self {
        Self::new(Severity::Note, message, file, span)
    }

    fn new(
        severity: Severity,
        message: impl Into<String>,
        file: impl Into<String>,
        span: Span,
    ) -> Self {
        Self {
            severity,
            message: message.into(),
            file: file.into(),
            span,
            hints: Vec::new(),
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }

    /// Promotes a pipeline [`CompileError`] into a diagnostic for `file`.
    pub fn from_error(err: CompileError, file: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: err.message,
            file: file.into(),
            span: err.span,
            hints: err.hints,
        }
    }
}

/// Collects and prints diagnostics for a compilation run.
///
/// Registered source texts enable caret snippets; without them only the
/// `-->` location line is shown. The parser reports several diagnostics per
/// run, later stages stop at the first error, and the driver consults
/// [`Reporter::has_errors`] to pick the exit code.
pub struct Reporter {
    /// filename -> source split into lines, for snippet rendering.
    sources: HashMap<String, Vec<String>>,
    errors: usize,
    warnings: usize,
    color: bool,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter {
    pub fn new() -> Self {
        Self {
            sources: HashMap::new(),
            errors: 0,
            warnings: 0,
            color: false,
        }
    }

    /// Enables ANSI colors in rendered output.
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Registers a file's text so its diagnostics can show snippets.
    pub fn add_source(&mut self, file: impl Into<String>, text: &str) {
        self.sources
            .insert(file.into(), text.lines().map(str::to_string).collect());
    }

    /// Renders and prints a diagnostic to stderr, updating the counters.
    pub fn report(&mut self, diag: &Diagnostic) {
        match diag.severity {
            Severity::Error => self.errors += 1,
            Severity::Warning => self.warnings += 1,
            Severity::Note => {}
        }
        eprint!("{}", self.render(diag));
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    /// Prints a closing summary line when anything was reported.
    pub fn print_summary(&self) {
        if self.errors > 0 {
            eprintln!(
                "compilation failed with {} error(s), {} warning(s)",
                self.errors, self.warnings
            );
        } else if self.warnings > 0 {
            eprintln!("finished with {} warning(s)", self.warnings);
        }
    }

    /// Renders a diagnostic to a string. Exposed for tests; [`report`]
    /// is the normal entry point.
    ///
    /// [`report`]: Reporter::report
    pub fn render(&self, diag: &Diagnostic) -> String {
        let mut out = String::new();

        let label = if self.color {
            diag.severity.colored_label()
        } else {
            diag.severity.label().to_string()
        };
        out.push_str(&format!("{}: {}\n", label, diag.message));

        if !diag.file.is_empty() && !diag.span.is_synthetic() {
            let arrow = if self.color {
                Style::blue("-->")
            } else {
                "-->".to_string()
            };
            out.push_str(&format!("  {} {}:{}\n", arrow, diag.file, diag.span));
            self.render_snippet(diag, &mut out);
        }

        for hint in &diag.hints {
            let help = if self.color {
                Style::cyan("help")
            } else {
                "help".to_string()
            };
            out.push_str(&format!("  = {}: {}\n", help, hint));
        }

        out
    }

    fn render_snippet(&self, diag: &Diagnostic, out: &mut String) {
        let Some(lines) = self.sources.get(&diag.file) else {
            return;
        };
        let line_idx = diag.span.line as usize;
        if line_idx == 0 || line_idx > lines.len() {
            return;
        }
        let text = &lines[line_idx - 1];
        let number = line_idx.to_string();
        let gutter = " ".repeat(number.len());

        out.push_str(&format!(" {} |\n", gutter));
        out.push_str(&format!(" {} | {}\n", number, text));

        // Caret sits under the reported column (1-based).
        let pad = diag.span.column.saturating_sub(1) as usize;
        out.push_str(&format!(" {} | {}^\n", gutter, " ".repeat(pad)));
    }
}
