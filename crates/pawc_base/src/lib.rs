//! # pawc-base
//!
//! Structural atoms for the pawc compiler.
//!
//! This crate provides the foundational types used throughout pawc:
//!
//! - [`Span`] — Source location tracking (file-relative line and column)
//! - [`CompileError`]/[`Result`] — Errors with source positions
//! - [`Diagnostic`]/[`Reporter`] — Rendering of `error:`/`warning:`/`note:`
//!   messages with source snippets and help hints
//! - [`Style`] — ANSI terminal styling
//!
//! # Design Principles
//!
//! This crate has **no knowledge of Paw syntax or the LLIR backend**. It
//! provides only generic, reusable infrastructure that the higher-level
//! crates build upon.
//!
//! # Example
//!
//! ```
//! use pawc_base::{CompileError, Span};
//!
//! let err = CompileError::new("unexpected token", Span::new(3, 14));
//! assert!(err.to_string().contains("3:14"));
//! ```

pub mod diagnostic;
pub mod error;
pub mod span;
pub mod style;

pub use diagnostic::{Diagnostic, Reporter, Severity};
pub use error::{CompileError, Result};
pub use span::Span;
pub use style::Style;
