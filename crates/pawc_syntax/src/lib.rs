//! # pawc-syntax
//!
//! The Paw language front-end: tokens, lexer, AST, and parser.
//!
//! ## Pipeline
//!
//! ```text
//! Paw Source (.paw)
//!       │
//!       ▼
//! ┌───────────────┐
//! │  Lexer        │ UTF-8 text → Vec<Token> with spans
//! └───────┬───────┘
//!         ▼
//! ┌───────────────┐
//! │  Parser       │ Tokens → ast::Program (+ recovered errors)
//! └───────┬───────┘
//!         ▼
//!     ast::Program
//! ```
//!
//! The parser is recursive-descent with statement-level error recovery: on
//! a parse error it records a diagnostic and resynchronizes to the next
//! statement-starting token, so a single run reports every parse error in
//! the file.
//!
//! ## Example
//!
//! ```
//! use pawc_syntax::{Lexer, Parser};
//!
//! let source = "fn main() -> i32 { return 2 + 3 * 4; }";
//! let tokens = Lexer::new(source).tokenize();
//! let (program, errors) = Parser::new(tokens).parse();
//!
//! assert!(errors.is_empty());
//! assert_eq!(program.statements.len(), 1);
//! ```

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

pub use lexer::Lexer;
pub use parser::Parser;
pub use token::{Token, TokenKind};
