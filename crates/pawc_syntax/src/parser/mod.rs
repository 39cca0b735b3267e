//! Recursive-descent parser for Paw.
//!
//! The parser consumes the token stream produced by [`crate::Lexer`] and
//! builds an [`crate::ast::Program`]. Parse errors do not abort: each error
//! is recorded and the parser resynchronizes to the next statement-starting
//! token, so one run surfaces every parse error in the file.
//!
//! Declared struct and enum names are collected in a pre-scan so that
//! `X::Y(…)` can be classified (enum-variant construction vs. module call)
//! and `Name { … }` struct literals can be recognized regardless of
//! declaration order.
//!
//! Submodules:
//!
//! - [`expr`]: expression precedence chain, types, and patterns

mod expr;
#[cfg(test)]
mod tests;

use std::collections::HashSet;

use crate::ast::{
    EnumDecl, EnumVariantDecl, Expr, ExternDecl, Field, FunctionDecl, GenericParam, LoopKind,
    Param, Program, Stmt, StmtKind, StructDecl,
};
use crate::token::{Token, TokenKind};
use pawc_base::{CompileError, Result, Span};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<CompileError>,
    /// Struct names declared anywhere in this file.
    struct_names: HashSet<String>,
    /// Enum names declared anywhere in this file.
    enum_names: HashSet<String>,
    /// Generic parameter names of the declaration being parsed.
    generic_scope: Vec<String>,
    /// Name of the struct whose body is being parsed, for `Self`.
    current_struct: Option<String>,
    /// Set while parsing `if`/`loop` conditions, where a `{` must open the
    /// body rather than a struct literal.
    no_struct_literal: bool,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        let mut parser = Self {
            tokens,
            pos: 0,
            errors: Vec::new(),
            struct_names: HashSet::new(),
            enum_names: HashSet::new(),
            generic_scope: Vec::new(),
            current_struct: None,
            no_struct_literal: false,
        };
        parser.prescan_type_names();
        parser
    }

    /// Parses the whole token stream. Returns the program together with all
    /// recovered parse errors; an empty error list means a clean parse.
    pub fn parse(mut self) -> (Program, Vec<CompileError>) {
        let mut statements = Vec::new();
        while !self.is_at_end() {
            match self.statement() {
                Ok(stmt) => statements.push(stmt),
                Err(err) => {
                    self.errors.push(err);
                    self.synchronize();
                }
            }
        }
        (Program { statements }, self.errors)
    }

    /// Entry point for tests and tools that need a bare expression.
    pub fn parse_single_expression(mut self) -> Result<Expr> {
        let expr = self.expression()?;
        if !self.is_at_end() {
            return Err(self.error_here("unexpected trailing tokens"));
        }
        Ok(expr)
    }

    /// Registers `struct X` / `enum X` names ahead of the real parse so
    /// uses before the declaration still classify correctly.
    fn prescan_type_names(&mut self) {
        for window in self.tokens.windows(2) {
            let [kw, name] = window else { continue };
            if name.kind != TokenKind::Identifier {
                continue;
            }
            match kw.kind {
                TokenKind::Struct => {
                    self.struct_names.insert(name.text.clone());
                }
                TokenKind::Enum => {
                    self.enum_names.insert(name.text.clone());
                }
                _ => {}
            }
        }
    }

    // ========================================================================
    // Token cursor
    // ========================================================================

    pub(super) fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub(super) fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    pub(super) fn peek_ahead(&self, n: usize) -> &Token {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1)]
    }

    pub(super) fn is_at_end(&self) -> bool {
        self.peek_kind() == TokenKind::Eof
    }

    pub(super) fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !self.is_at_end() {
            self.pos += 1;
        }
        token
    }

    pub(super) fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    pub(super) fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(super) fn expect(&mut self, kind: TokenKind, message: &str) -> Result<Token> {
        if self.check(kind) {
            return Ok(self.advance());
        }
        let found = self.peek();
        // Invalid tokens carry the lexer's own message ("unterminated
        // string literal", …); surface that instead of the expectation.
        if found.kind == TokenKind::Invalid {
            return Err(CompileError::new(found.text.clone(), found.span));
        }
        Err(CompileError::new(
            format!("{}, found '{}'", message, describe(found)),
            found.span,
        ))
    }

    pub(super) fn expect_identifier(&mut self, what: &str) -> Result<Token> {
        self.expect(TokenKind::Identifier, &format!("expected {what}"))
    }

    pub(super) fn error_here(&self, message: impl Into<String>) -> CompileError {
        CompileError::new(message, self.peek().span)
    }

    /// Skips to the next statement boundary after a parse error.
    fn synchronize(&mut self) {
        self.advance();
        while !self.is_at_end() {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }
            if self.peek_kind().starts_statement() {
                return;
            }
            self.advance();
        }
    }

    // ========================================================================
    // Statements and declarations
    // ========================================================================

    fn statement(&mut self) -> Result<Stmt> {
        match self.peek_kind() {
            TokenKind::Import => self.import_declaration(),
            TokenKind::Extern => self.extern_declaration(),
            TokenKind::Pub => {
                let span = self.advance().span;
                match self.peek_kind() {
                    TokenKind::Fn => self.function_declaration(true),
                    TokenKind::Struct => self.struct_declaration(true),
                    TokenKind::Enum => self.enum_declaration(true),
                    TokenKind::Type => self.type_alias_declaration(true),
                    _ => Err(CompileError::new(
                        "expected 'fn', 'struct', 'enum', or 'type' after 'pub'",
                        span,
                    )),
                }
            }
            TokenKind::Fn => self.function_declaration(false),
            TokenKind::Struct => self.struct_declaration(false),
            TokenKind::Enum => self.enum_declaration(false),
            TokenKind::Type => self.type_alias_declaration(false),
            TokenKind::Impl => self.impl_declaration(),
            TokenKind::Let => self.let_declaration(),
            TokenKind::If => self.if_statement(),
            TokenKind::Loop => self.loop_statement(),
            TokenKind::Return => self.return_statement(),
            TokenKind::Break => {
                let span = self.advance().span;
                self.expect(TokenKind::Semicolon, "expected ';' after 'break'")?;
                Ok(Stmt::new(StmtKind::Break, span))
            }
            TokenKind::Continue => {
                let span = self.advance().span;
                self.expect(TokenKind::Semicolon, "expected ';' after 'continue'")?;
                Ok(Stmt::new(StmtKind::Continue, span))
            }
            TokenKind::LBrace => self.block_statement(),
            _ => self.expression_statement(),
        }
    }

    fn import_declaration(&mut self) -> Result<Stmt> {
        let span = self.advance().span;
        let mut path = self.expect_identifier("module path after 'import'")?.text;
        while self.eat(TokenKind::ColonColon) {
            let part = self.expect_identifier("module path segment after '::'")?;
            path.push_str("::");
            path.push_str(&part.text);
        }
        self.expect(TokenKind::Semicolon, "expected ';' after import path")?;
        Ok(Stmt::new(StmtKind::Import { path }, span))
    }

    fn extern_declaration(&mut self) -> Result<Stmt> {
        let span = self.advance().span;
        self.expect(TokenKind::Fn, "expected 'fn' after 'extern'")?;
        let name = self.expect_identifier("function name")?.text;

        self.expect(TokenKind::LParen, "expected '(' after extern function name")?;
        let mut params = Vec::new();
        while !self.check(TokenKind::RParen) {
            let param_name = self.expect_identifier("parameter name")?.text;
            self.expect(TokenKind::Colon, "expected ':' after parameter name")?;
            let ty = self.parse_type()?;
            params.push((param_name, ty));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "expected ')' after extern parameters")?;

        let return_type = if self.eat(TokenKind::Arrow) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, "expected ';' after extern declaration")?;

        Ok(Stmt::new(
            StmtKind::Extern(ExternDecl { name, params, return_type, span }),
            span,
        ))
    }

    fn function_declaration(&mut self, is_public: bool) -> Result<Stmt> {
        let span = self.advance().span; // 'fn'
        let name = self.expect_identifier("function name after 'fn'")?.text;
        let generic_params = self.parse_generic_params()?;

        let outer_scope = self.enter_generic_scope(&generic_params);
        let result = self.function_rest(name, generic_params, is_public, span);
        self.generic_scope = outer_scope;

        Ok(Stmt::new(StmtKind::Function(result?), span))
    }

    /// Parameters, return type, and body; shared by free functions and
    /// struct methods.
    fn function_rest(
        &mut self,
        name: String,
        generic_params: Vec<GenericParam>,
        is_public: bool,
        span: Span,
    ) -> Result<FunctionDecl> {
        self.expect(TokenKind::LParen, "expected '(' after function name")?;
        let mut params = Vec::new();
        while !self.check(TokenKind::RParen) {
            params.push(self.parse_parameter(params.is_empty())?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "expected ')' after parameters")?;

        let return_type = if self.eat(TokenKind::Arrow) {
            Some(self.parse_type()?)
        } else {
            None
        };

        self.expect(TokenKind::LBrace, "expected '{' before function body")?;
        let mut body = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            match self.statement() {
                Ok(stmt) => body.push(stmt),
                Err(err) => {
                    self.errors.push(err);
                    self.synchronize();
                }
            }
        }
        self.expect(TokenKind::RBrace, "expected '}' after function body")?;

        let is_method = params.first().is_some_and(Param::is_receiver);
        Ok(FunctionDecl {
            name,
            generic_params,
            params,
            return_type,
            body,
            is_public,
            is_method,
            span,
        })
    }

    fn parse_parameter(&mut self, first: bool) -> Result<Param> {
        if self.check(TokenKind::SelfValue)
            || (self.check(TokenKind::Mut) && self.peek_ahead(1).kind == TokenKind::SelfValue)
        {
            let mutable = self.eat(TokenKind::Mut);
            let span = self.advance().span; // 'self'
            if !first {
                return Err(CompileError::new("'self' must be the first parameter", span));
            }
            if self.current_struct.is_none() {
                return Err(CompileError::new(
                    "'self' parameter is only allowed in struct methods",
                    span,
                ));
            }
            return Ok(Param::Receiver { mutable, span });
        }

        let name = self.expect_identifier("parameter name")?;
        self.expect(TokenKind::Colon, "expected ':' after parameter name")?;
        let ty = self.parse_type()?;
        Ok(Param::Named { name: name.text, ty, span: name.span })
    }

    fn struct_declaration(&mut self, is_public: bool) -> Result<Stmt> {
        let span = self.advance().span; // 'struct'
        let name = self.expect_identifier("struct name after 'struct'")?.text;
        self.struct_names.insert(name.clone());
        let generic_params = self.parse_generic_params()?;

        let outer_scope = self.enter_generic_scope(&generic_params);
        let outer_struct = self.current_struct.replace(name.clone());
        let result = self.struct_body(name, generic_params, is_public, span);
        self.current_struct = outer_struct;
        self.generic_scope = outer_scope;

        result
    }

    fn struct_body(
        &mut self,
        name: String,
        generic_params: Vec<GenericParam>,
        is_public: bool,
        span: Span,
    ) -> Result<Stmt> {
        self.expect(TokenKind::LBrace, "expected '{' after struct name")?;

        let mut fields = Vec::new();
        let mut methods = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            if self.check(TokenKind::Fn) || self.check(TokenKind::Pub) {
                let method_public = self.eat(TokenKind::Pub);
                let method_span = self.expect(TokenKind::Fn, "expected 'fn' after 'pub'")?.span;
                let method_name = self.expect_identifier("method name")?.text;
                let method_generics = self.parse_generic_params()?;

                // Methods see both the struct's and their own type parameters.
                let outer = self.generic_scope.clone();
                for param in &method_generics {
                    self.generic_scope.push(param.name.clone());
                }
                let method = self.function_rest(
                    method_name,
                    method_generics,
                    method_public || is_public,
                    method_span,
                );
                self.generic_scope = outer;
                methods.push(method?);
            } else {
                let field_name = self.expect_identifier("field name or method")?;
                self.expect(TokenKind::Colon, "expected ':' after field name")?;
                let ty = self.parse_type()?;
                fields.push(Field { name: field_name.text, ty, span: field_name.span });
                if !self.eat(TokenKind::Comma)
                    && !self.check(TokenKind::RBrace)
                    && !self.check(TokenKind::Fn)
                    && !self.check(TokenKind::Pub)
                {
                    return Err(self.error_here("expected ',' after struct field"));
                }
            }
        }
        self.expect(TokenKind::RBrace, "expected '}' after struct body")?;

        Ok(Stmt::new(
            StmtKind::Struct(StructDecl {
                name,
                generic_params,
                fields,
                methods,
                is_public,
                span,
            }),
            span,
        ))
    }

    fn enum_declaration(&mut self, is_public: bool) -> Result<Stmt> {
        let span = self.advance().span; // 'enum'
        let name = self.expect_identifier("enum name after 'enum'")?.text;
        self.enum_names.insert(name.clone());
        let generic_params = self.parse_generic_params()?;

        let outer_scope = self.enter_generic_scope(&generic_params);
        let result = self.enum_variants();
        self.generic_scope = outer_scope;

        let variants = result?;
        Ok(Stmt::new(
            StmtKind::Enum(EnumDecl { name, generic_params, variants, is_public, span }),
            span,
        ))
    }

    fn enum_variants(&mut self) -> Result<Vec<EnumVariantDecl>> {
        self.expect(TokenKind::LBrace, "expected '{' after enum name")?;
        let mut variants = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            let variant_name = self.expect_identifier("variant name")?;
            let mut associated_types = Vec::new();
            if self.eat(TokenKind::LParen) {
                while !self.check(TokenKind::RParen) {
                    associated_types.push(self.parse_type()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RParen, "expected ')' after variant types")?;
            }
            variants.push(EnumVariantDecl {
                name: variant_name.text,
                associated_types,
                span: variant_name.span,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "expected '}' after enum variants")?;
        Ok(variants)
    }

    fn type_alias_declaration(&mut self, is_public: bool) -> Result<Stmt> {
        let span = self.advance().span; // 'type'
        let name = self.expect_identifier("alias name after 'type'")?.text;
        self.expect(TokenKind::Assign, "expected '=' after type alias name")?;
        let aliased = self.parse_type()?;
        self.expect(TokenKind::Semicolon, "expected ';' after type alias")?;
        Ok(Stmt::new(StmtKind::TypeAlias { name, is_public, aliased }, span))
    }

    /// Legacy `impl Name { fn … }`; methods now live in the struct body, but
    /// old sources still use this form.
    fn impl_declaration(&mut self) -> Result<Stmt> {
        let span = self.advance().span; // 'impl'
        let target = self.expect_identifier("type name after 'impl'")?.text;

        let outer_struct = self.current_struct.replace(target.clone());
        let result = (|| {
            self.expect(TokenKind::LBrace, "expected '{' after impl target")?;
            let mut methods = Vec::new();
            while !self.check(TokenKind::RBrace) && !self.is_at_end() {
                let method_public = self.eat(TokenKind::Pub);
                let method_span = self.expect(TokenKind::Fn, "expected 'fn' in impl block")?.span;
                let method_name = self.expect_identifier("method name")?.text;
                let method_generics = self.parse_generic_params()?;
                methods.push(self.function_rest(
                    method_name,
                    method_generics,
                    method_public,
                    method_span,
                )?);
            }
            self.expect(TokenKind::RBrace, "expected '}' after impl block")?;
            Ok(methods)
        })();
        self.current_struct = outer_struct;

        Ok(Stmt::new(StmtKind::Impl { target, methods: result? }, span))
    }

    fn let_declaration(&mut self) -> Result<Stmt> {
        let span = self.advance().span; // 'let'
        let mutable = self.eat(TokenKind::Mut);
        let name = self.expect_identifier("variable name after 'let'")?.text;

        let ty = if self.eat(TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let init = if self.eat(TokenKind::Assign) {
            Some(self.expression()?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, "expected ';' after variable declaration")?;

        Ok(Stmt::new(StmtKind::Let { name, mutable, ty, init }, span))
    }

    fn if_statement(&mut self) -> Result<Stmt> {
        let span = self.advance().span; // 'if'
        let condition = self.condition_expression()?;
        let then_branch = Box::new(self.block_statement()?);
        let else_branch = if self.eat(TokenKind::Else) {
            if self.check(TokenKind::If) {
                Some(Box::new(self.if_statement()?))
            } else {
                Some(Box::new(self.block_statement()?))
            }
        } else {
            None
        };
        Ok(Stmt::new(StmtKind::If { condition, then_branch, else_branch }, span))
    }

    fn loop_statement(&mut self) -> Result<Stmt> {
        let span = self.advance().span; // 'loop'

        let kind = if self.check(TokenKind::LBrace) {
            LoopKind::Infinite
        } else if self.check(TokenKind::Identifier) && self.peek_ahead(1).kind == TokenKind::In {
            let var = self.advance().text;
            self.advance(); // 'in'
            let first = self.condition_expression()?;
            if self.eat(TokenKind::DotDot) {
                let end = self.condition_expression()?;
                LoopKind::Range { var, start: first, end }
            } else {
                LoopKind::Iterator { var, iterable: first }
            }
        } else {
            LoopKind::Condition(self.condition_expression()?)
        };

        let body = Box::new(self.block_statement()?);
        Ok(Stmt::new(StmtKind::Loop { kind, body }, span))
    }

    fn return_statement(&mut self) -> Result<Stmt> {
        let span = self.advance().span; // 'return'
        let value = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(TokenKind::Semicolon, "expected ';' after return value")?;
        Ok(Stmt::new(StmtKind::Return(value), span))
    }

    fn block_statement(&mut self) -> Result<Stmt> {
        let span = self.expect(TokenKind::LBrace, "expected '{'")?.span;
        let mut statements = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            match self.statement() {
                Ok(stmt) => statements.push(stmt),
                Err(err) => {
                    self.errors.push(err);
                    self.synchronize();
                }
            }
        }
        self.expect(TokenKind::RBrace, "expected '}' after block")?;
        Ok(Stmt::new(StmtKind::Block(statements), span))
    }

    fn expression_statement(&mut self) -> Result<Stmt> {
        let expr = self.expression()?;
        let span = expr.span;
        self.expect(TokenKind::Semicolon, "expected ';' after expression")?;
        Ok(Stmt::new(StmtKind::Expression(expr), span))
    }

    // ========================================================================
    // Shared helpers
    // ========================================================================

    /// Parses a condition with struct literals disabled, so `if x { … }`
    /// reads `{` as the body. Parenthesized conditions re-enable them.
    pub(super) fn condition_expression(&mut self) -> Result<Expr> {
        let outer = self.no_struct_literal;
        self.no_struct_literal = true;
        let result = self.expression();
        self.no_struct_literal = outer;
        result
    }

    fn parse_generic_params(&mut self) -> Result<Vec<GenericParam>> {
        let mut params = Vec::new();
        if !self.eat(TokenKind::Lt) {
            return Ok(params);
        }
        loop {
            let name = self.expect_identifier("type parameter name")?;
            if params.iter().any(|p: &GenericParam| p.name == name.text) {
                return Err(CompileError::new(
                    format!("duplicate type parameter '{}'", name.text),
                    name.span,
                ));
            }
            params.push(GenericParam { name: name.text, span: name.span });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Gt, "expected '>' after type parameters")?;
        Ok(params)
    }

    fn enter_generic_scope(&mut self, params: &[GenericParam]) -> Vec<String> {
        let outer = self.generic_scope.clone();
        self.generic_scope = params.iter().map(|p| p.name.clone()).collect();
        outer
    }

    pub(super) fn in_generic_scope(&self, name: &str) -> bool {
        self.generic_scope.iter().any(|p| p == name)
    }

    pub(super) fn is_struct_name(&self, name: &str) -> bool {
        self.struct_names.contains(name)
    }

    pub(super) fn is_enum_name(&self, name: &str) -> bool {
        self.enum_names.contains(name)
    }

    pub(super) fn struct_literal_allowed(&self) -> bool {
        !self.no_struct_literal
    }

    pub(super) fn save_position(&self) -> usize {
        self.pos
    }

    pub(super) fn restore_position(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub(super) fn clear_no_struct_literal(&mut self) -> bool {
        std::mem::replace(&mut self.no_struct_literal, false)
    }

    pub(super) fn set_no_struct_literal(&mut self, value: bool) {
        self.no_struct_literal = value;
    }
}

/// Human-readable token description for error messages.
fn describe(token: &Token) -> String {
    match token.kind {
        TokenKind::Eof => "end of file".to_string(),
        TokenKind::Str => format!("\"{}\"", token.text),
        _ => token.text.clone(),
    }
}
