//! Expression, type, and pattern parsing.
//!
//! Precedence, lowest to highest: assignment; `match`; logical-or;
//! logical-and; equality; comparison (which also hosts the non-associative
//! `is` test); additive; multiplicative; unary; call/postfix; primary.
//!
//! `match` is a contextual keyword: it lexes as an identifier and is
//! recognized here when followed by something that can start a scrutinee
//! expression, so `match` remains usable as an ordinary name.

use super::Parser;
use crate::ast::{
    BinaryOp, Expr, ExprKind, MatchArm, Pattern, PatternKind, PrimitiveTy, Type, TypeKind,
    UnaryOp,
};
use crate::token::TokenKind;
use pawc_base::{CompileError, Result};

impl Parser {
    pub(super) fn expression(&mut self) -> Result<Expr> {
        self.assignment()
    }

    // ========================================================================
    // Precedence chain
    // ========================================================================

    fn assignment(&mut self) -> Result<Expr> {
        let expr = self.match_expression()?;

        let op = match self.peek_kind() {
            TokenKind::Assign => None,
            TokenKind::PlusEq => Some(BinaryOp::Add),
            TokenKind::MinusEq => Some(BinaryOp::Sub),
            _ => return Ok(expr),
        };
        let span = self.advance().span;

        if !matches!(
            expr.kind,
            ExprKind::Identifier(_) | ExprKind::Member { .. } | ExprKind::Index { .. }
        ) {
            return Err(CompileError::new(
                "invalid assignment target; expected a variable, field, or index",
                expr.span,
            ));
        }

        let value = self.assignment()?;
        // Compound assignment desugars to `target = target op value`.
        let value = match op {
            Some(op) => Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(expr.clone()),
                    rhs: Box::new(value),
                },
                span,
            ),
            None => value,
        };
        Ok(Expr::new(
            ExprKind::Assign { target: Box::new(expr), value: Box::new(value) },
            span,
        ))
    }

    fn match_expression(&mut self) -> Result<Expr> {
        if !self.at_match_keyword() {
            return self.logical_or();
        }
        let span = self.advance().span; // 'match'
        let value = self.condition_expression()?;

        self.expect(TokenKind::LBrace, "expected '{' after match value")?;
        let mut arms = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            let pattern = self.parse_pattern()?;
            self.expect(TokenKind::FatArrow, "expected '=>' after match pattern")?;
            let expr = self.expression()?;
            arms.push(MatchArm { pattern, expr });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "expected '}' after match arms")?;

        Ok(Expr::new(ExprKind::Match { value: Box::new(value), arms }, span))
    }

    /// `match` lexes as an identifier; treat it as the keyword only when a
    /// scrutinee can follow.
    fn at_match_keyword(&self) -> bool {
        if self.peek_kind() != TokenKind::Identifier || self.peek().text != "match" {
            return false;
        }
        matches!(
            self.peek_ahead(1).kind,
            TokenKind::Identifier
                | TokenKind::Integer
                | TokenKind::Float
                | TokenKind::Str
                | TokenKind::True
                | TokenKind::False
                | TokenKind::LParen
                | TokenKind::SelfValue
        )
    }

    fn logical_or(&mut self) -> Result<Expr> {
        let mut expr = self.logical_and()?;
        while self.check(TokenKind::OrOr) {
            let span = self.advance().span;
            let rhs = self.logical_and()?;
            expr = Expr::new(
                ExprKind::Binary { op: BinaryOp::Or, lhs: Box::new(expr), rhs: Box::new(rhs) },
                span,
            );
        }
        Ok(expr)
    }

    fn logical_and(&mut self) -> Result<Expr> {
        let mut expr = self.equality()?;
        while self.check(TokenKind::AndAnd) {
            let span = self.advance().span;
            let rhs = self.equality()?;
            expr = Expr::new(
                ExprKind::Binary { op: BinaryOp::And, lhs: Box::new(expr), rhs: Box::new(rhs) },
                span,
            );
        }
        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr> {
        let mut expr = self.comparison()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::Ne,
                _ => break,
            };
            let span = self.advance().span;
            let rhs = self.comparison()?;
            expr = Expr::new(
                ExprKind::Binary { op, lhs: Box::new(expr), rhs: Box::new(rhs) },
                span,
            );
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> Result<Expr> {
        let expr = self.term()?;

        // `v is Pattern` is non-associative and sits at comparison level so
        // it composes with `&&`/`||` without parentheses.
        if self.check(TokenKind::Is) {
            let span = self.advance().span;
            let pattern = self.parse_pattern()?;
            return Ok(Expr::new(
                ExprKind::Is { value: Box::new(expr), pattern },
                span,
            ));
        }

        let mut expr = expr;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Ge => BinaryOp::Ge,
                _ => break,
            };
            let span = self.advance().span;
            let rhs = self.term()?;
            expr = Expr::new(
                ExprKind::Binary { op, lhs: Box::new(expr), rhs: Box::new(rhs) },
                span,
            );
        }
        Ok(expr)
    }

    fn term(&mut self) -> Result<Expr> {
        let mut expr = self.factor()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            let span = self.advance().span;
            let rhs = self.factor()?;
            expr = Expr::new(
                ExprKind::Binary { op, lhs: Box::new(expr), rhs: Box::new(rhs) },
                span,
            );
        }
        Ok(expr)
    }

    fn factor(&mut self) -> Result<Expr> {
        let mut expr = self.unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            let span = self.advance().span;
            let rhs = self.unary()?;
            expr = Expr::new(
                ExprKind::Binary { op, lhs: Box::new(expr), rhs: Box::new(rhs) },
                span,
            );
        }
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr> {
        let op = match self.peek_kind() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Not => UnaryOp::Not,
            _ => return self.postfix(),
        };
        let span = self.advance().span;
        let operand = self.unary()?;
        Ok(Expr::new(ExprKind::Unary { op, operand: Box::new(operand) }, span))
    }

    /// Postfix chain: `.` member, `[ ]` index, `( )` call, `?` try, `as` cast.
    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    let span = self.advance().span;
                    let field = self.expect_identifier("field or method name after '.'")?.text;
                    expr = Expr::new(
                        ExprKind::Member { object: Box::new(expr), field },
                        span,
                    );
                }
                TokenKind::LBracket => {
                    let span = self.advance().span;
                    let index = self.expression()?;
                    self.expect(TokenKind::RBracket, "expected ']' after index")?;
                    expr = Expr::new(
                        ExprKind::Index { array: Box::new(expr), index: Box::new(index) },
                        span,
                    );
                }
                TokenKind::LParen => {
                    let span = self.advance().span;
                    let args = self.call_arguments()?;
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            module_prefix: None,
                            type_args: Vec::new(),
                            args,
                        },
                        span,
                    );
                }
                TokenKind::Question => {
                    let span = self.advance().span;
                    expr = Expr::new(ExprKind::Try(Box::new(expr)), span);
                }
                TokenKind::As => {
                    let span = self.advance().span;
                    let target = self.parse_type()?;
                    expr = Expr::new(
                        ExprKind::Cast { value: Box::new(expr), target },
                        span,
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Integer => {
                self.advance();
                let value = token.text.parse::<i64>().map_err(|_| {
                    CompileError::new(
                        format!("integer literal '{}' is out of range", token.text),
                        token.span,
                    )
                })?;
                Ok(Expr::new(ExprKind::Integer(value), token.span))
            }
            TokenKind::Float => {
                self.advance();
                let value = token.text.parse::<f64>().map_err(|_| {
                    CompileError::new(
                        format!("invalid float literal '{}'", token.text),
                        token.span,
                    )
                })?;
                Ok(Expr::new(ExprKind::Float(value), token.span))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(true), token.span))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(false), token.span))
            }
            TokenKind::Str => {
                self.advance();
                Ok(Expr::new(ExprKind::Str(token.text), token.span))
            }
            TokenKind::Char => {
                self.advance();
                let c = token.text.chars().next().unwrap_or('\0');
                Ok(Expr::new(ExprKind::Char(c), token.span))
            }
            TokenKind::SelfValue => {
                self.advance();
                Ok(Expr::new(ExprKind::Identifier("self".to_string()), token.span))
            }
            TokenKind::LParen => {
                self.advance();
                // Parentheses re-enable struct literals inside conditions.
                let outer = self.clear_no_struct_literal();
                let expr = self.expression();
                self.set_no_struct_literal(outer);
                let expr = expr?;
                self.expect(TokenKind::RParen, "expected ')' after expression")?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                while !self.check(TokenKind::RBracket) {
                    elements.push(self.expression()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBracket, "expected ']' after array elements")?;
                Ok(Expr::new(ExprKind::ArrayLiteral(elements), token.span))
            }
            TokenKind::If => self.if_expression(),
            TokenKind::Ok => {
                self.advance();
                self.expect(TokenKind::LParen, "expected '(' after 'ok'")?;
                let value = self.expression()?;
                self.expect(TokenKind::RParen, "expected ')' after ok value")?;
                Ok(Expr::new(ExprKind::Ok(Box::new(value)), token.span))
            }
            TokenKind::Err => {
                self.advance();
                self.expect(TokenKind::LParen, "expected '(' after 'err'")?;
                let value = self.expression()?;
                self.expect(TokenKind::RParen, "expected ')' after err message")?;
                Ok(Expr::new(ExprKind::Err(Box::new(value)), token.span))
            }
            TokenKind::Identifier => self.identifier_expression(),
            TokenKind::Invalid => {
                self.advance();
                Err(CompileError::new(token.text, token.span))
            }
            _ => Err(CompileError::new(
                format!("expected expression, found '{}'", super::describe(&token)),
                token.span,
            )),
        }
    }

    /// `if cond { a } else { b }` in expression position. Both branches hold
    /// a single expression and the `else` is mandatory.
    fn if_expression(&mut self) -> Result<Expr> {
        let span = self.advance().span; // 'if'
        let condition = self.condition_expression()?;
        self.expect(TokenKind::LBrace, "expected '{' after if condition")?;
        let then_expr = self.expression()?;
        self.expect(TokenKind::RBrace, "expected '}' after if expression value")?;
        self.expect(TokenKind::Else, "if expression requires an 'else' branch")?;
        self.expect(TokenKind::LBrace, "expected '{' after 'else'")?;
        let else_expr = self.expression()?;
        self.expect(TokenKind::RBrace, "expected '}' after else expression value")?;

        Ok(Expr::new(
            ExprKind::IfExpr {
                condition: Box::new(condition),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            span,
        ))
    }

    /// Identifier-headed expressions: plain names, generic calls, qualified
    /// calls/variants, and struct literals.
    fn identifier_expression(&mut self) -> Result<Expr> {
        let name_token = self.advance();
        let name = name_token.text;
        let span = name_token.span;

        // `X::…` — enum variant when X names a declared enum, otherwise a
        // module-qualified call (which also covers generic-struct statics).
        if self.check(TokenKind::ColonColon) {
            self.advance();
            let member = self.expect_identifier("name after '::'")?.text;

            if self.is_enum_name(&name) {
                let args = if self.eat(TokenKind::LParen) {
                    self.call_arguments()?
                } else {
                    Vec::new()
                };
                return Ok(Expr::new(
                    ExprKind::EnumVariant { enum_name: name, variant: member, args },
                    span,
                ));
            }

            let type_args = self.try_type_arguments();
            self.expect(TokenKind::LParen, "expected '(' after qualified name")?;
            let args = self.call_arguments()?;
            return Ok(Expr::new(
                ExprKind::Call {
                    callee: Box::new(Expr::new(ExprKind::Identifier(member), span)),
                    module_prefix: Some(name),
                    type_args,
                    args,
                },
                span,
            ));
        }

        // `name<T, …>(args)` — a generic call. `<` is ambiguous with
        // comparison, so the type-argument list is parsed speculatively.
        if self.check(TokenKind::Lt) {
            let type_args = self.try_type_arguments();
            if !type_args.is_empty() {
                self.expect(TokenKind::LParen, "expected '(' after type arguments")?;
                let args = self.call_arguments()?;
                return Ok(Expr::new(
                    ExprKind::Call {
                        callee: Box::new(Expr::new(ExprKind::Identifier(name), span)),
                        module_prefix: None,
                        type_args,
                        args,
                    },
                    span,
                ));
            }
        }

        // `Name { field: … }` — struct literal, where unambiguous.
        if self.check(TokenKind::LBrace) && self.struct_literal_allowed() && self.is_struct_name(&name)
        {
            self.advance();
            let mut fields = Vec::new();
            while !self.check(TokenKind::RBrace) {
                let field = self.expect_identifier("field name in struct literal")?.text;
                self.expect(TokenKind::Colon, "expected ':' after field name")?;
                let value = self.expression()?;
                fields.push((field, value));
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RBrace, "expected '}' after struct literal")?;
            return Ok(Expr::new(ExprKind::StructLiteral { name, fields }, span));
        }

        Ok(Expr::new(ExprKind::Identifier(name), span))
    }

    fn call_arguments(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        // Argument positions allow struct literals even inside conditions.
        let outer = self.clear_no_struct_literal();
        let result = (|| {
            while !self.check(TokenKind::RParen) {
                args.push(self.expression()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "expected ')' after arguments")
        })();
        self.set_no_struct_literal(outer);
        result?;
        Ok(args)
    }

    /// Attempts to parse `<T, U, …>` followed by `(`. Returns the types on
    /// success; restores the cursor and returns empty on failure, letting
    /// `<` fall back to comparison.
    fn try_type_arguments(&mut self) -> Vec<Type> {
        if !self.check(TokenKind::Lt) {
            return Vec::new();
        }
        let saved = self.save_position();
        self.advance(); // '<'

        let mut types = Vec::new();
        loop {
            match self.parse_type() {
                Ok(ty) => types.push(ty),
                Err(_) => {
                    self.restore_position(saved);
                    return Vec::new();
                }
            }
            if self.eat(TokenKind::Comma) {
                continue;
            }
            break;
        }
        if !self.eat(TokenKind::Gt) || !self.check(TokenKind::LParen) || types.is_empty() {
            self.restore_position(saved);
            return Vec::new();
        }
        types
    }

    // ========================================================================
    // Types
    // ========================================================================

    pub(super) fn parse_type(&mut self) -> Result<Type> {
        let base = self.parse_base_type()?;
        // `T?` — the Optional form.
        if self.check(TokenKind::Question) {
            let span = self.advance().span;
            return Ok(Type::new(TypeKind::Optional(Box::new(base)), span));
        }
        Ok(base)
    }

    fn parse_base_type(&mut self) -> Result<Type> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::SelfType => {
                self.advance();
                Ok(Type::new(TypeKind::SelfType, token.span))
            }
            TokenKind::LBracket => {
                self.advance();
                let element = self.parse_type()?;
                let size = if self.eat(TokenKind::Semicolon) {
                    let size_token = self.expect(TokenKind::Integer, "expected array length")?;
                    let size = size_token.text.parse::<usize>().map_err(|_| {
                        CompileError::new(
                            format!("invalid array length '{}'", size_token.text),
                            size_token.span,
                        )
                    })?;
                    Some(size)
                } else {
                    // `[T]` — length inferred from the initializer.
                    None
                };
                self.expect(TokenKind::RBracket, "expected ']' after array type")?;
                Ok(Type::new(
                    TypeKind::Array { element: Box::new(element), size },
                    token.span,
                ))
            }
            TokenKind::Identifier => {
                self.advance();
                let name = token.text;

                if let Some(prim) = PrimitiveTy::from_name(&name) {
                    return Ok(Type::new(TypeKind::Primitive(prim), token.span));
                }
                if self.in_generic_scope(&name) {
                    return Ok(Type::new(TypeKind::Generic(name), token.span));
                }

                let mut generic_args = Vec::new();
                if self.eat(TokenKind::Lt) {
                    loop {
                        generic_args.push(self.parse_type()?);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::Gt, "expected '>' after type arguments")?;
                }
                Ok(Type::new(TypeKind::Named { name, generic_args }, token.span))
            }
            _ => Err(CompileError::new(
                format!("expected type, found '{}'", super::describe(&token)),
                token.span,
            )),
        }
    }

    // ========================================================================
    // Patterns
    // ========================================================================

    pub(super) fn parse_pattern(&mut self) -> Result<Pattern> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Identifier if token.text == "_" => {
                self.advance();
                Ok(Pattern { kind: PatternKind::Wildcard, span: token.span })
            }
            TokenKind::Integer | TokenKind::Str | TokenKind::True | TokenKind::False => {
                let literal = self.primary()?;
                Ok(Pattern {
                    kind: PatternKind::Literal(Box::new(literal)),
                    span: token.span,
                })
            }
            TokenKind::Identifier => {
                self.advance();
                let name = token.text;

                // `Enum::Variant(…)`
                if self.eat(TokenKind::ColonColon) {
                    let variant = self.expect_identifier("variant name after '::'")?.text;
                    let bindings = self.pattern_bindings()?;
                    return Ok(Pattern {
                        kind: PatternKind::EnumVariant {
                            enum_name: Some(name),
                            variant,
                            bindings,
                        },
                        span: token.span,
                    });
                }

                // `Variant(…)` with the enum inferred from the scrutinee.
                if self.check(TokenKind::LParen) {
                    let bindings = self.pattern_bindings()?;
                    return Ok(Pattern {
                        kind: PatternKind::EnumVariant { enum_name: None, variant: name, bindings },
                        span: token.span,
                    });
                }

                // `Name { field: pat, … }`
                if self.check(TokenKind::LBrace) && self.is_struct_name(&name) {
                    self.advance();
                    let mut fields = Vec::new();
                    while !self.check(TokenKind::RBrace) {
                        let field = self.expect_identifier("field name in pattern")?.text;
                        self.expect(TokenKind::Colon, "expected ':' after field name")?;
                        let pattern = self.parse_pattern()?;
                        fields.push((field, pattern));
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::RBrace, "expected '}' after struct pattern")?;
                    return Ok(Pattern {
                        kind: PatternKind::Struct { name, fields },
                        span: token.span,
                    });
                }

                Ok(Pattern { kind: PatternKind::Identifier(name), span: token.span })
            }
            _ => Err(CompileError::new(
                format!("expected pattern, found '{}'", super::describe(&token)),
                token.span,
            )),
        }
    }

    fn pattern_bindings(&mut self) -> Result<Vec<Pattern>> {
        let mut bindings = Vec::new();
        if self.eat(TokenKind::LParen) {
            while !self.check(TokenKind::RParen) {
                bindings.push(self.parse_pattern()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "expected ')' after pattern bindings")?;
        }
        Ok(bindings)
    }
}
