//! Single-pass lexer for Paw source text.
//!
//! Scans a UTF-8 byte stream into a token sequence. Multi-character
//! operators use maximal munch (`->` before `-`, `..` before `.`, `::`
//! before `:`), `//` comments run to end of line, and newlines advance the
//! line counter while resetting the column. Malformed input (unknown
//! characters, unterminated string/char literals) produces [`TokenKind::Invalid`]
//! tokens rather than aborting, leaving recovery to the parser.

use crate::token::{Token, TokenKind};
use pawc_base::Span;

pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    /// Scans the whole input, ending with an [`TokenKind::Eof`] token.
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        tokens
    }

    fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();

        let span = Span::new(self.line, self.column);
        if self.is_at_end() {
            return Token::new(TokenKind::Eof, "", span);
        }

        let c = self.peek();
        if c.is_ascii_alphabetic() || c == b'_' {
            return self.identifier(span);
        }
        if c.is_ascii_digit() {
            return self.number(span);
        }
        if c == b'"' {
            return self.string(span);
        }
        if c == b'\'' {
            return self.char_literal(span);
        }

        self.advance();
        let (kind, text): (TokenKind, &str) = match c {
            b'+' => {
                if self.eat(b'=') {
                    (TokenKind::PlusEq, "+=")
                } else {
                    (TokenKind::Plus, "+")
                }
            }
            b'-' => {
                if self.eat(b'>') {
                    (TokenKind::Arrow, "->")
                } else if self.eat(b'=') {
                    (TokenKind::MinusEq, "-=")
                } else {
                    (TokenKind::Minus, "-")
                }
            }
            b'*' => (TokenKind::Star, "*"),
            b'/' => (TokenKind::Slash, "/"),
            b'%' => (TokenKind::Percent, "%"),
            b'=' => {
                if self.eat(b'=') {
                    (TokenKind::EqEq, "==")
                } else if self.eat(b'>') {
                    (TokenKind::FatArrow, "=>")
                } else {
                    (TokenKind::Assign, "=")
                }
            }
            b'!' => {
                if self.eat(b'=') {
                    (TokenKind::NotEq, "!=")
                } else {
                    (TokenKind::Not, "!")
                }
            }
            b'<' => {
                if self.eat(b'=') {
                    (TokenKind::Le, "<=")
                } else {
                    (TokenKind::Lt, "<")
                }
            }
            b'>' => {
                if self.eat(b'=') {
                    (TokenKind::Ge, ">=")
                } else {
                    (TokenKind::Gt, ">")
                }
            }
            b'?' => (TokenKind::Question, "?"),
            b'&' => {
                if self.eat(b'&') {
                    (TokenKind::AndAnd, "&&")
                } else {
                    return Token::new(TokenKind::Invalid, "&", span);
                }
            }
            b'|' => {
                if self.eat(b'|') {
                    (TokenKind::OrOr, "||")
                } else {
                    return Token::new(TokenKind::Invalid, "|", span);
                }
            }
            b'(' => (TokenKind::LParen, "("),
            b')' => (TokenKind::RParen, ")"),
            b'{' => (TokenKind::LBrace, "{"),
            b'}' => (TokenKind::RBrace, "}"),
            b'[' => (TokenKind::LBracket, "["),
            b']' => (TokenKind::RBracket, "]"),
            b',' => (TokenKind::Comma, ","),
            b';' => (TokenKind::Semicolon, ";"),
            b':' => {
                if self.eat(b':') {
                    (TokenKind::ColonColon, "::")
                } else {
                    (TokenKind::Colon, ":")
                }
            }
            b'.' => {
                if self.eat(b'.') {
                    (TokenKind::DotDot, "..")
                } else {
                    (TokenKind::Dot, ".")
                }
            }
            other => {
                return Token::new(TokenKind::Invalid, (other as char).to_string(), span);
            }
        };
        Token::new(kind, text, span)
    }

    // ========================================================================
    // Scanners
    // ========================================================================

    fn identifier(&mut self, span: Span) -> Token {
        let start = self.pos;
        while !self.is_at_end() && (self.peek().is_ascii_alphanumeric() || self.peek() == b'_') {
            self.advance();
        }
        let text = &self.source[start..self.pos];
        let kind = TokenKind::keyword(text).unwrap_or(TokenKind::Identifier);
        Token::new(kind, text, span)
    }

    fn number(&mut self, span: Span) -> Token {
        let start = self.pos;
        while !self.is_at_end() && self.peek().is_ascii_digit() {
            self.advance();
        }

        let mut is_float = false;
        // A lone '.' may start a range (`0..10`), so a digit must follow.
        if self.peek() == b'.' && self.peek_next().is_ascii_digit() {
            is_float = true;
            self.advance();
            while !self.is_at_end() && self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let kind = if is_float { TokenKind::Float } else { TokenKind::Integer };
        Token::new(kind, &self.source[start..self.pos], span)
    }

    fn string(&mut self, span: Span) -> Token {
        self.advance(); // opening quote
        let mut value = String::new();
        while !self.is_at_end() && self.peek() != b'"' {
            let c = self.advance();
            if c == b'\\' && !self.is_at_end() {
                value.push(unescape(self.advance()));
            } else {
                value.push(c as char);
            }
        }
        if self.is_at_end() {
            return Token::new(TokenKind::Invalid, "unterminated string literal", span);
        }
        self.advance(); // closing quote
        Token::new(TokenKind::Str, value, span)
    }

    fn char_literal(&mut self, span: Span) -> Token {
        self.advance(); // opening quote
        if self.is_at_end() {
            return Token::new(TokenKind::Invalid, "unterminated character literal", span);
        }
        let mut c = self.advance();
        if c == b'\\' && !self.is_at_end() {
            c = unescape(self.advance()) as u8;
        }
        if self.is_at_end() || self.peek() != b'\'' {
            return Token::new(TokenKind::Invalid, "unterminated character literal", span);
        }
        self.advance(); // closing quote
        Token::new(TokenKind::Char, (c as char).to_string(), span)
    }

    // ========================================================================
    // Cursor helpers
    // ========================================================================

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                b' ' | b'\t' | b'\r' => {
                    self.advance();
                }
                b'\n' => {
                    self.pos += 1;
                    self.line += 1;
                    self.column = 1;
                }
                b'/' if self.peek_next() == b'/' => {
                    while !self.is_at_end() && self.peek() != b'\n' {
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> u8 {
        if self.is_at_end() {
            0
        } else {
            self.bytes[self.pos]
        }
    }

    fn peek_next(&self) -> u8 {
        if self.pos + 1 >= self.bytes.len() {
            0
        } else {
            self.bytes[self.pos + 1]
        }
    }

    fn advance(&mut self) -> u8 {
        let c = self.bytes[self.pos];
        self.pos += 1;
        self.column += 1;
        c
    }

    fn eat(&mut self, expected: u8) -> bool {
        if !self.is_at_end() && self.peek() == expected {
            self.advance();
            true
        } else {
            false
        }
    }
}

fn unescape(c: u8) -> char {
    match c {
        b'n' => '\n',
        b't' => '\t',
        b'r' => '\r',
        b'\\' => '\\',
        b'"' => '"',
        b'\'' => '\'',
        other => other as char,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source).tokenize().iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_keywords_and_identifiers() {
        let tokens = Lexer::new("fn main let mut value").tokenize();
        assert_eq!(tokens[0].kind, TokenKind::Fn);
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
        assert_eq!(tokens[1].text, "main");
        assert_eq!(tokens[2].kind, TokenKind::Let);
        assert_eq!(tokens[3].kind, TokenKind::Mut);
        assert_eq!(tokens[4].text, "value");
    }

    #[test]
    fn maximal_munch_operators() {
        assert_eq!(
            kinds("-> => == != <= >= && || += -= .. :: ?"),
            vec![
                TokenKind::Arrow,
                TokenKind::FatArrow,
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::Le,
                TokenKind::Ge,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::PlusEq,
                TokenKind::MinusEq,
                TokenKind::DotDot,
                TokenKind::ColonColon,
                TokenKind::Question,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn range_after_integer_is_not_a_float() {
        assert_eq!(
            kinds("0..10"),
            vec![
                TokenKind::Integer,
                TokenKind::DotDot,
                TokenKind::Integer,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn lexes_float_literal() {
        let tokens = Lexer::new("3.25").tokenize();
        assert_eq!(tokens[0].kind, TokenKind::Float);
        assert_eq!(tokens[0].text, "3.25");
    }

    #[test]
    fn string_escapes_are_decoded() {
        let tokens = Lexer::new(r#""a\tb\n""#).tokenize();
        assert_eq!(tokens[0].kind, TokenKind::Str);
        assert_eq!(tokens[0].text, "a\tb\n");
    }

    #[test]
    fn unterminated_string_is_invalid_token() {
        let tokens = Lexer::new("\"oops").tokenize();
        assert_eq!(tokens[0].kind, TokenKind::Invalid);
        assert!(tokens[0].text.contains("unterminated"));
    }

    #[test]
    fn char_literal_with_escape() {
        let tokens = Lexer::new(r"'\n'").tokenize();
        assert_eq!(tokens[0].kind, TokenKind::Char);
        assert_eq!(tokens[0].text, "\n");
    }

    #[test]
    fn comments_and_whitespace_are_skipped() {
        let tokens = Lexer::new("let x // trailing\nlet y").tokenize();
        let idents: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Identifier)
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(idents, vec!["x", "y"]);
    }

    #[test]
    fn spans_track_lines_and_columns() {
        let tokens = Lexer::new("fn\n  main").tokenize();
        assert_eq!(tokens[0].span, Span::new(1, 1));
        assert_eq!(tokens[1].span, Span::new(2, 3));
    }

    #[test]
    fn spans_strictly_increase() {
        let source = "fn main() -> i32 {\n    let x = 1 + 2;\n    return x;\n}\n";
        let tokens = Lexer::new(source).tokenize();
        for pair in tokens.windows(2) {
            let (a, b) = (pair[0].span, pair[1].span);
            assert!(
                (a.line, a.column) < (b.line, b.column),
                "span order violated: {a} then {b}"
            );
        }
    }

    #[test]
    fn concatenated_text_round_trips_modulo_whitespace() {
        let source = "fn add(a: i32, b: i32) -> i32 { return a + b; }";
        let tokens = Lexer::new(source).tokenize();
        let concatenated: String = tokens.iter().map(|t| t.text.as_str()).collect();
        let stripped: String = source.chars().filter(|c| !c.is_whitespace()).collect();
        assert_eq!(concatenated, stripped);
    }

    #[test]
    fn unknown_character_is_invalid_not_fatal() {
        let tokens = Lexer::new("let @ x").tokenize();
        assert_eq!(tokens[1].kind, TokenKind::Invalid);
        assert_eq!(tokens[2].kind, TokenKind::Identifier);
    }
}
