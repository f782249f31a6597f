//! Lexer for the filter language.

use crate::error::{QueryError, Result};
use crate::token::{Span, Token, TokenKind};

/// Operator symbols, longest first so that `-=-` wins over `-=`.
const OPERATORS: [&str; 10] = ["-=-", "==", "!=", ">=", "<=", "|=", "=-", "-=", ">", "<"];

pub struct Lexer<'a> {
    input: &'a str,
    /// Current byte offset into the input.
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer { input, position: 0 }
    }

    /// Collects every token, failing on the first illegal one.
    pub fn tokenize(input: &'a str) -> Result<Vec<Token<'a>>> {
        let mut tokens = Vec::new();
        for token in Lexer::new(input) {
            match token.kind {
                TokenKind::Illegal => {
                    let found = &input[token.span.start..token.span.end];
                    return Err(QueryError::Lexical {
                        message: format!("unexpected character '{found}'"),
                        position: token.span.start,
                    });
                }
                TokenKind::UnterminatedString => {
                    return Err(QueryError::Lexical {
                        message: "unterminated string literal".to_string(),
                        position: token.span.start,
                    });
                }
                _ => tokens.push(token),
            }
        }
        log::trace!("tokenized {:?} into {} tokens", input, tokens.len());
        Ok(tokens)
    }

    fn rest(&self) -> &'a str {
        &self.input[self.position..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if let Some(c) = c {
            self.position += c.len_utf8();
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn token(&self, kind: TokenKind<'a>, start: usize) -> Token<'a> {
        Token {
            kind,
            span: Span::new(start, self.position),
        }
    }

    fn eat_digits(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
    }

    /// Reads a decimal literal: `-?digits(.digits)?`.
    fn read_number(&mut self, start: usize) -> Token<'a> {
        if self.peek() == Some('-') {
            self.bump();
        }
        self.eat_digits();
        if self.peek() == Some('.') && matches!(self.peek_next(), Some(c) if c.is_ascii_digit()) {
            self.bump();
            self.eat_digits();
        }
        self.token(TokenKind::Number(&self.input[start..self.position]), start)
    }

    /// Reads a single-quoted string; `''` is an escaped quote.
    /// The opening quote has already been consumed.
    fn read_string(&mut self, start: usize) -> Token<'a> {
        let content_start = self.position;
        loop {
            match self.peek() {
                Some('\'') if self.peek_next() == Some('\'') => {
                    self.bump();
                    self.bump();
                }
                Some('\'') => break,
                Some(_) => {
                    self.bump();
                }
                None => return self.token(TokenKind::UnterminatedString, start),
            }
        }
        let content = &self.input[content_start..self.position];
        self.bump(); // closing quote
        self.token(TokenKind::String(content), start)
    }

    fn read_identifier(&mut self, start: usize) -> Token<'a> {
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '.' || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        let literal = &self.input[start..self.position];
        let kind = match_keyword(literal);
        self.token(kind, start)
    }

    fn read_operator(&mut self, start: usize) -> Option<Token<'a>> {
        let op: &'static str = OPERATORS
            .iter()
            .copied()
            .find(|op| self.rest().starts_with(*op))?;
        self.position += op.len();
        Some(self.token(TokenKind::Operator(op), start))
    }
}

fn match_keyword(s: &str) -> TokenKind<'_> {
    if s.eq_ignore_ascii_case("and") {
        TokenKind::And
    } else if s.eq_ignore_ascii_case("or") {
        TokenKind::Or
    } else {
        TokenKind::Identifier(s)
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_whitespace();
        let start = self.position;
        let c = self.peek()?;

        if let Some(op) = self.read_operator(start) {
            return Some(op);
        }

        let negative_number = c == '-' && matches!(self.peek_next(), Some(d) if d.is_ascii_digit());
        if negative_number || c.is_ascii_digit() {
            return Some(self.read_number(start));
        }

        self.bump();
        let token = match c {
            ',' => self.token(TokenKind::Comma, start),
            '(' => self.token(TokenKind::LParen, start),
            ')' => self.token(TokenKind::RParen, start),
            '!' => self.token(TokenKind::Exclamation, start),
            '*' => self.token(TokenKind::Asterisk, start),
            '&' => self.token(TokenKind::And, start),
            '|' => self.token(TokenKind::Or, start),
            // A lone '=' is lexed as an operator so the parser can report it.
            '=' => self.token(TokenKind::Operator("="), start),
            '\'' => self.read_string(start),
            c if c.is_alphabetic() || c == '_' => self.read_identifier(start),
            _ => self.token(TokenKind::Illegal, start),
        };
        Some(token)
    }
}
