//! Tokens of the filter grammar.

/// One lexeme of a filter string and where it sits in the input.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub span: Span,
}

/// The kind of a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    // Literals
    Identifier(&'a str), // dotted paths are a single identifier
    String(&'a str),     // content between the quotes, `''` still escaped
    Number(&'a str),

    // Operators
    Operator(&'a str), // ==, !=, >, >=, <, <=, |=, -=-, =-, -=

    // Punctuation
    Comma,       // ,
    LParen,      // (
    RParen,      // )
    Exclamation, // !
    Asterisk,    // *

    // Combinators
    And, // & or "and"
    Or,  // | or "or"

    // Special
    Illegal,            // An illegal/unknown character
    UnterminatedString, // A quote that never closes
}

/// Byte range of a token, used for error positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    /// Exclusive.
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}
