//! Parser for the filter language.
//!
//! ## Parse flow
//!
//! ```text
//! parse()
//!   └─ parse_or_expression()            disjunction := conjunction ('or' conjunction)*
//!        └─ parse_and_expression()      conjunction := term ('and' term)*
//!             └─ parse_term()
//!                  ├─ '!'* '(' ... ')'            → group, negation toggles the whole group
//!                  ├─ '!'* property '*'? group    → collection filter (Any, or All with '*')
//!                  ├─ '!'* property '*' op values → All over scalar elements
//!                  └─ '!'* property op '*'? values → filter ('*' = case-insensitive)
//! ```
//!
//! ## Precedence (high to low)
//!
//! 1. Grouping `(expression)` and the `!` prefix
//! 2. Filters `property op value[, value...]`
//! 3. `&` / `and`
//! 4. `|` / `or`
//!
//! Both combinators are left-associative.
//!
//! ## Depth
//!
//! Compilation and evaluation recurse once per tree level, and a chain of `n`
//! operands is `n` levels deep. Trees deeper than [`MAX_DEPTH`] are rejected
//! with a syntax error, as is group nesting beyond it.
//!
//! ## Examples
//!
//! ```text
//! name=-*'jo'|age>=30
//! !(status=='closed'|status=='archived')&priority>2
//! tags(name|='urgent','blocker')
//! items*>1
//! ```

use crate::ast::{FilterOperator, Node, Quantifier};
use crate::error::{QueryError, Result};
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};

/// Deepest tree (and deepest group nesting) the parser accepts.
pub const MAX_DEPTH: usize = 100;

pub struct Parser<'a> {
    tokens: &'a [Token<'a>],
    position: usize,
    /// Groups currently open.
    nesting: usize,
}

/// Tokenizes and parses a filter string. Blank input yields `None`.
pub fn parse_filter(input: &str) -> Result<Option<Node>> {
    if input.trim().is_empty() {
        return Ok(None);
    }
    let tokens = Lexer::tokenize(input)?;
    let node = Parser::new(&tokens).parse()?;
    log::trace!("parsed {:?} into {:?}", input, node);
    Ok(Some(node))
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token<'a>]) -> Self {
        Self {
            tokens,
            position: 0,
            nesting: 0,
        }
    }

    /// Returns the current token without advancing.
    fn peek(&self) -> Option<&'a Token<'a>> {
        self.tokens.get(self.position)
    }

    fn peek_nth(&self, n: usize) -> Option<&'a Token<'a>> {
        self.tokens.get(self.position + n)
    }

    /// Returns the current token and advances.
    fn advance(&mut self) -> Option<&'a Token<'a>> {
        let token = self.tokens.get(self.position)?;
        self.position += 1;
        Some(token)
    }

    /// Expects a token of the given kind and advances, otherwise returns an error.
    fn expect(&mut self, expected: TokenKind, what: &str) -> Result<&'a Token<'a>> {
        match self.peek() {
            Some(token)
                if std::mem::discriminant(&token.kind) == std::mem::discriminant(&expected) =>
            {
                self.position += 1;
                Ok(token)
            }
            Some(token) => Err(QueryError::syntax(
                format!("expected {what}, found {:?}", token.kind),
                Some(token.span.start),
            )),
            None => Err(QueryError::syntax(
                format!("expected {what}, but reached end of input"),
                None,
            )),
        }
    }

    /// Depth of a node one level above a child of depth `depth`.
    fn nest(&self, depth: usize, at: Option<&Token<'a>>) -> Result<usize> {
        if depth >= MAX_DEPTH {
            return Err(QueryError::syntax(
                format!("query too deeply nested (more than {MAX_DEPTH} levels)"),
                at.map(|t| t.span.start),
            ));
        }
        Ok(depth + 1)
    }

    fn match_token(&self, kind: &TokenKind) -> bool {
        self.peek()
            .is_some_and(|t| std::mem::discriminant(&t.kind) == std::mem::discriminant(kind))
    }

    /// `query := disjunction EOF`
    pub fn parse(&mut self) -> Result<Node> {
        let (node, _) = self.parse_or_expression()?;
        if let Some(token) = self.peek() {
            let message = match token.kind {
                TokenKind::RParen => "unmatched ')'".to_string(),
                ref other => format!("unexpected token {other:?}"),
            };
            return Err(QueryError::syntax(message, Some(token.span.start)));
        }
        Ok(node)
    }

    /// Each parse step returns the node and its depth.
    fn parse_or_expression(&mut self) -> Result<(Node, usize)> {
        let (mut left, mut depth) = self.parse_and_expression()?;

        while self.match_token(&TokenKind::Or) {
            let operator = self.advance();
            let (right, right_depth) = self.parse_and_expression()?;
            depth = self.nest(depth.max(right_depth), operator)?;
            left = Node::or_else(left, right);
        }

        Ok((left, depth))
    }

    fn parse_and_expression(&mut self) -> Result<(Node, usize)> {
        let (mut left, mut depth) = self.parse_term()?;

        while self.match_token(&TokenKind::And) {
            let operator = self.advance();
            let (right, right_depth) = self.parse_term()?;
            depth = self.nest(depth.max(right_depth), operator)?;
            left = Node::and_also(left, right);
        }

        Ok((left, depth))
    }

    /// Consumes a run of `!` and reports whether its count is odd.
    fn parse_negation(&mut self) -> bool {
        let mut negated = false;
        while self.match_token(&TokenKind::Exclamation) {
            self.advance();
            negated = !negated;
        }
        negated
    }

    fn parse_term(&mut self) -> Result<(Node, usize)> {
        let negated = self.parse_negation();

        let Some(token) = self.peek() else {
            return Err(QueryError::syntax("unexpected end of input", None));
        };

        let (node, depth) = match token.kind {
            TokenKind::LParen => self.parse_group()?,
            TokenKind::Identifier(property) => self.parse_property_term(property)?,
            ref other => {
                return Err(QueryError::syntax(
                    format!("expected property or '(', found {other:?}"),
                    Some(token.span.start),
                ))
            }
        };

        Ok((if negated { node.negated() } else { node }, depth))
    }

    /// `group := '!'* '(' disjunction ')'`
    fn parse_group(&mut self) -> Result<(Node, usize)> {
        let negated = self.parse_negation();
        let open = self.expect(TokenKind::LParen, "'('")?;
        if self.nesting >= MAX_DEPTH {
            return Err(QueryError::syntax(
                format!("query too deeply nested (more than {MAX_DEPTH} groups)"),
                Some(open.span.start),
            ));
        }
        self.nesting += 1;
        let (inner, depth) = self.parse_or_expression()?;
        self.nesting -= 1;
        if !self.match_token(&TokenKind::RParen) {
            let position = self.peek().map_or(open.span.start, |t| t.span.start);
            return Err(QueryError::syntax(
                format!("unmatched '(' opened at {}", open.span.start),
                Some(position),
            ));
        }
        self.advance();
        Ok((if negated { inner.negated() } else { inner }, depth))
    }

    fn parse_property_term(&mut self, property: &'a str) -> Result<(Node, usize)> {
        let start = self.peek();
        let next = self.peek_nth(1).map(|t| &t.kind);
        let ((inner, inner_depth), quantifier) = match next {
            Some(TokenKind::Asterisk) => {
                self.position += 2;
                if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Operator(_))) {
                    // items*>1: every scalar element must satisfy the comparison.
                    ((self.parse_filter_body(String::new())?, 1), Quantifier::All)
                } else {
                    (self.parse_group()?, Quantifier::All)
                }
            }
            Some(TokenKind::LParen) | Some(TokenKind::Exclamation) => {
                self.position += 1;
                (self.parse_group()?, Quantifier::Any)
            }
            _ => {
                self.position += 1;
                return Ok((self.parse_filter_body(property.to_string())?, 1));
            }
        };
        let depth = self.nest(inner_depth, start)?;
        Ok((collection(property, inner, quantifier), depth))
    }

    /// `operator ['*'] valueList`, after the property has been consumed.
    fn parse_filter_body(&mut self, property: String) -> Result<Node> {
        let operator = self.parse_operator()?;
        let case_insensitive = if self.match_token(&TokenKind::Asterisk) {
            self.advance();
            true
        } else {
            false
        };
        let values = self.parse_value_list()?;

        Ok(Node::Filter {
            property,
            operator,
            values,
            negated: false,
            case_insensitive,
        })
    }

    fn parse_operator(&mut self) -> Result<FilterOperator> {
        let token = self.expect(TokenKind::Operator(""), "operator")?;
        let TokenKind::Operator(symbol) = token.kind else {
            return Err(QueryError::syntax("expected operator", Some(token.span.start)));
        };
        FilterOperator::from_symbol(symbol).ok_or_else(|| {
            QueryError::syntax(
                format!("unknown operator '{symbol}'"),
                Some(token.span.start),
            )
        })
    }

    /// `valueList := value (',' value)*`
    fn parse_value_list(&mut self) -> Result<Vec<Option<String>>> {
        let mut values = vec![self.parse_literal()?];
        while self.match_token(&TokenKind::Comma) {
            self.advance();
            values.push(self.parse_literal()?);
        }
        Ok(values)
    }

    /// `value := string | number | 'true' | 'false' | 'null'`
    fn parse_literal(&mut self) -> Result<Option<String>> {
        let Some(token) = self.advance() else {
            return Err(QueryError::syntax(
                "expected value, but reached end of input",
                None,
            ));
        };
        match token.kind {
            TokenKind::String(s) => Ok(Some(s.replace("''", "'"))),
            TokenKind::Number(n) => Ok(Some(n.to_string())),
            TokenKind::Identifier(s) if s.eq_ignore_ascii_case("true") => Ok(Some("true".into())),
            TokenKind::Identifier(s) if s.eq_ignore_ascii_case("false") => {
                Ok(Some("false".into()))
            }
            TokenKind::Identifier(s) if s.eq_ignore_ascii_case("null") => Ok(None),
            ref other => Err(QueryError::syntax(
                format!("expected value, found {other:?}"),
                Some(token.span.start),
            )),
        }
    }
}

fn collection(property: &str, inner: Node, quantifier: Quantifier) -> Node {
    Node::Collection {
        property: property.to_string(),
        inner: Box::new(inner),
        quantifier,
        negated: false,
    }
}
