//! Filter DSL parser
//!
//! Parses filter strings into a name-based expression AST.

use std::fmt;

/// A parsed filter expression. Component references are still names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// `true` or `false`
    Const(bool),
    /// A component name like "Velocity"
    Component(String),
    /// `!expr`
    Not(Box<Expr>),
    /// `a & b & ...`
    And(Vec<Expr>),
    /// `a | b | ...`
    Or(Vec<Expr>),
}

impl Expr {
    /// Every component name referenced, in first-seen order, without duplicates.
    #[must_use]
    pub fn component_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Const(_) => {}
            Expr::Component(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Expr::Not(inner) => inner.collect_names(out),
            Expr::And(terms) | Expr::Or(terms) => {
                for term in terms {
                    term.collect_names(out);
                }
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(value) => write!(f, "{value}"),
            Expr::Component(name) => write!(f, "{name}"),
            Expr::Not(inner) => match inner.as_ref() {
                Expr::And(_) | Expr::Or(_) => write!(f, "!({inner})"),
                _ => write!(f, "!{inner}"),
            },
            Expr::And(terms) => {
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        write!(f, " & ")?;
                    }
                    if matches!(term, Expr::Or(_)) {
                        write!(f, "({term})")?;
                    } else {
                        write!(f, "{term}")?;
                    }
                }
                Ok(())
            }
            Expr::Or(terms) => {
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{term}")?;
                }
                Ok(())
            }
        }
    }
}

/// Parse error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "parse error at position {}: {}",
            self.position, self.message
        )
    }
}

impl std::error::Error for ParseError {}

/// Parse a filter string into an [`Expr`].
///
/// # Syntax
///
/// - `Component` - entity has Component
/// - `!Component` or `~Component` - entity does NOT have Component
/// - `A & B`, `A && B`, `A, B` - both
/// - `A | B`, `A || B` - either
/// - `( ... )` - grouping
/// - `true`, `false` - constants
///
/// `!` binds tighter than `&`, which binds tighter than `|`.
///
/// # Errors
///
/// Returns `ParseError` if the filter string is malformed.
pub fn parse_filter(input: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(input);
    parser.parse()
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse(&mut self) -> Result<Expr, ParseError> {
        self.skip_whitespace();

        if self.is_eof() {
            return Err(ParseError::new("empty filter", 0));
        }

        let expr = self.parse_or()?;

        self.skip_whitespace();
        if !self.is_eof() {
            return Err(ParseError::new(
                format!("unexpected '{}'", self.peek().unwrap_or_default()),
                self.pos,
            ));
        }

        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut terms = vec![self.parse_and()?];

        loop {
            self.skip_whitespace();
            if self.check_str("||") {
                self.advance();
                self.advance();
            } else if self.peek() == Some('|') {
                self.advance();
            } else {
                break;
            }
            terms.push(self.parse_and()?);
        }

        Ok(if terms.len() == 1 {
            terms.swap_remove(0)
        } else {
            Expr::Or(terms)
        })
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut terms = vec![self.parse_unary()?];

        loop {
            self.skip_whitespace();
            if self.check_str("&&") {
                self.advance();
                self.advance();
            } else if matches!(self.peek(), Some('&' | ',')) {
                self.advance();
            } else {
                break;
            }
            terms.push(self.parse_unary()?);
        }

        Ok(if terms.len() == 1 {
            terms.swap_remove(0)
        } else {
            Expr::And(terms)
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        self.skip_whitespace();

        if matches!(self.peek(), Some('!' | '~')) {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }

        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        self.skip_whitespace();

        if self.peek() == Some('(') {
            let open = self.pos;
            self.advance();
            let inner = self.parse_or()?;
            self.skip_whitespace();

            // Consume ')'
            if self.peek() != Some(')') {
                return Err(ParseError::new(
                    format!("unclosed '(' opened at position {open}"),
                    self.pos,
                ));
            }
            self.advance();
            return Ok(inner);
        }

        let name = self.parse_identifier()?;
        Ok(match name.as_str() {
            "true" => Expr::Const(true),
            "false" => Expr::Const(false),
            _ => Expr::Component(name),
        })
    }

    fn parse_identifier(&mut self) -> Result<String, ParseError> {
        let mut ident = String::new();

        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || (c == ':' && !ident.is_empty()) {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }

        if ident.is_empty() {
            return Err(ParseError::new("expected component name", self.pos));
        }

        Ok(ident)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn check_str(&self, s: &str) -> bool {
        self.remaining().starts_with(s)
    }

    fn remaining(&self) -> &str {
        self.input.get(self.pos..).unwrap_or("")
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }
}
