//! Token types produced by the lexer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position in the source text (offset in bytes, 1-based line and column).
///
/// Offsets run across all template segments, so an injected value sits at
/// the offset where the segment before it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Position {
    /// Position of the first character of the input.
    pub fn start() -> Self {
        Self {
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    /// Advances past `text`, tracking line breaks.
    pub(crate) fn advance(&mut self, text: &str) {
        self.offset += text.len();
        for ch in text.chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A literal carried by a value token.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal<V> {
    /// Quoted string with escapes removed.
    Str(String),
    /// Decimal, hex, octal or binary number.
    Number(f64),
    /// Value injected by the host between two template segments.
    Injected(V),
}

/// Token classification.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<V> {
    /// Line break, together with any whitespace that follows it.
    Line,
    /// Whitespace or comment text.
    Ignore,
    /// A literal value.
    Value(Literal<V>),
    Identifier,
    /// One of `, ; ( ) { } [ ]`.
    Punctuation,
    /// A maximal run of operator characters.
    Operator,
}

/// A classified span of source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<V> {
    pub kind: TokenKind<V>,
    /// Raw source text. Empty for injected values.
    pub text: String,
    pub position: Position,
}

impl<V> Token<V> {
    pub fn is_line(&self) -> bool {
        matches!(self.kind, TokenKind::Line)
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self.kind, TokenKind::Ignore)
    }

    /// Returns the literal if this is a value token.
    pub fn literal(&self) -> Option<&Literal<V>> {
        match &self.kind {
            TokenKind::Value(literal) => Some(literal),
            _ => None,
        }
    }

    /// Returns the identifier text if this is an identifier token.
    pub fn identifier(&self) -> Option<&str> {
        match self.kind {
            TokenKind::Identifier => Some(&self.text),
            _ => None,
        }
    }

    /// Returns true for punctuation or operator tokens with exactly this text.
    pub fn is_symbol(&self, text: &str) -> bool {
        matches!(self.kind, TokenKind::Punctuation | TokenKind::Operator) && self.text == text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_advance() {
        let mut pos = Position::start();
        pos.advance("ab\ncd");
        assert_eq!(pos.offset, 5);
        assert_eq!(pos.line, 2);
        assert_eq!(pos.column, 3);
        assert_eq!(pos.to_string(), "2:3");
    }

    #[test]
    fn test_token_accessors() {
        let tok: Token<()> = Token {
            kind: TokenKind::Operator,
            text: "->".to_string(),
            position: Position::start(),
        };
        assert!(tok.is_symbol("->"));
        assert!(!tok.is_symbol("-"));
        assert!(tok.identifier().is_none());
        assert!(tok.literal().is_none());
    }
}
