//! Lexical and structural error types.

use crate::token::Position;
use thiserror::Error;

/// Errors raised while scanning source text or assembling bracket structures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyntaxError {
    #[error("unexpected character {ch:?} at {position}")]
    UnexpectedCharacter { ch: char, position: Position },

    #[error("unterminated block comment starting at {position}")]
    UnterminatedComment { position: Position },

    #[error("unmatched '{text}' at {position}")]
    UnmatchedClose { text: String, position: Position },

    #[error("expected '{expected}' at {position}, found '{found}'")]
    MismatchedClose {
        expected: String,
        found: String,
        position: Position,
    },

    #[error("'{text}' opened at {position} is never closed")]
    Unclosed { text: String, position: Position },
}

impl SyntaxError {
    /// Returns where in the source the error was detected.
    pub fn position(&self) -> Position {
        match self {
            SyntaxError::UnexpectedCharacter { position, .. }
            | SyntaxError::UnterminatedComment { position }
            | SyntaxError::UnmatchedClose { position, .. }
            | SyntaxError::MismatchedClose { position, .. }
            | SyntaxError::Unclosed { position, .. } => *position,
        }
    }

    /// Returns a stable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            SyntaxError::UnexpectedCharacter { .. } => "UNEXPECTED_CHARACTER",
            SyntaxError::UnterminatedComment { .. } => "UNTERMINATED_COMMENT",
            SyntaxError::UnmatchedClose { .. } => "UNMATCHED_CLOSE",
            SyntaxError::MismatchedClose { .. } => "MISMATCHED_CLOSE",
            SyntaxError::Unclosed { .. } => "UNCLOSED_STRUCTURE",
        }
    }
}
