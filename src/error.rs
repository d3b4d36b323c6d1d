//! Compilation error types.

use statelang_core::{ConfigError, CoreError};
use statelang_syntax::{Position, SyntaxError};
use thiserror::Error;

/// Errors from compiling statelang source into a store.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("syntax error: {0}")]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("parse error at {position}: expected {expected}, found {found}")]
    Parse {
        expected: String,
        found: String,
        position: Position,
    },

    #[error("unsupported at {position}: {feature}")]
    Unsupported { feature: String, position: Position },
}

impl CompileError {
    /// Returns where in the source the error was detected, if known.
    pub fn position(&self) -> Option<Position> {
        match self {
            CompileError::Syntax(e) => Some(e.position()),
            CompileError::Core(_) => None,
            CompileError::Parse { position, .. } | CompileError::Unsupported { position, .. } => {
                Some(*position)
            }
        }
    }

    /// Returns a stable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            CompileError::Syntax(e) => e.error_code(),
            CompileError::Core(e) => e.error_code(),
            CompileError::Parse { .. } => "PARSE_ERROR",
            CompileError::Unsupported { .. } => "UNSUPPORTED",
        }
    }
}

impl From<ConfigError> for CompileError {
    fn from(e: ConfigError) -> Self {
        CompileError::Core(CoreError::Config(e))
    }
}
