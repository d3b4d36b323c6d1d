//! Core error types.

use crate::config::ConfigError;
use thiserror::Error;

/// Errors from building or running a machine.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("machine must declare a start state")]
    MissingStart,

    #[error("machine must declare exactly one start state, found {count}")]
    MultipleStart { count: usize },

    #[error("dispatch nested deeper than {limit} levels")]
    DispatchDepthExceeded { limit: usize },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl CoreError {
    /// Returns a stable code identifying the error kind.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::MissingStart => "MISSING_START",
            CoreError::MultipleStart { .. } => "MULTIPLE_START",
            CoreError::DispatchDepthExceeded { .. } => "DISPATCH_DEPTH_EXCEEDED",
            CoreError::Config(_) => "CONFIG_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            CoreError::MultipleStart { count: 2 }.to_string(),
            "machine must declare exactly one start state, found 2"
        );
        assert_eq!(
            CoreError::DispatchDepthExceeded { limit: 4 }.error_code(),
            "DISPATCH_DEPTH_EXCEEDED"
        );
    }
}
