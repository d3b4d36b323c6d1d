//! # statelang-syntax
//!
//! Lexical layer for statelang.
//!
//! This crate provides:
//! - A mode-switching regex lexer over template segments with injected host values
//! - Token and position types
//! - A structural assembler that groups bracket-delimited tokens into an arena tree

pub mod assembler;
pub mod error;
pub mod lexer;
pub mod token;

pub use assembler::{assemble, terminal_map, Delimiter, Node, Skeleton, Structure, StructureId, TerminalMap};
pub use error::SyntaxError;
pub use lexer::{tokenize, Lexer, Mode};
pub use token::{Literal, Position, Token, TokenKind};
