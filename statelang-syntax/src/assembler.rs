//! Structural assembler.
//!
//! Turns the flat token stream into a tree of bracket-delimited structures.
//! Structures live in an arena owned by [`Skeleton`]; the open-structure
//! stack holds arena indices, and a structure's parent refers to it by
//! [`StructureId`].

use crate::error::SyntaxError;
use crate::token::{Position, Token, TokenKind};
use std::collections::HashMap;

/// How a punctuation or operator text affects nesting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delimiter {
    /// Opens a structure that `close` ends.
    Open { close: String },
    /// Ends a structure opened by `open`.
    Close { open: String },
}

/// Maps literal punctuation/operator text to its delimiter role.
pub type TerminalMap = HashMap<String, Delimiter>;

/// Builds a terminal map from open/close pairs.
pub fn terminal_map(pairs: &[(&str, &str)]) -> TerminalMap {
    let mut map = TerminalMap::new();
    for (open, close) in pairs {
        map.insert(
            open.to_string(),
            Delimiter::Open {
                close: close.to_string(),
            },
        );
        map.insert(
            close.to_string(),
            Delimiter::Close {
                open: open.to_string(),
            },
        );
    }
    map
}

/// Index of a structure inside a [`Skeleton`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StructureId(usize);

/// A child of a structure.
#[derive(Debug, Clone, PartialEq)]
pub enum Node<V> {
    Token(Token<V>),
    Structure(StructureId),
}

/// A bracket-delimited group. The root structure has no markers.
#[derive(Debug, Clone, PartialEq)]
pub struct Structure<V> {
    pub open: Option<Token<V>>,
    pub close: Option<Token<V>>,
    pub children: Vec<Node<V>>,
}

impl<V> Structure<V> {
    fn new(open: Option<Token<V>>) -> Self {
        Self {
            open,
            close: None,
            children: Vec::new(),
        }
    }

    /// Text of the opening marker (empty for the root).
    pub fn open_text(&self) -> &str {
        self.open.as_ref().map(|t| t.text.as_str()).unwrap_or("")
    }

    /// Position of the opening marker.
    pub fn position(&self) -> Position {
        self.open
            .as_ref()
            .map(|t| t.position)
            .unwrap_or_else(Position::start)
    }

    /// Position of the closing marker.
    pub fn end_position(&self) -> Position {
        self.close
            .as_ref()
            .map(|t| t.position)
            .unwrap_or_else(|| self.position())
    }
}

/// Arena of structures produced by [`assemble`].
#[derive(Debug, Clone, PartialEq)]
pub struct Skeleton<V> {
    structures: Vec<Structure<V>>,
    end: Position,
}

impl<V> Skeleton<V> {
    const ROOT: StructureId = StructureId(0);

    /// Top-level children.
    pub fn root(&self) -> &[Node<V>] {
        &self.structures[Self::ROOT.0].children
    }

    /// Looks up a structure by id.
    pub fn structure(&self, id: StructureId) -> &Structure<V> {
        &self.structures[id.0]
    }

    /// Number of bracketed structures (the root not included).
    pub fn structure_count(&self) -> usize {
        self.structures.len() - 1
    }

    /// Position just past the last token.
    pub fn end_position(&self) -> Position {
        self.end
    }
}

/// Assembles tokens into a [`Skeleton`].
///
/// Ignorable tokens are discarded and runs of consecutive line tokens are
/// collapsed into one. A close marker with no open structure, a close
/// marker that does not pair with the innermost open one, or an open
/// structure still pending at end of input, is an error.
pub fn assemble<V>(
    tokens: impl IntoIterator<Item = Token<V>>,
    terminals: &TerminalMap,
) -> Result<Skeleton<V>, SyntaxError> {
    let mut structures = vec![Structure::new(None)];
    let mut stack = vec![Skeleton::<V>::ROOT];
    let mut after_line = false;
    let mut end = Position::start();

    for tok in tokens {
        end = tok.position;
        end.advance(&tok.text);
        if tok.is_ignored() {
            continue;
        }
        if tok.is_line() {
            if after_line {
                continue;
            }
            after_line = true;
        } else {
            after_line = false;
        }

        let top = stack[stack.len() - 1];
        let role = match tok.kind {
            TokenKind::Punctuation | TokenKind::Operator => terminals.get(&tok.text).cloned(),
            _ => None,
        };

        match role {
            Some(Delimiter::Open { .. }) => {
                let id = StructureId(structures.len());
                structures.push(Structure::new(Some(tok)));
                stack.push(id);
            }
            Some(Delimiter::Close { open }) => {
                if stack.len() == 1 {
                    return Err(SyntaxError::UnmatchedClose {
                        text: tok.text,
                        position: tok.position,
                    });
                }
                let opener = structures[top.0].open_text();
                if opener != open {
                    let expected = match terminals.get(opener) {
                        Some(Delimiter::Open { close }) => close.clone(),
                        _ => opener.to_string(),
                    };
                    return Err(SyntaxError::MismatchedClose {
                        expected,
                        found: tok.text,
                        position: tok.position,
                    });
                }
                stack.pop();
                structures[top.0].close = Some(tok);
                let parent = stack[stack.len() - 1];
                structures[parent.0].children.push(Node::Structure(top));
            }
            None => structures[top.0].children.push(Node::Token(tok)),
        }
    }

    if stack.len() > 1 {
        let open = &structures[stack[stack.len() - 1].0];
        return Err(SyntaxError::Unclosed {
            text: open.open_text().to_string(),
            position: open.position(),
        });
    }

    Ok(Skeleton { structures, end })
}
