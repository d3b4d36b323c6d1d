//! Stateful regex lexer.
//!
//! The lexer runs in one of three modes:
//!
//! - `Main` - line breaks, whitespace, strings, numbers, identifiers,
//!   punctuation and operator runs
//! - `LineComment` - everything up to the next line break
//! - `BlockComment` - everything up to the closing `*/`, across lines
//!
//! Source arrives as template segments with host values injected between
//! them. The mode survives segment boundaries, and an injected value is only
//! emitted while the lexer is in `Main` mode: a value injected inside a
//! comment is dropped.

use crate::error::SyntaxError;
use crate::token::{Literal, Position, Token, TokenKind};
use once_cell::sync::Lazy;
use regex::Regex;

/// Lexer mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Main,
    LineComment,
    BlockComment,
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Line,
    Ignore,
    Str,
    Radix(u32),
    Decimal,
    Identifier,
    Punctuation,
    Operator,
}

struct Rule {
    regex: Regex,
    action: Action,
    next: Option<Mode>,
}

fn rule(pattern: &str, action: Action, next: Option<Mode>) -> Rule {
    let regex = Regex::new(&format!(r"\A(?:{pattern})")).expect("static token pattern");
    Rule {
        regex,
        action,
        next,
    }
}

// Order matters: the first rule matching at the current offset wins.
static MAIN_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        rule(r"\r?\n\s*", Action::Line, None),
        rule(r"[ \t\r]+", Action::Ignore, None),
        rule(r"//", Action::Ignore, Some(Mode::LineComment)),
        rule(r"/\*", Action::Ignore, Some(Mode::BlockComment)),
        rule(r#""(?:\\["\\]|[^\n"\\])*""#, Action::Str, None),
        rule(r"'(?:\\['\\]|[^\n'\\])*'", Action::Str, None),
        rule(r"0x[0-9A-Fa-f_]+", Action::Radix(16), None),
        rule(r"0o[0-7_]+", Action::Radix(8), None),
        rule(r"0b[01_]+", Action::Radix(2), None),
        rule(
            r"-?[0-9][0-9_]*(?:\.[0-9_]*)?(?:[eE][+-]?[0-9_]+)?",
            Action::Decimal,
            None,
        ),
        rule(
            r"[$_\p{XID_Start}][$\p{XID_Continue}]*",
            Action::Identifier,
            None,
        ),
        rule(r"[,;(){}\[\]]", Action::Punctuation, None),
        rule(r"[!@#%^&*\-+=|/:<>.?~]+", Action::Operator, None),
    ]
});

static LINE_COMMENT_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        rule(r"[^\n]+", Action::Ignore, None),
        rule(r"\n\s*", Action::Line, Some(Mode::Main)),
    ]
});

static BLOCK_COMMENT_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        rule(r"\*+/", Action::Ignore, Some(Mode::Main)),
        rule(r"(?:[^*]|\*+[^*/])+", Action::Ignore, None),
        rule(r"\*+\z", Action::Ignore, None),
    ]
});

fn rules_for(mode: Mode) -> &'static [Rule] {
    match mode {
        Mode::Main => &MAIN_RULES,
        Mode::LineComment => &LINE_COMMENT_RULES,
        Mode::BlockComment => &BLOCK_COMMENT_RULES,
    }
}

/// Removes the surrounding quotes and backslash escapes.
fn unquote(text: &str) -> String {
    let inner = &text[1..text.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(ch);
        }
    }
    out
}

/// Converts a numeric literal, treating `_` as a digit separator.
///
/// Radix literals are accumulated in floating point, so values too wide
/// for any integer type still approximate instead of failing.
fn parse_number(text: &str, action: Action) -> f64 {
    let digits: String = text.chars().filter(|&c| c != '_').collect();
    match action {
        Action::Radix(radix) => {
            let body = &digits[2..];
            if body.is_empty() {
                return f64::NAN;
            }
            body.chars().fold(0.0, |acc, ch| {
                let digit = ch.to_digit(radix).map(f64::from).unwrap_or(f64::NAN);
                acc * f64::from(radix) + digit
            })
        }
        _ => digits.parse::<f64>().unwrap_or(f64::NAN),
    }
}

/// Mode-switching scanner. One lexer instance is threaded across all
/// segments of a template.
#[derive(Debug, Clone)]
pub struct Lexer {
    mode: Mode,
    position: Position,
    comment_start: Option<Position>,
}

impl Lexer {
    pub fn new() -> Self {
        Self {
            mode: Mode::Main,
            position: Position::start(),
            comment_start: None,
        }
    }

    /// Current mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Current position.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Scans one segment, appending tokens to `out`.
    pub fn scan<V>(&mut self, segment: &str, out: &mut Vec<Token<V>>) -> Result<(), SyntaxError> {
        let mut rest = segment;

        while !rest.is_empty() {
            let (rule, text) = rules_for(self.mode)
                .iter()
                .find_map(|rule| rule.regex.find(rest).map(|m| (rule, m.as_str())))
                .filter(|(_, text)| !text.is_empty())
                .ok_or_else(|| SyntaxError::UnexpectedCharacter {
                    ch: rest.chars().next().unwrap_or('\0'),
                    position: self.position,
                })?;

            let kind = match rule.action {
                Action::Line => TokenKind::Line,
                Action::Ignore => TokenKind::Ignore,
                Action::Str => TokenKind::Value(Literal::Str(unquote(text))),
                Action::Radix(_) | Action::Decimal => {
                    TokenKind::Value(Literal::Number(parse_number(text, rule.action)))
                }
                Action::Identifier => TokenKind::Identifier,
                Action::Punctuation => TokenKind::Punctuation,
                Action::Operator => TokenKind::Operator,
            };

            if let Some(next) = rule.next {
                if next == Mode::BlockComment {
                    self.comment_start = Some(self.position);
                }
                self.mode = next;
            }

            out.push(Token {
                kind,
                text: text.to_string(),
                position: self.position,
            });

            self.position.advance(text);
            rest = &rest[text.len()..];
        }

        Ok(())
    }

    /// Emits an injected host value, unless the lexer is inside a comment.
    ///
    /// Returns whether the value was emitted.
    pub fn inject<V>(&mut self, value: V, out: &mut Vec<Token<V>>) -> bool {
        if self.mode != Mode::Main {
            tracing::trace!("dropping value injected inside a comment at {}", self.position);
            return false;
        }
        out.push(Token {
            kind: TokenKind::Value(Literal::Injected(value)),
            text: String::new(),
            position: self.position,
        });
        true
    }

    /// Checks the lexer ended in a state where the input is complete.
    pub fn finish(&self) -> Result<(), SyntaxError> {
        match self.mode {
            Mode::BlockComment => Err(SyntaxError::UnterminatedComment {
                position: self.comment_start.unwrap_or(self.position),
            }),
            Mode::Main | Mode::LineComment => Ok(()),
        }
    }
}

impl Default for Lexer {
    fn default() -> Self {
        Self::new()
    }
}

/// Tokenizes template segments, injecting one host value after each segment
/// except the last while values remain.
pub fn tokenize<V, S>(
    segments: &[S],
    injections: impl IntoIterator<Item = V>,
) -> Result<Vec<Token<V>>, SyntaxError>
where
    S: AsRef<str>,
{
    let mut lexer = Lexer::new();
    let mut injections = injections.into_iter();
    let mut tokens = Vec::new();

    for (i, segment) in segments.iter().enumerate() {
        lexer.scan(segment.as_ref(), &mut tokens)?;
        if i + 1 < segments.len() {
            if let Some(value) = injections.next() {
                lexer.inject(value, &mut tokens);
            }
        }
    }
    lexer.finish()?;

    tracing::trace!(
        "tokenized {} segment(s) into {} token(s)",
        segments.len(),
        tokens.len()
    );

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<Token<()>> {
        tokenize(&[src], std::iter::empty()).unwrap()
    }

    fn significant(src: &str) -> Vec<Token<()>> {
        lex(src).into_iter().filter(|t| !t.is_ignored()).collect()
    }

    fn number(tok: &Token<()>) -> f64 {
        match tok.literal() {
            Some(Literal::Number(n)) => *n,
            other => panic!("expected number, got {:?}", other),
        }
    }

    fn string(tok: &Token<()>) -> &str {
        match tok.literal() {
            Some(Literal::Str(s)) => s,
            other => panic!("expected string, got {:?}", other),
        }
    }

    #[test]
    fn test_comments_are_dropped_across_lines() {
        let toks = significant(r#""a" /* x
y */ 'b'"#);
        assert_eq!(toks.len(), 2);
        assert_eq!(string(&toks[0]), "a");
        assert_eq!(string(&toks[1]), "b");
    }

    #[test]
    fn test_line_comment_ends_with_line_token() {
        let toks = significant("a // trailing\nb");
        assert_eq!(toks.len(), 3);
        assert_eq!(toks[0].identifier(), Some("a"));
        assert!(toks[1].is_line());
        assert_eq!(toks[2].identifier(), Some("b"));
    }

    #[test]
    fn test_line_absorbs_following_blank_lines() {
        let toks = significant("a\n\n   \nb");
        assert_eq!(toks.len(), 3);
        assert!(toks[1].is_line());
        assert_eq!(toks[2].position.line, 4);
    }

    #[test]
    fn test_string_escapes() {
        let toks = significant(r#""say \"hi\"" 'it\'s' "back\\slash""#);
        assert_eq!(string(&toks[0]), "say \"hi\"");
        assert_eq!(string(&toks[1]), "it's");
        assert_eq!(string(&toks[2]), "back\\slash");
    }

    #[test]
    fn test_numeric_literals() {
        let toks = significant("1_000 0x1F 0o17 0b1010 -2.5 3e2 0x_ff");
        let values: Vec<f64> = toks.iter().map(number).collect();
        assert_eq!(values, vec![1000.0, 31.0, 15.0, 10.0, -2.5, 300.0, 255.0]);
    }

    #[test]
    fn test_wide_radix_literals_approximate() {
        let hex = format!("0x1{}", "0".repeat(40));
        let toks = significant(&hex);
        assert_eq!(number(&toks[0]), 16f64.powi(40));

        let binary = format!("0b1{}", "0".repeat(130));
        let toks = significant(&binary);
        assert_eq!(number(&toks[0]), 2f64.powi(130));
    }

    #[test]
    fn test_identifiers_and_operators() {
        let toks = significant("#Idle @ #Go -> $x café_2");
        let texts: Vec<&str> = toks.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["#", "Idle", "@", "#", "Go", "->", "$x", "café_2"]);
        assert_eq!(toks[0].kind, TokenKind::Operator);
        assert_eq!(toks[6].kind, TokenKind::Identifier);
        assert_eq!(toks[7].kind, TokenKind::Identifier);
    }

    #[test]
    fn test_operator_runs_are_maximal() {
        let toks = significant("a ** b != c");
        assert_eq!(toks[1].text, "**");
        assert_eq!(toks[3].text, "!=");
    }

    #[test]
    fn test_punctuation_is_single_character() {
        let toks = significant("{[()]}");
        assert_eq!(toks.len(), 6);
        assert!(toks.iter().all(|t| t.kind == TokenKind::Punctuation));
    }

    #[test]
    fn test_positions() {
        let toks = significant("a\n  bc");
        assert_eq!(toks[0].position, Position { offset: 0, line: 1, column: 1 });
        assert_eq!(toks[2].position, Position { offset: 4, line: 2, column: 3 });
    }

    #[test]
    fn test_injection_between_segments() {
        let toks: Vec<Token<u32>> = tokenize(&["a ", " b"], vec![7])
            .unwrap()
            .into_iter()
            .filter(|t| !t.is_ignored())
            .collect();
        assert_eq!(toks.len(), 3);
        assert_eq!(toks[1].literal(), Some(&Literal::Injected(7)));
        assert_eq!(toks[1].text, "");
    }

    #[test]
    fn test_injection_inside_comment_is_dropped() {
        let toks: Vec<Token<u32>> = tokenize(&["a /* ", " */ b // ", "\nc"], vec![1, 2])
            .unwrap()
            .into_iter()
            .filter(|t| !t.is_ignored())
            .collect();
        assert!(toks.iter().all(|t| t.literal().is_none()));
        let idents: Vec<&str> = toks.iter().filter_map(|t| t.identifier()).collect();
        assert_eq!(idents, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_extra_injections_are_ignored() {
        let toks: Vec<Token<u32>> = tokenize(&["a"], vec![1, 2]).unwrap();
        assert_eq!(toks.len(), 1);
    }

    #[test]
    fn test_block_comment_with_stars() {
        let toks = significant("a /** doc **/ b /* * */ c");
        let idents: Vec<&str> = toks.iter().filter_map(|t| t.identifier()).collect();
        assert_eq!(idents, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unterminated_block_comment() {
        let err = tokenize::<(), _>(&["a /* never"], std::iter::empty()).unwrap_err();
        assert_eq!(
            err,
            SyntaxError::UnterminatedComment {
                position: Position { offset: 2, line: 1, column: 3 }
            }
        );
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize::<(), _>(&["a `b`"], std::iter::empty()).unwrap_err();
        assert!(matches!(err, SyntaxError::UnexpectedCharacter { ch: '`', .. }));
    }

    #[test]
    fn test_mode_is_kept_across_segments() {
        let mut lexer = Lexer::new();
        let mut out: Vec<Token<()>> = Vec::new();
        lexer.scan("x /* open", &mut out).unwrap();
        assert_eq!(lexer.mode(), Mode::BlockComment);
        lexer.scan(" close */", &mut out).unwrap();
        assert_eq!(lexer.mode(), Mode::Main);
        assert!(lexer.finish().is_ok());
    }
}
