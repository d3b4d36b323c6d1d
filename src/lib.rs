//! # statelang
//!
//! A small language for event-driven state machines.
//!
//! A program declares a start state and a list of rules. Each rule matches
//! the current state and an incoming event, and yields a next state plus
//! side effects: dispatching further events, awaiting a host future, or
//! running a host-supplied event sequence. Compiling a program produces a
//! [`Store`] that holds the current state and notifies subscribers after
//! every dispatch.
//!
//! Host values and functions are spliced into the source with a
//! [`Template`]:
//!
//! ```ignore
//! use statelang::{compile, HostFn, Template, Value};
//!
//! let limit = Value::from(3);
//! let store = compile(
//!     Template::new("start = #Idle count: 0\n")
//!         .text("#Idle count @ #Tick if count < ")
//!         .inject(limit)
//!         .text(" -> #Idle count: count + 1"),
//! )?;
//!
//! store.dispatch(Value::tag_only("Tick"))?;
//! assert_eq!(store.get_state().field("count"), Value::from(1));
//! ```

pub mod error;
mod parser;

pub use error::CompileError;
pub use statelang_core::{
    CoreError, Declaration, DispatchOutcome, HostFn, Record, RuntimeConfig, Scope, Store,
    Subscription, Value,
};
pub use statelang_syntax::{Position, SyntaxError};

use once_cell::sync::Lazy;
use statelang_syntax::{assemble, terminal_map, tokenize, TerminalMap};

static TERMINALS: Lazy<TerminalMap> =
    Lazy::new(|| terminal_map(&[("(", ")"), ("[", "]"), ("{", "}")]));

/// Program source: text segments with host values injected between them.
///
/// A template always has one more segment than injections.
#[derive(Debug, Clone)]
pub struct Template {
    segments: Vec<String>,
    injections: Vec<Value>,
}

impl Template {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            segments: vec![text.into()],
            injections: Vec::new(),
        }
    }

    /// Appends source text after the last injection.
    pub fn text(mut self, text: &str) -> Self {
        if let Some(last) = self.segments.last_mut() {
            last.push_str(text);
        }
        self
    }

    /// Injects a host value at the current end of the source.
    pub fn inject(mut self, value: impl Into<Value>) -> Self {
        self.injections.push(value.into());
        self.segments.push(String::new());
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn injections(&self) -> &[Value] {
        &self.injections
    }
}

impl From<&str> for Template {
    fn from(text: &str) -> Self {
        Template::new(text)
    }
}

impl From<String> for Template {
    fn from(text: String) -> Self {
        Template::new(text)
    }
}

/// Parses a template into machine declarations without building a store.
pub fn parse(template: &Template) -> Result<Vec<Declaration>, CompileError> {
    let tokens = tokenize(template.segments.as_slice(), template.injections.iter().cloned())?;
    let skeleton = assemble(tokens, &TERMINALS)?;
    let declarations = parser::parse_program(&skeleton)?;
    tracing::debug!(
        "parsed {} declaration(s) from {} segment(s)",
        declarations.len(),
        template.segments.len()
    );
    Ok(declarations)
}

/// Compiles a program with configuration from the environment
/// (see [`RuntimeConfig::load`]).
pub fn compile(template: impl Into<Template>) -> Result<Store, CompileError> {
    let config = RuntimeConfig::load()?;
    compile_with(template, config)
}

/// Compiles a program with an explicit configuration.
pub fn compile_with(
    template: impl Into<Template>,
    config: RuntimeConfig,
) -> Result<Store, CompileError> {
    let declarations = parse(&template.into())?;
    Ok(statelang_core::compile(declarations, config)?)
}
