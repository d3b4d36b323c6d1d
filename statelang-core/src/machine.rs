//! Machine aggregation.
//!
//! A parsed program is an ordered list of [`Declaration`]s. [`compile`]
//! folds them into a machine and returns its [`Store`].

use crate::config::RuntimeConfig;
use crate::error::CoreError;
use crate::expr::Evaluator;
use crate::pattern::Matcher;
use crate::runtime::{ExtensionRule, Machine, Rule, Store};
use crate::scope::Scope;
use std::fmt;
use std::sync::Arc;

/// One top-level declaration of a program.
#[derive(Clone)]
pub enum Declaration {
    /// `start = E`
    Start(Evaluator),
    /// `Event -> Effect`
    Rule(Rule),
    /// `E extends P`
    Extends(ExtensionRule),
    /// `states = P | Q`
    States(Vec<Matcher>),
    /// `actions = P | Q`
    Actions(Vec<Matcher>),
}

impl Declaration {
    pub fn kind(&self) -> &'static str {
        match self {
            Declaration::Start(_) => "start",
            Declaration::Rule(_) => "rule",
            Declaration::Extends(_) => "extends",
            Declaration::States(_) => "states",
            Declaration::Actions(_) => "actions",
        }
    }
}

impl fmt::Debug for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Declaration::States(patterns) | Declaration::Actions(patterns) => {
                write!(f, "{}({} patterns)", self.kind(), patterns.len())
            }
            _ => f.write_str(self.kind()),
        }
    }
}

/// `dest extends src`: a state matching `src` is also the state `dest`
/// evaluates to, with the bindings of the match in scope.
pub fn extension(dest: Evaluator, src: Matcher) -> ExtensionRule {
    Arc::new(move |state: &crate::value::Value| {
        src(&Scope::new(), state).map(|scope| dest(&scope))
    })
}

/// Builds a store from declarations, in order.
///
/// Exactly one `start` declaration is required; its expression is
/// evaluated with an empty scope to produce the initial state.
pub fn compile(declarations: Vec<Declaration>, config: RuntimeConfig) -> Result<Store, CoreError> {
    let mut starts = Vec::new();
    let mut rules = Vec::new();
    let mut extensions = Vec::new();
    let mut states = Vec::new();
    let mut actions = Vec::new();

    for declaration in declarations {
        match declaration {
            Declaration::Start(eval) => starts.push(eval),
            Declaration::Rule(rule) => rules.push(rule),
            Declaration::Extends(ext) => extensions.push(ext),
            Declaration::States(patterns) => states.extend(patterns),
            Declaration::Actions(patterns) => actions.extend(patterns),
        }
    }

    let start = match starts.as_slice() {
        [] => return Err(CoreError::MissingStart),
        [start] => start(&Scope::new()),
        _ => {
            return Err(CoreError::MultipleStart {
                count: starts.len(),
            })
        }
    };

    tracing::debug!(
        "compiled machine: start {}, {} rules, {} extensions, {} declared states, {} declared actions",
        start,
        rules.len(),
        extensions.len(),
        states.len(),
        actions.len()
    );

    Ok(Store::new(Machine::new(
        start, rules, extensions, states, actions, config,
    )))
}
