//! Event matching.
//!
//! The left side of a rule (`State @ Event if Cond`) compiles to a [`Step`]
//! run against a [`MatchContext`]. Steps are threaded with
//! [`sequence`], so each one sees the bindings of the steps before it.

use crate::cond::Predicate;
use crate::outcome::{first_success, fold, Outcome};
use crate::pattern::Matcher;
use crate::scope::Scope;
use crate::value::Value;
use std::sync::Arc;

/// The state and event a rule is being tried against.
#[derive(Debug, Clone)]
pub struct MatchContext {
    pub state: Value,
    pub event: Value,
}

impl MatchContext {
    pub fn new(state: Value, event: Value) -> Self {
        Self { state, event }
    }
}

/// A compiled event-matching step.
pub type Step = Arc<dyn Fn(&MatchContext, Scope) -> Outcome<Scope> + Send + Sync>;

/// Matches the state under consideration.
pub fn state(matcher: Matcher) -> Step {
    Arc::new(move |ctx: &MatchContext, scope: Scope| matcher(&scope, &ctx.state))
}

/// Matches the incoming event.
pub fn event(matcher: Matcher) -> Step {
    Arc::new(move |ctx: &MatchContext, scope: Scope| matcher(&scope, &ctx.event))
}

/// Passes the scope through when the condition holds.
pub fn condition(pred: Predicate) -> Step {
    Arc::new(move |_: &MatchContext, scope: Scope| {
        let holds = pred(&scope);
        Outcome::when(holds, scope)
    })
}

/// Runs steps in order, each seeing the previous step's scope.
pub fn sequence(steps: Vec<Step>) -> Step {
    Arc::new(move |ctx: &MatchContext, scope: Scope| {
        fold(scope, &steps, |scope, step, _| step(ctx, scope))
    })
}

/// Tries steps left to right against the same scope; the first success
/// wins.
pub fn alternatives(steps: Vec<Step>) -> Step {
    Arc::new(move |ctx: &MatchContext, scope: Scope| {
        first_success(steps.iter().map(|step| step(ctx, scope.clone())))
    })
}
