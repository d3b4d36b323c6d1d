//! Effects.
//!
//! The right side of a rule compiles to an [`EffectFn`]: given the scope of
//! the match it either fails (a guard did not hold) or produces a
//! [`Reaction`], an optional next state plus a [`Thunk`] to run against the
//! store once the state has been updated.
//!
//! Sub-effects joined with `&` are [`Action`]s. They are evaluated against
//! the matched scope only when the thunk runs, in left-to-right order.

use crate::cond::Predicate;
use crate::expr::Evaluator;
use crate::outcome::{first_success, Outcome};
use crate::runtime::Store;
use crate::scope::Scope;
use crate::value::{HostFn, Value};
use std::fmt;
use std::sync::Arc;

/// A deferred side effect, run once against the store.
pub type Thunk = Box<dyn FnOnce(&Store) + Send>;

/// A compiled sub-effect.
pub type Action = Arc<dyn Fn(&Scope) -> Thunk + Send + Sync>;

/// A compiled effect.
pub type EffectFn = Arc<dyn Fn(&Scope) -> Outcome<Reaction> + Send + Sync>;

/// What a fired rule does.
pub struct Reaction {
    /// The state to move to; `None` leaves the state unchanged.
    pub next_state: Option<Value>,
    pub thunk: Thunk,
}

impl fmt::Debug for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reaction")
            .field("next_state", &self.next_state)
            .finish_non_exhaustive()
    }
}

/// A thunk that does nothing.
pub fn noop() -> Thunk {
    Box::new(|_: &Store| {})
}

/// `dispatch E`: dispatches the value of `E` to the store.
pub fn dispatch(expr: Evaluator) -> Action {
    Arc::new(move |scope: &Scope| -> Thunk {
        let event = expr(scope);
        Box::new(move |store: &Store| {
            if let Err(e) = store.dispatch(event) {
                tracing::error!("dispatch effect failed: {}", e);
            }
        })
    })
}

/// `await f`: invokes `f` and dispatches its result once it is ready.
///
/// The result is awaited on a task spawned onto the current tokio runtime.
/// Outside a runtime the effect is dropped.
pub fn await_host(f: HostFn) -> Action {
    Arc::new(move |scope: &Scope| -> Thunk {
        let f = f.clone();
        let scope = scope.clone();
        Box::new(move |store: &Store| {
            let handle = match tokio::runtime::Handle::try_current() {
                Ok(handle) => handle,
                Err(e) => {
                    tracing::error!(
                        "await effect '{}' dropped: no async runtime available ({})",
                        f.name(),
                        e
                    );
                    return;
                }
            };
            let pending = f.call_deferred(&scope);
            let store = store.clone();
            let name = f.name().to_string();
            handle.spawn(async move {
                let event = pending.await;
                tracing::trace!("await effect '{}' completed", name);
                if let Err(e) = store.dispatch(event) {
                    tracing::error!("await effect '{}' failed to dispatch: {}", name, e);
                }
            });
        })
    })
}

/// `exec f`: dispatches every event `f` produces, in order.
pub fn exec(f: HostFn) -> Action {
    Arc::new(move |scope: &Scope| -> Thunk {
        let f = f.clone();
        let scope = scope.clone();
        Box::new(move |store: &Store| {
            for (i, event) in f.call_events(&scope).enumerate() {
                if let Err(e) = store.dispatch(event) {
                    tracing::error!(
                        "exec effect '{}' stopped at event {}: {}",
                        f.name(),
                        i,
                        e
                    );
                    break;
                }
            }
        })
    })
}

/// `( A | B )` as a sub-effect: runs the winning alternative's thunk and
/// ignores its next state.
pub fn nested(effect: EffectFn) -> Action {
    Arc::new(move |scope: &Scope| match effect(scope) {
        Outcome::Success(reaction) => reaction.thunk,
        Outcome::Failure => noop(),
    })
}

/// Runs each action's thunk against the store, left to right.
pub fn join(actions: Vec<Action>, scope: Scope) -> Thunk {
    Box::new(move |store: &Store| {
        for action in &actions {
            action(&scope)(store);
        }
    })
}

/// `#Next & a & b`: moves to the evaluated state, then runs the actions.
/// A `null` next state means no transition.
pub fn with_next_state(next: Evaluator, actions: Vec<Action>) -> EffectFn {
    Arc::new(move |scope: &Scope| {
        let next_state = match next(scope) {
            Value::Null => None,
            value => Some(value),
        };
        Outcome::Success(Reaction {
            next_state,
            thunk: join(actions.clone(), scope.clone()),
        })
    })
}

/// `a & b`: runs the actions without a transition.
pub fn actions_only(actions: Vec<Action>) -> EffectFn {
    Arc::new(move |scope: &Scope| {
        Outcome::Success(Reaction {
            next_state: None,
            thunk: join(actions.clone(), scope.clone()),
        })
    })
}

/// `E if C`: fails unless the condition holds.
pub fn guarded(effect: EffectFn, cond: Predicate) -> EffectFn {
    Arc::new(move |scope: &Scope| {
        if cond(scope) {
            effect(scope)
        } else {
            Outcome::Failure
        }
    })
}

/// `E | F`: the first effect that succeeds wins.
pub fn alternatives(effects: Vec<EffectFn>) -> EffectFn {
    Arc::new(move |scope: &Scope| first_success(effects.iter().map(|effect| effect(scope))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cond::{compare, CompareOp};
    use crate::expr::{constant, lookup, tagged};

    fn tag(name: &str) -> Evaluator {
        tagged(name, vec![])
    }

    fn next_tag(effect: &EffectFn, scope: &Scope) -> Option<String> {
        effect(scope)
            .success()
            .and_then(|r| r.next_state)
            .and_then(|v| v.tag().map(str::to_string))
    }

    #[test]
    fn test_next_state_from_scope() {
        let effect = with_next_state(
            tagged("Running", vec![("count".to_string(), lookup("n"))]),
            vec![],
        );
        let scope = Scope::new().bind("n", Value::from(5));
        let reaction = effect(&scope).success().unwrap();
        let next = reaction.next_state.unwrap();
        assert_eq!(next.tag(), Some("Running"));
        assert_eq!(next.field("count"), Value::from(5));
    }

    #[test]
    fn test_null_next_state_is_no_transition() {
        let effect = with_next_state(constant(Value::Null), vec![]);
        assert!(effect(&Scope::new()).success().unwrap().next_state.is_none());

        let effect = actions_only(vec![dispatch(tag("X"))]);
        assert!(effect(&Scope::new()).success().unwrap().next_state.is_none());
    }

    #[test]
    fn test_guarded_alternatives() {
        let small = guarded(
            with_next_state(tag("Small"), vec![]),
            compare(lookup("n"), CompareOp::Lt, constant(Value::from(10))),
        );
        let effect = alternatives(vec![small, with_next_state(tag("Large"), vec![])]);

        let scope = |n: i32| Scope::new().bind("n", Value::from(n));
        assert_eq!(next_tag(&effect, &scope(3)).as_deref(), Some("Small"));
        assert_eq!(next_tag(&effect, &scope(30)).as_deref(), Some("Large"));
    }

    #[test]
    fn test_all_guards_failing_is_failure() {
        let effect = guarded(
            with_next_state(tag("A"), vec![]),
            compare(lookup("n"), CompareOp::Is, constant(Value::from(1))),
        );
        assert!(effect(&Scope::new()).is_failure());
    }
}
