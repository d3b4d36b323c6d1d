//! Event-driven runtime.
//!
//! A [`Store`] owns the authoritative state of one compiled machine. Each
//! [`Store::dispatch`] computes the extension closure of the current state,
//! scans rules in declaration order, fires at most one, then notifies every
//! subscriber.
//!
//! The state lock is released before a fired rule's thunk runs, so effects
//! may re-enter `dispatch` on the same store. Nesting is bounded per thread
//! by [`RuntimeConfig::max_dispatch_depth`].

use crate::config::RuntimeConfig;
use crate::effect::EffectFn;
use crate::error::CoreError;
use crate::event::{MatchContext, Step};
use crate::outcome::Outcome;
use crate::pattern::Matcher;
use crate::scope::Scope;
use crate::value::Value;
use parking_lot::Mutex;
use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// `State @ Event -> Effect`.
#[derive(Clone)]
pub struct Rule {
    pub event: Step,
    pub effect: EffectFn,
}

impl Rule {
    pub fn new(event: Step, effect: EffectFn) -> Self {
        Self { event, effect }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule").finish_non_exhaustive()
    }
}

/// Derives an additional state from a state, if it applies.
pub type ExtensionRule = Arc<dyn Fn(&Value) -> Outcome<Value> + Send + Sync>;

/// Callback invoked after every dispatch.
pub type Subscriber = Arc<dyn Fn() + Send + Sync>;

/// Result of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The rule at index `rule` fired. `transitioned` is false when its
    /// effect produced no next state.
    Matched { rule: usize, transitioned: bool },
    /// No rule matched; nothing changed.
    Unmatched,
}

impl DispatchOutcome {
    pub fn is_matched(&self) -> bool {
        matches!(self, DispatchOutcome::Matched { .. })
    }
}

/// A compiled machine.
pub(crate) struct Machine {
    pub(crate) state: Mutex<Value>,
    pub(crate) rules: Vec<Rule>,
    pub(crate) extensions: Vec<ExtensionRule>,
    pub(crate) states: Vec<Matcher>,
    pub(crate) actions: Vec<Matcher>,
    pub(crate) config: RuntimeConfig,
    subscribers: Mutex<Vec<(u64, Subscriber)>>,
    next_subscriber: AtomicU64,
}

impl Machine {
    pub(crate) fn new(
        start: Value,
        rules: Vec<Rule>,
        extensions: Vec<ExtensionRule>,
        states: Vec<Matcher>,
        actions: Vec<Matcher>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            state: Mutex::new(start),
            rules,
            extensions,
            states,
            actions,
            config,
            subscribers: Mutex::new(Vec::new()),
            next_subscriber: AtomicU64::new(0),
        }
    }
}

/// Computes every state reachable from `current` through the extension
/// rules, breadth first, current state first.
///
/// States already in the closure (by structural equality) are not added
/// again, so cyclic extensions terminate. The closure never grows beyond
/// `limit` states.
pub fn get_all_states(current: &Value, extensions: &[ExtensionRule], limit: usize) -> Vec<Value> {
    let mut states = vec![current.clone()];
    let mut next = 0;

    while next < states.len() {
        let state = states[next].clone();
        next += 1;

        for extend in extensions {
            if let Outcome::Success(derived) = extend(&state) {
                if states.contains(&derived) {
                    continue;
                }
                if states.len() >= limit {
                    tracing::warn!(
                        "extension closure of {} truncated at {} states",
                        current,
                        limit
                    );
                    return states;
                }
                states.push(derived);
            }
        }
    }

    states
}

/// Applies the first rule matching `event` in any state of the closure.
fn run_machine(event: &Value, machine: &Machine, store: &Store) -> DispatchOutcome {
    let current = machine.state.lock().clone();
    let states = get_all_states(&current, &machine.extensions, machine.config.max_extended_states);

    for (index, rule) in machine.rules.iter().enumerate() {
        for state in &states {
            let ctx = MatchContext::new(state.clone(), event.clone());
            let scope = match (rule.event)(&ctx, Scope::new()) {
                Outcome::Success(scope) => scope,
                Outcome::Failure => continue,
            };
            let reaction = match (rule.effect)(&scope) {
                Outcome::Success(reaction) => reaction,
                Outcome::Failure => continue,
            };

            let transitioned = match reaction.next_state {
                Some(next) => {
                    tracing::debug!("rule {} fired: {} -> {}", index, current, next);
                    *machine.state.lock() = next;
                    true
                }
                None => {
                    tracing::debug!("rule {} fired without transition", index);
                    false
                }
            };
            (reaction.thunk)(store);

            return DispatchOutcome::Matched {
                rule: index,
                transitioned,
            };
        }
    }

    tracing::trace!("no rule matched {} in {}", event, current);
    DispatchOutcome::Unmatched
}

thread_local! {
    static DISPATCH_DEPTH: Cell<usize> = const { Cell::new(0) };
}

struct DepthGuard;

impl DepthGuard {
    fn enter(limit: usize) -> Result<Self, CoreError> {
        DISPATCH_DEPTH.with(|depth| {
            if depth.get() >= limit {
                return Err(CoreError::DispatchDepthExceeded { limit });
            }
            depth.set(depth.get() + 1);
            Ok(DepthGuard)
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DISPATCH_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Handle to a running machine.
///
/// Cloning a store shares the machine.
#[derive(Clone)]
pub struct Store {
    machine: Arc<Machine>,
}

impl Store {
    pub(crate) fn new(machine: Machine) -> Self {
        Self {
            machine: Arc::new(machine),
        }
    }

    /// Dispatches an event, then notifies subscribers.
    ///
    /// Subscribers are notified whether or not a rule fired. The
    /// notification pass iterates a snapshot, so callbacks may subscribe
    /// or unsubscribe freely; changes apply from the next dispatch.
    pub fn dispatch(&self, event: impl Into<Value>) -> Result<DispatchOutcome, CoreError> {
        let event = event.into();
        let _depth = DepthGuard::enter(self.machine.config.max_dispatch_depth)?;

        if !self.declares_action(&event) {
            tracing::debug!("dispatching undeclared action {}", event);
        }

        let outcome = run_machine(&event, &self.machine, self);

        let subscribers: Vec<Subscriber> = self
            .machine
            .subscribers
            .lock()
            .iter()
            .map(|(_, sub)| sub.clone())
            .collect();
        for sub in subscribers {
            sub();
        }

        Ok(outcome)
    }

    /// Registers a callback run after every dispatch.
    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.machine.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.machine.subscribers.lock().push((id, Arc::new(f)));
        Subscription {
            machine: Arc::downgrade(&self.machine),
            id,
        }
    }

    /// Returns the current state. Composite states are shared, not copied.
    pub fn get_state(&self) -> Value {
        self.machine.state.lock().clone()
    }

    /// Returns the current state followed by every state it extends to.
    pub fn extended_states(&self) -> Vec<Value> {
        let current = self.get_state();
        get_all_states(
            &current,
            &self.machine.extensions,
            self.machine.config.max_extended_states,
        )
    }

    /// True when `state` matches a `states = ...` declaration, or when the
    /// machine declares none.
    pub fn declares_state(&self, state: &Value) -> bool {
        matches_any(&self.machine.states, state)
    }

    /// True when `action` matches an `actions = ...` declaration, or when
    /// the machine declares none.
    pub fn declares_action(&self, action: &Value) -> bool {
        matches_any(&self.machine.actions, action)
    }

    pub fn rule_count(&self) -> usize {
        self.machine.rules.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.machine.subscribers.lock().len()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.machine.config
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("state", &self.get_state())
            .field("rules", &self.machine.rules.len())
            .field("extensions", &self.machine.extensions.len())
            .finish()
    }
}

fn matches_any(patterns: &[Matcher], value: &Value) -> bool {
    patterns.is_empty()
        || patterns
            .iter()
            .any(|pattern| pattern(&Scope::new(), value).is_success())
}

/// Removes a subscriber when asked.
#[derive(Debug, Clone)]
pub struct Subscription {
    machine: Weak<Machine>,
    id: u64,
}

impl Subscription {
    /// Removes the callback. Calling this more than once is harmless.
    pub fn unsubscribe(&self) {
        if let Some(machine) = self.machine.upgrade() {
            machine.subscribers.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::{actions_only, dispatch, with_next_state};
    use crate::event::{event, sequence, state};
    use crate::expr::{constant, tagged as construct};
    use crate::pattern::{binder, tagged, wildcard};
    use std::sync::atomic::AtomicUsize;

    fn rule(from: &str, on: &str, to: &str) -> Rule {
        Rule::new(
            sequence(vec![state(tagged(from, vec![])), event(tagged(on, vec![]))]),
            with_next_state(construct(to, vec![]), vec![]),
        )
    }

    fn store(start: &str, rules: Vec<Rule>, extensions: Vec<ExtensionRule>) -> Store {
        Store::new(Machine::new(
            Value::tag_only(start),
            rules,
            extensions,
            vec![],
            vec![],
            RuntimeConfig::default(),
        ))
    }

    fn extend(from: &str, to: &str) -> ExtensionRule {
        let from = tagged(from, vec![]);
        let to = Value::tag_only(to);
        Arc::new(move |s: &Value| from(&Scope::new(), s).map(|_| to.clone()))
    }

    #[test]
    fn test_transition() {
        let store = store("Idle", vec![rule("Idle", "Go", "Running")], vec![]);
        let outcome = store.dispatch(Value::tag_only("Go")).unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome::Matched {
                rule: 0,
                transitioned: true
            }
        );
        assert_eq!(store.get_state().tag(), Some("Running"));
    }

    #[test]
    fn test_unmatched_leaves_state() {
        let store = store("Idle", vec![rule("Idle", "Go", "Running")], vec![]);
        let before = store.get_state();
        assert_eq!(
            store.dispatch(Value::tag_only("Stop")).unwrap(),
            DispatchOutcome::Unmatched
        );
        assert!(store.get_state().strict_eq(&before));
    }

    #[test]
    fn test_first_rule_wins() {
        let store = store(
            "Idle",
            vec![rule("Idle", "Go", "First"), rule("Idle", "Go", "Second")],
            vec![],
        );
        store.dispatch(Value::tag_only("Go")).unwrap();
        assert_eq!(store.get_state().tag(), Some("First"));
    }

    #[test]
    fn test_get_all_states_with_cycle() {
        let extensions = vec![extend("A", "B"), extend("B", "A"), extend("B", "C")];
        let states = get_all_states(&Value::tag_only("A"), &extensions, 64);
        let tags: Vec<_> = states.iter().filter_map(|s| s.tag()).collect();
        assert_eq!(tags, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_get_all_states_limit() {
        let counter: ExtensionRule = Arc::new(|s: &Value| {
            Outcome::Success(Value::from(s.to_number() + 1.0))
        });
        let states = get_all_states(&Value::from(0), &[counter], 5);
        assert_eq!(states.len(), 5);
    }

    #[test]
    fn test_extended_state_matches_rule() {
        let store = store(
            "Child",
            vec![rule("Parent", "Reset", "Idle")],
            vec![extend("Child", "Parent")],
        );
        assert_eq!(store.extended_states().len(), 2);
        store.dispatch(Value::tag_only("Reset")).unwrap();
        assert_eq!(store.get_state().tag(), Some("Idle"));
    }

    #[test]
    fn test_subscribers_notified_every_dispatch() {
        let store = store("Idle", vec![rule("Idle", "Go", "Running")], vec![]);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let sub = store.subscribe(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        store.dispatch(Value::tag_only("Go")).unwrap();
        store.dispatch(Value::tag_only("Nothing")).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        sub.unsubscribe();
        sub.unsubscribe();
        store.dispatch(Value::tag_only("Go")).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn test_reentrant_dispatch() {
        let ping = Rule::new(
            sequence(vec![state(tagged("Idle", vec![])), event(tagged("Ping", vec![]))]),
            with_next_state(
                construct("Pinged", vec![]),
                vec![dispatch(construct("Pong", vec![]))],
            ),
        );
        let pong = rule("Pinged", "Pong", "Done");
        let store = store("Idle", vec![ping, pong], vec![]);
        store.dispatch(Value::tag_only("Ping")).unwrap();
        assert_eq!(store.get_state().tag(), Some("Done"));
    }

    #[test]
    fn test_dispatch_depth_limit() {
        let forever = Rule::new(
            sequence(vec![state(wildcard()), event(binder("e"))]),
            actions_only(vec![dispatch(constant(Value::from("again")))]),
        );
        let store = Store::new(Machine::new(
            Value::Null,
            vec![forever],
            vec![],
            vec![],
            vec![],
            RuntimeConfig {
                max_dispatch_depth: 8,
                ..Default::default()
            },
        ));
        // the innermost dispatch fails and is logged; the outer call succeeds
        assert!(store.dispatch(Value::from("start")).is_ok());
        DISPATCH_DEPTH.with(|depth| assert_eq!(depth.get(), 0));
    }

    #[test]
    fn test_declared_patterns() {
        let store = Store::new(Machine::new(
            Value::tag_only("Idle"),
            vec![],
            vec![],
            vec![tagged("Idle", vec![]), tagged("Running", vec![])],
            vec![],
            RuntimeConfig::default(),
        ));
        assert!(store.declares_state(&Value::tag_only("Running")));
        assert!(!store.declares_state(&Value::tag_only("Stopped")));
        assert!(store.declares_action(&Value::tag_only("Anything")));
    }
}
