//! Condition evaluation.
//!
//! Conditions are boolean predicates over the scope of a match. They
//! appear after `if` in rules and effects, and `&`-joined inside state
//! patterns. The condition language supports:
//!
//! - `a == b`, `a != b` - shallow structural equality
//! - `a > b`, `a >= b`, `a < b`, `a <= b` - ordering (strings
//!   lexicographic, everything else numeric)
//! - `x in xs`, `x not in xs` - list containment, regex match against a
//!   string, or key presence in a record
//! - `a is b`, `a is not b` - identity
//! - `expr` - truthiness
//! - `c & c`, `c | c` - conjunction and disjunction
//! - `(c)` - grouping
//!
//! Both sides of `&` and `|` are always evaluated; only the result is
//! combined. Host callables used directly as a condition are invoked for
//! their truthiness.

use crate::expr::Evaluator;
use crate::scope::Scope;
use crate::value::{HostFn, Value};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A compiled condition.
pub type Predicate = Arc<dyn Fn(&Scope) -> bool + Send + Sync>;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
            CompareOp::Is => "is",
            CompareOp::IsNot => "is not",
        }
    }

    /// Evaluates the comparison on two values.
    pub fn evaluate(&self, l: &Value, r: &Value) -> bool {
        match self {
            CompareOp::Eq => shallow_eq(l, r),
            CompareOp::Ne => !shallow_eq(l, r),
            CompareOp::Gt => compare_values(l, r) == Some(Ordering::Greater),
            CompareOp::Ge => matches!(
                compare_values(l, r),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            CompareOp::Lt => compare_values(l, r) == Some(Ordering::Less),
            CompareOp::Le => matches!(
                compare_values(l, r),
                Some(Ordering::Less | Ordering::Equal)
            ),
            CompareOp::In => contains(r, l),
            CompareOp::NotIn => !contains(r, l),
            CompareOp::Is => l.strict_eq(r),
            CompareOp::IsNot => !l.strict_eq(r),
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for CompareOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "==" => Ok(CompareOp::Eq),
            "!=" => Ok(CompareOp::Ne),
            ">" => Ok(CompareOp::Gt),
            ">=" => Ok(CompareOp::Ge),
            "<" => Ok(CompareOp::Lt),
            "<=" => Ok(CompareOp::Le),
            "in" => Ok(CompareOp::In),
            "not in" => Ok(CompareOp::NotIn),
            "is" => Ok(CompareOp::Is),
            "is not" => Ok(CompareOp::IsNot),
            other => Err(format!("unknown comparison '{}'", other)),
        }
    }
}

/// Evaluates both operands against the same scope and compares them.
pub fn compare(l: Evaluator, op: CompareOp, r: Evaluator) -> Predicate {
    Arc::new(move |scope: &Scope| op.evaluate(&l(scope), &r(scope)))
}

/// True when the expression's value is truthy.
pub fn truthy(expr: Evaluator) -> Predicate {
    Arc::new(move |scope: &Scope| expr(scope).is_truthy())
}

/// True when the host function returns a truthy value.
pub fn host(f: HostFn) -> Predicate {
    Arc::new(move |scope: &Scope| f.call(scope).is_truthy())
}

/// Conjunction. Every operand is evaluated.
pub fn all(preds: Vec<Predicate>) -> Predicate {
    Arc::new(move |scope: &Scope| {
        preds
            .iter()
            .map(|p| p(scope))
            .fold(true, |acc, result| acc & result)
    })
}

/// Disjunction. Every operand is evaluated.
pub fn any(preds: Vec<Predicate>) -> Predicate {
    Arc::new(move |scope: &Scope| {
        preds
            .iter()
            .map(|p| p(scope))
            .fold(false, |acc, result| acc | result)
    })
}

/// Shallow structural equality.
///
/// Identical values are equal. Two lists or two records are equal when
/// they have the same keys (or length) and every corresponding member is
/// strictly equal; nested composites are compared by identity.
pub fn shallow_eq(l: &Value, r: &Value) -> bool {
    if l.strict_eq(r) {
        return true;
    }
    match (l, r) {
        (Value::Record(a), Value::Record(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).map(|w| v.strict_eq(w)).unwrap_or(false))
        }
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(v, w)| v.strict_eq(w))
        }
        _ => false,
    }
}

fn compare_values(l: &Value, r: &Value) -> Option<Ordering> {
    match (l, r) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => l.to_number().partial_cmp(&r.to_number()),
    }
}

/// Most patterns kept compiled at once. Patterns can come from runtime
/// data, so the cache is cleared when it fills up.
const REGEX_CACHE_CAPACITY: usize = 256;

static REGEX_CACHE: Lazy<DashMap<String, Option<Regex>>> = Lazy::new(DashMap::new);

fn regex_matches(pattern: &str, haystack: &str) -> bool {
    if let Some(cached) = REGEX_CACHE.get(pattern) {
        return cached.as_ref().map(|re| re.is_match(haystack)).unwrap_or(false);
    }
    let compiled = match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!("invalid pattern '{}' in membership test: {}", pattern, e);
            None
        }
    };
    let result = compiled
        .as_ref()
        .map(|re| re.is_match(haystack))
        .unwrap_or(false);
    if REGEX_CACHE.len() >= REGEX_CACHE_CAPACITY {
        tracing::debug!("regex cache full at {} patterns; clearing", REGEX_CACHE_CAPACITY);
        REGEX_CACHE.clear();
    }
    REGEX_CACHE.insert(pattern.to_string(), compiled);
    result
}

/// Membership: `needle in haystack`.
///
/// A list contains strictly equal members. A string haystack is searched
/// with the needle as a regular expression. A record contains its keys.
pub fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::List(items) => items.iter().any(|item| item.strict_eq(needle)),
        Value::String(s) => regex_matches(&needle.to_string(), s),
        Value::Record(record) => record.contains_key(&needle.to_string()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{constant, lookup};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn eval(l: Value, op: &str, r: Value) -> bool {
        op.parse::<CompareOp>().unwrap().evaluate(&l, &r)
    }

    #[test]
    fn test_numeric_comparison() {
        assert!(eval(Value::from(150), ">", Value::from(100)));
        assert!(!eval(Value::from(100), ">", Value::from(100)));
        assert!(eval(Value::from(100), ">=", Value::from(100)));
        assert!(eval(Value::from(2), "<", Value::from(3)));
        assert!(eval(Value::from("2"), "<", Value::from(3)));
        assert!(!eval(Value::Undefined, "<", Value::from(3)));
        assert!(!eval(Value::Undefined, ">=", Value::from(3)));
    }

    #[test]
    fn test_string_ordering_is_lexicographic() {
        assert!(eval(Value::from("apple"), "<", Value::from("banana")));
        assert!(eval(Value::from("10"), "<", Value::from("9")));
    }

    #[test]
    fn test_shallow_equality() {
        let a = Value::record([("x", Value::from(1)), ("y", Value::from("s"))]);
        let b = Value::record([("x", Value::from(1)), ("y", Value::from("s"))]);
        assert!(eval(a.clone(), "==", b.clone()));
        assert!(!eval(a.clone(), "!=", b));

        let nested = |v: i32| Value::record([("inner", Value::list([Value::from(v)]))]);
        assert!(!eval(nested(1), "==", nested(1)));

        let shared = Value::list([Value::from(1)]);
        let c = Value::record([("inner", shared.clone())]);
        let d = Value::record([("inner", shared)]);
        assert!(eval(c, "==", d));

        assert!(!eval(Value::from(1), "==", Value::from("1")));
        assert!(!eval(Value::Null, "==", Value::Undefined));
        assert!(!eval(a, "==", Value::record([("x", Value::from(1))])));
    }

    #[test]
    fn test_identity() {
        let a = Value::tag_only("A");
        assert!(eval(a.clone(), "is", a.clone()));
        assert!(!eval(a.clone(), "is", Value::tag_only("A")));
        assert!(eval(a, "is not", Value::tag_only("A")));
        assert!(eval(Value::from(3), "is", Value::from(3)));
    }

    #[test]
    fn test_membership() {
        let xs = Value::list([Value::from(1), Value::from("two")]);
        assert!(eval(Value::from("two"), "in", xs.clone()));
        assert!(eval(Value::from(3), "not in", xs));

        assert!(eval(Value::from("^ab+c$"), "in", Value::from("abbbc")));
        assert!(!eval(Value::from("^x"), "in", Value::from("abc")));

        let record = Value::record([("key", Value::Null)]);
        assert!(eval(Value::from("key"), "in", record.clone()));
        assert!(eval(Value::from("other"), "not in", record));

        assert!(!eval(Value::from(1), "in", Value::from(1)));
    }

    #[test]
    fn test_regex_cache_is_bounded() {
        let haystack = Value::from("needle-haystack");
        for i in 0..REGEX_CACHE_CAPACITY * 4 {
            let needle = Value::from(format!("needle{}", i));
            assert!(!contains(&haystack, &needle));
            assert!(REGEX_CACHE.len() <= REGEX_CACHE_CAPACITY);
        }
        assert!(contains(&haystack, &Value::from("needle-")));
    }

    #[test]
    fn test_invalid_regex_is_false() {
        assert!(!eval(Value::from("(unclosed"), "in", Value::from("(unclosed")));
        // cached path
        assert!(!eval(Value::from("(unclosed"), "in", Value::from("x")));
    }

    #[test]
    fn test_compare_and_truthy() {
        let scope = Scope::new().bind("count", Value::from(2));
        let lt = compare(lookup("count"), CompareOp::Lt, constant(Value::from(3)));
        assert!(lt(&scope));
        assert!(!lt(&Scope::new().bind("count", Value::from(3))));

        assert!(truthy(lookup("count"))(&scope));
        assert!(!truthy(lookup("missing"))(&scope));
    }

    #[test]
    fn test_connectives_evaluate_every_operand() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = |result: bool| -> Predicate {
            let calls = calls.clone();
            Arc::new(move |_: &Scope| {
                calls.fetch_add(1, AtomicOrdering::SeqCst);
                result
            })
        };

        assert!(!all(vec![counted(false), counted(true)])(&Scope::new()));
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 2);

        assert!(any(vec![counted(true), counted(false)])(&Scope::new()));
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 4);
    }

    #[test]
    fn test_host_condition() {
        let f = HostFn::new("is_admin", |scope| {
            Value::from(scope.get("role").as_str() == Some("admin"))
        });
        let p = host(f);
        assert!(p(&Scope::new().bind("role", Value::from("admin"))));
        assert!(!p(&Scope::new()));
    }

    #[test]
    fn test_operator_parsing() {
        assert_eq!("not in".parse::<CompareOp>(), Ok(CompareOp::NotIn));
        assert_eq!(CompareOp::IsNot.to_string(), "is not");
        assert!("=".parse::<CompareOp>().is_err());
    }
}
