//! Binding patterns.
//!
//! A pattern compiles to a [`Matcher`]: given the scope so far and a value,
//! it either fails or succeeds with a (possibly extended) scope.
//!
//! | Syntax            | Constructor  |
//! |-------------------|--------------|
//! | `_`               | [`wildcard`] |
//! | `1`, `"s"`, `null`| [`literal`]  |
//! | `name`            | [`binder`]   |
//! | `#Name f: P g`    | [`tagged`]   |
//! | `{ k: P, j }`     | [`object`]   |
//! | `[P, Q]`          | [`array`]    |

use crate::outcome::{fold, Outcome};
use crate::scope::Scope;
use crate::value::Value;
use std::sync::Arc;

/// A compiled pattern.
pub type Matcher = Arc<dyn Fn(&Scope, &Value) -> Outcome<Scope> + Send + Sync>;

/// A record field name paired with the pattern its value must match.
pub type FieldPattern = (String, Matcher);

/// Matches anything without binding.
pub fn wildcard() -> Matcher {
    Arc::new(|scope: &Scope, _: &Value| Outcome::Success(scope.clone()))
}

/// Matches values strictly equal to `expected`.
pub fn literal(expected: Value) -> Matcher {
    Arc::new(move |scope: &Scope, value: &Value| {
        Outcome::when(expected.strict_eq(value), scope.clone())
    })
}

/// Matches anything, binding it to `name`.
pub fn binder(name: impl Into<String>) -> Matcher {
    let name = name.into();
    Arc::new(move |scope: &Scope, value: &Value| {
        Outcome::Success(scope.bind(name.clone(), value.clone()))
    })
}

/// Field shorthand: `k` means `k: k`.
pub fn shorthand(key: impl Into<String>) -> FieldPattern {
    let key = key.into();
    let matcher = binder(key.clone());
    (key, matcher)
}

fn match_fields(fields: &[FieldPattern], scope: &Scope, value: &Value) -> Outcome<Scope> {
    fold(scope.clone(), fields, |scope, (key, matcher), _| {
        matcher(&scope, &value.field(key))
    })
}

/// Matches a tagged record whose tag is `name`, then each field pattern.
pub fn tagged(name: impl Into<String>, fields: Vec<FieldPattern>) -> Matcher {
    let name = name.into();
    Arc::new(move |scope: &Scope, value: &Value| {
        if value.tag() != Some(name.as_str()) {
            return Outcome::Failure;
        }
        match_fields(&fields, scope, value)
    })
}

/// Matches each field pattern against the corresponding field.
pub fn object(fields: Vec<FieldPattern>) -> Matcher {
    Arc::new(move |scope: &Scope, value: &Value| match_fields(&fields, scope, value))
}

/// Matches each positional pattern against the corresponding element.
/// Extra elements are ignored; missing ones read as `undefined`.
pub fn array(items: Vec<Matcher>) -> Matcher {
    Arc::new(move |scope: &Scope, value: &Value| {
        fold(scope.clone(), &items, |scope, matcher, i| {
            matcher(&scope, &value.index(i))
        })
    })
}
