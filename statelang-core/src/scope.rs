//! Immutable identifier bindings.

use crate::value::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Bindings accumulated while matching a rule.
///
/// Binding never mutates a scope; [`Scope::bind`] returns an extended copy,
/// so a failed alternative cannot leak bindings into the scope it started
/// from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    bindings: Arc<BTreeMap<String, Value>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new scope with `name` bound to `value`.
    pub fn bind(&self, name: impl Into<String>, value: Value) -> Scope {
        let mut bindings = (*self.bindings).clone();
        bindings.insert(name.into(), value);
        Scope {
            bindings: Arc::new(bindings),
        }
    }

    /// Looks up a binding; absent names read as `undefined`.
    pub fn get(&self, name: &str) -> Value {
        self.bindings.get(name).cloned().unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Scope {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Scope {
            bindings: Arc::new(iter.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_does_not_mutate_original() {
        let base = Scope::new().bind("a", Value::from(1));
        let extended = base.bind("b", Value::from(2));

        assert_eq!(base.len(), 1);
        assert!(!base.contains("b"));
        assert_eq!(extended.get("a"), Value::from(1));
        assert_eq!(extended.get("b"), Value::from(2));
    }

    #[test]
    fn test_rebinding_shadows() {
        let scope = Scope::new().bind("x", Value::from(1)).bind("x", Value::from(2));
        assert_eq!(scope.get("x"), Value::from(2));
        assert_eq!(scope.len(), 1);
    }

    #[test]
    fn test_missing_reads_undefined() {
        assert!(Scope::new().get("nope").is_undefined());
    }

    #[test]
    fn test_from_iterator() {
        let scope: Scope = [("a", Value::from(true))].into_iter().collect();
        assert_eq!(scope.get("a"), Value::Bool(true));
        assert_eq!(scope.iter().count(), 1);
    }
}
