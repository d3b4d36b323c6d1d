//! Dynamic values.
//!
//! States, events and scope bindings are all [`Value`]s. A tagged record is
//! a [`Value::Record`] whose `type` field names the tag:
//!
//! ```
//! use statelang_core::Value;
//!
//! let running = Value::tagged("Running", [("count", Value::from(2))]);
//! assert_eq!(running.tag(), Some("Running"));
//! assert_eq!(running.field("count"), Value::from(2));
//! ```
//!
//! Lists and records are reference-counted. Cloning a value shares it, and
//! identity comparisons ([`Value::strict_eq`]) on composites compare the
//! shared allocation rather than the contents.

use crate::scope::Scope;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Field holding the tag of a tagged record.
pub const TAG_FIELD: &str = "type";

/// Record fields.
pub type Record = BTreeMap<String, Value>;

/// A value produced later, for `await` effects.
pub type Deferred = Pin<Box<dyn Future<Output = Value> + Send + 'static>>;

/// A lazy sequence of events, for `exec` effects.
pub type EventIter = Box<dyn Iterator<Item = Value> + Send>;

/// A dynamically typed value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Arc<Vec<Value>>),
    Record(Arc<Record>),
    Callable(HostFn),
}

impl Value {
    /// Builds a tagged record `{type: name, ...fields}`.
    pub fn tagged<K, I>(name: &str, fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let mut record = Record::new();
        record.insert(TAG_FIELD.to_string(), Value::String(name.to_string()));
        for (key, value) in fields {
            record.insert(key.into(), value);
        }
        Value::Record(Arc::new(record))
    }

    /// Builds a tagged record with no fields.
    pub fn tag_only(name: &str) -> Self {
        Self::tagged::<String, _>(name, [])
    }

    /// Builds a plain record.
    pub fn record<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Record(Arc::new(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// Builds a list.
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(Arc::new(items.into_iter().collect()))
    }

    /// Returns the tag of a tagged record.
    pub fn tag(&self) -> Option<&str> {
        match self {
            Value::Record(record) => match record.get(TAG_FIELD) {
                Some(Value::String(tag)) => Some(tag),
                _ => None,
            },
            _ => None,
        }
    }

    /// Reads a record field; anything else reads as `undefined`.
    pub fn field(&self, key: &str) -> Value {
        match self {
            Value::Record(record) => record.get(key).cloned().unwrap_or_default(),
            _ => Value::Undefined,
        }
    }

    /// Reads a list element; anything else reads as `undefined`.
    pub fn index(&self, i: usize) -> Value {
        match self {
            Value::List(items) => items.get(i).cloned().unwrap_or_default(),
            _ => Value::Undefined,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_callable(&self) -> Option<&HostFn> {
        match self {
            Value::Callable(f) => Some(f),
            _ => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Name of the variant, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Record(_) => "record",
            Value::Callable(_) => "callable",
        }
    }

    /// Truthiness: `undefined`, `null`, `false`, `0`, `NaN` and `""` are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::List(_) | Value::Record(_) | Value::Callable(_) => true,
        }
    }

    /// Numeric coercion used by arithmetic and ordering.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => {
                let s = s.trim();
                if s.is_empty() {
                    0.0
                } else {
                    s.parse().unwrap_or(f64::NAN)
                }
            }
            Value::Undefined | Value::List(_) | Value::Record(_) | Value::Callable(_) => f64::NAN,
        }
    }

    /// Strict identity: primitives compare by value, composites and
    /// callables by shared allocation.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
            (Value::Record(a), Value::Record(b)) => Arc::ptr_eq(a, b),
            (Value::Callable(a), Value::Callable(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Converts to JSON. `undefined`, callables and non-finite numbers
    /// become `null`.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Undefined | Value::Null | Value::Callable(_) => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::List(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
            Value::Record(record) => JsonValue::Object(
                record
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

/// Structural equality. Numbers compare with `==` (so `NaN` is unequal to
/// itself); callables compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::Record(a), Value::Record(b)) => Arc::ptr_eq(a, b) || a == b,
            _ => self.strict_eq(other),
        }
    }
}

pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let s = if n > 0.0 { "Infinity" } else { "-Infinity" };
        s.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
            Value::Record(record) => {
                write!(f, "{{")?;
                for (i, (k, v)) in record.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Callable(func) => write!(f, "[fn {}]", func.name()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(Arc::new(items))
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Record(Arc::new(record))
    }
}

impl From<HostFn> for Value {
    fn from(f: HostFn) -> Self {
        Value::Callable(f)
    }
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            JsonValue::String(s) => Value::String(s),
            JsonValue::Array(items) => Value::list(items.into_iter().map(Value::from)),
            JsonValue::Object(map) => Value::record(map.into_iter().map(|(k, v)| (k, Value::from(v)))),
        }
    }
}

enum HostCall {
    Immediate(Box<dyn Fn(&Scope) -> Value + Send + Sync>),
    Deferred(Box<dyn Fn(&Scope) -> Deferred + Send + Sync>),
    Events(Box<dyn Fn(&Scope) -> EventIter + Send + Sync>),
}

struct HostFnInner {
    name: String,
    call: HostCall,
}

/// An opaque host capability, invoked with the scope of the match that
/// reached it.
///
/// Identity is by handle: clones of one `HostFn` are the same function,
/// two separately constructed ones never are.
#[derive(Clone)]
pub struct HostFn(Arc<HostFnInner>);

impl HostFn {
    /// A synchronous callable.
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Scope) -> Value + Send + Sync + 'static,
    {
        Self::with_call(name, HostCall::Immediate(Box::new(f)))
    }

    /// A callable producing its value asynchronously.
    pub fn deferred<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Scope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Value> + Send + 'static,
    {
        Self::with_call(
            name,
            HostCall::Deferred(Box::new(move |scope: &Scope| -> Deferred { Box::pin(f(scope)) })),
        )
    }

    /// A callable producing a lazy sequence of events.
    pub fn events<F, I>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Scope) -> I + Send + Sync + 'static,
        I: IntoIterator<Item = Value>,
        I::IntoIter: Send + 'static,
    {
        Self::with_call(
            name,
            HostCall::Events(Box::new(move |scope: &Scope| -> EventIter {
                Box::new(f(scope).into_iter())
            })),
        )
    }

    fn with_call(name: impl Into<String>, call: HostCall) -> Self {
        Self(Arc::new(HostFnInner {
            name: name.into(),
            call,
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Invokes the callable synchronously.
    pub fn call(&self, scope: &Scope) -> Value {
        match &self.0.call {
            HostCall::Immediate(f) => f(scope),
            HostCall::Deferred(_) | HostCall::Events(_) => {
                tracing::warn!(
                    "host function '{}' cannot be called synchronously; yielding undefined",
                    self.name()
                );
                Value::Undefined
            }
        }
    }

    /// Invokes the callable, returning a future of its result.
    pub fn call_deferred(&self, scope: &Scope) -> Deferred {
        match &self.0.call {
            HostCall::Deferred(f) => f(scope),
            HostCall::Immediate(_) | HostCall::Events(_) => {
                let value = self.call(scope);
                Box::pin(async move { value })
            }
        }
    }

    /// Invokes the callable, returning the sequence of events it produces.
    ///
    /// A synchronous result that is a list is iterated; any other
    /// synchronous result is a single event.
    pub fn call_events(&self, scope: &Scope) -> EventIter {
        match &self.0.call {
            HostCall::Events(f) => f(scope),
            HostCall::Immediate(f) => match f(scope) {
                Value::List(items) => Box::new((*items).clone().into_iter()),
                value => Box::new(std::iter::once(value)),
            },
            HostCall::Deferred(_) => {
                tracing::warn!(
                    "host function '{}' is asynchronous and cannot produce events",
                    self.name()
                );
                Box::new(std::iter::empty())
            }
        }
    }

    /// Returns true if both handles refer to the same function.
    pub fn ptr_eq(&self, other: &HostFn) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for HostFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HostFn").field(&self.0.name).finish()
    }
}
