//! Value-producing expressions.

use crate::scope::Scope;
use crate::value::{HostFn, Record, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A compiled expression.
pub type Evaluator = Arc<dyn Fn(&Scope) -> Value + Send + Sync>;

/// A record field name paired with the expression producing its value.
pub type FieldExpr = (String, Evaluator);

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Pow => "**",
        }
    }

    /// Applies the operator. `+` concatenates when either side is a string
    /// or a composite; everything else is numeric.
    pub fn apply(&self, l: &Value, r: &Value) -> Value {
        match self {
            BinaryOp::Add => match (l, r) {
                (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
                (Value::String(_) | Value::List(_) | Value::Record(_), _)
                | (_, Value::String(_) | Value::List(_) | Value::Record(_)) => {
                    Value::String(format!("{}{}", l, r))
                }
                _ => Value::Number(l.to_number() + r.to_number()),
            },
            BinaryOp::Sub => Value::Number(l.to_number() - r.to_number()),
            BinaryOp::Mul => Value::Number(l.to_number() * r.to_number()),
            BinaryOp::Div => Value::Number(l.to_number() / r.to_number()),
            BinaryOp::Rem => Value::Number(l.to_number() % r.to_number()),
            BinaryOp::Pow => Value::Number(l.to_number().powf(r.to_number())),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for BinaryOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "+" => Ok(BinaryOp::Add),
            "-" => Ok(BinaryOp::Sub),
            "*" => Ok(BinaryOp::Mul),
            "/" => Ok(BinaryOp::Div),
            "%" => Ok(BinaryOp::Rem),
            "**" => Ok(BinaryOp::Pow),
            other => Err(format!("unknown operator '{}'", other)),
        }
    }
}

/// Always produces `value`.
pub fn constant(value: Value) -> Evaluator {
    Arc::new(move |_: &Scope| value.clone())
}

/// Reads `name` from the scope.
pub fn lookup(name: impl Into<String>) -> Evaluator {
    let name = name.into();
    Arc::new(move |scope: &Scope| scope.get(&name))
}

/// Field shorthand: `k` means `k: k`.
pub fn shorthand(key: impl Into<String>) -> FieldExpr {
    let key = key.into();
    let eval = lookup(key.clone());
    (key, eval)
}

fn build_record(mut record: Record, fields: &[FieldExpr], scope: &Scope) -> Value {
    for (key, eval) in fields {
        record.insert(key.clone(), eval(scope));
    }
    Value::from(record)
}

/// Constructs `{type: name, ...fields}`.
pub fn tagged(name: impl Into<String>, fields: Vec<FieldExpr>) -> Evaluator {
    let name = name.into();
    Arc::new(move |scope: &Scope| {
        let mut base = Record::new();
        base.insert(crate::value::TAG_FIELD.to_string(), Value::String(name.clone()));
        build_record(base, &fields, scope)
    })
}

/// Constructs a plain record.
pub fn record(fields: Vec<FieldExpr>) -> Evaluator {
    Arc::new(move |scope: &Scope| build_record(Record::new(), &fields, scope))
}

/// Constructs a list.
pub fn list(items: Vec<Evaluator>) -> Evaluator {
    Arc::new(move |scope: &Scope| Value::list(items.iter().map(|item| item(scope))))
}

/// Applies `op` to both operands, each evaluated against the same scope.
pub fn binary(op: BinaryOp, l: Evaluator, r: Evaluator) -> Evaluator {
    Arc::new(move |scope: &Scope| op.apply(&l(scope), &r(scope)))
}

/// Folds `head (op operand)*` left-associatively.
pub fn chain(head: Evaluator, tail: Vec<(BinaryOp, Evaluator)>) -> Evaluator {
    tail.into_iter()
        .fold(head, |acc, (op, operand)| binary(op, acc, operand))
}

/// Invokes a host function with the current scope.
pub fn host_call(f: HostFn) -> Evaluator {
    Arc::new(move |scope: &Scope| f.call(scope))
}
