//! # statelang-core
//!
//! Compiler building blocks and runtime for statelang machines.
//!
//! This crate provides:
//! - A dynamic value model with tagged records and host callables
//! - Pattern, expression, condition, event and effect compilers, each
//!   producing composable closures
//! - Machine aggregation and the event-driven [`Store`]
//! - Runtime configuration

pub mod cond;
pub mod config;
pub mod effect;
pub mod error;
pub mod event;
pub mod expr;
pub mod machine;
pub mod outcome;
pub mod pattern;
pub mod runtime;
pub mod scope;
pub mod value;

pub use cond::{CompareOp, Predicate};
pub use config::{ConfigError, RuntimeConfig};
pub use effect::{Action, EffectFn, Reaction, Thunk};
pub use error::CoreError;
pub use event::{MatchContext, Step};
pub use expr::{BinaryOp, Evaluator};
pub use machine::{compile, Declaration};
pub use outcome::Outcome;
pub use pattern::Matcher;
pub use runtime::{DispatchOutcome, ExtensionRule, Rule, Store, Subscription};
pub use scope::Scope;
pub use value::{HostFn, Record, Value};
