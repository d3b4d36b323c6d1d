//! Success/failure combinators.
//!
//! Every matcher, condition step and effect in a compiled machine reports a
//! mismatch as [`Outcome::Failure`] rather than an error: a failed match is
//! expected data, not an exceptional condition.

/// The result of a match or evaluation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Outcome<T> {
    Success(T),
    Failure,
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure)
    }

    /// Applies `f` to a success payload; failure passes through.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::Failure => Outcome::Failure,
        }
    }

    /// Chains a step that may itself fail.
    pub fn and_then<U, F: FnOnce(T) -> Outcome<U>>(self, f: F) -> Outcome<U> {
        match self {
            Outcome::Success(value) => f(value),
            Outcome::Failure => Outcome::Failure,
        }
    }

    /// Converts to `Option`.
    pub fn success(self) -> Option<T> {
        match self {
            Outcome::Success(value) => Some(value),
            Outcome::Failure => None,
        }
    }

    /// Succeeds with `value` when `cond` holds.
    pub fn when(cond: bool, value: T) -> Outcome<T> {
        if cond {
            Outcome::Success(value)
        } else {
            Outcome::Failure
        }
    }
}

impl<T> From<Option<T>> for Outcome<T> {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(value) => Outcome::Success(value),
            None => Outcome::Failure,
        }
    }
}

/// Threads an accumulator and the 0-based index through `f`, stopping at
/// the first failure.
pub fn fold<A, X, I, F>(init: A, items: I, mut f: F) -> Outcome<A>
where
    I: IntoIterator<Item = X>,
    F: FnMut(A, X, usize) -> Outcome<A>,
{
    let mut acc = init;
    for (i, item) in items.into_iter().enumerate() {
        match f(acc, item, i) {
            Outcome::Success(next) => acc = next,
            Outcome::Failure => return Outcome::Failure,
        }
    }
    Outcome::Success(acc)
}

/// Returns the first success, or failure if there is none.
///
/// Alternatives are pulled lazily, so nothing after the winner is evaluated.
pub fn first_success<T, I>(alternatives: I) -> Outcome<T>
where
    I: IntoIterator<Item = Outcome<T>>,
{
    alternatives
        .into_iter()
        .find(Outcome::is_success)
        .unwrap_or(Outcome::Failure)
}
