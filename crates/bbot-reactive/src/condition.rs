//! Listener trigger conditions.

use crate::observed::Observed;

/// When a listener fires, evaluated against each incoming value.
///
/// Range conditions are half-open: `InRange` is `min <= value < max` and
/// `OutOfRange` is its complement. `Changed` compares against the last
/// value that fired a change listener, not the previous value, so a slow
/// drift still accumulates into a change. `AnyUpdate` fires on every set,
/// including sets of an unchanged value.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition<T> {
    EqualTo(T),
    NotEqualTo(T),
    LessThan(T),
    MoreThan(T),
    InRange { min: T, max: T },
    OutOfRange { min: T, max: T },
    Changed,
    AnyUpdate,
}

impl<T: Observed> Condition<T> {
    /// Evaluate against `value`, with `baseline` and `threshold` feeding
    /// the `Changed` comparison. Without a threshold any evaluation of
    /// `Changed` counts as a change.
    #[must_use]
    pub fn matches(&self, value: &T, baseline: &T, threshold: Option<&T>) -> bool {
        match self {
            Condition::EqualTo(expected) => value.tolerant_eq(expected),
            Condition::NotEqualTo(expected) => !value.tolerant_eq(expected),
            Condition::LessThan(limit) => value < limit,
            Condition::MoreThan(limit) => value > limit,
            Condition::InRange { min, max } => value >= min && value < max,
            Condition::OutOfRange { min, max } => value < min || value >= max,
            Condition::Changed => match threshold {
                Some(step) => value.exceeds_threshold(baseline, step),
                None => true,
            },
            Condition::AnyUpdate => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
