//! Value domain for reactive cells.
//!
//! [`Observed`] is the bound every cell value satisfies. It layers two
//! domain comparisons on top of plain equality:
//!
//! - `tolerant_eq`, the equality listeners and the unchanged-set filter
//!   use. Floats compare within a relative-plus-absolute tolerance so a
//!   value round-tripped through sensor scaling still counts as equal.
//! - `exceeds_threshold`, the change-listener comparison. For composite
//!   values the threshold has the same shape as the value and the move
//!   counts as a change when any element moves by at least its threshold.

use std::collections::BTreeMap;
use std::fmt;

/// Relative float tolerance, proportional to the larger magnitude.
pub const REL_TOLERANCE: f64 = 1e-6;
/// Absolute float tolerance floor for comparisons near zero.
pub const ABS_TOLERANCE: f64 = 1e-9;

/// Tolerant float comparison. The exact-equality shortcut also makes
/// equal infinities compare equal.
fn close(a: f64, b: f64) -> bool {
    a == b || (a - b).abs() <= f64::max(REL_TOLERANCE * f64::max(a.abs(), b.abs()), ABS_TOLERANCE)
}

/// Types a [`ReactiveValue`](crate::ReactiveValue) can hold.
pub trait Observed: Clone + PartialEq + PartialOrd + fmt::Debug + 'static {
    /// Domain equality. Defaults to `==`; float implementations compare
    /// within tolerance.
    fn tolerant_eq(&self, other: &Self) -> bool {
        self == other
    }

    /// Whether moving from `baseline` to `self` counts as a change under
    /// `threshold`. Defaults to tolerant inequality for types where a
    /// numeric threshold has no meaning.
    fn exceeds_threshold(&self, baseline: &Self, threshold: &Self) -> bool {
        let _ = threshold;
        !self.tolerant_eq(baseline)
    }
}

impl Observed for f64 {
    fn tolerant_eq(&self, other: &Self) -> bool {
        close(*self, *other)
    }

    fn exceeds_threshold(&self, baseline: &Self, threshold: &Self) -> bool {
        (self - baseline).abs() >= *threshold
    }
}

impl Observed for f32 {
    fn tolerant_eq(&self, other: &Self) -> bool {
        close(f64::from(*self), f64::from(*other))
    }

    fn exceeds_threshold(&self, baseline: &Self, threshold: &Self) -> bool {
        (self - baseline).abs() >= *threshold
    }
}

macro_rules! impl_observed_signed {
    ($($t:ty),+ $(,)?) => {$(
        impl Observed for $t {
            fn exceeds_threshold(&self, baseline: &Self, threshold: &Self) -> bool {
                self.abs_diff(*baseline) >= threshold.unsigned_abs()
            }
        }
    )+};
}

macro_rules! impl_observed_unsigned {
    ($($t:ty),+ $(,)?) => {$(
        impl Observed for $t {
            fn exceeds_threshold(&self, baseline: &Self, threshold: &Self) -> bool {
                self.abs_diff(*baseline) >= *threshold
            }
        }
    )+};
}

impl_observed_signed!(i8, i16, i32, i64, i128, isize);
impl_observed_unsigned!(u8, u16, u32, u64, u128, usize);

impl Observed for bool {}
impl Observed for char {}
impl Observed for String {}
impl Observed for &'static str {}

macro_rules! impl_observed_tuple {
    ($(($($name:ident : $index:tt),+)),+ $(,)?) => {$(
        impl<$($name: Observed),+> Observed for ($($name,)+) {
            fn tolerant_eq(&self, other: &Self) -> bool {
                $(self.$index.tolerant_eq(&other.$index))&&+
            }

            fn exceeds_threshold(&self, baseline: &Self, threshold: &Self) -> bool {
                $(self.$index.exceeds_threshold(&baseline.$index, &threshold.$index))||+
            }
        }
    )+};
}

impl_observed_tuple!(
    (A: 0, B: 1),
    (A: 0, B: 1, C: 2),
    (A: 0, B: 1, C: 2, D: 3),
);

impl<K, V> Observed for BTreeMap<K, V>
where
    K: Ord + Clone + fmt::Debug + 'static,
    V: Observed,
{
    fn tolerant_eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .zip(other)
                .all(|((key_a, value_a), (key_b, value_b))| {
                    key_a == key_b && value_a.tolerant_eq(value_b)
                })
    }

    /// A reshaped map always counts as a change. With matching keys, any
    /// entry moving by at least its threshold counts. Keys missing from
    /// the threshold map fall back to tolerant inequality.
    fn exceeds_threshold(&self, baseline: &Self, threshold: &Self) -> bool {
        if self.len() != baseline.len() || self.keys().ne(baseline.keys()) {
            return true;
        }
        self.iter().any(|(key, value)| {
            let Some(base) = baseline.get(key) else {
                return true;
            };
            match threshold.get(key) {
                Some(step) => value.exceeds_threshold(base, step),
                None => !value.tolerant_eq(base),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
