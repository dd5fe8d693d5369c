#![forbid(unsafe_code)]

//! Reactive observation layer on top of the firmware core.
//!
//! A [`ReactiveValue`] is a single-threaded observable cell: sensor drivers
//! and logic blocks publish readings into it, listeners fire on the
//! conditions they registered for, and an optional refresh source keeps the
//! cell current through a scheduled task that exists only while someone is
//! listening. [`SmoothedValue`] and [`QuantityCell`] compose on top for
//! windowed readings and unit-aware display.

pub mod condition;
pub mod error;
pub mod observed;
pub mod quantity;
pub mod smoothed;
pub mod value;

pub use condition::Condition;
pub use error::QuantityError;
pub use observed::{ABS_TOLERANCE, Observed, REL_TOLERANCE};
pub use quantity::{QuantityCell, QuantityKind, Unit};
pub use smoothed::{SmoothedValue, SmoothingMode};
pub use value::{ListenerId, ReactiveValue};
