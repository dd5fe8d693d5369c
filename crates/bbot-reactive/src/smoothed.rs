//! Smoothing window over a reactive source.
//!
//! A [`SmoothedValue`] subscribes to a source cell and republishes a
//! windowed aggregate into its own output cell. Listeners attach to the
//! output cell and observe smoothed readings with the full condition
//! vocabulary; the raw source keeps its own listeners untouched.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use num_traits::Float;

use crate::observed::Observed;
use crate::value::{ListenerId, ReactiveValue};

/// How the window collapses into one reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmoothingMode {
    /// Plain arithmetic mean of the stored samples.
    Average,
    /// Weighted mean where the oldest sample weighs 1, the next 2, and so
    /// on, favoring recent readings while still damping spikes.
    Progressive,
}

fn collapse<T: Observed + Float>(ring: &VecDeque<T>, mode: SmoothingMode) -> T {
    let Some(&front) = ring.front() else {
        return T::zero();
    };
    if ring.len() == 1 {
        return front;
    }
    match mode {
        SmoothingMode::Average => {
            let mut sum = T::zero();
            let mut count = T::zero();
            for &sample in ring {
                sum = sum + sample;
                count = count + T::one();
            }
            sum / count
        }
        SmoothingMode::Progressive => {
            let mut sum = T::zero();
            let mut total_weight = T::zero();
            let mut weight = T::zero();
            for &sample in ring {
                weight = weight + T::one();
                sum = sum + sample * weight;
                total_weight = total_weight + weight;
            }
            sum / total_weight
        }
    }
}

struct SmoothedShared<T: Observed> {
    cell: ReactiveValue<T>,
    source: ReactiveValue<T>,
    subscription: ListenerId,
}

impl<T: Observed> Drop for SmoothedShared<T> {
    fn drop(&mut self) {
        self.source.remove(self.subscription);
    }
}

/// Shared handle to a smoothing window. Dropping the last handle
/// unsubscribes from the source.
pub struct SmoothedValue<T: Observed + Float> {
    shared: Rc<SmoothedShared<T>>,
}

impl<T: Observed + Float> Clone for SmoothedValue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T: Observed + Float> SmoothedValue<T> {
    /// Smooth `source` over a window of `window` samples. The window seeds
    /// with the source's current value; a zero window is treated as one.
    #[must_use]
    pub fn new(source: &ReactiveValue<T>, window: usize, mode: SmoothingMode) -> Self {
        let window = window.max(1);
        let initial = source.get();
        let cell = ReactiveValue::new(&source.scheduler(), initial);

        let subscription = {
            let output = cell.clone();
            let mut seed = VecDeque::with_capacity(window);
            seed.push_back(initial);
            let ring = RefCell::new(seed);
            source.on_updated(move |sample| {
                let smoothed = {
                    let mut ring = ring.borrow_mut();
                    if ring.len() >= window {
                        ring.pop_front();
                    }
                    ring.push_back(*sample);
                    collapse(&ring, mode)
                };
                output.set(smoothed);
            })
        };

        Self {
            shared: Rc::new(SmoothedShared {
                cell,
                source: source.clone(),
                subscription,
            }),
        }
    }

    /// Current smoothed reading.
    #[must_use]
    pub fn get(&self) -> T {
        self.shared.cell.get()
    }

    /// Force one sample through the source, then read the smoothed value.
    #[must_use]
    pub fn get_forced(&self) -> T {
        let _ = self.shared.source.get_forced();
        self.shared.cell.get()
    }

    /// The output cell. Attach listeners here to observe smoothed
    /// readings.
    #[must_use]
    pub fn cell(&self) -> &ReactiveValue<T> {
        &self.shared.cell
    }

    /// The raw source feeding the window.
    #[must_use]
    pub fn source(&self) -> &ReactiveValue<T> {
        &self.shared.source
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
