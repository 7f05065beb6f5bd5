//! Versioned shared-state cells
//!
//! The sense loop and the optimizer worker hand data off through
//! [`StateCell`]s: single writer, many readers, and a sequence number that
//! bumps on every publish. A reader never observes a half-written value
//! (the lock guarantees that), and the sequence number lets the optimizer
//! notice when its publisher has gone quiet - the in-process replacement
//! for the original deployment's "input file vanished" termination signal.

use std::sync::{Arc, PoisonError, RwLock};

/// One versioned slot: sequence number plus the latest value
#[derive(Debug)]
struct Versioned<T> {
    seq: u64,
    value: Option<T>,
}

/// Sequence-numbered single-writer cell
#[derive(Debug)]
pub struct StateCell<T> {
    slot: RwLock<Versioned<T>>,
}

impl<T> Default for StateCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> StateCell<T> {
    /// Empty cell at sequence 0
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(Versioned { seq: 0, value: None }),
        }
    }

    /// Publishes a new value, returning the new sequence number
    pub fn publish(&self, value: T) -> u64 {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        slot.seq += 1;
        slot.value = Some(value);
        slot.seq
    }

    /// Current sequence number (0 = never published)
    pub fn seq(&self) -> u64 {
        self.slot.read().unwrap_or_else(PoisonError::into_inner).seq
    }
}

impl<T: Clone> StateCell<T> {
    /// Latest value with its sequence number; `None` before first publish
    pub fn snapshot(&self) -> Option<(u64, T)> {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        slot.value.clone().map(|value| (slot.seq, value))
    }
}

/// The two cells the controller loops share
#[derive(Debug, Default)]
pub struct SharedState {
    /// Latest illuminance vector, lux, in node order
    pub illuminance: StateCell<Vec<f32>>,
    /// Latest target vector, lux, in node order
    pub targets: StateCell<Vec<f32>>,
}

impl SharedState {
    /// Fresh cells behind an `Arc` for sharing across loops
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}
