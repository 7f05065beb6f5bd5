//! Discounted Motion History for Occupancy Decisions
//!
//! ## Overview
//!
//! This module turns a stream of noisy binary motion samples into a stable
//! occupancy decision. Raw PIR output flickers: a person sitting still reads
//! as long runs of zeros punctuated by short bursts of ones, and electrical
//! noise produces isolated ones in an empty room. Debouncing happens by
//! scoring a bounded history of recent samples with a geometric discount.
//!
//! ## Design Rationale
//!
//! ### Why a Fixed-Size Ring?
//!
//! The history lives on sensing nodes with tight memory budgets, so capacity
//! is a compile-time constant and storage is a plain array:
//! - O(1) insertion (overwrites oldest when full)
//! - O(N) scoring, newest to oldest
//! - Zero heap allocations
//!
//! ### Scoring
//!
//! With samples `m[0..len]` ordered newest first and discount `α ∈ (0,1)`:
//!
//! ```text
//! score = Σ m[i] · αⁱ
//! ```
//!
//! A motion sample seen just now contributes 1.0; one seen k polls ago
//! contributes αᵏ. The score is bounded by the geometric series
//! `Σ αⁱ for i < N`, and a single fresh sample always scores exactly 1.0.
//! The discount is accumulated by running multiplication, so scoring never
//! calls `powf`.
//!
//! ### Decision Thresholds
//!
//! Two thresholds guard the binary decision:
//! - `steady_threshold` (0.8) once the history is full
//! - `fill_threshold` (1.0) while it is still filling
//!
//! The stricter fill threshold means a cold-started node needs motion in the
//! newest sample to declare the room occupied, instead of extrapolating from
//! a handful of samples.
//!
//! ## Usage Example
//!
//! ```rust
//! use lumigrid_core::occupancy::OccupancyTracker;
//!
//! // Node-sized tracker: 500 samples at ~0.15s cadence covers ~75s.
//! let mut tracker: OccupancyTracker<500> = OccupancyTracker::new();
//!
//! tracker.record(true);
//! assert!(tracker.is_occupied()); // fresh motion scores 1.0
//! ```
//!
//! ## Thread Safety
//!
//! Not thread-safe. The node runtime wraps the tracker in a mutex because a
//! polling loop writes it while the responder reads it.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Fixed-capacity motion sample ring, iterated newest first
///
/// ## Type Parameter
///
/// - `N`: number of samples retained. Deployed nodes use 500 (~75s at the
///   0.15s poll cadence); the controller's local tracker uses 10.
///
/// ## Internal Invariants
///
/// - `write_pos < N` (next write position is always valid)
/// - `len <= N` (never claim more samples than capacity)
/// - Logical index 0 is the most recent sample
#[derive(Clone)]
pub struct MotionHistory<const N: usize> {
    /// Sample storage; slots beyond `len` are dead values, never read
    data: [bool; N],

    /// Index where the next write will occur, wraps at N
    write_pos: usize,

    /// Current number of valid samples, saturates at N
    len: usize,
}

impl<const N: usize> MotionHistory<N> {
    /// Creates an empty history
    ///
    /// Const so trackers can live in statics on node builds.
    pub const fn new() -> Self {
        Self {
            data: [false; N],
            write_pos: 0,
            len: 0,
        }
    }

    /// Records a sample, dropping the oldest when full
    pub fn push(&mut self, motion: bool) {
        self.data[self.write_pos] = motion;
        self.write_pos = (self.write_pos + 1) % N;

        if self.len < N {
            self.len += 1;
        }
    }

    /// Number of stored samples
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if no samples are stored
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True if the ring has reached capacity
    pub fn is_full(&self) -> bool {
        self.len == N
    }

    /// Discards all samples
    pub fn clear(&mut self) {
        self.write_pos = 0;
        self.len = 0;
    }

    /// Sample by logical index (0 = newest, len-1 = oldest)
    ///
    /// The newest sample sits one slot behind `write_pos`; older samples
    /// walk backwards through the ring:
    ///
    /// ```text
    /// Physical array:  [D, E, A, B, C]   (write_pos = 2, full)
    ///                   0  1  2  3  4
    ///
    /// Newest-first:    [E, D, C, B, A]
    ///                   0  1  2  3  4
    ///
    /// Mapping: logical[k] = physical[(write_pos + N - 1 - k) % N]
    /// ```
    pub fn get(&self, index: usize) -> Option<bool> {
        if index >= self.len {
            return None;
        }
        let physical = (self.write_pos + N - 1 - index) % N;
        Some(self.data[physical])
    }

    /// Iterates samples from newest to oldest
    pub fn iter(&self) -> MotionHistoryIter<'_, N> {
        MotionHistoryIter {
            history: self,
            index: 0,
        }
    }
}

impl<const N: usize> Default for MotionHistory<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over motion samples, newest first
pub struct MotionHistoryIter<'a, const N: usize> {
    history: &'a MotionHistory<N>,
    index: usize,
}

impl<'a, const N: usize> Iterator for MotionHistoryIter<'a, N> {
    type Item = bool;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.history.get(self.index)?;
        self.index += 1;
        Some(item)
    }
}

/// Scoring and decision parameters
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OccupancyConfig {
    /// Geometric discount per poll step, in (0, 1)
    pub alpha: f32,
    /// Occupied when score reaches this and the history is full
    pub steady_threshold: f32,
    /// Occupied when score reaches this while the history is filling;
    /// stricter than `steady_threshold` to suppress cold-start positives
    pub fill_threshold: f32,
}

impl Default for OccupancyConfig {
    /// Node profile: slow decay sized for the 0.15s poll cadence
    fn default() -> Self {
        Self {
            alpha: 0.995,
            steady_threshold: 0.8,
            fill_threshold: 1.0,
        }
    }
}

impl OccupancyConfig {
    /// Profile for short controller-local histories (fast decay)
    pub fn fast_decay() -> Self {
        Self {
            alpha: 0.9,
            ..Self::default()
        }
    }
}

/// Binary occupancy decision over a discounted motion history
#[derive(Clone, Default)]
pub struct OccupancyTracker<const N: usize> {
    history: MotionHistory<N>,
    config: OccupancyConfig,
}

impl<const N: usize> OccupancyTracker<N> {
    /// Tracker with the default node profile
    pub fn new() -> Self {
        Self::with_config(OccupancyConfig::default())
    }

    /// Tracker with explicit scoring parameters
    pub fn with_config(config: OccupancyConfig) -> Self {
        Self {
            history: MotionHistory::new(),
            config,
        }
    }

    /// Scoring parameters in effect
    pub fn config(&self) -> &OccupancyConfig {
        &self.config
    }

    /// Records one motion sample
    pub fn record(&mut self, motion: bool) {
        self.history.push(motion);
    }

    /// Number of samples observed (saturates at capacity)
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// True if no samples have been recorded
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// True once the history has reached capacity
    pub fn is_full(&self) -> bool {
        self.history.is_full()
    }

    /// Discards history, returning the tracker to cold start
    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Discounted motion score, newest sample weighted 1.0
    pub fn score(&self) -> f32 {
        let mut score = 0.0;
        let mut weight = 1.0;
        for motion in self.history.iter() {
            if motion {
                score += weight;
            }
            weight *= self.config.alpha;
        }
        score
    }

    /// Binary decision per the configured thresholds
    pub fn is_occupied(&self) -> bool {
        let threshold = if self.history.is_full() {
            self.config.steady_threshold
        } else {
            self.config.fill_threshold
        };
        self.score() >= threshold
    }
}
