//! Occupancy scoring walkthrough
//!
//! Feeds a noisy motion pattern into a tracker and prints the discounted
//! score and decision after each sample, showing the cold-start guard and
//! the geometric decay.
//!
//! Run with: `cargo run --example 01_occupancy_scoring`

use lumigrid_core::occupancy::{OccupancyConfig, OccupancyTracker};

fn main() {
    // Short controller-local profile so the decay is visible
    let mut tracker: OccupancyTracker<10> =
        OccupancyTracker::with_config(OccupancyConfig::fast_decay());

    // A person walks in (burst of motion), sits still, then leaves
    let samples = [
        false, false, // empty room
        true, true, true, // walking in
        false, false, false, false, // sitting still
        true, // shifting in the chair
        false, false, false, false, false, false, false, false, // gone
    ];

    println!("sample  score   filling  occupied");
    for (i, &motion) in samples.iter().enumerate() {
        tracker.record(motion);
        println!(
            "{:>6}  {:>6.3}  {:>7}  {}",
            format!("{} ({})", i, if motion { "1" } else { "0" }),
            tracker.score(),
            !tracker.is_full(),
            if tracker.is_occupied() { "yes" } else { "no" },
        );
    }

    println!();
    println!(
        "thresholds: {} steady / {} while filling",
        tracker.config().steady_threshold,
        tracker.config().fill_threshold
    );
}
