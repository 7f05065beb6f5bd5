//! Minimal-power dimming plans
//!
//! Builds a small calibrated room model and plans dimming vectors for a
//! few occupancy scenarios, including the unreachable-target fallback.
//!
//! Run with: `cargo run --example 02_dimming_plan`

use lumigrid_core::{plan_dimming, GainModel, PowerModel};

fn main() {
    // Two desks under three bulbs; bulb 1 spills onto both desks.
    // Desk 0 gets 20 lux of daylight, desk 1 sits in the shade.
    let model = GainModel::from_parts(
        vec![vec![320.0, 80.0, 10.0], vec![15.0, 90.0, 280.0]],
        vec![20.0, 0.0],
    )
    .unwrap();
    let power = PowerModel::default();

    let scenarios: &[(&str, Vec<f32>)] = &[
        ("both desks occupied", vec![200.0, 200.0]),
        ("only desk 0 occupied", vec![200.0, 0.0]),
        ("empty room", vec![0.0, 0.0]),
        ("unreachable (midday sun target)", vec![2000.0, 2000.0]),
    ];

    for (name, targets) in scenarios {
        let plan = plan_dimming(&model, targets, &power).unwrap();
        println!("{name}:");
        println!("  levels    {:?}", plan.levels);
        println!("  power     {:.2} W", plan.power_estimate);
        println!("  feasible  {}", plan.satisfies_targets);

        let delivered = model.predicted_illuminance(&plan.levels).unwrap();
        println!("  delivered {delivered:?} lux\n");
    }
}
