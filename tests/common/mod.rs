//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use histscope::chart::ChartCommand;
use histscope::scheduler::FetchRequest;
use std::time::Duration;

/// Fixed "now" used by deterministic tests
pub const NOW: f64 = 1_700_000_000.0;

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_secs(2)
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Fetch requests among chart commands
pub fn fetches(commands: &[ChartCommand]) -> Vec<FetchRequest> {
    commands
        .iter()
        .filter_map(|c| match c {
            ChartCommand::Fetch(r) => Some(r.clone()),
            _ => None,
        })
        .collect()
}
