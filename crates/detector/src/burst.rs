//! Recon burstiness scoring.
//!
//! Rapid-fire assistant invocations are a run-up pattern worth surfacing.
//! The score combines the coefficient of variation of inter-arrival times
//! with action density, on a 0 to 10 scale. It only annotates findings; it
//! never changes severity or intent.

use chrono::{DateTime, Utc};

/// Score an actor's recon timestamps. Fewer than two events score 0;
/// simultaneous events score the maximum.
pub fn burstiness_score(timestamps: &[DateTime<Utc>]) -> f64 {
    if timestamps.len() < 2 {
        return 0.0;
    }

    let mut sorted = timestamps.to_vec();
    sorted.sort();

    let intervals: Vec<f64> = sorted
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_milliseconds() as f64 / 1000.0)
        .collect();

    let max_interval = intervals.iter().cloned().fold(0.0_f64, f64::max);
    if max_interval == 0.0 {
        return 10.0;
    }

    let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
    if mean == 0.0 {
        return 10.0;
    }

    let variance = intervals
        .iter()
        .map(|i| (i - mean) * (i - mean))
        .sum::<f64>()
        / intervals.len() as f64;
    let cv = variance.sqrt() / mean;

    let action_density = timestamps.len() as f64 / (max_interval / 60.0);

    (cv * 2.0 + action_density * 0.5).min(10.0)
}

/// True when the pattern clears the configured threshold.
pub fn is_burst(timestamps: &[DateTime<Utc>], threshold: f64) -> bool {
    burstiness_score(timestamps) >= threshold
}
