//! Small numeric helpers shared by the detector and the scheduler.

use crate::models::CompletionStatus;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Division that yields 0 for a zero (or non-positive) baseline instead of NaN/Inf.
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Trailing moving average; one output per full window.
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || values.len() < window {
        return Vec::new();
    }
    values.windows(window).map(mean).collect()
}

/// Least-squares slope of `values` against their index. 0 for fewer than two points.
pub fn linear_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean(values);
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        numerator += dx * (y - y_mean);
        denominator += dx * dx;
    }
    ratio(numerator, denominator)
}

pub fn strictly_decreasing(values: &[i32]) -> bool {
    values.windows(2).all(|pair| pair[1] < pair[0])
}

pub fn strictly_increasing(values: &[i32]) -> bool {
    values.windows(2).all(|pair| pair[1] > pair[0])
}

pub fn tail<T>(values: &[T], count: usize) -> &[T] {
    &values[values.len().saturating_sub(count)..]
}

/// Completion rate over the last `count` outcomes, or `None` when fewer exist.
pub fn recent_completion_rate(outcomes: &[CompletionStatus], count: usize) -> Option<f64> {
    if count == 0 || outcomes.len() < count {
        return None;
    }
    Some(completion_rate(tail(outcomes, count)))
}

pub fn completion_rate(outcomes: &[CompletionStatus]) -> f64 {
    let completed = outcomes
        .iter()
        .filter(|status| **status == CompletionStatus::Completed)
        .count();
    ratio(completed as f64, outcomes.len() as f64)
}
