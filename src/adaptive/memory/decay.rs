//! Power-law forgetting curve.

use chrono::{DateTime, Utc};

use crate::constants::MILLIS_PER_DAY;

/// Factor 9 makes `stability` the number of days until recall drops to ~90%.
const STABILITY_SCALE: f64 = 9.0;

/// Probability of recall after `elapsed_days` for an item with the given stability.
///
/// Returns `1.0` for degenerate inputs (`stability <= 0` or negative elapsed time).
pub fn retrievability(stability: f64, elapsed_days: f64, decay_sharpness: f64) -> f64 {
    if stability <= 0.0 || elapsed_days < 0.0 {
        return 1.0;
    }
    let base = 1.0 + elapsed_days / (STABILITY_SCALE * stability);
    base.powf(-1.0 / decay_sharpness).clamp(0.0, 1.0)
}

/// Fractional days between two instants; negative if `to` precedes `from`.
pub fn elapsed_days(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / MILLIS_PER_DAY as f64
}

/// Interval, in days, after which retrievability falls to `target_retention`.
pub fn interval_days(stability: f64, target_retention: f64, decay_sharpness: f64) -> f64 {
    let target = target_retention.clamp(1e-6, 1.0);
    stability * ((1.0 / target).powf(decay_sharpness) - 1.0) * STABILITY_SCALE
}
