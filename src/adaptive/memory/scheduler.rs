use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::adaptive::config::SchedulerConfig;
use crate::adaptive::types::Quality;

use super::decay;

/// Spaced-repetition state of one learnable item.
///
/// Treated as a value: [`review`] returns the next state and leaves the input untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewItem {
    pub id: String,
    #[serde(default)]
    pub subject: Option<String>,
    pub stability: f64,
    pub difficulty: f64,
    pub last_reviewed_at: DateTime<Utc>,
    pub next_due_at: DateTime<Utc>,
    pub lapse_count: u32,
    pub review_count: u32,
}

impl ReviewItem {
    /// Fresh item, due immediately.
    pub fn new(id: &str, subject: Option<&str>, config: &SchedulerConfig, now: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            subject: subject.map(str::to_string),
            stability: config.initial_stability,
            difficulty: config.initial_difficulty,
            last_reviewed_at: now,
            next_due_at: now,
            lapse_count: 0,
            review_count: 0,
        }
    }

    pub fn retrievability_at(&self, at: DateTime<Utc>, config: &SchedulerConfig) -> f64 {
        decay::retrievability(
            self.stability,
            decay::elapsed_days(self.last_reviewed_at, at),
            config.decay_sharpness,
        )
    }
}

pub fn create(config: &SchedulerConfig, now: DateTime<Utc>) -> ReviewItem {
    ReviewItem::new(&uuid::Uuid::new_v4().to_string(), None, config, now)
}

pub fn is_due(item: &ReviewItem, now: DateTime<Utc>) -> bool {
    item.next_due_at <= now
}

pub fn review(
    item: &ReviewItem,
    quality: Quality,
    now: DateTime<Utc>,
    config: &SchedulerConfig,
) -> ReviewItem {
    let r = item.retrievability_at(now, config);

    let stability = next_stability(item, quality, r, config);
    let difficulty = next_difficulty(item.difficulty, quality, config);
    let hours = interval_hours(stability, config);

    ReviewItem {
        id: item.id.clone(),
        subject: item.subject.clone(),
        stability,
        difficulty,
        last_reviewed_at: now,
        next_due_at: now + Duration::hours(hours),
        lapse_count: item.lapse_count + u32::from(quality.is_lapse()),
        review_count: item.review_count + 1,
    }
}

fn next_stability(item: &ReviewItem, quality: Quality, r: f64, config: &SchedulerConfig) -> f64 {
    let s = item.stability;
    let d = item.difficulty;

    let raw = match quality {
        Quality::Again => s * config.failure_stability_factor * 11f64.powf(d - 1.0),
        _ => {
            s * (11f64.powf(d) - 1.0)
                * (config.retrievability_gain * (1.0 - r)).exp()
                * (config.stability_growth_rate * s).exp()
                * (-config.lapse_penalty * item.lapse_count as f64).exp()
                * config.quality_factor(quality)
        }
    };

    clamp_or_min(raw, config.min_stability, config.max_stability)
}

fn next_difficulty(d: f64, quality: Quality, config: &SchedulerConfig) -> f64 {
    let reverted = config.difficulty_mean_reversion * (config.difficulty_baseline - d);
    clamp_or_min(d + config.difficulty_delta(quality) + reverted, 0.0, 1.0)
}

/// Hours until the item is next due, within the configured interval bounds.
pub fn interval_hours(stability: f64, config: &SchedulerConfig) -> i64 {
    let days = decay::interval_days(stability, config.target_retention, config.decay_sharpness);
    let hours = (days * 24.0).floor();
    if !hours.is_finite() {
        return config.max_interval_hours;
    }
    (hours as i64).clamp(config.min_interval_hours, config.max_interval_hours)
}

// NaN collapses to the lower bound instead of propagating into persisted state.
fn clamp_or_min(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SchedulerConfig {
        SchedulerConfig::default()
    }

    #[test]
    fn new_item_has_initial_values_and_is_due() {
        let now = Utc::now();
        let item = create(&cfg(), now);
        assert_eq!(item.stability, 1.0);
        assert_eq!(item.difficulty, 0.3);
        assert_eq!(item.lapse_count, 0);
        assert_eq!(item.review_count, 0);
        assert!(is_due(&item, now));
    }

    #[test]
    fn good_review_schedules_into_the_future() {
        let now = Utc::now();
        let item = create(&cfg(), now);
        let reviewed = review(&item, Quality::Good, now, &cfg());
        assert_eq!(reviewed.review_count, 1);
        assert_eq!(reviewed.lapse_count, 0);
        assert!(reviewed.next_due_at > now);
        assert_eq!(reviewed.last_reviewed_at, now);
        assert_eq!(item.review_count, 0);
    }

    #[test]
    fn again_counts_a_lapse_and_collapses_stability() {
        let now = Utc::now();
        let built = review(&create(&cfg(), now), Quality::Easy, now, &cfg());
        let failed = review(&built, Quality::Again, now, &cfg());
        assert_eq!(failed.lapse_count, 1);
        assert!(failed.stability < built.stability);
    }

    #[test]
    fn easy_beats_good_beats_hard() {
        let now = Utc::now();
        let item = create(&cfg(), now);
        let hard = review(&item, Quality::Hard, now, &cfg());
        let good = review(&item, Quality::Good, now, &cfg());
        let easy = review(&item, Quality::Easy, now, &cfg());
        assert!(easy.stability > good.stability);
        assert!(good.stability > hard.stability);
        assert!(hard.next_due_at <= good.next_due_at);
    }

    #[test]
    fn difficulty_moves_with_quality() {
        let now = Utc::now();
        let item = create(&cfg(), now);
        assert!(review(&item, Quality::Hard, now, &cfg()).difficulty > item.difficulty);
        assert!(review(&item, Quality::Easy, now, &cfg()).difficulty < item.difficulty);
    }

    #[test]
    fn difficulty_delta_includes_mean_reversion() {
        let now = Utc::now();
        let mut item = create(&cfg(), now);
        item.difficulty = 0.8;
        let reviewed = review(&item, Quality::Good, now, &cfg());
        let expected = 0.8 - 0.03 + 0.05 * (0.3 - 0.8);
        assert!((reviewed.difficulty - expected).abs() < 1e-12);
    }

    #[test]
    fn bounds_hold_for_long_runs() {
        let config = cfg();
        let mut now = Utc::now();
        let mut item = create(&config, now);
        for _ in 0..50 {
            item = review(&item, Quality::Easy, now, &config);
            now = item.next_due_at;
        }
        assert!(item.stability <= config.max_stability);
        assert!(item.difficulty >= 0.0);

        for _ in 0..20 {
            item = review(&item, Quality::Again, now, &config);
        }
        assert!(item.stability >= config.min_stability);
        assert!(item.difficulty <= 1.0);
        assert_eq!(item.lapse_count, 20);
    }

    #[test]
    fn interval_is_clamped() {
        let config = cfg();
        assert_eq!(interval_hours(config.min_stability, &config), 1);
        assert_eq!(interval_hours(config.max_stability, &config), 8760);
    }

    #[test]
    fn overdue_reviews_grow_stability_faster() {
        let config = cfg();
        let now = Utc::now();
        let item = create(&config, now);
        let on_time = review(&item, Quality::Good, now, &config);
        let late = review(&item, Quality::Good, now + Duration::days(5), &config);
        assert!(late.stability > on_time.stability);
    }
}
