use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::adaptive::config::SchedulerConfig;

use super::scheduler::{is_due, ReviewItem};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStats {
    pub total_cards: usize,
    pub cards_due: usize,
    pub cards_mastered: usize,
    pub avg_stability: f64,
    pub avg_difficulty: f64,
    /// Mean retrievability across the collection at the time of the call.
    pub predicted_retention: f64,
}

/// Items due at `now`, earliest first. Equal due times keep input order.
pub fn due_items(items: &[ReviewItem], now: DateTime<Utc>, limit: Option<usize>) -> Vec<ReviewItem> {
    let mut due: Vec<ReviewItem> = items.iter().filter(|i| is_due(i, now)).cloned().collect();
    due.sort_by_key(|i| i.next_due_at);
    if let Some(limit) = limit {
        due.truncate(limit);
    }
    due
}

pub fn stats(items: &[ReviewItem], now: DateTime<Utc>, config: &SchedulerConfig) -> CollectionStats {
    if items.is_empty() {
        return CollectionStats::default();
    }

    let mut out = CollectionStats {
        total_cards: items.len(),
        ..Default::default()
    };
    let mut stability_sum = 0.0;
    let mut difficulty_sum = 0.0;
    let mut retention_sum = 0.0;

    for item in items {
        if is_due(item, now) {
            out.cards_due += 1;
        }
        if item.stability > config.mastered_stability_days {
            out.cards_mastered += 1;
        }
        stability_sum += item.stability;
        difficulty_sum += item.difficulty;
        retention_sum += item.retrievability_at(now, config);
    }

    let n = items.len() as f64;
    out.avg_stability = stability_sum / n;
    out.avg_difficulty = difficulty_sum / n;
    out.predicted_retention = retention_sum / n;
    out
}

/// Recall probability of `item` at an arbitrary instant, for forecasting.
pub fn predict_retention(item: &ReviewItem, at: DateTime<Utc>, config: &SchedulerConfig) -> f64 {
    item.retrievability_at(at, config)
}
