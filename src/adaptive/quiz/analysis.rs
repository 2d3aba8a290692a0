use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::adaptive::config::QuizConfig;
use crate::adaptive::types::{round_to_half, DifficultyVsPerformance};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub topic: String,
    /// 1 (easiest) to 5 (hardest).
    pub difficulty: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
    pub quiz_id: String,
    #[serde(default)]
    pub subject: Option<String>,
    /// Percentage correct, 0 to 100.
    pub score: f64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOutcome {
    pub question_id: String,
    pub correct: bool,
    pub time_spent_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAnalysis {
    pub score: f64,
    pub needs_review: bool,
    pub weak_topics: Vec<String>,
    pub strong_topics: Vec<String>,
    pub average_time_per_question: f64,
    pub difficulty_vs_performance: DifficultyVsPerformance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyAdjustment {
    pub current_difficulty: f64,
    pub suggested_difficulty: f64,
    pub reason: String,
    pub confidence: f64,
}

/// Classifies a finished quiz. Outcomes for questions not in `quiz` are ignored.
pub fn analyze(
    quiz: &Quiz,
    result: &QuizResult,
    outcomes: &[QuestionOutcome],
    config: &QuizConfig,
) -> QuizAnalysis {
    let by_id: HashMap<&str, &Question> = quiz.questions.iter().map(|q| (q.id.as_str(), q)).collect();

    // topic -> (correct, total)
    let mut topics: BTreeMap<&str, (u32, u32)> = BTreeMap::new();
    let mut time_total = 0.0;
    let mut answered = 0usize;

    for outcome in outcomes {
        let Some(question) = by_id.get(outcome.question_id.as_str()) else {
            continue;
        };
        let entry = topics.entry(question.topic.as_str()).or_default();
        entry.1 += 1;
        if outcome.correct {
            entry.0 += 1;
        }
        time_total += outcome.time_spent_secs;
        answered += 1;
    }

    let mut weak_topics = Vec::new();
    let mut strong_topics = Vec::new();
    for (topic, (correct, total)) in &topics {
        let pct = *correct as f64 / *total as f64 * 100.0;
        if pct < config.review_threshold {
            weak_topics.push(topic.to_string());
        } else if pct >= config.mastery_threshold {
            strong_topics.push(topic.to_string());
        }
    }

    let average_time_per_question = if answered > 0 {
        time_total / answered as f64
    } else {
        0.0
    };

    let score = result.score;
    let avg_difficulty = if quiz.questions.is_empty() {
        None
    } else {
        Some(quiz.questions.iter().map(|q| q.difficulty).sum::<f64>() / quiz.questions.len() as f64)
    };

    let difficulty_vs_performance = match avg_difficulty {
        Some(d) if score < config.review_threshold && d > config.too_hard_min_difficulty => {
            DifficultyVsPerformance::TooHard
        }
        Some(d) if score >= config.mastery_threshold && d < config.too_easy_max_difficulty => {
            DifficultyVsPerformance::TooEasy
        }
        _ => DifficultyVsPerformance::Appropriate,
    };

    QuizAnalysis {
        score,
        needs_review: score < config.review_threshold,
        weak_topics,
        strong_topics,
        average_time_per_question,
        difficulty_vs_performance,
    }
}

/// Suggests the next difficulty from a rolling window of scores.
///
/// The suggestion is not clamped to the 1..=5 scale; callers clamp when applying it.
pub fn calculate_difficulty_adjustment(
    current_difficulty: f64,
    recent: &[QuizResult],
    window: Option<usize>,
    config: &QuizConfig,
) -> DifficultyAdjustment {
    if recent.len() < config.min_results {
        return DifficultyAdjustment {
            current_difficulty,
            suggested_difficulty: current_difficulty,
            reason: "Not enough data yet to adjust difficulty".to_string(),
            confidence: config.insufficient_data_confidence,
        };
    }

    let window = window.unwrap_or(config.window_size).max(1);
    let start = recent.len().saturating_sub(window);
    let scores: Vec<f64> = recent[start..].iter().map(|r| r.score).collect();
    let n = scores.len() as f64;
    let average = scores.iter().sum::<f64>() / n;
    let trend = if scores.len() > 1 {
        scores.windows(2).map(|w| w[1] - w[0]).sum::<f64>() / (n - 1.0)
    } else {
        0.0
    };

    let (delta, reason) = if average >= config.mastery_threshold {
        (config.major_step, "Excellent results: raising the difficulty")
    } else if average < config.review_threshold {
        (-config.major_step, "Struggling: easing the difficulty back")
    } else if trend > config.trend_threshold {
        (config.trend_step, "Improving steadily: a small step up")
    } else if trend < -config.trend_threshold {
        (-config.trend_step, "Scores slipping: a small step back")
    } else {
        (0.0, "Difficulty is appropriate, keeping it")
    };

    DifficultyAdjustment {
        current_difficulty,
        suggested_difficulty: round_to_half(current_difficulty + delta),
        reason: reason.to_string(),
        confidence: (config.base_confidence + config.confidence_per_result * n)
            .min(config.max_confidence),
    }
}

/// Picks up to `count` distinct questions closest to `target`, returned in shuffled order.
pub fn select_questions_for_difficulty<R: Rng + ?Sized>(
    pool: &[Question],
    target: f64,
    count: usize,
    rng: &mut R,
) -> Vec<Question> {
    let mut ranked: Vec<&Question> = pool.iter().collect();
    ranked.sort_by(|a, b| {
        (a.difficulty - target)
            .abs()
            .total_cmp(&(b.difficulty - target).abs())
    });

    let mut seen = HashSet::new();
    let mut selected: Vec<Question> = ranked
        .into_iter()
        .filter(|q| seen.insert(q.id.as_str()))
        .take(count)
        .cloned()
        .collect();
    selected.shuffle(rng);
    selected
}
