use serde::{Deserialize, Serialize};

use crate::adaptive::config::ContextConfig;
use crate::adaptive::signals::BehavioralProfile;
use crate::adaptive::types::{round_to_half, DifficultyMode};

const NEUTRAL_MASTERY: f64 = 50.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextOptions {
    /// Falls back to the configured default mode.
    #[serde(default)]
    pub mode: Option<DifficultyMode>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub baseline_difficulty: Option<f64>,
    /// Caps how far difficulty may be lowered so the curriculum keeps moving.
    #[serde(default)]
    pub pragmatic: bool,
}

impl ContextOptions {
    pub fn for_subject(subject: &str) -> Self {
        Self {
            subject: Some(subject.to_string()),
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: DifficultyMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultyBounds {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextReason {
    Reduce,
    Challenge,
    Calibrated,
}

impl ContextReason {
    pub fn message(self) -> &'static str {
        match self {
            Self::Reduce => "Reducing difficulty to consolidate understanding before moving on",
            Self::Challenge => "Curious and comfortable: can handle more challenge",
            Self::Calibrated => "Difficulty calibrated to current performance",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveContext {
    pub mode: DifficultyMode,
    pub baseline_difficulty: f64,
    pub target_difficulty: f64,
    /// Signal-driven shift after the mode governor and pragmatic floor.
    pub adjustment: f64,
    pub apply: bool,
    pub reason_kind: ContextReason,
    pub reason: String,
    pub constraints: DifficultyBounds,
}

/// Difficulty window allowed for a subject at the given mastery.
pub fn bounds_for_mastery(mastery: f64) -> DifficultyBounds {
    let max = if mastery < 40.0 {
        2.5
    } else if mastery < 60.0 {
        3.5
    } else if mastery < 80.0 {
        4.5
    } else {
        5.0
    };
    let min = if mastery < 40.0 {
        1.5
    } else if mastery < 60.0 {
        2.0
    } else {
        2.5
    };
    DifficultyBounds { min, max }
}

pub fn calculate_context(
    profile: &BehavioralProfile,
    options: &ContextOptions,
    config: &ContextConfig,
) -> AdaptiveContext {
    let mode = options.mode.unwrap_or(config.default_mode);
    let baseline = options
        .baseline_difficulty
        .filter(|b| b.is_finite())
        .unwrap_or(config.default_baseline_difficulty)
        .clamp(1.0, 5.0);

    let mastery = options
        .subject
        .as_deref()
        .and_then(|s| profile.subject(s))
        .map(|s| s.mastery)
        .unwrap_or(NEUTRAL_MASTERY);
    let bounds = bounds_for_mastery(mastery);

    let g = &profile.global;
    let mut adjustment = 0.0;

    if g.frustration > config.high_frustration_threshold {
        adjustment -= config.frustration_full_penalty;
    } else {
        adjustment -= config.frustration_scale * g.frustration;
    }
    if g.repeat_rate > config.repeat_threshold {
        adjustment -= config.repeat_penalty;
    }
    if g.question_rate > config.curiosity_question_threshold
        && g.frustration < config.curiosity_frustration_ceiling
    {
        adjustment += config.curiosity_boost;
    }
    if g.average_response_ms > config.slow_response_ms {
        adjustment -= config.slow_response_penalty;
    } else if g.average_response_ms > 0.0 && g.average_response_ms < config.fast_response_ms {
        adjustment += config.fast_response_boost;
    }

    let limit = config.mode_limits.limit_for(mode);
    adjustment = adjustment.clamp(-limit, limit);
    if options.pragmatic && adjustment < config.pragmatic_floor {
        adjustment = config.pragmatic_floor;
    }

    let target = round_to_half(baseline + adjustment).clamp(bounds.min, bounds.max);

    let reason_kind = if g.frustration > config.high_frustration_threshold
        || g.repeat_rate > config.repeat_threshold
    {
        ContextReason::Reduce
    } else if g.question_rate > config.curiosity_question_threshold
        && g.frustration < config.curiosity_frustration_ceiling
    {
        ContextReason::Challenge
    } else {
        ContextReason::Calibrated
    };

    AdaptiveContext {
        mode,
        baseline_difficulty: baseline,
        target_difficulty: target,
        adjustment,
        apply: mode != DifficultyMode::Manual,
        reason_kind,
        reason: reason_kind.message().to_string(),
        constraints: bounds,
    }
}
