use serde::{Deserialize, Serialize};

use crate::adaptive::types::{DifficultyMode, Quality};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    pub initial_stability: f64,
    pub initial_difficulty: f64,
    pub min_stability: f64,
    pub max_stability: f64,
    /// Decay sharpness `w` of the forgetting curve.
    pub decay_sharpness: f64,
    /// Gain `k` applied to `1 - R` when a review succeeds.
    pub retrievability_gain: f64,
    pub stability_growth_rate: f64,
    pub lapse_penalty: f64,
    pub failure_stability_factor: f64,
    pub hard_factor: f64,
    pub good_factor: f64,
    pub easy_factor: f64,
    pub again_difficulty_delta: f64,
    pub hard_difficulty_delta: f64,
    pub good_difficulty_delta: f64,
    pub easy_difficulty_delta: f64,
    pub difficulty_mean_reversion: f64,
    pub difficulty_baseline: f64,
    pub target_retention: f64,
    pub min_interval_hours: i64,
    pub max_interval_hours: i64,
    #[serde(default = "default_mastered_stability_days")]
    pub mastered_stability_days: f64,
}

fn default_mastered_stability_days() -> f64 {
    30.0
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            initial_stability: 1.0,
            initial_difficulty: 0.3,
            min_stability: 0.04,
            max_stability: 1095.0,
            decay_sharpness: 0.95,
            retrievability_gain: 19.0,
            stability_growth_rate: 0.2,
            lapse_penalty: 0.1,
            failure_stability_factor: 0.3,
            hard_factor: 0.6,
            good_factor: 0.85,
            easy_factor: 1.3,
            again_difficulty_delta: 0.10,
            hard_difficulty_delta: 0.05,
            good_difficulty_delta: -0.03,
            easy_difficulty_delta: -0.07,
            difficulty_mean_reversion: 0.05,
            difficulty_baseline: 0.3,
            target_retention: 0.9,
            min_interval_hours: 1,
            max_interval_hours: 8760,
            mastered_stability_days: 30.0,
        }
    }
}

impl SchedulerConfig {
    pub fn quality_factor(&self, quality: Quality) -> f64 {
        match quality {
            Quality::Again => self.failure_stability_factor,
            Quality::Hard => self.hard_factor,
            Quality::Good => self.good_factor,
            Quality::Easy => self.easy_factor,
        }
    }

    pub fn difficulty_delta(&self, quality: Quality) -> f64 {
        match quality {
            Quality::Again => self.again_difficulty_delta,
            Quality::Hard => self.hard_difficulty_delta,
            Quality::Good => self.good_difficulty_delta,
            Quality::Easy => self.easy_difficulty_delta,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalConfig {
    /// Multiplicative forgetting applied to the global rates before each blend.
    pub rate_decay: f64,
    pub frustration_alpha: f64,
    pub repeat_alpha: f64,
    pub question_alpha: f64,
    pub response_time_alpha: f64,
    pub mastery_alpha: f64,
    pub default_mastery: f64,
    pub default_target_difficulty: f64,
    pub again_mastery_delta: f64,
    pub hard_mastery_delta: f64,
    pub good_mastery_delta: f64,
    pub easy_mastery_delta: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            rate_decay: 0.9,
            frustration_alpha: 0.3,
            repeat_alpha: 0.3,
            question_alpha: 0.2,
            response_time_alpha: 0.2,
            mastery_alpha: 0.3,
            default_mastery: 50.0,
            default_target_difficulty: 3.0,
            again_mastery_delta: -6.0,
            hard_mastery_delta: -3.0,
            good_mastery_delta: 2.0,
            easy_mastery_delta: 4.0,
        }
    }
}

impl SignalConfig {
    pub fn mastery_delta(&self, rating: Quality) -> f64 {
        match rating {
            Quality::Again => self.again_mastery_delta,
            Quality::Hard => self.hard_mastery_delta,
            Quality::Good => self.good_mastery_delta,
            Quality::Easy => self.easy_mastery_delta,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeLimits {
    pub manual: f64,
    pub guided: f64,
    pub balanced: f64,
    pub automatic: f64,
}

impl Default for ModeLimits {
    fn default() -> Self {
        Self {
            manual: 0.0,
            guided: 0.5,
            balanced: 1.0,
            automatic: 1.5,
        }
    }
}

impl ModeLimits {
    pub fn limit_for(&self, mode: DifficultyMode) -> f64 {
        match mode {
            DifficultyMode::Manual => self.manual,
            DifficultyMode::Guided => self.guided,
            DifficultyMode::Balanced => self.balanced,
            DifficultyMode::Automatic => self.automatic,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextConfig {
    pub mode_limits: ModeLimits,
    pub default_mode: DifficultyMode,
    pub default_baseline_difficulty: f64,
    pub high_frustration_threshold: f64,
    pub frustration_full_penalty: f64,
    pub frustration_scale: f64,
    pub repeat_threshold: f64,
    pub repeat_penalty: f64,
    pub curiosity_question_threshold: f64,
    pub curiosity_frustration_ceiling: f64,
    pub curiosity_boost: f64,
    pub slow_response_ms: f64,
    pub slow_response_penalty: f64,
    pub fast_response_ms: f64,
    pub fast_response_boost: f64,
    pub pragmatic_floor: f64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            mode_limits: ModeLimits::default(),
            default_mode: DifficultyMode::Balanced,
            default_baseline_difficulty: 3.0,
            high_frustration_threshold: 0.6,
            frustration_full_penalty: 1.0,
            frustration_scale: 0.8,
            repeat_threshold: 0.4,
            repeat_penalty: 0.5,
            curiosity_question_threshold: 0.6,
            curiosity_frustration_ceiling: 0.4,
            curiosity_boost: 0.5,
            slow_response_ms: 20_000.0,
            slow_response_penalty: 0.5,
            fast_response_ms: 7_000.0,
            fast_response_boost: 0.3,
            pragmatic_floor: -0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizConfig {
    pub review_threshold: f64,
    pub mastery_threshold: f64,
    pub too_hard_min_difficulty: f64,
    pub too_easy_max_difficulty: f64,
    pub min_results: usize,
    pub window_size: usize,
    pub trend_threshold: f64,
    pub major_step: f64,
    pub trend_step: f64,
    pub insufficient_data_confidence: f64,
    pub base_confidence: f64,
    pub confidence_per_result: f64,
    pub max_confidence: f64,
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            review_threshold: 60.0,
            mastery_threshold: 80.0,
            too_hard_min_difficulty: 3.0,
            too_easy_max_difficulty: 3.0,
            min_results: 3,
            window_size: 5,
            trend_threshold: 5.0,
            major_step: 1.0,
            trend_step: 0.5,
            insufficient_data_confidence: 0.1,
            base_confidence: 0.5,
            confidence_per_result: 0.1,
            max_confidence: 0.95,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionConfig {
    pub review_search_limit: usize,
    pub review_min_score: f64,
    pub seen_search_limit: usize,
    pub seen_min_score: f64,
    /// Combined score above which a concept counts as already seen.
    pub seen_similarity_threshold: f64,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            review_search_limit: 5,
            review_min_score: 0.4,
            seen_search_limit: 1,
            seen_min_score: 0.7,
            seen_similarity_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub signals: SignalConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub quiz: QuizConfig,
    #[serde(default)]
    pub suggestions: SuggestionConfig,
}

impl AdaptiveConfig {
    pub fn from_env(env_config: &crate::config::AdaptiveEnvConfig) -> Self {
        let mut config = Self::default();
        config.scheduler.target_retention = env_config.target_retention;
        match env_config.default_mode.parse::<DifficultyMode>() {
            Ok(mode) => config.context.default_mode = mode,
            Err(e) => {
                tracing::warn!(value = %env_config.default_mode, error = %e, "Unknown difficulty mode, keeping default");
            }
        }
        config
    }

    pub fn validate(&self) -> Result<(), String> {
        let s = &self.scheduler;
        if s.min_stability <= 0.0 || s.min_stability >= s.max_stability {
            return Err("scheduler.min_stability must be in (0, max_stability)".to_string());
        }
        if !(s.min_stability..=s.max_stability).contains(&s.initial_stability) {
            return Err("scheduler.initial_stability must lie within the stability bounds".to_string());
        }
        if !(0.0..=1.0).contains(&s.initial_difficulty) {
            return Err("scheduler.initial_difficulty must be in [0,1]".to_string());
        }
        if s.decay_sharpness <= 0.0 {
            return Err("scheduler.decay_sharpness must be > 0".to_string());
        }
        if !(0.5..=0.99).contains(&s.target_retention) {
            return Err("scheduler.target_retention must be in [0.5,0.99]".to_string());
        }
        if s.min_interval_hours < 1 || s.min_interval_hours > s.max_interval_hours {
            return Err("scheduler interval bounds must satisfy 1 <= min <= max".to_string());
        }
        if s.hard_factor <= 0.0 || s.good_factor <= 0.0 || s.easy_factor <= 0.0 {
            return Err("scheduler quality factors must be > 0".to_string());
        }
        if !(0.0..1.0).contains(&s.failure_stability_factor) {
            return Err("scheduler.failure_stability_factor must be in [0,1)".to_string());
        }
        if !(0.0..=1.0).contains(&s.difficulty_mean_reversion) {
            return Err("scheduler.difficulty_mean_reversion must be in [0,1]".to_string());
        }

        let g = &self.signals;
        for (name, alpha) in [
            ("signals.rate_decay", g.rate_decay),
            ("signals.frustration_alpha", g.frustration_alpha),
            ("signals.repeat_alpha", g.repeat_alpha),
            ("signals.question_alpha", g.question_alpha),
            ("signals.response_time_alpha", g.response_time_alpha),
            ("signals.mastery_alpha", g.mastery_alpha),
        ] {
            if !(0.0..=1.0).contains(&alpha) {
                return Err(format!("{name} must be in [0,1]"));
            }
        }
        if !(0.0..=100.0).contains(&g.default_mastery) {
            return Err("signals.default_mastery must be in [0,100]".to_string());
        }
        if !(1.0..=5.0).contains(&g.default_target_difficulty) {
            return Err("signals.default_target_difficulty must be in [1,5]".to_string());
        }

        let c = &self.context;
        let limits = &c.mode_limits;
        if limits.manual < 0.0
            || limits.guided < limits.manual
            || limits.balanced < limits.guided
            || limits.automatic < limits.balanced
        {
            return Err(
                "context.mode_limits must be non-negative and non-decreasing from manual to automatic"
                    .to_string(),
            );
        }
        if !(1.0..=5.0).contains(&c.default_baseline_difficulty) {
            return Err("context.default_baseline_difficulty must be in [1,5]".to_string());
        }
        if c.pragmatic_floor > 0.0 {
            return Err("context.pragmatic_floor must be <= 0".to_string());
        }
        if c.fast_response_ms >= c.slow_response_ms {
            return Err("context.fast_response_ms must be < slow_response_ms".to_string());
        }

        let q = &self.quiz;
        if q.review_threshold > q.mastery_threshold {
            return Err("quiz.review_threshold must be <= mastery_threshold".to_string());
        }
        if q.window_size == 0 || q.min_results == 0 {
            return Err("quiz.window_size and quiz.min_results must be > 0".to_string());
        }
        if !(0.0..=1.0).contains(&q.max_confidence) {
            return Err("quiz.max_confidence must be in [0,1]".to_string());
        }

        let sg = &self.suggestions;
        if !(0.0..=1.0).contains(&sg.review_min_score)
            || !(0.0..=1.0).contains(&sg.seen_min_score)
            || !(0.0..=1.0).contains(&sg.seen_similarity_threshold)
        {
            return Err("suggestion score thresholds must be in [0,1]".to_string());
        }

        Ok(())
    }
}
