use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::adaptive::config::SignalConfig;
use crate::adaptive::types::Quality;

/// A discrete behavioural observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Signal {
    Question,
    RepeatRequest,
    Frustration {
        #[serde(default)]
        value: Option<f64>,
    },
    ResponseTime {
        ms: f64,
    },
    QuizResult {
        #[serde(default)]
        subject: Option<String>,
        percentage: f64,
    },
    FlashcardRating {
        #[serde(default)]
        subject: Option<String>,
        rating: Quality,
    },
}

impl Signal {
    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::QuizResult { subject, .. } | Self::FlashcardRating { subject, .. } => {
                subject.as_deref()
            }
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Question => "question",
            Self::RepeatRequest => "repeat_request",
            Self::Frustration { .. } => "frustration",
            Self::ResponseTime { .. } => "response_time",
            Self::QuizResult { .. } => "quiz_result",
            Self::FlashcardRating { .. } => "flashcard_rating",
        }
    }
}

/// Loosely typed ingestion record, as produced by chat, voice, quiz and flashcard front ends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalRecord {
    #[serde(rename = "type")]
    pub signal_type: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub rating: Option<String>,
    #[serde(default)]
    pub response_time_ms: Option<f64>,
}

impl SignalRecord {
    /// Converts to a [`Signal`]; `None` for records that carry no usable observation.
    pub fn to_signal(&self) -> Option<Signal> {
        let subject = self.subject.clone().filter(|s| !s.trim().is_empty());
        match self.signal_type.as_str() {
            "question" => Some(Signal::Question),
            "repeat_request" | "repeat" => Some(Signal::RepeatRequest),
            "frustration" => Some(Signal::Frustration { value: self.value }),
            "response_time" | "response_time_ms" => {
                let ms = self.response_time_ms.or(self.value)?;
                Some(Signal::ResponseTime { ms })
            }
            "quiz_result" => {
                let Some(percentage) = self.value else {
                    tracing::warn!(source = ?self.source, "quiz_result record without score, skipping");
                    return None;
                };
                Some(Signal::QuizResult {
                    subject,
                    percentage,
                })
            }
            "flashcard_rating" => {
                let Some(Ok(rating)) = self.rating.as_deref().map(str::parse::<Quality>) else {
                    tracing::warn!(rating = ?self.rating, "flashcard_rating record without valid rating, skipping");
                    return None;
                };
                Some(Signal::FlashcardRating { subject, rating })
            }
            other => {
                tracing::warn!(signal_type = other, "Unknown signal type, skipping");
                None
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalProfile {
    pub frustration: f64,
    pub repeat_rate: f64,
    pub question_rate: f64,
    pub average_response_ms: f64,
    #[serde(default)]
    pub last_updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectProfile {
    pub mastery: f64,
    pub target_difficulty: f64,
    #[serde(default)]
    pub last_quiz_score: Option<f64>,
    pub last_updated_at: DateTime<Utc>,
}

impl SubjectProfile {
    pub fn new(config: &SignalConfig, now: DateTime<Utc>) -> Self {
        Self {
            mastery: config.default_mastery,
            target_difficulty: config.default_target_difficulty,
            last_quiz_score: None,
            last_updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehavioralProfile {
    pub global: GlobalProfile,
    #[serde(default)]
    pub subjects: BTreeMap<String, SubjectProfile>,
}

impl BehavioralProfile {
    pub fn subject(&self, key: &str) -> Option<&SubjectProfile> {
        self.subjects.get(key)
    }

    /// Copy of the profile with `subject`'s target difficulty replaced, creating the subject if absent.
    pub fn with_target_difficulty(
        &self,
        subject: &str,
        target: f64,
        now: DateTime<Utc>,
        config: &SignalConfig,
    ) -> Self {
        let mut next = self.clone();
        let entry = next
            .subjects
            .entry(subject.to_string())
            .or_insert_with(|| SubjectProfile::new(config, now));
        entry.target_difficulty = target.clamp(1.0, 5.0);
        entry.last_updated_at = now;
        next
    }
}

pub fn ema(prev: f64, current: f64, alpha: f64) -> f64 {
    prev * (1.0 - alpha) + current * alpha
}

/// Folds one signal into a profile, returning the new snapshot.
pub fn apply_signal(
    profile: &BehavioralProfile,
    signal: &Signal,
    now: DateTime<Utc>,
    config: &SignalConfig,
) -> BehavioralProfile {
    if let Signal::ResponseTime { ms } = signal {
        if !(ms.is_finite() && *ms > 0.0) {
            return profile.clone();
        }
    }

    let mut next = profile.clone();
    let g = &mut next.global;
    g.frustration *= config.rate_decay;
    g.repeat_rate *= config.rate_decay;
    g.question_rate *= config.rate_decay;

    match signal {
        Signal::Question => {
            g.question_rate = ema(g.question_rate, 1.0, config.question_alpha);
        }
        Signal::RepeatRequest => {
            g.repeat_rate = ema(g.repeat_rate, 1.0, config.repeat_alpha);
        }
        Signal::Frustration { value } => {
            let observed = value.filter(|v| v.is_finite()).unwrap_or(1.0).clamp(0.0, 1.0);
            g.frustration = ema(g.frustration, observed, config.frustration_alpha);
        }
        Signal::ResponseTime { ms } => {
            g.average_response_ms = ema(g.average_response_ms, *ms, config.response_time_alpha);
        }
        Signal::QuizResult { .. } | Signal::FlashcardRating { .. } => {}
    }

    g.frustration = g.frustration.clamp(0.0, 1.0);
    g.repeat_rate = g.repeat_rate.clamp(0.0, 1.0);
    g.question_rate = g.question_rate.clamp(0.0, 1.0);
    g.average_response_ms = g.average_response_ms.max(0.0);
    g.last_updated_at = Some(now);

    if let Some(subject) = signal.subject() {
        let entry = next
            .subjects
            .entry(subject.to_string())
            .or_insert_with(|| SubjectProfile::new(config, now));
        match signal {
            Signal::QuizResult { percentage, .. } if percentage.is_finite() => {
                let score = percentage.clamp(0.0, 100.0);
                entry.mastery = ema(entry.mastery, score, config.mastery_alpha);
                entry.last_quiz_score = Some(score);
            }
            Signal::FlashcardRating { rating, .. } => {
                entry.mastery += config.mastery_delta(*rating);
            }
            _ => {}
        }
        entry.mastery = entry.mastery.clamp(0.0, 100.0);
        entry.last_updated_at = now;
    }

    next
}

/// Folds a batch in order; later signals see the decay applied by earlier ones.
pub fn apply_signals<'a, I>(
    profile: &BehavioralProfile,
    signals: I,
    now: DateTime<Utc>,
    config: &SignalConfig,
) -> BehavioralProfile
where
    I: IntoIterator<Item = &'a Signal>,
{
    signals
        .into_iter()
        .fold(profile.clone(), |acc, signal| apply_signal(&acc, signal, now, config))
}

const REPEAT_PHRASES: &[&str] = &[
    "repeat",
    "say that again",
    "say it again",
    "one more time",
    "didn't catch",
    "didnt catch",
    "what did you say",
    "come again",
];

const FRUSTRATION_PHRASES: &[&str] = &[
    "i don't understand",
    "i dont understand",
    "i don't get it",
    "i dont get it",
    "i give up",
    "too hard",
    "makes no sense",
];

// Matched as whole words; "ugh" would otherwise fire on "though".
const FRUSTRATION_WORDS: &[&str] = &[
    "confused",
    "confusing",
    "frustrated",
    "frustrating",
    "stuck",
    "ugh",
    "argh",
];

const QUESTION_OPENERS: &[&str] = &[
    "what", "why", "how", "when", "where", "who", "which", "can", "could", "is", "are",
    "does", "do", "should", "would",
];

/// Classifies a learner utterance into behavioural signals.
///
/// Repeat requests take precedence over plain questions, so "can you repeat that?" counts once.
pub fn signals_from_utterance(text: &str, response_ms: Option<f64>) -> Vec<Signal> {
    let lowered = text.trim().to_lowercase();
    let mut out = Vec::new();

    if !lowered.is_empty() {
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|w| !w.is_empty())
            .collect();

        let repeat =
            REPEAT_PHRASES.iter().any(|p| lowered.contains(p)) || words.contains(&"pardon");
        if repeat {
            out.push(Signal::RepeatRequest);
        }

        if FRUSTRATION_PHRASES.iter().any(|p| lowered.contains(p))
            || words.iter().any(|w| FRUSTRATION_WORDS.contains(w))
        {
            out.push(Signal::Frustration { value: None });
        }

        let first_word = words.first().copied().unwrap_or("");
        let asks = lowered.ends_with('?') || QUESTION_OPENERS.contains(&first_word);
        if asks && !repeat {
            out.push(Signal::Question);
        }
    }

    if let Some(ms) = response_ms.filter(|ms| *ms > 0.0) {
        out.push(Signal::ResponseTime { ms });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SignalConfig {
        SignalConfig::default()
    }

    fn apply(profile: &BehavioralProfile, signal: Signal) -> BehavioralProfile {
        apply_signal(profile, &signal, Utc::now(), &cfg())
    }

    #[test]
    fn bare_frustration_blends_toward_one() {
        let p = apply(&BehavioralProfile::default(), Signal::Frustration { value: None });
        assert!((p.global.frustration - 0.3).abs() < 1e-12);
    }

    #[test]
    fn rates_decay_before_blend() {
        let mut start = BehavioralProfile::default();
        start.global.frustration = 0.5;
        start.global.repeat_rate = 0.5;
        let p = apply(&start, Signal::Question);
        assert!((p.global.frustration - 0.45).abs() < 1e-12);
        assert!((p.global.repeat_rate - 0.45).abs() < 1e-12);
        assert!((p.global.question_rate - 0.2).abs() < 1e-12);
    }

    #[test]
    fn repeat_request_uses_its_own_alpha() {
        let p = apply(&BehavioralProfile::default(), Signal::RepeatRequest);
        assert!((p.global.repeat_rate - 0.3).abs() < 1e-12);
    }

    #[test]
    fn non_positive_response_time_is_a_noop() {
        let mut start = BehavioralProfile::default();
        start.global.frustration = 0.5;
        let p = apply(&start, Signal::ResponseTime { ms: 0.0 });
        assert_eq!(p, start);
        let p = apply(&start, Signal::ResponseTime { ms: -20.0 });
        assert_eq!(p, start);
    }

    #[test]
    fn first_response_time_blends_from_zero() {
        let p = apply(&BehavioralProfile::default(), Signal::ResponseTime { ms: 10_000.0 });
        assert!((p.global.average_response_ms - 2_000.0).abs() < 1e-9);
        let p = apply(&p, Signal::ResponseTime { ms: 5_000.0 });
        assert!((p.global.average_response_ms - 2_600.0).abs() < 1e-9);
    }

    #[test]
    fn single_slow_reply_still_reads_as_fast() {
        let p = apply(&BehavioralProfile::default(), Signal::ResponseTime { ms: 25_000.0 });
        assert!((p.global.average_response_ms - 5_000.0).abs() < 1e-9);

        let ctx = crate::adaptive::context::calculate_context(
            &p,
            &crate::adaptive::context::ContextOptions::default()
                .with_mode(crate::adaptive::types::DifficultyMode::Balanced),
            &crate::adaptive::config::ContextConfig::default(),
        );
        assert!((ctx.adjustment - 0.3).abs() < 1e-9);
        assert_eq!(ctx.target_difficulty, 3.5);
    }

    #[test]
    fn quiz_result_creates_subject_and_blends_mastery() {
        let p = apply(
            &BehavioralProfile::default(),
            Signal::QuizResult {
                subject: Some("math".into()),
                percentage: 100.0,
            },
        );
        let math = p.subject("math").unwrap();
        assert!((math.mastery - 65.0).abs() < 1e-12);
        assert_eq!(math.last_quiz_score, Some(100.0));
        assert_eq!(math.target_difficulty, 3.0);
    }

    #[test]
    fn flashcard_ratings_shift_mastery_with_clamp() {
        let mut p = BehavioralProfile::default();
        for _ in 0..20 {
            p = apply(
                &p,
                Signal::FlashcardRating {
                    subject: Some("bio".into()),
                    rating: Quality::Again,
                },
            );
        }
        assert_eq!(p.subject("bio").unwrap().mastery, 0.0);

        let p = apply(
            &p,
            Signal::FlashcardRating {
                subject: Some("bio".into()),
                rating: Quality::Easy,
            },
        );
        assert_eq!(p.subject("bio").unwrap().mastery, 4.0);
    }

    #[test]
    fn subjectless_quiz_only_touches_global() {
        let mut start = BehavioralProfile::default();
        start.global.question_rate = 1.0;
        let p = apply(
            &start,
            Signal::QuizResult {
                subject: None,
                percentage: 40.0,
            },
        );
        assert!(p.subjects.is_empty());
        assert!((p.global.question_rate - 0.9).abs() < 1e-12);
    }

    #[test]
    fn batch_is_folded_in_order() {
        let signals = vec![Signal::Frustration { value: None }, Signal::Question];
        let p = apply_signals(&BehavioralProfile::default(), &signals, Utc::now(), &cfg());
        assert!((p.global.frustration - 0.27).abs() < 1e-12);

        let reversed: Vec<Signal> = signals.into_iter().rev().collect();
        let q = apply_signals(&BehavioralProfile::default(), &reversed, Utc::now(), &cfg());
        assert!((q.global.frustration - 0.3).abs() < 1e-12);
    }

    #[test]
    fn records_convert_to_signals() {
        let record = SignalRecord {
            signal_type: "flashcard_rating".into(),
            subject: Some("chem".into()),
            rating: Some("hard".into()),
            ..Default::default()
        };
        assert_eq!(
            record.to_signal(),
            Some(Signal::FlashcardRating {
                subject: Some("chem".into()),
                rating: Quality::Hard,
            })
        );

        let unknown = SignalRecord {
            signal_type: "telepathy".into(),
            ..Default::default()
        };
        assert_eq!(unknown.to_signal(), None);

        let latency = SignalRecord {
            signal_type: "response_time".into(),
            response_time_ms: Some(1500.0),
            ..Default::default()
        };
        assert_eq!(latency.to_signal(), Some(Signal::ResponseTime { ms: 1500.0 }));
    }

    #[test]
    fn records_deserialize_from_camel_case_json() {
        let record: SignalRecord = serde_json::from_str(
            r#"{"type":"quiz_result","source":"quiz","subject":"math","value":72.5}"#,
        )
        .unwrap();
        assert_eq!(
            record.to_signal(),
            Some(Signal::QuizResult {
                subject: Some("math".into()),
                percentage: 72.5,
            })
        );
    }

    #[test]
    fn utterances_are_classified() {
        assert_eq!(
            signals_from_utterance("Why does ice float?", None),
            vec![Signal::Question]
        );
        assert_eq!(
            signals_from_utterance("Can you repeat that?", None),
            vec![Signal::RepeatRequest]
        );
        assert_eq!(
            signals_from_utterance("ugh I don't get it", Some(25_000.0)),
            vec![
                Signal::Frustration { value: None },
                Signal::ResponseTime { ms: 25_000.0 }
            ]
        );
        assert!(signals_from_utterance("ok", Some(0.0)).is_empty());
        assert!(signals_from_utterance("I thought so, though.", None).is_empty());
    }
}
