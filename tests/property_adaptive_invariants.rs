use chrono::Utc;
use proptest::prelude::*;

use adaptive_review::adaptive::config::{ContextConfig, SignalConfig};
use adaptive_review::adaptive::context::{bounds_for_mastery, calculate_context, ContextOptions};
use adaptive_review::adaptive::signals::{apply_signals, BehavioralProfile, Signal, SubjectProfile};
use adaptive_review::adaptive::types::{DifficultyMode, Quality};

fn mode_strategy() -> impl Strategy<Value = DifficultyMode> {
    prop::sample::select(DifficultyMode::ALL.to_vec())
}

fn signal_strategy() -> impl Strategy<Value = Signal> {
    prop_oneof![
        Just(Signal::Question),
        Just(Signal::RepeatRequest),
        prop::option::of(-2.0_f64..3.0).prop_map(|value| Signal::Frustration { value }),
        (-5_000.0_f64..60_000.0).prop_map(|ms| Signal::ResponseTime { ms }),
        (-50.0_f64..150.0).prop_map(|percentage| Signal::QuizResult {
            subject: Some("math".to_string()),
            percentage,
        }),
        prop::sample::select(Quality::ALL.to_vec()).prop_map(|rating| Signal::FlashcardRating {
            subject: Some("math".to_string()),
            rating,
        }),
    ]
}

fn profile_strategy() -> impl Strategy<Value = BehavioralProfile> {
    (0.0_f64..=1.0, 0.0_f64..=1.0, 0.0_f64..=1.0, 0.0_f64..40_000.0, 0.0_f64..=100.0).prop_map(
        |(frustration, repeat_rate, question_rate, avg_ms, mastery)| {
            let mut p = BehavioralProfile::default();
            p.global.frustration = frustration;
            p.global.repeat_rate = repeat_rate;
            p.global.question_rate = question_rate;
            p.global.average_response_ms = avg_ms;
            let mut subject = SubjectProfile::new(&SignalConfig::default(), Utc::now());
            subject.mastery = mastery;
            p.subjects.insert("math".to_string(), subject);
            p
        },
    )
}

proptest! {
    #[test]
    fn pt_profile_fields_stay_clamped(signals in prop::collection::vec(signal_strategy(), 0..40)) {
        let cfg = SignalConfig::default();
        let p = apply_signals(&BehavioralProfile::default(), &signals, Utc::now(), &cfg);

        prop_assert!((0.0..=1.0).contains(&p.global.frustration));
        prop_assert!((0.0..=1.0).contains(&p.global.repeat_rate));
        prop_assert!((0.0..=1.0).contains(&p.global.question_rate));
        prop_assert!(p.global.average_response_ms >= 0.0);
        for subject in p.subjects.values() {
            prop_assert!((0.0..=100.0).contains(&subject.mastery));
        }
    }

    #[test]
    fn pt_adjustment_respects_mode_limit(
        profile in profile_strategy(),
        mode in mode_strategy(),
        baseline in 1.0_f64..=5.0,
        pragmatic in any::<bool>(),
    ) {
        let cfg = ContextConfig::default();
        let options = ContextOptions {
            mode: Some(mode),
            subject: Some("math".to_string()),
            baseline_difficulty: Some(baseline),
            pragmatic,
        };
        let ctx = calculate_context(&profile, &options, &cfg);
        let limit = cfg.mode_limits.limit_for(mode);

        prop_assert!(ctx.adjustment.abs() <= limit + 1e-12);
        if pragmatic {
            prop_assert!(ctx.adjustment >= cfg.pragmatic_floor.min(0.0) - 1e-12);
        }
        prop_assert_eq!(ctx.apply, mode != DifficultyMode::Manual);
        prop_assert!(ctx.target_difficulty >= ctx.constraints.min);
        prop_assert!(ctx.target_difficulty <= ctx.constraints.max);
        prop_assert!((1.0..=5.0).contains(&ctx.target_difficulty));
        prop_assert_eq!((ctx.target_difficulty * 2.0).fract(), 0.0);
    }

    #[test]
    fn pt_context_is_idempotent(profile in profile_strategy(), mode in mode_strategy()) {
        let cfg = ContextConfig::default();
        let options = ContextOptions::for_subject("math").with_mode(mode);
        let first = calculate_context(&profile, &options, &cfg);
        let second = calculate_context(&profile, &options, &cfg);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn pt_mastery_bounds_are_ordered(mastery in -20.0_f64..140.0) {
        let bounds = bounds_for_mastery(mastery);
        prop_assert!(bounds.min <= bounds.max);
        prop_assert!(bounds.min >= 1.0 && bounds.max <= 5.0);
    }

    #[test]
    fn pt_higher_mastery_never_narrows_the_ceiling(a in 0.0_f64..=100.0, b in 0.0_f64..=100.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(bounds_for_mastery(lo).max <= bounds_for_mastery(hi).max);
        prop_assert!(bounds_for_mastery(lo).min <= bounds_for_mastery(hi).min);
    }
}
