use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use crate::adaptive::config::AdaptiveConfig;
use crate::adaptive::context::{calculate_context, AdaptiveContext, ContextOptions};
use crate::adaptive::memory::{collection, scheduler, CollectionStats, ReviewItem};
use crate::adaptive::quiz::{
    analyze, calculate_difficulty_adjustment, check_seen_concepts, generate_review_suggestions,
    DifficultyAdjustment, QuestionOutcome, Quiz, QuizAnalysis, QuizResult, ReviewSuggestion,
    SeenConcept,
};
use crate::adaptive::signals::{self, BehavioralProfile, Signal, SignalRecord};
use crate::adaptive::types::Quality;
use crate::constants::{MAX_STORED_QUIZ_RESULTS, USER_LOCK_PRUNE_THRESHOLD};
use crate::error::EngineError;
use crate::services::material_search::MaterialSearch;
use crate::store::Store;

/// Storage-backed front of the adaptive core.
///
/// Every read-modify-write for a user runs under that user's lock; profile writes are
/// additionally version-checked by the store.
pub struct AdaptiveEngine {
    config: Arc<RwLock<AdaptiveConfig>>,
    store: Arc<Store>,
    user_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl AdaptiveEngine {
    pub fn new(config: AdaptiveConfig, store: Arc<Store>) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            store,
            user_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn reload_config(&self, new_config: AdaptiveConfig) -> Result<(), EngineError> {
        new_config.validate().map_err(EngineError::Config)?;
        let mut cfg = self.config.write().await;
        *cfg = new_config;
        tracing::info!("Adaptive config reloaded");
        Ok(())
    }

    pub async fn get_config(&self) -> AdaptiveConfig {
        self.config.read().await.clone()
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    async fn acquire_user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;

        // strong_count == 1: only the map holds it, nobody is waiting.
        if locks.len() > USER_LOCK_PRUNE_THRESHOLD {
            locks.retain(|_, v| Arc::strong_count(v) > 1);
        }

        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn profile(&self, user_id: &str) -> Result<BehavioralProfile, EngineError> {
        validate_user_id(user_id)?;
        Ok(self
            .store
            .get_profile(user_id)?
            .map(|stored| stored.profile)
            .unwrap_or_default())
    }

    /// Folds a batch of ingestion records into the user's profile, in order.
    pub async fn ingest_signals(
        &self,
        user_id: &str,
        records: &[SignalRecord],
    ) -> Result<BehavioralProfile, EngineError> {
        let batch: Vec<Signal> = records.iter().filter_map(SignalRecord::to_signal).collect();
        if batch.len() < records.len() {
            tracing::debug!(
                user_id,
                received = records.len(),
                usable = batch.len(),
                "Dropped unusable signal records"
            );
        }
        self.apply_signals(user_id, &batch).await
    }

    /// Classifies a chat or voice utterance and folds the resulting signals.
    pub async fn ingest_utterance(
        &self,
        user_id: &str,
        text: &str,
        response_ms: Option<f64>,
    ) -> Result<BehavioralProfile, EngineError> {
        let batch = signals::signals_from_utterance(text, response_ms);
        self.apply_signals(user_id, &batch).await
    }

    pub async fn apply_signals(
        &self,
        user_id: &str,
        batch: &[Signal],
    ) -> Result<BehavioralProfile, EngineError> {
        validate_user_id(user_id)?;
        let user_lock = self.acquire_user_lock(user_id).await;
        let _guard = user_lock.lock().await;
        self.apply_signals_locked(user_id, batch).await
    }

    async fn apply_signals_locked(
        &self,
        user_id: &str,
        batch: &[Signal],
    ) -> Result<BehavioralProfile, EngineError> {
        if batch.is_empty() {
            return self.profile(user_id).await;
        }

        let config = self.config.read().await.signals.clone();
        let now = Utc::now();
        let stored = self
            .store
            .update_profile(user_id, |p| signals::apply_signals(p, batch, now, &config))?;

        tracing::debug!(
            user_id,
            signals = batch.len(),
            version = stored.version,
            frustration = stored.profile.global.frustration,
            "Profile updated"
        );
        Ok(stored.profile)
    }

    /// Target difficulty for the next selection request.
    ///
    /// When the context applies and names a subject, the target is remembered on the subject.
    pub async fn context_for(
        &self,
        user_id: &str,
        options: &ContextOptions,
    ) -> Result<AdaptiveContext, EngineError> {
        validate_user_id(user_id)?;
        let user_lock = self.acquire_user_lock(user_id).await;
        let _guard = user_lock.lock().await;

        let config = self.config.read().await.clone();
        let profile = self.profile(user_id).await?;
        let context = calculate_context(&profile, options, &config.context);

        if let Some(subject) = options.subject.as_deref().filter(|_| context.apply) {
            let now = Utc::now();
            let target = context.target_difficulty;
            self.store.update_profile(user_id, |p| {
                p.with_target_difficulty(subject, target, now, &config.signals)
            })?;
        }

        tracing::debug!(
            user_id,
            mode = %context.mode,
            target = context.target_difficulty,
            adjustment = context.adjustment,
            "Adaptive context computed"
        );
        Ok(context)
    }

    pub async fn create_card(
        &self,
        user_id: &str,
        subject: Option<&str>,
    ) -> Result<ReviewItem, EngineError> {
        validate_user_id(user_id)?;
        let config = self.config.read().await.scheduler.clone();
        let item = ReviewItem::new(
            &uuid::Uuid::new_v4().to_string(),
            subject.filter(|s| !s.trim().is_empty()),
            &config,
            Utc::now(),
        );
        self.store.set_review_item(user_id, &item)?;
        tracing::debug!(user_id, item_id = %item.id, "Review card created");
        Ok(item)
    }

    /// Reviews a stored card; subject cards also feed a flashcard rating into the profile.
    pub async fn review_card(
        &self,
        user_id: &str,
        item_id: &str,
        quality: Quality,
    ) -> Result<ReviewItem, EngineError> {
        validate_user_id(user_id)?;
        let user_lock = self.acquire_user_lock(user_id).await;
        let _guard = user_lock.lock().await;

        let config = self.config.read().await.scheduler.clone();
        let item = self
            .store
            .get_review_item(user_id, item_id)?
            .ok_or_else(|| EngineError::not_found("review_item", item_id))?;

        let reviewed = scheduler::review(&item, quality, Utc::now(), &config);
        self.store.set_review_item(user_id, &reviewed)?;

        if let Some(subject) = reviewed.subject.clone() {
            let signal = Signal::FlashcardRating {
                subject: Some(subject),
                rating: quality,
            };
            // 卡片已经落盘，画像更新失败只记录，避免调用方重试导致重复复习。
            if let Err(e) = self
                .apply_signals_locked(user_id, std::slice::from_ref(&signal))
                .await
            {
                tracing::warn!(user_id, item_id, error = %e, "Flashcard rating not applied to profile");
            }
        }

        tracing::info!(
            user_id,
            item_id,
            quality = quality.as_str(),
            stability = reviewed.stability,
            difficulty = reviewed.difficulty,
            next_due_at = %reviewed.next_due_at,
            "Card reviewed"
        );
        Ok(reviewed)
    }

    pub async fn due_cards(&self, user_id: &str, limit: usize) -> Result<Vec<ReviewItem>, EngineError> {
        validate_user_id(user_id)?;
        Ok(self.store.get_due_review_items(user_id, Utc::now(), limit)?)
    }

    pub async fn collection_stats(&self, user_id: &str) -> Result<CollectionStats, EngineError> {
        validate_user_id(user_id)?;
        let config = self.config.read().await.scheduler.clone();
        let items = self.store.list_review_items(user_id)?;
        Ok(collection::stats(&items, Utc::now(), &config))
    }

    /// Analyses a finished quiz, keeps the result for later adjustments and feeds the score
    /// into the profile.
    pub async fn record_quiz(
        &self,
        user_id: &str,
        quiz: &Quiz,
        result: &QuizResult,
        outcomes: &[QuestionOutcome],
    ) -> Result<QuizAnalysis, EngineError> {
        validate_user_id(user_id)?;
        if !result.score.is_finite() || !(0.0..=100.0).contains(&result.score) {
            return Err(EngineError::invalid_input(format!(
                "quiz score must be within 0-100, got {}",
                result.score
            )));
        }

        let user_lock = self.acquire_user_lock(user_id).await;
        let _guard = user_lock.lock().await;

        let config = self.config.read().await.quiz.clone();
        let analysis = analyze(quiz, result, outcomes, &config);

        let mut stored = result.clone();
        if stored.subject.is_none() {
            stored.subject = quiz.subject.clone();
        }
        self.store.insert_quiz_result(user_id, &stored)?;

        let signal = Signal::QuizResult {
            subject: stored.subject.clone(),
            percentage: stored.score,
        };
        self.apply_signals_locked(user_id, std::slice::from_ref(&signal))
            .await?;

        tracing::info!(
            user_id,
            quiz_id = %result.quiz_id,
            score = analysis.score,
            needs_review = analysis.needs_review,
            weak_topics = analysis.weak_topics.len(),
            "Quiz recorded"
        );
        Ok(analysis)
    }

    /// Difficulty suggestion from the user's recent quiz history, clamped to the 1..=5 scale.
    pub async fn recommend_difficulty(
        &self,
        user_id: &str,
        subject: Option<&str>,
        current_difficulty: f64,
    ) -> Result<DifficultyAdjustment, EngineError> {
        validate_user_id(user_id)?;
        if !current_difficulty.is_finite() {
            return Err(EngineError::invalid_input("current difficulty must be finite"));
        }

        let config = self.config.read().await.quiz.clone();
        let recent = self
            .store
            .recent_quiz_results(user_id, subject, MAX_STORED_QUIZ_RESULTS)?;
        let mut adjustment = calculate_difficulty_adjustment(
            current_difficulty.clamp(1.0, 5.0),
            &recent,
            None,
            &config,
        );
        adjustment.suggested_difficulty = adjustment.suggested_difficulty.clamp(1.0, 5.0);
        Ok(adjustment)
    }

    pub async fn review_suggestions<S: MaterialSearch + ?Sized>(
        &self,
        search: &S,
        user_id: &str,
        analysis: &QuizAnalysis,
        subject: &str,
    ) -> Result<Vec<ReviewSuggestion>, EngineError> {
        validate_user_id(user_id)?;
        let config = self.config.read().await.clone();
        Ok(generate_review_suggestions(
            search,
            user_id,
            analysis,
            subject,
            &config.quiz,
            &config.suggestions,
        )
        .await)
    }

    pub async fn seen_concepts<S: MaterialSearch + ?Sized>(
        &self,
        search: &S,
        user_id: &str,
        concepts: &[String],
        subject: &str,
    ) -> Result<BTreeMap<String, Option<SeenConcept>>, EngineError> {
        validate_user_id(user_id)?;
        let config = self.config.read().await.suggestions.clone();
        Ok(check_seen_concepts(search, user_id, concepts, subject, &config, Utc::now()).await)
    }

    /// Drops the behavioural profile; cards and quiz history are kept.
    pub async fn reset_profile(&self, user_id: &str) -> Result<bool, EngineError> {
        validate_user_id(user_id)?;
        let user_lock = self.acquire_user_lock(user_id).await;
        let _guard = user_lock.lock().await;
        let removed = self.store.delete_profile(user_id)?;
        tracing::info!(user_id, removed, "Profile reset");
        Ok(removed)
    }
}

fn validate_user_id(user_id: &str) -> Result<(), EngineError> {
    if user_id.trim().is_empty() {
        return Err(EngineError::invalid_input("user id must not be empty"));
    }
    if user_id.contains(':') {
        return Err(EngineError::invalid_input("user id must not contain ':'"));
    }
    Ok(())
}
