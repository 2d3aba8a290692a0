use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::adaptive::config::{QuizConfig, SuggestionConfig};
use crate::services::material_search::{MaterialSearch, SearchHit, SearchQuery};

use super::analysis::QuizAnalysis;

const REVIEW_SOURCE_TYPE: &str = "material";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSuggestion {
    pub topic: String,
    pub subject: String,
    pub materials: Vec<SearchHit>,
    /// 1 = materials found, 2 = none found, 3 = lookup failed.
    pub priority: u8,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeenConcept {
    pub concept: String,
    pub subject: String,
    pub mastery_level: u8,
    pub times_reviewed: u32,
    pub last_seen: DateTime<Utc>,
}

/// One suggestion per weak topic, best-supported first. Lookups run concurrently.
///
/// Lookup failures never abort: the topic is still suggested, without materials.
pub async fn generate_review_suggestions<S: MaterialSearch + ?Sized>(
    search: &S,
    user_id: &str,
    analysis: &QuizAnalysis,
    subject: &str,
    quiz_config: &QuizConfig,
    config: &SuggestionConfig,
) -> Vec<ReviewSuggestion> {
    if !analysis.needs_review || analysis.weak_topics.is_empty() {
        return Vec::new();
    }

    let lookups = analysis.weak_topics.iter().map(|topic| async move {
        let query = SearchQuery {
            user_id: Some(user_id.to_string()),
            query: topic.clone(),
            subject: Some(subject.to_string()),
            limit: config.review_search_limit,
            min_score: config.review_min_score,
            source_type: Some(REVIEW_SOURCE_TYPE.to_string()),
        };
        (topic, search.search(&query).await)
    });

    let mut suggestions: Vec<ReviewSuggestion> = join_all(lookups)
        .await
        .into_iter()
        .map(|(topic, found)| match found {
            Ok(materials) if !materials.is_empty() => ReviewSuggestion {
                topic: topic.clone(),
                subject: subject.to_string(),
                reason: format!(
                    "Scored less than {:.0}% on {topic}: go over the suggested materials",
                    quiz_config.review_threshold
                ),
                materials,
                priority: 1,
            },
            Ok(_) => ReviewSuggestion {
                topic: topic.clone(),
                subject: subject.to_string(),
                reason: format!(
                    "Scored less than {:.0}% on {topic}: no materials found, review it with the tutor",
                    quiz_config.review_threshold
                ),
                materials: Vec::new(),
                priority: 2,
            },
            Err(e) => {
                tracing::warn!(user_id, topic = %topic, error = %e, "Review material lookup failed");
                ReviewSuggestion {
                    topic: topic.clone(),
                    subject: subject.to_string(),
                    reason: format!("Plan a general review of {topic}"),
                    materials: Vec::new(),
                    priority: 3,
                }
            }
        })
        .collect();

    suggestions.sort_by_key(|s| s.priority);
    suggestions
}

/// For each concept, whether the learner has already met it in their materials.
pub async fn check_seen_concepts<S: MaterialSearch + ?Sized>(
    search: &S,
    user_id: &str,
    concepts: &[String],
    subject: &str,
    config: &SuggestionConfig,
    now: DateTime<Utc>,
) -> BTreeMap<String, Option<SeenConcept>> {
    let lookups = concepts.iter().map(|concept| async move {
        let query = SearchQuery {
            user_id: Some(user_id.to_string()),
            query: concept.clone(),
            subject: Some(subject.to_string()),
            limit: config.seen_search_limit,
            min_score: config.seen_min_score,
            source_type: None,
        };
        (concept, search.search(&query).await)
    });

    join_all(lookups)
        .await
        .into_iter()
        .map(|(concept, found)| {
            let seen = match found {
                Ok(hits) => hits
                    .first()
                    .filter(|hit| hit.relevance >= config.seen_similarity_threshold)
                    .map(|hit| SeenConcept {
                        concept: concept.clone(),
                        subject: subject.to_string(),
                        mastery_level: (hit.relevance.clamp(0.0, 1.0) * 100.0).round() as u8,
                        times_reviewed: 1,
                        last_seen: now,
                    }),
                Err(e) => {
                    tracing::debug!(user_id, concept = %concept, error = %e, "Seen-concept lookup failed");
                    None
                }
            };
            (concept.clone(), seen)
        })
        .collect()
}
