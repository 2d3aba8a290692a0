use serde::{Deserialize, Serialize};

use crate::adaptive::quiz::QuizResult;
use crate::constants::MAX_STORED_QUIZ_RESULTS;
use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredQuizResult {
    pub id: String,
    pub user_id: String,
    pub result: QuizResult,
}

impl Store {
    /// Appends a result and prunes the user's history to the newest entries.
    pub fn insert_quiz_result(
        &self,
        user_id: &str,
        result: &QuizResult,
    ) -> Result<StoredQuizResult, StoreError> {
        let stored = StoredQuizResult {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            result: result.clone(),
        };
        let key = keys::quiz_result_key(
            user_id,
            result.completed_at.timestamp_millis(),
            &stored.id,
        )?;
        self.quiz_results
            .insert(key.as_bytes(), Self::serialize(&stored)?)?;
        self.prune_quiz_results(user_id, MAX_STORED_QUIZ_RESULTS)?;
        Ok(stored)
    }

    /// Up to `limit` most recent results, oldest first, optionally for one subject.
    pub fn recent_quiz_results(
        &self,
        user_id: &str,
        subject: Option<&str>,
        limit: usize,
    ) -> Result<Vec<QuizResult>, StoreError> {
        let prefix = keys::quiz_result_prefix(user_id)?;
        let mut out = Vec::with_capacity(limit.min(MAX_STORED_QUIZ_RESULTS));

        for entry in self.quiz_results.scan_prefix(prefix.as_bytes()).rev() {
            if out.len() >= limit {
                break;
            }
            let (_, v) = entry?;
            let stored: StoredQuizResult = Self::deserialize(&v)?;
            if subject.is_some() && stored.result.subject.as_deref() != subject {
                continue;
            }
            out.push(stored.result);
        }

        out.reverse();
        Ok(out)
    }

    fn prune_quiz_results(&self, user_id: &str, keep: usize) -> Result<usize, StoreError> {
        let prefix = keys::quiz_result_prefix(user_id)?;
        let keys: Vec<sled::IVec> = self
            .quiz_results
            .scan_prefix(prefix.as_bytes())
            .keys()
            .collect::<Result<_, _>>()?;

        let excess = keys.len().saturating_sub(keep);
        for key in keys.iter().take(excess) {
            self.quiz_results.remove(key)?;
        }
        if excess > 0 {
            tracing::debug!(user_id, pruned = excess, "Pruned old quiz results");
        }
        Ok(excess)
    }
}
