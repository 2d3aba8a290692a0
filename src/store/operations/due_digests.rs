use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestPriority {
    Normal,
    High,
}

/// Summary of a user's review backlog, refreshed by the due digest worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DueDigest {
    pub user_id: String,
    pub due_count: usize,
    pub next_due_at: Option<DateTime<Utc>>,
    pub priority: DigestPriority,
    pub generated_at: DateTime<Utc>,
}

impl Store {
    pub fn get_due_digest(&self, user_id: &str) -> Result<Option<DueDigest>, StoreError> {
        let key = keys::due_digest_key(user_id)?;
        match self.due_digests.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn put_due_digest(&self, digest: &DueDigest) -> Result<(), StoreError> {
        let key = keys::due_digest_key(&digest.user_id)?;
        self.due_digests
            .insert(key.as_bytes(), Self::serialize(digest)?)?;
        Ok(())
    }

    pub fn delete_due_digest(&self, user_id: &str) -> Result<bool, StoreError> {
        let key = keys::due_digest_key(user_id)?;
        Ok(self.due_digests.remove(key.as_bytes())?.is_some())
    }

    pub fn list_due_digests(&self) -> Result<Vec<DueDigest>, StoreError> {
        let mut out = Vec::new();
        for entry in self.due_digests.iter() {
            let (_, v) = entry?;
            out.push(Self::deserialize(&v)?);
        }
        Ok(out)
    }
}
