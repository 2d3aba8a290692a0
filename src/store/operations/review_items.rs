use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sled::Transactional;

use crate::adaptive::memory::{collection, ReviewItem};
use crate::store::keys;
use crate::store::{abort_serialization, map_transaction_error, Store, StoreError};

/// Per-user view of the due index at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDueSummary {
    pub user_id: String,
    pub due_count: usize,
    /// Earliest due time among the user's due items.
    pub next_due_at: Option<DateTime<Utc>>,
}

fn order_value(raw: &[u8]) -> u64 {
    raw.try_into().map(u64::from_be_bytes).unwrap_or(u64::MAX)
}

fn due_key_for(user_id: &str, item: &ReviewItem) -> Result<String, StoreError> {
    keys::due_index_key(user_id, item.next_due_at.timestamp_millis(), &item.id)
}

impl Store {
    pub fn get_review_item(
        &self,
        user_id: &str,
        item_id: &str,
    ) -> Result<Option<ReviewItem>, StoreError> {
        let key = keys::review_item_key(user_id, item_id)?;
        match self.review_items.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Upserts an item and moves its due-index entry in the same transaction.
    pub fn set_review_item(&self, user_id: &str, item: &ReviewItem) -> Result<(), StoreError> {
        let key = keys::review_item_key(user_id, &item.id)?;
        let value = Self::serialize(item)?;
        let next_due_key = due_key_for(user_id, item)?;
        let seq = self.next_sequence()?;

        (&self.review_items, &self.review_due_index, &self.review_item_order)
            .transaction(|(tx_items, tx_due, tx_order)| {
                if let Some(old_raw) = tx_items.get(key.as_bytes())? {
                    let old: ReviewItem =
                        serde_json::from_slice(&old_raw).map_err(abort_serialization)?;
                    let old_due_key = due_key_for(user_id, &old)
                        .map_err(sled::transaction::ConflictableTransactionError::Abort)?;
                    tx_due.remove(old_due_key.as_bytes())?;
                }
                if tx_order.get(key.as_bytes())?.is_none() {
                    tx_order.insert(key.as_bytes(), seq.to_be_bytes().to_vec())?;
                }

                tx_items.insert(key.as_bytes(), value.as_slice())?;
                tx_due.insert(next_due_key.as_bytes(), &[])?;
                Ok(())
            })
            .map_err(map_transaction_error)?;

        Ok(())
    }

    pub fn delete_review_item(&self, user_id: &str, item_id: &str) -> Result<bool, StoreError> {
        let key = keys::review_item_key(user_id, item_id)?;

        let removed = (&self.review_items, &self.review_due_index, &self.review_item_order)
            .transaction(|(tx_items, tx_due, tx_order)| {
                let Some(raw) = tx_items.remove(key.as_bytes())? else {
                    return Ok(false);
                };
                tx_order.remove(key.as_bytes())?;
                let removed: ReviewItem = serde_json::from_slice(&raw).map_err(abort_serialization)?;
                let due_key = due_key_for(user_id, &removed)
                    .map_err(sled::transaction::ConflictableTransactionError::Abort)?;
                tx_due.remove(due_key.as_bytes())?;
                Ok(true)
            })
            .map_err(map_transaction_error)?;

        Ok(removed)
    }

    pub fn list_review_items(&self, user_id: &str) -> Result<Vec<ReviewItem>, StoreError> {
        let prefix = keys::review_item_prefix(user_id)?;
        let mut items = Vec::new();
        for entry in self.review_items.scan_prefix(prefix.as_bytes()) {
            let (_, v) = entry?;
            items.push(Self::deserialize::<ReviewItem>(&v)?);
        }
        Ok(items)
    }

    /// Items due at `now`, earliest first; equal due times come back in insertion order.
    ///
    /// The due index narrows the scan to candidates at millisecond resolution, the final
    /// filter and ordering go through [`collection::due_items`].
    pub fn get_due_review_items(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ReviewItem>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let prefix = keys::due_index_prefix(user_id)?;
        let now_ms = now.timestamp_millis().max(0);
        let mut candidates = Vec::new();

        for entry in self.review_due_index.scan_prefix(prefix.as_bytes()) {
            let (key, _) = entry?;
            let Some(parsed) = keys::parse_due_index_key(&key) else {
                tracing::warn!(key = %String::from_utf8_lossy(&key), "Malformed due index key");
                continue;
            };
            if parsed.due_ts_ms > now_ms {
                break;
            }

            let item_key = keys::review_item_key(user_id, &parsed.item_id)?;
            match self.get_review_item(user_id, &parsed.item_id)? {
                Some(item) if item.next_due_at.timestamp_millis().max(0) == parsed.due_ts_ms => {
                    let seq = self
                        .review_item_order
                        .get(item_key.as_bytes())?
                        .map(|raw| order_value(&raw))
                        .unwrap_or(u64::MAX);
                    candidates.push((seq, item));
                }
                _ => {
                    tracing::debug!(user_id, item_id = %parsed.item_id, "Stale due index entry");
                }
            }
        }

        candidates.sort_by_key(|(seq, _)| *seq);
        let items: Vec<ReviewItem> = candidates.into_iter().map(|(_, item)| item).collect();
        Ok(collection::due_items(&items, now, Some(limit)))
    }

    /// Groups every due index entry at or before `now` by user.
    pub fn due_summaries(&self, now: DateTime<Utc>) -> Result<Vec<UserDueSummary>, StoreError> {
        let now_ms = now.timestamp_millis().max(0);
        let mut by_user: BTreeMap<String, (usize, i64)> = BTreeMap::new();

        for entry in self.review_due_index.iter() {
            let (key, _) = entry?;
            let Some(parsed) = keys::parse_due_index_key(&key) else {
                continue;
            };
            if parsed.due_ts_ms > now_ms {
                continue;
            }
            let slot = by_user.entry(parsed.user_id).or_insert((0, parsed.due_ts_ms));
            slot.0 += 1;
            slot.1 = slot.1.min(parsed.due_ts_ms);
        }

        Ok(by_user
            .into_iter()
            .map(|(user_id, (due_count, earliest_ms))| UserDueSummary {
                user_id,
                due_count,
                next_due_at: Utc.timestamp_millis_opt(earliest_ms).single(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use tempfile::tempdir;

    use super::*;
    use crate::adaptive::config::SchedulerConfig;

    fn item(id: &str, due: DateTime<Utc>) -> ReviewItem {
        let mut item = ReviewItem::new(id, Some("math"), &SchedulerConfig::default(), due - Duration::days(1));
        item.next_due_at = due;
        item
    }

    #[test]
    fn due_items_come_back_ascending_and_limited() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();
        let now = Utc::now();

        store.set_review_item("u1", &item("i1", now - Duration::minutes(5))).unwrap();
        store.set_review_item("u1", &item("i2", now - Duration::minutes(1))).unwrap();
        store.set_review_item("u1", &item("i3", now - Duration::minutes(3))).unwrap();
        store.set_review_item("u1", &item("i4", now + Duration::minutes(1))).unwrap();
        store.set_review_item("u2", &item("x", now - Duration::minutes(9))).unwrap();

        let due = store.get_due_review_items("u1", now, 2).unwrap();
        let ids: Vec<&str> = due.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["i1", "i3"]);
        assert_eq!(store.list_review_items("u1").unwrap().len(), 4);
    }

    #[test]
    fn equal_due_times_keep_insertion_order() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();
        let now = Utc::now();
        let due = now - Duration::minutes(10);

        for id in ["zz-first", "mm-second", "aa-third"] {
            store.set_review_item("u1", &item(id, due)).unwrap();
        }
        // Rewriting an item keeps its original position.
        store.set_review_item("u1", &item("zz-first", due)).unwrap();

        let ids: Vec<String> = store
            .get_due_review_items("u1", now, 10)
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec!["zz-first", "mm-second", "aa-third"]);
    }

    #[test]
    fn sub_millisecond_future_items_are_not_due() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();

        store
            .set_review_item("u1", &item("later", now + Duration::microseconds(500)))
            .unwrap();
        assert!(store.get_due_review_items("u1", now, 10).unwrap().is_empty());
    }

    #[test]
    fn rescheduling_moves_the_index_entry() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();
        let now = Utc::now();

        let mut card = item("i1", now - Duration::minutes(5));
        store.set_review_item("u1", &card).unwrap();
        assert_eq!(store.get_due_review_items("u1", now, 10).unwrap().len(), 1);

        card.next_due_at = now + Duration::days(2);
        store.set_review_item("u1", &card).unwrap();
        assert!(store.get_due_review_items("u1", now, 10).unwrap().is_empty());
        assert_eq!(store.review_due_index.len(), 1);
    }

    #[test]
    fn deleted_item_leaves_no_index_entry() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();
        let now = Utc::now();

        store.set_review_item("u1", &item("i1", now - Duration::minutes(2))).unwrap();
        assert!(store.delete_review_item("u1", "i1").unwrap());
        assert!(!store.delete_review_item("u1", "i1").unwrap());
        assert!(store.review_due_index.is_empty());
        assert!(store.review_item_order.is_empty());
        assert!(store.get_review_item("u1", "i1").unwrap().is_none());
    }

    #[test]
    fn summaries_group_due_entries_per_user() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();
        let now = Utc::now();
        let earliest = now - Duration::hours(3);

        store.set_review_item("u1", &item("a", earliest)).unwrap();
        store.set_review_item("u1", &item("b", now - Duration::hours(1))).unwrap();
        store.set_review_item("u1", &item("c", now + Duration::hours(1))).unwrap();
        store.set_review_item("u2", &item("d", now + Duration::hours(1))).unwrap();

        let summaries = store.due_summaries(now).unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].user_id, "u1");
        assert_eq!(summaries[0].due_count, 2);
        assert_eq!(
            summaries[0].next_due_at.map(|t| t.timestamp_millis()),
            Some(earliest.timestamp_millis())
        );
    }
}
