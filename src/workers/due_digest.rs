//! Due digest worker
//! Periodic scan of the due index; keeps one backlog digest per user.
//! 未变化的摘要在去重窗口内不重写

use chrono::{DateTime, Duration, Utc};

use crate::constants::HIGH_PRIORITY_DUE_COUNT;
use crate::store::operations::due_digests::{DigestPriority, DueDigest};
use crate::store::{Store, StoreError};

/// 摘要去重窗口
const DEDUP_WINDOW_HOURS: i64 = 6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DigestRunStats {
    pub written: u32,
    pub skipped_dedup: u32,
    pub cleared: u32,
}

pub async fn run(store: &Store) {
    tracing::info!("Due digest worker running");

    match run_at(store, Utc::now()) {
        Ok(stats) => {
            if stats.skipped_dedup > 0 {
                tracing::info!(
                    skipped_dedup = stats.skipped_dedup,
                    "Due digest: skipped unchanged digests"
                );
            }
            tracing::info!(
                written = stats.written,
                cleared = stats.cleared,
                "Due digest: run complete"
            );
        }
        Err(e) => tracing::warn!(error = %e, "Due digest: run failed"),
    }
}

pub fn run_at(store: &Store, now: DateTime<Utc>) -> Result<DigestRunStats, StoreError> {
    let cutoff = now - Duration::hours(DEDUP_WINDOW_HOURS);
    let mut stats = DigestRunStats::default();

    let summaries = store.due_summaries(now)?;

    for summary in &summaries {
        let previous = match store.get_due_digest(&summary.user_id) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(user_id = %summary.user_id, error = %e, "Due digest: failed to read digest");
                None
            }
        };

        if let Some(prev) = &previous {
            if prev.due_count == summary.due_count && prev.generated_at >= cutoff {
                stats.skipped_dedup += 1;
                continue;
            }
        }

        let priority = if summary.due_count > HIGH_PRIORITY_DUE_COUNT {
            DigestPriority::High
        } else {
            DigestPriority::Normal
        };
        let digest = DueDigest {
            user_id: summary.user_id.clone(),
            due_count: summary.due_count,
            next_due_at: summary.next_due_at,
            priority,
            generated_at: now,
        };

        if let Err(e) = store.put_due_digest(&digest) {
            tracing::warn!(user_id = %summary.user_id, error = %e, "Due digest: failed to write digest");
            continue;
        }
        stats.written += 1;
    }

    // 已清空积压的用户移除旧摘要
    for digest in store.list_due_digests()? {
        if summaries.iter().any(|s| s.user_id == digest.user_id) {
            continue;
        }
        if store.delete_due_digest(&digest.user_id)? {
            stats.cleared += 1;
        }
    }

    Ok(stats)
}
