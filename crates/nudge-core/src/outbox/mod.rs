//! Durable pending-operation queue, one row per entity.
//!
//! Repeated local edits collapse into the entity's single row: the latest
//! operation, payload and hash win while the first `created_at` is kept, so
//! FIFO draining stays fair and only the newest state is ever transmitted.

use serde::Serialize;
use serde_json::Value;

use crate::db::OutboxRepository;
use crate::error::Result;
use crate::hash::{canonical_digest, canonical_json};
use crate::models::{OutboxEntry, OutboxOperation};
use crate::retry::RetryPolicy;
use crate::util::compact_text;

/// Read-only view over the queue, derived from stored rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total: usize,
    /// Never attempted
    pub pending: usize,
    /// Failed at least once with retry budget left
    pub retrying: usize,
    /// Retry budget exhausted, waiting for a manual reset
    pub maxed_out: usize,
    /// Earliest scheduled retry still in the future
    pub next_retry_at: Option<i64>,
}

impl QueueStats {
    fn from_entries(entries: &[OutboxEntry], max_attempts: u32, now: i64) -> Self {
        let mut stats = Self {
            total: entries.len(),
            ..Self::default()
        };
        for entry in entries {
            match entry.retry_count {
                0 => stats.pending += 1,
                count if count < max_attempts => stats.retrying += 1,
                _ => stats.maxed_out += 1,
            }
            if let Some(at) = entry.next_retry_at.filter(|at| *at > now) {
                stats.next_retry_at = Some(stats.next_retry_at.map_or(at, |min| min.min(at)));
            }
        }
        stats
    }
}

/// Outbox operations over an injected repository
#[derive(Clone)]
pub struct OutboxStore<R> {
    repo: R,
    policy: RetryPolicy,
}

impl<R: OutboxRepository> OutboxStore<R> {
    pub const fn new(repo: R, policy: RetryPolicy) -> Self {
        Self { repo, policy }
    }

    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Upsert the pending row for `entity_id`, keeping the original `created_at`
    pub async fn enqueue(
        &self,
        entity_id: &str,
        owner_id: &str,
        operation: OutboxOperation,
        payload: &Value,
        now: i64,
    ) -> Result<OutboxEntry> {
        let created_at = self
            .repo
            .get_entry(entity_id)
            .await?
            .map_or(now, |existing| existing.created_at);

        let entry = OutboxEntry {
            entity_id: entity_id.to_string(),
            owner_id: owner_id.to_string(),
            operation,
            payload: canonical_json(payload),
            payload_hash: canonical_digest(payload),
            created_at,
            updated_at: now,
            retry_count: 0,
            next_retry_at: None,
            last_error: None,
        };
        self.repo.put_entry(&entry).await?;

        tracing::debug!(entity_id, %operation, collapsed = created_at != now, "Enqueued outbox entry");
        Ok(entry)
    }

    pub async fn get(&self, entity_id: &str) -> Result<Option<OutboxEntry>> {
        self.repo.get_entry(entity_id).await
    }

    /// Entries eligible at `now`, oldest first
    pub async fn list_ready(&self, now: i64) -> Result<Vec<OutboxEntry>> {
        self.repo
            .list_ready_entries(now, self.policy.max_attempts)
            .await
    }

    pub async fn list_all(&self) -> Result<Vec<OutboxEntry>> {
        self.repo.list_entries().await
    }

    /// Record a failed attempt and schedule the next one while budget remains.
    ///
    /// Exhausted entries keep their row with no `next_retry_at`; they stay
    /// queued until reset. Returns the updated entry, or `None` if the row is gone.
    pub async fn mark_failed(
        &self,
        entity_id: &str,
        now: i64,
        error: &str,
    ) -> Result<Option<OutboxEntry>> {
        let Some(mut entry) = self.repo.get_entry(entity_id).await? else {
            return Ok(None);
        };

        entry.retry_count = entry.retry_count.saturating_add(1);
        entry.next_retry_at = if self.policy.should_retry(entry.retry_count) {
            let delay = i64::try_from(self.policy.delay(entry.retry_count).as_millis())
                .unwrap_or(i64::MAX);
            Some(now.saturating_add(delay))
        } else {
            None
        };
        entry.last_error = Some(compact_text(error));

        self.repo
            .update_retry(
                entity_id,
                entry.retry_count,
                entry.next_retry_at,
                entry.last_error.as_deref(),
            )
            .await?;

        if entry.next_retry_at.is_none() {
            tracing::warn!(entity_id, attempts = entry.retry_count, "Outbox entry exhausted its retries");
        }
        Ok(Some(entry))
    }

    /// Delete rows the authority has accepted
    pub async fn clear(&self, entity_ids: &[String]) -> Result<u64> {
        self.repo.delete_entries(entity_ids).await
    }

    /// Delete accepted rows unless they were re-enqueued after submission.
    ///
    /// Returns the ids that stay queued because a newer edit replaced them.
    pub async fn clear_settled(&self, submitted: &[OutboxEntry]) -> Result<Vec<String>> {
        let mut superseded = Vec::new();
        for entry in submitted {
            let removed = self
                .repo
                .delete_settled(&entry.entity_id, entry.updated_at, &entry.payload_hash)
                .await?;
            if !removed && self.repo.get_entry(&entry.entity_id).await?.is_some() {
                superseded.push(entry.entity_id.clone());
            }
        }
        Ok(superseded)
    }

    /// Zero the retry state of one entry; `false` if it does not exist
    pub async fn reset_retry(&self, entity_id: &str) -> Result<bool> {
        if self.repo.get_entry(entity_id).await?.is_none() {
            return Ok(false);
        }
        self.repo.update_retry(entity_id, 0, None, None).await?;
        Ok(true)
    }

    /// Zero the retry state of every entry that has failed at least once
    pub async fn reset_all(&self) -> Result<usize> {
        let mut reset = 0;
        for entry in self.repo.list_entries().await? {
            if entry.retry_count > 0 || entry.next_retry_at.is_some() {
                self.repo
                    .update_retry(&entry.entity_id, 0, None, None)
                    .await?;
                reset += 1;
            }
        }
        Ok(reset)
    }

    pub async fn stats(&self, now: i64) -> Result<QueueStats> {
        let entries = self.repo.list_entries().await?;
        Ok(QueueStats::from_entries(
            &entries,
            self.policy.max_attempts,
            now,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, LibSqlStore};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn setup() -> (Database, OutboxStore<LibSqlStore>) {
        let db = Database::open_in_memory().await.unwrap();
        let store = OutboxStore::new(
            LibSqlStore::from_database(&db),
            RetryPolicy::default().without_jitter(),
        );
        (db, store)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_repeated_enqueue_collapses_to_one_row() {
        let (_db, outbox) = setup().await;
        outbox
            .enqueue("note-1", "owner-1", OutboxOperation::Create, &json!({"content": "a"}), 100)
            .await
            .unwrap();
        outbox
            .enqueue("note-1", "owner-1", OutboxOperation::Update, &json!({"content": "b"}), 200)
            .await
            .unwrap();
        let last = outbox
            .enqueue("note-1", "owner-1", OutboxOperation::Delete, &json!({"content": "c"}), 300)
            .await
            .unwrap();

        let all = outbox.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        let entry = &all[0];
        assert_eq!(entry.operation, OutboxOperation::Delete);
        assert_eq!(entry.payload, r#"{"content":"c"}"#);
        assert_eq!(entry.payload_hash, last.payload_hash);
        assert_eq!(entry.created_at, 100);
        assert_eq!(entry.updated_at, 300);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_ready_is_fifo_by_first_enqueue() {
        let (_db, outbox) = setup().await;
        for (id, at) in [("b", 200), ("a", 100), ("c", 300)] {
            outbox
                .enqueue(id, "owner-1", OutboxOperation::Create, &json!({}), at)
                .await
                .unwrap();
        }
        // re-editing "a" must not move it behind the others
        outbox
            .enqueue("a", "owner-1", OutboxOperation::Update, &json!({"v": 2}), 400)
            .await
            .unwrap();

        let ids: Vec<_> = outbox
            .list_ready(500)
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.entity_id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_failed_backs_off_then_exhausts() {
        let (_db, outbox) = setup().await;
        outbox
            .enqueue("note-1", "owner-1", OutboxOperation::Create, &json!({}), 0)
            .await
            .unwrap();

        let failed = outbox
            .mark_failed("note-1", 1_000, "connection refused")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(failed.retry_count, 1);
        assert_eq!(failed.next_retry_at, Some(3_000));
        assert_eq!(failed.last_error.as_deref(), Some("connection refused"));

        assert!(outbox.list_ready(2_999).await.unwrap().is_empty());
        assert_eq!(outbox.list_ready(3_000).await.unwrap().len(), 1);

        let mut last = failed;
        for _ in 1..outbox.policy().max_attempts {
            last = outbox
                .mark_failed("note-1", 10_000, "still down")
                .await
                .unwrap()
                .unwrap();
        }
        assert_eq!(last.retry_count, 5);
        assert_eq!(last.next_retry_at, None);

        // maxed out: kept, but not ready until reset
        assert!(outbox.list_ready(i64::MAX).await.unwrap().is_empty());
        assert_eq!(outbox.list_all().await.unwrap().len(), 1);

        assert!(outbox.reset_retry("note-1").await.unwrap());
        let ready = outbox.list_ready(10_000).await.unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].retry_count, 0);
        assert_eq!(ready[0].last_error, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_failed_on_missing_entry_is_noop() {
        let (_db, outbox) = setup().await;
        assert!(outbox.mark_failed("ghost", 0, "x").await.unwrap().is_none());
        assert!(!outbox.reset_retry("ghost").await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_enqueue_resets_retry_state() {
        let (_db, outbox) = setup().await;
        outbox
            .enqueue("note-1", "owner-1", OutboxOperation::Create, &json!({}), 0)
            .await
            .unwrap();
        outbox.mark_failed("note-1", 0, "boom").await.unwrap();

        let entry = outbox
            .enqueue("note-1", "owner-1", OutboxOperation::Update, &json!({"v": 1}), 50)
            .await
            .unwrap();
        assert_eq!(entry.retry_count, 0);
        assert_eq!(entry.next_retry_at, None);
        assert_eq!(outbox.list_ready(50).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_clear_settled_keeps_in_flight_edits() {
        let (_db, outbox) = setup().await;
        let first = outbox
            .enqueue("a", "owner-1", OutboxOperation::Create, &json!({"v": 1}), 10)
            .await
            .unwrap();
        let second = outbox
            .enqueue("b", "owner-1", OutboxOperation::Create, &json!({"v": 1}), 20)
            .await
            .unwrap();
        // "b" edited again while the batch was in flight
        outbox
            .enqueue("b", "owner-1", OutboxOperation::Update, &json!({"v": 2}), 30)
            .await
            .unwrap();

        let superseded = outbox.clear_settled(&[first, second]).await.unwrap();
        assert_eq!(superseded, vec!["b".to_string()]);

        let remaining = outbox.list_all().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].entity_id, "b");
        assert_eq!(remaining[0].operation, OutboxOperation::Update);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_clear_removes_rows() {
        let (_db, outbox) = setup().await;
        for id in ["a", "b"] {
            outbox
                .enqueue(id, "owner-1", OutboxOperation::Create, &json!({}), 0)
                .await
                .unwrap();
        }
        let removed = outbox
            .clear(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(outbox.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stats_classify_entries() {
        let (_db, outbox) = setup().await;
        for id in ["fresh", "retrying", "maxed"] {
            outbox
                .enqueue(id, "owner-1", OutboxOperation::Create, &json!({}), 0)
                .await
                .unwrap();
        }
        outbox.mark_failed("retrying", 1_000, "x").await.unwrap();
        for _ in 0..5 {
            outbox.mark_failed("maxed", 1_000, "x").await.unwrap();
        }

        let stats = outbox.stats(1_000).await.unwrap();
        assert_eq!(
            stats,
            QueueStats {
                total: 3,
                pending: 1,
                retrying: 1,
                maxed_out: 1,
                next_retry_at: Some(3_000),
            }
        );

        assert_eq!(outbox.reset_all().await.unwrap(), 2);
        let stats = outbox.stats(1_000).await.unwrap();
        assert_eq!(stats.pending, 3);
        assert_eq!(stats.next_retry_at, None);
    }
}
