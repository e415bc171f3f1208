//! Per-entity record of the last committed scheduling outcome

use crate::db::LedgerRepository;
use crate::error::{Error, Result};
use crate::models::ScheduleLedgerEntry;

/// Schedule ledger over an injected repository
#[derive(Clone)]
pub struct ScheduleLedger<R> {
    repo: R,
}

impl<R: LedgerRepository> ScheduleLedger<R> {
    pub const fn new(repo: R) -> Self {
        Self { repo }
    }

    pub async fn get(&self, entity_id: &str) -> Result<Option<ScheduleLedgerEntry>> {
        self.repo.get_ledger(entity_id).await
    }

    /// Handles currently held for `entity_id` (empty when none)
    pub async fn held_handles(&self, entity_id: &str) -> Result<Vec<String>> {
        Ok(self
            .repo
            .get_ledger(entity_id)
            .await?
            .map(|entry| entry.notification_ids)
            .unwrap_or_default())
    }

    pub async fn record_scheduled(
        &self,
        entity_id: &str,
        handles: Vec<String>,
        hash: &str,
        now: i64,
    ) -> Result<ScheduleLedgerEntry> {
        if handles.is_empty() {
            return Err(Error::InvalidInput(format!(
                "scheduled ledger entry for {entity_id} needs at least one handle"
            )));
        }
        self.put(ScheduleLedgerEntry::scheduled(entity_id, handles, hash, now))
            .await
    }

    pub async fn record_canceled(&self, entity_id: &str, now: i64) -> Result<ScheduleLedgerEntry> {
        self.put(ScheduleLedgerEntry::canceled(entity_id, now))
            .await
    }

    pub async fn record_error(
        &self,
        entity_id: &str,
        hash: &str,
        error: &str,
        now: i64,
    ) -> Result<ScheduleLedgerEntry> {
        self.put(ScheduleLedgerEntry::failed(entity_id, hash, error, now))
            .await
    }

    async fn put(&self, entry: ScheduleLedgerEntry) -> Result<ScheduleLedgerEntry> {
        self.repo.put_ledger(&entry).await?;
        Ok(entry)
    }
}
