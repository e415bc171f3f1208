//! Local sync-status bookkeeping for the queue processor

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use libsql::params;

use super::note_repository::NoteRepository;
use super::store::LibSqlStore;
use crate::error::Result;
use crate::models::{Note, NoteId, ScheduleStatus, SyncConflict, SyncStatus};
use crate::sync::SyncStatusUpdater;

const LAST_SYNC_AT_KEY: &str = "last_sync_at";

impl LibSqlStore {
    /// Keep the scheduler-owned status of the local copy when adopting a remote one
    async fn local_schedule_status(&self, id: &NoteId) -> Result<ScheduleStatus> {
        Ok(self
            .get_note(id)
            .await?
            .map_or(ScheduleStatus::Unscheduled, |note| note.schedule_status))
    }

    /// List recently recorded LWW conflicts, newest first
    pub async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, note_id, local_updated_at, incoming_updated_at, resolved_at, strategy
                 FROM sync_conflicts
                 ORDER BY resolved_at DESC, id DESC
                 LIMIT ?",
                [limit as i64],
            )
            .await?;

        let mut conflicts = Vec::new();
        while let Some(row) = rows.next().await? {
            conflicts.push(SyncConflict {
                id: row.get(0)?,
                note_id: row.get(1)?,
                local_updated_at: row.get(2)?,
                incoming_updated_at: row.get(3)?,
                resolved_at: row.get(4)?,
                strategy: row.get(5)?,
            });
        }
        Ok(conflicts)
    }
}

impl SyncStatusUpdater for LibSqlStore {
    async fn mark_synced(&self, entity_id: &str, server_version: i64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE notes SET sync_status = ?1, server_version = ?2 WHERE id = ?3",
                params![SyncStatus::Synced.as_str(), server_version, entity_id],
            )
            .await?;
        Ok(())
    }

    async fn record_conflict(&self, submitted_updated_at: i64, kept: &Note, now: i64) -> Result<()> {
        let mut adopted = kept.clone();
        adopted.sync_status = SyncStatus::Conflict;
        adopted.schedule_status = self.local_schedule_status(&kept.id).await?;
        self.upsert_note(&adopted).await?;

        self.conn
            .execute(
                "INSERT INTO sync_conflicts (
                    note_id, local_updated_at, incoming_updated_at, resolved_at, strategy
                 ) VALUES (?1, ?2, ?3, ?4, 'lww')",
                params![kept.id.as_str(), submitted_updated_at, kept.updated_at, now],
            )
            .await?;
        Ok(())
    }

    async fn apply_remote_note(&self, remote: &Note) -> Result<bool> {
        let local = self.get_note(&remote.id).await?;
        if local
            .as_ref()
            .is_some_and(|local| local.updated_at >= remote.updated_at)
        {
            return Ok(false);
        }

        let mut adopted = remote.clone();
        adopted.sync_status = SyncStatus::Synced;
        adopted.schedule_status =
            local.map_or(ScheduleStatus::Unscheduled, |note| note.schedule_status);
        self.upsert_note(&adopted).await?;
        Ok(true)
    }

    async fn last_sync_at(&self) -> Result<Option<i64>> {
        Ok(self
            .get_state(LAST_SYNC_AT_KEY)
            .await?
            .and_then(|value| value.parse().ok()))
    }

    async fn set_last_sync_at(&self, server_time: i64) -> Result<()> {
        self.set_state(LAST_SYNC_AT_KEY, &server_time.to_string())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn setup() -> (Database, LibSqlStore) {
        let db = Database::open_in_memory().await.unwrap();
        let store = LibSqlStore::from_database(&db);
        (db, store)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_synced_sets_status_and_version() {
        let (_db, store) = setup().await;
        let note = Note::new("owner-1", "hello");
        store.upsert_note(&note).await.unwrap();

        store.mark_synced(&note.id.to_string(), 4).await.unwrap();
        let fetched = store.get_note(&note.id).await.unwrap().unwrap();
        assert_eq!(fetched.sync_status, SyncStatus::Synced);
        assert_eq!(fetched.server_version, 4);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_apply_remote_note_only_takes_newer_copies() {
        let (_db, store) = setup().await;
        let mut local = Note::new("owner-1", "local");
        local.updated_at = 2_000;
        local.schedule_status = ScheduleStatus::Scheduled;
        store.upsert_note(&local).await.unwrap();

        let mut stale = local.clone();
        stale.content = "stale".to_string();
        stale.updated_at = 1_500;
        assert!(!store.apply_remote_note(&stale).await.unwrap());

        let mut newer = local.clone();
        newer.content = "remote".to_string();
        newer.updated_at = 3_000;
        newer.server_version = 2;
        newer.schedule_status = ScheduleStatus::Unscheduled;
        assert!(store.apply_remote_note(&newer).await.unwrap());

        let fetched = store.get_note(&local.id).await.unwrap().unwrap();
        assert_eq!(fetched.content, "remote");
        assert_eq!(fetched.sync_status, SyncStatus::Synced);
        assert_eq!(fetched.schedule_status, ScheduleStatus::Scheduled);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_record_conflict_adopts_kept_copy_and_logs() {
        let (_db, store) = setup().await;
        let mut local = Note::new("owner-1", "mine");
        local.updated_at = 1_000;
        store.upsert_note(&local).await.unwrap();

        let mut kept = local.clone();
        kept.content = "theirs".to_string();
        kept.updated_at = 5_000;
        store.record_conflict(1_000, &kept, 6_000).await.unwrap();

        let fetched = store.get_note(&local.id).await.unwrap().unwrap();
        assert_eq!(fetched.content, "theirs");
        assert_eq!(fetched.sync_status, SyncStatus::Conflict);

        let conflicts = store.list_conflicts(10).await.unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].local_updated_at, 1_000);
        assert_eq!(conflicts[0].incoming_updated_at, 5_000);
        assert_eq!(conflicts[0].strategy, "lww");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_watermark_round_trip() {
        let (_db, store) = setup().await;
        assert_eq!(store.last_sync_at().await.unwrap(), None);
        store.set_last_sync_at(42).await.unwrap();
        assert_eq!(store.last_sync_at().await.unwrap(), Some(42));
    }
}
