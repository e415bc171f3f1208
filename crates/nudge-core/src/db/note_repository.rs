//! Note repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use libsql::params;

use super::store::{parse_label, LibSqlStore};
use crate::error::{Error, Result};
use crate::models::{Note, NoteId, RepeatRule, ScheduleStatus};

const NOTE_COLUMNS: &str = "id, owner_id, title, content, active, done, created_at, updated_at, \
     trigger_at, repeat_rule, repeat, start_at, base_at_local, next_trigger_at, last_fired_at, \
     last_acknowledged_at, snoozed_until, schedule_status, sync_status, server_version";

/// Trait for local note storage operations (async)
#[allow(async_fn_in_trait)]
pub trait NoteRepository {
    /// Get a note by ID, including soft-deleted ones
    async fn get_note(&self, id: &NoteId) -> Result<Option<Note>>;

    /// Insert or fully replace a note
    async fn upsert_note(&self, note: &Note) -> Result<()>;

    /// List notes newest first
    async fn list_notes(
        &self,
        limit: usize,
        offset: usize,
        include_deleted: bool,
    ) -> Result<Vec<Note>>;

    /// List every note that carries reminder metadata
    async fn list_reminder_notes(&self) -> Result<Vec<Note>>;

    /// Write the scheduler-owned fields of a note
    async fn update_schedule(
        &self,
        id: &NoteId,
        schedule_status: ScheduleStatus,
        next_trigger_at: Option<i64>,
    ) -> Result<()>;

    /// Resolve note ids starting with `prefix`
    async fn list_note_ids_by_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>>;
}

impl LibSqlStore {
    /// Parse a note from a database row selected with `NOTE_COLUMNS`
    pub(super) fn parse_note(row: &libsql::Row) -> Result<Note> {
        let id: String = row.get(0)?;
        let repeat = row
            .get::<Option<String>>(10)?
            .map(|raw| serde_json::from_str::<RepeatRule>(&raw))
            .transpose()?;

        Ok(Note {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("invalid note id '{id}'")))?,
            owner_id: row.get(1)?,
            title: row.get(2)?,
            content: row.get(3)?,
            active: row.get::<i64>(4)? != 0,
            done: row.get::<i64>(5)? != 0,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
            trigger_at: row.get(8)?,
            repeat_rule: row.get(9)?,
            repeat,
            start_at: row.get(11)?,
            base_at_local: row.get(12)?,
            next_trigger_at: row.get(13)?,
            last_fired_at: row.get(14)?,
            last_acknowledged_at: row.get(15)?,
            snoozed_until: row.get(16)?,
            schedule_status: parse_label(&row.get::<String>(17)?)?,
            sync_status: parse_label(&row.get::<String>(18)?)?,
            server_version: row.get(19)?,
        })
    }

    async fn query_notes(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<Note>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut notes = Vec::new();
        while let Some(row) = rows.next().await? {
            notes.push(Self::parse_note(&row)?);
        }
        Ok(notes)
    }
}

impl NoteRepository for LibSqlStore {
    async fn get_note(&self, id: &NoteId) -> Result<Option<Note>> {
        let sql = format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?");
        Ok(self.query_notes(&sql, [id.as_str()]).await?.pop())
    }

    async fn upsert_note(&self, note: &Note) -> Result<()> {
        let repeat = note.repeat.as_ref().map(serde_json::to_string).transpose()?;

        self.conn
            .execute(
                &format!(
                    "INSERT INTO notes ({NOTE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                             ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
                     ON CONFLICT(id) DO UPDATE SET
                         owner_id = excluded.owner_id,
                         title = excluded.title,
                         content = excluded.content,
                         active = excluded.active,
                         done = excluded.done,
                         created_at = excluded.created_at,
                         updated_at = excluded.updated_at,
                         trigger_at = excluded.trigger_at,
                         repeat_rule = excluded.repeat_rule,
                         repeat = excluded.repeat,
                         start_at = excluded.start_at,
                         base_at_local = excluded.base_at_local,
                         next_trigger_at = excluded.next_trigger_at,
                         last_fired_at = excluded.last_fired_at,
                         last_acknowledged_at = excluded.last_acknowledged_at,
                         snoozed_until = excluded.snoozed_until,
                         schedule_status = excluded.schedule_status,
                         sync_status = excluded.sync_status,
                         server_version = excluded.server_version"
                ),
                params![
                    note.id.as_str(),
                    note.owner_id.clone(),
                    note.title.clone(),
                    note.content.clone(),
                    i64::from(note.active),
                    i64::from(note.done),
                    note.created_at,
                    note.updated_at,
                    note.trigger_at,
                    note.repeat_rule.clone(),
                    repeat,
                    note.start_at,
                    note.base_at_local.clone(),
                    note.next_trigger_at,
                    note.last_fired_at,
                    note.last_acknowledged_at,
                    note.snoozed_until,
                    note.schedule_status.as_str(),
                    note.sync_status.as_str(),
                    note.server_version,
                ],
            )
            .await?;

        Ok(())
    }

    async fn list_notes(
        &self,
        limit: usize,
        offset: usize,
        include_deleted: bool,
    ) -> Result<Vec<Note>> {
        let sql = format!(
            "SELECT {NOTE_COLUMNS} FROM notes
             WHERE active = 1 OR ?1 = 1
             ORDER BY updated_at DESC
             LIMIT ?2 OFFSET ?3"
        );
        self.query_notes(
            &sql,
            params![i64::from(include_deleted), limit as i64, offset as i64],
        )
        .await
    }

    async fn list_reminder_notes(&self) -> Result<Vec<Note>> {
        let sql = format!(
            "SELECT {NOTE_COLUMNS} FROM notes
             WHERE trigger_at IS NOT NULL
                OR next_trigger_at IS NOT NULL
                OR snoozed_until IS NOT NULL
                OR repeat IS NOT NULL
                OR repeat_rule IS NOT NULL
             ORDER BY created_at ASC"
        );
        self.query_notes(&sql, ()).await
    }

    async fn update_schedule(
        &self,
        id: &NoteId,
        schedule_status: ScheduleStatus,
        next_trigger_at: Option<i64>,
    ) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE notes SET schedule_status = ?1, next_trigger_at = ?2 WHERE id = ?3",
                params![schedule_status.as_str(), next_trigger_at, id.as_str()],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list_note_ids_by_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id FROM notes WHERE id LIKE ?1 ORDER BY updated_at DESC LIMIT ?2",
                params![format!("{prefix}%"), limit as i64],
            )
            .await?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(row.get::<String>(0)?);
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{RepeatFrequency, SyncStatus};

    async fn setup() -> (Database, LibSqlStore) {
        let db = Database::open_in_memory().await.unwrap();
        let store = LibSqlStore::from_database(&db);
        (db, store)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_upsert_and_get_round_trips_reminder_fields() {
        let (_db, store) = setup().await;
        let mut note = Note::new("owner-1", "Water plants").with_repeat(
            RepeatRule::new(RepeatFrequency::Weekly).with_weekdays(vec![2, 6]),
            1_000,
        );
        note.title = Some("Plants".to_string());
        note.base_at_local = Some("2026-01-05T08:00".to_string());
        note.snoozed_until = Some(9_000);

        store.upsert_note(&note).await.unwrap();
        let fetched = store.get_note(&note.id).await.unwrap().unwrap();
        assert_eq!(fetched, note);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_upsert_replaces_existing_row() {
        let (_db, store) = setup().await;
        let mut note = Note::new("owner-1", "Original");
        store.upsert_note(&note).await.unwrap();

        note.content = "Edited".to_string();
        note.updated_at += 1;
        note.sync_status = SyncStatus::Synced;
        store.upsert_note(&note).await.unwrap();

        let notes = store.list_notes(10, 0, false).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].content, "Edited");
        assert_eq!(notes[0].sync_status, SyncStatus::Synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_hides_soft_deleted_unless_asked() {
        let (_db, store) = setup().await;
        let kept = Note::new("owner-1", "Kept");
        let mut deleted = Note::new("owner-1", "Deleted");
        deleted.active = false;
        store.upsert_note(&kept).await.unwrap();
        store.upsert_note(&deleted).await.unwrap();

        assert_eq!(store.list_notes(10, 0, false).await.unwrap().len(), 1);
        assert_eq!(store.list_notes(10, 0, true).await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_reminder_notes_skips_plain_notes() {
        let (_db, store) = setup().await;
        store
            .upsert_note(&Note::new("owner-1", "Plain"))
            .await
            .unwrap();
        let reminder = Note::new("owner-1", "Ping").with_trigger_at(5_000);
        store.upsert_note(&reminder).await.unwrap();

        let reminders = store.list_reminder_notes().await.unwrap();
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].id, reminder.id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_schedule_requires_existing_note() {
        let (_db, store) = setup().await;
        let note = Note::new("owner-1", "Ping").with_trigger_at(5_000);
        store.upsert_note(&note).await.unwrap();

        store
            .update_schedule(&note.id, ScheduleStatus::Scheduled, Some(5_000))
            .await
            .unwrap();
        let fetched = store.get_note(&note.id).await.unwrap().unwrap();
        assert_eq!(fetched.schedule_status, ScheduleStatus::Scheduled);
        assert_eq!(fetched.next_trigger_at, Some(5_000));

        let missing = store
            .update_schedule(&NoteId::new(), ScheduleStatus::Unscheduled, None)
            .await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_prefix_lookup() {
        let (_db, store) = setup().await;
        let note = Note::new("owner-1", "Prefix me");
        store.upsert_note(&note).await.unwrap();

        let id = note.id.to_string();
        let ids = store.list_note_ids_by_prefix(&id[..8], 3).await.unwrap();
        assert_eq!(ids, vec![id]);
    }
}
