//! Editor-side orchestration of note writes.
//!
//! Every write is two independent steps: the durable note write plus outbox
//! enqueue, then a best-effort schedule reconcile whose failures are only
//! logged and reflected in `schedule_status`.

use crate::db::{LibSqlStore, NoteRepository};
use crate::error::{Error, Result};
use crate::models::{Note, NoteId, OutboxOperation, ScheduleStatus, SyncStatus};
use crate::outbox::OutboxStore;
use crate::retry::RetryPolicy;
use crate::schedule::{
    Notifier, RecurrenceCalculator, ReminderScheduler, ScheduleLedger, ScheduleOutcome,
};
use crate::util::now_millis;

/// Note writes wired to the outbox and the reminder scheduler
pub struct NoteService<N, C> {
    store: LibSqlStore,
    outbox: OutboxStore<LibSqlStore>,
    scheduler: ReminderScheduler<LibSqlStore, N, C>,
}

impl<N: Notifier, C: RecurrenceCalculator> NoteService<N, C> {
    pub fn new(store: LibSqlStore, policy: RetryPolicy, notifier: N, recurrence: C) -> Self {
        Self {
            outbox: OutboxStore::new(store.clone(), policy),
            scheduler: ReminderScheduler::new(
                ScheduleLedger::new(store.clone()),
                notifier,
                recurrence,
            ),
            store,
        }
    }

    pub const fn store(&self) -> &LibSqlStore {
        &self.store
    }

    pub const fn outbox(&self) -> &OutboxStore<LibSqlStore> {
        &self.outbox
    }

    pub const fn scheduler(&self) -> &ReminderScheduler<LibSqlStore, N, C> {
        &self.scheduler
    }

    pub async fn get_note(&self, id: &NoteId) -> Result<Note> {
        self.store
            .get_note(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Create or update a note, queue it for sync and reschedule its reminder
    pub async fn save(&self, mut note: Note) -> Result<Note> {
        let has_title = note
            .title
            .as_deref()
            .is_some_and(|title| !title.trim().is_empty());
        if note.content.trim().is_empty() && !has_title {
            return Err(Error::InvalidInput(
                "note needs a title or content".to_string(),
            ));
        }
        if note.owner_id.trim().is_empty() {
            return Err(Error::InvalidInput("note needs an owner".to_string()));
        }

        let previous = self.store.get_note(&note.id).await?;
        if let Some(previous) = &previous {
            note.created_at = previous.created_at;
            if schedule_definition_changed(previous, &note) {
                note.next_trigger_at = None;
                note.done = false;
            }
        }
        let operation = if previous.is_some() {
            OutboxOperation::Update
        } else {
            OutboxOperation::Create
        };
        self.commit(note, previous.as_ref(), operation).await
    }

    /// Soft-delete a note and withdraw its reminder
    pub async fn delete(&self, id: &NoteId) -> Result<Note> {
        let previous = self.get_note(id).await?;
        let mut note = previous.clone();
        note.active = false;

        let now = next_timestamp(Some(&previous));
        note.updated_at = now;
        note.sync_status = SyncStatus::Pending;
        self.store.upsert_note(&note).await?;
        self.enqueue(&note, OutboxOperation::Delete, now).await?;

        let enqueued = schedule_fields(&note);
        match self.scheduler.cancel(&note.id.to_string(), now).await {
            Ok(outcome) => self.apply_outcome(&mut note, &outcome).await,
            Err(error) => {
                tracing::warn!(note_id = %note.id, error = %error, "Failed to cancel reminder of deleted note");
                self.record_schedule_error(&mut note).await;
            }
        }
        self.refresh_payload(&note, OutboxOperation::Delete, now, enqueued)
            .await;
        tracing::info!(note_id = %note.id, "Deleted note");
        Ok(note)
    }

    /// Postpone a reminder until `until`
    pub async fn snooze(&self, id: &NoteId, until: i64) -> Result<Note> {
        if until <= now_millis() {
            return Err(Error::InvalidInput(
                "snooze time must be in the future".to_string(),
            ));
        }
        let previous = self.get_note(id).await?;
        if !previous.active {
            return Err(Error::InvalidInput(format!("note {id} is deleted")));
        }
        let mut note = previous.clone();
        note.snoozed_until = Some(until);
        note.done = false;
        self.commit(note, Some(&previous), OutboxOperation::Update)
            .await
    }

    /// Mark the current occurrence of a reminder as handled.
    ///
    /// A repeating reminder advances to its next occurrence, or completes when
    /// the series has ended. A one-shot reminder completes unless a future
    /// snooze is active, in which case the snooze stands.
    pub async fn acknowledge(&self, id: &NoteId) -> Result<Note> {
        let previous = self.get_note(id).await?;
        let mut note = previous.clone();
        let now = now_millis();
        note.last_acknowledged_at = Some(now);

        if let Some(repeat) = note.effective_repeat() {
            let fired = note.next_trigger_at;
            let from = fired.map_or(now, |at| at.max(now));
            note.last_fired_at = fired.or(note.last_fired_at);
            note.snoozed_until = None;
            let next = self.scheduler.recurrence().compute_next_trigger(
                from,
                note.start_at,
                note.base_at_local.as_deref(),
                &repeat,
            );
            match next {
                Some(next) => note.next_trigger_at = Some(next),
                None => {
                    tracing::info!(note_id = %note.id, "Repeating reminder series ended");
                    note.done = true;
                    note.next_trigger_at = None;
                    note.schedule_status = ScheduleStatus::Unscheduled;
                }
            }
        } else if note.snoozed_until.is_some_and(|at| at > now) {
            tracing::debug!(note_id = %note.id, "Active snooze kept on acknowledge");
        } else {
            note.last_fired_at = note.trigger_at.or(note.last_fired_at);
            note.snoozed_until = None;
            note.done = true;
        }

        self.commit(note, Some(&previous), OutboxOperation::Update)
            .await
    }

    /// Re-run the scheduler for every note carrying reminder metadata
    pub async fn reconcile_all(&self) -> Result<Vec<ScheduleOutcome>> {
        let now = now_millis();
        let mut outcomes = Vec::new();
        for mut note in self.store.list_reminder_notes().await? {
            if let Some(outcome) = self.reschedule(&mut note, now).await {
                outcomes.push(outcome);
            }
        }
        tracing::info!(count = outcomes.len(), "Reconciled reminders");
        Ok(outcomes)
    }

    /// Re-run the scheduler for the given note ids, e.g. after remote changes
    pub async fn reconcile_ids(&self, ids: &[String]) -> Result<Vec<ScheduleOutcome>> {
        let now = now_millis();
        let mut outcomes = Vec::new();
        for raw in ids {
            let Ok(id) = raw.parse::<NoteId>() else {
                tracing::warn!(note_id = %raw, "Skipping unparseable note id");
                continue;
            };
            let Some(mut note) = self.store.get_note(&id).await? else {
                continue;
            };
            if let Some(outcome) = self.reschedule(&mut note, now).await {
                outcomes.push(outcome);
            }
        }
        Ok(outcomes)
    }

    async fn commit(
        &self,
        mut note: Note,
        previous: Option<&Note>,
        operation: OutboxOperation,
    ) -> Result<Note> {
        let now = next_timestamp(previous);
        note.updated_at = now;
        note.sync_status = SyncStatus::Pending;

        self.store.upsert_note(&note).await?;
        self.enqueue(&note, operation, now).await?;
        tracing::info!(note_id = %note.id, %operation, "Saved note");

        let enqueued = schedule_fields(&note);
        self.reschedule(&mut note, now).await;
        self.refresh_payload(&note, operation, now, enqueued).await;
        Ok(note)
    }

    /// Re-enqueue when scheduling moved the schedule fields after the first enqueue
    async fn refresh_payload(
        &self,
        note: &Note,
        operation: OutboxOperation,
        now: i64,
        enqueued: (ScheduleStatus, Option<i64>),
    ) {
        if schedule_fields(note) == enqueued {
            return;
        }
        if let Err(error) = self.enqueue(note, operation, now).await {
            tracing::warn!(note_id = %note.id, error = %error, "Failed to refresh outbox payload");
        }
    }

    async fn enqueue(&self, note: &Note, operation: OutboxOperation, now: i64) -> Result<()> {
        let payload = serde_json::to_value(note)?;
        self.outbox
            .enqueue(&note.id.to_string(), &note.owner_id, operation, &payload, now)
            .await?;
        Ok(())
    }

    /// Best-effort reconcile; failures end up in `schedule_status` only
    async fn reschedule(&self, note: &mut Note, now: i64) -> Option<ScheduleOutcome> {
        match self.scheduler.reconcile(note, now).await {
            Ok(outcome) => {
                self.apply_outcome(note, &outcome).await;
                Some(outcome)
            }
            Err(error) => {
                tracing::warn!(note_id = %note.id, error = %error, "Reminder scheduling failed");
                self.record_schedule_error(note).await;
                None
            }
        }
    }

    async fn record_schedule_error(&self, note: &mut Note) {
        note.schedule_status = ScheduleStatus::Error;
        if let Err(error) = self
            .store
            .update_schedule(&note.id, note.schedule_status, note.next_trigger_at)
            .await
        {
            tracing::warn!(note_id = %note.id, error = %error, "Failed to record schedule error");
        }
    }

    async fn apply_outcome(&self, note: &mut Note, outcome: &ScheduleOutcome) {
        note.schedule_status = outcome.schedule_status;
        note.next_trigger_at = outcome.next_trigger_at;
        if let Err(error) = self
            .store
            .update_schedule(&note.id, note.schedule_status, note.next_trigger_at)
            .await
        {
            tracing::warn!(note_id = %note.id, error = %error, "Failed to record schedule outcome");
        }
    }
}

/// Strictly increasing per-note edit timestamp
fn next_timestamp(previous: Option<&Note>) -> i64 {
    let now = now_millis();
    previous.map_or(now, |previous| now.max(previous.updated_at + 1))
}

const fn schedule_fields(note: &Note) -> (ScheduleStatus, Option<i64>) {
    (note.schedule_status, note.next_trigger_at)
}

fn schedule_definition_changed(previous: &Note, next: &Note) -> bool {
    previous.trigger_at != next.trigger_at
        || previous.repeat != next.repeat
        || previous.repeat_rule != next.repeat_rule
        || previous.start_at != next.start_at
        || previous.base_at_local != next.base_at_local
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, LedgerRepository};
    use crate::models::{LedgerStatus, RepeatFrequency, RepeatRule};
    use crate::schedule::NotificationRequest;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingNotifier {
        issued: AtomicUsize,
        fail: AtomicBool,
    }

    impl Notifier for CountingNotifier {
        async fn issue(&self, _request: &NotificationRequest) -> Result<Vec<String>> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::Notification("notifications disabled".to_string()));
            }
            let n = self.issued.fetch_add(1, Ordering::SeqCst);
            Ok(vec![format!("alert-{n}")])
        }

        async fn cancel(&self, _handles: &[String]) -> Result<()> {
            Ok(())
        }
    }

    struct FixedRecurrence(Option<i64>);

    impl RecurrenceCalculator for FixedRecurrence {
        fn compute_next_trigger(
            &self,
            _now: i64,
            _start_at: Option<i64>,
            _base_at_local: Option<&str>,
            _repeat: &RepeatRule,
        ) -> Option<i64> {
            self.0
        }
    }

    const HOUR: i64 = 3_600_000;

    async fn setup(next: Option<i64>) -> (Database, NoteService<CountingNotifier, FixedRecurrence>) {
        let db = Database::open_in_memory().await.unwrap();
        let service = NoteService::new(
            LibSqlStore::from_database(&db),
            RetryPolicy::default(),
            CountingNotifier::default(),
            FixedRecurrence(next),
        );
        (db, service)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_save_enqueues_and_schedules() {
        let (_db, service) = setup(None).await;
        let note = Note::new("owner-1", "Dentist").with_trigger_at(now_millis() + HOUR);

        let saved = service.save(note).await.unwrap();
        assert_eq!(saved.schedule_status, ScheduleStatus::Scheduled);
        assert_eq!(saved.next_trigger_at, saved.trigger_at);
        assert_eq!(saved.sync_status, SyncStatus::Pending);

        let entry = service
            .outbox()
            .get(&saved.id.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.operation, OutboxOperation::Create);

        let stored = service.get_note(&saved.id).await.unwrap();
        assert_eq!(stored.schedule_status, ScheduleStatus::Scheduled);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_outbox_payload_carries_reconciled_schedule() {
        let (_db, service) = setup(None).await;
        let note = Note::new("owner-1", "Pay rent").with_trigger_at(now_millis() + HOUR);

        let saved = service.save(note).await.unwrap();
        let entry = service
            .outbox()
            .get(&saved.id.to_string())
            .await
            .unwrap()
            .unwrap();
        let payload: Note = serde_json::from_str(&entry.payload).unwrap();
        assert_eq!(payload.schedule_status, ScheduleStatus::Scheduled);
        assert_eq!(payload.next_trigger_at, saved.trigger_at);
        assert_eq!(payload.updated_at, saved.updated_at);
        assert_eq!(entry.created_at, saved.updated_at);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_edits_collapse_with_increasing_timestamps() {
        let (_db, service) = setup(None).await;
        let first = service.save(Note::new("owner-1", "v1")).await.unwrap();

        let mut edit = first.clone();
        edit.content = "v2".to_string();
        let second = service.save(edit).await.unwrap();
        let mut edit = second.clone();
        edit.content = "v3".to_string();
        let third = service.save(edit).await.unwrap();

        assert!(second.updated_at > first.updated_at);
        assert!(third.updated_at > second.updated_at);
        assert_eq!(third.created_at, first.created_at);

        let entries = service.outbox().list_all().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].operation, OutboxOperation::Update);
        assert!(entries[0].payload.contains("v3"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scheduling_failure_does_not_fail_save() {
        let (_db, service) = setup(None).await;
        service
            .scheduler()
            .notifier()
            .fail
            .store(true, Ordering::SeqCst);

        let note = Note::new("owner-1", "Flaky").with_trigger_at(now_millis() + HOUR);
        let saved = service.save(note).await.unwrap();
        assert_eq!(saved.schedule_status, ScheduleStatus::Error);

        let stored = service.get_note(&saved.id).await.unwrap();
        assert_eq!(stored.schedule_status, ScheduleStatus::Error);
        assert_eq!(service.outbox().list_all().await.unwrap().len(), 1);

        let ledger = service
            .store()
            .get_ledger(&saved.id.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ledger.status, LedgerStatus::Error);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_save_rejects_empty_note() {
        let (_db, service) = setup(None).await;
        let result = service.save(Note::new("owner-1", "   ")).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_soft_deletes_and_cancels() {
        let (_db, service) = setup(None).await;
        let saved = service
            .save(Note::new("owner-1", "Bye").with_trigger_at(now_millis() + HOUR))
            .await
            .unwrap();

        let deleted = service.delete(&saved.id).await.unwrap();
        assert!(!deleted.active);
        assert_eq!(deleted.schedule_status, ScheduleStatus::Unscheduled);
        assert!(deleted.updated_at > saved.updated_at);

        let entry = service
            .outbox()
            .get(&saved.id.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.operation, OutboxOperation::Delete);
        let ledger = service
            .store()
            .get_ledger(&saved.id.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ledger.status, LedgerStatus::Canceled);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_acknowledging_ended_series_completes_it() {
        let (_db, service) = setup(None).await;
        let mut note = Note::new("owner-1", "Course")
            .with_repeat(RepeatRule::new(RepeatFrequency::Daily), now_millis() - HOUR);
        note.next_trigger_at = Some(now_millis() + HOUR);
        let saved = service.save(note).await.unwrap();
        assert_eq!(saved.schedule_status, ScheduleStatus::Scheduled);

        let acked = service.acknowledge(&saved.id).await.unwrap();
        assert!(acked.done);
        assert_eq!(acked.schedule_status, ScheduleStatus::Unscheduled);
        assert_eq!(acked.next_trigger_at, None);
        assert!(acked.last_acknowledged_at.is_some());

        let stored = service.get_note(&saved.id).await.unwrap();
        assert!(stored.done);
        assert_eq!(stored.next_trigger_at, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_acknowledging_series_advances_it() {
        let next = now_millis() + 24 * HOUR;
        let (_db, service) = setup(Some(next)).await;
        let note = Note::new("owner-1", "Pills")
            .with_repeat(RepeatRule::new(RepeatFrequency::Daily), now_millis() - HOUR);
        let saved = service.save(note).await.unwrap();

        let acked = service.acknowledge(&saved.id).await.unwrap();
        assert!(!acked.done);
        assert_eq!(acked.next_trigger_at, Some(next));
        assert_eq!(acked.schedule_status, ScheduleStatus::Scheduled);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_acknowledge_keeps_future_snooze_on_one_shot() {
        let (_db, service) = setup(None).await;
        let saved = service
            .save(Note::new("owner-1", "Call back").with_trigger_at(now_millis() + HOUR))
            .await
            .unwrap();
        let until = now_millis() + 2 * HOUR;
        service.snooze(&saved.id, until).await.unwrap();

        let acked = service.acknowledge(&saved.id).await.unwrap();
        assert!(!acked.done);
        assert_eq!(acked.snoozed_until, Some(until));
        assert_eq!(acked.next_trigger_at, Some(until));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_acknowledge_completes_one_shot() {
        let (_db, service) = setup(None).await;
        let saved = service
            .save(Note::new("owner-1", "Once").with_trigger_at(now_millis() + HOUR))
            .await
            .unwrap();

        let acked = service.acknowledge(&saved.id).await.unwrap();
        assert!(acked.done);
        assert_eq!(acked.schedule_status, ScheduleStatus::Unscheduled);
        assert_eq!(acked.last_fired_at, saved.trigger_at);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_snooze_rejects_past_time() {
        let (_db, service) = setup(None).await;
        let saved = service.save(Note::new("owner-1", "x")).await.unwrap();
        let result = service.snooze(&saved.id, now_millis() - 1).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reconcile_ids_picks_up_remote_changes() {
        let (_db, service) = setup(None).await;
        let remote = Note::new("owner-1", "From phone").with_trigger_at(now_millis() + HOUR);
        service.store().upsert_note(&remote).await.unwrap();

        let outcomes = service
            .reconcile_ids(&[remote.id.to_string(), "not-an-id".to_string()])
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].ledger_status, LedgerStatus::Scheduled);

        let stored = service.get_note(&remote.id).await.unwrap();
        assert_eq!(stored.schedule_status, ScheduleStatus::Scheduled);

        let all = service.reconcile_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(service.scheduler().notifier().issued.load(Ordering::SeqCst), 2);
    }
}
