//! Idempotent issuing and cancelling of local reminder alerts

use serde::Serialize;

use super::ledger::ScheduleLedger;
use super::recurrence::RecurrenceCalculator;
use crate::db::LedgerRepository;
use crate::error::{Error, Result};
use crate::hash::ScheduleFields;
use crate::models::{LedgerStatus, Note, ScheduleStatus};

/// One local alert to be issued
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub entity_id: String,
    pub trigger_at: i64,
    pub title: String,
    pub body: String,
}

/// Local notification collaborator
#[allow(async_fn_in_trait)]
pub trait Notifier {
    /// Issue an alert, returning the handles it is held under
    async fn issue(&self, request: &NotificationRequest) -> Result<Vec<String>>;

    /// Cancel alerts; handles that are already gone are not an error
    async fn cancel(&self, handles: &[String]) -> Result<()>;
}

/// What a `reconcile` call committed for one note
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleOutcome {
    pub entity_id: String,
    pub ledger_status: LedgerStatus,
    pub handles: Vec<String>,
    /// Value for the note's `schedule_status`
    pub schedule_status: ScheduleStatus,
    /// Value for the note's `next_trigger_at`
    pub next_trigger_at: Option<i64>,
    /// Hash of the scheduled state, `None` when nothing is scheduled
    pub hash: Option<String>,
    /// Whether the scheduled state differs from the previous ledger entry
    pub changed: bool,
    /// The recurrence produced no further occurrence
    pub series_ended: bool,
}

enum Resolution {
    Fire(i64),
    SeriesEnded,
    Idle,
}

/// Reconciles notes against the schedule ledger
pub struct ReminderScheduler<R, N, C> {
    ledger: ScheduleLedger<R>,
    notifier: N,
    recurrence: C,
}

impl<R, N, C> ReminderScheduler<R, N, C>
where
    R: LedgerRepository,
    N: Notifier,
    C: RecurrenceCalculator,
{
    pub const fn new(ledger: ScheduleLedger<R>, notifier: N, recurrence: C) -> Self {
        Self {
            ledger,
            notifier,
            recurrence,
        }
    }

    pub const fn ledger(&self) -> &ScheduleLedger<R> {
        &self.ledger
    }

    pub const fn notifier(&self) -> &N {
        &self.notifier
    }

    pub const fn recurrence(&self) -> &C {
        &self.recurrence
    }

    /// Effective trigger: a future snooze wins over the recurrence or one-shot time
    fn resolve(&self, note: &Note, now: i64) -> Resolution {
        if !note.active || note.done {
            return Resolution::Idle;
        }
        if let Some(snoozed) = note.snoozed_until.filter(|at| *at > now) {
            return Resolution::Fire(snoozed);
        }
        if let Some(repeat) = note.effective_repeat() {
            if let Some(next) = note.next_trigger_at.filter(|at| *at > now) {
                return Resolution::Fire(next);
            }
            return self
                .recurrence
                .compute_next_trigger(now, note.start_at, note.base_at_local.as_deref(), &repeat)
                .filter(|at| *at > now)
                .map_or(Resolution::SeriesEnded, Resolution::Fire);
        }
        match note.trigger_at {
            Some(at) if at > now => Resolution::Fire(at),
            _ => Resolution::Idle,
        }
    }

    /// Bring the alerts held for `note` in line with its current state.
    ///
    /// Previously held handles are always cancelled before new ones are
    /// issued; if that cancel fails nothing is issued and the ledger keeps the
    /// old handles. An issuing failure is written to the ledger and returned.
    /// Handles that cannot be recorded are withdrawn again.
    pub async fn reconcile(&self, note: &Note, now: i64) -> Result<ScheduleOutcome> {
        let entity_id = note.id.to_string();
        let trigger_at = match self.resolve(note, now) {
            Resolution::Fire(at) => at,
            Resolution::SeriesEnded => return self.cancel_outcome(&entity_id, now, true).await,
            Resolution::Idle => return self.cancel_outcome(&entity_id, now, false).await,
        };

        let hash = ScheduleFields::from_note(note, Some(trigger_at)).hash();
        let previous = self.ledger.get(&entity_id).await?;
        let changed = previous.as_ref().is_none_or(|entry| {
            entry.status != LedgerStatus::Scheduled
                || entry.last_scheduled_hash.as_deref() != Some(hash.as_str())
        });

        if let Some(previous) = previous.filter(|entry| !entry.notification_ids.is_empty()) {
            self.cancel_handles(&entity_id, &previous.notification_ids)
                .await?;
        }

        let (title, body) = note.notification_text();
        let request = NotificationRequest {
            entity_id: entity_id.clone(),
            trigger_at,
            title,
            body,
        };

        let handles = match self.notifier.issue(&request).await {
            Ok(handles) if handles.is_empty() => Err(Error::Notification(
                "notifier returned no handles".to_string(),
            )),
            other => other,
        };
        let handles = match handles {
            Ok(handles) => handles,
            Err(error) => {
                tracing::warn!(entity_id = %entity_id, error = %error, "Failed to issue reminder");
                self.ledger
                    .record_error(&entity_id, &hash, &error.to_string(), now)
                    .await?;
                return Err(error);
            }
        };

        let entry = match self
            .ledger
            .record_scheduled(&entity_id, handles.clone(), &hash, now)
            .await
        {
            Ok(entry) => entry,
            Err(error) => {
                tracing::warn!(entity_id = %entity_id, error = %error, "Failed to record reminder, withdrawing it");
                if let Err(cancel_error) = self.notifier.cancel(&handles).await {
                    tracing::warn!(entity_id = %entity_id, error = %cancel_error, "Failed to withdraw unrecorded reminder");
                }
                return Err(error);
            }
        };
        tracing::info!(entity_id = %entity_id, trigger_at, changed, "Scheduled reminder");

        Ok(ScheduleOutcome {
            entity_id,
            ledger_status: entry.status,
            handles: entry.notification_ids,
            schedule_status: ScheduleStatus::Scheduled,
            next_trigger_at: Some(trigger_at),
            hash: Some(hash),
            changed,
            series_ended: false,
        })
    }

    /// Cancel whatever the ledger holds for `entity_id` and mark it canceled.
    ///
    /// When the notifier cannot cancel, the error is returned and the ledger
    /// entry is left as it was.
    pub async fn cancel(&self, entity_id: &str, now: i64) -> Result<ScheduleOutcome> {
        self.cancel_outcome(entity_id, now, false).await
    }

    async fn cancel_outcome(
        &self,
        entity_id: &str,
        now: i64,
        series_ended: bool,
    ) -> Result<ScheduleOutcome> {
        let previous = self.ledger.get(entity_id).await?;
        let changed = previous
            .as_ref()
            .is_some_and(|entry| entry.status != LedgerStatus::Canceled);

        if let Some(previous) = previous.filter(|entry| !entry.notification_ids.is_empty()) {
            self.cancel_handles(entity_id, &previous.notification_ids)
                .await?;
        }

        let entry = self.ledger.record_canceled(entity_id, now).await?;
        tracing::debug!(entity_id, series_ended, "Reminder canceled");

        Ok(ScheduleOutcome {
            entity_id: entity_id.to_string(),
            ledger_status: entry.status,
            handles: Vec::new(),
            schedule_status: ScheduleStatus::Unscheduled,
            next_trigger_at: None,
            hash: None,
            changed,
            series_ended,
        })
    }

    /// A failure leaves the ledger entry untouched so the handles stay known
    async fn cancel_handles(&self, entity_id: &str, handles: &[String]) -> Result<()> {
        self.notifier.cancel(handles).await.map_err(|error| {
            tracing::warn!(entity_id, error = %error, "Failed to cancel held reminders");
            error
        })
    }
}
