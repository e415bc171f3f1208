//! Sync queue processor.
//!
//! One run drains ready outbox entries in batches. Each batch is ordered
//! `create < update < delete` (FIFO within a class), submitted as a single
//! request bounded by a timeout, then reconciled item by item. A batch of
//! more than one item that fails completely opens the circuit and ends the
//! run. Batches are strictly sequential and a run may be cancelled between
//! them.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;

use super::remote::{RemoteAuthority, RemoteError};
use super::SyncStatusUpdater;
use crate::db::OutboxRepository;
use crate::error::Result;
use crate::models::{Note, OutboxEntry, OutboxOperation, SyncBatchRequest, SyncChange};
use crate::outbox::{OutboxStore, QueueStats};
use crate::util::now_millis;

const NOT_ACKNOWLEDGED: &str = "change was not acknowledged by the authority";

/// Processor settings for one owner and device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncProcessorConfig {
    pub owner_id: String,
    pub device_id: String,
    pub batch_size: usize,
    pub submit_timeout: Duration,
}

impl SyncProcessorConfig {
    pub fn new(owner_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            device_id: device_id.into(),
            batch_size: 25,
            submit_timeout: Duration::from_secs(15),
        }
    }
}

/// Accumulated results of one `process_queue` run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueRunReport {
    /// Another run was already in progress; nothing was done
    pub skipped: bool,
    pub batches: usize,
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    /// Accepted, but a newer local edit arrived meanwhile and stays queued
    pub superseded: Vec<String>,
    /// Accepted, but the authority kept a newer copy
    pub conflicts: Vec<String>,
    /// Local notes updated from the authority's returned set
    pub remote_changed: Vec<String>,
    pub circuit_open: bool,
    pub canceled: bool,
    pub server_time: Option<i64>,
}

/// Stops a run between batches
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct SyncQueueProcessor<R, A, S> {
    outbox: OutboxStore<R>,
    remote: A,
    status: S,
    config: SyncProcessorConfig,
    run_lock: Mutex<()>,
    cancel: CancelHandle,
}

struct Submitted {
    entry: OutboxEntry,
    note: Note,
}

impl<R, A, S> SyncQueueProcessor<R, A, S>
where
    R: OutboxRepository,
    A: RemoteAuthority,
    S: SyncStatusUpdater,
{
    pub fn new(outbox: OutboxStore<R>, remote: A, status: S, config: SyncProcessorConfig) -> Self {
        Self {
            outbox,
            remote,
            status,
            config,
            run_lock: Mutex::new(()),
            cancel: CancelHandle::default(),
        }
    }

    pub const fn outbox(&self) -> &OutboxStore<R> {
        &self.outbox
    }

    pub const fn remote(&self) -> &A {
        &self.remote
    }

    pub const fn config(&self) -> &SyncProcessorConfig {
        &self.config
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Derived counts over the outbox
    pub async fn get_queue_stats(&self) -> Result<QueueStats> {
        self.outbox.stats(now_millis()).await
    }

    /// Make every failed or exhausted entry immediately eligible again
    pub async fn force_retry_all(&self) -> Result<usize> {
        let reset = self.outbox.reset_all().await?;
        tracing::info!(reset, "Reset outbox retry state");
        Ok(reset)
    }

    /// Drain ready entries until the queue is empty, the circuit opens or the
    /// run is cancelled.
    pub async fn process_queue(&self) -> Result<QueueRunReport> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            tracing::debug!("Sync run already in progress, skipping");
            return Ok(QueueRunReport {
                skipped: true,
                ..QueueRunReport::default()
            });
        };
        self.cancel.reset();

        let mut report = QueueRunReport::default();
        let mut attempted = HashSet::new();
        let batch_size = self.config.batch_size.max(1);

        loop {
            if self.cancel.is_canceled() {
                tracing::info!(batches = report.batches, "Sync run canceled");
                report.canceled = true;
                break;
            }

            let now = now_millis();
            let batch: Vec<OutboxEntry> = self
                .outbox
                .list_ready(now)
                .await?
                .into_iter()
                .filter(|entry| entry.owner_id == self.config.owner_id)
                .filter(|entry| !attempted.contains(&entry.entity_id))
                .take(batch_size)
                .collect();
            if batch.is_empty() {
                break;
            }
            attempted.extend(batch.iter().map(|entry| entry.entity_id.clone()));

            let submitted = self.prepare_batch(batch, now, &mut report).await?;
            if submitted.is_empty() {
                continue;
            }

            report.batches += 1;
            let batch_failed = self.submit_batch(submitted, &mut report).await?;
            if batch_failed {
                tracing::warn!(batches = report.batches, "Batch failed completely, stopping run");
                report.circuit_open = true;
                break;
            }
        }

        tracing::info!(
            batches = report.batches,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            conflicts = report.conflicts.len(),
            "Sync run finished"
        );
        Ok(report)
    }

    /// Decode payloads and order the batch for submission
    async fn prepare_batch(
        &self,
        batch: Vec<OutboxEntry>,
        now: i64,
        report: &mut QueueRunReport,
    ) -> Result<Vec<Submitted>> {
        let mut submitted = Vec::with_capacity(batch.len());
        for entry in batch {
            match serde_json::from_str::<Note>(&entry.payload) {
                Ok(note) => submitted.push(Submitted { entry, note }),
                Err(error) => {
                    tracing::warn!(entity_id = %entry.entity_id, error = %error, "Undecodable outbox payload");
                    self.outbox
                        .mark_failed(&entry.entity_id, now, &error.to_string())
                        .await?;
                    report.failed.push(entry.entity_id);
                }
            }
        }
        // stable sort keeps FIFO order within an operation class
        submitted.sort_by_key(|item| item.entry.operation);
        Ok(submitted)
    }

    /// Submit one ordered batch; returns whether the circuit should open
    async fn submit_batch(
        &self,
        submitted: Vec<Submitted>,
        report: &mut QueueRunReport,
    ) -> Result<bool> {
        let request = SyncBatchRequest {
            owner_id: self.config.owner_id.clone(),
            device_id: self.config.device_id.clone(),
            last_sync_at: self.status.last_sync_at().await?,
            changes: submitted
                .iter()
                .map(|item| SyncChange {
                    entity_id: item.entry.entity_id.clone(),
                    operation: item.entry.operation,
                    note: item.note.clone(),
                    payload_hash: item.entry.payload_hash.clone(),
                })
                .collect(),
        };
        let batch_size = submitted.len();
        tracing::debug!(batch_size, "Submitting sync batch");

        let response = tokio::time::timeout(
            self.config.submit_timeout,
            self.remote.submit_batch(&request),
        )
        .await
        .unwrap_or(Err(RemoteError::Timeout(self.config.submit_timeout)));

        let response = match response {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(batch_size, error = %error, "Sync batch failed");
                let now = now_millis();
                let message = error.to_string();
                for item in &submitted {
                    self.outbox
                        .mark_failed(&item.entry.entity_id, now, &message)
                        .await?;
                    report.failed.push(item.entry.entity_id.clone());
                }
                return Ok(batch_size > 1);
            }
        };

        let now = now_millis();
        let echoed: HashMap<String, &Note> = response
            .notes
            .iter()
            .filter(|note| note.owner_id == self.config.owner_id)
            .map(|note| (note.id.to_string(), note))
            .collect();

        let (accepted, rejected): (Vec<_>, Vec<_>) = submitted.into_iter().partition(|item| {
            item.entry.operation == OutboxOperation::Delete
                || echoed.contains_key(&item.entry.entity_id)
        });

        for item in &rejected {
            tracing::warn!(entity_id = %item.entry.entity_id, "Change missing from authority response");
            self.outbox
                .mark_failed(&item.entry.entity_id, now, NOT_ACKNOWLEDGED)
                .await?;
            report.failed.push(item.entry.entity_id.clone());
        }

        let settled: Vec<OutboxEntry> = accepted.iter().map(|item| item.entry.clone()).collect();
        let superseded: HashSet<String> = self
            .outbox
            .clear_settled(&settled)
            .await?
            .into_iter()
            .collect();

        for item in &accepted {
            let entity_id = &item.entry.entity_id;
            report.succeeded.push(entity_id.clone());
            if superseded.contains(entity_id) {
                report.superseded.push(entity_id.clone());
                continue;
            }
            match echoed.get(entity_id.as_str()) {
                Some(kept) if kept.updated_at > item.note.updated_at => {
                    tracing::info!(
                        entity_id = %entity_id,
                        submitted = item.note.updated_at,
                        kept = kept.updated_at,
                        "Authority kept a newer copy"
                    );
                    self.status
                        .record_conflict(item.note.updated_at, kept, now)
                        .await?;
                    report.conflicts.push(entity_id.clone());
                }
                Some(kept) => {
                    self.status
                        .mark_synced(entity_id, kept.server_version)
                        .await?;
                }
                None => {
                    self.status
                        .mark_synced(entity_id, item.note.server_version)
                        .await?;
                }
            }
        }

        let submitted_ids: HashSet<&str> = accepted
            .iter()
            .chain(rejected.iter())
            .map(|item| item.entry.entity_id.as_str())
            .collect();
        self.apply_remote_set(&response.notes, &submitted_ids, report)
            .await?;

        self.status.set_last_sync_at(response.server_time).await?;
        report.server_time = Some(response.server_time);

        Ok(batch_size > 1 && rejected.len() == batch_size)
    }

    /// Take the authority's copies of notes this device has no pending edit for
    async fn apply_remote_set(
        &self,
        notes: &[Note],
        submitted: &HashSet<&str>,
        report: &mut QueueRunReport,
    ) -> Result<()> {
        let pending: HashSet<String> = self
            .outbox
            .list_all()
            .await?
            .into_iter()
            .map(|entry| entry.entity_id)
            .collect();

        for note in notes {
            if note.owner_id != self.config.owner_id {
                continue;
            }
            let id = note.id.to_string();
            if submitted.contains(id.as_str()) || pending.contains(&id) {
                continue;
            }
            if self.status.apply_remote_note(note).await? {
                tracing::debug!(entity_id = %id, "Applied remote change");
                report.remote_changed.push(id);
            }
        }
        Ok(())
    }
}
