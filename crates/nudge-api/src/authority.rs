//! In-memory sync authority.
//!
//! Resolves every submitted change with last-write-wins on `updated_at`.
//! Each accepted write bumps the note's `server_version` and appends a
//! change event; stale writes are dropped without a trace.

use std::collections::HashMap;

use nudge_core::models::{
    ChangeEvent, Note, OutboxOperation, SyncBatchRequest, SyncBatchResponse, SyncChange,
    SyncStatus,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Default)]
struct OwnerState {
    notes: HashMap<String, Note>,
    events: Vec<ChangeEvent>,
}

#[derive(Default)]
pub struct SyncAuthority {
    owners: Mutex<HashMap<String, OwnerState>>,
}

impl SyncAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a batch in order and return the owner's full note set.
    ///
    /// The batch is validated as a whole before anything is written.
    pub async fn apply_batch(
        &self,
        request: &SyncBatchRequest,
        now: i64,
    ) -> Result<SyncBatchResponse, AppError> {
        validate_batch(request)?;

        let mut owners = self.owners.lock().await;
        let state = owners.entry(request.owner_id.clone()).or_default();

        let mut applied = 0usize;
        for change in &request.changes {
            if apply_change(state, change, &request.device_id, now) {
                applied += 1;
            }
        }
        tracing::info!(
            owner_id = %request.owner_id,
            device_id = %request.device_id,
            submitted = request.changes.len(),
            applied,
            "Applied sync batch"
        );

        let mut notes: Vec<Note> = state.notes.values().cloned().collect();
        notes.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.to_string().cmp(&b.id.to_string()))
        });
        Ok(SyncBatchResponse {
            notes,
            server_time: now,
        })
    }

    /// Change events for `owner_id` recorded at or after `since`
    pub async fn events_since(&self, owner_id: &str, since: Option<i64>) -> Vec<ChangeEvent> {
        let owners = self.owners.lock().await;
        owners
            .get(owner_id)
            .map(|state| {
                state
                    .events
                    .iter()
                    .filter(|event| since.is_none_or(|since| event.changed_at >= since))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn validate_batch(request: &SyncBatchRequest) -> Result<(), AppError> {
    if request.owner_id.trim().is_empty() {
        return Err(AppError::bad_request("owner_id is required"));
    }
    for change in &request.changes {
        if change.note.owner_id != request.owner_id {
            return Err(AppError::bad_request(format!(
                "change {} belongs to another owner",
                change.entity_id
            )));
        }
        if change.note.id.to_string() != change.entity_id {
            return Err(AppError::bad_request(format!(
                "change {} carries a note with a different id",
                change.entity_id
            )));
        }
    }
    Ok(())
}

/// Returns whether the change won against the stored copy
fn apply_change(state: &mut OwnerState, change: &SyncChange, device_id: &str, now: i64) -> bool {
    let stored = state.notes.get(&change.entity_id);
    if let Some(stored) = stored {
        if change.note.updated_at <= stored.updated_at {
            tracing::debug!(
                entity_id = %change.entity_id,
                stored_updated_at = stored.updated_at,
                incoming_updated_at = change.note.updated_at,
                "Dropped stale change"
            );
            return false;
        }
    }

    let mut note = change.note.clone();
    if change.operation == OutboxOperation::Delete {
        note.active = false;
    }
    note.server_version = stored.map_or(0, |stored| stored.server_version) + 1;
    note.sync_status = SyncStatus::Synced;
    state.notes.insert(change.entity_id.clone(), note);

    state.events.push(ChangeEvent {
        event_id: Uuid::now_v7().to_string(),
        entity_id: change.entity_id.clone(),
        operation: change.operation,
        changed_at: now,
        device_id: device_id.to_string(),
        payload_hash: change.payload_hash.clone(),
    });
    true
}
