//! Wire types exchanged with the remote authority

use serde::{Deserialize, Serialize};

use super::note::Note;
use super::outbox::OutboxOperation;

/// One ordered change inside a submitted batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncChange {
    pub entity_id: String,
    pub operation: OutboxOperation,
    /// Full entity state; deletes carry the soft-deleted state
    pub note: Note,
    pub payload_hash: String,
}

/// Batch submission for one owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncBatchRequest {
    pub owner_id: String,
    pub device_id: String,
    /// Server timestamp of the last successful round trip
    pub last_sync_at: Option<i64>,
    pub changes: Vec<SyncChange>,
}

/// The authority's complete current note set for the owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncBatchResponse {
    pub notes: Vec<Note>,
    pub server_time: i64,
}

/// Append-only record of one accepted write on the authority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub event_id: String,
    pub entity_id: String,
    pub operation: OutboxOperation,
    pub changed_at: i64,
    pub device_id: String,
    pub payload_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEventsResponse {
    pub events: Vec<ChangeEvent>,
}

/// Submitted edit that lost last-write-wins against the authority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Conflict row identifier
    pub id: i64,
    pub note_id: String,
    /// Timestamp of the edit this device submitted
    pub local_updated_at: i64,
    /// Timestamp of the copy the authority kept
    pub incoming_updated_at: i64,
    /// Resolution timestamp (unix ms)
    pub resolved_at: i64,
    /// Resolution strategy name
    pub strategy: String,
}
