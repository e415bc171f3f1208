//! Outbox draining against the remote authority.

mod notices;
mod processor;
mod remote;

pub use notices::ChangeNotices;
pub use processor::{CancelHandle, QueueRunReport, SyncProcessorConfig, SyncQueueProcessor};
pub use remote::{HttpRemoteAuthority, RemoteAuthority, RemoteError, RemoteResult};

use crate::error::Result;
use crate::models::Note;

/// Local note bookkeeping driven by sync round trips
#[allow(async_fn_in_trait)]
pub trait SyncStatusUpdater {
    /// Mark a note as confirmed by the authority at `server_version`
    async fn mark_synced(&self, entity_id: &str, server_version: i64) -> Result<()>;

    /// Adopt the newer copy the authority kept over the submitted edit and log it
    async fn record_conflict(&self, submitted_updated_at: i64, kept: &Note, now: i64)
        -> Result<()>;

    /// Apply an authoritative copy when it is newer than the local one
    async fn apply_remote_note(&self, remote: &Note) -> Result<bool>;

    async fn last_sync_at(&self) -> Result<Option<i64>>;

    async fn set_last_sync_at(&self, server_time: i64) -> Result<()>;
}
