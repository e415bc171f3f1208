//! Data models for Nudge

mod note;
mod outbox;
mod repeat;
mod schedule;
mod sync;

pub use note::{Note, NoteId, ScheduleStatus, SyncStatus, GENERIC_REMINDER_LABEL};
pub use outbox::{OutboxEntry, OutboxOperation};
pub use repeat::{RepeatFrequency, RepeatRule};
pub use schedule::{LedgerStatus, ScheduleLedgerEntry};
pub use sync::{
    ChangeEvent, ChangeEventsResponse, SyncBatchRequest, SyncBatchResponse, SyncChange,
    SyncConflict,
};
