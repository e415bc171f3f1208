use std::io;

use nudge_core::config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] nudge_core::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No note content provided")]
    EmptyContent,
    #[error("Edited note content cannot be empty")]
    EmptyEditedContent,
    #[error("Note ID cannot be empty")]
    EmptyNoteId,
    #[error("Note not found for id/prefix: {0}")]
    NoteNotFound(String),
    #[error("{0}")]
    AmbiguousNoteId(String),
    #[error("Invalid time '{0}': use +30m, +2h, +1d, YYYY-MM-DD HH:MM or RFC 3339")]
    InvalidTime(String),
    #[error("Weekday {0} is out of range (1 = Monday .. 7 = Sunday)")]
    InvalidWeekday(u8),
    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error("Could not resolve a data directory; pass --db-path or set NUDGE_DB_PATH")]
    NoDataDir,
    #[error("Sync is not configured. Set NUDGE_API_BASE_URL (and NUDGE_API_TOKEN if the server requires one).")]
    SyncNotConfigured,
}
