//! Note model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::repeat::RepeatRule;

/// Label used when a reminder has neither title nor content.
pub const GENERIC_REMINDER_LABEL: &str = "Reminder";

/// A unique identifier for a note, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoteId(Uuid);

impl NoteId {
    /// Create a new unique note ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NoteId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Whether a note currently holds a local alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    Scheduled,
    #[default]
    Unscheduled,
    Error,
}

impl ScheduleStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Unscheduled => "unscheduled",
            Self::Error => "error",
        }
    }
}

impl FromStr for ScheduleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "unscheduled" => Ok(Self::Unscheduled),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown schedule status '{other}'")),
        }
    }
}

/// Round-trip state of a note relative to the remote authority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Synced,
    #[default]
    Pending,
    /// The authority kept a newer copy than the last submitted edit.
    Conflict,
}

impl SyncStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Pending => "pending",
            Self::Conflict => "conflict",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synced" => Ok(Self::Synced),
            "pending" => Ok(Self::Pending),
            "conflict" => Ok(Self::Conflict),
            other => Err(format!("unknown sync status '{other}'")),
        }
    }
}

/// A note, optionally carrying reminder metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Unique identifier, stable across devices
    pub id: NoteId,
    /// Owning account
    pub owner_id: String,
    /// Optional title
    #[serde(default)]
    pub title: Option<String>,
    /// Plain text content
    pub content: String,
    /// Soft delete flag (`false` once deleted)
    pub active: bool,
    /// Set when a reminder has been completed
    #[serde(default)]
    pub done: bool,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms), strictly increasing per edit
    pub updated_at: i64,
    /// One-shot trigger time (Unix ms)
    #[serde(default)]
    pub trigger_at: Option<i64>,
    /// Legacy repeat rule name (`daily`, `weekly`, `monthly`)
    #[serde(default)]
    pub repeat_rule: Option<String>,
    /// Canonical repeat descriptor
    #[serde(default)]
    pub repeat: Option<RepeatRule>,
    /// First occurrence of a repeating series (Unix ms)
    #[serde(default)]
    pub start_at: Option<i64>,
    /// Wall-clock anchor of a repeating series (`YYYY-MM-DDTHH:MM[:SS]`)
    #[serde(default)]
    pub base_at_local: Option<String>,
    /// Next computed occurrence of a repeating series (Unix ms)
    #[serde(default)]
    pub next_trigger_at: Option<i64>,
    #[serde(default)]
    pub last_fired_at: Option<i64>,
    #[serde(default)]
    pub last_acknowledged_at: Option<i64>,
    /// Snooze overrides the base trigger while in the future (Unix ms)
    #[serde(default)]
    pub snoozed_until: Option<i64>,
    #[serde(default)]
    pub schedule_status: ScheduleStatus,
    #[serde(default)]
    pub sync_status: SyncStatus,
    /// Last known server optimistic-concurrency counter
    #[serde(default)]
    pub server_version: i64,
}

impl Note {
    /// Create a new note with the given owner and content
    #[must_use]
    pub fn new(owner_id: impl Into<String>, content: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: NoteId::new(),
            owner_id: owner_id.into(),
            title: None,
            content: content.into(),
            active: true,
            done: false,
            created_at: now,
            updated_at: now,
            trigger_at: None,
            repeat_rule: None,
            repeat: None,
            start_at: None,
            base_at_local: None,
            next_trigger_at: None,
            last_fired_at: None,
            last_acknowledged_at: None,
            snoozed_until: None,
            schedule_status: ScheduleStatus::Unscheduled,
            sync_status: SyncStatus::Pending,
            server_version: 0,
        }
    }

    /// Set a one-shot reminder time
    #[must_use]
    pub fn with_trigger_at(mut self, trigger_at: i64) -> Self {
        self.trigger_at = Some(trigger_at);
        self
    }

    /// Set a repeating series starting at `start_at`
    #[must_use]
    pub fn with_repeat(mut self, repeat: RepeatRule, start_at: i64) -> Self {
        self.repeat = Some(repeat);
        self.start_at = Some(start_at);
        self
    }

    /// Canonical repeat descriptor, falling back to the legacy rule name
    pub fn effective_repeat(&self) -> Option<RepeatRule> {
        self.repeat.clone().or_else(|| {
            self.repeat_rule
                .as_deref()
                .and_then(RepeatRule::from_legacy)
        })
    }

    /// Whether this note carries any reminder metadata at all
    pub fn has_reminder(&self) -> bool {
        self.trigger_at.is_some()
            || self.next_trigger_at.is_some()
            || self.snoozed_until.is_some()
            || self.effective_repeat().is_some()
    }

    /// Get first line as title preview, truncated to `max_len` characters
    #[must_use]
    pub fn title_preview(&self, max_len: usize) -> String {
        self.content
            .lines()
            .next()
            .unwrap_or("")
            .trim()
            .chars()
            .take(max_len)
            .collect()
    }

    /// Title and body for a local notification.
    ///
    /// The title prefers the note title, then the first content line, then a
    /// generic label. The body is whatever content the title does not already
    /// carry.
    pub fn notification_text(&self) -> (String, String) {
        let content = self.content.trim();
        let title = self
            .title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty());

        if let Some(title) = title {
            let body = if title == content { "" } else { content };
            return (title.to_string(), body.to_string());
        }

        let preview = self.title_preview(120);
        if preview.is_empty() {
            return (GENERIC_REMINDER_LABEL.to_string(), content.to_string());
        }
        let rest = content.split_once('\n').map_or("", |(_, rest)| rest.trim());
        (preview, rest.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RepeatFrequency;

    #[test]
    fn test_note_id_unique() {
        let id1 = NoteId::new();
        let id2 = NoteId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_note_id_parse() {
        let id = NoteId::new();
        let parsed: NoteId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_note_new() {
        let note = Note::new("owner-1", "Hello world");
        assert_eq!(note.content, "Hello world");
        assert!(note.active);
        assert!(!note.done);
        assert_eq!(note.sync_status, SyncStatus::Pending);
        assert_eq!(note.created_at, note.updated_at);
        assert!(!note.has_reminder());
    }

    #[test]
    fn test_effective_repeat_prefers_canonical() {
        let mut note = Note::new("owner-1", "water plants");
        note.repeat_rule = Some("daily".to_string());
        assert_eq!(
            note.effective_repeat().map(|rule| rule.frequency),
            Some(RepeatFrequency::Daily)
        );

        note.repeat = Some(RepeatRule::new(RepeatFrequency::Weekly));
        assert_eq!(
            note.effective_repeat().map(|rule| rule.frequency),
            Some(RepeatFrequency::Weekly)
        );
    }

    #[test]
    fn test_notification_text_prefers_title() {
        let mut note = Note::new("owner-1", "Call the dentist\nbefore noon");
        note.title = Some("Dentist".to_string());
        let (title, body) = note.notification_text();
        assert_eq!(title, "Dentist");
        assert_eq!(body, "Call the dentist\nbefore noon");

        note.title = Some(" Call the dentist\nbefore noon ".to_string());
        let (title, body) = note.notification_text();
        assert_eq!(title, "Call the dentist\nbefore noon");
        assert!(body.is_empty());
    }

    #[test]
    fn test_notification_text_falls_back_to_content_then_label() {
        let note = Note::new("owner-1", "Call the dentist\nbefore noon");
        assert_eq!(
            note.notification_text(),
            ("Call the dentist".to_string(), "before noon".to_string())
        );

        let single = Note::new("owner-1", "  Call the dentist  ");
        assert_eq!(
            single.notification_text(),
            ("Call the dentist".to_string(), String::new())
        );

        let mut empty = Note::new("owner-1", "   ");
        empty.title = Some("  ".to_string());
        assert_eq!(
            empty.notification_text(),
            (GENERIC_REMINDER_LABEL.to_string(), String::new())
        );
    }

    #[test]
    fn test_status_round_trip_through_strings() {
        for status in [
            ScheduleStatus::Scheduled,
            ScheduleStatus::Unscheduled,
            ScheduleStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<ScheduleStatus>(), Ok(status));
        }
        assert!("bogus".parse::<SyncStatus>().is_err());
    }
}
