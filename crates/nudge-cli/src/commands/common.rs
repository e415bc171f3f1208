use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use nudge_core::config::SyncSettings;
use nudge_core::db::{Database, LibSqlStore, NoteRepository};
use nudge_core::models::{ChangeEvent, Note, NoteId, RepeatRule, SyncConflict, SyncStatus};
use nudge_core::outbox::QueueStats;
use nudge_core::schedule::CalendarRecurrence;
use nudge_core::services::NoteService;
use serde::Serialize;

use crate::cli::ReminderArgs;
use crate::error::CliError;
use crate::notifier::LoggingNotifier;

pub type CliNoteService = NoteService<LoggingNotifier, CalendarRecurrence>;

const LOCAL_INPUT_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"];
const BASE_AT_LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Local database, settings and note service for one CLI invocation
pub struct LocalContext {
    _db: Database,
    pub settings: SyncSettings,
    pub service: CliNoteService,
}

impl LocalContext {
    pub async fn open(db_path: &Path) -> Result<Self, CliError> {
        let settings = SyncSettings::from_env()?;
        Self::open_with(db_path, settings).await
    }

    pub async fn open_with(db_path: &Path, settings: SyncSettings) -> Result<Self, CliError> {
        let db = open_database(db_path).await?;
        let service = NoteService::new(
            LibSqlStore::from_database(&db),
            settings.retry,
            LoggingNotifier,
            settings.recurrence(),
        );
        Ok(Self {
            _db: db,
            settings,
            service,
        })
    }

    pub const fn store(&self) -> &LibSqlStore {
        self.service.store()
    }
}

#[derive(Debug, Serialize)]
pub struct NoteListItem {
    pub id: String,
    pub title: Option<String>,
    pub preview: String,
    pub content: String,
    pub active: bool,
    pub done: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub relative_time: String,
    pub next_trigger_at: Option<i64>,
    pub schedule_status: String,
    pub sync_status: String,
}

#[derive(Debug, Serialize)]
pub struct SyncConflictItem {
    pub id: i64,
    pub note_id: String,
    pub local_updated_at: i64,
    pub incoming_updated_at: i64,
    pub resolved_at: i64,
    pub resolved_at_iso: String,
    pub strategy: String,
}

pub async fn open_database(path: &Path) -> Result<Database, CliError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Database::open(path).await?)
}

pub async fn list_notes(
    limit: usize,
    reminders_only: bool,
    include_deleted: bool,
    store: &LibSqlStore,
) -> Result<Vec<Note>, CliError> {
    if reminders_only {
        let mut notes = store.list_reminder_notes().await?;
        notes.retain(|note| include_deleted || note.active);
        notes.sort_by_key(|note| note.next_trigger_at.unwrap_or(i64::MAX));
        notes.truncate(limit);
        return Ok(notes);
    }
    Ok(store.list_notes(limit, 0, include_deleted).await?)
}

pub async fn resolve_note(note_query: &str, store: &LibSqlStore) -> Result<Note, CliError> {
    if let Ok(note_id) = note_query.parse::<NoteId>() {
        if let Some(note) = store.get_note(&note_id).await? {
            return Ok(note);
        }
    }

    let matching_ids = store.list_note_ids_by_prefix(note_query, 3).await?;

    match matching_ids.as_slice() {
        [] => Err(CliError::NoteNotFound(note_query.to_string())),
        [only] => {
            let resolved_id = only
                .parse::<NoteId>()
                .map_err(|_| CliError::NoteNotFound(note_query.to_string()))?;
            store
                .get_note(&resolved_id)
                .await?
                .ok_or_else(|| CliError::NoteNotFound(note_query.to_string()))
        }
        _ => {
            let options = matching_ids
                .iter()
                .take(3)
                .map(|id| id.chars().take(13).collect::<String>())
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousNoteId(format!(
                "ID prefix '{note_query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

/// Parse a user-supplied instant.
///
/// Accepts relative offsets (`+45s`, `+30m`, `+2h`, `+1d`), RFC 3339, or a
/// wall-clock time read in `offset`.
pub fn parse_when(input: &str, now: i64, offset: FixedOffset) -> Result<i64, CliError> {
    let input = input.trim();
    let invalid = || CliError::InvalidTime(input.to_string());

    if let Some(relative) = input.strip_prefix('+') {
        let split = relative
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(invalid)?;
        let (amount, unit) = relative.split_at(split);
        let amount: i64 = amount.parse().map_err(|_| invalid())?;
        let unit_ms = match unit {
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            "d" => 86_400_000,
            _ => return Err(invalid()),
        };
        return amount
            .checked_mul(unit_ms)
            .and_then(|delta| now.checked_add(delta))
            .ok_or_else(invalid);
    }

    if let Ok(at) = DateTime::parse_from_rfc3339(input) {
        return Ok(at.timestamp_millis());
    }

    LOCAL_INPUT_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(input, format).ok())
        .and_then(|local| offset.from_local_datetime(&local).single())
        .map(|at| at.timestamp_millis())
        .ok_or_else(invalid)
}

/// Wall-clock rendering of `at` used as the recurrence anchor
pub fn local_anchor(at: i64, offset: FixedOffset) -> Option<String> {
    DateTime::from_timestamp_millis(at).map(|at| {
        at.with_timezone(&offset)
            .format(BASE_AT_LOCAL_FORMAT)
            .to_string()
    })
}

/// Apply `--at` / `--repeat` flags to a note. Returns whether anything was set.
pub fn apply_reminder_args(
    note: &mut Note,
    args: &ReminderArgs,
    now: i64,
    offset: FixedOffset,
) -> Result<bool, CliError> {
    let at = args
        .at
        .as_deref()
        .map(|at| parse_when(at, now, offset))
        .transpose()?;

    let Some(frequency) = args.repeat else {
        if let Some(at) = at {
            note.trigger_at = Some(at);
            note.repeat = None;
            note.repeat_rule = None;
            note.start_at = None;
            note.base_at_local = None;
            return Ok(true);
        }
        return Ok(false);
    };

    if let Some(day) = args.weekdays.iter().find(|day| !(1..=7).contains(*day)) {
        return Err(CliError::InvalidWeekday(*day));
    }
    let until = args
        .until
        .as_deref()
        .map(|until| parse_when(until, now, offset))
        .transpose()?;

    let mut rule = RepeatRule::new(frequency.into())
        .with_interval(args.every.max(1))
        .with_weekdays(args.weekdays.clone());
    rule.until = until;

    let start_at = at.unwrap_or(now);
    note.trigger_at = None;
    note.repeat_rule = None;
    note.repeat = Some(rule);
    note.start_at = Some(start_at);
    note.base_at_local = local_anchor(start_at, offset);
    Ok(true)
}

pub fn clear_reminder(note: &mut Note) {
    note.trigger_at = None;
    note.repeat = None;
    note.repeat_rule = None;
    note.start_at = None;
    note.base_at_local = None;
    note.snoozed_until = None;
}

pub fn format_note_lines(notes: &[Note], now_ms: i64) -> Vec<String> {
    notes
        .iter()
        .map(|note| {
            let id = note.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let preview = note_preview(note, 40);
            let relative_time = format_relative_time(note.updated_at, now_ms);
            let marker = note_marker(note);

            match note.next_trigger_at {
                Some(at) => format!(
                    "{short_id:<13} {marker} {preview:<40}  {relative_time:<10}  ⏰ {}",
                    format_timestamp(at)
                ),
                None => format!("{short_id:<13} {marker} {preview:<40}  {relative_time}"),
            }
        })
        .collect()
}

fn note_marker(note: &Note) -> char {
    if !note.active {
        'x'
    } else if note.done {
        '✓'
    } else if note.sync_status != SyncStatus::Synced {
        '*'
    } else {
        ' '
    }
}

pub fn note_to_list_item(note: &Note, now_ms: i64) -> NoteListItem {
    NoteListItem {
        id: note.id.to_string(),
        title: note.title.clone(),
        preview: note_preview(note, 80),
        content: note.content.clone(),
        active: note.active,
        done: note.done,
        created_at: note.created_at,
        updated_at: note.updated_at,
        relative_time: format_relative_time(note.updated_at, now_ms),
        next_trigger_at: note.next_trigger_at,
        schedule_status: note.schedule_status.as_str().to_string(),
        sync_status: note.sync_status.as_str().to_string(),
    }
}

pub fn sync_conflict_to_item(conflict: &SyncConflict) -> SyncConflictItem {
    SyncConflictItem {
        id: conflict.id,
        note_id: conflict.note_id.clone(),
        local_updated_at: conflict.local_updated_at,
        incoming_updated_at: conflict.incoming_updated_at,
        resolved_at: conflict.resolved_at,
        resolved_at_iso: format_timestamp(conflict.resolved_at),
        strategy: conflict.strategy.clone(),
    }
}

pub fn note_preview(note: &Note, max_chars: usize) -> String {
    let (title, _) = note.notification_text();
    let collapsed = title.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_sync_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  {:<4}  note={}  local={} incoming={}",
                format_timestamp(conflict.resolved_at),
                conflict.strategy,
                conflict.note_id,
                conflict.local_updated_at,
                conflict.incoming_updated_at
            )
        })
        .collect()
}

pub fn format_queue_stats_lines(stats: &QueueStats) -> Vec<String> {
    let mut lines = vec![
        format!("total:     {}", stats.total),
        format!("pending:   {}", stats.pending),
        format!("retrying:  {}", stats.retrying),
        format!("maxed out: {}", stats.maxed_out),
    ];
    if let Some(at) = stats.next_retry_at {
        lines.push(format!("next retry: {}", format_timestamp(at)));
    }
    lines
}

pub fn format_event_lines(events: &[ChangeEvent]) -> Vec<String> {
    events
        .iter()
        .map(|event| {
            format!(
                "{}  {:<6}  note={}  device={}",
                format_timestamp(event.changed_at),
                event.operation.as_str(),
                event.entity_id,
                event.device_id
            )
        })
        .collect()
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn resolve_note_content(content_parts: &[String]) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&content_parts.join(" ")) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    if let Some(content) = capture_editor_input_with_initial("")? {
        return Ok(content);
    }

    Err(CliError::EmptyContent)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_note_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyNoteId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_note_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let note_content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&note_content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    match Command::new(editor).arg(file_path).status() {
        Ok(status) => {
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };

            let mut command = Command::new(program);
            command.args(parts).arg(file_path);

            let status = command.status()?;
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) => Err(CliError::Io(err)),
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

pub fn create_temp_note_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("nudge-note-{}-{now}.md", std::process::id()))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os("NUDGE_DB_PATH").map(PathBuf::from)) {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("nudge").join("nudge.db"))
        .ok_or(CliError::NoDataDir)
}
