use std::path::Path;

use nudge_core::util::{normalize_text_option, now_millis};
use nudge_core::Note;

use crate::cli::ReminderArgs;
use crate::commands::common::{apply_reminder_args, resolve_note_content, LocalContext};
use crate::error::CliError;

pub async fn run_add(
    content_parts: &[String],
    title: Option<String>,
    reminder: &ReminderArgs,
    db_path: &Path,
) -> Result<(), CliError> {
    let title = normalize_text_option(title);
    let content = if title.is_some() && content_parts.is_empty() {
        String::new()
    } else {
        resolve_note_content(content_parts)?
    };

    let ctx = LocalContext::open(db_path).await?;
    let note = add_note(&ctx, content, title, reminder).await?;

    println!("{}", note.id);
    Ok(())
}

pub async fn add_note(
    ctx: &LocalContext,
    content: String,
    title: Option<String>,
    reminder: &ReminderArgs,
) -> Result<Note, CliError> {
    let mut note = Note::new(ctx.settings.owner_id.clone(), content);
    note.title = title;
    apply_reminder_args(&mut note, reminder, now_millis(), ctx.settings.utc_offset)?;
    Ok(ctx.service.save(note).await?)
}
