use std::path::Path;

use nudge_core::util::{normalize_text_option, now_millis};
use nudge_core::Note;

use crate::cli::ReminderArgs;
use crate::commands::common::{
    apply_reminder_args, capture_editor_input_with_initial, clear_reminder,
    normalize_content, normalize_note_identifier, resolve_note, LocalContext,
};
use crate::error::CliError;

#[derive(Debug, Default, Clone)]
pub struct EditRequest {
    pub content: Option<String>,
    pub title: Option<String>,
    pub reminder: ReminderArgs,
    pub clear_reminder: bool,
}

impl EditRequest {
    fn has_field_changes(&self) -> bool {
        self.content.is_some()
            || self.title.is_some()
            || self.reminder.at.is_some()
            || self.reminder.repeat.is_some()
            || self.clear_reminder
    }
}

pub async fn run_edit(
    id: &str,
    mut request: EditRequest,
    db_path: &Path,
) -> Result<(), CliError> {
    let normalized_id = normalize_note_identifier(id)?;
    let ctx = LocalContext::open(db_path).await?;
    let note = resolve_note(&normalized_id, ctx.store()).await?;

    if !request.has_field_changes() {
        let Some(edited_content) = capture_editor_input_with_initial(&note.content)? else {
            return Err(CliError::EmptyEditedContent);
        };
        if edited_content == note.content {
            println!("{}", note.id);
            return Ok(());
        }
        request.content = Some(edited_content);
    }

    let updated = edit_note(&ctx, note, &request).await?;
    println!("{}", updated.id);
    Ok(())
}

pub async fn edit_note(
    ctx: &LocalContext,
    mut note: Note,
    request: &EditRequest,
) -> Result<Note, CliError> {
    if let Some(content) = &request.content {
        note.content = normalize_content(content).ok_or(CliError::EmptyEditedContent)?;
    }
    if let Some(title) = &request.title {
        note.title = normalize_text_option(Some(title.clone()));
    }
    if request.clear_reminder {
        clear_reminder(&mut note);
    } else {
        apply_reminder_args(
            &mut note,
            &request.reminder,
            now_millis(),
            ctx.settings.utc_offset,
        )?;
    }
    Ok(ctx.service.save(note).await?)
}
