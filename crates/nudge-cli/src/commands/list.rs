use std::path::Path;

use nudge_core::util::now_millis;

use crate::commands::common::{
    format_note_lines, list_notes, note_to_list_item, LocalContext, NoteListItem,
};
use crate::error::CliError;

pub async fn run_list(
    limit: usize,
    reminders_only: bool,
    include_deleted: bool,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let ctx = LocalContext::open(db_path).await?;
    let notes = list_notes(limit, reminders_only, include_deleted, ctx.store()).await?;
    let now = now_millis();

    if as_json {
        let json_items = notes
            .iter()
            .map(|note| note_to_list_item(note, now))
            .collect::<Vec<NoteListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        for line in format_note_lines(&notes, now) {
            println!("{line}");
        }
    }

    Ok(())
}
