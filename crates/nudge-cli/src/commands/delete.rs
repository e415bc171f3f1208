use std::path::Path;

use crate::commands::common::{normalize_note_identifier, resolve_note, LocalContext};
use crate::error::CliError;

pub async fn run_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_note_identifier(id)?;
    let ctx = LocalContext::open(db_path).await?;
    let note = resolve_note(&normalized_id, ctx.store()).await?;

    ctx.service.delete(&note.id).await?;
    println!("{}", note.id);
    Ok(())
}
