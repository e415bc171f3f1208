use std::path::Path;

use nudge_core::util::now_millis;

use crate::commands::common::{
    format_timestamp, normalize_note_identifier, parse_when, resolve_note, LocalContext,
};
use crate::error::CliError;

pub async fn run_snooze(id: &str, until: &str, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_note_identifier(id)?;
    let ctx = LocalContext::open(db_path).await?;
    let note = resolve_note(&normalized_id, ctx.store()).await?;

    let until = parse_when(until, now_millis(), ctx.settings.utc_offset)?;
    let snoozed = ctx.service.snooze(&note.id, until).await?;
    println!("{}  snoozed until {}", snoozed.id, format_timestamp(until));
    Ok(())
}

pub async fn run_done(id: &str, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_note_identifier(id)?;
    let ctx = LocalContext::open(db_path).await?;
    let note = resolve_note(&normalized_id, ctx.store()).await?;

    let acknowledged = ctx.service.acknowledge(&note.id).await?;
    match acknowledged.next_trigger_at {
        Some(next) if !acknowledged.done => {
            println!("{}  next at {}", acknowledged.id, format_timestamp(next));
        }
        _ => println!("{}  done", acknowledged.id),
    }
    Ok(())
}

pub async fn run_reconcile(db_path: &Path) -> Result<(), CliError> {
    let ctx = LocalContext::open(db_path).await?;
    let outcomes = ctx.service.reconcile_all().await?;

    for outcome in &outcomes {
        let next = outcome
            .next_trigger_at
            .map_or_else(|| "-".to_string(), format_timestamp);
        println!(
            "{}  {:<11}  next={}",
            outcome.entity_id,
            outcome.schedule_status.as_str(),
            next
        );
    }
    println!("Reconciled {} reminder(s)", outcomes.len());
    Ok(())
}
