use std::path::Path;
use std::time::Duration;

use nudge_core::config::{ConfigError, SyncSettings};
use nudge_core::db::LibSqlStore;
use nudge_core::outbox::OutboxStore;
use nudge_core::sync::{
    ChangeNotices, HttpRemoteAuthority, QueueRunReport, RemoteAuthority, SyncQueueProcessor,
};
use nudge_core::util::now_millis;

use crate::commands::common::{
    format_event_lines, format_queue_stats_lines, format_sync_conflict_lines,
    sync_conflict_to_item, LocalContext, SyncConflictItem,
};
use crate::error::CliError;

pub type CliSyncProcessor<A> = SyncQueueProcessor<LibSqlStore, A, LibSqlStore>;

pub async fn run_sync(db_path: &Path) -> Result<(), CliError> {
    let ctx = LocalContext::open(db_path).await?;
    let remote = remote_authority(&ctx.settings)?;
    let processor = build_processor(&ctx, remote);

    let cancel = processor.cancel_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });
    let report = processor.process_queue().await;
    interrupt.abort();
    let report = report?;

    finish_sync(&ctx, &report).await?;
    for line in format_run_report(&report) {
        println!("{line}");
    }
    Ok(())
}

pub fn build_processor<A: RemoteAuthority>(ctx: &LocalContext, remote: A) -> CliSyncProcessor<A> {
    SyncQueueProcessor::new(
        OutboxStore::new(ctx.store().clone(), ctx.settings.retry),
        remote,
        ctx.store().clone(),
        ctx.settings.processor_config(),
    )
}

/// Reschedule reminders of notes the round trip changed locally
pub async fn finish_sync(ctx: &LocalContext, report: &QueueRunReport) -> Result<(), CliError> {
    let mut changed = report.remote_changed.clone();
    changed.extend(report.conflicts.iter().cloned());
    if !changed.is_empty() {
        ctx.service.reconcile_ids(&changed).await?;
    }
    Ok(())
}

pub fn format_run_report(report: &QueueRunReport) -> Vec<String> {
    if report.skipped {
        return vec!["Another sync run is in progress".to_string()];
    }

    let mut lines = vec![format!(
        "Sync completed: {} sent, {} failed, {} conflict(s), {} updated from server",
        report.succeeded.len(),
        report.failed.len(),
        report.conflicts.len(),
        report.remote_changed.len()
    )];
    if !report.superseded.is_empty() {
        lines.push(format!(
            "{} change(s) were edited during the sync and stay queued",
            report.superseded.len()
        ));
    }
    if report.circuit_open {
        lines.push(
            "Stopped early: a whole batch failed; remaining changes will retry later".to_string(),
        );
    }
    if report.canceled {
        lines.push("Sync canceled".to_string());
    }
    lines
}

pub async fn run_sync_conflicts(
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let ctx = LocalContext::open(db_path).await?;
    let conflicts = ctx.store().list_conflicts(limit).await?;

    if as_json {
        let json_items = conflicts
            .iter()
            .map(sync_conflict_to_item)
            .collect::<Vec<SyncConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_sync_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_queue(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let ctx = LocalContext::open(db_path).await?;
    let stats = ctx.service.outbox().stats(now_millis()).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        for line in format_queue_stats_lines(&stats) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_retry(db_path: &Path) -> Result<(), CliError> {
    let ctx = LocalContext::open(db_path).await?;
    let reset = ctx.service.outbox().reset_all().await?;
    println!("Reset {reset} queued change(s)");
    Ok(())
}

pub async fn run_events(since: Option<i64>, follow: bool, interval: u64) -> Result<(), CliError> {
    let settings = SyncSettings::from_env()?;
    let remote = remote_authority(&settings)?;
    let mut notices = ChangeNotices::default();
    let mut since = since;

    loop {
        let events = remote
            .fetch_events(&settings.owner_id, since)
            .await
            .map_err(nudge_core::Error::from)?;
        if let Some(latest) = events.iter().map(|event| event.changed_at).max() {
            since = Some(latest);
        }
        let fresh = notices.filter_new(events);
        for line in format_event_lines(&fresh) {
            println!("{line}");
        }

        if !follow {
            return Ok(());
        }
        tokio::select! {
            () = tokio::time::sleep(Duration::from_secs(interval.max(1))) => {}
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

fn remote_authority(settings: &SyncSettings) -> Result<HttpRemoteAuthority, CliError> {
    settings.remote_authority().map_err(|error| match error {
        ConfigError::MissingVar(_) => CliError::SyncNotConfigured,
        other => CliError::Config(other),
    })
}
