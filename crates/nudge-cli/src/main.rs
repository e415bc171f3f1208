//! Nudge CLI - offline-first notes and reminders from the terminal
//!
//! Notes are written locally first and queued for the sync authority.

mod cli;
mod commands;
mod error;
mod notifier;


use clap::{CommandFactory, Parser};

use crate::cli::{Cli, Commands, ReminderArgs, SyncCommands};
use crate::commands::add::run_add;
use crate::commands::common::resolve_db_path;
use crate::commands::delete::run_delete;
use crate::commands::edit::{run_edit, EditRequest};
use crate::commands::list::run_list;
use crate::commands::reminder::{run_done, run_reconcile, run_snooze};
use crate::commands::sync::{run_events, run_queue, run_retry, run_sync, run_sync_conflicts};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("nudge=info".parse().expect("valid directive")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path)?;

    match cli.command {
        Some(Commands::Add {
            content,
            title,
            reminder,
        }) => run_add(&content, title, &reminder, &db_path).await?,
        Some(Commands::List {
            limit,
            reminders,
            all,
            json,
        }) => run_list(limit, reminders, all, json, &db_path).await?,
        Some(Commands::Edit {
            id,
            content,
            title,
            reminder,
            clear_reminder,
        }) => {
            let request = EditRequest {
                content,
                title,
                reminder,
                clear_reminder,
            };
            run_edit(&id, request, &db_path).await?;
        }
        Some(Commands::Delete { id }) => run_delete(&id, &db_path).await?,
        Some(Commands::Snooze { id, until }) => run_snooze(&id, &until, &db_path).await?,
        Some(Commands::Done { id }) => run_done(&id, &db_path).await?,
        Some(Commands::Reconcile) => run_reconcile(&db_path).await?,
        Some(Commands::Sync { command }) => match command {
            Some(SyncCommands::Conflicts { limit, json }) => {
                run_sync_conflicts(limit, json, &db_path).await?;
            }
            None => run_sync(&db_path).await?,
        },
        Some(Commands::Queue { json }) => run_queue(json, &db_path).await?,
        Some(Commands::Retry) => run_retry(&db_path).await?,
        Some(Commands::Events {
            since,
            follow,
            interval,
        }) => run_events(since, follow, interval).await?,
        None => {
            // Quick capture mode: nudge "my thought"
            if cli.note.is_empty() {
                Cli::command().print_help().map_err(CliError::Io)?;
                println!();
            } else {
                run_add(&cli.note, None, &ReminderArgs::default(), &db_path).await?;
            }
        }
    }

    Ok(())
}
