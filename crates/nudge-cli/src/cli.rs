use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use nudge_core::models::RepeatFrequency;

#[derive(Parser)]
#[command(name = "nudge")]
#[command(about = "Offline-first notes and reminders from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Quick capture: nudge "my thought here"
    #[arg(trailing_var_arg = true)]
    pub note: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new note, optionally with a reminder
    #[command(alias = "new")]
    Add {
        /// Note content
        content: Vec<String>,
        /// Optional title
        #[arg(long)]
        title: Option<String>,
        #[command(flatten)]
        reminder: ReminderArgs,
    },
    /// List recent notes
    List {
        /// Number of notes to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Only show notes with a reminder
        #[arg(long)]
        reminders: bool,
        /// Include deleted notes
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an existing note
    Edit {
        /// Note ID or unique ID prefix
        id: String,
        /// Replace the content instead of opening an editor
        #[arg(long)]
        content: Option<String>,
        /// Replace the title
        #[arg(long)]
        title: Option<String>,
        #[command(flatten)]
        reminder: ReminderArgs,
        /// Remove the reminder from the note
        #[arg(long, conflicts_with_all = ["at", "repeat"])]
        clear_reminder: bool,
    },
    /// Delete an existing note
    Delete {
        /// Note ID or unique ID prefix
        id: String,
    },
    /// Postpone a reminder
    Snooze {
        /// Note ID or unique ID prefix
        id: String,
        /// When to fire again: +30m, +2h, +1d or a local date/time
        #[arg(long, default_value = "+10m")]
        until: String,
    },
    /// Acknowledge the current occurrence of a reminder
    Done {
        /// Note ID or unique ID prefix
        id: String,
    },
    /// Re-issue every reminder from the stored notes
    Reconcile,
    /// Push queued changes to the sync authority
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
    },
    /// Show outbox queue statistics
    Queue {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Make every queued change immediately eligible again
    Retry,
    /// List change notices recorded by the sync authority
    Events {
        /// Only events at or after this Unix timestamp (ms)
        #[arg(long)]
        since: Option<i64>,
        /// Keep polling and print new notices as they arrive
        #[arg(long)]
        follow: bool,
        /// Poll interval in seconds for --follow
        #[arg(long, default_value = "30")]
        interval: u64,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// List recently resolved sync conflicts
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug, Default, Clone)]
pub struct ReminderArgs {
    /// Reminder time: +30m, +2h, +1d, `YYYY-MM-DD HH:MM` or RFC 3339
    #[arg(long)]
    pub at: Option<String>,
    /// Repeat the reminder, starting at --at (or now)
    #[arg(long, value_enum)]
    pub repeat: Option<RepeatArg>,
    /// Step between occurrences
    #[arg(long, default_value = "1")]
    pub every: u32,
    /// ISO weekdays for weekly repeats (1 = Monday .. 7 = Sunday)
    #[arg(long, value_delimiter = ',', requires = "repeat")]
    pub weekdays: Vec<u8>,
    /// Last date/time an occurrence may fall on
    #[arg(long, requires = "repeat")]
    pub until: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum RepeatArg {
    Daily,
    Weekly,
    Monthly,
}

impl From<RepeatArg> for RepeatFrequency {
    fn from(value: RepeatArg) -> Self {
        match value {
            RepeatArg::Daily => Self::Daily,
            RepeatArg::Weekly => Self::Weekly,
            RepeatArg::Monthly => Self::Monthly,
        }
    }
}
