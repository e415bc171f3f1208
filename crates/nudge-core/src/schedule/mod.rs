//! Reminder scheduling: recurrence, the schedule ledger and the scheduler

mod ledger;
mod recurrence;
mod scheduler;

pub use ledger::ScheduleLedger;
pub use recurrence::{CalendarRecurrence, RecurrenceCalculator};
pub use scheduler::{NotificationRequest, Notifier, ReminderScheduler, ScheduleOutcome};
