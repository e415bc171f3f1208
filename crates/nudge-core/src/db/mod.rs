//! Database layer for Nudge

mod connection;
mod ledger_repository;
mod migrations;
mod note_repository;
mod outbox_repository;
mod store;
mod sync_repository;

pub use connection::Database;
pub use ledger_repository::LedgerRepository;
pub use note_repository::NoteRepository;
pub use outbox_repository::OutboxRepository;
pub use store::LibSqlStore;
