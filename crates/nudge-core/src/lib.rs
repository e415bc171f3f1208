//! nudge-core - Core library for Nudge
//!
//! This crate contains the models, local storage, outbox sync engine and
//! reminder scheduling shared by the Nudge CLI and the reference sync
//! authority.

pub mod config;
pub mod db;
pub mod error;
pub mod hash;
pub mod models;
pub mod outbox;
pub mod retry;
pub mod schedule;
pub mod services;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Note, NoteId};
