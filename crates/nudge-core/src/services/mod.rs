//! Application services shared by the clients

mod notes;

pub use notes::NoteService;
