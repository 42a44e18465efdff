//! The sliced event source: turns a `JournalQuery` into a resumable,
//! slice-restricted stream. See spec.md §4.1.

pub mod in_memory;

pub use in_memory::InMemoryJournal;
pub use rep_core::journal::JournalQuery;
pub use rep_core::{LoadedEvent, SourceError};
