//! Storage substrate
//!
//! The transactional SQL + key-value primitive the engine runs on, and its
//! SQLite implementation.

mod errors;
mod sqlite;
mod substrate;

pub use errors::{StorageError, StorageResult};
pub use sqlite::{JournalMode, SqliteConfig, SqliteSubstrate};
pub use substrate::{SqlRow, SqlValue, Substrate};
