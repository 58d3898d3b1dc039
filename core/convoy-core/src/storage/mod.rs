//! Durable storage behind the sink operator.
//!
//! SQLite allows one writer per database file; all writes therefore go
//! through a dedicated single-writer queue thread per file, while readers
//! open their own short-lived connections.

pub mod sqlite;

pub use sqlite::{SqliteQueue, create_statement, insert_statement, scan, sqlite_type};
