//! Storage Layer - SQLite-backed persistence
//!
//! System of record is a single SQLite file with tables:
//! - folder(id, path, last_scan)
//! - file(id, folder_id, path, mime_type, stime, size, content)
//!
//! Files belong to exactly one folder and are removed by the engine when
//! their folder is deleted.

pub mod schema;
pub mod query;
pub mod sqlite;

pub use query::Query;
pub use sqlite::{DbStats, SqliteStore};
