//! # Snoopy - metadata store for a file-system indexer
//!
//! Snoopy keeps track of watched directories ("folders") and the files found
//! inside them across repeated scan passes.
//!
//! Snoopy provides:
//! - An entity model for folders and files (`model`)
//! - A SQLite schema and a fixed catalog of parameterized statements (`storage`)
//! - `SqliteStore`, the typed store the crawler talks to
//! - Explicit application paths, TOML configuration and tracing setup

pub mod model;
pub mod storage;
pub mod config;
pub mod logging;

// Re-exports for convenient access
pub use model::{File, Folder};
pub use storage::{DbStats, SqliteStore};
pub use config::{AppPaths, SnoopyConfig};

/// Application name, used for the names of the files under the base directory
pub const APP_NAME: &str = "snoopy";

/// Result type alias for Snoopy operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Snoopy operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Constraint violation ({kind}): {message}")]
    Constraint {
        kind: ConstraintKind,
        message: String,
    },

    #[error("Storage error: {0}")]
    Storage(#[source] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Folder not found: {0}")]
    FolderNotFound(i64),

    #[error("File not found: {0}")]
    FileNotFound(i64),

    #[error("A transaction is already in progress")]
    TransactionInProgress,
}

impl Error {
    /// True if this is a constraint violation of the given kind
    pub fn is_constraint(&self, kind: ConstraintKind) -> bool {
        matches!(self, Error::Constraint { kind: k, .. } if *k == kind)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref failure, ref message)
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Error::Constraint {
                    kind: ConstraintKind::from_extended_code(failure.extended_code),
                    message: message.clone().unwrap_or_else(|| failure.to_string()),
                }
            }
            other => Error::Storage(other),
        }
    }
}

/// Which engine constraint rejected a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    Check,
    ForeignKey,
    NotNull,
    PrimaryKey,
    Other,
}

impl ConstraintKind {
    fn from_extended_code(code: std::os::raw::c_int) -> Self {
        use rusqlite::ffi;

        match code {
            ffi::SQLITE_CONSTRAINT_UNIQUE => ConstraintKind::Unique,
            ffi::SQLITE_CONSTRAINT_CHECK => ConstraintKind::Check,
            ffi::SQLITE_CONSTRAINT_FOREIGNKEY => ConstraintKind::ForeignKey,
            ffi::SQLITE_CONSTRAINT_NOTNULL => ConstraintKind::NotNull,
            ffi::SQLITE_CONSTRAINT_PRIMARYKEY => ConstraintKind::PrimaryKey,
            _ => ConstraintKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintKind::Unique => "unique",
            ConstraintKind::Check => "check",
            ConstraintKind::ForeignKey => "foreign key",
            ConstraintKind::NotNull => "not null",
            ConstraintKind::PrimaryKey => "primary key",
            ConstraintKind::Other => "other",
        }
    }
}

impl std::fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
