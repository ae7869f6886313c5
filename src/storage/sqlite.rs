//! SQLite storage implementation

use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{
    params, CachedStatement, Connection, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use tracing::{debug, warn, Span};

use super::query::Query;
use super::schema;
use crate::config::AppPaths;
use crate::model::{self, File, Folder};
use crate::{Error, Result};

/// Serializes open-and-initialize across the whole process
static OPEN_LOCK: Mutex<()> = Mutex::new(());

/// Housekeeping run by `perform_maintenance`, in order
const MAINTENANCE: &[&str] = &["VACUUM", "REINDEX", "ANALYZE"];

/// SQLite-backed store for folders and files
pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
    span: Span,
    /// Number of currently open savepoints
    savepoints: Cell<u32>,
}

impl SqliteStore {
    /// Open a database file, creating and initializing it if it doesn't exist
    pub fn open(path: &Path) -> Result<Self> {
        let span = tracing::debug_span!("database", path = %path.display());
        let conn = span.in_scope(|| -> Result<Connection> {
            debug!("Open database");
            let _guard = OPEN_LOCK.lock().unwrap_or_else(PoisonError::into_inner);

            let fresh = is_fresh(path);
            let conn = Connection::open(path)?;
            configure(&conn)?;

            if fresh {
                if let Err(e) = initialize_schema(&conn) {
                    drop(conn);
                    if let Err(rm) = std::fs::remove_file(path) {
                        warn!("Failed to remove half-initialized database: {}", rm);
                    }
                    return Err(e);
                }
            }
            Ok(conn)
        })?;

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
            span,
            savepoints: Cell::new(0),
        })
    }

    /// Open `<base>/snoopy.db`, creating the base directory as needed
    pub fn open_in(paths: &AppPaths) -> Result<Self> {
        paths.ensure()?;
        Self::open(&paths.db())
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let span = tracing::debug_span!("database", path = ":memory:");
        let conn = span.in_scope(|| -> Result<Connection> {
            let conn = Connection::open_in_memory()?;
            configure(&conn)?;
            initialize_schema(&conn)?;
            Ok(conn)
        })?;

        Ok(Self {
            conn,
            path: None,
            span,
            savepoints: Cell::new(0),
        })
    }

    /// Location of the database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The underlying connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn statement(&self, query: Query) -> Result<CachedStatement<'_>> {
        Ok(self.conn.prepare_cached(query.sql())?)
    }

    // ========== Transactions ==========

    /// Run `f` inside a transaction.
    ///
    /// The transaction is started with `BEGIN IMMEDIATE`, so the write lock is
    /// taken up front and a competing writer waits on the busy handler here
    /// rather than failing halfway through `f`.
    ///
    /// Commits when `f` returns `Ok`, rolls back when it returns `Err` or
    /// panics. Entities mutated by a rolled back closure keep their
    /// in-memory changes and should be discarded by the caller. Only one
    /// transaction can be open at a time; use `savepoint` for nested units.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        if !self.conn.is_autocommit() {
            return Err(Error::TransactionInProgress);
        }

        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        match f(self) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                debug!(parent: &self.span, "Rolling back transaction: {}", e);
                if let Err(rb) = tx.rollback() {
                    warn!(parent: &self.span, "Rollback failed: {}", rb);
                }
                Err(e)
            }
        }
    }

    /// Run `f` inside a savepoint.
    ///
    /// Same contract as `transaction`, but savepoints nest: inside a
    /// transaction a failing `f` undoes only its own writes and the
    /// enclosing transaction carries on. Outside a transaction a savepoint
    /// behaves like one.
    pub fn savepoint<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        let sp = Savepoint::begin(&self.conn, &self.savepoints)?;
        debug!(parent: &self.span, "Savepoint {} started", sp.name);
        match f(self) {
            Ok(value) => {
                sp.release()?;
                Ok(value)
            }
            Err(e) => {
                debug!(parent: &self.span, "Rolling back savepoint {}: {}", sp.name, e);
                if let Err(rb) = sp.rollback() {
                    warn!(parent: &self.span, "Savepoint rollback failed: {}", rb);
                }
                Err(e)
            }
        }
    }

    // ========== Maintenance ==========

    /// Checkpoint and truncate the write-ahead log, then VACUUM, REINDEX and
    /// ANALYZE the database.
    ///
    /// Fails with `TransactionInProgress` inside a transaction or savepoint.
    /// Every step is attempted; failed steps are logged and the first
    /// failure is returned.
    pub fn perform_maintenance(&self) -> Result<()> {
        if !self.conn.is_autocommit() {
            return Err(Error::TransactionInProgress);
        }

        let mut first_error = None;

        match self.conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?))
        }) {
            Ok((busy, log, checkpointed)) => debug!(
                parent: &self.span,
                "WAL checkpoint (busy = {}, log = {}, checkpointed = {})",
                busy, log, checkpointed
            ),
            Err(e) => {
                warn!(parent: &self.span, "WAL checkpoint failed: {}", e);
                first_error = first_error.or(Some(e));
            }
        }

        for stmt in MAINTENANCE {
            match self.conn.execute_batch(stmt) {
                Ok(()) => debug!(parent: &self.span, "{} done", stmt),
                Err(e) => {
                    warn!(parent: &self.span, "{} failed: {}", stmt, e);
                    first_error = first_error.or(Some(e));
                }
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    // ========== Folder Operations ==========

    /// Add a new folder; sets `folder.id` and `folder.last_scan` from the stored row
    pub fn folder_add(&self, folder: &mut Folder) -> Result<()> {
        if folder.path.is_empty() {
            return Err(Error::InvalidInput("folder path is empty".to_string()));
        }
        if folder.is_persisted() {
            return Err(Error::InvalidInput(format!(
                "folder {} is already stored with id {}",
                folder.path, folder.id
            )));
        }

        let (id, last_scan) = self
            .statement(Query::FolderAdd)?
            .query_row([&folder.path], |row| {
                Ok((row.get::<_, i64>("id")?, timestamp(row, "last_scan")?))
            })?;

        folder.id = id;
        folder.last_scan = last_scan;
        debug!(parent: &self.span, "Added folder {} ({})", folder.path, folder.id);
        Ok(())
    }

    /// Record a completed scan of `folder`.
    ///
    /// `last_scan` only moves forward: an older `stamp` leaves the stored
    /// value alone, and `folder.last_scan` is set to whatever is stored.
    pub fn folder_update_scan(&self, folder: &mut Folder, stamp: DateTime<Utc>) -> Result<()> {
        require_persisted("folder", folder.id)?;

        let stored = self
            .statement(Query::FolderUpdateScan)?
            .query_row(params![model::to_unix(stamp), folder.id], |row| {
                timestamp(row, "last_scan")
            })
            .optional()?;

        let Some(last_scan) = stored else {
            return Err(Error::FolderNotFound(folder.id));
        };

        if last_scan != model::truncate_to_seconds(stamp) {
            debug!(
                parent: &self.span,
                "Ignoring scan time {} for {}, already at {}", stamp, folder.path, last_scan
            );
        }
        folder.last_scan = last_scan;
        Ok(())
    }

    /// Load all folders, ordered by path
    pub fn folder_get_all(&self) -> Result<Vec<Folder>> {
        let mut stmt = self.statement(Query::FolderGetAll)?;
        let folders = stmt
            .query_map([], row_to_folder)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(folders)
    }

    /// Look up a folder by its path
    pub fn folder_get_by_path(&self, path: &str) -> Result<Option<Folder>> {
        let folder = self
            .statement(Query::FolderGetByPath)?
            .query_row([path], row_to_folder)
            .optional()?;

        if folder.is_none() {
            debug!(parent: &self.span, "Folder \"{}\" was not found in database", path);
        }
        Ok(folder)
    }

    /// Look up a folder by its id
    pub fn folder_get_by_id(&self, id: i64) -> Result<Option<Folder>> {
        let folder = self
            .statement(Query::FolderGetById)?
            .query_row([id], row_to_folder)
            .optional()?;

        if folder.is_none() {
            debug!(parent: &self.span, "Folder #{} was not found in database", id);
        }
        Ok(folder)
    }

    /// Delete a folder. Its files are removed by the engine (ON DELETE CASCADE).
    pub fn folder_delete(&self, folder: &Folder) -> Result<()> {
        require_persisted("folder", folder.id)?;

        let removed = self.statement(Query::FolderDelete)?.execute([folder.id])?;
        if removed == 0 {
            debug!(parent: &self.span, "Folder #{} was already gone", folder.id);
        } else {
            debug!(parent: &self.span, "Deleted folder {} ({})", folder.path, folder.id);
        }
        Ok(())
    }

    // ========== File Operations ==========

    /// Add a file; sets `file.id`
    pub fn file_add(&self, file: &mut File) -> Result<()> {
        if file.folder_id <= 0 {
            return Err(Error::InvalidInput(format!(
                "file {} has no folder (folder_id = {})",
                file.path, file.folder_id
            )));
        }
        if file.path.is_empty() {
            return Err(Error::InvalidInput("file path is empty".to_string()));
        }
        if file.mime_type.is_empty() {
            return Err(Error::InvalidInput(format!("file {} has an empty mime type", file.path)));
        }
        if file.is_persisted() {
            return Err(Error::InvalidInput(format!(
                "file {} is already stored with id {}",
                file.path, file.id
            )));
        }

        let id: i64 = self.statement(Query::FileAdd)?.query_row(
            params![
                file.folder_id,
                file.path,
                file.mime_type,
                model::to_unix(file.stime),
                file.size,
                file.content,
            ],
            |row| row.get("id"),
        )?;

        file.id = id;
        file.stime = model::truncate_to_seconds(file.stime);
        debug!(parent: &self.span, "Added file {} ({})", file.path, file.id);
        Ok(())
    }

    /// Refresh a file seen again during a scan; updates the row and `file`
    pub fn file_update(
        &self,
        file: &mut File,
        stime: DateTime<Utc>,
        size: i64,
        content: Option<String>,
    ) -> Result<()> {
        require_persisted("file", file.id)?;

        let changed = self.statement(Query::FileUpdate)?.execute(params![
            model::to_unix(stime),
            size,
            content,
            file.id,
        ])?;
        if changed == 0 {
            return Err(Error::FileNotFound(file.id));
        }

        file.stime = model::truncate_to_seconds(stime);
        file.size = size;
        file.content = content;
        Ok(())
    }

    /// Delete a file that a scan no longer observes
    pub fn file_delete(&self, file: &File) -> Result<()> {
        require_persisted("file", file.id)?;

        let removed = self.statement(Query::FileDelete)?.execute([file.id])?;
        if removed == 0 {
            debug!(parent: &self.span, "File #{} was already gone", file.id);
        } else {
            debug!(parent: &self.span, "Deleted file {} ({})", file.path, file.id);
        }
        Ok(())
    }

    /// All files of a folder, ordered by path
    pub fn file_get_by_root(&self, folder: &Folder) -> Result<Vec<File>> {
        let mut stmt = self.statement(Query::FileGetByRoot)?;
        let files = stmt
            .query_map([folder.id], row_to_file)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(files)
    }

    /// Look up a file by its path
    pub fn file_get_by_path(&self, path: &str) -> Result<Option<File>> {
        let file = self
            .statement(Query::FileGetByPath)?
            .query_row([path], row_to_file)
            .optional()?;

        if file.is_none() {
            debug!(parent: &self.span, "File \"{}\" was not found in database", path);
        }
        Ok(file)
    }

    /// Look up a file by its id
    pub fn file_get_by_id(&self, id: i64) -> Result<Option<File>> {
        let file = self
            .statement(Query::FileGetById)?
            .query_row([id], row_to_file)
            .optional()?;

        if file.is_none() {
            debug!(parent: &self.span, "File #{} was not found in database", id);
        }
        Ok(file)
    }

    /// All files of all folders, ordered by path
    pub fn file_get_all(&self) -> Result<Vec<File>> {
        let mut stmt = self.statement(Query::FileGetAll)?;
        let files = stmt
            .query_map([], row_to_file)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(files)
    }

    /// Files of `folder` whose scan time is older than `before`.
    ///
    /// After a pass that refreshed every observed file with the pass's
    /// timestamp, these are the files that were not seen again.
    pub fn file_get_stale(&self, folder: &Folder, before: DateTime<Utc>) -> Result<Vec<File>> {
        let mut stmt = self.statement(Query::FileGetStale)?;
        let files = stmt
            .query_map(params![folder.id, model::to_unix(before)], row_to_file)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(files)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        let stats = self.statement(Query::Stats)?.query_row([], |row| {
            Ok(DbStats {
                folders: row.get::<_, i64>("folders")? as usize,
                files: row.get::<_, i64>("files")? as usize,
                total_bytes: row.get::<_, i64>("total_bytes")? as u64,
            })
        })?;
        Ok(stats)
    }
}

/// An open `SAVEPOINT`, rolled back and released on drop unless finished
struct Savepoint<'a> {
    conn: &'a Connection,
    depth: &'a Cell<u32>,
    name: String,
    finished: bool,
}

impl<'a> Savepoint<'a> {
    fn begin(conn: &'a Connection, depth: &'a Cell<u32>) -> Result<Self> {
        let level = depth.get() + 1;
        let name = format!("snoopy_sp{}", level);
        conn.execute_batch(&format!("SAVEPOINT {}", name))?;
        depth.set(level);
        Ok(Self {
            conn,
            depth,
            name,
            finished: false,
        })
    }

    fn release(mut self) -> Result<()> {
        self.conn.execute_batch(&format!("RELEASE {}", self.name))?;
        self.finished = true;
        Ok(())
    }

    fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.conn
            .execute_batch(&format!("ROLLBACK TO {0}; RELEASE {0}", self.name))?;
        Ok(())
    }
}

impl Drop for Savepoint<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
        if !self.finished {
            let sql = format!("ROLLBACK TO {0}; RELEASE {0}", self.name);
            if let Err(e) = self.conn.execute_batch(&sql) {
                warn!("Failed to roll back savepoint {}: {}", self.name, e);
            }
        }
    }
}

/// A file that doesn't exist yet, or is empty, has never been initialized
fn is_fresh(path: &Path) -> bool {
    std::fs::metadata(path).map_or(true, |meta| meta.len() == 0)
}

fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    debug!("SQLite configured (journal_mode = {}, foreign_keys = on)", mode);
    Ok(())
}

/// Run all schema statements as one transaction
fn initialize_schema(conn: &Connection) -> Result<()> {
    debug!("Initialize fresh database");
    let tx = conn.unchecked_transaction()?;
    for stmt in schema::all_schema_statements() {
        tx.execute(stmt, [])?;
    }
    tx.commit()?;
    debug!("Database initialized successfully");
    Ok(())
}

fn require_persisted(what: &str, id: i64) -> Result<()> {
    if id == 0 {
        return Err(Error::InvalidInput(format!("{} has not been stored yet", what)));
    }
    Ok(())
}

/// Read an integer column holding Unix seconds
fn timestamp(row: &Row, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let secs: i64 = row.get(column)?;
    model::from_unix(secs).ok_or_else(|| {
        let idx = row.as_ref().column_index(column).unwrap_or_default();
        rusqlite::Error::IntegralValueOutOfRange(idx, secs)
    })
}

fn row_to_folder(row: &Row) -> rusqlite::Result<Folder> {
    Ok(Folder {
        id: row.get("id")?,
        path: row.get("path")?,
        last_scan: timestamp(row, "last_scan")?,
    })
}

fn row_to_file(row: &Row) -> rusqlite::Result<File> {
    Ok(File {
        id: row.get("id")?,
        folder_id: row.get("folder_id")?,
        path: row.get("path")?,
        mime_type: row.get("mime_type")?,
        stime: timestamp(row, "stime")?,
        size: row.get("size")?,
        content: row.get("content")?,
    })
}

/// Database statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbStats {
    pub folders: usize,
    pub files: usize,
    pub total_bytes: u64,
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  Folders: {}", self.folders)?;
        writeln!(f, "  Files: {}", self.files)?;
        writeln!(f, "  Total bytes: {}", self.total_bytes)
    }
}
