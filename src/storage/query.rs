//! Query catalog - every statement the store executes, in one place
//!
//! Each `Query` maps to exactly one parameterized statement. Statement text is
//! fixed at compile time; column lists are declared once per table and rows
//! are decoded by column name.

/// Columns selected for a folder row
macro_rules! folder_columns {
    () => {
        "id, path, last_scan"
    };
}

/// Columns selected for a file row
macro_rules! file_columns {
    () => {
        "id, folder_id, path, mime_type, stime, size, content"
    };
}

/// Identifies one statement of the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Query {
    FolderAdd,
    FolderUpdateScan,
    FolderGetAll,
    FolderGetByPath,
    FolderGetById,
    FolderDelete,
    FileAdd,
    FileUpdate,
    FileDelete,
    FileGetByRoot,
    FileGetByPath,
    FileGetById,
    FileGetAll,
    FileGetStale,
    Stats,
}

impl Query {
    /// Every query in the catalog
    pub const ALL: &'static [Query] = &[
        Query::FolderAdd,
        Query::FolderUpdateScan,
        Query::FolderGetAll,
        Query::FolderGetByPath,
        Query::FolderGetById,
        Query::FolderDelete,
        Query::FileAdd,
        Query::FileUpdate,
        Query::FileDelete,
        Query::FileGetByRoot,
        Query::FileGetByPath,
        Query::FileGetById,
        Query::FileGetAll,
        Query::FileGetStale,
        Query::Stats,
    ];

    /// The statement text for this query
    pub fn sql(&self) -> &'static str {
        match self {
            Query::FolderAdd => "INSERT INTO folder (path) VALUES (?1) RETURNING id, last_scan",
            // last_scan never moves backwards
            Query::FolderUpdateScan => {
                "UPDATE folder SET last_scan = MAX(last_scan, ?1) WHERE id = ?2 RETURNING last_scan"
            }
            Query::FolderGetAll => concat!("SELECT ", folder_columns!(), " FROM folder ORDER BY path"),
            Query::FolderGetByPath => concat!("SELECT ", folder_columns!(), " FROM folder WHERE path = ?1"),
            Query::FolderGetById => concat!("SELECT ", folder_columns!(), " FROM folder WHERE id = ?1"),
            Query::FolderDelete => "DELETE FROM folder WHERE id = ?1",
            Query::FileAdd => {
                "INSERT INTO file (folder_id, path, mime_type, stime, size, content) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) RETURNING id"
            }
            Query::FileUpdate => "UPDATE file SET stime = ?1, size = ?2, content = ?3 WHERE id = ?4",
            Query::FileDelete => "DELETE FROM file WHERE id = ?1",
            Query::FileGetByRoot => {
                concat!("SELECT ", file_columns!(), " FROM file WHERE folder_id = ?1 ORDER BY path")
            }
            Query::FileGetByPath => concat!("SELECT ", file_columns!(), " FROM file WHERE path = ?1"),
            Query::FileGetById => concat!("SELECT ", file_columns!(), " FROM file WHERE id = ?1"),
            Query::FileGetAll => concat!("SELECT ", file_columns!(), " FROM file ORDER BY path"),
            Query::FileGetStale => concat!(
                "SELECT ",
                file_columns!(),
                " FROM file WHERE folder_id = ?1 AND stime < ?2 ORDER BY path"
            ),
            Query::Stats => {
                "SELECT \
                 (SELECT COUNT(*) FROM folder) AS folders, \
                 (SELECT COUNT(*) FROM file) AS files, \
                 (SELECT COALESCE(SUM(size), 0) FROM file) AS total_bytes"
            }
        }
    }

    /// Short name used in log messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Query::FolderAdd => "folder_add",
            Query::FolderUpdateScan => "folder_update_scan",
            Query::FolderGetAll => "folder_get_all",
            Query::FolderGetByPath => "folder_get_by_path",
            Query::FolderGetById => "folder_get_by_id",
            Query::FolderDelete => "folder_delete",
            Query::FileAdd => "file_add",
            Query::FileUpdate => "file_update",
            Query::FileDelete => "file_delete",
            Query::FileGetByRoot => "file_get_by_root",
            Query::FileGetByPath => "file_get_by_path",
            Query::FileGetById => "file_get_by_id",
            Query::FileGetAll => "file_get_all",
            Query::FileGetStale => "file_get_stale",
            Query::Stats => "stats",
        }
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
