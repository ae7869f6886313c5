//! Database schema definitions
//!
//! Applied once, inside a single transaction, when the store opens a fresh
//! database file.

/// SQL to create the folder table
pub const CREATE_FOLDER_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS folder (
    id INTEGER PRIMARY KEY,
    path TEXT UNIQUE NOT NULL,
    last_scan INTEGER NOT NULL DEFAULT 0
) STRICT
"#;

/// SQL to create the file table
/// Rows go away with their folder (ON DELETE CASCADE)
pub const CREATE_FILE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS file (
    id INTEGER PRIMARY KEY,
    folder_id INTEGER NOT NULL,
    path TEXT UNIQUE NOT NULL,
    mime_type TEXT NOT NULL,
    stime INTEGER NOT NULL DEFAULT 0,
    size INTEGER NOT NULL,
    content TEXT,
    CHECK (size >= 0),
    FOREIGN KEY (folder_id) REFERENCES folder (id)
        ON UPDATE RESTRICT
        ON DELETE CASCADE
) STRICT
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS folder_path_idx ON folder (path)",
    "CREATE INDEX IF NOT EXISTS file_folder_idx ON file (folder_id)",
    "CREATE INDEX IF NOT EXISTS file_path_idx ON file (path)",
    "CREATE INDEX IF NOT EXISTS file_stime_idx ON file (stime)",
    "CREATE INDEX IF NOT EXISTS file_mime_idx ON file (mime_type)",
];

/// All schema creation statements, tables before indexes
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![CREATE_FOLDER_TABLE, CREATE_FILE_TABLE];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn apply(conn: &Connection) {
        for stmt in all_schema_statements() {
            conn.execute(stmt, []).unwrap();
        }
    }

    #[test]
    fn test_schema_applies_twice() {
        let conn = Connection::open_in_memory().unwrap();
        apply(&conn);
        apply(&conn);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('folder', 'file')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 2);
    }

    #[test]
    fn test_all_indexes_created() {
        let conn = Connection::open_in_memory().unwrap();
        apply(&conn);

        let indexes: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name LIKE '%_idx'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(indexes as usize, CREATE_INDEXES.len());
    }

    #[test]
    fn test_size_check_enforced() {
        let conn = Connection::open_in_memory().unwrap();
        apply(&conn);
        conn.execute("INSERT INTO folder (path) VALUES ('/a')", []).unwrap();

        let result = conn.execute(
            "INSERT INTO file (folder_id, path, mime_type, size) VALUES (1, '/a/x', 'text/plain', -1)",
            [],
        );
        assert!(result.is_err());
    }
}
