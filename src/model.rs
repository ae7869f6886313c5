//! Entity model - folders under management and the files found inside them
//!
//! - `Folder`: a directory registered for scanning
//! - `File`: a filesystem entry observed inside exactly one folder
//!
//! An `id` of `0` means the entity has not been persisted yet. Timestamps are
//! stored as whole Unix seconds, so values written back by the store carry no
//! sub-second part.

use chrono::{DateTime, Timelike, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Media type recorded for files whose type is unknown
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

static SUFFIX_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.](\w+)$").expect("suffix pattern is valid"));

/// The "never" timestamp: the Unix epoch
pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

/// Convert a timestamp to the integer representation used in the database
pub fn to_unix(ts: DateTime<Utc>) -> i64 {
    ts.timestamp()
}

/// Convert a stored integer back into a timestamp
pub fn from_unix(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

/// Drop the sub-second part, matching what the database keeps
pub fn truncate_to_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_nanosecond(0).unwrap_or(ts)
}

/// A directory that is scanned for files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    /// Database identity, 0 until persisted
    pub id: i64,
    /// Absolute path of the directory, unique across all folders
    pub path: String,
    /// Completion time of the most recent scan (epoch if never scanned)
    pub last_scan: DateTime<Utc>,
}

impl Folder {
    /// Create a folder that has not been stored yet
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            id: 0,
            path: path.into(),
            last_scan: epoch(),
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id != 0
    }

    /// True if no scan of this folder has ever completed
    pub fn never_scanned(&self) -> bool {
        self.last_scan == epoch()
    }
}

/// A file discovered under a folder during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    /// Database identity, 0 until persisted
    pub id: i64,
    /// Identity of the owning folder
    pub folder_id: i64,
    /// Absolute path, unique across all files
    pub path: String,
    /// Media type as supplied by the crawler
    pub mime_type: String,
    /// Time of the scan that last observed this file
    pub stime: DateTime<Utc>,
    /// Size in bytes (never negative once stored)
    pub size: i64,
    /// Textual snapshot of the content, absent for binary files
    pub content: Option<String>,
}

impl File {
    /// Create a file belonging to `folder_id` with the default media type
    pub fn new(folder_id: i64, path: impl Into<String>, size: i64) -> Self {
        Self {
            id: 0,
            folder_id,
            path: path.into(),
            mime_type: DEFAULT_MIME_TYPE.to_string(),
            stime: epoch(),
            size,
            content: None,
        }
    }

    /// Set the media type
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// Set the content snapshot
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Set the scan timestamp
    pub fn with_stime(mut self, stime: DateTime<Utc>) -> Self {
        self.stime = stime;
        self
    }

    pub fn is_persisted(&self) -> bool {
        self.id != 0
    }

    /// The file name extension: the (Unicode) word characters after the
    /// last `.`, or an empty string if the path has none.
    pub fn suffix(&self) -> &str {
        SUFFIX_PATTERN
            .captures(&self.path)
            .and_then(|caps| caps.get(1))
            .map_or("", |m| m.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_defaults() {
        let folder = Folder::new("/data/docs");
        assert_eq!(folder.id, 0);
        assert!(!folder.is_persisted());
        assert!(folder.never_scanned());
        assert_eq!(to_unix(folder.last_scan), 0);
    }

    #[test]
    fn test_file_defaults() {
        let file = File::new(3, "/data/docs/a.txt", 12);
        assert_eq!(file.folder_id, 3);
        assert_eq!(file.mime_type, DEFAULT_MIME_TYPE);
        assert_eq!(file.stime, epoch());
        assert!(file.content.is_none());
        assert!(!file.is_persisted());
    }

    #[test]
    fn test_file_builders() {
        let stamp = from_unix(1_700_000_000).unwrap();
        let file = File::new(1, "/x/notes.md", 5)
            .with_mime_type("text/markdown")
            .with_content("# hi")
            .with_stime(stamp);

        assert_eq!(file.mime_type, "text/markdown");
        assert_eq!(file.content.as_deref(), Some("# hi"));
        assert_eq!(file.stime, stamp);
    }

    #[test]
    fn test_suffix() {
        let suffix = |p: &str| File::new(1, p, 0).suffix().to_string();

        assert_eq!(suffix("/data/report.pdf"), "pdf");
        assert_eq!(suffix("/data/archive.tar.gz"), "gz");
        assert_eq!(suffix("/home/me/.bashrc"), "bashrc");
        assert_eq!(suffix("/data/README"), "");
        assert_eq!(suffix("/data/v1.2/README"), "");
        assert_eq!(suffix("/data/trailing."), "");
        assert_eq!(suffix("/a/b.päd"), "päd");
        assert_eq!(suffix("/a/notiz.größe"), "größe");
    }

    #[test]
    fn test_timestamp_conversion() {
        let stamp = from_unix(1_700_000_123).unwrap();
        assert_eq!(to_unix(stamp), 1_700_000_123);

        let precise = stamp + chrono::Duration::milliseconds(750);
        assert_eq!(truncate_to_seconds(precise), stamp);
    }
}
