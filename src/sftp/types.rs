//! SFTP data types

use std::cmp::Ordering;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// File type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    File,
    Directory,
}

impl FileType {
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }
}

/// Attributes as reported by the protocol, before any unit conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMetadata {
    pub file_type: FileType,
    pub size: u64,
    /// Last modification, protocol-native seconds since the epoch
    pub mtime_secs: u32,
    pub permissions: u32,
    pub uid: u32,
    pub gid: u32,
}

impl RemoteMetadata {
    pub fn is_dir(&self) -> bool {
        self.file_type.is_dir()
    }
}

/// One raw directory record returned by `read_dir`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub name: String,
    pub metadata: RemoteMetadata,
}

/// File entry information returned by `list_files`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// File name (not full path)
    pub name: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    /// File size in bytes
    pub size: u64,
    /// Last modified time (Unix timestamp, milliseconds)
    pub modified: i64,
    /// Permission bits (mode & 0o7777)
    pub permissions: u32,
    /// Owner uid
    pub owner: u32,
    /// Group gid
    pub group: u32,
}

impl FileEntry {
    /// Build an entry from protocol attributes. Seconds become milliseconds here.
    pub fn from_metadata(name: impl Into<String>, metadata: &RemoteMetadata) -> Self {
        Self {
            name: name.into(),
            file_type: metadata.file_type,
            size: metadata.size,
            modified: i64::from(metadata.mtime_secs) * 1000,
            permissions: metadata.permissions & 0o7777,
            owner: metadata.uid,
            group: metadata.gid,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.file_type.is_dir()
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.modified).single()
    }

    /// Permission bits as an octal string, e.g. "755"
    pub fn permissions_octal(&self) -> String {
        format!("{:o}", self.permissions & 0o777)
    }
}

/// Directories first, then byte-wise lexicographic by name
pub fn listing_order(a: &FileEntry, b: &FileEntry) -> Ordering {
    b.is_dir()
        .cmp(&a.is_dir())
        .then_with(|| a.name.cmp(&b.name))
}

/// Sort entries in listing order
pub fn sort_entries(entries: &mut [FileEntry]) {
    entries.sort_by(listing_order);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, file_type: FileType) -> FileEntry {
        FileEntry {
            name: name.to_string(),
            file_type,
            size: 0,
            modified: 0,
            permissions: 0o644,
            owner: 0,
            group: 0,
        }
    }

    #[test]
    fn test_sort_directories_first_then_name() {
        let mut entries = vec![
            entry("z.txt", FileType::File),
            entry("b", FileType::Directory),
            entry("a.txt", FileType::File),
            entry("Zeta", FileType::Directory),
            entry("alpha", FileType::Directory),
        ];
        sort_entries(&mut entries);
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Zeta", "alpha", "b", "a.txt", "z.txt"]);
    }

    #[test]
    fn test_seconds_converted_to_millis() {
        let meta = RemoteMetadata {
            file_type: FileType::File,
            size: 42,
            mtime_secs: 1_700_000_000,
            permissions: 0o100644,
            uid: 1000,
            gid: 100,
        };
        let entry = FileEntry::from_metadata("report.pdf", &meta);
        assert_eq!(entry.modified, 1_700_000_000_000);
        assert_eq!(entry.permissions, 0o644);
        assert_eq!(entry.permissions_octal(), "644");
        assert_eq!(
            entry.modified_at().map(|t| t.timestamp()),
            Some(1_700_000_000)
        );
    }

    #[test]
    fn test_entry_serializes_type_field() {
        let json = serde_json::to_value(entry("b", FileType::Directory)).unwrap();
        assert_eq!(json["type"], "directory");
        assert_eq!(json["name"], "b");
    }
}
