//! Namespace Record Types
//!
//! The canonical file record (`Entry`) and the per-block placement record
//! (`BlockMetadata`) stored by the namespace, plus the file status enum.
//!
//! Records are persisted as JSON. Field names are part of the on-disk
//! format; unknown fields are ignored on read so that old hosts can read
//! records written by newer ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a file entry.
///
/// Stored as its integer value. `Unknown` is the zero value for entries
/// written without an explicit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum FileStatus {
    Unknown,
    UnderConstruction,
    Ok,
    PendingDelete,
}

impl Default for FileStatus {
    fn default() -> Self {
        FileStatus::Unknown
    }
}

impl From<FileStatus> for u8 {
    fn from(status: FileStatus) -> u8 {
        match status {
            FileStatus::Unknown => 0,
            FileStatus::UnderConstruction => 1,
            FileStatus::Ok => 2,
            FileStatus::PendingDelete => 3,
        }
    }
}

impl TryFrom<u8> for FileStatus {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(FileStatus::Unknown),
            1 => Ok(FileStatus::UnderConstruction),
            2 => Ok(FileStatus::Ok),
            3 => Ok(FileStatus::PendingDelete),
            other => Err(format!("invalid file status {}", other)),
        }
    }
}

/// A block placement record.
///
/// Owned by its parent [`Entry`]; a secondary copy is kept under the
/// BlockAssignment table keyed by block id. `lv_name` always equals the
/// parent entry's `volume_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMetadata {
    /// Globally unique block id.
    pub block: String,
    /// Logical volume this block belongs to.
    pub lv_name: String,
    /// Physical volume holding the authoritative replica.
    pub pv_id: String,
}

/// The canonical file record.
///
/// `path` is the unique key within a namespace shard. `blocks` holds the
/// file's content in block order. `permissions` is opaque mode bits, stored
/// and returned verbatim; the namespace never interprets them. Timestamps
/// are supplied by callers, never stamped here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub volume_name: String,
    pub path: String,
    pub blocks: Vec<BlockMetadata>,
    pub permissions: u8,
    pub status: FileStatus,
    pub block_size: u64,
    pub size: u64,
    pub replication_level: u32,
    pub ctime: DateTime<Utc>,
    pub mtime: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_entry() -> Entry {
        Entry {
            volume_name: "/".to_string(),
            path: "/a.txt".to_string(),
            blocks: vec![
                BlockMetadata {
                    block: "1".to_string(),
                    lv_name: "/".to_string(),
                    pv_id: "1".to_string(),
                },
                BlockMetadata {
                    block: "2".to_string(),
                    lv_name: "/".to_string(),
                    pv_id: "1".to_string(),
                },
            ],
            permissions: 0o644,
            status: FileStatus::Ok,
            block_size: 1024,
            size: 2048,
            replication_level: 3,
            ctime: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            mtime: Utc.timestamp_opt(1714564800, 123_456_789).unwrap(),
        }
    }

    #[test]
    fn entry_round_trips_through_json() {
        let entry = sample_entry();
        let json = serde_json::to_string(&entry).unwrap();
        let back: Entry = serde_json::from_str(&json).unwrap();
        assert_eq!(entry, back);
    }

    #[test]
    fn timestamps_keep_nanosecond_resolution() {
        let entry = sample_entry();
        let json = serde_json::to_string(&entry).unwrap();
        let back: Entry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.mtime.timestamp_subsec_nanos(), 123_456_789);
    }

    #[test]
    fn status_encodes_as_integer() {
        let json = serde_json::to_string(&FileStatus::Ok).unwrap();
        assert_eq!(json, "2");
        let back: FileStatus = serde_json::from_str("1").unwrap();
        assert_eq!(back, FileStatus::UnderConstruction);
        assert!(serde_json::from_str::<FileStatus>("9").is_err());
    }

    #[test]
    fn unknown_fields_are_ignored_on_read() {
        let mut value = serde_json::to_value(sample_entry()).unwrap();
        value
            .as_object_mut()
            .unwrap()
            .insert("erasure_coding".to_string(), serde_json::json!("rs-6-3"));
        let back: Entry = serde_json::from_value(value).unwrap();
        assert_eq!(back.path, "/a.txt");
    }
}
