//! Backup Descriptor
//!
//! The manifest written once at the end of a successful import. It
//! enumerates every SST segment (path, key span, SHA-512), embeds the
//! table schema together with a synthetic database descriptor, and records
//! the pipeline wall time so a restore can reconstruct exactly what was
//! written.
//!
//! The descriptor is serialized as a single versioned JSON object under
//! the well-known object name [`BACKUP_DESCRIPTOR_NAME`] in the
//! destination store.

use serde::{Deserialize, Serialize};

use crate::record::KeySpan;
use crate::schema::{DatabaseDescriptor, TableDescriptor};

/// Well-known object name the descriptor is written under.
pub const BACKUP_DESCRIPTOR_NAME: &str = "BACKUP";

/// Current descriptor format version.
pub const BACKUP_FORMAT_VERSION: u32 = 1;

/// One SST segment entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupFile {
    /// Object name relative to the backup root, e.g. `3.sst`.
    pub path: String,

    /// Keys covered by this segment.
    pub span: KeySpan,

    /// SHA-512 of the segment bytes.
    pub sha512: Vec<u8>,
}

/// Row and byte counts accumulated across the backup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryCounts {
    pub data_size: u64,
    pub rows: u64,
    pub index_entries: u64,
    pub system_records: u64,
}

/// A schema object embedded in the backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObjectDescriptor {
    Database(DatabaseDescriptor),
    Table(TableDescriptor),
}

/// The backup manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupDescriptor {
    /// Format version, bumped on incompatible layout changes.
    pub format_version: u32,

    /// Pipeline wall time in nanoseconds since the Unix epoch. Every KV in
    /// every segment carries this timestamp.
    pub end_time_nanos: i64,

    /// Segment entries, sorted by span start then end.
    pub files: Vec<BackupFile>,

    /// Spans covered by the backup as a whole.
    pub spans: Vec<KeySpan>,

    /// Embedded schema: the synthetic database plus the table.
    pub descriptors: Vec<ObjectDescriptor>,

    pub entry_counts: EntryCounts,

    /// Version string of the binary that produced the backup.
    pub build_info: String,

    /// Node that ran the finalizer, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<u32>,

    /// Cluster the backup was produced on, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
}

impl BackupDescriptor {
    /// An empty descriptor stamped with the pipeline wall time.
    pub fn new(end_time_nanos: i64) -> Self {
        Self {
            format_version: BACKUP_FORMAT_VERSION,
            end_time_nanos,
            files: Vec::new(),
            spans: Vec::new(),
            descriptors: Vec::new(),
            entry_counts: EntryCounts::default(),
            build_info: String::new(),
            node_id: None,
            cluster_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn sample_file(path: &str, start: &'static [u8], end: &'static [u8]) -> BackupFile {
        BackupFile {
            path: path.to_string(),
            span: KeySpan::new(Bytes::from_static(start), Bytes::from_static(end)),
            sha512: vec![0xab; 64],
        }
    }

    #[test]
    fn test_new_descriptor_is_empty() {
        let desc = BackupDescriptor::new(1_700_000_000_000_000_000);
        assert_eq!(desc.format_version, BACKUP_FORMAT_VERSION);
        assert_eq!(desc.end_time_nanos, 1_700_000_000_000_000_000);
        assert!(desc.files.is_empty());
        assert_eq!(desc.entry_counts, EntryCounts::default());
        assert!(desc.node_id.is_none());
    }

    #[test]
    fn test_descriptor_serde_roundtrip() {
        let mut desc = BackupDescriptor::new(42);
        desc.files.push(sample_file("1.sst", b"a", b"b"));
        desc.files.push(sample_file("2.sst", b"b", b"c"));
        desc.entry_counts.data_size = 1024;
        desc.entry_counts.rows = 10;
        desc.build_info = "bulkload 0.1.0".to_string();
        desc.node_id = Some(3);

        let json = serde_json::to_string(&desc).expect("serialize");
        let back: BackupDescriptor = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(desc, back);
    }

    #[test]
    fn test_optional_ids_omitted_from_json() {
        let desc = BackupDescriptor::new(1);
        let json = serde_json::to_string(&desc).expect("serialize");
        assert!(!json.contains("node_id"));
        assert!(!json.contains("cluster_id"));
    }

    #[test]
    fn test_files_sort_by_span() {
        let mut files = vec![
            sample_file("2.sst", b"m", b"z"),
            sample_file("1.sst", b"a", b"m"),
        ];
        files.sort_by(|a, b| a.span.cmp(&b.span));
        assert_eq!(files[0].path, "1.sst");
        assert_eq!(files[1].path, "2.sst");
    }
}
