//! Finalizer Stage
//!
//! The only stage that touches the destination store. It uploads each
//! finished segment under a monotonic numeric name, checksums it with
//! SHA-512, and, once the segment stream closes, writes the backup
//! descriptor under the well-known name. A backup with zero segments is
//! an error; partial uploads are left where they are on failure, there is
//! no rollback of the destination.

use sha2::{Digest, Sha512};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use bulkload_core::descriptor::{ObjectDescriptor, BACKUP_FORMAT_VERSION};
use bulkload_core::{
    BackupDescriptor, BackupFile, DatabaseDescriptor, SstSegment, TableDescriptor,
    BACKUP_DESCRIPTOR_NAME,
};
use bulkload_storage::ExportStore;

use crate::error::{Error, Result};

/// Identity of the executor driving the finalizer, embedded in the
/// descriptor when known.
#[derive(Debug, Clone, Default)]
pub struct ExecutorInfo {
    pub node_id: Option<u32>,
    pub cluster_id: Option<String>,
}

/// Counts returned by the finalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupTotals {
    pub segments: u64,
    pub data_bytes: u64,
}

/// Drain the segment channel into the destination, then write the
/// descriptor. Returns the number of segments written.
pub async fn make_backup(
    dest: &ExportStore,
    mut seg_rx: mpsc::Receiver<SstSegment>,
    walltime_nanos: i64,
    table: &TableDescriptor,
    database: &DatabaseDescriptor,
    executor: &ExecutorInfo,
    token: CancellationToken,
) -> Result<BackupTotals> {
    let mut files = Vec::new();
    let mut data_bytes = 0u64;
    let mut index = 0u64;

    while let Some(segment) = seg_rx.recv().await {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        index += 1;
        let name = format!("{index}.sst");
        let sha512 = Sha512::digest(&segment.data).to_vec();
        data_bytes += segment.size;
        dest.put(&name, segment.data).await?;
        debug!(name, size = segment.size, "uploaded segment");
        files.push(BackupFile {
            path: name,
            span: segment.span,
            sha512,
        });
    }

    finalize_backup(dest, files, data_bytes, walltime_nanos, table, database, executor).await?;
    Ok(BackupTotals {
        segments: index,
        data_bytes,
    })
}

/// Assemble and write the descriptor from collected segment entries. The
/// distributed coordinator calls this directly with rows gathered from
/// its workers.
pub async fn finalize_backup(
    dest: &ExportStore,
    mut files: Vec<BackupFile>,
    data_bytes: u64,
    walltime_nanos: i64,
    table: &TableDescriptor,
    database: &DatabaseDescriptor,
    executor: &ExecutorInfo,
) -> Result<()> {
    if files.is_empty() {
        return Err(Error::NoFilesInBackup);
    }
    files.sort_by(|a, b| a.span.cmp(&b.span));

    let mut descriptor = BackupDescriptor::new(walltime_nanos);
    descriptor.format_version = BACKUP_FORMAT_VERSION;
    descriptor.files = files;
    descriptor.spans = vec![table.table_span()];
    descriptor.descriptors = vec![
        ObjectDescriptor::Database(database.clone()),
        ObjectDescriptor::Table(table.clone()),
    ];
    descriptor.entry_counts.data_size = data_bytes;
    descriptor.build_info = format!("bulkload {}", env!("CARGO_PKG_VERSION"));
    descriptor.node_id = executor.node_id;
    descriptor.cluster_id = executor.cluster_id.clone();

    let encoded = serde_json::to_vec(&descriptor)
        .map_err(|e| Error::Internal(format!("encode backup descriptor: {e}")))?;
    dest.put(BACKUP_DESCRIPTOR_NAME, encoded.into()).await?;
    debug!(
        files = descriptor.files.len(),
        data_bytes, "wrote backup descriptor"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulkload_core::{key_next, KeySpan};
    use bulkload_schema::parse_create_table;
    use bytes::Bytes;

    const WALLTIME: i64 = 1_507_000_000_000_000_000;

    fn table() -> TableDescriptor {
        parse_create_table("CREATE TABLE t (c1 INT PRIMARY KEY, c2 INT)").unwrap()
    }

    fn database() -> DatabaseDescriptor {
        DatabaseDescriptor {
            id: 50,
            name: "csv".to_string(),
        }
    }

    fn segment(start: &[u8], last: &[u8], payload: &[u8]) -> SstSegment {
        SstSegment {
            data: Bytes::copy_from_slice(payload),
            size: payload.len() as u64,
            span: KeySpan::new(Bytes::copy_from_slice(start), key_next(last)),
        }
    }

    async fn read_descriptor(dest: &ExportStore) -> BackupDescriptor {
        let raw = dest.read_all(BACKUP_DESCRIPTOR_NAME).await.unwrap();
        serde_json::from_slice(&raw).unwrap()
    }

    async fn run_make_backup(
        dest: &ExportStore,
        segments: Vec<SstSegment>,
    ) -> Result<BackupTotals> {
        let (seg_tx, seg_rx) = mpsc::channel(16);
        for segment in segments {
            seg_tx.send(segment).await.unwrap();
        }
        drop(seg_tx);
        make_backup(
            dest,
            seg_rx,
            WALLTIME,
            &table(),
            &database(),
            &ExecutorInfo::default(),
            CancellationToken::new(),
        )
        .await
    }

    // ---------------------------------------------------------------
    // Upload and descriptor contents
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn test_segments_named_monotonically() {
        let dest = ExportStore::from_uri("memory://finalize-names/backup").unwrap();
        let totals = run_make_backup(
            &dest,
            vec![segment(b"a", b"b", b"AAA"), segment(b"c", b"d", b"BBB")],
        )
        .await
        .unwrap();
        assert_eq!(
            totals,
            BackupTotals {
                segments: 2,
                data_bytes: 6
            }
        );
        assert_eq!(dest.read_all("1.sst").await.unwrap().as_ref(), b"AAA");
        assert_eq!(dest.read_all("2.sst").await.unwrap().as_ref(), b"BBB");
    }

    #[tokio::test]
    async fn test_descriptor_fields() {
        let dest = ExportStore::from_uri("memory://finalize-desc/backup").unwrap();
        run_make_backup(&dest, vec![segment(b"a", b"b", b"AAA")])
            .await
            .unwrap();
        let descriptor = read_descriptor(&dest).await;
        assert_eq!(descriptor.end_time_nanos, WALLTIME);
        assert_eq!(descriptor.format_version, BACKUP_FORMAT_VERSION);
        assert_eq!(descriptor.files.len(), 1);
        assert_eq!(descriptor.files[0].path, "1.sst");
        assert_eq!(descriptor.files[0].sha512.len(), 64);
        assert_eq!(descriptor.entry_counts.data_size, 3);
        assert_eq!(descriptor.spans, vec![table().table_span()]);
        assert!(descriptor.build_info.starts_with("bulkload "));
        // Database then table, both embedded.
        assert_eq!(descriptor.descriptors.len(), 2);
        match &descriptor.descriptors[1] {
            ObjectDescriptor::Table(t) => assert_eq!(t.name, "t"),
            other => panic!("expected table descriptor, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_checksum_matches_contents() {
        let dest = ExportStore::from_uri("memory://finalize-sha/backup").unwrap();
        run_make_backup(&dest, vec![segment(b"a", b"b", b"payload")])
            .await
            .unwrap();
        let descriptor = read_descriptor(&dest).await;
        let stored = dest.read_all("1.sst").await.unwrap();
        let expected = Sha512::digest(&stored).to_vec();
        assert_eq!(descriptor.files[0].sha512, expected);
    }

    #[tokio::test]
    async fn test_entries_sorted_by_span() {
        let dest = ExportStore::from_uri("memory://finalize-sort/backup").unwrap();
        // Arrival order disagrees with span order.
        run_make_backup(
            &dest,
            vec![segment(b"m", b"z", b"2nd"), segment(b"a", b"c", b"1st")],
        )
        .await
        .unwrap();
        let descriptor = read_descriptor(&dest).await;
        assert_eq!(descriptor.files[0].span.start.as_ref(), b"a");
        assert_eq!(descriptor.files[1].span.start.as_ref(), b"m");
        // Paths still name arrival order.
        assert_eq!(descriptor.files[0].path, "2.sst");
        assert_eq!(descriptor.files[1].path, "1.sst");
    }

    #[tokio::test]
    async fn test_executor_identity_embedded() {
        let dest = ExportStore::from_uri("memory://finalize-node/backup").unwrap();
        let (seg_tx, seg_rx) = mpsc::channel(4);
        seg_tx.send(segment(b"a", b"b", b"x")).await.unwrap();
        drop(seg_tx);
        make_backup(
            &dest,
            seg_rx,
            WALLTIME,
            &table(),
            &database(),
            &ExecutorInfo {
                node_id: Some(3),
                cluster_id: Some("cluster-e2e".to_string()),
            },
            CancellationToken::new(),
        )
        .await
        .unwrap();
        let descriptor = read_descriptor(&dest).await;
        assert_eq!(descriptor.node_id, Some(3));
        assert_eq!(descriptor.cluster_id.as_deref(), Some("cluster-e2e"));
    }

    // ---------------------------------------------------------------
    // Empty backup
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn test_empty_backup_is_fatal() {
        let dest = ExportStore::from_uri("memory://finalize-empty/backup").unwrap();
        let err = run_make_backup(&dest, vec![]).await.unwrap_err();
        assert_eq!(err.to_string(), "no files in backup");
        // No descriptor was written.
        assert!(dest.read_all(BACKUP_DESCRIPTOR_NAME).await.is_err());
    }
}
