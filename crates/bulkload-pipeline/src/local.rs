//! Local Topology
//!
//! Runs the whole pipeline on one node: four concurrent tasks connected
//! by bounded channels, all bound to a single cancellation token.
//!
//! ```text
//! reader ──records──> converter xN ──kvs──> sorter ──segments──> finalizer
//! ```
//!
//! - The record and KV channels are buffered deep (10k) because reads
//!   happen in bursts; precomputed backlog keeps the CPU-bound converter
//!   fed. Segments are rare, so that channel is shallow.
//! - The converter is a fan-out of one worker per CPU inside its own task
//!   group; the KV channel closes only after every worker has exited.
//! - Every task closes its outbound channel by dropping the sender on
//!   exit, so downstream stages drain and terminate.
//! - The first failure cancels the token; remaining tasks abort at their
//!   next channel operation, and the first real error is reported.
//!
//! Progress is reported at fixed fractions, 1/3 after the reader finishes
//! and 2/3 after the sorter, both best effort.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use bulkload_core::{DatabaseDescriptor, TableDescriptor};
use bulkload_storage::{ExportStore, KvMultimap};

use crate::convert::{convert_records, RecordConverter, SharedRecords};
use crate::error::{merge_error, Error, Result};
use crate::finalize::{make_backup, BackupTotals, ExecutorInfo};
use crate::job::ProgressHandle;
use crate::options::ImportOptions;
use crate::reader::read_files;
use crate::sort::write_sorted;

/// Depth of the record and KV channels.
pub const CHANNEL_CAPACITY: usize = 10_000;

/// Segments are rare events; a shallow channel is enough.
const SEGMENT_CHANNEL_CAPACITY: usize = 16;

/// Totals produced by one transform run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformCounts {
    pub csv_rows: u64,
    pub kv_pairs: u64,
    pub segments: u64,
    pub data_bytes: u64,
}

enum StageOutput {
    Read(u64),
    Converted,
    Sorted(u64),
    Finalized(BackupTotals),
}

/// Run the local pipeline end to end, writing segments and the descriptor
/// under `opts.temp`.
pub async fn run_local(
    desc: Arc<TableDescriptor>,
    database: DatabaseDescriptor,
    files: Vec<String>,
    opts: &ImportOptions,
    walltime_nanos: i64,
    executor: ExecutorInfo,
    progress: Option<ProgressHandle>,
) -> Result<TransformCounts> {
    let dest = ExportStore::from_uri(&opts.temp)?;
    let map = KvMultimap::new()?;

    let token = CancellationToken::new();
    let (record_tx, record_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (kv_tx, kv_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (seg_tx, seg_rx) = mpsc::channel(SEGMENT_CHANNEL_CAPACITY);

    let mut tasks: JoinSet<Result<StageOutput>> = JoinSet::new();

    // Reader.
    {
        let files = files.clone();
        let opts = opts.clone();
        let token = token.clone();
        let progress = progress.clone();
        let expected_cols = desc.visible_columns().len();
        tasks.spawn(async move {
            let result = read_files(&files, &opts, expected_cols, record_tx, token).await;
            if let Some(handle) = &progress {
                handle.report(1.0 / 3.0).await;
            }
            result.map(StageOutput::Read)
        });
    }

    // Converter fan-out.
    {
        let converter = Arc::new(RecordConverter::new(
            Arc::clone(&desc),
            opts.nullif.clone(),
        ));
        let records: SharedRecords = Arc::new(Mutex::new(record_rx));
        let token = token.clone();
        tasks.spawn(async move {
            let workers = num_cpus::get().max(1);
            debug!(workers, "starting converter fan-out");
            let mut group: JoinSet<Result<()>> = JoinSet::new();
            for _ in 0..workers {
                group.spawn(convert_records(
                    Arc::clone(&converter),
                    Arc::clone(&records),
                    kv_tx.clone(),
                    token.clone(),
                ));
            }
            // The KV channel must close only after every worker exits;
            // each worker holds a sender clone, this one drops now.
            drop(kv_tx);

            let mut first_err: Option<Error> = None;
            while let Some(joined) = group.join_next().await {
                match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        token.cancel();
                        merge_error(&mut first_err, e);
                    }
                    Err(join_err) => {
                        token.cancel();
                        merge_error(&mut first_err, Error::Internal(join_err.to_string()));
                    }
                }
            }
            match first_err {
                Some(e) => Err(e),
                None => Ok(StageOutput::Converted),
            }
        });
    }

    // Sorter/Writer.
    {
        let token = token.clone();
        let progress = progress.clone();
        let sst_max_bytes = opts.sst_max_bytes;
        tasks.spawn(async move {
            let result =
                write_sorted(kv_rx, map, sst_max_bytes, walltime_nanos, seg_tx, token).await;
            if let Some(handle) = &progress {
                handle.report(2.0 / 3.0).await;
            }
            result.map(StageOutput::Sorted)
        });
    }

    // Finalizer.
    {
        let dest = dest.clone();
        let desc = Arc::clone(&desc);
        let token = token.clone();
        tasks.spawn(async move {
            make_backup(
                &dest,
                seg_rx,
                walltime_nanos,
                &desc,
                &database,
                &executor,
                token,
            )
            .await
            .map(StageOutput::Finalized)
        });
    }

    // Await all tasks; the first real error wins and cancels the rest.
    let mut counts = TransformCounts::default();
    let mut first_err: Option<Error> = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(StageOutput::Read(rows))) => counts.csv_rows = rows,
            Ok(Ok(StageOutput::Converted)) => {}
            Ok(Ok(StageOutput::Sorted(kvs))) => counts.kv_pairs = kvs,
            Ok(Ok(StageOutput::Finalized(totals))) => {
                counts.segments = totals.segments;
                counts.data_bytes = totals.data_bytes;
            }
            Ok(Err(e)) => {
                token.cancel();
                merge_error(&mut first_err, e);
            }
            Err(join_err) => {
                token.cancel();
                merge_error(&mut first_err, Error::Internal(join_err.to_string()));
            }
        }
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(counts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_error_prefers_real_errors() {
        let mut slot = Some(Error::Cancelled);
        merge_error(&mut slot, Error::NoFilesInBackup);
        assert!(matches!(slot, Some(Error::NoFilesInBackup)));
        merge_error(
            &mut slot,
            Error::DuplicateKey {
                key: "0x01".into(),
            },
        );
        assert!(matches!(slot, Some(Error::DuplicateKey { .. })));
        // A later cancellation never displaces a real error.
        merge_error(&mut slot, Error::Cancelled);
        assert!(matches!(slot, Some(Error::DuplicateKey { .. })));
    }

    #[test]
    fn test_merge_error_keeps_sole_cancellation() {
        let mut slot = None;
        merge_error(&mut slot, Error::Cancelled);
        assert!(matches!(slot, Some(Error::Cancelled)));
    }
}
