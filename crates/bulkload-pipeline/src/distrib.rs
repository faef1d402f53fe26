//! Distributed Topology
//!
//! The coordinator enumerates cluster members, deals the input files
//! round-robin across them, and launches one worker flow per member on
//! the execution substrate. Each flow runs the same reader and converter
//! stages as the local topology, with two differences downstream:
//!
//! - A sampler taps the KV stream and forwards a size-weighted sample of
//!   keys to the coordinator, which hands them to whatever picks range
//!   boundaries (outside this crate).
//! - The SST writer builds exactly **one** segment for the flow's whole
//!   (sorted) stream. Segmentation happens upstream, by how work was
//!   split across flows; segmenting again here would break the aggregate
//!   non-overlap invariant.
//!
//! Workers upload their segment themselves and report one
//! [`SegmentRow`] each; only finalization is centralized. The coordinator
//! collects the rows, assembles the descriptor exactly as the local
//! finalizer does, and writes it once.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha512};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use bulkload_core::{key_next, BackupFile, DatabaseDescriptor, KeySpan, TableDescriptor};
use bulkload_storage::error::hex_key;
use bulkload_storage::{ExportStore, KvMultimap, SstBuilder};

use crate::convert::{convert_records, RecordConverter, SharedRecords};
use crate::error::{merge_error, Error, Result};
use crate::finalize::{finalize_backup, ExecutorInfo};
use crate::job::ProgressHandle;
use crate::local::{TransformCounts, CHANNEL_CAPACITY};
use crate::options::ImportOptions;
use crate::reader::read_files;
use crate::sample::KvSampler;

/// Error type for cluster status implementations outside this crate.
pub type ClusterError = Box<dyn std::error::Error + Send + Sync>;

/// One cluster member able to run a worker flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDescriptor {
    pub node_id: u32,
    pub address: String,
}

/// The cluster membership service, an external collaborator.
#[async_trait]
pub trait ClusterStatus: Send + Sync {
    async fn nodes(&self) -> std::result::Result<Vec<NodeDescriptor>, ClusterError>;
}

/// Fixed membership, for tests and single-process deployments.
pub struct StaticCluster {
    nodes: Vec<NodeDescriptor>,
}

impl StaticCluster {
    pub fn new(nodes: Vec<NodeDescriptor>) -> Self {
        Self { nodes }
    }

    /// A synthetic cluster of `n` local nodes.
    pub fn local(n: u32) -> Self {
        Self::new(
            (1..=n)
                .map(|node_id| NodeDescriptor {
                    node_id,
                    address: format!("local://{node_id}"),
                })
                .collect(),
        )
    }
}

#[async_trait]
impl ClusterStatus for StaticCluster {
    async fn nodes(&self) -> std::result::Result<Vec<NodeDescriptor>, ClusterError> {
        Ok(self.nodes.clone())
    }
}

/// Per-segment result row a worker reports to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRow {
    pub path: String,
    pub size: u64,
    pub sha512: Vec<u8>,
    pub span_start: Bytes,
    pub span_end: Bytes,
}

/// A sampled key/value pair forwarded to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampledKv {
    pub key: Bytes,
    pub value: Bytes,
}

/// Result of a distributed transform.
pub struct DistributedOutcome {
    pub counts: TransformCounts,
    /// Size-weighted key sample across all workers, for range splitting.
    pub samples: Vec<SampledKv>,
}

struct WorkerCounts {
    csv_rows: u64,
    kv_pairs: u64,
}

enum WorkerStage {
    Read(u64),
    Converted,
    Wrote(u64),
}

/// Run the distributed transform and write the descriptor centrally.
#[allow(clippy::too_many_arguments)]
pub async fn run_distributed(
    desc: Arc<TableDescriptor>,
    database: DatabaseDescriptor,
    files: Vec<String>,
    opts: &ImportOptions,
    walltime_nanos: i64,
    cluster: Arc<dyn ClusterStatus>,
    sample_size: u32,
    executor: ExecutorInfo,
    progress: Option<ProgressHandle>,
) -> Result<DistributedOutcome> {
    let nodes = cluster
        .nodes()
        .await
        .map_err(|e| Error::Cluster(e.to_string()))?;
    if nodes.is_empty() {
        return Err(Error::Cluster("no nodes available".to_string()));
    }
    let dest = ExportStore::from_uri(&opts.temp)?;

    // Deal files round-robin; flows with no files never start.
    let mut assignments: Vec<Vec<String>> = vec![Vec::new(); nodes.len()];
    for (i, file) in files.into_iter().enumerate() {
        assignments[i % nodes.len()].push(file);
    }

    let token = CancellationToken::new();
    let (row_tx, mut row_rx) = mpsc::channel::<SegmentRow>(16);
    let (sample_tx, mut sample_rx) = mpsc::channel::<SampledKv>(CHANNEL_CAPACITY);

    let mut workers: JoinSet<Result<WorkerCounts>> = JoinSet::new();
    for (flow_id, flow_files) in assignments.into_iter().enumerate() {
        if flow_files.is_empty() {
            continue;
        }
        let node = nodes[flow_id % nodes.len()].clone();
        debug!(flow_id, node = node.node_id, files = flow_files.len(), "launching worker flow");
        workers.spawn(run_worker_flow(
            flow_id,
            flow_files,
            Arc::clone(&desc),
            opts.clone(),
            walltime_nanos,
            sample_size,
            dest.clone(),
            row_tx.clone(),
            sample_tx.clone(),
            token.clone(),
        ));
    }
    drop(row_tx);
    drop(sample_tx);

    // Collectors must run while the workers do; the channels are bounded.
    let row_collector = tokio::spawn(async move {
        let mut rows = Vec::new();
        while let Some(row) = row_rx.recv().await {
            rows.push(row);
        }
        rows
    });
    let sample_collector = tokio::spawn(async move {
        let mut samples = Vec::new();
        while let Some(sample) = sample_rx.recv().await {
            samples.push(sample);
        }
        samples
    });

    let mut counts = TransformCounts::default();
    let mut first_err: Option<Error> = None;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(worker)) => {
                counts.csv_rows += worker.csv_rows;
                counts.kv_pairs += worker.kv_pairs;
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

    let rows = row_collector
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;
    let samples = sample_collector
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;

    if let Some(e) = first_err {
        return Err(e);
    }

    // Workers cover reading through sorting; the remaining third is
    // finalization.
    if let Some(handle) = &progress {
        handle.report(2.0 / 3.0).await;
    }

    let mut backup_files = Vec::with_capacity(rows.len());
    let mut data_bytes = 0u64;
    for row in rows {
        data_bytes += row.size;
        backup_files.push(BackupFile {
            path: row.path,
            span: KeySpan::new(row.span_start, row.span_end),
            sha512: row.sha512,
        });
    }
    counts.segments = backup_files.len() as u64;
    counts.data_bytes = data_bytes;

    finalize_backup(
        &dest,
        backup_files,
        data_bytes,
        walltime_nanos,
        &desc,
        &database,
        &executor,
    )
    .await?;

    Ok(DistributedOutcome { counts, samples })
}

/// One worker flow: read assigned files, convert with a fan-out, sample
/// the KV stream, sort locally, and write exactly one SST.
#[allow(clippy::too_many_arguments)]
async fn run_worker_flow(
    flow_id: usize,
    files: Vec<String>,
    desc: Arc<TableDescriptor>,
    opts: ImportOptions,
    walltime_nanos: i64,
    sample_size: u32,
    dest: ExportStore,
    row_tx: mpsc::Sender<SegmentRow>,
    sample_tx: mpsc::Sender<SampledKv>,
    token: CancellationToken,
) -> Result<WorkerCounts> {
    let (record_tx, record_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (kv_tx, kv_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let mut stages: JoinSet<Result<WorkerStage>> = JoinSet::new();

    // Reader.
    {
        let opts = opts.clone();
        let token = token.clone();
        let expected_cols = desc.visible_columns().len();
        stages.spawn(async move {
            read_files(&files, &opts, expected_cols, record_tx, token)
                .await
                .map(WorkerStage::Read)
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
        stages.spawn(async move {
            let mut group: JoinSet<Result<()>> = JoinSet::new();
            for _ in 0..num_cpus::get().max(1) {
                group.spawn(convert_records(
                    Arc::clone(&converter),
                    Arc::clone(&records),
                    kv_tx.clone(),
                    token.clone(),
                ));
            }
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
                None => Ok(WorkerStage::Converted),
            }
        });
    }

    // Sampler tap + single-SST writer.
    {
        let token = token.clone();
        stages.spawn(async move {
            write_worker_sst(
                flow_id,
                kv_rx,
                walltime_nanos,
                sample_size,
                dest,
                row_tx,
                sample_tx,
                token,
            )
            .await
            .map(WorkerStage::Wrote)
        });
    }

    let mut counts = WorkerCounts {
        csv_rows: 0,
        kv_pairs: 0,
    };
    let mut first_err: Option<Error> = None;
    while let Some(joined) = stages.join_next().await {
        match joined {
            Ok(Ok(WorkerStage::Read(rows))) => counts.csv_rows = rows,
            Ok(Ok(WorkerStage::Converted)) => {}
            Ok(Ok(WorkerStage::Wrote(kvs))) => counts.kv_pairs = kvs,
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

/// Drain the worker's KV stream: forward samples, spool everything into a
/// local multi-map, then build, upload, and report one SST.
#[allow(clippy::too_many_arguments)]
async fn write_worker_sst(
    flow_id: usize,
    mut kv_rx: mpsc::Receiver<bulkload_core::KeyValue>,
    walltime_nanos: i64,
    sample_size: u32,
    dest: ExportStore,
    row_tx: mpsc::Sender<SegmentRow>,
    sample_tx: mpsc::Sender<SampledKv>,
    token: CancellationToken,
) -> Result<u64> {
    let mut sampler = KvSampler::new(sample_size);
    let mut map = KvMultimap::new()?;

    while let Some(kv) = kv_rx.recv().await {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if sampler.sample(&kv) {
            let sample = SampledKv {
                key: kv.key.clone(),
                value: kv.value.clone(),
            };
            tokio::select! {
                _ = token.cancelled() => return Err(Error::Cancelled),
                sent = sample_tx.send(sample) => {
                    if sent.is_err() {
                        return Err(Error::Cancelled);
                    }
                }
            }
        }
        map.insert(kv.key, kv.value)?;
    }
    let count = map.len();

    // One SST for the whole stream; no mid-stream segmentation here.
    let mut sst = SstBuilder::new(walltime_nanos);
    let mut first_key: Option<Bytes> = None;
    let mut last_key: Option<Bytes> = None;
    for entry in map.close_writes()? {
        let (key, value) = entry?;
        if first_key.is_none() {
            first_key = Some(key.clone());
        }
        sst.add(&key, &value).map_err(|e| Error::SstAdd {
            key: hex_key(&key),
            source: e,
        })?;
        last_key = Some(key);
    }

    // Every flow reports exactly one segment, even when no rows reached
    // it; a zero-row flow uploads an empty SST with an empty span.
    let span_start = first_key.unwrap_or_default();
    let span_end = last_key.map(|key| key_next(&key)).unwrap_or_default();

    let data = sst.finish()?;
    let size = data.len() as u64;
    let sha512 = Sha512::digest(&data).to_vec();
    let path = format!("{}.sst", flow_id + 1);
    dest.put(&path, data).await?;
    debug!(flow_id, path, size, "worker flow uploaded segment");

    let row = SegmentRow {
        path,
        size,
        sha512,
        span_start,
        span_end,
    };
    tokio::select! {
        _ = token.cancelled() => Err(Error::Cancelled),
        sent = row_tx.send(row) => {
            if sent.is_err() {
                return Err(Error::Cancelled);
            }
            Ok(count)
        }
    }
}
