//! Import Entry Point
//!
//! [`Importer`] is the library surface behind the `IMPORT TABLE ...
//! CSV DATA (...) WITH (...)` statement: it validates options, acquires
//! and parses the table schema, registers a job, runs the local or
//! distributed transform, and either returns the transform-only summary
//! row or hands the finished backup to the restore planner.
//!
//! Configuration and schema errors surface here, before any data file is
//! opened. The reconstructed job description carries sanitized URIs
//! (credentials stripped) and always includes `transform_only`, because
//! the job being described is exactly the transform; the chained restore
//! registers its own job.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::info;

use bulkload_core::{DatabaseDescriptor, TableDescriptor};
use bulkload_schema::ddl::{parse_create_table, DATABASE_NAME, DEFAULT_DATABASE_ID};
use bulkload_storage::{sanitize_uri, ExportStore};

use crate::distrib::{run_distributed, ClusterStatus};
use crate::error::{Error, Result};
use crate::finalize::ExecutorInfo;
use crate::job::{JobTracker, LogJobTracker, ProgressHandle};
use crate::local::{run_local, TransformCounts};
use crate::options::{option_expects_value, ImportOptions, OPT_TEMP, OPT_TRANSFORM_ONLY};

/// The restore planner the default (non-transform-only) mode chains
/// into; an external collaborator.
#[async_trait]
pub trait RestorePlanner: Send + Sync {
    /// Materialize the table from the backup at `backup_uri`.
    async fn restore(
        &self,
        backup_uri: &str,
        table: &TableDescriptor,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// One import request: the statement, in struct form.
#[derive(Debug, Clone, Default)]
pub struct ImportRequest {
    /// Target table name; may be empty when the schema is inline.
    pub table: String,

    /// Inline `CREATE TABLE` text.
    pub create_table: Option<String>,

    /// URI of an object holding the `CREATE TABLE` text.
    pub create_file: Option<String>,

    /// CSV data file URIs.
    pub files: Vec<String>,

    /// Raw `WITH` options.
    pub options: BTreeMap<String, String>,
}

/// The transform-only result row.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImportSummary {
    pub job_id: i64,
    pub status: String,
    pub fraction_done: f32,
    pub rows: u64,
    pub index_entries: u64,
    pub system_records: u64,
    pub data_bytes: u64,
}

/// Runs imports. Construct once, share freely.
pub struct Importer {
    job_tracker: Arc<dyn JobTracker>,
    cluster: Option<Arc<dyn ClusterStatus>>,
    restore: Option<Arc<dyn RestorePlanner>>,
    executor: ExecutorInfo,
    sample_size: u32,
}

impl Importer {
    pub fn new() -> Self {
        Self {
            job_tracker: Arc::new(LogJobTracker::new()),
            cluster: None,
            restore: None,
            executor: ExecutorInfo::default(),
            sample_size: 0,
        }
    }

    pub fn with_job_tracker(mut self, tracker: Arc<dyn JobTracker>) -> Self {
        self.job_tracker = tracker;
        self
    }

    /// Enable the distributed topology.
    pub fn with_cluster(mut self, cluster: Arc<dyn ClusterStatus>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// Enable chaining into restore when `transform_only` is absent.
    pub fn with_restore(mut self, restore: Arc<dyn RestorePlanner>) -> Self {
        self.restore = Some(restore);
        self
    }

    /// Identity stamped into the descriptor.
    pub fn with_executor(mut self, executor: ExecutorInfo) -> Self {
        self.executor = executor;
        self
    }

    /// Sampler size for the distributed topology; zero samples every KV.
    pub fn with_sample_size(mut self, sample_size: u32) -> Self {
        self.sample_size = sample_size;
        self
    }

    /// Run one import to completion.
    pub async fn import(&self, req: ImportRequest) -> Result<ImportSummary> {
        let opts = ImportOptions::from_map(&req.options)?;
        if req.files.is_empty() {
            return Err(Error::Config("no data files specified".to_string()));
        }

        let (ddl, from_file) = self.load_schema(&req).await?;
        let desc = Arc::new(parse_create_table(&ddl)?);
        if from_file && !req.table.is_empty() && req.table.to_lowercase() != desc.name {
            return Err(Error::Config(format!(
                "importing table {:?}, but file specifies a schema for table {:?}",
                req.table, desc.name
            )));
        }
        let database = DatabaseDescriptor {
            id: DEFAULT_DATABASE_ID,
            name: DATABASE_NAME.to_string(),
        };

        // Every KV of the run shares this timestamp; two runs never share
        // one.
        let walltime_nanos = Utc::now()
            .timestamp_nanos_opt()
            .ok_or_else(|| Error::Internal("wall clock out of range".to_string()))?;

        let description = job_description(&desc.name, &req.files, &req.options);
        let job_id = self
            .job_tracker
            .created(&description)
            .await
            .map_err(|e| Error::Job(e.to_string()))?;
        self.job_tracker
            .started(job_id)
            .await
            .map_err(|e| Error::Job(e.to_string()))?;
        let progress = ProgressHandle::new(Arc::clone(&self.job_tracker), job_id);

        let result = self
            .run_transform(&desc, database, &req, &opts, walltime_nanos, progress)
            .await;

        self.job_tracker
            .finished(job_id, result.as_ref().err().map(|e| e.to_string()).as_deref())
            .await
            .map_err(|e| Error::Job(e.to_string()))?;
        let counts = result?;
        info!(
            job_id,
            rows = counts.csv_rows,
            kvs = counts.kv_pairs,
            segments = counts.segments,
            "import transform complete"
        );

        if !opts.transform_only {
            let planner = self.restore.as_ref().ok_or_else(|| {
                Error::Config(
                    "no restore planner configured; use the transform_only option".to_string(),
                )
            })?;
            planner
                .restore(&opts.temp, &desc)
                .await
                .map_err(|e| Error::Restore(e.to_string()))?;
        }

        Ok(ImportSummary {
            job_id,
            status: "succeeded".to_string(),
            fraction_done: 1.0,
            rows: counts.csv_rows,
            index_entries: counts.kv_pairs.saturating_sub(counts.csv_rows),
            system_records: 0,
            data_bytes: counts.data_bytes,
        })
    }

    async fn run_transform(
        &self,
        desc: &Arc<TableDescriptor>,
        database: DatabaseDescriptor,
        req: &ImportRequest,
        opts: &ImportOptions,
        walltime_nanos: i64,
        progress: ProgressHandle,
    ) -> Result<TransformCounts> {
        if opts.distributed {
            let cluster = self.cluster.as_ref().ok_or_else(|| {
                Error::Config("distributed import requires a cluster status service".to_string())
            })?;
            let outcome = run_distributed(
                Arc::clone(desc),
                database,
                req.files.clone(),
                opts,
                walltime_nanos,
                Arc::clone(cluster),
                self.sample_size,
                self.executor.clone(),
                Some(progress),
            )
            .await?;
            info!(samples = outcome.samples.len(), "collected split samples");
            Ok(outcome.counts)
        } else {
            run_local(
                Arc::clone(desc),
                database,
                req.files.clone(),
                opts,
                walltime_nanos,
                self.executor.clone(),
                Some(progress),
            )
            .await
        }
    }

    /// Inline DDL wins; otherwise fetch the schema file. Returns the DDL
    /// text and whether it came from a file.
    async fn load_schema(&self, req: &ImportRequest) -> Result<(String, bool)> {
        if let Some(ddl) = &req.create_table {
            return Ok((ddl.clone(), false));
        }
        let Some(file) = &req.create_file else {
            return Err(Error::Config("no table schema specified".to_string()));
        };
        let store = ExportStore::from_uri(file)?;
        let raw = store
            .read_all("")
            .await
            .map_err(|e| Error::from(e).in_file(file))?;
        let ddl = String::from_utf8(raw.to_vec())
            .map_err(|_| Error::Config(format!("schema file {file:?} is not UTF-8")))?;
        Ok((ddl, true))
    }
}

impl Default for Importer {
    fn default() -> Self {
        Self::new()
    }
}

/// Reconstruct the canonical statement for the job description: sanitized
/// URIs, options sorted by name, `transform_only` always present.
pub fn job_description(
    table: &str,
    files: &[String],
    raw_options: &BTreeMap<String, String>,
) -> String {
    let mut options = raw_options.clone();
    options
        .entry(OPT_TRANSFORM_ONLY.to_string())
        .or_insert_with(String::new);
    if let Some(temp) = options.get_mut(OPT_TEMP) {
        *temp = sanitize_uri(temp);
    }

    let files_clause = files
        .iter()
        .map(|f| format!("'{}'", sanitize_uri(f)))
        .collect::<Vec<_>>()
        .join(", ");
    // BTreeMap iterates sorted by option name.
    let options_clause = options
        .iter()
        .map(|(name, value)| match option_expects_value(name) {
            Some(true) => format!("{name} = '{value}'"),
            _ => name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ");

    format!("IMPORT TABLE {table} CSV DATA ({files_clause}) WITH ({options_clause})")
}
