//! bulkload Pipeline
//!
//! The bulk CSV-to-backup transformation pipeline: given a `CREATE TABLE`
//! statement and CSV files in an object store, produce an immutable
//! backup artifact (sorted SST segments plus a descriptor) that a restore
//! can ingest to materialize the table.
//!
//! ## Topology
//!
//! Four stages connected by bounded channels, cooperatively cancellable,
//! whole-or-nothing:
//!
//! ```text
//! ┌────────┐ records ┌───────────────┐  kvs  ┌─────────────┐ segments ┌───────────┐
//! │ reader ├────────>│ converter x N ├──────>│ sort/writer ├─────────>│ finalizer │
//! └────────┘         └───────────────┘       └─────────────┘          └───────────┘
//!                     one worker per CPU      disk-backed sort,        upload, SHA-512,
//!                                             size-bounded SSTs        descriptor
//! ```
//!
//! The [`local`] module runs all four stages on one node. The [`distrib`]
//! module runs stages one through three on every cluster member (each
//! worker producing exactly one SST and a key sample) and finalizes
//! centrally.
//!
//! ## Entry point
//!
//! [`Importer`](import::Importer) wraps the topologies with option
//! parsing, schema acquisition, job tracking, and the optional hand-off
//! to a restore planner. Most callers want it rather than the stage
//! functions.

pub mod convert;
pub mod distrib;
pub mod error;
pub mod finalize;
pub mod import;
pub mod job;
pub mod local;
pub mod options;
pub mod reader;
pub mod sample;
pub mod sort;

pub use distrib::{ClusterStatus, NodeDescriptor, StaticCluster};
pub use error::{Error, Result};
pub use finalize::ExecutorInfo;
pub use import::{ImportRequest, ImportSummary, Importer, RestorePlanner};
pub use job::{JobTracker, LogJobTracker};
pub use local::TransformCounts;
pub use options::ImportOptions;
