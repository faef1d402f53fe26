//! Pipeline Error Types
//!
//! One enum for everything that can stop an import. The taxonomy follows
//! where the error is caught:
//!
//! - Configuration and schema errors surface before any data I/O.
//! - Input errors carry file, row, and column context.
//! - Ordering errors name the offending key and mention duplicates,
//!   because a duplicate primary key is by far their most likely cause.
//! - I/O errors arrive wrapped from the storage layer.
//!
//! The first error cancels the shared token; every other stage then fails
//! with [`Error::Cancelled`], and the orchestrator reports only the first.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Config(String),

    #[error(transparent)]
    Schema(#[from] bulkload_schema::Error),

    #[error(transparent)]
    Storage(#[from] bulkload_storage::Error),

    #[error(transparent)]
    Core(#[from] bulkload_core::Error),

    /// Any error wrapped with the file it occurred in.
    #[error("{file}: {source}")]
    File {
        file: String,
        #[source]
        source: Box<Error>,
    },

    #[error("row {row}: reading CSV record: {message}")]
    CsvDecode { row: u64, message: String },

    #[error("row {row}: expected {expected} fields, got {got}")]
    RowShape { row: u64, expected: usize, got: usize },

    #[error("{file}: row {row}: parse {column:?} as {ty}: {source}")]
    FieldParse {
        file: String,
        row: u64,
        column: String,
        ty: &'static str,
        #[source]
        source: bulkload_schema::Error,
    },

    #[error("generate insert row: {file}: row {row}: {source}")]
    RowEncode {
        file: String,
        row: u64,
        #[source]
        source: bulkload_schema::Error,
    },

    #[error("duplicate key: {key}")]
    DuplicateKey { key: String },

    #[error(
        "SST creation error at {key}; this can happen when a primary or \
         unique index has duplicate keys: {source}"
    )]
    SstAdd {
        key: String,
        #[source]
        source: bulkload_storage::Error,
    },

    #[error("no files in backup")]
    NoFilesInBackup,

    #[error("pipeline cancelled")]
    Cancelled,

    #[error("job tracker error: {0}")]
    Job(String),

    #[error("cluster status error: {0}")]
    Cluster(String),

    #[error("restore failed: {0}")]
    Restore(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap an error with the file it came from.
    pub fn in_file(self, file: &str) -> Error {
        Error::File {
            file: file.to_string(),
            source: Box::new(self),
        }
    }
}

/// Keep the most informative of two concurrent failures: a real error
/// beats the finalizer's "no files in backup" fallout, which beats plain
/// cancellation. Never discards the only error seen.
pub(crate) fn merge_error(slot: &mut Option<Error>, incoming: Error) {
    let rank = |e: &Error| match e {
        Error::Cancelled => 0,
        Error::NoFilesInBackup => 1,
        _ => 2,
    };
    match slot {
        None => *slot = Some(incoming),
        Some(current) if rank(&incoming) > rank(current) => *slot = Some(incoming),
        Some(_) => {}
    }
}
