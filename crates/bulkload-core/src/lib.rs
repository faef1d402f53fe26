//! Core Types for bulkload
//!
//! This crate defines the value types shared by every stage of the CSV
//! import pipeline, and by the tools that read the artifacts it produces.
//!
//! ## The Pipeline in One Paragraph
//!
//! The import pipeline turns CSV files into a *backup artifact*: a set of
//! immutable, sorted SST files plus a descriptor that enumerates them. Four
//! stages are connected by bounded channels, and three record shapes flow
//! between them:
//!
//! 1. [`CsvRecord`] - a decoded CSV row tagged with its source file and
//!    1-based row number (reader to converter).
//! 2. [`KeyValue`] - an encoded key/value pair produced by the row encoder
//!    (converter to sorter).
//! 3. [`SstSegment`] - a finished SST blob with its key span
//!    (sorter to finalizer).
//!
//! Each shape is a plain value with no shared mutable state; ownership moves
//! with the channel element.
//!
//! ## What Else Lives Here
//!
//! - [`schema`]: table, column, and index descriptors (the parsed form of
//!   the user's `CREATE TABLE`), embedded verbatim in the backup descriptor.
//! - [`descriptor`]: the backup manifest written at the end of a run.
//! - [`varint`]: variable-length integer framing used by the SST format.

pub mod descriptor;
pub mod error;
pub mod record;
pub mod schema;
pub mod varint;

pub use descriptor::{BackupDescriptor, BackupFile, EntryCounts, BACKUP_DESCRIPTOR_NAME};
pub use error::{Error, Result};
pub use record::{key_next, CsvRecord, KeySpan, KeyValue, SstSegment};
pub use schema::{
    ColumnDescriptor, ColumnType, DatabaseDescriptor, IndexDescriptor, TableDescriptor,
};
