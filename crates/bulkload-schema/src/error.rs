//! Schema Error Types
//!
//! Errors surfaced while parsing DDL, building descriptors, parsing CSV
//! fields into datums, and encoding rows. Descriptor-construction errors
//! are raised before the pipeline touches any data file.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("expected CREATE TABLE statement, got {0}")]
    NotCreateTable(String),

    #[error("unsupported IF NOT EXISTS")]
    IfNotExists,

    #[error("CREATE TABLE AS not supported")]
    CreateAs,

    #[error("foreign keys not supported")]
    ForeignKey,

    #[error("column {0:?}: DEFAULT expression unsupported")]
    VisibleDefault(String),

    #[error("column {name:?}: unsupported type {ty}")]
    UnsupportedType { name: String, ty: String },

    #[error("index {index:?} references unknown column {column:?}")]
    UnknownIndexColumn { index: String, column: String },

    #[error("column {0:?}: DECIMAL columns cannot be used in index keys")]
    DecimalKeyColumn(String),

    #[error("could not parse {value:?} as {ty}")]
    ParseDatum { value: String, ty: &'static str },

    #[error("null value in non-nullable column {0:?}")]
    NullViolation(String),

    #[error("row has {got} datums, table has {want} columns")]
    RowArity { got: usize, want: usize },

    #[error("timestamp out of range for column {0:?}")]
    TimestampRange(String),
}
