//! Error Types for bulkload-core
//!
//! Decode-side errors for the framing primitives in this crate. The
//! pipeline crates define their own richer error enums and convert these
//! via `#[from]`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("varint truncated")]
    VarintTruncated,

    #[error("varint exceeds 64 bits")]
    VarintOverflow,
}
