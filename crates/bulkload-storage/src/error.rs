//! Storage Error Types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("invalid storage URI {uri:?}: {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("unsupported storage scheme {0:?}")]
    UnsupportedScheme(String),

    #[error("keys must be added in strictly increasing order; got {key}")]
    OutOfOrderKey { key: String },

    #[error("invalid SST: {0}")]
    InvalidSst(String),

    #[error("sorted iteration started twice")]
    AlreadyClosed,
}

/// Hex rendering used when a key appears in an error message.
pub fn hex_key(key: &[u8]) -> String {
    let mut out = String::with_capacity(2 + key.len() * 2);
    out.push_str("0x");
    for byte in key {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
