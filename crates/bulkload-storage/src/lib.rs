//! Storage Layer for bulkload
//!
//! Three concerns live here, all below the pipeline and above the bytes:
//!
//! 1. **Object storage by URI** ([`store`]): `file://`, `memory://`, and
//!    `s3://` URIs resolve to an `Arc<dyn ObjectStore>` plus a base path.
//!    The reader pulls CSV sources through this, and the finalizer writes
//!    segments and the descriptor through it.
//! 2. **The SST format** ([`sst`]): an immutable, sorted key/value file.
//!    [`SstBuilder`](sst::SstBuilder) enforces strictly increasing keys
//!    and stamps every entry with the pipeline wall time;
//!    [`SstReader`](sst::SstReader) validates and decodes a file, mainly
//!    for tests and offline inspection.
//! 3. **External sort** ([`extsort`]): a disk-backed multi-map. Unordered
//!    inserts spill sorted runs into a temp directory; after the write
//!    phase closes, a k-way merge yields the entries in key order. The
//!    spill directory is removed when the map drops, on success and on
//!    failure alike.

pub mod error;
pub mod extsort;
pub mod sst;
pub mod store;

pub use error::{Error, Result};
pub use extsort::KvMultimap;
pub use sst::{SstBuilder, SstReader};
pub use store::{sanitize_uri, ExportStore};
