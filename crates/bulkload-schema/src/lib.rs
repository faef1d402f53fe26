//! Schema Layer for bulkload
//!
//! Everything between the user's `CREATE TABLE` text and the encoded
//! key/value pairs the sorter consumes:
//!
//! - [`ddl`]: parse a `CREATE TABLE` statement into a
//!   [`bulkload_core::TableDescriptor`], rejecting the DDL features the
//!   import pipeline deliberately does not support.
//! - [`types`]: the [`Datum`](types::Datum) runtime value and CSV field
//!   parsing (temporal types are parsed in UTC).
//! - [`keycode`]: order-preserving datum encoding for index keys.
//! - [`row`]: the row encoder that turns one typed row into the primary
//!   index KV plus one KV per secondary index, and the synthetic rowid
//!   generator backing hidden-column defaults.
//!
//! The descriptor types themselves live in `bulkload-core` so the backup
//! manifest can embed them without depending on the parser.

pub mod ddl;
pub mod error;
pub mod keycode;
pub mod row;
pub mod types;
pub mod valuecode;

pub use ddl::parse_create_table;
pub use error::{Error, Result};
pub use row::{RowEncoder, RowIdGenerator};
pub use types::{parse_datum, Datum};
