//! Row Encoding
//!
//! [`RowEncoder`] turns one fully-typed row into its key/value pairs: one
//! for the primary index and one per secondary index. The import pipeline
//! runs it with no foreign-key and no conflict checking; duplicate primary
//! keys are caught later, by the sorted SST writer, not here.
//!
//! Key layout per index: `index_prefix(table, index)` then the
//! order-preserving encoding of each indexed column. Non-unique secondary
//! indexes append the primary-key columns to the key to keep entries
//! distinct; unique ones carry the primary key in the value instead.
//!
//! [`RowIdGenerator`] backs the hidden `rowid` column's default. Ids are
//! unique within a process and deliberately not reproducible across runs,
//! so defaults must be evaluated per row, never batched or memoized.

use std::sync::atomic::{AtomicI64, Ordering};

use bytes::BytesMut;
use chrono::Utc;

use bulkload_core::{ColumnDescriptor, KeyValue, TableDescriptor};

use crate::error::{Error, Result};
use crate::types::Datum;
use crate::valuecode;

/// Generates values for the hidden rowid column.
///
/// Ids are `wall-clock nanos at creation + a process-local counter`, which
/// keeps them unique and roughly time-ordered without any coordination.
pub struct RowIdGenerator {
    base: i64,
    counter: AtomicI64,
}

impl RowIdGenerator {
    pub fn new() -> Self {
        Self {
            base: Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            counter: AtomicI64::new(0),
        }
    }

    pub fn next_row_id(&self) -> i64 {
        self.base
            .wrapping_add(self.counter.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for RowIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Encodes typed rows into index key/value pairs for one table.
pub struct RowEncoder<'a> {
    desc: &'a TableDescriptor,
}

impl<'a> RowEncoder<'a> {
    pub fn new(desc: &'a TableDescriptor) -> Self {
        Self { desc }
    }

    /// Encode one row. `datums` must cover every column of the table, in
    /// column order (visible columns first, hidden defaults evaluated by
    /// the caller).
    pub fn encode_row(&self, datums: &[Datum]) -> Result<Vec<KeyValue>> {
        let columns = &self.desc.columns;
        if datums.len() != columns.len() {
            return Err(Error::RowArity {
                got: datums.len(),
                want: columns.len(),
            });
        }
        for (col, datum) in columns.iter().zip(datums) {
            if datum.is_null() && !col.nullable {
                return Err(Error::NullViolation(col.name.clone()));
            }
        }

        let mut kvs = Vec::with_capacity(1 + self.desc.indexes.len());

        // Primary index: key holds the PK columns, value holds the rest.
        let pk_suffix = self.encode_columns(&self.desc.primary_index.column_ids, datums)?;
        let mut key = BytesMut::from(self.desc.index_prefix(self.desc.primary_index.id).as_ref());
        key.extend_from_slice(&pk_suffix);
        let value = valuecode::encode_row_value(
            columns,
            datums,
            &self.desc.primary_index.column_ids,
        );
        kvs.push(KeyValue::new(key.freeze(), value));

        for index in &self.desc.indexes {
            let mut key = BytesMut::from(self.desc.index_prefix(index.id).as_ref());
            key.extend_from_slice(&self.encode_columns(&index.column_ids, datums)?);
            let value = if index.unique {
                // Unique entries keep the key short; the PK rides in the value.
                bytes::Bytes::copy_from_slice(&pk_suffix)
            } else {
                key.extend_from_slice(&pk_suffix);
                bytes::Bytes::new()
            };
            kvs.push(KeyValue::new(key.freeze(), value));
        }

        Ok(kvs)
    }

    fn encode_columns(&self, column_ids: &[u32], datums: &[Datum]) -> Result<Vec<u8>> {
        let mut buf = BytesMut::new();
        for id in column_ids {
            let (pos, col) = self.column_by_id(*id)?;
            crate::keycode::encode_datum_key(&mut buf, &datums[pos])
                .map_err(|e| rename_column_error(e, col))?;
        }
        Ok(buf.to_vec())
    }

    fn column_by_id(&self, id: u32) -> Result<(usize, &ColumnDescriptor)> {
        self.desc
            .columns
            .iter()
            .enumerate()
            .find(|(_, c)| c.id == id)
            .ok_or_else(|| Error::UnknownIndexColumn {
                index: self.desc.name.clone(),
                column: format!("#{id}"),
            })
    }
}

/// Attach the real column name to encoding errors that lack one.
fn rename_column_error(err: Error, col: &ColumnDescriptor) -> Error {
    match err {
        Error::DecimalKeyColumn(_) => Error::DecimalKeyColumn(col.name.clone()),
        Error::TimestampRange(_) => Error::TimestampRange(col.name.clone()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulkload_core::{ColumnType, IndexDescriptor};

    fn column(id: u32, name: &str, ty: ColumnType, nullable: bool) -> ColumnDescriptor {
        ColumnDescriptor {
            id,
            name: name.to_string(),
            ty,
            nullable,
            hidden: false,
        }
    }

    fn indexed_table() -> TableDescriptor {
        TableDescriptor {
            id: 51,
            name: "orders".to_string(),
            columns: vec![
                column(1, "id", ColumnType::Int, false),
                column(2, "customer", ColumnType::String, true),
                column(3, "total", ColumnType::Float, true),
            ],
            primary_index: IndexDescriptor {
                id: 1,
                name: "primary".to_string(),
                column_ids: vec![1],
                unique: true,
            },
            indexes: vec![IndexDescriptor {
                id: 2,
                name: "orders_customer_idx".to_string(),
                column_ids: vec![2],
                unique: false,
            }],
        }
    }

    fn row(id: i64, customer: &str, total: f64) -> Vec<Datum> {
        vec![
            Datum::Int(id),
            Datum::String(customer.to_string()),
            Datum::Float(total),
        ]
    }

    // ---------------------------------------------------------------
    // KV counts and prefixes
    // ---------------------------------------------------------------

    #[test]
    fn test_one_kv_per_index() {
        let desc = indexed_table();
        let encoder = RowEncoder::new(&desc);
        let kvs = encoder.encode_row(&row(1, "ada", 9.5)).unwrap();
        assert_eq!(kvs.len(), 2);
        assert!(kvs[0].key.starts_with(desc.index_prefix(1).as_ref()));
        assert!(kvs[1].key.starts_with(desc.index_prefix(2).as_ref()));
    }

    #[test]
    fn test_primary_key_determined_by_pk_columns() {
        let desc = indexed_table();
        let encoder = RowEncoder::new(&desc);
        // Same PK, different payload: identical primary keys.
        let a = encoder.encode_row(&row(7, "ada", 1.0)).unwrap();
        let b = encoder.encode_row(&row(7, "bob", 2.0)).unwrap();
        assert_eq!(a[0].key, b[0].key);
        assert_ne!(a[0].value, b[0].value);
        // Different PK: different primary keys.
        let c = encoder.encode_row(&row(8, "ada", 1.0)).unwrap();
        assert_ne!(a[0].key, c[0].key);
    }

    #[test]
    fn test_primary_keys_sort_like_pk_values() {
        let desc = indexed_table();
        let encoder = RowEncoder::new(&desc);
        let keys: Vec<_> = [-3i64, -1, 0, 2, 100]
            .iter()
            .map(|id| encoder.encode_row(&row(*id, "x", 0.0)).unwrap()[0].key.clone())
            .collect();
        for window in keys.windows(2) {
            assert!(window[0] < window[1]);
        }
    }

    // ---------------------------------------------------------------
    // Secondary index shapes
    // ---------------------------------------------------------------

    #[test]
    fn test_non_unique_index_key_includes_pk() {
        let desc = indexed_table();
        let encoder = RowEncoder::new(&desc);
        // Two rows with the same indexed value must produce distinct
        // secondary keys.
        let a = encoder.encode_row(&row(1, "ada", 1.0)).unwrap();
        let b = encoder.encode_row(&row(2, "ada", 1.0)).unwrap();
        assert_ne!(a[1].key, b[1].key);
        assert!(a[1].value.is_empty());
    }

    #[test]
    fn test_unique_index_carries_pk_in_value() {
        let mut desc = indexed_table();
        desc.indexes[0].unique = true;
        let encoder = RowEncoder::new(&desc);
        let kvs = encoder.encode_row(&row(5, "ada", 1.0)).unwrap();
        assert!(!kvs[1].value.is_empty());
        // Key stops at the indexed column: same customer, different PK,
        // same unique key.
        let other = encoder.encode_row(&row(6, "ada", 1.0)).unwrap();
        assert_eq!(kvs[1].key, other[1].key);
    }

    // ---------------------------------------------------------------
    // Validation
    // ---------------------------------------------------------------

    #[test]
    fn test_row_arity_checked() {
        let desc = indexed_table();
        let encoder = RowEncoder::new(&desc);
        let err = encoder.encode_row(&[Datum::Int(1)]).unwrap_err();
        assert!(matches!(err, Error::RowArity { got: 1, want: 3 }));
    }

    #[test]
    fn test_null_in_non_nullable_column() {
        let desc = indexed_table();
        let encoder = RowEncoder::new(&desc);
        let err = encoder
            .encode_row(&[Datum::Null, Datum::Null, Datum::Null])
            .unwrap_err();
        assert!(matches!(err, Error::NullViolation(name) if name == "id"));
    }

    #[test]
    fn test_null_allowed_in_nullable_column() {
        let desc = indexed_table();
        let encoder = RowEncoder::new(&desc);
        let kvs = encoder
            .encode_row(&[Datum::Int(1), Datum::Null, Datum::Null])
            .unwrap();
        assert_eq!(kvs.len(), 2);
    }

    // ---------------------------------------------------------------
    // RowIdGenerator
    // ---------------------------------------------------------------

    #[test]
    fn test_row_ids_unique_and_increasing() {
        let generator = RowIdGenerator::new();
        let a = generator.next_row_id();
        let b = generator.next_row_id();
        let c = generator.next_row_id();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_row_ids_differ_across_generators() {
        // Two generators created at different instants should not collide
        // on their first id.
        let a = RowIdGenerator::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = RowIdGenerator::new();
        assert_ne!(a.next_row_id(), b.next_row_id());
    }
}
