//! Table, Column, and Index Descriptors
//!
//! The parsed, immutable form of the user's `CREATE TABLE` statement. The
//! schema crate builds these from DDL; the pipeline reads them to drive
//! field parsing and key encoding, and the finalizer embeds them verbatim
//! in the backup descriptor so a restore can recreate the table.
//!
//! Descriptors are plain serde values. They are constructed once at
//! pipeline start and shared read-only from then on.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::record::KeySpan;

/// SQL column types the converter can parse from CSV fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Int,
    Float,
    Bool,
    String,
    Bytes,
    Date,
    Timestamp,
    Decimal,
}

impl ColumnType {
    /// The SQL spelling used in user-facing error messages.
    pub fn sql_name(&self) -> &'static str {
        match self {
            ColumnType::Int => "INT",
            ColumnType::Float => "FLOAT",
            ColumnType::Bool => "BOOL",
            ColumnType::String => "STRING",
            ColumnType::Bytes => "BYTES",
            ColumnType::Date => "DATE",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Decimal => "DECIMAL",
        }
    }
}

/// A single table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Stable column id, assigned in declaration order starting at 1.
    pub id: u32,

    /// Column name, lowercased.
    pub name: String,

    pub ty: ColumnType,

    pub nullable: bool,

    /// Hidden columns are not populated from CSV fields; they get their
    /// values from a default generator (the synthetic rowid).
    pub hidden: bool,
}

/// An index over a subset of columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    /// Index id; the primary index is always 1.
    pub id: u32,

    pub name: String,

    /// Indexed column ids, in index order.
    pub column_ids: Vec<u32>,

    pub unique: bool,
}

/// The complete parsed table schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Table id within the synthetic database.
    pub id: u32,

    pub name: String,

    /// All columns, visible first, hidden last, in id order.
    pub columns: Vec<ColumnDescriptor>,

    pub primary_index: IndexDescriptor,

    /// Secondary indexes, in declaration order.
    pub indexes: Vec<IndexDescriptor>,
}

impl TableDescriptor {
    /// Columns populated from CSV fields, in declaration order.
    pub fn visible_columns(&self) -> Vec<&ColumnDescriptor> {
        self.columns.iter().filter(|c| !c.hidden).collect()
    }

    pub fn column(&self, id: u32) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.id == id)
    }

    /// Key prefix of one index of this table.
    pub fn index_prefix(&self, index_id: u32) -> Bytes {
        index_prefix(self.id, index_id)
    }

    /// The span covering every key this table can produce.
    pub fn table_span(&self) -> KeySpan {
        let mut start = BytesMut::with_capacity(4);
        start.put_u32(self.id);
        let mut end = BytesMut::with_capacity(4);
        end.put_u32(self.id + 1);
        KeySpan::new(start.freeze(), end.freeze())
    }
}

/// The synthetic database wrapping an imported table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseDescriptor {
    pub id: u32,
    pub name: String,
}

/// Key prefix for `(table, index)`: both ids big-endian so prefixes sort
/// with the table's key space.
pub fn index_prefix(table_id: u32, index_id: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(8);
    buf.put_u32(table_id);
    buf.put_u32(index_id);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_column_table() -> TableDescriptor {
        TableDescriptor {
            id: 51,
            name: "t".to_string(),
            columns: vec![
                ColumnDescriptor {
                    id: 1,
                    name: "c1".to_string(),
                    ty: ColumnType::Int,
                    nullable: false,
                    hidden: false,
                },
                ColumnDescriptor {
                    id: 2,
                    name: "c2".to_string(),
                    ty: ColumnType::String,
                    nullable: true,
                    hidden: false,
                },
                ColumnDescriptor {
                    id: 3,
                    name: "rowid".to_string(),
                    ty: ColumnType::Int,
                    nullable: false,
                    hidden: true,
                },
            ],
            primary_index: IndexDescriptor {
                id: 1,
                name: "primary".to_string(),
                column_ids: vec![1],
                unique: true,
            },
            indexes: vec![],
        }
    }

    #[test]
    fn test_visible_columns_skip_hidden() {
        let desc = two_column_table();
        let visible = desc.visible_columns();
        assert_eq!(visible.len(), 2);
        assert_eq!(visible[0].name, "c1");
        assert_eq!(visible[1].name, "c2");
    }

    #[test]
    fn test_column_lookup() {
        let desc = two_column_table();
        assert_eq!(desc.column(2).unwrap().name, "c2");
        assert!(desc.column(9).is_none());
    }

    #[test]
    fn test_index_prefix_sorts_by_table_then_index() {
        assert!(index_prefix(51, 1) < index_prefix(51, 2));
        assert!(index_prefix(51, 2) < index_prefix(52, 1));
    }

    #[test]
    fn test_table_span_contains_index_keys() {
        let desc = two_column_table();
        let span = desc.table_span();
        assert!(span.contains(&desc.index_prefix(1)));
        assert!(span.contains(&desc.index_prefix(2)));
        assert!(!span.contains(&index_prefix(52, 1)));
    }

    #[test]
    fn test_descriptor_serde_roundtrip() {
        let desc = two_column_table();
        let json = serde_json::to_string(&desc).expect("serialize");
        let back: TableDescriptor = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(desc, back);
    }

    #[test]
    fn test_column_type_sql_names() {
        assert_eq!(ColumnType::Int.sql_name(), "INT");
        assert_eq!(ColumnType::Timestamp.sql_name(), "TIMESTAMP");
    }
}
