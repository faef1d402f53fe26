//! CREATE TABLE Parsing
//!
//! Turns the user-supplied `CREATE TABLE` statement into a
//! [`TableDescriptor`]. The import pipeline supports a deliberately small
//! slice of DDL; everything outside it is rejected here, before any data
//! file is opened:
//!
//! - `IF NOT EXISTS`, `CREATE TABLE ... AS`, and `LIKE` are unsupported.
//! - Foreign keys (column or table level) are unsupported.
//! - DEFAULT expressions on visible columns are unsupported; conversion
//!   must be deterministic from the CSV alone. The only default that
//!   exists is the synthetic hidden `rowid`, added when the table
//!   declares no primary key.
//! - DECIMAL columns cannot appear in any index key (no order-preserving
//!   encoding is defined for them).
//!
//! Ids are fixed: the synthetic database is 50 and the table 51, matching
//! what a fresh cluster would assign to its first user objects.

use sqlparser::ast::{ColumnOption, DataType, Statement, TableConstraint};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use bulkload_core::{ColumnDescriptor, ColumnType, IndexDescriptor, TableDescriptor};

use crate::error::{Error, Result};

/// Id of the synthetic database wrapping imported tables.
pub const DEFAULT_DATABASE_ID: u32 = 50;

/// Id assigned to the imported table.
pub const DEFAULT_TABLE_ID: u32 = 51;

/// Name of the synthetic database.
pub const DATABASE_NAME: &str = "csv";

/// Name of the hidden primary-key column synthesized when the table
/// declares no primary key.
pub const ROWID_COLUMN: &str = "rowid";

/// Parse a `CREATE TABLE` statement into a table descriptor.
pub fn parse_create_table(sql: &str) -> Result<TableDescriptor> {
    let statements = Parser::parse_sql(&GenericDialect {}, sql)
        .map_err(|e| Error::Parse(e.to_string()))?;
    let statement = match statements.as_slice() {
        [statement] => statement,
        other => {
            return Err(Error::Parse(format!(
                "expected exactly one statement, got {}",
                other.len()
            )))
        }
    };
    let create = match statement {
        Statement::CreateTable(create) => create,
        other => return Err(Error::NotCreateTable(statement_name(other))),
    };

    if create.if_not_exists {
        return Err(Error::IfNotExists);
    }
    if create.query.is_some() {
        return Err(Error::CreateAs);
    }
    if create.like.is_some() || create.clone.is_some() {
        return Err(Error::Parse("CREATE TABLE LIKE not supported".to_string()));
    }

    let table_name = create
        .name
        .0
        .last()
        .map(|ident| ident.value.to_lowercase())
        .ok_or_else(|| Error::Parse("missing table name".to_string()))?;

    // Columns, in declaration order, ids from 1.
    let mut columns = Vec::with_capacity(create.columns.len());
    let mut pk_column_ids: Option<Vec<u32>> = None;
    // (name, column ids unresolved as names, unique) for secondary indexes.
    let mut secondary: Vec<(String, Vec<String>, bool)> = Vec::new();

    for (i, col) in create.columns.iter().enumerate() {
        let id = i as u32 + 1;
        let name = col.name.value.to_lowercase();
        let ty = column_type(&col.data_type).ok_or_else(|| Error::UnsupportedType {
            name: name.clone(),
            ty: col.data_type.to_string(),
        })?;

        let mut nullable = true;
        for option in &col.options {
            match &option.option {
                ColumnOption::NotNull => nullable = false,
                ColumnOption::Null => nullable = true,
                ColumnOption::Default(_) => {
                    return Err(Error::VisibleDefault(name));
                }
                ColumnOption::ForeignKey { .. } => return Err(Error::ForeignKey),
                ColumnOption::Unique { is_primary, .. } => {
                    if *is_primary {
                        if pk_column_ids.is_some() {
                            return Err(Error::Parse(
                                "multiple primary keys declared".to_string(),
                            ));
                        }
                        pk_column_ids = Some(vec![id]);
                        nullable = false;
                    } else {
                        secondary.push((
                            format!("{table_name}_{name}_key"),
                            vec![name.clone()],
                            true,
                        ));
                    }
                }
                _ => {}
            }
        }

        columns.push(ColumnDescriptor {
            id,
            name,
            ty,
            nullable,
            hidden: false,
        });
    }

    for constraint in &create.constraints {
        match constraint {
            TableConstraint::PrimaryKey {
                columns: pk_cols, ..
            } => {
                if pk_column_ids.is_some() {
                    return Err(Error::Parse("multiple primary keys declared".to_string()));
                }
                let ids = resolve_columns("primary", pk_cols, &columns)?;
                for id in &ids {
                    if let Some(col) = columns.iter_mut().find(|c| c.id == *id) {
                        col.nullable = false;
                    }
                }
                pk_column_ids = Some(ids);
            }
            TableConstraint::Unique {
                name,
                columns: idx_cols,
                ..
            } => {
                let idx_name = name
                    .as_ref()
                    .map(|n| n.value.to_lowercase())
                    .unwrap_or_else(|| format!("{table_name}_key{}", secondary.len() + 1));
                secondary.push((
                    idx_name,
                    idx_cols.iter().map(|c| c.value.to_lowercase()).collect(),
                    true,
                ));
            }
            TableConstraint::Index {
                name,
                columns: idx_cols,
                ..
            } => {
                let idx_name = name
                    .as_ref()
                    .map(|n| n.value.to_lowercase())
                    .unwrap_or_else(|| format!("{table_name}_idx{}", secondary.len() + 1));
                secondary.push((
                    idx_name,
                    idx_cols.iter().map(|c| c.value.to_lowercase()).collect(),
                    false,
                ));
            }
            TableConstraint::ForeignKey { .. } => return Err(Error::ForeignKey),
            other => {
                return Err(Error::Parse(format!(
                    "unsupported table constraint: {other}"
                )))
            }
        }
    }

    // No declared primary key: add the hidden rowid column and key on it.
    let primary_column_ids = match pk_column_ids {
        Some(ids) => ids,
        None => {
            let id = columns.len() as u32 + 1;
            columns.push(ColumnDescriptor {
                id,
                name: ROWID_COLUMN.to_string(),
                ty: ColumnType::Int,
                nullable: false,
                hidden: true,
            });
            vec![id]
        }
    };

    let primary_index = IndexDescriptor {
        id: 1,
        name: "primary".to_string(),
        column_ids: primary_column_ids,
        unique: true,
    };

    let mut indexes = Vec::with_capacity(secondary.len());
    for (i, (name, column_names, unique)) in secondary.into_iter().enumerate() {
        let idents: Vec<sqlparser::ast::Ident> = column_names
            .iter()
            .map(|n| sqlparser::ast::Ident::new(n.clone()))
            .collect();
        let column_ids = resolve_columns(&name, &idents, &columns)?;
        indexes.push(IndexDescriptor {
            id: i as u32 + 2,
            name,
            column_ids,
            unique,
        });
    }

    let desc = TableDescriptor {
        id: DEFAULT_TABLE_ID,
        name: table_name,
        columns,
        primary_index,
        indexes,
    };

    // Every index key column needs an order-preserving encoding.
    let mut key_column_ids = desc.primary_index.column_ids.clone();
    for index in &desc.indexes {
        key_column_ids.extend_from_slice(&index.column_ids);
    }
    for id in key_column_ids {
        if let Some(col) = desc.column(id) {
            if col.ty == ColumnType::Decimal {
                return Err(Error::DecimalKeyColumn(col.name.clone()));
            }
        }
    }

    Ok(desc)
}

fn resolve_columns(
    index: &str,
    idents: &[sqlparser::ast::Ident],
    columns: &[ColumnDescriptor],
) -> Result<Vec<u32>> {
    idents
        .iter()
        .map(|ident| {
            let name = ident.value.to_lowercase();
            columns
                .iter()
                .find(|c| c.name == name)
                .map(|c| c.id)
                .ok_or_else(|| Error::UnknownIndexColumn {
                    index: index.to_string(),
                    column: name,
                })
        })
        .collect()
}

fn column_type(data_type: &DataType) -> Option<ColumnType> {
    match data_type {
        DataType::Int(_)
        | DataType::Integer(_)
        | DataType::BigInt(_)
        | DataType::SmallInt(_) => Some(ColumnType::Int),
        DataType::Float(_) | DataType::Real | DataType::DoublePrecision => {
            Some(ColumnType::Float)
        }
        DataType::Boolean => Some(ColumnType::Bool),
        DataType::Text
        | DataType::String(_)
        | DataType::Varchar(_)
        | DataType::Char(_)
        | DataType::CharacterVarying(_) => Some(ColumnType::String),
        DataType::Bytea | DataType::Blob(_) => Some(ColumnType::Bytes),
        DataType::Date => Some(ColumnType::Date),
        DataType::Timestamp(_, _) => Some(ColumnType::Timestamp),
        DataType::Decimal(_) | DataType::Numeric(_) => Some(ColumnType::Decimal),
        _ => None,
    }
}

fn statement_name(statement: &Statement) -> String {
    let text = statement.to_string();
    text.split_whitespace()
        .take(2)
        .collect::<Vec<_>>()
        .join(" ")
}
