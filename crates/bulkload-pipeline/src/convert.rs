//! Converter Stage
//!
//! Turns [`CsvRecord`]s into [`KeyValue`]s. The stage runs as a fan-out:
//! one worker per CPU, all pulling from a single shared record channel
//! and pushing into a single shared KV channel. The orchestrator closes
//! the KV channel only after every worker has exited.
//!
//! Per record, a worker:
//! 1. substitutes NULL where a field exactly equals the `nullif` option,
//! 2. parses every other field into its column's datum type (UTC for
//!    temporal types), failing with file, row, column, and SQL type,
//! 3. evaluates hidden-column defaults for this row (the synthetic rowid
//!    generator is stateful and non-deterministic, so this is per row,
//!    never batched),
//! 4. encodes the row into its primary and secondary index KVs; no
//!    foreign-key or conflict checking, import assumes clean input.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use bulkload_core::{CsvRecord, KeyValue, TableDescriptor};
use bulkload_schema::types::Datum;
use bulkload_schema::{parse_datum, RowEncoder, RowIdGenerator};

use crate::error::{Error, Result};

/// A record receiver shared by all converter workers.
pub type SharedRecords = Arc<Mutex<mpsc::Receiver<CsvRecord>>>;

/// Stateless-per-record converter shared across workers.
pub struct RecordConverter {
    desc: Arc<TableDescriptor>,
    nullif: Option<String>,
    rowid: RowIdGenerator,
}

impl RecordConverter {
    pub fn new(desc: Arc<TableDescriptor>, nullif: Option<String>) -> Self {
        Self {
            desc,
            nullif,
            rowid: RowIdGenerator::new(),
        }
    }

    /// Convert one record into its key/value pairs.
    pub fn convert(&self, record: &CsvRecord) -> Result<Vec<KeyValue>> {
        let mut datums = Vec::with_capacity(self.desc.columns.len());
        let visible = self.desc.visible_columns();
        debug_assert_eq!(record.fields.len(), visible.len());

        for (field, col) in record.fields.iter().zip(visible) {
            let datum = if self.nullif.as_deref() == Some(field.as_str()) {
                Datum::Null
            } else {
                parse_datum(field, col.ty).map_err(|e| Error::FieldParse {
                    file: record.file.clone(),
                    row: record.row,
                    column: col.name.clone(),
                    ty: col.ty.sql_name(),
                    source: e,
                })?
            };
            datums.push(datum);
        }

        // Hidden columns come after the visible ones in column order;
        // evaluate their defaults for this row.
        for _ in self.desc.columns.iter().filter(|c| c.hidden) {
            datums.push(Datum::Int(self.rowid.next_row_id()));
        }
        debug_assert_eq!(datums.len(), self.desc.columns.len());

        RowEncoder::new(&self.desc)
            .encode_row(&datums)
            .map_err(|e| Error::RowEncode {
                file: record.file.clone(),
                row: record.row,
                source: e,
            })
    }
}

/// One converter worker: drain the shared record channel until it closes,
/// forwarding every produced KV.
pub async fn convert_records(
    converter: Arc<RecordConverter>,
    records: SharedRecords,
    tx: mpsc::Sender<KeyValue>,
    token: CancellationToken,
) -> Result<()> {
    loop {
        // Hold the lock only for the receive itself.
        let record = { records.lock().await.recv().await };
        let Some(record) = record else { break };
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        for kv in converter.convert(&record)? {
            tokio::select! {
                _ = token.cancelled() => return Err(Error::Cancelled),
                sent = tx.send(kv) => {
                    if sent.is_err() {
                        return Err(Error::Cancelled);
                    }
                }
            }
        }
    }
    Ok(())
}
