//! Reader Stage
//!
//! Opens each CSV source through the storage layer, decodes rows with a
//! permissive dialect, validates per-row arity, and feeds
//! [`CsvRecord`]s into the bounded record channel.
//!
//! Files are drained strictly one after another; records of a single file
//! arrive in file order and row numbers restart at 1 per file. The one
//! shape exception the dialect allows is a single extra trailing empty
//! field, the classic trailing-comma artifact, which is trimmed and
//! accepted. Any other arity mismatch fails the import with the row
//! number in the message.
//!
//! Cancellation is observed before every send; on any per-file error the
//! error is wrapped with the file URI and returned, and the orchestrator
//! cancels the rest of the pipeline.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use bulkload_core::CsvRecord;
use bulkload_storage::ExportStore;

use crate::error::{Error, Result};
use crate::options::ImportOptions;

/// Read every file in order, sending decoded records to `tx`. Returns the
/// number of accepted rows across all files.
pub async fn read_files(
    files: &[String],
    opts: &ImportOptions,
    expected_cols: usize,
    tx: mpsc::Sender<CsvRecord>,
    token: CancellationToken,
) -> Result<u64> {
    let mut count = 0u64;
    for file in files {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        count += read_one_file(file, opts, expected_cols, &tx, &token)
            .await
            .map_err(|e| e.in_file(file))?;
    }
    Ok(count)
}

async fn read_one_file(
    file: &str,
    opts: &ImportOptions,
    expected_cols: usize,
    tx: &mpsc::Sender<CsvRecord>,
    token: &CancellationToken,
) -> Result<u64> {
    let store = ExportStore::from_uri(file)?;
    let data = store.read_all("").await?;
    debug!(file, bytes = data.len(), "reading CSV source");

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(opts.delimiter)
        .comment(opts.comment)
        .from_reader(data.as_ref());

    let mut count = 0u64;
    for (i, result) in reader.records().enumerate() {
        let row = i as u64 + 1;
        let record = result.map_err(|e| Error::CsvDecode {
            row,
            message: e.to_string(),
        })?;
        let mut fields: Vec<String> = record.iter().map(|f| f.to_string()).collect();

        if fields.len() == expected_cols {
            // Expected shape.
        } else if fields.len() == expected_cols + 1
            && fields.last().map(|f| f.is_empty()).unwrap_or(false)
        {
            // Trailing comma; drop the empty field.
            fields.pop();
        } else {
            return Err(Error::RowShape {
                row,
                expected: expected_cols,
                got: fields.len(),
            });
        }

        let record = CsvRecord::new(fields, file, row);
        tokio::select! {
            _ = token.cancelled() => return Err(Error::Cancelled),
            sent = tx.send(record) => {
                if sent.is_err() {
                    // Receiver gone; the pipeline is tearing down.
                    return Err(Error::Cancelled);
                }
                count += 1;
            }
        }
    }
    Ok(count)
}
