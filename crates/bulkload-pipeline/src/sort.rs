//! Sorter/Writer Stage
//!
//! Drains the KV channel into the disk-backed multi-map, then iterates it
//! in key order and cuts SST segments of bounded size. Segmentation
//! rules, in order, for each sorted entry:
//!
//! 1. The first entry of a segment records `first_key`. If it equals the
//!    last key of the previous segment, the run has a duplicate primary
//!    key spanning a segment boundary, which is fatal.
//! 2. The entry is added to the builder; the builder itself rejects
//!    duplicates inside a segment, and that error is wrapped with the
//!    offending key and the duplicate-key hint.
//! 3. Once the builder's data size passes the bound, the segment is
//!    emitted with span `[first_key, key_next(last added))` and a fresh
//!    builder starts. The bound is soft: every segment except the last
//!    was over it at the moment it was cut.
//!
//! Entries are stamped with the pipeline wall time as they enter the
//! builder; the multi-map only preserves key and value bytes.

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use bulkload_core::{key_next, KeySpan, KeyValue, SstSegment};
use bulkload_storage::error::hex_key;
use bulkload_storage::{KvMultimap, SstBuilder};

use crate::error::{Error, Result};

/// Sort the KV stream and emit segments of at most roughly
/// `sst_max_bytes`. Returns the total number of KVs written.
pub async fn write_sorted(
    mut kv_rx: mpsc::Receiver<KeyValue>,
    mut map: KvMultimap,
    sst_max_bytes: u64,
    walltime_nanos: i64,
    seg_tx: mpsc::Sender<SstSegment>,
    token: CancellationToken,
) -> Result<u64> {
    // Write phase: unordered inserts, spilling runs as needed.
    while let Some(kv) = kv_rx.recv().await {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        map.insert(kv.key, kv.value)?;
    }
    let count = map.len();
    debug!(kvs = count, "KV stream drained, starting sorted iteration");

    // Read phase: sorted iteration and segmentation.
    let mut sst = SstBuilder::new(walltime_nanos);
    let mut first_key: Option<Bytes> = None;
    let mut prev_segment_last_key: Option<Bytes> = None;

    for entry in map.close_writes()? {
        let (key, value) = entry?;

        if first_key.is_none() {
            // Guard against a duplicate key straddling the segment cut.
            if prev_segment_last_key.as_ref() == Some(&key) {
                return Err(Error::DuplicateKey {
                    key: hex_key(&key),
                });
            }
            first_key = Some(key.clone());
        }

        sst.add(&key, &value).map_err(|e| Error::SstAdd {
            key: hex_key(&key),
            source: e,
        })?;

        if sst.data_size() > sst_max_bytes {
            let start = first_key.take().unwrap_or_else(|| key.clone());
            let finished = std::mem::replace(&mut sst, SstBuilder::new(walltime_nanos));
            send_segment(&seg_tx, &token, finished, start, &key).await?;
            prev_segment_last_key = Some(key);
        }
    }

    // Tail segment, if anything is buffered.
    if sst.entry_count() > 0 {
        let last = sst
            .last_key()
            .cloned()
            .ok_or_else(|| Error::Internal("builder has entries but no last key".into()))?;
        let start = first_key
            .take()
            .ok_or_else(|| Error::Internal("builder has entries but no first key".into()))?;
        send_segment(&seg_tx, &token, sst, start, &last).await?;
    }

    Ok(count)
}

async fn send_segment(
    seg_tx: &mpsc::Sender<SstSegment>,
    token: &CancellationToken,
    sst: SstBuilder,
    first_key: Bytes,
    last_key: &Bytes,
) -> Result<()> {
    let size = sst.data_size();
    let data = sst.finish()?;
    let segment = SstSegment {
        data,
        size,
        span: KeySpan::new(first_key, key_next(last_key)),
    };
    tokio::select! {
        _ = token.cancelled() => Err(Error::Cancelled),
        sent = seg_tx.send(segment) => {
            if sent.is_err() {
                return Err(Error::Cancelled);
            }
            Ok(())
        }
    }
}
