//! Disk-Backed External Sort
//!
//! [`KvMultimap`] is the two-phase multi-map behind the sorter stage.
//!
//! **Write phase**: inserts arrive in arbitrary order and accumulate in
//! memory. When the buffer passes its byte budget, it is sorted and
//! spilled as one run file into a private temp directory. Duplicate keys
//! are kept; this is a multi-map, and deciding that duplicates are fatal
//! belongs to the SST writer downstream.
//!
//! **Read phase**: [`KvMultimap::close_writes`] flushes the tail and
//! returns a [`SortedKvIter`] that k-way-merges the runs through a binary
//! heap, yielding every entry in key order.
//!
//! Run files are flat length-prefixed records: `key_len u32 | key |
//! value_len u32 | value`. The temp directory is owned by the map (and
//! then by the iterator), so the spill files disappear on drop whether
//! the pipeline succeeds or fails.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::PathBuf;

use bytes::Bytes;
use tempfile::TempDir;
use tracing::debug;

use crate::error::Result;

/// Default in-memory buffer budget before a run is spilled.
pub const DEFAULT_BUFFER_BYTES: usize = 64 * 1024 * 1024;

/// Write phase of the external sort.
pub struct KvMultimap {
    dir: TempDir,
    buffer: Vec<(Bytes, Bytes)>,
    buffer_bytes: usize,
    max_buffer_bytes: usize,
    runs: Vec<PathBuf>,
    entries: u64,
}

impl KvMultimap {
    pub fn new() -> Result<Self> {
        Self::with_buffer_bytes(DEFAULT_BUFFER_BYTES)
    }

    /// A map that spills once the in-memory buffer exceeds
    /// `max_buffer_bytes`. Tests use tiny budgets to force many runs.
    pub fn with_buffer_bytes(max_buffer_bytes: usize) -> Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
            buffer: Vec::new(),
            buffer_bytes: 0,
            max_buffer_bytes: max_buffer_bytes.max(1),
            runs: Vec::new(),
            entries: 0,
        })
    }

    /// Insert one entry. Insertion order is arbitrary; duplicates are kept.
    pub fn insert(&mut self, key: Bytes, value: Bytes) -> Result<()> {
        self.buffer_bytes += key.len() + value.len();
        self.buffer.push((key, value));
        self.entries += 1;
        if self.buffer_bytes >= self.max_buffer_bytes {
            self.flush_run()?;
        }
        Ok(())
    }

    /// Total entries inserted so far.
    pub fn len(&self) -> u64 {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    fn flush_run(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        // Stable sort keeps equal keys in insertion order within a run.
        self.buffer.sort_by(|a, b| a.0.cmp(&b.0));

        let path = self.dir.path().join(format!("run-{}.kv", self.runs.len()));
        let mut writer = BufWriter::new(File::create(&path)?);
        for (key, value) in self.buffer.drain(..) {
            writer.write_all(&(key.len() as u32).to_be_bytes())?;
            writer.write_all(&key)?;
            writer.write_all(&(value.len() as u32).to_be_bytes())?;
            writer.write_all(&value)?;
        }
        writer.flush()?;
        debug!(run = self.runs.len(), path = %path.display(), "spilled sorted run");
        self.runs.push(path);
        self.buffer_bytes = 0;
        Ok(())
    }

    /// End the write phase and return the sorted merge iterator. The temp
    /// directory moves into the iterator and is removed when it drops.
    pub fn close_writes(mut self) -> Result<SortedKvIter> {
        self.flush_run()?;
        let mut readers = Vec::with_capacity(self.runs.len());
        for path in &self.runs {
            readers.push(RunReader::open(path)?);
        }
        let mut heap = BinaryHeap::with_capacity(readers.len());
        for (idx, reader) in readers.iter_mut().enumerate() {
            if let Some((key, value)) = reader.read_entry()? {
                heap.push(Reverse(RunHead { key, value, run: idx }));
            }
        }
        Ok(SortedKvIter {
            _dir: self.dir,
            readers,
            heap,
        })
    }
}

/// Head entry of one run inside the merge heap. Ties on key break by run
/// index so the merge is deterministic.
struct RunHead {
    key: Bytes,
    value: Bytes,
    run: usize,
}

impl PartialEq for RunHead {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.run == other.run
    }
}

impl Eq for RunHead {}

impl PartialOrd for RunHead {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RunHead {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key).then(self.run.cmp(&other.run))
    }
}

struct RunReader {
    reader: BufReader<File>,
}

impl RunReader {
    fn open(path: &PathBuf) -> Result<Self> {
        Ok(Self {
            reader: BufReader::new(File::open(path)?),
        })
    }

    fn read_entry(&mut self) -> Result<Option<(Bytes, Bytes)>> {
        let mut len_raw = [0u8; 4];
        match self.reader.read_exact(&mut len_raw) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let key_len = u32::from_be_bytes(len_raw) as usize;
        let mut key = vec![0u8; key_len];
        self.reader.read_exact(&mut key)?;
        self.reader.read_exact(&mut len_raw)?;
        let value_len = u32::from_be_bytes(len_raw) as usize;
        let mut value = vec![0u8; value_len];
        self.reader.read_exact(&mut value)?;
        Ok(Some((Bytes::from(key), Bytes::from(value))))
    }
}

/// Read phase: yields entries in ascending key order.
pub struct SortedKvIter {
    _dir: TempDir,
    readers: Vec<RunReader>,
    heap: BinaryHeap<Reverse<RunHead>>,
}

impl Iterator for SortedKvIter {
    type Item = Result<(Bytes, Bytes)>;

    fn next(&mut self) -> Option<Self::Item> {
        let Reverse(head) = self.heap.pop()?;
        match self.readers[head.run].read_entry() {
            Ok(Some((key, value))) => {
                self.heap.push(Reverse(RunHead {
                    key,
                    value,
                    run: head.run,
                }));
            }
            Ok(None) => {}
            Err(e) => return Some(Err(e)),
        }
        Some(Ok((head.key, head.value)))
    }
}
