//! SST Format
//!
//! The immutable, sorted key/value file the backup is made of. Entries are
//! written in strictly increasing key order; a duplicate or out-of-order
//! add fails immediately with the offending key, which is how duplicate
//! primary keys in the input ultimately surface.
//!
//! ## File Layout (v1)
//!
//! ```text
//! [HEADER] magic "BLSS" (4) | version u16
//! [DATA]   repeated: key_len varint | key | walltime u64 | value_len varint | value
//! [FOOTER] entry_count u64 | crc32 of header+data (u32) | magic "BLSS" (4)
//! ```
//!
//! All fixed-width integers are big-endian. The wall time is the
//! pipeline-wide timestamp, identical for every entry of every segment in
//! one run; it is applied here, at add time, because the external sorter
//! upstream only preserves key and value bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use bulkload_core::varint;

use crate::error::{hex_key, Error, Result};

pub const SST_MAGIC: [u8; 4] = *b"BLSS";
pub const SST_VERSION: u16 = 1;

const HEADER_SIZE: usize = 6;
const FOOTER_SIZE: usize = 16;

/// Builds one SST file in memory.
pub struct SstBuilder {
    buf: BytesMut,
    walltime_nanos: i64,
    first_key: Option<Bytes>,
    last_key: Option<Bytes>,
    entry_count: u64,
    /// Logical bytes added (keys + values), before framing overhead.
    data_size: u64,
}

impl SstBuilder {
    /// Start a builder; every entry will carry `walltime_nanos`.
    pub fn new(walltime_nanos: i64) -> Self {
        let mut buf = BytesMut::new();
        buf.put_slice(&SST_MAGIC);
        buf.put_u16(SST_VERSION);
        Self {
            buf,
            walltime_nanos,
            first_key: None,
            last_key: None,
            entry_count: 0,
            data_size: 0,
        }
    }

    /// Append an entry. Keys must arrive in strictly increasing order;
    /// an equal or smaller key is rejected with the key in the error.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if let Some(last) = &self.last_key {
            if key <= last.as_ref() {
                return Err(Error::OutOfOrderKey { key: hex_key(key) });
            }
        }
        varint::encode_u64(&mut self.buf, key.len() as u64);
        self.buf.put_slice(key);
        self.buf.put_u64(self.walltime_nanos as u64);
        varint::encode_u64(&mut self.buf, value.len() as u64);
        self.buf.put_slice(value);

        if self.first_key.is_none() {
            self.first_key = Some(Bytes::copy_from_slice(key));
        }
        self.last_key = Some(Bytes::copy_from_slice(key));
        self.entry_count += 1;
        self.data_size += (key.len() + value.len()) as u64;
        Ok(())
    }

    /// Logical data size so far, the segmentation threshold input.
    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn first_key(&self) -> Option<&Bytes> {
        self.first_key.as_ref()
    }

    pub fn last_key(&self) -> Option<&Bytes> {
        self.last_key.as_ref()
    }

    /// Seal the file and return its bytes. A builder with no entries
    /// produces a valid zero-entry file (header and footer only).
    pub fn finish(mut self) -> Result<Bytes> {
        let crc = crc32fast::hash(&self.buf);
        self.buf.put_u64(self.entry_count);
        self.buf.put_u32(crc);
        self.buf.put_slice(&SST_MAGIC);
        Ok(self.buf.freeze())
    }
}

/// One decoded SST entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SstEntry {
    pub key: Bytes,
    pub walltime_nanos: i64,
    pub value: Bytes,
}

/// Reads and validates an SST file.
#[derive(Debug)]
pub struct SstReader {
    data: Bytes,
    entry_count: u64,
}

impl SstReader {
    pub fn new(data: Bytes) -> Result<Self> {
        if data.len() < HEADER_SIZE + FOOTER_SIZE {
            return Err(Error::InvalidSst("file too small".to_string()));
        }
        if data[..4] != SST_MAGIC {
            return Err(Error::InvalidSst("bad magic".to_string()));
        }
        let version = u16::from_be_bytes([data[4], data[5]]);
        if version != SST_VERSION {
            return Err(Error::InvalidSst(format!("unsupported version {version}")));
        }
        let footer = &data[data.len() - FOOTER_SIZE..];
        if footer[12..16] != SST_MAGIC {
            return Err(Error::InvalidSst("bad footer magic".to_string()));
        }
        let mut count_raw = [0u8; 8];
        count_raw.copy_from_slice(&footer[..8]);
        let entry_count = u64::from_be_bytes(count_raw);
        let mut crc_raw = [0u8; 4];
        crc_raw.copy_from_slice(&footer[8..12]);
        let stored_crc = u32::from_be_bytes(crc_raw);
        let actual_crc = crc32fast::hash(&data[..data.len() - FOOTER_SIZE]);
        if stored_crc != actual_crc {
            return Err(Error::InvalidSst("crc mismatch".to_string()));
        }
        Ok(Self { data, entry_count })
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Decode every entry, in file (= key) order.
    pub fn entries(&self) -> Result<Vec<SstEntry>> {
        let mut slice = &self.data[HEADER_SIZE..self.data.len() - FOOTER_SIZE];
        let mut out = Vec::with_capacity(self.entry_count as usize);
        while !slice.is_empty() {
            let key_len = varint::decode_u64(&mut slice)
                .map_err(|e| Error::InvalidSst(e.to_string()))? as usize;
            if slice.len() < key_len + 8 {
                return Err(Error::InvalidSst("truncated entry".to_string()));
            }
            let key = Bytes::copy_from_slice(&slice[..key_len]);
            slice.advance(key_len);
            let walltime_nanos = slice.get_u64() as i64;
            let value_len = varint::decode_u64(&mut slice)
                .map_err(|e| Error::InvalidSst(e.to_string()))? as usize;
            if slice.len() < value_len {
                return Err(Error::InvalidSst("truncated entry".to_string()));
            }
            let value = Bytes::copy_from_slice(&slice[..value_len]);
            slice.advance(value_len);
            out.push(SstEntry {
                key,
                walltime_nanos,
                value,
            });
        }
        if out.len() as u64 != self.entry_count {
            return Err(Error::InvalidSst(format!(
                "footer claims {} entries, file has {}",
                self.entry_count,
                out.len()
            )));
        }
        Ok(out)
    }
}
