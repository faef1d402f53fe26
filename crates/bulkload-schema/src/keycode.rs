//! Order-Preserving Key Encoding
//!
//! Encodes datums so that plain byte comparison of the encoded form agrees
//! with SQL ordering of the values. The sorter and the SST format compare
//! keys with `memcmp` only; every ordering rule lives here.
//!
//! Layout per datum: a one-byte type tag, then a type-specific payload.
//! NULL uses the smallest tag, so NULL sorts before every value.
//!
//! - Integers (and the day/nanosecond forms of DATE and TIMESTAMP) are
//!   written big-endian with the sign bit flipped, which makes negative
//!   values sort below positive ones.
//! - Floats flip all bits when negative and set the sign bit when
//!   positive, the standard IEEE-754 total-order trick.
//! - Strings and byte arrays escape interior 0x00 as 0x00 0xff and close
//!   with the 0x00 0x01 terminator, so a prefix sorts before any
//!   extension and the next encoded column cannot bleed into this one.
//!
//! DECIMAL has no byte-ordered encoding here; descriptor construction
//! rejects decimal index columns before a pipeline ever runs.

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};
use crate::types::Datum;

const TAG_NULL: u8 = 0x00;
const TAG_BOOL: u8 = 0x03;
const TAG_INT: u8 = 0x05;
const TAG_FLOAT: u8 = 0x06;
const TAG_DATE: u8 = 0x07;
const TAG_TIMESTAMP: u8 = 0x08;
const TAG_BYTES: u8 = 0x12;

const BYTES_TERM: [u8; 2] = [0x00, 0x01];
const BYTES_ESC_00: [u8; 2] = [0x00, 0xff];

/// Append the key encoding of one datum.
pub fn encode_datum_key(buf: &mut BytesMut, datum: &Datum) -> Result<()> {
    match datum {
        Datum::Null => buf.put_u8(TAG_NULL),
        Datum::Bool(b) => {
            buf.put_u8(TAG_BOOL);
            buf.put_u8(*b as u8);
        }
        Datum::Int(v) => {
            buf.put_u8(TAG_INT);
            put_ordered_i64(buf, *v);
        }
        Datum::Float(f) => {
            buf.put_u8(TAG_FLOAT);
            put_ordered_f64(buf, *f);
        }
        Datum::Date(days) => {
            buf.put_u8(TAG_DATE);
            put_ordered_i64(buf, *days);
        }
        Datum::Timestamp(ts) => {
            let nanos = ts
                .timestamp_nanos_opt()
                .ok_or_else(|| Error::TimestampRange(String::new()))?;
            buf.put_u8(TAG_TIMESTAMP);
            put_ordered_i64(buf, nanos);
        }
        Datum::String(s) => {
            buf.put_u8(TAG_BYTES);
            put_escaped(buf, s.as_bytes());
        }
        Datum::Bytes(b) => {
            buf.put_u8(TAG_BYTES);
            put_escaped(buf, b);
        }
        Datum::Decimal(_) => {
            return Err(Error::DecimalKeyColumn(String::new()));
        }
    }
    Ok(())
}

fn put_ordered_i64(buf: &mut BytesMut, v: i64) {
    buf.put_u64((v as u64) ^ (1 << 63));
}

fn put_ordered_f64(buf: &mut BytesMut, f: f64) {
    let bits = f.to_bits();
    let ordered = if bits & (1 << 63) != 0 {
        !bits
    } else {
        bits | (1 << 63)
    };
    buf.put_u64(ordered);
}

fn put_escaped(buf: &mut BytesMut, mut data: &[u8]) {
    while let Some(idx) = data.iter().position(|b| *b == 0x00) {
        buf.put_slice(&data[..idx]);
        buf.put_slice(&BYTES_ESC_00);
        data = &data[idx + 1..];
    }
    buf.put_slice(data);
    buf.put_slice(&BYTES_TERM);
}

/// Decode one datum previously written by [`encode_datum_key`].
///
/// Used by tests and offline inspection tooling; the pipeline itself never
/// decodes keys.
pub fn decode_datum_key(data: &mut &[u8]) -> Result<Datum> {
    let truncated = || Error::Parse("truncated key".to_string());
    let (&tag, rest) = data.split_first().ok_or_else(truncated)?;
    *data = rest;
    match tag {
        TAG_NULL => Ok(Datum::Null),
        TAG_BOOL => {
            let (&b, rest) = data.split_first().ok_or_else(truncated)?;
            *data = rest;
            Ok(Datum::Bool(b != 0))
        }
        TAG_INT => Ok(Datum::Int(take_ordered_i64(data)?)),
        TAG_DATE => Ok(Datum::Date(take_ordered_i64(data)?)),
        TAG_TIMESTAMP => {
            let nanos = take_ordered_i64(data)?;
            Ok(Datum::Timestamp(chrono::DateTime::from_timestamp_nanos(
                nanos,
            )))
        }
        TAG_FLOAT => {
            if data.len() < 8 {
                return Err(truncated());
            }
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&data[..8]);
            *data = &data[8..];
            let ordered = u64::from_be_bytes(raw);
            let bits = if ordered & (1 << 63) != 0 {
                ordered & !(1 << 63)
            } else {
                !ordered
            };
            Ok(Datum::Float(f64::from_bits(bits)))
        }
        TAG_BYTES => {
            let mut out = Vec::new();
            loop {
                let idx = data
                    .iter()
                    .position(|b| *b == 0x00)
                    .ok_or_else(truncated)?;
                out.extend_from_slice(&data[..idx]);
                match data.get(idx + 1) {
                    Some(0x01) => {
                        *data = &data[idx + 2..];
                        return Ok(Datum::Bytes(out));
                    }
                    Some(0xff) => {
                        out.push(0x00);
                        *data = &data[idx + 2..];
                    }
                    _ => return Err(truncated()),
                }
            }
        }
        other => Err(Error::Parse(format!("unknown key tag {other:#04x}"))),
    }
}

fn take_ordered_i64(data: &mut &[u8]) -> Result<i64> {
    if data.len() < 8 {
        return Err(Error::Parse("truncated key".to_string()));
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&data[..8]);
    *data = &data[8..];
    Ok((u64::from_be_bytes(raw) ^ (1 << 63)) as i64)
}
