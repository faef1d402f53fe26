//! Row Value Encoding
//!
//! The payload side of a primary-index entry: every column that is not
//! part of the primary key, written as `(column id varint, type tag,
//! payload)` triples. NULL columns are simply omitted. Unlike the key
//! encoding this does not need to be order-preserving, only compact and
//! self-delimiting.

use bytes::{BufMut, Bytes, BytesMut};

use bulkload_core::{varint, ColumnDescriptor};

use crate::error::{Error, Result};
use crate::types::Datum;

const VTAG_INT: u8 = 1;
const VTAG_FLOAT: u8 = 2;
const VTAG_BOOL: u8 = 3;
const VTAG_BYTES: u8 = 4;
const VTAG_DECIMAL: u8 = 5;
const VTAG_DATE: u8 = 6;
const VTAG_TIMESTAMP: u8 = 7;

/// Encode the non-key columns of a row.
pub fn encode_row_value(
    columns: &[ColumnDescriptor],
    datums: &[Datum],
    key_column_ids: &[u32],
) -> Bytes {
    let mut buf = BytesMut::new();
    for (col, datum) in columns.iter().zip(datums) {
        if key_column_ids.contains(&col.id) || datum.is_null() {
            continue;
        }
        varint::encode_u64(&mut buf, col.id as u64);
        encode_datum_value(&mut buf, datum);
    }
    buf.freeze()
}

fn encode_datum_value(buf: &mut BytesMut, datum: &Datum) {
    match datum {
        Datum::Null => unreachable!("null columns are omitted"),
        Datum::Int(v) => {
            buf.put_u8(VTAG_INT);
            varint::encode_i64(buf, *v);
        }
        Datum::Float(f) => {
            buf.put_u8(VTAG_FLOAT);
            buf.put_u64(f.to_bits());
        }
        Datum::Bool(b) => {
            buf.put_u8(VTAG_BOOL);
            buf.put_u8(*b as u8);
        }
        Datum::String(s) => {
            buf.put_u8(VTAG_BYTES);
            varint::encode_u64(buf, s.len() as u64);
            buf.put_slice(s.as_bytes());
        }
        Datum::Bytes(b) => {
            buf.put_u8(VTAG_BYTES);
            varint::encode_u64(buf, b.len() as u64);
            buf.put_slice(b);
        }
        Datum::Decimal(d) => {
            buf.put_u8(VTAG_DECIMAL);
            varint::encode_u64(buf, d.len() as u64);
            buf.put_slice(d.as_bytes());
        }
        Datum::Date(days) => {
            buf.put_u8(VTAG_DATE);
            varint::encode_i64(buf, *days);
        }
        Datum::Timestamp(ts) => {
            buf.put_u8(VTAG_TIMESTAMP);
            // In range for any timestamp the parser accepts.
            varint::encode_i64(buf, ts.timestamp_nanos_opt().unwrap_or_default());
        }
    }
}

/// Decode a row value back into `(column id, datum)` pairs.
///
/// String columns come back as [`Datum::Bytes`]; the value encoding does
/// not distinguish the two. Used by tests and inspection tooling.
pub fn decode_row_value(mut data: &[u8]) -> Result<Vec<(u32, Datum)>> {
    let truncated = || Error::Parse("truncated row value".to_string());
    let mut out = Vec::new();
    while !data.is_empty() {
        let id = varint::decode_u64(&mut data).map_err(|_| truncated())? as u32;
        let (&tag, rest) = data.split_first().ok_or_else(truncated)?;
        data = rest;
        let datum = match tag {
            VTAG_INT => Datum::Int(varint::decode_i64(&mut data).map_err(|_| truncated())?),
            VTAG_FLOAT => {
                if data.len() < 8 {
                    return Err(truncated());
                }
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&data[..8]);
                data = &data[8..];
                Datum::Float(f64::from_bits(u64::from_be_bytes(raw)))
            }
            VTAG_BOOL => {
                let (&b, rest) = data.split_first().ok_or_else(truncated)?;
                data = rest;
                Datum::Bool(b != 0)
            }
            VTAG_BYTES | VTAG_DECIMAL => {
                let len = varint::decode_u64(&mut data).map_err(|_| truncated())? as usize;
                if data.len() < len {
                    return Err(truncated());
                }
                let raw = data[..len].to_vec();
                data = &data[len..];
                if tag == VTAG_DECIMAL {
                    Datum::Decimal(String::from_utf8(raw).map_err(|_| truncated())?)
                } else {
                    Datum::Bytes(raw)
                }
            }
            VTAG_DATE => Datum::Date(varint::decode_i64(&mut data).map_err(|_| truncated())?),
            VTAG_TIMESTAMP => {
                let nanos = varint::decode_i64(&mut data).map_err(|_| truncated())?;
                Datum::Timestamp(chrono::DateTime::from_timestamp_nanos(nanos))
            }
            other => return Err(Error::Parse(format!("unknown value tag {other}"))),
        };
        out.push((id, datum));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulkload_core::ColumnType;

    fn column(id: u32, name: &str, ty: ColumnType) -> ColumnDescriptor {
        ColumnDescriptor {
            id,
            name: name.to_string(),
            ty,
            nullable: true,
            hidden: false,
        }
    }

    #[test]
    fn test_roundtrip_skips_key_and_null_columns() {
        let columns = vec![
            column(1, "a", ColumnType::Int),
            column(2, "b", ColumnType::Int),
            column(3, "c", ColumnType::String),
        ];
        let datums = vec![Datum::Int(1), Datum::Null, Datum::String("hi".into())];
        let value = encode_row_value(&columns, &datums, &[1]);
        let decoded = decode_row_value(&value).unwrap();
        // Column 1 is a key column, column 2 is NULL; only column 3 remains.
        assert_eq!(decoded, vec![(3, Datum::Bytes(b"hi".to_vec()))]);
    }

    #[test]
    fn test_roundtrip_all_value_types() {
        let columns = vec![
            column(1, "i", ColumnType::Int),
            column(2, "f", ColumnType::Float),
            column(3, "b", ColumnType::Bool),
            column(4, "s", ColumnType::Bytes),
            column(5, "d", ColumnType::Decimal),
            column(6, "dt", ColumnType::Date),
        ];
        let datums = vec![
            Datum::Int(-99),
            Datum::Float(1.75),
            Datum::Bool(true),
            Datum::Bytes(vec![0, 1, 2]),
            Datum::Decimal("10.50".into()),
            Datum::Date(365),
        ];
        let value = encode_row_value(&columns, &datums, &[]);
        let decoded = decode_row_value(&value).unwrap();
        assert_eq!(decoded.len(), 6);
        assert_eq!(decoded[0], (1, Datum::Int(-99)));
        assert_eq!(decoded[1], (2, Datum::Float(1.75)));
        assert_eq!(decoded[2], (3, Datum::Bool(true)));
        assert_eq!(decoded[3], (4, Datum::Bytes(vec![0, 1, 2])));
        assert_eq!(decoded[4], (5, Datum::Decimal("10.50".into())));
        assert_eq!(decoded[5], (6, Datum::Date(365)));
    }

    #[test]
    fn test_empty_value_for_all_null_row() {
        let columns = vec![column(1, "a", ColumnType::Int), column(2, "b", ColumnType::Int)];
        let datums = vec![Datum::Int(7), Datum::Null];
        let value = encode_row_value(&columns, &datums, &[1]);
        assert!(value.is_empty());
    }

    #[test]
    fn test_decode_truncated_value() {
        let columns = vec![column(1, "s", ColumnType::String)];
        let datums = vec![Datum::String("hello".into())];
        let value = encode_row_value(&columns, &datums, &[]);
        assert!(decode_row_value(&value[..value.len() - 1]).is_err());
    }
}
