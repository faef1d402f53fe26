//! Variable-length Integer Encoding
//!
//! LEB128-style varints used by the SST entry framing and the row value
//! encoding:
//!
//! - Unsigned varints for lengths and column ids: 0-127 fit in one byte,
//!   each further byte carries 7 more bits behind a continuation flag.
//! - ZigZag varints for signed datums, so small negative integers stay
//!   small on disk (0 -> 0, -1 -> 1, 1 -> 2, -2 -> 3, ...).
//!
//! Decoding reads untrusted file bytes, so it returns a `Result` instead
//! of panicking on truncated or oversized input.

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};

/// Encode a signed integer with ZigZag mapping.
pub fn encode_i64(buf: &mut impl BufMut, value: i64) {
    let unsigned = ((value << 1) ^ (value >> 63)) as u64;
    encode_u64(buf, unsigned);
}

/// Encode an unsigned integer.
pub fn encode_u64(buf: &mut impl BufMut, mut value: u64) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if value == 0 {
            break;
        }
    }
}

/// Decode a ZigZag-encoded signed integer.
pub fn decode_i64(buf: &mut impl Buf) -> Result<i64> {
    let unsigned = decode_u64(buf)?;
    let value = (unsigned >> 1) as i64;
    Ok(if unsigned & 1 != 0 { !value } else { value })
}

/// Decode an unsigned integer.
pub fn decode_u64(buf: &mut impl Buf) -> Result<u64> {
    let mut value: u64 = 0;
    let mut shift = 0;
    loop {
        if !buf.has_remaining() {
            return Err(Error::VarintTruncated);
        }
        let byte = buf.get_u8();
        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift >= 64 {
            return Err(Error::VarintOverflow);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn roundtrip_u64(value: u64) -> u64 {
        let mut buf = BytesMut::new();
        encode_u64(&mut buf, value);
        decode_u64(&mut buf.as_ref()).unwrap()
    }

    fn roundtrip_i64(value: i64) -> i64 {
        let mut buf = BytesMut::new();
        encode_i64(&mut buf, value);
        decode_i64(&mut buf.as_ref()).unwrap()
    }

    #[test]
    fn test_u64_roundtrip() {
        for v in [0, 1, 127, 128, 16_383, 16_384, 1_000_000, u64::MAX] {
            assert_eq!(roundtrip_u64(v), v);
        }
    }

    #[test]
    fn test_i64_roundtrip() {
        for v in [0, 1, -1, 63, -64, 1_000_000, -1_000_000, i64::MAX, i64::MIN] {
            assert_eq!(roundtrip_i64(v), v);
        }
    }

    #[test]
    fn test_small_values_one_byte() {
        let mut buf = BytesMut::new();
        encode_u64(&mut buf, 127);
        assert_eq!(buf.len(), 1);

        let mut buf = BytesMut::new();
        encode_u64(&mut buf, 128);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_decode_truncated() {
        // Continuation bit set but no following byte.
        let data = [0x80u8];
        let err = decode_u64(&mut data.as_ref()).unwrap_err();
        assert!(matches!(err, Error::VarintTruncated));
    }

    #[test]
    fn test_decode_empty() {
        let data: [u8; 0] = [];
        assert!(decode_u64(&mut data.as_ref()).is_err());
    }

    #[test]
    fn test_decode_overlong() {
        // Eleven continuation bytes push shift past 64 bits.
        let data = [0xffu8; 11];
        let err = decode_u64(&mut data.as_ref()).unwrap_err();
        assert!(matches!(err, Error::VarintOverflow));
    }
}
