//! Pipeline Record Shapes
//!
//! The three value types that travel through the import pipeline's
//! channels, plus [`KeySpan`] and the key successor helper the sorter and
//! finalizer use to describe half-open key ranges.
//!
//! ## Ownership
//!
//! Every record is owned by exactly one stage at a time. A record is
//! created by its producer, moved into a channel, and dropped by its
//! consumer; nothing here is reference counted or locked. Keys and values
//! use `bytes::Bytes` so the sorter and finalizer can slice without
//! copying.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// A single decoded CSV row, tagged with its origin for error reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRecord {
    /// Raw field strings, in file order.
    pub fields: Vec<String>,

    /// Source file URI.
    pub file: String,

    /// 1-based row number within the source file.
    pub row: u64,
}

impl CsvRecord {
    pub fn new(fields: Vec<String>, file: impl Into<String>, row: u64) -> Self {
        Self {
            fields,
            file: file.into(),
            row,
        }
    }
}

/// An encoded key/value pair.
///
/// The key bytes sort in the order the target index requires; the value
/// bytes are opaque to the sorter. The pipeline-wide wall-clock timestamp
/// is applied when the pair is added to an SST, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Bytes,
    pub value: Bytes,
}

impl KeyValue {
    pub fn new(key: Bytes, value: Bytes) -> Self {
        Self { key, value }
    }

    /// Size used for sampling weights and channel accounting.
    pub fn estimated_size(&self) -> usize {
        self.key.len() + self.value.len()
    }
}

/// A half-open key range `[start, end)`.
///
/// Spans order by start key, then end key. The finalizer sorts descriptor
/// entries with exactly this ordering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeySpan {
    pub start: Bytes,
    pub end: Bytes,
}

impl KeySpan {
    pub fn new(start: Bytes, end: Bytes) -> Self {
        Self { start, end }
    }

    /// True if `key` falls inside the span.
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start.as_ref() && key < self.end.as_ref()
    }

    /// True if the two spans share any key.
    pub fn overlaps(&self, other: &KeySpan) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// The immediate successor of `key` in byte order: `key ++ 0x00`.
///
/// Used to turn the last key added to a segment into an exclusive end
/// bound without claiming any key that could actually be written.
pub fn key_next(key: &[u8]) -> Bytes {
    let mut next = BytesMut::with_capacity(key.len() + 1);
    next.put_slice(key);
    next.put_u8(0);
    next.freeze()
}

/// A finished SST file, ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SstSegment {
    /// The complete file contents.
    pub data: Bytes,

    /// Logical data size reported by the builder.
    pub size: u64,

    /// Keys covered, `[first added, key_next(last added))`.
    pub span: KeySpan,
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---------------------------------------------------------------
    // CsvRecord
    // ---------------------------------------------------------------

    #[test]
    fn test_csv_record_new() {
        let rec = CsvRecord::new(vec!["1".into(), "ten".into()], "file:///a.csv", 3);
        assert_eq!(rec.fields, vec!["1", "ten"]);
        assert_eq!(rec.file, "file:///a.csv");
        assert_eq!(rec.row, 3);
    }

    // ---------------------------------------------------------------
    // KeyValue
    // ---------------------------------------------------------------

    #[test]
    fn test_key_value_estimated_size() {
        let kv = KeyValue::new(Bytes::from_static(b"abc"), Bytes::from_static(b"defgh"));
        assert_eq!(kv.estimated_size(), 8);
    }

    #[test]
    fn test_key_value_empty_value() {
        let kv = KeyValue::new(Bytes::from_static(b"k"), Bytes::new());
        assert_eq!(kv.estimated_size(), 1);
        assert!(kv.value.is_empty());
    }

    // ---------------------------------------------------------------
    // key_next
    // ---------------------------------------------------------------

    #[test]
    fn test_key_next_appends_zero() {
        assert_eq!(key_next(b"ab").as_ref(), b"ab\x00");
        assert_eq!(key_next(b"").as_ref(), b"\x00");
    }

    #[test]
    fn test_key_next_is_strict_successor() {
        let key = b"foo\xff";
        let next = key_next(key);
        assert!(next.as_ref() > key.as_slice());
        // Nothing sorts strictly between key and key_next(key).
        assert_eq!(next.len(), key.len() + 1);
    }

    // ---------------------------------------------------------------
    // KeySpan
    // ---------------------------------------------------------------

    fn span(start: &'static [u8], end: &'static [u8]) -> KeySpan {
        KeySpan::new(Bytes::from_static(start), Bytes::from_static(end))
    }

    #[test]
    fn test_span_contains() {
        let s = span(b"b", b"d");
        assert!(!s.contains(b"a"));
        assert!(s.contains(b"b"));
        assert!(s.contains(b"c"));
        assert!(!s.contains(b"d"));
    }

    #[test]
    fn test_span_overlaps() {
        let a = span(b"a", b"c");
        let b = span(b"b", b"d");
        let c = span(b"c", b"e");
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&c));
        // Touching spans do not overlap: [a,c) and [c,e).
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_span_ordering_by_start_then_end() {
        let mut spans = vec![span(b"b", b"c"), span(b"a", b"z"), span(b"a", b"b")];
        spans.sort();
        assert_eq!(spans[0], span(b"a", b"b"));
        assert_eq!(spans[1], span(b"a", b"z"));
        assert_eq!(spans[2], span(b"b", b"c"));
    }

    #[test]
    fn test_span_serde_roundtrip() {
        let s = span(b"\x00\x01", b"\xff");
        let json = serde_json::to_string(&s).expect("serialize");
        let back: KeySpan = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(s, back);
    }
}
