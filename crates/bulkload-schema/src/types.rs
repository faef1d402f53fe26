//! Datum Model and CSV Field Parsing
//!
//! A [`Datum`] is the runtime value of one column in one row. The
//! converter parses every CSV field into the datum type its column
//! declares, then hands the assembled row to the encoder.
//!
//! Temporal parsing is always UTC: a timestamp without an offset is taken
//! as UTC, never local time, so the produced keys do not depend on the
//! machine that ran the import.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use bulkload_core::ColumnType;

use crate::error::{Error, Result};

/// Days between 1970-01-01 and a `NaiveDate`, the on-disk form of DATE.
fn days_since_epoch(date: NaiveDate) -> i64 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
    (date - epoch).num_days()
}

/// The runtime value of a single column.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
    /// Days since the Unix epoch.
    Date(i64),
    Timestamp(DateTime<Utc>),
    /// Normalized decimal text; compared and stored as text.
    Decimal(String),
}

impl Datum {
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }
}

/// Parse one CSV field into the datum type of its column.
///
/// The nullif substitution happens in the converter before this runs;
/// by the time a field reaches here it is a value, not a NULL sentinel.
pub fn parse_datum(field: &str, ty: ColumnType) -> Result<Datum> {
    let err = || Error::ParseDatum {
        value: field.to_string(),
        ty: ty.sql_name(),
    };
    match ty {
        ColumnType::Int => field.trim().parse::<i64>().map(Datum::Int).map_err(|_| err()),
        ColumnType::Float => field
            .trim()
            .parse::<f64>()
            .map(Datum::Float)
            .map_err(|_| err()),
        ColumnType::Bool => match field.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "1" => Ok(Datum::Bool(true)),
            "false" | "f" | "no" | "0" => Ok(Datum::Bool(false)),
            _ => Err(err()),
        },
        ColumnType::String => Ok(Datum::String(field.to_string())),
        ColumnType::Bytes => parse_bytes(field).ok_or_else(err),
        ColumnType::Date => NaiveDate::parse_from_str(field.trim(), "%Y-%m-%d")
            .map(|d| Datum::Date(days_since_epoch(d)))
            .map_err(|_| err()),
        ColumnType::Timestamp => parse_timestamp_utc(field.trim()).ok_or_else(err),
        ColumnType::Decimal => {
            let text = field.trim();
            // Validate the shape; keep the user's spelling.
            if text.parse::<f64>().is_ok() {
                Ok(Datum::Decimal(text.to_string()))
            } else {
                Err(err())
            }
        }
    }
}

/// BYTES fields accept `\x`-prefixed hex, otherwise raw UTF-8 bytes.
fn parse_bytes(field: &str) -> Option<Datum> {
    if let Some(hex) = field.strip_prefix("\\x") {
        if hex.len() % 2 != 0 {
            return None;
        }
        let mut out = Vec::with_capacity(hex.len() / 2);
        for i in (0..hex.len()).step_by(2) {
            out.push(u8::from_str_radix(&hex[i..i + 2], 16).ok()?);
        }
        Some(Datum::Bytes(out))
    } else {
        Some(Datum::Bytes(field.as_bytes().to_vec()))
    }
}

/// Accepts RFC 3339, or a bare `YYYY-MM-DD HH:MM:SS[.fff]` taken as UTC.
fn parse_timestamp_utc(field: &str) -> Option<Datum> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(field) {
        return Some(Datum::Timestamp(ts.with_timezone(&Utc)));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(field, format) {
            return Some(Datum::Timestamp(naive.and_utc()));
        }
    }
    None
}
