//! Import Options
//!
//! The `WITH (...)` option surface of the import statement, parsed from a
//! raw name/value map into [`ImportOptions`]. Option names, which options
//! take values, and the defaults all match the statement surface:
//!
//! | Option           | Value | Effect                                        |
//! |------------------|-------|-----------------------------------------------|
//! | `delimiter`      | yes   | single-character field separator, default `,` |
//! | `comment`        | yes   | single-character line-comment prefix          |
//! | `nullif`         | yes   | exact string treated as NULL                  |
//! | `sstsize`        | yes   | max SST bytes, human readable                 |
//! | `temp`           | yes   | working/destination URI, mandatory            |
//! | `distributed`    | no    | run the distributed topology                  |
//! | `transform_only` | no    | stop after the backup is written              |
//!
//! The default `sstsize` is half the default zone max-range size, so a
//! restored segment can split a range without immediately re-splitting.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

pub const OPT_DELIMITER: &str = "delimiter";
pub const OPT_COMMENT: &str = "comment";
pub const OPT_NULLIF: &str = "nullif";
pub const OPT_SSTSIZE: &str = "sstsize";
pub const OPT_TEMP: &str = "temp";
pub const OPT_DISTRIBUTED: &str = "distributed";
pub const OPT_TRANSFORM_ONLY: &str = "transform_only";

/// Default zone max-range size; the default segment bound is half of it.
pub const DEFAULT_RANGE_MAX_BYTES: u64 = 64 << 20;

/// Whether a recognized option takes a value; `None` for unknown options.
pub fn option_expects_value(name: &str) -> Option<bool> {
    match name {
        OPT_DELIMITER | OPT_COMMENT | OPT_NULLIF | OPT_SSTSIZE | OPT_TEMP => Some(true),
        OPT_DISTRIBUTED | OPT_TRANSFORM_ONLY => Some(false),
        _ => None,
    }
}

/// Parsed and validated import options.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// CSV field separator.
    pub delimiter: u8,

    /// Line-comment prefix; lines starting with it are skipped.
    pub comment: Option<u8>,

    /// Exact string decoded as SQL NULL.
    pub nullif: Option<String>,

    /// Soft upper bound on segment size; a segment is cut once the
    /// builder passes this many bytes.
    pub sst_max_bytes: u64,

    /// Working directory URI for segments and the descriptor.
    pub temp: String,

    pub distributed: bool,

    pub transform_only: bool,
}

impl ImportOptions {
    /// Parse a raw `WITH` option map.
    pub fn from_map(raw: &BTreeMap<String, String>) -> Result<Self> {
        for (name, value) in raw {
            match option_expects_value(name.as_str()) {
                None => {
                    return Err(Error::Config(format!("unknown option {name:?}")));
                }
                Some(true) if value.is_empty() => {
                    return Err(Error::Config(format!("option {name:?} requires a value")));
                }
                Some(false) if !value.is_empty() => {
                    return Err(Error::Config(format!("option {name:?} takes no value")));
                }
                Some(_) => {}
            }
        }

        let delimiter = match raw.get(OPT_DELIMITER) {
            Some(value) => single_byte_char(value)
                .ok_or_else(|| Error::Config(format!("invalid delimiter value: {value:?}")))?,
            None => b',',
        };
        let comment = match raw.get(OPT_COMMENT) {
            Some(value) => Some(
                single_byte_char(value)
                    .ok_or_else(|| Error::Config(format!("invalid comment value: {value:?}")))?,
            ),
            None => None,
        };
        let sst_max_bytes = match raw.get(OPT_SSTSIZE) {
            Some(value) => parse_size(value)?,
            None => DEFAULT_RANGE_MAX_BYTES / 2,
        };
        let temp = raw
            .get(OPT_TEMP)
            .cloned()
            .ok_or_else(|| Error::Config("must provide a temporary storage location".into()))?;

        Ok(Self {
            delimiter,
            comment,
            nullif: raw.get(OPT_NULLIF).cloned(),
            sst_max_bytes,
            temp,
            distributed: raw.contains_key(OPT_DISTRIBUTED),
            transform_only: raw.contains_key(OPT_TRANSFORM_ONLY),
        })
    }
}

/// A separator must be a single one-byte character; the CSV decoder works
/// on bytes.
fn single_byte_char(value: &str) -> Option<u8> {
    let mut chars = value.chars();
    let c = chars.next()?;
    if chars.next().is_some() || !c.is_ascii() {
        return None;
    }
    Some(c as u8)
}

/// Parse a human-readable byte size: bare bytes, SI suffixes (`KB`, `MB`,
/// ...) as powers of 1000, IEC suffixes (`KiB`, `MiB`, ...) as powers of
/// 1024, with an optional fractional part.
pub fn parse_size(input: &str) -> Result<u64> {
    let text = input.trim();
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, suffix) = text.split_at(split);
    let value: f64 = number
        .parse()
        .map_err(|_| Error::Config(format!("invalid size {input:?}")))?;
    let multiplier: u64 = match suffix.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "kb" | "k" => 1000,
        "mb" | "m" => 1000 * 1000,
        "gb" | "g" => 1000 * 1000 * 1000,
        "tb" | "t" => 1000u64.pow(4),
        "kib" => 1 << 10,
        "mib" => 1 << 20,
        "gib" => 1 << 30,
        "tib" => 1 << 40,
        _ => return Err(Error::Config(format!("invalid size {input:?}"))),
    };
    let bytes = value * multiplier as f64;
    if !bytes.is_finite() || bytes < 0.0 {
        return Err(Error::Config(format!("invalid size {input:?}")));
    }
    Ok(bytes as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    // ---------------------------------------------------------------
    // Defaults and parsing
    // ---------------------------------------------------------------

    #[test]
    fn test_defaults() {
        let opts = ImportOptions::from_map(&map(&[("temp", "memory://t/w")])).unwrap();
        assert_eq!(opts.delimiter, b',');
        assert!(opts.comment.is_none());
        assert!(opts.nullif.is_none());
        assert_eq!(opts.sst_max_bytes, DEFAULT_RANGE_MAX_BYTES / 2);
        assert!(!opts.distributed);
        assert!(!opts.transform_only);
    }

    #[test]
    fn test_all_options() {
        let opts = ImportOptions::from_map(&map(&[
            ("temp", "memory://t/w"),
            ("delimiter", "|"),
            ("comment", "#"),
            ("nullif", "NA"),
            ("sstsize", "1MB"),
            ("distributed", ""),
            ("transform_only", ""),
        ]))
        .unwrap();
        assert_eq!(opts.delimiter, b'|');
        assert_eq!(opts.comment, Some(b'#'));
        assert_eq!(opts.nullif.as_deref(), Some("NA"));
        assert_eq!(opts.sst_max_bytes, 1_000_000);
        assert!(opts.distributed);
        assert!(opts.transform_only);
    }

    // ---------------------------------------------------------------
    // Validation
    // ---------------------------------------------------------------

    #[test]
    fn test_temp_is_mandatory() {
        let err = ImportOptions::from_map(&map(&[])).unwrap_err();
        assert!(err.to_string().contains("temporary storage location"));
    }

    #[test]
    fn test_unknown_option_rejected() {
        let err =
            ImportOptions::from_map(&map(&[("temp", "memory://t/w"), ("bogus", "1")]))
                .unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_multi_char_delimiter_rejected() {
        let err =
            ImportOptions::from_map(&map(&[("temp", "memory://t/w"), ("delimiter", "ab")]))
                .unwrap_err();
        assert!(err.to_string().contains("delimiter"));
    }

    #[test]
    fn test_flag_option_with_value_rejected() {
        let err =
            ImportOptions::from_map(&map(&[("temp", "memory://t/w"), ("distributed", "yes")]))
                .unwrap_err();
        assert!(err.to_string().contains("takes no value"));
    }

    // ---------------------------------------------------------------
    // parse_size
    // ---------------------------------------------------------------

    #[test]
    fn test_parse_size_plain_bytes() {
        assert_eq!(parse_size("0").unwrap(), 0);
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("10 B").unwrap(), 10);
    }

    #[test]
    fn test_parse_size_si_and_iec() {
        assert_eq!(parse_size("2KB").unwrap(), 2000);
        assert_eq!(parse_size("2KiB").unwrap(), 2048);
        assert_eq!(parse_size("32MB").unwrap(), 32_000_000);
        assert_eq!(parse_size("32 MiB").unwrap(), 32 << 20);
        assert_eq!(parse_size("1gib").unwrap(), 1 << 30);
    }

    #[test]
    fn test_parse_size_fractional() {
        assert_eq!(parse_size("1.5KB").unwrap(), 1500);
        assert_eq!(parse_size("0.5MiB").unwrap(), 512 * 1024);
    }

    #[test]
    fn test_parse_size_invalid() {
        assert!(parse_size("").is_err());
        assert!(parse_size("MB").is_err());
        assert!(parse_size("12XB").is_err());
        assert!(parse_size("1.2.3KB").is_err());
    }
}
