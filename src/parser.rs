//! Record scanning and the fixed-format decimal parser.

use memchr::memchr;

use crate::aggregate::AggregateMap;
use crate::error::{PipelineError, Result};
use crate::reader::Chunk;

/// More integer digits than this could overflow the tenths accumulator.
const MAX_INTEGER_DIGITS: usize = 17;

/// Parse a value of the form `-?[0-9]+\.[0-9]` into tenths.
///
/// Returns `None` for anything else: a missing or repeated decimal point,
/// zero or several fractional digits, a `+` sign, whitespace, etc.
#[inline]
pub fn parse_tenths(bytes: &[u8]) -> Option<i64> {
    let (negative, digits) = match bytes {
        [b'-', rest @ ..] => (true, rest),
        _ => (false, bytes),
    };
    let [integer @ .., b'.', fraction] = digits else {
        return None;
    };
    if integer.is_empty() || integer.len() > MAX_INTEGER_DIGITS || !fraction.is_ascii_digit() {
        return None;
    }

    let mut value: i64 = 0;
    for &b in integer {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value * 10 + (b - b'0') as i64;
    }
    value = value * 10 + (fraction - b'0') as i64;

    Some(if negative { -value } else { value })
}

/// Fold every record of `chunk` into `map`. Returns the number of records.
///
/// Each record must be `key;value` followed by `\n`; the last record of the
/// final chunk may omit the terminator.
pub fn parse_chunk(chunk: &Chunk, map: &mut AggregateMap) -> Result<u64> {
    let bytes: &[u8] = chunk;
    let mut pos = 0;
    let mut records = 0u64;

    while pos < bytes.len() {
        let rest = &bytes[pos..];
        let line_len = memchr(b'\n', rest).unwrap_or(rest.len());
        let line = &rest[..line_len];

        let Some(split) = memchr(b';', line) else {
            return Err(malformed(chunk, pos, records, "missing ';' delimiter"));
        };
        let (key, value) = (&line[..split], &line[split + 1..]);

        match parse_tenths(value) {
            Some(v) => map.record(key, v),
            None if memchr(b';', value).is_some() => {
                return Err(malformed(chunk, pos, records, "more than one ';' delimiter"));
            }
            None => {
                return Err(PipelineError::NumericParse {
                    offset: chunk.offset + (pos + split + 1) as u64,
                    chunk: chunk.index,
                    record: records,
                    value: String::from_utf8_lossy(value).into_owned(),
                });
            }
        }

        records += 1;
        pos += line_len + 1;
    }

    Ok(records)
}

fn malformed(chunk: &Chunk, pos: usize, record: u64, reason: &'static str) -> PipelineError {
    PipelineError::MalformedRecord {
        offset: chunk.offset + pos as u64,
        chunk: chunk.index,
        record,
        reason,
    }
}
