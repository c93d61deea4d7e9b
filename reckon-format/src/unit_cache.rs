//! FILENAME: reckon-format/src/unit_cache.rs
//! PURPOSE: Encode/decode the binary record stream for computed formula units.
//! CONTEXT: One record per computed formula unit. The stream layout is
//! little-endian throughout and gzip-compressed as a whole:
//!
//!   u16  record count
//!   per record:
//!     16 bytes  formula id
//!     16 bytes  node id
//!     5 x 16 bytes  path slots (nil uuid = padding)
//!     u16 + bytes   name (UTF-8)
//!     u16 + bytes   calculation trace (UTF-8)
//!     1 byte        value tag + tagged payload:
//!       'I'  i32 (4 bytes)              -- read compatibility
//!       'D'  u16 + decimal string       -- always written for numbers
//!       'F'  f64 (8 bytes)              -- read compatibility
//!       'B'  bool as one byte
//!       'S'  u16 + UTF-8 string
//!
//! Numbers are written as 'D' decimal strings (lossless); 'I' and 'F'
//! are accepted on read for older producers.

use engine::unit::Unit;
use engine::unit_index::UnitIndex;
use engine::{EngineError, Value};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::io::{Read, Write};
use thiserror::Error;
use uuid::Uuid;

/// The number of fixed path slots per record.
const PATH_SLOTS: usize = 5;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record stream ended unexpectedly")]
    UnexpectedEof,

    #[error("Unit path has {segments} segments; the format carries at most {PATH_SLOTS}")]
    PathTooLong { segments: usize },

    #[error("Too many records for a u16 count: {0}")]
    TooManyRecords(usize),

    #[error("Unknown value tag: 0x{0:02x}")]
    InvalidTag(u8),

    #[error("Invalid UTF-8 in record field")]
    InvalidUtf8,

    #[error("Invalid decimal payload: {0}")]
    InvalidDecimal(String),

    #[error("Value cannot be represented in the cache format: {0}")]
    UnsupportedValue(String),
}

/// One computed formula unit as persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitCacheRecord {
    pub formula_id: Uuid,
    pub node_id: Uuid,
    /// Ancestor ids, root first; at most five.
    pub path: Vec<Uuid>,
    pub name: String,
    pub trace: String,
    pub value: Value,
}

/// Evaluates every formula unit in an index and collects cache records.
/// This is the "persist computed results" half the resolver leaves to its
/// caller: compute_all_project_formula() builds the index lazily, this
/// forces and captures each result.
pub fn collect_records(index: &UnitIndex) -> Result<Vec<UnitCacheRecord>, EngineError> {
    let mut records = Vec::new();
    for unit in index.formula_units() {
        let Unit::Formula(fu) = &**unit else {
            continue;
        };
        records.push(UnitCacheRecord {
            formula_id: fu.formula_id,
            node_id: fu.node_id,
            path: fu.path.clone(),
            name: fu.name.clone(),
            trace: fu.trace(index)?,
            value: fu.value(index)?,
        });
    }
    Ok(records)
}

/// Encodes records into a gzip-compressed stream.
pub fn encode_records(records: &[UnitCacheRecord]) -> Result<Vec<u8>, FormatError> {
    let count =
        u16::try_from(records.len()).map_err(|_| FormatError::TooManyRecords(records.len()))?;

    let mut raw = Vec::new();
    raw.extend_from_slice(&count.to_le_bytes());

    for record in records {
        if record.path.len() > PATH_SLOTS {
            return Err(FormatError::PathTooLong {
                segments: record.path.len(),
            });
        }

        raw.extend_from_slice(record.formula_id.as_bytes());
        raw.extend_from_slice(record.node_id.as_bytes());
        for slot in 0..PATH_SLOTS {
            let id = record.path.get(slot).copied().unwrap_or(Uuid::nil());
            raw.extend_from_slice(id.as_bytes());
        }

        write_string(&mut raw, &record.name)?;
        write_string(&mut raw, &record.trace)?;
        write_value(&mut raw, &record.value)?;
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw)?;
    Ok(encoder.finish()?)
}

/// Decodes a gzip-compressed record stream.
pub fn decode_records(bytes: &[u8]) -> Result<Vec<UnitCacheRecord>, FormatError> {
    let mut raw = Vec::new();
    GzDecoder::new(bytes).read_to_end(&mut raw)?;

    let mut cursor = Cursor::new(&raw);
    let count = cursor.read_u16()?;

    let mut records = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let formula_id = cursor.read_uuid()?;
        let node_id = cursor.read_uuid()?;

        let mut path = Vec::new();
        for _ in 0..PATH_SLOTS {
            let id = cursor.read_uuid()?;
            if !id.is_nil() {
                path.push(id);
            }
        }

        let name = cursor.read_string()?;
        let trace = cursor.read_string()?;
        let value = read_value(&mut cursor)?;

        records.push(UnitCacheRecord {
            formula_id,
            node_id,
            path,
            name,
            trace,
            value,
        });
    }

    Ok(records)
}

fn write_string(out: &mut Vec<u8>, s: &str) -> Result<(), FormatError> {
    let len = u16::try_from(s.len()).map_err(|_| {
        FormatError::UnsupportedValue(format!("string of {} bytes exceeds u16 length", s.len()))
    })?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

fn write_value(out: &mut Vec<u8>, value: &Value) -> Result<(), FormatError> {
    match value {
        Value::Number(n) => {
            out.push(b'D');
            write_string(out, &n.normalize().to_string())
        }
        Value::Boolean(b) => {
            out.push(b'B');
            out.push(*b as u8);
            Ok(())
        }
        Value::Text(s) => {
            out.push(b'S');
            write_string(out, s)
        }
        other => Err(FormatError::UnsupportedValue(other.as_text())),
    }
}

fn read_value(cursor: &mut Cursor<'_>) -> Result<Value, FormatError> {
    match cursor.read_u8()? {
        b'I' => {
            let mut buf = [0u8; 4];
            cursor.read_exact(&mut buf)?;
            Ok(Value::Number(Decimal::from(i32::from_le_bytes(buf))))
        }
        b'D' => {
            let s = cursor.read_string()?;
            let n: Decimal = s.parse().map_err(|_| FormatError::InvalidDecimal(s))?;
            Ok(Value::Number(n))
        }
        b'F' => {
            let mut buf = [0u8; 8];
            cursor.read_exact(&mut buf)?;
            let f = f64::from_le_bytes(buf);
            let n = Decimal::from_f64(f)
                .ok_or_else(|| FormatError::InvalidDecimal(f.to_string()))?;
            Ok(Value::Number(n))
        }
        b'B' => Ok(Value::Boolean(cursor.read_u8()? != 0)),
        b'S' => Ok(Value::Text(cursor.read_string()?)),
        tag => Err(FormatError::InvalidTag(tag)),
    }
}

/// A bounds-checked reader over the decompressed stream.
struct Cursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Cursor { bytes, offset: 0 }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), FormatError> {
        let end = self.offset + buf.len();
        if end > self.bytes.len() {
            return Err(FormatError::UnexpectedEof);
        }
        buf.copy_from_slice(&self.bytes[self.offset..end]);
        self.offset = end;
        Ok(())
    }

    fn read_u8(&mut self) -> Result<u8, FormatError> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u16(&mut self) -> Result<u16, FormatError> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_uuid(&mut self) -> Result<Uuid, FormatError> {
        let mut buf = [0u8; 16];
        self.read_exact(&mut buf)?;
        Ok(Uuid::from_bytes(buf))
    }

    fn read_string(&mut self) -> Result<String, FormatError> {
        let len = self.read_u16()? as usize;
        let end = self.offset + len;
        if end > self.bytes.len() {
            return Err(FormatError::UnexpectedEof);
        }
        let s = std::str::from_utf8(&self.bytes[self.offset..end])
            .map_err(|_| FormatError::InvalidUtf8)?;
        self.offset = end;
        Ok(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::unit::{FieldUnit, FormulaUnit};
    use engine::unit_index::UnitIndexBuilder;

    fn num(s: &str) -> Value {
        Value::Number(s.parse().unwrap())
    }

    fn record(name: &str, value: Value, path: Vec<Uuid>) -> UnitCacheRecord {
        UnitCacheRecord {
            formula_id: Uuid::new_v4(),
            node_id: Uuid::new_v4(),
            path,
            name: name.to_string(),
            trace: format!("{} = 1 = 1", name),
            value,
        }
    }

    #[test]
    fn round_trips_records_exactly() {
        let records = vec![
            record("total", num("123.45"), vec![Uuid::new_v4()]),
            record("approved", Value::Boolean(true), vec![]),
            record(
                "note",
                Value::Text("weight über 10kg".to_string()),
                vec![Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()],
            ),
        ];

        let bytes = encode_records(&records).unwrap();
        let decoded = decode_records(&bytes).unwrap();

        assert_eq!(decoded, records);
    }

    #[test]
    fn empty_stream_round_trips() {
        let bytes = encode_records(&[]).unwrap();
        assert_eq!(decode_records(&bytes).unwrap(), Vec::<UnitCacheRecord>::new());
    }

    #[test]
    fn stream_is_gzip_compressed() {
        let bytes = encode_records(&[record("x", num("1"), vec![])]).unwrap();
        // gzip magic header
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn path_over_five_segments_is_rejected() {
        let path: Vec<Uuid> = (0..6).map(|_| Uuid::new_v4()).collect();
        let err = encode_records(&[record("deep", num("1"), path)]).unwrap_err();
        assert!(matches!(err, FormatError::PathTooLong { segments: 6 }));
    }

    #[test]
    fn list_values_are_unsupported() {
        let err = encode_records(&[record("bad", Value::List(vec![]), vec![])]).unwrap_err();
        assert!(matches!(err, FormatError::UnsupportedValue(_)));
    }

    #[test]
    fn truncated_stream_fails_cleanly() {
        let bytes = encode_records(&[record("x", num("1"), vec![])]).unwrap();
        // Re-compress a truncated raw stream to corrupt the record body.
        let mut raw = Vec::new();
        GzDecoder::new(&bytes[..]).read_to_end(&mut raw).unwrap();
        raw.truncate(raw.len() - 3);
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw).unwrap();
        let corrupt = encoder.finish().unwrap();

        assert!(matches!(
            decode_records(&corrupt).unwrap_err(),
            FormatError::UnexpectedEof
        ));
    }

    #[test]
    fn collect_records_forces_unit_evaluation() {
        let node = Uuid::new_v4();
        let formula_id = Uuid::new_v4();

        let mut builder = UnitIndexBuilder::new();
        builder.add(Unit::Field(FieldUnit {
            name: "base".to_string(),
            node_id: node,
            path: vec![],
            value: num("10"),
        }));
        builder.add(Unit::Formula(FormulaUnit::new(
            formula_id,
            "doubled",
            node,
            vec![],
            parser::parse("base * 2").unwrap(),
            vec!["base".to_string()],
        )));
        let index = builder.build();

        let records = collect_records(&index).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].formula_id, formula_id);
        assert_eq!(records[0].value, num("20"));
        assert_eq!(records[0].trace, "base * 2 = 10 * 2 = 20");

        // And the records survive the wire format.
        let decoded = decode_records(&encode_records(&records).unwrap()).unwrap();
        assert_eq!(decoded, records);
    }
}
