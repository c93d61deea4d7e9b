//! FILENAME: reckon-format/src/lib.rs
//! Reckon binary cache format for computed formula units.
//!
//! A storage collaborator persists the results of a project's formula
//! computation as a single gzip-compressed little-endian record stream;
//! this crate owns the encoding and decoding of that stream.

mod unit_cache;

pub use unit_cache::{
    collect_records, decode_records, encode_records, FormatError, UnitCacheRecord,
};
