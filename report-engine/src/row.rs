//! FILENAME: report-engine/src/row.rs
//! PURPOSE: Bucket rows: the unit of work flowing through the pipeline.
//! CONTEXT: A bucket row maps aliases to attribute dictionaries. Joins
//! only ever add aliases; nothing removes one. Deduplication hashes the
//! full row content (alias names, attribute names, values) with a stable
//! hasher, keeping the first occurrence and preserving order.

use engine::Value;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::hash::Hasher;

/// One aliased record's attributes.
pub type AttributeMap = BTreeMap<String, Value>;

/// A growable, alias-keyed dictionary of joined records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketRow {
    aliases: BTreeMap<String, AttributeMap>,
}

impl BucketRow {
    pub fn new() -> Self {
        BucketRow::default()
    }

    /// Adds (or replaces) one alias. The alias set only grows as a row
    /// passes through joins; replacement only happens when a fan-out
    /// clones a row and re-lands the same alias with a different record.
    pub fn set_alias(&mut self, alias: impl Into<String>, attributes: AttributeMap) {
        self.aliases.insert(alias.into(), attributes);
    }

    /// One aliased record, if present.
    pub fn alias(&self, alias: &str) -> Option<&AttributeMap> {
        self.aliases.get(alias)
    }

    /// One attribute of one aliased record, if present.
    pub fn attribute(&self, alias: &str, attribute: &str) -> Option<&Value> {
        self.aliases.get(alias).and_then(|a| a.get(attribute))
    }

    /// Returns true if the alias is present.
    pub fn has_alias(&self, alias: &str) -> bool {
        self.aliases.contains_key(alias)
    }

    /// Iterates aliases in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeMap)> {
        self.aliases.iter()
    }

    /// Renders the whole row as a Map value (alias -> attribute map) for
    /// expression scopes.
    pub fn to_value(&self) -> Value {
        let map: BTreeMap<String, Value> = self
            .aliases
            .iter()
            .map(|(alias, attrs)| (alias.clone(), Value::Map(attrs.clone())))
            .collect();
        Value::Map(map)
    }

    /// Stable content hash over the full row. BTreeMap ordering makes the
    /// byte stream deterministic, FxHasher makes it fast.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = FxHasher::default();
        for (alias, attrs) in &self.aliases {
            hasher.write(alias.as_bytes());
            hasher.write_u8(0x1f);
            for (name, value) in attrs {
                hasher.write(name.as_bytes());
                hasher.write_u8(0x1e);
                hash_value(value, &mut hasher);
            }
        }
        hasher.finish()
    }
}

/// Hashes a value with a variant tag so e.g. Number(10) and Text("10")
/// never collide structurally. Group digests reuse this.
pub(crate) fn hash_value(value: &Value, hasher: &mut FxHasher) {
    match value {
        Value::Number(n) => {
            hasher.write_u8(1);
            hasher.write(n.normalize().to_string().as_bytes());
        }
        Value::Text(s) => {
            hasher.write_u8(2);
            hasher.write(s.as_bytes());
        }
        Value::Boolean(b) => {
            hasher.write_u8(3);
            hasher.write_u8(*b as u8);
        }
        Value::None => hasher.write_u8(4),
        Value::List(items) => {
            hasher.write_u8(5);
            hasher.write_usize(items.len());
            for item in items {
                hash_value(item, hasher);
            }
        }
        Value::Map(map) => {
            hasher.write_u8(6);
            hasher.write_usize(map.len());
            for (k, v) in map {
                hasher.write(k.as_bytes());
                hash_value(v, hasher);
            }
        }
    }
}

/// Content-hash deduplication: first occurrence wins, order preserved.
pub fn dedup_rows(rows: Vec<BucketRow>) -> Vec<BucketRow> {
    let mut seen: HashSet<u64> = HashSet::with_capacity(rows.len());
    let mut result = Vec::with_capacity(rows.len());

    for row in rows {
        if seen.insert(row.content_hash()) {
            result.push(row);
        }
    }
    result
}
