//! FILENAME: engine/src/scope.rs
//! PURPOSE: The name-to-value mapping consulted during one evaluation.
//! CONTEXT: A Scope is built by whoever triggers an evaluation (unit
//! computation, report columns, summaries) and is read-only to the
//! expression being evaluated. Nested evaluations (comprehension elements)
//! copy-then-extend via child(); the callee never mutates its caller's
//! scope.

use crate::value::Value;
use std::collections::BTreeMap;

/// A name->value mapping for a single evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    values: BTreeMap<String, Value>,
}

impl Scope {
    /// Creates an empty scope.
    pub fn new() -> Self {
        Scope {
            values: BTreeMap::new(),
        }
    }

    /// Binds a name. Rebinding an existing name replaces it.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Looks a name up.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Returns true if the name is bound.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Copies this scope and binds one extra name in the copy.
    /// Used for comprehension variables; the original scope is untouched.
    pub fn child(&self, name: impl Into<String>, value: Value) -> Scope {
        let mut child = self.clone();
        child.set(name, value);
        child
    }

    /// Iterates over all bindings in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Renders the bindings for error context: "a=1, b=2".
    pub fn describe(&self) -> String {
        let rendered: Vec<String> = self
            .values
            .iter()
            .map(|(k, v)| format!("{}={}", k, v.as_text()))
            .collect();
        rendered.join(", ")
    }
}

impl FromIterator<(String, Value)> for Scope {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Scope {
            values: iter.into_iter().collect(),
        }
    }
}
