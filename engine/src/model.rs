//! FILENAME: engine/src/model.rs
//! PURPOSE: The datasheet domain records the engine computes over.
//! CONTEXT: These are the shapes the persistence collaborator stores and
//! the computation engine reads. A project definition describes a
//! datasheet; projects instantiate it as a tree of nodes carrying values;
//! formulas attach to definition elements and compute over node values;
//! label collections hold the labeled records reports join against.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A reusable datasheet blueprint that projects instantiate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDefinition {
    pub id: Uuid,
    pub name: String,
    /// The datasheet definition whose elements and label collections
    /// belong to this blueprint.
    pub datasheet_definition_id: Uuid,
}

/// What role a datasheet element plays in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementKind {
    /// A grouping node that aggregates children (an article, an assembly).
    Aggregate,
    /// A leaf carrying a single stored value.
    Field,
}

/// One element of a datasheet definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasheetElement {
    pub id: Uuid,
    pub datasheet_definition_id: Uuid,
    pub name: String,
    pub kind: ElementKind,
    /// Default attribute values, overlaid by a project's live instance
    /// during report linking.
    #[serde(default)]
    pub defaults: BTreeMap<String, Value>,
}

/// A concrete instantiation of a project definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub project_definition_id: Uuid,
}

/// One node of a project's datasheet tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectNode {
    pub id: Uuid,
    pub project_id: Uuid,
    /// The datasheet element this node instantiates.
    pub element_id: Uuid,
    pub name: String,
    /// Ancestor node ids, root first. The node itself is not included.
    pub path: Vec<Uuid>,
    /// The stored value for field nodes; aggregates carry none.
    #[serde(default)]
    pub value: Option<Value>,
    /// Live instance attributes for aggregate nodes.
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl ProjectNode {
    /// Returns true if this node carries a stored field value.
    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }
}

/// A user-authored formula attached to a datasheet element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Formula {
    pub id: Uuid,
    pub project_definition_id: Uuid,
    pub name: String,
    /// The authored source text; parsed fresh per computation run.
    pub expression: String,
    /// The definition element whose instance nodes this formula attaches
    /// to: one formula unit is created per matching node.
    pub attachment_element_id: Uuid,
    /// Resolved sibling-formula dependencies (name -> formula id),
    /// persisted at validation time as the dependency graph.
    #[serde(default)]
    pub formula_dependencies: BTreeMap<String, Uuid>,
    /// Resolved field dependencies (name -> element id).
    #[serde(default)]
    pub field_dependencies: BTreeMap<String, Uuid>,
}

/// A named set of labeled records belonging to a datasheet definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelCollection {
    pub id: Uuid,
    pub datasheet_definition_id: Uuid,
    pub name: String,
}

/// One labeled record: the join target of report joins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub id: Uuid,
    pub collection_id: Uuid,
    /// Position inside the collection; seeds report row order.
    pub ordinal: u32,
    pub attributes: BTreeMap<String, Value>,
}

impl Label {
    /// Reads one attribute, if present.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}
