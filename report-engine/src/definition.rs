//! FILENAME: report-engine/src/definition.rs
//! Report Definition - The serializable configuration.
//!
//! This module contains all the types needed to DESCRIBE a report.
//! These structures are designed to be:
//! - Serializable (for saving/loading alongside project definitions)
//! - Immutable snapshots of user intent
//!
//! A report definition names a base label collection, an ordered join
//! plan across sibling collections, a formula bucket, the columns to
//! compute, and how rows group, filter, order, and stage.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The fixed alias formula bucket attributes are joined under.
pub const FORMULA_ALIAS: &str = "formula";

/// The fixed alias matched formula units are merged under during linking.
pub const UNIT_ALIAS: &str = "unit";

/// The pseudo-alias that reads computed columns instead of joined labels
/// in group-by / order-by / stage attribute references.
pub const COLUMNS_ALIAS: &str = "columns";

// ============================================================================
// ATTRIBUTE REFERENCES
// ============================================================================

/// A reference to one attribute of one aliased record in a bucket row,
/// e.g. alias "article", attribute "family".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRef {
    pub alias: String,
    pub attribute: String,
}

impl AttributeRef {
    pub fn new(alias: impl Into<String>, attribute: impl Into<String>) -> Self {
        AttributeRef {
            alias: alias.into(),
            attribute: attribute.into(),
        }
    }
}

impl std::fmt::Display for AttributeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.alias, self.attribute)
    }
}

// ============================================================================
// JOIN PLAN
// ============================================================================

/// One step of the declarative join plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinStep {
    /// The alias of the already-joined record the source value comes from.
    pub from_alias: String,

    /// The attribute of that record holding the match value.
    pub from_attribute: String,

    /// The target label collection.
    pub collection_id: Uuid,

    /// The target attribute matched against the source value.
    /// None matches on the label id itself.
    #[serde(default)]
    pub match_attribute: Option<String>,

    /// The alias the matched label lands under.
    pub destination_alias: String,

    /// Declared one-to-one: fanning out on this join is fatal.
    #[serde(default)]
    pub same_cardinality: bool,

    /// Rows with no match are dropped (with a warning) instead of failing.
    /// This is the only opt-in partial-failure path in report generation.
    #[serde(default)]
    pub allow_discard: bool,
}

// ============================================================================
// FORMULA JOIN
// ============================================================================

/// Attaches formula identity to each row: the bucket attribute (read under
/// the base alias) selects which formula id lands under the fixed
/// "formula" alias. The linking pipeline later fans rows out per matching
/// formula unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormulaJoin {
    /// The attribute under the base alias naming the row's bucket.
    pub bucket_attribute: String,

    /// Bucket value -> formula id.
    pub formulas: std::collections::BTreeMap<String, Uuid>,
}

// ============================================================================
// COLUMNS & SUMMARIES
// ============================================================================

/// When a column is computed relative to grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnPhase {
    /// First pass, computed per row before grouping. Grouping and
    /// always-visible columns live here.
    Grouping,
    /// Second pass, computed once per group with the full group in scope.
    Aggregate,
}

/// One computed report column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,

    /// The column expression source text, parsed per run.
    pub expression: String,

    pub phase: ColumnPhase,

    /// Hidden columns are computed (grouping may need them) but excluded
    /// from the rendered rows.
    #[serde(default = "default_true")]
    pub visible: bool,
}

impl ColumnDefinition {
    pub fn grouping(name: impl Into<String>, expression: impl Into<String>) -> Self {
        ColumnDefinition {
            name: name.into(),
            expression: expression.into(),
            phase: ColumnPhase::Grouping,
            visible: true,
        }
    }

    pub fn aggregate(name: impl Into<String>, expression: impl Into<String>) -> Self {
        ColumnDefinition {
            name: name.into(),
            expression: expression.into(),
            phase: ColumnPhase::Aggregate,
            visible: true,
        }
    }
}

/// A labeled summary expression (stage-level or report-level).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryDefinition {
    pub label: String,

    /// Evaluated with "rows" bound to the relevant row list; report-level
    /// summaries additionally see previously computed summaries by label.
    pub expression: String,
}

fn default_true() -> bool {
    true
}

// ============================================================================
// MAIN DEFINITION STRUCT
// ============================================================================

/// The complete, serializable definition of a report.
/// This is the "source of truth" consumed by the row cache builder and
/// the linking pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportDefinition {
    /// Unique identifier for this report definition.
    pub id: Uuid,

    /// User-friendly name.
    #[serde(default)]
    pub name: Option<String>,

    /// The owning project definition.
    pub project_definition_id: Uuid,

    /// The label collection seeding one bucket row per label.
    pub base_collection_id: Uuid,

    /// The alias base labels land under.
    pub base_alias: String,

    /// Ordered join plan, applied in sequence.
    #[serde(default)]
    pub joins: Vec<JoinStep>,

    /// Optional formula bucket join (step 4 of the cache build).
    #[serde(default)]
    pub formula_join: Option<FormulaJoin>,

    /// The alias live aggregate-instance attributes are merged under.
    #[serde(default = "default_instance_alias")]
    pub instance_alias: String,

    /// Computed columns, evaluated in declaration order within each phase.
    #[serde(default)]
    pub columns: Vec<ColumnDefinition>,

    /// Group-by attribute references. Empty means a detail report.
    #[serde(default)]
    pub group_by: Vec<AttributeRef>,

    /// Optional post-group filter over the finished column map.
    #[serde(default)]
    pub having: Option<String>,

    /// Order-by attribute references (stable sort).
    #[serde(default)]
    pub order_by: Vec<AttributeRef>,

    /// The attribute whose value names each stage.
    pub stage_label: AttributeRef,

    /// Per-stage summary, evaluated over each stage's rows.
    #[serde(default)]
    pub stage_summary: Option<SummaryDefinition>,

    /// Report-level summaries, evaluated in order with earlier results
    /// in scope.
    #[serde(default)]
    pub summaries: Vec<SummaryDefinition>,

    /// Version for cache invalidation.
    #[serde(default)]
    pub version: u64,
}

fn default_instance_alias() -> String {
    "instance".to_string()
}

impl ReportDefinition {
    /// Creates a new report definition with minimal configuration.
    pub fn new(
        id: Uuid,
        project_definition_id: Uuid,
        base_collection_id: Uuid,
        base_alias: impl Into<String>,
        stage_label: AttributeRef,
    ) -> Self {
        ReportDefinition {
            id,
            name: None,
            project_definition_id,
            base_collection_id,
            base_alias: base_alias.into(),
            joins: Vec::new(),
            formula_join: None,
            instance_alias: default_instance_alias(),
            columns: Vec::new(),
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            stage_label,
            stage_summary: None,
            summaries: Vec::new(),
            version: 0,
        }
    }

    /// Increments the version (for cache invalidation).
    pub fn bump_version(&mut self) {
        self.version += 1;
    }

    /// Returns true if any grouping is configured.
    pub fn is_grouped(&self) -> bool {
        !self.group_by.is_empty()
    }

    /// The columns of one phase, in declaration order.
    pub fn columns_in_phase(&self, phase: ColumnPhase) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter().filter(move |c| c.phase == phase)
    }

    /// Returns true if at least one second-pass column exists.
    pub fn has_aggregate_columns(&self) -> bool {
        self.columns_in_phase(ColumnPhase::Aggregate).next().is_some()
    }
}
