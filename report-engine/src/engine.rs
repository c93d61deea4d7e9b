//! FILENAME: report-engine/src/engine.rs
//! Report Linker - The calculation core that turns cached rows into a Report.
//!
//! This module takes a ReportDefinition (configuration), the cached bucket
//! rows, and a project's unit index, and produces the assembled Report.
//!
//! Algorithm, strictly ordered:
//! 1. Join: fan rows out per matching formula unit (value > 0)
//! 2. Mutate: merge live instance over defaults, first-pass columns,
//!    group digest
//! 3. Projection: group by digest, second-pass columns, having filter,
//!    stable order, position stamps
//! 4. Assembly: stages with summaries, then report-level summaries
//!
//! Any evaluation failure in any step aborts the whole run; no partial
//! report is ever returned.

use crate::cache::{load_cache, refresh_cache};
use crate::definition::{
    AttributeRef, ColumnDefinition, ColumnPhase, ReportDefinition, SummaryDefinition,
    COLUMNS_ALIAS, FORMULA_ALIAS, UNIT_ALIAS,
};
use crate::error::ReportError;
use crate::row::{hash_value, AttributeMap, BucketRow};
use crate::view::{Report, ReportRow, Stage, SummaryValue};
use engine::model::{DatasheetElement, Project, ProjectNode};
use engine::unit::Unit;
use engine::unit_index::UnitIndex;
use engine::{
    compute_all_project_formula, evaluate, DataStore, EngineError, ObjectStore, Scope, Value,
};
use parser::ast::Expression;
use rustc_hash::FxHasher;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hasher;
use uuid::Uuid;

/// Links one report for one project. Convenience wrapper over ReportLinker.
pub fn link_report(
    store: &dyn DataStore,
    objects: &dyn ObjectStore,
    definition: &ReportDefinition,
    project: &Project,
) -> Result<Report, ReportError> {
    ReportLinker::new(store, objects, definition, project).link()
}

/// A bucket row plus its computed columns, flowing through the pipeline.
#[derive(Debug, Clone)]
struct WorkRow {
    row: BucketRow,
    columns: BTreeMap<String, Value>,
    digest: u64,
    position: u32,
}

impl WorkRow {
    fn new(row: BucketRow) -> Self {
        WorkRow {
            row,
            columns: BTreeMap::new(),
            digest: 0,
            position: 0,
        }
    }

    /// The evaluation scope for this row: every alias as a Map plus every
    /// computed column bound by name.
    fn scope(&self) -> Scope {
        let mut scope = Scope::new();
        for (alias, attrs) in self.row.iter() {
            scope.set(alias.clone(), Value::Map(attrs.clone()));
        }
        for (name, value) in &self.columns {
            scope.set(name.clone(), value.clone());
        }
        scope
    }

    /// The row as a single Map value (aliases plus a "columns" entry),
    /// used when a row is an element of a group or summary list.
    fn to_group_value(&self) -> Value {
        match self.row.to_value() {
            Value::Map(mut map) => {
                map.insert(COLUMNS_ALIAS.to_string(), Value::Map(self.columns.clone()));
                Value::Map(map)
            }
            other => other,
        }
    }

    /// Reads one attribute reference: either a computed column (via the
    /// "columns" pseudo-alias) or a joined record attribute.
    fn attribute(&self, reference: &AttributeRef) -> Result<Value, ReportError> {
        if reference.alias == COLUMNS_ALIAS {
            return self
                .columns
                .get(&reference.attribute)
                .cloned()
                .ok_or_else(|| ReportError::MissingAttribute {
                    alias: COLUMNS_ALIAS.to_string(),
                    attribute: reference.attribute.clone(),
                });
        }

        self.row
            .attribute(&reference.alias, &reference.attribute)
            .cloned()
            .ok_or_else(|| ReportError::MissingAttribute {
                alias: reference.alias.clone(),
                attribute: reference.attribute.clone(),
            })
    }
}

/// A column definition with its expression parsed once per run.
struct ParsedColumn<'a> {
    definition: &'a ColumnDefinition,
    expression: Expression,
}

/// The main linking engine for reports.
pub struct ReportLinker<'a> {
    store: &'a dyn DataStore,
    objects: &'a dyn ObjectStore,
    definition: &'a ReportDefinition,
    project: &'a Project,
}

impl<'a> ReportLinker<'a> {
    pub fn new(
        store: &'a dyn DataStore,
        objects: &'a dyn ObjectStore,
        definition: &'a ReportDefinition,
        project: &'a Project,
    ) -> Self {
        ReportLinker {
            store,
            objects,
            definition,
            project,
        }
    }

    /// Executes the full pipeline and persists the assembled report.
    pub fn link(&self) -> Result<Report, ReportError> {
        // The cached seed rows; an absent cache means "rebuild needed".
        let cached = match load_cache(self.objects, self.definition) {
            Ok(rows) => rows,
            Err(err) if err.is_not_found() => {
                refresh_cache(self.store, self.objects, self.definition)?
            }
            Err(err) => return Err(err),
        };

        // Everything below is pure in-memory computation over fresh state.
        let index =
            compute_all_project_formula(self.store, self.project.id, self.project.project_definition_id)?;

        let grouping_columns = self.parse_columns(ColumnPhase::Grouping)?;
        let aggregate_columns = self.parse_columns(ColumnPhase::Aggregate)?;

        // Step 1: Join formula units into the cached rows.
        let joined = self.join_units(cached, &index)?;

        // Step 2: Mutate rows (instance merge, first-pass columns, digest).
        let mutated = self.mutate(joined, &grouping_columns)?;

        // Step 3: Projection (group, aggregate, filter, order, position).
        let projected = self.projection(mutated, &aggregate_columns)?;

        // Step 4: Assembly into stages and summaries.
        let report = self.assemble(projected)?;

        let bytes =
            serde_json::to_vec(&report).map_err(|e| ReportError::Serialization(e.to_string()))?;
        self.objects
            .save(&Report::storage_key(self.project.id, self.definition.id), bytes)?;

        Ok(report)
    }

    fn parse_columns(&self, phase: ColumnPhase) -> Result<Vec<ParsedColumn<'a>>, ReportError> {
        self.definition
            .columns_in_phase(phase)
            .map(|definition| {
                let expression = parser::parse(&definition.expression)?;
                Ok(ParsedColumn {
                    definition,
                    expression,
                })
            })
            .collect()
    }

    // ========================================================================
    // STEP 1: JOIN
    // ========================================================================

    /// Fans each cached row out by the formula units whose formula id
    /// matches the row's declared formula attribute and whose value is a
    /// positive number. Rows with no matching unit are dropped.
    fn join_units(
        &self,
        cached: Vec<BucketRow>,
        index: &UnitIndex,
    ) -> Result<Vec<WorkRow>, ReportError> {
        if self.definition.formula_join.is_none() {
            return Ok(cached.into_iter().map(WorkRow::new).collect());
        }

        let mut result = Vec::with_capacity(cached.len());

        for row in cached {
            let formula_id = row
                .attribute(FORMULA_ALIAS, "formula_id")
                .ok_or_else(|| ReportError::MissingAttribute {
                    alias: FORMULA_ALIAS.to_string(),
                    attribute: "formula_id".to_string(),
                })?
                .as_text();
            let formula_id: Uuid = formula_id.parse().map_err(|_| {
                ReportError::Configuration(format!("invalid formula id '{}'", formula_id))
            })?;

            let mut matched = false;
            for unit in index.formula_units() {
                let Unit::Formula(fu) = &**unit else {
                    continue;
                };
                if fu.formula_id != formula_id {
                    continue;
                }

                let value = fu.value(index).map_err(EngineError::Eval)?;
                let positive = value
                    .as_number()
                    .map(|n| n > rust_decimal::Decimal::ZERO)
                    .unwrap_or(false);
                if !positive {
                    continue;
                }

                let trace = fu.trace(index).map_err(EngineError::Eval)?;
                let mut attrs = AttributeMap::new();
                attrs.insert("value".to_string(), value);
                attrs.insert("trace".to_string(), Value::Text(trace));
                attrs.insert("name".to_string(), Value::Text(fu.name.clone()));
                attrs.insert("node_id".to_string(), Value::Text(fu.node_id.to_string()));
                attrs.insert(
                    "formula_id".to_string(),
                    Value::Text(fu.formula_id.to_string()),
                );

                let mut fanned = row.clone();
                fanned.set_alias(UNIT_ALIAS, attrs);
                result.push(WorkRow::new(fanned));
                matched = true;
            }

            if !matched {
                log::debug!("dropping row: no positive unit for formula {}", formula_id);
            }
        }

        Ok(result)
    }

    // ========================================================================
    // STEP 2: MUTATE
    // ========================================================================

    /// Merges each row's live aggregate instance over its definition
    /// defaults, computes first-pass columns, and stamps the group digest.
    fn mutate(
        &self,
        rows: Vec<WorkRow>,
        grouping_columns: &[ParsedColumn<'a>],
    ) -> Result<Vec<WorkRow>, ReportError> {
        let project_definition = self
            .store
            .project_definition(self.project.project_definition_id)?;
        let nodes: HashMap<Uuid, ProjectNode> = self
            .store
            .nodes_by_project(self.project.id)?
            .into_iter()
            .map(|n| (n.id, n))
            .collect();
        let elements: HashMap<Uuid, DatasheetElement> = self
            .store
            .elements_by_datasheet_definition(project_definition.datasheet_definition_id)?
            .into_iter()
            .map(|e| (e.id, e))
            .collect();

        let mut result = Vec::with_capacity(rows.len());
        for mut work in rows {
            self.merge_instance(&mut work, &nodes, &elements)?;

            for column in grouping_columns {
                let scope = work.scope();
                let value = evaluate(&column.expression, &scope)
                    .map_err(|e| ReportError::evaluation(&column.expression, &scope, e))?;
                work.columns.insert(column.definition.name.clone(), value);
            }

            work.digest = self.group_digest(&work)?;
            result.push(work);
        }
        Ok(result)
    }

    /// Overlays the unit node's live attributes on its element defaults
    /// and lands the merge under the instance alias.
    fn merge_instance(
        &self,
        work: &mut WorkRow,
        nodes: &HashMap<Uuid, ProjectNode>,
        elements: &HashMap<Uuid, DatasheetElement>,
    ) -> Result<(), ReportError> {
        let Some(unit_attrs) = work.row.alias(UNIT_ALIAS) else {
            return Ok(());
        };
        let Some(node_id) = unit_attrs.get("node_id") else {
            return Ok(());
        };
        let node_id: Uuid = node_id.as_text().parse().map_err(|_| {
            ReportError::Configuration(format!("invalid unit node id '{}'", node_id.as_text()))
        })?;
        let node = nodes.get(&node_id).ok_or_else(|| {
            ReportError::Configuration(format!("unit node {} not found in project", node_id))
        })?;

        // Definition defaults first, live instance values on top.
        let mut merged = elements
            .get(&node.element_id)
            .map(|e| e.defaults.clone())
            .unwrap_or_default();
        for (name, value) in &node.attributes {
            merged.insert(name.clone(), value.clone());
        }

        work.row.set_alias(self.definition.instance_alias.as_str(), merged);
        Ok(())
    }

    /// A stable digest over the row's group-by attribute values.
    /// Identical group-by tuples always produce identical digests.
    fn group_digest(&self, work: &WorkRow) -> Result<u64, ReportError> {
        let mut hasher = FxHasher::default();
        for reference in &self.definition.group_by {
            let value = work.attribute(reference)?;
            hasher.write(reference.alias.as_bytes());
            hasher.write_u8(0x1f);
            hasher.write(reference.attribute.as_bytes());
            hasher.write_u8(0x1e);
            hash_value(&value, &mut hasher);
        }
        Ok(hasher.finish())
    }

    // ========================================================================
    // STEP 3: PROJECTION
    // ========================================================================

    /// Groups by digest, computes second-pass columns per group, applies
    /// the having filter, sorts, and stamps positions.
    fn projection(
        &self,
        rows: Vec<WorkRow>,
        aggregate_columns: &[ParsedColumn<'a>],
    ) -> Result<Vec<WorkRow>, ReportError> {
        let grouped = self.definition.is_grouped();
        if grouped && aggregate_columns.is_empty() {
            return Err(ReportError::MissingAggregateColumn);
        }

        // Cluster by digest, preserving first-occurrence order. A detail
        // report (no group-by) treats every row as its own group.
        let groups: Vec<Vec<WorkRow>> = if grouped {
            let mut order: Vec<u64> = Vec::new();
            let mut by_digest: HashMap<u64, Vec<WorkRow>> = HashMap::new();
            for work in rows {
                if !by_digest.contains_key(&work.digest) {
                    order.push(work.digest);
                }
                by_digest.entry(work.digest).or_default().push(work);
            }
            order
                .into_iter()
                .map(|digest| by_digest.remove(&digest).unwrap_or_default())
                .collect()
        } else {
            rows.into_iter().map(|w| vec![w]).collect()
        };

        let having = self
            .definition
            .having
            .as_deref()
            .map(parser::parse)
            .transpose()?;

        let mut survivors = Vec::with_capacity(groups.len());
        for group in groups {
            let group_values: Vec<Value> = group.iter().map(|w| w.to_group_value()).collect();
            let mut representative = match group.into_iter().next() {
                Some(first) => first,
                None => continue,
            };

            // Second-pass columns see the representative plus the whole
            // group; each column sees the ones computed before it.
            for column in aggregate_columns {
                let mut scope = representative.scope();
                scope.set("group", Value::List(group_values.clone()));
                let value = evaluate(&column.expression, &scope)
                    .map_err(|e| ReportError::evaluation(&column.expression, &scope, e))?;
                representative
                    .columns
                    .insert(column.definition.name.clone(), value);
            }

            // The having filter runs against the finished column map.
            if let Some(filter) = &having {
                let mut scope = representative.scope();
                scope.set("group", Value::List(group_values));
                let keep = evaluate(filter, &scope)
                    .map_err(|e| ReportError::evaluation(filter, &scope, e))?;
                if !keep.is_truthy() {
                    continue;
                }
            }

            survivors.push(representative);
        }

        self.order_and_stamp(survivors)
    }

    /// Stable-sorts by the order-by tuple and stamps 1-based positions.
    fn order_and_stamp(&self, rows: Vec<WorkRow>) -> Result<Vec<WorkRow>, ReportError> {
        let mut keyed: Vec<(SmallVec<[Value; 4]>, WorkRow)> = Vec::with_capacity(rows.len());
        for work in rows {
            let mut key: SmallVec<[Value; 4]> = SmallVec::new();
            for reference in &self.definition.order_by {
                key.push(work.attribute(reference)?);
            }
            keyed.push((key, work));
        }

        keyed.sort_by(|(a, _), (b, _)| compare_tuples(a, b));

        Ok(keyed
            .into_iter()
            .enumerate()
            .map(|(i, (_, mut work))| {
                work.position = (i + 1) as u32;
                work
            })
            .collect())
    }

    // ========================================================================
    // STEP 4: ASSEMBLY
    // ========================================================================

    /// Partitions rows into stages by the stage-label attribute, evaluates
    /// stage and report summaries, and assembles the final Report.
    fn assemble(&self, rows: Vec<WorkRow>) -> Result<Report, ReportError> {
        // Stages appear in first-row order.
        let mut stage_order: Vec<String> = Vec::new();
        let mut by_label: HashMap<String, Vec<WorkRow>> = HashMap::new();
        for work in rows {
            let label = work.attribute(&self.definition.stage_label)?.as_text();
            if !by_label.contains_key(&label) {
                stage_order.push(label.clone());
            }
            by_label.entry(label).or_default().push(work);
        }

        let visible: Vec<&str> = self
            .definition
            .columns
            .iter()
            .filter(|c| c.visible)
            .map(|c| c.name.as_str())
            .collect();

        let mut all_row_values: Vec<Value> = Vec::new();
        let mut stages = Vec::with_capacity(stage_order.len());

        for label in stage_order {
            let stage_rows = by_label.remove(&label).unwrap_or_default();
            let row_values: Vec<Value> = stage_rows.iter().map(|w| w.to_group_value()).collect();
            all_row_values.extend(row_values.iter().cloned());

            let summary = match &self.definition.stage_summary {
                Some(definition) => {
                    Some(self.evaluate_summary(definition, &row_values, &Scope::new())?)
                }
                None => None,
            };

            let rendered = stage_rows
                .into_iter()
                .map(|work| ReportRow {
                    position: work.position,
                    columns: work
                        .columns
                        .into_iter()
                        .filter(|(name, _)| visible.contains(&name.as_str()))
                        .collect(),
                })
                .collect();

            stages.push(Stage {
                label,
                rows: rendered,
                summary,
            });
        }

        // Report-level summaries share a scratch map: each expression sees
        // every summary computed before it, bound by label.
        let mut scratch = Scope::new();
        let mut summaries = Vec::with_capacity(self.definition.summaries.len());
        for definition in &self.definition.summaries {
            let summary = self.evaluate_summary(definition, &all_row_values, &scratch)?;
            scratch.set(summary.label.clone(), summary.value.clone());
            summaries.push(summary);
        }

        Ok(Report {
            report_definition_id: self.definition.id,
            project_id: self.project.id,
            stages,
            summaries,
        })
    }

    fn evaluate_summary(
        &self,
        definition: &SummaryDefinition,
        rows: &[Value],
        base: &Scope,
    ) -> Result<SummaryValue, ReportError> {
        let expression = parser::parse(&definition.expression)?;
        let mut scope = base.clone();
        scope.set("rows", Value::List(rows.to_vec()));

        let value = evaluate(&expression, &scope)
            .map_err(|e| ReportError::evaluation(&expression, &scope, e))?;

        Ok(SummaryValue {
            label: definition.label.clone(),
            value,
        })
    }
}

/// Compares order-by tuples element-wise. Values order within a variant
/// (numbers numerically, texts lexically, booleans false < true) and
/// across variants by a fixed rank, so sorting is total and stable.
fn compare_tuples(a: &[Value], b: &[Value]) -> Ordering {
    for (lhs, rhs) in a.iter().zip(b.iter()) {
        let ordering = compare_values(lhs, rhs);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.len().cmp(&b.len())
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::None, Value::None) => Ordering::Equal,
        (Value::None, _) => Ordering::Less,
        (_, Value::None) => Ordering::Greater,

        (Value::Number(na), Value::Number(nb)) => na.cmp(nb),
        (Value::Number(_), _) => Ordering::Less,
        (_, Value::Number(_)) => Ordering::Greater,

        (Value::Text(ta), Value::Text(tb)) => ta.cmp(tb),
        (Value::Text(_), _) => Ordering::Less,
        (_, Value::Text(_)) => Ordering::Greater,

        (Value::Boolean(ba), Value::Boolean(bb)) => ba.cmp(bb),
        (Value::Boolean(_), _) => Ordering::Less,
        (_, Value::Boolean(_)) => Ordering::Greater,

        // Lists and maps have no meaningful order; render and compare.
        (va, vb) => va.as_text().cmp(&vb.as_text()),
    }
}
