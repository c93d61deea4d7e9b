//! FILENAME: engine/src/resolver.rs
//! PURPOSE: Validates authored formulas and builds the per-project unit index.
//! CONTEXT: This is the gate between formula authors and the evaluator.
//! parse_formula() rejects bad formulas before any unit exists (the
//! resulting dependency maps are persisted as the dependency graph);
//! check_cycles() proves that graph acyclic; and
//! compute_all_project_formula() instantiates one field unit per valued
//! node and one formula unit per (formula x attachment node), returning
//! the index unevaluated: evaluation cost is only paid when something
//! resolves to a unit.

use crate::error::{EngineError, ValidationError};
use crate::functions;
use crate::store::DataStore;
use crate::unit::{FieldUnit, FormulaUnit, Unit};
use crate::unit_index::{UnitIndex, UnitIndexBuilder};
use parser::ast::Expression;
use parser::extract_dependencies;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// An unvalidated formula as authored.
#[derive(Debug, Clone)]
pub struct FormulaDraft {
    pub name: String,
    pub expression: String,
}

/// The validated output of parse_formula(): the division-rewritten
/// expression plus resolved dependency maps. The caller persists the maps
/// as the formula dependency graph.
#[derive(Debug, Clone)]
pub struct FormulaDetails {
    pub expression: Expression,
    pub formula_dependencies: BTreeMap<String, Uuid>,
    pub field_dependencies: BTreeMap<String, Uuid>,
}

/// Validates a formula draft against its sibling formulas and fields.
///
/// Rejected (Validation-kind): referencing the formula's own name,
/// referencing a name that is neither a sibling formula nor a sibling
/// field, and calling a function outside the whitelist.
pub fn parse_formula(
    draft: &FormulaDraft,
    sibling_formulas: &BTreeMap<String, Uuid>,
    sibling_fields: &BTreeMap<String, Uuid>,
) -> Result<FormulaDetails, ValidationError> {
    let expression = parser::parse(&draft.expression)?;
    let refs = extract_dependencies(&expression);

    for function in &refs.functions {
        if !functions::is_whitelisted(function) {
            return Err(ValidationError::DisallowedFunction {
                formula: draft.name.clone(),
                function: function.clone(),
            });
        }
    }

    let mut formula_dependencies = BTreeMap::new();
    let mut field_dependencies = BTreeMap::new();

    for name in &refs.names {
        if *name == draft.name {
            return Err(ValidationError::SelfReference {
                name: draft.name.clone(),
            });
        }

        if let Some(id) = sibling_formulas.get(name) {
            formula_dependencies.insert(name.clone(), *id);
        } else if let Some(id) = sibling_fields.get(name) {
            field_dependencies.insert(name.clone(), *id);
        } else {
            return Err(ValidationError::UnresolvedName {
                formula: draft.name.clone(),
                name: name.clone(),
            });
        }
    }

    Ok(FormulaDetails {
        expression,
        formula_dependencies,
        field_dependencies,
    })
}

/// Walks the persisted formula-to-formula dependency maps and fails on
/// the first cycle found. Runs before any unit is created so a cyclic
/// graph never reaches evaluation.
pub fn check_cycles(formulas: &[crate::model::Formula]) -> Result<(), ValidationError> {
    let by_id: HashMap<Uuid, &crate::model::Formula> =
        formulas.iter().map(|f| (f.id, f)).collect();

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit(
        id: Uuid,
        by_id: &HashMap<Uuid, &crate::model::Formula>,
        marks: &mut HashMap<Uuid, Mark>,
        stack: &mut Vec<String>,
    ) -> Result<(), ValidationError> {
        match marks.get(&id).copied() {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let mut path = stack.clone();
                if let Some(f) = by_id.get(&id) {
                    path.push(f.name.clone());
                }
                return Err(ValidationError::CyclicDependency {
                    path: path.join(" -> "),
                });
            }
            None => {}
        }

        let Some(formula) = by_id.get(&id) else {
            // Dependency on a formula outside this definition; nothing to walk.
            return Ok(());
        };

        marks.insert(id, Mark::Visiting);
        stack.push(formula.name.clone());
        for dep_id in formula.formula_dependencies.values() {
            visit(*dep_id, by_id, marks, stack)?;
        }
        stack.pop();
        marks.insert(id, Mark::Done);
        Ok(())
    }

    let mut marks = HashMap::new();
    let mut stack = Vec::new();
    for formula in formulas {
        visit(formula.id, &by_id, &mut marks, &mut stack)?;
    }
    Ok(())
}

/// Builds the full unit index for one project: every field value and
/// every (formula x attachment node) pair, registered but unevaluated.
/// Persisting computed results is the caller's responsibility.
pub fn compute_all_project_formula(
    store: &dyn DataStore,
    project_id: Uuid,
    project_definition_id: Uuid,
) -> Result<UnitIndex, EngineError> {
    let nodes = store.nodes_by_project(project_id)?;
    let formulas = store.formulas_by_project_definition(project_definition_id)?;

    check_cycles(&formulas)?;

    let mut builder = UnitIndexBuilder::new();

    for node in &nodes {
        if let Some(value) = &node.value {
            builder.add(Unit::Field(FieldUnit {
                name: node.name.clone(),
                node_id: node.id,
                path: node.path.clone(),
                value: value.clone(),
            }));
        }
    }

    for formula in &formulas {
        let expression = parser::parse(&formula.expression)
            .map_err(|e| EngineError::Validation(ValidationError::Syntax(e)))?;
        let refs = extract_dependencies(&expression);
        let dependencies: Vec<String> = refs.names.into_iter().collect();

        let attachments: Vec<_> = nodes
            .iter()
            .filter(|n| n.element_id == formula.attachment_element_id)
            .collect();

        for node in attachments {
            builder.add(Unit::Formula(FormulaUnit::new(
                formula.id,
                formula.name.clone(),
                node.id,
                node.path.clone(),
                expression.clone(),
                dependencies.clone(),
            )));
        }
    }

    let index = builder.build();
    log::debug!(
        "built unit index for project {}: {} units",
        project_id,
        index.len()
    );
    Ok(index)
}

/// Convenience for building sibling maps from stored formulas, deduped by
/// name (first wins; duplicate names are a definition-level problem).
pub fn sibling_formula_map(formulas: &[crate::model::Formula]) -> BTreeMap<String, Uuid> {
    let mut map = BTreeMap::new();
    for formula in formulas {
        map.entry(formula.name.clone()).or_insert(formula.id);
    }
    map
}
