//! FILENAME: engine/src/unit.rs
//! PURPOSE: Named, path-located, lazily computed values ("units").
//! CONTEXT: A unit is what a formula name resolves to: either a project
//! node's stored field value or another formula's computed result. Field
//! units are immutable once read. Formula units compute on first access
//! through an explicit state machine and memoize the result, so each unit
//! is evaluated at most once per run.
//!
//! The lifecycle is an explicit state machine rather than a lazy cell:
//! Uninitialized --> Computing --> Computed (terminal). Re-entering a unit
//! that is already Computing means the dependency graph is cyclic, which
//! upstream validation should have prevented; it fails loudly here
//! instead of recursing.

use crate::error::EvalError;
use crate::evaluator::evaluate;
use crate::scope::Scope;
use crate::trace::build_trace;
use crate::unit_index::UnitIndex;
use crate::value::Value;
use parser::ast::Expression;
use rust_decimal::Decimal;
use std::cell::RefCell;
use std::rc::Rc;
use uuid::Uuid;

/// A named value usable inside formula expressions.
#[derive(Debug)]
pub enum Unit {
    Field(FieldUnit),
    Formula(FormulaUnit),
}

impl Unit {
    pub fn name(&self) -> &str {
        match self {
            Unit::Field(u) => &u.name,
            Unit::Formula(u) => &u.name,
        }
    }

    /// The node this unit lives at (field node or formula attachment node).
    pub fn node_id(&self) -> Uuid {
        match self {
            Unit::Field(u) => u.node_id,
            Unit::Formula(u) => u.node_id,
        }
    }

    /// Ancestor node ids of the unit's node, root first.
    pub fn path(&self) -> &[Uuid] {
        match self {
            Unit::Field(u) => &u.path,
            Unit::Formula(u) => &u.path,
        }
    }

    /// The unit's value. Field units return their stored value; formula
    /// units compute (once) through the index.
    pub fn value(&self, index: &UnitIndex) -> Result<Value, EvalError> {
        match self {
            Unit::Field(u) => Ok(u.value.clone()),
            Unit::Formula(u) => u.value(index),
        }
    }
}

/// A project node's stored value wrapped as a unit.
#[derive(Debug, Clone)]
pub struct FieldUnit {
    pub name: String,
    pub node_id: Uuid,
    pub path: Vec<Uuid>,
    pub value: Value,
}

/// A computed value + trace pair, cached after first evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedResult {
    pub value: Value,
    pub trace: String,
}

/// A previously persisted result, used to report whether a fresh
/// computation changed anything ("touched").
#[derive(Debug, Clone, PartialEq)]
pub struct StoredResult {
    pub value: Value,
    pub trace: String,
}

/// The formula unit lifecycle. Computed is terminal.
#[derive(Debug, Clone)]
enum ComputeState {
    Uninitialized,
    Computing,
    Computed(ComputedResult),
}

/// A formula's result at one attachment node.
#[derive(Debug)]
pub struct FormulaUnit {
    pub formula_id: Uuid,
    pub name: String,
    /// The attachment node: resolution of dependencies starts here.
    pub node_id: Uuid,
    pub path: Vec<Uuid>,
    expression: Expression,
    /// Declared dependency names, bound into the scope before evaluation.
    dependencies: Vec<String>,
    /// Prior persisted result, if any.
    stored: Option<StoredResult>,
    state: RefCell<ComputeState>,
}

impl FormulaUnit {
    pub fn new(
        formula_id: Uuid,
        name: impl Into<String>,
        node_id: Uuid,
        path: Vec<Uuid>,
        expression: Expression,
        dependencies: Vec<String>,
    ) -> Self {
        FormulaUnit {
            formula_id,
            name: name.into(),
            node_id,
            path,
            expression,
            dependencies,
            stored: None,
            state: RefCell::new(ComputeState::Uninitialized),
        }
    }

    /// Attaches a previously persisted result for touched() comparison.
    pub fn with_stored(mut self, stored: StoredResult) -> Self {
        self.stored = Some(stored);
        self
    }

    /// The computed value, evaluating on first access.
    pub fn value(&self, index: &UnitIndex) -> Result<Value, EvalError> {
        Ok(self.computed(index)?.value)
    }

    /// The calculation trace, evaluating on first access.
    pub fn trace(&self, index: &UnitIndex) -> Result<String, EvalError> {
        Ok(self.computed(index)?.trace)
    }

    /// Whether the fresh result differs from the prior stored one.
    /// A unit with no stored result is always touched.
    pub fn touched(&self, index: &UnitIndex) -> Result<bool, EvalError> {
        let fresh = self.computed(index)?;
        Ok(match &self.stored {
            Some(prior) => prior.value != fresh.value || prior.trace != fresh.trace,
            None => true,
        })
    }

    /// Drives the state machine. Returns the cached result when Computed;
    /// fails loudly when re-entered while Computing.
    fn computed(&self, index: &UnitIndex) -> Result<ComputedResult, EvalError> {
        {
            let state = self.state.borrow();
            match &*state {
                ComputeState::Computed(result) => return Ok(result.clone()),
                ComputeState::Computing => {
                    return Err(EvalError::CyclicUnit {
                        name: self.name.clone(),
                    })
                }
                ComputeState::Uninitialized => {}
            }
        }

        *self.state.borrow_mut() = ComputeState::Computing;
        match self.compute(index) {
            Ok(result) => {
                *self.state.borrow_mut() = ComputeState::Computed(result.clone());
                Ok(result)
            }
            Err(err) => {
                // Leave the unit retryable; the error propagates regardless.
                *self.state.borrow_mut() = ComputeState::Uninitialized;
                Err(err)
            }
        }
    }

    /// Resolves dependencies, evaluates the expression, builds the trace.
    fn compute(&self, index: &UnitIndex) -> Result<ComputedResult, EvalError> {
        let mut scope = Scope::new();

        for dep in &self.dependencies {
            let units = index.resolve(self.node_id, &self.path, dep);
            let bound = bind_units(dep, &units, index, &self.expression)?;
            scope.set(dep.clone(), bound);
        }

        log::debug!("computing formula unit '{}' at node {}", self.name, self.node_id);

        let value = evaluate(&self.expression, &scope)?;
        let trace = build_trace(&self.expression, &scope, &value);
        Ok(ComputedResult { value, trace })
    }
}

/// Binds a resolved unit list into a scope value.
/// Exactly one unit binds its scalar value; several bind their sum; none
/// is an unknown-name error. Formulas are authored assuming this
/// asymmetry, so it must hold exactly.
fn bind_units(
    name: &str,
    units: &[Rc<Unit>],
    index: &UnitIndex,
    context: &Expression,
) -> Result<Value, EvalError> {
    match units {
        [] => Err(EvalError::UnknownName {
            name: name.to_string(),
            expression: context.to_string(),
        }),
        [single] => single.value(index),
        many => {
            let mut total = Decimal::ZERO;
            for unit in many {
                let value = unit.value(index)?;
                let n = value.as_number().ok_or_else(|| {
                    EvalError::type_mismatch(
                        context,
                        format!(
                            "cannot sum non-numeric unit '{}' ({})",
                            name,
                            value.as_text()
                        ),
                    )
                })?;
                total += n;
            }
            Ok(Value::Number(total))
        }
    }
}
