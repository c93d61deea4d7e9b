//! FILENAME: engine/src/lib.rs
//! PURPOSE: Main library entry point for the datasheet computation engine.
//! CONTEXT: Re-exports public types and modules for use by other crates.

pub mod error;
pub mod evaluator;
pub mod functions;
pub mod model;
pub mod resolver;
pub mod scope;
pub mod store;
pub mod trace;
pub mod unit;
pub mod unit_index;
pub mod value;

// Re-export commonly used types at the crate root
pub use error::{EngineError, EvalError, StoreError, ValidationError};
pub use evaluator::evaluate;
pub use functions::{is_whitelisted, FUNCTION_WHITELIST};
pub use model::{
    DatasheetElement, ElementKind, Formula, Label, LabelCollection, Project, ProjectDefinition,
    ProjectNode,
};
pub use resolver::{
    check_cycles, compute_all_project_formula, parse_formula, FormulaDetails, FormulaDraft,
};
pub use scope::Scope;
pub use store::{DataStore, ObjectStore};
pub use trace::build_trace;
pub use unit::{ComputedResult, FieldUnit, FormulaUnit, StoredResult, Unit};
pub use unit_index::{UnitIndex, UnitIndexBuilder};
pub use value::Value;
