//! FILENAME: report-engine/src/error.rs

use engine::{EngineError, EvalError, StoreError};
use thiserror::Error;
use uuid::Uuid;

/// Report-generation errors. Everything here aborts the whole run;
/// no partial report is ever returned. The only sanctioned partial path
/// is a join explicitly declared allow_discard, which drops rows before
/// any of these can fire.
#[derive(Error, Debug)]
pub enum ReportError {
    /// An expression failed during any pipeline step; carries the
    /// expression and the scope it was evaluated against.
    #[error("Evaluation of `{expression}` failed (scope: {scope}): {source}")]
    Evaluation {
        expression: String,
        scope: String,
        #[source]
        source: EvalError,
    },

    #[error("Bucket row has no alias '{alias}'")]
    MissingAlias { alias: String },

    #[error("No attribute '{attribute}' under alias '{alias}'")]
    MissingAttribute { alias: String, attribute: String },

    #[error("Label collection not found: {id}")]
    MissingCollection { id: Uuid },

    #[error("Join into '{alias}' matched {matches} labels but is declared same-cardinality")]
    CardinalityViolation { alias: String, matches: usize },

    #[error("Join into '{alias}' found no label matching '{value}'")]
    NoJoinMatch { alias: String, value: String },

    #[error("A grouped report needs at least one aggregate-phase column")]
    MissingAggregateColumn,

    #[error("Report definition error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Syntax(#[from] parser::ParseError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ReportError {
    /// Wraps an evaluation failure with the expression and scope context.
    pub fn evaluation(
        expression: &impl std::fmt::Display,
        scope: &engine::Scope,
        source: EvalError,
    ) -> Self {
        ReportError::Evaluation {
            expression: expression.to_string(),
            scope: scope.describe(),
            source,
        }
    }

    /// Returns true if the underlying cause is a recoverable missing
    /// object (callers rebuild the cache and retry).
    pub fn is_not_found(&self) -> bool {
        matches!(self, ReportError::Store(e) if e.is_not_found())
    }
}
