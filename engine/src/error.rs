//! FILENAME: engine/src/error.rs
//! PURPOSE: Error taxonomy for formula evaluation and resolution.
//! CONTEXT: Syntax errors come from the parser crate; everything past the
//! parse boundary is classified here. Evaluation errors carry the rendered
//! offending sub-expression so formula authors see what failed.

use thiserror::Error;

/// An error raised while evaluating a parsed expression against a scope.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Unknown name '{name}' in expression: {expression}")]
    UnknownName { name: String, expression: String },

    #[error("Unknown function '{name}'")]
    UnknownFunction { name: String },

    #[error("Function '{name}' expects {expected} argument(s), got {actual}")]
    ArityMismatch {
        name: String,
        expected: String,
        actual: usize,
    },

    #[error("Type error in {expression}: {message}")]
    TypeMismatch {
        expression: String,
        message: String,
    },

    #[error("Cyclic evaluation of formula unit '{name}'")]
    CyclicUnit { name: String },
}

impl EvalError {
    /// Builds a TypeMismatch for the given expression node.
    pub fn type_mismatch(expression: &impl std::fmt::Display, message: impl Into<String>) -> Self {
        EvalError::TypeMismatch {
            expression: expression.to_string(),
            message: message.into(),
        }
    }
}

/// An error raised by the formula resolver before any unit is created.
/// These surface immediately to the formula author.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error(transparent)]
    Syntax(#[from] parser::ParseError),

    #[error("Formula '{name}' references itself")]
    SelfReference { name: String },

    #[error("Formula '{formula}' references '{name}', which is not a sibling formula or field")]
    UnresolvedName { formula: String, name: String },

    #[error("Formula '{formula}' calls '{function}', which is not a whitelisted function")]
    DisallowedFunction { formula: String, function: String },

    #[error("Cyclic formula dependency: {path}")]
    CyclicDependency { path: String },
}

/// An error raised by a persistence or object-store collaborator.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A record the caller asked for by id does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A stored object is absent. Recoverable: callers rebuild and re-save.
    #[error("Object not found for key '{key}'")]
    ObjectNotFound { key: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt stored object: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Returns true for the recoverable missing-object case.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::ObjectNotFound { .. } | StoreError::NotFound { .. }
        )
    }
}

/// Umbrella error for engine entry points that touch collaborators,
/// validation, and evaluation in one call.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Eval(#[from] EvalError),
}
