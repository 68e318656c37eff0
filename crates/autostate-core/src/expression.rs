//! Expression evaluation capability
//!
//! Computed values and conditions bound to an expression are evaluated by
//! the host through this narrow interface. The engine never interprets
//! expression text itself.

use std::collections::BTreeMap;
use thiserror::Error;

use crate::Value;

/// Variables visible to an expression, keyed by dotted name
/// (e.g. `current.state_id`)
pub type Variables = BTreeMap<String, Value>;

/// Errors raised while evaluating an expression
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    /// The expression could not be parsed
    #[error("invalid expression '{expression}': {message}")]
    Syntax { expression: String, message: String },

    /// The expression failed at run time
    #[error("problem evaluating '{expression}': {message}")]
    Failed { expression: String, message: String },
}

/// Result type for expression evaluation
pub type EvalResult<T> = Result<T, EvalError>;

/// Opaque, synchronous expression evaluation
pub trait ExpressionEvaluator: Send + Sync {
    /// Evaluate `expression` with `variables` visible and return its value
    fn evaluate(&self, expression: &str, variables: &Variables) -> EvalResult<Value>;
}
