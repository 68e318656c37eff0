//! Error types for expression evaluation

use autostate_core::EvalError;
use thiserror::Error;

/// Result type for expression operations
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Errors that can occur during expression evaluation
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Invalid expression syntax
    #[error("invalid expression syntax: {message}")]
    SyntaxError { message: String },

    /// Undefined variable in expression
    #[error("undefined variable: {name}")]
    UndefinedVariable { name: String },

    /// Failed to evaluate expression
    #[error("failed to evaluate expression: {message}")]
    EvalError { message: String },

    /// Result could not be converted
    #[error("failed to convert result: {message}")]
    ConversionError { message: String },
}

impl From<minijinja::Error> for TemplateError {
    fn from(err: minijinja::Error) -> Self {
        match err.kind() {
            minijinja::ErrorKind::SyntaxError => TemplateError::SyntaxError {
                message: err.to_string(),
            },
            minijinja::ErrorKind::UndefinedError => TemplateError::UndefinedVariable {
                name: err.to_string(),
            },
            _ => TemplateError::EvalError {
                message: err.to_string(),
            },
        }
    }
}

impl TemplateError {
    /// Attach the expression text for the engine-facing error type
    pub fn into_eval_error(self, expression: &str) -> EvalError {
        match self {
            TemplateError::SyntaxError { message } => EvalError::Syntax {
                expression: expression.to_string(),
                message,
            },
            other => EvalError::Failed {
                expression: expression.to_string(),
                message: other.to_string(),
            },
        }
    }
}
