//! Error types for the engine

use autostate_config::ConfigError;
use autostate_core::{CastError, EvalError, ItemIdError};
use autostate_items::ItemError;
use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised while building or running a state machine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid configuration, raised while building states and conditions
    #[error("{0}")]
    Config(String),

    /// A value could not be determined while checking conditions
    #[error("{0}")]
    Evaluation(String),

    /// A configured value does not fit its cast
    #[error(transparent)]
    Cast(#[from] CastError),

    /// A referenced item does not exist
    #[error("Item '{0}' not found!")]
    ItemNotFound(String),

    /// An object item has no valid state
    #[error("{0}: No states defined!")]
    NoStates(String),

    /// A timer could not be scheduled
    #[error("scheduler: {0}")]
    Scheduler(String),
}

impl EngineError {
    /// Whether the error belongs to the configuration class
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            EngineError::Config(_)
                | EngineError::Cast(_)
                | EngineError::ItemNotFound(_)
                | EngineError::NoStates(_)
        )
    }

    /// Prefix the message with the name of the owning element
    pub fn context(self, owner: impl std::fmt::Display) -> Self {
        match self {
            EngineError::Config(message) => EngineError::Config(format!("{}: {}", owner, message)),
            EngineError::Evaluation(message) => {
                EngineError::Evaluation(format!("{}: {}", owner, message))
            }
            EngineError::Cast(e) => EngineError::Config(format!("{}: {}", owner, e)),
            EngineError::ItemNotFound(item) => {
                EngineError::Config(format!("{}: Item '{}' not found!", owner, item))
            }
            other => other,
        }
    }
}

impl From<EvalError> for EngineError {
    fn from(e: EvalError) -> Self {
        EngineError::Evaluation(e.to_string())
    }
}

impl From<ItemIdError> for EngineError {
    fn from(e: ItemIdError) -> Self {
        EngineError::Config(e.to_string())
    }
}

impl From<ConfigError> for EngineError {
    fn from(e: ConfigError) -> Self {
        EngineError::Config(e.to_string())
    }
}

impl From<ItemError> for EngineError {
    fn from(e: ItemError) -> Self {
        match e {
            ItemError::NotFound(item) => EngineError::ItemNotFound(item),
            ItemError::Cast { source, .. } => EngineError::Cast(source),
            other => EngineError::Config(other.to_string()),
        }
    }
}
