//! Core types for autostate
//!
//! This crate provides the fundamental types shared by every autostate crate:
//! the dynamically typed [`Value`], the [`Cast`] functions applied to
//! configured values, [`ItemId`] paths into the host item tree, the
//! [`TriggerInfo`] provenance carried through an update cycle, the [`Clock`]
//! time source and the [`ExpressionEvaluator`] capability used for computed
//! values.

mod cast;
mod clock;
mod expression;
mod item_id;
mod trigger;
mod value;

pub use cast::{Cast, CastError, CastResult};
pub use clock::{Clock, FixedClock, SystemClock};
pub use expression::{EvalError, EvalResult, ExpressionEvaluator, Variables};
pub use item_id::{ItemId, ItemIdError};
pub use trigger::{original_caller, ChangedByLookup, OriginalCaller, TriggerInfo};
pub use value::Value;

/// Caller tag used for every write the engine performs itself
pub const PLUGIN_IDENTIFICATION: &str = "AutoState";

/// Caller tag the host uses when an item was changed by expression evaluation
pub const EVAL_CALLER: &str = "Eval";

/// Display text recorded while the controller is locked
pub const LASTSTATE_NAME_MANUALLY_LOCKED: &str = "Manually locked";

/// `strftime` pattern for the display text recorded while suspended
pub const LASTSTATE_NAME_SUSPENDED: &str = "Suspended until %H:%M:%S";

/// Default configuration values
pub mod defaults {
    /// Seconds to wait after startup before the first evaluation
    pub const STARTUP_DELAY: i64 = 10;

    /// Seconds a manual change suspends automatic mode
    pub const SUSPEND_TIME: i64 = 3600;

    /// Whether actions are repeated when the state does not change
    pub const REPEAT_ACTIONS: bool = true;

    /// Maximum depth of `as_use` inheritance
    pub const MAX_USE_DEPTH: usize = 5;
}
