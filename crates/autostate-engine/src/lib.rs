//! State Engine
//!
//! This crate decides, for every object item, which of its states applies
//! and runs the actions of that state.
//!
//! # Architecture
//!
//! ```text
//! CONTROLLER = [STATE] in priority order
//! STATE      = ENTER GROUP + LEAVE GROUP + ACTIONS
//! GROUP      = CONDITION SET OR CONDITION SET ...
//! SET        = CONDITION AND CONDITION ...
//! ```
//!
//! - **Conditions** compare a live value against `value`, `min`/`max` and
//!   the age of an item against `agemin`/`agemax`
//! - **States** can be entered if one enter set matches and left if one
//!   leave set matches; a state without sets of a kind always can
//! - **Controllers** stay at a state that can not be left and otherwise
//!   enter the first state that can be entered
//!
//! # Key Types
//!
//! - [`ControllerManager`] - Builds controllers and routes item changes
//! - [`Controller`] - Update cycle, lock and suspension of one object item
//! - [`State`] - Condition set groups and actions of one state
//! - [`Condition`] - A single named predicate
//! - [`Scheduler`] - Timer facility for delays and periodic triggers

pub mod action;
pub mod condition;
pub mod condition_set;
pub mod context;
pub mod controller;
pub mod environment;
pub mod error;
pub mod manager;
pub mod manual;
pub mod scheduler;
pub mod state;
pub mod value;
pub mod variables;

pub use action::{Action, ActionList, ActionScope, RunAction, SetItemAction};
pub use condition::{Builtin, Condition, ConditionFunc};
pub use condition_set::{ConditionSet, ConditionSetGroup};
pub use context::{BuildContext, CycleInfo, EvalContext, UpdateTrigger};
pub use controller::{Controller, Services};
pub use autostate_core::{Clock, FixedClock, SystemClock};
pub use environment::{sun_position, Environment};
pub use error::{EngineError, EngineResult};
pub use manager::{seed_items, ControllerManager, PLUGIN_ATTRIBUTE};
pub use manual::{manual_item_update_eval, ManualFilter};
pub use scheduler::{Job, ManualScheduler, Scheduler, TokioScheduler};
pub use state::State;
pub use value::{ResolvedValue, ValueKind, ValueSource};
pub use variables::VariableContext;
