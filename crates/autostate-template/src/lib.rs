//! Expression evaluation for autostate
//!
//! This crate provides the [`ExpressionEngine`], the host capability that
//! evaluates `eval:` values and `as_eval_*` conditions. It is built on
//! minijinja expressions with autostate-specific functions:
//!
//! # Item Access
//!
//! - `item('room.temperature')` - Current value of an item
//! - `age('room.temperature')` - Seconds since the item last changed
//!
//! # Engine Variables
//!
//! - `current.state_id`, `current.state_name` - State being checked
//! - `get_variable('item.suspend_time')`, `get_variable('item.suspend_remaining')` -
//!   Suspension settings; `item` is the accessor function, not a variable
//! - `trigger.caller`, `trigger.item`, ... - What started the update
//! - `get_variable('current.state_id')` - Lookup by dotted name
//!
//! # Helpers
//!
//! - `random_int(0, 255)` - Random integer in an inclusive range
//! - `sun_tracking()` - Lamella angle perpendicular to the sun
//! - `| bool` / `| clamp(0, 100)` - Filters
//!
//! # Example
//!
//! ```ignore
//! use autostate_template::ExpressionEngine;
//!
//! let engine = ExpressionEngine::new(items);
//! let value = engine.evaluate("item('weather.wind') > 10", &variables)?;
//! ```

mod engine;
mod error;
mod filters;
mod globals;

pub use engine::ExpressionEngine;
pub use error::{TemplateError, TemplateResult};
