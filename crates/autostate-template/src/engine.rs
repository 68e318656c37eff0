//! Expression engine for autostate
//!
//! Evaluates minijinja expressions with access to host items and the
//! engine's variable context.

use crate::error::{TemplateError, TemplateResult};
use crate::filters;
use crate::globals;
use autostate_core::{EvalResult, ExpressionEvaluator, Value, Variables};
use autostate_items::ItemStore;
use minijinja::{Environment, Error, ErrorKind};
use std::sync::Arc;
use tracing::{debug, trace};

/// Expression engine with item access
///
/// The engine provides:
/// - Access to item values and ages via `item()` and `age()`
/// - The variable context of the running update cycle
/// - Helpers like `random_int()` and `sun_tracking()`
pub struct ExpressionEngine {
    env: Environment<'static>,
}

impl ExpressionEngine {
    /// Create a new expression engine reading from the item store
    pub fn new(items: Arc<ItemStore>) -> Self {
        let mut env = Environment::new();
        env.set_debug(true);

        Self::register_filters(&mut env);
        Self::register_globals(&mut env, items);

        Self { env }
    }

    fn register_filters(env: &mut Environment<'static>) {
        env.add_filter("bool", filters::to_bool);
        env.add_filter("clamp", filters::clamp);
    }

    fn register_globals(env: &mut Environment<'static>, items: Arc<ItemStore>) {
        let items_for_item = items.clone();
        env.add_function("item", move |id: &str| -> Result<minijinja::Value, Error> {
            items_for_item
                .value(id)
                .map(|v| minijinja::Value::from_serialize(&v))
                .ok_or_else(|| {
                    Error::new(
                        ErrorKind::InvalidOperation,
                        format!("item '{}' not found", id),
                    )
                })
        });

        let items_for_age = items;
        env.add_function("age", move |id: &str| -> Result<f64, Error> {
            items_for_age.age(id).ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidOperation,
                    format!("item '{}' not found", id),
                )
            })
        });

        env.add_function("get_variable", globals::get_variable);
        env.add_function("random_int", globals::random_int);
        env.add_function("sun_tracking", globals::sun_tracking);
    }

    /// Evaluate an expression with the given variables and return the raw
    /// minijinja value
    pub fn evaluate_raw(
        &self,
        expression: &str,
        variables: &Variables,
    ) -> TemplateResult<minijinja::Value> {
        debug!("Evaluating expression: {}", expression);
        let expr = self.env.compile_expression(expression)?;
        let result = expr.eval(context(variables))?;
        trace!(%result, "Expression result");
        Ok(result)
    }

    /// Evaluate an expression and convert the result to a [`Value`]
    pub fn evaluate_value(&self, expression: &str, variables: &Variables) -> TemplateResult<Value> {
        let result = self.evaluate_raw(expression, variables)?;
        if result.is_undefined() {
            return Ok(Value::Null);
        }
        let json = serde_json::to_value(&result).map_err(|e| TemplateError::ConversionError {
            message: e.to_string(),
        })?;
        Ok(Value::from_json(&json))
    }
}

impl ExpressionEvaluator for ExpressionEngine {
    fn evaluate(&self, expression: &str, variables: &Variables) -> EvalResult<Value> {
        self.evaluate_value(expression, variables)
            .map_err(|e| e.into_eval_error(expression))
    }
}

/// Names of the registered functions; no variable root may shadow them
const FUNCTIONS: [&str; 5] = ["item", "age", "get_variable", "random_int", "sun_tracking"];

/// Build the expression context from the variables
///
/// Dotted names become nested mappings, `{"current.state_id": "day"}` turns
/// into `{"current": {"state_id": "day"}}`. Roots that collide with a
/// function name (`item.suspend_time`) stay out of the nested part. Every
/// variable is also kept by its full name under
/// [`VARIABLES`](globals::VARIABLES) for `get_variable()`.
fn context(variables: &Variables) -> serde_json::Value {
    let mut root = serde_json::Map::new();
    'vars: for (name, value) in variables {
        let mut parts: Vec<&str> = name.split('.').collect();
        if FUNCTIONS.contains(&parts[0]) || parts[0] == globals::VARIABLES {
            continue;
        }
        let Some(leaf) = parts.pop() else {
            continue;
        };
        let mut node = &mut root;
        for part in parts {
            let entry = node
                .entry(part.to_string())
                .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
            if !entry.is_object() {
                *entry = serde_json::Value::Object(serde_json::Map::new());
            }
            match entry.as_object_mut() {
                Some(map) => node = map,
                None => continue 'vars,
            }
        }
        node.insert(leaf.to_string(), value.to_json());
    }
    let flat = variables
        .iter()
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect();
    root.insert(globals::VARIABLES.to_string(), serde_json::Value::Object(flat));
    serde_json::Value::Object(root)
}
