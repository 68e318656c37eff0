//! Scratch variables visible to expressions during an update cycle

use crate::error::{EngineError, EngineResult};
use autostate_core::{Value, Variables};
use std::ops::{Deref, DerefMut};

pub const SUSPEND_TIME: &str = "item.suspend_time";
pub const SUSPEND_REMAINING: &str = "item.suspend_remaining";
pub const CURRENT_STATE_ID: &str = "current.state_id";
pub const CURRENT_STATE_NAME: &str = "current.state_name";

/// Fixed set of named variables
///
/// Only the variables created by [`VariableContext::new`] exist. Reading an
/// unknown variable yields a descriptive text, writing one is an error.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableContext {
    values: Variables,
}

impl VariableContext {
    pub fn new(suspend_time: Value) -> Self {
        let values = Variables::from([
            (SUSPEND_TIME.to_string(), suspend_time),
            (SUSPEND_REMAINING.to_string(), Value::Num(0.0)),
            (CURRENT_STATE_ID.to_string(), Value::from("")),
            (CURRENT_STATE_NAME.to_string(), Value::from("")),
        ]);
        Self { values }
    }

    pub fn get_variable(&self, name: &str) -> Value {
        self.values
            .get(name)
            .cloned()
            .unwrap_or_else(|| Value::from(format!("(Unknown variable '{}'!)", name)))
    }

    pub fn set_variable(&mut self, name: &str, value: impl Into<Value>) -> EngineResult<()> {
        match self.values.get_mut(name) {
            Some(slot) => {
                *slot = value.into();
                Ok(())
            }
            None => Err(EngineError::Evaluation(format!(
                "Unknown variable '{}'!",
                name
            ))),
        }
    }

    pub fn variables(&self) -> &Variables {
        &self.values
    }

    /// Expose the id and name of the state being checked
    ///
    /// Both variables are reset to empty text when the returned guard is
    /// dropped.
    pub fn enter_state(&mut self, id: &str, name: &str) -> StateScope<'_> {
        self.set_current(id, name);
        StateScope { context: self }
    }

    fn set_current(&mut self, id: &str, name: &str) {
        self.values
            .insert(CURRENT_STATE_ID.to_string(), Value::from(id));
        self.values
            .insert(CURRENT_STATE_NAME.to_string(), Value::from(name));
    }
}

/// Guard returned by [`VariableContext::enter_state`]
pub struct StateScope<'a> {
    context: &'a mut VariableContext,
}

impl Deref for StateScope<'_> {
    type Target = VariableContext;

    fn deref(&self) -> &VariableContext {
        self.context
    }
}

impl DerefMut for StateScope<'_> {
    fn deref_mut(&mut self) -> &mut VariableContext {
        self.context
    }
}

impl Drop for StateScope<'_> {
    fn drop(&mut self) {
        self.context.set_current("", "");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_and_set() {
        let mut vars = VariableContext::new(Value::Num(3600.0));
        assert_eq!(vars.get_variable(SUSPEND_TIME), Value::Num(3600.0));

        vars.set_variable(SUSPEND_REMAINING, -1).unwrap();
        assert_eq!(vars.get_variable(SUSPEND_REMAINING), Value::Num(-1.0));

        assert_eq!(
            vars.get_variable("foo.bar"),
            Value::from("(Unknown variable 'foo.bar'!)")
        );
        assert!(vars.set_variable("foo.bar", 1).is_err());
    }

    #[test]
    fn test_state_scope_resets() {
        let mut vars = VariableContext::new(Value::Num(0.0));
        {
            let scope = vars.enter_state("blind.night", "Night");
            assert_eq!(scope.get_variable(CURRENT_STATE_ID), Value::from("blind.night"));
            assert_eq!(scope.get_variable(CURRENT_STATE_NAME), Value::from("Night"));
        }
        assert_eq!(vars.get_variable(CURRENT_STATE_ID), Value::from(""));
        assert_eq!(vars.get_variable(CURRENT_STATE_NAME), Value::from(""));
    }
}
