//! Contexts handed to conditions, values and actions
//!
//! [`BuildContext`] is used while states are built from the configuration
//! tree. [`EvalContext`] is created by the controller for every update cycle
//! and passed by reference into every check and action.

use crate::environment::Environment;
use crate::error::{EngineError, EngineResult};
use crate::variables::VariableContext;
use autostate_config::{ConfigNode, ConfigTree, YamlValue};
use autostate_core::{ExpressionEvaluator, ItemId, TriggerInfo, Value, Variables, PLUGIN_IDENTIFICATION};
use autostate_items::ItemStore;
use std::collections::HashSet;
use tracing::{debug, trace};

/// Provenance of the trigger that started the running cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateTrigger {
    pub item: Option<String>,
    pub caller: Option<String>,
    pub source: Option<String>,
    pub dest: Option<String>,
    pub original_item: Option<String>,
    pub original_caller: Option<String>,
    pub original_source: Option<String>,
}

/// Controller values read by the built-in conditions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleInfo {
    /// Id of the last active state, empty if none
    pub laststate_id: String,
    /// Seconds the current state could not be left
    pub delay: f64,
    /// Age of the last state id item, if one is configured
    pub age: Option<f64>,
    pub trigger: UpdateTrigger,
}

/// Everything needed to evaluate conditions and run actions
pub struct EvalContext<'a> {
    /// The object item the state machine belongs to
    pub object: &'a ItemId,
    pub items: &'a ItemStore,
    pub evaluator: &'a dyn ExpressionEvaluator,
    pub environment: &'a Environment,
    pub variables: &'a VariableContext,
    pub cycle: &'a CycleInfo,
}

impl EvalContext<'_> {
    /// Variables visible to expressions
    ///
    /// The scratch variables plus the environment snapshot (`current.*`)
    /// and the trigger provenance (`trigger.*`, `original.*`).
    pub fn expression_variables(&self) -> Variables {
        let mut vars = self.variables.variables().clone();
        let env = self.environment;
        vars.insert("current.time".into(), Value::Time(env.time));
        vars.insert("current.weekday".into(), Value::from(env.weekday));
        vars.insert("current.month".into(), Value::from(env.month));
        vars.insert("current.sun_azimut".into(), Value::Num(env.sun_azimut));
        vars.insert("current.sun_altitude".into(), Value::Num(env.sun_altitude));
        vars.insert("current.random".into(), Value::from(env.random));

        let trigger = &self.cycle.trigger;
        for (name, value) in [
            ("trigger.item", &trigger.item),
            ("trigger.caller", &trigger.caller),
            ("trigger.source", &trigger.source),
            ("trigger.dest", &trigger.dest),
            ("original.item", &trigger.original_item),
            ("original.caller", &trigger.original_caller),
            ("original.source", &trigger.original_source),
        ] {
            vars.insert(name.into(), Value::from(value.clone()));
        }
        vars
    }

    pub fn evaluate(&self, expression: &str) -> EngineResult<Value> {
        let value = self
            .evaluator
            .evaluate(expression, &self.expression_variables())?;
        trace!(expression, %value, "Evaluated expression");
        Ok(value)
    }

    pub fn item_value(&self, id: &ItemId) -> EngineResult<Value> {
        self.items
            .value(id.as_str())
            .ok_or_else(|| EngineError::ItemNotFound(id.to_string()))
    }

    /// Seconds since the item last changed, relative to the cycle's time
    pub fn item_age(&self, id: &ItemId) -> EngineResult<f64> {
        self.items
            .get(id.as_str())
            .map(|state| state.age_at(self.environment.now_utc()))
            .ok_or_else(|| EngineError::ItemNotFound(id.to_string()))
    }

    /// Write an item, tagging the change as made by the engine
    pub fn write_item(&self, id: &ItemId, value: Value) -> EngineResult<()> {
        let trigger = TriggerInfo::new(PLUGIN_IDENTIFICATION).with_source(self.object.as_str());
        self.items.set(id, value, trigger)?;
        Ok(())
    }
}

/// Read-only view used while building states from the configuration
pub struct BuildContext<'a> {
    pub tree: &'a ConfigTree,
    /// Configuration node of the object item
    pub object: &'a ConfigNode,
    pub items: &'a ItemStore,
}

impl<'a> BuildContext<'a> {
    pub fn new(tree: &'a ConfigTree, object: &'a ConfigNode, items: &'a ItemStore) -> Self {
        Self {
            tree,
            object,
            items,
        }
    }

    pub fn object_id(&self) -> &'a ItemId {
        self.object.id()
    }

    /// Resolve an item reference, which may be relative to the object item,
    /// and make sure the item exists
    pub fn return_item(&self, reference: &str) -> EngineResult<ItemId> {
        let id = self.object.id().resolve(reference.trim())?;
        if !self.items.contains(id.as_str()) {
            return Err(EngineError::ItemNotFound(id.to_string()));
        }
        Ok(id)
    }

    /// Resolve the item named by an attribute of the object item
    pub fn return_item_by_attribute(&self, attribute: &str) -> EngineResult<Option<ItemId>> {
        match self.object.attr_str(attribute) {
            Some(reference) => self.return_item(&reference).map(Some),
            None => Ok(None),
        }
    }

    /// Configuration node referenced by the `as_use` attribute of `node`
    pub fn use_target(&self, node: &ConfigNode) -> EngineResult<Option<&'a ConfigNode>> {
        let Some(reference) = node.attr_str("as_use") else {
            return Ok(None);
        };
        let id = self.object.id().resolve(reference.trim())?;
        match self.tree.get(id.as_str()) {
            Some(target) => Ok(Some(target)),
            None => Err(EngineError::Config(format!(
                "{}: Referenced item '{}' not found!",
                node.id(),
                reference
            ))),
        }
    }

    /// Look up an attribute on `node`, its parent and the nodes it uses
    pub fn find_attribute(&self, node: &'a ConfigNode, attribute: &str) -> Option<&'a YamlValue> {
        if let Some(value) = node.attr(attribute) {
            return Some(value);
        }
        if let Some(value) = self.tree.parent(node.id()).and_then(|p| p.attr(attribute)) {
            return Some(value);
        }

        let mut visited = HashSet::from([node.id().clone()]);
        let mut current = node;
        while let Ok(Some(target)) = self.use_target(current) {
            if !visited.insert(target.id().clone()) {
                debug!(node = %node.id(), "Cycle in 'as_use' chain");
                break;
            }
            if let Some(value) = target.attr(attribute) {
                return Some(value);
            }
            current = target;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autostate_core::Cast;

    fn tree() -> ConfigTree {
        let document: YamlValue = serde_yaml::from_str(
            r#"
items:
  living:
    height:
      type: num
    blind:
      as_plugin: active
      as_item_height: ..height
      shared:
        as_item_angle: living.height
      night:
        as_use: .shared
        enter:
          as_value_angle: 5
"#,
        )
        .unwrap();
        ConfigTree::from_document(&document).unwrap()
    }

    fn store() -> ItemStore {
        let items = ItemStore::new();
        items
            .insert(ItemId::new("living.height").unwrap(), Value::Num(0.0), Some(Cast::Num))
            .unwrap();
        items
    }

    #[test]
    fn test_return_item() {
        let tree = tree();
        let items = store();
        let ctx = BuildContext::new(&tree, tree.get("living.blind").unwrap(), &items);
        assert_eq!(ctx.return_item("..height").unwrap().as_str(), "living.height");
        assert_eq!(ctx.return_item("living.height").unwrap().as_str(), "living.height");
        assert!(matches!(
            ctx.return_item(".missing"),
            Err(EngineError::ItemNotFound(_))
        ));
        assert_eq!(
            ctx.return_item_by_attribute("as_item_height").unwrap().unwrap().as_str(),
            "living.height"
        );
    }

    #[test]
    fn test_find_attribute() {
        let tree = tree();
        let items = store();
        let ctx = BuildContext::new(&tree, tree.get("living.blind").unwrap(), &items);
        let night = tree.get("living.blind.night").unwrap();
        let enter = tree.get("living.blind.night.enter").unwrap();

        // own attribute
        assert!(ctx.find_attribute(enter, "as_value_angle").is_some());
        // parent
        assert!(ctx.find_attribute(night, "as_item_height").is_some());
        // used node
        assert!(ctx.find_attribute(night, "as_item_angle").is_some());
        assert!(ctx.find_attribute(night, "as_item_nothing").is_none());
    }
}
