//! Condition sets (AND) and groups of condition sets (OR)

use crate::condition::{Condition, ConditionFunc};
use crate::context::{BuildContext, EvalContext};
use crate::error::EngineResult;
use autostate_config::ConfigNode;
use indexmap::IndexMap;
use tracing::{debug, info, warn};

/// A named set of conditions that must all match
#[derive(Debug, Clone)]
pub struct ConditionSet {
    name: String,
    conditions: IndexMap<String, Condition>,
}

impl ConditionSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            conditions: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Merge the condition attributes of `node` into this set
    ///
    /// `as_item_<name>` and `as_eval_<name>` attributes of `parent` bind
    /// conditions of this set that have no binding in `node`.
    pub fn update(
        &mut self,
        node: &ConfigNode,
        parent: Option<&ConfigNode>,
        ctx: &BuildContext,
    ) -> EngineResult<()> {
        for (attribute, raw) in node.attributes() {
            let Some((func, name)) = ConditionFunc::split_attribute(attribute) else {
                continue;
            };
            self.conditions
                .entry(name.to_string())
                .or_insert_with(|| Condition::new(name))
                .set(func, raw, ctx)
                .map_err(|e| e.context(format!("Condition {}", name)))?;
        }

        let Some(parent) = parent else {
            return Ok(());
        };
        for (attribute, raw) in parent.attributes() {
            let Some((func @ (ConditionFunc::Item | ConditionFunc::Eval), name)) =
                ConditionFunc::split_attribute(attribute)
            else {
                continue;
            };
            let own = node.has_attr(&format!("as_item_{}", name))
                || node.has_attr(&format!("as_eval_{}", name));
            if let (Some(condition), false) = (self.conditions.get_mut(name), own) {
                condition
                    .set(func, raw, ctx)
                    .map_err(|e| e.context(format!("Condition {}", name)))?;
            }
        }
        Ok(())
    }

    /// Complete all conditions, dropping those without any limit
    pub fn complete(&mut self, node: &ConfigNode, ctx: &BuildContext) -> EngineResult<()> {
        let mut vacuous = Vec::new();
        for (name, condition) in self.conditions.iter_mut() {
            if !condition
                .complete(node, ctx)
                .map_err(|e| e.context(format!("Condition set '{}'", self.name)))?
            {
                vacuous.push(name.clone());
            }
        }
        for name in vacuous {
            debug!(set = %self.name, condition = %name, "Dropping condition without limits");
            self.conditions.shift_remove(&name);
        }
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.conditions.len()
    }

    pub fn conditions(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.values()
    }

    /// Check whether every condition matches
    ///
    /// A condition that fails to evaluate is logged and counts as matching
    /// for this check only.
    pub fn all_conditions_matching(&self, ctx: &EvalContext) -> bool {
        info!("Check Condition Set '{}'", self.name);
        for condition in self.conditions.values() {
            let matching = condition.check(ctx).unwrap_or_else(|e| {
                warn!(
                    condition = condition.name(),
                    error = %e,
                    "Condition can not be evaluated, considering it as matching"
                );
                true
            });
            if !matching {
                return false;
            }
        }
        true
    }

    pub fn write_log(&self) {
        info!("Condition Set '{}':", self.name);
        for condition in self.conditions.values() {
            condition.write_log();
        }
    }
}

/// Condition sets sharing a role (enter or leave)
#[derive(Debug, Clone, Default)]
pub struct ConditionSetGroup {
    sets: IndexMap<String, ConditionSet>,
}

impl ConditionSetGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `node` into the set called `name`, creating it if needed
    pub fn update(
        &mut self,
        name: &str,
        node: &ConfigNode,
        parent: Option<&ConfigNode>,
        ctx: &BuildContext,
    ) -> EngineResult<()> {
        self.sets
            .entry(name.to_string())
            .or_insert_with(|| ConditionSet::new(name))
            .update(node, parent, ctx)
    }

    pub fn complete(&mut self, node: &ConfigNode, ctx: &BuildContext) -> EngineResult<()> {
        for set in self.sets.values_mut() {
            set.complete(node, ctx)?;
        }
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.sets.len()
    }

    pub fn get(&self, name: &str) -> Option<&ConditionSet> {
        self.sets.get(name)
    }

    /// Whether at least one condition set has all its conditions matching
    ///
    /// A group without sets reports `false`.
    pub fn one_set_matching(&self, ctx: &EvalContext) -> bool {
        self.sets.values().any(|set| {
            let matching = set.all_conditions_matching(ctx);
            if matching {
                info!("Condition Set '{}' matching", set.name());
            }
            matching
        })
    }

    pub fn write_log(&self) {
        for set in self.sets.values() {
            set.write_log();
        }
    }
}
