//! Actions run when a state is entered, confirmed or left
//!
//! Actions are configured on state items:
//!
//! - `as_set_<name>: <value>` writes a value to the item named by
//!   `as_item_<name>` (looked up on the state, its parents and the nodes
//!   it uses)
//! - `as_run_<name>: <expression>` evaluates an expression for its side
//!   effects
//! - `as_on_leave_set_<name>` / `as_on_leave_run_<name>` do the same when
//!   the state is left
//! - `as_repeat_<name>: false` suppresses the action when the state is
//!   confirmed without a change

use crate::context::{BuildContext, EvalContext};
use crate::error::{EngineError, EngineResult};
use crate::value::{ResolvedValue, ValueSource};
use autostate_config::{yaml_to_value, ConfigNode, YamlValue};
use autostate_core::{Cast, ItemId, Value};
use indexmap::IndexMap;
use tracing::{debug, error, info};

/// When an action runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionScope {
    /// On enter and on stay
    Active,
    /// On leave
    Leave,
}

/// A side-effecting unit run by a state
pub trait Action: Send + Sync {
    fn name(&self) -> &str;

    /// Run the action
    ///
    /// `is_repeat` is set when the state did not change. `allow_repeat` is
    /// the object item's repeat setting; an action may override it.
    /// Failures are logged, never returned.
    fn execute(&self, ctx: &EvalContext, is_repeat: bool, allow_repeat: bool);

    fn write_log(&self);
}

/// Per-action repeat override
#[derive(Debug, Clone, Copy, Default)]
struct Repeat(Option<bool>);

impl Repeat {
    fn should_run(self, name: &str, is_repeat: bool, allow_repeat: bool) -> bool {
        if is_repeat && !self.0.unwrap_or(allow_repeat) {
            info!("{}: Repeating actions is not allowed", name);
            return false;
        }
        true
    }
}

/// Write a value to an item
pub struct SetItemAction {
    name: String,
    item: ItemId,
    value: ResolvedValue,
    repeat: Repeat,
}

impl SetItemAction {
    pub fn new(name: impl Into<String>, item: ItemId, value: ResolvedValue) -> Self {
        Self {
            name: name.into(),
            item,
            value,
            repeat: Repeat::default(),
        }
    }

    pub fn item(&self) -> &ItemId {
        &self.item
    }
}

impl Action for SetItemAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &EvalContext, is_repeat: bool, allow_repeat: bool) {
        if !self.repeat.should_run(&self.name, is_repeat, allow_repeat) {
            return;
        }
        let result = self.value.get(ctx).and_then(|value| {
            let value = value.unwrap_or(Value::Null);
            info!("{}: Set '{}' to '{}'", self.name, self.item, value);
            ctx.write_item(&self.item, value)
        });
        if let Err(e) = result {
            error!(action = %self.name, error = %e, "Action failed");
        }
    }

    fn write_log(&self) {
        info!("Action '{}': set item {}", self.name, self.item);
        self.value.write_log();
        if let Some(repeat) = self.repeat.0 {
            debug!("repeat: {}", repeat);
        }
    }
}

/// Evaluate an expression for its side effects
pub struct RunAction {
    name: String,
    expression: String,
    repeat: Repeat,
}

impl RunAction {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
            repeat: Repeat::default(),
        }
    }
}

impl Action for RunAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &EvalContext, is_repeat: bool, allow_repeat: bool) {
        if !self.repeat.should_run(&self.name, is_repeat, allow_repeat) {
            return;
        }
        info!("{}: Run '{}'", self.name, self.expression);
        match ctx.evaluate(&self.expression) {
            Ok(result) => debug!(action = %self.name, %result, "Run finished"),
            Err(e) => error!(action = %self.name, error = %e, "Action failed"),
        }
    }

    fn write_log(&self) {
        info!("Action '{}': run {}", self.name, self.expression);
        if let Some(repeat) = self.repeat.0 {
            debug!("repeat: {}", repeat);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActionKind {
    Set,
    Run,
}

#[derive(Debug, Clone)]
struct ActionDefinition {
    kind: ActionKind,
    value: YamlValue,
}

/// Ordered actions of a state
///
/// Definitions are collected with [`ActionList::update`] while the state
/// merges its configuration and turned into actions by
/// [`ActionList::complete`].
#[derive(Default)]
pub struct ActionList {
    definitions: IndexMap<(ActionScope, String), ActionDefinition>,
    repeats: IndexMap<String, Value>,
    actions: Vec<(ActionScope, Box<dyn Action>)>,
}

impl ActionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action attribute; returns `false` for other attributes
    pub fn update(&mut self, attribute: &str, value: &YamlValue) -> bool {
        const PREFIXES: [(&str, ActionScope, ActionKind); 4] = [
            ("as_on_leave_set_", ActionScope::Leave, ActionKind::Set),
            ("as_on_leave_run_", ActionScope::Leave, ActionKind::Run),
            ("as_set_", ActionScope::Active, ActionKind::Set),
            ("as_run_", ActionScope::Active, ActionKind::Run),
        ];

        if let Some(name) = attribute.strip_prefix("as_repeat_") {
            self.repeats.insert(name.to_string(), yaml_to_value(value));
            return true;
        }
        for (prefix, scope, kind) in PREFIXES {
            if let Some(name) = attribute.strip_prefix(prefix).filter(|n| !n.is_empty()) {
                self.definitions.insert(
                    (scope, name.to_string()),
                    ActionDefinition {
                        kind,
                        value: value.clone(),
                    },
                );
                return true;
            }
        }
        false
    }

    /// Build the actions of the state configured by `node`
    pub fn complete(&mut self, node: &ConfigNode, ctx: &BuildContext) -> EngineResult<()> {
        let mut actions: Vec<(ActionScope, Box<dyn Action>)> = Vec::new();
        for ((scope, name), definition) in &self.definitions {
            let repeat = match self.repeats.get(name) {
                Some(value) => Some(Cast::Bool.apply(value.clone())?.is_truthy()),
                None => None,
            };
            let action: Box<dyn Action> = match definition.kind {
                ActionKind::Set => {
                    let mut action = build_set(name, &definition.value, node, ctx)
                        .map_err(|e| e.context(format!("Action {}", name)))?;
                    action.repeat = Repeat(repeat);
                    Box::new(action)
                }
                ActionKind::Run => {
                    let expression = match ValueSource::parse(&definition.value, ctx)? {
                        ValueSource::Expression(expression) => expression,
                        ValueSource::Literal(Value::Str(expression)) => expression,
                        other => {
                            return Err(EngineError::Config(format!(
                                "Action {}: '{}' can not be run",
                                name, other
                            )))
                        }
                    };
                    let mut action = RunAction::new(name.as_str(), expression);
                    action.repeat = Repeat(repeat);
                    Box::new(action)
                }
            };
            actions.push((*scope, action));
        }
        self.actions = actions;
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.actions.len()
    }

    pub fn count_scope(&self, scope: ActionScope) -> usize {
        self.actions.iter().filter(|(s, _)| *s == scope).count()
    }

    /// Add an already built action
    pub fn push(&mut self, scope: ActionScope, action: Box<dyn Action>) {
        self.actions.push((scope, action));
    }

    pub fn execute(&self, scope: ActionScope, ctx: &EvalContext, is_repeat: bool, allow_repeat: bool) {
        for (_, action) in self.actions.iter().filter(|(s, _)| *s == scope) {
            action.execute(ctx, is_repeat, allow_repeat);
        }
    }

    pub fn write_log(&self) {
        for (scope, action) in &self.actions {
            if *scope == ActionScope::Leave {
                info!("On leave:");
            }
            action.write_log();
        }
    }
}

fn build_set(
    name: &str,
    raw: &YamlValue,
    node: &ConfigNode,
    ctx: &BuildContext,
) -> EngineResult<SetItemAction> {
    let attribute = format!("as_item_{}", name);
    let reference = ctx
        .find_attribute(node, &attribute)
        .and_then(YamlValue::as_str)
        .ok_or_else(|| EngineError::Config(format!("No item '{}' given!", attribute)))?;
    let item = ctx.return_item(reference)?;

    let mut value = ResolvedValue::new(name);
    value.set(raw, ctx)?;
    if let Some(cast) = ctx.items.cast(item.as_str()) {
        value.set_cast(cast);
        value.literal()?;
    }
    Ok(SetItemAction::new(name, item, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(text: &str) -> YamlValue {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn test_update_recognizes_attributes() {
        let mut list = ActionList::new();
        assert!(list.update("as_set_height", &yaml("100")));
        assert!(list.update("as_on_leave_run_log", &yaml("eval:1")));
        assert!(list.update("as_repeat_height", &yaml("false")));
        assert!(!list.update("as_item_height", &yaml("blind.height")));
        assert!(!list.update("as_min_time", &yaml("'22:00'")));
        assert!(!list.update("as_set_", &yaml("1")));
        assert_eq!(list.definitions.len(), 2);
    }

    #[test]
    fn test_later_definition_overrides() {
        let mut list = ActionList::new();
        list.update("as_set_height", &yaml("100"));
        list.update("as_set_height", &yaml("50"));
        assert_eq!(list.definitions.len(), 1);
        let definition = &list.definitions[&(ActionScope::Active, "height".to_string())];
        assert_eq!(definition.value, yaml("50"));
    }

    #[test]
    fn test_repeat_rule() {
        assert!(Repeat(None).should_run("a", false, false));
        assert!(Repeat(None).should_run("a", true, true));
        assert!(!Repeat(None).should_run("a", true, false));
        assert!(Repeat(Some(true)).should_run("a", true, false));
        assert!(!Repeat(Some(false)).should_run("a", true, true));
    }
}
