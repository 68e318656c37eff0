//! States of an object item
//!
//! A state is built from one child item of the object item. Its `enter` and
//! `enter_*` children form the enter group, `leave` and `leave_*` the leave
//! group. `as_use` imports the definition of another item first, so the
//! state's own attributes override the imported ones.

use crate::action::{ActionList, ActionScope};
use crate::condition_set::ConditionSetGroup;
use crate::context::{BuildContext, EvalContext};
use crate::error::{EngineError, EngineResult};
use crate::value::{ResolvedValue, ValueSource};
use autostate_config::ConfigNode;
use autostate_core::{defaults, Cast, ItemId, Value};
use std::collections::HashSet;
use tracing::{debug, info, info_span, warn};

/// A single state with its condition set groups and actions
pub struct State {
    id: ItemId,
    name: String,
    text: ResolvedValue,
    enter: ConditionSetGroup,
    leave: ConditionSetGroup,
    actions: ActionList,
}

impl State {
    /// Build the state configured by `node`
    pub fn new(node: &ConfigNode, ctx: &BuildContext) -> EngineResult<Self> {
        let mut state = Self {
            id: node.id().clone(),
            name: String::new(),
            text: ResolvedValue::new("name"),
            enter: ConditionSetGroup::new(),
            leave: ConditionSetGroup::new(),
            actions: ActionList::new(),
        };
        let mut visited = HashSet::new();
        state
            .fill(node, 0, &mut visited, ctx)
            .map_err(|e| e.context(format!("State {}", node.id())))?;
        Ok(state)
    }

    fn fill(
        &mut self,
        node: &ConfigNode,
        depth: usize,
        visited: &mut HashSet<ItemId>,
        ctx: &BuildContext,
    ) -> EngineResult<()> {
        if depth > defaults::MAX_USE_DEPTH {
            return Err(EngineError::Config(format!(
                "{}: Too many levels of 'as_use'",
                node.id()
            )));
        }
        if !visited.insert(node.id().clone()) {
            return Err(EngineError::Config(format!(
                "{}: 'as_use' refers back to an item already in use",
                node.id()
            )));
        }

        if let Some(target) = ctx.use_target(node)? {
            debug!(state = %self.id, uses = %target.id(), "Importing definition");
            self.fill(target, depth + 1, visited, ctx)?;
        }

        let parent = ctx.tree.parent(node.id());
        for child in ctx.tree.children(node.id()) {
            let name = child.id().last_part();
            if name == "enter" || name.starts_with("enter_") {
                self.enter.update(name, child, parent, ctx)?;
            } else if name == "leave" || name.starts_with("leave_") {
                self.leave.update(name, child, parent, ctx)?;
            }
        }

        for (attribute, raw) in node.attributes() {
            self.actions.update(attribute, raw);
        }

        if node.has_name() || (self.name.is_empty() && depth == 0) {
            self.name = node.name();
        }
        if let Some(raw) = node.attr("as_name") {
            self.text.set(raw, ctx)?;
        } else if depth == 0 && self.text.is_empty() {
            self.text
                .set_source(ValueSource::Literal(Value::from(self.name.as_str())))?;
        }

        if depth == 0 {
            self.text.set_cast(Cast::Str);
            self.enter.complete(node, ctx)?;
            self.leave.complete(node, ctx)?;
            self.actions.complete(node, ctx)?;
        }
        Ok(())
    }

    pub fn id(&self) -> &ItemId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display text, falling back to the name if it can not be resolved
    pub fn text(&self, ctx: &EvalContext) -> String {
        match self.text.get(ctx) {
            Ok(Some(text)) => text.to_string(),
            Ok(None) => self.name.clone(),
            Err(e) => {
                warn!(state = %self.id, error = %e, "Can not determine state text");
                self.name.clone()
            }
        }
    }

    pub fn enter_group(&self) -> &ConditionSetGroup {
        &self.enter
    }

    pub fn leave_group(&self) -> &ConditionSetGroup {
        &self.leave
    }

    pub fn actions(&self) -> &ActionList {
        &self.actions
    }

    /// Whether the state can be entered; always true without enter sets
    pub fn can_enter(&self, ctx: &EvalContext) -> bool {
        let _span = info_span!("state", id = %self.id, check = "enter").entered();
        if self.enter.count() == 0 {
            info!("No enter condition sets, state can be entered");
            return true;
        }
        let result = self.enter.one_set_matching(ctx);
        info!("State can{} be entered", if result { "" } else { "not" });
        result
    }

    /// Whether the state can be left; always true without leave sets
    pub fn can_leave(&self, ctx: &EvalContext) -> bool {
        let _span = info_span!("state", id = %self.id, check = "leave").entered();
        if self.leave.count() == 0 {
            info!("No leave condition sets, state can be left");
            return true;
        }
        let result = self.leave.one_set_matching(ctx);
        info!("State can{} be left", if result { "" } else { "not" });
        result
    }

    pub fn run_enter(&self, ctx: &EvalContext, allow_repeat: bool) {
        let _span = info_span!("enter", state = %self.id).entered();
        self.actions.execute(ActionScope::Active, ctx, false, allow_repeat);
    }

    pub fn run_stay(&self, ctx: &EvalContext, allow_repeat: bool) {
        let _span = info_span!("stay", state = %self.id).entered();
        self.actions.execute(ActionScope::Active, ctx, true, allow_repeat);
    }

    pub fn run_leave(&self, ctx: &EvalContext, allow_repeat: bool) {
        let _span = info_span!("leave", state = %self.id).entered();
        self.actions.execute(ActionScope::Leave, ctx, false, allow_repeat);
    }

    pub fn write_log(&self) {
        let _span = info_span!("state", id = %self.id).entered();
        info!("State {} ('{}'):", self.id, self.name);
        self.text.write_log();
        if self.enter.count() > 0 {
            info!("Condition sets to enter state:");
            self.enter.write_log();
        }
        if self.leave.count() > 0 {
            info!("Condition sets to leave state:");
            self.leave.write_log();
        }
        if self.actions.count() > 0 {
            info!("Actions:");
            self.actions.write_log();
        }
    }
}
