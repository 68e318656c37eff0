//! Shared fixtures for the engine tests

#![allow(dead_code)]

use autostate_config::{ConfigTree, YamlValue};
use autostate_core::{ExpressionEvaluator, ItemId, TriggerInfo, Value};
use autostate_engine::{
    seed_items, BuildContext, Clock, Controller, CycleInfo, Environment, EvalContext,
    FixedClock, ManualScheduler, Services, VariableContext,
};
use autostate_items::{ItemChanged, ItemStore};
use autostate_template::ExpressionEngine;
use std::sync::Arc;
use tokio::sync::broadcast;

pub fn yaml(text: &str) -> YamlValue {
    serde_yaml::from_str(text).unwrap()
}

pub fn id(text: &str) -> ItemId {
    ItemId::new(text).unwrap()
}

/// Configuration tree, items, clock and scheduler of one test
pub struct Fixture {
    pub tree: Arc<ConfigTree>,
    pub items: Arc<ItemStore>,
    pub clock: Arc<FixedClock>,
    pub scheduler: Arc<ManualScheduler>,
    pub evaluator: Arc<dyn ExpressionEvaluator>,
    writes: broadcast::Receiver<ItemChanged>,
}

impl Fixture {
    /// Fixture for `document` with the clock at `HH:MM`
    pub fn new(document: &str, hour: u32, minute: u32) -> Self {
        let tree = Arc::new(ConfigTree::from_document(&yaml(document)).unwrap());
        let clock = Arc::new(FixedClock::at(hour, minute));
        let items = Arc::new(ItemStore::with_clock(clock.clone()));
        seed_items(&tree, &items).unwrap();
        let evaluator: Arc<dyn ExpressionEvaluator> = Arc::new(ExpressionEngine::new(items.clone()));
        Self::with_evaluator(tree, items, evaluator, clock)
    }

    /// Fixture around an item store stamped by `clock`
    pub fn with_evaluator(
        tree: Arc<ConfigTree>,
        items: Arc<ItemStore>,
        evaluator: Arc<dyn ExpressionEvaluator>,
        clock: Arc<FixedClock>,
    ) -> Self {
        let scheduler = Arc::new(ManualScheduler::new());
        scheduler.set_now(clock.now_utc());
        let writes = items.subscribe();
        Self {
            tree,
            items,
            clock,
            scheduler,
            evaluator,
            writes,
        }
    }

    pub fn services(&self) -> Services {
        Services {
            items: self.items.clone(),
            evaluator: self.evaluator.clone(),
            scheduler: self.scheduler.clone(),
            clock: self.clock.clone(),
        }
    }

    pub fn controller(&self, object: &str) -> Arc<Controller> {
        Controller::new(&self.tree, self.tree.get(object).unwrap(), self.services()).unwrap()
    }

    /// Build and start a controller, then forget the writes made so far
    pub fn started(&mut self, object: &str) -> Arc<Controller> {
        let controller = self.controller(object);
        controller.start().unwrap();
        self.take_writes();
        controller
    }

    pub fn build_context(&self, object: &str) -> BuildContext<'_> {
        BuildContext::new(&self.tree, self.tree.get(object).unwrap(), &self.items)
    }

    pub fn environment(&self) -> Environment {
        Environment::capture(self.clock.as_ref(), self.tree.location())
    }

    pub fn value(&self, item: &str) -> Value {
        self.items.value(item).unwrap()
    }

    /// Write an item as `caller` and return the broadcast change
    pub fn change(&mut self, item: &str, value: impl Into<Value>, caller: &str) -> ItemChanged {
        self.take_writes();
        self.items
            .set(&id(item), value.into(), TriggerInfo::new(caller))
            .unwrap();
        self.writes.try_recv().unwrap()
    }

    /// Item writes since the last call, oldest first
    pub fn take_writes(&mut self) -> Vec<(String, Value)> {
        let mut writes = Vec::new();
        while let Ok(change) = self.writes.try_recv() {
            writes.push((change.item.to_string(), change.new_value));
        }
        writes
    }

    /// Advance the clock and fire every job that became due
    pub fn advance(&self, seconds: i64) -> usize {
        self.clock.advance(chrono::Duration::seconds(seconds));
        self.scheduler.fire_due(self.clock.now_utc())
    }
}

/// Owned pieces of an [`EvalContext`]
pub struct EvalParts {
    pub object: ItemId,
    pub environment: Environment,
    pub variables: VariableContext,
    pub cycle: CycleInfo,
}

impl EvalParts {
    pub fn new(fixture: &Fixture, object: &str) -> Self {
        Self {
            object: id(object),
            environment: fixture.environment(),
            variables: VariableContext::new(Value::Num(3600.0)),
            cycle: CycleInfo::default(),
        }
    }

    pub fn context<'a>(&'a self, fixture: &'a Fixture) -> EvalContext<'a> {
        EvalContext {
            object: &self.object,
            items: &fixture.items,
            evaluator: fixture.evaluator.as_ref(),
            environment: &self.environment,
            variables: &self.variables,
            cycle: &self.cycle,
        }
    }
}
