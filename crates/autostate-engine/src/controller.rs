//! State machine controller of one object item
//!
//! The controller owns the states built from the children of an object item
//! (an item with `as_plugin: active`). Every accepted trigger runs one
//! update cycle:
//!
//! 1. Drop the trigger if an update is running or the startup delay is not
//!    over, or if it was caused by the engine itself.
//! 2. Stop with a fixed display text while locked or suspended.
//! 3. Stay at the last state if it can not be left, otherwise enter the
//!    first state that can be entered.
//! 4. Run the leave actions of the old state and the enter actions of the
//!    new one, or the stay actions if the state did not change.

use crate::context::{BuildContext, CycleInfo, EvalContext, UpdateTrigger};
use crate::environment::Environment;
use crate::error::{EngineError, EngineResult};
use crate::manual::ManualFilter;
use crate::scheduler::{Job, Scheduler};
use crate::state::State;
use crate::value::ResolvedValue;
use crate::variables::{VariableContext, SUSPEND_REMAINING};
use autostate_config::{ConfigNode, ConfigTree, Location, YamlValue};
use autostate_core::{
    defaults, original_caller, Cast, Clock, ExpressionEvaluator, ItemId, TriggerInfo, Value,
    LASTSTATE_NAME_MANUALLY_LOCKED, LASTSTATE_NAME_SUSPENDED, PLUGIN_IDENTIFICATION,
};
use autostate_items::{ItemChanged, ItemStore};
use chrono::{DateTime, FixedOffset, TimeDelta, TimeZone, Utc};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn};

/// Collaborators shared by all controllers
#[derive(Clone)]
pub struct Services {
    pub items: Arc<ItemStore>,
    pub evaluator: Arc<dyn ExpressionEvaluator>,
    pub scheduler: Arc<dyn Scheduler>,
    pub clock: Arc<dyn Clock>,
}

/// Periodic trigger configured by `as_cycle`
#[derive(Debug, Clone, PartialEq)]
struct CycleSetting {
    period: u64,
    value: Value,
}

impl CycleSetting {
    /// Parse `<seconds>` or `<seconds> = <value>`; the value defaults to 1
    fn parse(node: &ConfigNode) -> EngineResult<Option<Self>> {
        let Some(text) = node.attr_str("as_cycle") else {
            return Ok(None);
        };
        let (period, value) = match text.split_once('=') {
            Some((period, value)) => (period.trim(), value.trim()),
            None => (text.trim(), ""),
        };
        let period = period
            .parse::<u64>()
            .ok()
            .filter(|period| *period > 0)
            .ok_or_else(|| {
                EngineError::Config(format!("{}: Invalid cycle '{}'", node.id(), text))
            })?;
        let value = if value.is_empty() {
            Value::Num(1.0)
        } else {
            Value::from(value)
        };
        Ok(Some(Self { period, value }))
    }
}

/// Longest accepted startup delay or suspension time in seconds
const MAX_DELAY_SECONDS: f64 = 100.0 * 365.0 * 86_400.0;

/// Delta of `seconds` with millisecond precision, `None` when out of range
fn delay(seconds: f64) -> Option<TimeDelta> {
    if !seconds.is_finite() || seconds.abs() > MAX_DELAY_SECONDS {
        return None;
    }
    TimeDelta::try_milliseconds((seconds * 1000.0).round() as i64)
}

fn delay_after<Tz: TimeZone>(start: DateTime<Tz>, seconds: f64) -> Option<DateTime<Tz>> {
    delay(seconds).and_then(|delta| start.checked_add_signed(delta))
}

struct Settings {
    startup_delay: ResolvedValue,
    repeat_actions: ResolvedValue,
    suspend_time: ResolvedValue,
    cycle: Option<CycleSetting>,
    laststate_item_id: Option<ItemId>,
    laststate_item_name: Option<ItemId>,
    lock_item: Option<ItemId>,
    suspend_item: Option<ItemId>,
    suspend_watch: Vec<(ItemId, Option<ManualFilter>)>,
}

impl Settings {
    fn from_node(node: &ConfigNode, ctx: &BuildContext) -> EngineResult<Self> {
        let mut startup_delay = ResolvedValue::new("Startup Delay").with_cast(Cast::Num);
        startup_delay.set_from_attr(
            node,
            "as_startup_delay",
            Some(Value::Num(defaults::STARTUP_DELAY as f64)),
            ctx,
        )?;
        let mut repeat_actions =
            ResolvedValue::new("Repeat actions if state is not changed").with_cast(Cast::Bool);
        repeat_actions.set_from_attr(
            node,
            "as_repeat_actions",
            Some(Value::Bool(defaults::REPEAT_ACTIONS)),
            ctx,
        )?;
        let mut suspend_time =
            ResolvedValue::new("Suspension time on manual changes").with_cast(Cast::Num);
        suspend_time.set_from_attr(
            node,
            "as_suspend_time",
            Some(Value::Num(defaults::SUSPEND_TIME as f64)),
            ctx,
        )?;
        repeat_actions.literal()?;
        for (value, min) in [(&startup_delay, -1.0), (&suspend_time, 0.0)] {
            let Some(seconds) = value.literal()?.and_then(|value| value.as_f64()) else {
                continue;
            };
            if seconds < min || delay(seconds).is_none() {
                return Err(EngineError::Config(format!(
                    "{}: {} {} is out of range",
                    node.id(),
                    value.name(),
                    seconds
                )));
            }
        }

        Ok(Self {
            startup_delay,
            repeat_actions,
            suspend_time,
            cycle: CycleSetting::parse(node)?,
            laststate_item_id: ctx.return_item_by_attribute("as_laststate_item_id")?,
            laststate_item_name: ctx.return_item_by_attribute("as_laststate_item_name")?,
            lock_item: ctx.return_item_by_attribute("as_lock_item")?,
            suspend_item: ctx.return_item_by_attribute("as_suspend_item")?,
            suspend_watch: Self::suspend_watch(node, ctx)?,
        })
    }

    fn suspend_watch(
        node: &ConfigNode,
        ctx: &BuildContext,
    ) -> EngineResult<Vec<(ItemId, Option<ManualFilter>)>> {
        let entries: Vec<&str> = match node.attr("as_suspend_watch") {
            None => return Ok(Vec::new()),
            Some(YamlValue::String(entry)) => vec![entry.as_str()],
            Some(YamlValue::Sequence(entries)) => entries.iter().filter_map(YamlValue::as_str).collect(),
            Some(_) => {
                return Err(EngineError::Config(format!(
                    "{}: 'as_suspend_watch' must be an item or a list of items",
                    node.id()
                )))
            }
        };

        let mut watch = Vec::new();
        for entry in entries {
            let ids = if entry.contains('*') {
                ctx.items.match_ids(entry)?
            } else {
                vec![ctx.return_item(entry)?]
            };
            for id in ids {
                let filter = match ctx.tree.get(id.as_str()) {
                    Some(watched) => ManualFilter::from_node(watched)?,
                    None => None,
                };
                watch.push((id, filter));
            }
        }
        Ok(watch)
    }
}

/// Mutable data of a controller, changed by every update cycle
#[derive(Debug, Default)]
struct Runtime {
    laststate_id: String,
    laststate_name: String,
    stuck_since: Option<DateTime<Utc>>,
    delay: f64,
    suspend_until: Option<DateTime<FixedOffset>>,
    trigger: UpdateTrigger,
}

/// Resets the re-entrancy flag when the update cycle ends
struct UpdateGuard<'a>(&'a AtomicBool);

impl Drop for UpdateGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// State machine of one object item
pub struct Controller {
    id: ItemId,
    name: String,
    settings: Settings,
    states: Vec<State>,
    services: Services,
    location: Option<Location>,
    in_update: AtomicBool,
    startup_over: AtomicBool,
    triggers_added: AtomicBool,
    runtime: Mutex<Runtime>,
    this: Weak<Controller>,
}

impl Controller {
    /// Build the controller of the object item `node`
    ///
    /// States that fail to build are logged and skipped. Without any valid
    /// state the controller can not be built.
    pub fn new(tree: &ConfigTree, node: &ConfigNode, services: Services) -> EngineResult<Arc<Self>> {
        let _span = info_span!("init", item = %node.id()).entered();
        info!("Initialize item {}", node.id());

        let ctx = BuildContext::new(tree, node, &services.items);
        let settings = Settings::from_node(node, &ctx)?;

        let mut states = Vec::new();
        for child in tree.children(node.id()) {
            match State::new(child, &ctx) {
                Ok(state) => states.push(state),
                Err(e) => error!(state = %child.id(), error = %e, "Ignoring state"),
            }
        }
        if states.is_empty() {
            return Err(EngineError::NoStates(node.id().to_string()));
        }

        let stored = |item: &Option<ItemId>| {
            item.as_ref()
                .and_then(|id| services.items.value(id.as_str()))
                .filter(|value| *value != Value::Null)
                .map(|value| value.to_string())
                .unwrap_or_default()
        };
        let runtime = Runtime {
            laststate_id: stored(&settings.laststate_item_id),
            laststate_name: stored(&settings.laststate_item_name),
            ..Runtime::default()
        };

        let controller = Arc::new_cyclic(|this| Self {
            id: node.id().clone(),
            name: node.name(),
            settings,
            states,
            location: tree.location(),
            services,
            in_update: AtomicBool::new(false),
            startup_over: AtomicBool::new(false),
            triggers_added: AtomicBool::new(false),
            runtime: Mutex::new(runtime),
            this: this.clone(),
        });
        controller.write_log();
        Ok(controller)
    }

    /// Schedule the periodic trigger and the initial evaluation
    ///
    /// A startup delay of `-1` registers the triggers without an initial
    /// evaluation, `0` evaluates immediately, a positive delay evaluates
    /// after that many seconds. Triggers are registered after the initial
    /// evaluation.
    pub fn start(&self) -> EngineResult<()> {
        if let Some(cycle) = &self.settings.cycle {
            let items = Arc::clone(&self.services.items);
            let id = self.id.clone();
            let value = cycle.value.clone();
            let job: Job = Box::new(move || {
                if let Err(e) = items.set(&id, value.clone(), TriggerInfo::new("Scheduler")) {
                    warn!(item = %id, error = %e, "Cycle trigger failed");
                }
            });
            self.services
                .scheduler
                .schedule_every(self.id.as_str(), Duration::from_secs(cycle.period), job)?;
        }

        let environment = self.environment();
        let startup_delay = self
            .setting(&self.settings.startup_delay, &environment)
            .and_then(|value| value.as_f64())
            .unwrap_or(defaults::STARTUP_DELAY as f64);

        if startup_delay > 0.0 {
            let at = delay_after(environment.now_utc(), startup_delay).ok_or_else(|| {
                EngineError::Config(format!(
                    "{}: Startup Delay {} is out of range",
                    self.id, startup_delay
                ))
            })?;
            info!(item = %self.id, startup_delay, "Delaying initial evaluation");
            self.schedule(&format!("{}-Startup Delay", self.id), at, |controller| {
                controller.startup_complete()
            })?;
        } else if startup_delay == -1.0 {
            self.startup_over.store(true, Ordering::SeqCst);
            self.add_triggers();
        } else {
            self.startup_complete();
        }
        Ok(())
    }

    fn startup_complete(&self) {
        self.startup_over.store(true, Ordering::SeqCst);
        self.update(TriggerInfo::new("Startup Delay").with_item(self.id.as_str()));
        self.add_triggers();
    }

    fn add_triggers(&self) {
        self.triggers_added.store(true, Ordering::SeqCst);
        debug!(item = %self.id, triggers = %self.verbose_triggers(), "Triggers registered");
    }

    /// Route an item change to the update cycle or the lock and suspend
    /// callbacks
    pub fn handle_item_change(&self, change: &ItemChanged) {
        if !self.triggers_added.load(Ordering::SeqCst) {
            return;
        }
        if change.item == self.id {
            self.update(change.trigger.clone());
        }
        if !change.changed {
            return;
        }
        if self.settings.lock_item.as_ref() == Some(&change.item) {
            self.lock_callback(&change.trigger);
        }
        if let Some((_, filter)) = self
            .settings
            .suspend_watch
            .iter()
            .find(|(id, _)| *id == change.item)
        {
            self.suspend_watch_callback(&change.trigger, filter.as_ref());
        }
    }

    /// Run one update cycle for `trigger`
    ///
    /// A trigger arriving while a cycle is running is dropped.
    pub fn update(&self, trigger: TriggerInfo) {
        if !self.startup_over.load(Ordering::SeqCst) {
            debug!(item = %self.id, "Startup not over, ignoring trigger");
            return;
        }
        if self
            .in_update
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(item = %self.id, "Update in progress, ignoring trigger");
            return;
        }
        let _guard = UpdateGuard(&self.in_update);
        let _span = info_span!(
            "update",
            item = %self.id,
            caller = trigger.caller.as_deref().unwrap_or("")
        )
        .entered();

        if let Err(e) = self.run_cycle(&trigger) {
            error!(error = %e, "Update cycle failed");
        }
    }

    fn run_cycle(&self, trigger: &TriggerInfo) -> EngineResult<()> {
        info!("Update state of item {}", self.name);
        debug!(
            item = trigger.item.as_deref().unwrap_or("(no item)"),
            source = ?trigger.source,
            dest = ?trigger.dest,
            "Update triggered by {}",
            trigger.caller.as_deref().unwrap_or("")
        );

        let original = original_caller(self.services.items.as_ref(), trigger);
        if original.caller != trigger.caller {
            debug!(
                item = ?original.item,
                source = ?original.source,
                "Eval initially triggered by {}",
                original.caller.as_deref().unwrap_or("")
            );
        }
        let engine = Some(PLUGIN_IDENTIFICATION);
        if original.caller.as_deref() == engine || trigger.caller.as_deref() == engine {
            debug!("Ignoring changes from {}", PLUGIN_IDENTIFICATION);
            return Ok(());
        }

        let update_trigger = UpdateTrigger {
            item: trigger.item.clone(),
            caller: trigger.caller.clone(),
            source: trigger.source.clone(),
            dest: trigger.dest.clone(),
            original_item: original.item,
            original_caller: original.caller,
            original_source: original.source,
        };
        self.runtime().trigger = update_trigger.clone();

        if self.lock_active() {
            info!("Object is locked");
            self.laststate_set_name(LASTSTATE_NAME_MANUALLY_LOCKED);
            return Ok(());
        }

        let suspend_until = self.runtime().suspend_until;
        if let Some(until) = suspend_until {
            info!(
                "Object has been suspended after manual changes. Reactivating at {}",
                until
            );
            self.laststate_set_name(&until.format(LASTSTATE_NAME_SUSPENDED).to_string());
            return Ok(());
        }

        let environment = self.environment();
        let suspend_time = self.suspend_time(&environment);
        let mut variables = VariableContext::new(Value::Num(suspend_time));
        variables.set_variable(SUSPEND_REMAINING, -1)?;

        let now = environment.now_utc();
        let (laststate_id, stuck_since) = {
            let runtime = self.runtime();
            (runtime.laststate_id.clone(), runtime.stuck_since)
        };
        let delay = stuck_since
            .map(|since| (now - since).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);
        self.runtime().delay = delay;

        let last = self.states.iter().find(|s| s.id().as_str() == laststate_id);
        if let Some(last) = last {
            info!("Last state: {} ('{}')", last.id(), last.name());
        }

        let age = self
            .settings
            .laststate_item_id
            .as_ref()
            .and_then(|id| self.services.items.get(id.as_str()))
            .map(|state| state.age_at(now));
        let cycle = CycleInfo {
            laststate_id,
            delay,
            age,
            trigger: update_trigger,
        };
        let allow_repeat = self.repeat_actions(&self.eval_context(&environment, &variables, &cycle));

        let new_state = match last {
            Some(last) if !self.check_state(&mut variables, &environment, &cycle, last, Check::Leave) => {
                info!("Can not leave current state, staying at {} ('{}')", last.id(), last.name());
                {
                    let mut runtime = self.runtime();
                    if runtime.stuck_since.is_none() {
                        runtime.stuck_since = Some(now);
                    }
                }
                if self.check_state(&mut variables, &environment, &cycle, last, Check::Enter) {
                    self.runtime().stuck_since = None;
                }
                last
            }
            _ => {
                let found = self.states.iter().find(|state| {
                    self.check_state(&mut variables, &environment, &cycle, state, Check::Enter)
                });
                match found {
                    Some(state) => {
                        self.runtime().stuck_since = None;
                        state
                    }
                    None => {
                        let ctx = self.eval_context(&environment, &variables, &cycle);
                        match last {
                            Some(last) => {
                                info!(
                                    "No matching state found, staying at {} ('{}')",
                                    last.id(),
                                    last.name()
                                );
                                last.run_stay(&ctx, allow_repeat);
                            }
                            None => info!(
                                "No matching state found, no previous state available. Doing nothing."
                            ),
                        }
                        return Ok(());
                    }
                }
            }
        };

        let ctx = self.eval_context(&environment, &variables, &cycle);
        match last {
            Some(last) if last.id() == new_state.id() => {
                info!("Staying at {} ('{}')", new_state.id(), new_state.name());
                new_state.run_stay(&ctx, allow_repeat);
                let text = new_state.text(&ctx);
                let stored = self.runtime().laststate_name.clone();
                if stored != text {
                    self.laststate_set(new_state, text);
                }
            }
            _ => {
                if let Some(last) = last {
                    info!("Leaving {} ('{}')", last.id(), last.name());
                    last.run_leave(&ctx, allow_repeat);
                }
                info!("Entering {} ('{}')", new_state.id(), new_state.name());
                new_state.run_enter(&ctx, allow_repeat);
                self.laststate_set(new_state, new_state.text(&ctx));
            }
        }
        Ok(())
    }

    /// Check a state with its id and name exposed as variables
    fn check_state(
        &self,
        variables: &mut VariableContext,
        environment: &Environment,
        cycle: &CycleInfo,
        state: &State,
        check: Check,
    ) -> bool {
        let scope = variables.enter_state(state.id().as_str(), state.name());
        let ctx = self.eval_context(environment, &scope, cycle);
        match check {
            Check::Enter => state.can_enter(&ctx),
            Check::Leave => state.can_leave(&ctx),
        }
    }

    fn eval_context<'a>(
        &'a self,
        environment: &'a Environment,
        variables: &'a VariableContext,
        cycle: &'a CycleInfo,
    ) -> EvalContext<'a> {
        EvalContext {
            object: &self.id,
            items: &self.services.items,
            evaluator: self.services.evaluator.as_ref(),
            environment,
            variables,
            cycle,
        }
    }

    fn environment(&self) -> Environment {
        Environment::capture(self.services.clock.as_ref(), self.location)
    }

    /// Resolve a setting outside of an update cycle
    fn setting(&self, value: &ResolvedValue, environment: &Environment) -> Option<Value> {
        let variables = VariableContext::new(Value::Num(defaults::SUSPEND_TIME as f64));
        let cycle = CycleInfo {
            laststate_id: self.laststate_id(),
            ..CycleInfo::default()
        };
        match value.get(&self.eval_context(environment, &variables, &cycle)) {
            Ok(value) => value,
            Err(e) => {
                warn!(item = %self.id, setting = value.name(), error = %e, "Using default");
                None
            }
        }
    }

    fn suspend_time(&self, environment: &Environment) -> f64 {
        match self
            .setting(&self.settings.suspend_time, environment)
            .and_then(|value| value.as_f64())
        {
            Some(seconds) if seconds >= 0.0 && delay(seconds).is_some() => seconds,
            Some(seconds) => {
                warn!(item = %self.id, seconds, "Suspension time out of range, using default");
                defaults::SUSPEND_TIME as f64
            }
            None => defaults::SUSPEND_TIME as f64,
        }
    }

    fn repeat_actions(&self, ctx: &EvalContext) -> bool {
        match self.settings.repeat_actions.get(ctx) {
            Ok(Some(value)) => value.is_truthy(),
            Ok(None) => defaults::REPEAT_ACTIONS,
            Err(e) => {
                warn!(error = %e, "Can not determine whether to repeat actions");
                defaults::REPEAT_ACTIONS
            }
        }
    }

    fn runtime(&self) -> MutexGuard<'_, Runtime> {
        self.runtime.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_item(&self, id: &ItemId, value: Value) {
        let trigger = TriggerInfo::new(PLUGIN_IDENTIFICATION).with_source(self.id.as_str());
        if let Err(e) = self.services.items.set(id, value, trigger) {
            error!(item = %id, error = %e, "Can not write item");
        }
    }

    fn schedule(
        &self,
        name: &str,
        at: DateTime<Utc>,
        mut job: impl FnMut(&Controller) + Send + 'static,
    ) -> EngineResult<()> {
        let this = self.this.clone();
        let job: Job = Box::new(move || {
            if let Some(controller) = this.upgrade() {
                job(&controller);
            }
        });
        self.services.scheduler.schedule(name, at, job)
    }

    /// Re-evaluate one second from now
    fn schedule_update(&self) {
        let at = self.services.clock.now_utc() + TimeDelta::seconds(1);
        let result = self.schedule(&format!("{}-Timer", self.id), at, |controller| {
            controller.update(TriggerInfo::new("Timer").with_item(controller.id.as_str()))
        });
        if let Err(e) = result {
            error!(item = %self.id, error = %e, "Can not schedule update");
        }
    }

    // laststate

    fn laststate_set(&self, state: &State, text: String) {
        {
            let mut runtime = self.runtime();
            runtime.laststate_id = state.id().to_string();
            runtime.laststate_name = text.clone();
        }
        if let Some(item) = &self.settings.laststate_item_id {
            self.write_item(item, Value::from(state.id().as_str()));
        }
        if let Some(item) = &self.settings.laststate_item_name {
            self.write_item(item, Value::from(text));
        }
    }

    fn laststate_set_name(&self, name: &str) {
        self.runtime().laststate_name = name.to_string();
        if let Some(item) = &self.settings.laststate_item_name {
            self.write_item(item, Value::from(name));
        }
    }

    // lock

    fn lock_active(&self) -> bool {
        self.settings
            .lock_item
            .as_ref()
            .and_then(|item| self.services.items.value(item.as_str()))
            .is_some_and(|value| value.is_truthy())
    }

    fn lock_callback(&self, trigger: &TriggerInfo) {
        if trigger.caller.as_deref() == Some(PLUGIN_IDENTIFICATION) {
            return;
        }
        let _span = info_span!("lock", item = %self.id).entered();
        info!("Item 'lock' changed by '{}'", trigger.caller.as_deref().unwrap_or(""));
        if self.suspend_active() {
            self.suspend_remove();
        }
        self.schedule_update();
    }

    // suspend

    fn suspend_timer(&self) -> String {
        format!("{}SuspensionRemove-Timer", self.id)
    }

    fn suspend_active(&self) -> bool {
        self.runtime().suspend_until.is_some()
    }

    fn suspend_set(&self) {
        let environment = self.environment();
        let seconds = self.suspend_time(&environment);
        debug!("Suspending automatic mode for {} seconds", seconds);
        let Some(until) = delay_after(environment.now, seconds) else {
            error!(item = %self.id, seconds, "Can not compute end of suspension");
            return;
        };
        self.runtime().suspend_until = Some(until);

        let result = self.schedule(&self.suspend_timer(), until.with_timezone(&Utc), |controller| {
            let _span = info_span!("suspend", item = %controller.id).entered();
            info!("Suspend time over");
            controller.suspend_remove();
        });
        if let Err(e) = result {
            error!(item = %self.id, error = %e, "Can not schedule end of suspension");
        }
        if let Some(item) = &self.settings.suspend_item {
            self.write_item(item, Value::Bool(true));
        }
        self.schedule_update();
    }

    fn suspend_remove(&self) {
        debug!("Removing suspension of automatic mode");
        self.runtime().suspend_until = None;
        self.services.scheduler.cancel(&self.suspend_timer());
        if let Some(item) = &self.settings.suspend_item {
            self.write_item(item, Value::Bool(false));
        }
        self.schedule_update();
    }

    fn suspend_watch_callback(&self, trigger: &TriggerInfo, filter: Option<&ManualFilter>) {
        let _span = info_span!("suspend_watch", item = %self.id).entered();
        debug!(
            item = trigger.item.as_deref().unwrap_or(""),
            caller = trigger.caller.as_deref().unwrap_or(""),
            source = ?trigger.source,
            dest = ?trigger.dest,
            "Manual operation"
        );
        if trigger.caller.as_deref() == Some(PLUGIN_IDENTIFICATION) {
            debug!("Ignoring changes from {}", PLUGIN_IDENTIFICATION);
        } else if filter.is_some_and(|filter| {
            !filter.is_manual(&original_caller(self.services.items.as_ref(), trigger))
        }) {
            debug!("Change is not considered manual");
        } else if self.lock_active() {
            debug!("Automatic mode already locked");
        } else {
            self.suspend_set();
        }
    }

    // accessors

    pub fn id(&self) -> &ItemId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    /// Id of the last active state, empty if none
    pub fn laststate_id(&self) -> String {
        self.runtime().laststate_id.clone()
    }

    /// Display text of the last state or of the lock/suspend override
    pub fn laststate_name(&self) -> String {
        self.runtime().laststate_name.clone()
    }

    /// Seconds the current state could not be left, as of the last cycle
    pub fn delay(&self) -> f64 {
        self.runtime().delay
    }

    pub fn suspend_until(&self) -> Option<DateTime<FixedOffset>> {
        self.runtime().suspend_until
    }

    /// Provenance of the last accepted trigger
    pub fn update_trigger(&self) -> UpdateTrigger {
        self.runtime().trigger.clone()
    }

    pub fn is_startup_over(&self) -> bool {
        self.startup_over.load(Ordering::SeqCst)
    }

    pub fn is_update_in_progress(&self) -> bool {
        self.in_update.load(Ordering::SeqCst)
    }

    // introspection

    fn verbose_cycle(&self) -> String {
        match &self.settings.cycle {
            Some(cycle) => format!("every {} seconds", cycle.period),
            None => "Inactive".to_string(),
        }
    }

    fn verbose_triggers(&self) -> String {
        if !self.triggers_added.load(Ordering::SeqCst) {
            return "Inactive".to_string();
        }
        let mut triggers = vec![self.id.to_string()];
        triggers.extend(self.settings.lock_item.iter().map(ItemId::to_string));
        triggers.extend(self.settings.suspend_watch.iter().map(|(id, _)| id.to_string()));
        triggers.join(", ")
    }

    pub fn cli_list(&self) -> String {
        format!("{}: {}\n", self.id, self.laststate_name())
    }

    pub fn cli_detail(&self) -> String {
        let mut detail = format!("AutoState Item {}:\n", self.id);
        let _ = writeln!(detail, "\tCurrent state: {}", self.laststate_name());
        detail.push_str(&self.settings.startup_delay.text("\t", "\n"));
        let _ = writeln!(detail, "\tCycle: {}", self.verbose_cycle());
        let _ = writeln!(detail, "\tTrigger: {}", self.verbose_triggers());
        detail.push_str(&self.settings.repeat_actions.text("\t", "\n"));
        detail
    }

    pub fn write_log(&self) {
        let settings = &self.settings;
        info!("Configuration of item {}", self.name);
        settings.startup_delay.write_log();
        info!("Cycle: {}", self.verbose_cycle());
        settings.repeat_actions.write_log();
        if let Some(item) = &settings.laststate_item_id {
            info!("Item 'Laststate Id': {}", item);
        }
        if let Some(item) = &settings.laststate_item_name {
            info!("Item 'Laststate Name': {}", item);
        }
        if let Some(item) = &settings.lock_item {
            info!("Item 'Lock': {}", item);
        }
        if let Some(item) = &settings.suspend_item {
            info!("Item 'Suspend': {}", item);
        }
        if !settings.suspend_watch.is_empty() {
            settings.suspend_time.write_log();
            info!("Items causing suspension when changed:");
            for (item, _) in &settings.suspend_watch {
                info!("  {}", item);
            }
        }
        for state in &self.states {
            state.write_log();
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Check {
    Enter,
    Leave,
}
