//! A single condition of a condition set
//!
//! A condition compares the current value of its binding (an item, an
//! expression or one of the built-in accessors) against `value`, or against
//! `min`/`max`, and optionally checks the age of the bound item against
//! `agemin`/`agemax`.

use crate::context::{BuildContext, EvalContext};
use crate::error::{EngineError, EngineResult};
use crate::value::{ResolvedValue, ValueKind};
use autostate_config::{yaml_to_value, ConfigNode, YamlValue};
use autostate_core::{Cast, ItemId, Value};
use std::cmp::Ordering;
use std::fmt;
use tracing::{debug, info, warn};

/// Configuration function of a condition attribute (`as_<func>_<name>`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionFunc {
    Item,
    Eval,
    Value,
    Min,
    Max,
    Negate,
    AgeMin,
    AgeMax,
    AgeNegate,
}

impl ConditionFunc {
    const PREFIXES: [(&'static str, ConditionFunc); 9] = [
        ("as_item_", ConditionFunc::Item),
        ("as_eval_", ConditionFunc::Eval),
        ("as_value_", ConditionFunc::Value),
        ("as_min_", ConditionFunc::Min),
        ("as_max_", ConditionFunc::Max),
        ("as_negate_", ConditionFunc::Negate),
        ("as_agemin_", ConditionFunc::AgeMin),
        ("as_agemax_", ConditionFunc::AgeMax),
        ("as_agenegate_", ConditionFunc::AgeNegate),
    ];

    /// Split an attribute name into function and condition name
    pub fn split_attribute(attribute: &str) -> Option<(ConditionFunc, &str)> {
        Self::PREFIXES.iter().find_map(|(prefix, func)| {
            attribute
                .strip_prefix(prefix)
                .filter(|name| !name.is_empty())
                .map(|name| (*func, name))
        })
    }
}

/// Values provided by the engine itself for well-known condition names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Weekday,
    SunAzimut,
    SunAltitude,
    Age,
    Delay,
    Time,
    Random,
    Month,
    LastState,
    TriggerItem,
    TriggerCaller,
    TriggerSource,
    TriggerDest,
    OriginalItem,
    OriginalCaller,
    OriginalSource,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Builtin> {
        Some(match name {
            "weekday" => Builtin::Weekday,
            "sun_azimut" => Builtin::SunAzimut,
            "sun_altitude" => Builtin::SunAltitude,
            "age" => Builtin::Age,
            "delay" => Builtin::Delay,
            "time" => Builtin::Time,
            "random" => Builtin::Random,
            "month" => Builtin::Month,
            "laststate" => Builtin::LastState,
            "trigger_item" => Builtin::TriggerItem,
            "trigger_caller" => Builtin::TriggerCaller,
            "trigger_source" => Builtin::TriggerSource,
            "trigger_dest" => Builtin::TriggerDest,
            "original_item" => Builtin::OriginalItem,
            "original_caller" => Builtin::OriginalCaller,
            "original_source" => Builtin::OriginalSource,
            _ => return None,
        })
    }

    /// Cast applied to the configured values of a condition with this name
    pub fn cast(self) -> Cast {
        match self {
            Builtin::Weekday
            | Builtin::SunAzimut
            | Builtin::SunAltitude
            | Builtin::Age
            | Builtin::Delay
            | Builtin::Random
            | Builtin::Month => Cast::Num,
            Builtin::Time => Cast::Time,
            _ => Cast::Str,
        }
    }

    pub fn read(self, ctx: &EvalContext) -> Value {
        let env = ctx.environment;
        let trigger = &ctx.cycle.trigger;
        match self {
            Builtin::Weekday => Value::from(env.weekday),
            Builtin::SunAzimut => Value::Num(env.sun_azimut),
            Builtin::SunAltitude => Value::Num(env.sun_altitude),
            Builtin::Age => match ctx.cycle.age {
                Some(age) => Value::Num(age),
                None => {
                    warn!("No item for last state id given. Can not determine age!");
                    Value::Num(0.0)
                }
            },
            Builtin::Delay => Value::Num(ctx.cycle.delay),
            Builtin::Time => Value::Time(env.time),
            Builtin::Random => Value::from(env.random),
            Builtin::Month => Value::from(env.month),
            Builtin::LastState => Value::from(ctx.cycle.laststate_id.as_str()),
            Builtin::TriggerItem => Value::from(trigger.item.clone()),
            Builtin::TriggerCaller => Value::from(trigger.caller.clone()),
            Builtin::TriggerSource => Value::from(trigger.source.clone()),
            Builtin::TriggerDest => Value::from(trigger.dest.clone()),
            Builtin::OriginalItem => Value::from(trigger.original_item.clone()),
            Builtin::OriginalCaller => Value::from(trigger.original_caller.clone()),
            Builtin::OriginalSource => Value::from(trigger.original_source.clone()),
        }
    }
}

/// Non-item binding of a condition
#[derive(Debug, Clone, PartialEq)]
pub enum Eval {
    Expression(String),
    Builtin(Builtin),
}

impl fmt::Display for Eval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Eval::Expression(expression) => write!(f, "{}", expression),
            Eval::Builtin(builtin) => write!(f, "(built-in {:?})", builtin),
        }
    }
}

/// A single named condition
#[derive(Debug, Clone)]
pub struct Condition {
    name: String,
    item: Option<ItemId>,
    eval: Option<Eval>,
    value: ResolvedValue,
    min: ResolvedValue,
    max: ResolvedValue,
    negate: Option<Value>,
    agemin: ResolvedValue,
    agemax: ResolvedValue,
    agenegate: Option<Value>,
    error: Option<String>,
}

impl Condition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            item: None,
            eval: None,
            value: ResolvedValue::new("value").allowing_list(),
            min: ResolvedValue::new("min"),
            max: ResolvedValue::new("max"),
            negate: None,
            agemin: ResolvedValue::new("agemin"),
            agemax: ResolvedValue::new("agemax"),
            agenegate: None,
            error: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Completion error, if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn item(&self) -> Option<&ItemId> {
        self.item.as_ref()
    }

    /// Set one function of the condition from its configured value
    pub fn set(&mut self, func: ConditionFunc, raw: &YamlValue, ctx: &BuildContext) -> EngineResult<()> {
        match func {
            ConditionFunc::Item => {
                let reference = raw_text(raw);
                self.item = Some(ctx.return_item(&reference)?);
            }
            ConditionFunc::Eval => self.eval = Some(Eval::Expression(raw_text(raw))),
            ConditionFunc::Value => self.value.set(raw, ctx)?,
            ConditionFunc::Min => self.min.set(raw, ctx)?,
            ConditionFunc::Max => self.max.set(raw, ctx)?,
            ConditionFunc::AgeMin => self.agemin.set(raw, ctx)?,
            ConditionFunc::AgeMax => self.agemax.set(raw, ctx)?,
            ConditionFunc::Negate => self.negate = Some(yaml_to_value(raw)),
            ConditionFunc::AgeNegate => self.agenegate = Some(yaml_to_value(raw)),
        }
        Ok(())
    }

    /// Complete the condition after all attributes have been set
    ///
    /// Returns `Ok(false)` if no limit is configured at all; the condition
    /// should then be dropped. Any configuration error is stored in the
    /// condition, which stays matching from then on, and returned.
    pub fn complete(&mut self, node: &ConfigNode, ctx: &BuildContext) -> EngineResult<bool> {
        match self.try_complete(node, ctx) {
            Ok(complete) => Ok(complete),
            Err(e) => {
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn try_complete(&mut self, node: &ConfigNode, ctx: &BuildContext) -> EngineResult<bool> {
        if self.value.is_empty()
            && self.min.is_empty()
            && self.max.is_empty()
            && self.agemin.is_empty()
            && self.agemax.is_empty()
        {
            return Ok(false);
        }

        let builtin = Builtin::from_name(&self.name);
        if self.item.is_none() && self.eval.is_none() {
            self.eval = builtin.map(Eval::Builtin);
        }

        if self.item.is_none() {
            let attribute = format!("as_item_{}", self.name);
            if let Some(raw) = ctx.find_attribute(node, &attribute) {
                self.item = Some(ctx.return_item(&raw_text(raw))?);
            }
        }

        if self.eval.is_none() {
            let attribute = format!("as_eval_{}", self.name);
            if let Some(raw) = ctx.find_attribute(node, &attribute) {
                self.eval = Some(Eval::Expression(raw_text(raw)));
            }
        }

        if self.item.is_none() && self.eval.is_none() {
            return Err(EngineError::Config(format!(
                "Condition {}: Neither 'item' nor 'eval' given!",
                self.name
            )));
        }

        let cast = match &self.item {
            Some(item) => ctx.items.cast(item.as_str()),
            None => builtin.map(Builtin::cast),
        };
        self.cast_all(cast)?;

        if self.min.get_type() == Some(ValueKind::Value) && self.max.get_type() == Some(ValueKind::Value) {
            if let (Some(min), Some(max)) = (self.min.literal()?, self.max.literal()?) {
                if min.compare(&max) == Some(Ordering::Greater) {
                    return Err(EngineError::Config(format!(
                        "Condition {}: 'min' must not be greater than 'max'!",
                        self.name
                    )));
                }
            }
        }

        if self.item.is_none() && !(self.agemin.is_empty() && self.agemax.is_empty()) {
            return Err(EngineError::Config(format!(
                "Condition {}: 'agemin'/'agemax' can not be used for eval!",
                self.name
            )));
        }

        Ok(true)
    }

    fn cast_all(&mut self, cast: Option<Cast>) -> EngineResult<()> {
        if let Some(cast) = cast {
            self.value.set_cast(cast);
            self.min.set_cast(cast);
            self.max.set_cast(cast);
        }
        self.agemin.set_cast(Cast::Num);
        self.agemax.set_cast(Cast::Num);
        if let Some(negate) = self.negate.take() {
            self.negate = Some(Cast::Bool.apply(negate)?);
        }
        if let Some(agenegate) = self.agenegate.take() {
            self.agenegate = Some(Cast::Bool.apply(agenegate)?);
        }

        // literal values must fit the cast
        for value in [&self.value, &self.min, &self.max, &self.agemin, &self.agemax] {
            value.literal()?;
        }
        Ok(())
    }

    fn negated(&self) -> bool {
        self.negate.as_ref().is_some_and(Value::is_truthy)
    }

    fn age_negated(&self) -> bool {
        self.agenegate.as_ref().is_some_and(Value::is_truthy)
    }

    /// Check whether the condition matches
    pub fn check(&self, ctx: &EvalContext) -> EngineResult<bool> {
        if let Some(error) = &self.error {
            info!("Condition '{}': Ignoring because of error: {}", self.name, error);
            return Ok(true);
        }

        if self.item.is_none() && self.eval.is_none() {
            warn!(
                "Condition '{}': No item or eval found! Considering condition as matching!",
                self.name
            );
            return Ok(true);
        }

        Ok(self.check_value(ctx)? && self.check_age(ctx)?)
    }

    fn current(&self, ctx: &EvalContext) -> EngineResult<Value> {
        if let Some(item) = &self.item {
            return ctx.item_value(item);
        }
        match &self.eval {
            Some(Eval::Builtin(builtin)) => Ok(builtin.read(ctx)),
            Some(Eval::Expression(expression)) => ctx.evaluate(expression).map_err(|e| {
                EngineError::Evaluation(format!(
                    "Condition {}: problem evaluating {}: {}",
                    self.name, expression, e
                ))
            }),
            None => Err(EngineError::Evaluation(format!(
                "Condition {}: Neither 'item' nor eval given!",
                self.name
            ))),
        }
    }

    fn check_value(&self, ctx: &EvalContext) -> EngineResult<bool> {
        let current = self.current(ctx)?;
        let negate = self.negated();

        if let Some(value) = self.value.get(ctx)? {
            debug!(
                "Condition '{}': value={} negate={} current={}",
                self.name, value, negate, current
            );
            if let Value::List(elements) = &value {
                let found = elements.iter().any(|element| loosely_equal(element, &current));
                return Ok(match (found, negate) {
                    (true, false) => {
                        debug!("{} found -> matching", current);
                        true
                    }
                    (true, true) => {
                        debug!("{} found but negated -> not matching", current);
                        false
                    }
                    (false, true) => {
                        debug!("{} not in list -> matching", current);
                        true
                    }
                    (false, false) => {
                        debug!("{} not in list -> not matching", current);
                        false
                    }
                });
            }

            let equal = loosely_equal(&value, &current);
            let matching = equal != negate;
            debug!(
                "{}",
                if matching { "OK -> matching" } else { "not OK -> not matching" }
            );
            return Ok(matching);
        }

        let min = self.min.get(ctx)?;
        let max = self.max.get(ctx)?;
        debug!(
            "Condition '{}': min={} max={} negate={} current={}",
            self.name,
            self::display(&min),
            self::display(&max),
            negate,
            current
        );
        let matching = range_matches(&self.name, &current, min.as_ref(), max.as_ref(), negate)?;
        debug!(
            "{}",
            if matching { "given limits ok -> matching" } else { "limits not ok -> not matching" }
        );
        Ok(matching)
    }

    fn check_age(&self, ctx: &EvalContext) -> EngineResult<bool> {
        if self.agemin.is_empty() && self.agemax.is_empty() {
            debug!("Age of '{}': No limits given", self.name);
            return Ok(true);
        }

        let Some(item) = &self.item else {
            info!(
                "Age of '{}': No item found! Considering condition as matching!",
                self.name
            );
            return Ok(true);
        };

        let current = Value::Num(ctx.item_age(item)?);
        let agemin = self.agemin.get(ctx)?;
        let agemax = self.agemax.get(ctx)?;
        let negate = self.age_negated();
        debug!(
            "Age of '{}': min={} max={} negate={} current={}",
            self.name,
            self::display(&agemin),
            self::display(&agemax),
            negate,
            current
        );
        let matching = range_matches(&self.name, &current, agemin.as_ref(), agemax.as_ref(), negate)?;
        debug!(
            "{}",
            if matching { "given age limits ok -> matching" } else { "age limits not ok -> not matching" }
        );
        Ok(matching)
    }

    pub fn write_log(&self) {
        debug!("Condition '{}':", self.name);
        if let Some(error) = &self.error {
            debug!("error: {}", error);
        }
        if let Some(item) = &self.item {
            debug!("item: {}", item);
        }
        if let Some(eval) = &self.eval {
            debug!("eval: {}", eval);
        }
        self.value.write_log();
        self.min.write_log();
        self.max.write_log();
        if let Some(negate) = &self.negate {
            debug!("negate: {}", negate);
        }
        self.agemin.write_log();
        self.agemax.write_log();
        if let Some(agenegate) = &self.agenegate {
            debug!("age negate: {}", agenegate);
        }
    }
}

/// Equality with a fallback to the text forms if the types differ
fn loosely_equal(a: &Value, b: &Value) -> bool {
    if a.same_type(b) {
        a == b
    } else {
        a.to_string() == b.to_string()
    }
}

/// Range check shared by value and age limits
///
/// Not negated, `current` must lie within the given limits. Negated, the
/// check fails whenever `current` is strictly above `min` (and strictly
/// below `max` if that is set) or strictly below `max` (and strictly above
/// `min` if that is set).
pub(crate) fn range_matches(
    name: &str,
    current: &Value,
    min: Option<&Value>,
    max: Option<&Value>,
    negate: bool,
) -> EngineResult<bool> {
    if min.is_none() && max.is_none() {
        return Ok(true);
    }

    let compare = |limit: &Value| {
        current.compare(limit).ok_or_else(|| {
            EngineError::Evaluation(format!(
                "Condition {}: can not compare {} ({}) with {} ({})",
                name,
                current,
                current.type_name(),
                limit,
                limit.type_name()
            ))
        })
    };
    let above_min = min.map(compare).transpose()?;
    let below_max = max.map(compare).transpose()?;

    if !negate {
        if above_min == Some(Ordering::Less) {
            debug!("to low -> not matching");
            return Ok(false);
        }
        if below_max == Some(Ordering::Greater) {
            debug!("to high -> not matching");
            return Ok(false);
        }
    } else {
        let gt_min = above_min == Some(Ordering::Greater);
        let lt_max = below_max == Some(Ordering::Less);
        if gt_min && (max.is_none() || lt_max) {
            debug!("not lower than min -> not matching");
            return Ok(false);
        }
        if lt_max && (min.is_none() || gt_min) {
            debug!("not higher than max -> not matching");
            return Ok(false);
        }
    }
    Ok(true)
}

fn display(value: &Option<Value>) -> String {
    value
        .as_ref()
        .map(Value::to_string)
        .unwrap_or_else(|| "None".to_string())
}

fn raw_text(raw: &YamlValue) -> String {
    match raw {
        YamlValue::String(s) => s.clone(),
        other => yaml_to_value(other).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Value {
        Value::Num(n)
    }

    #[test]
    fn test_split_attribute() {
        assert_eq!(
            ConditionFunc::split_attribute("as_agemin_wind"),
            Some((ConditionFunc::AgeMin, "wind"))
        );
        assert_eq!(
            ConditionFunc::split_attribute("as_min_sun_altitude"),
            Some((ConditionFunc::Min, "sun_altitude"))
        );
        assert_eq!(ConditionFunc::split_attribute("as_min_"), None);
        assert_eq!(ConditionFunc::split_attribute("as_set_height"), None);
    }

    #[test]
    fn test_builtin_casts() {
        assert_eq!(Builtin::from_name("weekday").map(Builtin::cast), Some(Cast::Num));
        assert_eq!(Builtin::from_name("time").map(Builtin::cast), Some(Cast::Time));
        assert_eq!(Builtin::from_name("original_caller").map(Builtin::cast), Some(Cast::Str));
        assert_eq!(Builtin::from_name("wind"), None);
    }

    #[test]
    fn test_range_plain() {
        let (min, max) = (num(5.0), num(10.0));
        let check = |c| range_matches("x", &num(c), Some(&min), Some(&max), false).unwrap();
        assert!(!check(4.0));
        assert!(check(5.0));
        assert!(check(10.0));
        assert!(!check(11.0));
    }

    #[test]
    fn test_range_negated_accepts_boundary_and_beyond() {
        let (min, max) = (num(5.0), num(10.0));
        let check = |c| range_matches("x", &num(c), Some(&min), Some(&max), true).unwrap();
        assert!(!check(7.0));
        assert!(check(5.0));
        assert!(check(10.0));
        assert!(check(11.0));
        assert!(check(4.0));
    }

    #[test]
    fn test_range_negated_single_limit() {
        let min = num(5.0);
        assert!(!range_matches("x", &num(6.0), Some(&min), None, true).unwrap());
        assert!(range_matches("x", &num(4.0), Some(&min), None, true).unwrap());
        let max = num(5.0);
        assert!(!range_matches("x", &num(4.0), None, Some(&max), true).unwrap());
        assert!(range_matches("x", &num(6.0), None, Some(&max), true).unwrap());
    }

    #[test]
    fn test_range_without_limits() {
        assert!(range_matches("x", &Value::from("a"), None, None, true).unwrap());
    }

    #[test]
    fn test_range_type_mismatch() {
        let min = num(5.0);
        assert!(range_matches("x", &Value::from("7"), Some(&min), None, false).is_err());
    }

    #[test]
    fn test_loosely_equal() {
        assert!(loosely_equal(&num(5.0), &Value::from("5")));
        assert!(loosely_equal(&Value::Bool(true), &Value::from("True")));
        assert!(!loosely_equal(&num(5.0), &Value::from("6")));
    }
}
