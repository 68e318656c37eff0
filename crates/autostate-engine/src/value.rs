//! Configured values that may be literals, item references or expressions

use crate::context::{BuildContext, EvalContext};
use crate::error::{EngineError, EngineResult};
use autostate_config::{yaml_to_value, ConfigNode, YamlValue};
use autostate_core::{Cast, ItemId, Value};
use std::fmt;
use tracing::debug;

/// Where a configured value comes from
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSource {
    Literal(Value),
    Item(ItemId),
    Expression(String),
}

impl ValueSource {
    /// Parse a configured value
    ///
    /// Text may carry a `value:`, `item:` or `eval:` prefix. Anything else is
    /// a literal.
    pub fn parse(raw: &YamlValue, ctx: &BuildContext) -> EngineResult<Self> {
        let YamlValue::String(text) = raw else {
            return Ok(ValueSource::Literal(yaml_to_value(raw)));
        };
        Ok(match text.split_once(':') {
            Some(("value", literal)) => ValueSource::Literal(Value::from(literal)),
            Some(("item", item)) => ValueSource::Item(ctx.return_item(item)?),
            Some(("eval", expression)) => ValueSource::Expression(expression.trim().to_string()),
            _ => ValueSource::Literal(Value::from(text.as_str())),
        })
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            ValueSource::Literal(_) => ValueKind::Value,
            ValueSource::Item(_) => ValueKind::Item,
            ValueSource::Expression(_) => ValueKind::Eval,
        }
    }
}

impl fmt::Display for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueSource::Literal(Value::List(values)) => {
                let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", values.join(", "))
            }
            ValueSource::Literal(value) => write!(f, "{}", value),
            ValueSource::Item(item) => write!(f, "{}", item),
            ValueSource::Expression(expression) => write!(f, "{}", expression),
        }
    }
}

/// Kind of a value source, as written in the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Value,
    Item,
    Eval,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Value => "value",
            ValueKind::Item => "item",
            ValueKind::Eval => "eval",
        };
        write!(f, "{}", name)
    }
}

/// A named configured value with an optional cast
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedValue {
    name: String,
    allow_list: bool,
    source: Option<ValueSource>,
    cast: Option<Cast>,
}

impl ResolvedValue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            allow_list: false,
            source: None,
            cast: None,
        }
    }

    /// Allow a literal list of values
    pub fn allowing_list(mut self) -> Self {
        self.allow_list = true;
        self
    }

    pub fn with_cast(mut self, cast: Cast) -> Self {
        self.cast = Some(cast);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the value from its configured form
    pub fn set(&mut self, raw: &YamlValue, ctx: &BuildContext) -> EngineResult<()> {
        self.set_source(ValueSource::parse(raw, ctx)?)
    }

    pub fn set_source(&mut self, source: ValueSource) -> EngineResult<()> {
        if !self.allow_list && matches!(source, ValueSource::Literal(Value::List(_))) {
            return Err(EngineError::Config(format!(
                "{}: A list of values is not allowed!",
                self.name
            )));
        }
        self.source = Some(source);
        Ok(())
    }

    /// Set the value from an attribute of `node`, or from `default` if the
    /// attribute is missing
    pub fn set_from_attr(
        &mut self,
        node: &ConfigNode,
        attribute: &str,
        default: Option<Value>,
        ctx: &BuildContext,
    ) -> EngineResult<()> {
        match (node.attr(attribute), default) {
            (Some(raw), _) => self.set(raw, ctx),
            (None, Some(default)) => self.set_source(ValueSource::Literal(default)),
            (None, None) => Ok(()),
        }
    }

    pub fn set_cast(&mut self, cast: Cast) {
        self.cast = Some(cast);
    }

    pub fn cast(&self) -> Option<Cast> {
        self.cast
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_none()
    }

    pub fn source(&self) -> Option<&ValueSource> {
        self.source.as_ref()
    }

    /// Kind of the configured source, `None` if empty
    pub fn get_type(&self) -> Option<ValueKind> {
        self.source.as_ref().map(ValueSource::kind)
    }

    /// Resolve and cast the value; `None` if nothing is configured
    pub fn get(&self, ctx: &EvalContext) -> EngineResult<Option<Value>> {
        let value = match &self.source {
            None => return Ok(None),
            Some(ValueSource::Literal(value)) => value.clone(),
            Some(ValueSource::Item(item)) => ctx.item_value(item)?,
            Some(ValueSource::Expression(expression)) => ctx
                .evaluate(expression)
                .map_err(|e| e.context(format!("{} '{}'", self.name, expression)))?,
        };
        self.apply_cast(value).map(Some)
    }

    /// Cast literal value, `None` if empty or not a literal
    pub fn literal(&self) -> EngineResult<Option<Value>> {
        match &self.source {
            Some(ValueSource::Literal(value)) => self.apply_cast(value.clone()).map(Some),
            _ => Ok(None),
        }
    }

    fn apply_cast(&self, value: Value) -> EngineResult<Value> {
        match self.cast {
            Some(cast) => Ok(cast.apply(value)?),
            None => Ok(value),
        }
    }

    /// One line description for introspection output
    pub fn text(&self, prefix: &str, suffix: &str) -> String {
        match &self.source {
            None => String::new(),
            Some(source) => format!("{}{}: {}{}", prefix, self.name, source, suffix),
        }
    }

    pub fn write_log(&self) {
        if let Some(source) = &self.source {
            debug!("{}: {} ({})", self.name, source, source.kind());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;
    use autostate_core::FixedClock;
    use crate::variables::VariableContext;
    use crate::context::CycleInfo;
    use autostate_config::ConfigTree;
    use autostate_core::{EvalResult, ExpressionEvaluator, Variables};
    use autostate_items::ItemStore;

    struct Echo;

    impl ExpressionEvaluator for Echo {
        fn evaluate(&self, expression: &str, _variables: &Variables) -> EvalResult<Value> {
            Ok(Value::from(expression))
        }
    }

    fn yaml(text: &str) -> YamlValue {
        serde_yaml::from_str(text).unwrap()
    }

    fn fixture() -> (ConfigTree, ItemStore) {
        let tree = ConfigTree::from_items(&yaml("blind:\n  height:\n    type: num\n")).unwrap();
        let items = ItemStore::new();
        items
            .insert(ItemId::new("blind.height").unwrap(), Value::Num(40.0), Some(Cast::Num))
            .unwrap();
        (tree, items)
    }

    #[test]
    fn test_parse_prefixes() {
        let (tree, items) = fixture();
        let ctx = BuildContext::new(&tree, tree.get("blind").unwrap(), &items);

        assert_eq!(
            ValueSource::parse(&yaml("'value:22:00'"), &ctx).unwrap(),
            ValueSource::Literal(Value::from("22:00"))
        );
        assert_eq!(
            ValueSource::parse(&yaml("'22:00'"), &ctx).unwrap(),
            ValueSource::Literal(Value::from("22:00"))
        );
        assert_eq!(
            ValueSource::parse(&yaml("item:.height"), &ctx).unwrap(),
            ValueSource::Item(ItemId::new("blind.height").unwrap())
        );
        assert_eq!(
            ValueSource::parse(&yaml("eval:1 + 2"), &ctx).unwrap(),
            ValueSource::Expression("1 + 2".into())
        );
        assert_eq!(
            ValueSource::parse(&yaml("42"), &ctx).unwrap(),
            ValueSource::Literal(Value::Num(42.0))
        );
        assert!(ValueSource::parse(&yaml("item:.nothing"), &ctx).is_err());
    }

    #[test]
    fn test_lists_only_where_allowed() {
        let (tree, items) = fixture();
        let ctx = BuildContext::new(&tree, tree.get("blind").unwrap(), &items);

        let mut min = ResolvedValue::new("min");
        assert!(min.set(&yaml("[1, 2]"), &ctx).is_err());
        let mut value = ResolvedValue::new("value").allowing_list();
        assert!(value.set(&yaml("[1, 2]"), &ctx).is_ok());
    }

    #[test]
    fn test_get_with_cast() {
        let (tree, items) = fixture();
        let build = BuildContext::new(&tree, tree.get("blind").unwrap(), &items);
        let clock = FixedClock::at(12, 0);
        let environment = Environment::capture(&clock, None);
        let variables = VariableContext::new(Value::Num(0.0));
        let cycle = CycleInfo::default();
        let object = ItemId::new("blind").unwrap();
        let ctx = EvalContext {
            object: &object,
            items: &items,
            evaluator: &Echo,
            environment: &environment,
            variables: &variables,
            cycle: &cycle,
        };

        let mut empty = ResolvedValue::new("empty");
        assert_eq!(empty.get(&ctx).unwrap(), None);
        empty.set_cast(Cast::Num);
        assert!(empty.is_empty());

        let mut literal = ResolvedValue::new("max");
        literal.set(&yaml("'21,5'"), &build).unwrap();
        literal.set_cast(Cast::Num);
        assert_eq!(literal.get(&ctx).unwrap(), Some(Value::Num(21.5)));
        assert_eq!(literal.literal().unwrap(), Some(Value::Num(21.5)));
        assert_eq!(literal.get_type(), Some(ValueKind::Value));

        let mut item = ResolvedValue::new("min").with_cast(Cast::Str);
        item.set(&yaml("item:blind.height"), &build).unwrap();
        assert_eq!(item.get(&ctx).unwrap(), Some(Value::from("40")));
        assert_eq!(item.literal().unwrap(), None);

        let mut eval = ResolvedValue::new("value").with_cast(Cast::Num);
        eval.set(&yaml("eval:12"), &build).unwrap();
        assert_eq!(eval.get(&ctx).unwrap(), Some(Value::Num(12.0)));

        let mut bad = ResolvedValue::new("value").with_cast(Cast::Num);
        bad.set(&yaml("abc"), &build).unwrap();
        assert!(matches!(bad.get(&ctx), Err(EngineError::Cast(_))));
    }
}
