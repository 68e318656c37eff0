//! Deciding whether an item change was made manually
//!
//! An item may carry `as_manual_include` and `as_manual_exclude` lists of
//! `caller:source` patterns, where `*` matches any caller or source. A
//! change counts as manual if its original caller matches no exclude
//! pattern and, when include patterns are given, at least one of them.

use crate::error::{EngineError, EngineResult};
use autostate_config::{ConfigNode, YamlValue};
use autostate_core::{original_caller, ItemId, OriginalCaller, TriggerInfo, Value};
use autostate_items::ItemStore;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
struct CallerPattern {
    caller: String,
    source: String,
}

impl CallerPattern {
    fn parse(entry: &str) -> Self {
        let (caller, source) = entry.split_once(':').unwrap_or((entry, ""));
        Self {
            caller: caller.to_string(),
            source: source.to_string(),
        }
    }

    /// `*` matches anything, other patterns only a present, equal value
    fn matches(&self, original: &OriginalCaller) -> bool {
        let part = |pattern: &str, value: &Option<String>| {
            pattern == "*" || value.as_deref() == Some(pattern)
        };
        part(&self.caller, &original.caller) && part(&self.source, &original.source)
    }
}

/// Include/exclude patterns of one item
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManualFilter {
    include: Option<Vec<CallerPattern>>,
    exclude: Vec<CallerPattern>,
}

impl ManualFilter {
    /// Read the patterns of `node`; `None` if it has neither attribute
    pub fn from_node(node: &ConfigNode) -> EngineResult<Option<Self>> {
        let include = node
            .attr("as_manual_include")
            .map(|raw| patterns(node.id(), "as_manual_include", raw))
            .transpose()?;
        let exclude = node
            .attr("as_manual_exclude")
            .map(|raw| patterns(node.id(), "as_manual_exclude", raw))
            .transpose()?;
        if include.is_none() && exclude.is_none() {
            return Ok(None);
        }
        Ok(Some(Self {
            include,
            exclude: exclude.unwrap_or_default(),
        }))
    }

    /// Whether a change by `original` counts as manual
    pub fn is_manual(&self, original: &OriginalCaller) -> bool {
        if self.exclude.iter().any(|p| p.matches(original)) {
            return false;
        }
        match &self.include {
            Some(include) => include.iter().any(|p| p.matches(original)),
            None => true,
        }
    }
}

fn patterns(id: &ItemId, attribute: &str, raw: &YamlValue) -> EngineResult<Vec<CallerPattern>> {
    match raw {
        YamlValue::String(entry) => Ok(vec![CallerPattern::parse(entry)]),
        YamlValue::Sequence(entries) => entries
            .iter()
            .map(|entry| match entry {
                YamlValue::String(entry) => Ok(CallerPattern::parse(entry)),
                _ => Err(invalid(id, attribute)),
            })
            .collect(),
        _ => Err(invalid(id, attribute)),
    }
}

fn invalid(id: &ItemId, attribute: &str) -> EngineError {
    EngineError::Config(format!(
        "Item '{}', Attribute '{}': Value must be a string or a list!",
        id, attribute
    ))
}

/// New value for a "manual" flag item after a change caused by `trigger`
///
/// Returns the inverted value of the item if the change counts as manual,
/// its current value otherwise.
pub fn manual_item_update_eval(
    node: &ConfigNode,
    items: &ItemStore,
    trigger: &TriggerInfo,
) -> EngineResult<Value> {
    let current = items
        .value(node.id().as_str())
        .ok_or_else(|| EngineError::ItemNotFound(node.id().to_string()))?;
    let original = original_caller(items, trigger);
    let manual = match ManualFilter::from_node(node)? {
        Some(filter) => filter.is_manual(&original),
        None => true,
    };
    debug!(
        item = %node.id(),
        caller = ?original.caller,
        source = ?original.source,
        manual,
        "Evaluated manual change"
    );
    Ok(if manual {
        Value::Bool(!current.is_truthy())
    } else {
        current
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn original(caller: &str, source: &str) -> OriginalCaller {
        OriginalCaller {
            caller: Some(caller.to_string()),
            source: Some(source.to_string()),
            item: None,
        }
    }

    fn filter(include: Option<&[&str]>, exclude: &[&str]) -> ManualFilter {
        ManualFilter {
            include: include.map(|entries| entries.iter().map(|e| CallerPattern::parse(e)).collect()),
            exclude: exclude.iter().map(|e| CallerPattern::parse(e)).collect(),
        }
    }

    #[test]
    fn test_exclude_wins() {
        let filter = filter(Some(&["*:*"]), &["Timer:*"]);
        assert!(!filter.is_manual(&original("Timer", "x")));
        assert!(filter.is_manual(&original("Visu", "192.168.0.2")));
    }

    #[test]
    fn test_include_required_when_given() {
        let filter = filter(Some(&["KNX:1/1/1"]), &[]);
        assert!(filter.is_manual(&original("KNX", "1/1/1")));
        assert!(!filter.is_manual(&original("KNX", "1/1/2")));
        assert!(!filter.is_manual(&original("Visu", "1/1/1")));
    }

    #[test]
    fn test_missing_source_needs_wildcard() {
        let without_source = OriginalCaller {
            caller: Some("Logic".to_string()),
            source: None,
            item: None,
        };
        assert!(!filter(None, &["Logic"]).is_manual(&original("Logic", "")));
        assert!(filter(None, &["Logic"]).is_manual(&without_source));
        assert!(!filter(None, &["Logic:*"]).is_manual(&without_source));
    }

    #[test]
    fn test_no_include_means_manual() {
        let filter = filter(None, &["Init:*"]);
        assert!(filter.is_manual(&original("Visu", "x")));
        assert!(!filter.is_manual(&original("Init", "")));
    }
}
