//! Trigger provenance for tracking what caused an update cycle

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use ulid::Ulid;

use crate::EVAL_CALLER;

/// Provenance of a single trigger
///
/// Every update cycle is started by a trigger: an item change, a timer or
/// the startup logic. The trigger records which item changed, who changed it
/// (`caller`), the `source` reported by the caller and an optional `dest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerInfo {
    /// Unique identifier for this trigger (ULID)
    pub id: String,

    /// Item whose change fired the trigger
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,

    /// Who caused the change (e.g. "Logic", "Eval", "Init")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller: Option<String>,

    /// Source reported by the caller
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Destination reported by the caller
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
}

impl TriggerInfo {
    /// Create a new trigger for the given caller
    pub fn new(caller: impl Into<String>) -> Self {
        Self {
            id: Ulid::new().to_string(),
            item: None,
            caller: Some(caller.into()),
            source: None,
            dest: None,
        }
    }

    /// Set the item that changed
    pub fn with_item(mut self, item: impl Into<String>) -> Self {
        self.item = Some(item.into());
        self
    }

    /// Set the source
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Set the destination
    pub fn with_dest(mut self, dest: impl Into<String>) -> Self {
        self.dest = Some(dest.into());
        self
    }

    /// The `caller:source` tag the host stores as `changed_by`
    pub fn changed_by(&self) -> String {
        format!(
            "{}:{}",
            self.caller.as_deref().unwrap_or(""),
            self.source.as_deref().unwrap_or("")
        )
    }
}

impl Default for TriggerInfo {
    fn default() -> Self {
        Self {
            id: Ulid::new().to_string(),
            item: None,
            caller: None,
            source: None,
            dest: None,
        }
    }
}

/// Access to the `changed_by` tag of host items
pub trait ChangedByLookup {
    /// The `caller:source` tag of the last change of `item`
    fn changed_by(&self, item: &str) -> Option<String>;
}

/// The caller that initially caused a trigger
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginalCaller {
    pub caller: Option<String>,
    pub source: Option<String>,
    pub item: Option<String>,
}

/// Find out what initially caused a trigger
///
/// If an item was changed by expression evaluation (caller `Eval`) the
/// source names the item whose change caused the evaluation. That item's
/// `changed_by` tag is followed until a caller other than `Eval` is found,
/// the tag can not be split, or an item is visited twice.
pub fn original_caller(lookup: &dyn ChangedByLookup, trigger: &TriggerInfo) -> OriginalCaller {
    let mut result = OriginalCaller {
        caller: trigger.caller.clone(),
        source: trigger.source.clone(),
        item: trigger.item.clone(),
    };
    let mut visited = HashSet::new();

    while result.caller.as_deref() == Some(EVAL_CALLER) {
        let Some(item) = result.source.clone() else {
            break;
        };
        if !visited.insert(item.clone()) {
            break;
        }
        let Some(changed_by) = lookup.changed_by(&item) else {
            break;
        };
        let Some((caller, source)) = changed_by.split_once(':') else {
            break;
        };
        result = OriginalCaller {
            caller: Some(caller.to_string()),
            source: Some(source.to_string()),
            item: Some(item),
        };
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Lookup(HashMap<String, String>);

    impl ChangedByLookup for Lookup {
        fn changed_by(&self, item: &str) -> Option<String> {
            self.0.get(item).cloned()
        }
    }

    #[test]
    fn test_direct_caller_is_original() {
        let lookup = Lookup(HashMap::new());
        let trigger = TriggerInfo::new("Logic")
            .with_item("blind.automatic")
            .with_source("wind");
        let original = original_caller(&lookup, &trigger);
        assert_eq!(original.caller.as_deref(), Some("Logic"));
        assert_eq!(original.item.as_deref(), Some("blind.automatic"));
    }

    #[test]
    fn test_eval_is_unwound() {
        let lookup = Lookup(HashMap::from([
            ("sensor.rain".to_string(), "Eval:weather.raw".to_string()),
            ("weather.raw".to_string(), "Visu:192.168.0.2".to_string()),
        ]));
        let trigger = TriggerInfo::new("Eval")
            .with_item("blind.automatic")
            .with_source("sensor.rain");
        let original = original_caller(&lookup, &trigger);
        assert_eq!(original.caller.as_deref(), Some("Visu"));
        assert_eq!(original.source.as_deref(), Some("192.168.0.2"));
        assert_eq!(original.item.as_deref(), Some("weather.raw"));
    }

    #[test]
    fn test_eval_cycle_terminates() {
        let lookup = Lookup(HashMap::from([
            ("a".to_string(), "Eval:b".to_string()),
            ("b".to_string(), "Eval:a".to_string()),
        ]));
        let trigger = TriggerInfo::new("Eval").with_source("a");
        let original = original_caller(&lookup, &trigger);
        assert_eq!(original.caller.as_deref(), Some("Eval"));
    }

    #[test]
    fn test_changed_by_tag() {
        let trigger = TriggerInfo::new("Logic").with_source("x");
        assert_eq!(trigger.changed_by(), "Logic:x");
    }
}
