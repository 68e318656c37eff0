//! In-memory item tree for autostate
//!
//! This crate provides the ItemStore, which holds the current value of every
//! host item together with the timestamps and the `changed_by` tag of its
//! last change. Every write is broadcast as an [`ItemChanged`] event so
//! controllers can register change triggers.

use autostate_core::{
    Cast, CastError, ChangedByLookup, Clock, ItemId, ItemIdError, SystemClock, TriggerInfo, Value,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use regex::Regex;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, instrument, trace};

/// Default channel capacity for change subscriptions
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Item store errors
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Item {item}: {source}")]
    Cast {
        item: String,
        #[source]
        source: CastError,
    },

    #[error(transparent)]
    InvalidId(#[from] ItemIdError),

    #[error("Invalid item pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// Result type for item operations
pub type ItemResult<T> = Result<T, ItemError>;

/// Current state of a single item
#[derive(Debug, Clone)]
pub struct ItemState {
    /// The item this state belongs to
    pub id: ItemId,

    /// Current value
    pub value: Value,

    /// Native type of the item, applied on every write
    pub cast: Option<Cast>,

    /// When the value was last changed (different from previous value)
    pub last_changed: DateTime<Utc>,

    /// When the value was last written (even if it didn't change)
    pub last_updated: DateTime<Utc>,

    /// `caller:source` of the last write
    pub changed_by: String,
}

impl ItemState {
    /// Seconds since the last change, relative to `now`
    pub fn age_at(&self, now: DateTime<Utc>) -> f64 {
        (now - self.last_changed).num_milliseconds() as f64 / 1000.0
    }
}

/// Data broadcast for every item write
#[derive(Debug, Clone)]
pub struct ItemChanged {
    pub item: ItemId,
    pub old_value: Option<Value>,
    pub new_value: Value,
    /// Whether the value differs from the previous one
    pub changed: bool,
    pub trigger: TriggerInfo,
}

/// The item store tracks all host items
///
/// The ItemStore is responsible for:
/// - Storing the current value of every item
/// - Applying the item's native cast on writes
/// - Tracking last change time and `changed_by` for age and provenance
/// - Broadcasting item changes to subscribers
///
/// Change times and ages are taken from the store's [`Clock`].
pub struct ItemStore {
    items: DashMap<String, ItemState>,
    sender: broadcast::Sender<ItemChanged>,
    clock: Arc<dyn Clock>,
}

impl ItemStore {
    /// Create a new, empty item store
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new item store with the given channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_clock_and_capacity(Arc::new(SystemClock), capacity)
    }

    /// Create a new item store stamping changes with `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_clock_and_capacity(clock, DEFAULT_CHANNEL_CAPACITY)
    }

    fn with_clock_and_capacity(clock: Arc<dyn Clock>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            items: DashMap::new(),
            sender,
            clock,
        }
    }

    /// Register an item with its initial value
    ///
    /// Registration does not fire a change event.
    pub fn insert(&self, id: ItemId, value: Value, cast: Option<Cast>) -> ItemResult<()> {
        self.insert_at(id, value, cast, self.clock.now_utc())
    }

    /// Register an item whose value was last changed at `changed_at`
    pub fn insert_at(
        &self,
        id: ItemId,
        value: Value,
        cast: Option<Cast>,
        changed_at: DateTime<Utc>,
    ) -> ItemResult<()> {
        let value = Self::apply_cast(&id, cast, value)?;
        trace!(item = %id, %value, "Registering item");
        self.items.insert(
            id.to_string(),
            ItemState {
                id,
                value,
                cast,
                last_changed: changed_at,
                last_updated: changed_at,
                changed_by: "Init:None".to_string(),
            },
        );
        Ok(())
    }

    /// Write a new value to an item
    ///
    /// `last_changed` is only updated if the value actually changed. An
    /// [`ItemChanged`] event is fired either way.
    #[instrument(skip(self, value, trigger), fields(item = %id))]
    pub fn set(&self, id: &ItemId, value: Value, trigger: TriggerInfo) -> ItemResult<ItemState> {
        let now = self.clock.now_utc();
        let (old_value, new_state) = {
            let mut entry = self
                .items
                .get_mut(id.as_str())
                .ok_or_else(|| ItemError::NotFound(id.to_string()))?;
            let value = Self::apply_cast(id, entry.cast, value)?;
            let old_value = entry.value.clone();
            if old_value != value {
                entry.last_changed = now;
            }
            entry.value = value;
            entry.last_updated = now;
            entry.changed_by = trigger.changed_by();
            (old_value, entry.clone())
        };

        let changed = old_value != new_state.value;
        debug!(value = %new_state.value, changed, caller = ?trigger.caller, "Setting item value");

        let mut trigger = trigger;
        trigger.item = Some(id.to_string());
        // Ignore send errors - they just mean no active receivers
        let _ = self.sender.send(ItemChanged {
            item: id.clone(),
            old_value: Some(old_value),
            new_value: new_state.value.clone(),
            changed,
            trigger,
        });

        Ok(new_state)
    }

    /// Get the current state of an item
    pub fn get(&self, id: &str) -> Option<ItemState> {
        self.items.get(id).map(|s| s.clone())
    }

    /// Get the current value of an item
    pub fn value(&self, id: &str) -> Option<Value> {
        self.items.get(id).map(|s| s.value.clone())
    }

    /// Seconds since the item's value last changed
    pub fn age(&self, id: &str) -> Option<f64> {
        self.items.get(id).map(|s| s.age_at(self.clock.now_utc()))
    }

    /// Native cast of an item
    pub fn cast(&self, id: &str) -> Option<Cast> {
        self.items.get(id).and_then(|s| s.cast)
    }

    /// Check if an item exists
    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    /// Get all item ids, sorted
    pub fn all_ids(&self) -> Vec<ItemId> {
        let mut ids: Vec<ItemId> = self.items.iter().map(|r| r.id.clone()).collect();
        ids.sort();
        ids
    }

    /// Get all item ids matching a pattern where `*` matches any run of
    /// characters
    pub fn match_ids(&self, pattern: &str) -> ItemResult<Vec<ItemId>> {
        let regex = format!(
            "^{}$",
            pattern
                .split('*')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(".*")
        );
        let re = Regex::new(&regex).map_err(|e| ItemError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(self
            .all_ids()
            .into_iter()
            .filter(|id| re.is_match(id.as_str()))
            .collect())
    }

    /// Subscribe to item changes
    pub fn subscribe(&self) -> broadcast::Receiver<ItemChanged> {
        self.sender.subscribe()
    }

    /// Get the total number of items
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    fn apply_cast(id: &ItemId, cast: Option<Cast>, value: Value) -> ItemResult<Value> {
        match cast {
            Some(cast) => cast.apply(value).map_err(|source| ItemError::Cast {
                item: id.to_string(),
                source,
            }),
            None => Ok(value),
        }
    }
}

impl Default for ItemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangedByLookup for ItemStore {
    fn changed_by(&self, item: &str) -> Option<String> {
        self.items.get(item).map(|s| s.changed_by.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autostate_core::FixedClock;
    use chrono::Duration;

    fn id(s: &str) -> ItemId {
        ItemId::new(s).unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let store = ItemStore::new();
        store
            .insert(id("blind.height"), Value::from("40"), Some(Cast::Num))
            .unwrap();

        assert_eq!(store.value("blind.height"), Some(Value::Num(40.0)));
        assert_eq!(store.cast("blind.height"), Some(Cast::Num));
        assert!(store.get("blind.missing").is_none());
    }

    #[test]
    fn test_set_applies_cast_and_changed_by() {
        let store = ItemStore::new();
        store
            .insert(id("blind.locked"), Value::Bool(false), Some(Cast::Bool))
            .unwrap();

        let state = store
            .set(
                &id("blind.locked"),
                Value::from("on"),
                TriggerInfo::new("Visu").with_source("panel"),
            )
            .unwrap();
        assert_eq!(state.value, Value::Bool(true));
        assert_eq!(store.changed_by("blind.locked").unwrap(), "Visu:panel");
    }

    #[test]
    fn test_set_unknown_item() {
        let store = ItemStore::new();
        let err = store
            .set(&id("nope"), Value::Null, TriggerInfo::new("Logic"))
            .unwrap_err();
        assert!(matches!(err, ItemError::NotFound(_)));
    }

    #[test]
    fn test_update_preserves_last_changed() {
        let store = ItemStore::new();
        let item = id("sensor.temp");
        let past = Utc::now() - Duration::seconds(120);
        store
            .insert_at(item.clone(), Value::Num(20.0), Some(Cast::Num), past)
            .unwrap();

        // Same value - age keeps growing
        store
            .set(&item, Value::Num(20.0), TriggerInfo::new("Logic"))
            .unwrap();
        assert!(store.age("sensor.temp").unwrap() >= 119.0);

        // Different value - age restarts
        store
            .set(&item, Value::Num(21.0), TriggerInfo::new("Logic"))
            .unwrap();
        assert!(store.age("sensor.temp").unwrap() < 5.0);
    }

    #[test]
    fn test_changes_are_stamped_by_the_clock() {
        let clock = Arc::new(FixedClock::at(12, 0));
        let store = ItemStore::with_clock(clock.clone());
        let item = id("sensor.temp");
        store.insert(item.clone(), Value::Num(20.0), Some(Cast::Num)).unwrap();
        assert_eq!(store.get("sensor.temp").unwrap().last_changed, clock.now_utc());

        clock.advance(Duration::seconds(90));
        assert_eq!(store.age("sensor.temp"), Some(90.0));

        store
            .set(&item, Value::Num(21.0), TriggerInfo::new("Logic"))
            .unwrap();
        assert_eq!(store.age("sensor.temp"), Some(0.0));
        clock.advance(Duration::seconds(30));
        assert_eq!(store.age("sensor.temp"), Some(30.0));
    }

    #[test]
    fn test_match_ids() {
        let store = ItemStore::new();
        for name in ["blind.one.height", "blind.two.height", "blind.one.angle"] {
            store.insert(id(name), Value::Null, None).unwrap();
        }

        let matched = store.match_ids("blind.*.height").unwrap();
        assert_eq!(matched.len(), 2);
        let exact = store.match_ids("blind.one.angle").unwrap();
        assert_eq!(exact, vec![id("blind.one.angle")]);
    }

    #[tokio::test]
    async fn test_change_event_fired() {
        let store = ItemStore::new();
        store.insert(id("light.test"), Value::from("off"), None).unwrap();
        let mut rx = store.subscribe();

        store
            .set(&id("light.test"), Value::from("on"), TriggerInfo::new("Logic"))
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.item.as_str(), "light.test");
        assert_eq!(event.old_value, Some(Value::from("off")));
        assert_eq!(event.new_value, Value::from("on"));
        assert!(event.changed);
        assert_eq!(event.trigger.item.as_deref(), Some("light.test"));
    }

    #[test]
    fn test_unchanged_write_is_broadcast() {
        let store = ItemStore::new();
        store.insert(id("blind.lock"), Value::Bool(false), Some(Cast::Bool)).unwrap();
        let mut rx = store.subscribe();

        store
            .set(&id("blind.lock"), Value::Bool(false), TriggerInfo::new("Visu"))
            .unwrap();

        let event = tokio_test::block_on(rx.recv()).unwrap();
        assert!(!event.changed);
        assert_eq!(event.trigger.changed_by(), "Visu:");
    }
}
