//! Read-only item configuration tree
//!
//! The `items:` section of the configuration forms a tree: a key whose value
//! is a mapping is a child item, every other key is an attribute of the item
//! it sits in. Declaration order is preserved, it decides state priority.

use crate::error::{ConfigError, ConfigResult};
use autostate_core::{Cast, ItemId, Value};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml::Value as YamlValue;
use tracing::{debug, trace};

/// Geographic location used for the sun position
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// One item of the configuration tree
#[derive(Debug, Clone)]
pub struct ConfigNode {
    id: ItemId,
    attributes: IndexMap<String, YamlValue>,
    children: Vec<ItemId>,
}

impl ConfigNode {
    pub fn id(&self) -> &ItemId {
        &self.id
    }

    /// Display name: the `name` attribute, or the id if none is set
    pub fn name(&self) -> String {
        self.attr_str("name")
            .unwrap_or_else(|| self.id.to_string())
    }

    /// Whether a `name` attribute is configured
    pub fn has_name(&self) -> bool {
        self.attributes.contains_key("name")
    }

    pub fn attr(&self, name: &str) -> Option<&YamlValue> {
        self.attributes.get(name)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Attribute converted to a [`Value`]
    pub fn attr_value(&self, name: &str) -> Option<Value> {
        self.attr(name).map(yaml_to_value)
    }

    /// Scalar attribute as text
    pub fn attr_str(&self, name: &str) -> Option<String> {
        match self.attr(name)? {
            YamlValue::String(s) => Some(s.clone()),
            YamlValue::Bool(b) => Some(b.to_string()),
            YamlValue::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Attributes in declaration order
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &YamlValue)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Ids of the child items in declaration order
    pub fn children(&self) -> &[ItemId] {
        &self.children
    }

    /// Native cast from the `type` attribute
    pub fn item_type(&self) -> ConfigResult<Option<Cast>> {
        let Some(type_name) = self.attr_str("type") else {
            return Ok(None);
        };
        Cast::from_type_name(&type_name)
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: format!("{}.type", self.id),
                reason: format!("unknown item type '{}'", type_name),
            })
    }

    /// Initial value from the `value` attribute, falling back to the
    /// type's empty value
    pub fn initial_value(&self) -> ConfigResult<Value> {
        let cast = self.item_type()?;
        Ok(match (self.attr_value("value"), cast) {
            (Some(value), _) => value,
            (None, Some(Cast::Num)) => Value::Num(0.0),
            (None, Some(Cast::Str)) => Value::Str(String::new()),
            (None, Some(Cast::Bool)) => Value::Bool(false),
            (None, Some(Cast::List)) => Value::List(Vec::new()),
            (None, Some(Cast::Time)) => Value::from("00:00"),
            (None, None) => Value::Null,
        })
    }
}

/// The complete item configuration tree
#[derive(Debug, Clone, Default)]
pub struct ConfigTree {
    nodes: IndexMap<String, ConfigNode>,
    roots: Vec<ItemId>,
    location: Option<Location>,
}

impl ConfigTree {
    /// Build the tree from a loaded document with `items:` and an optional
    /// `location:` section
    pub fn from_document(document: &YamlValue) -> ConfigResult<Self> {
        let items = document
            .get("items")
            .ok_or_else(|| ConfigError::MissingSection {
                section: "items".to_string(),
            })?;
        let mut tree = Self::from_items(items)?;

        if let Some(location) = document.get("location") {
            let location: Location =
                serde_yaml::from_value(location.clone()).map_err(|e| ConfigError::InvalidValue {
                    key: "location".to_string(),
                    reason: e.to_string(),
                })?;
            debug!(
                latitude = location.latitude,
                longitude = location.longitude,
                "Location configured"
            );
            tree.location = Some(location);
        }

        Ok(tree)
    }

    /// Build the tree from the `items:` mapping itself
    pub fn from_items(items: &YamlValue) -> ConfigResult<Self> {
        let mapping = items.as_mapping().ok_or_else(|| ConfigError::InvalidValue {
            key: "items".to_string(),
            reason: "must be a mapping".to_string(),
        })?;

        let mut tree = Self::default();
        for (key, value) in mapping {
            let key = key_to_string(key)?;
            let id = ItemId::new(&key).map_err(|source| ConfigError::InvalidItemId {
                key: key.clone(),
                source,
            })?;
            tree.roots.push(id.clone());
            tree.add_node(id, value)?;
        }
        debug!(items = tree.nodes.len(), "Configuration tree built");
        Ok(tree)
    }

    fn add_node(&mut self, id: ItemId, value: &YamlValue) -> ConfigResult<()> {
        let mut node = ConfigNode {
            id: id.clone(),
            attributes: IndexMap::new(),
            children: Vec::new(),
        };

        let mut children = Vec::new();
        if let Some(mapping) = value.as_mapping() {
            for (key, value) in mapping {
                let key = key_to_string(key)?;
                if value.is_mapping() {
                    let child = id.child(&key).map_err(|source| ConfigError::InvalidItemId {
                        key: format!("{}.{}", id, key),
                        source,
                    })?;
                    node.children.push(child.clone());
                    children.push((child, value));
                } else {
                    node.attributes.insert(key, value.clone());
                }
            }
        } else if !value.is_null() {
            // a top-level `rain: 0` is shorthand for an item with a value
            node.attributes.insert("value".to_string(), value.clone());
        }

        trace!(item = %id, attributes = node.attributes.len(), "Adding item");
        self.nodes.insert(id.to_string(), node);
        for (child, value) in children {
            self.add_node(child, value)?;
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&ConfigNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Child nodes of `id` in declaration order
    pub fn children<'a>(&'a self, id: &ItemId) -> impl Iterator<Item = &'a ConfigNode> + 'a {
        self.get(id.as_str())
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(move |child| self.get(child.as_str()))
    }

    pub fn parent(&self, id: &ItemId) -> Option<&ConfigNode> {
        id.parent().and_then(|parent| self.get(parent.as_str()))
    }

    /// All nodes, parents before their children
    pub fn nodes(&self) -> impl Iterator<Item = &ConfigNode> {
        self.nodes.values()
    }

    pub fn roots(&self) -> &[ItemId] {
        &self.roots
    }

    /// Nodes whose attribute `name` has the text `value`
    pub fn nodes_with_attr<'a>(
        &'a self,
        name: &'a str,
        value: &'a str,
    ) -> impl Iterator<Item = &'a ConfigNode> + 'a {
        self.nodes
            .values()
            .filter(move |node| node.attr_str(name).as_deref() == Some(value))
    }

    pub fn location(&self) -> Option<Location> {
        self.location
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn key_to_string(key: &YamlValue) -> ConfigResult<String> {
    match key {
        YamlValue::String(s) => Ok(s.clone()),
        YamlValue::Number(n) => Ok(n.to_string()),
        YamlValue::Bool(b) => Ok(b.to_string()),
        other => Err(ConfigError::InvalidValue {
            key: format!("{:?}", other),
            reason: "keys must be scalars".to_string(),
        }),
    }
}

/// Convert a YAML value into an engine [`Value`]
///
/// Mappings have no counterpart and are converted to their JSON text.
pub fn yaml_to_value(value: &YamlValue) -> Value {
    match value {
        YamlValue::Null => Value::Null,
        YamlValue::Bool(b) => Value::Bool(*b),
        YamlValue::Number(n) => n.as_f64().map(Value::Num).unwrap_or(Value::Null),
        YamlValue::String(s) => Value::Str(s.clone()),
        YamlValue::Sequence(seq) => Value::List(seq.iter().map(yaml_to_value).collect()),
        YamlValue::Mapping(_) => serde_json::to_string(value)
            .map(Value::Str)
            .unwrap_or(Value::Null),
        YamlValue::Tagged(tagged) => yaml_to_value(&tagged.value),
    }
}
